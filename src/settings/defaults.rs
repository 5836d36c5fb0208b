//! Built-in settings used when the settings file is missing or incomplete.

use super::{
    AspectRatioOption, Lists, PlacementOption, ProviderKey, Providers, Question, Settings,
    StyleOption, TatttySection, UpstashProvider, SETTINGS_VERSION,
};

/// Default system prompt for prompt synthesis.
pub const DEFAULT_SYSTEM_PROMPT: &str = include_str!("system_prompt.txt");

/// Default Replicate model reference (`owner/name:version`).
pub const DEFAULT_GENERATION_MODEL: &str =
    "tattzy25/tattty_4_all:4e8f6c1dc77db77dabaf98318cde3679375a399b434ae2db0e698804ac84919c";

const STYLES: &[(&str, &str, &str)] = &[
    ("sketch", "Sketch", "Raw, pencil-like strokes with visible construction lines."),
    ("line-art", "Fine Line", "Delicate, precise lines with minimal shading."),
    ("stipple", "Stipple/Dotwork", "Built entirely from tiny dots."),
    ("blackwork", "Blackwork", "Bold, solid black shapes and high contrast."),
    ("traditional", "Traditional", "Bold outlines and a limited, classic palette."),
    ("surrealism", "Surrealism", "Dream logic and bizarre imagery."),
    ("neo-traditional", "Neo-Traditional", "Traditional bones with more detail and color."),
    ("japanese", "Japanese/Irezumi", "Dragons, koi and other classic Japanese motifs."),
    ("geometric", "Geometric", "Exact shapes, patterns and symmetry."),
    ("watercolor", "Watercolor", "Fluid, painterly washes and color splashes."),
    ("tribal", "Tribal", "Bold black patterning."),
    ("realism", "Realism", "Photorealistic people, animals or objects."),
    ("trash-polka", "Trash Polka", "Collage of realism and abstract strokes."),
    ("bio-mechanical", "Bio-Mechanical", "Anatomy fused with machine parts."),
    ("minimalist", "Minimalist", "Clean designs with negative space."),
    ("abstract", "Abstract", "Non-representational forms."),
    ("illustrative", "Illustrative", "Comic-book color and outlines."),
    ("cartoon", "Cartoon", "Playful, exaggerated features."),
    ("gothic", "Gothic", "Dark, ornate detail."),
    ("steampunk", "Steampunk", "Victorian machinery fused with organic forms."),
    ("cyberpunk", "Cyberpunk", "Neon, circuitry and dystopia."),
    ("floral", "Floral", "Flowers and botanical motifs."),
    ("mandala", "Mandala", "Symmetry radiating from a center."),
    ("horror", "Horror", "Macabre themes and dark imagery."),
];

const PLACEMENTS: &[(&str, &str)] = &[
    ("forearm", "Forearm"),
    ("chest", "Chest"),
    ("back", "Back"),
    ("shoulder", "Shoulder"),
    ("leg", "Leg/Calf"),
    ("ribs", "Ribs"),
    ("neck", "Neck"),
    ("hand", "Hand"),
    ("wrist", "Wrist"),
    ("ankle", "Ankle"),
    ("thigh", "Thigh"),
    ("stomach", "Stomach"),
    ("spine", "Spine"),
    ("bicep", "Bicep"),
    ("tricep", "Tricep"),
    ("shin", "Shin"),
    ("foot", "Foot"),
    ("finger", "Finger"),
    ("hip", "Hip"),
    ("full-sleeve", "Full Sleeve"),
];

const MOODS: &[&str] = &[
    "Melancholic",
    "Triumphant",
    "Chaotic",
    "Serene",
    "Aggressive",
    "Mystical",
    "Nostalgic",
    "Ethereal",
    "Dark",
    "Playful",
    "Stoic",
    "Romantic",
    "Futuristic",
    "Elegant",
];

const ASPECT_RATIOS: &[(&str, &str, &str)] = &[
    ("square", "Square", "1:1"),
    ("portrait", "Portrait", "3:4"),
    ("landscape", "Landscape", "4:3"),
    ("wide", "Wide", "16:9"),
];

const COLORS: &[&str] =
    &["Black & Grey", "Full Color", "Red Ink Accents", "Blue Ink", "Minimalist"];

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: SETTINGS_VERSION,
            tattty: TatttySection::default(),
            lists: Lists::default(),
            providers: Providers::default(),
        }
    }
}

impl Default for TatttySection {
    fn default() -> Self {
        Self {
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            generation_model: DEFAULT_GENERATION_MODEL.to_string(),
            model: "dev".to_string(),
            go_fast: false,
            megapixels: "1".to_string(),
            num_outputs: 2,
            aspect_ratio: "1:1".to_string(),
            output_format: "webp".to_string(),
            output_quality: 80,
            num_inference_steps: 28,
            guidance_scale: 3.0,
            disable_safety_checker: true,
            extra_lora: String::new(),
            lora_scale: 1.0,
            extra_lora_scale: 1.0,
            prompt_strength: 0.8,
            seed: None,
            width: None,
            height: None,
            mask: None,
            image: None,
            inline_output: false,
            llm_provider: Some("openai".to_string()),
            llm_model: Some("gpt-4o".to_string()),
            llm_base_url: Some(String::new()),
            questions: vec![
                Question {
                    id: "pain".to_string(),
                    question: "What personal experience has shaped you the most?".to_string(),
                    placeholder: "Share your experience here...".to_string(),
                },
                Question {
                    id: "memory".to_string(),
                    question: "What is your most cherished memory?".to_string(),
                    placeholder: "Describe a memory that is important to you...".to_string(),
                },
            ],
        }
    }
}

impl Default for Lists {
    fn default() -> Self {
        Self {
            styles: STYLES
                .iter()
                .map(|&(id, label, description)| StyleOption {
                    id: id.to_string(),
                    label: label.to_string(),
                    description: description.to_string(),
                })
                .collect(),
            placements: PLACEMENTS
                .iter()
                .map(|&(id, label)| PlacementOption {
                    id: id.to_string(),
                    label: label.to_string(),
                    image: String::new(),
                })
                .collect(),
            moods: MOODS.iter().map(ToString::to_string).collect(),
            aspect_ratios: ASPECT_RATIOS
                .iter()
                .map(|&(id, label, value)| AspectRatioOption {
                    id: id.to_string(),
                    label: label.to_string(),
                    value: value.to_string(),
                })
                .collect(),
            colors: COLORS.iter().map(ToString::to_string).collect(),
        }
    }
}

impl Default for Providers {
    fn default() -> Self {
        let enabled = ProviderKey { api_key: String::new(), enabled: true };
        Self {
            replicate: enabled.clone(),
            openai: enabled.clone(),
            fal: enabled,
            upstash: UpstashProvider { url: String::new(), token: String::new(), enabled: true },
        }
    }
}
