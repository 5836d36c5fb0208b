//! Translation of settings into Replicate model input, plus parameter validation.

use serde_json::{json, Map, Value};

use crate::settings::TatttySection;

/// Aspect ratio value that enables explicit width/height.
pub const CUSTOM_ASPECT_RATIO: &str = "custom";

/// Suffix appended to every synthesized prompt before image generation.
pub const PROMPT_SUFFIX: &str = ", white background";

const VALID_ASPECT_RATIOS: [&str; 12] = [
    "1:1", "16:9", "21:9", "3:2", "2:3", "4:5", "5:4", "3:4", "4:3", "9:16", "9:21", "custom",
];

/// Build the model input. Optional parameters are only included when set;
/// zero, empty and `false` count as unset.
#[must_use]
pub fn build_input(
    section: &TatttySection,
    prompt: &str,
    aspect_ratio: &str,
) -> Map<String, Value> {
    let aspect_ratio = if aspect_ratio.trim().is_empty() {
        section.aspect_ratio.as_str()
    } else {
        aspect_ratio.trim()
    };

    let mut input = Map::new();
    input.insert("prompt".into(), json!(format!("{prompt}{PROMPT_SUFFIX}")));
    input.insert("aspect_ratio".into(), json!(aspect_ratio));

    let mut put = |key: &str, value: Value| {
        input.insert(key.to_string(), value);
    };

    if !section.model.is_empty() {
        put("model", json!(section.model));
    }
    if section.go_fast {
        put("go_fast", json!(true));
    }
    if !section.megapixels.is_empty() {
        put("megapixels", json!(section.megapixels));
    }
    if section.num_outputs > 0 {
        put("num_outputs", json!(section.num_outputs));
    }
    if !section.output_format.is_empty() {
        put("output_format", json!(section.output_format));
    }
    if section.output_quality > 0 {
        put("output_quality", json!(section.output_quality));
    }
    if section.num_inference_steps > 0 {
        put("num_inference_steps", json!(section.num_inference_steps));
    }
    if section.guidance_scale > 0.0 {
        put("guidance_scale", json!(section.guidance_scale));
    }
    if section.disable_safety_checker {
        put("disable_safety_checker", json!(true));
    }
    if section.lora_scale != 0.0 {
        put("lora_scale", json!(section.lora_scale));
    }
    if !section.extra_lora.is_empty() {
        put("extra_lora", json!(section.extra_lora));
    }
    if section.extra_lora_scale != 0.0 {
        put("extra_lora_scale", json!(section.extra_lora_scale));
    }
    if section.prompt_strength > 0.0 {
        put("prompt_strength", json!(section.prompt_strength));
    }
    if let Some(seed) = section.seed {
        put("seed", json!(seed));
    }
    if let Some(mask) = section.mask.as_deref().filter(|m| !m.is_empty()) {
        put("mask", json!(mask));
    }
    if let Some(image) = section.image.as_deref().filter(|i| !i.is_empty()) {
        put("image", json!(image));
    }
    if aspect_ratio == CUSTOM_ASPECT_RATIO {
        if let Some(width) = section.width.filter(|w| *w > 0) {
            put("width", json!(width));
        }
        if let Some(height) = section.height.filter(|h| *h > 0) {
            put("height", json!(height));
        }
    }

    input
}

/// Validate that an aspect ratio is accepted by the model.
///
/// # Errors
///
/// Returns an error if the ratio is not recognized.
pub fn validate_aspect_ratio(ratio: &str) -> Result<(), String> {
    if VALID_ASPECT_RATIOS.contains(&ratio) {
        Ok(())
    } else {
        Err(format!("Unsupported aspect ratio '{ratio}'. Valid: {VALID_ASPECT_RATIOS:?}"))
    }
}

/// Validate the output format parameter. Empty means unset and leaves the
/// choice to the model.
///
/// # Errors
///
/// Returns an error if the format is not recognized.
pub fn validate_format(format: &str) -> Result<(), String> {
    match format {
        "" | "webp" | "jpg" | "png" => Ok(()),
        _ => Err(format!("Unsupported format '{format}'. Valid: webp, jpg, png")),
    }
}

/// Validate the megapixels parameter. Empty means unset.
///
/// # Errors
///
/// Returns an error if the value is not recognized.
pub fn validate_megapixels(megapixels: &str) -> Result<(), String> {
    match megapixels {
        "" | "1" | "0.25" => Ok(()),
        _ => Err(format!("Unsupported megapixels '{megapixels}'. Valid: 1, 0.25")),
    }
}

/// Get the file extension for an output format.
#[must_use]
pub fn format_extension(format: &str) -> &'static str {
    match format {
        "png" => "png",
        "jpg" | "jpeg" => "jpg",
        // webp and any unknown format default to webp
        _ => "webp",
    }
}
