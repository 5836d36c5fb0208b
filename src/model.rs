//! Model name resolution and provider detection.

use std::fmt;

use serde::Serialize;

/// Chat-completion dialects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    /// `OpenAI` `/v1/chat/completions` (also any compatible host).
    OpenAi,
    /// Ollama `/api/chat`.
    Ollama,
}

impl LlmProvider {
    /// Parse the provider name stored in settings.
    ///
    /// # Errors
    ///
    /// Returns an error for unknown provider names.
    pub fn parse(name: &str) -> Result<Self, String> {
        match name.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "ollama" => Ok(Self::Ollama),
            other => Err(format!("Unknown LLM provider '{other}'. Expected 'openai' or 'ollama'.")),
        }
    }

    /// Whether a bearer key is mandatory.
    #[must_use]
    pub fn requires_api_key(self) -> bool {
        matches!(self, Self::OpenAi)
    }

    /// Display name used in error messages.
    #[must_use]
    pub fn display_name(self) -> &'static str {
        match self {
            Self::OpenAi => "OpenAI",
            Self::Ollama => "Ollama",
        }
    }
}

/// Short name aliases for Replicate models.
const ALIASES: &[(&str, &str)] = &[
    (
        "tattty",
        "tattzy25/tattty_4_all:4e8f6c1dc77db77dabaf98318cde3679375a399b434ae2db0e698804ac84919c",
    ),
    ("flux-dev", "black-forest-labs/flux-dev"),
    ("flux-schnell", "black-forest-labs/flux-schnell"),
];

/// Resolve a model name (alias or exact) to the full model reference.
#[must_use]
pub fn resolve_model(name: &str) -> String {
    let name = name.trim();
    for &(alias, full) in ALIASES {
        if name == alias {
            return full.to_string();
        }
    }
    name.to_string()
}

/// A Replicate model reference: `owner/name` with an optional `:version`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelRef {
    /// Account owning the model.
    pub owner: String,
    /// Model name.
    pub name: String,
    /// Version hash; `None` runs the latest version.
    pub version: Option<String>,
}

impl ModelRef {
    /// Parse `owner/name[:version]`, resolving aliases first.
    ///
    /// # Errors
    ///
    /// Returns an error if the reference is malformed.
    pub fn parse(reference: &str) -> Result<Self, String> {
        let resolved = resolve_model(reference);
        let (path, version) = match resolved.split_once(':') {
            Some((path, version)) => (path, Some(version)),
            None => (resolved.as_str(), None),
        };
        let Some((owner, name)) = path.split_once('/') else {
            return Err(format!("Invalid model '{resolved}'. Expected 'owner/name[:version]'."));
        };
        if owner.is_empty() || name.is_empty() || name.contains('/') {
            return Err(format!("Invalid model '{resolved}'. Expected 'owner/name[:version]'."));
        }
        if version.is_some_and(str::is_empty) {
            return Err(format!("Invalid model '{resolved}': empty version."));
        }
        Ok(Self {
            owner: owner.to_string(),
            name: name.to_string(),
            version: version.map(ToString::to_string),
        })
    }
}

impl fmt::Display for ModelRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)?;
        if let Some(version) = &self.version {
            write!(f, ":{version}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_providers() {
        assert_eq!(LlmProvider::parse("openai").unwrap(), LlmProvider::OpenAi);
        assert_eq!(LlmProvider::parse(" Ollama ").unwrap(), LlmProvider::Ollama);
        assert!(LlmProvider::parse("fal").is_err());
    }

    #[test]
    fn only_openai_requires_key() {
        assert!(LlmProvider::OpenAi.requires_api_key());
        assert!(!LlmProvider::Ollama.requires_api_key());
    }

    #[test]
    fn resolve_alias() {
        assert_eq!(resolve_model("flux-dev"), "black-forest-labs/flux-dev");
        assert_eq!(resolve_model("someone/else"), "someone/else");
    }

    #[test]
    fn parse_with_version() {
        let model = ModelRef::parse("tattty").unwrap();
        assert_eq!(model.owner, "tattzy25");
        assert_eq!(model.name, "tattty_4_all");
        assert!(model.version.as_deref().unwrap().starts_with("4e8f6c1d"));
    }

    #[test]
    fn parse_without_version() {
        let model = ModelRef::parse("black-forest-labs/flux-schnell").unwrap();
        assert!(model.version.is_none());
        assert_eq!(model.to_string(), "black-forest-labs/flux-schnell");
    }

    #[test]
    fn parse_rejects_malformed() {
        assert!(ModelRef::parse("no-slash").is_err());
        assert!(ModelRef::parse("/name").is_err());
        assert!(ModelRef::parse("a/b/c").is_err());
        assert!(ModelRef::parse("owner/name:").is_err());
    }
}
