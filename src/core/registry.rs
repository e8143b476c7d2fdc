//! Built-in model registry
//!
//! Static metadata for every callable model backend, loaded from the
//! embedded `builtin_models.toml`. The registry also owns the substitution
//! policy for rate-limited models: only explicitly designated sibling pairs
//! are interchangeable.

use serde::{Deserialize, Serialize};

/// How many models a single turn may fan out to.
pub const MAX_FANOUT_MODELS: usize = 3;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelDescriptor {
    pub id: String,
    pub display_name: String,
    pub icon: String,
    pub family: String,
    pub supports_attachments: bool,
    pub default_max_tokens: u32,
    pub default_temperature: f32,
    pub rate_limit_sibling: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FusionModelConfig {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

#[derive(Debug, Serialize, Deserialize)]
struct RegistryConfig {
    models: Vec<ModelDescriptor>,
    fusion: FusionModelConfig,
}

pub struct ModelRegistry {
    models: Vec<ModelDescriptor>,
    fusion: FusionModelConfig,
}

impl ModelRegistry {
    /// Load the embedded registry. Parsing the compiled-in TOML cannot fail
    /// for a well-formed build, so a parse error here is a packaging bug.
    pub fn load() -> Result<Self, toml::de::Error> {
        const CONFIG_CONTENT: &str = include_str!("builtin_models.toml");
        let config: RegistryConfig = toml::from_str(CONFIG_CONTENT)?;
        Ok(Self {
            models: config.models,
            fusion: config.fusion,
        })
    }

    pub fn list(&self) -> &[ModelDescriptor] {
        &self.models
    }

    /// Find a model by ID (case-insensitive).
    pub fn find(&self, id: &str) -> Option<&ModelDescriptor> {
        self.models.iter().find(|m| m.id.eq_ignore_ascii_case(id))
    }

    /// The sibling to try when `id` fails with a rate-limit or quota error,
    /// if one is designated.
    pub fn rate_limit_sibling(&self, id: &str) -> Option<&ModelDescriptor> {
        self.find(id)
            .and_then(|m| m.rate_limit_sibling.as_deref())
            .and_then(|sibling| self.find(sibling))
    }

    pub fn fusion_config(&self) -> &FusionModelConfig {
        &self.fusion
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_builtin_models() {
        let registry = ModelRegistry::load().unwrap();
        assert!(!registry.list().is_empty());

        let ids: Vec<&str> = registry.list().iter().map(|m| m.id.as_str()).collect();
        assert!(ids.contains(&"gemini-2.5-flash"));
        assert!(ids.contains(&"qwen-3-32b"));
    }

    #[test]
    fn test_find_is_case_insensitive() {
        let registry = ModelRegistry::load().unwrap();

        let model = registry.find("Gemini-2.5-Flash");
        assert!(model.is_some());
        assert_eq!(model.unwrap().id, "gemini-2.5-flash");

        assert!(registry.find("nonexistent").is_none());
    }

    #[test]
    fn test_sibling_pairs_are_mutual() {
        let registry = ModelRegistry::load().unwrap();

        let sibling = registry.rate_limit_sibling("gemini-2.5-flash").unwrap();
        assert_eq!(sibling.id, "gemini-2.0-flash");

        let back = registry.rate_limit_sibling(&sibling.id).unwrap();
        assert_eq!(back.id, "gemini-2.5-flash");
    }

    #[test]
    fn test_models_without_sibling_get_no_substitute() {
        let registry = ModelRegistry::load().unwrap();
        assert!(registry.rate_limit_sibling("qwen-3-32b").is_none());
        assert!(registry.rate_limit_sibling("nonexistent").is_none());
    }

    #[test]
    fn test_attachment_capability_flags() {
        let registry = ModelRegistry::load().unwrap();
        assert!(registry.find("gemini-2.0-flash").unwrap().supports_attachments);
        assert!(!registry.find("llama4-maverick-17b-128e-instruct").unwrap().supports_attachments);
    }

    #[test]
    fn test_fusion_model_is_registered() {
        let registry = ModelRegistry::load().unwrap();
        let fusion = registry.fusion_config();
        assert!(registry.find(&fusion.model).is_some());
        assert!(fusion.max_tokens > 0);
    }
}
