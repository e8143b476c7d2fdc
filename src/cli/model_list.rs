//! `fanfuse models` listing

use std::error::Error;

use crate::core::config::Config;
use crate::core::registry::ModelRegistry;

pub fn list_models() -> Result<(), Box<dyn Error>> {
    let registry = ModelRegistry::load()?;
    let config = Config::load()?;

    println!("Available models:");
    for model in registry.list() {
        let default_marker = if config.default_models.iter().any(|m| m == &model.id) {
            " (default)"
        } else {
            ""
        };
        let attachments = if model.supports_attachments {
            ", attachments"
        } else {
            ""
        };
        println!(
            "  {} {}  [{}{}]{}",
            model.icon, model.display_name, model.id, attachments, default_marker
        );
    }

    let fusion = registry.fusion_config();
    let fusion_model = config.fusion_model.as_deref().unwrap_or(&fusion.model);
    println!("\nFusion model: {fusion_model}");
    Ok(())
}
