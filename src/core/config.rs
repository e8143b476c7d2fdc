//! User configuration
//!
//! A small TOML file under the platform config directory. Everything has a
//! working default; a missing file is not an error.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::error::Error;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;

#[derive(Debug, Serialize, Deserialize, Default, Clone)]
pub struct Config {
    /// Models to fan out to when none are given on the command line.
    #[serde(default)]
    pub default_models: Vec<String>,
    /// Per-model sampling temperature overrides.
    #[serde(default)]
    pub model_temperatures: HashMap<String, f32>,
    /// Overrides the registry's designated fusion model.
    pub fusion_model: Option<String>,
    /// Custom API base URL; `FANFUSE_BASE_URL` takes precedence.
    pub base_url: Option<String>,
    /// Render markdown in answers (default true).
    pub markdown: Option<bool>,
    /// Syntax-highlight fenced code blocks when markdown is enabled.
    pub syntax: Option<bool>,
}

impl Config {
    pub fn load() -> Result<Self, Box<dyn Error>> {
        match Self::config_path() {
            Some(path) => Self::load_from(&path),
            None => Ok(Self::default()),
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, Box<dyn Error>> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), Box<dyn Error>> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn config_path() -> Option<PathBuf> {
        ProjectDirs::from("org", "permacommons", "fanfuse")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    pub fn markdown_enabled(&self) -> bool {
        self.markdown.unwrap_or(true)
    }

    pub fn syntax_enabled(&self) -> bool {
        self.syntax.unwrap_or(true)
    }

    pub fn temperature_override(&self, model_id: &str) -> Option<f32> {
        self.model_temperatures.get(model_id).copied()
    }
}
