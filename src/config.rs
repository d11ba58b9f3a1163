use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::providers::{gemini, grok, Provider};

fn default_provider() -> String {
    Provider::Gemini.tag().to_string()
}

fn default_gemini_model() -> String {
    gemini::DEFAULT_MODEL.to_string()
}

fn default_gemini_api_base() -> String {
    gemini::DEFAULT_API_BASE.to_string()
}

fn default_xai_model() -> String {
    grok::DEFAULT_MODEL.to_string()
}

fn default_xai_endpoint() -> String {
    grok::DEFAULT_ENDPOINT.to_string()
}

fn default_timeout_secs() -> u64 {
    120
}

fn default_max_image_bytes() -> usize {
    4 * 1024 * 1024
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub window: WindowConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProviderConfig {
    #[serde(default = "default_provider")]
    pub default: String,
    #[serde(default)]
    pub gemini_api_key: String,
    #[serde(default)]
    pub xai_api_key: String,
    #[serde(default = "default_gemini_model")]
    pub gemini_model: String,
    #[serde(default = "default_gemini_api_base")]
    pub gemini_api_base: String,
    #[serde(default = "default_xai_model")]
    pub xai_model: String,
    #[serde(default = "default_xai_endpoint")]
    pub xai_endpoint: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SearchConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_image_bytes")]
    pub max_image_bytes: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WindowConfig {
    pub width: u32,
    pub height: u32,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        ProviderConfig {
            default: default_provider(),
            gemini_api_key: String::new(),
            xai_api_key: String::new(),
            gemini_model: default_gemini_model(),
            gemini_api_base: default_gemini_api_base(),
            xai_model: default_xai_model(),
            xai_endpoint: default_xai_endpoint(),
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        SearchConfig {
            timeout_secs: default_timeout_secs(),
            max_image_bytes: default_max_image_bytes(),
        }
    }
}

impl Default for WindowConfig {
    fn default() -> Self {
        WindowConfig {
            width: 900,
            height: 700,
        }
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

impl ProviderConfig {
    /// Configured provider, falling back to Gemini on an unknown tag.
    pub fn default_provider(&self) -> Provider {
        match self.default.parse() {
            Ok(provider) => provider,
            Err(e) => {
                eprintln!("{} in config.toml. Using gemini.", e);
                Provider::Gemini
            }
        }
    }

    /// Fills empty keys from the environment.
    fn apply_env(&mut self) {
        if self.gemini_api_key.trim().is_empty() {
            if let Some(key) = non_empty_env("GEMINI_API_KEY").or_else(|| non_empty_env("GOOGLE_API_KEY")) {
                self.gemini_api_key = key;
            }
        }
        if self.xai_api_key.trim().is_empty() {
            if let Some(key) = non_empty_env("XAI_API_KEY") {
                self.xai_api_key = key;
            }
        }
    }
}

impl Config {
    pub fn load() -> Self {
        let config_path = Self::get_config_path();
        let mut config = Self::load_from(&config_path);
        config.provider.apply_env();
        config
    }

    /// Reads `path`, reporting problems and falling back to defaults.
    pub fn load_from(path: &Path) -> Self {
        if path.exists() {
            match fs::read_to_string(path) {
                Ok(contents) => match toml::from_str(&contents) {
                    Ok(config) => return config,
                    Err(e) => eprintln!("Error parsing config.toml: {}. Using defaults.", e),
                },
                Err(e) => eprintln!("Error reading config.toml: {}. Using defaults.", e),
            }
        } else if let Some(parent) = path.parent() {
            let _ = fs::create_dir_all(parent);
        }

        Config::default()
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::get_config_path())
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let contents = toml::to_string_pretty(self).context("failed to serialize config")?;
        fs::write(path, contents).with_context(|| format!("failed to write {}", path.display()))?;
        Ok(())
    }

    pub fn get_config_path() -> PathBuf {
        if let Some(home) = std::env::var_os("HOME") {
            PathBuf::from(home).join(".config/sniffer/config.toml")
        } else {
            PathBuf::from("config.toml")
        }
    }

    pub fn get_config_dir() -> PathBuf {
        if let Some(home) = std::env::var_os("HOME") {
            PathBuf::from(home).join(".config/sniffer")
        } else {
            PathBuf::from(".")
        }
    }
}
