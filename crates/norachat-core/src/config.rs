use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::ai::{CompletionClient, GeminiClient, OllamaClient};
use crate::dispatcher::Persona;
use crate::provider::Provider;

pub const GEMINI_API_KEY_ENV: &str = "GEMINI_API_KEY";
pub const PROVIDER_ENV: &str = "NORACHAT_PROVIDER";
pub const MODEL_ENV: &str = "NORACHAT_MODEL";

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub gemini_api_key: Option<String>,
    #[serde(default)]
    pub ollama_url: Option<String>,
    #[serde(default)]
    pub persona_name: Option<String>,
    #[serde(default)]
    pub product_name: Option<String>,
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::get_config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::info!("Config file {} not found; using defaults", path.display());
            return Ok(Self::default());
        }

        let config_content = fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&config_content)?;
        Ok(config)
    }

    /// Apply `NORACHAT_PROVIDER`, `NORACHAT_MODEL` and `GEMINI_API_KEY`.
    ///
    /// Environment values take precedence over the file.
    pub fn with_env_overrides(mut self) -> Self {
        self.apply_overrides(|key| std::env::var(key).ok());
        self
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let lookup = |key: &str| lookup(key).filter(|v| !v.is_empty());
        if let Some(provider) = lookup(PROVIDER_ENV) {
            self.provider = Some(provider);
        }
        if let Some(model) = lookup(MODEL_ENV) {
            self.model = Some(model);
        }
        if let Some(key) = lookup(GEMINI_API_KEY_ENV) {
            self.gemini_api_key = Some(key);
        }
    }

    pub fn provider(&self) -> Provider {
        match self.provider.as_deref() {
            None => Provider::default(),
            Some(name) => Provider::from_str(name).unwrap_or_else(|| {
                log::warn!(
                    "Unknown provider '{}'; falling back to {}",
                    name,
                    Provider::default().as_str()
                );
                Provider::default()
            }),
        }
    }

    pub fn model(&self) -> String {
        self.model
            .clone()
            .unwrap_or_else(|| self.provider().default_model().to_string())
    }

    pub fn ollama_url(&self) -> &str {
        self.ollama_url.as_deref().unwrap_or(OllamaClient::DEFAULT_URL)
    }

    pub fn has_gemini_key(&self) -> bool {
        self.gemini_api_key.as_deref().is_some_and(|k| !k.is_empty())
    }

    pub fn persona(&self) -> Persona {
        let default = Persona::default();
        Persona {
            name: self.persona_name.clone().unwrap_or(default.name),
            product: self.product_name.clone().unwrap_or(default.product),
        }
    }

    /// Build the remote client once at startup.
    ///
    /// A missing Gemini key still yields a client; every call then fails.
    pub fn build_client(&self) -> Arc<dyn CompletionClient> {
        let model = self.model();
        match self.provider() {
            Provider::Gemini => {
                if !self.has_gemini_key() {
                    log::warn!("{} is not set; every request will fail", GEMINI_API_KEY_ENV);
                }
                let key = self.gemini_api_key.as_deref().unwrap_or_default();
                Arc::new(GeminiClient::new(key, &model))
            }
            Provider::Ollama => Arc::new(OllamaClient::new(self.ollama_url(), &model)),
        }
    }

    pub fn get_config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow!("Could not determine config directory"))?;

        Ok(config_dir.join("norachat").join("config.json"))
    }
}
