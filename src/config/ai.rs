// src/config/ai.rs
use serde::{Deserialize, Serialize};
use std::{env, path::PathBuf};

use crate::error::ConfigError;

fn default_daily_limit() -> u32 {
    50
}
fn default_api_key() -> String {
    "ENV".to_string()
}
fn default_counter_path() -> PathBuf {
    PathBuf::from("data/llm_calls.json")
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[default]
    Gemini,
    Openai,
    Mock,
}

impl ProviderKind {
    /// Env vars tried, in order, when the key is `"ENV"`.
    fn default_key_vars(self) -> &'static [&'static str] {
        match self {
            ProviderKind::Gemini => &["GOOGLE_API_KEY", "GEMINI_API_KEY"],
            ProviderKind::Openai => &["OPENAI_API_KEY"],
            ProviderKind::Mock => &[],
        }
    }
}

/// `[ai]` table of the bots file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiConfig {
    #[serde(default)]
    pub provider: ProviderKind,
    /// Provider default when absent.
    #[serde(default)]
    pub model: Option<String>,
    /// Real provider calls allowed per UTC day, shared by every bot of the process.
    #[serde(default = "default_daily_limit")]
    pub daily_limit: u32,
    /// `"ENV"` reads the provider's standard variable; anything else names
    /// the env var holding the key. Keys never live in the file.
    #[serde(default = "default_api_key")]
    pub api_key: String,
    #[serde(default = "default_counter_path")]
    pub counter_path: PathBuf,
    /// Fixed output of the mock provider.
    #[serde(default)]
    pub mock_response: Option<String>,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::default(),
            model: None,
            daily_limit: default_daily_limit(),
            api_key: default_api_key(),
            counter_path: default_counter_path(),
            mock_response: None,
        }
    }
}

impl AiConfig {
    pub fn resolve_api_key(&self) -> Result<String, ConfigError> {
        if self.provider == ProviderKind::Mock {
            return Ok(String::new());
        }
        let key_ref = self.api_key.trim();
        if key_ref.eq_ignore_ascii_case("env") || key_ref.is_empty() {
            let vars = self.provider.default_key_vars();
            return vars
                .iter()
                .find_map(|v| env::var(v).ok().filter(|k| !k.is_empty()))
                .ok_or_else(|| ConfigError::MissingEnv(vars.join(" or ")));
        }
        env::var(key_ref)
            .ok()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| ConfigError::MissingEnv(key_ref.to_string()))
    }
}
