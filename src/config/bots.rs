// src/config/bots.rs
//! Bot definitions (`[[bots]]` tables) and their validation.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use super::ai::AiConfig;
use crate::analyze::AnalysisMode;
use crate::error::ConfigError;
use crate::fetch::Recency;
use crate::market::ReferenceMode;
use crate::policy::TierLadder;
use crate::types::{Item, Tier};

fn default_retry_secs() -> u64 {
    600
}
fn default_cooldown_secs() -> i64 {
    3_600
}
fn default_threshold() -> u8 {
    70
}
fn default_currency() -> String {
    "KRW".to_string()
}
fn default_remote() -> String {
    "origin".to_string()
}
fn default_refspec() -> String {
    "main".to_string()
}
fn default_true() -> bool {
    true
}

/// Whole bots file.
#[derive(Debug, Clone, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub ai: AiConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub bots: Vec<BotConfig>,
}

impl FileConfig {
    pub fn bot(&self, name: &str) -> Result<&BotConfig, ConfigError> {
        self.bots
            .iter()
            .find(|b| b.name == name)
            .ok_or_else(|| ConfigError::UnknownBot(name.to_string()))
    }

    pub fn bot_names(&self) -> Vec<&str> {
        self.bots.iter().map(|b| b.name.as_str()).collect()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut names = HashSet::new();
        for b in &self.bots {
            if !names.insert(b.name.as_str()) {
                return Err(ConfigError::invalid(&b.name, "duplicate bot name"));
            }
            b.validate()?;
        }
        Ok(())
    }
}

/// `[sync]`: where state files are pushed after a cycle.
#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub repo_dir: Option<PathBuf>,
    #[serde(default = "default_remote")]
    pub remote: String,
    /// e.g. `main` or `main:master`.
    #[serde(default = "default_refspec")]
    pub refspec: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            repo_dir: None,
            remote: default_remote(),
            refspec: default_refspec(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BotConfig {
    pub name: String,
    pub interval_secs: u64,
    #[serde(default = "default_retry_secs")]
    pub retry_interval_secs: u64,
    /// Seen set, history, latest report and sync fingerprints live here.
    /// Defaults to `data/<name>`.
    #[serde(default)]
    pub state_dir: Option<PathBuf>,
    /// Minimum seconds between two failure alerts of the same kind.
    #[serde(default = "default_cooldown_secs")]
    pub alert_cooldown_secs: i64,
    /// Telegram chats in addition to the env-configured ones.
    #[serde(default)]
    pub extra_chat_ids: Vec<String>,
    #[serde(default = "default_true")]
    pub sync: bool,
    #[serde(flatten)]
    pub kind: BotKind,
}

impl BotConfig {
    pub fn state_dir(&self) -> PathBuf {
        self.state_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from("data").join(&self.name))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let bad = |reason: &str| ConfigError::invalid(&self.name, reason);
        if self.name.trim().is_empty() {
            return Err(bad("name is empty"));
        }
        if self.interval_secs == 0 {
            return Err(bad("interval_secs must be positive"));
        }
        if self.retry_interval_secs == 0 {
            return Err(bad("retry_interval_secs must be positive"));
        }
        match &self.kind {
            BotKind::Informational(c) => c.validate().map_err(|r| bad(&r)),
            BotKind::Transactional(c) => c.ladder().map(|_| ()).map_err(|e| {
                ConfigError::invalid(&self.name, e.to_string())
            }),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BotKind {
    Informational(InformationalConfig),
    Transactional(TransactionalConfig),
}

#[derive(Debug, Clone, Deserialize)]
pub struct InformationalConfig {
    pub source: SourceConfig,
    pub watches: Vec<WatchConfig>,
    #[serde(default = "default_threshold")]
    pub threshold: u8,
    #[serde(default)]
    pub recency: Recency,
    #[serde(default)]
    pub mode: AnalysisMode,
    #[serde(default)]
    pub headline: Option<String>,
    /// Task description for the model.
    #[serde(default)]
    pub instructions: Option<String>,
    /// Seconds to wait between watches.
    #[serde(default)]
    pub pause_secs: u64,
    /// Mine new filings for period results.
    #[serde(default)]
    pub extract: Option<ExtractConfig>,
}

/// `[bots.extract]`: results extraction for disclosure bots.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExtractConfig {
    /// Defaults to `<state_dir>/results.json`.
    #[serde(default)]
    pub dataset: Option<PathBuf>,
    #[serde(default)]
    pub instructions: Option<String>,
}

impl ExtractConfig {
    pub fn dataset_path(&self, state_dir: &Path) -> PathBuf {
        self.dataset
            .clone()
            .unwrap_or_else(|| state_dir.join("results.json"))
    }
}

impl InformationalConfig {
    fn validate(&self) -> Result<(), String> {
        if self.threshold > 100 {
            return Err(format!("threshold {} outside 0..=100", self.threshold));
        }
        if self.watches.is_empty() {
            return Err("at least one watch is required".into());
        }
        let mut keys = HashSet::new();
        for w in &self.watches {
            if w.key.trim().is_empty() {
                return Err("watch key is empty".into());
            }
            if !keys.insert(w.key.as_str()) {
                return Err(format!("duplicate watch key `{}`", w.key));
            }
            let needs_query = !matches!(self.source, SourceConfig::Rss { .. } | SourceConfig::Static { .. });
            if needs_query && w.query.trim().is_empty() {
                return Err(format!("watch `{}` has an empty query", w.key));
            }
        }
        if let SourceConfig::Rss { url } = &self.source {
            if url.trim().is_empty() {
                return Err("rss url is empty".into());
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WatchConfig {
    pub key: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub context: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SourceConfig {
    Serper {
        #[serde(default)]
        gl: Option<String>,
        #[serde(default)]
        hl: Option<String>,
        #[serde(default)]
        num: Option<u32>,
        #[serde(default)]
        organic_limit: Option<usize>,
    },
    Dart {
        #[serde(default)]
        keywords: Vec<String>,
        #[serde(default)]
        days: Option<i64>,
        #[serde(default)]
        disclosure_type: Option<String>,
    },
    Rss {
        url: String,
    },
    Static {
        #[serde(default)]
        items: Vec<Item>,
    },
}

#[derive(Debug, Clone, Deserialize)]
pub struct TransactionalConfig {
    pub symbol: String,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default)]
    pub reference: ReferenceMode,
    pub tiers: Vec<Tier>,
    /// Simulate fills against an in-memory account with this much cash.
    #[serde(default)]
    pub paper_cash: Option<f64>,
    /// Ask the model for a short comment after each fill.
    #[serde(default)]
    pub commentary: bool,
}

impl TransactionalConfig {
    pub fn ladder(&self) -> Result<TierLadder, crate::policy::LadderError> {
        TierLadder::new(self.tiers.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[ai]
provider = "mock"
mock_response = '{"relevant": false, "summary": "-", "confidence": 0}'

[[bots]]
name = "books"
kind = "informational"
interval_secs = 43200
threshold = 70

[bots.source]
type = "serper"
gl = "kr"

[[bots.watches]]
key = "han-kang"
query = "Han Kang new book"

[[bots]]
name = "eth"
kind = "transactional"
interval_secs = 86400
symbol = "KRW-ETH"

[[bots.tiers]]
threshold = -10.0
amount = 500000.0
label = "crash"

[[bots.tiers]]
threshold = -3.0
amount = 110000.0
label = "dip"
"#;

    #[test]
    fn sample_parses_and_validates() {
        let cfg: FileConfig = toml::from_str(SAMPLE).unwrap();
        cfg.validate().unwrap();
        assert_eq!(cfg.bot_names(), ["books", "eth"]);

        let books = cfg.bot("books").unwrap();
        assert_eq!(books.retry_interval_secs, 600);
        assert_eq!(books.state_dir(), PathBuf::from("data/books"));
        let BotKind::Informational(ic) = &books.kind else {
            panic!("expected informational");
        };
        assert!(matches!(ic.source, SourceConfig::Serper { .. }));
        assert_eq!(ic.mode, AnalysisMode::Verdict);

        let BotKind::Transactional(tc) = &cfg.bot("eth").unwrap().kind else {
            panic!("expected transactional");
        };
        assert_eq!(tc.currency, "KRW");
        assert_eq!(tc.ladder().unwrap().select(-3.0).unwrap().amount, 110_000.0);
    }

    #[test]
    fn misordered_ladder_is_a_config_error() {
        let swapped = SAMPLE.replace("threshold = -10.0", "threshold = -1.0");
        let cfg: FileConfig = toml::from_str(&swapped).unwrap();
        let err = cfg.validate().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { ref bot, .. } if bot == "eth"));
    }

    #[test]
    fn threshold_and_interval_are_checked() {
        let cfg: FileConfig = toml::from_str(&SAMPLE.replace("threshold = 70", "threshold = 101")).unwrap();
        assert!(cfg.validate().is_err());
        let cfg: FileConfig =
            toml::from_str(&SAMPLE.replace("interval_secs = 43200", "interval_secs = 0")).unwrap();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn unknown_bot_is_reported() {
        let cfg: FileConfig = toml::from_str(SAMPLE).unwrap();
        assert!(matches!(cfg.bot("nope"), Err(ConfigError::UnknownBot(_))));
    }

    #[test]
    fn extract_table_defaults_into_state_dir() {
        let with_extract = SAMPLE.replace(
            "[[bots.watches]]",
            "[bots.extract]\ninstructions = \"quarterly figures\"\n\n[[bots.watches]]",
        );
        let cfg: FileConfig = toml::from_str(&with_extract).unwrap();
        let books = cfg.bot("books").unwrap();
        let BotKind::Informational(ic) = &books.kind else {
            panic!("expected informational");
        };
        let ex = ic.extract.as_ref().unwrap();
        assert_eq!(ex.instructions.as_deref(), Some("quarterly figures"));
        assert_eq!(ex.dataset_path(&books.state_dir()), PathBuf::from("data/books/results.json"));
    }
}
