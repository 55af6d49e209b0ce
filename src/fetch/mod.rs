// src/fetch/mod.rs
//! Fetch adapters: web/news search, disclosure lists, RSS feeds and a static
//! fixture source. All of them produce [`Item`]s with a stable `id`.

pub mod dart;
pub mod rss;
pub mod serper;

use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};

use crate::error::FetchError;
use crate::types::Item;

pub use dart::DartFetcher;
pub use rss::RssFetcher;
pub use serper::SerperFetcher;

/// How far back a search should look.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recency {
    #[default]
    Any,
    Day,
    Week,
    Month,
}

impl Recency {
    /// Google `tbs` value, e.g. `qdr:w`.
    pub fn serper_tbs(self) -> Option<&'static str> {
        match self {
            Recency::Any => None,
            Recency::Day => Some("qdr:d"),
            Recency::Week => Some("qdr:w"),
            Recency::Month => Some("qdr:m"),
        }
    }

    /// Lookback window in days for date-ranged APIs.
    pub fn days(self, default: i64) -> i64 {
        match self {
            Recency::Any => default,
            Recency::Day => 1,
            Recency::Week => 7,
            Recency::Month => 30,
        }
    }
}

#[async_trait::async_trait]
pub trait FetchAdapter: Send + Sync {
    async fn fetch(&self, query: &str, recency: Recency) -> Result<Vec<Item>, FetchError>;
    fn name(&self) -> &'static str;
}

/// Decode entities, strip tags, unify quotes, collapse whitespace, cap at
/// 1500 chars.
pub fn normalize_text(s: &str) -> String {
    static RE_TAGS: OnceCell<regex::Regex> = OnceCell::new();
    static RE_WS: OnceCell<regex::Regex> = OnceCell::new();

    let decoded = html_escape::decode_html_entities(s);
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)</?[^>]+>").expect("tag regex"));
    let mut out = re_tags.replace_all(&decoded, "").into_owned();

    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"\s+").expect("ws regex"));
    out = re_ws.replace_all(&out, " ").trim().to_string();

    if out.chars().count() > 1500 {
        out = out.chars().take(1500).collect();
    }
    out
}

/// Serves a fixed item list for every query. Used for demos and tests.
#[derive(Debug, Clone, Default)]
pub struct StaticFetcher {
    items: Vec<Item>,
}

impl StaticFetcher {
    pub fn new(items: Vec<Item>) -> Self {
        Self { items }
    }
}

#[async_trait::async_trait]
impl FetchAdapter for StaticFetcher {
    async fn fetch(&self, _query: &str, _recency: Recency) -> Result<Vec<Item>, FetchError> {
        Ok(self.items.clone())
    }

    fn name(&self) -> &'static str {
        "static"
    }
}
