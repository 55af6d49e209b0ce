use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::{normalize_text, FetchAdapter, Recency};
use crate::error::FetchError;
use crate::types::Item;

const SERPER_URL: &str = "https://google.serper.dev/search";

/// Google search through serper.dev. News results are all kept; organic web
/// results are capped at `organic_limit`. The result link is the item id.
pub struct SerperFetcher {
    http: reqwest::Client,
    api_key: String,
    url: String,
    num: u32,
    gl: String,
    hl: String,
    organic_limit: usize,
}

#[derive(Serialize)]
struct SearchRequest<'a> {
    q: &'a str,
    num: u32,
    gl: &'a str,
    hl: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    tbs: Option<&'a str>,
}

#[derive(Debug, Default, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    news: Vec<SearchHit>,
    #[serde(default)]
    organic: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    #[serde(default)]
    title: String,
    #[serde(default)]
    link: String,
    #[serde(default)]
    snippet: String,
    #[serde(default)]
    date: Option<String>,
    #[serde(default)]
    source: Option<String>,
}

impl SerperFetcher {
    pub fn new(api_key: String) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self {
            http,
            api_key,
            url: SERPER_URL.to_string(),
            num: 10,
            gl: "kr".into(),
            hl: "ko".into(),
            organic_limit: 5,
        }
    }

    /// `SERPER_API_KEY`; `NotConfigured` when unset.
    pub fn from_env() -> Result<Self, FetchError> {
        std::env::var("SERPER_API_KEY")
            .ok()
            .filter(|k| !k.is_empty())
            .map(Self::new)
            .ok_or_else(|| FetchError::NotConfigured("SERPER_API_KEY".into()))
    }

    pub fn with_locale(mut self, gl: impl Into<String>, hl: impl Into<String>) -> Self {
        self.gl = gl.into();
        self.hl = hl.into();
        self
    }

    pub fn with_num(mut self, num: u32) -> Self {
        self.num = num.max(1);
        self
    }

    pub fn with_organic_limit(mut self, n: usize) -> Self {
        self.organic_limit = n;
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }
}

fn into_items(resp: SearchResponse, organic_limit: usize) -> Vec<Item> {
    let news = resp.news.into_iter().map(|h| (h, "news"));
    let organic = resp
        .organic
        .into_iter()
        .take(organic_limit)
        .map(|h| (h, "web"));

    news.chain(organic)
        .filter(|(h, _)| !h.link.is_empty())
        .map(|(h, kind)| {
            Item::new(h.link, normalize_text(&h.title))
                .snippet(normalize_text(&h.snippet))
                .source(h.source.unwrap_or_else(|| kind.to_string()))
                .date(h.date.unwrap_or_default())
        })
        .collect()
}

#[async_trait::async_trait]
impl FetchAdapter for SerperFetcher {
    async fn fetch(&self, query: &str, recency: Recency) -> Result<Vec<Item>, FetchError> {
        let req = SearchRequest {
            q: query,
            num: self.num,
            gl: &self.gl,
            hl: &self.hl,
            tbs: recency.serper_tbs(),
        };
        let resp: SearchResponse = self
            .http
            .post(&self.url)
            .header("X-API-KEY", &self.api_key)
            .json(&req)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let items = into_items(resp, self.organic_limit);
        tracing::debug!(target: "fetch", adapter = "serper", query, hits = items.len(), "search done");
        Ok(items)
    }

    fn name(&self) -> &'static str {
        "serper"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn news_first_then_capped_organic() {
        let raw = r#"{
            "news": [
                {"title": "A <b>new</b> book", "link": "https://n/1", "snippet": "s1", "date": "2 days ago", "source": "Daily"},
                {"title": "no link", "link": ""}
            ],
            "organic": [
                {"title": "w1", "link": "https://w/1", "snippet": ""},
                {"title": "w2", "link": "https://w/2", "snippet": ""},
                {"title": "w3", "link": "https://w/3", "snippet": ""}
            ]
        }"#;
        let resp: SearchResponse = serde_json::from_str(raw).unwrap();
        let items = into_items(resp, 2);
        let ids: Vec<_> = items.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, ["https://n/1", "https://w/1", "https://w/2"]);
        assert_eq!(items[0].title, "A new book");
        assert_eq!(items[0].source, "Daily");
        assert_eq!(items[1].source, "web");
    }

    #[test]
    fn tbs_only_sent_with_recency() {
        let body = SearchRequest {
            q: "x",
            num: 10,
            gl: "kr",
            hl: "ko",
            tbs: Recency::Any.serper_tbs(),
        };
        let v = serde_json::to_value(&body).unwrap();
        assert!(v.get("tbs").is_none());
    }
}
