use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};
use serde::Deserialize;

use super::{FetchAdapter, Recency};
use crate::error::FetchError;
use crate::types::Item;

const DART_LIST_URL: &str = "https://opendart.fss.or.kr/api/list.json";
const DART_VIEW_URL: &str = "https://dart.fss.or.kr/dsaf001/main.do?rcpNo=";

/// OpenDART disclosure list for one company (`query` is the 8-digit corp
/// code). Keeps reports whose name contains any of `keywords`; the receipt
/// number is the item id.
pub struct DartFetcher {
    http: reqwest::Client,
    api_key: String,
    url: String,
    keywords: Vec<String>,
    default_days: i64,
    /// `pblntf_ty`; "A" = periodic reports.
    disclosure_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ListResponse {
    status: String,
    #[serde(default)]
    message: String,
    #[serde(default)]
    list: Vec<Disclosure>,
}

#[derive(Debug, Deserialize)]
struct Disclosure {
    rcept_no: String,
    report_nm: String,
    #[serde(default)]
    corp_name: String,
    #[serde(default)]
    rcept_dt: String,
}

impl DartFetcher {
    pub fn new(api_key: String) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self {
            http,
            api_key,
            url: DART_LIST_URL.to_string(),
            keywords: Vec::new(),
            default_days: 3,
            disclosure_type: Some("A".into()),
        }
    }

    /// `DART_API_KEY`; `NotConfigured` when unset.
    pub fn from_env() -> Result<Self, FetchError> {
        std::env::var("DART_API_KEY")
            .ok()
            .filter(|k| !k.is_empty())
            .map(Self::new)
            .ok_or_else(|| FetchError::NotConfigured("DART_API_KEY".into()))
    }

    pub fn with_keywords(mut self, keywords: Vec<String>) -> Self {
        self.keywords = keywords;
        self
    }

    pub fn with_default_days(mut self, days: i64) -> Self {
        self.default_days = days.max(1);
        self
    }

    pub fn with_disclosure_type(mut self, ty: Option<String>) -> Self {
        self.disclosure_type = ty;
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    fn keep(&self, report_nm: &str) -> bool {
        self.keywords.is_empty() || self.keywords.iter().any(|k| report_nm.contains(k.as_str()))
    }

    fn into_items(&self, resp: ListResponse) -> Result<Vec<Item>, FetchError> {
        match resp.status.as_str() {
            "000" => {}
            // no data for the range
            "013" => return Ok(Vec::new()),
            "020" => return Err(FetchError::RateLimited(resp.message)),
            other => {
                return Err(FetchError::InvalidResponse(format!(
                    "dart status {other}: {}",
                    resp.message
                )))
            }
        }
        Ok(resp
            .list
            .into_iter()
            .filter(|d| self.keep(&d.report_nm))
            .map(|d| {
                let link = format!("{DART_VIEW_URL}{}", d.rcept_no);
                Item::new(d.rcept_no, d.report_nm)
                    .snippet(link)
                    .source(d.corp_name)
                    .date(d.rcept_dt)
            })
            .collect())
    }
}

#[async_trait::async_trait]
impl FetchAdapter for DartFetcher {
    async fn fetch(&self, query: &str, recency: Recency) -> Result<Vec<Item>, FetchError> {
        let end = Utc::now();
        let begin = end - ChronoDuration::days(recency.days(self.default_days));
        let end_de = end.format("%Y%m%d").to_string();
        let bgn_de = begin.format("%Y%m%d").to_string();

        let mut params: Vec<(&str, &str)> = vec![
            ("crtfc_key", self.api_key.as_str()),
            ("corp_code", query),
            ("bgn_de", bgn_de.as_str()),
            ("end_de", end_de.as_str()),
        ];
        if let Some(ty) = &self.disclosure_type {
            params.push(("pblntf_ty", ty.as_str()));
        }

        // errors must not carry the key-bearing url
        let resp: ListResponse = self
            .http
            .get(&self.url)
            .query(&params)
            .send()
            .await
            .map_err(|e| e.without_url())?
            .error_for_status()
            .map_err(|e| e.without_url())?
            .json()
            .await
            .map_err(|e| e.without_url())?;

        let items = self.into_items(resp)?;
        tracing::debug!(target: "fetch", adapter = "dart", corp_code = query, hits = items.len(), "disclosures listed");
        Ok(items)
    }

    fn name(&self) -> &'static str {
        "dart"
    }
}
