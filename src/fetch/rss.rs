use anyhow::Context;
use metrics::histogram;
use quick_xml::de::from_str;
use serde::Deserialize;
use time::{format_description::well_known::Rfc2822, OffsetDateTime, UtcOffset};

use super::{normalize_text, FetchAdapter, Recency};
use crate::error::FetchError;
use crate::types::Item;

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(default)]
    title: Option<String>,
    #[serde(rename = "item", default)]
    item: Vec<RssItem>,
}

#[derive(Debug, Deserialize)]
struct RssItem {
    title: Option<String>,
    link: Option<String>,
    guid: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    description: Option<String>,
}

fn parse_rfc2822(ts: &str) -> Option<OffsetDateTime> {
    OffsetDateTime::parse(ts.trim(), &Rfc2822)
        .ok()
        .map(|dt| dt.to_offset(UtcOffset::UTC))
}

/// Generic RSS 2.0 feed. The query is a case-insensitive keyword filter on
/// title + description; empty or `*` keeps everything. Items are keyed by
/// `guid`, falling back to `link`.
pub struct RssFetcher {
    url: String,
    client: reqwest::Client,
}

impl RssFetcher {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            client: reqwest::Client::new(),
        }
    }

    fn parse_items(xml: &str, query: &str, recency: Recency, now: OffsetDateTime) -> anyhow::Result<Vec<Item>> {
        let t0 = std::time::Instant::now();
        let rss: Rss = from_str(&scrub_html_entities_for_xml(xml)).context("parsing rss xml")?;
        let feed = rss.channel.title.unwrap_or_default();
        let needle = query.trim().to_lowercase();
        let max_age = match recency {
            Recency::Any => None,
            r => Some(time::Duration::days(r.days(0))),
        };

        let mut out = Vec::with_capacity(rss.channel.item.len());
        for it in rss.channel.item {
            let Some(id) = it.guid.clone().or_else(|| it.link.clone()) else {
                continue;
            };
            let title = normalize_text(it.title.as_deref().unwrap_or_default());
            let snippet = normalize_text(it.description.as_deref().unwrap_or_default());
            if title.is_empty() && snippet.is_empty() {
                continue;
            }
            if !needle.is_empty()
                && needle != "*"
                && !title.to_lowercase().contains(&needle)
                && !snippet.to_lowercase().contains(&needle)
            {
                continue;
            }
            let published = it.pub_date.as_deref().and_then(parse_rfc2822);
            if let (Some(age), Some(p)) = (max_age, published) {
                if now - p > age {
                    continue;
                }
            }
            out.push(
                Item::new(id, title)
                    .snippet(snippet)
                    .source(feed.clone())
                    .date(it.pub_date.unwrap_or_default()),
            );
        }

        histogram!("fetch_parse_ms", "adapter" => "rss").record(t0.elapsed().as_secs_f64() * 1_000.0);
        Ok(out)
    }
}

#[async_trait::async_trait]
impl FetchAdapter for RssFetcher {
    async fn fetch(&self, query: &str, recency: Recency) -> Result<Vec<Item>, FetchError> {
        let body = self
            .client
            .get(&self.url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        Self::parse_items(&body, query, recency, OffsetDateTime::now_utc())
            .map_err(|e| FetchError::InvalidResponse(format!("{e:#}")))
    }

    fn name(&self) -> &'static str {
        "rss"
    }
}

fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
}

#[cfg(test)]
mod tests {
    use super::*;

    const FEED: &str = r#"<?xml version="1.0"?>
<rss version="2.0"><channel><title>Pharma Wire</title>
<item><title>Biosimilar approved&nbsp;in EU</title><link>https://p/1</link>
<pubDate>Mon, 01 Sep 2025 08:00:00 +0000</pubDate><description>&lt;p&gt;First approval&lt;/p&gt;</description></item>
<item><title>Quarterly earnings</title><guid>g-2</guid><link>https://p/2</link>
<pubDate>Fri, 01 Aug 2025 08:00:00 +0000</pubDate><description>Revenue up</description></item>
<item><title>No id</title></item>
</channel></rss>"#;

    fn now() -> OffsetDateTime {
        parse_rfc2822("Wed, 03 Sep 2025 08:00:00 +0000").unwrap()
    }

    #[test]
    fn parses_and_keys_by_guid_or_link() {
        let items = RssFetcher::parse_items(FEED, "", Recency::Any, now()).unwrap();
        let ids: Vec<_> = items.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, ["https://p/1", "g-2"]);
        assert_eq!(items[0].title, "Biosimilar approved in EU");
        assert_eq!(items[0].snippet, "First approval");
        assert_eq!(items[0].source, "Pharma Wire");
    }

    #[test]
    fn keyword_and_recency_filters() {
        let kw = RssFetcher::parse_items(FEED, "EARNINGS", Recency::Any, now()).unwrap();
        assert_eq!(kw.len(), 1);
        let week = RssFetcher::parse_items(FEED, "*", Recency::Week, now()).unwrap();
        assert_eq!(week.len(), 1);
        assert_eq!(week[0].id, "https://p/1");
    }

    #[test]
    fn garbage_is_an_error() {
        assert!(RssFetcher::parse_items("not xml", "", Recency::Any, now()).is_err());
    }
}
