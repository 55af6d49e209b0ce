use anyhow::{Context, Result};
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;

use super::Notifier;

const API_BASE: &str = "https://api.telegram.org";

/// Telegram Bot API `sendMessage` channel fanning out to several chats.
#[derive(Clone)]
pub struct TelegramNotifier {
    token: String,
    chat_ids: Vec<String>,
    parse_mode: Option<String>,
    api_base: String,
    client: Client,
    timeout: Duration,
}

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    parse_mode: Option<&'a str>,
}

impl TelegramNotifier {
    pub fn new(token: String, chat_ids: Vec<String>) -> Self {
        Self {
            token,
            chat_ids,
            parse_mode: None,
            api_base: API_BASE.to_string(),
            client: Client::new(),
            timeout: Duration::from_secs(10),
        }
    }

    /// `TELEGRAM_TOKEN` + `MY_PRIVATE_CHAT_ID`, plus optional comma-separated
    /// `TELEGRAM_EXTRA_CHAT_IDS` and the bot's own extra ids.
    /// Returns `None` when the token or every chat id is missing.
    pub fn from_env(extra_chat_ids: &[String]) -> Option<Self> {
        let token = std::env::var("TELEGRAM_TOKEN").ok().filter(|t| !t.is_empty())?;

        let mut ids: Vec<String> = Vec::new();
        if let Ok(id) = std::env::var("MY_PRIVATE_CHAT_ID") {
            ids.push(id);
        }
        if let Ok(list) = std::env::var("TELEGRAM_EXTRA_CHAT_IDS") {
            ids.extend(list.split(',').map(str::to_string));
        }
        ids.extend(extra_chat_ids.iter().cloned());

        let mut seen = std::collections::HashSet::new();
        let ids: Vec<String> = ids
            .into_iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty() && seen.insert(s.clone()))
            .collect();

        if ids.is_empty() {
            tracing::debug!(target: "notify", "Telegram disabled (no chat id)");
            return None;
        }
        let mut n = Self::new(token, ids);
        if let Ok(mode) = std::env::var("TELEGRAM_PARSE_MODE") {
            n = n.with_parse_mode(mode);
        }
        Some(n)
    }

    /// `HTML` or `Markdown`; unset means plain text.
    pub fn with_parse_mode(mut self, mode: impl Into<String>) -> Self {
        let m = mode.into();
        self.parse_mode = if m.trim().is_empty() { None } else { Some(m) };
        self
    }

    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }
}

#[async_trait::async_trait]
impl Notifier for TelegramNotifier {
    fn name(&self) -> &'static str {
        "telegram"
    }

    fn recipients(&self) -> Vec<String> {
        self.chat_ids.clone()
    }

    async fn deliver(&self, recipient: &str, text: &str) -> Result<()> {
        let url = format!("{}/bot{}/sendMessage", self.api_base, self.token);
        let body = SendMessage {
            chat_id: recipient,
            text,
            parse_mode: self.parse_mode.as_deref(),
        };
        // reqwest errors carry the URL, which embeds the token
        self.client
            .post(&url)
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| e.without_url())
            .context("telegram sendMessage")?
            .error_for_status()
            .map_err(|e| e.without_url())
            .context("telegram non-2xx")?;
        Ok(())
    }
}
