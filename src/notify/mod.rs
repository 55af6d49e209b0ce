// src/notify/mod.rs
//! Notification fan-out. Every message is length-bounded once, then delivered
//! to every recipient of every configured channel. A failing channel is
//! logged and counted; it never stops the remaining deliveries nor the cycle.

pub mod antiflutter;
pub mod discord;
pub mod email;
pub mod slack;
pub mod telegram;

use std::borrow::Cow;
use std::sync::Arc;

use anyhow::Result;
use metrics::counter;

pub use discord::DiscordNotifier;
pub use email::EmailSender;
pub use slack::SlackNotifier;
pub use telegram::TelegramNotifier;

/// Messages longer than this many characters are truncated.
pub const MAX_MESSAGE_CHARS: usize = 4000;
/// Number of leading characters kept when truncating.
pub const TRUNCATE_KEEP_CHARS: usize = 3900;
/// Appended after the kept prefix of a truncated message.
pub const TRUNCATION_MARKER: &str = "\n\n...(truncated)";

/// Bound `text` to the channel limit. Counts Unicode scalar values, so
/// multi-byte text is never split inside a character.
pub fn truncate_message(text: &str) -> Cow<'_, str> {
    if text.chars().count() <= MAX_MESSAGE_CHARS {
        return Cow::Borrowed(text);
    }
    let mut out: String = text.chars().take(TRUNCATE_KEEP_CHARS).collect();
    out.push_str(TRUNCATION_MARKER);
    Cow::Owned(out)
}

/// A delivery channel (chat bot, webhook, mailbox).
#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    fn name(&self) -> &'static str;

    /// Recipients this channel fans out to (chat ids, or a single webhook).
    fn recipients(&self) -> Vec<String>;

    /// Deliver already-truncated `text` to one recipient.
    async fn deliver(&self, recipient: &str, text: &str) -> Result<()>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    pub delivered: usize,
    pub failed: usize,
}

#[derive(Clone, Default)]
pub struct Dispatcher {
    channels: Vec<Arc<dyn Notifier>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_channel(mut self, channel: Arc<dyn Notifier>) -> Self {
        self.channels.push(channel);
        self
    }

    /// Build every channel whose environment is configured.
    /// `extra_chat_ids` are added to the Telegram recipients.
    pub fn from_env(extra_chat_ids: &[String]) -> Self {
        let mut d = Self::new();
        if let Some(tg) = TelegramNotifier::from_env(extra_chat_ids) {
            d = d.with_channel(Arc::new(tg));
        }
        let slack = SlackNotifier::from_env();
        if slack.is_enabled() {
            d = d.with_channel(Arc::new(slack));
        }
        if let Some(discord) = DiscordNotifier::from_env() {
            d = d.with_channel(Arc::new(discord));
        }
        match EmailSender::from_env() {
            Ok(Some(mail)) => d = d.with_channel(Arc::new(mail)),
            Ok(None) => {}
            Err(e) => tracing::warn!(target: "notify", error = %e, "email channel disabled"),
        }
        if d.is_empty() {
            tracing::warn!(target: "notify", "no notification channel configured; messages only go to the log");
        }
        d
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn channel_names(&self) -> Vec<&'static str> {
        self.channels.iter().map(|c| c.name()).collect()
    }

    /// Truncate once, then fan out. Never fails.
    pub async fn send(&self, message: &str) -> DeliveryReport {
        let text = truncate_message(message);
        let mut report = DeliveryReport::default();

        for ch in &self.channels {
            for recipient in ch.recipients() {
                match ch.deliver(&recipient, &text).await {
                    Ok(()) => {
                        report.delivered += 1;
                        tracing::debug!(target: "notify", channel = ch.name(), "delivered");
                    }
                    Err(e) => {
                        report.failed += 1;
                        counter!("notify_failures_total", "channel" => ch.name()).increment(1);
                        tracing::warn!(
                            target: "notify",
                            channel = ch.name(),
                            recipient = %mask(&recipient),
                            error = %format!("{e:#}"),
                            "delivery failed"
                        );
                    }
                }
            }
        }

        if self.channels.is_empty() {
            tracing::info!(target: "notify", chars = text.chars().count(), "notification (no channel): {}", text);
        }
        report
    }
}

/// Keep only the last 4 chars of a recipient id for logs.
fn mask(recipient: &str) -> String {
    let n = recipient.chars().count();
    if n <= 4 {
        return "****".to_string();
    }
    let tail: String = recipient.chars().skip(n - 4).collect();
    format!("***{tail}")
}
