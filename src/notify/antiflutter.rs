// src/notify/antiflutter.rs
use chrono::{DateTime, Duration as ChronoDuration, Utc};

/// Cooldown gate for failure alerts so an outage does not flood the chat.
/// - First alert always allowed.
/// - Inside cooldown, alerts of the same kind are suppressed; a different kind passes.
/// - State is updated explicitly via `record_alert` after a send.
#[derive(Debug, Clone, Default)]
pub struct AntiFlutter {
    cooldown: ChronoDuration,
    last_alert_ts: Option<DateTime<Utc>>,
    last_kind: Option<&'static str>,
}

impl AntiFlutter {
    /// `cooldown_secs` < 0 is treated as 0 (no cooldown).
    pub fn new(cooldown_secs: i64) -> Self {
        let secs = cooldown_secs.max(0);
        Self {
            cooldown: ChronoDuration::seconds(secs),
            last_alert_ts: None,
            last_kind: None,
        }
    }

    /// Check if we may alert at `now` for `kind`. Does NOT mutate state.
    pub fn should_alert(&self, kind: &'static str, now: DateTime<Utc>) -> bool {
        match (self.last_alert_ts, self.last_kind) {
            (None, _) => true,
            (Some(ts), last) => {
                now.signed_duration_since(ts) >= self.cooldown || last != Some(kind)
            }
        }
    }

    pub fn record_alert(&mut self, kind: &'static str, now: DateTime<Utc>) {
        self.last_alert_ts = Some(now);
        self.last_kind = Some(kind);
    }

    /// Forget the last alert, e.g. after a successful cycle.
    pub fn reset(&mut self) {
        self.last_alert_ts = None;
        self.last_kind = None;
    }
}
