//! types.rs: shared data model: items, verdicts, intents, guard results and
//! the records persisted for the dashboard.

use serde::{Deserialize, Serialize};

/// A candidate unit of information returned by a fetch adapter.
/// `id` is the dedup key and must be stable within one monitoring domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub snippet: String,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub date: String,
}

impl Item {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            snippet: String::new(),
            source: String::new(),
            date: String::new(),
        }
    }

    pub fn snippet(mut self, snippet: impl Into<String>) -> Self {
        self.snippet = snippet.into();
        self
    }

    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    pub fn date(mut self, date: impl Into<String>) -> Self {
        self.date = date.into();
        self
    }

    /// One line of model context: `title - snippet (source, date)`.
    pub fn context_line(&self) -> String {
        let mut line = self.title.clone();
        if !self.snippet.is_empty() {
            line.push_str(" - ");
            line.push_str(&self.snippet);
        }
        let meta: Vec<&str> = [self.source.as_str(), self.date.as_str()]
            .into_iter()
            .filter(|s| !s.is_empty())
            .collect();
        if !meta.is_empty() {
            line.push_str(&format!(" ({})", meta.join(", ")));
        }
        line
    }
}

/// Structured output of an analysis adapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    pub relevant: bool,
    pub summary: String,
    /// Percentage, always within 0..=100.
    pub confidence: u8,
    /// Optional headline, e.g. the title of a newly announced book.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Set only on the fallback produced when the upstream output was unusable.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub fallback: bool,
}

impl Verdict {
    pub fn new(relevant: bool, summary: impl Into<String>, confidence: f64) -> Self {
        Self {
            relevant,
            summary: summary.into(),
            confidence: clamp_confidence(confidence),
            title: None,
            fallback: false,
        }
    }

    /// Non-relevant verdict carrying the reason the analysis was unusable.
    pub fn fallback(reason: impl std::fmt::Display) -> Self {
        let mut summary = format!("analysis unavailable: {reason}");
        if summary.trim_end().ends_with(':') {
            summary.push_str(" unknown error");
        }
        Self {
            relevant: false,
            summary,
            confidence: 0,
            title: None,
            fallback: true,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        let t = title.into();
        self.title = if t.trim().is_empty() { None } else { Some(t) };
        self
    }
}

/// Clamp a raw confidence into the 0..=100 percentage range. NaN maps to 0.
pub fn clamp_confidence(raw: f64) -> u8 {
    if raw.is_nan() {
        0
    } else {
        raw.clamp(0.0, 100.0).round() as u8
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentKind {
    None,
    Notify,
    Transact,
}

/// What the decision policy wants the cycle to do.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionIntent {
    pub kind: IntentKind,
    /// Resource requirement of a `Transact` intent (e.g. KRW to spend).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<f64>,
    pub rationale: String,
}

impl ActionIntent {
    pub fn none(rationale: impl Into<String>) -> Self {
        Self {
            kind: IntentKind::None,
            amount: None,
            rationale: rationale.into(),
        }
    }

    pub fn notify(rationale: impl Into<String>) -> Self {
        Self {
            kind: IntentKind::Notify,
            amount: None,
            rationale: rationale.into(),
        }
    }

    pub fn transact(amount: f64, rationale: impl Into<String>) -> Self {
        Self {
            kind: IntentKind::Transact,
            amount: Some(amount),
            rationale: rationale.into(),
        }
    }
}

/// One rule of a threshold ladder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tier {
    /// Change percentage at or below which the tier fires (e.g. `-3.0`).
    pub threshold: f64,
    pub amount: f64,
    pub label: String,
}

impl Tier {
    pub fn new(threshold: f64, amount: f64, label: impl Into<String>) -> Self {
        Self {
            threshold,
            amount,
            label: label.into(),
        }
    }
}

/// Outcome of a precondition check. No side effects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuardResult {
    pub ok: bool,
    pub reason: String,
}

impl GuardResult {
    pub fn pass(reason: impl Into<String>) -> Self {
        Self {
            ok: true,
            reason: reason.into(),
        }
    }

    pub fn reject(reason: impl Into<String>) -> Self {
        Self {
            ok: false,
            reason: reason.into(),
        }
    }
}

/// One history entry, appended after every cycle that reached persistence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleRecord {
    /// RFC 3339 UTC.
    pub date: String,
    pub items: Vec<Item>,
    pub analysis: String,
}

impl CycleRecord {
    pub fn now(items: Vec<Item>, analysis: impl Into<String>) -> Self {
        Self {
            date: now_rfc3339(),
            items,
            analysis: analysis.into(),
        }
    }
}

/// Mirror of the latest record for fast dashboard reads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LatestReport {
    pub date: String,
    pub content: String,
}

impl From<&CycleRecord> for LatestReport {
    fn from(r: &CycleRecord) -> Self {
        Self {
            date: r.date.clone(),
            content: r.analysis.clone(),
        }
    }
}

pub(crate) fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}
