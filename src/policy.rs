//! # Decision policy
//! Pure functions mapping a signal to an [`ActionIntent`]. No I/O and no
//! hidden state: the same input always yields the same intent.
//!
//! * Informational: notify iff the verdict is relevant and its confidence is
//!   strictly above the configured threshold.
//! * Threshold ladder: tiers ordered most-severe first; the **first** tier with
//!   `change_pct <= threshold` wins. Not the closest tier, the first one.

use thiserror::Error;

use crate::types::{ActionIntent, Tier, Verdict};

/// Informational policy.
pub fn informational(verdict: &Verdict, threshold: u8) -> ActionIntent {
    if verdict.relevant && verdict.confidence > threshold {
        ActionIntent::notify(format!(
            "relevant with confidence {}% (> {}%)",
            verdict.confidence, threshold
        ))
    } else if verdict.relevant {
        ActionIntent::none(format!(
            "relevant but confidence {}% <= {}%",
            verdict.confidence, threshold
        ))
    } else {
        ActionIntent::none("not relevant")
    }
}

/// Digest policy: any usable summary over at least one item is sent.
pub fn digest(verdict: &Verdict, item_count: usize) -> ActionIntent {
    if verdict.fallback {
        ActionIntent::none("digest unavailable")
    } else if item_count == 0 || verdict.summary.trim().is_empty() {
        ActionIntent::none("nothing to report")
    } else {
        ActionIntent::notify(format!("digest over {item_count} items"))
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum LadderError {
    #[error("ladder has no tiers")]
    Empty,
    #[error("tier `{label}` has non-finite threshold or amount")]
    NotFinite { label: String },
    #[error("tier `{label}` has non-positive amount {amount}")]
    NonPositiveAmount { label: String, amount: f64 },
    #[error("tier `{label}` ({threshold}) is not less severe than the tier before it ({previous})")]
    Misordered {
        label: String,
        threshold: f64,
        previous: f64,
    },
}

/// Ordered, first-match-wins threshold rules.
#[derive(Debug, Clone, PartialEq)]
pub struct TierLadder {
    tiers: Vec<Tier>,
}

impl TierLadder {
    /// Tiers must be given most-severe first, i.e. with strictly increasing
    /// thresholds. A misordered ladder is rejected, not re-sorted.
    pub fn new(tiers: Vec<Tier>) -> Result<Self, LadderError> {
        if tiers.is_empty() {
            return Err(LadderError::Empty);
        }
        let mut previous: Option<f64> = None;
        for t in &tiers {
            if !t.threshold.is_finite() || !t.amount.is_finite() {
                return Err(LadderError::NotFinite {
                    label: t.label.clone(),
                });
            }
            if t.amount <= 0.0 {
                return Err(LadderError::NonPositiveAmount {
                    label: t.label.clone(),
                    amount: t.amount,
                });
            }
            if let Some(prev) = previous {
                if t.threshold <= prev {
                    return Err(LadderError::Misordered {
                        label: t.label.clone(),
                        threshold: t.threshold,
                        previous: prev,
                    });
                }
            }
            previous = Some(t.threshold);
        }
        Ok(Self { tiers })
    }

    /// First tier in severity order with `change_pct <= threshold` (inclusive).
    pub fn select(&self, change_pct: f64) -> Option<&Tier> {
        if change_pct.is_nan() {
            return None;
        }
        self.tiers.iter().find(|t| change_pct <= t.threshold)
    }

    pub fn decide(&self, change_pct: f64) -> ActionIntent {
        match self.select(change_pct) {
            Some(t) => ActionIntent::transact(
                t.amount,
                format!("{} (change {:.2}% <= {}%)", t.label, change_pct, t.threshold),
            ),
            None => ActionIntent::none(format!(
                "change {:.2}%: no tier reached, holding",
                change_pct
            )),
        }
    }
}
