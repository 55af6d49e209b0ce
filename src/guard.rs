//! Balance/precondition guard run before any irreversible action.

use std::sync::Arc;

use crate::market::BalanceSource;
use crate::types::GuardResult;

pub struct BalanceGuard {
    source: Arc<dyn BalanceSource>,
    currency: String,
}

impl BalanceGuard {
    pub fn new(source: Arc<dyn BalanceSource>, currency: impl Into<String>) -> Self {
        Self {
            source,
            currency: currency.into(),
        }
    }

    /// Query the available balance and compare against `required`.
    /// No balance at all counts as zero; a failed query rejects.
    pub async fn check(&self, required: f64) -> GuardResult {
        match self.source.available(&self.currency).await {
            Ok(available) => evaluate(available.unwrap_or(0.0), required, &self.currency),
            Err(e) => {
                tracing::warn!(target: "engine", currency = %self.currency, error = %e, "balance query failed");
                GuardResult::reject(format!("balance query failed: {e}"))
            }
        }
    }
}

/// Pure comparison: `available < required` rejects.
pub fn evaluate(available: f64, required: f64, currency: &str) -> GuardResult {
    if available < required {
        GuardResult::reject(format!(
            "insufficient {currency} balance (available: {} / required: {})",
            group_thousands(available),
            group_thousands(required)
        ))
    } else {
        GuardResult::pass(format!(
            "{currency} balance {} covers {}",
            group_thousands(available),
            group_thousands(required)
        ))
    }
}

/// `1234567.8` → `1,234,568`.
pub(crate) fn group_thousands(x: f64) -> String {
    let n = x.round() as i64;
    let digits = n.unsigned_abs().to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    if n < 0 {
        out.insert(0, '-');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FetchError;
    use async_trait::async_trait;

    struct Fixed(Result<Option<f64>, &'static str>);

    #[async_trait]
    impl BalanceSource for Fixed {
        async fn available(&self, _currency: &str) -> Result<Option<f64>, FetchError> {
            self.0
                .map_err(|e| FetchError::Unreachable(e.to_string()))
        }
    }

    #[test]
    fn short_balance_rejects_with_reason() {
        let r = evaluate(300_000.0, 500_000.0, "KRW");
        assert!(!r.ok);
        assert!(r.reason.contains("300,000"));
        assert!(r.reason.contains("500,000"));
    }

    #[test]
    fn equal_balance_passes() {
        assert!(evaluate(500_000.0, 500_000.0, "KRW").ok);
    }

    #[tokio::test]
    async fn missing_balance_counts_as_zero() {
        let g = BalanceGuard::new(Arc::new(Fixed(Ok(None))), "KRW");
        assert!(!g.check(1.0).await.ok);
    }

    #[tokio::test]
    async fn query_error_rejects() {
        let g = BalanceGuard::new(Arc::new(Fixed(Err("timeout"))), "KRW");
        let r = g.check(1.0).await;
        assert!(!r.ok);
        assert!(r.reason.contains("timeout"));
    }

    #[test]
    fn thousands_grouping() {
        assert_eq!(group_thousands(0.0), "0");
        assert_eq!(group_thousands(110_000.0), "110,000");
        assert_eq!(group_thousands(1_234_567.8), "1,234,568");
        assert_eq!(group_thousands(-5_000.0), "-5,000");
    }
}
