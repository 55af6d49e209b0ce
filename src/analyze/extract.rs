//! Pulls `{period, revenue, op_income}` out of a results filing.

use std::sync::Arc;

use anyhow::Result;
use serde::Deserialize;

use super::{strip_fences, LlmProvider};
use crate::dataset::ResultEntry;
use crate::types::Item;

const DEFAULT_INSTRUCTIONS: &str = "The filing below may announce quarterly results. \
If it states revenue and operating income for a period, reply with JSON only, e.g. \
{\"period\": \"2025 4Q\", \"revenue\": 1285.7, \"op_income\": 528.3} (amounts in billions of KRW). \
If it does not, or you cannot tell, reply NONE.";

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawEntry {
    period: String,
    revenue: f64,
    op_income: f64,
}

/// `Ok(None)` for an explicit NONE; `Err` with the reason otherwise.
pub fn parse_entry(raw: &str) -> Result<Option<ResultEntry>, String> {
    let body = strip_fences(raw);
    if body.eq_ignore_ascii_case("none") {
        return Ok(None);
    }
    let (Some(start), Some(end)) = (body.find('{'), body.rfind('}')) else {
        return Err("no JSON object in model output".into());
    };
    if end < start {
        return Err("no JSON object in model output".into());
    }
    let e: RawEntry = serde_json::from_str(&body[start..=end]).map_err(|e| e.to_string())?;
    let period = e.period.trim();
    if period.is_empty() {
        return Err("empty period".into());
    }
    if !e.revenue.is_finite() || !e.op_income.is_finite() {
        return Err("non-finite amount".into());
    }
    Ok(Some(ResultEntry {
        period: period.to_string(),
        revenue: e.revenue,
        op_income: e.op_income,
    }))
}

pub struct ResultsExtractor {
    provider: Arc<dyn LlmProvider>,
    instructions: String,
}

impl ResultsExtractor {
    pub fn new(provider: Arc<dyn LlmProvider>) -> Self {
        Self {
            provider,
            instructions: DEFAULT_INSTRUCTIONS.to_string(),
        }
    }

    pub fn with_instructions(mut self, text: impl Into<String>) -> Self {
        self.instructions = text.into();
        self
    }

    /// Provider failures are errors so the caller can retry the filing.
    /// Output that names no usable period is `None`.
    pub async fn extract(&self, subject: &str, filing: &Item) -> Result<Option<ResultEntry>> {
        let prompt = format!(
            "{}\n\nCompany: {subject}\nFiling: {}",
            self.instructions.trim(),
            filing.context_line()
        );
        let raw = self.provider.complete(&prompt).await?;
        match parse_entry(&raw) {
            Ok(entry) => Ok(entry),
            Err(reason) => {
                tracing::warn!(target: "analyze", filing = %filing.id, %reason, "unusable results extraction");
                Ok(None)
            }
        }
    }
}
