// src/analyze/mod.rs
//! Analysis boundary: turns fetched items into a [`Verdict`]. Never fails;
//! provider errors and malformed output become the fallback verdict.

pub mod ai_adapter;
pub mod extract;
pub mod verdict;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::types::{Item, Verdict};

pub use ai_adapter::{BudgetedProvider, GeminiProvider, LlmProvider, MockProvider, OpenAiProvider};
pub use extract::{parse_entry, ResultsExtractor};
pub use verdict::{parse_or_fallback, parse_verdict, strip_fences, AnalysisFormatError};

#[async_trait::async_trait]
pub trait AnalysisAdapter: Send + Sync {
    /// `context` describes what the bot is watching (e.g. an author name).
    async fn analyze(&self, context: &str, items: &[Item]) -> Verdict;
}

/// How the model output is interpreted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisMode {
    /// Strict JSON verdict.
    #[default]
    Verdict,
    /// Free-text report; any non-empty output is a relevant verdict.
    Digest,
}

pub struct LlmAnalyzer {
    provider: Arc<dyn LlmProvider>,
    mode: AnalysisMode,
    instructions: String,
}

impl LlmAnalyzer {
    pub fn new(provider: Arc<dyn LlmProvider>, mode: AnalysisMode) -> Self {
        Self {
            provider,
            mode,
            instructions: String::new(),
        }
    }

    /// Task description placed before the items, e.g. what counts as relevant.
    pub fn with_instructions(mut self, text: impl Into<String>) -> Self {
        self.instructions = text.into();
        self
    }

    pub fn mode(&self) -> AnalysisMode {
        self.mode
    }

    pub fn build_prompt(&self, context: &str, items: &[Item]) -> String {
        let mut p = String::new();
        if !self.instructions.trim().is_empty() {
            p.push_str(self.instructions.trim());
            p.push_str("\n\n");
        }
        p.push_str(&format!("Subject: {context}\n\nSearch results:\n"));
        for it in items {
            p.push_str("- ");
            p.push_str(&it.context_line());
            p.push('\n');
        }
        match self.mode {
            AnalysisMode::Verdict => p.push_str(
                "\nAnswer with JSON only, exactly this shape:\n\
                 {\"relevant\": true|false, \"title\": string|null, \
                 \"summary\": \"one or two sentences\", \"confidence\": 0-100}\n",
            ),
            AnalysisMode::Digest => p.push_str(
                "\nWrite a concise plain-text report of the most important points.\n",
            ),
        }
        p
    }
}

#[async_trait::async_trait]
impl AnalysisAdapter for LlmAnalyzer {
    async fn analyze(&self, context: &str, items: &[Item]) -> Verdict {
        if items.is_empty() {
            return Verdict::new(false, "no new items", 0.0);
        }
        let prompt = self.build_prompt(context, items);
        tracing::debug!(
            target: "analyze",
            provider = self.provider.name(),
            items = items.len(),
            prompt_chars = prompt.chars().count(),
            "calling llm"
        );

        let raw = match self.provider.complete(&prompt).await {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(target: "analyze", provider = self.provider.name(), error = %format!("{e:#}"), "llm call failed");
                return Verdict::fallback(e);
            }
        };

        match self.mode {
            AnalysisMode::Verdict => parse_or_fallback(&raw),
            AnalysisMode::Digest => {
                let text = strip_fences(&raw);
                if text.is_empty() {
                    Verdict::fallback(AnalysisFormatError::Empty)
                } else {
                    Verdict::new(true, text, 100.0)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Failing;

    #[async_trait::async_trait]
    impl LlmProvider for Failing {
        async fn complete(&self, _prompt: &str) -> anyhow::Result<String> {
            anyhow::bail!("quota exceeded")
        }
        fn name(&self) -> &'static str {
            "failing"
        }
    }

    fn items() -> Vec<Item> {
        vec![Item::new("https://a", "New novel announced").snippet("out in May")]
    }

    #[tokio::test]
    async fn verdict_mode_parses_output() {
        let mock = Arc::new(MockProvider::new(
            r#"{"relevant": true, "title": "Night Walk", "summary": "announced", "confidence": 85}"#,
        ));
        let a = LlmAnalyzer::new(mock.clone(), AnalysisMode::Verdict);
        let v = a.analyze("author: Han Kang", &items()).await;
        assert!(v.relevant);
        assert_eq!(v.confidence, 85);

        let prompts = mock.prompts();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("author: Han Kang"));
        assert!(prompts[0].contains("New novel announced - out in May"));
    }

    #[tokio::test]
    async fn provider_error_is_fallback() {
        let a = LlmAnalyzer::new(Arc::new(Failing), AnalysisMode::Verdict);
        let v = a.analyze("x", &items()).await;
        assert!(v.fallback);
        assert!(v.summary.contains("quota exceeded"));
    }

    #[tokio::test]
    async fn digest_mode_wraps_text() {
        let a = LlmAnalyzer::new(Arc::new(MockProvider::new("Weekly: 3 launches")), AnalysisMode::Digest);
        let v = a.analyze("biosimilars", &items()).await;
        assert!(v.relevant);
        assert_eq!(v.confidence, 100);
        assert_eq!(v.summary, "Weekly: 3 launches");
    }

    #[tokio::test]
    async fn no_items_skips_the_provider() {
        let mock = Arc::new(MockProvider::new("{}"));
        let a = LlmAnalyzer::new(mock.clone(), AnalysisMode::Verdict);
        let v = a.analyze("x", &[]).await;
        assert!(!v.relevant && !v.fallback);
        assert!(mock.prompts().is_empty());
    }
}
