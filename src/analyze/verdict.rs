//! Strict parsing of model output into a [`Verdict`].

use serde::Deserialize;
use thiserror::Error;

use crate::types::Verdict;

/// Model output did not match the verdict schema.
#[derive(Debug, Error)]
pub enum AnalysisFormatError {
    #[error("empty model output")]
    Empty,
    #[error("model output is not a verdict object: {0}")]
    Schema(#[from] serde_json::Error),
    #[error("confidence {0} is not a finite number")]
    Confidence(f64),
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawVerdict {
    relevant: bool,
    summary: String,
    confidence: f64,
    #[serde(default)]
    title: Option<String>,
}

/// Remove a surrounding ```json / ``` fence and trim whitespace.
pub fn strip_fences(raw: &str) -> &str {
    let mut s = raw.trim();
    if let Some(rest) = s.strip_prefix("```") {
        // language tag runs to the first newline
        s = match rest.split_once('\n') {
            Some((tag, body)) if !tag.trim_start().starts_with('{') => body,
            _ => rest,
        };
        s = s.trim_end();
        s = s.strip_suffix("```").unwrap_or(s);
    }
    s.trim()
}

pub fn parse_verdict(raw: &str) -> Result<Verdict, AnalysisFormatError> {
    let body = strip_fences(raw);
    if body.is_empty() {
        return Err(AnalysisFormatError::Empty);
    }
    let v: RawVerdict = serde_json::from_str(body)?;
    if !v.confidence.is_finite() {
        return Err(AnalysisFormatError::Confidence(v.confidence));
    }
    let verdict = Verdict::new(v.relevant, v.summary, v.confidence);
    Ok(match v.title.filter(|t| !t.trim().is_empty()) {
        Some(t) => verdict.with_title(t),
        None => verdict,
    })
}

/// Parse, or degrade to the fallback verdict with the parse error as reason.
pub fn parse_or_fallback(raw: &str) -> Verdict {
    parse_verdict(raw).unwrap_or_else(|e| {
        tracing::warn!(target: "analyze", error = %e, "unparseable verdict");
        Verdict::fallback(e.to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fences_are_stripped() {
        assert_eq!(strip_fences("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_fences("```{\"a\":1}```"), "{\"a\":1}");
        assert_eq!(strip_fences("  {\"a\":1} "), "{\"a\":1}");
    }

    #[test]
    fn fenced_verdict_parses_and_clamps() {
        let raw = "```json\n{\"relevant\": true, \"title\": \"Night Walk\", \"summary\": \"new novel\", \"confidence\": 140}\n```";
        let v = parse_verdict(raw).unwrap();
        assert!(v.relevant);
        assert_eq!(v.confidence, 100);
        assert_eq!(v.title.as_deref(), Some("Night Walk"));
        assert!(!v.fallback);
    }

    #[test]
    fn missing_field_is_a_format_error() {
        let err = parse_verdict("{\"relevant\": true, \"summary\": \"x\"}").unwrap_err();
        assert!(matches!(err, AnalysisFormatError::Schema(_)));
    }

    #[test]
    fn prose_falls_back() {
        let v = parse_or_fallback("Sure! Here is the analysis you asked for.");
        assert!(v.fallback);
        assert!(!v.relevant);
        assert!(v.summary.starts_with("analysis unavailable"));
    }

    #[test]
    fn blank_title_is_dropped() {
        let v = parse_verdict("{\"relevant\":false,\"summary\":\"-\",\"confidence\":10,\"title\":\" \"}")
            .unwrap();
        assert!(v.title.is_none());
    }
}
