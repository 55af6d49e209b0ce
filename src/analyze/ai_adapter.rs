//! LLM providers: Gemini, OpenAI chat completions, a fixed mock, and a
//! wrapper that enforces a persisted daily call budget.

use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::state::{read_json_or_default, write_json_atomic};

const GEMINI_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
const OPENAI_URL: &str = "https://api.openai.com/v1/chat/completions";

/// A text-completion backend. Errors are opaque; the analysis boundary
/// turns them into fallback verdicts.
#[async_trait::async_trait]
pub trait LlmProvider: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String>;
    fn name(&self) -> &'static str;
}

fn http_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(concat!("monitor-engine/", env!("CARGO_PKG_VERSION")))
        .connect_timeout(Duration::from_secs(5))
        .timeout(Duration::from_secs(60))
        .build()
        .context("build http client")
}

// ------------------------------------------------------------
// Gemini
// ------------------------------------------------------------

pub struct GeminiProvider {
    http: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl GeminiProvider {
    pub fn new(api_key: String, model: Option<&str>) -> Result<Self> {
        Ok(Self {
            http: http_client()?,
            api_key,
            model: model.unwrap_or("gemini-2.0-flash").to_string(),
            base_url: GEMINI_BASE.to_string(),
        })
    }

    pub fn with_base_url(mut self, base: impl Into<String>) -> Self {
        self.base_url = base.into().trim_end_matches('/').to_string();
        self
    }
}

#[derive(Serialize)]
struct GeminiPart<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct GeminiContent<'a> {
    parts: Vec<GeminiPart<'a>>,
}

#[derive(Serialize)]
struct GeminiRequest<'a> {
    contents: Vec<GeminiContent<'a>>,
}

#[derive(Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Deserialize)]
struct GeminiCandidate {
    content: GeminiCandidateContent,
}

#[derive(Deserialize)]
struct GeminiCandidateContent {
    #[serde(default)]
    parts: Vec<GeminiTextPart>,
}

#[derive(Deserialize)]
struct GeminiTextPart {
    #[serde(default)]
    text: String,
}

impl GeminiResponse {
    fn text(self) -> Option<String> {
        let cand = self.candidates.into_iter().next()?;
        let joined: String = cand.content.parts.into_iter().map(|p| p.text).collect();
        (!joined.trim().is_empty()).then_some(joined)
    }
}

#[async_trait::async_trait]
impl LlmProvider for GeminiProvider {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
        let req = GeminiRequest {
            contents: vec![GeminiContent {
                parts: vec![GeminiPart { text: prompt }],
            }],
        };
        let resp: GeminiResponse = self
            .http
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&req)
            .send()
            .await
            .context("gemini request")?
            .error_for_status()
            .context("gemini non-2xx")?
            .json()
            .await
            .context("gemini decode")?;
        resp.text().ok_or_else(|| anyhow!("gemini returned no text"))
    }

    fn name(&self) -> &'static str {
        "gemini"
    }
}

// ------------------------------------------------------------
// OpenAI
// ------------------------------------------------------------

pub struct OpenAiProvider {
    http: reqwest::Client,
    api_key: String,
    model: String,
}

impl OpenAiProvider {
    /// Defaults to gpt-4o-mini.
    pub fn new(api_key: String, model: Option<&str>) -> Result<Self> {
        Ok(Self {
            http: http_client()?,
            api_key,
            model: model.unwrap_or("gpt-4o-mini").to_string(),
        })
    }
}

#[async_trait::async_trait]
impl LlmProvider for OpenAiProvider {
    async fn complete(&self, prompt: &str) -> Result<String> {
        #[derive(Serialize)]
        struct Msg<'a> {
            role: &'a str,
            content: &'a str,
        }
        #[derive(Serialize)]
        struct Req<'a> {
            model: &'a str,
            messages: Vec<Msg<'a>>,
            temperature: f32,
        }
        #[derive(Deserialize)]
        struct Resp {
            choices: Vec<Choice>,
        }
        #[derive(Deserialize)]
        struct Choice {
            message: ChoiceMsg,
        }
        #[derive(Deserialize)]
        struct ChoiceMsg {
            #[serde(default)]
            content: Option<String>,
        }

        let req = Req {
            model: &self.model,
            messages: vec![Msg {
                role: "user",
                content: prompt,
            }],
            temperature: 0.2,
        };
        let body: Resp = self
            .http
            .post(OPENAI_URL)
            .bearer_auth(&self.api_key)
            .json(&req)
            .send()
            .await
            .context("openai request")?
            .error_for_status()
            .context("openai non-2xx")?
            .json()
            .await
            .context("openai decode")?;

        body.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| anyhow!("openai returned no content"))
    }

    fn name(&self) -> &'static str {
        "openai"
    }
}

// ------------------------------------------------------------
// Mock
// ------------------------------------------------------------

/// Returns the same text for every prompt and records the prompts it saw.
#[derive(Default)]
pub struct MockProvider {
    fixed: String,
    seen: Mutex<Vec<String>>,
}

impl MockProvider {
    pub fn new(fixed: impl Into<String>) -> Self {
        Self {
            fixed: fixed.into(),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.seen.lock().map(|g| g.clone()).unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl LlmProvider for MockProvider {
    async fn complete(&self, prompt: &str) -> Result<String> {
        if let Ok(mut g) = self.seen.lock() {
            g.push(prompt.to_string());
        }
        Ok(self.fixed.clone())
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

// ------------------------------------------------------------
// Daily budget
// ------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
struct DailyCounter {
    date: String,
    count: u32,
}

fn today() -> String {
    chrono::Utc::now().format("%Y-%m-%d").to_string()
}

/// Caps real provider calls per UTC day. The counter lives in a small JSON
/// file that is re-read before every call, so restarts do not reset it and
/// bot processes pointed at the same file draw from one budget.
pub struct BudgetedProvider<P> {
    inner: P,
    daily_limit: u32,
    counter_path: PathBuf,
    lock: Mutex<()>,
}

impl<P: LlmProvider> BudgetedProvider<P> {
    pub fn new(inner: P, daily_limit: u32, counter_path: impl Into<PathBuf>) -> Self {
        Self {
            inner,
            daily_limit,
            counter_path: counter_path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn used_today(&self) -> u32 {
        let c = self.load_counter();
        if c.date == today() {
            c.count
        } else {
            0
        }
    }

    fn load_counter(&self) -> DailyCounter {
        read_json_or_default(&self.counter_path).unwrap_or_else(|e| {
            tracing::warn!(target: "analyze", error = %e, "resetting llm call counter");
            DailyCounter::default()
        })
    }

    fn reserve(&self) -> Result<()> {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| anyhow!("llm counter poisoned"))?;
        let mut c = self.load_counter();
        let today = today();
        if c.date != today {
            c.date = today;
            c.count = 0;
        }
        if c.count >= self.daily_limit {
            bail!("daily llm budget of {} calls exhausted", self.daily_limit);
        }
        c.count = c.count.saturating_add(1);
        if let Err(e) = write_json_atomic(&self.counter_path, &c) {
            tracing::warn!(target: "analyze", error = %e, "llm counter not persisted");
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl<P: LlmProvider> LlmProvider for BudgetedProvider<P> {
    async fn complete(&self, prompt: &str) -> Result<String> {
        self.reserve()?;
        self.inner.complete(prompt).await
    }

    fn name(&self) -> &'static str {
        self.inner.name()
    }
}
