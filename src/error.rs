//! Error taxonomy crossing adapter boundaries into the engine.
//!
//! Adapters use `anyhow` internally and convert to one of these enums before
//! returning. Analysis problems never appear here: they become a fallback
//! `Verdict` at the analysis boundary. A guard rejection is an outcome, not an
//! error.

use std::path::PathBuf;

use thiserror::Error;

/// Upstream search / price / disclosure service failed. The cycle aborts
/// before mutating any state and the next scheduled cycle retries.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("upstream unreachable: {0}")]
    Unreachable(String),

    #[error("rate limited by upstream: {0}")]
    RateLimited(String),

    #[error("unexpected upstream response: {0}")]
    InvalidResponse(String),

    #[error("adapter not configured: {0}")]
    NotConfigured(String),
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.status() == Some(reqwest::StatusCode::TOO_MANY_REQUESTS) {
            FetchError::RateLimited(err.to_string())
        } else if err.is_decode() || err.is_status() {
            FetchError::InvalidResponse(err.to_string())
        } else {
            FetchError::Unreachable(err.to_string())
        }
    }
}

/// The action executor failed. Never retried inside the same cycle.
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("order rejected: {0}")]
    Rejected(String),

    #[error("executor transport failure: {0}")]
    Transport(String),
}

/// Local durable state could not be read or written. Fatal to the cycle.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("i/o on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("corrupt state file {path}: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("serializing {path}: {source}")]
    Serialize {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Remote publish failed. Logged, never fatal: local data is already durable.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("cannot spawn git: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("`git {args}` failed: {stderr}")]
    Command { args: String, stderr: String },

    #[error("cannot resolve working directory: {0}")]
    WorkingDir(#[source] std::io::Error),

    #[error(transparent)]
    Fingerprint(#[from] PersistenceError),
}

/// Configuration could not be loaded or is inconsistent.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("reading {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parsing {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("bot `{bot}`: {reason}")]
    Invalid { bot: String, reason: String },

    #[error("missing env var {0}")]
    MissingEnv(String),

    #[error("unknown bot `{0}`")]
    UnknownBot(String),
}

impl ConfigError {
    pub fn invalid(bot: impl Into<String>, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            bot: bot.into(),
            reason: reason.into(),
        }
    }
}

/// Everything a cycle body may fail with. Caught by the scheduler.
#[derive(Debug, Error)]
pub enum CycleError {
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("execution failed: {0}")]
    Execution(#[from] ExecutionError),

    #[error("persistence failed: {0}")]
    Persistence(#[from] PersistenceError),
}

impl CycleError {
    /// Short tag used as a metrics label.
    pub fn kind(&self) -> &'static str {
        match self {
            CycleError::Fetch(_) => "fetch",
            CycleError::Execution(_) => "execution",
            CycleError::Persistence(_) => "persistence",
        }
    }

    /// The cycle already sent its own message for this failure, so the
    /// scheduler does not alert again. Order failures carry amount and tier.
    pub fn already_reported(&self) -> bool {
        matches!(self, CycleError::Execution(_))
    }
}
