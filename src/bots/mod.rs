// src/bots/mod.rs
//! # Bots
//! A bot is one monitor → decide → act cycle. The scheduler drives it through
//! [`Cycle`]; the two shapes are [`InformationalBot`] (search, analyze,
//! notify) and [`TransactionalBot`] (quote, ladder, guard, order).
//!
//! One process per state directory: two instances pointed at the same seen
//! set or history file race on the atomic rename and lose updates.

pub mod informational;
pub mod transactional;

use std::path::PathBuf;

use crate::error::{CycleError, PersistenceError};
use crate::history::HistoryLog;
use crate::sync::SyncPublisher;
use crate::types::CycleRecord;

pub use informational::{InformationalBot, Watch};
pub use transactional::{TransactionalBot, TransactionalSettings};

/// What a finished cycle did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Nothing new, or nothing above threshold.
    Idle,
    /// At least one notification was dispatched.
    Notified,
    /// An order was filled.
    Executed,
    /// A precondition failed; the action was skipped and reported.
    Skipped,
}

impl CycleOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            CycleOutcome::Idle => "idle",
            CycleOutcome::Notified => "notified",
            CycleOutcome::Executed => "executed",
            CycleOutcome::Skipped => "skipped",
        }
    }
}

#[async_trait::async_trait]
pub trait Cycle: Send {
    fn name(&self) -> &str;
    async fn run_cycle(&mut self) -> Result<CycleOutcome, CycleError>;
}

/// History + optional publish step shared by both bot shapes.
pub struct Outputs {
    history: HistoryLog,
    sync: Option<SyncPublisher>,
    /// State files published alongside the history (e.g. the seen set).
    extra_files: Vec<PathBuf>,
}

impl Outputs {
    pub fn new(history: HistoryLog) -> Self {
        Self {
            history,
            sync: None,
            extra_files: Vec::new(),
        }
    }

    pub fn with_sync(mut self, sync: SyncPublisher) -> Self {
        self.sync = Some(sync);
        self
    }

    pub fn publish_also(mut self, path: impl Into<PathBuf>) -> Self {
        self.extra_files.push(path.into());
        self
    }

    pub fn history(&self) -> &HistoryLog {
        &self.history
    }

    /// Append to history, then publish. A publish failure is logged only.
    pub async fn persist_and_sync(&self, record: CycleRecord) -> Result<usize, CycleError> {
        let len = self.append(record)?;
        self.sync().await;
        Ok(len)
    }

    fn append(&self, record: CycleRecord) -> Result<usize, PersistenceError> {
        let len = self.history.append(record)?;
        tracing::debug!(target: "engine", path = %self.history.path().display(), len, "history appended");
        Ok(len)
    }

    pub async fn sync(&self) {
        let Some(sync) = &self.sync else {
            return;
        };
        let mut files = self.history.files();
        files.extend(self.extra_files.iter().cloned());
        if let Err(e) = sync.publish(&files).await {
            tracing::warn!(target: "sync", error = %e, "sync failed; local state is kept");
        }
    }
}
