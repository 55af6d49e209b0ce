// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod error;
pub mod types;

// Durable local state
pub mod dataset;
pub mod history;
pub mod state;

// Adapters
pub mod analyze;
pub mod fetch;
pub mod market;
pub mod notify;
pub mod sync;

// Decision + precondition
pub mod guard;
pub mod policy;

// Cycle engine
pub mod bootstrap;
pub mod bots;
pub mod config;
pub mod metrics;
pub mod scheduler;

// ---- Re-exports for stable public API ----
pub use bots::{Cycle, CycleOutcome};
pub use error::{ConfigError, CycleError, ExecutionError, FetchError, PersistenceError, SyncError};
pub use scheduler::{RunMode, Scheduler};
pub use types::{ActionIntent, CycleRecord, GuardResult, IntentKind, Item, LatestReport, Tier, Verdict};
