//! Period-keyed results dataset (revenue and operating income per quarter),
//! one sorted series per watch. The dashboard charts this file.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::PersistenceError;
use crate::state::{read_json_or_default, write_json_atomic};

/// One reported period, amounts as the filing states them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultEntry {
    /// e.g. `2025 4Q`.
    pub period: String,
    pub revenue: f64,
    pub op_income: f64,
}

pub type Series = BTreeMap<String, Vec<ResultEntry>>;

#[derive(Debug, Clone)]
pub struct ResultsDataset {
    path: PathBuf,
}

impl ResultsDataset {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<Series, PersistenceError> {
        read_json_or_default(&self.path)
    }

    /// Adds `entry` to `series` unless its period is already stored.
    /// Returns whether the file changed.
    pub fn insert(&self, series: &str, entry: ResultEntry) -> Result<bool, PersistenceError> {
        let mut all = self.load()?;
        let rows = all.entry(series.to_string()).or_default();
        if rows.iter().any(|r| r.period == entry.period) {
            return Ok(false);
        }
        rows.push(entry);
        rows.sort_by(|a, b| a.period.cmp(&b.period));
        write_json_atomic(&self.path, &all)?;
        Ok(true)
    }
}
