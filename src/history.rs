//! history.rs: append-only cycle log plus the "latest report" mirror the
//! dashboard reads.

use std::path::{Path, PathBuf};

use crate::error::PersistenceError;
use crate::state::{read_json_or_default, write_json_atomic};
use crate::types::{CycleRecord, LatestReport};

#[derive(Debug, Clone)]
pub struct HistoryLog {
    path: PathBuf,
    latest_path: Option<PathBuf>,
}

impl HistoryLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            latest_path: None,
        }
    }

    /// Also rewrite `{date, content}` of the newest record at `path` on append.
    pub fn with_latest(mut self, path: impl Into<PathBuf>) -> Self {
        self.latest_path = Some(path.into());
        self
    }

    /// Load, push, rewrite atomically. Returns the new length.
    pub fn append(&self, record: CycleRecord) -> Result<usize, PersistenceError> {
        let mut all: Vec<CycleRecord> = read_json_or_default(&self.path)?;
        let latest = LatestReport::from(&record);
        all.push(record);
        write_json_atomic(&self.path, &all)?;

        if let Some(p) = &self.latest_path {
            write_json_atomic(p, &latest)?;
        }
        Ok(all.len())
    }

    pub fn load(&self) -> Result<Vec<CycleRecord>, PersistenceError> {
        read_json_or_default(&self.path)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Files this log writes; these are what the sync publisher propagates.
    pub fn files(&self) -> Vec<PathBuf> {
        let mut out = vec![self.path.clone()];
        out.extend(self.latest_path.clone());
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Item;

    #[test]
    fn append_preserves_order_and_writes_latest() {
        let dir = tempfile::tempdir().unwrap();
        let log = HistoryLog::new(dir.path().join("history.json"))
            .with_latest(dir.path().join("latest.json"));

        assert_eq!(log.append(CycleRecord::now(vec![], "first")).unwrap(), 1);
        assert_eq!(
            log.append(CycleRecord::now(vec![Item::new("a", "A")], "second"))
                .unwrap(),
            2
        );

        let all = log.load().unwrap();
        assert_eq!(all[0].analysis, "first");
        assert_eq!(all[1].analysis, "second");

        let latest: LatestReport = serde_json::from_str(
            &std::fs::read_to_string(dir.path().join("latest.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(latest.content, "second");
    }
}
