// src/sync.rs
//! Publishes changed state files to a remote (git) so the dashboard sees
//! them. Content fingerprints recorded after each successful publish make
//! an unchanged cycle a no-op.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use metrics::counter;
use sha2::{Digest, Sha256};
use tokio::process::Command;

use crate::error::{PersistenceError, SyncError};
use crate::state::{read_json_or_default, write_json_atomic};

/// Moves a set of changed files to the remote.
#[async_trait::async_trait]
pub trait SyncTransport: Send + Sync {
    /// Returns `false` when there was nothing to propagate.
    async fn propagate(&self, paths: &[PathBuf], message: &str) -> Result<bool, SyncError>;
    fn name(&self) -> &'static str;
}

/// `git add` / `status --porcelain` / `commit` / `push`.
#[derive(Debug, Clone)]
pub struct GitTransport {
    repo_dir: Option<PathBuf>,
    remote: String,
    refspec: String,
}

impl GitTransport {
    pub fn new(remote: impl Into<String>, refspec: impl Into<String>) -> Self {
        Self {
            repo_dir: None,
            remote: remote.into(),
            refspec: refspec.into(),
        }
    }

    pub fn in_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.repo_dir = Some(dir.into());
        self
    }

    /// Git runs inside `repo_dir`, so relative state paths (resolved against
    /// the process working directory) are made absolute first.
    fn pathspecs(&self, paths: &[PathBuf]) -> Result<Vec<String>, SyncError> {
        let cwd = match &self.repo_dir {
            Some(_) if paths.iter().any(|p| p.is_relative()) => {
                Some(std::env::current_dir().map_err(SyncError::WorkingDir)?)
            }
            _ => None,
        };
        Ok(paths
            .iter()
            .map(|p| match &cwd {
                Some(base) if p.is_relative() => base.join(p),
                _ => p.clone(),
            })
            .map(|p| p.display().to_string())
            .collect())
    }

    async fn git(&self, args: &[&str]) -> Result<String, SyncError> {
        let mut cmd = Command::new("git");
        cmd.args(args);
        if let Some(dir) = &self.repo_dir {
            cmd.current_dir(dir);
        }
        let out = cmd.output().await.map_err(SyncError::Spawn)?;
        if !out.status.success() {
            return Err(SyncError::Command {
                args: args.join(" "),
                stderr: String::from_utf8_lossy(&out.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&out.stdout).into_owned())
    }
}

impl Default for GitTransport {
    fn default() -> Self {
        Self::new("origin", "main")
    }
}

#[async_trait::async_trait]
impl SyncTransport for GitTransport {
    async fn propagate(&self, paths: &[PathBuf], message: &str) -> Result<bool, SyncError> {
        let path_strs = self.pathspecs(paths)?;
        let mut add: Vec<&str> = vec!["add", "--"];
        add.extend(path_strs.iter().map(String::as_str));
        self.git(&add).await?;

        let status = self.git(&["status", "--porcelain"]).await?;
        if status.trim().is_empty() {
            tracing::info!(target: "sync", "working tree clean; nothing to push");
            return Ok(false);
        }

        self.git(&["commit", "-m", message]).await?;
        self.git(&["push", &self.remote, &self.refspec]).await?;
        Ok(true)
    }

    fn name(&self) -> &'static str {
        "git"
    }
}

/// Accepts everything and pushes nowhere.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTransport;

#[async_trait::async_trait]
impl SyncTransport for NoopTransport {
    async fn propagate(&self, _paths: &[PathBuf], _message: &str) -> Result<bool, SyncError> {
        Ok(true)
    }

    fn name(&self) -> &'static str {
        "noop"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStatus {
    /// Every file matches its last published fingerprint.
    Unchanged,
    /// Changed files were handed to the transport.
    Published,
}

type Fingerprints = BTreeMap<String, String>;

pub struct SyncPublisher {
    transport: Arc<dyn SyncTransport>,
    fingerprint_path: PathBuf,
    label: String,
}

impl SyncPublisher {
    /// `label` names the bot in commit messages.
    pub fn new(
        transport: Arc<dyn SyncTransport>,
        fingerprint_path: impl Into<PathBuf>,
        label: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            fingerprint_path: fingerprint_path.into(),
            label: label.into(),
        }
    }

    pub fn fingerprint_path(&self) -> &Path {
        &self.fingerprint_path
    }

    /// Paths whose content differs from the last successful publish.
    /// Missing files are ignored.
    pub fn diff(&self, paths: &[PathBuf]) -> Result<Vec<PathBuf>, SyncError> {
        let known: Fingerprints = read_json_or_default(&self.fingerprint_path)?;
        let current = fingerprint_all(paths)?;
        Ok(changed(&known, &current))
    }

    pub async fn publish(&self, paths: &[PathBuf]) -> Result<SyncStatus, SyncError> {
        let mut known: Fingerprints = read_json_or_default(&self.fingerprint_path)?;
        let current = fingerprint_all(paths)?;
        let changed = changed(&known, &current);
        if changed.is_empty() {
            tracing::debug!(target: "sync", bot = %self.label, "no content change; skipping publish");
            return Ok(SyncStatus::Unchanged);
        }

        let message = format!(
            "Auto-update {}: {}",
            self.label,
            chrono::Utc::now().format("%Y-%m-%d %H:%M:%S")
        );
        match self.transport.propagate(&changed, &message).await {
            Ok(pushed) => {
                counter!("sync_events_total", "result" => "ok").increment(1);
                tracing::info!(
                    target: "sync",
                    bot = %self.label,
                    transport = self.transport.name(),
                    files = changed.len(),
                    pushed,
                    "published"
                );
            }
            Err(e) => {
                counter!("sync_events_total", "result" => "error").increment(1);
                tracing::warn!(target: "sync", bot = %self.label, error = %e, "publish failed");
                return Err(e);
            }
        }

        for (path, hash) in current {
            known.insert(path.display().to_string(), hash);
        }
        write_json_atomic(&self.fingerprint_path, &known)?;
        Ok(SyncStatus::Published)
    }
}

fn fingerprint_all(paths: &[PathBuf]) -> Result<Vec<(PathBuf, String)>, PersistenceError> {
    let mut out = Vec::with_capacity(paths.len());
    for p in paths {
        match std::fs::read(p) {
            Ok(bytes) => out.push((p.clone(), hex::encode(Sha256::digest(&bytes)))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(source) => {
                return Err(PersistenceError::Io {
                    path: p.clone(),
                    source,
                })
            }
        }
    }
    Ok(out)
}

fn changed(known: &Fingerprints, current: &[(PathBuf, String)]) -> Vec<PathBuf> {
    current
        .iter()
        .filter(|(p, h)| known.get(&p.display().to_string()) != Some(h))
        .map(|(p, _)| p.clone())
        .collect()
}
