//! Read-only repository state queries.
//!
//! All queries re-validate the configured path on every call; validity is
//! never cached across mutations. Queries may race a mutation; callers
//! accept transiently stale answers in that window.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::debug;

use crate::errors::DeployError;
use crate::oplog::OpLog;
use crate::runner::{CommandResult, CommandRunner};

/// Where HEAD currently points.
///
/// The two variants render distinguishably so a detached checkout can never
/// be mistaken for a branch named like a commit id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum HeadRef {
    Branch(String),
    Detached(String),
}

impl HeadRef {
    pub fn branch_name(&self) -> Option<&str> {
        match self {
            HeadRef::Branch(name) => Some(name),
            HeadRef::Detached(_) => None,
        }
    }
}

impl fmt::Display for HeadRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HeadRef::Branch(name) => write!(f, "{name}"),
            HeadRef::Detached(id) => write!(f, "(detached @ {id})"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RepoInspector {
    repo_path: PathBuf,
    runner: CommandRunner,
    oplog: Arc<OpLog>,
    timeout: Duration,
}

impl RepoInspector {
    pub fn new(repo_path: impl Into<PathBuf>, oplog: Arc<OpLog>, timeout: Duration) -> Self {
        Self {
            repo_path: repo_path.into(),
            runner: CommandRunner::new(),
            oplog,
            timeout,
        }
    }

    pub fn repo_path(&self) -> &Path {
        &self.repo_path
    }

    pub(crate) fn oplog(&self) -> &OpLog {
        &self.oplog
    }

    /// Check that the configured path exists and is a git repository.
    pub async fn validate(&self) -> Result<(), DeployError> {
        let path = self.repo_path.display().to_string();
        if !self.repo_path.is_dir() {
            return Err(DeployError::repository_invalid(
                path,
                "not an existing directory",
            ));
        }
        let result = self
            .runner
            .run(&["git", "rev-parse", "--git-dir"], &self.repo_path, self.timeout)
            .await;
        if result.success {
            Ok(())
        } else {
            Err(DeployError::repository_invalid(path, result.stderr))
        }
    }

    /// Run a git subcommand, log its outcome, and hand back the raw result
    /// whatever the exit status was.
    pub(crate) async fn git_raw(&self, args: &[&str]) -> Result<CommandResult, DeployError> {
        self.validate().await?;
        let mut argv: Vec<&str> = Vec::with_capacity(args.len() + 1);
        argv.push("git");
        argv.extend_from_slice(args);
        let result = self.runner.run(&argv, &self.repo_path, self.timeout).await;
        let context = format!("git {}", args.join(" "));
        if result.success {
            self.oplog
                .info(format!("{context}: ok ({}ms)", result.duration_ms));
        } else {
            self.oplog.error(format!(
                "{context}: {}: {}",
                result.status_label(),
                result.stderr
            ));
        }
        debug!(command = %context, status = %result.status_label(), "repository query");
        Ok(result)
    }

    /// Like [`git_raw`](Self::git_raw), but a non-zero exit becomes a typed
    /// `CommandFailed`, since inspector queries have no partial-success meaning.
    pub(crate) async fn git(&self, args: &[&str]) -> Result<CommandResult, DeployError> {
        let result = self.git_raw(args).await?;
        if result.success {
            Ok(result)
        } else if result.timed_out {
            Err(DeployError::Timeout {
                context: format!("git {}", args.join(" ")),
                timeout_ms: self.timeout.as_millis() as u64,
            })
        } else {
            Err(DeployError::command_failed(
                format!("git {}", args.join(" ")),
                result,
            ))
        }
    }

    /// Symbolic branch name, or the short commit id when HEAD is detached.
    pub async fn current_ref(&self) -> Result<HeadRef, DeployError> {
        let result = self.git(&["rev-parse", "--abbrev-ref", "HEAD"]).await?;
        if result.stdout != "HEAD" {
            return Ok(HeadRef::Branch(result.stdout));
        }
        let detached = self.git(&["rev-parse", "--short", "HEAD"]).await?;
        Ok(HeadRef::Detached(detached.stdout))
    }

    /// All local branch names in refname-sorted (deterministic) order.
    pub async fn list_branches(&self) -> Result<Vec<String>, DeployError> {
        let result = self
            .git(&["for-each-ref", "refs/heads", "--format=%(refname:short)"])
            .await?;
        Ok(non_empty_lines(&result.stdout))
    }

    pub async fn list_tags(&self) -> Result<Vec<String>, DeployError> {
        let result = self.git(&["tag", "--list"]).await?;
        Ok(non_empty_lines(&result.stdout))
    }

    /// The most recent `limit` one-line commit summaries, newest first.
    pub async fn recent_log(&self, limit: usize) -> Result<Vec<String>, DeployError> {
        let count = format!("-n{limit}");
        let result = self
            .git(&["log", "--oneline", "--decorate", &count])
            .await?;
        Ok(non_empty_lines(&result.stdout))
    }
}

fn non_empty_lines(output: &str) -> Vec<String> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}
