//! Serialized repository mutations and restart coordination.
//!
//! Concurrent git mutations against one working tree corrupt it, so every
//! mutating operation on a repository handle runs under one async mutex.
//! Read queries do not take the lock and may observe transiently stale
//! state while a mutation is in flight.

use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use regex::Regex;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use crate::errors::DeployError;
use crate::oplog::OpLog;
use crate::repo::inspect::RepoInspector;
use crate::repo::stale::{StaleBranchScanner, StaleVerdict};
use crate::runner::{CommandResult, CommandRunner};

/// Ref names are passed to git as plain arguments, never through a shell,
/// and must additionally match this allow-list so option-looking or
/// garbage input is rejected before git sees it.
static REF_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._/@+-]*$").expect("valid ref pattern"));

/// Post-mutation restart configuration.
#[derive(Debug, Clone)]
pub struct RestartPolicy {
    /// Restart command for the main application; `None` = not configured.
    pub command: Option<String>,
    /// Restart the main application after a successful checkout.
    pub on_checkout: bool,
    /// Restart the main application after a successful pull.
    pub on_pull: bool,
    pub timeout: Duration,
}

impl Default for RestartPolicy {
    fn default() -> Self {
        Self {
            command: None,
            on_checkout: false,
            on_pull: false,
            timeout: Duration::from_secs(120),
        }
    }
}

/// Outcome of a restart attempt, reported independently of the git
/// operation that may have triggered it.
#[derive(Debug, Clone, Serialize)]
pub struct RestartOutcome {
    pub attempted: bool,
    pub result: Option<CommandResult>,
    pub skipped_reason: Option<String>,
}

impl RestartOutcome {
    fn skipped(reason: impl Into<String>) -> Self {
        Self {
            attempted: false,
            result: None,
            skipped_reason: Some(reason.into()),
        }
    }

    fn attempted(result: CommandResult) -> Self {
        Self {
            attempted: true,
            result: Some(result),
            skipped_reason: None,
        }
    }
}

/// A mutation's own command outcome plus the restart it optionally
/// triggered. A restart failure never overturns the mutation's success.
#[derive(Debug, Clone, Serialize)]
pub struct MutationOutcome {
    pub command: CommandResult,
    pub restart: Option<RestartOutcome>,
}

/// Per-branch result of a bulk deletion.
#[derive(Debug, Clone, Serialize)]
pub struct BranchDeletion {
    pub name: String,
    pub result: CommandResult,
}

pub struct MutationCoordinator {
    repo_path: PathBuf,
    inspector: RepoInspector,
    scanner: StaleBranchScanner,
    restart: RestartPolicy,
    runner: CommandRunner,
    oplog: Arc<OpLog>,
    // At most one fetch/checkout/pull/delete in flight per repository.
    mutation_lock: Mutex<()>,
}

impl MutationCoordinator {
    pub fn new(inspector: RepoInspector, restart: RestartPolicy, oplog: Arc<OpLog>) -> Self {
        Self {
            repo_path: inspector.repo_path().to_path_buf(),
            scanner: StaleBranchScanner::new(inspector.clone()),
            inspector,
            restart,
            runner: CommandRunner::new(),
            oplog,
            mutation_lock: Mutex::new(()),
        }
    }

    pub fn repo_path(&self) -> &Path {
        &self.repo_path
    }

    pub fn restart_configured(&self) -> bool {
        self.restart
            .command
            .as_deref()
            .is_some_and(|c| !c.trim().is_empty())
    }

    /// Update remote-tracking refs across all remotes, pruning refs whose
    /// remote branch is gone. Local branches and the working tree are
    /// untouched; pruning is what lets a later scan observe gone upstreams.
    pub async fn fetch_all(&self) -> Result<CommandResult, DeployError> {
        let _guard = self.mutation_lock.lock().await;
        let op = self.begin("fetch");
        let result = self
            .inspector
            .git_raw(&["fetch", "--all", "--prune"])
            .await?;
        self.finish(&op, "fetch", &result);
        Ok(result)
    }

    /// Switch the working tree to `reference` (branch, tag, or commit).
    ///
    /// A ref of the form `remotes/<remote>/<branch>` is checked out as a
    /// local tracking branch when no local branch of that simple name
    /// exists yet. On success the restart-on-checkout policy applies.
    pub async fn checkout(&self, reference: &str) -> Result<MutationOutcome, DeployError> {
        validate_ref(reference)?;
        let _guard = self.mutation_lock.lock().await;
        let op = self.begin("checkout");
        let result = self.checkout_inner(reference).await?;
        self.finish(&op, &format!("checkout '{reference}'"), &result);

        let restart = if result.success && self.restart.on_checkout {
            Some(self.run_restart("checkout").await)
        } else {
            None
        };
        Ok(MutationOutcome { command: result, restart })
    }

    async fn checkout_inner(&self, reference: &str) -> Result<CommandResult, DeployError> {
        if let Some(simple) = remote_ref_simple_name(reference) {
            let listing = self.inspector.git_raw(&["branch", "--list", simple]).await?;
            if listing.success && listing.stdout.trim().is_empty() {
                // No local branch of that name yet: create one tracking the
                // remote ref.
                return self
                    .inspector
                    .git_raw(&["checkout", "-b", simple, reference])
                    .await;
            }
        }
        self.inspector.git_raw(&["checkout", reference]).await
    }

    /// Update the current branch from its upstream. On success the
    /// restart-on-pull policy applies.
    pub async fn pull(&self) -> Result<MutationOutcome, DeployError> {
        let _guard = self.mutation_lock.lock().await;
        let op = self.begin("pull");
        let result = self.inspector.git_raw(&["pull"]).await?;
        self.finish(&op, "pull", &result);

        let restart = if result.success && self.restart.on_pull {
            Some(self.run_restart("pull").await)
        } else {
            None
        };
        Ok(MutationOutcome { command: result, restart })
    }

    /// Delete a local branch with git's non-force mode, so the tool's own
    /// not-fully-merged check remains the last line of defense.
    pub async fn delete_local_branch(&self, name: &str) -> Result<CommandResult, DeployError> {
        validate_ref(name)?;
        let _guard = self.mutation_lock.lock().await;
        self.delete_branch_locked(name).await
    }

    async fn delete_branch_locked(&self, name: &str) -> Result<CommandResult, DeployError> {
        let head = self.inspector.current_ref().await?;
        if head.branch_name() == Some(name) {
            self.oplog.error(format!(
                "refused to delete '{name}': branch is currently checked out"
            ));
            return Err(DeployError::InvalidArgument(format!(
                "cannot delete the currently checked-out branch '{name}'"
            )));
        }
        let result = self.inspector.git_raw(&["branch", "-d", name]).await?;
        if result.success {
            self.oplog.success(format!("deleted branch '{name}'"));
        } else {
            self.oplog.error(format!(
                "failed to delete branch '{name}': {}",
                result.stderr
            ));
        }
        Ok(result)
    }

    /// Delete every branch the classifier currently considers safe.
    ///
    /// The safe set is re-scanned at call time so a stale client snapshot
    /// can never widen it. Each deletion is independent: one failure is
    /// recorded and the remaining candidates are still attempted.
    pub async fn delete_all_safe(&self) -> Result<Vec<BranchDeletion>, DeployError> {
        let _guard = self.mutation_lock.lock().await;
        let op = self.begin("delete-all-safe");
        let stale = self.scanner.scan().await?;
        let candidates: Vec<String> = stale
            .into_iter()
            .filter(|s| s.verdict == StaleVerdict::SafeToDelete)
            .map(|s| s.branch.name)
            .collect();

        let mut outcomes = Vec::with_capacity(candidates.len());
        for name in candidates {
            let result = match self.delete_branch_locked(&name).await {
                Ok(result) => result,
                // Keep going: the remaining candidates still get their turn.
                Err(e) => {
                    warn!(branch = %name, error = %e, "safe deletion skipped");
                    CommandResult {
                        exit_code: None,
                        stdout: String::new(),
                        stderr: e.to_string(),
                        duration_ms: 0,
                        success: false,
                        timed_out: false,
                    }
                }
            };
            outcomes.push(BranchDeletion { name, result });
        }

        let failed = outcomes.iter().filter(|o| !o.result.success).count();
        info!(
            correlation_id = %op,
            deleted = outcomes.len() - failed,
            failed,
            "bulk safe deletion finished"
        );
        self.oplog.append(
            if failed == 0 {
                crate::oplog::Severity::Success
            } else {
                crate::oplog::Severity::Error
            },
            format!(
                "delete-all-safe: {} deleted, {failed} failed",
                outcomes.len() - failed
            ),
        );
        Ok(outcomes)
    }

    /// Run the configured main-application restart command.
    pub async fn restart_main_application(&self) -> Result<RestartOutcome, DeployError> {
        if !self.restart_configured() {
            self.oplog
                .error("restart requested but no restart command is configured");
            return Err(DeployError::NotConfigured("restart command"));
        }
        let _guard = self.mutation_lock.lock().await;
        Ok(self.run_restart("request").await)
    }

    /// One-way self-restart signal: log the intent and let the caller send
    /// its response before the process exits for the supervisor to restart.
    pub fn announce_self_restart(&self) {
        self.oplog
            .info("self-restart requested; exiting for supervisor to restart the agent");
        warn!("self-restart requested; process will exit");
    }

    async fn run_restart(&self, trigger: &str) -> RestartOutcome {
        let Some(command) = self.restart.command.as_deref().filter(|c| !c.trim().is_empty())
        else {
            let reason = "restart command not configured";
            self.oplog
                .info(format!("restart after {trigger} skipped: {reason}"));
            return RestartOutcome::skipped(reason);
        };

        // The command is split into an argv, never handed to a shell.
        let argv = match shlex::split(command) {
            Some(argv) if !argv.is_empty() => argv,
            _ => {
                let reason = format!("restart command could not be parsed: '{command}'");
                self.oplog.error(reason.clone());
                return RestartOutcome::skipped(reason);
            }
        };

        let result = self
            .runner
            .run(&argv, &self.repo_path, self.restart.timeout)
            .await;
        if result.success {
            self.oplog.success(format!(
                "main application restart after {trigger} succeeded ({}ms)",
                result.duration_ms
            ));
        } else {
            self.oplog.error(format!(
                "main application restart after {trigger} failed ({}): {}",
                result.status_label(),
                result.stderr
            ));
        }
        RestartOutcome::attempted(result)
    }

    fn begin(&self, operation: &str) -> Uuid {
        let correlation_id = Uuid::new_v4();
        info!(operation, correlation_id = %correlation_id, "mutation started");
        correlation_id
    }

    fn finish(&self, correlation_id: &Uuid, what: &str, result: &CommandResult) {
        info!(
            correlation_id = %correlation_id,
            status = %result.status_label(),
            duration_ms = result.duration_ms,
            "mutation finished"
        );
        if result.success {
            self.oplog
                .success(format!("{what} succeeded ({}ms)", result.duration_ms));
        } else {
            self.oplog.error(format!(
                "{what} failed ({}): {}",
                result.status_label(),
                result.stderr
            ));
        }
    }
}

fn validate_ref(reference: &str) -> Result<(), DeployError> {
    if reference.is_empty() {
        return Err(DeployError::InvalidArgument(
            "ref must not be empty".to_string(),
        ));
    }
    if !REF_PATTERN.is_match(reference) || reference.contains("..") {
        return Err(DeployError::InvalidArgument(format!(
            "ref '{reference}' contains characters outside the allowed set"
        )));
    }
    Ok(())
}

/// For `remotes/<remote>/<branch...>` refs, the simple branch name to use
/// for a local tracking branch. Anything else checks out directly.
fn remote_ref_simple_name(reference: &str) -> Option<&str> {
    let rest = reference.strip_prefix("remotes/")?;
    let mut parts = rest.splitn(2, '/');
    let _remote = parts.next()?;
    let branch = parts.next()?;
    (!branch.is_empty()).then(|| {
        branch
            .rsplit('/')
            .next()
            .expect("rsplit yields at least one element")
    })
}
