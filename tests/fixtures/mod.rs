//! Shared git repository fixtures for integration tests.
//!
//! Each fixture builds a bare "remote" repository and a working clone in an
//! isolated temporary directory, then drives real git commands to shape the
//! branch topology under test.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use dockhand::{MutationCoordinator, OpLog, RepoInspector, RestartPolicy, StaleBranchScanner};

pub const GIT_TIMEOUT: Duration = Duration::from_secs(30);

pub struct GitFixture {
    root: TempDir,
    pub upstream: PathBuf,
    pub work: PathBuf,
}

impl GitFixture {
    /// A bare upstream plus one working clone, both freshly created.
    pub fn new() -> Self {
        let root = tempfile::tempdir().expect("create temp dir");
        let upstream = root.path().join("upstream.git");
        let work = root.path().join("work");
        run_git(
            root.path(),
            &["init", "--bare", "-b", "main", upstream.to_str().unwrap()],
        );
        run_git(
            root.path(),
            &["clone", upstream.to_str().unwrap(), work.to_str().unwrap()],
        );
        configure_identity(&work);
        Self {
            root,
            upstream,
            work,
        }
    }

    /// Run git in the working clone, asserting success.
    pub fn git(&self, args: &[&str]) -> String {
        run_git(&self.work, args)
    }

    /// Write a file in the working clone and commit it.
    pub fn commit_file(&self, name: &str, content: &str, message: &str) {
        let path = self.work.join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&path, content).unwrap();
        self.git(&["add", name]);
        self.git(&["commit", "-m", message]);
    }

    /// A second clone of the same upstream, for simulating remote-side
    /// activity (pushes that put origin ahead of the working clone).
    pub fn second_clone(&self, name: &str) -> PathBuf {
        let path = self.root.path().join(name);
        run_git(
            self.root.path(),
            &["clone", self.upstream.to_str().unwrap(), path.to_str().unwrap()],
        );
        configure_identity(&path);
        path
    }

    pub fn oplog(&self) -> Arc<OpLog> {
        Arc::new(OpLog::default())
    }

    pub fn inspector(&self, oplog: &Arc<OpLog>) -> RepoInspector {
        RepoInspector::new(self.work.clone(), Arc::clone(oplog), GIT_TIMEOUT)
    }

    pub fn scanner(&self, oplog: &Arc<OpLog>) -> StaleBranchScanner {
        StaleBranchScanner::new(self.inspector(oplog))
    }

    pub fn coordinator(&self, restart: RestartPolicy, oplog: &Arc<OpLog>) -> MutationCoordinator {
        MutationCoordinator::new(self.inspector(oplog), restart, Arc::clone(oplog))
    }
}

pub fn run_git(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .env("GIT_CONFIG_NOSYSTEM", "1")
        .env("GIT_AUTHOR_NAME", "Fixture")
        .env("GIT_AUTHOR_EMAIL", "fixture@example.com")
        .env("GIT_COMMITTER_NAME", "Fixture")
        .env("GIT_COMMITTER_EMAIL", "fixture@example.com")
        .output()
        .expect("git must be installed for integration tests");
    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

fn configure_identity(repo: &Path) {
    run_git(repo, &["config", "user.name", "Fixture"]);
    run_git(repo, &["config", "user.email", "fixture@example.com"]);
    run_git(repo, &["config", "commit.gpgsign", "false"]);
}

/// Branch topology for classifier tests:
/// - `main`: active, live upstream
/// - `feature-x`: merged into origin/main, remote branch deleted (0 unpushed)
/// - `feature-y`: 2 local commits on top of its pushed tip, remote deleted
/// - `feature-live`: pushed, remote branch still present
/// - `local-only`: never had an upstream
pub fn build_stale_scenario(fx: &GitFixture) {
    fx.commit_file("README.md", "hello\n", "initial commit");
    fx.git(&["push", "-u", "origin", "main"]);

    fx.git(&["checkout", "-b", "feature-x"]);
    fx.commit_file("x.txt", "x\n", "feature-x work");
    fx.git(&["push", "-u", "origin", "feature-x"]);
    fx.git(&["checkout", "main"]);
    fx.git(&["merge", "--ff-only", "feature-x"]);
    fx.git(&["push", "origin", "main"]);

    fx.git(&["checkout", "-b", "feature-y", "main"]);
    fx.git(&["push", "-u", "origin", "feature-y"]);
    fx.commit_file("y1.txt", "y1\n", "feature-y local work 1");
    fx.commit_file("y2.txt", "y2\n", "feature-y local work 2");

    fx.git(&["checkout", "-b", "feature-live", "main"]);
    fx.git(&["push", "-u", "origin", "feature-live"]);

    fx.git(&["branch", "local-only", "main"]);
    fx.git(&["checkout", "main"]);

    fx.git(&["push", "origin", "--delete", "feature-x"]);
    fx.git(&["push", "origin", "--delete", "feature-y"]);
    fx.git(&["fetch", "--all", "--prune"]);
}

/// Two safe-to-delete candidates where git itself refuses the first one:
/// - `aa-risky`: tip reachable from origin/main, but local main was reset
///   behind it, so non-force deletion fails the not-fully-merged check
/// - `zz-clean`: tip at local main, deletes cleanly
pub fn build_partial_failure_scenario(fx: &GitFixture) {
    fx.commit_file("README.md", "hello\n", "initial commit");
    fx.git(&["push", "-u", "origin", "main"]);

    fx.git(&["checkout", "-b", "aa-risky"]);
    fx.commit_file("risky.txt", "r\n", "risky work");
    fx.git(&["push", "-u", "origin", "aa-risky"]);
    fx.git(&["checkout", "main"]);
    fx.git(&["merge", "--ff-only", "aa-risky"]);
    fx.git(&["push", "origin", "main"]);

    fx.git(&["checkout", "-b", "zz-clean", "main^"]);
    fx.git(&["push", "-u", "origin", "zz-clean"]);
    fx.git(&["checkout", "main"]);

    fx.git(&["push", "origin", "--delete", "aa-risky"]);
    fx.git(&["push", "origin", "--delete", "zz-clean"]);
    fx.git(&["fetch", "--all", "--prune"]);

    // Local main drops back behind origin/main; aa-risky is now unmerged
    // relative to HEAD while still fully contained in the remote.
    fx.git(&["reset", "--hard", "HEAD~1"]);
}
