//! Stale branch classification.
//!
//! A local branch is a reconciliation candidate only if it *had* an upstream
//! tracking ref that no longer resolves, observed as the `[gone]` marker
//! after a pruning fetch. Branches with a live upstream, or with no upstream
//! ever configured, carry no reconciliation signal and are excluded
//! entirely. The scan never mutates repository state.

use serde::Serialize;
use tracing::debug;

use crate::errors::DeployError;
use crate::repo::inspect::RepoInspector;

/// Tracking state of one local branch, as reported by git.
#[derive(Debug, Clone, Serialize)]
pub struct BranchRef {
    pub name: String,
    /// Configured upstream ref name (e.g. `origin/feature-x`), still
    /// reported by git after the ref itself has been pruned.
    pub upstream: Option<String>,
    /// Commits present locally but on no remote-tracking ref. Zero when the
    /// count could not be computed; the verdict is the authoritative
    /// signal in that case.
    pub ahead: u32,
    pub behind: u32,
    pub upstream_gone: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StaleVerdict {
    /// Upstream gone and no unpushed commits.
    SafeToDelete,
    /// Upstream gone with unpushed (or uncountable) local commits.
    HasLocalChanges,
    /// Currently checked out, never a deletion candidate.
    Active,
}

#[derive(Debug, Clone, Serialize)]
pub struct StaleBranch {
    pub branch: BranchRef,
    pub verdict: StaleVerdict,
}

/// Parsed `%(upstream:track)` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TrackState {
    /// No tracking information printed (no upstream configured).
    None,
    /// Upstream configured but the ref no longer resolves.
    Gone,
    /// Upstream present and the branch is in sync with it.
    InSync,
    /// Upstream present with divergence.
    AheadBehind { ahead: u32, behind: u32 },
}

#[derive(Debug, PartialEq, Eq)]
pub(crate) struct TrackingLine {
    pub name: String,
    pub upstream: Option<String>,
    pub track: TrackState,
}

const TRACKING_FORMAT: &str = "%(refname:short)\t%(upstream:short)\t%(upstream:track)";

/// Classifies local branches whose upstream tracking ref has disappeared.
#[derive(Debug, Clone)]
pub struct StaleBranchScanner {
    inspector: RepoInspector,
}

impl StaleBranchScanner {
    pub fn new(inspector: RepoInspector) -> Self {
        Self { inspector }
    }

    /// Scan every local branch except the active one and classify the
    /// upstream-gone candidates.
    pub async fn scan(&self) -> Result<Vec<StaleBranch>, DeployError> {
        let head = self.inspector.current_ref().await?;
        let active = head.branch_name();

        let format_arg = format!("--format={TRACKING_FORMAT}");
        let listing = self
            .inspector
            .git(&["for-each-ref", "refs/heads", &format_arg])
            .await?;

        let mut stale = Vec::new();
        for line in listing.stdout.lines() {
            let Some(parsed) = parse_tracking_line(line) else {
                continue;
            };
            if active == Some(parsed.name.as_str()) {
                continue;
            }
            // Only branches that had tracking and lost it are candidates;
            // the [gone] marker can only appear when an upstream was
            // configured.
            if parsed.track != TrackState::Gone {
                continue;
            }

            let unpushed = self.unpushed_count(&parsed.name).await?;
            let verdict = classify_gone_branch(unpushed);
            debug!(
                branch = %parsed.name,
                unpushed = ?unpushed,
                verdict = ?verdict,
                "classified upstream-gone branch"
            );
            stale.push(StaleBranch {
                branch: BranchRef {
                    name: parsed.name,
                    upstream: parsed.upstream,
                    ahead: unpushed.unwrap_or(0),
                    behind: 0,
                    upstream_gone: true,
                },
                verdict,
            });
        }

        let safe = stale
            .iter()
            .filter(|s| s.verdict == StaleVerdict::SafeToDelete)
            .count();
        self.inspector.oplog().info(format!(
            "stale branch scan: {} candidate(s), {safe} safe to delete",
            stale.len()
        ));
        Ok(stale)
    }

    /// Commits reachable from `branch` but from no remote-tracking ref.
    ///
    /// After a pruning fetch the branch's own last-known upstream tip is
    /// unrecoverable, so "unpushed" is measured against every remote ref
    /// that still exists: a tip that survives anywhere on the remote (the
    /// merged-then-deleted flow) counts zero. `None` when git cannot answer.
    async fn unpushed_count(&self, branch: &str) -> Result<Option<u32>, DeployError> {
        let result = self
            .inspector
            .git_raw(&["rev-list", "--count", branch, "--not", "--remotes"])
            .await?;
        if !result.success {
            return Ok(None);
        }
        Ok(result.stdout.trim().parse::<u32>().ok())
    }
}

/// Verdict for an upstream-gone branch. An uncomputable count is never
/// treated as safe.
fn classify_gone_branch(unpushed: Option<u32>) -> StaleVerdict {
    match unpushed {
        Some(0) => StaleVerdict::SafeToDelete,
        _ => StaleVerdict::HasLocalChanges,
    }
}

pub(crate) fn parse_tracking_line(line: &str) -> Option<TrackingLine> {
    let mut fields = line.splitn(3, '\t');
    let name = fields.next()?.trim();
    if name.is_empty() {
        return None;
    }
    let upstream = fields.next().unwrap_or("").trim();
    let track = parse_track_field(fields.next().unwrap_or("").trim());
    Some(TrackingLine {
        name: name.to_string(),
        upstream: (!upstream.is_empty()).then(|| upstream.to_string()),
        track,
    })
}

/// Parse the bracketed `%(upstream:track)` grammar: empty (in sync or no
/// upstream), `[gone]`, `[ahead N]`, `[behind M]`, or `[ahead N, behind M]`.
pub(crate) fn parse_track_field(field: &str) -> TrackState {
    if field.is_empty() {
        return TrackState::None;
    }
    let Some(body) = field.strip_prefix('[').and_then(|s| s.strip_suffix(']')) else {
        return TrackState::None;
    };
    if body == "gone" {
        return TrackState::Gone;
    }
    let mut ahead = 0;
    let mut behind = 0;
    for part in body.split(',') {
        let part = part.trim();
        if let Some(n) = part.strip_prefix("ahead ") {
            ahead = n.trim().parse().unwrap_or(0);
        } else if let Some(n) = part.strip_prefix("behind ") {
            behind = n.trim().parse().unwrap_or(0);
        }
    }
    if ahead == 0 && behind == 0 {
        TrackState::InSync
    } else {
        TrackState::AheadBehind { ahead, behind }
    }
}
