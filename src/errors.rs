use thiserror::Error;

use crate::runner::CommandResult;

/// Failure taxonomy for repository and restart operations.
///
/// `CommandFailed` is only produced where a non-zero exit has an unambiguous
/// meaning (e.g. an inspector query); mutating operations hand the raw
/// `CommandResult` back to the caller instead so stdout/stderr stay available
/// for human diagnosis.
#[derive(Debug, Error)]
pub enum DeployError {
    #[error("repository path '{path}' is missing or not a git repository: {detail}")]
    RepositoryInvalid { path: String, detail: String },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("{context} failed ({})", .result.status_label())]
    CommandFailed {
        context: String,
        result: CommandResult,
    },

    #[error("{0} is not configured")]
    NotConfigured(&'static str),

    #[error("{context} timed out after {timeout_ms}ms")]
    Timeout { context: String, timeout_ms: u64 },
}

impl DeployError {
    pub fn repository_invalid(path: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::RepositoryInvalid {
            path: path.into(),
            detail: detail.into(),
        }
    }

    pub fn command_failed(context: impl Into<String>, result: CommandResult) -> Self {
        Self::CommandFailed {
            context: context.into(),
            result,
        }
    }
}
