// Dockhand Library - Deployment Control-Plane Engine
// This exposes the core components for testing and integration

pub mod config;
pub mod errors;
pub mod oplog;
pub mod repo;
pub mod runner;
pub mod server;
pub mod telemetry;

// Re-export key types for easy access
pub use config::DockhandConfig;
pub use errors::DeployError;
pub use oplog::{LogRecord, OpLog, Severity};
pub use repo::{
    BranchDeletion, BranchRef, HeadRef, MutationCoordinator, MutationOutcome, RepoInspector,
    RestartOutcome, RestartPolicy, StaleBranch, StaleBranchScanner, StaleVerdict,
};
pub use runner::{CommandResult, CommandRunner};
pub use server::{router, serve, AppState};
pub use telemetry::init_telemetry;
