pub mod coordinator;
pub mod inspect;
pub mod stale;

pub use coordinator::{
    BranchDeletion, MutationCoordinator, MutationOutcome, RestartOutcome, RestartPolicy,
};
pub use inspect::{HeadRef, RepoInspector};
pub use stale::{BranchRef, StaleBranch, StaleBranchScanner, StaleVerdict};
