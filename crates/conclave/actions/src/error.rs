use thiserror::Error;

use conclave_types::{ActionName, MemberId, ProposalId};
use conclave_voting::VoteError;

/// Errors from deferred-action dispatch.
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("unknown action {0}")]
    UnknownAction(ActionName),

    #[error("invalid arguments for {action}: {reason}")]
    InvalidArgs { action: ActionName, reason: String },

    #[error("action execution failed: {0}")]
    Failed(String),
}

/// Errors from the action controller.
#[derive(Error, Debug)]
pub enum ActionError {
    #[error("{caller} may not perform {operation}")]
    PermissionDenied {
        caller: MemberId,
        operation: String,
    },

    #[error("no voting configuration for action {0}")]
    UnconfiguredAction(ActionName),

    #[error("invalid voting configuration: {0}")]
    InvalidConfig(String),

    #[error("unknown proposal {0}")]
    UnknownProposal(ProposalId),

    #[error(transparent)]
    Vote(#[from] VoteError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}
