use thiserror::Error;

use conclave_types::{Amount, MemberId};

use crate::task::TaskState;
use crate::token::TransferError;

/// Errors from task operations.
///
/// Every failure aborts the operation before any state or balance has
/// moved.
#[derive(Error, Debug)]
pub enum TaskError {
    #[error("{caller} may not perform {operation}")]
    PermissionDenied {
        caller: MemberId,
        operation: &'static str,
    },

    #[error("invalid state transition in {operation}: {reason} (state {state:?})")]
    InvalidStateTransition {
        operation: &'static str,
        state: TaskState,
        reason: String,
    },

    #[error("cost has already been evaluated")]
    CostAlreadySet,

    #[error("no payout destination is set")]
    MissingPayoutDestination,

    #[error("funding of {amount} would exceed the needed amount: held {held}, needed {needed}")]
    FundingExceedsNeeded {
        amount: Amount,
        held: Amount,
        needed: Amount,
    },

    #[error("task does not accept funds before its cost is known")]
    FundingNotOpen,

    #[error("funding amount must be nonzero")]
    ZeroFunding,

    #[error("held funds of {held} have no recorded payer to refund")]
    UnrefundableFunds { held: Amount },

    #[error("redirected payout is disabled")]
    RedirectDisabled,

    #[error("invalid task parameters: {0}")]
    InvalidParams(String),

    #[error(transparent)]
    Transfer(#[from] TransferError),
}
