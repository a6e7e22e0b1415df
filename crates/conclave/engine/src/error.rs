use thiserror::Error;

use conclave_actions::ActionError;
use conclave_task::{TaskError, TransferError};
use conclave_types::{MemberId, TaskId};

/// Errors from the engine facade.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("unknown task {0}")]
    UnknownTask(TaskId),

    #[error("{caller} may not perform {operation}")]
    PermissionDenied {
        caller: MemberId,
        operation: &'static str,
    },

    #[error(transparent)]
    Task(#[from] TaskError),

    #[error(transparent)]
    Action(#[from] ActionError),

    #[error(transparent)]
    Transfer(#[from] TransferError),
}
