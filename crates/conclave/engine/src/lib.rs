//! Conclave engine facade.
//!
//! Wires the four subsystems together for one organization: the
//! membership/permission directory, the token custody port, the task
//! registry, and the action controller. The [`Engine`] exposes the
//! boundary operations; its execution context doubles as the permission
//! oracle and the dispatcher for named actions, so a won vote releases
//! exactly the same operations a directly permitted caller runs
//! synchronously.

#![deny(unsafe_code)]

pub mod context;
pub mod engine;
pub mod error;

pub use context::{actions, ExecutionContext};
pub use engine::Engine;
pub use error::EngineError;
