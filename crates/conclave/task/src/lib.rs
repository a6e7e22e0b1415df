//! Task/expense state machine for Conclave.
//!
//! A [`Task`] is a funded, time-boxed unit of work. Its lifecycle is an
//! explicit state machine gating currency inflow and outflow; two of its
//! observable states (`PrePaid`, `CanGetFunds`) are derived from the
//! live held balance at read time, so funding can arrive as a plain
//! transfer with no acknowledgment call.
//!
//! Custody lives behind the [`TokenPort`] boundary; the in-memory
//! implementation here backs tests and local wiring.

#![deny(unsafe_code)]

pub mod error;
pub mod task;
pub mod token;

pub use error::TaskError;
pub use task::{Task, TaskParams, TaskState};
pub use token::{InMemoryToken, TokenPort, TransferError};
