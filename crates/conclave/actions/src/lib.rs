//! Action controller for Conclave.
//!
//! For each guarded action name the [`ActionController`] decides, per
//! call, between two paths: execute immediately because the permission
//! oracle says the caller may act directly, or materialize the call as a
//! [`Proposal`] bound to a freshly opened voting instance. A proposal's
//! deferred action executes exactly once, when and only when its vote
//! finalizes yes.

#![deny(unsafe_code)]

pub mod controller;
pub mod error;

pub use controller::{ActionController, ActionDispatcher, InvokeOutcome, Proposal, VotingConfig};
pub use error::{ActionError, DispatchError};
