//! Shared identifiers and wire types for the Conclave governance engine.
//!
//! Every other crate in the workspace speaks in terms of these newtypes.
//! Identifiers are opaque strings (addresses in whatever identity scheme
//! the deployment uses); amounts are integer minor units of the
//! organizational currency.

#![deny(unsafe_code)]

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Currency amount in minor units.
pub type Amount = u64;

/// Address of a member (a human or programmatic actor).
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MemberId(pub String);

/// Identifier of a membership group.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GroupId(pub String);

/// Identifier of a currency-holding account on the token port.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccountId(pub String);

/// Name of a guarded action, e.g. `task.payout`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActionName(pub String);

/// Identifier of a task.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(pub Uuid);

/// Index of a proposal in the append-only registry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProposalId(pub u64);

impl MemberId {
    pub fn new(addr: impl Into<String>) -> Self {
        Self(addr.into())
    }

    /// The custody account owned by this member on the token port.
    pub fn account(&self) -> AccountId {
        AccountId(self.0.clone())
    }
}

impl GroupId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }
}

impl AccountId {
    pub fn new(addr: impl Into<String>) -> Self {
        Self(addr.into())
    }
}

impl ActionName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }
}

impl TaskId {
    /// Mint a fresh task id.
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// The custody account owned by this task on the token port.
    pub fn account(&self) -> AccountId {
        AccountId(format!("task:{}", self.0))
    }
}

impl fmt::Display for MemberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for ActionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for ProposalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A ballot choice on a voting instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum BallotChoice {
    Yes,
    No,
}

impl BallotChoice {
    pub fn is_yes(&self) -> bool {
        matches!(self, BallotChoice::Yes)
    }
}

/// A deferred action invocation: the target action name plus its encoded
/// arguments. Stored verbatim on a proposal and replayed at execution.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionCall {
    /// Target action name.
    pub action: ActionName,
    /// Encoded arguments, interpreted by the dispatcher for that action.
    pub args: serde_json::Value,
}

impl ActionCall {
    pub fn new(action: ActionName, args: serde_json::Value) -> Self {
        Self { action, args }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_account_is_stable_and_distinct() {
        let id = TaskId::generate();
        assert_eq!(id.account(), id.account());
        assert_ne!(id.account(), TaskId::generate().account());
        assert!(id.account().0.starts_with("task:"));
    }

    #[test]
    fn member_account_mirrors_address() {
        let alice = MemberId::new("alice");
        assert_eq!(alice.account(), AccountId::new("alice"));
    }

    #[test]
    fn action_call_serialization_roundtrip() {
        let call = ActionCall::new(
            ActionName::new("task.payout"),
            serde_json::json!({ "task_id": "0000" }),
        );
        let json = serde_json::to_string(&call).unwrap();
        let back: ActionCall = serde_json::from_str(&json).unwrap();
        assert_eq!(call, back);
    }

    #[test]
    fn ballot_choice_predicate() {
        assert!(BallotChoice::Yes.is_yes());
        assert!(!BallotChoice::No.is_yes());
    }

    #[test]
    fn proposal_id_display() {
        assert_eq!(ProposalId(7).to_string(), "#7");
    }
}
