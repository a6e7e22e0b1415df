//! Membership and direct-permission oracle boundary.
//!
//! The governance core never implements membership itself; it consults a
//! [`PermissionOracle`] injected at every call site. The oracle answers
//! three questions: may this address perform a named action without a
//! vote, is this address a member of a group, and how large is a group.
//!
//! [`InMemoryDirectory`] is the reference implementation used for wiring
//! and tests; production deployments implement the trait over whatever
//! registry they already run.

#![deny(unsafe_code)]

use std::collections::{BTreeSet, HashMap, HashSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use conclave_types::{ActionName, GroupId, MemberId};

/// Errors from directory mutations.
#[derive(Error, Debug)]
pub enum DirectoryError {
    #[error("member {member} is not in group {group}")]
    NotInGroup { member: MemberId, group: GroupId },

    #[error("member {member} holds no direct grant for action {action}")]
    GrantNotFound {
        member: MemberId,
        action: ActionName,
    },
}

/// Read-only permission oracle consumed by the governance core.
///
/// Implementations must answer from their current state; the core never
/// caches an answer across operations.
pub trait PermissionOracle {
    /// May `who` execute `action` immediately, without a vote?
    fn can_act_directly(&self, who: &MemberId, action: &ActionName) -> bool;

    /// Is `who` currently a member of `group`?
    fn is_group_member(&self, who: &MemberId, group: &GroupId) -> bool;

    /// Current member count of `group`. Unknown groups have size zero.
    fn group_size(&self, group: &GroupId) -> u32;
}

/// In-memory membership registry and direct-permission store.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct InMemoryDirectory {
    groups: HashMap<GroupId, BTreeSet<MemberId>>,
    direct_grants: HashMap<ActionName, HashSet<MemberId>>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a member to a group. Adding twice is a no-op.
    pub fn add_to_group(&mut self, group: &GroupId, member: &MemberId) {
        let inserted = self
            .groups
            .entry(group.clone())
            .or_default()
            .insert(member.clone());
        if inserted {
            info!(group = %group, member = %member, "member added to group");
        }
    }

    /// Remove a member from a group.
    pub fn remove_from_group(
        &mut self,
        group: &GroupId,
        member: &MemberId,
    ) -> Result<(), DirectoryError> {
        let removed = self
            .groups
            .get_mut(group)
            .map(|members| members.remove(member))
            .unwrap_or(false);
        if !removed {
            return Err(DirectoryError::NotInGroup {
                member: member.clone(),
                group: group.clone(),
            });
        }
        info!(group = %group, member = %member, "member removed from group");
        Ok(())
    }

    /// Allow a member to execute an action directly, skipping any vote.
    pub fn grant_direct(&mut self, action: &ActionName, member: &MemberId) {
        let inserted = self
            .direct_grants
            .entry(action.clone())
            .or_default()
            .insert(member.clone());
        if inserted {
            info!(action = %action, member = %member, "direct permission granted");
        }
    }

    /// Revoke a direct-execution grant.
    pub fn revoke_direct(
        &mut self,
        action: &ActionName,
        member: &MemberId,
    ) -> Result<(), DirectoryError> {
        let removed = self
            .direct_grants
            .get_mut(action)
            .map(|members| members.remove(member))
            .unwrap_or(false);
        if !removed {
            return Err(DirectoryError::GrantNotFound {
                member: member.clone(),
                action: action.clone(),
            });
        }
        info!(action = %action, member = %member, "direct permission revoked");
        Ok(())
    }

    /// Members of a group, in stable order.
    pub fn group_members(&self, group: &GroupId) -> Vec<&MemberId> {
        self.groups
            .get(group)
            .map(|members| members.iter().collect())
            .unwrap_or_default()
    }
}

impl PermissionOracle for InMemoryDirectory {
    fn can_act_directly(&self, who: &MemberId, action: &ActionName) -> bool {
        self.direct_grants
            .get(action)
            .is_some_and(|members| members.contains(who))
    }

    fn is_group_member(&self, who: &MemberId, group: &GroupId) -> bool {
        self.groups
            .get(group)
            .is_some_and(|members| members.contains(who))
    }

    fn group_size(&self, group: &GroupId) -> u32 {
        self.groups
            .get(group)
            .map(|members| members.len() as u32)
            .unwrap_or(0)
    }
}
