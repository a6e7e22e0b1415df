//! The voting instance state machine.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::info;

use conclave_directory::PermissionOracle;
use conclave_types::{BallotChoice, GroupId, MemberId};

use crate::error::VoteError;

/// The voting scheme applied to an instance.
///
/// One member, one vote is the only supported scheme; the variant exists
/// so configurations carry the scheme explicitly.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum VotingKind {
    #[default]
    OneMemberOneVote,
}

/// Threshold and scope parameters for one voting instance.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VotingRules {
    pub kind: VotingKind,
    /// Group whose members may vote.
    pub group: GroupId,
    /// Minimum percent of the captured membership that must vote.
    pub quorum_percent: u8,
    /// Minimum percent of cast votes that must be yes.
    pub consensus_percent: u8,
    /// Length of the voting window in milliseconds.
    pub duration_ms: u64,
}

/// Observable status of a voting instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum VotingStatus {
    /// Accepting ballots.
    Open,
    /// Finalized yes: quorum and consensus reached.
    FinishedYes,
    /// Finalized no: the window elapsed without both thresholds holding.
    FinishedNo,
}

impl VotingStatus {
    pub fn is_finished(&self) -> bool {
        !matches!(self, VotingStatus::Open)
    }
}

/// Vote counts as of one query.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tally {
    pub yes: u32,
    pub no: u32,
    /// Group size captured when the instance was created.
    pub total_members: u32,
}

/// One voting instance: a fixed electorate snapshot, one ballot per
/// member, and threshold-driven finalization.
///
/// Finalization is monotone: the yes/no counts only change through
/// accepted ballots, and ballots are only accepted while the instance is
/// open, so once either terminal status is reached it never changes.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VotingInstance {
    rules: VotingRules,
    started_at_ms: u64,
    /// Electorate size frozen at creation; thresholds are evaluated
    /// against this, not the live group size.
    total_members_at_start: u32,
    ballots: HashMap<MemberId, BallotChoice>,
    yes: u32,
    no: u32,
}

impl VotingInstance {
    /// Open a new instance, capturing the group's current size from the
    /// oracle.
    pub fn open(rules: VotingRules, oracle: &dyn PermissionOracle, now_ms: u64) -> Self {
        let total = oracle.group_size(&rules.group);
        info!(
            group = %rules.group,
            total_members = total,
            quorum_percent = rules.quorum_percent,
            consensus_percent = rules.consensus_percent,
            duration_ms = rules.duration_ms,
            "voting instance opened"
        );
        Self {
            rules,
            started_at_ms: now_ms,
            total_members_at_start: total,
            ballots: HashMap::new(),
            yes: 0,
            no: 0,
        }
    }

    pub fn rules(&self) -> &VotingRules {
        &self.rules
    }

    pub fn started_at_ms(&self) -> u64 {
        self.started_at_ms
    }

    /// Cast one ballot. Rejected once the instance is finished, for
    /// non-members of the captured group, and on a repeat vote; a
    /// rejected ballot leaves the tally untouched.
    pub fn cast_ballot(
        &mut self,
        oracle: &dyn PermissionOracle,
        voter: &MemberId,
        choice: BallotChoice,
        now_ms: u64,
    ) -> Result<VotingStatus, VoteError> {
        if self.status(now_ms).is_finished() {
            return Err(VoteError::VotingFinished);
        }
        if !oracle.is_group_member(voter, &self.rules.group) {
            return Err(VoteError::NotAMember {
                member: voter.clone(),
                group: self.rules.group.clone(),
            });
        }
        if self.ballots.contains_key(voter) {
            return Err(VoteError::AlreadyVoted {
                member: voter.clone(),
            });
        }

        self.ballots.insert(voter.clone(), choice);
        match choice {
            BallotChoice::Yes => self.yes += 1,
            BallotChoice::No => self.no += 1,
        }

        let status = self.status(now_ms);
        info!(voter = %voter, ?choice, yes = self.yes, no = self.no, ?status, "ballot accepted");
        Ok(status)
    }

    /// Current status, re-derived from the tally and the clock on every
    /// query. The yes condition is checked before the timeout, so an
    /// instance whose thresholds hold exactly at expiry finalizes yes.
    pub fn status(&self, now_ms: u64) -> VotingStatus {
        if self.quorum_met() && self.consensus_met() {
            return VotingStatus::FinishedYes;
        }
        if now_ms >= self.started_at_ms.saturating_add(self.rules.duration_ms) {
            return VotingStatus::FinishedNo;
        }
        VotingStatus::Open
    }

    pub fn is_finished(&self, now_ms: u64) -> bool {
        self.status(now_ms).is_finished()
    }

    pub fn is_yes(&self, now_ms: u64) -> bool {
        self.status(now_ms) == VotingStatus::FinishedYes
    }

    pub fn tally(&self) -> Tally {
        Tally {
            yes: self.yes,
            no: self.no,
            total_members: self.total_members_at_start,
        }
    }

    fn votes_cast(&self) -> u32 {
        self.yes + self.no
    }

    fn quorum_met(&self) -> bool {
        // An empty electorate can never reach quorum, even at 0 percent.
        if self.total_members_at_start == 0 {
            return false;
        }
        u64::from(self.votes_cast()) * 100
            >= u64::from(self.total_members_at_start) * u64::from(self.rules.quorum_percent)
    }

    fn consensus_met(&self) -> bool {
        let cast = self.votes_cast();
        if cast == 0 {
            return false;
        }
        u64::from(self.yes) * 100 >= u64::from(cast) * u64::from(self.rules.consensus_percent)
    }
}
