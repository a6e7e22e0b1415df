use thiserror::Error;

use conclave_types::{GroupId, MemberId};

/// Errors from ballot casting.
#[derive(Error, Debug)]
pub enum VoteError {
    #[error("{member} is not a member of group {group}")]
    NotAMember { member: MemberId, group: GroupId },

    #[error("{member} has already voted on this instance")]
    AlreadyVoted { member: MemberId },

    #[error("voting is finished; no further ballots are accepted")]
    VotingFinished,
}
