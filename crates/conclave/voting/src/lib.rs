//! Voting instance state machine for Conclave.
//!
//! A [`VotingInstance`] tallies single-vote-per-member ballots from one
//! group against configurable quorum and consensus thresholds:
//!
//! - quorum: `votes_cast * 100 >= total_members_at_start * quorum_percent`
//! - consensus: `yes * 100 >= votes_cast * consensus_percent`
//!
//! Both comparisons use whole-percent integers and are inclusive. The
//! instance finalizes yes as soon as both hold (early finalization), and
//! finalizes no once its window elapses without them; either terminal
//! status is permanent.

#![deny(unsafe_code)]

pub mod error;
pub mod instance;

pub use error::VoteError;
pub use instance::{Tally, VotingInstance, VotingKind, VotingRules, VotingStatus};

#[cfg(test)]
mod properties {
    use super::*;
    use conclave_directory::InMemoryDirectory;
    use conclave_types::{BallotChoice, GroupId, MemberId};
    use proptest::prelude::*;

    const T0: u64 = 1_700_000_000_000;
    const WINDOW: u64 = 1_000_000;

    fn arb_choice() -> impl Strategy<Value = BallotChoice> {
        prop_oneof![Just(BallotChoice::Yes), Just(BallotChoice::No)]
    }

    proptest! {
        /// Once finished, status never changes on later queries, and a
        /// later clock never flips a yes into a no.
        #[test]
        fn finalization_is_monotone(
            members in 1usize..12,
            choices in proptest::collection::vec(arb_choice(), 1..12),
            quorum in 0u8..=100,
            consensus in 0u8..=100,
        ) {
            let group = GroupId::new("G");
            let mut dir = InMemoryDirectory::new();
            for i in 0..members {
                dir.add_to_group(&group, &MemberId::new(format!("m{i}")));
            }
            let rules = VotingRules {
                kind: VotingKind::OneMemberOneVote,
                group,
                quorum_percent: quorum,
                consensus_percent: consensus,
                duration_ms: WINDOW,
            };
            let mut voting = VotingInstance::open(rules, &dir, T0);

            let mut first_final: Option<VotingStatus> = None;
            for (i, choice) in choices.iter().enumerate() {
                let voter = MemberId::new(format!("m{}", i % members));
                let result = voting.cast_ballot(&dir, &voter, *choice, T0 + i as u64);
                if let Some(fixed) = first_final {
                    // After finalization every ballot is rejected and
                    // the status stays fixed.
                    prop_assert!(result.is_err());
                    prop_assert_eq!(voting.status(T0 + i as u64), fixed);
                } else if let Ok(status) = result {
                    if status.is_finished() {
                        first_final = Some(status);
                    }
                }
            }

            let end = voting.status(T0 + WINDOW);
            prop_assert!(end.is_finished());
            if let Some(fixed) = first_final {
                prop_assert_eq!(end, fixed);
            }
            // Far-future queries agree.
            prop_assert_eq!(voting.status(T0 + WINDOW * 1000), end);
        }

        /// The tally never counts more ballots than the captured
        /// electorate, whatever sequence of casts is attempted.
        #[test]
        fn tally_bounded_by_electorate(
            members in 0usize..10,
            attempts in proptest::collection::vec((0usize..20, arb_choice()), 0..40),
        ) {
            let group = GroupId::new("G");
            let mut dir = InMemoryDirectory::new();
            for i in 0..members {
                dir.add_to_group(&group, &MemberId::new(format!("m{i}")));
            }
            let rules = VotingRules {
                kind: VotingKind::OneMemberOneVote,
                group,
                quorum_percent: 100,
                consensus_percent: 100,
                duration_ms: WINDOW,
            };
            let mut voting = VotingInstance::open(rules, &dir, T0);

            for (who, choice) in attempts {
                let _ = voting.cast_ballot(&dir, &MemberId::new(format!("m{who}")), choice, T0);
            }

            let tally = voting.tally();
            prop_assert!(tally.yes + tally.no <= tally.total_members);
        }
    }
}
