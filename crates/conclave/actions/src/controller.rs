//! The action controller: per-action voting configuration, the
//! append-only proposal registry, and the direct-vs-voting decision.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use conclave_directory::PermissionOracle;
use conclave_types::{ActionCall, ActionName, BallotChoice, GroupId, MemberId, ProposalId};
use conclave_voting::{VotingInstance, VotingKind, VotingRules, VotingStatus};

use crate::error::{ActionError, DispatchError};

/// Executes named actions against the target collaborators.
///
/// The controller is the gatekeeper; a dispatched call runs with the
/// organization's authority, whether it arrived on the direct path or
/// from a won vote. Implementations must not re-check per-member
/// permissions.
pub trait ActionDispatcher {
    fn dispatch(
        &mut self,
        call: &ActionCall,
        now_ms: u64,
    ) -> Result<serde_json::Value, DispatchError>;
}

/// Voting parameters stored per guarded action name.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VotingConfig {
    pub kind: VotingKind,
    pub duration_ms: u64,
    pub group: GroupId,
    pub quorum_percent: u8,
    pub consensus_percent: u8,
    /// Reserved scheme parameter; carried through but unused by
    /// one-member-one-vote.
    pub reserved_param: u64,
}

impl VotingConfig {
    fn rules(&self) -> VotingRules {
        VotingRules {
            kind: self.kind,
            group: self.group.clone(),
            quorum_percent: self.quorum_percent,
            consensus_percent: self.consensus_percent,
            duration_ms: self.duration_ms,
        }
    }
}

/// A durable pairing of one voting instance with one deferred action.
///
/// Registry entries are immutable after creation except for the
/// ballots on their voting instance and the `executed` flag, which is
/// written exactly once.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Proposal {
    id: ProposalId,
    action: ActionCall,
    proposer: MemberId,
    created_at_ms: u64,
    voting: VotingInstance,
    executed: bool,
}

impl Proposal {
    pub fn id(&self) -> ProposalId {
        self.id
    }

    pub fn action(&self) -> &ActionCall {
        &self.action
    }

    pub fn proposer(&self) -> &MemberId {
        &self.proposer
    }

    pub fn created_at_ms(&self) -> u64 {
        self.created_at_ms
    }

    pub fn voting(&self) -> &VotingInstance {
        &self.voting
    }

    pub fn is_executed(&self) -> bool {
        self.executed
    }
}

/// Outcome of a guarded invocation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InvokeOutcome {
    /// The caller held direct permission; the action ran synchronously
    /// and this is its result.
    ExecutedDirectly(serde_json::Value),
    /// The action is gated behind a vote; a proposal was created and
    /// nothing has executed yet (unless the proposer's implicit ballot
    /// already won the vote, observable via the proposal's flags).
    Pending(ProposalId),
}

/// Decides, per named action, whether a caller executes directly or
/// must first win a vote.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ActionController {
    administrator: MemberId,
    configs: HashMap<ActionName, VotingConfig>,
    proposals: Vec<Proposal>,
}

impl ActionController {
    pub fn new(administrator: MemberId) -> Self {
        Self {
            administrator,
            configs: HashMap::new(),
            proposals: Vec::new(),
        }
    }

    pub fn administrator(&self) -> &MemberId {
        &self.administrator
    }

    /// Set the voting configuration for an action name, overwriting any
    /// prior entry. Administrator only. In-flight proposals keep the
    /// rules they were created with.
    pub fn configure(
        &mut self,
        caller: &MemberId,
        action: ActionName,
        config: VotingConfig,
    ) -> Result<(), ActionError> {
        if caller != &self.administrator {
            return Err(ActionError::PermissionDenied {
                caller: caller.clone(),
                operation: format!("configure {action}"),
            });
        }
        if config.quorum_percent > 100 || config.consensus_percent > 100 {
            return Err(ActionError::InvalidConfig(format!(
                "percent thresholds must be 0..=100, got quorum {} consensus {}",
                config.quorum_percent, config.consensus_percent
            )));
        }
        let replaced = self.configs.insert(action.clone(), config).is_some();
        info!(%action, replaced, "voting configuration set");
        Ok(())
    }

    pub fn config(&self, action: &ActionName) -> Option<&VotingConfig> {
        self.configs.get(action)
    }

    /// Invoke a guarded action.
    ///
    /// Direct path: the oracle says the caller may act directly, so the
    /// action dispatches synchronously and its result is returned.
    ///
    /// Voting path: a voting instance is opened from the stored
    /// configuration (electorate captured now), paired with the deferred
    /// call into a new proposal, and the proposer's implicit yes ballot
    /// is cast — subject to the same membership check as any other
    /// ballot. If that ballot already wins the vote (one-member group),
    /// the action executes before this call returns.
    pub fn invoke<C>(
        &mut self,
        caller: &MemberId,
        call: ActionCall,
        now_ms: u64,
        ctx: &mut C,
    ) -> Result<InvokeOutcome, ActionError>
    where
        C: PermissionOracle + ActionDispatcher,
    {
        if ctx.can_act_directly(caller, &call.action) {
            info!(caller = %caller, action = %call.action, "direct execution permitted");
            let value = ctx.dispatch(&call, now_ms)?;
            return Ok(InvokeOutcome::ExecutedDirectly(value));
        }

        let config = self
            .configs
            .get(&call.action)
            .ok_or_else(|| ActionError::UnconfiguredAction(call.action.clone()))?
            .clone();

        // The implicit first ballot must be castable, so a proposer
        // outside the configured group creates nothing.
        if !ctx.is_group_member(caller, &config.group) {
            return Err(ActionError::PermissionDenied {
                caller: caller.clone(),
                operation: format!("propose {}", call.action),
            });
        }

        let mut voting = VotingInstance::open(config.rules(), &*ctx, now_ms);
        let status = voting.cast_ballot(&*ctx, caller, BallotChoice::Yes, now_ms)?;

        let id = ProposalId(self.proposals.len() as u64);
        info!(proposal = %id, action = %call.action, proposer = %caller, "proposal created");
        self.proposals.push(Proposal {
            id,
            action: call,
            proposer: caller.clone(),
            created_at_ms: now_ms,
            voting,
            executed: false,
        });

        if status == VotingStatus::FinishedYes {
            self.execute_won(id.0 as usize, now_ms, ctx)?;
        }
        Ok(InvokeOutcome::Pending(id))
    }

    /// Cast a ballot on a proposal's voting instance. A ballot that
    /// finalizes the vote yes triggers the deferred action in the same
    /// call, exactly once.
    pub fn cast_ballot<C>(
        &mut self,
        proposal_id: ProposalId,
        voter: &MemberId,
        choice: BallotChoice,
        now_ms: u64,
        ctx: &mut C,
    ) -> Result<VotingStatus, ActionError>
    where
        C: PermissionOracle + ActionDispatcher,
    {
        let index = proposal_id.0 as usize;
        let proposal = self
            .proposals
            .get_mut(index)
            .ok_or(ActionError::UnknownProposal(proposal_id))?;

        let status = proposal.voting.cast_ballot(&*ctx, voter, choice, now_ms)?;

        if status == VotingStatus::FinishedYes && !proposal.executed {
            self.execute_won(index, now_ms, ctx)?;
        }
        Ok(status)
    }

    /// Query a proposal from the append-only registry.
    pub fn proposal(&self, id: ProposalId) -> Option<&Proposal> {
        self.proposals.get(id.0 as usize)
    }

    pub fn proposals(&self) -> &[Proposal] {
        &self.proposals
    }

    /// Run a won proposal's deferred action. The executed flag is
    /// latched before dispatch: a failing action is reported to the
    /// caller but never retried and never re-opens the vote.
    fn execute_won<C>(
        &mut self,
        index: usize,
        now_ms: u64,
        ctx: &mut C,
    ) -> Result<(), ActionError>
    where
        C: ActionDispatcher,
    {
        let proposal = match self.proposals.get_mut(index) {
            Some(proposal) if !proposal.executed => proposal,
            _ => return Ok(()),
        };
        proposal.executed = true;
        let call = proposal.action.clone();
        let id = proposal.id;
        info!(proposal = %id, action = %call.action, "vote won, executing deferred action");
        if let Err(err) = ctx.dispatch(&call, now_ms) {
            warn!(proposal = %id, error = %err, "deferred action failed; not retried");
            return Err(err.into());
        }
        Ok(())
    }
}
