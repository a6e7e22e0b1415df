//! The engine facade: one struct owning the execution context and the
//! action controller, exposing the boundary operations.

use tracing::info;

use conclave_actions::{ActionController, InvokeOutcome, Proposal, VotingConfig};
use conclave_task::{TaskParams, TaskState};
use conclave_types::{
    AccountId, ActionCall, ActionName, Amount, BallotChoice, MemberId, ProposalId, TaskId,
};
use conclave_voting::VotingStatus;

use crate::context::ExecutionContext;
use crate::error::EngineError;

/// Governance and treasury engine for one organization.
///
/// All operations are serialized through `&mut self`; each public call
/// runs to completion atomically with respect to every other call, and
/// multi-step workflows (fund, complete, evaluate, payout; propose,
/// vote, execute) are staged across separate calls that each re-validate
/// their preconditions.
pub struct Engine {
    controller: ActionController,
    exec: ExecutionContext,
}

impl Engine {
    pub fn new(administrator: MemberId) -> Self {
        info!(administrator = %administrator, "engine initialized");
        Self {
            controller: ActionController::new(administrator.clone()),
            exec: ExecutionContext::new(administrator),
        }
    }

    pub fn administrator(&self) -> &MemberId {
        self.exec.administrator()
    }

    /// Mutable access to the membership and permission directory.
    pub fn directory_mut(&mut self) -> &mut conclave_directory::InMemoryDirectory {
        self.exec.directory_mut()
    }

    /// Mutable access to the token ledger (funding and bootstrap).
    pub fn token_mut(&mut self) -> &mut conclave_task::InMemoryToken {
        self.exec.token_mut()
    }

    pub fn account_balance(&self, account: &AccountId) -> Amount {
        use conclave_task::TokenPort;
        self.exec.token().balance(account)
    }

    // =========================================================================
    // TASK OPERATIONS
    // =========================================================================

    /// Register a new task. Administrator only.
    pub fn create_task(
        &mut self,
        caller: &MemberId,
        params: TaskParams,
        now_ms: u64,
    ) -> Result<TaskId, EngineError> {
        if caller != self.exec.administrator() {
            return Err(EngineError::PermissionDenied {
                caller: caller.clone(),
                operation: "create_task",
            });
        }
        self.exec.create_task(params, now_ms)
    }

    /// Accept funding into a task's custody account.
    pub fn fund_task(
        &mut self,
        task_id: TaskId,
        from: &AccountId,
        amount: Amount,
    ) -> Result<(), EngineError> {
        let (tasks, token) = self.exec.tasks_and_token_mut();
        let task = tasks
            .get_mut(&task_id)
            .ok_or(EngineError::UnknownTask(task_id))?;
        task.fund(token, from, amount)?;
        Ok(())
    }

    /// All registered tasks, in no particular order.
    pub fn tasks(&self) -> impl Iterator<Item = &conclave_task::Task> {
        self.exec.tasks()
    }

    /// The task's observable state, derived from the live balance.
    pub fn task_state(&self, task_id: TaskId) -> Result<TaskState, EngineError> {
        Ok(self.exec.task(task_id)?.observable_state(self.exec.token()))
    }

    /// Funds currently held by the task.
    pub fn task_balance(&self, task_id: TaskId) -> Result<Amount, EngineError> {
        Ok(self.exec.task(task_id)?.held_balance(self.exec.token()))
    }

    pub fn set_assignee(
        &mut self,
        caller: &MemberId,
        task_id: TaskId,
        assignee: MemberId,
    ) -> Result<(), EngineError> {
        self.exec.task_mut(task_id)?.set_assignee(caller, assignee)?;
        Ok(())
    }

    pub fn set_output(
        &mut self,
        caller: &MemberId,
        task_id: TaskId,
        output: AccountId,
    ) -> Result<(), EngineError> {
        self.exec.task_mut(task_id)?.set_output(caller, output)?;
        Ok(())
    }

    pub fn start_task(
        &mut self,
        caller: &MemberId,
        task_id: TaskId,
        assignee: Option<MemberId>,
        now_ms: u64,
    ) -> Result<(), EngineError> {
        let (tasks, token) = self.exec.tasks_and_token_mut();
        let task = tasks
            .get_mut(&task_id)
            .ok_or(EngineError::UnknownTask(task_id))?;
        task.start(caller, assignee, &*token, now_ms)?;
        Ok(())
    }

    pub fn mark_complete(&mut self, caller: &MemberId, task_id: TaskId) -> Result<(), EngineError> {
        self.exec.task_mut(task_id)?.mark_complete(caller)?;
        Ok(())
    }

    pub fn evaluate_task(
        &mut self,
        caller: &MemberId,
        task_id: TaskId,
        amount: Amount,
    ) -> Result<(), EngineError> {
        self.exec.task_mut(task_id)?.evaluate_cost(caller, amount)?;
        Ok(())
    }

    /// Payer's explicit completion confirmation on a prepaid task.
    pub fn confirm_task(&mut self, caller: &AccountId, task_id: TaskId) -> Result<(), EngineError> {
        let (tasks, token) = self.exec.tasks_and_token_mut();
        let task = tasks
            .get_mut(&task_id)
            .ok_or(EngineError::UnknownTask(task_id))?;
        task.confirm_completion(caller, &*token)?;
        Ok(())
    }

    /// Release a task's held balance to its payout destination.
    /// Callable by anyone once the funds are releasable.
    pub fn payout_task(&mut self, task_id: TaskId) -> Result<(), EngineError> {
        let (tasks, token) = self.exec.tasks_and_token_mut();
        let task = tasks
            .get_mut(&task_id)
            .ok_or(EngineError::UnknownTask(task_id))?;
        task.payout(token)?;
        Ok(())
    }

    pub fn cancel_task(
        &mut self,
        caller: &MemberId,
        task_id: TaskId,
        now_ms: u64,
    ) -> Result<(), EngineError> {
        let (tasks, token) = self.exec.tasks_and_token_mut();
        let task = tasks
            .get_mut(&task_id)
            .ok_or(EngineError::UnknownTask(task_id))?;
        task.cancel(caller, token, now_ms)?;
        Ok(())
    }

    pub fn miss_deadline(
        &mut self,
        caller: &MemberId,
        task_id: TaskId,
        now_ms: u64,
    ) -> Result<(), EngineError> {
        let (tasks, token) = self.exec.tasks_and_token_mut();
        let task = tasks
            .get_mut(&task_id)
            .ok_or(EngineError::UnknownTask(task_id))?;
        task.miss_deadline(caller, token, now_ms)?;
        Ok(())
    }

    // =========================================================================
    // GOVERNANCE OPERATIONS
    // =========================================================================

    /// Set the voting configuration for a guarded action name.
    pub fn configure_voting(
        &mut self,
        caller: &MemberId,
        action: ActionName,
        config: VotingConfig,
    ) -> Result<(), EngineError> {
        self.controller.configure(caller, action, config)?;
        Ok(())
    }

    /// Invoke a guarded action: direct execution when the directory
    /// permits it, otherwise a proposal bound to a new voting instance.
    pub fn invoke(
        &mut self,
        caller: &MemberId,
        call: ActionCall,
        now_ms: u64,
    ) -> Result<InvokeOutcome, EngineError> {
        let outcome = self.controller.invoke(caller, call, now_ms, &mut self.exec)?;
        Ok(outcome)
    }

    /// Cast a ballot on an open proposal. A winning ballot executes the
    /// deferred action before this call returns.
    pub fn vote(
        &mut self,
        proposal_id: ProposalId,
        voter: &MemberId,
        choice: BallotChoice,
        now_ms: u64,
    ) -> Result<VotingStatus, EngineError> {
        let status =
            self.controller
                .cast_ballot(proposal_id, voter, choice, now_ms, &mut self.exec)?;
        Ok(status)
    }

    pub fn proposal(&self, id: ProposalId) -> Option<&Proposal> {
        self.controller.proposal(id)
    }

    pub fn proposals(&self) -> &[Proposal] {
        self.controller.proposals()
    }
}
