//! The task/expense state machine.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use conclave_types::{AccountId, Amount, MemberId, TaskId};

use crate::error::TaskError;
use crate::token::TokenPort;

/// Observable task states.
///
/// `PrePaid` and `CanGetFunds` are derived at read time from the stored
/// state plus the live held balance; `CanGetFunds` can additionally be
/// stored directly by the payer's explicit completion confirmation on a
/// prepaid task.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskState {
    /// Created, not yet started.
    Init,
    /// Cancelled before work began; any held funds have been refunded.
    Cancelled,
    /// Derived: a prepaid task whose funding target has been reached.
    PrePaid,
    /// Work underway.
    InProgress,
    /// Completed, but the cost was unknown at creation and awaits
    /// evaluation.
    CompleteButNeedsEvaluation,
    /// Completed with a known cost.
    Complete,
    /// Fully funded and releasable to the payout destination.
    CanGetFunds,
    /// Paid out; terminal.
    Finished,
    /// Deadline passed; any held funds have been refunded. Terminal.
    DeadlineMissed,
}

impl TaskState {
    /// Terminal states admit no further transitions and no funding;
    /// custody has already moved by the time they are set.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskState::Cancelled | TaskState::Finished | TaskState::DeadlineMissed
        )
    }
}

/// Creation-time parameters of a task.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskParams {
    /// Cost in minor units; zero means unknown until evaluated or
    /// self-priced.
    pub needed: Amount,
    /// Paid after completion rather than funded up front.
    pub is_postpaid: bool,
    /// The first inbound payment after completion fixes the cost.
    pub is_donation: bool,
    /// Minimum age before the administrator may cancel.
    pub time_to_cancel_ms: u64,
    /// Maximum working time after start before the deadline is missed.
    pub deadline_ms: u64,
}

/// A funded, time-boxed unit of work.
///
/// The task owns a custody account on the token port (derived from its
/// id) and is the only writer of that account. All time-sensitive guards
/// take an explicit `now_ms`; nothing fires on its own.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Task {
    id: TaskId,
    administrator: MemberId,
    employee: Option<MemberId>,
    output: Option<AccountId>,
    /// First funder; refunds return here.
    payer: Option<AccountId>,
    needed: Amount,
    is_postpaid: bool,
    is_donation: bool,
    created_at_ms: u64,
    started_at_ms: Option<u64>,
    time_to_cancel_ms: u64,
    deadline_ms: u64,
    state: TaskState,
}

impl Task {
    /// Create a task in `Init`.
    ///
    /// Prepaid non-donation tasks must carry a nonzero cost, and a
    /// donation task is always postpaid: its cost only exists once the
    /// first payment after completion fixes it.
    pub fn create(
        id: TaskId,
        administrator: MemberId,
        params: TaskParams,
        now_ms: u64,
    ) -> Result<Self, TaskError> {
        if !params.is_postpaid && !params.is_donation && params.needed == 0 {
            return Err(TaskError::InvalidParams(
                "a prepaid task needs a nonzero cost".into(),
            ));
        }
        if params.is_donation && !params.is_postpaid {
            return Err(TaskError::InvalidParams(
                "a donation task must be postpaid".into(),
            ));
        }
        if params.is_donation && params.needed != 0 {
            return Err(TaskError::InvalidParams(
                "a donation task self-prices; needed must start at zero".into(),
            ));
        }
        info!(task = %id, needed = params.needed, postpaid = params.is_postpaid,
              donation = params.is_donation, "task created");
        Ok(Self {
            id,
            administrator,
            employee: None,
            output: None,
            payer: None,
            needed: params.needed,
            is_postpaid: params.is_postpaid,
            is_donation: params.is_donation,
            created_at_ms: now_ms,
            started_at_ms: None,
            time_to_cancel_ms: params.time_to_cancel_ms,
            deadline_ms: params.deadline_ms,
            state: TaskState::Init,
        })
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    /// The custody account holding this task's funds.
    pub fn account(&self) -> AccountId {
        self.id.account()
    }

    pub fn administrator(&self) -> &MemberId {
        &self.administrator
    }

    pub fn employee(&self) -> Option<&MemberId> {
        self.employee.as_ref()
    }

    pub fn output(&self) -> Option<&AccountId> {
        self.output.as_ref()
    }

    pub fn payer(&self) -> Option<&AccountId> {
        self.payer.as_ref()
    }

    pub fn needed(&self) -> Amount {
        self.needed
    }

    pub fn is_postpaid(&self) -> bool {
        self.is_postpaid
    }

    pub fn is_donation(&self) -> bool {
        self.is_donation
    }

    /// Funds currently held in the task's custody account.
    pub fn held_balance(&self, token: &dyn TokenPort) -> Amount {
        token.balance(&self.account())
    }

    /// The externally observable state: a pure function of the stored
    /// state and the live balance, recomputed on every read.
    pub fn observable_state(&self, token: &dyn TokenPort) -> TaskState {
        let balance = self.held_balance(token);
        match self.state {
            TaskState::Init
                if !self.is_postpaid && self.needed != 0 && balance == self.needed =>
            {
                TaskState::PrePaid
            }
            TaskState::Complete
                if self.is_postpaid && self.needed != 0 && balance == self.needed =>
            {
                TaskState::CanGetFunds
            }
            stored => stored,
        }
    }

    /// Set or replace the assignee. Administrator only; refused once the
    /// task is terminal.
    pub fn set_assignee(&mut self, caller: &MemberId, assignee: MemberId) -> Result<(), TaskError> {
        self.require_admin(caller, "set_assignee")?;
        self.require_not_terminal("set_assignee")?;
        info!(task = %self.id, assignee = %assignee, "assignee set");
        self.employee = Some(assignee);
        Ok(())
    }

    /// Set or replace the payout destination. Administrator only;
    /// refused once the task is terminal.
    pub fn set_output(&mut self, caller: &MemberId, output: AccountId) -> Result<(), TaskError> {
        self.require_admin(caller, "set_output")?;
        self.require_not_terminal("set_output")?;
        info!(task = %self.id, output = %output, "payout destination set");
        self.output = Some(output);
        Ok(())
    }

    /// Accept inbound funding from `from`.
    ///
    /// If the cost is still unknown and the task is already complete (or
    /// complete-awaiting-evaluation), the first inbound amount becomes
    /// the cost and completes funding in the same call. Otherwise the
    /// payment must not push the held balance past the needed amount.
    pub fn fund(
        &mut self,
        token: &mut dyn TokenPort,
        from: &AccountId,
        amount: Amount,
    ) -> Result<(), TaskError> {
        if amount == 0 {
            return Err(TaskError::ZeroFunding);
        }
        self.require_not_terminal("fund")?;

        let held = self.held_balance(token);
        let self_pricing = self.needed == 0
            && matches!(
                self.state,
                TaskState::Complete | TaskState::CompleteButNeedsEvaluation
            );

        if self.needed == 0 && !self_pricing {
            return Err(TaskError::FundingNotOpen);
        }
        // Checked: the sum may not be representable, which certainly
        // exceeds any needed amount.
        let exceeds = held
            .checked_add(amount)
            .map_or(true, |total| total > self.needed);
        if !self_pricing && exceeds {
            return Err(TaskError::FundingExceedsNeeded {
                amount,
                held,
                needed: self.needed,
            });
        }

        token.transfer(from, &self.account(), amount)?;
        if self.payer.is_none() {
            self.payer = Some(from.clone());
        }
        if self_pricing {
            self.needed = amount;
            if self.state == TaskState::CompleteButNeedsEvaluation {
                self.state = TaskState::Complete;
            }
            info!(task = %self.id, needed = amount, "cost fixed by first inbound payment");
        }
        info!(task = %self.id, from = %from, amount, "funding accepted");
        Ok(())
    }

    /// Begin work: `Init` (postpaid) or `PrePaid` (funded prepaid) into
    /// `InProgress`. Allowed to the administrator or the assignee; a
    /// prepaid task must have reached its funding target first.
    pub fn start(
        &mut self,
        caller: &MemberId,
        assignee: Option<MemberId>,
        token: &dyn TokenPort,
        now_ms: u64,
    ) -> Result<(), TaskError> {
        if caller != &self.administrator && Some(caller) != self.employee.as_ref() {
            return Err(TaskError::PermissionDenied {
                caller: caller.clone(),
                operation: "start",
            });
        }
        let observable = self.observable_state(token);
        let startable = match observable {
            TaskState::PrePaid => true,
            TaskState::Init => self.is_postpaid,
            _ => false,
        };
        if !startable {
            return Err(self.bad_transition(
                "start",
                "task must be postpaid or fully prefunded to start",
            ));
        }
        if let Some(assignee) = assignee {
            self.employee = Some(assignee);
        }
        self.started_at_ms = Some(now_ms);
        self.state = TaskState::InProgress;
        info!(task = %self.id, employee = ?self.employee, "task started");
        Ok(())
    }

    /// Signal completion of the work. Allowed to the assignee or the
    /// administrator. Lands in `Complete` when the cost is known
    /// (nonzero, or a donation awaiting self-pricing), otherwise in
    /// `CompleteButNeedsEvaluation`.
    pub fn mark_complete(&mut self, caller: &MemberId) -> Result<(), TaskError> {
        if caller != &self.administrator && Some(caller) != self.employee.as_ref() {
            return Err(TaskError::PermissionDenied {
                caller: caller.clone(),
                operation: "mark_complete",
            });
        }
        if self.state != TaskState::InProgress {
            return Err(self.bad_transition("mark_complete", "task is not in progress"));
        }
        self.state = if self.needed != 0 || self.is_donation {
            TaskState::Complete
        } else {
            TaskState::CompleteButNeedsEvaluation
        };
        info!(task = %self.id, state = ?self.state, "completion signalled");
        Ok(())
    }

    /// Set the evaluated cost of a completed unknown-cost task, exactly
    /// once. Administrator only.
    pub fn evaluate_cost(&mut self, caller: &MemberId, amount: Amount) -> Result<(), TaskError> {
        self.require_admin(caller, "evaluate_cost")?;
        if self.state != TaskState::CompleteButNeedsEvaluation {
            return Err(self.bad_transition("evaluate_cost", "task is not awaiting evaluation"));
        }
        if self.needed != 0 {
            return Err(TaskError::CostAlreadySet);
        }
        if amount == 0 {
            return Err(TaskError::InvalidParams(
                "evaluated cost must be nonzero".into(),
            ));
        }
        self.needed = amount;
        self.state = TaskState::Complete;
        info!(task = %self.id, needed = amount, "cost evaluated");
        Ok(())
    }

    /// Payer's explicit completion confirmation on a prepaid task:
    /// `Complete` into `CanGetFunds`. The derived path does not apply to
    /// prepaid tasks, so the party who funded the work signs it off.
    pub fn confirm_completion(
        &mut self,
        caller: &AccountId,
        token: &dyn TokenPort,
    ) -> Result<(), TaskError> {
        if Some(caller) != self.payer.as_ref() {
            return Err(TaskError::PermissionDenied {
                caller: MemberId::new(caller.0.clone()),
                operation: "confirm_completion",
            });
        }
        if self.state != TaskState::Complete || self.is_postpaid {
            return Err(self.bad_transition(
                "confirm_completion",
                "only a completed prepaid task can be confirmed",
            ));
        }
        if self.needed == 0 || self.held_balance(token) != self.needed {
            return Err(self.bad_transition(
                "confirm_completion",
                "the confirmed cost must already be fully funded",
            ));
        }
        self.state = TaskState::CanGetFunds;
        info!(task = %self.id, "completion confirmed by payer");
        Ok(())
    }

    /// Release the entire held balance to the payout destination.
    /// Callable by anyone once the observable state is `CanGetFunds`.
    /// The terminal flag is set before funds move.
    pub fn payout(&mut self, token: &mut dyn TokenPort) -> Result<(), TaskError> {
        if self.observable_state(token) != TaskState::CanGetFunds {
            return Err(self.bad_transition("payout", "task funds are not releasable"));
        }
        let output = self
            .output
            .clone()
            .ok_or(TaskError::MissingPayoutDestination)?;
        let amount = self.held_balance(token);
        self.state = TaskState::Finished;
        token.transfer(&self.account(), &output, amount)?;
        info!(task = %self.id, output = %output, amount, "task paid out");
        Ok(())
    }

    /// Payout to a destination other than the configured output. This
    /// path is deliberately disabled and always fails.
    pub fn redirect_payout(
        &mut self,
        _destination: &AccountId,
        _token: &mut dyn TokenPort,
    ) -> Result<(), TaskError> {
        warn!(task = %self.id, "redirected payout attempted on disabled path");
        Err(TaskError::RedirectDisabled)
    }

    /// Cancel an unstarted task. Administrator only, and only once the
    /// task has aged past its cancellation window. Held funds are
    /// returned in full to the payer; the terminal flag is set before
    /// funds move.
    pub fn cancel(
        &mut self,
        caller: &MemberId,
        token: &mut dyn TokenPort,
        now_ms: u64,
    ) -> Result<(), TaskError> {
        self.require_admin(caller, "cancel")?;
        if self.state != TaskState::Init {
            return Err(self.bad_transition("cancel", "only an unstarted task can be cancelled"));
        }
        if now_ms < self.created_at_ms.saturating_add(self.time_to_cancel_ms) {
            return Err(self.bad_transition("cancel", "the cancellation window has not opened"));
        }
        self.require_refundable(token)?;
        self.state = TaskState::Cancelled;
        self.refund(token)?;
        info!(task = %self.id, "task cancelled");
        Ok(())
    }

    /// Declare the deadline missed. Administrator only, and only once
    /// the working time since start has reached the deadline. Held funds
    /// are returned to the payer; the terminal flag is set before funds
    /// move.
    pub fn miss_deadline(
        &mut self,
        caller: &MemberId,
        token: &mut dyn TokenPort,
        now_ms: u64,
    ) -> Result<(), TaskError> {
        self.require_admin(caller, "miss_deadline")?;
        if self.state != TaskState::InProgress {
            return Err(self.bad_transition("miss_deadline", "task is not in progress"));
        }
        let started = self.started_at_ms.unwrap_or(self.created_at_ms);
        if now_ms < started.saturating_add(self.deadline_ms) {
            return Err(self.bad_transition("miss_deadline", "the deadline has not passed"));
        }
        self.require_refundable(token)?;
        self.state = TaskState::DeadlineMissed;
        self.refund(token)?;
        warn!(task = %self.id, "deadline missed, funds refunded");
        Ok(())
    }

    /// A refunding transition needs a recorded payer for any held
    /// balance. Out-of-band transfers to the custody account leave no
    /// payer behind; the task must not go terminal over funds it cannot
    /// return.
    fn require_refundable(&self, token: &dyn TokenPort) -> Result<(), TaskError> {
        let held = self.held_balance(token);
        if held != 0 && self.payer.is_none() {
            return Err(TaskError::UnrefundableFunds { held });
        }
        Ok(())
    }

    fn refund(&self, token: &mut dyn TokenPort) -> Result<(), TaskError> {
        let amount = self.held_balance(token);
        if amount == 0 {
            return Ok(());
        }
        // Guaranteed by require_refundable before the state flipped.
        if let Some(payer) = &self.payer {
            token.transfer(&self.account(), payer, amount)?;
            info!(task = %self.id, payer = %payer, amount, "held funds refunded");
        }
        Ok(())
    }

    fn require_admin(&self, caller: &MemberId, operation: &'static str) -> Result<(), TaskError> {
        if caller != &self.administrator {
            return Err(TaskError::PermissionDenied {
                caller: caller.clone(),
                operation,
            });
        }
        Ok(())
    }

    fn require_not_terminal(&self, operation: &'static str) -> Result<(), TaskError> {
        if self.state.is_terminal() {
            return Err(self.bad_transition(operation, "task is terminal"));
        }
        Ok(())
    }

    fn bad_transition(&self, operation: &'static str, reason: &str) -> TaskError {
        TaskError::InvalidStateTransition {
            operation,
            state: self.state,
            reason: reason.into(),
        }
    }
}
