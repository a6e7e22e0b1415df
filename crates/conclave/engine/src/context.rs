//! The execution context: the engine's mutable world state and the
//! dispatcher that runs named actions against it.

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::json;
use tracing::info;

use conclave_actions::{ActionDispatcher, DispatchError};
use conclave_directory::{InMemoryDirectory, PermissionOracle};
use conclave_task::{InMemoryToken, Task, TaskParams, TokenPort};
use conclave_types::{AccountId, ActionCall, ActionName, Amount, GroupId, MemberId, TaskId};

use crate::error::EngineError;

/// Named actions routable through the guarded invocation path.
pub mod actions {
    pub const TASK_CREATE: &str = "task.create";
    pub const TASK_START: &str = "task.start";
    pub const TASK_CANCEL: &str = "task.cancel";
    pub const TASK_PAYOUT: &str = "task.payout";
    pub const TASK_SET_OUTPUT: &str = "task.set_output";
    pub const TASK_SET_ASSIGNEE: &str = "task.set_assignee";
    pub const TREASURY_FLUSH: &str = "treasury.flush";
}

#[derive(Deserialize)]
struct CreateTaskArgs {
    needed: Amount,
    #[serde(default)]
    is_postpaid: bool,
    #[serde(default)]
    is_donation: bool,
    #[serde(default)]
    time_to_cancel_ms: u64,
    #[serde(default)]
    deadline_ms: u64,
}

#[derive(Deserialize)]
struct TaskRefArgs {
    task_id: TaskId,
}

#[derive(Deserialize)]
struct StartTaskArgs {
    task_id: TaskId,
    #[serde(default)]
    assignee: Option<MemberId>,
}

#[derive(Deserialize)]
struct SetOutputArgs {
    task_id: TaskId,
    output: AccountId,
}

#[derive(Deserialize)]
struct SetAssigneeArgs {
    task_id: TaskId,
    assignee: MemberId,
}

#[derive(Deserialize)]
struct FlushArgs {
    from: AccountId,
    to: AccountId,
}

/// Owns the directory, the token custody port, and the task registry.
///
/// Dispatched actions run here with the organization's authority (the
/// administrator identity): the controller has already decided that the
/// call is authorized, either by a direct grant or by a won vote.
pub struct ExecutionContext {
    administrator: MemberId,
    directory: InMemoryDirectory,
    token: InMemoryToken,
    tasks: HashMap<TaskId, Task>,
}

impl ExecutionContext {
    pub fn new(administrator: MemberId) -> Self {
        Self {
            administrator,
            directory: InMemoryDirectory::new(),
            token: InMemoryToken::new(),
            tasks: HashMap::new(),
        }
    }

    pub fn administrator(&self) -> &MemberId {
        &self.administrator
    }

    pub fn directory(&self) -> &InMemoryDirectory {
        &self.directory
    }

    pub fn directory_mut(&mut self) -> &mut InMemoryDirectory {
        &mut self.directory
    }

    pub fn token(&self) -> &InMemoryToken {
        &self.token
    }

    pub fn token_mut(&mut self) -> &mut InMemoryToken {
        &mut self.token
    }

    pub fn task(&self, id: TaskId) -> Result<&Task, EngineError> {
        self.tasks.get(&id).ok_or(EngineError::UnknownTask(id))
    }

    pub fn task_mut(&mut self, id: TaskId) -> Result<&mut Task, EngineError> {
        self.tasks.get_mut(&id).ok_or(EngineError::UnknownTask(id))
    }

    pub fn tasks(&self) -> impl Iterator<Item = &Task> {
        self.tasks.values()
    }

    /// Split borrow of the task registry and the token port, for
    /// operations that mutate a task while moving funds.
    pub fn tasks_and_token_mut(&mut self) -> (&mut HashMap<TaskId, Task>, &mut InMemoryToken) {
        (&mut self.tasks, &mut self.token)
    }

    /// Register a new task under the organization's administrator.
    pub fn create_task(&mut self, params: TaskParams, now_ms: u64) -> Result<TaskId, EngineError> {
        let id = TaskId::generate();
        let task = Task::create(id, self.administrator.clone(), params, now_ms)?;
        self.tasks.insert(id, task);
        Ok(id)
    }

    /// Move an account's entire balance to a destination. This is the
    /// release path for donation endpoints and similar pooled accounts.
    pub fn flush_account(&mut self, from: &AccountId, to: &AccountId) -> Result<Amount, EngineError> {
        let amount = self.token.balance(from);
        self.token.transfer(from, to, amount)?;
        info!(%from, %to, amount, "account flushed");
        Ok(amount)
    }
}

impl PermissionOracle for ExecutionContext {
    fn can_act_directly(&self, who: &MemberId, action: &ActionName) -> bool {
        self.directory.can_act_directly(who, action)
    }

    fn is_group_member(&self, who: &MemberId, group: &GroupId) -> bool {
        self.directory.is_group_member(who, group)
    }

    fn group_size(&self, group: &GroupId) -> u32 {
        self.directory.group_size(group)
    }
}

impl ActionDispatcher for ExecutionContext {
    fn dispatch(
        &mut self,
        call: &ActionCall,
        now_ms: u64,
    ) -> Result<serde_json::Value, DispatchError> {
        let action = call.action.clone();
        info!(%action, "dispatching action");
        match action.0.as_str() {
            actions::TASK_CREATE => {
                let args: CreateTaskArgs = decode(&action, &call.args)?;
                let id = self
                    .create_task(
                        TaskParams {
                            needed: args.needed,
                            is_postpaid: args.is_postpaid,
                            is_donation: args.is_donation,
                            time_to_cancel_ms: args.time_to_cancel_ms,
                            deadline_ms: args.deadline_ms,
                        },
                        now_ms,
                    )
                    .map_err(failed)?;
                Ok(json!({ "task_id": id }))
            }
            actions::TASK_START => {
                let args: StartTaskArgs = decode(&action, &call.args)?;
                let admin = self.administrator.clone();
                let task = self.tasks.get_mut(&args.task_id).ok_or_else(|| {
                    failed(EngineError::UnknownTask(args.task_id))
                })?;
                // Split borrow: the token port is read-only here.
                task.start(&admin, args.assignee, &self.token, now_ms)
                    .map_err(|err| failed(EngineError::Task(err)))?;
                Ok(json!({ "task_id": args.task_id }))
            }
            actions::TASK_CANCEL => {
                let args: TaskRefArgs = decode(&action, &call.args)?;
                let admin = self.administrator.clone();
                let task = self.tasks.get_mut(&args.task_id).ok_or_else(|| {
                    failed(EngineError::UnknownTask(args.task_id))
                })?;
                task.cancel(&admin, &mut self.token, now_ms)
                    .map_err(|err| failed(EngineError::Task(err)))?;
                Ok(json!({ "task_id": args.task_id }))
            }
            actions::TASK_PAYOUT => {
                let args: TaskRefArgs = decode(&action, &call.args)?;
                let task = self.tasks.get_mut(&args.task_id).ok_or_else(|| {
                    failed(EngineError::UnknownTask(args.task_id))
                })?;
                task.payout(&mut self.token)
                    .map_err(|err| failed(EngineError::Task(err)))?;
                Ok(json!({ "task_id": args.task_id }))
            }
            actions::TASK_SET_OUTPUT => {
                let args: SetOutputArgs = decode(&action, &call.args)?;
                let admin = self.administrator.clone();
                let task = self.tasks.get_mut(&args.task_id).ok_or_else(|| {
                    failed(EngineError::UnknownTask(args.task_id))
                })?;
                task.set_output(&admin, args.output)
                    .map_err(|err| failed(EngineError::Task(err)))?;
                Ok(json!({ "task_id": args.task_id }))
            }
            actions::TASK_SET_ASSIGNEE => {
                let args: SetAssigneeArgs = decode(&action, &call.args)?;
                let admin = self.administrator.clone();
                let task = self.tasks.get_mut(&args.task_id).ok_or_else(|| {
                    failed(EngineError::UnknownTask(args.task_id))
                })?;
                task.set_assignee(&admin, args.assignee)
                    .map_err(|err| failed(EngineError::Task(err)))?;
                Ok(json!({ "task_id": args.task_id }))
            }
            actions::TREASURY_FLUSH => {
                let args: FlushArgs = decode(&action, &call.args)?;
                let amount = self
                    .flush_account(&args.from, &args.to)
                    .map_err(failed)?;
                Ok(json!({ "amount": amount }))
            }
            _ => Err(DispatchError::UnknownAction(action)),
        }
    }
}

fn decode<T: serde::de::DeserializeOwned>(
    action: &ActionName,
    args: &serde_json::Value,
) -> Result<T, DispatchError> {
    serde_json::from_value(args.clone()).map_err(|err| DispatchError::InvalidArgs {
        action: action.clone(),
        reason: err.to_string(),
    })
}

fn failed(err: EngineError) -> DispatchError {
    DispatchError::Failed(err.to_string())
}
