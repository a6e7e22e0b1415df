//! End-to-end scenarios across the directory, token custody, tasks, and
//! the action controller.

use conclave_actions::{InvokeOutcome, VotingConfig};
use conclave_engine::{actions, Engine, EngineError};
use conclave_task::{TaskParams, TaskState};
use conclave_types::{
    AccountId, ActionCall, ActionName, BallotChoice, GroupId, MemberId, ProposalId,
};
use conclave_voting::{VotingKind, VotingStatus};
use serde_json::json;

const T0: u64 = 1_700_000_000_000;
const HOUR: u64 = 3_600_000;
const DAY: u64 = 86_400_000;

fn admin() -> MemberId {
    MemberId::new("admin")
}

fn employees() -> GroupId {
    GroupId::new("Employees")
}

fn config(quorum: u8, consensus: u8) -> VotingConfig {
    VotingConfig {
        kind: VotingKind::OneMemberOneVote,
        duration_ms: HOUR,
        group: employees(),
        quorum_percent: quorum,
        consensus_percent: consensus,
        reserved_param: 0,
    }
}

fn engine_with_members(members: &[&str]) -> Engine {
    let mut engine = Engine::new(admin());
    for member in members {
        let member = MemberId::new(*member);
        engine.directory_mut().add_to_group(&employees(), &member);
    }
    engine
}

fn pending(outcome: InvokeOutcome) -> ProposalId {
    match outcome {
        InvokeOutcome::Pending(id) => id,
        other => panic!("expected a pending proposal, got {other:?}"),
    }
}

#[test]
fn donation_release_requires_and_obeys_the_vote() {
    let mut engine = engine_with_members(&["alice", "bob"]);
    let alice = MemberId::new("alice");
    let bob = MemberId::new("bob");

    engine
        .configure_voting(&admin(), ActionName::new(actions::TREASURY_FLUSH), config(51, 50))
        .unwrap();

    let donations = AccountId::new("donations");
    let cause = AccountId::new("cause");
    engine.token_mut().mint(&donations, 500);

    // Alice lacks a direct grant: the call becomes a proposal and the
    // funds have not moved.
    let call = ActionCall::new(
        ActionName::new(actions::TREASURY_FLUSH),
        json!({ "from": "donations", "to": "cause" }),
    );
    let id = pending(engine.invoke(&alice, call, T0).unwrap());

    let proposal = engine.proposal(id).unwrap();
    assert_eq!(proposal.voting().status(T0), VotingStatus::Open);
    assert_eq!(proposal.voting().tally().yes, 1); // proposer's implicit yes
    assert!(!proposal.is_executed());
    assert_eq!(engine.account_balance(&cause), 0);
    assert_eq!(engine.account_balance(&donations), 500);

    // Bob's yes reaches quorum (2 of 2 >= 51%) and consensus (2 of 2 >=
    // 50%): the flush executes in the same call, exactly once.
    let status = engine.vote(id, &bob, BallotChoice::Yes, T0 + 1).unwrap();
    assert_eq!(status, VotingStatus::FinishedYes);

    let proposal = engine.proposal(id).unwrap();
    assert!(proposal.is_executed());
    assert_eq!(
        proposal.voting().tally(),
        conclave_voting::Tally {
            yes: 2,
            no: 0,
            total_members: 2
        }
    );
    assert_eq!(engine.account_balance(&cause), 500);
    assert_eq!(engine.account_balance(&donations), 0);

    // The vote is closed; nothing can run it again.
    let err = engine
        .vote(id, &alice, BallotChoice::Yes, T0 + 2)
        .unwrap_err();
    assert!(matches!(err, EngineError::Action(_)));
    assert_eq!(engine.account_balance(&cause), 500);
}

#[test]
fn direct_grant_skips_the_vote_entirely() {
    let mut engine = engine_with_members(&["alice", "bob"]);
    let bob = MemberId::new("bob");

    let flush = ActionName::new(actions::TREASURY_FLUSH);
    engine.directory_mut().grant_direct(&flush, &bob);

    let donations = AccountId::new("donations");
    engine.token_mut().mint(&donations, 300);

    let call = ActionCall::new(flush, json!({ "from": "donations", "to": "cause" }));
    let outcome = engine.invoke(&bob, call, T0).unwrap();

    assert!(matches!(outcome, InvokeOutcome::ExecutedDirectly(_)));
    assert!(engine.proposals().is_empty());
    assert_eq!(engine.account_balance(&AccountId::new("cause")), 300);
}

#[test]
fn unconfigured_guarded_action_is_refused() {
    let mut engine = engine_with_members(&["alice"]);
    let call = ActionCall::new(ActionName::new(actions::TASK_CANCEL), json!({}));
    let err = engine.invoke(&MemberId::new("alice"), call, T0).unwrap_err();
    assert!(matches!(
        err,
        EngineError::Action(conclave_actions::ActionError::UnconfiguredAction(_))
    ));
}

#[test]
fn prepaid_task_funding_drives_derived_state() {
    let mut engine = engine_with_members(&[]);
    let payer = AccountId::new("payer");
    engine.token_mut().mint(&payer, 10_000);

    let task = engine
        .create_task(
            &admin(),
            TaskParams {
                needed: 1000,
                is_postpaid: false,
                is_donation: false,
                time_to_cancel_ms: DAY,
                deadline_ms: 7 * DAY,
            },
            T0,
        )
        .unwrap();

    engine.fund_task(task, &payer, 999).unwrap();
    assert_eq!(engine.task_state(task).unwrap(), TaskState::Init);

    engine.fund_task(task, &payer, 1).unwrap();
    assert_eq!(engine.task_state(task).unwrap(), TaskState::PrePaid);
    assert_eq!(engine.task_balance(task).unwrap(), 1000);
}

#[test]
fn unknown_cost_task_self_prices_and_pays_out() {
    let mut engine = engine_with_members(&[]);
    let worker = MemberId::new("worker");
    let payer = AccountId::new("payer");
    let shop = AccountId::new("shop");
    engine.token_mut().mint(&payer, 10_000);

    let task = engine
        .create_task(
            &admin(),
            TaskParams {
                needed: 0,
                is_postpaid: true,
                is_donation: false,
                time_to_cancel_ms: DAY,
                deadline_ms: 7 * DAY,
            },
            T0,
        )
        .unwrap();
    engine.set_output(&admin(), task, shop.clone()).unwrap();
    engine
        .start_task(&admin(), task, Some(worker.clone()), T0)
        .unwrap();

    engine.mark_complete(&worker, task).unwrap();
    assert_eq!(
        engine.task_state(task).unwrap(),
        TaskState::CompleteButNeedsEvaluation
    );

    // Funding before evaluation fixes the cost and completes funding in
    // the same call.
    engine.fund_task(task, &payer, 420).unwrap();
    assert_eq!(engine.task_state(task).unwrap(), TaskState::CanGetFunds);

    engine.payout_task(task).unwrap();
    assert_eq!(engine.task_state(task).unwrap(), TaskState::Finished);
    assert_eq!(engine.account_balance(&shop), 420);
}

#[test]
fn task_payout_can_be_gated_behind_a_vote() {
    let mut engine = engine_with_members(&["alice", "bob"]);
    let alice = MemberId::new("alice");
    let bob = MemberId::new("bob");
    let payer = AccountId::new("payer");
    let shop = AccountId::new("shop");
    engine.token_mut().mint(&payer, 10_000);

    engine
        .configure_voting(&admin(), ActionName::new(actions::TASK_PAYOUT), config(51, 50))
        .unwrap();

    let task = engine
        .create_task(
            &admin(),
            TaskParams {
                needed: 500,
                is_postpaid: true,
                is_donation: false,
                time_to_cancel_ms: DAY,
                deadline_ms: 7 * DAY,
            },
            T0,
        )
        .unwrap();
    engine.set_output(&admin(), task, shop.clone()).unwrap();
    engine
        .start_task(&admin(), task, Some(alice.clone()), T0)
        .unwrap();
    engine.mark_complete(&alice, task).unwrap();
    engine.fund_task(task, &payer, 500).unwrap();
    assert_eq!(engine.task_state(task).unwrap(), TaskState::CanGetFunds);

    let call = ActionCall::new(
        ActionName::new(actions::TASK_PAYOUT),
        json!({ "task_id": task }),
    );
    let id = pending(engine.invoke(&alice, call, T0 + 1).unwrap());

    // Nothing paid out while the vote is open.
    assert_eq!(engine.task_state(task).unwrap(), TaskState::CanGetFunds);
    assert_eq!(engine.account_balance(&shop), 0);

    let status = engine.vote(id, &bob, BallotChoice::Yes, T0 + 2).unwrap();
    assert_eq!(status, VotingStatus::FinishedYes);
    assert_eq!(engine.task_state(task).unwrap(), TaskState::Finished);
    assert_eq!(engine.account_balance(&shop), 500);
}

#[test]
fn solo_group_creates_tasks_through_governance() {
    let mut engine = engine_with_members(&["alice"]);
    let alice = MemberId::new("alice");

    engine
        .configure_voting(&admin(), ActionName::new(actions::TASK_CREATE), config(51, 50))
        .unwrap();

    let call = ActionCall::new(
        ActionName::new(actions::TASK_CREATE),
        json!({ "needed": 2000, "is_postpaid": false, "time_to_cancel_ms": DAY }),
    );
    let id = pending(engine.invoke(&alice, call, T0).unwrap());

    // A one-member electorate: the implicit proposer ballot already wins
    // the vote, so the task exists before invoke returns.
    assert!(engine.proposal(id).unwrap().is_executed());
    let task = engine.tasks().next().expect("task registered");
    assert_eq!(task.needed(), 2000);
    assert_eq!(task.administrator(), &admin());
}

#[test]
fn expired_vote_finalizes_no_and_releases_nothing() {
    let mut engine = engine_with_members(&["alice", "bob", "carol"]);
    let alice = MemberId::new("alice");

    engine
        .configure_voting(&admin(), ActionName::new(actions::TREASURY_FLUSH), config(100, 50))
        .unwrap();
    engine.token_mut().mint(&AccountId::new("donations"), 500);

    let call = ActionCall::new(
        ActionName::new(actions::TREASURY_FLUSH),
        json!({ "from": "donations", "to": "cause" }),
    );
    let id = pending(engine.invoke(&alice, call, T0).unwrap());

    // Only one of three voted; after the window the instance is a no.
    let proposal = engine.proposal(id).unwrap();
    assert_eq!(proposal.voting().status(T0 + HOUR), VotingStatus::FinishedNo);
    assert!(!proposal.is_executed());
    assert_eq!(engine.account_balance(&AccountId::new("cause")), 0);

    // Late ballots are rejected.
    let err = engine
        .vote(id, &MemberId::new("bob"), BallotChoice::Yes, T0 + HOUR)
        .unwrap_err();
    assert!(matches!(err, EngineError::Action(_)));
}

#[test]
fn failed_deferred_action_reports_but_never_retries() {
    let mut engine = engine_with_members(&["alice", "bob"]);
    let alice = MemberId::new("alice");
    let bob = MemberId::new("bob");

    // A payout with no destination set fails at execution time.
    engine
        .configure_voting(&admin(), ActionName::new(actions::TASK_PAYOUT), config(51, 50))
        .unwrap();
    let payer = AccountId::new("payer");
    engine.token_mut().mint(&payer, 1_000);
    let task = engine
        .create_task(
            &admin(),
            TaskParams {
                needed: 500,
                is_postpaid: true,
                is_donation: false,
                time_to_cancel_ms: DAY,
                deadline_ms: 7 * DAY,
            },
            T0,
        )
        .unwrap();
    engine
        .start_task(&admin(), task, Some(alice.clone()), T0)
        .unwrap();
    engine.mark_complete(&alice, task).unwrap();
    engine.fund_task(task, &payer, 500).unwrap();
    // No payout destination was ever set.

    let call = ActionCall::new(
        ActionName::new(actions::TASK_PAYOUT),
        json!({ "task_id": task }),
    );
    let id = pending(engine.invoke(&alice, call, T0 + 1).unwrap());

    let err = engine.vote(id, &bob, BallotChoice::Yes, T0 + 2).unwrap_err();
    assert!(matches!(err, EngineError::Action(_)));

    // The execution slot is spent, the vote stays won, the funds stay
    // put.
    let proposal = engine.proposal(id).unwrap();
    assert!(proposal.is_executed());
    assert!(proposal.voting().is_yes(T0 + 2));
    assert_eq!(engine.task_balance(task).unwrap(), 500);
}
