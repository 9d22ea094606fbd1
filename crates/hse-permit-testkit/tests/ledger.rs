//! Property tests over random action sequences.
//!
//! Whatever the actors try, the ledger only grows at its tail and refused
//! actions change nothing. Accepted actions land where the permission rules
//! say they should.

use hse_permit::perms::{authorize_close, authorize_submit, authorize_suspend, decide, Actor};
use hse_permit::WorkflowError;
use hse_permit_core::{PermitPatch, PermitStatus, Role};
use hse_permit_store::Store;
use hse_permit_testkit::{role, TestFixture};
use proptest::prelude::*;
use tracing_subscriber::filter::LevelFilter;

#[derive(Debug, Clone)]
enum Step {
    Submit(Role),
    Approve(Role),
    Suspend(Role),
    Close(Role),
    Edit(Role),
}

fn step() -> impl Strategy<Value = Step> {
    prop_oneof![
        1 => role().prop_map(Step::Submit),
        3 => role().prop_map(Step::Approve),
        1 => role().prop_map(Step::Suspend),
        1 => role().prop_map(Step::Close),
        1 => role().prop_map(Step::Edit),
    ]
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(LevelFilter::WARN)
        .try_init();
}

async fn walk(steps: Vec<Step>) -> Result<(), TestCaseError> {
    let fx = TestFixture::new();
    let permit = fx
        .draft_permit()
        .await
        .map_err(|e| TestCaseError::fail(e.to_string()))?;
    let store = fx.service.store();

    let mut ledger = store
        .list_approvals(&permit.id)
        .await
        .map_err(|e| TestCaseError::fail(e.to_string()))?;
    let mut current = permit;

    for step in steps {
        let actor: Actor = match &step {
            Step::Submit(r) | Step::Approve(r) | Step::Suspend(r) | Step::Close(r) | Step::Edit(r) => {
                fx.actors.with_role(*r)
            }
        };

        let is_edit = matches!(step, Step::Edit(_));
        let (outcome, expected) = match step {
            Step::Submit(_) => (
                fx.service.submit(&current.id, &actor).await.map(|_| ()),
                authorize_submit(&current, &actor).ok(),
            ),
            Step::Approve(_) => (
                fx.service
                    .attempt_approval(&current.id, &actor, None, None)
                    .await
                    .map(|_| ()),
                decide(current.status, actor.role).ok().map(|t| t.next_status),
            ),
            Step::Suspend(_) => (
                fx.service
                    .suspend(&current.id, &actor, "contrôle")
                    .await
                    .map(|_| ()),
                authorize_suspend(current.status, actor.role).ok(),
            ),
            Step::Close(_) => (
                fx.service.close(&current.id, &actor).await.map(|_| ()),
                authorize_close(&current, &actor).ok(),
            ),
            Step::Edit(_) => {
                let patch = PermitPatch {
                    description: Some(format!("rev {}", current.revision)),
                    ..Default::default()
                };
                let result = fx.service.update_permit(&current.id, &actor, patch).await;
                let expected = result.as_ref().ok().map(|p| p.status);
                (result.map(|_| ()), expected)
            }
        };

        let view = fx
            .service
            .get_permit(&current.id)
            .await
            .map_err(|e| TestCaseError::fail(e.to_string()))?;

        prop_assert!(ledger.is_prefix_of(&view.approvals));
        match outcome {
            Ok(()) => {
                let next = expected.ok_or_else(|| {
                    TestCaseError::fail("service accepted an action the rules refuse")
                })?;
                prop_assert_eq!(view.permit.status, next);
                prop_assert!(view.permit.revision >= current.revision);
                if !is_edit {
                    prop_assert!(current.status != PermitStatus::Cloture);
                }
            }
            Err(WorkflowError::Unauthorized(_)) | Err(WorkflowError::Forbidden(_)) => {
                prop_assert_eq!(&view.permit, &current);
                prop_assert_eq!(view.approvals.len(), ledger.len());
            }
            Err(other) => return Err(TestCaseError::fail(other.to_string())),
        }

        ledger = view.approvals;
        current = view.permit;
    }
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn random_walk_keeps_ledger_append_only(steps in prop::collection::vec(step(), 1..24)) {
        init_tracing();
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| TestCaseError::fail(e.to_string()))?;
        rt.block_on(walk(steps))?;
    }
}
