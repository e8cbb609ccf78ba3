mod common;

use common::harness;
use coop_wizard::{
    errors::WizardError,
    flows::investment::{PLAN, REVIEW},
    wizard::{
        flow::FlowKind,
        sequencer::SequencerError,
        session::{Completion, StepOutcome},
        value::FieldValue,
    },
};

fn choose_plan(h: &mut common::Harness, amount: f64) {
    h.wizard.set_field("planId", "mutual-fund");
    h.wizard.set_field("amount", amount);
}

#[tokio::test]
async fn duration_starts_from_its_default() {
    let h = harness(FlowKind::InvestmentSubscription);

    assert_eq!(h.wizard.field("durationMonths"), Some(&FieldValue::Number(6.0)));
    assert_eq!(h.wizard.position(), (1, 2));
}

#[tokio::test]
async fn amount_is_capped_by_wallet_balance() {
    let mut h = harness(FlowKind::InvestmentSubscription);
    choose_plan(&mut h, 60_000.0);

    assert!(matches!(
        h.wizard.next().await,
        Err(WizardError::Invalid(_))
    ));
    assert_eq!(
        h.wizard.field_errors().get("amount"),
        Some("Insufficient wallet balance")
    );
    assert_eq!(h.wizard.current_step(), PLAN);
}

#[tokio::test]
async fn confirm_without_preview_is_refused() {
    let mut h = harness(FlowKind::InvestmentSubscription);

    assert!(matches!(
        h.wizard.confirm().await,
        Err(WizardError::Sequencer(SequencerError::NoGateOpen))
    ));
}

#[tokio::test]
async fn cancelled_preview_can_be_reopened_and_confirmed() {
    let mut h = harness(FlowKind::InvestmentSubscription);
    choose_plan(&mut h, 20_000.0);
    assert_eq!(h.wizard.next().await.unwrap(), StepOutcome::Advanced(REVIEW));
    h.wizard.set_field("acceptTerms", true);

    assert_eq!(
        h.wizard.next().await.unwrap(),
        StepOutcome::AwaitingConfirmation(REVIEW)
    );
    h.wizard.cancel_confirmation();
    assert!(!h.wizard.confirmation_open());
    assert_eq!(h.backend.calls_to("submit_application"), 0);

    h.wizard.next().await.unwrap();
    let outcome = h.wizard.confirm().await.unwrap();

    assert_eq!(
        outcome,
        StepOutcome::Finished(Completion {
            flow: FlowKind::InvestmentSubscription,
            reference: Some("APP-0001".into()),
        })
    );
    let payload = &h.backend.submissions()[0];
    assert_eq!(payload.get("plan_id"), Some(&serde_json::json!("mutual-fund")));
    assert_eq!(payload.get("amount"), Some(&serde_json::json!(20000)));
    assert_eq!(payload.get("duration_months"), Some(&serde_json::json!(6)));
    assert_eq!(payload.get("user_id"), Some(&serde_json::json!("u-1")));
    assert!(payload.get("acceptTerms").is_none());
}

#[tokio::test]
async fn unchecked_terms_close_the_preview() {
    let mut h = harness(FlowKind::InvestmentSubscription);
    choose_plan(&mut h, 20_000.0);
    h.wizard.next().await.unwrap();
    h.wizard.set_field("acceptTerms", true);
    h.wizard.next().await.unwrap();

    h.wizard.set_field("acceptTerms", false);
    let err = h.wizard.confirm().await.unwrap_err();

    assert!(matches!(err, WizardError::Invalid(_)));
    assert!(!h.wizard.confirmation_open());
    assert_eq!(h.backend.calls_to("submit_application"), 0);
}
