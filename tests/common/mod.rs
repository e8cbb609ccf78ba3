#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, TimeZone, Utc};
use coop_wizard::{
    config::WizardConfig,
    context::AppContext,
    dispatch::{memory::InMemoryBackend, Dispatcher},
    flows,
    utils::clock::Clock,
    wizard::{
        documents::{DocumentSet, DocumentSlot, FileRef},
        flow::FlowKind,
        session::{StepOutcome, Wizard},
    },
};

/// Clock that only moves when a test advances it.
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: Mutex::new(Utc.timestamp_opt(1_700_000_000, 0).unwrap()),
        }
    }

    pub fn advance_secs(&self, secs: i64) {
        let mut now = self.now.lock().unwrap();
        *now += Duration::seconds(secs);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

/// A wizard wired to an in-memory backend and a manual clock.
pub struct Harness {
    pub wizard: Wizard,
    pub backend: Arc<InMemoryBackend>,
    pub clock: Arc<ManualClock>,
}

pub fn harness(kind: FlowKind) -> Harness {
    harness_with(kind, InMemoryBackend::demo(), WizardConfig::default())
}

pub fn harness_with(kind: FlowKind, backend: InMemoryBackend, config: WizardConfig) -> Harness {
    coop_wizard::init();
    let backend = Arc::new(backend);
    let clock = Arc::new(ManualClock::new());
    let wizard = Wizard::new(
        flows::definition(kind, &config),
        AppContext::member("u-1", 50_000.0),
        Dispatcher::new(backend.clone()),
        clock.clone(),
        config,
    );
    Harness {
        wizard,
        backend,
        clock,
    }
}

pub fn documents(slots: &[DocumentSlot]) -> DocumentSet {
    let mut set = DocumentSet::new();
    for slot in slots {
        set.insert(*slot, FileRef::new(format!("{}.pdf", slot.key()), 2048));
    }
    set
}

pub fn fill_loan_details(wizard: &mut Wizard) {
    wizard.set_field("loanType", "personal");
    wizard.set_field("loanAmount", 150_000.0);
    wizard.set_field("tenureMonths", 12.0);
    wizard.set_field("purpose", "Expand my shop");
}

/// Selects a member guarantor and accepts the lookup result.
pub async fn choose_member_guarantor(wizard: &mut Wizard) {
    wizard.set_field("guarantorIsMember", "yes");
    wizard.set_field("guarantorEmail", "jane.doe@example.com");
    wizard.lookup_guarantor().await.unwrap();
    wizard.confirm_guarantor(true).unwrap();
}

/// Walks a loan wizard through submission onto the documents step.
pub async fn loan_to_documents(wizard: &mut Wizard) {
    fill_loan_details(wizard);
    wizard.next().await.unwrap();
    choose_member_guarantor(wizard).await;
    wizard.next().await.unwrap();
    wizard.set_field("acceptTerms", true);
    assert!(matches!(
        wizard.next().await.unwrap(),
        StepOutcome::AwaitingConfirmation(_)
    ));
    wizard.confirm().await.unwrap();
}

pub fn fill_personal(wizard: &mut Wizard) {
    wizard.set_field("firstName", "Ada");
    wizard.set_field("lastName", "Obi");
    wizard.set_field("email", "ada.obi@example.com");
    wizard.set_field("phone", "08030000000");
    wizard.set_field("password", "s3cretpass");
    wizard.set_field("confirmPassword", "s3cretpass");
}

/// Walks a signup wizard onto the verification step.
pub async fn signup_to_verification(wizard: &mut Wizard) {
    wizard.set_field("accessCode", "COOP-2024");
    wizard.next().await.unwrap();
    fill_personal(wizard);
    wizard.next().await.unwrap();
}
