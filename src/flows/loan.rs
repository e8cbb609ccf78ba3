//! Loan application: details, guarantor, review (submits the application) and
//! supporting documents (terminal upload).

use crate::config::WizardConfig;
use crate::context::ContextKey;
use crate::wizard::conditions::{ConditionTable, ConditionalRule, Predicate};
use crate::wizard::finalize::{Endpoint, PayloadContract};
use crate::wizard::flow::{FlowDefinition, FlowKind, RemoteCheck, StepDefinition, StepId};
use crate::wizard::schema::{minimum_amount_message, FieldDescriptor, FieldKind, Rule};
use crate::wizard::session::{APPLICATION_ID, CREDIT_LIMIT, DOCUMENTS};
use crate::wizard::value::WizardState;

pub const LOAN_DETAILS: StepId = StepId("loan_details");
pub const GUARANTOR: StepId = StepId("guarantor");
pub const REVIEW: StepId = StepId("review");
pub const DOCUMENTS_STEP: StepId = StepId("documents");

pub const GUARANTOR_MEMBER: &str = "guarantor_member";
pub const GUARANTOR_EXTERNAL: &str = "guarantor_external";

const LOAN_TYPES: [&str; 3] = ["personal", "business", "emergency"];

pub fn flow(config: &WizardConfig) -> FlowDefinition {
    FlowDefinition {
        kind: FlowKind::LoanApplication,
        steps: vec![
            details_step(config),
            StepDefinition::new(
                GUARANTOR,
                "Guarantor",
                vec![FieldDescriptor::new(
                    "guarantorIsMember",
                    "Is your guarantor a cooperative member?",
                    FieldKind::Choice(vec!["yes", "no"]),
                )
                .with_rule(Rule::OneOf(vec!["yes", "no"]))],
            ),
            StepDefinition::new(
                REVIEW,
                "Review",
                vec![FieldDescriptor::new(
                    "acceptTerms",
                    "I accept the loan terms and conditions",
                    FieldKind::Checkbox,
                )
                .with_rule(Rule::Accepted(
                    "You must accept the terms to continue".into(),
                ))],
            )
            .with_gate("Application preview")
            .with_remote_check(RemoteCheck::SubmitApplication(Endpoint::LoanApplication)),
            StepDefinition::new(
                DOCUMENTS_STEP,
                "Supporting documents",
                vec![FieldDescriptor::new(DOCUMENTS, "Documents", FieldKind::Documents)
                    .with_help("Bank statement, national ID, address verification and guarantor ID")
                    .with_rule(Rule::Documents {
                        max_bytes: config.max_upload_bytes,
                    })],
            )
            .with_remote_check(RemoteCheck::UploadDocuments),
        ],
        conditions: guarantor_conditions(),
        contracts: vec![
            PayloadContract::new(Endpoint::LoanApplication)
                .map("loanType", "loan_type")
                .map("loanAmount", "amount")
                .map("tenureMonths", "tenure_months")
                .map("purpose", "purpose")
                .map("guarantorIsMember", "guarantor_is_member")
                .map("guarantorName", "guarantor_name")
                .map("guarantorEmail", "guarantor_email")
                .map("guarantorPhone", "guarantor_phone")
                .from_context(ContextKey::UserId, "user_id"),
            PayloadContract::new(Endpoint::DocumentUpload)
                .map(APPLICATION_ID, "loan_application_id"),
        ],
        defaults: WizardState::new(),
    }
}

fn details_step(config: &WizardConfig) -> StepDefinition {
    StepDefinition::new(
        LOAN_DETAILS,
        "Loan details",
        vec![
            FieldDescriptor::new("loanType", "Loan type", FieldKind::Choice(LOAN_TYPES.to_vec()))
                .with_rule(Rule::OneOf(LOAN_TYPES.to_vec())),
            FieldDescriptor::new("loanAmount", "Loan amount", FieldKind::Number)
                .with_rule(Rule::min_number(
                    config.min_loan_amount,
                    minimum_amount_message("loan amount", config.min_loan_amount),
                ))
                .with_rule(Rule::MaxFromField {
                    field: CREDIT_LIMIT,
                    message: "Amount exceeds your available credit limit".into(),
                }),
            FieldDescriptor::new("tenureMonths", "Tenure (months)", FieldKind::Integer)
                .with_rule(Rule::IntegerRange { min: 1, max: 24 }),
            FieldDescriptor::new("purpose", "Loan purpose", FieldKind::Text)
                .with_rule(Rule::MinLength(3)),
        ],
    )
}

/// Member guarantors are looked up by email; others are typed in full.
/// Both groups share keys, so switching branches clears them.
fn guarantor_conditions() -> ConditionTable {
    ConditionTable::new(vec![
        ConditionalRule::new(
            GUARANTOR_MEMBER,
            GUARANTOR,
            Predicate::Equals("guarantorIsMember", "yes"),
        )
        .with_field(
            FieldDescriptor::new("guarantorEmail", "Guarantor email", FieldKind::Text)
                .with_help("We look the member up by email")
                .with_rule(Rule::Email),
        )
        .with_field(
            FieldDescriptor::new("guarantorName", "Guarantor name", FieldKind::Text).read_only(),
        )
        .with_field(
            FieldDescriptor::new("guarantorPhone", "Guarantor phone", FieldKind::Text).read_only(),
        ),
        ConditionalRule::new(
            GUARANTOR_EXTERNAL,
            GUARANTOR,
            Predicate::Equals("guarantorIsMember", "no"),
        )
        .with_field(
            FieldDescriptor::new("guarantorName", "Guarantor name", FieldKind::Text)
                .with_rule(Rule::MinLength(2)),
        )
        .with_field(
            FieldDescriptor::new("guarantorEmail", "Guarantor email", FieldKind::Text)
                .with_rule(Rule::Email),
        )
        .with_field(
            FieldDescriptor::new("guarantorPhone", "Guarantor phone", FieldKind::Text)
                .with_rule(Rule::Phone),
        ),
    ])
}
