//! Investment subscription funded from the member's wallet.

use crate::config::WizardConfig;
use crate::context::ContextKey;
use crate::wizard::conditions::ConditionTable;
use crate::wizard::finalize::{Endpoint, PayloadContract};
use crate::wizard::flow::{FlowDefinition, FlowKind, RemoteCheck, StepDefinition, StepId};
use crate::wizard::schema::{minimum_amount_message, FieldDescriptor, FieldKind, Rule};
use crate::wizard::value::{FieldValue, WizardState};

pub const PLAN: StepId = StepId("plan");
pub const REVIEW: StepId = StepId("review");

const PLANS: [&str; 3] = ["fixed-deposit", "target-savings", "mutual-fund"];

pub fn flow(config: &WizardConfig) -> FlowDefinition {
    let mut defaults = WizardState::new();
    defaults.insert("durationMonths".into(), FieldValue::Number(6.0));

    FlowDefinition {
        kind: FlowKind::InvestmentSubscription,
        steps: vec![
            StepDefinition::new(
                PLAN,
                "Choose a plan",
                vec![
                    FieldDescriptor::new("planId", "Plan", FieldKind::Choice(PLANS.to_vec()))
                        .with_rule(Rule::OneOf(PLANS.to_vec())),
                    FieldDescriptor::new("amount", "Amount", FieldKind::Number)
                        .with_rule(Rule::min_number(
                            config.min_investment_amount,
                            minimum_amount_message("investment", config.min_investment_amount),
                        ))
                        .with_rule(Rule::MaxFromContext {
                            key: ContextKey::WalletBalance,
                            message: "Insufficient wallet balance".into(),
                        }),
                    FieldDescriptor::new("durationMonths", "Duration (months)", FieldKind::Integer)
                        .with_rule(Rule::IntegerRange { min: 3, max: 36 }),
                ],
            ),
            StepDefinition::new(
                REVIEW,
                "Review",
                vec![FieldDescriptor::new(
                    "acceptTerms",
                    "I authorise the wallet debit",
                    FieldKind::Checkbox,
                )
                .with_rule(Rule::Accepted(
                    "You must authorise the debit to continue".into(),
                ))],
            )
            .with_gate("Subscription summary")
            .with_remote_check(RemoteCheck::SubmitApplication(
                Endpoint::InvestmentSubscription,
            )),
        ],
        conditions: ConditionTable::default(),
        contracts: vec![PayloadContract::new(Endpoint::InvestmentSubscription)
            .map("planId", "plan_id")
            .map("amount", "amount")
            .map("durationMonths", "duration_months")
            .from_context(ContextKey::UserId, "user_id")],
        defaults,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::AppContext;
    use crate::wizard::schema::StepValidator;

    fn plan(amount: f64) -> WizardState {
        let mut state = WizardState::new();
        state.insert("planId".into(), "fixed-deposit".into());
        state.insert("amount".into(), amount.into());
        state.insert("durationMonths".into(), 12.0.into());
        state
    }

    #[test]
    fn amount_is_bounded_by_minimum_and_wallet() {
        let flow = flow(&WizardConfig::default());
        let context = AppContext::member("u-7", 20_000.0);
        let validator = StepValidator::new(&flow, &context);

        assert!(validator.validate(PLAN, &plan(10_000.0)).is_ok());
        assert_eq!(
            validator.validate(PLAN, &plan(1_000.0)).unwrap_err().get("amount"),
            Some("Minimum investment is 5000")
        );
        assert_eq!(
            validator.validate(PLAN, &plan(25_000.0)).unwrap_err().get("amount"),
            Some("Insufficient wallet balance")
        );
    }

    #[test]
    fn duration_has_a_default() {
        let flow = flow(&WizardConfig::default());
        assert_eq!(
            flow.defaults.get("durationMonths"),
            Some(&FieldValue::Number(6.0))
        );
    }
}
