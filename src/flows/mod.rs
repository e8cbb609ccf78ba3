//! Concrete wizards offered by the app.

pub mod investment;
pub mod loan;
pub mod signup;

use crate::config::WizardConfig;
use crate::wizard::flow::{FlowDefinition, FlowKind};

/// Builds the definition for `kind` using the configured limits.
pub fn definition(kind: FlowKind, config: &WizardConfig) -> FlowDefinition {
    match kind {
        FlowKind::LoanApplication => loan::flow(config),
        FlowKind::Signup => signup::flow(config),
        FlowKind::InvestmentSubscription => investment::flow(config),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_flow_has_steps_and_unique_ids() {
        let config = WizardConfig::default();
        for kind in [
            FlowKind::LoanApplication,
            FlowKind::Signup,
            FlowKind::InvestmentSubscription,
        ] {
            let flow = definition(kind, &config);
            assert_eq!(flow.kind, kind);
            let mut ids = flow.step_ids();
            assert!(!ids.is_empty());
            let total = ids.len();
            ids.sort();
            ids.dedup();
            assert_eq!(ids.len(), total, "duplicate step id in {}", kind);
        }
    }

    #[test]
    fn every_final_step_submits_somewhere() {
        let config = WizardConfig::default();
        for kind in [
            FlowKind::LoanApplication,
            FlowKind::Signup,
            FlowKind::InvestmentSubscription,
        ] {
            let flow = definition(kind, &config);
            let last = flow.steps.last().map(|step| step.remote_check);
            assert!(matches!(last, Some(Some(_))), "{} has no terminal action", kind);
        }
    }
}
