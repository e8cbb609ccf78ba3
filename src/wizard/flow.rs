use std::fmt;

use crate::wizard::conditions::{ActiveGroups, ConditionTable};
use crate::wizard::finalize::{Endpoint, PayloadContract};
use crate::wizard::schema::{FieldDescriptor, StepSchema};
use crate::wizard::value::WizardState;

/// Identifier of a wizard step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StepId(pub &'static str);

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// Confirmation shown before leaving a step (e.g. an application preview).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Gate {
    pub title: &'static str,
}

/// Backend check that must succeed before the step can be left.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteCheck {
    AccessCode,
    VerifyCodes,
    SubmitApplication(Endpoint),
    UploadDocuments,
}

/// One step of a wizard.
#[derive(Clone)]
pub struct StepDefinition {
    pub id: StepId,
    pub title: &'static str,
    pub schema: StepSchema,
    pub gate: Option<Gate>,
    pub remote_check: Option<RemoteCheck>,
}

impl StepDefinition {
    pub fn new(id: StepId, title: &'static str, fields: Vec<FieldDescriptor>) -> Self {
        Self {
            id,
            title,
            schema: StepSchema::new(fields),
            gate: None,
            remote_check: None,
        }
    }

    pub fn with_gate(mut self, title: &'static str) -> Self {
        self.gate = Some(Gate { title });
        self
    }

    pub fn with_remote_check(mut self, check: RemoteCheck) -> Self {
        self.remote_check = Some(check);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowKind {
    LoanApplication,
    Signup,
    InvestmentSubscription,
}

impl fmt::Display for FlowKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            FlowKind::LoanApplication => "loan application",
            FlowKind::Signup => "signup",
            FlowKind::InvestmentSubscription => "investment subscription",
        };
        f.write_str(label)
    }
}

/// Complete, immutable description of a wizard.
#[derive(Clone)]
pub struct FlowDefinition {
    pub kind: FlowKind,
    pub steps: Vec<StepDefinition>,
    pub conditions: ConditionTable,
    pub contracts: Vec<PayloadContract>,
    pub defaults: WizardState,
}

impl FlowDefinition {
    pub fn step(&self, id: StepId) -> Option<&StepDefinition> {
        self.steps.iter().find(|step| step.id == id)
    }

    pub fn step_ids(&self) -> Vec<StepId> {
        self.steps.iter().map(|step| step.id).collect()
    }

    pub fn is_last(&self, id: StepId) -> bool {
        self.steps.last().is_some_and(|step| step.id == id)
    }

    pub fn contract(&self, endpoint: Endpoint) -> Option<&PayloadContract> {
        self.contracts
            .iter()
            .find(|contract| contract.endpoint == endpoint)
    }

    /// Base fields of `step` followed by fields of its active groups. A key
    /// appears once; the first definition wins.
    pub fn effective_fields(&self, step: StepId, groups: &ActiveGroups) -> Vec<&FieldDescriptor> {
        let mut fields: Vec<&FieldDescriptor> = Vec::new();
        let base = self
            .step(step)
            .into_iter()
            .flat_map(|definition| definition.schema.fields.iter());
        for field in base.chain(self.conditions.fields_for(step, groups)) {
            if !fields.iter().any(|existing| existing.key == field.key) {
                fields.push(field);
            }
        }
        fields
    }

    /// Steps whose effective schema contains `field` for the given groups.
    pub fn steps_owning(&self, field: &str, groups: &ActiveGroups) -> Vec<StepId> {
        self.steps
            .iter()
            .filter(|step| {
                self.effective_fields(step.id, groups)
                    .iter()
                    .any(|descriptor| descriptor.key == field)
            })
            .map(|step| step.id)
            .collect()
    }
}
