//! Declarative table mapping state predicates to optional field groups.
//!
//! The same table answers "what is shown" and "what is validated", so the two
//! can never disagree.

use std::collections::BTreeSet;

use crate::wizard::flow::StepId;
use crate::wizard::schema::FieldDescriptor;
use crate::wizard::value::{FieldValue, WizardState};

/// Condition over the current state.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// Text field equals the value, ignoring case and surrounding whitespace.
    Equals(&'static str, &'static str),
    IsTrue(&'static str),
    Present(&'static str),
    Not(Box<Predicate>),
    All(Vec<Predicate>),
}

impl Predicate {
    pub fn holds(&self, state: &WizardState) -> bool {
        match self {
            Predicate::Equals(field, expected) => state
                .get(*field)
                .and_then(FieldValue::as_text)
                .is_some_and(|text| text.trim().eq_ignore_ascii_case(expected)),
            Predicate::IsTrue(field) => {
                state.get(*field).and_then(FieldValue::as_bool) == Some(true)
            }
            Predicate::Present(field) => state.get(*field).is_some_and(|value| !value.is_blank()),
            Predicate::Not(inner) => !inner.holds(state),
            Predicate::All(parts) => parts.iter().all(|part| part.holds(state)),
        }
    }
}

/// A group of fields that becomes visible and required when `when` holds.
#[derive(Clone)]
pub struct ConditionalRule {
    pub group: &'static str,
    pub step: StepId,
    pub when: Predicate,
    pub fields: Vec<FieldDescriptor>,
}

impl ConditionalRule {
    pub fn new(group: &'static str, step: StepId, when: Predicate) -> Self {
        Self {
            group,
            step,
            when,
            fields: Vec::new(),
        }
    }

    pub fn with_field(mut self, field: FieldDescriptor) -> Self {
        self.fields.push(field);
        self
    }

    pub fn field_keys(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.fields.iter().map(|field| field.key)
    }
}

/// Names of the groups active for a given state.
pub type ActiveGroups = BTreeSet<&'static str>;

#[derive(Clone, Default)]
pub struct ConditionTable {
    rules: Vec<ConditionalRule>,
}

impl ConditionTable {
    pub fn new(rules: Vec<ConditionalRule>) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &[ConditionalRule] {
        &self.rules
    }

    pub fn group(&self, name: &str) -> Option<&ConditionalRule> {
        self.rules.iter().find(|rule| rule.group == name)
    }

    /// Pure function of the state; calling it twice yields the same set.
    pub fn resolve(&self, state: &WizardState) -> ActiveGroups {
        self.rules
            .iter()
            .filter(|rule| rule.when.holds(state))
            .map(|rule| rule.group)
            .collect()
    }

    /// Groups that were active in `previous` but not in `next`.
    pub fn deactivated<'a>(
        &'a self,
        previous: &ActiveGroups,
        next: &ActiveGroups,
    ) -> impl Iterator<Item = &'a ConditionalRule> + 'a {
        let gone: Vec<&'static str> = previous.difference(next).copied().collect();
        self.rules
            .iter()
            .filter(move |rule| gone.contains(&rule.group))
    }

    /// Fields contributed to `step` by active groups.
    pub fn fields_for(&self, step: StepId, groups: &ActiveGroups) -> Vec<&FieldDescriptor> {
        self.rules
            .iter()
            .filter(|rule| rule.step == step && groups.contains(rule.group))
            .flat_map(|rule| rule.fields.iter())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wizard::schema::FieldKind;

    const STEP: StepId = StepId("delivery");

    fn table() -> ConditionTable {
        ConditionTable::new(vec![
            ConditionalRule::new("pickup", STEP, Predicate::Equals("method", "pickup"))
                .with_field(FieldDescriptor::new("branch", "Branch", FieldKind::Text)),
            ConditionalRule::new("courier", STEP, Predicate::Equals("method", "courier"))
                .with_field(FieldDescriptor::new("address", "Address", FieldKind::Text))
                .with_field(FieldDescriptor::new("landmark", "Landmark", FieldKind::Text)),
        ])
    }

    fn state_with(method: &str) -> WizardState {
        let mut state = WizardState::new();
        state.insert("method".into(), FieldValue::from(method));
        state
    }

    #[test]
    fn resolve_is_idempotent() {
        let table = table();
        let state = state_with("Courier");
        let first = table.resolve(&state);
        let second = table.resolve(&state);
        assert_eq!(first, second);
        assert_eq!(first.into_iter().collect::<Vec<_>>(), vec!["courier"]);
    }

    #[test]
    fn nothing_active_without_answer() {
        assert!(table().resolve(&WizardState::new()).is_empty());
    }

    #[test]
    fn deactivated_lists_replaced_group() {
        let table = table();
        let before = table.resolve(&state_with("courier"));
        let after = table.resolve(&state_with("pickup"));
        let gone: Vec<_> = table.deactivated(&before, &after).map(|rule| rule.group).collect();
        assert_eq!(gone, vec!["courier"]);
    }

    #[test]
    fn fields_follow_active_groups() {
        let table = table();
        let groups = table.resolve(&state_with("courier"));
        let keys: Vec<_> = table
            .fields_for(STEP, &groups)
            .into_iter()
            .map(|field| field.key)
            .collect();
        assert_eq!(keys, vec!["address", "landmark"]);
        assert!(table.fields_for(StepId("other"), &groups).is_empty());
    }

    #[test]
    fn compound_predicates() {
        let mut state = state_with("courier");
        state.insert("express".into(), FieldValue::Bool(true));
        let predicate = Predicate::All(vec![
            Predicate::Equals("method", "courier"),
            Predicate::IsTrue("express"),
            Predicate::Not(Box::new(Predicate::Present("voucher"))),
        ]);
        assert!(predicate.holds(&state));
        state.insert("voucher".into(), FieldValue::from("FREE"));
        assert!(!predicate.holds(&state));
    }
}
