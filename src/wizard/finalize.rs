//! Builds outbound payloads from the accumulated wizard state.
//!
//! Only fields named by a contract leave the wizard; everything else
//! (confirmation checkboxes, looked-up display values, OTP codes) is stripped.

use std::fmt;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::context::{AppContext, ContextKey, ContextValue};
use crate::wizard::value::WizardState;

/// Backend endpoints a wizard can submit to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Endpoint {
    LoanApplication,
    DocumentUpload,
    Signup,
    InvestmentSubscription,
}

impl Endpoint {
    pub fn path(&self) -> &'static str {
        match self {
            Endpoint::LoanApplication => "loans/applications",
            Endpoint::DocumentUpload => "loans/documents",
            Endpoint::Signup => "auth/signup",
            Endpoint::InvestmentSubscription => "investments/subscriptions",
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

/// Where a payload value comes from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldSource {
    State(&'static str),
    Context(ContextKey),
}

#[derive(Debug, Clone, PartialEq)]
pub struct PayloadField {
    pub source: FieldSource,
    pub external: &'static str,
}

/// Declared shape of one endpoint's payload.
#[derive(Debug, Clone, PartialEq)]
pub struct PayloadContract {
    pub endpoint: Endpoint,
    pub fields: Vec<PayloadField>,
}

impl PayloadContract {
    pub fn new(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            fields: Vec::new(),
        }
    }

    /// Maps an internal field name onto the external one.
    pub fn map(mut self, internal: &'static str, external: &'static str) -> Self {
        self.fields.push(PayloadField {
            source: FieldSource::State(internal),
            external,
        });
        self
    }

    pub fn from_context(mut self, key: ContextKey, external: &'static str) -> Self {
        self.fields.push(PayloadField {
            source: FieldSource::Context(key),
            external,
        });
        self
    }

    pub fn external_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.fields.iter().map(|field| field.external)
    }

    pub fn state_fields(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.fields.iter().filter_map(|field| match field.source {
            FieldSource::State(key) => Some(key),
            FieldSource::Context(_) => None,
        })
    }
}

/// Read-only projection of the state for one endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubmissionPayload {
    endpoint: Endpoint,
    body: Map<String, Value>,
}

impl SubmissionPayload {
    pub fn endpoint(&self) -> Endpoint {
        self.endpoint
    }

    pub fn body(&self) -> &Map<String, Value> {
        &self.body
    }

    pub fn get(&self, external: &str) -> Option<&Value> {
        self.body.get(external)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.body.keys().map(String::as_str)
    }

    pub fn to_json(&self) -> Value {
        Value::Object(self.body.clone())
    }
}

/// Projects `state` through `contract`. Absent and blank values are omitted.
pub fn finalize(
    contract: &PayloadContract,
    state: &WizardState,
    context: &AppContext,
) -> SubmissionPayload {
    let mut body = Map::new();
    for field in &contract.fields {
        let value = match field.source {
            FieldSource::State(key) => state
                .get(key)
                .filter(|value| !value.is_blank())
                .map(|value| value.to_json()),
            FieldSource::Context(key) => context.lookup(key).map(|value| match value {
                ContextValue::Text(text) => Value::String(text),
                ContextValue::Number(number) => serde_json::json!(number),
            }),
        };
        if let Some(value) = value {
            body.insert(field.external.to_string(), value);
        }
    }
    SubmissionPayload {
        endpoint: contract.endpoint,
        body,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wizard::value::FieldValue;

    fn contract() -> PayloadContract {
        PayloadContract::new(Endpoint::Signup)
            .map("firstName", "first_name")
            .map("phone", "phone_number")
            .map("middleName", "middle_name")
            .from_context(ContextKey::MemberNumber, "member_number")
    }

    #[test]
    fn renames_and_strips() {
        let mut state = WizardState::new();
        state.insert("firstName".into(), FieldValue::from("Ada"));
        state.insert("phone".into(), FieldValue::from("08012345678"));
        state.insert("confirmPassword".into(), FieldValue::from("secret"));
        state.insert("acceptTerms".into(), FieldValue::Bool(true));
        state.insert("middleName".into(), FieldValue::from(" "));

        let context = AppContext {
            member_number: Some("CM-0042".into()),
            ..AppContext::default()
        };
        let payload = finalize(&contract(), &state, &context);

        assert_eq!(payload.endpoint(), Endpoint::Signup);
        assert_eq!(
            payload.to_json(),
            serde_json::json!({
                "first_name": "Ada",
                "phone_number": "08012345678",
                "member_number": "CM-0042",
            })
        );
        assert!(payload.get("acceptTerms").is_none());
        assert!(payload.get("middle_name").is_none());
    }

    #[test]
    fn payload_keys_stay_within_contract() {
        let mut state = WizardState::new();
        for key in ["firstName", "phone", "emailCode", "guarantorName"] {
            state.insert(key.into(), FieldValue::from("x"));
        }
        let contract = contract();
        let payload = finalize(&contract, &state, &AppContext::anonymous());
        let declared: Vec<_> = contract.external_names().collect();
        assert!(payload.keys().all(|key| declared.contains(&key)));
    }
}
