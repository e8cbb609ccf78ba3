//! Declarative field descriptions and the per-step validator.

use std::sync::{Arc, OnceLock};

use regex::Regex;

use crate::context::{AppContext, ContextKey};
use crate::errors::FieldErrors;
use crate::wizard::documents;
use crate::wizard::flow::{FlowDefinition, StepId};
use crate::wizard::value::{format_amount, FieldValue, WizardState};

/// Supported input kinds. Drives both parsing of raw input and rendering.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    Text,
    Secret,
    Number,
    Integer,
    Choice(Vec<&'static str>),
    Checkbox,
    Documents,
}

impl FieldKind {
    /// Converts raw text input into a typed value.
    pub fn parse(&self, raw: &str) -> Result<FieldValue, String> {
        let trimmed = raw.trim();
        match self {
            FieldKind::Text | FieldKind::Secret => Ok(FieldValue::Text(trimmed.to_string())),
            FieldKind::Number => trimmed
                .replace(',', "")
                .parse::<f64>()
                .map(FieldValue::Number)
                .map_err(|_| "Enter a numeric value".to_string()),
            FieldKind::Integer => trimmed
                .parse::<i64>()
                .map(|value| FieldValue::Number(value as f64))
                .map_err(|_| "Enter a whole number (e.g., 12)".to_string()),
            FieldKind::Checkbox => match trimmed.to_lowercase().as_str() {
                "y" | "yes" | "true" | "1" => Ok(FieldValue::Bool(true)),
                "n" | "no" | "false" | "0" => Ok(FieldValue::Bool(false)),
                _ => Err("Enter yes or no".to_string()),
            },
            FieldKind::Choice(options) => {
                let normalized = trimmed.to_lowercase();
                if let Some(found) = options
                    .iter()
                    .find(|candidate| candidate.to_lowercase() == normalized)
                {
                    return Ok(FieldValue::Text((*found).to_string()));
                }
                let mut message = format!("Select one of: {}", options.join(", "));
                if let Some(suggestion) = closest_option(options, &normalized) {
                    message.push_str(&format!(" (did you mean `{}`?)", suggestion));
                }
                Err(message)
            }
            FieldKind::Documents => Err("Documents are attached per slot, not typed".to_string()),
        }
    }
}

fn closest_option<'a>(options: &[&'a str], input: &str) -> Option<&'a str> {
    options
        .iter()
        .map(|option| (*option, strsim::levenshtein(&option.to_lowercase(), input)))
        .filter(|(_, distance)| *distance <= 2)
        .min_by_key(|(_, distance)| *distance)
        .map(|(option, _)| option)
}

type RuleCallback = dyn Fn(&FieldValue, &WizardState) -> Result<(), String> + Send + Sync;
pub type SharedRuleCallback = Arc<RuleCallback>;

/// Constraint applied to a provided value. Blank optional fields skip rules.
#[derive(Clone)]
pub enum Rule {
    Email,
    Phone,
    MinLength(usize),
    Digits(usize),
    MinNumber { min: f64, message: String },
    /// Upper bound read from another field; skipped while that field is unset.
    MaxFromField { field: &'static str, message: String },
    MaxFromContext { key: ContextKey, message: String },
    IntegerRange { min: i64, max: i64 },
    OneOf(Vec<&'static str>),
    Matches { field: &'static str, message: String },
    Accepted(String),
    Documents { max_bytes: u64 },
    Custom(SharedRuleCallback),
}

impl Rule {
    pub fn min_number(min: f64, message: impl Into<String>) -> Self {
        Rule::MinNumber {
            min,
            message: message.into(),
        }
    }

    pub fn matches(field: &'static str, message: impl Into<String>) -> Self {
        Rule::Matches {
            field,
            message: message.into(),
        }
    }

    pub fn custom(
        check: impl Fn(&FieldValue, &WizardState) -> Result<(), String> + Send + Sync + 'static,
    ) -> Self {
        Rule::Custom(Arc::new(check))
    }

    fn check(
        &self,
        field: &FieldDescriptor,
        value: &FieldValue,
        state: &WizardState,
        context: &AppContext,
    ) -> Result<(), String> {
        let label = field.label;
        match self {
            Rule::Email => match value.as_text() {
                Some(text) if email_pattern().is_match(text.trim()) => Ok(()),
                _ => Err("Enter a valid email address".into()),
            },
            Rule::Phone => {
                let normalized: String = value
                    .as_text()
                    .unwrap_or_default()
                    .chars()
                    .filter(|ch| !matches!(ch, ' ' | '-'))
                    .collect();
                if phone_pattern().is_match(&normalized) {
                    Ok(())
                } else {
                    Err("Enter a valid phone number".into())
                }
            }
            Rule::MinLength(min) => {
                let length = value.as_text().map(|text| text.trim().chars().count());
                match length {
                    Some(length) if length >= *min => Ok(()),
                    _ => Err(format!("{} must be at least {} characters", label, min)),
                }
            }
            Rule::Digits(count) => {
                let text = value.as_text().unwrap_or_default().trim();
                if text.len() == *count && text.chars().all(|ch| ch.is_ascii_digit()) {
                    Ok(())
                } else {
                    Err(format!("{} must be {} digits", label, count))
                }
            }
            Rule::MinNumber { min, message } => match value.as_number() {
                Some(number) if number >= *min => Ok(()),
                Some(_) => Err(message.clone()),
                None => Err(format!("{} must be a number", label)),
            },
            Rule::MaxFromField { field: other, message } => {
                let limit = state.get(*other).and_then(FieldValue::as_number);
                match (value.as_number(), limit) {
                    (Some(number), Some(limit)) if number > limit => Err(message.clone()),
                    _ => Ok(()),
                }
            }
            Rule::MaxFromContext { key, message } => {
                match (value.as_number(), context.number(*key)) {
                    (Some(number), Some(limit)) if number > limit => Err(message.clone()),
                    _ => Ok(()),
                }
            }
            Rule::IntegerRange { min, max } => {
                let ok = value.as_number().is_some_and(|number| {
                    number.fract() == 0.0 && number >= *min as f64 && number <= *max as f64
                });
                if ok {
                    Ok(())
                } else {
                    Err(format!(
                        "{} must be a whole number between {} and {}",
                        label, min, max
                    ))
                }
            }
            Rule::OneOf(options) => {
                let ok = value.as_text().is_some_and(|text| {
                    options
                        .iter()
                        .any(|option| option.eq_ignore_ascii_case(text.trim()))
                });
                if ok {
                    Ok(())
                } else {
                    Err(format!("Select one of: {}", options.join(", ")))
                }
            }
            Rule::Matches { field: other, message } => {
                let expected = state.get(*other).and_then(FieldValue::as_text);
                match (value.as_text(), expected) {
                    (Some(actual), Some(expected)) if actual == expected => Ok(()),
                    _ => Err(message.clone()),
                }
            }
            Rule::Accepted(message) => {
                if value.as_bool() == Some(true) {
                    Ok(())
                } else {
                    Err(message.clone())
                }
            }
            Rule::Documents { max_bytes } => match value.as_documents() {
                Some(set) => documents::validate_set(set, *max_bytes),
                None => Err("Attach the required documents".into()),
            },
            Rule::Custom(check) => check(value, state),
        }
    }
}

fn email_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern is valid")
    })
}

fn phone_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^\+?[0-9]{10,14}$").expect("phone pattern is valid"))
}

/// Declarative description of a single form field.
#[derive(Clone)]
pub struct FieldDescriptor {
    pub key: &'static str,
    pub label: &'static str,
    pub kind: FieldKind,
    pub required: bool,
    pub read_only: bool,
    pub help: Option<&'static str>,
    pub rules: Vec<Rule>,
}

impl FieldDescriptor {
    pub fn new(key: &'static str, label: &'static str, kind: FieldKind) -> Self {
        Self {
            key,
            label,
            kind,
            required: true,
            read_only: false,
            help: None,
            rules: Vec::new(),
        }
    }

    pub fn with_optional(mut self) -> Self {
        self.required = false;
        self
    }

    /// Value is filled in by a remote lookup rather than typed.
    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    pub fn with_help(mut self, help: &'static str) -> Self {
        self.help = Some(help);
        self
    }

    pub fn with_rule(mut self, rule: Rule) -> Self {
        self.rules.push(rule);
        self
    }

    fn validate(&self, state: &WizardState, context: &AppContext) -> Result<(), String> {
        let value = state.get(self.key).filter(|value| !value.is_blank());
        let Some(value) = value else {
            return if self.required {
                Err(match self.kind {
                    FieldKind::Documents => "Upload all four documents".to_string(),
                    _ => format!("{} is required", self.label),
                })
            } else {
                Ok(())
            };
        };
        for rule in &self.rules {
            rule.check(self, value, state, context)?;
        }
        Ok(())
    }
}

/// Base constraints owned by a step.
#[derive(Clone, Default)]
pub struct StepSchema {
    pub fields: Vec<FieldDescriptor>,
}

impl StepSchema {
    pub fn new(fields: Vec<FieldDescriptor>) -> Self {
        Self { fields }
    }

    pub fn field(&self, key: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|field| field.key == key)
    }
}

/// Checks a set of fields against the current state, collecting the first
/// failure per field.
pub fn validate_fields<'a>(
    fields: impl IntoIterator<Item = &'a FieldDescriptor>,
    state: &WizardState,
    context: &AppContext,
) -> Result<(), FieldErrors> {
    let mut errors = FieldErrors::new();
    for field in fields {
        if let Err(message) = field.validate(state, context) {
            errors.insert(field.key, message);
        }
    }
    errors.into_result()
}

/// Validates a step against its effective schema: the base schema plus every
/// conditional group active for the given state.
pub struct StepValidator<'a> {
    flow: &'a FlowDefinition,
    context: &'a AppContext,
}

impl<'a> StepValidator<'a> {
    pub fn new(flow: &'a FlowDefinition, context: &'a AppContext) -> Self {
        Self { flow, context }
    }

    pub fn validate(&self, step: StepId, state: &WizardState) -> Result<(), FieldErrors> {
        let groups = self.flow.conditions.resolve(state);
        let fields = self.flow.effective_fields(step, &groups);
        validate_fields(fields, state, self.context)
    }
}

/// Formats a minimum-amount message with the configured floor.
pub fn minimum_amount_message(subject: &str, min: f64) -> String {
    format!("Minimum {} is {}", subject, format_amount(min))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(pairs: &[(&str, FieldValue)]) -> WizardState {
        pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.clone()))
            .collect()
    }

    fn check(field: &FieldDescriptor, state: &WizardState) -> Result<(), FieldErrors> {
        validate_fields([field], state, &AppContext::anonymous())
    }

    #[test]
    fn required_field_reports_label() {
        let field = FieldDescriptor::new("purpose", "Loan purpose", FieldKind::Text);
        let errors = check(&field, &state(&[("purpose", "  ".into())])).unwrap_err();
        assert_eq!(errors.get("purpose"), Some("Loan purpose is required"));
    }

    #[test]
    fn optional_blank_field_skips_rules() {
        let field = FieldDescriptor::new("notes", "Notes", FieldKind::Text)
            .with_optional()
            .with_rule(Rule::MinLength(10));
        assert!(check(&field, &WizardState::new()).is_ok());
    }

    #[test]
    fn email_and_phone_formats() {
        let email = FieldDescriptor::new("email", "Email", FieldKind::Text).with_rule(Rule::Email);
        assert!(check(&email, &state(&[("email", "ada@coop.ng".into())])).is_ok());
        let errors = check(&email, &state(&[("email", "ada@coop".into())])).unwrap_err();
        assert_eq!(errors.get("email"), Some("Enter a valid email address"));

        let phone = FieldDescriptor::new("phone", "Phone", FieldKind::Text).with_rule(Rule::Phone);
        assert!(check(&phone, &state(&[("phone", "0801 234 5678".into())])).is_ok());
        assert!(check(&phone, &state(&[("phone", "+2348012345678".into())])).is_ok());
        assert!(check(&phone, &state(&[("phone", "12345".into())])).is_err());
    }

    #[test]
    fn minimum_number_uses_custom_message() {
        let field = FieldDescriptor::new("loanAmount", "Loan amount", FieldKind::Number)
            .with_rule(Rule::min_number(1000.0, minimum_amount_message("loan amount", 1000.0)));
        let errors = check(&field, &state(&[("loanAmount", 500.0.into())])).unwrap_err();
        assert_eq!(errors.get("loanAmount"), Some("Minimum loan amount is 1000"));
        assert!(check(&field, &state(&[("loanAmount", 1000.0.into())])).is_ok());
    }

    #[test]
    fn max_from_field_only_applies_when_limit_known() {
        let field = FieldDescriptor::new("loanAmount", "Loan amount", FieldKind::Number).with_rule(
            Rule::MaxFromField {
                field: "creditLimit",
                message: "Amount exceeds your credit limit".into(),
            },
        );
        assert!(check(&field, &state(&[("loanAmount", 90_000.0.into())])).is_ok());
        let errors = check(
            &field,
            &state(&[("loanAmount", 90_000.0.into()), ("creditLimit", 50_000.0.into())]),
        )
        .unwrap_err();
        assert_eq!(errors.get("loanAmount"), Some("Amount exceeds your credit limit"));
    }

    #[test]
    fn password_confirmation_must_match() {
        let field = FieldDescriptor::new("confirmPassword", "Confirm password", FieldKind::Secret)
            .with_rule(Rule::matches("password", "Passwords do not match"));
        let ok = state(&[("password", "s3cret!!".into()), ("confirmPassword", "s3cret!!".into())]);
        assert!(check(&field, &ok).is_ok());
        let bad = state(&[("password", "s3cret!!".into()), ("confirmPassword", "s3cret".into())]);
        assert_eq!(
            check(&field, &bad).unwrap_err().get("confirmPassword"),
            Some("Passwords do not match")
        );
    }

    #[test]
    fn integer_range_and_choices() {
        let tenure = FieldDescriptor::new("tenureMonths", "Tenure", FieldKind::Integer)
            .with_rule(Rule::IntegerRange { min: 1, max: 24 });
        assert!(check(&tenure, &state(&[("tenureMonths", 12.0.into())])).is_ok());
        assert!(check(&tenure, &state(&[("tenureMonths", 30.0.into())])).is_err());
        assert!(check(&tenure, &state(&[("tenureMonths", 2.5.into())])).is_err());

        let kind = FieldDescriptor::new("loanType", "Loan type", FieldKind::Text)
            .with_rule(Rule::OneOf(vec!["personal", "business"]));
        assert!(check(&kind, &state(&[("loanType", "Business".into())])).is_ok());
        assert!(check(&kind, &state(&[("loanType", "car".into())])).is_err());
    }

    #[test]
    fn wallet_limit_comes_from_context() {
        let field = FieldDescriptor::new("amount", "Amount", FieldKind::Number).with_rule(
            Rule::MaxFromContext {
                key: ContextKey::WalletBalance,
                message: "Insufficient wallet balance".into(),
            },
        );
        let context = AppContext::member("u-1", 10_000.0);
        let result = validate_fields([&field], &state(&[("amount", 20_000.0.into())]), &context);
        assert_eq!(
            result.unwrap_err().get("amount"),
            Some("Insufficient wallet balance")
        );
    }

    #[test]
    fn custom_rules_see_whole_state() {
        let field = FieldDescriptor::new("password", "Password", FieldKind::Secret).with_rule(
            Rule::custom(|value, _| {
                let text = value.as_text().unwrap_or_default();
                if text.chars().any(|ch| ch.is_ascii_digit()) {
                    Ok(())
                } else {
                    Err("Password needs a number".into())
                }
            }),
        );
        assert!(check(&field, &state(&[("password", "abcdefgh".into())])).is_err());
        assert!(check(&field, &state(&[("password", "abcdefg1".into())])).is_ok());
    }

    #[test]
    fn kind_parsing() {
        assert_eq!(FieldKind::Number.parse("1,500").unwrap(), FieldValue::Number(1500.0));
        assert_eq!(FieldKind::Checkbox.parse("Yes").unwrap(), FieldValue::Bool(true));
        assert!(FieldKind::Integer.parse("1.5").is_err());
        let choice = FieldKind::Choice(vec!["yes", "no"]);
        assert_eq!(choice.parse("YES").unwrap(), FieldValue::from("yes"));
        let message = choice.parse("yse").unwrap_err();
        assert_eq!(message, "Select one of: yes, no (did you mean `yes`?)");
    }
}
