//! Member signup: access code, personal details, dual OTP verification and a
//! terminal signup submission.

use crate::config::WizardConfig;
use crate::wizard::conditions::ConditionTable;
use crate::wizard::finalize::{Endpoint, PayloadContract};
use crate::wizard::flow::{FlowDefinition, FlowKind, RemoteCheck, StepDefinition, StepId};
use crate::wizard::schema::{FieldDescriptor, FieldKind, Rule};
use crate::wizard::value::WizardState;

pub const ACCESS_CODE: StepId = StepId("access_code");
pub const PERSONAL: StepId = StepId("personal");
pub const VERIFICATION: StepId = StepId("verification");
pub const CONFIRMATION: StepId = StepId("confirmation");

const MIN_PASSWORD_LENGTH: usize = 8;

pub fn flow(config: &WizardConfig) -> FlowDefinition {
    FlowDefinition {
        kind: FlowKind::Signup,
        steps: vec![
            StepDefinition::new(
                ACCESS_CODE,
                "Access code",
                vec![FieldDescriptor::new("accessCode", "Access code", FieldKind::Text)
                    .with_help("Issued by your cooperative")
                    .with_rule(Rule::MinLength(4))],
            )
            .with_remote_check(RemoteCheck::AccessCode),
            personal_step(),
            StepDefinition::new(
                VERIFICATION,
                "Verify your email and phone",
                vec![
                    FieldDescriptor::new("emailCode", "Email code", FieldKind::Text)
                        .with_rule(Rule::Digits(config.otp_length)),
                    FieldDescriptor::new("phoneCode", "Phone code", FieldKind::Text)
                        .with_rule(Rule::Digits(config.otp_length)),
                ],
            )
            .with_remote_check(RemoteCheck::VerifyCodes),
            StepDefinition::new(
                CONFIRMATION,
                "Confirm",
                vec![FieldDescriptor::new(
                    "acceptTerms",
                    "I agree to the membership terms",
                    FieldKind::Checkbox,
                )
                .with_rule(Rule::Accepted(
                    "You must accept the membership terms".into(),
                ))],
            )
            .with_remote_check(RemoteCheck::SubmitApplication(Endpoint::Signup)),
        ],
        conditions: ConditionTable::default(),
        contracts: vec![PayloadContract::new(Endpoint::Signup)
            .map("accessCode", "access_code")
            .map("firstName", "first_name")
            .map("lastName", "last_name")
            .map("email", "email")
            .map("phone", "phone_number")
            .map("password", "password")
            .map("memberNumber", "member_number")],
        defaults: WizardState::new(),
    }
}

fn personal_step() -> StepDefinition {
    StepDefinition::new(
        PERSONAL,
        "Personal details",
        vec![
            FieldDescriptor::new("firstName", "First name", FieldKind::Text)
                .with_rule(Rule::MinLength(2)),
            FieldDescriptor::new("lastName", "Last name", FieldKind::Text)
                .with_rule(Rule::MinLength(2)),
            FieldDescriptor::new("email", "Email", FieldKind::Text).with_rule(Rule::Email),
            FieldDescriptor::new("phone", "Phone number", FieldKind::Text).with_rule(Rule::Phone),
            FieldDescriptor::new("password", "Password", FieldKind::Secret)
                .with_rule(Rule::MinLength(MIN_PASSWORD_LENGTH))
                .with_rule(Rule::custom(|value, _| {
                    let text = value.as_text().unwrap_or_default();
                    if text.chars().any(|ch| ch.is_ascii_digit()) {
                        Ok(())
                    } else {
                        Err("Password must contain at least one number".into())
                    }
                })),
            FieldDescriptor::new("confirmPassword", "Confirm password", FieldKind::Secret)
                .with_rule(Rule::matches("password", "Passwords do not match")),
        ],
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::AppContext;
    use crate::wizard::schema::StepValidator;
    use crate::wizard::value::FieldValue;

    fn personal(password: &str, confirm: &str) -> WizardState {
        [
            ("firstName", "Ada"),
            ("lastName", "Obi"),
            ("email", "ada.obi@example.com"),
            ("phone", "08030000000"),
            ("password", password),
            ("confirmPassword", confirm),
        ]
        .into_iter()
        .map(|(key, value)| (key.to_string(), FieldValue::from(value)))
        .collect()
    }

    #[test]
    fn password_rules() {
        let flow = flow(&WizardConfig::default());
        let context = AppContext::anonymous();
        let validator = StepValidator::new(&flow, &context);

        assert!(validator.validate(PERSONAL, &personal("harmattan1", "harmattan1")).is_ok());

        let short = validator
            .validate(PERSONAL, &personal("abc1", "abc1"))
            .unwrap_err();
        assert_eq!(
            short.get("password"),
            Some("Password must be at least 8 characters")
        );

        let no_digit = validator
            .validate(PERSONAL, &personal("harmattan", "harmattan"))
            .unwrap_err();
        assert_eq!(
            no_digit.get("password"),
            Some("Password must contain at least one number")
        );

        let mismatch = validator
            .validate(PERSONAL, &personal("harmattan1", "harmattan2"))
            .unwrap_err();
        assert_eq!(mismatch.get("confirmPassword"), Some("Passwords do not match"));
    }

    #[test]
    fn otp_length_follows_config() {
        let config = WizardConfig {
            otp_length: 4,
            ..WizardConfig::default()
        };
        let flow = flow(&config);
        let context = AppContext::anonymous();
        let codes: WizardState = [("emailCode", "1234"), ("phoneCode", "123456")]
            .into_iter()
            .map(|(key, value)| (key.to_string(), FieldValue::from(value)))
            .collect();
        let errors = StepValidator::new(&flow, &context)
            .validate(VERIFICATION, &codes)
            .unwrap_err();
        assert!(!errors.contains("emailCode"));
        assert_eq!(errors.get("phoneCode"), Some("Phone code must be 4 digits"));
    }

    #[test]
    fn payload_omits_confirmation_fields() {
        let flow = flow(&WizardConfig::default());
        let contract = flow.contract(Endpoint::Signup).unwrap();
        let names: Vec<_> = contract.external_names().collect();
        assert!(!names.contains(&"confirmPassword"));
        assert!(!names.contains(&"acceptTerms"));
        assert!(!names.contains(&"emailCode"));
    }
}
