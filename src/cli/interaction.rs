//! Prompt surface used by the wizard driver. The dialoguer implementation is
//! used interactively; tests script the answers.

use std::collections::VecDeque;

use dialoguer::{theme::ColorfulTheme, Confirm, Input, Password, Select};

use crate::cli::output;
use crate::dispatch::GuarantorProfile;
use crate::wizard::cooldown::Channel;
use crate::wizard::schema::{FieldDescriptor, FieldKind};

/// Describes how prompts can be answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptResponse {
    Value(String),
    /// Keep the current value.
    Keep,
    /// Return to the previous field (or the previous step from the first one).
    Back,
    Cancel,
    Help,
    /// Ask for a fresh verification code on one channel.
    Resend(Channel),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmationResponse {
    Confirm,
    Back,
    Cancel,
}

pub struct PromptContext<'a> {
    pub descriptor: &'a FieldDescriptor,
    pub current: Option<String>,
    pub error: Option<&'a str>,
}

pub trait FormInteraction {
    fn prompt_field(&mut self, context: &PromptContext<'_>) -> PromptResponse;

    fn confirm(&mut self, title: &str, lines: &[String]) -> ConfirmationResponse;

    fn accept_guarantor(&mut self, profile: &GuarantorProfile) -> bool;

    /// Asked after a failed remote step; `false` abandons the wizard.
    fn retry(&mut self, message: &str) -> bool;
}

const BACK: &str = ":back";
const CANCEL: &str = ":cancel";
const HELP: &str = "?";
const RESEND: &str = ":resend";

/// Interactive prompts on the terminal.
pub struct DialoguerInteraction {
    theme: ColorfulTheme,
}

impl Default for DialoguerInteraction {
    fn default() -> Self {
        Self::new()
    }
}

impl DialoguerInteraction {
    pub fn new() -> Self {
        Self {
            theme: ColorfulTheme::default(),
        }
    }

    fn prompt_text(&mut self, context: &PromptContext<'_>) -> PromptResponse {
        let secret = matches!(context.descriptor.kind, FieldKind::Secret);
        let result = if secret {
            Password::with_theme(&self.theme)
                .with_prompt(context.descriptor.label)
                .allow_empty_password(true)
                .interact()
        } else {
            let mut input = Input::<String>::with_theme(&self.theme)
                .with_prompt(context.descriptor.label)
                .allow_empty(true);
            if let Some(current) = &context.current {
                input = input.with_initial_text(current.clone());
            }
            input.interact_text()
        };
        match result {
            Ok(raw) => classify_text(&raw, context.current.is_some()),
            Err(_) => PromptResponse::Cancel,
        }
    }

    fn prompt_choice(&mut self, context: &PromptContext<'_>, options: &[&str]) -> PromptResponse {
        let mut items: Vec<String> = options.iter().map(|option| option.to_string()).collect();
        items.push("<- Back".into());
        let default = context
            .current
            .as_deref()
            .and_then(|current| options.iter().position(|option| *option == current))
            .unwrap_or(0);
        match Select::with_theme(&self.theme)
            .with_prompt(context.descriptor.label)
            .items(items.as_slice())
            .default(default)
            .interact_opt()
        {
            Ok(Some(index)) if index < options.len() => {
                PromptResponse::Value(options[index].to_string())
            }
            Ok(Some(_)) => PromptResponse::Back,
            _ => PromptResponse::Cancel,
        }
    }

    fn prompt_boolean(&mut self, context: &PromptContext<'_>) -> PromptResponse {
        let default = context.current.as_deref() == Some("yes");
        match Confirm::with_theme(&self.theme)
            .with_prompt(context.descriptor.label)
            .default(default)
            .interact_opt()
        {
            Ok(Some(true)) => PromptResponse::Value("yes".into()),
            Ok(Some(false)) => PromptResponse::Value("no".into()),
            _ => PromptResponse::Cancel,
        }
    }
}

/// Maps typed text onto a response. Empty input keeps an existing value.
pub fn classify_text(raw: &str, has_current: bool) -> PromptResponse {
    let trimmed = raw.trim();
    match trimmed {
        BACK => PromptResponse::Back,
        CANCEL => PromptResponse::Cancel,
        HELP => PromptResponse::Help,
        "" if has_current => PromptResponse::Keep,
        _ => match trimmed.strip_prefix(RESEND) {
            Some(rest) => match rest.trim() {
                "email" => PromptResponse::Resend(Channel::Email),
                "phone" => PromptResponse::Resend(Channel::Phone),
                _ => PromptResponse::Help,
            },
            None => PromptResponse::Value(trimmed.to_string()),
        },
    }
}

impl FormInteraction for DialoguerInteraction {
    fn prompt_field(&mut self, context: &PromptContext<'_>) -> PromptResponse {
        if let Some(help) = context.descriptor.help {
            output::info(help);
        }
        if let Some(error) = context.error {
            output::warning(error);
        }
        match &context.descriptor.kind {
            FieldKind::Choice(options) => self.prompt_choice(context, options),
            FieldKind::Checkbox => self.prompt_boolean(context),
            _ => self.prompt_text(context),
        }
    }

    fn confirm(&mut self, title: &str, lines: &[String]) -> ConfirmationResponse {
        output::section(title);
        for line in lines {
            println!("  {}", line);
        }
        let items = ["Confirm", "Back to edit", "Cancel"];
        match Select::with_theme(&self.theme)
            .items(&items)
            .default(0)
            .interact_opt()
        {
            Ok(Some(0)) => ConfirmationResponse::Confirm,
            Ok(Some(1)) => ConfirmationResponse::Back,
            _ => ConfirmationResponse::Cancel,
        }
    }

    fn accept_guarantor(&mut self, profile: &GuarantorProfile) -> bool {
        output::info(format!("Found {} ({})", profile.name, profile.phone));
        Confirm::with_theme(&self.theme)
            .with_prompt("Is this your guarantor?")
            .default(true)
            .interact()
            .unwrap_or(false)
    }

    fn retry(&mut self, message: &str) -> bool {
        output::error(message);
        Confirm::with_theme(&self.theme)
            .with_prompt("Try again?")
            .default(true)
            .interact()
            .unwrap_or(false)
    }
}

/// Replays canned answers; cancels once they run out.
#[derive(Default)]
pub struct ScriptedInteraction {
    answers: VecDeque<PromptResponse>,
    confirmations: VecDeque<ConfirmationResponse>,
    accept_guarantors: bool,
    /// Keys of every field prompted, in order.
    pub prompted: Vec<String>,
    pub errors_seen: Vec<String>,
}

impl ScriptedInteraction {
    pub fn new<I, S>(answers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            answers: answers
                .into_iter()
                .map(|answer| classify_text(&answer.into(), false))
                .collect(),
            accept_guarantors: true,
            ..Self::default()
        }
    }

    pub fn with_confirmations(
        mut self,
        confirmations: impl IntoIterator<Item = ConfirmationResponse>,
    ) -> Self {
        self.confirmations = confirmations.into_iter().collect();
        self
    }

    pub fn rejecting_guarantors(mut self) -> Self {
        self.accept_guarantors = false;
        self
    }
}

impl FormInteraction for ScriptedInteraction {
    fn prompt_field(&mut self, context: &PromptContext<'_>) -> PromptResponse {
        self.prompted.push(context.descriptor.key.to_string());
        if let Some(error) = context.error {
            self.errors_seen.push(error.to_string());
        }
        self.answers.pop_front().unwrap_or(PromptResponse::Cancel)
    }

    fn confirm(&mut self, _title: &str, _lines: &[String]) -> ConfirmationResponse {
        self.confirmations
            .pop_front()
            .unwrap_or(ConfirmationResponse::Cancel)
    }

    fn accept_guarantor(&mut self, _profile: &GuarantorProfile) -> bool {
        self.accept_guarantors
    }

    fn retry(&mut self, message: &str) -> bool {
        self.errors_seen.push(message.to_string());
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_commands() {
        assert_eq!(classify_text(" :back ", false), PromptResponse::Back);
        assert_eq!(classify_text(":cancel", true), PromptResponse::Cancel);
        assert_eq!(classify_text("?", false), PromptResponse::Help);
        assert_eq!(classify_text("", true), PromptResponse::Keep);
        assert_eq!(classify_text("", false), PromptResponse::Value(String::new()));
        assert_eq!(
            classify_text(" 5000 ", false),
            PromptResponse::Value("5000".into())
        );
    }

    #[test]
    fn resend_names_a_channel() {
        assert_eq!(
            classify_text(":resend email", false),
            PromptResponse::Resend(Channel::Email)
        );
        assert_eq!(
            classify_text(" :resend  phone ", true),
            PromptResponse::Resend(Channel::Phone)
        );
        assert_eq!(classify_text(":resend", false), PromptResponse::Help);
        assert_eq!(classify_text(":resend fax", false), PromptResponse::Help);
    }
}
