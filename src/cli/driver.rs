//! Drives a [`Wizard`] through a [`FormInteraction`], one step at a time.

use tracing::debug;

use crate::cli::interaction::{ConfirmationResponse, FormInteraction, PromptContext, PromptResponse};
use crate::cli::output;
use crate::cli::CliError;
use crate::errors::WizardError;
use crate::flows::loan::GUARANTOR_MEMBER;
use crate::wizard::cooldown::Channel;
use crate::wizard::documents::{upload_hint, validate_file, DocumentSet, DocumentSlot, FileRef};
use crate::wizard::flow::RemoteCheck;
use crate::wizard::schema::{FieldDescriptor, FieldKind, Rule};
use crate::wizard::session::{Completion, StepOutcome, Wizard, CREDIT_LIMIT, DOCUMENTS};
use crate::wizard::value::FieldValue;

#[derive(Debug, Clone, PartialEq)]
pub enum DriveOutcome {
    Completed(Completion),
    Cancelled,
}

enum Collected {
    Done,
    Back,
    Cancel,
}

pub async fn drive<I>(wizard: &mut Wizard, ui: &mut I) -> Result<DriveOutcome, CliError>
where
    I: FormInteraction + ?Sized,
{
    'steps: loop {
        announce_step(wizard);
        prepare_step(wizard, ui).await;

        match collect_fields(wizard, ui).await? {
            Collected::Done => {}
            Collected::Back => {
                wizard.back();
                continue 'steps;
            }
            Collected::Cancel => return Ok(cancel(wizard)),
        }

        let mut result = wizard.next().await;
        loop {
            match result {
                Ok(StepOutcome::Advanced(step)) => {
                    debug!(step = %step, "step advanced");
                    continue 'steps;
                }
                Ok(StepOutcome::AwaitingConfirmation(_)) => {
                    let title = wizard
                        .flow()
                        .step(wizard.current_step())
                        .and_then(|step| step.gate)
                        .map(|gate| gate.title)
                        .unwrap_or("Confirm");
                    match ui.confirm(title, &summary_lines(wizard)) {
                        ConfirmationResponse::Confirm => {
                            result = wizard.confirm().await;
                        }
                        ConfirmationResponse::Back => {
                            wizard.cancel_confirmation();
                            continue 'steps;
                        }
                        ConfirmationResponse::Cancel => return Ok(cancel(wizard)),
                    }
                }
                Ok(StepOutcome::Finished(completion)) => {
                    return Ok(DriveOutcome::Completed(completion));
                }
                Err(WizardError::Invalid(errors)) => {
                    output::warning(format!("Please fix {} field(s)", errors.len()));
                    continue 'steps;
                }
                Err(err) => {
                    if ui.retry(&err.user_message()) {
                        continue 'steps;
                    }
                    return Ok(cancel(wizard));
                }
            }
        }
    }
}

fn cancel(wizard: &mut Wizard) -> DriveOutcome {
    wizard.close();
    DriveOutcome::Cancelled
}

fn announce_step(wizard: &Wizard) {
    let (index, total) = wizard.position();
    let title = wizard
        .flow()
        .step(wizard.current_step())
        .map(|step| step.title)
        .unwrap_or_default();
    output::section(format!("Step {} / {}: {}", index, total, title));
    if let Some(error) = wizard.step_error() {
        output::error(error);
    }
}

/// Fetches data a step depends on before its fields are shown.
async fn prepare_step<I>(wizard: &mut Wizard, ui: &mut I)
where
    I: FormInteraction + ?Sized,
{
    let check = wizard
        .flow()
        .step(wizard.current_step())
        .and_then(|step| step.remote_check);

    if check == Some(RemoteCheck::VerifyCodes) && !wizard.codes_sent() {
        while let Err(err) = wizard.send_verifications().await {
            if !ui.retry(&err.user_message()) {
                return;
            }
        }
        output::success("Verification codes sent to your email and phone");
        output::info("Type `:resend email` or `:resend phone` if a code does not arrive");
    }

    let needs_limit = wizard
        .visible_fields()
        .iter()
        .any(|field| field.rules.iter().any(limits_on_credit))
        && wizard.field(CREDIT_LIMIT).is_none()
        && wizard.context().user_id.is_some();
    if needs_limit {
        match wizard.refresh_credit_limit().await {
            Ok(limit) => output::info(format!(
                "Available credit: {}",
                FieldValue::Number(limit.available).display()
            )),
            Err(err) => output::warning(err.user_message()),
        }
    }
}

fn limits_on_credit(rule: &Rule) -> bool {
    matches!(rule, Rule::MaxFromField { field, .. } if *field == CREDIT_LIMIT)
}

async fn collect_fields<I>(wizard: &mut Wizard, ui: &mut I) -> Result<Collected, CliError>
where
    I: FormInteraction + ?Sized,
{
    let mut index = 0;
    loop {
        let fields: Vec<FieldDescriptor> = wizard
            .visible_fields()
            .into_iter()
            .filter(|field| !field.read_only)
            .cloned()
            .collect();
        let Some(field) = fields.get(index) else {
            return Ok(Collected::Done);
        };

        if field.kind == FieldKind::Documents {
            match collect_documents(wizard, ui) {
                Collected::Done => {
                    index += 1;
                    continue;
                }
                other => return Ok(other),
            }
        }

        let current = wizard.field(field.key).map(FieldValue::display);
        let error = wizard.field_errors().get(field.key).map(str::to_string);
        let response = ui.prompt_field(&PromptContext {
            descriptor: field,
            current,
            error: error.as_deref(),
        });
        match response {
            PromptResponse::Value(raw) => match field.kind.parse(&raw) {
                Ok(value) => {
                    wizard.set_field(field.key, value);
                    after_field(wizard, ui, field.key).await?;
                    index += 1;
                }
                Err(message) => output::warning(message),
            },
            PromptResponse::Keep => index += 1,
            PromptResponse::Back if index == 0 => return Ok(Collected::Back),
            PromptResponse::Back => index -= 1,
            PromptResponse::Help => {
                output::info(field.help.unwrap_or("No additional information for this field."))
            }
            PromptResponse::Resend(channel) => resend_code(wizard, channel).await,
            PromptResponse::Cancel => return Ok(Collected::Cancel),
        }
    }
}

/// Handles `:resend`; the same field is prompted again afterwards.
async fn resend_code(wizard: &mut Wizard, channel: Channel) {
    let verifying = wizard
        .flow()
        .step(wizard.current_step())
        .and_then(|step| step.remote_check)
        == Some(RemoteCheck::VerifyCodes);
    if !verifying {
        output::warning("There is no code to resend on this step");
        return;
    }
    if let Some(secs) = wizard.resend_remaining(channel) {
        output::warning(format!("You can resend the {} code in {}s", channel, secs));
        return;
    }
    match wizard.resend(channel).await {
        Ok(()) => output::success(format!("A new {} code was sent", channel)),
        Err(err) => output::warning(err.user_message()),
    }
}

/// Member guarantors are looked up as soon as their email is entered.
async fn after_field<I>(wizard: &mut Wizard, ui: &mut I, key: &str) -> Result<(), CliError>
where
    I: FormInteraction + ?Sized,
{
    if key != "guarantorEmail" || !wizard.active_groups().contains(GUARANTOR_MEMBER) {
        return Ok(());
    }
    match wizard.lookup_guarantor().await {
        Ok(profile) => {
            let accepted = ui.accept_guarantor(&profile);
            wizard.confirm_guarantor(accepted)?;
            if accepted {
                output::success(format!("Guarantor set to {}", profile.name));
            }
        }
        Err(err) => output::warning(err.user_message()),
    }
    Ok(())
}

fn collect_documents<I>(wizard: &mut Wizard, ui: &mut I) -> Collected
where
    I: FormInteraction + ?Sized,
{
    let max_bytes = wizard.config().max_upload_bytes;
    let hint = upload_hint(max_bytes);
    let mut set = wizard
        .field(DOCUMENTS)
        .and_then(FieldValue::as_documents)
        .cloned()
        .unwrap_or_else(DocumentSet::new);

    let mut slots = DocumentSlot::ALL.iter().copied().peekable();
    let mut error: Option<String> = None;
    while let Some(slot) = slots.peek().copied() {
        let descriptor = FieldDescriptor::new(slot.key(), slot.label(), FieldKind::Text);
        if error.is_none() {
            output::info(&hint);
        }
        let current = set.get(slot).map(|file| file.name.clone());
        let response = ui.prompt_field(&PromptContext {
            descriptor: &descriptor,
            current,
            error: error.as_deref(),
        });
        error = None;
        match response {
            PromptResponse::Value(path) => match FileRef::from_path(&path) {
                Ok(file) => match validate_file(slot, &file, max_bytes) {
                    Ok(()) => {
                        set.insert(slot, file);
                        slots.next();
                    }
                    Err(message) => error = Some(message),
                },
                Err(err) => error = Some(format!("Cannot read {}: {}", path, err)),
            },
            PromptResponse::Keep => {
                slots.next();
            }
            PromptResponse::Help | PromptResponse::Resend(_) => {
                output::info(format!("{}. Enter `:back` or `:cancel` to leave", hint))
            }
            PromptResponse::Back => return Collected::Back,
            PromptResponse::Cancel => return Collected::Cancel,
        }
    }
    wizard.set_field(DOCUMENTS, set);
    Collected::Done
}

/// Every answered, non-secret field up to the current step.
fn summary_lines(wizard: &Wizard) -> Vec<String> {
    let groups = wizard.active_groups();
    let flow = wizard.flow();
    let mut lines = Vec::new();
    for step in &flow.steps {
        for field in flow.effective_fields(step.id, &groups) {
            if field.kind == FieldKind::Secret {
                continue;
            }
            if let Some(value) = wizard.field(field.key).filter(|value| !value.is_blank()) {
                lines.push(format!("{}: {}", field.label, value.display()));
            }
        }
        if step.id == wizard.current_step() {
            break;
        }
    }
    lines
}
