//! A live wizard instance: owns the state, drives the sequencer and turns
//! remote outcomes into transitions or step-local errors.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::WizardConfig;
use crate::context::AppContext;
use crate::dispatch::{
    ActionPayload, CreditLimit, DispatchError, Dispatcher, GuarantorProfile, LoanSummary,
    ProfileSnapshot, RemoteAction,
};
use crate::errors::{FieldErrors, WizardError};
use crate::utils::clock::Clock;
use crate::wizard::conditions::ActiveGroups;
use crate::wizard::cooldown::{Channel, ResendCooldowns};
use crate::wizard::finalize::{finalize, Endpoint};
use crate::wizard::flow::{FlowDefinition, FlowKind, RemoteCheck, StepId};
use crate::wizard::schema::{FieldDescriptor, StepValidator};
use crate::wizard::sequencer::{Advance, SequencerError, StepSequencer};
use crate::wizard::store::{FormStore, StoreEvent, SubscriptionId};
use crate::wizard::value::{FieldValue, WizardState};

pub const APPLICATION_ID: &str = "applicationId";
pub const CREDIT_LIMIT: &str = "creditLimit";
pub const DOCUMENTS: &str = "documents";
const GUARANTOR_EMAIL: &str = "guarantorEmail";

/// Work a host can start on the wizard's behalf.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WizardAction {
    /// Runs the current step's remote check and leaves the step on success.
    CheckStep,
    LookupGuarantor,
    SendVerifications,
    Resend(Channel),
    FetchCreditLimit,
    FetchLoans,
}

/// What a successful `next`/`confirm` did.
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    Advanced(StepId),
    /// A confirmation preview is open on this step.
    AwaitingConfirmation(StepId),
    Finished(Completion),
}

/// Reported to the host when the terminal submission succeeds.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub flow: FlowKind,
    /// Identifier issued by the backend, when there is one.
    pub reference: Option<String>,
}

/// Effect of a completed dispatch.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchEffect {
    Step(StepOutcome),
    /// Lookup succeeded; `confirm_guarantor` must accept or discard it.
    GuarantorFound(GuarantorProfile),
    CodesSent(Vec<Channel>),
    CreditLimit(CreditLimit),
    Loans(Vec<LoanSummary>),
}

/// Identifies the wizard generation, step and input a dispatch was started
/// from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ticket {
    generation: u64,
    step: StepId,
    /// Value of the input the request was keyed on, e.g. the looked-up email.
    subject: Option<String>,
}

/// A dispatch that has been started but not awaited. Owns everything it needs,
/// so the wizard stays usable while it runs. Every begun dispatch must be
/// handed back to [`Wizard::complete`] (or the wizard closed) before another
/// can start.
pub struct PendingDispatch {
    ticket: Ticket,
    action: WizardAction,
    future: BoxFuture<'static, Result<ActionPayload, DispatchError>>,
}

impl PendingDispatch {
    pub fn action(&self) -> WizardAction {
        self.action
    }

    pub async fn run(self) -> Settled {
        let result = self.future.await;
        Settled {
            ticket: self.ticket,
            action: self.action,
            result,
        }
    }
}

/// Outcome of a dispatch, consumed once by [`Wizard::complete`].
#[derive(Debug)]
pub struct Settled {
    ticket: Ticket,
    action: WizardAction,
    result: Result<ActionPayload, DispatchError>,
}

impl Settled {
    pub fn action(&self) -> WizardAction {
        self.action
    }

    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

pub struct Wizard {
    id: Uuid,
    flow: FlowDefinition,
    context: AppContext,
    dispatcher: Dispatcher,
    clock: Arc<dyn Clock>,
    config: WizardConfig,
    store: FormStore,
    sequencer: StepSequencer,
    cooldowns: ResendCooldowns,
    generation: u64,
    in_flight: bool,
    pending_guarantor: Option<GuarantorProfile>,
    codes_sent: bool,
    /// Recipient each channel's latest code went to.
    sent_to: HashMap<Channel, String>,
    field_errors: FieldErrors,
    step_error: Option<String>,
}

impl Wizard {
    pub fn new(
        flow: FlowDefinition,
        context: AppContext,
        dispatcher: Dispatcher,
        clock: Arc<dyn Clock>,
        config: WizardConfig,
    ) -> Self {
        let gated = flow
            .steps
            .iter()
            .filter(|step| step.gate.is_some())
            .map(|step| step.id);
        let sequencer = StepSequencer::new(flow.step_ids(), gated);
        let store = FormStore::new(flow.defaults.clone());
        let cooldowns =
            ResendCooldowns::new(chrono::Duration::seconds(config.resend_cooldown_secs));
        let id = Uuid::new_v4();
        info!(wizard = %id, flow = %flow.kind, "wizard opened");
        Self {
            id,
            flow,
            context,
            dispatcher,
            clock,
            config,
            store,
            sequencer,
            cooldowns,
            generation: 0,
            in_flight: false,
            pending_guarantor: None,
            codes_sent: false,
            sent_to: HashMap::new(),
            field_errors: FieldErrors::new(),
            step_error: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn flow(&self) -> &FlowDefinition {
        &self.flow
    }

    pub fn context(&self) -> &AppContext {
        &self.context
    }

    pub fn config(&self) -> &WizardConfig {
        &self.config
    }

    pub fn field(&self, key: &str) -> Option<&FieldValue> {
        self.store.get(key)
    }

    pub fn state(&self) -> WizardState {
        self.store.get_all()
    }

    pub fn current_step(&self) -> StepId {
        self.sequencer.current_step()
    }

    /// One-based position and total step count.
    pub fn position(&self) -> (usize, usize) {
        self.sequencer.position()
    }

    pub fn is_complete(&self, step: StepId) -> bool {
        self.sequencer.is_complete(step)
    }

    pub fn confirmation_open(&self) -> bool {
        self.sequencer.gate_open()
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight
    }

    pub fn codes_sent(&self) -> bool {
        self.codes_sent
    }

    pub fn pending_guarantor(&self) -> Option<&GuarantorProfile> {
        self.pending_guarantor.as_ref()
    }

    pub fn active_groups(&self) -> ActiveGroups {
        self.flow.conditions.resolve(self.store.state())
    }

    /// Fields shown on the current step, from the same table validation uses.
    pub fn visible_fields(&self) -> Vec<&FieldDescriptor> {
        let groups = self.active_groups();
        self.flow.effective_fields(self.current_step(), &groups)
    }

    pub fn field_errors(&self) -> &FieldErrors {
        &self.field_errors
    }

    pub fn step_error(&self) -> Option<&str> {
        self.step_error.as_deref()
    }

    pub fn can_resend(&self, channel: Channel) -> bool {
        !self.in_flight && self.cooldowns.is_ready(channel, self.clock.now())
    }

    /// Whole seconds until `channel` may resend, rounded up.
    pub fn resend_remaining(&self, channel: Channel) -> Option<i64> {
        self.cooldowns
            .remaining(channel, self.clock.now())
            .map(|left| (left.num_milliseconds() + 999) / 1000)
    }

    pub fn subscribe(
        &mut self,
        listener: impl Fn(&StoreEvent) + Send + Sync + 'static,
    ) -> SubscriptionId {
        self.store.subscribe(listener)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.store.unsubscribe(id)
    }

    /// Writes a field. Switching a conditional branch clears the fields of the
    /// groups it turned off, and completed steps that own the field lose their
    /// completion.
    pub fn set_field(&mut self, key: &str, value: impl Into<FieldValue>) {
        let value = value.into();
        if self.store.get(key) == Some(&value) {
            return;
        }
        let before = self.active_groups();
        self.store.set(key, value);
        let after = self.active_groups();

        let stale: Vec<&'static str> = self
            .flow
            .conditions
            .deactivated(&before, &after)
            .flat_map(|rule| rule.field_keys())
            .collect();
        if !stale.is_empty() {
            self.pending_guarantor = None;
        }
        for field in stale {
            if self.store.clear(field) {
                debug!(field, "cleared field of inactive group");
            }
        }

        self.clear_lookup_values(key, &after);
        self.forget_codes_for_old_recipient(key);

        if self.config.invalidate_completed_on_edit {
            let mut owners = self.flow.steps_owning(key, &before);
            owners.extend(self.flow.steps_owning(key, &after));
            for step in owners {
                if self.sequencer.invalidate(step) {
                    info!(step = %step, field = key, "completion revoked after edit");
                }
            }
        }
        self.field_errors.remove(key);
    }

    /// Editing an input of an active group drops read-only values a lookup
    /// filled in for that group.
    fn clear_lookup_values(&mut self, key: &str, groups: &ActiveGroups) {
        let mut derived = Vec::new();
        for rule in self.flow.conditions.rules() {
            if !groups.contains(rule.group) {
                continue;
            }
            let edits_input = rule
                .fields
                .iter()
                .any(|field| field.key == key && !field.read_only);
            if edits_input {
                derived.extend(
                    rule.fields
                        .iter()
                        .filter(|field| field.read_only)
                        .map(|field| field.key),
                );
            }
        }
        if derived.is_empty() {
            return;
        }
        self.pending_guarantor = None;
        for field in derived {
            self.store.clear(field);
        }
    }

    /// Codes sent to a recipient the user has since changed cannot be
    /// verified; the send starts over without waiting out the cooldown.
    fn forget_codes_for_old_recipient(&mut self, key: &str) {
        let Some(channel) = Channel::BOTH
            .into_iter()
            .find(|channel| recipient_key(*channel) == key)
        else {
            return;
        };
        let current = self.text(key);
        if !self.sent_to.get(&channel).is_some_and(|sent| *sent != current) {
            return;
        }
        info!(wizard = %self.id, channel = %channel, "recipient changed; verification codes discarded");
        self.codes_sent = false;
        self.sent_to.clear();
        self.cooldowns.clear();
    }

    /// Validates the current step and leaves it: opens its confirmation,
    /// runs its remote check, moves forward or finishes.
    pub async fn next(&mut self) -> Result<StepOutcome, WizardError> {
        self.ensure_idle()?;
        self.step_error = None;
        let step = self.current_step();
        self.validate_step(step)?;

        let gated = self.flow.step(step).is_some_and(|def| def.gate.is_some());
        if gated && !self.sequencer.gate_open() {
            return match self.sequencer.advance()? {
                Advance::AwaitingConfirmation(step) => Ok(StepOutcome::AwaitingConfirmation(step)),
                Advance::Moved(step) => Ok(StepOutcome::Advanced(step)),
            };
        }
        self.finish_step().await
    }

    /// Accepts the open confirmation.
    pub async fn confirm(&mut self) -> Result<StepOutcome, WizardError> {
        self.ensure_idle()?;
        if !self.sequencer.gate_open() {
            return Err(SequencerError::NoGateOpen.into());
        }
        self.step_error = None;
        let step = self.current_step();
        if let Err(err) = self.validate_step(step) {
            self.sequencer.dismiss_gate();
            return Err(err);
        }
        self.finish_step().await
    }

    pub fn cancel_confirmation(&mut self) {
        self.sequencer.dismiss_gate();
    }

    /// Moves one step back without validating.
    pub fn back(&mut self) -> StepId {
        self.step_error = None;
        self.field_errors = FieldErrors::new();
        self.sequencer.retreat()
    }

    async fn finish_step(&mut self) -> Result<StepOutcome, WizardError> {
        let has_check = self
            .flow
            .step(self.current_step())
            .is_some_and(|def| def.remote_check.is_some());
        if !has_check {
            if self.sequencer.is_last() {
                self.revalidate_all()?;
            }
            return self.leave_step(None);
        }
        let pending = self.begin(WizardAction::CheckStep)?;
        let settled = pending.run().await;
        match self.complete(settled)? {
            DispatchEffect::Step(outcome) => Ok(outcome),
            other => Err(WizardError::Terminal(format!(
                "Unexpected result for step check: {:?}",
                other
            ))),
        }
    }

    /// Starts `action`. The returned dispatch does not borrow the wizard.
    pub fn begin(&mut self, action: WizardAction) -> Result<PendingDispatch, WizardError> {
        self.ensure_idle()?;
        let remote = match self.remote_action(action) {
            Ok(remote) => remote,
            Err(err) => {
                self.record_error(&err);
                return Err(err);
            }
        };
        let ticket = Ticket {
            generation: self.generation,
            step: self.current_step(),
            subject: self.dispatch_subject(action),
        };
        self.in_flight = true;
        info!(wizard = %self.id, action = remote.name(), step = %ticket.step, "dispatch started");
        let dispatcher = self.dispatcher.clone();
        let future = async move { dispatcher.invoke(remote).await }.boxed();
        Ok(PendingDispatch {
            ticket,
            action,
            future,
        })
    }

    /// Applies a settled dispatch. Results from a previous generation or a
    /// step the user has since left are rejected as stale.
    pub fn complete(&mut self, settled: Settled) -> Result<DispatchEffect, WizardError> {
        if settled.ticket.generation != self.generation {
            warn!(wizard = %self.id, action = ?settled.action, "discarding result from closed wizard");
            return Err(WizardError::StaleResult);
        }
        self.in_flight = false;
        if settled.ticket.step != self.current_step() {
            warn!(
                wizard = %self.id,
                action = ?settled.action,
                from = %settled.ticket.step,
                "discarding result for a step that is no longer current"
            );
            return Err(WizardError::StaleResult);
        }
        if settled.ticket.subject != self.dispatch_subject(settled.action) {
            warn!(
                wizard = %self.id,
                action = ?settled.action,
                "discarding result for input edited while the request ran"
            );
            return Err(WizardError::StaleResult);
        }
        match settled.result {
            Ok(payload) => self.apply(settled.action, payload),
            Err(err) => {
                let err = WizardError::from(err);
                if settled.action == WizardAction::CheckStep {
                    self.sequencer.dismiss_gate();
                }
                self.record_error(&err);
                Err(err)
            }
        }
    }

    pub async fn lookup_guarantor(&mut self) -> Result<GuarantorProfile, WizardError> {
        match self.dispatch(WizardAction::LookupGuarantor).await? {
            DispatchEffect::GuarantorFound(profile) => Ok(profile),
            other => Err(unexpected(other)),
        }
    }

    /// Commits (`accept`) or discards the looked-up guarantor.
    pub fn confirm_guarantor(&mut self, accept: bool) -> Result<(), WizardError> {
        let profile = self
            .pending_guarantor
            .take()
            .ok_or(WizardError::NoPendingConfirmation)?;
        if accept {
            self.set_field("guarantorName", profile.name.as_str());
            self.set_field("guarantorPhone", profile.phone.as_str());
            info!(wizard = %self.id, "guarantor confirmed");
        } else {
            debug!(wizard = %self.id, "guarantor discarded");
        }
        Ok(())
    }

    pub async fn send_verifications(&mut self) -> Result<(), WizardError> {
        self.dispatch(WizardAction::SendVerifications).await.map(|_| ())
    }

    pub async fn resend(&mut self, channel: Channel) -> Result<(), WizardError> {
        self.dispatch(WizardAction::Resend(channel)).await.map(|_| ())
    }

    pub async fn refresh_credit_limit(&mut self) -> Result<CreditLimit, WizardError> {
        match self.dispatch(WizardAction::FetchCreditLimit).await? {
            DispatchEffect::CreditLimit(limit) => Ok(limit),
            other => Err(unexpected(other)),
        }
    }

    pub async fn fetch_loans(&mut self) -> Result<Vec<LoanSummary>, WizardError> {
        match self.dispatch(WizardAction::FetchLoans).await? {
            DispatchEffect::Loans(loans) => Ok(loans),
            other => Err(unexpected(other)),
        }
    }

    /// Resets everything and invalidates results still in flight.
    pub fn close(&mut self) {
        self.generation += 1;
        self.in_flight = false;
        self.store.reset();
        self.sequencer.reset();
        self.cooldowns.clear();
        self.pending_guarantor = None;
        self.codes_sent = false;
        self.sent_to.clear();
        self.field_errors = FieldErrors::new();
        self.step_error = None;
        info!(wizard = %self.id, generation = self.generation, "wizard reset");
    }

    async fn dispatch(&mut self, action: WizardAction) -> Result<DispatchEffect, WizardError> {
        let pending = self.begin(action)?;
        let settled = pending.run().await;
        self.complete(settled)
    }

    fn ensure_idle(&self) -> Result<(), WizardError> {
        if self.in_flight {
            Err(WizardError::Busy)
        } else {
            Ok(())
        }
    }

    fn record_error(&mut self, err: &WizardError) {
        match err {
            WizardError::Invalid(errors) => self.field_errors = errors.clone(),
            WizardError::Busy | WizardError::StaleResult => {}
            other => self.step_error = Some(other.user_message()),
        }
    }

    fn validate_step(&mut self, step: StepId) -> Result<(), WizardError> {
        let validator = StepValidator::new(&self.flow, &self.context);
        match validator.validate(step, self.store.state()) {
            Ok(()) => {
                self.field_errors = FieldErrors::new();
                self.sequencer.mark_complete(step);
                Ok(())
            }
            Err(errors) => {
                debug!(step = %step, errors = %errors, "step failed validation");
                self.field_errors = errors.clone();
                Err(WizardError::Invalid(errors))
            }
        }
    }

    /// Re-checks every step before the terminal submission.
    fn revalidate_all(&mut self) -> Result<(), WizardError> {
        let validator = StepValidator::new(&self.flow, &self.context);
        for step in &self.flow.steps {
            if let Err(errors) = validator.validate(step.id, self.store.state()) {
                self.sequencer.invalidate(step.id);
                self.field_errors = errors.clone();
                self.step_error = Some(format!("Please review the {} step", step.title));
                return Err(WizardError::Invalid(errors));
            }
        }
        Ok(())
    }

    fn text(&self, key: &str) -> String {
        self.store
            .get(key)
            .map(FieldValue::display)
            .unwrap_or_default()
            .trim()
            .to_string()
    }

    /// The input a dispatch's result belongs to. `None` for actions whose
    /// result does not depend on editable input.
    fn dispatch_subject(&self, action: WizardAction) -> Option<String> {
        match action {
            WizardAction::LookupGuarantor => Some(self.text(GUARANTOR_EMAIL)),
            WizardAction::SendVerifications => Some(format!(
                "{}\n{}",
                self.text(recipient_key(Channel::Email)),
                self.text(recipient_key(Channel::Phone))
            )),
            WizardAction::Resend(channel) => Some(self.text(recipient_key(channel))),
            WizardAction::CheckStep | WizardAction::FetchCreditLimit | WizardAction::FetchLoans => {
                None
            }
        }
    }

    fn required_text(&self, key: &str, label: &str) -> Result<String, WizardError> {
        let value = self.text(key);
        if value.is_empty() {
            Err(WizardError::Invalid(FieldErrors::single(
                key,
                format!("{} is required", label),
            )))
        } else {
            Ok(value)
        }
    }

    fn check_cooldown(&self, channel: Channel) -> Result<(), WizardError> {
        match self.resend_remaining(channel) {
            Some(remaining_secs) => Err(WizardError::CooldownActive {
                channel,
                remaining_secs,
            }),
            None => Ok(()),
        }
    }

    fn remote_action(&mut self, action: WizardAction) -> Result<RemoteAction, WizardError> {
        match action {
            WizardAction::CheckStep => self.step_check_action(),
            WizardAction::LookupGuarantor => Ok(RemoteAction::LookupGuarantor {
                email: self.required_text(GUARANTOR_EMAIL, "Guarantor email")?,
            }),
            WizardAction::SendVerifications => {
                for channel in Channel::BOTH {
                    self.check_cooldown(channel)?;
                }
                Ok(RemoteAction::SendVerifications {
                    email: self.required_text(recipient_key(Channel::Email), "Email")?,
                    phone: self.required_text(recipient_key(Channel::Phone), "Phone number")?,
                })
            }
            WizardAction::Resend(channel) => {
                self.check_cooldown(channel)?;
                let label = match channel {
                    Channel::Email => "Email",
                    Channel::Phone => "Phone number",
                };
                let recipient = self.required_text(recipient_key(channel), label)?;
                Ok(RemoteAction::SendVerification { channel, recipient })
            }
            WizardAction::FetchCreditLimit => Ok(RemoteAction::FetchCreditLimit {
                user_id: self.user_id()?,
            }),
            WizardAction::FetchLoans => Ok(RemoteAction::FetchLoans {
                user_id: self.user_id()?,
            }),
        }
    }

    fn user_id(&self) -> Result<String, WizardError> {
        self.context
            .user_id
            .clone()
            .ok_or_else(|| WizardError::Terminal("You need to be signed in".into()))
    }

    fn step_check_action(&mut self) -> Result<RemoteAction, WizardError> {
        let step = self.current_step();
        let definition = self
            .flow
            .step(step)
            .ok_or_else(|| WizardError::Terminal(format!("Unknown step `{}`", step)))?;
        let check = definition.remote_check.ok_or_else(|| {
            WizardError::Terminal(format!("Step `{}` has no remote check", step))
        })?;
        if definition.gate.is_some() && !self.sequencer.gate_open() {
            return Err(SequencerError::NoGateOpen.into());
        }
        if !self.sequencer.is_complete(step) {
            self.validate_step(step)?;
        }
        if self.sequencer.is_last() {
            self.revalidate_all()?;
        }

        match check {
            RemoteCheck::AccessCode => Ok(RemoteAction::ValidateAccessCode {
                code: self.required_text("accessCode", "Access code")?,
            }),
            RemoteCheck::VerifyCodes => {
                if !self.codes_sent {
                    return Err(WizardError::Terminal(
                        "Request your verification codes first".into(),
                    ));
                }
                Ok(RemoteAction::VerifyCodes {
                    email: self.text(recipient_key(Channel::Email)),
                    email_code: self.text("emailCode"),
                    phone: self.text(recipient_key(Channel::Phone)),
                    phone_code: self.text("phoneCode"),
                })
            }
            RemoteCheck::SubmitApplication(endpoint) => {
                let contract = self.flow.contract(endpoint).ok_or_else(|| {
                    WizardError::Terminal(format!("No payload contract for {}", endpoint))
                })?;
                let payload = finalize(contract, self.store.state(), &self.context);
                Ok(RemoteAction::SubmitApplication { payload })
            }
            RemoteCheck::UploadDocuments => {
                if self.text(APPLICATION_ID).is_empty() {
                    return Err(WizardError::Terminal(
                        "Loan application ID is missing. Submit the application before uploading documents."
                            .into(),
                    ));
                }
                let contract = self.flow.contract(Endpoint::DocumentUpload).ok_or_else(|| {
                    WizardError::Terminal(format!(
                        "No payload contract for {}",
                        Endpoint::DocumentUpload
                    ))
                })?;
                let documents = self
                    .store
                    .get(DOCUMENTS)
                    .and_then(FieldValue::as_documents)
                    .cloned()
                    .unwrap_or_default();
                let payload = finalize(contract, self.store.state(), &self.context);
                Ok(RemoteAction::UploadDocuments { payload, documents })
            }
        }
    }

    fn apply(
        &mut self,
        action: WizardAction,
        payload: ActionPayload,
    ) -> Result<DispatchEffect, WizardError> {
        match (action, payload) {
            (WizardAction::CheckStep, ActionPayload::Profile(profile)) => {
                self.prefill(&profile);
                self.leave_step(None).map(DispatchEffect::Step)
            }
            (WizardAction::CheckStep, ActionPayload::Receipt(receipt)) => {
                if !self.sequencer.is_last() {
                    self.set_field(APPLICATION_ID, receipt.id.as_str());
                }
                self.leave_step(Some(receipt.id)).map(DispatchEffect::Step)
            }
            (WizardAction::CheckStep, ActionPayload::Ack) => {
                let reference = Some(self.text(APPLICATION_ID)).filter(|id| !id.is_empty());
                self.leave_step(reference).map(DispatchEffect::Step)
            }
            (WizardAction::LookupGuarantor, ActionPayload::Guarantor(profile)) => {
                self.pending_guarantor = Some(profile.clone());
                Ok(DispatchEffect::GuarantorFound(profile))
            }
            (WizardAction::SendVerifications, ActionPayload::Ack) => {
                let now = self.clock.now();
                for channel in Channel::BOTH {
                    self.cooldowns.start(channel, now);
                    let recipient = self.text(recipient_key(channel));
                    self.sent_to.insert(channel, recipient);
                }
                self.codes_sent = true;
                Ok(DispatchEffect::CodesSent(Channel::BOTH.to_vec()))
            }
            (WizardAction::Resend(channel), ActionPayload::Ack) => {
                self.cooldowns.start(channel, self.clock.now());
                let recipient = self.text(recipient_key(channel));
                self.sent_to.insert(channel, recipient);
                Ok(DispatchEffect::CodesSent(vec![channel]))
            }
            (WizardAction::FetchCreditLimit, ActionPayload::CreditLimit(limit)) => {
                self.store.set(CREDIT_LIMIT, limit.available);
                Ok(DispatchEffect::CreditLimit(limit))
            }
            (WizardAction::FetchLoans, ActionPayload::Loans(loans)) => {
                Ok(DispatchEffect::Loans(loans))
            }
            (action, payload) => Err(WizardError::Terminal(format!(
                "Unexpected response {:?} for {:?}",
                payload, action
            ))),
        }
    }

    fn prefill(&mut self, profile: &ProfileSnapshot) {
        self.set_field("firstName", profile.first_name.as_str());
        self.set_field("lastName", profile.last_name.as_str());
        let optional = [
            ("email", &profile.email),
            ("phone", &profile.phone),
            ("memberNumber", &profile.member_number),
        ];
        for (key, value) in optional {
            if let Some(value) = value {
                self.set_field(key, value.as_str());
            }
        }
    }

    fn leave_step(&mut self, reference: Option<String>) -> Result<StepOutcome, WizardError> {
        if self.sequencer.is_last() {
            let completion = Completion {
                flow: self.flow.kind,
                reference,
            };
            info!(wizard = %self.id, flow = %completion.flow, "wizard finished");
            self.close();
            return Ok(StepOutcome::Finished(completion));
        }
        if self.sequencer.gate_open() {
            let step = self.sequencer.confirm_gate()?;
            return Ok(StepOutcome::Advanced(step));
        }
        match self.sequencer.advance()? {
            Advance::Moved(step) => Ok(StepOutcome::Advanced(step)),
            Advance::AwaitingConfirmation(step) => Ok(StepOutcome::AwaitingConfirmation(step)),
        }
    }
}

/// Field holding the address a channel's code is sent to.
fn recipient_key(channel: Channel) -> &'static str {
    match channel {
        Channel::Email => "email",
        Channel::Phone => "phone",
    }
}

fn unexpected(effect: DispatchEffect) -> WizardError {
    WizardError::Terminal(format!("Unexpected dispatch result: {:?}", effect))
}
