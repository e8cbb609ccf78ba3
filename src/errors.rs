use std::collections::BTreeMap;
use std::fmt;

use thiserror::Error;

use crate::dispatch::DispatchError;
use crate::wizard::cooldown::Channel;
use crate::wizard::sequencer::SequencerError;

/// Field-level validation failures keyed by field name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldErrors(BTreeMap<String, String>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(field: impl Into<String>, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.insert(field, message);
        errors
    }

    /// Records `message` unless the field already carries an error.
    pub fn insert(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.0.entry(field.into()).or_insert_with(|| message.into());
    }

    pub fn remove(&mut self, field: &str) -> Option<String> {
        self.0.remove(field)
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn into_result(self) -> Result<(), FieldErrors> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined = self
            .0
            .iter()
            .map(|(field, message)| format!("{}: {}", field, message))
            .collect::<Vec<_>>()
            .join("; ");
        write!(f, "{}", joined)
    }
}

/// Error type surfaced by every wizard operation. Nothing here is fatal: each
/// variant leaves the wizard in an interactive, retryable state.
#[derive(Debug, Error)]
pub enum WizardError {
    #[error("Validation failed: {0}")]
    Invalid(FieldErrors),
    #[error("{0}")]
    RemoteRejection(String),
    #[error("Connection problem: {0}")]
    Transport(String),
    #[error("{0}")]
    Terminal(String),
    #[error("Another request is still in progress")]
    Busy,
    #[error("Result arrived after the wizard moved on; ignored")]
    StaleResult,
    #[error("Resend for {channel} available in {remaining_secs}s")]
    CooldownActive { channel: Channel, remaining_secs: i64 },
    #[error("Nothing is waiting for confirmation")]
    NoPendingConfirmation,
    #[error(transparent)]
    Sequencer(#[from] SequencerError),
}

impl WizardError {
    /// Message suitable for a step-local error banner.
    pub fn user_message(&self) -> String {
        match self {
            WizardError::Transport(_) => {
                "We could not reach the server. Please try again.".to_string()
            }
            other => other.to_string(),
        }
    }
}

impl From<DispatchError> for WizardError {
    fn from(err: DispatchError) -> Self {
        match err {
            DispatchError::ValidationRejected(message) => WizardError::RemoteRejection(message),
            DispatchError::NetworkFailure(message) => WizardError::Transport(message),
            DispatchError::ServerError { status, message } => {
                WizardError::Transport(format!("server error {}: {}", status, message))
            }
        }
    }
}

/// Failures raised while loading or saving configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serde(String),
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        ConfigError::Serde(err.to_string())
    }
}
