//! Remote Action Dispatcher: the only place the wizard suspends on I/O.

pub mod http;
pub mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use futures::future;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::wizard::cooldown::Channel;
use crate::wizard::documents::DocumentSet;
use crate::wizard::finalize::SubmissionPayload;

/// Failure reported by a backend call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    /// The service deemed the input malformed or unknown.
    #[error("{0}")]
    ValidationRejected(String),
    /// Unreachable host or timeout.
    #[error("network failure: {0}")]
    NetworkFailure(String),
    #[error("server error {status}: {message}")]
    ServerError { status: u16, message: String },
}

/// Member profile returned for a valid signup access code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileSnapshot {
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub member_number: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuarantorProfile {
    pub name: String,
    pub phone: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationReceipt {
    pub id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CreditLimit {
    pub limit: f64,
    pub available: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoanSummary {
    pub id: String,
    pub amount: f64,
    pub balance: f64,
    pub status: String,
}

/// Logical backend operations the wizards depend on.
#[async_trait]
pub trait RemoteBackend: Send + Sync {
    async fn validate_access_code(&self, code: &str) -> Result<ProfileSnapshot, DispatchError>;
    async fn lookup_guarantor(&self, email: &str) -> Result<GuarantorProfile, DispatchError>;
    async fn send_verification(&self, channel: Channel, recipient: &str)
        -> Result<(), DispatchError>;
    async fn verify_code(
        &self,
        channel: Channel,
        recipient: &str,
        code: &str,
    ) -> Result<(), DispatchError>;
    async fn submit_application(
        &self,
        payload: &SubmissionPayload,
    ) -> Result<ApplicationReceipt, DispatchError>;
    async fn upload_documents(
        &self,
        payload: &SubmissionPayload,
        documents: &DocumentSet,
    ) -> Result<(), DispatchError>;
    async fn fetch_credit_limit(&self, user_id: &str) -> Result<CreditLimit, DispatchError>;
    async fn fetch_loans(&self, user_id: &str) -> Result<Vec<LoanSummary>, DispatchError>;
}

/// Request half of a dispatch.
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteAction {
    ValidateAccessCode {
        code: String,
    },
    LookupGuarantor {
        email: String,
    },
    SendVerification {
        channel: Channel,
        recipient: String,
    },
    /// Email and phone sends issued together; both must succeed.
    SendVerifications {
        email: String,
        phone: String,
    },
    /// Email and phone codes checked together; both must succeed.
    VerifyCodes {
        email: String,
        email_code: String,
        phone: String,
        phone_code: String,
    },
    SubmitApplication {
        payload: SubmissionPayload,
    },
    UploadDocuments {
        payload: SubmissionPayload,
        documents: DocumentSet,
    },
    FetchCreditLimit {
        user_id: String,
    },
    FetchLoans {
        user_id: String,
    },
}

impl RemoteAction {
    pub fn name(&self) -> &'static str {
        match self {
            RemoteAction::ValidateAccessCode { .. } => "validate_access_code",
            RemoteAction::LookupGuarantor { .. } => "lookup_guarantor",
            RemoteAction::SendVerification { .. } => "send_verification",
            RemoteAction::SendVerifications { .. } => "send_verifications",
            RemoteAction::VerifyCodes { .. } => "verify_codes",
            RemoteAction::SubmitApplication { .. } => "submit_application",
            RemoteAction::UploadDocuments { .. } => "upload_documents",
            RemoteAction::FetchCreditLimit { .. } => "fetch_credit_limit",
            RemoteAction::FetchLoans { .. } => "fetch_loans",
        }
    }
}

/// Success half of a dispatch.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionPayload {
    Profile(ProfileSnapshot),
    Guarantor(GuarantorProfile),
    Ack,
    Receipt(ApplicationReceipt),
    CreditLimit(CreditLimit),
    Loans(Vec<LoanSummary>),
}

/// Routes actions to a backend. Cheap to clone.
#[derive(Clone)]
pub struct Dispatcher {
    backend: Arc<dyn RemoteBackend>,
}

impl Dispatcher {
    pub fn new(backend: Arc<dyn RemoteBackend>) -> Self {
        Self { backend }
    }

    pub async fn invoke(&self, action: RemoteAction) -> Result<ActionPayload, DispatchError> {
        let name = action.name();
        info!(action = name, "dispatching");
        let result = self.run(action).await;
        if let Err(err) = &result {
            warn!(action = name, error = %err, "dispatch failed");
        }
        result
    }

    /// Sends both one-time codes concurrently; fails unless both sends succeed.
    pub async fn send_verifications(&self, email: &str, phone: &str) -> Result<(), DispatchError> {
        self.invoke(RemoteAction::SendVerifications {
            email: email.to_string(),
            phone: phone.to_string(),
        })
        .await
        .map(|_| ())
    }

    pub async fn verify_codes(
        &self,
        email: &str,
        email_code: &str,
        phone: &str,
        phone_code: &str,
    ) -> Result<(), DispatchError> {
        self.invoke(RemoteAction::VerifyCodes {
            email: email.to_string(),
            email_code: email_code.to_string(),
            phone: phone.to_string(),
            phone_code: phone_code.to_string(),
        })
        .await
        .map(|_| ())
    }

    async fn run(&self, action: RemoteAction) -> Result<ActionPayload, DispatchError> {
        let backend = self.backend.as_ref();
        match action {
            RemoteAction::ValidateAccessCode { code } => backend
                .validate_access_code(&code)
                .await
                .map(ActionPayload::Profile),
            RemoteAction::LookupGuarantor { email } => backend
                .lookup_guarantor(&email)
                .await
                .map(ActionPayload::Guarantor),
            RemoteAction::SendVerification { channel, recipient } => backend
                .send_verification(channel, &recipient)
                .await
                .map(|_| ActionPayload::Ack),
            RemoteAction::SendVerifications { email, phone } => {
                let (email_result, phone_result) = future::join(
                    backend.send_verification(Channel::Email, &email),
                    backend.send_verification(Channel::Phone, &phone),
                )
                .await;
                all_or_nothing(email_result, phone_result).map(|_| ActionPayload::Ack)
            }
            RemoteAction::VerifyCodes {
                email,
                email_code,
                phone,
                phone_code,
            } => {
                let (email_result, phone_result) = future::join(
                    backend.verify_code(Channel::Email, &email, &email_code),
                    backend.verify_code(Channel::Phone, &phone, &phone_code),
                )
                .await;
                all_or_nothing(email_result, phone_result).map(|_| ActionPayload::Ack)
            }
            RemoteAction::SubmitApplication { payload } => backend
                .submit_application(&payload)
                .await
                .map(ActionPayload::Receipt),
            RemoteAction::UploadDocuments { payload, documents } => backend
                .upload_documents(&payload, &documents)
                .await
                .map(|_| ActionPayload::Ack),
            RemoteAction::FetchCreditLimit { user_id } => backend
                .fetch_credit_limit(&user_id)
                .await
                .map(ActionPayload::CreditLimit),
            RemoteAction::FetchLoans { user_id } => {
                backend.fetch_loans(&user_id).await.map(ActionPayload::Loans)
            }
        }
    }
}

/// Joins two channel results. A partial success counts as failure because
/// later steps assume both codes exist.
fn all_or_nothing(
    email: Result<(), DispatchError>,
    phone: Result<(), DispatchError>,
) -> Result<(), DispatchError> {
    match (email, phone) {
        (Ok(()), Ok(())) => Ok(()),
        (Err(err), Ok(())) => {
            warn!(channel = "email", "partial failure; both channels must be retried");
            Err(err)
        }
        (Ok(()), Err(err)) => {
            warn!(channel = "phone", "partial failure; both channels must be retried");
            Err(err)
        }
        (Err(err), Err(_)) => Err(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::memory::InMemoryBackend;

    #[tokio::test]
    async fn joined_send_fails_when_one_channel_fails() {
        let backend = Arc::new(InMemoryBackend::new().failing_channel(Channel::Phone));
        let dispatcher = Dispatcher::new(backend.clone());

        let result = dispatcher
            .invoke(RemoteAction::SendVerifications {
                email: "ada@coop.ng".into(),
                phone: "08012345678".into(),
            })
            .await;

        assert!(result.is_err());
        assert_eq!(
            backend.calls(),
            vec!["send_verification:email", "send_verification:phone"]
        );
    }

    #[tokio::test]
    async fn lookup_returns_guarantor() {
        let backend = Arc::new(InMemoryBackend::new().with_guarantor(
            "jane@coop.ng",
            GuarantorProfile {
                name: "Jane Doe".into(),
                phone: "08012345678".into(),
            },
        ));
        let dispatcher = Dispatcher::new(backend);
        let payload = dispatcher
            .invoke(RemoteAction::LookupGuarantor {
                email: "JANE@coop.ng".into(),
            })
            .await
            .unwrap();
        assert!(matches!(payload, ActionPayload::Guarantor(ref g) if g.name == "Jane Doe"));

        let missing = dispatcher
            .invoke(RemoteAction::LookupGuarantor {
                email: "nobody@coop.ng".into(),
            })
            .await;
        assert!(matches!(missing, Err(DispatchError::ValidationRejected(_))));
    }

    #[tokio::test]
    async fn joined_verify_needs_both_codes() {
        let backend = Arc::new(InMemoryBackend::new().with_verification_code("654321"));
        let dispatcher = Dispatcher::new(backend.clone());

        let wrong_phone = dispatcher
            .verify_codes("ada@coop.ng", "654321", "08012345678", "000000")
            .await;
        assert_eq!(
            wrong_phone,
            Err(DispatchError::ValidationRejected(
                "The phone code is incorrect".into()
            ))
        );
        assert!(dispatcher
            .verify_codes("ada@coop.ng", "654321", "08012345678", "654321")
            .await
            .is_ok());
        assert_eq!(backend.calls_to("verify_code"), 4);
    }

    #[tokio::test]
    async fn offline_backend_reports_network_failure() {
        let backend = Arc::new(InMemoryBackend::demo());
        backend.set_offline(true);
        let dispatcher = Dispatcher::new(backend);
        let result = dispatcher.send_verifications("ada@coop.ng", "08012345678").await;
        assert!(matches!(result, Err(DispatchError::NetworkFailure(_))));
    }
}
