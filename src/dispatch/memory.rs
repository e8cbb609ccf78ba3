//! Scriptable in-process backend. Backs the CLI's offline mode and the tests.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use crate::dispatch::{
    ApplicationReceipt, CreditLimit, DispatchError, GuarantorProfile, LoanSummary,
    ProfileSnapshot, RemoteBackend,
};
use crate::wizard::cooldown::Channel;
use crate::wizard::documents::DocumentSet;
use crate::wizard::finalize::SubmissionPayload;

const DEFAULT_CODE: &str = "123456";

#[derive(Default)]
struct MemoryState {
    access_codes: HashMap<String, ProfileSnapshot>,
    guarantors: HashMap<String, GuarantorProfile>,
    failing_channels: HashSet<Channel>,
    verification_code: String,
    credit_limit: Option<CreditLimit>,
    loans: Vec<LoanSummary>,
    offline: bool,
    submission_rejection: Option<String>,
    submissions: Vec<SubmissionPayload>,
    uploads: Vec<(SubmissionPayload, usize)>,
    calls: Vec<String>,
    next_id: u64,
}

pub struct InMemoryBackend {
    state: Mutex<MemoryState>,
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MemoryState {
                verification_code: DEFAULT_CODE.to_string(),
                next_id: 1,
                ..MemoryState::default()
            }),
        }
    }

    /// Demo data used by the CLI when no API is configured.
    pub fn demo() -> Self {
        Self::new()
            .with_access_code(
                "COOP-2024",
                ProfileSnapshot {
                    first_name: "Ada".into(),
                    last_name: "Obi".into(),
                    email: Some("ada.obi@example.com".into()),
                    phone: Some("08030000000".into()),
                    member_number: Some("CM-0001".into()),
                },
            )
            .with_guarantor(
                "jane.doe@example.com",
                GuarantorProfile {
                    name: "Jane Doe".into(),
                    phone: "08012345678".into(),
                },
            )
            .with_credit_limit(CreditLimit {
                limit: 500_000.0,
                available: 350_000.0,
            })
            .with_loan(LoanSummary {
                id: "LN-0007".into(),
                amount: 150_000.0,
                balance: 42_500.0,
                status: "active".into(),
            })
    }

    pub fn with_access_code(self, code: &str, profile: ProfileSnapshot) -> Self {
        self.lock().access_codes.insert(code.to_string(), profile);
        self
    }

    pub fn with_guarantor(self, email: &str, profile: GuarantorProfile) -> Self {
        self.lock()
            .guarantors
            .insert(email.trim().to_ascii_lowercase(), profile);
        self
    }

    pub fn failing_channel(self, channel: Channel) -> Self {
        self.lock().failing_channels.insert(channel);
        self
    }

    pub fn with_verification_code(self, code: &str) -> Self {
        self.lock().verification_code = code.to_string();
        self
    }

    pub fn with_credit_limit(self, limit: CreditLimit) -> Self {
        self.lock().credit_limit = Some(limit);
        self
    }

    pub fn with_loan(self, loan: LoanSummary) -> Self {
        self.lock().loans.push(loan);
        self
    }

    pub fn reject_submissions(self, message: &str) -> Self {
        self.lock().submission_rejection = Some(message.to_string());
        self
    }

    pub fn set_offline(&self, offline: bool) {
        self.lock().offline = offline;
    }

    pub fn set_channel_failing(&self, channel: Channel, failing: bool) {
        let mut state = self.lock();
        if failing {
            state.failing_channels.insert(channel);
        } else {
            state.failing_channels.remove(&channel);
        }
    }

    /// Every call received, in order, as `operation[:detail]`.
    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    pub fn calls_to(&self, operation: &str) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|call| call.split(':').next() == Some(operation))
            .count()
    }

    pub fn submissions(&self) -> Vec<SubmissionPayload> {
        self.lock().submissions.clone()
    }

    /// Upload payloads with the number of files attached.
    pub fn uploads(&self) -> Vec<(SubmissionPayload, usize)> {
        self.lock().uploads.clone()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Records the call and fails it when the backend is offline.
    fn record(&self, call: String) -> Result<MutexGuard<'_, MemoryState>, DispatchError> {
        let mut state = self.lock();
        state.calls.push(call);
        if state.offline {
            return Err(DispatchError::NetworkFailure("backend unreachable".into()));
        }
        Ok(state)
    }
}

#[async_trait]
impl RemoteBackend for InMemoryBackend {
    async fn validate_access_code(&self, code: &str) -> Result<ProfileSnapshot, DispatchError> {
        let state = self.record("validate_access_code".into())?;
        state
            .access_codes
            .get(code.trim())
            .cloned()
            .ok_or_else(|| DispatchError::ValidationRejected("Invalid access code".into()))
    }

    async fn lookup_guarantor(&self, email: &str) -> Result<GuarantorProfile, DispatchError> {
        let state = self.record("lookup_guarantor".into())?;
        state
            .guarantors
            .get(&email.trim().to_ascii_lowercase())
            .cloned()
            .ok_or_else(|| {
                DispatchError::ValidationRejected("No member found with that email".into())
            })
    }

    async fn send_verification(
        &self,
        channel: Channel,
        _recipient: &str,
    ) -> Result<(), DispatchError> {
        let state = self.record(format!("send_verification:{}", channel))?;
        if state.failing_channels.contains(&channel) {
            return Err(DispatchError::ServerError {
                status: 503,
                message: format!("{} provider unavailable", channel),
            });
        }
        Ok(())
    }

    async fn verify_code(
        &self,
        channel: Channel,
        _recipient: &str,
        code: &str,
    ) -> Result<(), DispatchError> {
        let state = self.record(format!("verify_code:{}", channel))?;
        if code.trim() == state.verification_code {
            Ok(())
        } else {
            Err(DispatchError::ValidationRejected(format!(
                "The {} code is incorrect",
                channel
            )))
        }
    }

    async fn submit_application(
        &self,
        payload: &SubmissionPayload,
    ) -> Result<ApplicationReceipt, DispatchError> {
        let mut state = self.record(format!("submit_application:{}", payload.endpoint()))?;
        if let Some(message) = state.submission_rejection.clone() {
            return Err(DispatchError::ValidationRejected(message));
        }
        state.submissions.push(payload.clone());
        let id = format!("APP-{:04}", state.next_id);
        state.next_id += 1;
        Ok(ApplicationReceipt { id })
    }

    async fn upload_documents(
        &self,
        payload: &SubmissionPayload,
        documents: &DocumentSet,
    ) -> Result<(), DispatchError> {
        let mut state = self.record("upload_documents".into())?;
        state.uploads.push((payload.clone(), documents.len()));
        Ok(())
    }

    async fn fetch_credit_limit(&self, _user_id: &str) -> Result<CreditLimit, DispatchError> {
        let state = self.record("fetch_credit_limit".into())?;
        state
            .credit_limit
            .ok_or_else(|| DispatchError::ValidationRejected("No credit limit on file".into()))
    }

    async fn fetch_loans(&self, _user_id: &str) -> Result<Vec<LoanSummary>, DispatchError> {
        let state = self.record("fetch_loans".into())?;
        Ok(state.loans.clone())
    }
}
