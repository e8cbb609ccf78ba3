//! HTTP/JSON backend for the cooperative API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Method, RequestBuilder, Url};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use thiserror::Error;

use crate::dispatch::{
    ApplicationReceipt, CreditLimit, DispatchError, GuarantorProfile, LoanSummary,
    ProfileSnapshot, RemoteBackend,
};
use crate::wizard::cooldown::Channel;
use crate::wizard::documents::DocumentSet;
use crate::wizard::finalize::SubmissionPayload;

#[derive(Debug, Error)]
pub enum BackendSetupError {
    #[error("Invalid API base URL: {0}")]
    InvalidUrl(String),
    #[error("HTTP client error: {0}")]
    Client(#[from] reqwest::Error),
}

pub struct HttpBackend {
    client: Client,
    base_url: Url,
    token: Option<String>,
}

impl HttpBackend {
    pub fn new(
        base_url: &str,
        timeout: Duration,
        token: Option<String>,
    ) -> Result<Self, BackendSetupError> {
        let mut normalized = base_url.trim().to_string();
        if !normalized.ends_with('/') {
            normalized.push('/');
        }
        let base_url =
            Url::parse(&normalized).map_err(|err| BackendSetupError::InvalidUrl(err.to_string()))?;
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url,
            token,
        })
    }

    fn request(&self, method: Method, path: &str) -> Result<RequestBuilder, DispatchError> {
        let url = self
            .base_url
            .join(path)
            .map_err(|err| DispatchError::NetworkFailure(format!("bad request URL: {}", err)))?;
        Ok(self.request_url(method, url))
    }

    fn request_url(&self, method: Method, url: Url) -> RequestBuilder {
        let builder = self.client.request(method, url);
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// `users/{user_id}/{resource}` with the id percent-encoded as one segment.
    fn user_url(&self, user_id: &str, resource: &str) -> Result<Url, DispatchError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| DispatchError::NetworkFailure("base URL cannot hold a path".into()))?
            .pop_if_empty()
            .extend(["users", user_id, resource]);
        Ok(url)
    }

    async fn execute(
        &self,
        builder: RequestBuilder,
        fallback: &str,
    ) -> Result<String, DispatchError> {
        let response = builder.send().await.map_err(transport_error)?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(transport_error)?;
        match classify_status(status, &body, fallback) {
            Some(err) => Err(err),
            None => Ok(body),
        }
    }

    async fn fetch<T: DeserializeOwned>(
        &self,
        builder: RequestBuilder,
        fallback: &str,
    ) -> Result<T, DispatchError> {
        let body = self.execute(builder, fallback).await?;
        serde_json::from_str(&body).map_err(|err| DispatchError::ServerError {
            status: 200,
            message: format!("unexpected response body: {}", err),
        })
    }
}

fn transport_error(err: reqwest::Error) -> DispatchError {
    match err.status() {
        Some(status) if status.is_server_error() => DispatchError::ServerError {
            status: status.as_u16(),
            message: err.to_string(),
        },
        _ => DispatchError::NetworkFailure(err.to_string()),
    }
}

/// Maps a status code onto the dispatch taxonomy. `None` means success.
pub fn classify_status(status: u16, body: &str, fallback: &str) -> Option<DispatchError> {
    if (200..300).contains(&status) {
        return None;
    }
    let message = server_message(body).unwrap_or_else(|| fallback.to_string());
    if status >= 500 {
        Some(DispatchError::ServerError { status, message })
    } else {
        Some(DispatchError::ValidationRejected(message))
    }
}

fn server_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    ["message", "error", "detail"]
        .iter()
        .find_map(|key| value.get(*key).and_then(Value::as_str))
        .map(str::to_string)
}

fn form_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

#[async_trait]
impl RemoteBackend for HttpBackend {
    async fn validate_access_code(&self, code: &str) -> Result<ProfileSnapshot, DispatchError> {
        let builder = self
            .request(Method::POST, "auth/access-code")?
            .json(&json!({ "code": code.trim() }));
        self.fetch(builder, "Invalid access code").await
    }

    async fn lookup_guarantor(&self, email: &str) -> Result<GuarantorProfile, DispatchError> {
        let builder = self
            .request(Method::GET, "members/guarantor")?
            .query(&[("email", email.trim())]);
        self.fetch(builder, "No member found with that email").await
    }

    async fn send_verification(
        &self,
        channel: Channel,
        recipient: &str,
    ) -> Result<(), DispatchError> {
        let path = format!("verification/{}/send", channel);
        let builder = self
            .request(Method::POST, &path)?
            .json(&json!({ "recipient": recipient }));
        self.execute(builder, "Could not send verification code")
            .await
            .map(|_| ())
    }

    async fn verify_code(
        &self,
        channel: Channel,
        recipient: &str,
        code: &str,
    ) -> Result<(), DispatchError> {
        let path = format!("verification/{}/verify", channel);
        let builder = self
            .request(Method::POST, &path)?
            .json(&json!({ "recipient": recipient, "code": code.trim() }));
        let fallback = format!("The {} code is incorrect", channel);
        self.execute(builder, &fallback).await.map(|_| ())
    }

    async fn submit_application(
        &self,
        payload: &SubmissionPayload,
    ) -> Result<ApplicationReceipt, DispatchError> {
        let builder = self
            .request(Method::POST, payload.endpoint().path())?
            .json(payload.body());
        self.fetch(builder, "The application was rejected").await
    }

    async fn upload_documents(
        &self,
        payload: &SubmissionPayload,
        documents: &DocumentSet,
    ) -> Result<(), DispatchError> {
        let mut form = Form::new();
        for (key, value) in payload.body() {
            form = form.text(key.clone(), form_text(value));
        }
        for (slot, file) in documents.iter() {
            let bytes = tokio::fs::read(&file.path).await.map_err(|err| {
                DispatchError::ValidationRejected(format!("Could not read {}: {}", file.name, err))
            })?;
            let mime = file.media_type.map(|media| media.mime()).ok_or_else(|| {
                DispatchError::ValidationRejected(format!("{} has an unsupported type", file.name))
            })?;
            let part = Part::bytes(bytes)
                .file_name(file.name.clone())
                .mime_str(mime)
                .map_err(transport_error)?;
            form = form.part(slot.key(), part);
        }
        let builder = self
            .request(Method::POST, payload.endpoint().path())?
            .multipart(form);
        self.execute(builder, "Documents were rejected")
            .await
            .map(|_| ())
    }

    async fn fetch_credit_limit(&self, user_id: &str) -> Result<CreditLimit, DispatchError> {
        let url = self.user_url(user_id, "credit-limit")?;
        let builder = self.request_url(Method::GET, url);
        self.fetch(builder, "Credit limit unavailable").await
    }

    async fn fetch_loans(&self, user_id: &str) -> Result<Vec<LoanSummary>, DispatchError> {
        let url = self.user_url(user_id, "loans")?;
        let builder = self.request_url(Method::GET, url);
        self.fetch(builder, "Loans unavailable").await
    }
}
