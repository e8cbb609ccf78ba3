//! Ambient, read-only session data handed to a wizard when it is opened.

use serde::{Deserialize, Serialize};

/// Snapshot of the signed-in member and UI preferences. The wizard never
/// writes to it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppContext {
    pub user_id: Option<String>,
    pub member_number: Option<String>,
    pub display_name: Option<String>,
    #[serde(skip_serializing)]
    pub auth_token: Option<String>,
    pub wallet_balance: f64,
    #[serde(default)]
    pub theme: Option<String>,
}

/// Context values that payload contracts and rules may reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextKey {
    UserId,
    MemberNumber,
    WalletBalance,
}

/// A value read out of the context.
#[derive(Debug, Clone, PartialEq)]
pub enum ContextValue {
    Text(String),
    Number(f64),
}

impl AppContext {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn member(user_id: impl Into<String>, wallet_balance: f64) -> Self {
        Self {
            user_id: Some(user_id.into()),
            wallet_balance,
            ..Self::default()
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    pub fn lookup(&self, key: ContextKey) -> Option<ContextValue> {
        match key {
            ContextKey::UserId => self.user_id.clone().map(ContextValue::Text),
            ContextKey::MemberNumber => self.member_number.clone().map(ContextValue::Text),
            ContextKey::WalletBalance => Some(ContextValue::Number(self.wallet_balance)),
        }
    }

    pub fn number(&self, key: ContextKey) -> Option<f64> {
        match self.lookup(key)? {
            ContextValue::Number(value) => Some(value),
            ContextValue::Text(text) => text.trim().parse().ok(),
        }
    }
}
