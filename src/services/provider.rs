//! Email Provider abstraction

use async_trait::async_trait;
use serde::Serialize;
use uuid::Uuid;

use crate::models::{Contact, EmailAddress};

/// Account-level condition that no per-recipient retry can fix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum FatalKind {
    /// Missing, invalid or revoked provider credentials
    InvalidCredentials,
    /// Sending domain or address not verified with the provider
    UnverifiedIdentity,
}

impl std::fmt::Display for FatalKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidCredentials => write!(f, "invalid credentials"),
            Self::UnverifiedIdentity => write!(f, "unverified sender identity"),
        }
    }
}

/// Provider error
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// Aborts the whole dispatch; the message is shown to the user as-is
    #[error("{message}")]
    Fatal { kind: FatalKind, message: String },
    /// One recipient could not be sent to
    #[error("Recipient rejected: {0}")]
    Recipient(String),
    /// Every recipient failed
    #[error("No emails could be sent ({failed} failed): {last_error}")]
    NothingSent { failed: usize, last_error: String },
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl ProviderError {
    pub fn fatal(kind: FatalKind, message: impl Into<String>) -> Self {
        Self::Fatal {
            kind,
            message: message.into(),
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal { .. } | Self::Configuration(_))
    }
}

/// Everything a provider needs to send one campaign
#[derive(Debug, Clone)]
pub struct CampaignSendParams {
    pub campaign_id: Uuid,
    pub sender: EmailAddress,
    pub reply_to: Option<EmailAddress>,
    /// Unrendered subject template
    pub subject: String,
    /// Unrendered preview text
    pub preheader: Option<String>,
    /// Unrendered HTML template
    pub html_content: String,
    pub contacts: Vec<Contact>,
}

/// A single, already rendered test message
#[derive(Debug, Clone)]
pub struct TestEmailParams {
    pub campaign_id: Uuid,
    pub sender: EmailAddress,
    pub reply_to: Option<EmailAddress>,
    pub recipient: String,
    pub subject: String,
    pub html_content: String,
}

/// Provider acknowledgement for one accepted message
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendReceipt {
    pub contact_id: Option<Uuid>,
    pub message_id: String,
}

/// Aggregate outcome of a campaign dispatch
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchResult {
    pub sent: usize,
    pub failed: usize,
    /// Successful sends in completion order
    pub receipts: Vec<SendReceipt>,
}

impl DispatchResult {
    /// Provider message ids, in completion order
    pub fn message_ids(&self) -> Vec<&str> {
        self.receipts.iter().map(|r| r.message_id.as_str()).collect()
    }
}

/// Pluggable email sending capability
#[async_trait]
pub trait EmailProvider: Send + Sync {
    /// Short provider name for logs
    fn name(&self) -> &'static str;

    async fn send_test_email(&self, params: &TestEmailParams) -> Result<SendReceipt, ProviderError>;

    /// Personalize and send one message per contact.
    ///
    /// Fails when a fatal error is hit or when nothing at all could be sent.
    async fn send_campaign(&self, params: &CampaignSendParams) -> Result<DispatchResult, ProviderError>;
}
