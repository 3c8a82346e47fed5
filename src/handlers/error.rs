//! Caller-facing error mapping

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::services::{CampaignError, ContactError};

/// Error returned by every handler
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApiError {
    /// HTTP status the caller should answer with
    pub status: u16,
    pub code: String,
    pub message: String,
}

impl ApiError {
    pub fn new(status: u16, code: &str, message: impl Into<String>) -> Self {
        Self {
            status,
            code: code.to_string(),
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(400, "validation_error", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(404, "not_found", message)
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}: {}", self.status, self.code, self.message)
    }
}

impl std::error::Error for ApiError {}

impl From<CampaignError> for ApiError {
    fn from(error: CampaignError) -> Self {
        let message = error.to_string();
        match error {
            CampaignError::NotFound(_) | CampaignError::ListNotFound(_) => Self::not_found(message),
            CampaignError::Validation(_) => Self::validation(message),
            CampaignError::InvalidState(_) => Self::new(409, "invalid_state", message),
            CampaignError::Provider(_) => Self::new(502, "provider_error", message),
            CampaignError::Store(_) => Self::new(500, "internal_error", message),
        }
    }
}

impl From<ContactError> for ApiError {
    fn from(error: ContactError) -> Self {
        let message = error.to_string();
        match error {
            ContactError::NotFound(_) => Self::not_found(message),
            ContactError::Validation(_) => Self::validation(message),
            ContactError::Conflict(_) => Self::new(409, "conflict", message),
            ContactError::Store(_) => Self::new(500, "internal_error", message),
        }
    }
}

pub(crate) fn parse_id(field: &str, raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw.trim()).map_err(|_| ApiError::validation(format!("Invalid {}: {}", field, raw)))
}

pub(crate) fn parse_time(field: &str, raw: &str) -> Result<DateTime<Utc>, ApiError> {
    DateTime::parse_from_rfc3339(raw.trim())
        .map(|t| t.with_timezone(&Utc))
        .map_err(|_| ApiError::validation(format!("Invalid {}: expected an ISO-8601 timestamp", field)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{ProviderError, StoreError};

    #[test]
    fn test_campaign_error_statuses() {
        let id = Uuid::now_v7();
        assert_eq!(ApiError::from(CampaignError::NotFound(id)).status, 404);
        assert_eq!(ApiError::from(CampaignError::Validation("x".into())).status, 400);
        assert_eq!(ApiError::from(CampaignError::InvalidState("x".into())).status, 409);
        assert_eq!(
            ApiError::from(CampaignError::Provider(ProviderError::Recipient("x".into()))).status,
            502
        );
        assert_eq!(
            ApiError::from(CampaignError::Store(StoreError::Backend("x".into()))).status,
            500
        );
    }

    #[test]
    fn test_fatal_message_passes_through() {
        let error = ApiError::from(CampaignError::from(ProviderError::fatal(
            crate::services::FatalKind::InvalidCredentials,
            "API key is invalid",
        )));
        assert_eq!(error.message, "API key is invalid");
    }

    #[test]
    fn test_parse_helpers() {
        assert!(parse_id("campaign id", "nope").is_err());
        let at = parse_time("scheduledAt", "2030-01-01T09:30:00+02:00").unwrap();
        assert_eq!(at.to_rfc3339(), "2030-01-01T07:30:00+00:00");
        assert_eq!(parse_time("scheduledAt", "tomorrow").unwrap_err().status, 400);
    }
}
