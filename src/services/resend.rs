//! Resend Provider - HTTP batch API

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::models::OutboundEmail;
use crate::services::dispatcher::{BatchDispatcher, DispatchConfig};
use crate::services::provider::{
    CampaignSendParams, DispatchResult, EmailProvider, FatalKind, ProviderError, SendReceipt,
    TestEmailParams,
};

/// Upper bound of the batch endpoint
pub const MAX_BATCH_SIZE: usize = 100;

/// Resend API configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ResendConfig {
    pub api_key: String,
    pub base_url: String,
    /// Request timeout
    pub timeout_secs: u64,
    /// Messages per batch request, capped at 100
    pub batch_size: usize,
}

impl Default for ResendConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: "https://api.resend.com".to_string(),
            timeout_secs: 30,
            batch_size: MAX_BATCH_SIZE,
        }
    }
}

impl ResendConfig {
    pub fn new(api_key: &str) -> Self {
        Self {
            api_key: api_key.to_string(),
            ..Default::default()
        }
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }
}

#[derive(Debug, Serialize)]
struct ResendTag {
    name: &'static str,
    value: String,
}

/// One message in Resend's wire format
#[derive(Debug, Serialize)]
struct ResendEmail<'a> {
    from: String,
    to: Vec<String>,
    subject: &'a str,
    html: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_to: Option<String>,
    headers: &'a HashMap<String, String>,
    tags: Vec<ResendTag>,
}

impl<'a> From<&'a OutboundEmail> for ResendEmail<'a> {
    fn from(email: &'a OutboundEmail) -> Self {
        Self {
            from: email.from.formatted(),
            to: vec![email.to.formatted()],
            subject: &email.subject,
            html: &email.html_body,
            reply_to: email.reply_to.as_ref().map(|r| r.formatted()),
            headers: &email.headers,
            tags: vec![ResendTag {
                name: "campaign_id",
                value: email.campaign_id.to_string(),
            }],
        }
    }
}

#[derive(Debug, Deserialize)]
struct SentId {
    id: String,
}

#[derive(Debug, Deserialize)]
struct BatchResponse {
    data: Vec<SentId>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ErrorBody {
    name: String,
    message: String,
}

/// Sends campaigns through Resend, one batch request per chunk
pub struct ResendProvider {
    config: ResendConfig,
    client: reqwest::Client,
    dispatcher: BatchDispatcher,
}

impl ResendProvider {
    pub fn new(config: ResendConfig, dispatch: DispatchConfig) -> Result<Self, ProviderError> {
        if config.api_key.trim().is_empty() {
            return Err(ProviderError::Configuration(
                "Resend API key is not configured".to_string(),
            ));
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ProviderError::Configuration(e.to_string()))?;

        let chunk_size = dispatch
            .chunk_size
            .min(config.batch_size)
            .min(MAX_BATCH_SIZE);
        let dispatcher = BatchDispatcher::new(dispatch.with_chunk_size(chunk_size));

        info!(base_url = %config.base_url, chunk_size, "Resend provider configured");

        Ok(Self {
            config,
            client,
            dispatcher,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    async fn post<T: Serialize + ?Sized>(&self, path: &str, body: &T) -> Result<reqwest::Response, ProviderError> {
        let response = self
            .client
            .post(self.url(path))
            .bearer_auth(&self.config.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| ProviderError::Recipient(format!("Resend request failed: {}", e)))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(classify(status.as_u16(), &body))
    }

    async fn send_batch(&self, emails: Vec<OutboundEmail>) -> Result<Vec<String>, ProviderError> {
        let payload: Vec<ResendEmail<'_>> = emails.iter().map(ResendEmail::from).collect();
        let response = self.post("/emails/batch", &payload).await?;

        let body: BatchResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Recipient(format!("Unexpected Resend response: {}", e)))?;

        debug!(requested = emails.len(), accepted = body.data.len(), "Resend batch accepted");
        Ok(body.data.into_iter().map(|sent| sent.id).collect())
    }
}

#[async_trait]
impl EmailProvider for ResendProvider {
    fn name(&self) -> &'static str {
        "resend"
    }

    async fn send_test_email(&self, params: &TestEmailParams) -> Result<SendReceipt, ProviderError> {
        let email = BatchDispatcher::test_message(params);
        let response = self.post("/emails", &ResendEmail::from(&email)).await?;

        let sent: SentId = response
            .json()
            .await
            .map_err(|e| ProviderError::Recipient(format!("Unexpected Resend response: {}", e)))?;

        Ok(SendReceipt {
            contact_id: None,
            message_id: sent.id,
        })
    }

    async fn send_campaign(&self, params: &CampaignSendParams) -> Result<DispatchResult, ProviderError> {
        self.dispatcher
            .dispatch_batched(params, |emails| self.send_batch(emails))
            .await
    }
}

/// Map a Resend error response to a fatal or per-chunk error
fn classify(status: u16, body: &str) -> ProviderError {
    let error: ErrorBody = serde_json::from_str(body).unwrap_or_default();
    let message = if error.message.is_empty() {
        format!("Resend returned HTTP {}", status)
    } else {
        error.message
    };

    match (status, error.name.as_str()) {
        (401, _) | (_, "missing_api_key" | "invalid_api_key" | "restricted_api_key") => {
            ProviderError::fatal(FatalKind::InvalidCredentials, message)
        }
        (403, _) | (_, "invalid_from_address") => {
            ProviderError::fatal(FatalKind::UnverifiedIdentity, message)
        }
        _ => ProviderError::Recipient(message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EmailAddress, CAMPAIGN_HEADER};
    use uuid::Uuid;

    #[test]
    fn test_invalid_key_is_fatal() {
        let error = classify(
            401,
            r#"{"statusCode":401,"name":"invalid_api_key","message":"API key is invalid"}"#,
        );
        assert!(matches!(
            error,
            ProviderError::Fatal { kind: FatalKind::InvalidCredentials, .. }
        ));
        assert_eq!(error.to_string(), "API key is invalid");
    }

    #[test]
    fn test_unverified_domain_is_fatal() {
        let error = classify(
            403,
            r#"{"statusCode":403,"name":"validation_error","message":"The example.com domain is not verified."}"#,
        );
        assert!(matches!(
            error,
            ProviderError::Fatal { kind: FatalKind::UnverifiedIdentity, .. }
        ));
    }

    #[test]
    fn test_other_errors_are_not_fatal() {
        let error = classify(
            429,
            r#"{"statusCode":429,"name":"rate_limit_exceeded","message":"Too many requests"}"#,
        );
        assert!(matches!(error, ProviderError::Recipient(ref m) if m == "Too many requests"));

        let error = classify(500, "<html>Bad gateway</html>");
        assert_eq!(error.to_string(), "Recipient rejected: Resend returned HTTP 500");
    }

    #[test]
    fn test_wire_format() {
        let email = OutboundEmail::new(
            Uuid::now_v7(),
            EmailAddress::with_name("news@example.com", "News"),
            EmailAddress::new("ada@example.com"),
            "Hi Ada",
            "<p>Hi</p>",
        );

        let json = serde_json::to_value(ResendEmail::from(&email)).unwrap();
        assert_eq!(json["to"], serde_json::json!(["ada@example.com"]));
        assert_eq!(json["subject"], "Hi Ada");
        assert_eq!(json["tags"][0]["name"], "campaign_id");
        assert_eq!(json["tags"][0]["value"], email.campaign_id.to_string());
        assert_eq!(json["headers"][CAMPAIGN_HEADER], email.campaign_id.to_string());
        assert!(json.get("reply_to").is_none());
    }

    #[test]
    fn test_batch_size_is_capped() {
        let provider = ResendProvider::new(
            ResendConfig {
                batch_size: 500,
                ..ResendConfig::new("re_test")
            },
            DispatchConfig::new(250, 4),
        )
        .unwrap();
        assert_eq!(provider.dispatcher.config().chunk_size, MAX_BATCH_SIZE);
    }

    #[test]
    fn test_missing_key_is_rejected() {
        let result = ResendProvider::new(ResendConfig::default(), DispatchConfig::default());
        assert!(matches!(result, Err(ProviderError::Configuration(_))));
    }
}
