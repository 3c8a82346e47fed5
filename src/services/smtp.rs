//! SMTP Provider

use std::time::Duration;

use async_trait::async_trait;
use lettre::{
    address::AddressError,
    message::{
        header::{ContentType, HeaderName, HeaderValue},
        Mailbox, MultiPart, SinglePart,
    },
    transport::smtp::{
        authentication::Credentials,
        client::{Tls, TlsParameters},
        Error as SmtpError,
    },
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use scraper::Html;
use serde::Deserialize;
use tracing::info;

use crate::models::OutboundEmail;
use crate::services::dispatcher::{BatchDispatcher, DispatchConfig};
use crate::services::provider::{
    CampaignSendParams, DispatchResult, EmailProvider, FatalKind, ProviderError, SendReceipt,
    TestEmailParams,
};

/// SMTP configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SmtpConfig {
    /// SMTP host
    pub host: String,
    /// SMTP port
    pub port: u16,
    /// Username
    pub username: Option<String>,
    /// Password
    pub password: Option<String>,
    /// Use TLS
    pub tls: TlsMode,
    /// Connection timeout
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TlsMode {
    /// No TLS
    None,
    /// STARTTLS (upgrade connection)
    StartTls,
    /// TLS from start (implicit)
    Tls,
}

impl std::str::FromStr for TlsMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" | "off" => Ok(Self::None),
            "starttls" => Ok(Self::StartTls),
            "tls" | "ssl" => Ok(Self::Tls),
            other => Err(format!("unknown TLS mode: {}", other)),
        }
    }
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 25,
            username: None,
            password: None,
            tls: TlsMode::StartTls,
            timeout_secs: 30,
        }
    }
}

impl SmtpConfig {
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            host: host.to_string(),
            port,
            ..Default::default()
        }
    }

    pub fn with_credentials(mut self, username: &str, password: &str) -> Self {
        self.username = Some(username.to_string());
        self.password = Some(password.to_string());
        self
    }

    pub fn with_tls(mut self, mode: TlsMode) -> Self {
        self.tls = mode;
        self
    }

    fn transport(&self) -> Result<AsyncSmtpTransport<Tokio1Executor>, ProviderError> {
        let builder = match self.tls {
            TlsMode::None => AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&self.host),
            TlsMode::StartTls => {
                let tls = TlsParameters::builder(self.host.clone())
                    .build()
                    .map_err(|e| ProviderError::Configuration(e.to_string()))?;

                AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&self.host)
                    .map_err(|e| ProviderError::Configuration(e.to_string()))?
                    .tls(Tls::Required(tls))
            }
            TlsMode::Tls => AsyncSmtpTransport::<Tokio1Executor>::relay(&self.host)
                .map_err(|e| ProviderError::Configuration(e.to_string()))?,
        };

        let mut builder = builder
            .port(self.port)
            .timeout(Some(Duration::from_secs(self.timeout_secs)));

        if let (Some(username), Some(password)) = (&self.username, &self.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        Ok(builder.build())
    }
}

/// Sends one SMTP message per recipient through a pooled transport
pub struct SmtpProvider {
    config: SmtpConfig,
    transport: AsyncSmtpTransport<Tokio1Executor>,
    dispatcher: BatchDispatcher,
}

impl SmtpProvider {
    pub fn new(config: SmtpConfig, dispatch: DispatchConfig) -> Result<Self, ProviderError> {
        let transport = config.transport()?;
        Ok(Self {
            config,
            transport,
            dispatcher: BatchDispatcher::new(dispatch),
        })
    }

    /// Build the provider and verify the server accepts a connection
    pub async fn connect(config: SmtpConfig, dispatch: DispatchConfig) -> Result<Self, ProviderError> {
        let provider = Self::new(config, dispatch)?;
        provider.test_connection().await?;

        info!(host = %provider.config.host, port = provider.config.port, "SMTP provider connected");
        Ok(provider)
    }

    pub async fn test_connection(&self) -> Result<bool, ProviderError> {
        self.transport.test_connection().await.map_err(|e| classify(&e))
    }

    pub fn config(&self) -> &SmtpConfig {
        &self.config
    }

    async fn deliver(&self, email: OutboundEmail) -> Result<String, ProviderError> {
        let (message, message_id) = build_message(&email)?;
        self.transport.send(message).await.map_err(|e| classify(&e))?;
        Ok(message_id)
    }
}

#[async_trait]
impl EmailProvider for SmtpProvider {
    fn name(&self) -> &'static str {
        "smtp"
    }

    async fn send_test_email(&self, params: &TestEmailParams) -> Result<SendReceipt, ProviderError> {
        let message_id = self.deliver(BatchDispatcher::test_message(params)).await?;
        Ok(SendReceipt {
            contact_id: None,
            message_id,
        })
    }

    async fn send_campaign(&self, params: &CampaignSendParams) -> Result<DispatchResult, ProviderError> {
        self.dispatcher
            .dispatch_each(params, |email| self.deliver(email))
            .await
    }
}

/// Build a text + HTML message. Returns it with its Message-ID.
fn build_message(email: &OutboundEmail) -> Result<(Message, String), ProviderError> {
    let from: Mailbox = email
        .from
        .formatted()
        .parse()
        .map_err(|e: AddressError| ProviderError::Configuration(format!("Invalid sender address: {}", e)))?;
    let to: Mailbox = email
        .to
        .formatted()
        .parse()
        .map_err(|e: AddressError| ProviderError::Recipient(format!("Invalid recipient {}: {}", email.to.email, e)))?;

    let domain = email
        .from
        .email
        .rsplit_once('@')
        .map(|(_, domain)| domain)
        .unwrap_or("localhost");
    let message_id = format!("{}@{}", email.id, domain);

    let mut builder = Message::builder()
        .from(from)
        .to(to)
        .subject(email.subject.as_str())
        .message_id(Some(format!("<{}>", message_id)));

    if let Some(reply_to) = &email.reply_to {
        let mailbox: Mailbox = reply_to
            .formatted()
            .parse()
            .map_err(|e: AddressError| ProviderError::Configuration(format!("Invalid reply-to address: {}", e)))?;
        builder = builder.reply_to(mailbox);
    }

    for (name, value) in &email.headers {
        let header = HeaderName::new_from_ascii(name.clone())
            .map_err(|_| ProviderError::Configuration(format!("Invalid header name: {}", name)))?;
        builder = builder.raw_header(HeaderValue::new(header, value.clone()));
    }

    let body = MultiPart::alternative()
        .singlepart(
            SinglePart::builder()
                .content_type(ContentType::TEXT_PLAIN)
                .body(html_to_text(&email.html_body)),
        )
        .singlepart(
            SinglePart::builder()
                .content_type(ContentType::TEXT_HTML)
                .body(email.html_body.clone()),
        );

    let message = builder
        .multipart(body)
        .map_err(|e| ProviderError::Recipient(e.to_string()))?;

    Ok((message, message_id))
}

/// Plain-text rendition of an HTML body
pub fn html_to_text(html: &str) -> String {
    let document = Html::parse_fragment(html);
    let mut words: Vec<String> = Vec::new();

    for node in document.root_element().descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let hidden = node
            .ancestors()
            .filter_map(|a| a.value().as_element())
            .any(|el| matches!(el.name(), "style" | "script" | "head" | "title"));
        if hidden {
            continue;
        }

        let chunk = text.split_whitespace().collect::<Vec<_>>().join(" ");
        if !chunk.is_empty() {
            words.push(chunk);
        }
    }

    words.join(" ")
}

fn classify(error: &SmtpError) -> ProviderError {
    let code = error.status().map(|code| code.to_string());
    classify_reply(code.as_deref(), error.is_permanent(), &error.to_string())
}

/// Map an SMTP failure to a fatal or per-recipient error
fn classify_reply(code: Option<&str>, permanent: bool, message: &str) -> ProviderError {
    match code {
        Some("530" | "534" | "535") => ProviderError::fatal(
            FatalKind::InvalidCredentials,
            format!("SMTP authentication failed: {}", message),
        ),
        _ if permanent && message.to_ascii_lowercase().contains("not verified") => ProviderError::fatal(
            FatalKind::UnverifiedIdentity,
            format!("Sender identity is not verified: {}", message),
        ),
        _ => ProviderError::Recipient(message.to_string()),
    }
}
