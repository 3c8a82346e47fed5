//! Environment configuration
//!
//! Every setting has a default. Malformed values are logged and ignored.

use std::env;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use crate::services::dispatcher::DispatchConfig;
use crate::services::provider::{EmailProvider, ProviderError};
#[cfg(feature = "resend")]
use crate::services::resend::{ResendConfig, ResendProvider};
#[cfg(feature = "smtp")]
use crate::services::smtp::{SmtpConfig, SmtpProvider, TlsMode};

/// Which transport sends campaign mail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProviderKind {
    #[default]
    Smtp,
    Resend,
}

impl FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "smtp" => Ok(Self::Smtp),
            "resend" => Ok(Self::Resend),
            other => Err(format!("unknown email provider: {}", other)),
        }
    }
}

/// Engine configuration
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    pub provider: ProviderKind,
    pub dispatch: DispatchConfig,
    #[cfg(feature = "smtp")]
    pub smtp: SmtpConfig,
    #[cfg(feature = "resend")]
    pub resend: ResendConfig,
}

impl EngineConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from any key/value source
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let dispatch = DispatchConfig::new(
            parse_or(&lookup, "DISPATCH_CHUNK_SIZE", defaults.dispatch.chunk_size),
            parse_or(&lookup, "DISPATCH_CONCURRENCY", defaults.dispatch.concurrency),
        )
        .with_pacing(Duration::from_millis(parse_or(
            &lookup,
            "DISPATCH_PACING_MS",
            defaults.dispatch.pacing.as_millis() as u64,
        )));

        Self {
            provider: parse_or(&lookup, "EMAIL_PROVIDER", defaults.provider),
            dispatch,
            #[cfg(feature = "smtp")]
            smtp: smtp_from(&lookup, defaults.smtp),
            #[cfg(feature = "resend")]
            resend: resend_from(&lookup),
        }
    }

    /// Build the configured provider
    pub fn build_provider(&self) -> Result<Arc<dyn EmailProvider>, ProviderError> {
        match self.provider {
            #[cfg(feature = "smtp")]
            ProviderKind::Smtp => Ok(Arc::new(SmtpProvider::new(
                self.smtp.clone(),
                self.dispatch.clone(),
            )?)),
            #[cfg(feature = "resend")]
            ProviderKind::Resend => Ok(Arc::new(ResendProvider::new(
                self.resend.clone(),
                self.dispatch.clone(),
            )?)),
            #[allow(unreachable_patterns)]
            other => Err(ProviderError::Configuration(format!(
                "{:?} provider support is not compiled in",
                other
            ))),
        }
    }
}

#[cfg(feature = "smtp")]
fn smtp_from<F>(lookup: &F, defaults: SmtpConfig) -> SmtpConfig
where
    F: Fn(&str) -> Option<String>,
{
    let host = lookup("SMTP_HOST").unwrap_or(defaults.host);
    let config = SmtpConfig::new(&host, parse_or(lookup, "SMTP_PORT", defaults.port))
        .with_tls(parse_or::<TlsMode, _>(lookup, "SMTP_TLS", defaults.tls));

    match (lookup("SMTP_USERNAME"), lookup("SMTP_PASSWORD")) {
        (Some(username), Some(password)) => config.with_credentials(&username, &password),
        (None, None) => config,
        _ => {
            warn!("SMTP_USERNAME and SMTP_PASSWORD must be set together, connecting without credentials");
            config
        }
    }
}

#[cfg(feature = "resend")]
fn resend_from<F>(lookup: &F) -> ResendConfig
where
    F: Fn(&str) -> Option<String>,
{
    let config = ResendConfig::new(&lookup("RESEND_API_KEY").unwrap_or_default());
    match lookup("RESEND_BASE_URL") {
        Some(url) => config.with_base_url(&url),
        None => config,
    }
}

fn parse_or<T, F>(lookup: &F, key: &str, default: T) -> T
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!(key, value = %raw, "Invalid configuration value, using default");
            default
        }),
        None => default,
    }
}
