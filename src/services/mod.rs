//! RustCampaign Services

pub mod analytics;
pub mod campaign;
pub mod contacts;
pub mod dispatcher;
pub mod personalize;
pub mod provider;
pub mod resolver;
pub mod store;

#[cfg(feature = "resend")]
pub mod resend;
#[cfg(feature = "smtp")]
pub mod smtp;

#[cfg(test)]
pub mod testing;

pub use analytics::AnalyticsService;
pub use campaign::{CampaignError, CampaignService, SendOutcome};
pub use contacts::{ContactError, ContactService};
pub use dispatcher::{BatchDispatcher, DispatchConfig};
pub use provider::{
    CampaignSendParams, DispatchResult, EmailProvider, FatalKind, ProviderError, SendReceipt,
    TestEmailParams,
};
pub use resolver::RecipientResolver;
pub use store::{CampaignStore, ContactListStore, ContactStore, EventStore, MemoryStore, StoreError};

#[cfg(feature = "resend")]
pub use resend::{ResendConfig, ResendProvider};
#[cfg(feature = "smtp")]
pub use smtp::{SmtpConfig, SmtpProvider, TlsMode};
