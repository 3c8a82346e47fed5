//! RustCampaign Plugin Entry Point

use std::sync::Arc;

use chrono::Utc;

use crate::config::EngineConfig;
use crate::handlers::{AnalyticsHandler, CampaignHandler, ContactHandler};
use crate::services::{
    AnalyticsService, CampaignError, CampaignService, CampaignStore, ContactListStore,
    ContactService, ContactStore, EmailProvider, EventStore, MemoryStore, ProviderError,
    RecipientResolver, SendOutcome,
};

/// RustCampaign Plugin
pub struct RustCampaignPlugin {
    /// Email provider
    provider: Arc<dyn EmailProvider>,
    /// Contact import service
    contact_service: Arc<ContactService>,
    /// Recipient resolver
    resolver: Arc<RecipientResolver>,
    /// Campaign lifecycle service
    campaign_service: Arc<CampaignService>,
    /// Analytics service
    analytics_service: Arc<AnalyticsService>,
    campaign_handler: CampaignHandler,
    contact_handler: ContactHandler,
    analytics_handler: AnalyticsHandler,
}

impl RustCampaignPlugin {
    /// Plugin backed by the in-memory store
    pub fn new(provider: Arc<dyn EmailProvider>) -> Self {
        Self::with_store(MemoryStore::shared(), provider)
    }

    /// Plugin backed by any store implementing every persistence seam
    pub fn with_store<S>(store: Arc<S>, provider: Arc<dyn EmailProvider>) -> Self
    where
        S: ContactStore + ContactListStore + CampaignStore + EventStore + 'static,
    {
        let contact_service = Arc::new(ContactService::new(store.clone(), store.clone(), store.clone()));
        let resolver = Arc::new(RecipientResolver::new(store.clone(), store.clone()));
        let campaign_service = Arc::new(CampaignService::new(
            store.clone(),
            store.clone(),
            store.clone(),
            Arc::clone(&resolver),
            Arc::clone(&provider),
        ));
        let analytics_service = Arc::new(AnalyticsService::new(store.clone(), store));

        let campaign_handler = CampaignHandler::new(Arc::clone(&campaign_service));
        let contact_handler = ContactHandler::new(Arc::clone(&contact_service));
        let analytics_handler = AnalyticsHandler::new(Arc::clone(&analytics_service));

        Self {
            provider,
            contact_service,
            resolver,
            campaign_service,
            analytics_service,
            campaign_handler,
            contact_handler,
            analytics_handler,
        }
    }

    /// Plugin with the provider selected by environment variables
    pub fn from_env() -> Result<Self, ProviderError> {
        let config = EngineConfig::from_env();
        let provider = config.build_provider()?;
        Ok(Self::new(provider))
    }

    /// Get plugin name
    pub fn name(&self) -> &'static str {
        "RustCampaign"
    }

    /// Get plugin version
    pub fn version(&self) -> &'static str {
        env!("CARGO_PKG_VERSION")
    }

    /// Get plugin description
    pub fn description(&self) -> &'static str {
        "Bulk email campaigns for RustPress"
    }

    pub fn provider_name(&self) -> &'static str {
        self.provider.name()
    }

    // Service accessors
    pub fn contacts(&self) -> &Arc<ContactService> {
        &self.contact_service
    }

    pub fn resolver(&self) -> &Arc<RecipientResolver> {
        &self.resolver
    }

    pub fn campaigns(&self) -> &Arc<CampaignService> {
        &self.campaign_service
    }

    pub fn analytics(&self) -> &Arc<AnalyticsService> {
        &self.analytics_service
    }

    // Handler accessors
    pub fn campaign_handler(&self) -> &CampaignHandler {
        &self.campaign_handler
    }

    pub fn contact_handler(&self) -> &ContactHandler {
        &self.contact_handler
    }

    pub fn analytics_handler(&self) -> &AnalyticsHandler {
        &self.analytics_handler
    }

    /// Send every scheduled campaign that is due. Meant for a periodic host task.
    pub async fn dispatch_due(&self) -> Result<Vec<(uuid::Uuid, Result<SendOutcome, CampaignError>)>, CampaignError> {
        self.campaign_service.dispatch_due(Utc::now()).await
    }
}

/// Plugin metadata for registration
pub fn plugin_info() -> PluginInfo {
    PluginInfo {
        name: "RustCampaign",
        version: env!("CARGO_PKG_VERSION"),
        description: "Bulk email campaigns for RustPress",
        author: "RustPress Team",
        homepage: "https://rustpress.dev/plugins/rustcampaign",
        license: "MIT",
        dependencies: vec![],
        hooks: vec![
            "campaign.created",
            "campaign.scheduled",
            "campaign.sending",
            "campaign.sent",
            "campaign.failed",
            "campaign.paused",
            "contacts.imported",
        ],
        routes: vec![
            "/admin/campaigns",
            "/admin/campaigns/new",
            "/admin/contacts",
            "/admin/contacts/import",
            "/api/campaigns",
            "/api/campaigns/:id",
            "/api/campaigns/:id/duplicate",
            "/api/campaigns/:id/send",
            "/api/campaigns/:id/schedule",
            "/api/campaigns/:id/pause",
            "/api/campaigns/:id/resume",
            "/api/campaigns/:id/test",
            "/api/campaigns/:id/analytics",
            "/api/contacts",
            "/api/contacts/import",
        ],
    }
}

/// Plugin information
#[derive(Debug)]
pub struct PluginInfo {
    pub name: &'static str,
    pub version: &'static str,
    pub description: &'static str,
    pub author: &'static str,
    pub homepage: &'static str,
    pub license: &'static str,
    pub dependencies: Vec<&'static str>,
    pub hooks: Vec<&'static str>,
    pub routes: Vec<&'static str>,
}
