//! RustCampaign - Bulk Email Campaign Plugin for RustPress
//!
//! RustCampaign sends personalized email campaigns to audiences built from
//! imported contact lists:
//!
//! - **Contact Import**: validation and deduplication (`keepFirst`, `keepLast`, `merge`)
//! - **Recipient Resolution**: unique audience across any number of lists
//! - **Personalization**: `{{firstName}}`, `{{lastName}}`, `{{email}}`, `{{company}}`
//! - **Batch Dispatch**: chunked, paced sending with bounded concurrency
//! - **Providers**: SMTP (lettre) and the Resend HTTP API
//! - **Lifecycle**: draft, scheduled, sending, sent, paused and failed campaigns
//! - **Analytics**: delivery rates and an hourly event timeline
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use rustcampaign::{
//!     ContactInput, ContactList, DedupeStrategy, DispatchConfig, MemoryStore,
//!     NewCampaign, RustCampaignPlugin, SmtpConfig, SmtpProvider,
//! };
//!
//! #[tokio::main]
//! async fn main() {
//!     let provider = SmtpProvider::connect(
//!         SmtpConfig::new("email-smtp.us-east-1.amazonaws.com", 587).with_credentials("user", "pass"),
//!         DispatchConfig::default(),
//!     )
//!     .await
//!     .unwrap();
//!
//!     let store = MemoryStore::shared();
//!     let plugin = RustCampaignPlugin::with_store(store.clone(), Arc::new(provider));
//!     let owner = uuid::Uuid::now_v7();
//!
//!     // Import contacts and put them on a list
//!     let result = plugin
//!         .contacts()
//!         .import(owner, &[ContactInput::new("ada@example.com").first_name("Ada")], DedupeStrategy::Merge)
//!         .await
//!         .unwrap();
//!     let list = ContactList::new(owner, "Subscribers");
//!     store.add_members(list.id, &result.contact_ids()).await;
//!     store.insert_list(list.clone()).await;
//!
//!     // Create and send
//!     let campaign = plugin
//!         .campaigns()
//!         .create_campaign(
//!             owner,
//!             NewCampaign::new("Launch", "Hi {{firstName}}", "News", "news@example.com")
//!                 .html("<p>Hello {{firstName}}</p>")
//!                 .lists(vec![list.id]),
//!         )
//!         .await
//!         .unwrap();
//!
//!     let outcome = plugin.campaigns().send_campaign(owner, campaign.id).await.unwrap();
//!     println!("Sent: {}, Failed: {}", outcome.result.sent, outcome.result.failed);
//! }
//! ```
//!
//! ## Configuration from the environment
//!
//! ```rust,ignore
//! use rustcampaign::RustCampaignPlugin;
//!
//! // EMAIL_PROVIDER=resend RESEND_API_KEY=re_... DISPATCH_CHUNK_SIZE=50
//! let plugin = RustCampaignPlugin::from_env()?;
//!
//! // Periodic host task
//! for (id, outcome) in plugin.dispatch_due().await? {
//!     println!("{}: {:?}", id, outcome.map(|o| o.result.sent));
//! }
//! ```

pub mod config;
pub mod handlers;
pub mod models;
pub mod plugin;
pub mod services;

// Re-exports
pub use models::{
    AnalyticsOverview, Campaign, CampaignAnalytics, CampaignEvent, CampaignMetrics,
    CampaignStatus, CampaignUpdate, Contact, ContactInput, ContactList, ContactListMember,
    ContactStatus, DedupeStrategy, EmailAddress, EventType, ImportResult, ImportRowError,
    NewCampaign, OutboundEmail, RowOutcome, SendType, TimelinePoint,
};

pub use services::{
    AnalyticsService, BatchDispatcher, CampaignError, CampaignService, CampaignStore,
    ContactError, ContactListStore, ContactService, ContactStore, DispatchConfig, DispatchResult,
    EmailProvider, EventStore, FatalKind, MemoryStore, ProviderError, RecipientResolver,
    SendOutcome, StoreError,
};

#[cfg(feature = "resend")]
pub use services::{ResendConfig, ResendProvider};
#[cfg(feature = "smtp")]
pub use services::{SmtpConfig, SmtpProvider, TlsMode};

pub use config::{EngineConfig, ProviderKind};
pub use handlers::{AnalyticsHandler, ApiError, CampaignHandler, ContactHandler};
pub use plugin::{plugin_info, PluginInfo, RustCampaignPlugin};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use handlers::campaign::{ScheduleRequest, TestEmailRequest};
    use handlers::contact::ImportRequest;
    use services::testing::FakeProvider;
    use uuid::Uuid;

    struct Harness {
        store: Arc<MemoryStore>,
        provider: Arc<FakeProvider>,
        plugin: RustCampaignPlugin,
        owner: Uuid,
    }

    fn harness(provider: FakeProvider) -> Harness {
        let store = MemoryStore::shared();
        let provider = Arc::new(provider);
        let plugin = RustCampaignPlugin::with_store(store.clone(), provider.clone());

        Harness {
            store,
            provider,
            plugin,
            owner: Uuid::now_v7(),
        }
    }

    fn fast() -> FakeProvider {
        FakeProvider::new(DispatchConfig::immediate(100, 10))
    }

    impl Harness {
        /// Import `emails` and put the new contacts on a fresh list
        async fn list_of(&self, emails: &[&str]) -> Uuid {
            let request = ImportRequest {
                contacts: emails.iter().map(|e| ContactInput::new(e)).collect(),
                strategy: DedupeStrategy::KeepFirst,
            };
            let result = self.plugin.contact_handler().import(self.owner, request).await.unwrap();

            let list = ContactList::new(self.owner, "Subscribers");
            let list_id = list.id;
            self.store.insert_list(list).await;
            self.store.add_members(list_id, &result.contact_ids()).await;
            list_id
        }

        async fn campaign(&self, lists: Vec<Uuid>) -> String {
            let request = NewCampaign::new("Spring sale", "Hi {{firstName}}", "Shop", "shop@example.com")
                .html("<p>Hello {{firstName}}</p>")
                .lists(lists);
            self.plugin
                .campaign_handler()
                .create(self.owner, request)
                .await
                .unwrap()
                .id
        }
    }

    #[test]
    fn test_plugin_info() {
        let info = plugin_info();
        assert_eq!(info.name, "RustCampaign");
        assert!(info.routes.contains(&"/api/campaigns/:id/send"));
        assert!(!info.hooks.is_empty());
    }

    #[test]
    fn test_plugin_creation() {
        let plugin = RustCampaignPlugin::new(Arc::new(fast()));
        assert_eq!(plugin.name(), "RustCampaign");
        assert_eq!(plugin.provider_name(), "fake");
        assert_eq!(plugin.version(), VERSION);
    }

    #[tokio::test]
    async fn test_import_then_send() {
        let h = harness(fast().fail_on("c@x.com"));
        let list = h.list_of(&["a@x.com", "A@X.com", "b@x.com", "not-an-email", "c@x.com"]).await;
        let id = h.campaign(vec![list]).await;

        let created = h.plugin.campaign_handler().get(h.owner, &id).await.unwrap();
        assert_eq!(created.metrics.recipients, 3);
        assert_eq!(created.status, "draft");

        let sent = h.plugin.campaign_handler().send(h.owner, &id).await.unwrap();
        assert_eq!(sent.sent, 2);
        assert_eq!(sent.failed, 1);
        assert_eq!(sent.message_ids.len(), 2);
        assert_eq!(sent.campaign.status, "sent");
        assert_eq!(sent.campaign.metrics.delivered, 2);

        let analytics = h.plugin.analytics_handler().get(h.owner, &id).await.unwrap();
        assert!((analytics.overview.delivery_rate - 2.0 / 3.0).abs() < f64::EPSILON);
        assert_eq!(analytics.timeline.len(), 1);
        assert_eq!(analytics.timeline[0].event_type, EventType::Sent);
        assert_eq!(analytics.timeline[0].count, 2);
    }

    #[tokio::test]
    async fn test_empty_import_reports_zero_counts() {
        let h = harness(fast());
        let request = ImportRequest {
            contacts: vec![],
            strategy: DedupeStrategy::KeepLast,
        };

        let result = h.plugin.contact_handler().import(h.owner, request).await.unwrap();
        assert_eq!(result.imported, 0);
        assert_eq!(result.skipped, 0);
        assert_eq!(result.duplicates, 0);
        assert!(result.errors.is_empty());
    }

    #[tokio::test]
    async fn test_contact_in_overlapping_lists_gets_one_message() {
        let h = harness(fast());
        let first = h.list_of(&["shared@x.com", "one@x.com"]).await;
        let second = h.list_of(&["shared@x.com", "two@x.com"]).await;
        let id = h.campaign(vec![first, second]).await;

        let sent = h.plugin.campaign_handler().send(h.owner, &id).await.unwrap();
        assert_eq!(sent.sent, 3);

        let shared = h
            .provider
            .sent()
            .iter()
            .filter(|m| m.to.email == "shared@x.com")
            .count();
        assert_eq!(shared, 1);
    }

    #[tokio::test]
    async fn test_handler_errors() {
        let h = harness(fast());
        let handler = h.plugin.campaign_handler();

        let error = handler.get(h.owner, "not-a-uuid").await.unwrap_err();
        assert_eq!(error.status, 400);

        let error = handler.get(h.owner, &Uuid::now_v7().to_string()).await.unwrap_err();
        assert_eq!(error.status, 404);

        // No lists, no recipients
        let id = h.campaign(vec![]).await;
        let error = handler.send(h.owner, &id).await.unwrap_err();
        assert_eq!(error.status, 409);
        assert_eq!(error.code, "invalid_state");

        let request = ScheduleRequest {
            scheduled_at: "next tuesday".to_string(),
        };
        assert_eq!(handler.schedule(h.owner, &id, request).await.unwrap_err().status, 400);
    }

    #[tokio::test]
    async fn test_fatal_provider_error_reaches_caller() {
        let h = harness(fast().fatal_on("a@x.com", FatalKind::UnverifiedIdentity));
        let list = h.list_of(&["a@x.com", "b@x.com"]).await;
        let id = h.campaign(vec![list]).await;

        let error = h.plugin.campaign_handler().send(h.owner, &id).await.unwrap_err();
        assert_eq!(error.status, 502);
        assert_eq!(error.message, "Rejected: unverified sender identity");

        let campaign = h.plugin.campaign_handler().get(h.owner, &id).await.unwrap();
        assert_eq!(campaign.status, "failed");
    }

    #[tokio::test]
    async fn test_schedule_and_dispatch_due() {
        let h = harness(fast());
        let list = h.list_of(&["a@x.com"]).await;
        let id = h.campaign(vec![list]).await;

        let at = (chrono::Utc::now() + chrono::Duration::milliseconds(20)).to_rfc3339();
        let scheduled = h
            .plugin
            .campaign_handler()
            .schedule(h.owner, &id, ScheduleRequest { scheduled_at: at })
            .await
            .unwrap();
        assert_eq!(scheduled.status, "scheduled");
        assert_eq!(scheduled.send_type, "scheduled");

        tokio::time::sleep(std::time::Duration::from_millis(40)).await;
        let due = h.plugin.campaign_handler().dispatch_due().await.unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].campaign_id, id);
        assert_eq!(due[0].sent, 1);
        assert!(due[0].error.is_none());
    }

    #[tokio::test]
    async fn test_test_email_leaves_campaign_alone() {
        let h = harness(fast());
        let list = h.list_of(&["a@x.com"]).await;
        let id = h.campaign(vec![list]).await;

        let request = TestEmailRequest {
            email: "me@example.com".to_string(),
        };
        let response = h.plugin.campaign_handler().send_test(h.owner, &id, request).await.unwrap();
        assert!(response.success);

        let campaign = h.plugin.campaign_handler().get(h.owner, &id).await.unwrap();
        assert_eq!(campaign.status, "draft");
        assert_eq!(h.provider.sent()[0].subject, "[TEST] Hi ");
    }

    #[tokio::test]
    async fn test_deleting_contact_keeps_events() {
        let h = harness(fast());
        let list = h.list_of(&["a@x.com"]).await;
        let id = h.campaign(vec![list]).await;
        h.plugin.campaign_handler().send(h.owner, &id).await.unwrap();

        let contact_id = h.provider.sent()[0].contact_id.unwrap();
        h.plugin
            .contact_handler()
            .delete(h.owner, &contact_id.to_string())
            .await
            .unwrap();

        let campaign_id = Uuid::parse_str(&id).unwrap();
        let events = h.store.list_for_campaign(campaign_id).await.unwrap();
        assert_eq!(events.len(), 1);
        assert!(events[0].contact_id.is_none());
    }
}
