//! Analytics Handler

use std::sync::Arc;

use serde::Deserialize;
use uuid::Uuid;

use crate::handlers::error::{parse_id, ApiError};
use crate::models::{CampaignAnalytics, CampaignEvent, EventType};
use crate::services::AnalyticsService;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordEventRequest {
    pub contact_id: Option<Uuid>,
    pub event_type: EventType,
    #[serde(default)]
    pub data: serde_json::Value,
}

/// Analytics handler
pub struct AnalyticsHandler {
    analytics: Arc<AnalyticsService>,
}

impl AnalyticsHandler {
    pub fn new(analytics: Arc<AnalyticsService>) -> Self {
        Self { analytics }
    }

    pub async fn get(&self, owner_id: Uuid, campaign_id: &str) -> Result<CampaignAnalytics, ApiError> {
        let campaign_id = parse_id("campaign id", campaign_id)?;
        Ok(self.analytics.analytics(owner_id, campaign_id).await?)
    }

    /// Event sink for whatever ingests provider callbacks
    pub async fn record(
        &self,
        owner_id: Uuid,
        campaign_id: &str,
        request: RecordEventRequest,
    ) -> Result<CampaignEvent, ApiError> {
        let campaign_id = parse_id("campaign id", campaign_id)?;
        Ok(self
            .analytics
            .record_event(owner_id, campaign_id, request.contact_id, request.event_type, request.data)
            .await?)
    }
}
