//! Analytics Service - event ingestion and campaign reporting

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, DurationRound, TimeDelta, Utc};
use tracing::debug;
use uuid::Uuid;

use crate::models::{AnalyticsOverview, CampaignAnalytics, CampaignEvent, EventType, TimelinePoint};
use crate::services::campaign::CampaignError;
use crate::services::store::{CampaignStore, EventStore};

pub struct AnalyticsService {
    campaigns: Arc<dyn CampaignStore>,
    events: Arc<dyn EventStore>,
}

impl AnalyticsService {
    pub fn new(campaigns: Arc<dyn CampaignStore>, events: Arc<dyn EventStore>) -> Self {
        Self { campaigns, events }
    }

    /// Overview rates plus an hourly event timeline
    pub async fn analytics(&self, owner_id: Uuid, campaign_id: Uuid) -> Result<CampaignAnalytics, CampaignError> {
        let campaign = self
            .campaigns
            .get(owner_id, campaign_id)
            .await?
            .ok_or(CampaignError::NotFound(campaign_id))?;

        let events = self.events.list_for_campaign(campaign_id).await?;

        Ok(CampaignAnalytics {
            overview: AnalyticsOverview::from_metrics(&campaign.metrics),
            timeline: timeline(&events),
        })
    }

    /// Append a delivery event and bump the matching campaign counter
    pub async fn record_event(
        &self,
        owner_id: Uuid,
        campaign_id: Uuid,
        contact_id: Option<Uuid>,
        event_type: EventType,
        data: serde_json::Value,
    ) -> Result<CampaignEvent, CampaignError> {
        if self.campaigns.get(owner_id, campaign_id).await?.is_none() {
            return Err(CampaignError::NotFound(campaign_id));
        }

        let event = CampaignEvent::new(campaign_id, contact_id, event_type).with_data(data);
        self.events.append(vec![event.clone()]).await?;

        let delta = event_type.metrics_delta();
        if !delta.is_empty() && !self.campaigns.increment_metrics(campaign_id, delta).await? {
            return Err(CampaignError::NotFound(campaign_id));
        }

        debug!(campaign_id = %campaign_id, event_type = %event_type, "Event recorded");
        Ok(event)
    }
}

/// Count events per (hour, type), oldest first
pub fn timeline(events: &[CampaignEvent]) -> Vec<TimelinePoint> {
    let mut buckets: BTreeMap<(DateTime<Utc>, EventType), u64> = BTreeMap::new();

    for event in events {
        *buckets.entry((hour_of(event.created_at), event.event_type)).or_default() += 1;
    }

    buckets
        .into_iter()
        .map(|((timestamp, event_type), count)| TimelinePoint {
            event_type,
            timestamp,
            count,
        })
        .collect()
}

fn hour_of(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts.duration_trunc(TimeDelta::hours(1)).unwrap_or(ts)
}
