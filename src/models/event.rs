//! Campaign Event and Analytics Models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{CampaignMetrics, MetricsDelta};

/// Delivery outcome event type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    /// Accepted by the provider
    Sent,
    /// Delivery confirmed by the receiving server
    Delivered,
    Opened,
    Clicked,
    Bounced,
    /// Marked as spam
    Complained,
    Unsubscribed,
}

impl EventType {
    /// Counter bump owed to the campaign for one event of this type.
    ///
    /// `sent` and `delivered` are owned by the send protocol and never bumped here.
    pub fn metrics_delta(&self) -> MetricsDelta {
        let mut delta = MetricsDelta::default();
        match self {
            Self::Opened => delta.opened = 1,
            Self::Clicked => delta.clicked = 1,
            Self::Bounced => delta.bounced = 1,
            Self::Complained => delta.complained = 1,
            Self::Sent | Self::Delivered | Self::Unsubscribed => {}
        }
        delta
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sent => write!(f, "sent"),
            Self::Delivered => write!(f, "delivered"),
            Self::Opened => write!(f, "opened"),
            Self::Clicked => write!(f, "clicked"),
            Self::Bounced => write!(f, "bounced"),
            Self::Complained => write!(f, "complained"),
            Self::Unsubscribed => write!(f, "unsubscribed"),
        }
    }
}

/// Immutable, append-only delivery record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignEvent {
    pub id: Uuid,
    pub campaign_id: Uuid,
    /// Cleared when the contact is deleted
    pub contact_id: Option<Uuid>,
    pub event_type: EventType,
    pub data: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl CampaignEvent {
    pub fn new(campaign_id: Uuid, contact_id: Option<Uuid>, event_type: EventType) -> Self {
        Self {
            id: Uuid::now_v7(),
            campaign_id,
            contact_id,
            event_type,
            data: serde_json::Value::Null,
            created_at: Utc::now(),
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = data;
        self
    }

    pub fn at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }
}

/// Rates derived from the denormalized campaign counters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsOverview {
    pub recipients: u64,
    pub delivered: u64,
    pub opened: u64,
    pub clicked: u64,
    pub bounced: u64,
    pub complained: u64,
    pub delivery_rate: f64,
    pub open_rate: f64,
    pub click_rate: f64,
    pub bounce_rate: f64,
    pub complaint_rate: f64,
}

impl AnalyticsOverview {
    pub fn from_metrics(metrics: &CampaignMetrics) -> Self {
        Self {
            recipients: metrics.recipients,
            delivered: metrics.delivered,
            opened: metrics.opened,
            clicked: metrics.clicked,
            bounced: metrics.bounced,
            complained: metrics.complained,
            delivery_rate: rate(metrics.delivered, metrics.recipients),
            open_rate: rate(metrics.opened, metrics.delivered),
            click_rate: rate(metrics.clicked, metrics.delivered),
            bounce_rate: rate(metrics.bounced, metrics.recipients),
            complaint_rate: rate(metrics.complained, metrics.delivered),
        }
    }
}

/// Zero when the denominator is zero
fn rate(numerator: u64, denominator: u64) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

/// Event count for one (type, hour) bucket
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelinePoint {
    pub event_type: EventType,
    pub timestamp: DateTime<Utc>,
    pub count: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignAnalytics {
    pub overview: AnalyticsOverview,
    pub timeline: Vec<TimelinePoint>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rates_with_zero_denominators() {
        let overview = AnalyticsOverview::from_metrics(&CampaignMetrics::default());

        assert_eq!(overview.delivery_rate, 0.0);
        assert_eq!(overview.open_rate, 0.0);
        assert_eq!(overview.click_rate, 0.0);
        assert_eq!(overview.bounce_rate, 0.0);
        assert_eq!(overview.complaint_rate, 0.0);
    }

    #[test]
    fn test_rates() {
        let metrics = CampaignMetrics {
            recipients: 200,
            delivered: 100,
            opened: 50,
            clicked: 10,
            bounced: 20,
            complained: 1,
        };
        let overview = AnalyticsOverview::from_metrics(&metrics);

        assert_eq!(overview.delivery_rate, 0.5);
        assert_eq!(overview.open_rate, 0.5);
        assert_eq!(overview.click_rate, 0.1);
        assert_eq!(overview.bounce_rate, 0.1);
        assert_eq!(overview.complaint_rate, 0.01);
    }

    #[test]
    fn test_metrics_delta() {
        assert_eq!(EventType::Opened.metrics_delta().opened, 1);
        assert!(EventType::Delivered.metrics_delta().is_empty());
        assert!(EventType::Sent.metrics_delta().is_empty());
    }
}
