//! Campaign Models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Campaign lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CampaignStatus {
    /// Being authored; the only editable state
    #[default]
    Draft,
    /// Waiting for its scheduled time
    Scheduled,
    /// Dispatch in progress
    Sending,
    /// Dispatch finished with at least one delivery
    Sent,
    /// Held; no further dispatch until resumed
    Paused,
    /// Dispatch aborted; may be sent again
    Failed,
}

impl CampaignStatus {
    /// States from which `send` may be invoked
    pub fn can_send(&self) -> bool {
        matches!(self, Self::Draft | Self::Scheduled | Self::Failed)
    }

    pub fn can_pause(&self) -> bool {
        matches!(self, Self::Sending | Self::Scheduled)
    }

    pub fn is_editable(&self) -> bool {
        matches!(self, Self::Draft)
    }

    /// Transition table of the campaign lifecycle
    pub fn can_transition_to(&self, next: CampaignStatus) -> bool {
        use CampaignStatus::*;

        matches!(
            (self, next),
            (Draft, Scheduled)
                | (Draft, Sending)
                | (Draft, Failed)
                | (Scheduled, Sending)
                | (Scheduled, Paused)
                | (Sending, Sent)
                | (Sending, Failed)
                | (Sending, Paused)
                | (Paused, Scheduled)
                | (Paused, Sending)
                | (Paused, Sent)
                | (Paused, Failed)
                | (Failed, Sending)
        )
    }
}

impl std::fmt::Display for CampaignStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Draft => write!(f, "draft"),
            Self::Scheduled => write!(f, "scheduled"),
            Self::Sending => write!(f, "sending"),
            Self::Sent => write!(f, "sent"),
            Self::Paused => write!(f, "paused"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SendType {
    #[default]
    Now,
    Scheduled,
}

/// Denormalized delivery counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CampaignMetrics {
    pub recipients: u64,
    pub delivered: u64,
    pub opened: u64,
    pub clicked: u64,
    pub bounced: u64,
    pub complained: u64,
}

/// Counter increments applied atomically by the campaign store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MetricsDelta {
    pub opened: u64,
    pub clicked: u64,
    pub bounced: u64,
    pub complained: u64,
}

impl MetricsDelta {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn apply(&self, metrics: &mut CampaignMetrics) {
        metrics.opened += self.opened;
        metrics.clicked += self.clicked;
        metrics.bounced += self.bounced;
        metrics.complained += self.complained;
    }
}

/// Bulk email campaign
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Campaign {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    pub subject: String,
    pub preheader: Option<String>,
    pub sender_name: String,
    pub sender_email: String,
    pub reply_to: Option<String>,
    pub status: CampaignStatus,
    pub send_type: SendType,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub sent_at: Option<DateTime<Utc>>,
    pub html_content: Option<String>,
    pub template_id: Option<Uuid>,
    /// Associated contact lists
    pub list_ids: Vec<Uuid>,
    pub metrics: CampaignMetrics,
    /// Status held when the campaign was paused. `Sending` means a dispatch is still in flight.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paused_from: Option<CampaignStatus>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Campaign {
    /// New draft with zeroed metrics. Recipients are counted by the caller.
    pub fn draft(owner_id: Uuid, input: NewCampaign) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            owner_id,
            name: input.name.trim().to_string(),
            subject: input.subject,
            preheader: input.preheader,
            sender_name: input.sender_name.trim().to_string(),
            sender_email: input.sender_email.trim().to_lowercase(),
            reply_to: input.reply_to.map(|r| r.trim().to_lowercase()),
            status: CampaignStatus::Draft,
            send_type: SendType::Now,
            scheduled_at: None,
            sent_at: None,
            html_content: input.html_content,
            template_id: input.template_id,
            list_ids: dedup_ids(input.list_ids),
            metrics: CampaignMetrics::default(),
            paused_from: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn has_content(&self) -> bool {
        self.html_content
            .as_deref()
            .is_some_and(|html| !html.trim().is_empty())
    }

    /// Check the content and audience preconditions of a dispatch.
    pub fn check_ready(&self) -> Result<(), String> {
        if !self.has_content() {
            return Err("Campaign has no HTML content".to_string());
        }
        if self.list_ids.is_empty() {
            return Err("Campaign has no contact lists".to_string());
        }
        if self.metrics.recipients == 0 {
            return Err("Campaign has no recipients".to_string());
        }
        Ok(())
    }

    pub(crate) fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Drop repeated list ids, keeping first-seen order
pub fn dedup_ids(ids: Vec<Uuid>) -> Vec<Uuid> {
    let mut seen = std::collections::HashSet::new();
    ids.into_iter().filter(|id| seen.insert(*id)).collect()
}

/// Fields required to create a campaign
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCampaign {
    pub name: String,
    pub subject: String,
    pub preheader: Option<String>,
    pub sender_name: String,
    pub sender_email: String,
    pub reply_to: Option<String>,
    pub html_content: Option<String>,
    pub template_id: Option<Uuid>,
    #[serde(default)]
    pub list_ids: Vec<Uuid>,
}

impl NewCampaign {
    pub fn new(name: &str, subject: &str, sender_name: &str, sender_email: &str) -> Self {
        Self {
            name: name.to_string(),
            subject: subject.to_string(),
            sender_name: sender_name.to_string(),
            sender_email: sender_email.to_string(),
            ..Default::default()
        }
    }

    pub fn html(mut self, html: &str) -> Self {
        self.html_content = Some(html.to_string());
        self
    }

    pub fn preheader(mut self, preheader: &str) -> Self {
        self.preheader = Some(preheader.to_string());
        self
    }

    pub fn reply_to(mut self, reply_to: &str) -> Self {
        self.reply_to = Some(reply_to.to_string());
        self
    }

    pub fn lists(mut self, list_ids: Vec<Uuid>) -> Self {
        self.list_ids = list_ids;
        self
    }
}

/// Structural edit of a draft campaign.
///
/// `None` leaves a field untouched. Optional fields take `Some(None)` to clear.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CampaignUpdate {
    pub name: Option<String>,
    pub subject: Option<String>,
    #[serde(deserialize_with = "present")]
    pub preheader: Option<Option<String>>,
    pub sender_name: Option<String>,
    pub sender_email: Option<String>,
    #[serde(deserialize_with = "present")]
    pub reply_to: Option<Option<String>>,
    #[serde(deserialize_with = "present")]
    pub html_content: Option<Option<String>>,
    #[serde(deserialize_with = "present")]
    pub template_id: Option<Option<Uuid>>,
    pub list_ids: Option<Vec<Uuid>>,
}

/// A field that is present, even as `null`, is `Some`
fn present<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

impl CampaignUpdate {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.subject.is_none()
            && self.preheader.is_none()
            && self.sender_name.is_none()
            && self.sender_email.is_none()
            && self.reply_to.is_none()
            && self.html_content.is_none()
            && self.template_id.is_none()
            && self.list_ids.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_null_clears() {
        let update: CampaignUpdate =
            serde_json::from_str(r#"{"name":"Renamed","replyTo":null}"#).unwrap();

        assert_eq!(update.name.as_deref(), Some("Renamed"));
        assert_eq!(update.reply_to, Some(None));
        assert_eq!(update.preheader, None);
        assert!(!update.is_empty());
    }

    #[test]
    fn test_sendable_states() {
        assert!(CampaignStatus::Draft.can_send());
        assert!(CampaignStatus::Scheduled.can_send());
        assert!(CampaignStatus::Failed.can_send());
        assert!(!CampaignStatus::Sending.can_send());
        assert!(!CampaignStatus::Sent.can_send());
        assert!(!CampaignStatus::Paused.can_send());
    }

    #[test]
    fn test_terminal_sent() {
        for next in [
            CampaignStatus::Draft,
            CampaignStatus::Scheduled,
            CampaignStatus::Sending,
            CampaignStatus::Paused,
            CampaignStatus::Failed,
        ] {
            assert!(!CampaignStatus::Sent.can_transition_to(next));
        }
        assert!(CampaignStatus::Failed.can_transition_to(CampaignStatus::Sending));
        assert!(!CampaignStatus::Failed.can_transition_to(CampaignStatus::Draft));
    }

    #[test]
    fn test_status_wire_format() {
        let json = serde_json::to_string(&CampaignStatus::Scheduled).unwrap();
        assert_eq!(json, "\"scheduled\"");
    }
}
