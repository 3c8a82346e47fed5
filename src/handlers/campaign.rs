//! Campaign Handler

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::handlers::error::{parse_id, parse_time, ApiError};
use crate::models::{Campaign, CampaignMetrics, CampaignUpdate, NewCampaign, SendType};
use crate::services::{CampaignService, SendOutcome};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleRequest {
    /// ISO-8601 timestamp
    pub scheduled_at: String,
}

#[derive(Debug, Deserialize)]
pub struct TestEmailRequest {
    pub email: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignResponse {
    pub id: String,
    pub name: String,
    pub subject: String,
    pub preheader: Option<String>,
    pub sender_name: String,
    pub sender_email: String,
    pub reply_to: Option<String>,
    pub status: String,
    pub send_type: String,
    pub scheduled_at: Option<String>,
    pub sent_at: Option<String>,
    pub html_content: Option<String>,
    pub template_id: Option<String>,
    pub list_ids: Vec<String>,
    pub metrics: CampaignMetrics,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Campaign> for CampaignResponse {
    fn from(c: Campaign) -> Self {
        Self {
            id: c.id.to_string(),
            name: c.name,
            subject: c.subject,
            preheader: c.preheader,
            sender_name: c.sender_name,
            sender_email: c.sender_email,
            reply_to: c.reply_to,
            status: c.status.to_string(),
            send_type: match c.send_type {
                SendType::Now => "now".to_string(),
                SendType::Scheduled => "scheduled".to_string(),
            },
            scheduled_at: c.scheduled_at.map(|t| t.to_rfc3339()),
            sent_at: c.sent_at.map(|t| t.to_rfc3339()),
            html_content: c.html_content,
            template_id: c.template_id.map(|id| id.to_string()),
            list_ids: c.list_ids.iter().map(|id| id.to_string()).collect(),
            metrics: c.metrics,
            created_at: c.created_at.to_rfc3339(),
            updated_at: c.updated_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendResponse {
    pub campaign: CampaignResponse,
    pub sent: usize,
    pub failed: usize,
    pub message_ids: Vec<String>,
}

impl From<SendOutcome> for SendResponse {
    fn from(outcome: SendOutcome) -> Self {
        Self {
            sent: outcome.result.sent,
            failed: outcome.result.failed,
            message_ids: outcome
                .result
                .receipts
                .into_iter()
                .map(|r| r.message_id)
                .collect(),
            campaign: outcome.campaign.into(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TestEmailResponse {
    pub success: bool,
    pub message_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DueDispatchResponse {
    pub campaign_id: String,
    pub sent: usize,
    pub failed: usize,
    pub error: Option<ApiError>,
}

/// Campaign handler
pub struct CampaignHandler {
    campaigns: Arc<CampaignService>,
}

impl CampaignHandler {
    pub fn new(campaigns: Arc<CampaignService>) -> Self {
        Self { campaigns }
    }

    pub async fn create(&self, owner_id: Uuid, request: NewCampaign) -> Result<CampaignResponse, ApiError> {
        let campaign = self.campaigns.create_campaign(owner_id, request).await?;
        Ok(campaign.into())
    }

    pub async fn get(&self, owner_id: Uuid, id: &str) -> Result<CampaignResponse, ApiError> {
        let id = parse_id("campaign id", id)?;
        Ok(self.campaigns.get_campaign(owner_id, id).await?.into())
    }

    pub async fn update(
        &self,
        owner_id: Uuid,
        id: &str,
        request: CampaignUpdate,
    ) -> Result<CampaignResponse, ApiError> {
        let id = parse_id("campaign id", id)?;
        Ok(self.campaigns.update_campaign(owner_id, id, request).await?.into())
    }

    pub async fn delete(&self, owner_id: Uuid, id: &str) -> Result<(), ApiError> {
        let id = parse_id("campaign id", id)?;
        self.campaigns.delete_campaign(owner_id, id).await?;
        Ok(())
    }

    pub async fn duplicate(&self, owner_id: Uuid, id: &str) -> Result<CampaignResponse, ApiError> {
        let id = parse_id("campaign id", id)?;
        Ok(self.campaigns.duplicate_campaign(owner_id, id).await?.into())
    }

    /// Send now
    pub async fn send(&self, owner_id: Uuid, id: &str) -> Result<SendResponse, ApiError> {
        let id = parse_id("campaign id", id)?;
        Ok(self.campaigns.send_campaign(owner_id, id).await?.into())
    }

    pub async fn schedule(
        &self,
        owner_id: Uuid,
        id: &str,
        request: ScheduleRequest,
    ) -> Result<CampaignResponse, ApiError> {
        let id = parse_id("campaign id", id)?;
        let at = parse_time("scheduledAt", &request.scheduled_at)?;
        Ok(self.campaigns.schedule_campaign(owner_id, id, at).await?.into())
    }

    pub async fn pause(&self, owner_id: Uuid, id: &str) -> Result<CampaignResponse, ApiError> {
        let id = parse_id("campaign id", id)?;
        Ok(self.campaigns.pause_campaign(owner_id, id).await?.into())
    }

    pub async fn resume(&self, owner_id: Uuid, id: &str) -> Result<CampaignResponse, ApiError> {
        let id = parse_id("campaign id", id)?;
        Ok(self.campaigns.resume_campaign(owner_id, id).await?.into())
    }

    pub async fn send_test(
        &self,
        owner_id: Uuid,
        id: &str,
        request: TestEmailRequest,
    ) -> Result<TestEmailResponse, ApiError> {
        let id = parse_id("campaign id", id)?;
        let receipt = self.campaigns.send_test_email(owner_id, id, &request.email).await?;
        Ok(TestEmailResponse {
            success: true,
            message_id: receipt.message_id,
        })
    }

    /// Scheduler tick: send every campaign that is due
    pub async fn dispatch_due(&self) -> Result<Vec<DueDispatchResponse>, ApiError> {
        let outcomes = self.campaigns.dispatch_due(Utc::now()).await?;

        Ok(outcomes
            .into_iter()
            .map(|(id, outcome)| match outcome {
                Ok(outcome) => DueDispatchResponse {
                    campaign_id: id.to_string(),
                    sent: outcome.result.sent,
                    failed: outcome.result.failed,
                    error: None,
                },
                Err(e) => DueDispatchResponse {
                    campaign_id: id.to_string(),
                    sent: 0,
                    failed: 0,
                    error: Some(e.into()),
                },
            })
            .collect())
    }
}
