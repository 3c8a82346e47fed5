//! Campaign Service - lifecycle state machine and send protocol

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::models::{
    dedup_ids, normalize_email, validate_email, Campaign, CampaignEvent, CampaignStatus,
    CampaignUpdate, Contact, EmailAddress, EventType, NewCampaign, SendType,
};
use crate::services::personalize::{render, with_preheader};
use crate::services::provider::{
    CampaignSendParams, DispatchResult, EmailProvider, ProviderError, SendReceipt, TestEmailParams,
};
use crate::services::resolver::RecipientResolver;
use crate::services::store::{CampaignStore, ContactListStore, EventStore, StoreError};

/// Campaign service error
#[derive(Debug, thiserror::Error)]
pub enum CampaignError {
    #[error("Campaign not found: {0}")]
    NotFound(Uuid),
    #[error("Contact list not found: {0}")]
    ListNotFound(Uuid),
    #[error("{0}")]
    InvalidState(String),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Campaign as stored after a dispatch, with the provider tally
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendOutcome {
    pub campaign: Campaign,
    pub result: DispatchResult,
}

/// Campaign lifecycle service
pub struct CampaignService {
    campaigns: Arc<dyn CampaignStore>,
    lists: Arc<dyn ContactListStore>,
    events: Arc<dyn EventStore>,
    resolver: Arc<RecipientResolver>,
    provider: Arc<dyn EmailProvider>,
}

impl CampaignService {
    pub fn new(
        campaigns: Arc<dyn CampaignStore>,
        lists: Arc<dyn ContactListStore>,
        events: Arc<dyn EventStore>,
        resolver: Arc<RecipientResolver>,
        provider: Arc<dyn EmailProvider>,
    ) -> Self {
        Self {
            campaigns,
            lists,
            events,
            resolver,
            provider,
        }
    }

    /// Name of the configured email provider
    pub fn provider_name(&self) -> &'static str {
        self.provider.name()
    }

    // ========== Authoring ==========

    /// Create a draft campaign
    pub async fn create_campaign(&self, owner_id: Uuid, input: NewCampaign) -> Result<Campaign, CampaignError> {
        required("name", &input.name)?;
        required("subject", &input.subject)?;
        sender_address(&input.sender_email)?;
        if let Some(reply_to) = &input.reply_to {
            sender_address(reply_to)?;
        }

        let mut campaign = Campaign::draft(owner_id, input);
        self.ensure_lists(owner_id, &campaign.list_ids).await?;
        campaign.metrics.recipients = self.resolver.count(&campaign.list_ids).await?;

        self.campaigns.insert_campaign(campaign.clone()).await?;

        info!(
            campaign_id = %campaign.id,
            recipients = campaign.metrics.recipients,
            "Campaign created"
        );

        Ok(campaign)
    }

    pub async fn get_campaign(&self, owner_id: Uuid, id: Uuid) -> Result<Campaign, CampaignError> {
        self.campaigns
            .get(owner_id, id)
            .await?
            .ok_or(CampaignError::NotFound(id))
    }

    /// Apply a structural edit. Only drafts are editable.
    pub async fn update_campaign(
        &self,
        owner_id: Uuid,
        id: Uuid,
        update: CampaignUpdate,
    ) -> Result<Campaign, CampaignError> {
        let mut campaign = self.get_campaign(owner_id, id).await?;
        if !campaign.status.is_editable() {
            return Err(CampaignError::InvalidState(format!(
                "Only draft campaigns can be edited (status: {})",
                campaign.status
            )));
        }
        if update.is_empty() {
            return Ok(campaign);
        }

        if let Some(name) = update.name {
            campaign.name = required("name", &name)?;
        }
        if let Some(subject) = update.subject {
            required("subject", &subject)?;
            campaign.subject = subject;
        }
        if let Some(preheader) = update.preheader {
            campaign.preheader = preheader;
        }
        if let Some(sender_name) = update.sender_name {
            campaign.sender_name = sender_name.trim().to_string();
        }
        if let Some(sender_email) = update.sender_email {
            campaign.sender_email = sender_address(&sender_email)?;
        }
        if let Some(reply_to) = update.reply_to {
            campaign.reply_to = reply_to.as_deref().map(sender_address).transpose()?;
        }
        if let Some(html) = update.html_content {
            campaign.html_content = html;
        }
        if let Some(template_id) = update.template_id {
            campaign.template_id = template_id;
        }
        if let Some(list_ids) = update.list_ids {
            let list_ids = dedup_ids(list_ids);
            self.ensure_lists(owner_id, &list_ids).await?;
            campaign.metrics.recipients = self.resolver.count(&list_ids).await?;
            campaign.list_ids = list_ids;
        }

        campaign.touch();
        self.commit(&campaign, CampaignStatus::Draft).await?;

        Ok(campaign)
    }

    /// Delete a draft and its events
    pub async fn delete_campaign(&self, owner_id: Uuid, id: Uuid) -> Result<(), CampaignError> {
        let campaign = self.get_campaign(owner_id, id).await?;
        if campaign.status != CampaignStatus::Draft {
            return Err(CampaignError::InvalidState(format!(
                "Only draft campaigns can be deleted (status: {})",
                campaign.status
            )));
        }

        if !self.campaigns.delete_campaign(owner_id, id).await? {
            return Err(CampaignError::NotFound(id));
        }
        let events = self.events.delete_for_campaign(id).await?;

        info!(campaign_id = %id, events, "Campaign deleted");
        Ok(())
    }

    /// Copy the authored fields of any campaign into a new draft
    pub async fn duplicate_campaign(&self, owner_id: Uuid, id: Uuid) -> Result<Campaign, CampaignError> {
        let source = self.get_campaign(owner_id, id).await?;

        let mut input = NewCampaign::new(
            &format!("{} (Copy)", source.name),
            &source.subject,
            &source.sender_name,
            &source.sender_email,
        )
        .lists(source.list_ids.clone());
        input.preheader = source.preheader.clone();
        input.reply_to = source.reply_to.clone();
        input.html_content = source.html_content.clone();
        input.template_id = source.template_id;

        let mut copy = Campaign::draft(owner_id, input);
        copy.metrics.recipients = self.resolver.count(&copy.list_ids).await?;
        self.campaigns.insert_campaign(copy.clone()).await?;

        info!(campaign_id = %copy.id, source_id = %id, "Campaign duplicated");
        Ok(copy)
    }

    // ========== Lifecycle ==========

    /// Dispatch a campaign now
    pub async fn send_campaign(&self, owner_id: Uuid, id: Uuid) -> Result<SendOutcome, CampaignError> {
        let campaign = self.get_campaign(owner_id, id).await?;
        if !campaign.status.can_send() {
            return Err(CampaignError::InvalidState(format!(
                "Campaign cannot be sent (status: {})",
                campaign.status
            )));
        }
        self.dispatch(campaign).await
    }

    /// Schedule a draft for a future time
    pub async fn schedule_campaign(
        &self,
        owner_id: Uuid,
        id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<Campaign, CampaignError> {
        let mut campaign = self.get_campaign(owner_id, id).await?;
        if campaign.status != CampaignStatus::Draft {
            return Err(CampaignError::InvalidState(format!(
                "Only draft campaigns can be scheduled (status: {})",
                campaign.status
            )));
        }
        if at <= Utc::now() {
            return Err(CampaignError::Validation(
                "Scheduled time must be in the future".to_string(),
            ));
        }

        campaign.metrics.recipients = self.resolver.count(&campaign.list_ids).await?;
        campaign.check_ready().map_err(CampaignError::InvalidState)?;

        campaign.send_type = SendType::Scheduled;
        campaign.scheduled_at = Some(at);
        transition(&mut campaign, CampaignStatus::Scheduled)?;
        self.commit(&campaign, CampaignStatus::Draft).await?;

        info!(campaign_id = %id, scheduled_at = %at, "Campaign scheduled");
        Ok(campaign)
    }

    pub async fn pause_campaign(&self, owner_id: Uuid, id: Uuid) -> Result<Campaign, CampaignError> {
        let mut campaign = self.get_campaign(owner_id, id).await?;
        if !campaign.status.can_pause() {
            return Err(CampaignError::InvalidState(format!(
                "Campaign cannot be paused (status: {})",
                campaign.status
            )));
        }

        let previous = campaign.status;
        transition(&mut campaign, CampaignStatus::Paused)?;
        campaign.paused_from = Some(previous);
        self.commit(&campaign, previous).await?;

        info!(campaign_id = %id, from = %previous, "Campaign paused");
        Ok(campaign)
    }

    /// Resume a paused campaign.
    ///
    /// A schedule still in the future is restored; otherwise the campaign is
    /// dispatched right away. A campaign paused mid-dispatch cannot be resumed
    /// until that dispatch writes its terminal status.
    pub async fn resume_campaign(&self, owner_id: Uuid, id: Uuid) -> Result<Campaign, CampaignError> {
        let mut campaign = self.get_campaign(owner_id, id).await?;
        if campaign.status != CampaignStatus::Paused {
            return Err(CampaignError::InvalidState(format!(
                "Only paused campaigns can be resumed (status: {})",
                campaign.status
            )));
        }
        if campaign.paused_from == Some(CampaignStatus::Sending) {
            return Err(CampaignError::InvalidState(
                "Campaign is still sending; resume once the current dispatch finishes".to_string(),
            ));
        }
        campaign.paused_from = None;

        if campaign.scheduled_at.is_some_and(|at| at > Utc::now()) {
            transition(&mut campaign, CampaignStatus::Scheduled)?;
            self.commit(&campaign, CampaignStatus::Paused).await?;
            info!(campaign_id = %id, "Campaign rescheduled");
            return Ok(campaign);
        }

        Ok(self.dispatch(campaign).await?.campaign)
    }

    /// Dispatch every scheduled campaign whose time has come
    pub async fn dispatch_due(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<(Uuid, Result<SendOutcome, CampaignError>)>, CampaignError> {
        let due = self.campaigns.list_due(now).await?;
        let mut outcomes = Vec::with_capacity(due.len());

        for campaign in due {
            let id = campaign.id;
            let outcome = self.dispatch(campaign).await;
            if let Err(e) = &outcome {
                warn!(campaign_id = %id, error = %e, "Scheduled dispatch failed");
            }
            outcomes.push((id, outcome));
        }

        Ok(outcomes)
    }

    /// Send one rendered message to an arbitrary address. Status is untouched.
    pub async fn send_test_email(
        &self,
        owner_id: Uuid,
        id: Uuid,
        recipient: &str,
    ) -> Result<SendReceipt, CampaignError> {
        let campaign = self.get_campaign(owner_id, id).await?;
        let recipient = normalize_email(recipient);
        validate_email(&recipient).map_err(CampaignError::Validation)?;

        let html = campaign
            .html_content
            .as_deref()
            .filter(|html| !html.trim().is_empty())
            .ok_or_else(|| CampaignError::InvalidState("Campaign has no HTML content".to_string()))?;

        let sample = Contact::new(owner_id, &recipient);
        let preheader = campaign.preheader.as_deref().map(|p| render(p, &sample));
        let params = TestEmailParams {
            campaign_id: campaign.id,
            sender: sender_of(&campaign),
            reply_to: campaign.reply_to.as_deref().map(EmailAddress::new),
            subject: format!("[TEST] {}", render(&campaign.subject, &sample)),
            html_content: with_preheader(&render(html, &sample), preheader.as_deref()),
            recipient,
        };

        let receipt = self.provider.send_test_email(&params).await?;

        info!(
            campaign_id = %id,
            recipient = %params.recipient,
            message_id = %receipt.message_id,
            "Test email sent"
        );

        Ok(receipt)
    }

    // ========== Send protocol ==========

    /// Move a sendable campaign through sending to sent or failed.
    async fn dispatch(&self, mut campaign: Campaign) -> Result<SendOutcome, CampaignError> {
        let from = campaign.status;

        campaign.metrics.recipients = self.resolver.count(&campaign.list_ids).await?;
        campaign.check_ready().map_err(CampaignError::InvalidState)?;

        transition(&mut campaign, CampaignStatus::Sending)?;
        self.commit(&campaign, from).await?;

        info!(
            campaign_id = %campaign.id,
            provider = self.provider.name(),
            recipients = campaign.metrics.recipients,
            "Campaign sending"
        );

        match self.deliver(&mut campaign).await {
            Ok(result) => self.complete(campaign, result).await,
            Err(e) => {
                error!(campaign_id = %campaign.id, error = %e, "Campaign dispatch failed");
                if let Err(store_error) = self.finalize(&mut campaign, CampaignStatus::Failed).await {
                    error!(
                        campaign_id = %campaign.id,
                        error = %store_error,
                        "Could not mark campaign as failed"
                    );
                }
                Err(e)
            }
        }
    }

    async fn deliver(&self, campaign: &mut Campaign) -> Result<DispatchResult, CampaignError> {
        let contacts = self.resolver.resolve(&campaign.list_ids).await?;
        if contacts.is_empty() {
            return Err(CampaignError::InvalidState("Campaign has no recipients".to_string()));
        }
        campaign.metrics.recipients = contacts.len() as u64;

        let params = CampaignSendParams {
            campaign_id: campaign.id,
            sender: sender_of(campaign),
            reply_to: campaign.reply_to.as_deref().map(EmailAddress::new),
            subject: campaign.subject.clone(),
            preheader: campaign.preheader.clone(),
            html_content: campaign.html_content.clone().unwrap_or_default(),
            contacts,
        };

        Ok(self.provider.send_campaign(&params).await?)
    }

    async fn complete(&self, mut campaign: Campaign, result: DispatchResult) -> Result<SendOutcome, CampaignError> {
        campaign.metrics.delivered = result.sent as u64;
        campaign.sent_at = Some(Utc::now());
        self.finalize(&mut campaign, CampaignStatus::Sent).await?;

        let events: Vec<CampaignEvent> = result
            .receipts
            .iter()
            .map(|receipt| {
                CampaignEvent::new(campaign.id, receipt.contact_id, EventType::Sent)
                    .with_data(serde_json::json!({ "messageId": receipt.message_id }))
            })
            .collect();
        if let Err(e) = self.events.append(events).await {
            warn!(campaign_id = %campaign.id, error = %e, "Could not record sent events");
        }

        info!(
            campaign_id = %campaign.id,
            sent = result.sent,
            failed = result.failed,
            "Campaign sent"
        );

        Ok(SendOutcome { campaign, result })
    }

    /// Write a terminal status. A pause that landed mid-dispatch does not stop it.
    async fn finalize(&self, campaign: &mut Campaign, next: CampaignStatus) -> Result<(), CampaignError> {
        transition(campaign, next)?;

        if self.campaigns.save_if_status(campaign, CampaignStatus::Sending).await? {
            return Ok(());
        }
        if self.campaigns.save_if_status(campaign, CampaignStatus::Paused).await? {
            warn!(campaign_id = %campaign.id, status = %next, "Campaign was paused during dispatch");
            return Ok(());
        }

        Err(CampaignError::InvalidState(
            "Campaign changed state during dispatch".to_string(),
        ))
    }

    // ========== Helpers ==========

    async fn ensure_lists(&self, owner_id: Uuid, list_ids: &[Uuid]) -> Result<(), CampaignError> {
        if list_ids.is_empty() {
            return Ok(());
        }

        let found: HashSet<Uuid> = self
            .lists
            .find_lists(owner_id, list_ids)
            .await?
            .into_iter()
            .map(|l| l.id)
            .collect();

        match list_ids.iter().find(|id| !found.contains(id)) {
            Some(missing) => Err(CampaignError::ListNotFound(*missing)),
            None => Ok(()),
        }
    }

    async fn commit(&self, campaign: &Campaign, expected: CampaignStatus) -> Result<(), CampaignError> {
        if self.campaigns.save_if_status(campaign, expected).await? {
            Ok(())
        } else {
            Err(CampaignError::InvalidState(format!(
                "Campaign is no longer {}",
                expected
            )))
        }
    }
}

fn transition(campaign: &mut Campaign, next: CampaignStatus) -> Result<(), CampaignError> {
    let from = campaign.status;
    if !from.can_transition_to(next) {
        return Err(CampaignError::InvalidState(format!(
            "Cannot move campaign from {} to {}",
            from, next
        )));
    }
    campaign.status = next;
    campaign.touch();
    Ok(())
}

fn required(field: &str, value: &str) -> Result<String, CampaignError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(CampaignError::Validation(format!("{} is required", field)));
    }
    Ok(value.to_string())
}

fn sender_address(email: &str) -> Result<String, CampaignError> {
    let email = normalize_email(email);
    validate_email(&email).map_err(CampaignError::Validation)?;
    Ok(email)
}

fn sender_of(campaign: &Campaign) -> EmailAddress {
    EmailAddress::with_name(&campaign.sender_email, &campaign.sender_name)
}
