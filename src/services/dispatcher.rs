//! Batch Dispatcher - chunked, bounded-concurrency campaign sending
//!
//! Shared by every provider. Recipients are split into fixed-size chunks that
//! run one after another with a pacing delay in between. Inside a chunk at most
//! `concurrency` provider calls are in flight. Messages are personalized right
//! before their provider call, so only one chunk of rendered mail exists at a
//! time.

use std::future::Future;
use std::time::Duration;

use futures_util::stream::{self, StreamExt};
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::models::{Contact, EmailAddress, OutboundEmail};
use crate::services::personalize::{render, with_preheader};
use crate::services::provider::{
    CampaignSendParams, DispatchResult, ProviderError, SendReceipt, TestEmailParams,
};

/// Dispatch tuning
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchConfig {
    /// Recipients per chunk
    pub chunk_size: usize,
    /// Provider calls in flight per chunk
    pub concurrency: usize,
    /// Delay between chunks
    pub pacing: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            chunk_size: 100,
            concurrency: 10,
            pacing: Duration::from_millis(1000),
        }
    }
}

impl DispatchConfig {
    pub fn new(chunk_size: usize, concurrency: usize) -> Self {
        Self {
            chunk_size,
            concurrency,
            ..Default::default()
        }
    }

    pub fn with_chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = size;
        self
    }

    pub fn with_pacing(mut self, pacing: Duration) -> Self {
        self.pacing = pacing;
        self
    }

    /// No pacing; for tests and local sinks
    pub fn immediate(chunk_size: usize, concurrency: usize) -> Self {
        Self::new(chunk_size, concurrency).with_pacing(Duration::ZERO)
    }
}

/// Running totals for one dispatch
#[derive(Default)]
struct Tally {
    result: DispatchResult,
    last_error: Option<String>,
}

impl Tally {
    fn sent(&mut self, contact_id: Uuid, message_id: String) {
        self.result.sent += 1;
        self.result.receipts.push(SendReceipt {
            contact_id: Some(contact_id),
            message_id,
        });
    }

    fn failed(&mut self, contact_id: Uuid, error: &ProviderError) {
        warn!(contact_id = %contact_id, error = %error, "Recipient send failed");
        self.result.failed += 1;
        self.last_error = Some(error.to_string());
    }

    fn finish(self) -> Result<DispatchResult, ProviderError> {
        if self.result.sent == 0 && self.result.failed > 0 {
            return Err(ProviderError::NothingSent {
                failed: self.result.failed,
                last_error: self.last_error.unwrap_or_default(),
            });
        }
        Ok(self.result)
    }
}

pub struct BatchDispatcher {
    config: DispatchConfig,
}

impl BatchDispatcher {
    pub fn new(config: DispatchConfig) -> Self {
        let config = DispatchConfig {
            chunk_size: config.chunk_size.max(1),
            concurrency: config.concurrency.max(1),
            pacing: config.pacing,
        };
        Self { config }
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    /// Render the message for one recipient
    pub fn personalize(params: &CampaignSendParams, contact: &Contact) -> OutboundEmail {
        let subject = render(&params.subject, contact);
        let html = render(&params.html_content, contact);
        let preheader = params.preheader.as_deref().map(|p| render(p, contact));

        let to = match contact.full_name() {
            Some(name) => EmailAddress::with_name(&contact.email, &name),
            None => EmailAddress::new(&contact.email),
        };

        OutboundEmail::new(
            params.campaign_id,
            params.sender.clone(),
            to,
            &subject,
            &with_preheader(&html, preheader.as_deref()),
        )
        .contact(contact.id)
        .reply_to(params.reply_to.clone())
    }

    /// Build the single message of a test send
    pub fn test_message(params: &TestEmailParams) -> OutboundEmail {
        OutboundEmail::new(
            params.campaign_id,
            params.sender.clone(),
            EmailAddress::new(&params.recipient),
            &params.subject,
            &params.html_content,
        )
        .reply_to(params.reply_to.clone())
    }

    /// One provider call per recipient.
    ///
    /// A fatal error aborts immediately and drops the calls still in flight.
    pub async fn dispatch_each<F, Fut>(
        &self,
        params: &CampaignSendParams,
        send: F,
    ) -> Result<DispatchResult, ProviderError>
    where
        F: Fn(OutboundEmail) -> Fut + Send + Sync,
        Fut: Future<Output = Result<String, ProviderError>> + Send,
    {
        let mut tally = Tally::default();
        let total_chunks = params.contacts.len().div_ceil(self.config.chunk_size);

        for (index, chunk) in params.contacts.chunks(self.config.chunk_size).enumerate() {
            if index > 0 {
                self.pace().await;
            }

            // Futures are lazy; at most `concurrency` of them run at once
            let pending: Vec<_> = chunk
                .iter()
                .map(|contact| {
                    let contact_id = contact.id;
                    let delivery = send(Self::personalize(params, contact));
                    async move { (contact_id, delivery.await) }
                })
                .collect();
            let mut in_flight = stream::iter(pending).buffer_unordered(self.config.concurrency);

            while let Some((contact_id, outcome)) = in_flight.next().await {
                match outcome {
                    Ok(message_id) => tally.sent(contact_id, message_id),
                    Err(e) if e.is_fatal() => {
                        error!(
                            campaign_id = %params.campaign_id,
                            error = %e,
                            "Fatal provider error, aborting dispatch"
                        );
                        return Err(e);
                    }
                    Err(e) => tally.failed(contact_id, &e),
                }
            }

            debug!(
                campaign_id = %params.campaign_id,
                chunk = index + 1,
                total_chunks,
                sent = tally.result.sent,
                failed = tally.result.failed,
                "Chunk dispatched"
            );
        }

        tally.finish()
    }

    /// One provider call per chunk, for providers with a native batch endpoint.
    ///
    /// `send_batch` returns message ids in input order. A non-fatal failure of
    /// the call counts every recipient of the chunk as failed.
    pub async fn dispatch_batched<F, Fut>(
        &self,
        params: &CampaignSendParams,
        send_batch: F,
    ) -> Result<DispatchResult, ProviderError>
    where
        F: Fn(Vec<OutboundEmail>) -> Fut + Send + Sync,
        Fut: Future<Output = Result<Vec<String>, ProviderError>> + Send,
    {
        let mut tally = Tally::default();
        let total_chunks = params.contacts.len().div_ceil(self.config.chunk_size);

        for (index, chunk) in params.contacts.chunks(self.config.chunk_size).enumerate() {
            if index > 0 {
                self.pace().await;
            }

            let messages: Vec<OutboundEmail> = chunk
                .iter()
                .map(|contact| Self::personalize(params, contact))
                .collect();

            match send_batch(messages).await {
                Ok(message_ids) => {
                    let accepted = message_ids.len().min(chunk.len());
                    for (contact, message_id) in chunk.iter().zip(message_ids) {
                        tally.sent(contact.id, message_id);
                    }
                    let missing = ProviderError::Recipient("No message id returned".to_string());
                    for contact in &chunk[accepted..] {
                        tally.failed(contact.id, &missing);
                    }
                }
                Err(e) if e.is_fatal() => {
                    error!(
                        campaign_id = %params.campaign_id,
                        error = %e,
                        "Fatal provider error, aborting dispatch"
                    );
                    return Err(e);
                }
                Err(e) => {
                    for contact in chunk {
                        tally.failed(contact.id, &e);
                    }
                }
            }

            debug!(
                campaign_id = %params.campaign_id,
                chunk = index + 1,
                total_chunks,
                sent = tally.result.sent,
                failed = tally.result.failed,
                "Batch dispatched"
            );
        }

        tally.finish()
    }

    async fn pace(&self) {
        if !self.config.pacing.is_zero() {
            tokio::time::sleep(self.config.pacing).await;
        }
    }
}

impl Default for BatchDispatcher {
    fn default() -> Self {
        Self::new(DispatchConfig::default())
    }
}
