//! Test doubles shared by the service tests

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use crate::models::{Contact, EmailAddress, OutboundEmail};
use crate::services::dispatcher::{BatchDispatcher, DispatchConfig};
use crate::services::provider::{
    CampaignSendParams, DispatchResult, EmailProvider, FatalKind, ProviderError, SendReceipt,
    TestEmailParams,
};

/// Provider that records messages and fails configured recipients
pub struct FakeProvider {
    dispatcher: BatchDispatcher,
    failing: HashSet<String>,
    fatal: HashMap<String, FatalKind>,
    delay: Duration,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    sent: Mutex<Vec<OutboundEmail>>,
}

impl FakeProvider {
    pub fn new(config: DispatchConfig) -> Self {
        Self {
            dispatcher: BatchDispatcher::new(config),
            failing: HashSet::new(),
            fatal: HashMap::new(),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn fail_on(mut self, email: &str) -> Self {
        self.failing.insert(email.to_string());
        self
    }

    pub fn fatal_on(mut self, email: &str, kind: FatalKind) -> Self {
        self.fatal.insert(email.to_string(), kind);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn sent(&self) -> Vec<OutboundEmail> {
        self.sent.lock().unwrap().clone()
    }

    async fn deliver(&self, email: OutboundEmail) -> Result<String, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        if self.delay.is_zero() {
            tokio::task::yield_now().await;
        } else {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let recipient = email.to.email.clone();
        if let Some(kind) = self.fatal.get(&recipient) {
            return Err(ProviderError::fatal(*kind, format!("Rejected: {}", kind)));
        }
        if self.failing.contains(&recipient) {
            return Err(ProviderError::Recipient(format!("Mailbox unavailable: {}", recipient)));
        }

        let message_id = format!("fake-{}", email.id);
        self.sent.lock().unwrap().push(email);
        Ok(message_id)
    }
}

#[async_trait]
impl EmailProvider for FakeProvider {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn send_test_email(&self, params: &TestEmailParams) -> Result<SendReceipt, ProviderError> {
        let message_id = self.deliver(BatchDispatcher::test_message(params)).await?;
        Ok(SendReceipt {
            contact_id: None,
            message_id,
        })
    }

    async fn send_campaign(&self, params: &CampaignSendParams) -> Result<DispatchResult, ProviderError> {
        self.dispatcher
            .dispatch_each(params, |email| self.deliver(email))
            .await
    }
}

/// `count` contacts named `user{i}@example.com` / `User{i}`
pub fn contacts(count: usize) -> Vec<Contact> {
    let owner = Uuid::now_v7();
    (0..count)
        .map(|i| {
            let mut contact = Contact::new(owner, &format!("user{}@example.com", i));
            contact.first_name = Some(format!("User{}", i));
            contact
        })
        .collect()
}

pub fn send_params(contacts: Vec<Contact>) -> CampaignSendParams {
    CampaignSendParams {
        campaign_id: Uuid::now_v7(),
        sender: EmailAddress::with_name("news@example.com", "News"),
        reply_to: None,
        subject: "Hello".to_string(),
        preheader: None,
        html_content: "<p>Hello</p>".to_string(),
        contacts,
    }
}
