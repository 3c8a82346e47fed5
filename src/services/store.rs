//! Persistence seams and the in-memory store

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::{
    Campaign, CampaignEvent, CampaignStatus, Contact, ContactList, ContactListMember, MetricsDelta,
};

/// Storage backend error
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Storage error: {0}")]
    Backend(String),
    #[error("Duplicate key: {0}")]
    Duplicate(String),
}

/// Contact persistence
#[async_trait]
pub trait ContactStore: Send + Sync {
    /// `email` must already be normalized
    async fn find_by_owner_and_email(
        &self,
        owner_id: Uuid,
        email: &str,
    ) -> Result<Option<Contact>, StoreError>;

    /// Contacts for the given ids, in the order of `ids`; unknown ids are skipped
    async fn find_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Contact>, StoreError>;

    /// Insert or replace every contact in one write
    async fn save_batch(&self, contacts: Vec<Contact>) -> Result<(), StoreError>;

    /// Insert a new contact, rejecting a duplicate (owner, email)
    async fn insert_contact(&self, contact: Contact) -> Result<(), StoreError>;

    async fn delete_contact(&self, owner_id: Uuid, id: Uuid) -> Result<bool, StoreError>;
}

/// Contact list and membership persistence
#[async_trait]
pub trait ContactListStore: Send + Sync {
    /// Lists among `list_ids` owned by `owner_id`
    async fn find_lists(&self, owner_id: Uuid, list_ids: &[Uuid]) -> Result<Vec<ContactList>, StoreError>;

    async fn find_members_by_list_ids(&self, list_ids: &[Uuid]) -> Result<Vec<ContactListMember>, StoreError>;

    /// Number of distinct stored contacts that belong to any of `list_ids`.
    /// Memberships whose contact no longer exists are not counted.
    async fn count_distinct_members(&self, list_ids: &[Uuid]) -> Result<u64, StoreError>;

    /// Drop every membership of a contact
    async fn remove_contact(&self, contact_id: Uuid) -> Result<usize, StoreError>;
}

/// Campaign aggregate persistence
#[async_trait]
pub trait CampaignStore: Send + Sync {
    async fn get(&self, owner_id: Uuid, id: Uuid) -> Result<Option<Campaign>, StoreError>;

    async fn insert_campaign(&self, campaign: Campaign) -> Result<(), StoreError>;

    /// Atomically replace the stored campaign if its status is still `expected`.
    ///
    /// Returns `false` without writing when the stored status differs.
    /// Engagement counters belong to `increment_metrics` and are kept as stored.
    async fn save_if_status(&self, campaign: &Campaign, expected: CampaignStatus) -> Result<bool, StoreError>;

    async fn delete_campaign(&self, owner_id: Uuid, id: Uuid) -> Result<bool, StoreError>;

    /// Scheduled campaigns whose time has come, oldest first
    async fn list_due(&self, now: DateTime<Utc>) -> Result<Vec<Campaign>, StoreError>;

    async fn increment_metrics(&self, id: Uuid, delta: MetricsDelta) -> Result<bool, StoreError>;
}

/// Append-only campaign event sink
#[async_trait]
pub trait EventStore: Send + Sync {
    async fn append(&self, events: Vec<CampaignEvent>) -> Result<(), StoreError>;

    async fn list_for_campaign(&self, campaign_id: Uuid) -> Result<Vec<CampaignEvent>, StoreError>;

    /// Clear the contact back-reference on every event of a deleted contact
    async fn detach_contact(&self, contact_id: Uuid) -> Result<usize, StoreError>;

    async fn delete_for_campaign(&self, campaign_id: Uuid) -> Result<usize, StoreError>;
}

/// In-memory implementation of every store
#[derive(Clone, Default)]
pub struct MemoryStore {
    contacts: Arc<RwLock<HashMap<Uuid, Contact>>>,
    /// (owner, normalized email) -> contact id
    contacts_by_email: Arc<RwLock<HashMap<(Uuid, String), Uuid>>>,
    lists: Arc<RwLock<HashMap<Uuid, ContactList>>>,
    members: Arc<RwLock<Vec<ContactListMember>>>,
    campaigns: Arc<RwLock<HashMap<Uuid, Campaign>>>,
    events: Arc<RwLock<Vec<CampaignEvent>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    pub async fn insert_list(&self, list: ContactList) {
        let mut lists = self.lists.write().await;
        lists.insert(list.id, list);
    }

    /// Add contacts to a list; existing memberships are kept as they are
    pub async fn add_members(&self, list_id: Uuid, contact_ids: &[Uuid]) -> usize {
        let mut members = self.members.write().await;
        let mut added = 0;

        for contact_id in contact_ids {
            let exists = members
                .iter()
                .any(|m| m.list_id == list_id && m.contact_id == *contact_id);
            if !exists {
                members.push(ContactListMember {
                    list_id,
                    contact_id: *contact_id,
                    added_at: Utc::now(),
                });
                added += 1;
            }
        }

        added
    }

    pub async fn contact_count(&self) -> usize {
        self.contacts.read().await.len()
    }

    pub async fn event_count(&self) -> usize {
        self.events.read().await.len()
    }
}

#[async_trait]
impl ContactStore for MemoryStore {
    async fn find_by_owner_and_email(
        &self,
        owner_id: Uuid,
        email: &str,
    ) -> Result<Option<Contact>, StoreError> {
        let contacts = self.contacts.read().await;
        let by_email = self.contacts_by_email.read().await;

        Ok(by_email
            .get(&(owner_id, email.to_string()))
            .and_then(|id| contacts.get(id))
            .cloned())
    }

    async fn find_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Contact>, StoreError> {
        let contacts = self.contacts.read().await;
        Ok(ids.iter().filter_map(|id| contacts.get(id).cloned()).collect())
    }

    async fn save_batch(&self, batch: Vec<Contact>) -> Result<(), StoreError> {
        let mut contacts = self.contacts.write().await;
        let mut by_email = self.contacts_by_email.write().await;

        for contact in &batch {
            let key = (contact.owner_id, contact.email.clone());
            if let Some(existing) = by_email.get(&key) {
                if *existing != contact.id {
                    return Err(StoreError::Duplicate(contact.email.clone()));
                }
            }
        }

        for contact in batch {
            by_email.insert((contact.owner_id, contact.email.clone()), contact.id);
            contacts.insert(contact.id, contact);
        }

        Ok(())
    }

    async fn insert_contact(&self, contact: Contact) -> Result<(), StoreError> {
        let mut contacts = self.contacts.write().await;
        let mut by_email = self.contacts_by_email.write().await;

        let key = (contact.owner_id, contact.email.clone());
        if by_email.contains_key(&key) {
            return Err(StoreError::Duplicate(contact.email));
        }

        by_email.insert(key, contact.id);
        contacts.insert(contact.id, contact);
        Ok(())
    }

    async fn delete_contact(&self, owner_id: Uuid, id: Uuid) -> Result<bool, StoreError> {
        let mut contacts = self.contacts.write().await;
        let mut by_email = self.contacts_by_email.write().await;

        match contacts.get(&id) {
            Some(contact) if contact.owner_id == owner_id => {
                by_email.remove(&(owner_id, contact.email.clone()));
                contacts.remove(&id);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[async_trait]
impl ContactListStore for MemoryStore {
    async fn find_lists(&self, owner_id: Uuid, list_ids: &[Uuid]) -> Result<Vec<ContactList>, StoreError> {
        let lists = self.lists.read().await;
        Ok(list_ids
            .iter()
            .filter_map(|id| lists.get(id))
            .filter(|list| list.owner_id == owner_id)
            .cloned()
            .collect())
    }

    async fn find_members_by_list_ids(&self, list_ids: &[Uuid]) -> Result<Vec<ContactListMember>, StoreError> {
        let members = self.members.read().await;
        Ok(members
            .iter()
            .filter(|m| list_ids.contains(&m.list_id))
            .copied()
            .collect())
    }

    async fn count_distinct_members(&self, list_ids: &[Uuid]) -> Result<u64, StoreError> {
        let distinct: HashSet<Uuid> = {
            let members = self.members.read().await;
            members
                .iter()
                .filter(|m| list_ids.contains(&m.list_id))
                .map(|m| m.contact_id)
                .collect()
        };

        // Dangling memberships are not part of any audience
        let contacts = self.contacts.read().await;
        Ok(distinct.iter().filter(|id| contacts.contains_key(id)).count() as u64)
    }

    async fn remove_contact(&self, contact_id: Uuid) -> Result<usize, StoreError> {
        let mut members = self.members.write().await;
        let before = members.len();
        members.retain(|m| m.contact_id != contact_id);
        Ok(before - members.len())
    }
}

#[async_trait]
impl CampaignStore for MemoryStore {
    async fn get(&self, owner_id: Uuid, id: Uuid) -> Result<Option<Campaign>, StoreError> {
        let campaigns = self.campaigns.read().await;
        Ok(campaigns
            .get(&id)
            .filter(|c| c.owner_id == owner_id)
            .cloned())
    }

    async fn insert_campaign(&self, campaign: Campaign) -> Result<(), StoreError> {
        let mut campaigns = self.campaigns.write().await;
        if campaigns.contains_key(&campaign.id) {
            return Err(StoreError::Duplicate(campaign.id.to_string()));
        }
        campaigns.insert(campaign.id, campaign);
        Ok(())
    }

    async fn save_if_status(&self, campaign: &Campaign, expected: CampaignStatus) -> Result<bool, StoreError> {
        let mut campaigns = self.campaigns.write().await;

        match campaigns.get_mut(&campaign.id) {
            Some(stored) if stored.status == expected => {
                let engagement = stored.metrics;
                *stored = campaign.clone();
                stored.metrics.opened = engagement.opened;
                stored.metrics.clicked = engagement.clicked;
                stored.metrics.bounced = engagement.bounced;
                stored.metrics.complained = engagement.complained;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete_campaign(&self, owner_id: Uuid, id: Uuid) -> Result<bool, StoreError> {
        let mut campaigns = self.campaigns.write().await;
        match campaigns.get(&id) {
            Some(c) if c.owner_id == owner_id => {
                campaigns.remove(&id);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn list_due(&self, now: DateTime<Utc>) -> Result<Vec<Campaign>, StoreError> {
        let campaigns = self.campaigns.read().await;
        let mut due: Vec<Campaign> = campaigns
            .values()
            .filter(|c| {
                c.status == CampaignStatus::Scheduled && c.scheduled_at.is_some_and(|at| at <= now)
            })
            .cloned()
            .collect();

        due.sort_by_key(|c| c.scheduled_at);
        Ok(due)
    }

    async fn increment_metrics(&self, id: Uuid, delta: MetricsDelta) -> Result<bool, StoreError> {
        let mut campaigns = self.campaigns.write().await;
        match campaigns.get_mut(&id) {
            Some(campaign) => {
                delta.apply(&mut campaign.metrics);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[async_trait]
impl EventStore for MemoryStore {
    async fn append(&self, batch: Vec<CampaignEvent>) -> Result<(), StoreError> {
        let mut events = self.events.write().await;
        events.extend(batch);
        Ok(())
    }

    async fn list_for_campaign(&self, campaign_id: Uuid) -> Result<Vec<CampaignEvent>, StoreError> {
        let events = self.events.read().await;
        Ok(events
            .iter()
            .filter(|e| e.campaign_id == campaign_id)
            .cloned()
            .collect())
    }

    async fn detach_contact(&self, contact_id: Uuid) -> Result<usize, StoreError> {
        let mut events = self.events.write().await;
        let mut detached = 0;

        for event in events.iter_mut().filter(|e| e.contact_id == Some(contact_id)) {
            event.contact_id = None;
            detached += 1;
        }

        Ok(detached)
    }

    async fn delete_for_campaign(&self, campaign_id: Uuid) -> Result<usize, StoreError> {
        let mut events = self.events.write().await;
        let before = events.len();
        events.retain(|e| e.campaign_id != campaign_id);
        Ok(before - events.len())
    }
}
