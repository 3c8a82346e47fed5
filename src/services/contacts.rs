//! Contact Service - bulk import with deduplication

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info};
use uuid::Uuid;

use crate::models::{
    normalize_email, validate_email, Contact, ContactInput, DedupeStrategy, ImportResult,
    ImportRowError, RowOutcome,
};
use crate::services::store::{ContactListStore, ContactStore, EventStore, StoreError};

/// Contact service error
#[derive(Debug, thiserror::Error)]
pub enum ContactError {
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Contact already exists: {0}")]
    Conflict(String),
    #[error("Contact not found: {0}")]
    NotFound(Uuid),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Contact being built up during one import
struct Pending {
    contact: Contact,
    dirty: bool,
}

pub struct ContactService {
    contacts: Arc<dyn ContactStore>,
    lists: Arc<dyn ContactListStore>,
    events: Arc<dyn EventStore>,
}

impl ContactService {
    pub fn new(
        contacts: Arc<dyn ContactStore>,
        lists: Arc<dyn ContactListStore>,
        events: Arc<dyn EventStore>,
    ) -> Self {
        Self { contacts, lists, events }
    }

    /// Import a batch of contacts for one owner.
    ///
    /// Every row lands in exactly one of `imported`, `skipped` (invalid) or
    /// `duplicates`. The strategy resolves collisions within the batch and with
    /// stored contacts alike. All writes go out in one `save_batch`.
    pub async fn import(
        &self,
        owner_id: Uuid,
        items: &[ContactInput],
        strategy: DedupeStrategy,
    ) -> Result<ImportResult, ContactError> {
        let mut result = ImportResult::default();
        let mut pending: Vec<Pending> = Vec::new();
        let mut by_email: HashMap<String, usize> = HashMap::new();

        for (row, item) in items.iter().enumerate() {
            let raw = item.email.as_deref().unwrap_or_default();
            let email = normalize_email(raw);

            if let Err(reason) = validate_email(&email) {
                debug!(row, email = %raw, %reason, "Skipping invalid import row");
                result.skipped += 1;
                result.errors.push(ImportRowError {
                    row,
                    email: raw.trim().to_string(),
                    reason: reason.clone(),
                });
                result.rows.push(RowOutcome::Invalid { reason });
                continue;
            }

            if let Some(&slot) = by_email.get(&email) {
                let entry = &mut pending[slot];
                let applied = resolve(strategy, &mut entry.contact, item);
                entry.dirty |= applied;

                result.duplicates += 1;
                result.rows.push(RowOutcome::Duplicate {
                    contact_id: entry.contact.id,
                    applied,
                });
                continue;
            }

            let entry = match self.contacts.find_by_owner_and_email(owner_id, &email).await? {
                Some(mut existing) => {
                    let applied = resolve(strategy, &mut existing, item);
                    result.duplicates += 1;
                    result.rows.push(RowOutcome::Duplicate {
                        contact_id: existing.id,
                        applied,
                    });
                    Pending { contact: existing, dirty: applied }
                }
                None => {
                    let contact = Contact::from_input(owner_id, &email, item);
                    result.imported += 1;
                    result.rows.push(RowOutcome::Imported { contact_id: contact.id });
                    Pending { contact, dirty: true }
                }
            };

            by_email.insert(email, pending.len());
            pending.push(entry);
        }

        let batch: Vec<Contact> = pending
            .into_iter()
            .filter(|p| p.dirty)
            .map(|p| p.contact)
            .collect();
        let written = batch.len();

        if !batch.is_empty() {
            self.contacts.save_batch(batch).await?;
        }

        info!(
            owner_id = %owner_id,
            %strategy,
            rows = items.len(),
            imported = result.imported,
            duplicates = result.duplicates,
            skipped = result.skipped,
            written,
            "Contact import finished"
        );

        Ok(result)
    }

    /// Create one contact; a second contact with the same email is a conflict
    pub async fn create_contact(&self, owner_id: Uuid, input: &ContactInput) -> Result<Contact, ContactError> {
        let email = normalize_email(input.email.as_deref().unwrap_or_default());
        validate_email(&email).map_err(ContactError::Validation)?;

        if self.contacts.find_by_owner_and_email(owner_id, &email).await?.is_some() {
            return Err(ContactError::Conflict(email));
        }

        let contact = Contact::from_input(owner_id, &email, input);
        match self.contacts.insert_contact(contact.clone()).await {
            Ok(()) => Ok(contact),
            Err(StoreError::Duplicate(email)) => Err(ContactError::Conflict(email)),
            Err(e) => Err(e.into()),
        }
    }

    /// Delete a contact, its list memberships, and its back-reference on events
    pub async fn delete_contact(&self, owner_id: Uuid, contact_id: Uuid) -> Result<(), ContactError> {
        if !self.contacts.delete_contact(owner_id, contact_id).await? {
            return Err(ContactError::NotFound(contact_id));
        }

        let memberships = self.lists.remove_contact(contact_id).await?;
        let events = self.events.detach_contact(contact_id).await?;

        info!(
            contact_id = %contact_id,
            memberships,
            events,
            "Contact deleted"
        );

        Ok(())
    }
}

/// Apply the strategy to a collision; returns whether the contact changed
fn resolve(strategy: DedupeStrategy, contact: &mut Contact, item: &ContactInput) -> bool {
    match strategy {
        DedupeStrategy::KeepFirst => false,
        DedupeStrategy::KeepLast => {
            contact.overwrite(item);
            true
        }
        DedupeStrategy::Merge => {
            contact.merge(item);
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CampaignEvent, ContactStatus, EventType};
    use crate::services::store::MemoryStore;

    fn service(store: &Arc<MemoryStore>) -> ContactService {
        ContactService::new(store.clone(), store.clone(), store.clone())
    }

    #[tokio::test]
    async fn test_keep_last_case_insensitive() {
        let store = MemoryStore::shared();
        let contacts = service(&store);
        let owner = Uuid::now_v7();

        let items = vec![
            ContactInput::new("a@x.com").first_name("First"),
            ContactInput::new("A@X.com").first_name("Last"),
        ];
        let result = contacts.import(owner, &items, DedupeStrategy::KeepLast).await.unwrap();

        assert_eq!(result.imported, 1);
        assert_eq!(result.duplicates, 1);
        assert_eq!(result.skipped, 0);

        let stored = store.find_by_owner_and_email(owner, "a@x.com").await.unwrap().unwrap();
        assert_eq!(stored.email, "a@x.com");
        assert_eq!(stored.first_name.as_deref(), Some("Last"));
        assert_eq!(store.contact_count().await, 1);
    }

    #[tokio::test]
    async fn test_every_row_accounted_for() {
        let store = MemoryStore::shared();
        let contacts = service(&store);
        let owner = Uuid::now_v7();

        let items = vec![
            ContactInput::new("a@x.com"),
            ContactInput::new("not-an-email"),
            ContactInput::default(),
            ContactInput::new(" B@x.com"),
            ContactInput::new("a@x.com"),
            ContactInput::new("b@X.COM"),
        ];
        let result = contacts.import(owner, &items, DedupeStrategy::KeepFirst).await.unwrap();

        assert_eq!(result.total(), items.len());
        assert_eq!(result.rows.len(), items.len());
        assert_eq!(result.imported, 2);
        assert_eq!(result.duplicates, 2);
        assert_eq!(result.skipped, 2);

        let rows: Vec<usize> = result.errors.iter().map(|e| e.row).collect();
        assert_eq!(rows, vec![1, 2]);
        assert_eq!(result.errors[0].email, "not-an-email");

        // Invalid rows are reported, never stored
        assert_eq!(store.contact_count().await, 2);
        let stored = store.find_by_ids(&result.contact_ids()).await.unwrap();
        assert_eq!(stored.len(), 2);
        assert!(stored
            .iter()
            .all(|c| c.status == ContactStatus::Valid && c.validation_errors.is_empty()));
    }

    #[tokio::test]
    async fn test_empty_import() {
        let store = MemoryStore::shared();
        let result = service(&store)
            .import(Uuid::now_v7(), &[], DedupeStrategy::Merge)
            .await
            .unwrap();

        assert_eq!((result.imported, result.skipped, result.duplicates), (0, 0, 0));
        assert!(result.rows.is_empty());
        assert_eq!(store.contact_count().await, 0);
    }

    #[tokio::test]
    async fn test_keep_first_is_idempotent() {
        let store = MemoryStore::shared();
        let contacts = service(&store);
        let owner = Uuid::now_v7();

        let items = vec![
            ContactInput::new("a@x.com").company("Acme"),
            ContactInput::new("a@x.com").company("Other"),
            ContactInput::new("b@x.com").tag("vip"),
        ];

        contacts.import(owner, &items, DedupeStrategy::KeepFirst).await.unwrap();
        let before = store.find_by_owner_and_email(owner, "a@x.com").await.unwrap().unwrap();

        let second = contacts.import(owner, &items, DedupeStrategy::KeepFirst).await.unwrap();
        let after = store.find_by_owner_and_email(owner, "a@x.com").await.unwrap().unwrap();

        assert_eq!(second.imported, 0);
        assert_eq!(second.duplicates, 3);
        assert_eq!(before, after);
        assert_eq!(after.company.as_deref(), Some("Acme"));
        assert_eq!(store.contact_count().await, 2);
    }

    #[tokio::test]
    async fn test_merge_is_order_independent_on_disjoint_fields() {
        let a = ContactInput::new("m@x.com").phone("555-0100").tag("a");
        let b = ContactInput::new("M@x.com").company("Acme").tag("b");

        for items in [vec![a.clone(), b.clone()], vec![b.clone(), a.clone()]] {
            let store = MemoryStore::shared();
            let owner = Uuid::now_v7();
            service(&store).import(owner, &items, DedupeStrategy::Merge).await.unwrap();

            let stored = store.find_by_owner_and_email(owner, "m@x.com").await.unwrap().unwrap();
            assert_eq!(stored.phone.as_deref(), Some("555-0100"));
            assert_eq!(stored.company.as_deref(), Some("Acme"));
            assert_eq!(stored.tags.len(), 2);
        }
    }

    #[tokio::test]
    async fn test_storage_collision_uses_strategy() {
        let store = MemoryStore::shared();
        let contacts = service(&store);
        let owner = Uuid::now_v7();

        let existing = contacts
            .create_contact(owner, &ContactInput::new("a@x.com").first_name("Ada").company("Acme"))
            .await
            .unwrap();

        let result = contacts
            .import(owner, &[ContactInput::new("A@x.com").role("CTO")], DedupeStrategy::Merge)
            .await
            .unwrap();
        assert_eq!(result.duplicates, 1);
        assert_eq!(
            result.rows[0],
            RowOutcome::Duplicate { contact_id: existing.id, applied: true }
        );

        let stored = store.find_by_owner_and_email(owner, "a@x.com").await.unwrap().unwrap();
        assert_eq!(stored.id, existing.id);
        assert_eq!(stored.first_name.as_deref(), Some("Ada"));
        assert_eq!(stored.role.as_deref(), Some("CTO"));

        contacts
            .import(owner, &[ContactInput::new("a@x.com").role("CEO")], DedupeStrategy::KeepLast)
            .await
            .unwrap();
        let stored = store.find_by_owner_and_email(owner, "a@x.com").await.unwrap().unwrap();
        assert!(stored.first_name.is_none());
        assert_eq!(stored.role.as_deref(), Some("CEO"));
    }

    #[tokio::test]
    async fn test_create_contact_conflict() {
        let store = MemoryStore::shared();
        let contacts = service(&store);
        let owner = Uuid::now_v7();

        contacts.create_contact(owner, &ContactInput::new("a@x.com")).await.unwrap();

        let err = contacts.create_contact(owner, &ContactInput::new(" A@x.com")).await.unwrap_err();
        assert!(matches!(err, ContactError::Conflict(email) if email == "a@x.com"));

        let err = contacts.create_contact(owner, &ContactInput::new("bad")).await.unwrap_err();
        assert!(matches!(err, ContactError::Validation(_)));
    }

    #[tokio::test]
    async fn test_delete_contact_detaches_events() {
        let store = MemoryStore::shared();
        let contacts = service(&store);
        let owner = Uuid::now_v7();
        let list_id = Uuid::now_v7();
        let campaign_id = Uuid::now_v7();

        let contact = contacts.create_contact(owner, &ContactInput::new("a@x.com")).await.unwrap();
        store.add_members(list_id, &[contact.id]).await;
        store
            .append(vec![CampaignEvent::new(campaign_id, Some(contact.id), EventType::Sent)])
            .await
            .unwrap();

        contacts.delete_contact(owner, contact.id).await.unwrap();

        let events = store.list_for_campaign(campaign_id).await.unwrap();
        assert_eq!(events.len(), 1);
        assert!(events[0].contact_id.is_none());
        assert_eq!(store.count_distinct_members(&[list_id]).await.unwrap(), 0);

        let err = contacts.delete_contact(owner, contact.id).await.unwrap_err();
        assert!(matches!(err, ContactError::NotFound(_)));
    }
}
