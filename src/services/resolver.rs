//! Recipient Resolver - contact lists to a unique audience

use std::collections::HashSet;
use std::sync::Arc;

use tracing::debug;
use uuid::Uuid;

use crate::models::Contact;
use crate::services::store::{ContactListStore, ContactStore, StoreError};

pub struct RecipientResolver {
    contacts: Arc<dyn ContactStore>,
    lists: Arc<dyn ContactListStore>,
}

impl RecipientResolver {
    pub fn new(contacts: Arc<dyn ContactStore>, lists: Arc<dyn ContactListStore>) -> Self {
        Self { contacts, lists }
    }

    /// Contacts belonging to any of the lists, each exactly once.
    ///
    /// An empty selection is an empty audience.
    pub async fn resolve(&self, list_ids: &[Uuid]) -> Result<Vec<Contact>, StoreError> {
        if list_ids.is_empty() {
            return Ok(Vec::new());
        }

        let members = self.lists.find_members_by_list_ids(list_ids).await?;
        let mut seen = HashSet::with_capacity(members.len());
        let contact_ids: Vec<Uuid> = members
            .into_iter()
            .map(|m| m.contact_id)
            .filter(|id| seen.insert(*id))
            .collect();

        let contacts = self.contacts.find_by_ids(&contact_ids).await?;

        debug!(
            lists = list_ids.len(),
            members = contact_ids.len(),
            recipients = contacts.len(),
            "Resolved recipients"
        );

        Ok(contacts)
    }

    /// Audience size without loading contacts
    pub async fn count(&self, list_ids: &[Uuid]) -> Result<u64, StoreError> {
        if list_ids.is_empty() {
            return Ok(0);
        }
        self.lists.count_distinct_members(list_ids).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ContactInput, DedupeStrategy, RowOutcome};
    use crate::services::contacts::ContactService;
    use crate::services::store::MemoryStore;

    async fn seed(store: &Arc<MemoryStore>, emails: &[&str]) -> Vec<Uuid> {
        let contacts = ContactService::new(store.clone(), store.clone(), store.clone());
        let items: Vec<ContactInput> = emails.iter().map(|e| ContactInput::new(e)).collect();
        let result = contacts
            .import(Uuid::now_v7(), &items, DedupeStrategy::KeepFirst)
            .await
            .unwrap();

        result
            .rows
            .iter()
            .map(|row| match row {
                RowOutcome::Imported { contact_id } => *contact_id,
                other => panic!("unexpected row {:?}", other),
            })
            .collect()
    }

    #[tokio::test]
    async fn test_contact_in_two_lists_resolves_once() {
        let store = MemoryStore::shared();
        let resolver = RecipientResolver::new(store.clone(), store.clone());
        let ids = seed(&store, &["c1@x.com"]).await;
        let (list1, list2) = (Uuid::now_v7(), Uuid::now_v7());

        store.add_members(list1, &ids).await;
        store.add_members(list2, &ids).await;

        let resolved = resolver.resolve(&[list1, list2]).await.unwrap();
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].id, ids[0]);
        assert_eq!(resolver.count(&[list1, list2]).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_empty_selection_is_empty() {
        let store = MemoryStore::shared();
        let resolver = RecipientResolver::new(store.clone(), store.clone());
        let ids = seed(&store, &["a@x.com", "b@x.com"]).await;
        store.add_members(Uuid::now_v7(), &ids).await;

        assert!(resolver.resolve(&[]).await.unwrap().is_empty());
        assert_eq!(resolver.count(&[]).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_count_matches_resolve() {
        let store = MemoryStore::shared();
        let resolver = RecipientResolver::new(store.clone(), store.clone());
        let ids = seed(&store, &["a@x.com", "b@x.com", "c@x.com", "d@x.com"]).await;
        let (l1, l2, l3) = (Uuid::now_v7(), Uuid::now_v7(), Uuid::now_v7());

        store.add_members(l1, &ids[..2]).await;
        store.add_members(l2, &ids[1..]).await;
        // Membership pointing at no stored contact
        store.add_members(l2, &[Uuid::now_v7()]).await;

        for selection in [vec![l1], vec![l2], vec![l1, l2], vec![l1, l2, l3], vec![l3], vec![]] {
            let resolved = resolver.resolve(&selection).await.unwrap();
            let count = resolver.count(&selection).await.unwrap();
            assert_eq!(count as usize, resolved.len(), "selection {:?}", selection);
        }
    }
}
