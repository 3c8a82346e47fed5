//! Contact Handler

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::handlers::error::{parse_id, ApiError};
use crate::models::{Contact, ContactInput, DedupeStrategy, ImportResult};
use crate::services::ContactService;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportRequest {
    pub contacts: Vec<ContactInput>,
    #[serde(default)]
    pub strategy: DedupeStrategy,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactResponse {
    pub id: String,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub company: Option<String>,
    pub role: Option<String>,
    pub phone: Option<String>,
    pub tags: Vec<String>,
    pub metadata: serde_json::Value,
    pub status: String,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Contact> for ContactResponse {
    fn from(c: Contact) -> Self {
        Self {
            id: c.id.to_string(),
            email: c.email,
            first_name: c.first_name,
            last_name: c.last_name,
            company: c.company,
            role: c.role,
            phone: c.phone,
            tags: c.tags.into_iter().collect(),
            metadata: serde_json::Value::Object(c.metadata.into_iter().collect()),
            status: c.status.to_string(),
            created_at: c.created_at.to_rfc3339(),
            updated_at: c.updated_at.to_rfc3339(),
        }
    }
}

/// Contact handler
pub struct ContactHandler {
    contacts: Arc<ContactService>,
}

impl ContactHandler {
    pub fn new(contacts: Arc<ContactService>) -> Self {
        Self { contacts }
    }

    /// Bulk import with deduplication. An empty batch imports nothing.
    pub async fn import(&self, owner_id: Uuid, request: ImportRequest) -> Result<ImportResult, ApiError> {
        Ok(self
            .contacts
            .import(owner_id, &request.contacts, request.strategy)
            .await?)
    }

    pub async fn create(&self, owner_id: Uuid, request: ContactInput) -> Result<ContactResponse, ApiError> {
        Ok(self.contacts.create_contact(owner_id, &request).await?.into())
    }

    pub async fn delete(&self, owner_id: Uuid, id: &str) -> Result<(), ApiError> {
        let id = parse_id("contact id", id)?;
        self.contacts.delete_contact(owner_id, id).await?;
        Ok(())
    }
}
