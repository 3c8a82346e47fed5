//! Contact Models

use std::collections::{BTreeSet, HashMap};
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^[a-z0-9!#$%&'*+/=?^_`{|}~.-]+@[a-z0-9](?:[a-z0-9-]{0,61}[a-z0-9])?(?:\.[a-z0-9](?:[a-z0-9-]{0,61}[a-z0-9])?)*\.[a-z]{2,63}$",
    )
    .expect("email regex is valid")
});

/// Trim and lower-case an email so it can be compared.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Validate a normalized email address.
///
/// Returns the reason when the address would not be deliverable.
pub fn validate_email(email: &str) -> Result<(), String> {
    if email.is_empty() {
        return Err("Email is required".to_string());
    }
    if email.len() > 254 {
        return Err("Email is longer than 254 characters".to_string());
    }
    if !EMAIL_RE.is_match(email) {
        return Err("Invalid email format".to_string());
    }

    let local = email.split('@').next().unwrap_or_default();
    if local.len() > 64 || local.starts_with('.') || local.ends_with('.') || local.contains("..") {
        return Err("Invalid email local part".to_string());
    }

    Ok(())
}

/// Contact validation status.
///
/// Import reports invalid and duplicate rows in its result instead of storing
/// them, so persisted contacts are `Valid`. The other values exist for stores
/// that keep rejected rows around.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ContactStatus {
    #[default]
    Valid,
    Invalid,
    Duplicate,
}

impl std::fmt::Display for ContactStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Valid => write!(f, "valid"),
            Self::Invalid => write!(f, "invalid"),
            Self::Duplicate => write!(f, "duplicate"),
        }
    }
}

/// A recipient owned by exactly one user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    pub id: Uuid,
    pub owner_id: Uuid,
    /// Always stored normalized; unique per owner
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub company: Option<String>,
    pub role: Option<String>,
    pub phone: Option<String>,
    pub tags: BTreeSet<String>,
    pub metadata: HashMap<String, serde_json::Value>,
    /// `Valid` for every contact this crate stores
    pub status: ContactStatus,
    /// Empty unless `status` is `Invalid`
    pub validation_errors: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Contact {
    pub fn new(owner_id: Uuid, email: &str) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            owner_id,
            email: normalize_email(email),
            first_name: None,
            last_name: None,
            company: None,
            role: None,
            phone: None,
            tags: BTreeSet::new(),
            metadata: HashMap::new(),
            status: ContactStatus::Valid,
            validation_errors: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Build a new contact from an import row. The email must already be normalized.
    pub fn from_input(owner_id: Uuid, email: &str, input: &ContactInput) -> Self {
        let mut contact = Self::new(owner_id, email);
        contact.overwrite(input);
        contact.updated_at = contact.created_at;
        contact
    }

    /// Replace every mutable field with the input's values.
    pub fn overwrite(&mut self, input: &ContactInput) {
        self.first_name = non_empty(&input.first_name);
        self.last_name = non_empty(&input.last_name);
        self.company = non_empty(&input.company);
        self.role = non_empty(&input.role);
        self.phone = non_empty(&input.phone);
        self.tags = clean_tags(&input.tags);
        self.metadata = input.metadata.clone();
        self.updated_at = Utc::now();
    }

    /// Field-wise union: present scalars win, tags union, metadata keys from the input win.
    pub fn merge(&mut self, input: &ContactInput) {
        merge_field(&mut self.first_name, &input.first_name);
        merge_field(&mut self.last_name, &input.last_name);
        merge_field(&mut self.company, &input.company);
        merge_field(&mut self.role, &input.role);
        merge_field(&mut self.phone, &input.phone);
        self.tags.extend(clean_tags(&input.tags));
        for (key, value) in &input.metadata {
            self.metadata.insert(key.clone(), value.clone());
        }
        self.updated_at = Utc::now();
    }

    pub fn full_name(&self) -> Option<String> {
        match (&self.first_name, &self.last_name) {
            (Some(first), Some(last)) => Some(format!("{} {}", first, last)),
            (Some(first), None) => Some(first.clone()),
            (None, Some(last)) => Some(last.clone()),
            (None, None) => None,
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn merge_field(current: &mut Option<String>, incoming: &Option<String>) {
    if let Some(value) = non_empty(incoming) {
        *current = Some(value);
    }
}

fn clean_tags(tags: &[String]) -> BTreeSet<String> {
    tags.iter()
        .map(|t| t.trim())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// One incoming contact record (import row or single create)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ContactInput {
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub company: Option<String>,
    pub role: Option<String>,
    pub phone: Option<String>,
    pub tags: Vec<String>,
    pub metadata: HashMap<String, serde_json::Value>,
}

impl ContactInput {
    pub fn new(email: &str) -> Self {
        Self {
            email: Some(email.to_string()),
            ..Default::default()
        }
    }

    pub fn first_name(mut self, name: &str) -> Self {
        self.first_name = Some(name.to_string());
        self
    }

    pub fn last_name(mut self, name: &str) -> Self {
        self.last_name = Some(name.to_string());
        self
    }

    pub fn company(mut self, company: &str) -> Self {
        self.company = Some(company.to_string());
        self
    }

    pub fn role(mut self, role: &str) -> Self {
        self.role = Some(role.to_string());
        self
    }

    pub fn phone(mut self, phone: &str) -> Self {
        self.phone = Some(phone.to_string());
        self
    }

    pub fn tag(mut self, tag: &str) -> Self {
        self.tags.push(tag.to_string());
        self
    }

    pub fn meta(mut self, key: &str, value: serde_json::Value) -> Self {
        self.metadata.insert(key.to_string(), value);
        self
    }
}

/// Named grouping of contacts
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactList {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub tags: BTreeSet<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ContactList {
    pub fn new(owner_id: Uuid, name: &str) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            owner_id,
            name: name.to_string(),
            description: None,
            tags: BTreeSet::new(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// List membership row, unique per (list, contact)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactListMember {
    pub list_id: Uuid,
    pub contact_id: Uuid,
    pub added_at: DateTime<Utc>,
}

/// How colliding emails are resolved during import
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum DedupeStrategy {
    /// The first-seen record wins unchanged
    #[default]
    KeepFirst,
    /// The last-seen record overwrites every mutable field
    KeepLast,
    /// Field-wise union of all records
    Merge,
}

impl std::fmt::Display for DedupeStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::KeepFirst => write!(f, "keepFirst"),
            Self::KeepLast => write!(f, "keepLast"),
            Self::Merge => write!(f, "merge"),
        }
    }
}

/// Per-row import outcome
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "outcome")]
pub enum RowOutcome {
    /// A new contact was created from this row
    Imported { contact_id: Uuid },
    /// Row collided with an earlier row or a stored contact
    Duplicate { contact_id: Uuid, applied: bool },
    /// Row failed validation
    Invalid { reason: String },
}

/// Validation failure for one import row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportRowError {
    pub row: usize,
    pub email: String,
    pub reason: String,
}

/// Result of a bulk import
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportResult {
    pub imported: usize,
    pub skipped: usize,
    pub duplicates: usize,
    pub errors: Vec<ImportRowError>,
    /// One entry per input row, in input order
    pub rows: Vec<RowOutcome>,
}

impl ImportResult {
    pub fn total(&self) -> usize {
        self.imported + self.skipped + self.duplicates
    }

    /// Distinct contacts touched by the import, in first-seen order
    pub fn contact_ids(&self) -> Vec<Uuid> {
        let mut seen = std::collections::HashSet::new();
        self.rows
            .iter()
            .filter_map(|row| match row {
                RowOutcome::Imported { contact_id } | RowOutcome::Duplicate { contact_id, .. } => Some(*contact_id),
                RowOutcome::Invalid { .. } => None,
            })
            .filter(|id| seen.insert(*id))
            .collect()
    }
}
