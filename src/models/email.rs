//! Outbound Email Models

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Header carrying the originating campaign on every outbound message
pub const CAMPAIGN_HEADER: &str = "X-Campaign-ID";

/// Email address with optional name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailAddress {
    /// Email address
    pub email: String,
    /// Display name (optional)
    pub name: Option<String>,
}

impl EmailAddress {
    pub fn new(email: &str) -> Self {
        Self {
            email: email.to_string(),
            name: None,
        }
    }

    pub fn with_name(email: &str, name: &str) -> Self {
        let name = name.trim();
        Self {
            email: email.to_string(),
            name: (!name.is_empty()).then(|| name.to_string()),
        }
    }

    pub fn formatted(&self) -> String {
        match &self.name {
            Some(name) => format!("{} <{}>", name, self.email),
            None => self.email.clone(),
        }
    }
}

/// A fully personalized message for exactly one recipient
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboundEmail {
    /// Unique identifier
    pub id: Uuid,
    /// Campaign this message belongs to
    pub campaign_id: Uuid,
    /// Recipient contact (absent for test sends)
    pub contact_id: Option<Uuid>,
    /// From address
    pub from: EmailAddress,
    /// Reply-to address
    pub reply_to: Option<EmailAddress>,
    /// Recipient
    pub to: EmailAddress,
    /// Subject line
    pub subject: String,
    /// HTML body
    pub html_body: String,
    /// Custom headers
    pub headers: HashMap<String, String>,
}

impl OutboundEmail {
    pub fn new(campaign_id: Uuid, from: EmailAddress, to: EmailAddress, subject: &str, html: &str) -> Self {
        let mut headers = HashMap::new();
        headers.insert(CAMPAIGN_HEADER.to_string(), campaign_id.to_string());

        Self {
            id: Uuid::now_v7(),
            campaign_id,
            contact_id: None,
            from,
            reply_to: None,
            to,
            subject: subject.to_string(),
            html_body: html.to_string(),
            headers,
        }
    }

    pub fn contact(mut self, contact_id: Uuid) -> Self {
        self.contact_id = Some(contact_id);
        self
    }

    pub fn reply_to(mut self, address: Option<EmailAddress>) -> Self {
        self.reply_to = address;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_email_address() {
        let addr = EmailAddress::new("test@example.com");
        assert_eq!(addr.formatted(), "test@example.com");

        let addr = EmailAddress::with_name("test@example.com", "Test User");
        assert_eq!(addr.formatted(), "Test User <test@example.com>");

        let addr = EmailAddress::with_name("test@example.com", "  ");
        assert!(addr.name.is_none());
    }

    #[test]
    fn test_outbound_carries_campaign_header() {
        let campaign_id = Uuid::now_v7();
        let email = OutboundEmail::new(
            campaign_id,
            EmailAddress::new("news@example.com"),
            EmailAddress::new("a@x.com"),
            "Hello",
            "<p>Hi</p>",
        );

        assert_eq!(email.headers[CAMPAIGN_HEADER], campaign_id.to_string());
        assert!(email.contact_id.is_none());
    }
}
