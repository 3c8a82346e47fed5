//! Personalization - recipient token substitution

use std::borrow::Cow;
use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::models::Contact;

static TOKEN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*([a-zA-Z_][a-zA-Z0-9_]*)\s*\}\}").expect("token regex is valid")
});

/// Recipient fields available to personalization tokens
pub trait TokenSource {
    fn token(&self, name: &str) -> Option<&str>;
}

impl TokenSource for Contact {
    fn token(&self, name: &str) -> Option<&str> {
        match name {
            "firstName" => self.first_name.as_deref(),
            "lastName" => self.last_name.as_deref(),
            "email" => Some(self.email.as_str()),
            "company" => self.company.as_deref(),
            _ => None,
        }
    }
}

/// Substitute `{{firstName}}`, `{{lastName}}`, `{{email}}` and `{{company}}`.
///
/// Unknown tokens and missing values render as an empty string.
pub fn render<'a>(template: &'a str, recipient: &impl TokenSource) -> Cow<'a, str> {
    TOKEN_RE.replace_all(template, |caps: &Captures| {
        recipient.token(&caps[1]).unwrap_or_default().to_string()
    })
}

/// Prepend a hidden preview line to an HTML body
pub fn with_preheader(html: &str, preheader: Option<&str>) -> String {
    match preheader.filter(|p| !p.trim().is_empty()) {
        Some(preheader) => format!(
            r#"<div style="display:none;max-height:0;overflow:hidden;">{}</div>{}"#,
            preheader, html
        ),
        None => html.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn contact() -> Contact {
        let mut contact = Contact::new(Uuid::now_v7(), "ada@example.com");
        contact.first_name = Some("Ada".to_string());
        contact.company = Some("Analytical Engines".to_string());
        contact
    }

    #[test]
    fn test_render_known_tokens() {
        let rendered = render("Hi {{firstName}} from {{ company }} <{{email}}>", &contact());
        assert_eq!(rendered, "Hi Ada from Analytical Engines <ada@example.com>");
    }

    #[test]
    fn test_missing_value_renders_empty() {
        let mut c = contact();
        c.first_name = None;
        assert_eq!(render("Hi {{firstName}}", &c), "Hi ");
        assert_eq!(render("{{lastName}}!", &c), "!");
    }

    #[test]
    fn test_unknown_token_renders_empty() {
        assert_eq!(render("Hi {{nickname}}.", &contact()), "Hi .");
    }

    #[test]
    fn test_untouched_without_tokens() {
        let rendered = render("Plain {subject} {{", &contact());
        assert!(matches!(rendered, Cow::Borrowed(_)));
        assert_eq!(rendered, "Plain {subject} {{");
    }

    #[test]
    fn test_preheader() {
        assert_eq!(with_preheader("<p>x</p>", None), "<p>x</p>");
        assert_eq!(with_preheader("<p>x</p>", Some("  ")), "<p>x</p>");
        assert!(with_preheader("<p>x</p>", Some("Preview")).starts_with("<div style=\"display:none"));
    }
}
