//! Request payload validation.
//!
//! Runs before anything reaches the store: trims fields and reports every
//! problem as a `(field, message)` pair instead of stopping at the first one.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

use crate::models::ContactInput;

pub const NAME_MAX_LENGTH: usize = 100;
pub const EMAIL_MAX_LENGTH: usize = 255;

fn email_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").expect("valid email regex")
    })
}

fn phone_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\+[1-9]\d{1,14}$").expect("valid phone regex"))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagPayload {
    pub text: String,
}

/// Wire payload for creating or updating a contact.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactCreateRequest {
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<TagPayload>,
}

impl ContactCreateRequest {
    /// Trim every field in place and collect all validation failures.
    pub fn validate(&mut self) -> Vec<ValidationError> {
        self.trim_fields();

        let mut errs = Vec::new();
        validate_name(&mut errs, "first_name", &self.first_name);
        validate_name(&mut errs, "last_name", &self.last_name);
        self.validate_email(&mut errs);
        self.validate_phone(&mut errs);
        self.validate_tags(&mut errs);
        errs
    }

    /// Convert into the store input. Call after `validate` returned no errors.
    pub fn into_input(self) -> ContactInput {
        ContactInput {
            first_name: self.first_name,
            last_name: self.last_name,
            email: self.email,
            phone: self.phone,
            tags: self.tags.into_iter().map(|t| t.text).collect(),
        }
    }

    fn trim_fields(&mut self) {
        self.first_name = self.first_name.trim().to_string();
        self.last_name = self.last_name.trim().to_string();
        self.email = self.email.trim().to_string();
        // Blank phone is the same as no phone
        self.phone = self
            .phone
            .take()
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty());
        for tag in &mut self.tags {
            tag.text = tag.text.trim().to_string();
        }
    }

    fn validate_email(&self, errs: &mut Vec<ValidationError>) {
        if self.email.is_empty() {
            errs.push(ValidationError::new("email", "required"));
        } else if self.email.len() > EMAIL_MAX_LENGTH || !email_regex().is_match(&self.email) {
            errs.push(ValidationError::new("email", "invalid email format"));
        }
    }

    fn validate_phone(&self, errs: &mut Vec<ValidationError>) {
        if let Some(ref phone) = self.phone {
            if !phone_regex().is_match(phone) {
                errs.push(ValidationError::new(
                    "phone",
                    "must be valid E.164 format (e.g. +919876543210)",
                ));
            }
        }
    }

    fn validate_tags(&self, errs: &mut Vec<ValidationError>) {
        for (i, tag) in self.tags.iter().enumerate() {
            if tag.text.is_empty() {
                errs.push(ValidationError::new(format!("tags[{}].text", i), "required"));
            }
        }
    }
}

fn validate_name(errs: &mut Vec<ValidationError>, field: &str, value: &str) {
    if value.is_empty() {
        errs.push(ValidationError::new(field, "required"));
    } else if value.chars().count() > NAME_MAX_LENGTH {
        errs.push(ValidationError::new(
            field,
            format!("max {} characters", NAME_MAX_LENGTH),
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> ContactCreateRequest {
        ContactCreateRequest {
            first_name: "John".to_string(),
            last_name: "Doe".to_string(),
            email: "john@codersgyan.com".to_string(),
            phone: None,
            tags: vec![],
        }
    }

    fn fields(errs: &[ValidationError]) -> Vec<&str> {
        errs.iter().map(|e| e.field.as_str()).collect()
    }

    #[test]
    fn test_valid_request() {
        let mut req = valid();
        assert!(req.validate().is_empty());
    }

    #[test]
    fn test_fields_are_trimmed() {
        let mut req = ContactCreateRequest {
            first_name: "  John ".to_string(),
            email: " john@codersgyan.com\n".to_string(),
            phone: Some("   ".to_string()),
            tags: vec![TagPayload {
                text: " vip ".to_string(),
            }],
            ..valid()
        };

        assert!(req.validate().is_empty());
        assert_eq!(req.first_name, "John");
        assert_eq!(req.email, "john@codersgyan.com");
        assert_eq!(req.phone, None);
        assert_eq!(req.tags[0].text, "vip");
    }

    #[test]
    fn test_missing_fields_all_reported() {
        let mut req = ContactCreateRequest::default();
        let errs = req.validate();
        assert_eq!(fields(&errs), vec!["first_name", "last_name", "email"]);
        assert!(errs.iter().all(|e| e.message == "required"));
    }

    #[test]
    fn test_name_too_long() {
        let mut req = ContactCreateRequest {
            last_name: "x".repeat(NAME_MAX_LENGTH + 1),
            ..valid()
        };
        let errs = req.validate();
        assert_eq!(fields(&errs), vec!["last_name"]);
        assert_eq!(errs[0].message, "max 100 characters");
    }

    #[test]
    fn test_invalid_email() {
        for email in ["plainaddress", "a@b", "a b@example.com", "@example.com"] {
            let mut req = ContactCreateRequest {
                email: email.to_string(),
                ..valid()
            };
            let errs = req.validate();
            assert_eq!(fields(&errs), vec!["email"], "email: {}", email);
        }
    }

    #[test]
    fn test_email_too_long() {
        let mut req = ContactCreateRequest {
            email: format!("{}@example.com", "a".repeat(EMAIL_MAX_LENGTH)),
            ..valid()
        };
        assert_eq!(fields(&req.validate()), vec!["email"]);
    }

    #[test]
    fn test_phone_must_be_e164() {
        let mut ok = ContactCreateRequest {
            phone: Some("+919876543210".to_string()),
            ..valid()
        };
        assert!(ok.validate().is_empty());

        for phone in ["9876543210", "+0123", "+1 555 123", "+1234567890123456"] {
            let mut req = ContactCreateRequest {
                phone: Some(phone.to_string()),
                ..valid()
            };
            assert_eq!(fields(&req.validate()), vec!["phone"], "phone: {}", phone);
        }
    }

    #[test]
    fn test_blank_tag_reported_with_index() {
        let mut req = ContactCreateRequest {
            tags: vec![
                TagPayload {
                    text: "ok".to_string(),
                },
                TagPayload {
                    text: "  ".to_string(),
                },
            ],
            ..valid()
        };
        assert_eq!(fields(&req.validate()), vec!["tags[1].text"]);
    }

    #[test]
    fn test_into_input() {
        let req = ContactCreateRequest {
            phone: Some("+15551234567".to_string()),
            tags: vec![TagPayload {
                text: "purchase:golang".to_string(),
            }],
            ..valid()
        };
        let input = req.into_input();
        assert_eq!(input.email, "john@codersgyan.com");
        assert_eq!(input.phone.as_deref(), Some("+15551234567"));
        assert_eq!(input.tags, vec!["purchase:golang"]);
    }

    #[test]
    fn test_request_deserializes_wire_format() {
        let req: ContactCreateRequest = serde_json::from_str(
            r#"{"first_name":"John","last_name":"Doe","email":"john@codersgyan.com",
                "tags":[{"text":"purchase:golang"},{"text":"subscribed:platform"}]}"#,
        )
        .unwrap();
        assert_eq!(req.tags.len(), 2);
        assert_eq!(req.phone, None);
    }
}
