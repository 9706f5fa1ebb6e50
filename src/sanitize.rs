//! Validation and normalization of form input before it reaches the sheet.

use lazy_static::lazy_static;
use regex::Regex;

use crate::error::ContactError;
use crate::models::{ContactRequest, SubmissionRecord};

pub const MAX_FIELD_CHARS: usize = 500;
pub const MAX_EMAIL_CHARS: usize = 254;
pub const PLACEHOLDER: &str = "N/A";
pub const DEFAULT_KIND: &str = "Contact Form";

lazy_static! {
    static ref EMAIL_RE: Regex = Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").unwrap();
}

/// Trim, cap at [`MAX_FIELD_CHARS`] characters, then drop `<` and `>`.
pub fn sanitize(input: Option<&str>) -> String {
    let Some(input) = input else {
        return String::new();
    };

    input
        .trim()
        .chars()
        .take(MAX_FIELD_CHARS)
        .filter(|c| !matches!(c, '<' | '>'))
        .collect()
}

pub fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email) && email.chars().count() <= MAX_EMAIL_CHARS
}

fn or_placeholder(value: String, placeholder: &str) -> String {
    if value.is_empty() {
        placeholder.to_string()
    } else {
        value
    }
}

fn is_blank(value: Option<&str>) -> bool {
    value.map(str::trim).is_none_or(str::is_empty)
}

impl SubmissionRecord {
    /// Checks required fields and email shape, then sanitizes every field.
    pub fn from_request(req: &ContactRequest) -> Result<Self, ContactError> {
        let name = req.name.as_deref();
        let email = req.email.as_deref();

        if is_blank(name) || is_blank(email) {
            return Err(ContactError::Validation("Name and email are required"));
        }

        // checked as sent, surrounding whitespace is not a valid address
        let email = email.unwrap_or_default();
        if !is_valid_email(email) {
            return Err(ContactError::Validation("Invalid email format"));
        }

        Ok(Self {
            name: sanitize(name),
            email: sanitize(Some(email)),
            phone: or_placeholder(sanitize(req.phone.as_deref()), PLACEHOLDER),
            company: or_placeholder(sanitize(req.company.as_deref()), PLACEHOLDER),
            message: or_placeholder(sanitize(req.message.as_deref()), PLACEHOLDER),
            service: or_placeholder(sanitize(req.service.as_deref()), PLACEHOLDER),
            date: or_placeholder(sanitize(req.date.as_deref()), PLACEHOLDER),
            time: or_placeholder(sanitize(req.time.as_deref()), PLACEHOLDER),
            kind: or_placeholder(sanitize(req.kind.as_deref()), DEFAULT_KIND),
        })
    }
}
