use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

// 02-123-4567, 010-1234-5678, or a bare 10-11 digit run
static PHONE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{2,3}-\d{3,4}-\d{4}|\d{10,11})$").expect("valid phone regex"));
static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid email regex"));

pub const ORGANIZATION_NAME_MESSAGE: &str = "Please enter an organization name of at least 2 characters.";
pub const CONTACT_NAME_MESSAGE: &str = "Please enter a contact name of at least 2 characters.";
pub const PHONE_MESSAGE: &str = "Please enter a valid phone number (e.g. 010-1234-5678).";
pub const EMAIL_MESSAGE: &str = "Please enter a valid email address.";

/// Registration form fields as the page sends them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawRegistration {
    #[serde(alias = "organizationName", alias = "company_name")]
    pub company_name: Option<String>,
    #[serde(alias = "contact_name")]
    pub contact_name: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
}

/// A registration that passed every field check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationRecord {
    pub organization_name: String,
    pub contact_name: String,
    pub phone: String,
    pub email: Option<String>,
}

impl RegistrationRecord {
    /// Validates every field and builds the record, or returns one message
    /// per failing field.
    pub fn parse(raw: &RawRegistration) -> Result<Self, Vec<String>> {
        let mut errors = Vec::new();

        let organization_name = trimmed(&raw.company_name);
        if organization_name.chars().count() < 2 {
            errors.push(ORGANIZATION_NAME_MESSAGE.to_string());
        }

        let contact_name = trimmed(&raw.contact_name);
        if contact_name.chars().count() < 2 {
            errors.push(CONTACT_NAME_MESSAGE.to_string());
        }

        let phone = trimmed(&raw.phone);
        if !is_valid_phone(&phone) {
            errors.push(PHONE_MESSAGE.to_string());
        }

        let email = Some(trimmed(&raw.email)).filter(|e| !e.is_empty());
        if let Some(email) = &email {
            if !is_valid_email(email) {
                errors.push(EMAIL_MESSAGE.to_string());
            }
        }

        if !errors.is_empty() {
            return Err(errors);
        }
        Ok(Self {
            organization_name,
            contact_name,
            phone,
            email,
        })
    }

    /// Column layout of the `pre_registrations` table.
    pub fn to_row(&self) -> Value {
        json!({
            "company_name": self.organization_name,
            "contact_name": self.contact_name,
            "phone": self.phone,
            "email": self.email,
        })
    }
}

fn trimmed(value: &Option<String>) -> String {
    value.as_deref().map(str::trim).unwrap_or_default().to_string()
}

pub fn is_valid_phone(phone: &str) -> bool {
    if phone.is_empty() {
        return false;
    }
    let compact: String = phone.chars().filter(|c| !c.is_whitespace()).collect();
    PHONE_RE.is_match(&compact)
}

pub fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email)
}

/// A `pre_registrations` row as the database returns it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRegistration {
    #[serde(default)]
    pub id: Option<Value>,
    pub company_name: String,
    pub contact_name: String,
    pub phone: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}

/// Result of one submission attempt. Every variant maps to exactly one
/// message category on the page.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    Success { stored_record: StoredRegistration },
    ValidationFailed { messages: Vec<String> },
    ClientNotReady,
    AlreadyInProgress,
    RemoteError { code: String, message: String },
    TransportError { message: String },
}

impl Outcome {
    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Success { .. } => "success",
            Outcome::ValidationFailed { .. } => "validation_failed",
            Outcome::ClientNotReady => "client_not_ready",
            Outcome::AlreadyInProgress => "already_in_progress",
            Outcome::RemoteError { .. } => "remote_error",
            Outcome::TransportError { .. } => "transport_error",
        }
    }
}

/// A registration parked locally after a transport failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingRegistration {
    #[serde(flatten)]
    pub record: RegistrationRecord,
    pub timestamp: String,
    pub status: String,
}

impl PendingRegistration {
    pub fn new(record: RegistrationRecord) -> Self {
        Self {
            record,
            timestamp: chrono::Utc::now().to_rfc3339(),
            status: "pending_upload".to_string(),
        }
    }
}
