use serde::{Deserialize, Serialize};

// Contact / book-a-meeting form payload, as sent by the site
#[derive(Deserialize, Serialize, Clone, Debug, Default)]
pub struct ContactRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub company: Option<String>,
    pub message: Option<String>,
    pub service: Option<String>,
    pub date: Option<String>,
    pub time: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

/// A validated, sanitized submission ready to become a spreadsheet row.
///
/// Optional fields are already normalized to their placeholders.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct SubmissionRecord {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub company: String,
    pub message: String,
    pub service: String,
    pub date: String,
    pub time: String,
    #[serde(rename = "type")]
    pub kind: String,
}

// Success body
#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct MessageResponse {
    pub message: String,
}

// Failure body
#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct ErrorResponse {
    pub error: String,
}
