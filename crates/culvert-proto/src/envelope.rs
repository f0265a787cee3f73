//! ---
//! culvert_section: "01-wire-contract"
//! culvert_subsection: "module"
//! culvert_type: "source"
//! culvert_scope: "code"
//! culvert_description: "Uniform response envelope wrapping every control endpoint."
//! culvert_version: "v0.1.0"
//! culvert_owner: "tbd"
//! ---
use serde::{Deserialize, Serialize};

/// Envelope wrapped around every REST response the agent emits.
///
/// `success == false` means the request reached the agent but the operation
/// failed; `data` is then absent and `error` carries the user-facing text.
/// Clients treat such a body as a normal, decodable result rather than a
/// transport failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    /// Whether the operation succeeded.
    pub success: bool,
    /// Optional human-readable note accompanying a success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Payload for data-bearing endpoints.
    #[serde(default = "Option::default", skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    /// User-facing description of a failed operation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    /// Successful response carrying a payload.
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            message: None,
            data: Some(data),
            error: None,
        }
    }

    /// Successful response carrying only a note, no payload.
    pub fn ok_message(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            data: None,
            error: None,
        }
    }

    /// Failed response carrying the user-facing error text.
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            message: None,
            data: None,
            error: Some(error.into()),
        }
    }

    /// Error text of a failed envelope, with a stable fallback when the
    /// agent omitted it.
    pub fn error_text(&self) -> &str {
        self.error.as_deref().unwrap_or("operation failed")
    }
}
