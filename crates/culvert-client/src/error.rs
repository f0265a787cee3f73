//! ---
//! culvert_section: "02-control-client"
//! culvert_subsection: "module"
//! culvert_type: "source"
//! culvert_scope: "code"
//! culvert_description: "Error taxonomy surfaced by the control-plane client."
//! culvert_version: "v0.1.0"
//! culvert_owner: "tbd"
//! ---
use culvert_proto::{ControlAction, LifecycleState};
use thiserror::Error;

/// The request never produced a decodable envelope.
///
/// A well-formed `success == false` envelope is deliberately *not* a
/// transport error; it comes back as an ordinary response and surfaces as
/// [`ControlError::Application`].
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection-level failure: refused, reset, timed out, TLS.
    #[error("request failed: {0}")]
    Network(#[source] reqwest::Error),
    /// Non-success HTTP status whose body is not an envelope; the message is
    /// synthesized from the status line.
    #[error("{0}")]
    Http(String),
    /// Success status with a body that does not decode as an envelope.
    #[error("malformed response body: {0}")]
    Decode(#[source] serde_json::Error),
    /// The base or derived endpoint URL is unusable.
    #[error("invalid endpoint url: {0}")]
    Url(String),
}

impl From<url::ParseError> for TransportError {
    fn from(err: url::ParseError) -> Self {
        TransportError::Url(err.to_string())
    }
}

/// A control operation failed, in transit or at the agent.
#[derive(Debug, Error)]
pub enum ControlError {
    /// The request never completed; see [`TransportError`].
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// The agent processed the request and rejected it; `message` is the
    /// user-facing text from the envelope.
    #[error("{message}")]
    Application {
        /// User-facing error text reported by the agent.
        message: String,
    },
    /// The lifecycle state machine forbids this action right now. Nothing
    /// was sent.
    #[error("cannot {action} while {state}")]
    NotPermitted {
        /// The rejected action.
        action: ControlAction,
        /// Effective lifecycle state at dispatch time.
        state: LifecycleState,
    },
}

impl ControlError {
    pub(crate) fn application(message: impl Into<String>) -> Self {
        ControlError::Application {
            message: message.into(),
        }
    }
}

/// Saving the configuration editor buffer failed.
#[derive(Debug, Error)]
pub enum SaveError {
    /// The buffer does not decode as a configuration document. Nothing was
    /// sent; the buffer is untouched.
    #[error("invalid JSON: {0}")]
    Invalid(#[source] serde_json::Error),
    /// The save was sent and failed; the buffer is untouched.
    #[error(transparent)]
    Control(#[from] ControlError),
}
