//! ---
//! culvert_section: "02-control-client"
//! culvert_subsection: "module"
//! culvert_type: "source"
//! culvert_scope: "code"
//! culvert_description: "Client-side orchestration over the Culvert control contract."
//! culvert_version: "v0.1.0"
//! culvert_owner: "tbd"
//! ---
//!
//! Everything a consumer needs to observe and mutate one supervised unit:
//! a typed transport ([`ControlClient`]), a polling status cache with
//! invalidation ([`StatusCache`]), a lifecycle action coordinator
//! ([`ActionCoordinator`]), a log stream session ([`LogSession`]) and a
//! configuration editor session ([`ConfigSession`]).
#![warn(missing_docs)]

pub mod actions;
pub mod cache;
pub mod client;
pub mod editor;
pub mod error;
pub mod stream;

pub use actions::{ActionCoordinator, InFlight};
pub use cache::{CacheInvalidator, StatusCache, StatusSnapshot, DEFAULT_POLL_INTERVAL};
pub use client::ControlClient;
pub use editor::{ConfigSession, DEFAULT_NOTICE_TTL};
pub use error::{ControlError, SaveError, TransportError};
pub use stream::{LogSession, StreamState};
