//! Authentication and session lifecycle.
//!
//! This module provides:
//! - `SessionManager`: the anonymous / demo / authenticated state machine,
//!   demo countdown and persistence
//! - `Session`: immutable snapshot handed to readers
//! - `SessionEvent`: notices emitted after each transition
//! - `CredentialStore`: OS keychain storage for remembered secrets
//!
//! Demo sessions last 10 minutes; remembered sessions survive restarts.

pub mod clock;
pub mod credentials;
pub mod error;
pub mod events;
pub mod manager;
pub mod session;

pub use clock::{Clock, SystemClock};
pub use credentials::CredentialStore;
pub use error::SessionError;
pub use events::{NoticeLevel, SessionEvent};
pub use manager::SessionManager;
pub use session::{Session, SessionMode};

pub use crate::config::SessionConfig;
