#![deny(unsafe_code)]

//! Conversation state for the BFF chat widget.
//!
//! [`ChatSession`] owns the message log and the single in-flight exchange; the terminal
//! driver in `main.rs` is one presentation layer built on top of it.

pub mod command;
/// Message log entries and the send lifecycle state machine.
pub mod message;
pub mod session;
/// Settings file and environment loading.
pub mod settings;

pub use command::Command;
pub use message::{
    ChatMessage, DraftMessage, MessageId, Role, SessionState, SessionTransition,
    SessionTransitionRejection,
};
pub use session::{ChatSession, SessionUpdate};
pub use settings::{Settings, SettingsError, SettingsResult};
