//! # PubSub Session Module
//!
//! Client for the Twitch PubSub websocket endpoint. One session keeps one
//! subscription to the bits-events topic alive for the process lifetime:
//! `LISTEN` handshake on connect, periodic `PING` keep-alive, and sequential
//! dispatch of decoded cheer events to a registered handler.
//!
//! Reconnect policy deliberately lives outside this module: a failed connect
//! or a dropped transport is surfaced to the owning process, which decides
//! whether to restart the session.

/// Wire protocol types for the PubSub endpoint.
pub mod model;
/// The long-lived subscription session.
pub mod session;

// --- Public API Re-exports ---
pub use model::BitsEvent;
pub use session::{CheerHandler, PubSubSession, SessionConfig, SessionError, SessionState};
