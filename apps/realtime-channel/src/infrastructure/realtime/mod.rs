//! Realtime Endpoint Adapter
//!
//! WebSocket client for the platform's realtime endpoint: wire types,
//! codec, session authentication, heartbeat, reconnect policy and the
//! connection task itself.

pub mod auth;
pub mod client;
pub mod codec;
pub mod context;
pub mod heartbeat;
pub mod messages;
pub mod reconnect;

pub use auth::{AuthError, SessionToken};
pub use client::{ClientCommand, RealtimeClient, RealtimeClientError};
pub use codec::{CodecError, JsonCodec};
pub use context::ChannelContext;
pub use reconnect::{ReconnectConfig, ReconnectPhase, ReconnectPolicy};
