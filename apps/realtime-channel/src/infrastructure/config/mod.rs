//! Configuration Module
//!
//! Configuration loading for the realtime channel and its binary.

mod settings;

pub use settings::{ChannelConfig, ConfigError, ServerSettings, WebSocketSettings};
