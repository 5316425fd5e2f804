//! Domain Layer - Core channel types and business rules.
//!
//! This layer contains the core domain types for the realtime channel
//! with no transport dependencies. All types here are pure Rust with
//! serialization support.

/// Challenge payloads and user-visible notification rules.
pub mod challenge;

/// Connection lifecycle state.
pub mod connection;

/// Events delivered to listeners, grouped by category.
pub mod event;

/// Price quotes, the latest-price book and flash direction.
pub mod quote;

/// Subscription tracking with per-consumer reference counting.
pub mod subscription;
