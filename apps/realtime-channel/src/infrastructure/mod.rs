//! Infrastructure Layer - Adapters and external integrations.
//!
//! This layer contains the concrete implementations of the port interfaces
//! defined in the application layer.

/// Realtime WebSocket client (codec, auth, heartbeat, reconnect).
pub mod realtime;

/// Category-keyed listener fan-out.
pub mod listeners;

/// Notifier adapters.
pub mod notify;

/// Configuration loading.
pub mod config;

/// Health check HTTP endpoint.
pub mod health;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// OpenTelemetry tracing integration.
pub mod telemetry;
