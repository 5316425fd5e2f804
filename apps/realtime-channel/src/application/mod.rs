//! Application Layer - Use cases and port definitions.
//!
//! This layer contains the realtime channel service and the port
//! interfaces it uses to reach the outside world.

/// Port interfaces for external collaborators (notifications).
pub mod ports;

/// Application services: the realtime channel and price flash tracking.
pub mod services;
