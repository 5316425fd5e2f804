//! Port Interfaces
//!
//! Contracts the channel depends on but does not implement. Infrastructure
//! adapters (or the embedding application) provide the implementations.
//!
//! ## Driven Ports (Outbound)
//!
//! - `Notifier`: raises user-visible, non-blocking notifications

use crate::domain::challenge::Notification;

/// Sink for user-visible notifications (toasts, banners, log lines).
///
/// Called synchronously from the connection task at message receipt time,
/// so implementations must not block.
#[cfg_attr(test, mockall::automock)]
pub trait Notifier: Send + Sync {
    /// Raise a notification. Fire-and-forget.
    fn notify(&self, notification: Notification);
}
