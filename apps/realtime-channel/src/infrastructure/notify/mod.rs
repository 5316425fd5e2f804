//! Notification Adapters
//!
//! `Notifier` implementations. The headless binary has no toast surface, so
//! notifications become structured log events at a level matching their
//! severity.

use crate::application::ports::Notifier;
use crate::domain::challenge::{Notification, NotificationLevel};

/// Notifier that writes every notification to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, notification: Notification) {
        let Notification {
            level,
            title,
            message,
        } = notification;

        match level {
            NotificationLevel::Success | NotificationLevel::Info => {
                tracing::info!(level = level.as_str(), %title, %message, "Notification");
            }
            NotificationLevel::Warning => {
                tracing::warn!(level = level.as_str(), %title, %message, "Notification");
            }
            NotificationLevel::Error => {
                tracing::error!(level = level.as_str(), %title, %message, "Notification");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notify_every_level() {
        let notifier = TracingNotifier;
        for level in [
            NotificationLevel::Success,
            NotificationLevel::Info,
            NotificationLevel::Warning,
            NotificationLevel::Error,
        ] {
            notifier.notify(Notification::new(level, "Title", "Body"));
        }
    }
}
