//! Application Services
//!
//! - `RealtimeChannel`: the single shared realtime connection, its
//!   subscriptions and listeners
//! - `PriceFlashTracker`: up/down flash signals derived from price ticks

mod channel;
mod flash;

pub use channel::RealtimeChannel;
pub use flash::{DEFAULT_FLASH_WINDOW, PriceFlashTracker};
