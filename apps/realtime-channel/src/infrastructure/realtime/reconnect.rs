//! Reconnection Policy
//!
//! Bounded reconnection for the realtime WebSocket. The default budget is
//! five attempts one second apart; multiplier and jitter turn it into
//! exponential backoff when configured.
//!
//! The policy is a small state machine:
//!
//! ```text
//! Idle ──next_delay──► Retrying{1} ──► … ──► Retrying{max} ──next_delay──► Exhausted
//!   ▲                        │                                                │
//!   └──────── reset (transport opened, or explicit restart) ──────────────────┘
//! ```

use std::time::Duration;

use rand::Rng;

use crate::infrastructure::config::WebSocketSettings;

/// Configuration for reconnection behavior.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectConfig {
    /// Delay before the first reconnection attempt.
    pub initial_delay: Duration,
    /// Maximum delay between reconnection attempts.
    pub max_delay: Duration,
    /// Multiplier applied to the delay after each attempt (1.0 = fixed).
    pub multiplier: f64,
    /// Jitter factor as a fraction (e.g., 0.1 = ±10% randomization).
    pub jitter_factor: f64,
    /// Maximum number of reconnection attempts. Zero means no retries.
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 1.0,
            jitter_factor: 0.0,
            max_attempts: 5,
        }
    }
}

impl ReconnectConfig {
    /// Create a new configuration with custom values.
    #[must_use]
    pub const fn new(
        initial_delay: Duration,
        max_delay: Duration,
        multiplier: f64,
        jitter_factor: f64,
        max_attempts: u32,
    ) -> Self {
        Self {
            initial_delay,
            max_delay,
            multiplier,
            jitter_factor,
            max_attempts,
        }
    }

    /// Create configuration from `WebSocketSettings`.
    #[must_use]
    pub const fn from_websocket_settings(settings: &WebSocketSettings) -> Self {
        Self {
            initial_delay: settings.reconnect_delay_initial,
            max_delay: settings.reconnect_delay_max,
            multiplier: settings.reconnect_delay_multiplier,
            jitter_factor: settings.reconnect_jitter,
            max_attempts: settings.max_reconnect_attempts,
        }
    }

    /// Fixed-delay configuration with no jitter.
    #[must_use]
    pub const fn fixed(delay: Duration, max_attempts: u32) -> Self {
        Self {
            initial_delay: delay,
            max_delay: delay,
            multiplier: 1.0,
            jitter_factor: 0.0,
            max_attempts,
        }
    }
}

/// Where the policy is in its retry budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReconnectPhase {
    /// No failure since the last successful connection.
    #[default]
    Idle,
    /// Retrying; `attempt` is 1-based.
    Retrying {
        /// Attempt number of the delay most recently handed out.
        attempt: u32,
    },
    /// Budget spent; no further delays until `reset`.
    Exhausted,
}

/// Reconnection policy.
///
/// # Example
///
/// ```rust
/// use realtime_channel::infrastructure::realtime::reconnect::{
///     ReconnectConfig, ReconnectPhase, ReconnectPolicy,
/// };
/// use std::time::Duration;
///
/// let mut policy = ReconnectPolicy::new(ReconnectConfig::fixed(Duration::from_secs(1), 2));
///
/// assert_eq!(policy.next_delay(), Some(Duration::from_secs(1)));
/// assert_eq!(policy.next_delay(), Some(Duration::from_secs(1)));
/// assert_eq!(policy.next_delay(), None);
/// assert_eq!(policy.phase(), ReconnectPhase::Exhausted);
///
/// // Successful connection
/// policy.reset();
/// assert_eq!(policy.phase(), ReconnectPhase::Idle);
/// ```
#[derive(Debug)]
pub struct ReconnectPolicy {
    config: ReconnectConfig,
    current_delay: Duration,
    phase: ReconnectPhase,
}

impl ReconnectPolicy {
    /// Create a new reconnection policy.
    #[must_use]
    pub const fn new(config: ReconnectConfig) -> Self {
        let initial_delay = config.initial_delay;
        Self {
            config,
            current_delay: initial_delay,
            phase: ReconnectPhase::Idle,
        }
    }

    /// Get the configuration.
    #[must_use]
    pub const fn config(&self) -> &ReconnectConfig {
        &self.config
    }

    /// Get the next delay, advancing the phase.
    ///
    /// Returns `None` once the budget is exhausted.
    #[must_use]
    pub fn next_delay(&mut self) -> Option<Duration> {
        let attempt = match self.phase {
            ReconnectPhase::Exhausted => return None,
            ReconnectPhase::Idle => 1,
            ReconnectPhase::Retrying { attempt } => attempt.saturating_add(1),
        };

        if attempt > self.config.max_attempts {
            self.phase = ReconnectPhase::Exhausted;
            return None;
        }

        self.phase = ReconnectPhase::Retrying { attempt };

        let delay = self.apply_jitter(self.current_delay);
        self.current_delay = self.scaled_delay();

        Some(delay)
    }

    /// Reset after a successful connection.
    pub const fn reset(&mut self) {
        self.current_delay = self.config.initial_delay;
        self.phase = ReconnectPhase::Idle;
    }

    /// Get the current phase.
    #[must_use]
    pub const fn phase(&self) -> ReconnectPhase {
        self.phase
    }

    /// Number of delays handed out since the last reset.
    #[must_use]
    pub const fn attempt_count(&self) -> u32 {
        match self.phase {
            ReconnectPhase::Idle => 0,
            ReconnectPhase::Retrying { attempt } => attempt,
            ReconnectPhase::Exhausted => self.config.max_attempts,
        }
    }

    /// Check if another attempt is allowed.
    #[must_use]
    pub const fn should_retry(&self) -> bool {
        match self.phase {
            ReconnectPhase::Exhausted => false,
            ReconnectPhase::Idle => self.config.max_attempts > 0,
            ReconnectPhase::Retrying { attempt } => attempt < self.config.max_attempts,
        }
    }

    fn scaled_delay(&self) -> Duration {
        #[allow(clippy::cast_precision_loss)]
        let scaled = (self.current_delay.as_millis() as f64 * self.config.multiplier).round();
        let next_millis = if scaled.is_finite() && scaled > 0.0 {
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            {
                scaled as u128
            }
        } else {
            0
        };
        let capped = next_millis.min(self.config.max_delay.as_millis());
        Duration::from_millis(u64::try_from(capped).unwrap_or(u64::MAX))
    }

    fn apply_jitter(&self, duration: Duration) -> Duration {
        if self.config.jitter_factor <= 0.0 {
            return duration;
        }

        #[allow(clippy::cast_precision_loss)]
        let base_millis = duration.as_millis() as f64;
        let jitter_range = base_millis * self.config.jitter_factor;
        let mut rng = rand::rng();
        let jitter: f64 = rng.random_range(-jitter_range..=jitter_range);
        let adjusted_millis = (base_millis + jitter).max(1.0);

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let adjusted_u64 = adjusted_millis as u64;
        Duration::from_millis(adjusted_u64)
    }
}
