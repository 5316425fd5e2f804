//! Challenge Events and Notifications
//!
//! Challenge accounts are owned by the backend; the channel only sees their
//! status changes and risk warnings. Some of those are surfaced to the user
//! immediately as non-blocking notifications:
//!
//! - `passed` status: success notification
//! - `failed` status: error notification carrying the failure reason
//! - daily / total loss warnings: warning notification
//!
//! Other statuses are forwarded to listeners without a notification.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// =============================================================================
// Challenge Status
// =============================================================================

/// Lifecycle status of a challenge account.
///
/// Unrecognised statuses keep their wire string in `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ChallengeStatus {
    /// Evaluation in progress.
    Active,
    /// All targets met.
    Passed,
    /// A risk rule was breached.
    Failed,
    /// Evaluation complete and account funded.
    Funded,
    /// Any status this client does not know about.
    Other(String),
}

impl ChallengeStatus {
    /// Wire representation.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Active => "active",
            Self::Passed => "passed",
            Self::Failed => "failed",
            Self::Funded => "funded",
            Self::Other(status) => status,
        }
    }
}

impl From<String> for ChallengeStatus {
    fn from(status: String) -> Self {
        match status.as_str() {
            "active" => Self::Active,
            "passed" => Self::Passed,
            "failed" => Self::Failed,
            "funded" => Self::Funded,
            _ => Self::Other(status),
        }
    }
}

impl From<ChallengeStatus> for String {
    fn from(status: ChallengeStatus) -> Self {
        match status {
            ChallengeStatus::Other(status) => status,
            known => known.as_str().to_string(),
        }
    }
}

impl std::fmt::Display for ChallengeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Challenge snapshot carried by a `challenge_status` message.
///
/// Fields this client does not interpret are preserved in `extra` so that
/// listeners receive the full payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChallengeSnapshot {
    /// Current status.
    pub status: ChallengeStatus,
    /// Machine-readable failure reason (e.g. `max_daily_loss`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    /// Remaining payload fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Payload of a `challenge_status` message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChallengeStatusUpdate {
    /// The updated challenge.
    pub challenge: ChallengeSnapshot,
    /// Fields sent next to `challenge` (account id, timestamps, ...).
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

// =============================================================================
// Challenge Warning
// =============================================================================

/// Risk limit a warning refers to.
///
/// Unrecognised kinds keep their wire string in `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum WarningKind {
    /// Daily loss limit approaching.
    DailyLoss,
    /// Total (max drawdown) loss limit approaching.
    TotalLoss,
    /// Any warning kind this client does not know about.
    Other(String),
}

impl WarningKind {
    /// Wire representation.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::DailyLoss => "daily_loss",
            Self::TotalLoss => "total_loss",
            Self::Other(kind) => kind,
        }
    }
}

impl From<String> for WarningKind {
    fn from(kind: String) -> Self {
        match kind.as_str() {
            "daily_loss" => Self::DailyLoss,
            "total_loss" => Self::TotalLoss,
            _ => Self::Other(kind),
        }
    }
}

impl From<WarningKind> for String {
    fn from(kind: WarningKind) -> Self {
        match kind {
            WarningKind::Other(kind) => kind,
            known => known.as_str().to_string(),
        }
    }
}

impl std::fmt::Display for WarningKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload of a `challenge_warning` message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChallengeWarning {
    /// Which limit is being approached.
    #[serde(rename = "type")]
    pub kind: WarningKind,
    /// Server-provided human readable message.
    #[serde(default)]
    pub message: String,
    /// Current loss amount.
    #[serde(default)]
    pub current: Option<Decimal>,
    /// Configured limit.
    #[serde(default)]
    pub limit: Option<Decimal>,
    /// Remaining payload fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

// =============================================================================
// Notifications
// =============================================================================

/// Severity of a user-visible notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationLevel {
    /// Positive outcome.
    Success,
    /// Informational.
    Info,
    /// Needs attention, not an error.
    Warning,
    /// Something went wrong for the user.
    Error,
}

impl NotificationLevel {
    /// Get the level name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }
}

/// A non-blocking, user-visible notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    /// Severity.
    pub level: NotificationLevel,
    /// Short title.
    pub title: String,
    /// Body text.
    pub message: String,
}

impl Notification {
    /// Create a notification.
    #[must_use]
    pub fn new(level: NotificationLevel, title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level,
            title: title.into(),
            message: message.into(),
        }
    }
}

/// Notification raised by a status change, if any.
#[must_use]
pub fn notification_for_status(update: &ChallengeStatusUpdate) -> Option<Notification> {
    match &update.challenge.status {
        ChallengeStatus::Passed => Some(Notification::new(
            NotificationLevel::Success,
            "Challenge passed",
            "Congratulations! You have passed your challenge.",
        )),
        ChallengeStatus::Failed => {
            let reason = update
                .challenge
                .failure_reason
                .as_deref()
                .map_or_else(|| "rule violation".to_string(), describe_failure_reason);
            Some(Notification::new(
                NotificationLevel::Error,
                "Challenge failed",
                format!("Your challenge has ended: {reason}."),
            ))
        }
        ChallengeStatus::Active | ChallengeStatus::Funded | ChallengeStatus::Other(_) => None,
    }
}

/// Notification raised by a risk warning.
#[must_use]
pub fn notification_for_warning(warning: &ChallengeWarning) -> Notification {
    let title = match &warning.kind {
        WarningKind::DailyLoss => "Daily loss warning",
        WarningKind::TotalLoss => "Total loss warning",
        WarningKind::Other(_) => "Risk warning",
    };

    let message = if !warning.message.trim().is_empty() {
        warning.message.clone()
    } else if let (Some(current), Some(limit)) = (warning.current, warning.limit) {
        format!("Current loss {current} is approaching the limit of {limit}")
    } else {
        "You are approaching a risk limit".to_string()
    };

    Notification::new(NotificationLevel::Warning, title, message)
}

/// Human readable text for a failure reason code.
#[must_use]
pub fn describe_failure_reason(reason: &str) -> String {
    match reason {
        "max_daily_loss" | "daily_loss" => "maximum daily loss limit exceeded".to_string(),
        "max_total_loss" | "total_loss" | "max_drawdown" => {
            "maximum total loss limit exceeded".to_string()
        }
        "min_trading_days" => "minimum trading days not met".to_string(),
        "time_limit" | "expired" => "time limit reached".to_string(),
        other => other.replace('_', " "),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn status_update(json: &str) -> ChallengeStatusUpdate {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn failed_status_keeps_full_payload() {
        let update = status_update(
            r#"{"challenge":{"status":"failed","failure_reason":"max_daily_loss","id":17,"balance":"9450.00"}}"#,
        );

        assert_eq!(update.challenge.status, ChallengeStatus::Failed);
        assert_eq!(update.challenge.failure_reason.as_deref(), Some("max_daily_loss"));
        assert_eq!(update.challenge.extra.get("id"), Some(&Value::from(17)));
        assert_eq!(
            update.challenge.extra.get("balance"),
            Some(&Value::from("9450.00"))
        );
    }

    #[test]
    fn unknown_status_keeps_wire_value() {
        let update = status_update(r#"{"challenge":{"status":"under_review"}}"#);

        assert_eq!(
            update.challenge.status,
            ChallengeStatus::Other("under_review".to_string())
        );
        assert!(notification_for_status(&update).is_none());
    }

    #[test]
    fn status_update_round_trips_unknown_fields() {
        let data = serde_json::json!({
            "account_id": 42,
            "challenge": {"status": "pending_review", "id": 9}
        });

        let update: ChallengeStatusUpdate = serde_json::from_value(data.clone()).unwrap();

        assert_eq!(update.challenge.status.as_str(), "pending_review");
        assert_eq!(update.extra.get("account_id"), Some(&Value::from(42)));
        assert_eq!(serde_json::to_value(&update).unwrap(), data);
    }

    #[test]
    fn unknown_warning_kind_keeps_wire_value() {
        let data = serde_json::json!({
            "type": "margin_call",
            "message": "Margin level below 50%",
            "account_id": 42
        });

        let warning: ChallengeWarning = serde_json::from_value(data).unwrap();

        assert_eq!(warning.kind, WarningKind::Other("margin_call".to_string()));
        assert_eq!(warning.extra.get("account_id"), Some(&Value::from(42)));
        assert_eq!(notification_for_warning(&warning).title, "Risk warning");

        let encoded = serde_json::to_value(&warning).unwrap();
        assert_eq!(encoded["type"], "margin_call");
        assert_eq!(encoded["account_id"], 42);
    }

    #[test]
    fn failed_status_notification() {
        let update = status_update(
            r#"{"challenge":{"status":"failed","failure_reason":"max_daily_loss"}}"#,
        );

        let notification = notification_for_status(&update).unwrap();

        assert_eq!(notification.level, NotificationLevel::Error);
        assert_eq!(notification.title, "Challenge failed");
        assert!(notification.message.contains("maximum daily loss limit exceeded"));
    }

    #[test]
    fn failed_without_reason() {
        let update = status_update(r#"{"challenge":{"status":"failed"}}"#);

        let notification = notification_for_status(&update).unwrap();

        assert!(notification.message.contains("rule violation"));
    }

    #[test]
    fn passed_status_notification() {
        let update = status_update(r#"{"challenge":{"status":"passed"}}"#);

        let notification = notification_for_status(&update).unwrap();

        assert_eq!(notification.level, NotificationLevel::Success);
        assert_eq!(notification.title, "Challenge passed");
    }

    #[test]
    fn active_status_no_notification() {
        let update = status_update(r#"{"challenge":{"status":"active"}}"#);

        assert!(notification_for_status(&update).is_none());
    }

    #[test]
    fn warning_uses_server_message() {
        let warning: ChallengeWarning = serde_json::from_str(
            r#"{"type":"daily_loss","message":"You have used 80% of your daily loss limit","current":400,"limit":500}"#,
        )
        .unwrap();

        let notification = notification_for_warning(&warning);

        assert_eq!(notification.level, NotificationLevel::Warning);
        assert_eq!(notification.title, "Daily loss warning");
        assert_eq!(notification.message, "You have used 80% of your daily loss limit");
    }

    #[test]
    fn warning_without_message_uses_amounts() {
        let warning: ChallengeWarning =
            serde_json::from_str(r#"{"type":"total_loss","current":"900","limit":"1000"}"#)
                .unwrap();

        let notification = notification_for_warning(&warning);

        assert_eq!(notification.title, "Total loss warning");
        assert_eq!(
            notification.message,
            "Current loss 900 is approaching the limit of 1000"
        );
    }

    #[test_case("max_daily_loss", "maximum daily loss limit exceeded")]
    #[test_case("max_total_loss", "maximum total loss limit exceeded")]
    #[test_case("max_drawdown", "maximum total loss limit exceeded")]
    #[test_case("min_trading_days", "minimum trading days not met")]
    #[test_case("news_trading_violation", "news trading violation")]
    fn failure_reason_descriptions(code: &str, expected: &str) {
        assert_eq!(describe_failure_reason(code), expected);
    }
}
