// Alert model types: the closed set of alert types, severities, per-type rule
// configuration and the alert event itself.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::core::sound::model::SoundType;

pub type AlertId = u64;

/// Kind of alert. Drives message templates and the base sound mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AlertType {
    Motion,
    Audio,
    Person,
    Animal,
    Inactivity,
    Intrusion,
    DangerousAnimal,
    SubjectMatch,
    System,
}

impl AlertType {
    /// Get the display name for this alert type
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Motion => "Motion",
            Self::Audio => "Sound",
            Self::Person => "Person",
            Self::Animal => "Animal",
            Self::Inactivity => "Inactivity",
            Self::Intrusion => "Intrusion",
            Self::DangerousAnimal => "Dangerous Animal",
            Self::SubjectMatch => "Recognized Subject",
            Self::System => "System",
        }
    }

    /// Get a description of what raises this alert
    pub fn description(&self) -> &'static str {
        match self {
            Self::Motion => "Alert when motion exceeds the configured sensitivity",
            Self::Audio => "Alert when sound level crosses the audio threshold",
            Self::Person => "Alert when a person is detected with enough confidence",
            Self::Animal => "Alert when an animal is detected with enough confidence",
            Self::Inactivity => "Alert when no activity has been seen for the configured timeout",
            Self::Intrusion => "Alert when more people are present than allowed, or an armed zone is entered",
            Self::DangerousAnimal => "Alert when a high or extreme danger animal is detected",
            Self::SubjectMatch => "Alert when a known subject is recognized",
            Self::System => "Alert for device and monitoring health problems",
        }
    }

    /// Sound played for a fresh alert of this type, before escalation raises it.
    pub fn base_sound(&self) -> SoundType {
        match self {
            Self::Person | Self::Animal | Self::SubjectMatch => SoundType::Chime,
            Self::Motion | Self::Audio | Self::System => SoundType::Notification,
            Self::Inactivity => SoundType::Warning,
            Self::Intrusion => SoundType::Alert,
            Self::DangerousAnimal => SoundType::Critical,
        }
    }

    /// Get all alert types
    pub fn all() -> &'static [AlertType] {
        &[
            Self::Motion,
            Self::Audio,
            Self::Person,
            Self::Animal,
            Self::Inactivity,
            Self::Intrusion,
            Self::DangerousAnimal,
            Self::SubjectMatch,
            Self::System,
        ]
    }
}

/// Ordered alert severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
    Emergency,
}

impl Severity {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Critical => "critical",
            Self::Emergency => "emergency",
        }
    }
}

/// Per-type rule configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRuleConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Per-type cooldown in seconds; falls back to the global cooldown when unset
    #[serde(default)]
    pub cooldown_seconds: Option<u64>,
}

fn default_enabled() -> bool {
    true
}

impl Default for AlertRuleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cooldown_seconds: None,
        }
    }
}

/// A classified alert. Immutable once created except for acknowledgment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertEvent {
    pub id: AlertId,
    #[serde(rename = "type")]
    pub alert_type: AlertType,
    pub severity: Severity,
    pub message: String,
    pub description: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub stream_id: Option<String>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    #[serde(default)]
    pub acknowledged: bool,
    #[serde(default)]
    pub acknowledged_at: Option<DateTime<Utc>>,
}

impl AlertEvent {
    /// Mark acknowledged. Returns false if it already was.
    pub fn acknowledge(&mut self, at: DateTime<Utc>) -> bool {
        if self.acknowledged {
            return false;
        }
        self.acknowledged = true;
        self.acknowledged_at = Some(at);
        true
    }

    /// Notification title, e.g. "Critical: Intrusion".
    pub fn title(&self) -> String {
        let severity = self.severity.label();
        let mut chars = severity.chars();
        let capitalized = match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
            None => String::new(),
        };
        format!("{}: {}", capitalized, self.alert_type.display_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_alert() -> AlertEvent {
        AlertEvent {
            id: 7,
            alert_type: AlertType::DangerousAnimal,
            severity: Severity::Emergency,
            message: "Dangerous animal detected".to_string(),
            description: "bear detected (extreme danger)".to_string(),
            timestamp: Utc::now(),
            stream_id: Some("backyard".to_string()),
            metadata: Map::new(),
            acknowledged: false,
            acknowledged_at: None,
        }
    }

    #[test]
    fn test_all_types_have_names() {
        for alert_type in AlertType::all() {
            assert!(!alert_type.display_name().is_empty());
            assert!(!alert_type.description().is_empty());
        }
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Info < Severity::Warning);
        assert!(Severity::Warning < Severity::Critical);
        assert!(Severity::Critical < Severity::Emergency);
    }

    #[test]
    fn test_type_serializes_kebab_case() {
        let json = serde_json::to_string(&AlertType::DangerousAnimal).unwrap();
        assert_eq!(json, "\"dangerous-animal\"");
        let parsed: AlertType = serde_json::from_str("\"subject-match\"").unwrap();
        assert_eq!(parsed, AlertType::SubjectMatch);
    }

    #[test]
    fn test_acknowledge_is_idempotent() {
        let mut alert = make_alert();
        let first = Utc::now();
        assert!(alert.acknowledge(first));
        assert!(!alert.acknowledge(first + chrono::Duration::seconds(5)));
        assert_eq!(alert.acknowledged_at, Some(first));
    }

    #[test]
    fn test_title() {
        assert_eq!(make_alert().title(), "Emergency: Dangerous Animal");
    }
}
