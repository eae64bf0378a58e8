// Alert evaluator - classifies raw signals through the triggers and applies
// per-type cooldowns.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::model::{AlertEvent, AlertId, AlertRuleConfig, AlertType};
use super::triggers::{distress_pattern, evaluate_trigger, Classification, Signal, TriggerContext};
use crate::core::cooldown::CooldownTable;

const DEFAULT_MOTION_SENSITIVITY: f64 = 50.0;
const DEFAULT_INACTIVITY_MINUTES: f64 = 30.0;

/// Detection thresholds - persisted in settings.json, pulled fresh on every evaluation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    /// Motion sensitivity 0-100; the firing level is sensitivity / 100
    pub motion_sensitivity: f64,
    /// Audio level (0-1) at or above which a sound alert fires
    pub audio_threshold: f64,
    /// Minimum person detector confidence (0-1)
    pub person_confidence: f64,
    /// Minimum animal detector confidence (0-1)
    pub animal_confidence: f64,
    /// More people than this raises an intrusion; None disables the limit
    pub max_allowed_persons: Option<u32>,
    /// Minutes without activity before an inactivity alert
    pub inactivity_timeout_minutes: f64,
    /// Global cooldown between alerts of the same type
    pub cooldown_seconds: u64,
    /// Per-type overrides (enabled, cooldown)
    pub rules: HashMap<AlertType, AlertRuleConfig>,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            motion_sensitivity: DEFAULT_MOTION_SENSITIVITY,
            audio_threshold: 0.6,
            person_confidence: 0.6,
            animal_confidence: 0.6,
            max_allowed_persons: None,
            inactivity_timeout_minutes: DEFAULT_INACTIVITY_MINUTES,
            cooldown_seconds: 30,
            rules: HashMap::new(),
        }
    }
}

impl Thresholds {
    /// Motion level at which alerts start. Sensitivity is clamped to 1..=100
    /// so the ratio stays finite.
    pub fn motion_threshold(&self) -> f64 {
        let sensitivity = if self.motion_sensitivity.is_nan() {
            DEFAULT_MOTION_SENSITIVITY
        } else {
            self.motion_sensitivity.clamp(1.0, 100.0)
        };
        sensitivity / 100.0
    }

    /// Inactivity timeout in minutes. NaN falls back to the default and
    /// negative values count as zero.
    pub fn inactivity_timeout(&self) -> f64 {
        if self.inactivity_timeout_minutes.is_nan() {
            DEFAULT_INACTIVITY_MINUTES
        } else {
            self.inactivity_timeout_minutes.max(0.0)
        }
    }

    /// Check if a specific alert type is enabled (types without a rule are)
    pub fn is_enabled(&self, alert_type: AlertType) -> bool {
        self.rules.get(&alert_type).map(|r| r.enabled).unwrap_or(true)
    }

    /// Get the cooldown for a specific alert type
    pub fn get_cooldown(&self, alert_type: AlertType) -> Duration {
        let secs = self
            .rules
            .get(&alert_type)
            .and_then(|r| r.cooldown_seconds)
            .unwrap_or(self.cooldown_seconds);
        Duration::from_secs(secs)
    }
}

/// Outcome of evaluating one signal.
#[derive(Debug, Clone, PartialEq)]
pub enum Evaluation {
    /// A new, unsuppressed alert.
    Alert(AlertEvent),
    /// The signal qualified but its type is still cooling down.
    Suppressed(AlertType),
    /// Below threshold, or the type is disabled.
    NoAlert,
}

impl Evaluation {
    pub fn alert(&self) -> Option<&AlertEvent> {
        match self {
            Self::Alert(alert) => Some(alert),
            _ => None,
        }
    }

    pub fn is_suppressed(&self) -> bool {
        matches!(self, Self::Suppressed(_))
    }
}

/// Alert evaluator state
pub struct AlertEvaluator {
    /// Cooldown tracking: last accepted alert per type
    cooldowns: CooldownTable<AlertType>,
    distress_pattern: Regex,
    next_id: AlertId,
}

impl AlertEvaluator {
    pub fn new() -> Self {
        Self {
            cooldowns: CooldownTable::new(),
            distress_pattern: distress_pattern(),
            next_id: 1,
        }
    }

    /// Classify a signal and apply the cooldown of the resulting alert type.
    ///
    /// `now` is the monotonic clock used for cooldowns, `timestamp` the wall
    /// time stamped on the alert.
    pub fn evaluate(
        &mut self,
        signal: &Signal,
        thresholds: &Thresholds,
        now: Duration,
        timestamp: DateTime<Utc>,
    ) -> Evaluation {
        let ctx = TriggerContext {
            thresholds,
            distress_pattern: &self.distress_pattern,
        };

        let classification = match evaluate_trigger(signal, &ctx) {
            Some(classification) => classification,
            None => return Evaluation::NoAlert,
        };

        let alert_type = classification.alert_type;
        if !thresholds.is_enabled(alert_type) {
            log::debug!("{:?} alert dropped: type disabled", alert_type);
            return Evaluation::NoAlert;
        }

        // Per-type cooldown to prevent spam
        let window = thresholds.get_cooldown(alert_type);
        if !self.cooldowns.try_fire(alert_type, now, window) {
            log::debug!("{:?} alert suppressed by {:?} cooldown", alert_type, window);
            return Evaluation::Suppressed(alert_type);
        }

        let stream_id = signal.stream_id().map(str::to_string);
        Evaluation::Alert(self.issue(classification, stream_id, timestamp))
    }

    /// Turn a classification into an alert with a fresh id, bypassing cooldowns.
    /// Used for alerts raised outside the signal path (arming triggers).
    pub fn issue(
        &mut self,
        classification: Classification,
        stream_id: Option<String>,
        timestamp: DateTime<Utc>,
    ) -> AlertEvent {
        let id = self.next_id;
        self.next_id += 1;
        AlertEvent {
            id,
            alert_type: classification.alert_type,
            severity: classification.severity,
            message: classification.message,
            description: classification.description,
            timestamp,
            stream_id,
            metadata: classification.metadata,
            acknowledged: false,
            acknowledged_at: None,
        }
    }

    pub fn last_fired(&self, alert_type: AlertType) -> Option<Duration> {
        self.cooldowns.last_fired(&alert_type)
    }

    pub fn reset_cooldowns(&mut self) {
        self.cooldowns.clear();
    }
}

impl Default for AlertEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::alerts::model::Severity;
    use crate::core::alerts::triggers::{AudioSignal, MotionSignal, PersonSignal};

    fn motion(level: f64) -> Signal {
        Signal::Motion(MotionSignal {
            level,
            stream_id: Some("nursery".to_string()),
        })
    }

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    #[test]
    fn test_evaluator_fires_motion_alert() {
        let mut evaluator = AlertEvaluator::new();
        let thresholds = Thresholds::default();

        let result = evaluator.evaluate(&motion(1.1), &thresholds, secs(0), Utc::now());
        let alert = result.alert().unwrap();
        assert_eq!(alert.alert_type, AlertType::Motion);
        assert_eq!(alert.severity, Severity::Emergency);
        assert_eq!(alert.stream_id.as_deref(), Some("nursery"));
        assert!(!alert.acknowledged);
    }

    #[test]
    fn test_evaluator_cooldown_respected() {
        let mut evaluator = AlertEvaluator::new();
        let thresholds = Thresholds {
            cooldown_seconds: 30,
            ..Thresholds::default()
        };

        assert!(evaluator.evaluate(&motion(0.9), &thresholds, secs(0), Utc::now()).alert().is_some());
        for t in [1, 10, 29] {
            let result = evaluator.evaluate(&motion(0.9), &thresholds, secs(t), Utc::now());
            assert_eq!(result, Evaluation::Suppressed(AlertType::Motion));
        }
        assert!(evaluator.evaluate(&motion(0.9), &thresholds, secs(30), Utc::now()).alert().is_some());
    }

    #[test]
    fn test_cooldowns_are_per_type() {
        let mut evaluator = AlertEvaluator::new();
        let thresholds = Thresholds::default();

        let audio = Signal::Audio(AudioSignal {
            level: 0.9,
            pattern: None,
            stream_id: None,
        });

        assert!(evaluator.evaluate(&motion(0.9), &thresholds, secs(0), Utc::now()).alert().is_some());
        assert!(evaluator.evaluate(&audio, &thresholds, secs(1), Utc::now()).alert().is_some());
    }

    #[test]
    fn test_below_threshold_does_not_start_cooldown() {
        let mut evaluator = AlertEvaluator::new();
        let thresholds = Thresholds::default();

        assert_eq!(
            evaluator.evaluate(&motion(0.1), &thresholds, secs(0), Utc::now()),
            Evaluation::NoAlert
        );
        assert!(evaluator.last_fired(AlertType::Motion).is_none());
        assert!(evaluator.evaluate(&motion(0.9), &thresholds, secs(1), Utc::now()).alert().is_some());
    }

    #[test]
    fn test_disabled_rule_skipped() {
        let mut evaluator = AlertEvaluator::new();
        let mut thresholds = Thresholds::default();
        thresholds.rules.insert(
            AlertType::Motion,
            AlertRuleConfig {
                enabled: false,
                cooldown_seconds: None,
            },
        );

        let result = evaluator.evaluate(&motion(1.5), &thresholds, secs(0), Utc::now());
        assert_eq!(result, Evaluation::NoAlert, "Disabled type should not fire");
    }

    #[test]
    fn test_per_type_cooldown_override() {
        let mut evaluator = AlertEvaluator::new();
        let mut thresholds = Thresholds {
            cooldown_seconds: 60,
            ..Thresholds::default()
        };
        thresholds.rules.insert(
            AlertType::Motion,
            AlertRuleConfig {
                enabled: true,
                cooldown_seconds: Some(5),
            },
        );

        evaluator.evaluate(&motion(0.9), &thresholds, secs(0), Utc::now());
        assert!(evaluator.evaluate(&motion(0.9), &thresholds, secs(5), Utc::now()).alert().is_some());
    }

    #[test]
    fn test_thresholds_change_between_calls() {
        let mut evaluator = AlertEvaluator::new();
        let strict = Thresholds {
            motion_sensitivity: 90.0,
            ..Thresholds::default()
        };
        let loose = Thresholds {
            motion_sensitivity: 10.0,
            ..Thresholds::default()
        };

        assert_eq!(
            evaluator.evaluate(&motion(0.5), &strict, secs(0), Utc::now()),
            Evaluation::NoAlert
        );
        assert!(evaluator.evaluate(&motion(0.5), &loose, secs(1), Utc::now()).alert().is_some());
    }

    #[test]
    fn test_intrusion_and_person_cool_down_separately() {
        let mut evaluator = AlertEvaluator::new();
        let thresholds = Thresholds {
            max_allowed_persons: Some(1),
            ..Thresholds::default()
        };
        let people = |count| {
            Signal::Person(PersonSignal {
                count,
                confidence: 0.9,
                stream_id: None,
            })
        };

        let person = evaluator.evaluate(&people(1), &thresholds, secs(0), Utc::now());
        assert_eq!(person.alert().unwrap().alert_type, AlertType::Person);

        let intrusion = evaluator.evaluate(&people(2), &thresholds, secs(1), Utc::now());
        assert_eq!(intrusion.alert().unwrap().alert_type, AlertType::Intrusion);
    }

    #[test]
    fn test_ids_are_unique() {
        let mut evaluator = AlertEvaluator::new();
        let thresholds = Thresholds {
            cooldown_seconds: 0,
            ..Thresholds::default()
        };

        let a = evaluator.evaluate(&motion(0.9), &thresholds, secs(0), Utc::now());
        let b = evaluator.evaluate(&motion(0.9), &thresholds, secs(1), Utc::now());
        assert_ne!(a.alert().unwrap().id, b.alert().unwrap().id);
    }

    #[test]
    fn test_sensitivity_clamped() {
        let thresholds = Thresholds {
            motion_sensitivity: 0.0,
            ..Thresholds::default()
        };
        assert_eq!(thresholds.motion_threshold(), 0.01);

        let thresholds = Thresholds {
            motion_sensitivity: 250.0,
            ..Thresholds::default()
        };
        assert_eq!(thresholds.motion_threshold(), 1.0);
    }

    #[test]
    fn test_inactivity_timeout_sanitized() {
        let timeout = |minutes: f64| {
            Thresholds {
                inactivity_timeout_minutes: minutes,
                ..Thresholds::default()
            }
            .inactivity_timeout()
        };
        assert_eq!(timeout(f64::NAN), 30.0);
        assert_eq!(timeout(-5.0), 0.0);
        assert_eq!(timeout(45.0), 45.0);
    }
}
