// Trigger evaluation logic for alert types.
//
// Each trigger classifies one raw detection signal against the current
// thresholds and returns an optional classification when the signal should
// alert. Cooldowns are applied by the engine, not here.

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use super::engine::Thresholds;
use super::model::{AlertType, Severity};

/// Inactivity longer than this is critical rather than a warning.
const INACTIVITY_CRITICAL_MINUTES: f64 = 60.0;

/// Motion ratio bands: ratio = level / (sensitivity / 100).
const MOTION_EMERGENCY_RATIO: f64 = 2.0;
const MOTION_CRITICAL_RATIO: f64 = 1.5;
const MOTION_WARNING_RATIO: f64 = 1.2;

/// Danger rating reported by the animal classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DangerLevel {
    #[default]
    None,
    Low,
    Medium,
    High,
    Extreme,
}

impl DangerLevel {
    pub fn is_dangerous(&self) -> bool {
        matches!(self, Self::High | Self::Extreme)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Extreme => "extreme",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct MotionSignal {
    pub level: f64,
    pub stream_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct AudioSignal {
    pub level: f64,
    /// Pattern label from the audio classifier, e.g. "baby crying"
    pub pattern: Option<String>,
    pub stream_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct PersonSignal {
    pub count: u32,
    pub confidence: f64,
    pub stream_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct AnimalSignal {
    pub species: String,
    pub confidence: f64,
    pub danger_level: DangerLevel,
    pub stream_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct InactivitySignal {
    pub elapsed_minutes: f64,
    pub stream_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SubjectMatchSignal {
    pub subject: String,
    pub confidence: f64,
    pub stream_id: Option<String>,
}

/// Health report from the host (camera lost, storage low, ...).
#[derive(Debug, Clone, PartialEq)]
pub struct SystemSignal {
    pub severity: Severity,
    pub message: String,
    pub detail: Option<String>,
}

/// One raw detection signal, as produced by a perception collaborator.
#[derive(Debug, Clone, PartialEq)]
pub enum Signal {
    Motion(MotionSignal),
    Audio(AudioSignal),
    Person(PersonSignal),
    Animal(AnimalSignal),
    Inactivity(InactivitySignal),
    SubjectMatch(SubjectMatchSignal),
    System(SystemSignal),
}

impl Signal {
    pub fn stream_id(&self) -> Option<&str> {
        match self {
            Self::Motion(s) => s.stream_id.as_deref(),
            Self::Audio(s) => s.stream_id.as_deref(),
            Self::Person(s) => s.stream_id.as_deref(),
            Self::Animal(s) => s.stream_id.as_deref(),
            Self::Inactivity(s) => s.stream_id.as_deref(),
            Self::SubjectMatch(s) => s.stream_id.as_deref(),
            Self::System(_) => None,
        }
    }
}

/// Result of a trigger that fired, before id/timestamp are assigned.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub alert_type: AlertType,
    pub severity: Severity,
    pub message: String,
    pub description: String,
    pub metadata: Map<String, Value>,
}

/// Context provided to triggers for evaluation
pub struct TriggerContext<'a> {
    pub thresholds: &'a Thresholds,
    /// Matches audio pattern labels that escalate to critical
    pub distress_pattern: &'a Regex,
}

/// Pattern labels that make an audio alert critical (case-insensitive substring).
pub fn distress_pattern() -> Regex {
    Regex::new(r"(?i)crying|scream").expect("Invalid distress regex")
}

/// Evaluate the trigger for one signal.
/// Returns Some(classification) if the signal should alert, None otherwise.
pub fn evaluate_trigger(signal: &Signal, ctx: &TriggerContext) -> Option<Classification> {
    match signal {
        Signal::Motion(s) => evaluate_motion(s, ctx),
        Signal::Audio(s) => evaluate_audio(s, ctx),
        Signal::Person(s) => evaluate_person(s, ctx),
        Signal::Animal(s) => evaluate_animal(s, ctx),
        Signal::Inactivity(s) => evaluate_inactivity(s, ctx),
        Signal::SubjectMatch(s) => Some(evaluate_subject_match(s)),
        Signal::System(s) => Some(evaluate_system(s)),
    }
}

/// Non-negative level; NaN reads as silence.
fn sanitize_level(value: f64) -> f64 {
    if value.is_nan() || value < 0.0 {
        0.0
    } else if value.is_infinite() {
        f64::MAX
    } else {
        value
    }
}

/// Confidence or fraction in [0, 1]; NaN reads as 0.
pub(crate) fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

fn percent(confidence: f64) -> u32 {
    (clamp_unit(confidence) * 100.0).round() as u32
}

fn evaluate_motion(signal: &MotionSignal, ctx: &TriggerContext) -> Option<Classification> {
    let level = sanitize_level(signal.level);
    let threshold = ctx.thresholds.motion_threshold();
    if level < threshold {
        return None;
    }

    let ratio = level / threshold;
    let severity = if ratio >= MOTION_EMERGENCY_RATIO {
        Severity::Emergency
    } else if ratio >= MOTION_CRITICAL_RATIO {
        Severity::Critical
    } else if ratio >= MOTION_WARNING_RATIO {
        Severity::Warning
    } else {
        Severity::Info
    };

    let mut metadata = Map::new();
    metadata.insert("level".to_string(), json!(level));
    metadata.insert("threshold".to_string(), json!(threshold));
    metadata.insert("ratio".to_string(), json!(ratio));

    Some(Classification {
        alert_type: AlertType::Motion,
        severity,
        message: "Motion detected".to_string(),
        description: format!(
            "Motion level {:.2} is {:.1}x the threshold ({:.2})",
            level, ratio, threshold
        ),
        metadata,
    })
}

fn evaluate_audio(signal: &AudioSignal, ctx: &TriggerContext) -> Option<Classification> {
    let level = sanitize_level(signal.level);
    let threshold = clamp_unit(ctx.thresholds.audio_threshold);
    if level < threshold {
        return None;
    }

    let pattern = signal.pattern.as_deref().filter(|p| !p.trim().is_empty());
    let distressed = pattern
        .map(|p| ctx.distress_pattern.is_match(p))
        .unwrap_or(false);
    let severity = if distressed {
        Severity::Critical
    } else {
        Severity::Warning
    };

    let mut metadata = Map::new();
    metadata.insert("level".to_string(), json!(level));
    metadata.insert("threshold".to_string(), json!(threshold));
    if let Some(pattern) = pattern {
        metadata.insert("pattern".to_string(), json!(pattern));
    }

    let message = match pattern {
        Some(pattern) => format!("Sound detected: {}", pattern),
        None => "Sound detected".to_string(),
    };

    Some(Classification {
        alert_type: AlertType::Audio,
        severity,
        message,
        description: format!("Audio level {:.2} crossed the threshold ({:.2})", level, threshold),
        metadata,
    })
}

fn evaluate_person(signal: &PersonSignal, ctx: &TriggerContext) -> Option<Classification> {
    if let Some(allowed) = ctx.thresholds.max_allowed_persons {
        if signal.count > allowed {
            let mut metadata = Map::new();
            metadata.insert("count".to_string(), json!(signal.count));
            metadata.insert("allowed".to_string(), json!(allowed));

            return Some(Classification {
                alert_type: AlertType::Intrusion,
                severity: Severity::Critical,
                message: "Intrusion detected".to_string(),
                description: format!("{} persons detected ({} allowed)", signal.count, allowed),
                metadata,
            });
        }
    }

    let confidence = clamp_unit(signal.confidence);
    if signal.count == 0 || confidence < clamp_unit(ctx.thresholds.person_confidence) {
        return None;
    }

    let mut metadata = Map::new();
    metadata.insert("count".to_string(), json!(signal.count));
    metadata.insert("confidence".to_string(), json!(confidence));

    let description = if signal.count == 1 {
        format!("1 person detected ({}% confidence)", percent(confidence))
    } else {
        format!("{} persons detected ({}% confidence)", signal.count, percent(confidence))
    };

    Some(Classification {
        alert_type: AlertType::Person,
        severity: Severity::Info,
        message: "Person detected".to_string(),
        description,
        metadata,
    })
}

fn evaluate_animal(signal: &AnimalSignal, ctx: &TriggerContext) -> Option<Classification> {
    let confidence = clamp_unit(signal.confidence);
    if confidence < clamp_unit(ctx.thresholds.animal_confidence) {
        return None;
    }

    let species = if signal.species.trim().is_empty() {
        "Animal"
    } else {
        signal.species.trim()
    };

    let mut metadata = Map::new();
    metadata.insert("species".to_string(), json!(species));
    metadata.insert("confidence".to_string(), json!(confidence));
    metadata.insert("dangerLevel".to_string(), json!(signal.danger_level.label()));

    if signal.danger_level.is_dangerous() {
        return Some(Classification {
            alert_type: AlertType::DangerousAnimal,
            severity: Severity::Emergency,
            message: "Dangerous animal detected".to_string(),
            description: format!(
                "{} detected ({} danger, {}% confidence)",
                species,
                signal.danger_level.label(),
                percent(confidence)
            ),
            metadata,
        });
    }

    Some(Classification {
        alert_type: AlertType::Animal,
        severity: Severity::Info,
        message: "Animal detected".to_string(),
        description: format!("{} detected ({}% confidence)", species, percent(confidence)),
        metadata,
    })
}

fn evaluate_inactivity(signal: &InactivitySignal, ctx: &TriggerContext) -> Option<Classification> {
    let elapsed = sanitize_level(signal.elapsed_minutes);
    let timeout = ctx.thresholds.inactivity_timeout();
    if elapsed < timeout {
        return None;
    }

    let severity = if elapsed > INACTIVITY_CRITICAL_MINUTES {
        Severity::Critical
    } else {
        Severity::Warning
    };

    let mut metadata = Map::new();
    metadata.insert("elapsedMinutes".to_string(), json!(elapsed.floor() as u64));
    metadata.insert("timeoutMinutes".to_string(), json!(timeout));

    Some(Classification {
        alert_type: AlertType::Inactivity,
        severity,
        message: "No activity detected".to_string(),
        description: format!("No activity for {} minutes", elapsed.floor() as u64),
        metadata,
    })
}

fn evaluate_subject_match(signal: &SubjectMatchSignal) -> Classification {
    let confidence = clamp_unit(signal.confidence);
    let subject = if signal.subject.trim().is_empty() {
        "Known subject"
    } else {
        signal.subject.trim()
    };

    let mut metadata = Map::new();
    metadata.insert("subject".to_string(), json!(subject));
    metadata.insert("confidence".to_string(), json!(confidence));

    Classification {
        alert_type: AlertType::SubjectMatch,
        severity: Severity::Info,
        message: format!("{} recognized", subject),
        description: format!("{} matched with {}% confidence", subject, percent(confidence)),
        metadata,
    }
}

fn evaluate_system(signal: &SystemSignal) -> Classification {
    Classification {
        alert_type: AlertType::System,
        severity: signal.severity,
        message: signal.message.clone(),
        description: signal.detail.clone().unwrap_or_else(|| signal.message.clone()),
        metadata: Map::new(),
    }
}
