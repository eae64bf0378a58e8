use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::{json, Map, Value};

use super::alerts::engine::{AlertEvaluator, Evaluation};
use super::alerts::model::{AlertEvent, AlertId, AlertType, Severity};
use super::alerts::triggers::{
    AnimalSignal, AudioSignal, Classification, InactivitySignal, MotionSignal, PersonSignal,
    Signal, SubjectMatchSignal, SystemSignal,
};
use super::arming::{Arming, ArmingState, Evidence, IntrusionFrame, TriggerOutcome};
use super::collaborators::{
    LogNotifier, NoPersistence, Notifier, NotifyOptions, Persistence, SettingsSource,
};
use super::config::{Settings, SharedSettings};
use super::escalation::EscalationScheduler;
use super::registry::AlertRegistry;
use super::scheduler::Scheduler;
use super::sound::engine::SoundEngine;
use super::sound::output::AudioOutput;

/// Something listeners should know about.
#[derive(Debug, Clone, PartialEq)]
pub enum AlertNotice {
    Raised(AlertEvent),
    Acknowledged(AlertId),
    Escalated { id: AlertId, level: u8 },
    ArmingChanged(ArmingState),
}

pub type AlertListener = Arc<dyn Fn(&AlertNotice) + Send + Sync>;

pub type SubscriptionId = u64;

#[derive(Default)]
struct Listeners {
    next_id: SubscriptionId,
    entries: Vec<(SubscriptionId, AlertListener)>,
}

fn emit(listeners: &Mutex<Listeners>, notice: &AlertNotice) {
    // Snapshot so listeners can subscribe or unsubscribe from the callback.
    let entries: Vec<AlertListener> = listeners
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .entries
        .iter()
        .map(|(_, listener)| Arc::clone(listener))
        .collect();
    for listener in entries {
        listener(notice);
    }
}

/// Host-provided collaborators.
pub struct Collaborators {
    pub settings: Arc<dyn SettingsSource>,
    pub persistence: Arc<dyn Persistence>,
    pub notifier: Arc<dyn Notifier>,
}

impl Default for Collaborators {
    fn default() -> Self {
        Self {
            settings: Arc::new(SharedSettings::default()),
            persistence: Arc::new(NoPersistence),
            notifier: Arc::new(LogNotifier),
        }
    }
}

/// State changed together under one lock: cooldowns and the alert log.
struct Ledger {
    evaluator: AlertEvaluator,
    registry: AlertRegistry,
    /// Unacknowledged alerts raised for armed-zone incidents
    intrusion_alerts: Vec<AlertId>,
}

/// Wires evaluation, the alert log, escalation, sound and arming together.
///
/// Lock order is ledger, then escalation, then sound. Collaborators and
/// listeners are only called with no lock held.
pub struct Coordinator {
    scheduler: Arc<dyn Scheduler>,
    collaborators: Collaborators,
    ledger: Mutex<Ledger>,
    escalation: EscalationScheduler,
    sound: SoundEngine,
    arming: Arming,
    listeners: Arc<Mutex<Listeners>>,
    /// Set while the emergency alarm is one this coordinator started
    owns_alarm: AtomicBool,
}

impl Coordinator {
    /// Build the core from static settings (capacities, ladder, arming config).
    /// Thresholds, volume and mute are pulled from the settings source on
    /// every call.
    pub fn new(
        scheduler: Arc<dyn Scheduler>,
        output: Arc<dyn AudioOutput>,
        settings: &Settings,
        collaborators: Collaborators,
    ) -> Self {
        let sound = SoundEngine::new(scheduler.clone(), output, settings.sound.clone());
        let escalation =
            EscalationScheduler::new(scheduler.clone(), sound.clone(), settings.escalation.clone());
        let arming = Arming::new(scheduler.clone(), settings.arming.clone());
        let listeners = Arc::new(Mutex::new(Listeners::default()));

        let escalated = Arc::clone(&listeners);
        escalation.set_observer(Arc::new(move |id: AlertId, level: u8| {
            emit(&escalated, &AlertNotice::Escalated { id, level });
        }));
        let arming_changed = Arc::clone(&listeners);
        arming.set_observer(Arc::new(move |state: ArmingState| {
            emit(&arming_changed, &AlertNotice::ArmingChanged(state));
        }));

        Self {
            scheduler,
            collaborators,
            ledger: Mutex::new(Ledger {
                evaluator: AlertEvaluator::new(),
                registry: AlertRegistry::new(settings.registry_capacity),
                intrusion_alerts: Vec::new(),
            }),
            escalation,
            sound,
            arming,
            listeners,
            owns_alarm: AtomicBool::new(false),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Ledger> {
        self.ledger.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn subscribe(&self, listener: AlertListener) -> SubscriptionId {
        let mut listeners = self
            .listeners
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        listeners.next_id += 1;
        let id = listeners.next_id;
        listeners.entries.push((id, listener));
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut listeners = self
            .listeners
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let before = listeners.entries.len();
        listeners.entries.retain(|(entry, _)| *entry != id);
        listeners.entries.len() != before
    }

    /// Apply settings that are not pulled per call. The registry capacity is
    /// fixed at construction.
    pub fn apply_settings(&self, settings: &Settings) {
        self.escalation.set_ladder(settings.escalation.clone());
        self.arming.set_config(settings.arming.clone());
    }

    /// Evaluate one raw signal and, if it produces an alert, register,
    /// escalate, persist and announce it.
    pub fn process(&self, signal: &Signal) -> Evaluation {
        let settings = &self.collaborators.settings;
        let thresholds = settings.thresholds();
        self.sync_sound_settings();

        let now = self.scheduler.now();
        let timestamp = self.scheduler.timestamp();
        let (evaluation, evicted) = {
            let mut ledger = self.lock();
            let evaluation = ledger
                .evaluator
                .evaluate(signal, &thresholds, now, timestamp);
            let evicted = match &evaluation {
                Evaluation::Alert(alert) => self.register_locked(&mut ledger, alert.clone()),
                _ => Vec::new(),
            };
            (evaluation, evicted)
        };

        if let Evaluation::Alert(alert) = &evaluation {
            self.announce(alert);
        }
        if !evicted.is_empty() {
            self.refresh_emergency_alarm();
        }
        evaluation
    }

    pub fn report_motion(&self, signal: MotionSignal) -> Evaluation {
        self.process(&Signal::Motion(signal))
    }

    pub fn report_audio(&self, signal: AudioSignal) -> Evaluation {
        self.process(&Signal::Audio(signal))
    }

    pub fn report_person(&self, signal: PersonSignal) -> Evaluation {
        self.process(&Signal::Person(signal))
    }

    pub fn report_animal(&self, signal: AnimalSignal) -> Evaluation {
        self.process(&Signal::Animal(signal))
    }

    pub fn report_inactivity(&self, signal: InactivitySignal) -> Evaluation {
        self.process(&Signal::Inactivity(signal))
    }

    pub fn report_subject_match(&self, signal: SubjectMatchSignal) -> Evaluation {
        self.process(&Signal::SubjectMatch(signal))
    }

    pub fn report_system(&self, signal: SystemSignal) -> Evaluation {
        self.process(&Signal::System(signal))
    }

    /// Acknowledge one alert. Unknown ids and repeats are no-ops.
    pub fn acknowledge(&self, id: AlertId) -> bool {
        let at = self.scheduler.timestamp();
        let changed = {
            let mut ledger = self.lock();
            let changed = ledger.registry.acknowledge(id, at);
            if changed {
                self.escalation.cancel(id);
                ledger.intrusion_alerts.retain(|open| *open != id);
            }
            changed
        };
        if !changed {
            return false;
        }

        log::info!("Alert {} acknowledged", id);
        if let Err(e) = self.collaborators.persistence.update_acknowledgment(id, at) {
            log::warn!("Failed to persist acknowledgment of alert {}: {}", id, e);
        }
        emit(&self.listeners, &AlertNotice::Acknowledged(id));
        self.refresh_emergency_alarm();
        true
    }

    /// Acknowledge everything outstanding. Returns the ids that changed.
    pub fn acknowledge_all(&self) -> Vec<AlertId> {
        let at = self.scheduler.timestamp();
        let ids = {
            let mut ledger = self.lock();
            let ids = ledger.registry.acknowledge_all(at);
            self.escalation.cancel_all();
            ledger.intrusion_alerts.clear();
            ids
        };

        if !ids.is_empty() {
            log::info!("Acknowledged {} alerts", ids.len());
        }
        for id in &ids {
            if let Err(e) = self.collaborators.persistence.update_acknowledgment(*id, at) {
                log::warn!("Failed to persist acknowledgment of alert {}: {}", id, e);
            }
            emit(&self.listeners, &AlertNotice::Acknowledged(*id));
        }
        self.refresh_emergency_alarm();
        ids
    }

    pub fn arm(&self) -> bool {
        self.arming.arm()
    }

    /// Disarm the zone and acknowledge every open intrusion alert.
    pub fn disarm(&self) -> bool {
        let changed = self.arming.disarm();
        let open = std::mem::take(&mut self.lock().intrusion_alerts);
        for id in open {
            self.acknowledge(id);
        }
        changed
    }

    /// Report an intrusion into the armed zone. A new incident raises a
    /// critical intrusion alert through the usual escalation and sound path.
    pub fn trigger_intrusion(&self, evidence: Evidence) -> TriggerOutcome {
        self.sync_sound_settings();
        let outcome = self.arming.trigger_intrusion(evidence);
        let frame = match &outcome {
            TriggerOutcome::NewIncident(frame) => frame,
            _ => return outcome,
        };

        let timestamp = self.scheduler.timestamp();
        let (alert, evicted) = {
            let mut ledger = self.lock();
            let alert = ledger.evaluator.issue(
                intrusion_classification(frame),
                frame.evidence.stream_id.clone(),
                timestamp,
            );
            ledger.intrusion_alerts.push(alert.id);
            let evicted = self.register_locked(&mut ledger, alert.clone());
            (alert, evicted)
        };

        self.announce(&alert);
        if !evicted.is_empty() {
            self.refresh_emergency_alarm();
        }
        outcome
    }

    pub fn set_arming_time_remaining(&self, seconds: u32) {
        self.arming.set_arming_time_remaining(seconds);
    }

    pub fn arming_state(&self) -> ArmingState {
        self.arming.state()
    }

    pub fn arming_time_remaining(&self) -> u32 {
        self.arming.arming_time_remaining()
    }

    pub fn frames(&self) -> Vec<IntrusionFrame> {
        self.arming.frames()
    }

    pub fn acknowledge_frame(&self, id: u64) -> bool {
        self.arming.acknowledge_frame(id)
    }

    pub fn add_frame_note(&self, id: u64, note: impl Into<String>) -> bool {
        self.arming.add_frame_note(id, note)
    }

    pub fn clear_frames(&self) {
        self.arming.clear_frames();
    }

    pub fn alert(&self, id: AlertId) -> Option<AlertEvent> {
        self.lock().registry.get(id).cloned()
    }

    pub fn recent_alerts(&self, limit: usize) -> Vec<AlertEvent> {
        self.lock().registry.recent(limit)
    }

    pub fn unacknowledged_alerts(&self) -> Vec<AlertEvent> {
        self.lock().registry.unacknowledged()
    }

    pub fn unacknowledged_count(&self) -> usize {
        self.lock().registry.unacknowledged_count()
    }

    pub fn alert_count(&self) -> usize {
        self.lock().registry.len()
    }

    /// Live or frozen escalation level of an alert.
    pub fn escalation_level(&self, id: AlertId) -> Option<u8> {
        self.escalation.level(id)
    }

    pub fn reset_cooldowns(&self) {
        self.lock().evaluator.reset_cooldowns();
    }

    pub fn sound(&self) -> &SoundEngine {
        &self.sound
    }

    pub fn escalation(&self) -> &EscalationScheduler {
        &self.escalation
    }

    fn register_locked(&self, ledger: &mut Ledger, alert: AlertEvent) -> Vec<AlertId> {
        self.escalation.start(&alert);
        let evicted: Vec<AlertId> = ledger
            .registry
            .push(alert)
            .into_iter()
            .map(|old| old.id)
            .collect();
        for id in &evicted {
            self.escalation.forget(*id);
            ledger.intrusion_alerts.retain(|open| open != id);
        }
        evicted
    }

    /// Side effects of a new alert, run with no lock held.
    fn announce(&self, alert: &AlertEvent) {
        log::info!(
            "{} alert {}: {}",
            alert.severity.label(),
            alert.id,
            alert.message
        );

        if let Err(e) = self.collaborators.persistence.record_alert(alert) {
            log::warn!("Failed to persist alert {}: {}", alert.id, e);
        }

        let mut data = alert.metadata.clone();
        data.insert("alertId".to_string(), Value::from(alert.id));
        let options = NotifyOptions {
            tag: Some(notification_tag(alert.alert_type)),
            require_interaction: alert.severity >= Severity::Critical,
            data,
        };
        if let Err(e) = self
            .collaborators
            .notifier
            .notify(&alert.title(), &alert.message, options)
        {
            log::warn!("Failed to deliver notification for alert {}: {}", alert.id, e);
        }

        if alert.severity == Severity::Emergency
            && self.collaborators.settings.is_emergency_mode_enabled()
        {
            if !self.sound.is_emergency_mode() {
                self.owns_alarm.store(true, Ordering::SeqCst);
            }
            self.sound.start_emergency_alarm();
        }

        emit(&self.listeners, &AlertNotice::Raised(alert.clone()));
    }

    /// Stop the emergency alarm once no emergency alert is outstanding.
    /// An alarm the host started through `sound()` is left alone.
    fn refresh_emergency_alarm(&self) {
        if !self.owns_alarm.load(Ordering::SeqCst) {
            return;
        }
        if !self.sound.is_emergency_mode() {
            self.owns_alarm.store(false, Ordering::SeqCst);
            return;
        }
        let outstanding = self
            .lock()
            .registry
            .unacknowledged()
            .iter()
            .any(|alert| alert.severity == Severity::Emergency);
        if !outstanding {
            self.owns_alarm.store(false, Ordering::SeqCst);
            self.sound.stop_emergency_alarm();
        }
    }

    fn sync_sound_settings(&self) {
        let settings = &self.collaborators.settings;
        self.sound.set_user_volume(settings.volume());
        self.sound.set_global_mute(settings.is_muted());
    }
}

fn notification_tag(alert_type: AlertType) -> String {
    alert_type.display_name().to_lowercase().replace(' ', "-")
}

fn intrusion_classification(frame: &IntrusionFrame) -> Classification {
    let evidence = &frame.evidence;
    let mut metadata = Map::new();
    metadata.insert("frameId".to_string(), json!(frame.id));
    metadata.insert("count".to_string(), json!(evidence.person_count));
    metadata.insert("confidence".to_string(), json!(evidence.confidence));
    if let Some(snapshot) = &evidence.snapshot_ref {
        metadata.insert("snapshot".to_string(), json!(snapshot));
    }

    let who = match evidence.person_count {
        0 => "Someone".to_string(),
        1 => "1 person".to_string(),
        n => format!("{} people", n),
    };
    Classification {
        alert_type: AlertType::Intrusion,
        severity: Severity::Critical,
        message: "Intrusion in armed zone".to_string(),
        description: format!("{} entered the armed zone", who),
        metadata,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::alerts::triggers::DangerLevel;
    use crate::core::collaborators::testing::RecordingCollaborator;
    use crate::core::config::SettingsOverride;
    use crate::core::scheduler::ManualScheduler;
    use crate::core::sound::model::SoundType;
    use crate::core::sound::output::SilentOutput;
    use std::time::Duration;

    struct Rig {
        scheduler: Arc<ManualScheduler>,
        settings: Arc<SharedSettings>,
        recorder: Arc<RecordingCollaborator>,
        coordinator: Coordinator,
    }

    fn rig_with(settings: Settings, recorder: RecordingCollaborator) -> Rig {
        let scheduler = Arc::new(ManualScheduler::new());
        let shared = Arc::new(SharedSettings::new(settings.clone()));
        let recorder = Arc::new(recorder);
        let coordinator = Coordinator::new(
            scheduler.clone(),
            Arc::new(SilentOutput),
            &settings,
            Collaborators {
                settings: shared.clone(),
                persistence: recorder.clone(),
                notifier: recorder.clone(),
            },
        );
        Rig {
            scheduler,
            settings: shared,
            recorder,
            coordinator,
        }
    }

    fn rig() -> Rig {
        rig_with(Settings::default(), RecordingCollaborator::default())
    }

    fn motion(level: f64) -> MotionSignal {
        MotionSignal {
            level,
            stream_id: Some("nursery".to_string()),
        }
    }

    fn dangerous_animal() -> AnimalSignal {
        AnimalSignal {
            species: "bear".to_string(),
            confidence: 0.9,
            danger_level: DangerLevel::Extreme,
            stream_id: Some("backyard".to_string()),
        }
    }

    #[test]
    fn test_alert_flows_to_registry_escalation_and_collaborators() {
        let rig = rig();
        let alert = rig.coordinator.report_motion(motion(0.55)).alert().cloned().unwrap();

        assert_eq!(rig.coordinator.recent_alerts(10), vec![alert.clone()]);
        assert_eq!(rig.coordinator.escalation_level(alert.id), Some(0));
        assert_eq!(rig.recorder.recorded.lock().unwrap().len(), 1);
        assert_eq!(rig.recorder.notification_titles(), vec![alert.title()]);
        assert_eq!(rig.coordinator.sound().active_count(), 1);
    }

    #[test]
    fn test_cooldown_suppresses_repeat_without_side_effects() {
        let rig = rig();
        assert!(rig.coordinator.report_motion(motion(0.55)).alert().is_some());
        assert!(rig.coordinator.report_motion(motion(0.9)).is_suppressed());
        assert_eq!(rig.coordinator.alert_count(), 1);
        assert_eq!(rig.recorder.notification_titles().len(), 1);

        rig.scheduler.advance(Duration::from_secs(30));
        assert!(rig.coordinator.report_motion(motion(0.55)).alert().is_some());
    }

    #[test]
    fn test_below_threshold_has_no_side_effects() {
        let rig = rig();
        assert_eq!(rig.coordinator.report_motion(motion(0.2)), Evaluation::NoAlert);
        assert_eq!(rig.coordinator.alert_count(), 0);
        assert!(rig.recorder.recorded.lock().unwrap().is_empty());
        assert_eq!(rig.coordinator.sound().active_count(), 0);
    }

    #[test]
    fn test_acknowledge_freezes_level_and_stops_sound() {
        let rig = rig();
        let alert = rig
            .coordinator
            .report_person(PersonSignal {
                count: 3,
                confidence: 0.9,
                stream_id: None,
            })
            .alert()
            .cloned();
        // No limit configured: a plain person alert.
        let alert = alert.unwrap();
        assert_eq!(alert.alert_type, AlertType::Person);

        rig.scheduler.advance(Duration::from_secs(10));
        assert_eq!(rig.coordinator.escalation_level(alert.id), Some(1));
        let sound = rig.coordinator.escalation().tied_sound(alert.id).unwrap();

        assert!(rig.coordinator.acknowledge(alert.id));
        assert!(!rig.coordinator.sound().is_playing(sound));
        assert!(!rig.coordinator.acknowledge(alert.id));
        assert!(!rig.coordinator.acknowledge(12345));

        rig.scheduler.advance(Duration::from_secs(60));
        assert_eq!(rig.coordinator.escalation_level(alert.id), Some(1));
        assert_eq!(*rig.recorder.acknowledged.lock().unwrap(), vec![alert.id]);
        assert!(rig.coordinator.alert(alert.id).unwrap().acknowledged);
    }

    #[test]
    fn test_override_limit_raises_intrusion() {
        let rig = rig();
        rig.settings.set_override(Some(SettingsOverride {
            thresholds: crate::core::config::ThresholdOverrides {
                max_allowed_persons: Some(0),
                ..Default::default()
            },
            ..Default::default()
        }));

        let alert = rig
            .coordinator
            .report_person(PersonSignal {
                count: 3,
                confidence: 0.9,
                stream_id: None,
            })
            .alert()
            .cloned()
            .unwrap();
        assert_eq!(alert.alert_type, AlertType::Intrusion);
        assert_eq!(alert.severity, Severity::Critical);
        assert_eq!(rig.coordinator.escalation_level(alert.id), Some(2));
    }

    #[test]
    fn test_emergency_alert_starts_and_ack_stops_alarm() {
        let rig = rig();
        let alert = rig
            .coordinator
            .report_animal(dangerous_animal())
            .alert()
            .cloned()
            .unwrap();
        assert_eq!(alert.severity, Severity::Emergency);
        assert!(rig.coordinator.sound().is_emergency_mode());
        assert!(rig.coordinator.sound().is_playing_type(SoundType::Emergency));
        assert_eq!(rig.coordinator.escalation_level(alert.id), Some(4));

        rig.coordinator.acknowledge(alert.id);
        assert!(!rig.coordinator.sound().is_emergency_mode());
        assert!(!rig.coordinator.sound().is_playing_type(SoundType::Emergency));
    }

    #[test]
    fn test_emergency_mode_disabled_skips_alarm() {
        let mut settings = Settings::default();
        settings.emergency_mode_enabled = false;
        let rig = rig_with(settings, RecordingCollaborator::default());

        rig.coordinator.report_animal(dangerous_animal());
        assert!(!rig.coordinator.sound().is_emergency_mode());
    }

    #[test]
    fn test_acknowledge_all_cancels_everything() {
        let rig = rig();
        rig.coordinator.report_motion(motion(0.55));
        rig.coordinator.report_animal(dangerous_animal());
        rig.coordinator.report_inactivity(InactivitySignal {
            elapsed_minutes: 45.0,
            stream_id: None,
        });
        assert_eq!(rig.coordinator.unacknowledged_count(), 3);

        let ids = rig.coordinator.acknowledge_all();
        assert_eq!(ids.len(), 3);
        assert_eq!(rig.coordinator.unacknowledged_count(), 0);
        assert_eq!(rig.coordinator.escalation().active_count(), 0);
        assert!(!rig.coordinator.sound().is_emergency_mode());
        assert!(rig.coordinator.acknowledge_all().is_empty());
    }

    #[test]
    fn test_collaborator_failures_are_ignored() {
        let rig = rig_with(Settings::default(), RecordingCollaborator::failing());
        let alert = rig.coordinator.report_motion(motion(0.55)).alert().cloned().unwrap();
        assert!(rig.coordinator.acknowledge(alert.id));
        assert_eq!(rig.coordinator.unacknowledged_count(), 0);
    }

    #[test]
    fn test_registry_eviction_drops_escalation() {
        let mut settings = Settings::default();
        settings.registry_capacity = 2;
        settings.thresholds.cooldown_seconds = 0;
        let rig = rig_with(settings, RecordingCollaborator::default());

        let first = rig.coordinator.report_motion(motion(0.55)).alert().cloned().unwrap();
        rig.coordinator.report_motion(motion(0.55));
        rig.coordinator.report_motion(motion(0.55));

        assert_eq!(rig.coordinator.alert_count(), 2);
        assert!(rig.coordinator.alert(first.id).is_none());
        assert_eq!(rig.coordinator.escalation_level(first.id), None);
        assert_eq!(rig.coordinator.escalation().active_count(), 2);
    }

    #[test]
    fn test_settings_volume_and_mute_reach_sound_engine() {
        let rig = rig();
        rig.settings.set_override(Some(SettingsOverride {
            volume: Some(0.25),
            muted: Some(true),
            ..Default::default()
        }));
        rig.coordinator.report_motion(motion(0.55));
        assert_eq!(rig.coordinator.sound().user_volume(), 0.25);
        assert!(rig.coordinator.sound().is_muted());
    }

    #[test]
    fn test_listeners_receive_notices_until_unsubscribed() {
        let rig = rig();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let id = rig
            .coordinator
            .subscribe(Arc::new(move |notice: &AlertNotice| sink.lock().unwrap().push(notice.clone())));

        let alert = rig.coordinator.report_motion(motion(0.55)).alert().cloned().unwrap();
        rig.scheduler.advance(Duration::from_secs(10));
        rig.coordinator.acknowledge(alert.id);

        assert!(rig.coordinator.unsubscribe(id));
        assert!(!rig.coordinator.unsubscribe(id));
        rig.scheduler.advance(Duration::from_secs(30));
        rig.coordinator.report_motion(motion(0.55));

        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                AlertNotice::Raised(alert.clone()),
                AlertNotice::Escalated {
                    id: alert.id,
                    level: 1
                },
                AlertNotice::Acknowledged(alert.id),
            ]
        );
    }

    #[test]
    fn test_armed_intrusion_raises_alert_and_disarm_acknowledges() {
        let mut settings = Settings::default();
        settings.arming.countdown_seconds = 5;
        let rig = rig_with(settings, RecordingCollaborator::default());
        let evidence = Evidence {
            stream_id: Some("hallway".to_string()),
            person_count: 1,
            confidence: 0.8,
            snapshot_ref: Some("snap-1".to_string()),
        };

        assert!(rig.coordinator.arm());
        assert_eq!(
            rig.coordinator.trigger_intrusion(evidence.clone()),
            TriggerOutcome::Ignored
        );
        rig.scheduler.advance(Duration::from_secs(5));
        assert_eq!(rig.coordinator.arming_state(), ArmingState::Armed);

        assert!(matches!(
            rig.coordinator.trigger_intrusion(evidence.clone()),
            TriggerOutcome::NewIncident(_)
        ));
        assert!(matches!(
            rig.coordinator.trigger_intrusion(evidence),
            TriggerOutcome::AdditionalEvidence(_)
        ));
        assert_eq!(rig.coordinator.alert_count(), 1);
        assert_eq!(rig.coordinator.frames().len(), 2);

        let alert = rig.coordinator.recent_alerts(1).remove(0);
        assert_eq!(alert.alert_type, AlertType::Intrusion);
        assert_eq!(alert.severity, Severity::Critical);
        assert_eq!(alert.metadata["snapshot"], Value::from("snap-1"));
        assert_eq!(alert.stream_id.as_deref(), Some("hallway"));

        assert!(rig.coordinator.disarm());
        assert_eq!(rig.coordinator.arming_state(), ArmingState::Disarmed);
        assert!(rig.coordinator.alert(alert.id).unwrap().acknowledged);
        assert!(!rig.coordinator.escalation().is_escalating(alert.id));
    }

    #[test]
    fn test_disarm_acknowledges_every_incident() {
        let mut settings = Settings::default();
        settings.arming.countdown_seconds = 0;
        settings.arming.trigger_cooldown_seconds = 30;
        let rig = rig_with(settings, RecordingCollaborator::default());

        assert!(rig.coordinator.arm());
        assert!(matches!(
            rig.coordinator.trigger_intrusion(Evidence::default()),
            TriggerOutcome::NewIncident(_)
        ));
        rig.scheduler.advance(Duration::from_secs(31));
        assert!(matches!(
            rig.coordinator.trigger_intrusion(Evidence::default()),
            TriggerOutcome::NewIncident(_)
        ));
        assert_eq!(rig.coordinator.unacknowledged_count(), 2);

        assert!(rig.coordinator.disarm());
        rig.scheduler.advance(Duration::from_secs(60));
        assert_eq!(rig.coordinator.arming_state(), ArmingState::Disarmed);
        assert_eq!(rig.coordinator.unacknowledged_count(), 0);
        assert_eq!(rig.coordinator.escalation().active_count(), 0);
        assert_eq!(rig.coordinator.sound().active_count(), 0);
    }

    #[test]
    fn test_concurrent_signals_pass_cooldown_once() {
        let rig = rig();
        let barrier = std::sync::Barrier::new(8);
        let alerts = std::thread::scope(|scope| {
            let workers: Vec<_> = (0..8)
                .map(|_| {
                    scope.spawn(|| {
                        barrier.wait();
                        rig.coordinator.report_motion(motion(0.55))
                    })
                })
                .collect();
            workers
                .into_iter()
                .map(|worker| worker.join().unwrap())
                .filter(|evaluation| matches!(evaluation, Evaluation::Alert(_)))
                .count()
        });

        assert_eq!(alerts, 1);
        assert_eq!(rig.coordinator.alert_count(), 1);
        assert_eq!(rig.recorder.notification_titles().len(), 1);
    }

    #[test]
    fn test_acknowledge_leaves_host_alarm_running() {
        let rig = rig();
        rig.coordinator.sound().start_emergency_alarm();
        let alert = rig.coordinator.report_motion(motion(0.55)).alert().cloned().unwrap();

        assert!(rig.coordinator.acknowledge(alert.id));
        assert!(rig.coordinator.sound().is_emergency_mode());
        assert!(rig.coordinator.sound().is_playing_type(SoundType::Emergency));

        rig.coordinator.sound().stop_emergency_alarm();
        let animal = rig
            .coordinator
            .report_animal(dangerous_animal())
            .alert()
            .cloned()
            .unwrap();
        assert!(rig.coordinator.sound().is_emergency_mode());
        rig.coordinator.acknowledge(animal.id);
        assert!(!rig.coordinator.sound().is_emergency_mode());
    }
}
