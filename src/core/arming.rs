// Intrusion arming state machine: disarmed -> arming -> armed -> triggered.
//
// The countdown ticks once per second through the scheduler. Intrusion
// triggers only count while armed or triggered; a repeat inside the trigger
// cooldown is kept as extra evidence on the current incident.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::cooldown::CooldownTable;
use super::scheduler::{CancelHandle, Scheduler};

const TICK: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArmingState {
    Disarmed,
    Arming,
    Armed,
    Triggered,
}

/// Arming configuration - persisted in settings.json
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArmingConfig {
    /// Exit delay before the zone is armed
    pub countdown_seconds: u32,
    /// Window in which repeat triggers only add evidence
    pub trigger_cooldown_seconds: u64,
    /// Oldest frames are dropped beyond this
    pub max_stored_frames: usize,
}

impl Default for ArmingConfig {
    fn default() -> Self {
        Self {
            countdown_seconds: 30,
            trigger_cooldown_seconds: 30,
            max_stored_frames: 50,
        }
    }
}

/// What the detector saw when it reported the intrusion.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    pub stream_id: Option<String>,
    pub person_count: u32,
    pub confidence: f64,
    /// Opaque reference to a stored snapshot, owned by the host
    pub snapshot_ref: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntrusionFrame {
    pub id: u64,
    pub timestamp: DateTime<Utc>,
    pub evidence: Evidence,
    pub acknowledged: bool,
    pub notes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TriggerOutcome {
    /// Not armed; nothing recorded.
    Ignored,
    /// A new incident: the caller raises an intrusion alert.
    NewIncident(IntrusionFrame),
    /// Repeat trigger inside the cooldown; stored as evidence only.
    AdditionalEvidence(IntrusionFrame),
}

/// Called with the new state after every transition.
pub type StateObserver = Arc<dyn Fn(ArmingState) + Send + Sync>;

struct ArmingData {
    state: ArmingState,
    config: ArmingConfig,
    time_remaining: u32,
    countdown: Option<CancelHandle>,
    generation: u64,
    triggers: CooldownTable<()>,
    frames: VecDeque<IntrusionFrame>,
    next_frame_id: u64,
    observer: Option<StateObserver>,
}

impl ArmingData {
    fn stop_countdown(&mut self) {
        if let Some(countdown) = self.countdown.take() {
            countdown.cancel();
        }
        self.generation += 1;
        self.time_remaining = 0;
    }
}

struct ArmingInner {
    scheduler: Arc<dyn Scheduler>,
    data: Mutex<ArmingData>,
}

impl ArmingInner {
    fn lock(&self) -> MutexGuard<'_, ArmingData> {
        self.data.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[derive(Clone)]
pub struct Arming {
    inner: Arc<ArmingInner>,
}

impl Arming {
    pub fn new(scheduler: Arc<dyn Scheduler>, config: ArmingConfig) -> Self {
        Self {
            inner: Arc::new(ArmingInner {
                scheduler,
                data: Mutex::new(ArmingData {
                    state: ArmingState::Disarmed,
                    config,
                    time_remaining: 0,
                    countdown: None,
                    generation: 0,
                    triggers: CooldownTable::new(),
                    frames: VecDeque::new(),
                    next_frame_id: 1,
                    observer: None,
                }),
            }),
        }
    }

    pub fn set_observer(&self, observer: StateObserver) {
        self.inner.lock().observer = Some(observer);
    }

    /// Takes effect on the next arm; stored frames are trimmed right away.
    pub fn set_config(&self, config: ArmingConfig) {
        let mut data = self.inner.lock();
        while data.frames.len() > config.max_stored_frames {
            data.frames.pop_front();
        }
        data.config = config;
    }

    pub fn state(&self) -> ArmingState {
        self.inner.lock().state
    }

    pub fn arming_time_remaining(&self) -> u32 {
        self.inner.lock().time_remaining
    }

    /// Start the exit countdown. Allowed from disarmed and armed (re-arm).
    /// Returns whether the state changed.
    pub fn arm(&self) -> bool {
        let inner = &self.inner;
        let (observer, state) = {
            let mut data = inner.lock();
            if !matches!(data.state, ArmingState::Disarmed | ArmingState::Armed) {
                log::debug!("Arm ignored while {:?}", data.state);
                return false;
            }
            data.stop_countdown();
            let seconds = data.config.countdown_seconds;
            if seconds == 0 {
                data.state = ArmingState::Armed;
            } else {
                data.state = ArmingState::Arming;
                data.time_remaining = seconds;
                data.countdown = Some(schedule_tick(inner, data.generation));
            }
            log::info!("Arming zone ({}s countdown)", seconds);
            (data.observer.clone(), data.state)
        };
        notify(observer, state);
        true
    }

    /// Back to disarmed from any state. Clears the countdown and the trigger
    /// cooldown; stored frames are kept.
    pub fn disarm(&self) -> bool {
        let (observer, state) = {
            let mut data = self.inner.lock();
            if data.state == ArmingState::Disarmed {
                return false;
            }
            data.stop_countdown();
            data.triggers.clear();
            data.state = ArmingState::Disarmed;
            log::info!("Zone disarmed");
            (data.observer.clone(), data.state)
        };
        notify(observer, state);
        true
    }

    /// Override the countdown while arming; 0 arms immediately. Ignored in
    /// other states.
    pub fn set_arming_time_remaining(&self, seconds: u32) {
        let inner = &self.inner;
        let (observer, state) = {
            let mut data = inner.lock();
            if data.state != ArmingState::Arming {
                return;
            }
            data.stop_countdown();
            if seconds == 0 {
                data.state = ArmingState::Armed;
                log::info!("Zone armed");
                (data.observer.clone(), data.state)
            } else {
                data.time_remaining = seconds;
                data.countdown = Some(schedule_tick(inner, data.generation));
                return;
            }
        };
        notify(observer, state);
    }

    /// Report an intrusion. Only counts while armed or triggered.
    pub fn trigger_intrusion(&self, evidence: Evidence) -> TriggerOutcome {
        let inner = &self.inner;
        let (outcome, observer) = {
            let mut data = inner.lock();
            let was = data.state;
            if !matches!(was, ArmingState::Armed | ArmingState::Triggered) {
                log::debug!("Intrusion trigger ignored while {:?}", was);
                return TriggerOutcome::Ignored;
            }

            let window = Duration::from_secs(data.config.trigger_cooldown_seconds);
            let now = inner.scheduler.now();
            let fresh = was == ArmingState::Armed || !data.triggers.is_cooling(&(), now, window);
            if fresh {
                data.triggers.try_fire((), now, Duration::ZERO);
            }

            let frame = IntrusionFrame {
                id: data.next_frame_id,
                timestamp: inner.scheduler.timestamp(),
                evidence,
                acknowledged: false,
                notes: Vec::new(),
            };
            data.next_frame_id += 1;
            data.frames.push_back(frame.clone());
            while data.frames.len() > data.config.max_stored_frames.max(1) {
                data.frames.pop_front();
            }
            data.state = ArmingState::Triggered;

            let outcome = if fresh {
                log::warn!("Intrusion detected (frame {})", frame.id);
                TriggerOutcome::NewIncident(frame)
            } else {
                log::debug!("Intrusion evidence added (frame {})", frame.id);
                TriggerOutcome::AdditionalEvidence(frame)
            };
            let observer = if was != ArmingState::Triggered {
                data.observer.clone()
            } else {
                None
            };
            (outcome, observer)
        };
        notify(observer, ArmingState::Triggered);
        outcome
    }

    /// Stored frames, oldest first.
    pub fn frames(&self) -> Vec<IntrusionFrame> {
        self.inner.lock().frames.iter().cloned().collect()
    }

    pub fn acknowledge_frame(&self, id: u64) -> bool {
        let mut data = self.inner.lock();
        match data.frames.iter_mut().find(|f| f.id == id) {
            Some(frame) if !frame.acknowledged => {
                frame.acknowledged = true;
                true
            }
            _ => false,
        }
    }

    pub fn add_frame_note(&self, id: u64, note: impl Into<String>) -> bool {
        let mut data = self.inner.lock();
        match data.frames.iter_mut().find(|f| f.id == id) {
            Some(frame) => {
                frame.notes.push(note.into());
                true
            }
            None => false,
        }
    }

    pub fn clear_frames(&self) {
        self.inner.lock().frames.clear();
    }
}

fn notify(observer: Option<StateObserver>, state: ArmingState) {
    if let Some(observer) = observer {
        observer(state);
    }
}

fn schedule_tick(inner: &Arc<ArmingInner>, generation: u64) -> CancelHandle {
    let weak: Weak<ArmingInner> = Arc::downgrade(inner);
    inner.scheduler.schedule(
        TICK,
        Box::new(move || {
            if let Some(inner) = weak.upgrade() {
                tick(&inner, generation);
            }
        }),
    )
}

fn tick(inner: &Arc<ArmingInner>, generation: u64) {
    let (observer, state) = {
        let mut data = inner.lock();
        if data.generation != generation || data.state != ArmingState::Arming {
            return;
        }
        data.time_remaining = data.time_remaining.saturating_sub(1);
        if data.time_remaining > 0 {
            data.countdown = Some(schedule_tick(inner, generation));
            return;
        }
        data.countdown = None;
        data.state = ArmingState::Armed;
        log::info!("Zone armed");
        (data.observer.clone(), data.state)
    };
    notify(observer, state);
}
