//! Escalation of unacknowledged alerts.
//!
//! Each unacknowledged alert owns one timer chain. When a level's interval
//! elapses the alert moves up one level and the sound tied to it is replaced
//! by the next level's sound. Acknowledging cancels the chain, stops the tied
//! sound and freezes the level.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::alerts::model::{AlertEvent, AlertId, AlertType, Severity};
use super::scheduler::{CancelHandle, Scheduler};
use super::sound::engine::SoundEngine;
use super::sound::model::{PlayOptions, SoundHandle, SoundType};

/// One rung of the ladder: how long an alert stays at this level and how
/// loud its sound plays.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EscalationStep {
    pub interval_ms: u64,
    /// Gain applied to the level's sound (0-1)
    pub intensity: f32,
}

impl EscalationStep {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

/// Escalation ladder - persisted in settings.json
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EscalationLadder {
    pub steps: Vec<EscalationStep>,
}

impl Default for EscalationLadder {
    fn default() -> Self {
        let step = |interval_ms, intensity| EscalationStep {
            interval_ms,
            intensity,
        };
        Self {
            steps: vec![
                step(10_000, 0.3),
                step(7_000, 0.5),
                step(5_000, 0.7),
                step(3_000, 0.85),
                step(2_000, 1.0),
            ],
        }
    }
}

impl EscalationLadder {
    /// Highest reachable level.
    pub fn max_level(&self) -> u8 {
        self.steps.len().saturating_sub(1).min(u8::MAX as usize) as u8
    }

    /// Level a fresh alert enters the ladder at.
    pub fn start_level(&self, severity: Severity) -> u8 {
        let level = match severity {
            Severity::Info | Severity::Warning => 0,
            Severity::Critical => 2,
            Severity::Emergency => 4,
        };
        level.min(self.max_level())
    }

    pub fn step(&self, level: u8) -> EscalationStep {
        self.steps
            .get(level as usize)
            .or_else(|| self.steps.last())
            .copied()
            .unwrap_or(EscalationStep {
                interval_ms: 10_000,
                intensity: 1.0,
            })
    }

    /// Sound for an alert at `level`: the louder of the level's cue and the
    /// alert type's own cue.
    pub fn sound_for(&self, level: u8, base: SoundType) -> SoundType {
        let level_sound = match level {
            0 => base,
            1 => SoundType::Warning,
            2 => SoundType::Alert,
            3 => SoundType::Critical,
            _ => SoundType::Emergency,
        };
        if level_sound.priority() > base.priority() {
            level_sound
        } else {
            base
        }
    }
}

/// Live escalation state of one alert.
#[derive(Debug)]
pub struct EscalationTimer {
    pub alert_id: AlertId,
    pub alert_type: AlertType,
    pub current_level: u8,
    /// Scheduler time the current level was entered
    pub scheduled_at: Duration,
    pub cancel: Option<CancelHandle>,
    /// Sound tied to this alert, replaced on every level change
    pub sound: Option<SoundHandle>,
    generation: u64,
}

/// Called with (alert id, new level) after every level change.
pub type LevelObserver = Arc<dyn Fn(AlertId, u8) + Send + Sync>;

struct EscalationState {
    ladder: EscalationLadder,
    timers: HashMap<AlertId, EscalationTimer>,
    /// Levels of acknowledged alerts
    frozen: HashMap<AlertId, u8>,
    next_generation: u64,
    observer: Option<LevelObserver>,
}

struct EscalationInner {
    scheduler: Arc<dyn Scheduler>,
    sound: SoundEngine,
    state: Mutex<EscalationState>,
}

impl EscalationInner {
    fn lock(&self) -> MutexGuard<'_, EscalationState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[derive(Clone)]
pub struct EscalationScheduler {
    inner: Arc<EscalationInner>,
}

impl EscalationScheduler {
    pub fn new(scheduler: Arc<dyn Scheduler>, sound: SoundEngine, ladder: EscalationLadder) -> Self {
        Self {
            inner: Arc::new(EscalationInner {
                scheduler,
                sound,
                state: Mutex::new(EscalationState {
                    ladder,
                    timers: HashMap::new(),
                    frozen: HashMap::new(),
                    next_generation: 1,
                    observer: None,
                }),
            }),
        }
    }

    pub fn set_observer(&self, observer: LevelObserver) {
        self.inner.lock().observer = Some(observer);
    }

    /// Replace the ladder. Running chains pick it up on their next step.
    pub fn set_ladder(&self, ladder: EscalationLadder) {
        self.inner.lock().ladder = ladder;
    }

    pub fn ladder(&self) -> EscalationLadder {
        self.inner.lock().ladder.clone()
    }

    /// Begin escalating `alert` at its severity's starting level and play
    /// that level's sound. Acknowledged or already-tracked alerts are ignored.
    pub fn start(&self, alert: &AlertEvent) {
        if alert.acknowledged {
            return;
        }
        let inner = &self.inner;
        let mut state = inner.lock();
        if state.timers.contains_key(&alert.id) || state.frozen.contains_key(&alert.id) {
            return;
        }

        let level = state.ladder.start_level(alert.severity);
        let generation = state.next_generation;
        state.next_generation += 1;

        let sound = play_level(inner, &state.ladder, alert.alert_type, level);
        let cancel = schedule_next(inner, &state.ladder, alert.id, level, generation);
        state.timers.insert(
            alert.id,
            EscalationTimer {
                alert_id: alert.id,
                alert_type: alert.alert_type,
                current_level: level,
                scheduled_at: inner.scheduler.now(),
                cancel,
                sound: Some(sound),
                generation,
            },
        );
        log::debug!(
            "Escalation started for alert {} at level {}",
            alert.id,
            level
        );
    }

    /// Stop escalating `id`: cancel its timer, stop its sound and freeze its
    /// level. Returns the frozen level, or None if the alert was not escalating.
    pub fn cancel(&self, id: AlertId) -> Option<u8> {
        let inner = &self.inner;
        let mut state = inner.lock();
        let timer = state.timers.remove(&id)?;
        let level = timer.current_level;
        state.frozen.insert(id, level);
        release(inner, timer);
        Some(level)
    }

    /// Cancel every running chain under one lock. Returns (id, frozen level).
    pub fn cancel_all(&self) -> Vec<(AlertId, u8)> {
        let inner = &self.inner;
        let mut state = inner.lock();
        let timers: Vec<EscalationTimer> = state.timers.drain().map(|(_, t)| t).collect();
        timers
            .into_iter()
            .map(|timer| {
                let entry = (timer.alert_id, timer.current_level);
                state.frozen.insert(timer.alert_id, timer.current_level);
                release(inner, timer);
                entry
            })
            .collect()
    }

    /// Drop all state for an alert that left the registry.
    pub fn forget(&self, id: AlertId) {
        let inner = &self.inner;
        let mut state = inner.lock();
        state.frozen.remove(&id);
        if let Some(timer) = state.timers.remove(&id) {
            release(inner, timer);
            log::debug!("Escalation dropped for evicted alert {}", id);
        }
    }

    /// Live level, or the frozen level after acknowledgment.
    pub fn level(&self, id: AlertId) -> Option<u8> {
        let state = self.inner.lock();
        state
            .timers
            .get(&id)
            .map(|t| t.current_level)
            .or_else(|| state.frozen.get(&id).copied())
    }

    pub fn is_escalating(&self, id: AlertId) -> bool {
        self.inner.lock().timers.contains_key(&id)
    }

    pub fn tied_sound(&self, id: AlertId) -> Option<SoundHandle> {
        self.inner.lock().timers.get(&id).and_then(|t| t.sound)
    }

    pub fn active_count(&self) -> usize {
        self.inner.lock().timers.len()
    }
}

fn release(inner: &EscalationInner, mut timer: EscalationTimer) {
    if let Some(cancel) = timer.cancel.take() {
        cancel.cancel();
    }
    if let Some(handle) = timer.sound.take() {
        inner.sound.stop(handle, Duration::ZERO);
    }
}

fn play_level(
    inner: &EscalationInner,
    ladder: &EscalationLadder,
    alert_type: AlertType,
    level: u8,
) -> SoundHandle {
    let sound_type = ladder.sound_for(level, alert_type.base_sound());
    let intensity = ladder.step(level).intensity;
    inner
        .sound
        .play(sound_type, PlayOptions::new().gain(intensity))
}

fn schedule_next(
    inner: &Arc<EscalationInner>,
    ladder: &EscalationLadder,
    id: AlertId,
    level: u8,
    generation: u64,
) -> Option<CancelHandle> {
    if level >= ladder.max_level() {
        return None;
    }
    let weak: Weak<EscalationInner> = Arc::downgrade(inner);
    Some(inner.scheduler.schedule(
        ladder.step(level).interval(),
        Box::new(move || {
            if let Some(inner) = weak.upgrade() {
                advance_level(&inner, id, generation);
            }
        }),
    ))
}

fn advance_level(inner: &Arc<EscalationInner>, id: AlertId, generation: u64) {
    let (observer, level) = {
        let mut guard = inner.lock();
        let state = &mut *guard;
        let timer = match state.timers.get_mut(&id) {
            Some(timer) if timer.generation == generation => timer,
            _ => return,
        };

        let level = (timer.current_level + 1).min(state.ladder.max_level());
        if level == timer.current_level {
            timer.cancel = None;
            return;
        }

        if let Some(previous) = timer.sound.take() {
            inner.sound.stop(previous, Duration::ZERO);
        }
        timer.current_level = level;
        timer.scheduled_at = inner.scheduler.now();
        timer.sound = Some(play_level(inner, &state.ladder, timer.alert_type, level));
        timer.cancel = schedule_next(inner, &state.ladder, id, level, generation);

        log::info!("Alert {} escalated to level {}", id, level);
        (state.observer.clone(), level)
    };
    if let Some(observer) = observer {
        observer(id, level);
    }
}
