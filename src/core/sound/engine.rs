//! Priority-arbitrated sound engine.
//!
//! At most `max_concurrent` sounds are active. Admitting a new sound when full
//! evicts the lowest-priority active sound, oldest first, regardless of the
//! new sound's priority. Sounds already fading out are evicted before anything
//! else.
//!
//! Emergency-type sounds always play at full volume and are never muted.
//! While emergency mode is on, every newly played sound also ignores user
//! volume and mute; sounds keep the rules they started with when the mode
//! changes.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use super::model::{
    EndCallback, PlayOptions, SoundEngineConfig, SoundHandle, SoundInfo, SoundRequest, SoundType,
};
use super::output::{AudioOutput, SilentOutput};
use crate::core::scheduler::{CancelHandle, Scheduler};

#[derive(Debug, Clone, Copy)]
enum Ramp {
    In,
    Out,
}

struct ActiveSound {
    request: SoundRequest,
    started_at: Duration,
    ignores_volume: bool,
    ignores_mute: bool,
    gain: f32,
    /// Volume the output currently has (differs from the target while fading)
    current_volume: f32,
    fade_from: f32,
    muted: bool,
    stopping: bool,
    on_end: Option<EndCallback>,
    completion: Option<CancelHandle>,
    fade: Vec<CancelHandle>,
}

impl ActiveSound {
    fn handle(&self) -> SoundHandle {
        self.request.handle
    }

    fn is_fading(&self) -> bool {
        self.fade.iter().any(CancelHandle::is_pending)
    }

    fn cancel_timers(&mut self) {
        if let Some(completion) = self.completion.take() {
            completion.cancel();
        }
        for fade in self.fade.drain(..) {
            fade.cancel();
        }
    }

    fn info(&self) -> SoundInfo {
        SoundInfo {
            handle: self.handle(),
            sound_type: self.request.sound_type,
            volume: self.request.volume,
            muted: self.muted,
            looping: self.request.looping,
            started_at: self.started_at,
            stopping: self.stopping,
        }
    }
}

struct SoundState {
    active: Vec<ActiveSound>,
    next_handle: SoundHandle,
    user_volume: f32,
    muted: bool,
    emergency_mode: bool,
    emergency_alarm: Option<SoundHandle>,
}

impl SoundState {
    fn position(&self, handle: SoundHandle) -> Option<usize> {
        self.active.iter().position(|s| s.handle() == handle)
    }
}

struct SoundInner {
    scheduler: Arc<dyn Scheduler>,
    output: Arc<dyn AudioOutput>,
    config: SoundEngineConfig,
    state: Mutex<SoundState>,
}

impl SoundInner {
    fn lock(&self) -> MutexGuard<'_, SoundState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn set_output_volume(&self, handle: SoundHandle, volume: f32) {
        if let Err(e) = self.output.set_volume(handle, volume) {
            log::warn!("Failed to set volume of sound {}: {}", handle, e);
        }
    }

    fn set_output_muted(&self, handle: SoundHandle, muted: bool) {
        if let Err(e) = self.output.set_muted(handle, muted) {
            log::warn!("Failed to set mute of sound {}: {}", handle, e);
        }
    }
}

/// Shared handle to the sound engine. Clones drive the same engine.
#[derive(Clone)]
pub struct SoundEngine {
    inner: Arc<SoundInner>,
}

impl SoundEngine {
    pub fn new(
        scheduler: Arc<dyn Scheduler>,
        output: Arc<dyn AudioOutput>,
        config: SoundEngineConfig,
    ) -> Self {
        Self {
            inner: Arc::new(SoundInner {
                scheduler,
                output,
                config,
                state: Mutex::new(SoundState {
                    active: Vec::new(),
                    next_handle: 1,
                    user_volume: 1.0,
                    muted: false,
                    emergency_mode: false,
                    emergency_alarm: None,
                }),
            }),
        }
    }

    /// Engine without an audio device.
    pub fn silent(scheduler: Arc<dyn Scheduler>, config: SoundEngineConfig) -> Self {
        Self::new(scheduler, Arc::new(SilentOutput), config)
    }

    pub fn max_concurrent(&self) -> usize {
        self.inner.config.max_concurrent.max(1)
    }

    /// Start a sound and return its handle. Never fails: output errors are
    /// logged and the sound is tracked as if it played.
    pub fn play(&self, sound_type: SoundType, options: PlayOptions) -> SoundHandle {
        let mut state = self.inner.lock();
        play_locked(&self.inner, &mut state, sound_type, options)
    }

    /// Stop a sound, ramping to silence over `fade_out` first. Unknown handles
    /// are ignored.
    pub fn stop(&self, handle: SoundHandle, fade_out: Duration) {
        let inner = &self.inner;
        let mut state = inner.lock();
        let idx = match state.position(handle) {
            Some(idx) => idx,
            None => return,
        };

        if fade_out.is_zero() {
            let sound = state.active.remove(idx);
            release(inner, &mut state, sound);
            return;
        }
        if state.active[idx].stopping {
            return;
        }

        let fade = schedule_ramp(inner, handle, Ramp::Out, fade_out);
        let sound = &mut state.active[idx];
        sound.cancel_timers();
        sound.stopping = true;
        sound.fade_from = sound.current_volume;
        sound.fade = fade;
    }

    /// Stop every sound of `sound_type` using each sound's own fade-out.
    pub fn stop_by_type(&self, sound_type: SoundType) {
        let targets: Vec<(SoundHandle, Duration)> = self
            .inner
            .lock()
            .active
            .iter()
            .filter(|s| s.request.sound_type == sound_type)
            .map(|s| (s.handle(), s.request.fade_out))
            .collect();
        for (handle, fade_out) in targets {
            self.stop(handle, fade_out);
        }
    }

    /// Stop everything immediately.
    pub fn stop_all(&self) {
        let inner = &self.inner;
        let mut state = inner.lock();
        let sounds: Vec<ActiveSound> = state.active.drain(..).collect();
        for sound in sounds {
            release(inner, &mut state, sound);
        }
    }

    /// Turn on emergency mode and start the looping emergency alarm.
    /// Calling it while the alarm is already playing returns the same handle.
    pub fn start_emergency_alarm(&self) -> SoundHandle {
        let inner = &self.inner;
        let mut state = inner.lock();
        state.emergency_mode = true;
        if let Some(handle) = state.emergency_alarm {
            if state.position(handle).is_some() {
                return handle;
            }
        }
        let handle = play_locked(
            inner,
            &mut state,
            SoundType::Emergency,
            PlayOptions::new().looping(true),
        );
        state.emergency_alarm = Some(handle);
        log::warn!("Emergency alarm started (sound {})", handle);
        handle
    }

    /// Turn off emergency mode and stop the alarm. Other sounds keep playing
    /// with the volume and mute rules they started with.
    pub fn stop_emergency_alarm(&self) {
        let inner = &self.inner;
        let mut state = inner.lock();
        state.emergency_mode = false;
        if let Some(handle) = state.emergency_alarm.take() {
            if let Some(idx) = state.position(handle) {
                let sound = state.active.remove(idx);
                release(inner, &mut state, sound);
            }
            log::info!("Emergency alarm stopped");
        }
    }

    pub fn is_emergency_mode(&self) -> bool {
        self.inner.lock().emergency_mode
    }

    /// User volume fraction in 0..=1; applies to active sounds that honour it.
    pub fn set_user_volume(&self, volume: f32) {
        let volume = clamp_fraction(volume);
        let inner = &self.inner;
        let mut state = inner.lock();
        if state.user_volume == volume {
            return;
        }
        state.user_volume = volume;
        for sound in state.active.iter_mut().filter(|s| !s.ignores_volume) {
            sound.request.volume =
                target_volume(sound.request.sound_type, sound.gain, false, volume);
            if !sound.stopping && !sound.is_fading() {
                sound.current_volume = sound.request.volume;
                inner.set_output_volume(sound.handle(), sound.current_volume);
            }
        }
    }

    pub fn user_volume(&self) -> f32 {
        self.inner.lock().user_volume
    }

    /// Global mute; never applies to emergency sounds or sounds started in
    /// emergency mode.
    pub fn set_global_mute(&self, muted: bool) {
        let inner = &self.inner;
        let mut state = inner.lock();
        if state.muted == muted {
            return;
        }
        state.muted = muted;
        for sound in state.active.iter_mut().filter(|s| !s.ignores_mute) {
            if sound.muted != muted {
                sound.muted = muted;
                inner.set_output_muted(sound.handle(), muted);
            }
        }
    }

    pub fn is_muted(&self) -> bool {
        self.inner.lock().muted
    }

    pub fn is_playing(&self, handle: SoundHandle) -> bool {
        self.inner.lock().position(handle).is_some()
    }

    pub fn is_playing_type(&self, sound_type: SoundType) -> bool {
        self.inner
            .lock()
            .active
            .iter()
            .any(|s| s.request.sound_type == sound_type)
    }

    pub fn active_count(&self) -> usize {
        self.inner.lock().active.len()
    }

    pub fn active_sounds(&self) -> Vec<SoundInfo> {
        self.inner.lock().active.iter().map(ActiveSound::info).collect()
    }

    pub fn sound_info(&self, handle: SoundHandle) -> Option<SoundInfo> {
        let state = self.inner.lock();
        state.position(handle).map(|idx| state.active[idx].info())
    }
}

fn clamp_fraction(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

fn target_volume(sound_type: SoundType, gain: f32, ignores_volume: bool, user_volume: f32) -> f32 {
    if sound_type.is_emergency() {
        1.0
    } else if ignores_volume {
        sound_type.base_volume()
    } else {
        sound_type.base_volume() * gain * user_volume
    }
}

fn play_locked(
    inner: &Arc<SoundInner>,
    state: &mut SoundState,
    sound_type: SoundType,
    options: PlayOptions,
) -> SoundHandle {
    let handle = state.next_handle;
    state.next_handle += 1;

    let capacity = inner.config.max_concurrent.max(1);
    while state.active.len() >= capacity {
        let victim = state
            .active
            .iter()
            .enumerate()
            .min_by_key(|(_, s)| (!s.stopping, s.request.priority, s.started_at, s.handle()))
            .map(|(idx, _)| idx);
        match victim {
            Some(idx) => {
                let sound = state.active.remove(idx);
                log::info!(
                    "Evicting {:?} sound {} to admit {:?}",
                    sound.request.sound_type,
                    sound.handle(),
                    sound_type
                );
                release(inner, state, sound);
            }
            None => break,
        }
    }

    let emergency = sound_type.is_emergency();
    let ignores_volume = emergency || state.emergency_mode || options.force_max_volume;
    let ignores_mute = emergency || state.emergency_mode;
    let gain = clamp_fraction(options.gain.unwrap_or(1.0));
    let volume = target_volume(sound_type, gain, ignores_volume, state.user_volume);
    let muted = !ignores_mute && state.muted;
    let looping = options.looping.unwrap_or_else(|| sound_type.default_loop());
    let fade_in = if emergency {
        Duration::ZERO
    } else {
        options.fade_in.unwrap_or_else(|| sound_type.default_fade_in())
    };
    let fade_out = options
        .fade_out
        .unwrap_or_else(|| sound_type.default_fade_out());

    let initial_volume = if fade_in.is_zero() { volume } else { 0.0 };
    if let Err(e) = inner
        .output
        .start(handle, sound_type, initial_volume, muted, looping)
    {
        log::warn!(
            "Audio output rejected {:?} sound {}, continuing silently: {}",
            sound_type,
            handle,
            e
        );
    }

    let fade = if fade_in.is_zero() {
        Vec::new()
    } else {
        schedule_ramp(inner, handle, Ramp::In, fade_in)
    };
    let completion = if looping {
        None
    } else {
        let weak = Arc::downgrade(inner);
        Some(inner.scheduler.schedule(
            sound_type.cue_length(),
            Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    complete(&inner, handle);
                }
            }),
        ))
    };

    state.active.push(ActiveSound {
        request: SoundRequest {
            handle,
            sound_type,
            priority: sound_type.priority(),
            volume,
            looping,
            fade_in,
            fade_out,
            force_max_volume: options.force_max_volume,
            is_emergency: emergency,
        },
        started_at: inner.scheduler.now(),
        ignores_volume,
        ignores_mute,
        gain,
        current_volume: initial_volume,
        fade_from: initial_volume,
        muted,
        stopping: false,
        on_end: options.on_end,
        completion,
        fade,
    });

    log::debug!(
        "Playing {:?} sound {} (volume {:.2}, muted {}, loop {})",
        sound_type,
        handle,
        volume,
        muted,
        looping
    );
    handle
}

/// Tear down a sound already removed from the active set.
fn release(inner: &SoundInner, state: &mut SoundState, mut sound: ActiveSound) {
    sound.cancel_timers();
    let handle = sound.handle();
    if state.emergency_alarm == Some(handle) {
        state.emergency_alarm = None;
    }
    if let Err(e) = inner.output.stop(handle) {
        log::warn!("Failed to stop sound {}: {}", handle, e);
    }
}

/// Long fades stretch their steps rather than queueing more of them.
const MAX_RAMP_STEPS: u32 = 100;

fn schedule_ramp(
    inner: &Arc<SoundInner>,
    handle: SoundHandle,
    ramp: Ramp,
    over: Duration,
) -> Vec<CancelHandle> {
    let step_ms = u128::from(inner.config.fade_step_ms.max(1));
    let steps = u32::try_from(over.as_millis().div_ceil(step_ms))
        .unwrap_or(u32::MAX)
        .clamp(1, MAX_RAMP_STEPS);
    (1..=steps)
        .map(|i| {
            let weak = Arc::downgrade(inner);
            let fraction = i as f32 / steps as f32;
            let last = i == steps;
            inner.scheduler.schedule(
                over * i / steps,
                Box::new(move || {
                    if let Some(inner) = weak.upgrade() {
                        ramp_step(&inner, handle, ramp, fraction, last);
                    }
                }),
            )
        })
        .collect()
}

fn ramp_step(inner: &Arc<SoundInner>, handle: SoundHandle, ramp: Ramp, fraction: f32, last: bool) {
    let mut state = inner.lock();
    let idx = match state.position(handle) {
        Some(idx) => idx,
        None => return,
    };

    match ramp {
        Ramp::In => {
            let sound = &mut state.active[idx];
            if sound.stopping {
                return;
            }
            sound.current_volume = sound.request.volume * fraction;
            inner.set_output_volume(handle, sound.current_volume);
        }
        Ramp::Out if last => {
            let sound = state.active.remove(idx);
            release(inner, &mut state, sound);
        }
        Ramp::Out => {
            let sound = &mut state.active[idx];
            sound.current_volume = sound.fade_from * (1.0 - fraction);
            inner.set_output_volume(handle, sound.current_volume);
        }
    }
}

/// Natural end of a non-looping sound.
fn complete(inner: &Arc<SoundInner>, handle: SoundHandle) {
    let callback = {
        let mut state = inner.lock();
        let idx = match state.position(handle) {
            Some(idx) => idx,
            None => return,
        };
        if state.active[idx].stopping {
            return;
        }
        let mut sound = state.active.remove(idx);
        let callback = sound.on_end.take();
        release(inner, &mut state, sound);
        callback
    };
    // Outside the lock so callbacks may call back into the engine.
    if let Some(callback) = callback {
        callback(handle);
    }
}
