// Sound model types: the closed set of cues, their fixed priorities and
// per-type playback defaults, plus request/option shapes for the engine.

use std::time::Duration;

use serde::{Deserialize, Serialize};

pub type SoundHandle = u64;

/// Called once when a non-looping sound finishes on its own.
pub type EndCallback = Box<dyn FnOnce(SoundHandle) + Send + 'static>;

/// Audio cue kind, ordered by priority (emergency highest).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SoundType {
    Chime,
    Notification,
    Warning,
    Alert,
    Critical,
    Emergency,
}

impl SoundType {
    /// Fixed ordinal priority, monotonically increasing with severity.
    pub fn priority(&self) -> u8 {
        match self {
            Self::Chime => 1,
            Self::Notification => 2,
            Self::Warning => 3,
            Self::Alert => 4,
            Self::Critical => 5,
            Self::Emergency => 6,
        }
    }

    /// Volume before user volume and gain are applied.
    pub fn base_volume(&self) -> f32 {
        match self {
            Self::Chime => 0.5,
            Self::Notification => 0.6,
            Self::Warning => 0.7,
            Self::Alert => 0.8,
            Self::Critical => 0.9,
            Self::Emergency => 1.0,
        }
    }

    pub fn is_emergency(&self) -> bool {
        matches!(self, Self::Emergency)
    }

    pub fn default_loop(&self) -> bool {
        matches!(self, Self::Critical | Self::Emergency)
    }

    pub fn default_fade_in(&self) -> Duration {
        match self {
            Self::Chime | Self::Notification => Duration::from_millis(100),
            Self::Warning | Self::Alert => Duration::from_millis(50),
            Self::Critical | Self::Emergency => Duration::ZERO,
        }
    }

    pub fn default_fade_out(&self) -> Duration {
        match self {
            Self::Chime | Self::Notification => Duration::from_millis(200),
            Self::Warning | Self::Alert | Self::Critical => Duration::from_millis(150),
            Self::Emergency => Duration::ZERO,
        }
    }

    /// Length of one pass of the cue; non-looping sounds end after this.
    pub fn cue_length(&self) -> Duration {
        match self {
            Self::Chime => Duration::from_millis(800),
            Self::Notification => Duration::from_millis(1200),
            Self::Warning => Duration::from_millis(2000),
            Self::Alert => Duration::from_millis(2500),
            Self::Critical => Duration::from_millis(3000),
            Self::Emergency => Duration::from_millis(4000),
        }
    }

    /// Tone used by synthesized output backends.
    pub fn tone_hz(&self) -> f32 {
        match self {
            Self::Chime => 880.0,
            Self::Notification => 660.0,
            Self::Warning => 740.0,
            Self::Alert => 988.0,
            Self::Critical => 1175.0,
            Self::Emergency => 1397.0,
        }
    }

    pub fn all() -> &'static [SoundType] {
        &[
            Self::Chime,
            Self::Notification,
            Self::Warning,
            Self::Alert,
            Self::Critical,
            Self::Emergency,
        ]
    }
}

/// Caller options for `SoundEngine::play`. Unset fields use the type's defaults.
#[derive(Default)]
pub struct PlayOptions {
    pub looping: Option<bool>,
    pub fade_in: Option<Duration>,
    pub fade_out: Option<Duration>,
    /// Ignore user volume (not mute)
    pub force_max_volume: bool,
    /// Extra attenuation in 0..=1, e.g. an escalation level's intensity
    pub gain: Option<f32>,
    pub on_end: Option<EndCallback>,
}

impl PlayOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn looping(mut self, looping: bool) -> Self {
        self.looping = Some(looping);
        self
    }

    pub fn fade_in(mut self, fade: Duration) -> Self {
        self.fade_in = Some(fade);
        self
    }

    pub fn fade_out(mut self, fade: Duration) -> Self {
        self.fade_out = Some(fade);
        self
    }

    pub fn force_max_volume(mut self) -> Self {
        self.force_max_volume = true;
        self
    }

    pub fn gain(mut self, gain: f32) -> Self {
        self.gain = Some(gain);
        self
    }

    pub fn on_end(mut self, callback: impl FnOnce(SoundHandle) + Send + 'static) -> Self {
        self.on_end = Some(Box::new(callback));
        self
    }
}

/// A play request with every option resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct SoundRequest {
    pub handle: SoundHandle,
    pub sound_type: SoundType,
    pub priority: u8,
    pub volume: f32,
    pub looping: bool,
    pub fade_in: Duration,
    pub fade_out: Duration,
    pub force_max_volume: bool,
    pub is_emergency: bool,
}

/// Snapshot of an active sound.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SoundInfo {
    pub handle: SoundHandle,
    pub sound_type: SoundType,
    /// Target volume once any fade-in completes
    pub volume: f32,
    pub muted: bool,
    pub looping: bool,
    pub started_at: Duration,
    pub stopping: bool,
}

/// Engine configuration - persisted in settings.json
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SoundEngineConfig {
    /// Maximum number of simultaneously active sounds (K)
    pub max_concurrent: usize,
    /// Granularity of volume ramps
    pub fade_step_ms: u64,
}

impl Default for SoundEngineConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 3,
            fade_step_ms: 50,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priorities_strictly_increase() {
        let priorities: Vec<u8> = SoundType::all().iter().map(|t| t.priority()).collect();
        assert!(priorities.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(
            SoundType::all().iter().max_by_key(|t| t.priority()),
            Some(&SoundType::Emergency)
        );
    }

    #[test]
    fn test_emergency_defaults() {
        assert!(SoundType::Emergency.is_emergency());
        assert!(SoundType::Emergency.default_loop());
        assert_eq!(SoundType::Emergency.base_volume(), 1.0);
        assert!(!SoundType::Notification.default_loop());
    }

    #[test]
    fn test_options_builder() {
        let options = PlayOptions::new().looping(true).gain(0.5).force_max_volume();
        assert_eq!(options.looping, Some(true));
        assert_eq!(options.gain, Some(0.5));
        assert!(options.force_max_volume);
        assert!(options.on_end.is_none());
    }
}
