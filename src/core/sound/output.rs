//! Audio output backends.
//!
//! The engine decides what plays; an [`AudioOutput`] only renders it. Backend
//! errors are reported back to the engine, which logs them and keeps going.

use super::model::{SoundHandle, SoundType};
use crate::core::error::AudioError;

pub trait AudioOutput: Send + Sync {
    fn start(
        &self,
        handle: SoundHandle,
        sound_type: SoundType,
        volume: f32,
        muted: bool,
        looping: bool,
    ) -> Result<(), AudioError>;

    fn set_volume(&self, handle: SoundHandle, volume: f32) -> Result<(), AudioError>;

    fn set_muted(&self, handle: SoundHandle, muted: bool) -> Result<(), AudioError>;

    fn stop(&self, handle: SoundHandle) -> Result<(), AudioError>;
}

/// Backend that renders nothing. Used headless and as the degraded fallback.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentOutput;

impl AudioOutput for SilentOutput {
    fn start(&self, _: SoundHandle, _: SoundType, _: f32, _: bool, _: bool) -> Result<(), AudioError> {
        Ok(())
    }

    fn set_volume(&self, _: SoundHandle, _: f32) -> Result<(), AudioError> {
        Ok(())
    }

    fn set_muted(&self, _: SoundHandle, _: bool) -> Result<(), AudioError> {
        Ok(())
    }

    fn stop(&self, _: SoundHandle) -> Result<(), AudioError> {
        Ok(())
    }
}

#[cfg(feature = "audio")]
pub use self::rodio_backend::RodioOutput;

#[cfg(feature = "audio")]
mod rodio_backend {
    use std::collections::HashMap;
    use std::sync::mpsc::{self, Receiver, Sender};
    use std::sync::Mutex;
    use std::thread;

    use rodio::source::SineWave;
    use rodio::{OutputStreamBuilder, Sink, Source};

    use super::AudioOutput;
    use crate::core::error::AudioError;
    use crate::core::sound::model::{SoundHandle, SoundType};

    /// Headroom for the synthesized tones.
    const TONE_AMPLITUDE: f32 = 0.25;

    enum Command {
        Start {
            handle: SoundHandle,
            sound_type: SoundType,
            volume: f32,
            muted: bool,
            looping: bool,
        },
        SetVolume(SoundHandle, f32),
        SetMuted(SoundHandle, bool),
        Stop(SoundHandle),
    }

    struct Voice {
        sink: Sink,
        volume: f32,
        muted: bool,
    }

    impl Voice {
        fn apply(&self) {
            self.sink.set_volume(if self.muted { 0.0 } else { self.volume });
        }
    }

    /// Synthesized tones through rodio. The output stream lives on its own
    /// thread; calls only enqueue commands.
    pub struct RodioOutput {
        commands: Mutex<Sender<Command>>,
    }

    impl RodioOutput {
        pub fn new() -> Self {
            let (tx, rx) = mpsc::channel();
            let spawned = thread::Builder::new()
                .name("nest-watcher-audio".to_string())
                .spawn(move || run_output(rx));
            if let Err(e) = spawned {
                log::warn!("Failed to spawn audio thread: {}", e);
            }
            Self {
                commands: Mutex::new(tx),
            }
        }

        fn send(&self, command: Command) -> Result<(), AudioError> {
            let tx = self.commands.lock().map_err(|_| AudioError::BackendGone)?;
            tx.send(command).map_err(|_| AudioError::BackendGone)
        }
    }

    impl Default for RodioOutput {
        fn default() -> Self {
            Self::new()
        }
    }

    impl AudioOutput for RodioOutput {
        fn start(
            &self,
            handle: SoundHandle,
            sound_type: SoundType,
            volume: f32,
            muted: bool,
            looping: bool,
        ) -> Result<(), AudioError> {
            self.send(Command::Start {
                handle,
                sound_type,
                volume,
                muted,
                looping,
            })
        }

        fn set_volume(&self, handle: SoundHandle, volume: f32) -> Result<(), AudioError> {
            self.send(Command::SetVolume(handle, volume))
        }

        fn set_muted(&self, handle: SoundHandle, muted: bool) -> Result<(), AudioError> {
            self.send(Command::SetMuted(handle, muted))
        }

        fn stop(&self, handle: SoundHandle) -> Result<(), AudioError> {
            self.send(Command::Stop(handle))
        }
    }

    fn run_output(rx: Receiver<Command>) {
        let stream = match OutputStreamBuilder::open_default_stream() {
            Ok(stream) => stream,
            Err(e) => {
                // Dropping the receiver makes every later send fail with BackendGone.
                log::warn!("Audio output unavailable, running silent: {}", e);
                return;
            }
        };

        let mut voices: HashMap<SoundHandle, Voice> = HashMap::new();
        while let Ok(command) = rx.recv() {
            voices.retain(|_, voice| !voice.sink.empty());
            match command {
                Command::Start {
                    handle,
                    sound_type,
                    volume,
                    muted,
                    looping,
                } => {
                    let sink = Sink::connect_new(stream.mixer());
                    let tone = SineWave::new(sound_type.tone_hz())
                        .take_duration(sound_type.cue_length())
                        .amplify(TONE_AMPLITUDE);
                    if looping {
                        sink.append(tone.repeat_infinite());
                    } else {
                        sink.append(tone);
                    }
                    let voice = Voice { sink, volume, muted };
                    voice.apply();
                    voices.insert(handle, voice);
                }
                Command::SetVolume(handle, volume) => {
                    if let Some(voice) = voices.get_mut(&handle) {
                        voice.volume = volume;
                        voice.apply();
                    }
                }
                Command::SetMuted(handle, muted) => {
                    if let Some(voice) = voices.get_mut(&handle) {
                        voice.muted = muted;
                        voice.apply();
                    }
                }
                Command::Stop(handle) => {
                    if let Some(voice) = voices.remove(&handle) {
                        voice.sink.stop();
                    }
                }
            }
        }
    }
}

/// Backend that records every call, optionally rejecting them all.
#[cfg(test)]
#[derive(Default)]
pub(crate) struct RecordingOutput {
    pub events: std::sync::Mutex<Vec<OutputEvent>>,
    pub fail: std::sync::atomic::AtomicBool,
}

#[cfg(test)]
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum OutputEvent {
    Start(SoundHandle, SoundType, f32, bool),
    Volume(SoundHandle, f32),
    Muted(SoundHandle, bool),
    Stop(SoundHandle),
}

#[cfg(test)]
impl RecordingOutput {
    pub fn failing() -> Self {
        let output = Self::default();
        output.fail.store(true, std::sync::atomic::Ordering::SeqCst);
        output
    }

    pub fn events(&self) -> Vec<OutputEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn stopped(&self) -> Vec<SoundHandle> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                OutputEvent::Stop(handle) => Some(handle),
                _ => None,
            })
            .collect()
    }

    /// Last volume sent for `handle`, from start or a later update.
    pub fn last_volume(&self, handle: SoundHandle) -> Option<f32> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                OutputEvent::Start(h, _, volume, _) | OutputEvent::Volume(h, volume) if h == handle => {
                    Some(volume)
                }
                _ => None,
            })
            .last()
    }

    fn record(&self, event: OutputEvent) -> Result<(), AudioError> {
        self.events.lock().unwrap().push(event);
        if self.fail.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(AudioError::DeviceUnavailable("test device unplugged".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
impl AudioOutput for RecordingOutput {
    fn start(
        &self,
        handle: SoundHandle,
        sound_type: SoundType,
        volume: f32,
        muted: bool,
        _looping: bool,
    ) -> Result<(), AudioError> {
        self.record(OutputEvent::Start(handle, sound_type, volume, muted))
    }

    fn set_volume(&self, handle: SoundHandle, volume: f32) -> Result<(), AudioError> {
        self.record(OutputEvent::Volume(handle, volume))
    }

    fn set_muted(&self, handle: SoundHandle, muted: bool) -> Result<(), AudioError> {
        self.record(OutputEvent::Muted(handle, muted))
    }

    fn stop(&self, handle: SoundHandle) -> Result<(), AudioError> {
        self.record(OutputEvent::Stop(handle))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_output_reports_failures() {
        let output = RecordingOutput::failing();
        assert!(output.start(1, SoundType::Alert, 0.8, false, false).is_err());
        assert_eq!(output.events().len(), 1);
        assert_eq!(output.last_volume(1), Some(0.8));
    }

    #[test]
    fn test_silent_output_accepts_everything() {
        let output = SilentOutput;
        assert!(output.start(1, SoundType::Chime, 0.5, false, false).is_ok());
        assert!(output.set_volume(1, 0.2).is_ok());
        assert!(output.set_muted(1, true).is_ok());
        assert!(output.stop(1).is_ok());
        assert!(output.stop(42).is_ok());
    }
}
