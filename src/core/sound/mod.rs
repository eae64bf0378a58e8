// Sound playback for alerts.
//
// Architecture:
// - model.rs: Sound types, priorities and play options
// - engine.rs: Concurrency cap, priority eviction, fades, emergency alarm
// - output.rs: Audio backends (silent, rodio behind the `audio` feature)

pub mod engine;
pub mod model;
pub mod output;
