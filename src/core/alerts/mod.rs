// Alert classification for raw detection signals.
//
// Architecture:
// - model.rs: Alert types, severities and the alert event
// - triggers.rs: Signal shapes and per-type classification rules
// - engine.rs: Thresholds, cooldowns and alert issuing

pub mod engine;
pub mod model;
pub mod triggers;
