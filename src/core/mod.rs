// Decision and output core.
//
// Architecture:
// - alerts/: Signal classification, thresholds and cooldowns
// - registry.rs: Bounded alert log with acknowledgment state
// - escalation.rs: Per-alert escalation ladder timers
// - sound/: Priority-arbitrated sound engine and audio backends
// - arming.rs: Intrusion arming state machine
// - coordinator.rs: Wires the above together and calls collaborators

pub mod alerts;
pub mod arming;
pub mod collaborators;
pub mod config;
pub mod cooldown;
pub mod coordinator;
pub mod error;
pub mod escalation;
pub mod registry;
pub mod scheduler;
pub mod sound;
