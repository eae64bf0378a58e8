#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
// The ultimate strictness: catches things like missing documentation or overflow risks
#![warn(clippy::restriction)]
//! Decision core for a local pet, infant and dependent-adult monitor: turns
//! raw detection signals into alerts, escalates the ones nobody answers and
//! arbitrates a small set of concurrently playing sounds.

pub mod core;

pub use crate::core::config::{ConfigManager, Settings, SharedSettings};
pub use crate::core::coordinator::{AlertNotice, Collaborators, Coordinator};
pub use crate::core::scheduler::{ManualScheduler, Scheduler, TokioScheduler};
