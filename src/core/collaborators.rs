// Narrow interfaces to the host: durable storage, user notifications and
// settings. The core calls them outside its locks and never fails because of
// them.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use super::alerts::engine::Thresholds;
use super::alerts::model::{AlertEvent, AlertId};
use super::error::CollaboratorError;

pub trait Persistence: Send + Sync {
    fn record_alert(&self, alert: &AlertEvent) -> Result<(), CollaboratorError>;

    fn update_acknowledgment(&self, id: AlertId, at: DateTime<Utc>) -> Result<(), CollaboratorError>;
}

/// Delivery hints for a notification.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NotifyOptions {
    /// Notifications with the same tag replace each other
    pub tag: Option<String>,
    /// Stay on screen until the user dismisses it
    pub require_interaction: bool,
    pub data: Map<String, Value>,
}

pub trait Notifier: Send + Sync {
    fn notify(&self, title: &str, body: &str, options: NotifyOptions) -> Result<(), CollaboratorError>;
}

/// Pull-only view of the current effective settings.
pub trait SettingsSource: Send + Sync {
    fn thresholds(&self) -> Thresholds;

    /// User volume (0-1)
    fn volume(&self) -> f32;

    fn is_muted(&self) -> bool;

    fn is_emergency_mode_enabled(&self) -> bool;
}

/// Persistence that keeps nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoPersistence;

impl Persistence for NoPersistence {
    fn record_alert(&self, _: &AlertEvent) -> Result<(), CollaboratorError> {
        Ok(())
    }

    fn update_acknowledgment(&self, _: AlertId, _: DateTime<Utc>) -> Result<(), CollaboratorError> {
        Ok(())
    }
}

/// Notifier that only logs.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, title: &str, body: &str, _: NotifyOptions) -> Result<(), CollaboratorError> {
        log::info!("Notification: {} - {}", title, body);
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    /// Records everything; can be switched to fail every call.
    #[derive(Default)]
    pub struct RecordingCollaborator {
        pub recorded: Mutex<Vec<AlertEvent>>,
        pub acknowledged: Mutex<Vec<AlertId>>,
        pub notifications: Mutex<Vec<(String, String, NotifyOptions)>>,
        pub fail: AtomicBool,
    }

    impl RecordingCollaborator {
        pub fn failing() -> Self {
            let collaborator = Self::default();
            collaborator.fail.store(true, Ordering::SeqCst);
            collaborator
        }

        pub fn notification_titles(&self) -> Vec<String> {
            self.notifications
                .lock()
                .unwrap()
                .iter()
                .map(|(title, _, _)| title.clone())
                .collect()
        }

        fn check(&self) -> Result<(), CollaboratorError> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(CollaboratorError::Unavailable("test collaborator offline".to_string()));
            }
            Ok(())
        }
    }

    impl Persistence for RecordingCollaborator {
        fn record_alert(&self, alert: &AlertEvent) -> Result<(), CollaboratorError> {
            self.recorded.lock().unwrap().push(alert.clone());
            self.check()
        }

        fn update_acknowledgment(&self, id: AlertId, _: DateTime<Utc>) -> Result<(), CollaboratorError> {
            self.acknowledged.lock().unwrap().push(id);
            self.check()
        }
    }

    impl Notifier for RecordingCollaborator {
        fn notify(&self, title: &str, body: &str, options: NotifyOptions) -> Result<(), CollaboratorError> {
            self.notifications
                .lock()
                .unwrap()
                .push((title.to_string(), body.to_string(), options));
            self.check()
        }
    }
}
