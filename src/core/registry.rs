//! Bounded, most-recent-first log of alerts and their acknowledgment state.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};

use super::alerts::model::{AlertEvent, AlertId};

pub const DEFAULT_REGISTRY_CAPACITY: usize = 100;

pub struct AlertRegistry {
    alerts: VecDeque<AlertEvent>,
    capacity: usize,
}

impl AlertRegistry {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            alerts: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Prepend an alert. Returns the alerts pushed off the tail.
    pub fn push(&mut self, alert: AlertEvent) -> Vec<AlertEvent> {
        self.alerts.push_front(alert);
        let mut evicted = Vec::new();
        while self.alerts.len() > self.capacity {
            if let Some(oldest) = self.alerts.pop_back() {
                evicted.push(oldest);
            }
        }
        evicted
    }

    /// Acknowledge one alert. Returns true only on the first acknowledgment;
    /// unknown ids and repeats are no-ops.
    pub fn acknowledge(&mut self, id: AlertId, at: DateTime<Utc>) -> bool {
        self.alerts
            .iter_mut()
            .find(|alert| alert.id == id)
            .map(|alert| alert.acknowledge(at))
            .unwrap_or(false)
    }

    /// Acknowledge every unacknowledged alert. Returns the ids that changed.
    pub fn acknowledge_all(&mut self, at: DateTime<Utc>) -> Vec<AlertId> {
        self.alerts
            .iter_mut()
            .filter_map(|alert| alert.acknowledge(at).then_some(alert.id))
            .collect()
    }

    pub fn get(&self, id: AlertId) -> Option<&AlertEvent> {
        self.alerts.iter().find(|alert| alert.id == id)
    }

    /// Up to `limit` alerts, newest first.
    pub fn recent(&self, limit: usize) -> Vec<AlertEvent> {
        self.alerts.iter().take(limit).cloned().collect()
    }

    pub fn unacknowledged(&self) -> Vec<AlertEvent> {
        self.alerts
            .iter()
            .filter(|alert| !alert.acknowledged)
            .cloned()
            .collect()
    }

    pub fn unacknowledged_count(&self) -> usize {
        self.alerts.iter().filter(|alert| !alert.acknowledged).count()
    }

    pub fn len(&self) -> usize {
        self.alerts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.alerts.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for AlertRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_REGISTRY_CAPACITY)
    }
}
