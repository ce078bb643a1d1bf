//! Notification and alert sinks.
//!
//! `LoggingNotifier` writes structured log lines and is what the service
//! runs with; `RecordingNotifier` keeps everything for assertions.

use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use crate::ports::{OperatorAlert, OperatorAlerter, StatusNotification, UserNotifier};

#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingNotifier;

#[async_trait]
impl UserNotifier for LoggingNotifier {
    async fn notify_status_change(&self, notification: StatusNotification) -> Result<(), String> {
        tracing::info!(
            target: "notifications",
            subscription_id = %notification.subscription_id,
            user_id = %notification.user_id,
            from = %notification.from,
            to = %notification.to,
            "subscription status changed"
        );
        Ok(())
    }
}

#[async_trait]
impl OperatorAlerter for LoggingNotifier {
    async fn alert(&self, alert: OperatorAlert) -> Result<(), String> {
        let payload = serde_json::to_string(&alert).map_err(|e| e.to_string())?;
        tracing::error!(target: "operator_alerts", alert = %payload, "operator attention required");
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    notifications: Mutex<Vec<StatusNotification>>,
    alerts: Mutex<Vec<OperatorAlert>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    match m.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notifications(&self) -> Vec<StatusNotification> {
        lock(&self.notifications).clone()
    }

    pub fn alerts(&self) -> Vec<OperatorAlert> {
        lock(&self.alerts).clone()
    }
}

#[async_trait]
impl UserNotifier for RecordingNotifier {
    async fn notify_status_change(&self, notification: StatusNotification) -> Result<(), String> {
        lock(&self.notifications).push(notification);
        Ok(())
    }
}

#[async_trait]
impl OperatorAlerter for RecordingNotifier {
    async fn alert(&self, alert: OperatorAlert) -> Result<(), String> {
        lock(&self.alerts).push(alert);
        Ok(())
    }
}
