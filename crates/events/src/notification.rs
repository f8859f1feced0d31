//! Notification intents: "tell role X about event Y".
//!
//! The engine never delivers notifications. It hands intents to a [`Notifier`] after the
//! owning transaction commits; push/email delivery and persistence belong to whoever
//! consumes them.

use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use toolroom_core::Role;

use crate::bus::EventBus;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationIntent {
    pub role: Role,
    pub title: String,
    pub message: String,
    pub related_entity_type: String,
    pub related_entity_id: String,
}

impl NotificationIntent {
    pub fn new(
        role: Role,
        title: impl Into<String>,
        message: impl Into<String>,
        related_entity_type: impl Into<String>,
        related_entity_id: impl ToString,
    ) -> Self {
        Self {
            role,
            title: title.into(),
            message: message.into(),
            related_entity_type: related_entity_type.into(),
            related_entity_id: related_entity_id.to_string(),
        }
    }
}

/// Fire-and-forget sink for notification intents.
///
/// Implementations must not fail the caller: the state change that produced the intent
/// has already committed.
pub trait Notifier: Send + Sync {
    fn notify(&self, intent: NotificationIntent);
}

impl<N> Notifier for Arc<N>
where
    N: Notifier + ?Sized,
{
    fn notify(&self, intent: NotificationIntent) {
        (**self).notify(intent)
    }
}

/// Publishes intents on an [`EventBus`] for the delivery collaborator to consume.
#[derive(Debug)]
pub struct BusNotifier<B> {
    bus: B,
}

impl<B> BusNotifier<B> {
    pub fn new(bus: B) -> Self {
        Self { bus }
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }
}

impl<B> Notifier for BusNotifier<B>
where
    B: EventBus<NotificationIntent>,
{
    fn notify(&self, intent: NotificationIntent) {
        tracing::debug!(
            role = %intent.role,
            entity_type = %intent.related_entity_type,
            entity_id = %intent.related_entity_id,
            title = %intent.title,
            "publishing notification intent"
        );
        if let Err(err) = self.bus.publish(intent) {
            tracing::warn!(error = ?err, "notification intent dropped");
        }
    }
}

/// Keeps every intent in memory (tests/dev).
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<NotificationIntent>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<NotificationIntent> {
        self.sent.lock().map(|v| v.clone()).unwrap_or_default()
    }

    pub fn sent_to(&self, role: Role) -> Vec<NotificationIntent> {
        self.sent().into_iter().filter(|n| n.role == role).collect()
    }

    pub fn clear(&self) {
        if let Ok(mut v) = self.sent.lock() {
            v.clear();
        }
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, intent: NotificationIntent) {
        if let Ok(mut v) = self.sent.lock() {
            v.push(intent);
        }
    }
}
