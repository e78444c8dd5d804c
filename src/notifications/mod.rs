//! Miniapp notification webhook.
//!
//! The webhook handler only validates and enqueues. Persistence and the
//! outbound welcome notification happen on worker tasks after the response.

pub mod store;
pub mod worker;

use serde::{Deserialize, Serialize};

pub use store::NotificationStore;
pub use worker::{JobQueue, NotificationJob, NotificationWorker};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationDetails {
    pub url: String,
    pub token: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum MiniAppEvent {
    MiniappAdded {
        #[serde(rename = "notificationDetails", default)]
        notification_details: Option<NotificationDetails>,
    },
    MiniappRemoved,
    NotificationsEnabled {
        #[serde(rename = "notificationDetails")]
        notification_details: NotificationDetails,
    },
    NotificationsDisabled,
}

impl MiniAppEvent {
    pub fn name(&self) -> &'static str {
        match self {
            MiniAppEvent::MiniappAdded { .. } => "miniapp_added",
            MiniAppEvent::MiniappRemoved => "miniapp_removed",
            MiniAppEvent::NotificationsEnabled { .. } => "notifications_enabled",
            MiniAppEvent::NotificationsDisabled => "notifications_disabled",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WebhookPayload {
    pub fid: u64,
    pub event: MiniAppEvent,
}
