//! Notification models

use serde::{Deserialize, Serialize};
use sqlx::types::chrono::{DateTime, Utc};
use sqlx::types::Json;
use uuid::Uuid;

use crate::booking::BookingStatus;

/// Durable notification shown to one recipient
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone, PartialEq)]
pub struct Notification {
    pub id: Uuid,
    pub recipient_id: Uuid,
    pub actor_id: Option<Uuid>,
    #[sqlx(rename = "type")]
    #[serde(rename = "type")]
    pub kind: NotificationType,
    pub title: String,
    pub body: String,
    pub payload: Json<NotificationPayload>,
    pub read: bool,
    pub outbox_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// Notification tag
#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq)]
#[sqlx(type_name = "notification_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    BookingRequest,
    BookingUpdate,
    Sale,
    Message,
}

/// Deep-link data carried by a notification
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct NotificationPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub booking_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<BookingStatus>,
}

/// Notification waiting in the outbox
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct NotificationDraft {
    pub recipient_id: Uuid,
    pub actor_id: Option<Uuid>,
    pub kind: NotificationType,
    pub title: String,
    pub body: String,
    pub payload: NotificationPayload,
}

impl NotificationDraft {
    pub fn into_notification(self, outbox_id: Uuid, now: DateTime<Utc>) -> Notification {
        Notification {
            id: Uuid::new_v4(),
            recipient_id: self.recipient_id,
            actor_id: self.actor_id,
            kind: self.kind,
            title: self.title,
            body: self.body,
            payload: Json(self.payload),
            read: false,
            outbox_id: Some(outbox_id),
            created_at: now,
        }
    }
}

/// Result of the fanout step attached to a command response
#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum FanoutStatus {
    /// No recipient for this transition
    None,
    Delivered { count: usize },
    /// Committed to the outbox; the retry worker will deliver it
    Deferred { reason: String },
}

/// Query parameters for listing notifications
#[derive(Debug, Default, Deserialize)]
pub struct ListNotificationsQuery {
    #[serde(default)]
    pub unread_only: bool,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

/// Store-level notification filter
#[derive(Debug, Clone)]
pub struct NotificationFilter {
    pub recipient_id: Uuid,
    pub unread_only: bool,
    pub limit: i64,
    pub offset: i64,
}

#[derive(Debug, Serialize)]
pub struct UnreadCount {
    pub unread: i64,
}

#[derive(Debug, Serialize)]
pub struct MarkAllReadResponse {
    pub updated: usize,
}

/// Committed command result plus the state of its notifications
#[derive(Debug, Serialize, Clone)]
pub struct Outcome<T> {
    #[serde(flatten)]
    pub value: T,
    pub notifications: FanoutStatus,
}
