//! Notification delivery and queries

use chrono::{Duration as ChronoDuration, Utc};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use super::{FanoutStatus, ListNotificationsQuery, Notification, NotificationFilter};
use crate::feed::{ChangeEvent, ChangeFeed, ChangeOp};
use crate::models::Pagination;
use crate::store::{MarketplaceStore, StoreError};

const RETRY_BATCH_SIZE: i64 = 100;

/// Delivers outbox entries and serves the recipient's notification list
#[derive(Clone)]
pub struct NotificationService {
    store: Arc<dyn MarketplaceStore>,
    feed: ChangeFeed,
}

impl NotificationService {
    pub fn new(store: Arc<dyn MarketplaceStore>, feed: ChangeFeed) -> Self {
        Self { store, feed }
    }

    /// Deliver one outbox entry and publish the new rows.
    ///
    /// Never fails: a delivery error is recorded on the entry and reported
    /// as [`FanoutStatus::Deferred`] so the retry worker picks it up.
    pub async fn deliver(&self, outbox_id: Option<Uuid>) -> FanoutStatus {
        let Some(outbox_id) = outbox_id else {
            return FanoutStatus::None;
        };

        match self.store.deliver_outbox(outbox_id, Utc::now()).await {
            Ok(delivered) => {
                for notification in &delivered {
                    self.feed
                        .publish(ChangeEvent::notification(ChangeOp::Insert, notification));
                }
                tracing::debug!(outbox_id = %outbox_id, count = delivered.len(), "Notifications delivered");
                FanoutStatus::Delivered {
                    count: delivered.len(),
                }
            }
            Err(e) => {
                let reason = e.to_string();
                tracing::warn!(outbox_id = %outbox_id, error = %reason, "Notification delivery deferred");
                if let Err(record_err) =
                    self.store.record_outbox_failure(outbox_id, &reason).await
                {
                    tracing::error!(outbox_id = %outbox_id, error = %record_err, "Failed to record outbox failure");
                }
                FanoutStatus::Deferred { reason }
            }
        }
    }

    /// Redeliver entries older than `grace`. Returns how many were delivered.
    pub async fn retry_pending(&self, grace: Duration) -> Result<usize, StoreError> {
        let grace = ChronoDuration::from_std(grace).unwrap_or_else(|_| ChronoDuration::zero());
        let due = self
            .store
            .undelivered_outbox(Utc::now() - grace, RETRY_BATCH_SIZE)
            .await?;

        let mut delivered = 0;
        for outbox_id in due {
            if let FanoutStatus::Delivered { .. } = self.deliver(Some(outbox_id)).await {
                delivered += 1;
            }
        }
        Ok(delivered)
    }

    pub async fn list(
        &self,
        recipient_id: Uuid,
        query: ListNotificationsQuery,
    ) -> Result<Vec<Notification>, StoreError> {
        let page = Pagination::new(query.page, query.limit);
        self.store
            .list_notifications(&NotificationFilter {
                recipient_id,
                unread_only: query.unread_only,
                limit: page.limit,
                offset: page.offset,
            })
            .await
    }

    /// `None` when the notification does not exist or belongs to someone else
    pub async fn mark_read(
        &self,
        id: Uuid,
        recipient_id: Uuid,
    ) -> Result<Option<Notification>, StoreError> {
        let notification = self.store.mark_notification_read(id, recipient_id).await?;
        if let Some(n) = &notification {
            self.feed.publish(ChangeEvent::notification(ChangeOp::Update, n));
        }
        Ok(notification)
    }

    pub async fn mark_all_read(&self, recipient_id: Uuid) -> Result<usize, StoreError> {
        let flipped = self.store.mark_all_notifications_read(recipient_id).await?;
        for n in &flipped {
            self.feed.publish(ChangeEvent::notification(ChangeOp::Update, n));
        }
        Ok(flipped.len())
    }

    pub async fn unread_count(&self, recipient_id: Uuid) -> Result<i64, StoreError> {
        self.store.unread_count(recipient_id).await
    }
}

/// Background loop that redelivers deferred outbox entries
pub async fn outbox_retry_worker(service: NotificationService, interval: Duration) {
    tracing::info!(interval_secs = interval.as_secs(), "Starting outbox retry worker");

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // The first tick completes immediately
    ticker.tick().await;

    loop {
        ticker.tick().await;

        match service.retry_pending(interval).await {
            Ok(0) => {}
            Ok(count) => tracing::info!(count, "Redelivered deferred notifications"),
            Err(e) => tracing::error!(error = %e, "Outbox retry failed"),
        }
    }
}
