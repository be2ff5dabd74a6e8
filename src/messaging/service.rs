use chrono::Utc;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use super::{ConversationQuery, Message, NewMessage, SendMessageRequest};
use crate::feed::{ChangeEvent, ChangeFeed};
use crate::notification::{NotificationService, Outcome};
use crate::store::{MarketplaceStore, StoreError};

const DEFAULT_CONVERSATION_LIMIT: i64 = 50;

#[derive(Error, Debug)]
pub enum MessagingError {
    #[error("Cannot send a message to yourself")]
    SelfMessage,

    #[error("Product not found")]
    ProductNotFound,

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Clone)]
pub struct MessagingService {
    store: Arc<dyn MarketplaceStore>,
    notifications: NotificationService,
    feed: ChangeFeed,
}

impl MessagingService {
    pub fn new(
        store: Arc<dyn MarketplaceStore>,
        notifications: NotificationService,
        feed: ChangeFeed,
    ) -> Self {
        Self {
            store,
            notifications,
            feed,
        }
    }

    pub async fn send(
        &self,
        sender_id: Uuid,
        request: SendMessageRequest,
    ) -> Result<Outcome<Message>, MessagingError> {
        if request.recipient_id == sender_id {
            return Err(MessagingError::SelfMessage);
        }
        if let Some(product_id) = request.product_id {
            if self.store.get_product(product_id).await?.is_none() {
                return Err(MessagingError::ProductNotFound);
            }
        }

        let committed = self
            .store
            .insert_message(
                NewMessage {
                    sender_id,
                    recipient_id: request.recipient_id,
                    product_id: request.product_id,
                    body: request.body,
                },
                Utc::now(),
            )
            .await?;

        self.feed.publish(ChangeEvent::message(&committed.value));
        let notifications = self.notifications.deliver(committed.outbox_id).await;

        Ok(Outcome {
            value: committed.value,
            notifications,
        })
    }

    /// Most recent messages between the caller and `query.with`, newest first
    pub async fn conversation(
        &self,
        user_id: Uuid,
        query: ConversationQuery,
    ) -> Result<Vec<Message>, MessagingError> {
        let limit = query.limit.unwrap_or(DEFAULT_CONVERSATION_LIMIT).clamp(1, 100);
        Ok(self.store.list_conversation(user_id, query.with, limit).await?)
    }
}
