//! Realtime change feed
//!
//! Row-level insert/update events fan out over a single broadcast channel.
//! Each [`Subscription`] filters by the subscriber's user id and an optional
//! table set. There is no replay: a subscriber that falls more than the
//! channel capacity behind gets [`FeedItem::Resync`] and must re-fetch.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tokio::sync::broadcast::{self, error::RecvError};
use uuid::Uuid;

use crate::booking::{Booking, Transition};
use crate::catalog::Product;
use crate::messaging::Message;
use crate::notification::Notification;

pub const DEFAULT_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    Products,
    Bookings,
    Notifications,
    Messages,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChangeOp {
    Insert,
    Update,
}

/// The row carried by an event, tagged with its table
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "table", content = "record", rename_all = "snake_case")]
pub enum Record {
    Products(Product),
    Bookings(Booking),
    Notifications(Notification),
    Messages(Message),
}

#[derive(Debug, Clone, Serialize)]
pub struct ChangeEvent {
    pub op: ChangeOp,
    #[serde(flatten)]
    pub record: Record,
    /// Row timestamp; orders events for the same row
    pub at: DateTime<Utc>,
}

impl ChangeEvent {
    pub fn product(op: ChangeOp, product: &Product) -> Self {
        Self {
            op,
            at: product.updated_at,
            record: Record::Products(product.clone()),
        }
    }

    pub fn booking(op: ChangeOp, booking: &Booking) -> Self {
        Self {
            op,
            at: booking.updated_at,
            record: Record::Bookings(booking.clone()),
        }
    }

    pub fn notification(op: ChangeOp, notification: &Notification) -> Self {
        Self {
            op,
            at: notification.created_at,
            record: Record::Notifications(notification.clone()),
        }
    }

    pub fn message(message: &Message) -> Self {
        Self {
            op: ChangeOp::Insert,
            at: message.created_at,
            record: Record::Messages(message.clone()),
        }
    }

    pub fn table(&self) -> Table {
        match self.record {
            Record::Products(_) => Table::Products,
            Record::Bookings(_) => Table::Bookings,
            Record::Notifications(_) => Table::Notifications,
            Record::Messages(_) => Table::Messages,
        }
    }

    /// Listings are public; every other row is visible to its participants
    pub fn is_visible_to(&self, user_id: Uuid) -> bool {
        match &self.record {
            Record::Products(_) => true,
            Record::Bookings(b) => b.involves(user_id),
            Record::Notifications(n) => n.recipient_id == user_id,
            Record::Messages(m) => m.sender_id == user_id || m.recipient_id == user_id,
        }
    }
}

/// Item yielded by [`Subscription::next`]
#[derive(Debug, Clone)]
pub enum FeedItem {
    Change(ChangeEvent),
    /// Events were dropped; the client must re-fetch its state
    Resync { missed: u64 },
}

/// Publisher side of the feed
#[derive(Clone)]
pub struct ChangeFeed {
    tx: broadcast::Sender<ChangeEvent>,
}

impl ChangeFeed {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Returns the number of live subscriptions the event reached
    pub fn publish(&self, event: ChangeEvent) -> usize {
        // Err only means nobody is listening
        self.tx.send(event).unwrap_or(0)
    }

    /// Publish every row a committed transition wrote, bookings first
    pub fn publish_transition(&self, transition: &Transition) {
        let inserted = match transition {
            Transition::Requested { booking, .. } => Some(booking.id),
            _ => None,
        };
        for booking in transition.bookings() {
            let op = if inserted == Some(booking.id) {
                ChangeOp::Insert
            } else {
                ChangeOp::Update
            };
            self.publish(ChangeEvent::booking(op, booking));
        }
        if transition.touches_product() {
            self.publish(ChangeEvent::product(ChangeOp::Update, transition.product()));
        }
    }

    pub fn subscribe(&self, user_id: Uuid, tables: Option<HashSet<Table>>) -> Subscription {
        let subscription = Subscription {
            id: Uuid::new_v4(),
            user_id,
            tables,
            rx: Some(self.tx.subscribe()),
        };
        tracing::debug!(subscription_id = %subscription.id, user_id = %user_id, "Feed subscription opened");
        subscription
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

/// Owned handle to one feed subscription
///
/// Dropping the handle cancels it.
pub struct Subscription {
    id: Uuid,
    user_id: Uuid,
    tables: Option<HashSet<Table>>,
    rx: Option<broadcast::Receiver<ChangeEvent>>,
}

impl Subscription {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn user_id(&self) -> Uuid {
        self.user_id
    }

    /// `None` receives every table
    pub fn set_tables(&mut self, tables: Option<HashSet<Table>>) {
        self.tables = tables;
    }

    pub fn tables(&self) -> Option<&HashSet<Table>> {
        self.tables.as_ref()
    }

    fn matches(&self, event: &ChangeEvent) -> bool {
        event.is_visible_to(self.user_id)
            && self
                .tables
                .as_ref()
                .map(|tables| tables.contains(&event.table()))
                .unwrap_or(true)
    }

    /// Wait for the next matching item.
    ///
    /// Returns `None` once the subscription is cancelled or the feed is gone.
    pub async fn next(&mut self) -> Option<FeedItem> {
        loop {
            let rx = self.rx.as_mut()?;
            match rx.recv().await {
                Ok(event) if self.matches(&event) => return Some(FeedItem::Change(event)),
                Ok(_) => continue,
                Err(RecvError::Lagged(missed)) => {
                    tracing::warn!(subscription_id = %self.id, missed, "Feed subscriber lagged");
                    return Some(FeedItem::Resync { missed });
                }
                Err(RecvError::Closed) => {
                    self.rx = None;
                    return None;
                }
            }
        }
    }

    /// Stop receiving events. Safe to call more than once.
    pub fn cancel(&mut self) {
        if self.rx.take().is_some() {
            tracing::debug!(subscription_id = %self.id, "Feed subscription cancelled");
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.rx.is_none()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::booking::BookingStatus;
    use crate::catalog::ProductStatus;

    fn product(seller_id: Uuid) -> Product {
        Product {
            id: Uuid::new_v4(),
            seller_id,
            title: "Bike".to_string(),
            price: 300,
            status: ProductStatus::Active,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn booking(product: &Product, buyer_id: Uuid) -> Booking {
        Booking {
            id: Uuid::new_v4(),
            product_id: product.id,
            buyer_id,
            seller_id: product.seller_id,
            offered_price: None,
            message: None,
            preferred_date: None,
            expires_at: None,
            status: BookingStatus::Pending,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_booking_events_reach_participants_only() {
        let feed = ChangeFeed::new(16);
        let seller = Uuid::new_v4();
        let buyer = Uuid::new_v4();
        let stranger = Uuid::new_v4();

        let mut seller_sub = feed.subscribe(seller, None);
        let mut stranger_sub = feed.subscribe(stranger, None);

        let p = product(seller);
        let b = booking(&p, buyer);
        feed.publish(ChangeEvent::booking(ChangeOp::Insert, &b));
        feed.publish(ChangeEvent::product(ChangeOp::Update, &p));

        match seller_sub.next().await {
            Some(FeedItem::Change(event)) => assert_eq!(event.table(), Table::Bookings),
            other => panic!("unexpected item: {:?}", other),
        }
        // The stranger skips the booking and sees the public product row
        match stranger_sub.next().await {
            Some(FeedItem::Change(event)) => assert_eq!(event.table(), Table::Products),
            other => panic!("unexpected item: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_table_filter() {
        let feed = ChangeFeed::new(16);
        let seller = Uuid::new_v4();
        let mut sub = feed.subscribe(seller, Some(HashSet::from([Table::Products])));

        let p = product(seller);
        feed.publish(ChangeEvent::booking(ChangeOp::Insert, &booking(&p, Uuid::new_v4())));
        feed.publish(ChangeEvent::product(ChangeOp::Insert, &p));

        match sub.next().await {
            Some(FeedItem::Change(event)) => {
                assert_eq!(event.table(), Table::Products);
                assert_eq!(event.op, ChangeOp::Insert);
            }
            other => panic!("unexpected item: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_lagged_subscriber_gets_resync() {
        let feed = ChangeFeed::new(2);
        let seller = Uuid::new_v4();
        let mut sub = feed.subscribe(seller, None);

        let p = product(seller);
        for _ in 0..5 {
            feed.publish(ChangeEvent::product(ChangeOp::Update, &p));
        }

        match sub.next().await {
            Some(FeedItem::Resync { missed }) => assert_eq!(missed, 3),
            other => panic!("expected resync, got {:?}", other),
        }
        // Delivery resumes with the retained events
        assert!(matches!(sub.next().await, Some(FeedItem::Change(_))));
    }

    #[tokio::test]
    async fn test_cancel_is_idempotent() {
        let feed = ChangeFeed::new(4);
        let mut sub = feed.subscribe(Uuid::new_v4(), None);
        assert_eq!(feed.subscriber_count(), 1);

        sub.cancel();
        sub.cancel();
        assert!(sub.is_cancelled());
        assert_eq!(feed.subscriber_count(), 0);
        assert!(sub.next().await.is_none());
    }

    #[test]
    fn test_drop_cancels() {
        let feed = ChangeFeed::new(4);
        {
            let _sub = feed.subscribe(Uuid::new_v4(), None);
            assert_eq!(feed.subscriber_count(), 1);
        }
        assert_eq!(feed.subscriber_count(), 0);
        let event = ChangeEvent::product(ChangeOp::Insert, &product(Uuid::new_v4()));
        assert_eq!(feed.publish(event), 0);
    }

    #[test]
    fn test_event_wire_shape() {
        let p = product(Uuid::new_v4());
        let json = serde_json::to_value(ChangeEvent::product(ChangeOp::Update, &p)).unwrap();
        assert_eq!(json["table"], "products");
        assert_eq!(json["op"], "update");
        assert_eq!(json["record"]["id"], p.id.to_string());
    }
}
