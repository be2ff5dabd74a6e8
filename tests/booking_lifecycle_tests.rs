//! Booking lifecycle tests against the in-memory store

use chrono::{Duration as ChronoDuration, Utc};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use marketplace_server::auth::AuthService;
use marketplace_server::booking::{
    Booking, BookingError, BookingStatus, CreateBookingRequest, RequestBooking,
};
use marketplace_server::catalog::{CreateProductRequest, Product, ProductStatus};
use marketplace_server::feed::{
    ChangeEvent, ChangeFeed, ChangeOp, FeedItem, Record, Subscription, Table,
};
use marketplace_server::messaging::{MessagingError, SendMessageRequest};
use marketplace_server::notification::{FanoutStatus, ListNotificationsQuery, NotificationType};
use marketplace_server::state::AppState;
use marketplace_server::store::{MarketplaceStore, MemoryStore};

struct Harness {
    store: MemoryStore,
    state: AppState,
}

fn harness() -> Harness {
    let store = MemoryStore::new();
    let state = AppState::new(
        Arc::new(store.clone()),
        Arc::new(AuthService::new("test-secret".to_string())),
        ChangeFeed::new(64),
    );
    Harness { store, state }
}

async fn list_product(h: &Harness, seller_id: Uuid) -> Product {
    h.state
        .catalog_service
        .create_product(
            seller_id,
            CreateProductRequest {
                title: "Road bike".to_string(),
                price: 450,
            },
        )
        .await
        .unwrap()
}

fn booking_request(product_id: Uuid) -> CreateBookingRequest {
    CreateBookingRequest {
        product_id,
        offered_price: Some(400),
        message: Some("Can pick up Saturday".to_string()),
        preferred_date: None,
        expires_in_hours: None,
    }
}

/// Pending booking opened two hours ago that lapsed an hour later
async fn lapsed_booking(h: &Harness, product_id: Uuid, buyer_id: Uuid) -> Uuid {
    let opened = Utc::now() - ChronoDuration::hours(2);
    let committed = h
        .store
        .request_booking(
            RequestBooking {
                product_id,
                buyer_id,
                offered_price: None,
                message: None,
                preferred_date: None,
                expires_at: Some(opened + ChronoDuration::hours(1)),
            },
            opened,
        )
        .await
        .unwrap();
    committed.value.bookings()[0].id
}

async fn next_change(sub: &mut Subscription) -> ChangeEvent {
    match sub.next().await {
        Some(FeedItem::Change(event)) => event,
        other => panic!("expected a change event, got {:?}", other),
    }
}

fn booking_of(event: &ChangeEvent) -> &Booking {
    match &event.record {
        Record::Bookings(booking) => booking,
        other => panic!("expected a booking row, got {:?}", other),
    }
}

#[tokio::test]
async fn test_accept_rejects_siblings_and_notifies_everyone() {
    let h = harness();
    let seller = Uuid::new_v4();
    let (buyer_a, buyer_b, buyer_c) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
    let product = list_product(&h, seller).await;

    let service = &h.state.booking_service;
    let a = service.request(buyer_a, booking_request(product.id)).await.unwrap();
    let b = service.request(buyer_b, booking_request(product.id)).await.unwrap();
    let c = service.request(buyer_c, booking_request(product.id)).await.unwrap();
    assert_eq!(a.notifications, FanoutStatus::Delivered { count: 1 });

    let seller_inbox = h.store.notifications_for(seller).await;
    assert_eq!(seller_inbox.len(), 3);
    assert!(seller_inbox
        .iter()
        .all(|n| n.kind == NotificationType::BookingRequest));

    let accepted = service.accept(b.value.id, seller).await.unwrap();
    assert_eq!(accepted.value.booking.status, BookingStatus::Accepted);
    assert_eq!(accepted.value.product.status, ProductStatus::Sold);
    assert_eq!(accepted.value.rejected.len(), 2);
    assert_eq!(accepted.notifications, FanoutStatus::Delivered { count: 3 });

    let bookings = h.store.bookings_for_product(product.id).await;
    let status_of = |id: Uuid| bookings.iter().find(|x| x.id == id).unwrap().status;
    assert_eq!(status_of(a.value.id), BookingStatus::Rejected);
    assert_eq!(status_of(b.value.id), BookingStatus::Accepted);
    assert_eq!(status_of(c.value.id), BookingStatus::Rejected);

    let winner = h.store.notifications_for(buyer_b).await;
    assert_eq!(winner.len(), 1);
    assert_eq!(winner[0].kind, NotificationType::Sale);
    assert_eq!(winner[0].payload.status, Some(BookingStatus::Accepted));

    for loser in [buyer_a, buyer_c] {
        let inbox = h.store.notifications_for(loser).await;
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox[0].kind, NotificationType::BookingUpdate);
        assert_eq!(inbox[0].payload.status, Some(BookingStatus::Rejected));
        assert_eq!(inbox[0].payload.product_id, Some(product.id));
    }
}

#[tokio::test]
async fn test_request_checks() {
    let h = harness();
    let seller = Uuid::new_v4();
    let buyer = Uuid::new_v4();
    let product = list_product(&h, seller).await;
    let service = &h.state.booking_service;

    let err = service
        .request(buyer, booking_request(Uuid::new_v4()))
        .await
        .unwrap_err();
    assert!(matches!(err, BookingError::NotFound("Product")));

    let err = service.request(seller, booking_request(product.id)).await.unwrap_err();
    assert!(matches!(err, BookingError::SelfBookingForbidden));

    let first = service.request(buyer, booking_request(product.id)).await.unwrap();
    let err = service.request(buyer, booking_request(product.id)).await.unwrap_err();
    assert!(matches!(err, BookingError::AlreadyBooked));

    service.accept(first.value.id, seller).await.unwrap();
    let err = service
        .request(Uuid::new_v4(), booking_request(product.id))
        .await
        .unwrap_err();
    assert!(matches!(err, BookingError::ProductUnavailable));

    // A buyer may book again after withdrawing
    let other = list_product(&h, seller).await;
    let pending = service.request(buyer, booking_request(other.id)).await.unwrap();
    service.cancel(pending.value.id, buyer).await.unwrap();
    assert!(service.request(buyer, booking_request(other.id)).await.is_ok());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_accepts_commit_exactly_one() {
    let h = harness();
    let seller = Uuid::new_v4();
    let product = list_product(&h, seller).await;

    let mut booking_ids = Vec::new();
    for _ in 0..10 {
        let outcome = h
            .state
            .booking_service
            .request(Uuid::new_v4(), booking_request(product.id))
            .await
            .unwrap();
        booking_ids.push(outcome.value.id);
    }

    let handles: Vec<_> = booking_ids
        .iter()
        .map(|&id| {
            let service = h.state.booking_service.clone();
            tokio::spawn(async move { service.accept(id, seller).await })
        })
        .collect();

    let mut winners = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => winners += 1,
            Err(BookingError::AlreadyAccepted) | Err(BookingError::InvalidTransition(_)) => {}
            Err(e) => panic!("unexpected error: {}", e),
        }
    }
    assert_eq!(winners, 1);

    let bookings = h.store.bookings_for_product(product.id).await;
    let accepted = bookings
        .iter()
        .filter(|b| b.status == BookingStatus::Accepted)
        .count();
    assert_eq!(accepted, 1);
    assert!(bookings.iter().all(|b| b.status != BookingStatus::Pending));

    // One sale plus nine rejections, one per affected buyer
    let product_notifications: usize = {
        let mut total = 0;
        for b in &bookings {
            total += h.store.notifications_for(b.buyer_id).await.len();
        }
        total
    };
    assert_eq!(product_notifications, 10);
}

#[tokio::test]
async fn test_reject_twice_fails_without_duplicate_notification() {
    let h = harness();
    let seller = Uuid::new_v4();
    let buyer = Uuid::new_v4();
    let product = list_product(&h, seller).await;
    let service = &h.state.booking_service;

    let booking = service.request(buyer, booking_request(product.id)).await.unwrap();
    let rejected = service.reject(booking.value.id, seller).await.unwrap();
    assert_eq!(rejected.value.status, BookingStatus::Rejected);

    let err = service.reject(booking.value.id, seller).await.unwrap_err();
    assert!(matches!(err, BookingError::InvalidTransition(_)));
    assert_eq!(h.store.notifications_for(buyer).await.len(), 1);

    // Rejection leaves the product available
    let product = h.state.catalog_service.get_product(product.id).await.unwrap().unwrap();
    assert_eq!(product.status, ProductStatus::Active);
}

#[tokio::test]
async fn test_unauthorized_callers_change_nothing() {
    let h = harness();
    let seller = Uuid::new_v4();
    let buyer = Uuid::new_v4();
    let stranger = Uuid::new_v4();
    let product = list_product(&h, seller).await;
    let service = &h.state.booking_service;

    let booking = service.request(buyer, booking_request(product.id)).await.unwrap();
    let notifications_before = h.store.notification_total().await;

    assert!(matches!(
        service.accept(booking.value.id, buyer).await,
        Err(BookingError::NotAuthorized(_))
    ));
    assert!(matches!(
        service.reject(booking.value.id, stranger).await,
        Err(BookingError::NotAuthorized(_))
    ));
    assert!(matches!(
        service.cancel(booking.value.id, seller).await,
        Err(BookingError::NotAuthorized(_))
    ));
    assert!(matches!(
        service.get(booking.value.id, stranger).await,
        Err(BookingError::NotAuthorized(_))
    ));

    let stored = h.store.get_booking(booking.value.id).await.unwrap().unwrap();
    assert_eq!(stored.status, BookingStatus::Pending);
    assert_eq!(h.store.notification_total().await, notifications_before);
    assert_eq!(service.get(booking.value.id, seller).await.unwrap().id, booking.value.id);
}

#[tokio::test]
async fn test_cancel_notifies_seller() {
    let h = harness();
    let seller = Uuid::new_v4();
    let buyer = Uuid::new_v4();
    let product = list_product(&h, seller).await;
    let service = &h.state.booking_service;

    let booking = service.request(buyer, booking_request(product.id)).await.unwrap();
    let cancelled = service.cancel(booking.value.id, buyer).await.unwrap();
    assert_eq!(cancelled.value.status, BookingStatus::Cancelled);

    let inbox = h.store.notifications_for(seller).await;
    assert_eq!(inbox.len(), 2);
    assert_eq!(inbox[1].kind, NotificationType::BookingUpdate);
    assert_eq!(inbox[1].payload.status, Some(BookingStatus::Cancelled));
}

#[tokio::test]
async fn test_deferred_fanout_is_delivered_once_by_retry() {
    let h = harness();
    let seller = Uuid::new_v4();
    let buyer = Uuid::new_v4();
    let product = list_product(&h, seller).await;

    h.store.set_delivery_failure(true);
    let booking = h
        .state
        .booking_service
        .request(buyer, booking_request(product.id))
        .await
        .unwrap();
    assert!(matches!(booking.notifications, FanoutStatus::Deferred { .. }));
    assert_eq!(booking.value.status, BookingStatus::Pending);
    assert!(h.store.notifications_for(seller).await.is_empty());

    let notifications = &h.state.notification_service;
    // Still failing: nothing delivered
    assert_eq!(notifications.retry_pending(Duration::ZERO).await.unwrap(), 0);

    h.store.set_delivery_failure(false);
    assert_eq!(notifications.retry_pending(Duration::ZERO).await.unwrap(), 1);
    assert_eq!(notifications.retry_pending(Duration::ZERO).await.unwrap(), 0);

    let inbox = h.store.notifications_for(seller).await;
    assert_eq!(inbox.len(), 1);
    assert_eq!(inbox[0].payload.booking_id, Some(booking.value.id));

    let outbox_id = inbox[0].outbox_id.unwrap();
    let (attempts, last_error) = h.store.outbox_attempts(outbox_id).await.unwrap();
    assert_eq!(attempts, 3);
    assert!(last_error.is_some());

    // Direct redelivery of a delivered entry is a no-op
    assert!(h.store.deliver_outbox(outbox_id, Utc::now()).await.unwrap().is_empty());
    assert_eq!(h.store.notifications_for(seller).await.len(), 1);
}

#[tokio::test]
async fn test_expired_bookings_are_swept_and_published() {
    let h = harness();
    let seller = Uuid::new_v4();
    let buyer = Uuid::new_v4();
    let product = list_product(&h, seller).await;
    let stale_id = lapsed_booking(&h, product.id, buyer).await;

    let err = h.state.booking_service.accept(stale_id, seller).await.unwrap_err();
    assert!(matches!(err, BookingError::BookingExpired));

    let mut sub = h
        .state
        .feed
        .subscribe(buyer, Some([Table::Bookings].into_iter().collect()));

    assert_eq!(h.state.booking_service.sweep_expired(100).await.unwrap(), 1);
    let swept = h.store.get_booking(stale_id).await.unwrap().unwrap();
    assert_eq!(swept.status, BookingStatus::Cancelled);

    let event = next_change(&mut sub).await;
    assert_eq!(event.op, ChangeOp::Update);
    let published = booking_of(&event);
    assert_eq!(published.id, stale_id);
    assert_eq!(published.status, BookingStatus::Cancelled);

    let inbox = h.store.notifications_for(buyer).await;
    assert_eq!(inbox.len(), 1);
    assert_eq!(inbox[0].actor_id, None);
    assert_eq!(inbox[0].payload.status, Some(BookingStatus::Cancelled));

    // Nothing left to sweep
    assert_eq!(h.state.booking_service.sweep_expired(100).await.unwrap(), 0);
}

#[tokio::test]
async fn test_superseded_booking_is_published_as_cancelled() {
    let h = harness();
    let seller = Uuid::new_v4();
    let buyer = Uuid::new_v4();
    let product = list_product(&h, seller).await;
    let stale_id = lapsed_booking(&h, product.id, buyer).await;

    let mut sub = h
        .state
        .feed
        .subscribe(seller, Some([Table::Bookings].into_iter().collect()));

    let fresh = h
        .state
        .booking_service
        .request(buyer, booking_request(product.id))
        .await
        .unwrap();
    assert_ne!(fresh.value.id, stale_id);

    let old = h.store.get_booking(stale_id).await.unwrap().unwrap();
    assert_eq!(old.status, BookingStatus::Cancelled);

    // The cancellation comes first, then the new row
    let first = next_change(&mut sub).await;
    assert_eq!(first.op, ChangeOp::Update);
    assert_eq!(booking_of(&first).id, stale_id);
    assert_eq!(booking_of(&first).status, BookingStatus::Cancelled);

    let second = next_change(&mut sub).await;
    assert_eq!(second.op, ChangeOp::Insert);
    assert_eq!(booking_of(&second).id, fresh.value.id);
    assert_eq!(booking_of(&second).status, BookingStatus::Pending);
}

#[tokio::test]
async fn test_reactivation_releases_accepted_booking() {
    let h = harness();
    let seller = Uuid::new_v4();
    let buyer = Uuid::new_v4();
    let product = list_product(&h, seller).await;
    let service = &h.state.booking_service;

    let err = service.reactivate(product.id, seller).await.unwrap_err();
    assert!(matches!(err, BookingError::InvalidTransition(_)));

    let booking = service.request(buyer, booking_request(product.id)).await.unwrap();
    service.accept(booking.value.id, seller).await.unwrap();

    let err = service.reactivate(product.id, buyer).await.unwrap_err();
    assert!(matches!(err, BookingError::NotAuthorized(_)));

    let mut sub = h.state.feed.subscribe(
        buyer,
        Some([Table::Bookings, Table::Products].into_iter().collect()),
    );

    let relisted = service.reactivate(product.id, seller).await.unwrap();
    assert_eq!(relisted.value.product.status, ProductStatus::Active);
    let released = relisted.value.released.unwrap();
    assert_eq!(released.id, booking.value.id);
    assert_eq!(released.status, BookingStatus::Cancelled);

    let event = next_change(&mut sub).await;
    assert_eq!(event.op, ChangeOp::Update);
    assert_eq!(booking_of(&event).id, booking.value.id);
    assert_eq!(booking_of(&event).status, BookingStatus::Cancelled);

    let event = next_change(&mut sub).await;
    assert_eq!(event.op, ChangeOp::Update);
    match &event.record {
        Record::Products(p) => {
            assert_eq!(p.id, product.id);
            assert_eq!(p.status, ProductStatus::Active);
        }
        other => panic!("expected a product row, got {:?}", other),
    }
    sub.cancel();

    let inbox = h.store.notifications_for(buyer).await;
    assert_eq!(inbox.last().unwrap().payload.status, Some(BookingStatus::Cancelled));

    // A new cycle can begin, including for the released buyer
    let again = service.request(buyer, booking_request(product.id)).await.unwrap();
    service.accept(again.value.id, seller).await.unwrap();
}

#[tokio::test]
async fn test_feed_streams_booking_and_notification_rows() {
    let h = harness();
    let seller = Uuid::new_v4();
    let buyer = Uuid::new_v4();
    let product = list_product(&h, seller).await;

    let mut sub = h
        .state
        .feed
        .subscribe(seller, Some([Table::Bookings, Table::Notifications].into_iter().collect()));

    let booking = h
        .state
        .booking_service
        .request(buyer, booking_request(product.id))
        .await
        .unwrap();

    match sub.next().await {
        Some(FeedItem::Change(event)) => {
            assert_eq!(event.op, ChangeOp::Insert);
            assert!(matches!(event.record, Record::Bookings(ref b) if b.id == booking.value.id));
        }
        other => panic!("unexpected item: {:?}", other),
    }
    match sub.next().await {
        Some(FeedItem::Change(event)) => {
            assert!(matches!(event.record, Record::Notifications(ref n) if n.recipient_id == seller));
        }
        other => panic!("unexpected item: {:?}", other),
    }

    sub.cancel();
    sub.cancel();
    assert!(sub.next().await.is_none());
}

#[tokio::test]
async fn test_notification_read_state() {
    let h = harness();
    let seller = Uuid::new_v4();
    let product = list_product(&h, seller).await;
    for _ in 0..3 {
        h.state
            .booking_service
            .request(Uuid::new_v4(), booking_request(product.id))
            .await
            .unwrap();
    }

    let notifications = &h.state.notification_service;
    assert_eq!(notifications.unread_count(seller).await.unwrap(), 3);

    let inbox = notifications
        .list(seller, ListNotificationsQuery::default())
        .await
        .unwrap();
    let first = inbox[0].id;

    // Someone else cannot mark it
    assert!(notifications.mark_read(first, Uuid::new_v4()).await.unwrap().is_none());

    assert!(notifications.mark_read(first, seller).await.unwrap().unwrap().read);
    assert!(notifications.mark_read(first, seller).await.unwrap().unwrap().read);
    assert_eq!(notifications.unread_count(seller).await.unwrap(), 2);

    let unread_only = notifications
        .list(
            seller,
            ListNotificationsQuery {
                unread_only: true,
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(unread_only.len(), 2);

    assert_eq!(notifications.mark_all_read(seller).await.unwrap(), 2);
    assert_eq!(notifications.mark_all_read(seller).await.unwrap(), 0);
    assert_eq!(notifications.unread_count(seller).await.unwrap(), 0);
}

#[tokio::test]
async fn test_messages_notify_recipient() {
    let h = harness();
    let seller = Uuid::new_v4();
    let buyer = Uuid::new_v4();
    let product = list_product(&h, seller).await;
    let messaging = &h.state.messaging_service;

    let sent = messaging
        .send(
            buyer,
            SendMessageRequest {
                recipient_id: seller,
                product_id: Some(product.id),
                body: "Is it still available?".to_string(),
            },
        )
        .await
        .unwrap();
    assert_eq!(sent.notifications, FanoutStatus::Delivered { count: 1 });

    let inbox = h.store.notifications_for(seller).await;
    assert_eq!(inbox[0].kind, NotificationType::Message);
    assert_eq!(inbox[0].payload.message_id, Some(sent.value.id));

    let err = messaging
        .send(
            buyer,
            SendMessageRequest {
                recipient_id: buyer,
                product_id: None,
                body: "hello me".to_string(),
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, MessagingError::SelfMessage));

    let err = messaging
        .send(
            buyer,
            SendMessageRequest {
                recipient_id: seller,
                product_id: Some(Uuid::new_v4()),
                body: "wrong listing".to_string(),
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, MessagingError::ProductNotFound));
}
