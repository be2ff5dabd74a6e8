//! Fanout rules: one draft per affected recipient of a transition

use uuid::Uuid;

use super::{NotificationDraft, NotificationPayload, NotificationType};
use crate::booking::{Booking, BookingStatus, Transition};
use crate::catalog::Product;
use crate::messaging::Message;

/// Derive the notifications a committed booking transition owes.
///
/// `actor_id` is the user whose command caused the transition; `None` for
/// system-driven transitions such as expiry.
pub fn drafts_for_transition(
    transition: &Transition,
    actor_id: Option<Uuid>,
) -> Vec<NotificationDraft> {
    match transition {
        Transition::Requested {
            booking, product, ..
        } => {
            let body = match booking.offered_price {
                Some(price) => format!(
                    "New booking request for \"{}\" at {}",
                    product.title, price
                ),
                None => format!("New booking request for \"{}\"", product.title),
            };
            vec![draft(
                booking.seller_id,
                actor_id,
                NotificationType::BookingRequest,
                "New booking request",
                body,
                booking,
            )]
        }
        Transition::Accepted {
            booking,
            rejected,
            product,
        } => {
            let mut drafts = Vec::with_capacity(1 + rejected.len());
            drafts.push(draft(
                booking.buyer_id,
                actor_id,
                NotificationType::Sale,
                "Booking accepted",
                format!("Your booking for \"{}\" was accepted", product.title),
                booking,
            ));
            drafts.extend(
                rejected
                    .iter()
                    .map(|sibling| rejected_draft(sibling, product, actor_id)),
            );
            drafts
        }
        Transition::Rejected { booking, product } => {
            vec![rejected_draft(booking, product, actor_id)]
        }
        Transition::Cancelled { booking, product } => vec![draft(
            booking.seller_id,
            actor_id,
            NotificationType::BookingUpdate,
            "Booking cancelled",
            format!("A booking request for \"{}\" was withdrawn", product.title),
            booking,
        )],
        Transition::Expired { booking, product } => vec![draft(
            booking.buyer_id,
            None,
            NotificationType::BookingUpdate,
            "Booking expired",
            format!("Your booking request for \"{}\" expired", product.title),
            booking,
        )],
        Transition::Reactivated { product, released } => released
            .iter()
            .map(|booking| {
                draft(
                    booking.buyer_id,
                    actor_id,
                    NotificationType::BookingUpdate,
                    "Listing reopened",
                    format!("\"{}\" was relisted and your booking released", product.title),
                    booking,
                )
            })
            .collect(),
    }
}

pub fn drafts_for_message(message: &Message) -> Vec<NotificationDraft> {
    let preview: String = message.body.chars().take(120).collect();
    vec![NotificationDraft {
        recipient_id: message.recipient_id,
        actor_id: Some(message.sender_id),
        kind: NotificationType::Message,
        title: "New message".to_string(),
        body: preview,
        payload: NotificationPayload {
            product_id: message.product_id,
            message_id: Some(message.id),
            ..Default::default()
        },
    }]
}

fn rejected_draft(
    booking: &Booking,
    product: &Product,
    actor_id: Option<Uuid>,
) -> NotificationDraft {
    draft(
        booking.buyer_id,
        actor_id,
        NotificationType::BookingUpdate,
        "Booking declined",
        format!("Your booking for \"{}\" was declined", product.title),
        booking,
    )
}

fn draft(
    recipient_id: Uuid,
    actor_id: Option<Uuid>,
    kind: NotificationType,
    title: &str,
    body: String,
    booking: &Booking,
) -> NotificationDraft {
    NotificationDraft {
        recipient_id,
        actor_id,
        kind,
        title: title.to_string(),
        body,
        payload: NotificationPayload {
            product_id: Some(booking.product_id),
            booking_id: Some(booking.id),
            message_id: None,
            status: Some(booking.status),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::booking::machine::new_booking;
    use crate::booking::RequestBooking;
    use crate::catalog::ProductStatus;
    use chrono::Utc;

    fn product() -> Product {
        Product {
            id: Uuid::new_v4(),
            seller_id: Uuid::new_v4(),
            title: "Desk lamp".to_string(),
            price: 100,
            status: ProductStatus::Active,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn booking(product: &Product, status: BookingStatus) -> Booking {
        let cmd = RequestBooking {
            product_id: product.id,
            buyer_id: Uuid::new_v4(),
            offered_price: Some(95),
            message: None,
            preferred_date: None,
            expires_at: None,
        };
        let mut b = new_booking(&cmd, product, Utc::now());
        b.status = status;
        b
    }

    #[test]
    fn test_request_notifies_seller() {
        let p = product();
        let b = booking(&p, BookingStatus::Pending);
        let drafts = drafts_for_transition(
            &Transition::Requested {
                booking: b.clone(),
                superseded: None,
                product: p.clone(),
            },
            Some(b.buyer_id),
        );

        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].recipient_id, p.seller_id);
        assert_eq!(drafts[0].kind, NotificationType::BookingRequest);
        assert_eq!(drafts[0].payload.booking_id, Some(b.id));
        assert_eq!(drafts[0].payload.status, Some(BookingStatus::Pending));
    }

    #[test]
    fn test_accept_notifies_every_affected_buyer_once() {
        let mut p = product();
        let winner = booking(&p, BookingStatus::Accepted);
        let losers = vec![
            booking(&p, BookingStatus::Rejected),
            booking(&p, BookingStatus::Rejected),
        ];
        p.status = ProductStatus::Sold;

        let drafts = drafts_for_transition(
            &Transition::Accepted {
                booking: winner.clone(),
                rejected: losers.clone(),
                product: p.clone(),
            },
            Some(p.seller_id),
        );

        assert_eq!(drafts.len(), 3);
        assert_eq!(drafts[0].recipient_id, winner.buyer_id);
        assert_eq!(drafts[0].kind, NotificationType::Sale);
        assert_eq!(drafts[0].payload.status, Some(BookingStatus::Accepted));
        for (draft, loser) in drafts[1..].iter().zip(&losers) {
            assert_eq!(draft.recipient_id, loser.buyer_id);
            assert_eq!(draft.kind, NotificationType::BookingUpdate);
            assert_eq!(draft.payload.status, Some(BookingStatus::Rejected));
        }
    }

    #[test]
    fn test_reactivation_without_release_notifies_nobody() {
        let p = product();
        let drafts = drafts_for_transition(
            &Transition::Reactivated {
                product: p.clone(),
                released: None,
            },
            Some(p.seller_id),
        );
        assert!(drafts.is_empty());
    }

    #[test]
    fn test_expiry_has_no_actor() {
        let p = product();
        let b = booking(&p, BookingStatus::Cancelled);
        let drafts = drafts_for_transition(
            &Transition::Expired {
                booking: b.clone(),
                product: p,
            },
            None,
        );
        assert_eq!(drafts[0].recipient_id, b.buyer_id);
        assert_eq!(drafts[0].actor_id, None);
        assert_eq!(drafts[0].payload.status, Some(BookingStatus::Cancelled));
    }

    #[test]
    fn test_message_preview_is_truncated() {
        let message = Message {
            id: Uuid::new_v4(),
            sender_id: Uuid::new_v4(),
            recipient_id: Uuid::new_v4(),
            product_id: None,
            body: "x".repeat(500),
            created_at: Utc::now(),
        };
        let drafts = drafts_for_message(&message);
        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].body.len(), 120);
        assert_eq!(drafts[0].payload.message_id, Some(message.id));
    }
}
