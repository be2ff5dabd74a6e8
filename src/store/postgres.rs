//! PostgreSQL store backend
//!
//! Every booking command runs in one transaction that first takes
//! `SELECT ... FOR UPDATE` on the product row, so commands touching the same
//! product are serialized. The partial unique indexes from the migrations
//! back both booking invariants; a violation surfaces as `AlreadyAccepted`
//! or `AlreadyBooked`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgConnection, PgPool, PgPoolOptions};
use sqlx::types::Json;
use std::time::Duration;
use uuid::Uuid;

use super::{Committed, MarketplaceStore, ProductFilter, StoreError};
use crate::booking::{
    machine, Booking, BookingError, BookingFilter, BookingRole, BookingStatus, RequestBooking,
    Transition,
};
use crate::catalog::{NewProduct, Product, ProductStatus, Profile, UpsertProfileRequest};
use crate::messaging::{Message, NewMessage};
use crate::notification::{fanout, Notification, NotificationDraft, NotificationFilter};

const USERNAME_CONSTRAINT: &str = "profiles_username_key";

/// PostgreSQL-backed [`MarketplaceStore`]
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create a connection pool
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(5))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await?;

        tracing::info!(max_connections, "Database connection pool created");
        Ok(Self { pool })
    }

    /// Apply pending migrations from `./migrations`
    pub async fn migrate(&self) -> Result<(), StoreError> {
        tracing::info!("Running database migrations...");
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        tracing::info!("Database migrations completed");
        Ok(())
    }

    async fn expire_one(
        &self,
        booking_id: Uuid,
        product_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<Committed<Transition>>, BookingError> {
        let mut tx = self.pool.begin().await?;

        let product = lock_product(&mut tx, product_id).await?;
        let booking = fetch_booking(&mut tx, booking_id).await?;
        if !booking.is_expired(now) {
            // Accepted, rejected or cancelled since the scan
            tx.commit().await?;
            return Ok(None);
        }

        let booking = set_booking_status(&mut tx, booking_id, BookingStatus::Cancelled, now).await?;
        let committed = enqueue_transition(
            &mut tx,
            Transition::Expired { booking, product },
            None,
            now,
        )
        .await?;
        tx.commit().await?;
        Ok(Some(committed))
    }
}

// ===== Row helpers, all run inside the caller's transaction =====

async fn lock_product(conn: &mut PgConnection, id: Uuid) -> Result<Product, BookingError> {
    sqlx::query_as::<_, Product>("SELECT * FROM products WHERE id = $1 FOR UPDATE")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or(BookingError::NotFound("Product"))
}

async fn fetch_booking(conn: &mut PgConnection, id: Uuid) -> Result<Booking, BookingError> {
    sqlx::query_as::<_, Booking>("SELECT * FROM bookings WHERE id = $1")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or(BookingError::NotFound("Booking"))
}

async fn booking_product_id(
    conn: &mut PgConnection,
    booking_id: Uuid,
) -> Result<Uuid, BookingError> {
    sqlx::query_as::<_, (Uuid,)>("SELECT product_id FROM bookings WHERE id = $1")
        .bind(booking_id)
        .fetch_optional(&mut *conn)
        .await?
        .map(|(product_id,)| product_id)
        .ok_or(BookingError::NotFound("Booking"))
}

async fn product_bookings(
    conn: &mut PgConnection,
    product_id: Uuid,
) -> Result<Vec<Booking>, sqlx::Error> {
    sqlx::query_as::<_, Booking>(
        "SELECT * FROM bookings WHERE product_id = $1 ORDER BY created_at, id",
    )
    .bind(product_id)
    .fetch_all(&mut *conn)
    .await
}

async fn set_booking_status(
    conn: &mut PgConnection,
    id: Uuid,
    status: BookingStatus,
    now: DateTime<Utc>,
) -> Result<Booking, sqlx::Error> {
    sqlx::query_as::<_, Booking>(
        r#"
        UPDATE bookings
        SET status = $1, updated_at = $2
        WHERE id = $3
        RETURNING *
        "#,
    )
    .bind(status)
    .bind(now)
    .bind(id)
    .fetch_one(&mut *conn)
    .await
}

async fn set_bookings_status(
    conn: &mut PgConnection,
    ids: &[Uuid],
    status: BookingStatus,
    now: DateTime<Utc>,
) -> Result<Vec<Booking>, sqlx::Error> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    let mut rows = sqlx::query_as::<_, Booking>(
        r#"
        UPDATE bookings
        SET status = $1, updated_at = $2
        WHERE id = ANY($3)
        RETURNING *
        "#,
    )
    .bind(status)
    .bind(now)
    .bind(ids)
    .fetch_all(&mut *conn)
    .await?;

    rows.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
    Ok(rows)
}

async fn set_product_status(
    conn: &mut PgConnection,
    id: Uuid,
    status: ProductStatus,
    now: DateTime<Utc>,
) -> Result<Product, sqlx::Error> {
    sqlx::query_as::<_, Product>(
        r#"
        UPDATE products
        SET status = $1, updated_at = $2
        WHERE id = $3
        RETURNING *
        "#,
    )
    .bind(status)
    .bind(now)
    .bind(id)
    .fetch_one(&mut *conn)
    .await
}

async fn enqueue(
    conn: &mut PgConnection,
    drafts: &[NotificationDraft],
    now: DateTime<Utc>,
) -> Result<Option<Uuid>, sqlx::Error> {
    if drafts.is_empty() {
        return Ok(None);
    }

    let id = Uuid::new_v4();
    sqlx::query("INSERT INTO notification_outbox (id, drafts, created_at) VALUES ($1, $2, $3)")
        .bind(id)
        .bind(Json(drafts))
        .bind(now)
        .execute(&mut *conn)
        .await?;

    Ok(Some(id))
}

async fn enqueue_transition(
    conn: &mut PgConnection,
    transition: Transition,
    actor_id: Option<Uuid>,
    now: DateTime<Utc>,
) -> Result<Committed<Transition>, BookingError> {
    let drafts = fanout::drafts_for_transition(&transition, actor_id);
    let outbox_id = enqueue(conn, &drafts, now).await?;
    Ok(Committed {
        value: transition,
        outbox_id,
    })
}

#[async_trait]
impl MarketplaceStore for PgStore {
    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "postgres"
    }

    async fn upsert_profile(
        &self,
        user_id: Uuid,
        profile: UpsertProfileRequest,
        now: DateTime<Utc>,
    ) -> Result<Profile, StoreError> {
        let result = sqlx::query_as::<_, Profile>(
            r#"
            INSERT INTO profiles (id, username, full_name, phone, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $5)
            ON CONFLICT (id) DO UPDATE
            SET username = EXCLUDED.username,
                full_name = EXCLUDED.full_name,
                phone = EXCLUDED.phone,
                updated_at = EXCLUDED.updated_at
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(&profile.username)
        .bind(&profile.full_name)
        .bind(&profile.phone)
        .bind(now)
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(row) => Ok(row),
            Err(sqlx::Error::Database(db_err))
                if db_err.constraint() == Some(USERNAME_CONSTRAINT) =>
            {
                Err(StoreError::Conflict(format!(
                    "username '{}' is taken",
                    profile.username
                )))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn get_profile(&self, user_id: Uuid) -> Result<Option<Profile>, StoreError> {
        let profile = sqlx::query_as::<_, Profile>("SELECT * FROM profiles WHERE id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(profile)
    }

    async fn insert_product(
        &self,
        product: NewProduct,
        now: DateTime<Utc>,
    ) -> Result<Product, StoreError> {
        let row = sqlx::query_as::<_, Product>(
            r#"
            INSERT INTO products (id, seller_id, title, price, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $6)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(product.seller_id)
        .bind(&product.title)
        .bind(product.price)
        .bind(ProductStatus::Active)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    async fn get_product(&self, id: Uuid) -> Result<Option<Product>, StoreError> {
        let product = sqlx::query_as::<_, Product>("SELECT * FROM products WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(product)
    }

    async fn list_products(&self, filter: &ProductFilter) -> Result<Vec<Product>, StoreError> {
        let mut query_builder: sqlx::QueryBuilder<sqlx::Postgres> =
            sqlx::QueryBuilder::new("SELECT * FROM products WHERE 1=1");

        if let Some(status) = filter.status {
            query_builder.push(" AND status = ");
            query_builder.push_bind(status);
        }
        if let Some(seller_id) = filter.seller_id {
            query_builder.push(" AND seller_id = ");
            query_builder.push_bind(seller_id);
        }

        query_builder.push(" ORDER BY created_at DESC LIMIT ");
        query_builder.push_bind(filter.page.limit);
        query_builder.push(" OFFSET ");
        query_builder.push_bind(filter.page.offset);

        let products = query_builder
            .build_query_as::<Product>()
            .fetch_all(&self.pool)
            .await?;
        Ok(products)
    }

    async fn request_booking(
        &self,
        cmd: RequestBooking,
        now: DateTime<Utc>,
    ) -> Result<Committed<Transition>, BookingError> {
        let mut tx = self.pool.begin().await?;

        let product = lock_product(&mut tx, cmd.product_id).await?;
        let existing = product_bookings(&mut tx, product.id).await?;
        let plan = machine::plan_request(&cmd, &product, &existing, now)?;

        let superseded = match plan.supersede {
            Some(stale) => {
                Some(set_booking_status(&mut tx, stale, BookingStatus::Cancelled, now).await?)
            }
            None => None,
        };

        let draft = machine::new_booking(&cmd, &product, now);
        let booking = sqlx::query_as::<_, Booking>(
            r#"
            INSERT INTO bookings (
                id, product_id, buyer_id, seller_id, offered_price, message,
                preferred_date, expires_at, status, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING *
            "#,
        )
        .bind(draft.id)
        .bind(draft.product_id)
        .bind(draft.buyer_id)
        .bind(draft.seller_id)
        .bind(draft.offered_price)
        .bind(&draft.message)
        .bind(draft.preferred_date)
        .bind(draft.expires_at)
        .bind(draft.status)
        .bind(draft.created_at)
        .bind(draft.updated_at)
        .fetch_one(&mut *tx)
        .await?;

        let committed = enqueue_transition(
            &mut tx,
            Transition::Requested {
                booking,
                superseded,
                product,
            },
            Some(cmd.buyer_id),
            now,
        )
        .await?;
        tx.commit().await?;
        Ok(committed)
    }

    async fn accept_booking(
        &self,
        booking_id: Uuid,
        caller_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Committed<Transition>, BookingError> {
        let mut tx = self.pool.begin().await?;

        let product_id = booking_product_id(&mut tx, booking_id).await?;
        let product = lock_product(&mut tx, product_id).await?;
        // Read after the lock so a concurrent accept's writes are visible
        let siblings = product_bookings(&mut tx, product_id).await?;
        let plan = machine::plan_accept(caller_id, booking_id, &product, &siblings, now)?;

        let booking = set_booking_status(&mut tx, plan.accept, BookingStatus::Accepted, now).await?;
        let rejected =
            set_bookings_status(&mut tx, &plan.reject, BookingStatus::Rejected, now).await?;
        let product = set_product_status(&mut tx, product_id, ProductStatus::Sold, now).await?;

        let committed = enqueue_transition(
            &mut tx,
            Transition::Accepted {
                booking,
                rejected,
                product,
            },
            Some(caller_id),
            now,
        )
        .await?;
        tx.commit().await?;
        Ok(committed)
    }

    async fn reject_booking(
        &self,
        booking_id: Uuid,
        caller_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Committed<Transition>, BookingError> {
        let mut tx = self.pool.begin().await?;

        let product_id = booking_product_id(&mut tx, booking_id).await?;
        let product = lock_product(&mut tx, product_id).await?;
        let target = fetch_booking(&mut tx, booking_id).await?;
        machine::check_reject(caller_id, &target)?;

        let booking = set_booking_status(&mut tx, booking_id, BookingStatus::Rejected, now).await?;
        let committed = enqueue_transition(
            &mut tx,
            Transition::Rejected { booking, product },
            Some(caller_id),
            now,
        )
        .await?;
        tx.commit().await?;
        Ok(committed)
    }

    async fn cancel_booking(
        &self,
        booking_id: Uuid,
        caller_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Committed<Transition>, BookingError> {
        let mut tx = self.pool.begin().await?;

        let product_id = booking_product_id(&mut tx, booking_id).await?;
        let product = lock_product(&mut tx, product_id).await?;
        let target = fetch_booking(&mut tx, booking_id).await?;
        machine::check_cancel(caller_id, &target)?;

        let booking = set_booking_status(&mut tx, booking_id, BookingStatus::Cancelled, now).await?;
        let committed = enqueue_transition(
            &mut tx,
            Transition::Cancelled { booking, product },
            Some(caller_id),
            now,
        )
        .await?;
        tx.commit().await?;
        Ok(committed)
    }

    async fn reactivate_product(
        &self,
        product_id: Uuid,
        caller_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Committed<Transition>, BookingError> {
        let mut tx = self.pool.begin().await?;

        let product = lock_product(&mut tx, product_id).await?;
        let bookings = product_bookings(&mut tx, product_id).await?;
        let plan = machine::plan_reactivate(caller_id, &product, &bookings)?;

        let released = match plan.release {
            Some(id) => Some(set_booking_status(&mut tx, id, BookingStatus::Cancelled, now).await?),
            None => None,
        };
        let product = set_product_status(&mut tx, product_id, ProductStatus::Active, now).await?;

        let committed = enqueue_transition(
            &mut tx,
            Transition::Reactivated { product, released },
            Some(caller_id),
            now,
        )
        .await?;
        tx.commit().await?;
        Ok(committed)
    }

    async fn expire_pending_bookings(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Committed<Transition>>, StoreError> {
        let due = sqlx::query_as::<_, (Uuid, Uuid)>(
            r#"
            SELECT id, product_id
            FROM bookings
            WHERE status = 'pending'
              AND expires_at IS NOT NULL
              AND expires_at <= $1
            ORDER BY expires_at
            LIMIT $2
            "#,
        )
        .bind(now)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        let mut committed = Vec::with_capacity(due.len());
        for (booking_id, product_id) in due {
            match self.expire_one(booking_id, product_id, now).await {
                Ok(Some(c)) => committed.push(c),
                Ok(None) => {}
                Err(BookingError::Store(e)) => return Err(e),
                Err(e) => {
                    tracing::warn!(booking_id = %booking_id, error = %e, "Skipping booking during expiry sweep");
                }
            }
        }
        Ok(committed)
    }

    async fn get_booking(&self, id: Uuid) -> Result<Option<Booking>, StoreError> {
        let booking = sqlx::query_as::<_, Booking>("SELECT * FROM bookings WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(booking)
    }

    async fn list_bookings(&self, filter: &BookingFilter) -> Result<Vec<Booking>, StoreError> {
        let mut query_builder: sqlx::QueryBuilder<sqlx::Postgres> =
            sqlx::QueryBuilder::new("SELECT * FROM bookings WHERE ");

        match filter.role {
            BookingRole::Buyer => query_builder.push("buyer_id = "),
            BookingRole::Seller => query_builder.push("seller_id = "),
        };
        query_builder.push_bind(filter.user_id);

        if let Some(status) = filter.status {
            query_builder.push(" AND status = ");
            query_builder.push_bind(status);
        }
        if let Some(product_id) = filter.product_id {
            query_builder.push(" AND product_id = ");
            query_builder.push_bind(product_id);
        }

        query_builder.push(" ORDER BY created_at DESC LIMIT ");
        query_builder.push_bind(filter.limit);
        query_builder.push(" OFFSET ");
        query_builder.push_bind(filter.offset);

        let bookings = query_builder
            .build_query_as::<Booking>()
            .fetch_all(&self.pool)
            .await?;
        Ok(bookings)
    }

    async fn insert_message(
        &self,
        message: NewMessage,
        now: DateTime<Utc>,
    ) -> Result<Committed<Message>, StoreError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, Message>(
            r#"
            INSERT INTO messages (id, sender_id, recipient_id, product_id, body, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(message.sender_id)
        .bind(message.recipient_id)
        .bind(message.product_id)
        .bind(&message.body)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        let outbox_id = enqueue(&mut tx, &fanout::drafts_for_message(&row), now).await?;
        tx.commit().await?;

        Ok(Committed {
            value: row,
            outbox_id,
        })
    }

    async fn list_conversation(
        &self,
        user_id: Uuid,
        other_id: Uuid,
        limit: i64,
    ) -> Result<Vec<Message>, StoreError> {
        let messages = sqlx::query_as::<_, Message>(
            r#"
            SELECT * FROM messages
            WHERE (sender_id = $1 AND recipient_id = $2)
               OR (sender_id = $2 AND recipient_id = $1)
            ORDER BY created_at DESC
            LIMIT $3
            "#,
        )
        .bind(user_id)
        .bind(other_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(messages)
    }

    async fn deliver_outbox(
        &self,
        outbox_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Vec<Notification>, StoreError> {
        let mut tx = self.pool.begin().await?;

        // A concurrent deliverer blocks here and then sees delivered_at set
        let pending = sqlx::query_as::<_, (Json<Vec<NotificationDraft>>,)>(
            r#"
            SELECT drafts FROM notification_outbox
            WHERE id = $1 AND delivered_at IS NULL
            FOR UPDATE
            "#,
        )
        .bind(outbox_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some((Json(drafts),)) = pending else {
            tx.commit().await?;
            return Ok(Vec::new());
        };

        let mut delivered = Vec::new();
        if !drafts.is_empty() {
            let rows: Vec<Notification> = drafts
                .into_iter()
                .map(|draft| draft.into_notification(outbox_id, now))
                .collect();

            let mut query_builder: sqlx::QueryBuilder<sqlx::Postgres> = sqlx::QueryBuilder::new(
                "INSERT INTO notifications (id, recipient_id, actor_id, type, title, body, payload, read, outbox_id, created_at) ",
            );
            query_builder.push_values(rows, |mut b, n| {
                b.push_bind(n.id)
                    .push_bind(n.recipient_id)
                    .push_bind(n.actor_id)
                    .push_bind(n.kind)
                    .push_bind(n.title)
                    .push_bind(n.body)
                    .push_bind(n.payload)
                    .push_bind(n.read)
                    .push_bind(n.outbox_id)
                    .push_bind(n.created_at);
            });
            query_builder.push(" ON CONFLICT (outbox_id, recipient_id) DO NOTHING RETURNING *");

            delivered = query_builder
                .build_query_as::<Notification>()
                .fetch_all(&mut *tx)
                .await?;
        }

        sqlx::query(
            r#"
            UPDATE notification_outbox
            SET delivered_at = $1, attempts = attempts + 1
            WHERE id = $2
            "#,
        )
        .bind(now)
        .bind(outbox_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(delivered)
    }

    async fn record_outbox_failure(&self, outbox_id: Uuid, error: &str) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE notification_outbox
            SET attempts = attempts + 1, last_error = $1
            WHERE id = $2
            "#,
        )
        .bind(error)
        .bind(outbox_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn undelivered_outbox(
        &self,
        older_than: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Uuid>, StoreError> {
        let rows = sqlx::query_as::<_, (Uuid,)>(
            r#"
            SELECT id FROM notification_outbox
            WHERE delivered_at IS NULL AND created_at <= $1
            ORDER BY created_at
            LIMIT $2
            "#,
        )
        .bind(older_than)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    async fn list_notifications(
        &self,
        filter: &NotificationFilter,
    ) -> Result<Vec<Notification>, StoreError> {
        let mut query_builder: sqlx::QueryBuilder<sqlx::Postgres> =
            sqlx::QueryBuilder::new("SELECT * FROM notifications WHERE recipient_id = ");
        query_builder.push_bind(filter.recipient_id);

        if filter.unread_only {
            query_builder.push(" AND read = FALSE");
        }

        query_builder.push(" ORDER BY created_at DESC LIMIT ");
        query_builder.push_bind(filter.limit);
        query_builder.push(" OFFSET ");
        query_builder.push_bind(filter.offset);

        let notifications = query_builder
            .build_query_as::<Notification>()
            .fetch_all(&self.pool)
            .await?;
        Ok(notifications)
    }

    async fn mark_notification_read(
        &self,
        id: Uuid,
        recipient_id: Uuid,
    ) -> Result<Option<Notification>, StoreError> {
        let notification = sqlx::query_as::<_, Notification>(
            r#"
            UPDATE notifications
            SET read = TRUE
            WHERE id = $1 AND recipient_id = $2
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(recipient_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(notification)
    }

    async fn mark_all_notifications_read(
        &self,
        recipient_id: Uuid,
    ) -> Result<Vec<Notification>, StoreError> {
        let notifications = sqlx::query_as::<_, Notification>(
            r#"
            UPDATE notifications
            SET read = TRUE
            WHERE recipient_id = $1 AND read = FALSE
            RETURNING *
            "#,
        )
        .bind(recipient_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(notifications)
    }

    async fn unread_count(&self, recipient_id: Uuid) -> Result<i64, StoreError> {
        let (count,) = sqlx::query_as::<_, (i64,)>(
            "SELECT COUNT(*) FROM notifications WHERE recipient_id = $1 AND read = FALSE",
        )
        .bind(recipient_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }
}
