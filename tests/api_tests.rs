//! HTTP API tests
//!
//! Drive the full router (middleware included) over the in-memory store.

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;
use uuid::Uuid;

use marketplace_server::auth::AuthService;
use marketplace_server::build_router;
use marketplace_server::config::Config;
use marketplace_server::feed::ChangeFeed;
use marketplace_server::middleware::RateLimiter;
use marketplace_server::state::AppState;
use marketplace_server::store::MemoryStore;

struct TestApp {
    router: Router,
    auth: Arc<AuthService>,
}

impl TestApp {
    fn new() -> Self {
        Self::with_rate_limit(1000)
    }

    fn with_rate_limit(requests_per_second: u32) -> Self {
        let config = Config::default();
        let auth = Arc::new(AuthService::new(config.jwt_secret.clone()));
        let state = AppState::new(
            Arc::new(MemoryStore::new()),
            auth.clone(),
            ChangeFeed::new(config.feed_channel_capacity),
        );
        let router = build_router(state, &config, RateLimiter::new(requests_per_second));
        Self { router, auth }
    }

    fn token(&self, user_id: Uuid) -> String {
        self.auth.issue_token(user_id).unwrap()
    }

    async fn call(
        &self,
        method: Method,
        uri: &str,
        user: Option<Uuid>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(user_id) = user {
            builder = builder.header(
                header::AUTHORIZATION,
                format!("Bearer {}", self.token(user_id)),
            );
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json)
    }

    async fn create_product(&self, seller: Uuid) -> String {
        let (status, body) = self
            .call(
                Method::POST,
                "/api/products",
                Some(seller),
                Some(json!({ "title": "Desk lamp", "price": 35 })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        body["data"]["id"].as_str().unwrap().to_string()
    }

    async fn create_booking(&self, buyer: Uuid, product_id: &str) -> (StatusCode, Value) {
        self.call(
            Method::POST,
            "/api/bookings",
            Some(buyer),
            Some(json!({ "product_id": product_id, "offered_price": 30 })),
        )
        .await
    }
}

#[tokio::test]
async fn test_health_check() {
    let app = TestApp::new();

    let (status, body) = app.call(Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["backend"], "memory");
}

#[tokio::test]
async fn test_security_headers_are_set() {
    let app = TestApp::new();
    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();

    let headers = response.headers();
    assert_eq!(headers["x-content-type-options"], "nosniff");
    assert_eq!(headers["x-frame-options"], "DENY");
    assert!(headers.get("strict-transport-security").is_none());
}

#[tokio::test]
async fn test_requests_without_token_are_rejected() {
    let app = TestApp::new();

    let (status, body) = app
        .call(Method::POST, "/api/bookings", None, Some(json!({ "product_id": Uuid::new_v4() })))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "MISSING_TOKEN");

    let request = Request::builder()
        .uri("/api/notifications")
        .header(header::AUTHORIZATION, "Bearer not-a-token")
        .body(Body::empty())
        .unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_websocket_requires_token() {
    let app = TestApp::new();

    let (status, _) = app.call(Method::GET, "/ws", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app.call(Method::GET, "/ws?token=garbage", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_booking_flow_over_http() {
    let app = TestApp::new();
    let seller = Uuid::new_v4();
    let (buyer_a, buyer_b) = (Uuid::new_v4(), Uuid::new_v4());
    let product_id = app.create_product(seller).await;

    let (status, a) = app.create_booking(buyer_a, &product_id).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(a["data"]["status"], "pending");
    assert_eq!(a["data"]["notifications"]["status"], "delivered");
    assert_eq!(a["data"]["notifications"]["count"], 1);

    let (status, b) = app.create_booking(buyer_b, &product_id).await;
    assert_eq!(status, StatusCode::CREATED);
    let booking_a = a["data"]["id"].as_str().unwrap();
    let booking_b = b["data"]["id"].as_str().unwrap();

    // Only the seller may accept
    let (status, body) = app
        .call(Method::POST, &format!("/api/bookings/{}/accept", booking_a), Some(buyer_a), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["code"], "NOT_AUTHORIZED");

    let (status, body) = app
        .call(Method::POST, &format!("/api/bookings/{}/accept", booking_a), Some(seller), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["booking"]["status"], "accepted");
    assert_eq!(body["data"]["product"]["status"], "sold");
    assert_eq!(body["data"]["rejected"][0]["id"], booking_b);
    assert_eq!(body["data"]["notifications"]["count"], 2);

    // The sibling was rejected in the same step
    let (status, body) = app
        .call(Method::GET, &format!("/api/bookings/{}", booking_b), Some(buyer_b), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "rejected");

    let (status, body) = app
        .call(Method::POST, &format!("/api/bookings/{}/accept", booking_b), Some(seller), None)
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "INVALID_TRANSITION");

    let (status, body) = app.create_booking(Uuid::new_v4(), &product_id).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "PRODUCT_UNAVAILABLE");

    let (status, body) = app
        .call(Method::GET, "/api/notifications/unread-count", Some(buyer_b), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["unread"], 1);

    let (status, body) = app
        .call(
            Method::GET,
            &format!("/api/bookings?role=seller&product_id={}", product_id),
            Some(seller),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 2);

    let (status, body) = app
        .call(Method::POST, &format!("/api/products/{}/reactivate", product_id), Some(seller), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["product"]["status"], "active");
    assert_eq!(body["data"]["released"]["id"], booking_a);
}

#[tokio::test]
async fn test_booking_error_mapping() {
    let app = TestApp::new();
    let seller = Uuid::new_v4();
    let product_id = app.create_product(seller).await;

    let (status, body) = app.create_booking(seller, &product_id).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["code"], "SELF_BOOKING_FORBIDDEN");

    let buyer = Uuid::new_v4();
    app.create_booking(buyer, &product_id).await;
    let (status, body) = app.create_booking(buyer, &product_id).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "ALREADY_BOOKED");

    let (status, body) = app
        .call(
            Method::POST,
            &format!("/api/bookings/{}/reject", Uuid::new_v4()),
            Some(seller),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NOT_FOUND");

    let (status, _) = app.create_booking(buyer, &Uuid::new_v4().to_string()).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_validation_errors() {
    let app = TestApp::new();
    let seller = Uuid::new_v4();

    let (status, body) = app
        .call(
            Method::POST,
            "/api/products",
            Some(seller),
            Some(json!({ "title": "", "price": 10 })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");

    let product_id = app.create_product(seller).await;
    let (status, body) = app
        .call(
            Method::POST,
            "/api/bookings",
            Some(Uuid::new_v4()),
            Some(json!({ "product_id": product_id, "offered_price": -5 })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");

    let (status, body) = app
        .call(
            Method::POST,
            "/api/messages",
            Some(seller),
            Some(json!({ "recipient_id": seller, "body": "note to self" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn test_notifications_over_http() {
    let app = TestApp::new();
    let seller = Uuid::new_v4();
    let product_id = app.create_product(seller).await;
    app.create_booking(Uuid::new_v4(), &product_id).await;
    app.create_booking(Uuid::new_v4(), &product_id).await;

    let (status, body) = app
        .call(Method::GET, "/api/notifications", Some(seller), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    let list = body["data"].as_array().unwrap();
    assert_eq!(list.len(), 2);
    assert_eq!(list[0]["type"], "booking_request");
    let first = list[0]["id"].as_str().unwrap().to_string();

    let (status, _) = app
        .call(
            Method::POST,
            &format!("/api/notifications/{}/read", first),
            Some(Uuid::new_v4()),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = app
        .call(Method::POST, &format!("/api/notifications/{}/read", first), Some(seller), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["read"], true);

    let (status, body) = app
        .call(Method::POST, "/api/notifications/read-all", Some(seller), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["updated"], 1);
}

#[tokio::test]
async fn test_profiles() {
    let app = TestApp::new();
    let user = Uuid::new_v4();

    let (status, body) = app
        .call(
            Method::PUT,
            "/api/profiles/me",
            Some(user),
            Some(json!({ "username": "lampseller", "full_name": "Ada Lamp" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["id"], user.to_string());

    let (status, body) = app
        .call(
            Method::PUT,
            "/api/profiles/me",
            Some(Uuid::new_v4()),
            Some(json!({ "username": "lampseller" })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "CONFLICT");

    let (status, _) = app
        .call(Method::GET, &format!("/api/profiles/{}", Uuid::new_v4()), None, None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_rate_limit() {
    let app = TestApp::with_rate_limit(1);

    // Burst of two, then throttled
    for _ in 0..2 {
        let (status, _) = app.call(Method::GET, "/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
    }
    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(response.headers()[header::RETRY_AFTER], "1");
}
