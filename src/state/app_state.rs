//! Application state shared across handlers

use std::sync::Arc;

use axum::extract::FromRef;

use crate::auth::AuthService;
use crate::booking::BookingService;
use crate::catalog::CatalogService;
use crate::feed::ChangeFeed;
use crate::messaging::MessagingService;
use crate::notification::NotificationService;
use crate::store::MarketplaceStore;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn MarketplaceStore>,
    pub booking_service: Arc<BookingService>,
    pub notification_service: Arc<NotificationService>,
    pub catalog_service: Arc<CatalogService>,
    pub messaging_service: Arc<MessagingService>,
    pub auth_service: Arc<AuthService>,
    pub feed: ChangeFeed,
}

impl AppState {
    /// Build every service over one store and one change feed
    pub fn new(
        store: Arc<dyn MarketplaceStore>,
        auth_service: Arc<AuthService>,
        feed: ChangeFeed,
    ) -> Self {
        let notification_service = NotificationService::new(store.clone(), feed.clone());
        let booking_service =
            BookingService::new(store.clone(), notification_service.clone(), feed.clone());
        let messaging_service =
            MessagingService::new(store.clone(), notification_service.clone(), feed.clone());
        let catalog_service = CatalogService::new(store.clone(), feed.clone());

        Self {
            store,
            booking_service: Arc::new(booking_service),
            notification_service: Arc::new(notification_service),
            catalog_service: Arc::new(catalog_service),
            messaging_service: Arc::new(messaging_service),
            auth_service,
            feed,
        }
    }
}

impl FromRef<AppState> for ChangeFeed {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.feed.clone()
    }
}

impl FromRef<AppState> for Arc<AuthService> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.auth_service.clone()
    }
}

impl FromRef<AppState> for Arc<BookingService> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.booking_service.clone()
    }
}

impl FromRef<AppState> for Arc<NotificationService> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.notification_service.clone()
    }
}

impl FromRef<AppState> for Arc<CatalogService> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.catalog_service.clone()
    }
}

impl FromRef<AppState> for Arc<MessagingService> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.messaging_service.clone()
    }
}
