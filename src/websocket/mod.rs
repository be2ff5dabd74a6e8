//! WebSocket gateway for the realtime change feed
//!
//! Clients authenticate with the bearer token (header, or `?token=` for
//! browsers), then receive every change visible to them. `subscribe`
//! narrows the stream to a set of tables.

use axum::{
    extract::{
        ws::{rejection::WebSocketUpgradeRejection, Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::{IntoResponse, Response},
};
use futures_util::{stream::SplitSink, SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;

use crate::auth::AuthService;
use crate::feed::{ChangeEvent, ChangeFeed, FeedItem, Subscription, Table};
use crate::middleware::{authenticate_token, AuthError, AuthenticatedUser, OptionalUser};

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    pub token: Option<String>,
}

/// Client message types
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClientMessage {
    /// `tables: null` restores the unfiltered stream
    Subscribe { tables: Option<Vec<Table>> },
    Ping,
}

/// Server message types
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ServerMessage {
    Subscribed { tables: Option<Vec<Table>> },
    Change { event: ChangeEvent },
    Resync { missed: u64 },
    Pong,
    Error { message: String },
}

/// WebSocket handler - authenticates before looking at the upgrade headers
pub async fn ws_handler(
    OptionalUser(user): OptionalUser,
    Query(query): Query<WsQuery>,
    State(auth_service): State<Arc<AuthService>>,
    State(feed): State<ChangeFeed>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let user = match (user, query.token) {
        (Some(user), _) => user,
        (None, Some(token)) => match authenticate_token(&auth_service, &token) {
            Ok(user) => user,
            Err(e) => return e.into_response(),
        },
        (None, None) => return AuthError::missing_token().into_response(),
    };

    match ws {
        Ok(ws) => ws.on_upgrade(move |socket| handle_socket(socket, feed, user)),
        Err(rejection) => rejection.into_response(),
    }
}

async fn handle_socket(socket: WebSocket, feed: ChangeFeed, user: AuthenticatedUser) {
    let mut subscription = feed.subscribe(user.user_id, None);
    let (mut sender, mut receiver) = socket.split();
    tracing::info!(user_id = %user.user_id, subscription_id = %subscription.id(), "WebSocket client connected");

    if send(&mut sender, &ServerMessage::Subscribed { tables: None }).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            item = subscription.next() => {
                let msg = match item {
                    Some(FeedItem::Change(event)) => ServerMessage::Change { event },
                    Some(FeedItem::Resync { missed }) => ServerMessage::Resync { missed },
                    None => break,
                };
                if send(&mut sender, &msg).await.is_err() {
                    break;
                }
            }
            incoming = receiver.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        let reply = handle_client_message(&mut subscription, &text);
                        if send(&mut sender, &reply).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    // Protocol pings are answered by axum
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    subscription.cancel();
    let _ = sender.close().await;
    tracing::info!(user_id = %user.user_id, "WebSocket client disconnected");
}

fn handle_client_message(subscription: &mut Subscription, text: &str) -> ServerMessage {
    match serde_json::from_str::<ClientMessage>(text) {
        Ok(ClientMessage::Subscribe {
            tables: Some(tables),
        }) if tables.is_empty() => ServerMessage::Error {
            message: "tables must not be empty; send null to receive every table".to_string(),
        },
        Ok(ClientMessage::Subscribe { tables }) => {
            subscription.set_tables(tables.clone().map(|t| t.into_iter().collect::<HashSet<_>>()));
            tracing::debug!(subscription_id = %subscription.id(), tables = ?tables, "Subscription updated");
            ServerMessage::Subscribed { tables }
        }
        Ok(ClientMessage::Ping) => ServerMessage::Pong,
        Err(e) => ServerMessage::Error {
            message: format!("Invalid message: {}", e),
        },
    }
}

async fn send(
    sender: &mut SplitSink<WebSocket, Message>,
    msg: &ServerMessage,
) -> Result<(), axum::Error> {
    match serde_json::to_string(msg) {
        Ok(text) => sender.send(Message::Text(text)).await,
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode WebSocket message");
            Ok(())
        }
    }
}
