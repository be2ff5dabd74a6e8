use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use validator::Validate;

use super::AuthenticatedUser;
use crate::error::ApiResult;
use crate::messaging::{ConversationQuery, Message, SendMessageRequest};
use crate::models::ApiResponse;
use crate::notification::Outcome;
use crate::state::AppState;

pub async fn send_message(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    Json(request): Json<SendMessageRequest>,
) -> ApiResult<(StatusCode, Json<ApiResponse<Outcome<Message>>>)> {
    request.validate()?;

    let outcome = app_state
        .messaging_service
        .send(user.user_id, request)
        .await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(outcome))))
}

/// Conversation between the caller and `?with=<user>`
pub async fn list_messages(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    Query(query): Query<ConversationQuery>,
) -> ApiResult<Json<ApiResponse<Vec<Message>>>> {
    let messages = app_state
        .messaging_service
        .conversation(user.user_id, query)
        .await?;
    Ok(Json(ApiResponse::ok(messages)))
}
