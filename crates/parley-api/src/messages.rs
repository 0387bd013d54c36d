use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};

use parley_types::api::{Claims, DeleteMessageResponse, RecallResponse, SendMessageResponse, SendTextRequest};
use parley_types::models::{ConversationId, MessageId};

use crate::auth::AppState;
use crate::error::{ApiError, ApiResult};

const MAX_TEXT_LEN: usize = 4000;

/// GET /conversations/{id}/messages
pub async fn history(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(conversation_id): Path<ConversationId>,
) -> ApiResult<impl IntoResponse> {
    let entries = state
        .run(move |db| db.chat_history(claims.sub, conversation_id))
        .await?;
    Ok(Json(entries))
}

/// POST /conversations/{id}/messages
pub async fn send_text(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(conversation_id): Path<ConversationId>,
    Json(req): Json<SendTextRequest>,
) -> ApiResult<impl IntoResponse> {
    if req.content.trim().is_empty() {
        return Err(ApiError::bad_request("message is empty"));
    }
    if req.content.chars().count() > MAX_TEXT_LEN {
        return Err(ApiError::bad_request("message too long"));
    }

    let message_id = state
        .run(move |db| db.send_text(claims.sub, conversation_id, &req.content))
        .await?;
    Ok((StatusCode::CREATED, Json(SendMessageResponse { message_id })))
}

/// POST /messages/{id}/recall
pub async fn recall(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(message_id): Path<MessageId>,
) -> ApiResult<impl IntoResponse> {
    let system_message_id = state
        .run(move |db| db.recall_message(claims.sub, message_id))
        .await?;
    Ok(Json(RecallResponse { system_message_id }))
}

/// DELETE /messages/{id}
pub async fn delete(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(message_id): Path<MessageId>,
) -> ApiResult<impl IntoResponse> {
    let last_message_id = state
        .run(move |db| db.delete_message(claims.sub, message_id))
        .await?;
    Ok(Json(DeleteMessageResponse { last_message_id }))
}
