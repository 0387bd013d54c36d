use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};

use parley_types::api::{Claims, SetPinnedRequest, StartConversationRequest, StartConversationResponse};
use parley_types::models::ConversationId;

use crate::auth::AppState;
use crate::error::ApiResult;

/// POST /conversations
pub async fn start(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<StartConversationRequest>,
) -> ApiResult<impl IntoResponse> {
    let conversation_id = state
        .run(move |db| db.start_private_conversation(claims.sub, req.friend_id))
        .await?;
    Ok(Json(StartConversationResponse { conversation_id }))
}

/// GET /conversations
pub async fn list(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let conversations = state.run(move |db| db.conversation_list(claims.sub)).await?;
    Ok(Json(conversations))
}

/// DELETE /conversations/{id}
pub async fn hide(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(conversation_id): Path<ConversationId>,
) -> ApiResult<StatusCode> {
    state
        .run(move |db| db.hide_conversation(claims.sub, conversation_id))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /conversations/{id}/read
pub async fn mark_read(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(conversation_id): Path<ConversationId>,
) -> ApiResult<StatusCode> {
    state
        .run(move |db| db.mark_read(claims.sub, conversation_id))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// PUT /conversations/{id}/pin
pub async fn set_pinned(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(conversation_id): Path<ConversationId>,
    Json(req): Json<SetPinnedRequest>,
) -> ApiResult<StatusCode> {
    state
        .run(move |db| db.set_pinned(claims.sub, conversation_id, req.pinned))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
