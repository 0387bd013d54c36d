use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::info;

use parley_types::api::{
    AcceptFriendRequestResponse, Claims, FriendRequestCreated, FriendRequestResponse, FriendResponse,
    ReviseRemarkRequest, SendFriendRequest,
};
use parley_types::events::PushEvent;
use parley_types::models::{RequestId, UserId};

use crate::auth::AppState;
use crate::error::{ApiError, ApiResult};

const MAX_REQUEST_MESSAGE: usize = 200;
const MAX_REMARK: usize = 32;

/// POST /friend-requests
pub async fn send_request(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SendFriendRequest>,
) -> ApiResult<impl IntoResponse> {
    if req.message.chars().count() > MAX_REQUEST_MESSAGE {
        return Err(ApiError::bad_request("message too long"));
    }

    let sender_id = claims.sub;
    let sender_name = claims.name.clone();
    let receiver_id = req.receiver_id;
    let message = req.message.clone();
    let request_id = state
        .run(move |db| db.send_friend_request(sender_id, receiver_id, &message, &sender_name))
        .await?;

    info!("Friend request {} from {} to {}", request_id, sender_id, receiver_id);

    // Best-effort: the request is stored whether or not this lands.
    state
        .hub
        .notify(
            receiver_id,
            &PushEvent::NewFriendRequest {
                sender_id,
                sender_name: claims.name,
                message: req.message,
            },
        )
        .await;

    Ok((StatusCode::CREATED, Json(FriendRequestCreated { request_id })))
}

/// GET /friend-requests
pub async fn list_requests(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let rows = state.run(move |db| db.list_friend_requests(claims.sub)).await?;

    let requests: Vec<FriendRequestResponse> = rows
        .into_iter()
        .map(|r| FriendRequestResponse {
            request_id: r.id,
            sender_id: r.sender_id,
            sender_name: r.sender_name,
            receiver_id: r.receiver_id,
            message: r.message,
            status: r.status,
            created_at: r.created_at,
        })
        .collect();

    Ok(Json(requests))
}

/// POST /friend-requests/{id}/accept
pub async fn accept_request(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(request_id): Path<RequestId>,
) -> ApiResult<impl IntoResponse> {
    let conversation_id = state
        .run(move |db| db.accept_friend_request(request_id, claims.sub))
        .await?;
    Ok(Json(AcceptFriendRequestResponse { conversation_id }))
}

/// POST /friend-requests/{id}/reject
pub async fn reject_request(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(request_id): Path<RequestId>,
) -> ApiResult<StatusCode> {
    state
        .run(move |db| db.reject_friend_request(request_id, claims.sub))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /friend-requests/{id}
pub async fn delete_request(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(request_id): Path<RequestId>,
) -> ApiResult<StatusCode> {
    state
        .run(move |db| db.delete_friend_request(request_id, claims.sub))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /friends
pub async fn list_friends(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let rows = state.run(move |db| db.list_friends(claims.sub)).await?;

    let friends: Vec<FriendResponse> = rows
        .into_iter()
        .map(|f| FriendResponse {
            friend_id: f.friend_id,
            remark: f.remark,
            name: f.name,
            uid: f.uid,
        })
        .collect();

    Ok(Json(friends))
}

/// GET /friends/{id}
pub async fn friend_info(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(friend_id): Path<UserId>,
) -> ApiResult<impl IntoResponse> {
    let f = state.run(move |db| db.friend_info(claims.sub, friend_id)).await?;

    Ok(Json(FriendResponse {
        friend_id: f.friend_id,
        remark: f.remark,
        name: f.name,
        uid: f.uid,
    }))
}

/// DELETE /friends/{id}
pub async fn delete_friend(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(friend_id): Path<UserId>,
) -> ApiResult<StatusCode> {
    state
        .run(move |db| db.delete_friendship(claims.sub, friend_id))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// PUT /friends/{id}/remark
pub async fn revise_remark(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(friend_id): Path<UserId>,
    Json(req): Json<ReviseRemarkRequest>,
) -> ApiResult<StatusCode> {
    let remark = req.remark.trim().to_string();
    if remark.is_empty() || remark.chars().count() > MAX_REMARK {
        return Err(ApiError::bad_request("remark must be 1-32 characters"));
    }

    state
        .run(move |db| db.revise_remark(claims.sub, friend_id, &remark))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
