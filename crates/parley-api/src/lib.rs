pub mod auth;
pub mod conversations;
pub mod error;
pub mod files;
pub mod friendships;
pub mod messages;
pub mod middleware;
pub mod sniff;
pub mod storage;

use axum::{
    Router,
    extract::{DefaultBodyLimit, Query, State, WebSocketUpgrade},
    middleware::from_fn_with_state,
    response::IntoResponse,
    routing::{delete, get, post, put},
};
use serde::Deserialize;
use tracing::warn;

use parley_gateway::connection;

use crate::auth::{AppState, decode_token};
use crate::error::ApiError;
use crate::middleware::require_auth;

/// Multipart framing on top of the file bytes themselves.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Every HTTP route plus the push gateway. Layers such as CORS and request
/// tracing are left to the binary.
pub fn build_router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/auth/login/uid", post(auth::login_by_uid))
        .route("/gateway", get(gateway_upgrade));

    let upload_limit = state.max_upload_bytes.saturating_add(MULTIPART_OVERHEAD);

    let protected_routes = Router::new()
        .route("/users/me", get(auth::me))
        .route("/users/me/uid", put(auth::revise_uid))
        .route("/users/{id}", get(auth::stranger_info))
        .route(
            "/friend-requests",
            post(friendships::send_request).get(friendships::list_requests),
        )
        .route("/friend-requests/{id}", delete(friendships::delete_request))
        .route("/friend-requests/{id}/accept", post(friendships::accept_request))
        .route("/friend-requests/{id}/reject", post(friendships::reject_request))
        .route("/friends", get(friendships::list_friends))
        .route(
            "/friends/{id}",
            get(friendships::friend_info).delete(friendships::delete_friend),
        )
        .route("/friends/{id}/remark", put(friendships::revise_remark))
        .route("/conversations", post(conversations::start).get(conversations::list))
        .route("/conversations/{id}", delete(conversations::hide))
        .route("/conversations/{id}/read", post(conversations::mark_read))
        .route("/conversations/{id}/pin", put(conversations::set_pinned))
        .route(
            "/conversations/{id}/messages",
            get(messages::history).post(messages::send_text),
        )
        .route(
            "/conversations/{id}/files",
            post(files::upload).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/messages/{id}", delete(messages::delete))
        .route("/messages/{id}/recall", post(messages::recall))
        .route("/messages/{id}/file", get(files::download))
        .layer(from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct GatewayParams {
    token: String,
}

/// GET /gateway?token=<jwt>. The token is checked before upgrading.
async fn gateway_upgrade(
    State(state): State<AppState>,
    Query(params): Query<GatewayParams>,
    ws: WebSocketUpgrade,
) -> Result<impl IntoResponse, ApiError> {
    let Some(claims) = decode_token(&state.jwt_secret, &params.token) else {
        warn!("Gateway upgrade rejected: invalid token");
        return Err(ApiError::Unauthorized);
    };

    let hub = state.hub.clone();
    Ok(ws.on_upgrade(move |socket| connection::run_connection(socket, hub, claims.sub)))
}
