//! HTTP API for Pollcast.

use crate::node::NodeState;
use crate::ws::ws_handler;
use axum::{
    async_trait,
    extract::{ConnectInfo, FromRequestParts, Path, State},
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use pollcast_core::{
    Ballot, CallerContext, Error as CoreError, Identity, IdentityResolver, NewPoll, Poll, PollId,
    PollStats, PollUpdate, Vote, VoteStatus,
};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

type AppState = Arc<NodeState>;

/// Header carrying the user id vouched for by the upstream auth gateway.
pub const USER_ID_HEADER: &str = "x-user-id";

/// Build the API router.
pub fn build_router(state: AppState) -> Router {
    // CORS layer for browser access
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health
        .route("/health", get(health))
        .route("/ready", get(ready))
        // Polls
        .route("/api/v1/polls", post(create_poll))
        .route(
            "/api/v1/polls/:id",
            get(get_poll).put(update_poll).delete(delete_poll),
        )
        .route("/api/v1/polls/:id/close", post(close_poll))
        // Votes
        .route("/api/v1/votes", post(submit_vote))
        .route("/api/v1/votes/stats/:poll_id", get(get_stats))
        .route("/api/v1/votes/check/:poll_id", get(check_voted))
        // WebSocket change feed
        .route("/api/v1/ws", get(ws_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// --- Caller identity ---

/// The resolved identity of whoever sent the request.
pub struct Caller(pub Identity);

#[async_trait]
impl FromRequestParts<AppState> for Caller {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header = |name: &str| {
            parts
                .headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        let caller = CallerContext {
            user_id: header(USER_ID_HEADER),
            forwarded_for: header("x-forwarded-for"),
            peer: parts
                .extensions
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip().to_string()),
        };
        Ok(Caller(state.resolver.resolve(&caller)))
    }
}

// --- Errors ---

/// Error body returned to clients.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
}

/// Core error rendered as an HTTP response.
pub struct ApiError(CoreError);

impl From<CoreError> for ApiError {
    fn from(e: CoreError) -> Self {
        ApiError(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            CoreError::NotFound => StatusCode::NOT_FOUND,
            CoreError::PollClosed | CoreError::DuplicateVote => StatusCode::CONFLICT,
            CoreError::LoginRequired => StatusCode::UNAUTHORIZED,
            CoreError::Validation(_) => StatusCode::BAD_REQUEST,
            CoreError::ResultsHidden | CoreError::Forbidden => StatusCode::FORBIDDEN,
            CoreError::Storage(_) | CoreError::Serialization(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let message = if self.0.is_internal() {
            tracing::error!("Internal error: {}", self.0);
            "An internal error occurred".to_string()
        } else {
            self.0.to_string()
        };

        let body = ErrorBody {
            error: self.0.kind().to_string(),
            message,
        };
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

// --- Health endpoints ---

async fn health() -> &'static str {
    "OK"
}

async fn ready() -> &'static str {
    "OK"
}

// --- Poll endpoints ---

async fn create_poll(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Json(req): Json<NewPoll>,
) -> ApiResult<(StatusCode, Json<Poll>)> {
    let poll = state.engine.create_poll(&caller, req).await?;
    Ok((StatusCode::CREATED, Json(poll)))
}

async fn get_poll(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Caller(caller): Caller,
) -> ApiResult<Json<Poll>> {
    Ok(Json(state.engine.get_poll_for(&PollId::new(id), &caller)?))
}

async fn update_poll(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Caller(caller): Caller,
    Json(req): Json<PollUpdate>,
) -> ApiResult<Json<Poll>> {
    let poll = state
        .engine
        .update_poll(&PollId::new(id), &caller, req)
        .await?;
    Ok(Json(poll))
}

async fn close_poll(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Caller(caller): Caller,
) -> ApiResult<Json<Poll>> {
    let poll = state.engine.close_poll(&PollId::new(id), &caller).await?;
    Ok(Json(poll))
}

async fn delete_poll(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Caller(caller): Caller,
) -> ApiResult<StatusCode> {
    state.engine.delete_poll(&PollId::new(id), &caller).await?;
    Ok(StatusCode::NO_CONTENT)
}

// --- Vote endpoints ---

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubmitVoteRequest {
    poll_id: PollId,
    #[serde(flatten)]
    ballot: Ballot,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubmitVoteResponse {
    replaced: bool,
    vote: Vote,
}

async fn submit_vote(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Json(req): Json<SubmitVoteRequest>,
) -> ApiResult<(StatusCode, Json<SubmitVoteResponse>)> {
    let outcome = state
        .engine
        .submit_vote(&req.poll_id, caller, req.ballot)
        .await?;

    let replaced = outcome.is_replacement();
    let status = if replaced {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };
    Ok((
        status,
        Json(SubmitVoteResponse {
            replaced,
            vote: outcome.into_vote(),
        }),
    ))
}

async fn get_stats(
    State(state): State<AppState>,
    Path(poll_id): Path<String>,
    Caller(caller): Caller,
) -> ApiResult<Json<PollStats>> {
    Ok(Json(
        state.engine.get_aggregates(&PollId::new(poll_id), &caller)?,
    ))
}

async fn check_voted(
    State(state): State<AppState>,
    Path(poll_id): Path<String>,
    Caller(caller): Caller,
) -> ApiResult<Json<VoteStatus>> {
    Ok(Json(
        state.engine.check_voted(&PollId::new(poll_id), &caller)?,
    ))
}
