use std::sync::{Arc, Mutex};

use axum::extract::{DefaultBodyLimit, Path, State};
use axum::http::{HeaderMap, Method};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use duplex_shared::{Message, MessageContent, UserId};
use duplex_store::Database;

use crate::config::ServerConfig;
use crate::delivery::{Delivery, PeerOverview};
use crate::error::ServerError;
use crate::gateway;
use crate::presence::PresenceRegistry;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<Mutex<Database>>,
    pub presence: Arc<PresenceRegistry>,
    pub delivery: Arc<Delivery>,
    pub config: Arc<ServerConfig>,
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        .route("/ws", get(gateway::ws_handler))
        .route("/api/users", get(list_users))
        .route("/api/messages/:peer_id", get(get_conversation))
        .route("/api/messages/send/:peer_id", post(send_message))
        .route("/api/messages/mark/:peer_id", put(mark_seen))
        // Image messages arrive inline as data URLs.
        .layer(DefaultBodyLimit::max(4 * 1024 * 1024))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Extract the pre-authenticated viewer identity injected by the external
/// auth layer.  Same trust boundary as the gateway's query parameter.
fn viewer_from_headers(headers: &HeaderMap) -> Result<UserId, ServerError> {
    let raw = headers
        .get("x-user-id")
        .and_then(|v| v.to_str().ok())
        .ok_or(ServerError::MissingIdentity)?;
    UserId::parse(raw).map_err(|_| ServerError::MissingIdentity)
}

fn parse_peer(raw: &str) -> Result<UserId, ServerError> {
    UserId::parse(raw).map_err(|e| ServerError::BadRequest(format!("Invalid peer id: {e}")))
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    instance: String,
}

#[derive(Serialize)]
struct MarkSeenResponse {
    marked: usize,
}

async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        instance: state.config.instance_name.clone(),
    })
}

/// Sidebar listing: known peers plus the viewer's unseen counts.
async fn list_users(
    headers: HeaderMap,
    State(state): State<AppState>,
) -> Result<Json<Vec<PeerOverview>>, ServerError> {
    let viewer = viewer_from_headers(&headers)?;
    Ok(Json(state.delivery.sidebar(viewer)?))
}

/// Full two-way conversation log with one peer, oldest first.
async fn get_conversation(
    headers: HeaderMap,
    State(state): State<AppState>,
    Path(peer_id): Path<String>,
) -> Result<Json<Vec<Message>>, ServerError> {
    let viewer = viewer_from_headers(&headers)?;
    let peer = parse_peer(&peer_id)?;
    Ok(Json(state.delivery.fetch_conversation(viewer, peer)?))
}

/// Submit a message; responds with the persisted record.
async fn send_message(
    headers: HeaderMap,
    State(state): State<AppState>,
    Path(peer_id): Path<String>,
    Json(content): Json<MessageContent>,
) -> Result<Json<Message>, ServerError> {
    let sender = viewer_from_headers(&headers)?;
    let recipient = parse_peer(&peer_id)?;
    let message = state.delivery.send(sender, recipient, &content)?;
    Ok(Json(message))
}

/// Mark every unseen message from the peer as seen.
async fn mark_seen(
    headers: HeaderMap,
    State(state): State<AppState>,
    Path(peer_id): Path<String>,
) -> Result<Json<MarkSeenResponse>, ServerError> {
    let viewer = viewer_from_headers(&headers)?;
    let peer = parse_peer(&peer_id)?;
    let marked = state.delivery.mark_seen(viewer, peer)?;
    Ok(Json(MarkSeenResponse { marked }))
}

pub async fn serve(state: AppState, addr: std::net::SocketAddr) -> anyhow::Result<()> {
    let app = build_router(state);

    info!(addr = %addr, "Starting HTTP API server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
