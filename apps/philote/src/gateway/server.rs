//! WebSocket upgrade handler: the admission boundary.

use axum::extract::ws::WebSocket;
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;

use crate::auth::middleware::AccessGrant;
use crate::auth::AccessKey;
use crate::AppState;

use super::philote::Philote;
use super::transport::Transport;

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(ws_upgrade))
}

/// The access token is checked before the upgrade, so a bad credential
/// gets a `401` and never becomes a connection.
async fn ws_upgrade(
    State(state): State<AppState>,
    AccessGrant(access_key): AccessGrant,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.read_buffer_size(state.config.read_buffer_size)
        .write_buffer_size(state.config.write_buffer_size)
        .on_upgrade(move |socket| serve_connection(socket, state, access_key))
}

async fn serve_connection(socket: WebSocket, state: AppState, access_key: AccessKey) {
    let philote = Philote::new(
        access_key,
        Transport::from_socket(socket),
        state.config.inbox_capacity,
    );
    let id = philote.id.clone();

    match state.hive.connect(philote).await {
        Ok(()) => tracing::info!(philote = %id, "philote connected"),
        Err(e) => tracing::warn!(philote = %id, error = %e, "philote not admitted"),
    }
}
