#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use jsonwebtoken::{EncodingKey, Header};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use philote::config::Config;
use philote::gateway::Hive;
use philote::AppState;

pub type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

pub const TEST_SECRET: &str = "philote-test-secret";

pub fn test_config(max_connections: usize) -> Config {
    Config {
        jwt_secret: TEST_SECRET.to_string(),
        port: 0,
        max_connections,
        inbox_capacity: 64,
        read_buffer_size: 1024,
        write_buffer_size: 1024,
        redis_url: None,
    }
}

/// Must be called from inside a tokio runtime (the hive spawns its keeper).
pub fn test_state(max_connections: usize) -> AppState {
    AppState::new(test_config(max_connections), Hive::new(max_connections))
}

/// Mint an HS256 token with the given channel grants.
pub fn mint_token(read: &[&str], write: &[&str]) -> String {
    let claims = serde_json::json!({ "read": read, "write": write });
    jsonwebtoken::encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(TEST_SECRET.as_bytes()),
    )
    .expect("mint test token")
}

/// Start an actual TCP server for WebSocket testing.
pub async fn start_server(max_connections: usize) -> (SocketAddr, AppState) {
    let state = test_state(max_connections);
    let app = philote::routes::router().with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (addr, state)
}

/// Open a gateway connection authenticated with a bearer header.
pub async fn connect(
    addr: SocketAddr,
    token: &str,
) -> Result<WsStream, tokio_tungstenite::tungstenite::Error> {
    let mut request = format!("ws://{addr}/").into_client_request()?;
    request.headers_mut().insert(
        "Authorization",
        HeaderValue::from_str(&format!("Bearer {token}")).expect("header value"),
    );
    let (ws, _) = tokio_tungstenite::connect_async(request).await?;
    Ok(ws)
}

/// Wait until the hive reports `expected` live connections.
pub async fn wait_for_count(state: &AppState, expected: usize) {
    let settled = tokio::time::timeout(Duration::from_secs(5), async {
        while state.hive.count().await != expected {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(
        settled.is_ok(),
        "expected {expected} connections, hive reports {}",
        state.hive.count().await
    );
}
