mod common;

use axum::body::Body;
use http::{Request, StatusCode};
use tower::ServiceExt;

#[tokio::test]
async fn health_reports_live_connections() {
    let (addr, state) = common::start_server(10).await;
    let token = common::mint_token(&["x"], &["x"]);
    let _a = common::connect(addr, &token).await.expect("connect");
    let _b = common::connect(addr, &token).await.expect("connect");
    common::wait_for_count(&state, 2).await;

    let app = philote::routes::router().with_state(state);
    let resp = app
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["connections"], 2);
}

#[tokio::test]
async fn plain_http_to_gateway_without_token_is_unauthorized() {
    let state = common::test_state(10);
    let app = philote::routes::router().with_state(state);

    let resp = app
        .oneshot(Request::get("/").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");
}
