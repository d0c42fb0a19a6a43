//! End-to-end transfers against a real listening server.
//!
//! Direct-strategy parts travel over HTTP to the `/signed` endpoint through the reqwest
//! client, exactly as a remote client would send them.

mod helpers;

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use helpers::test_config;
use vidlift_api::setup::{build_state, routes};
use vidlift_transfer::{ReqwestSignedUrlClient, TransferOrchestrator};

#[tokio::test]
async fn test_direct_transfer_over_http() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let state = build_state(test_config(&format!("http://127.0.0.1:{}", port)))
        .await
        .unwrap();
    let router = routes::setup_routes(state.clone());
    let server = tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    let client = Arc::new(ReqwestSignedUrlClient::new(Duration::from_secs(10)).unwrap());
    let orchestrator = TransferOrchestrator::direct(state.coordinator.clone(), client);

    let file = Bytes::from((0..100_000u32).map(|i| (i % 253) as u8).collect::<Vec<u8>>());
    let outcome = orchestrator
        .upload_file("videos/e2e.mp4", file.clone(), 16 * 1024, 3)
        .await
        .unwrap();
    assert_eq!(outcome.part_count, 7);

    let downloaded = orchestrator
        .download_file("videos/e2e.mp4", 10_000, 4)
        .await
        .unwrap();
    assert_eq!(downloaded, file);

    server.abort();
}
