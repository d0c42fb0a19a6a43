//! Test helpers: build AppState and router over in-memory storage.

#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;

use axum_test::TestServer;
use vidlift_api::setup::{build_state, routes};
use vidlift_api::AppState;
use vidlift_core::constants::API_PREFIX;
use vidlift_core::{Config, StorageBackend, TransferSettings};

pub const TEST_SIGNING_SECRET: &str = "api-test-signing-secret-api-test-signing";

/// API path prefix for tests (e.g. `/api/v0`).
pub fn api_path(path: &str) -> String {
    format!("{}{}", API_PREFIX, path)
}

pub fn test_config(public_base_url: &str) -> Config {
    Config::new(TransferSettings {
        storage_backend: StorageBackend::Memory,
        public_base_url: public_base_url.to_string(),
        url_signing_secret: Some(TEST_SIGNING_SECRET.to_string()),
        chunk_size_bytes: 64 * 1024,
        max_part_size_bytes: 1024 * 1024,
        ..TransferSettings::default()
    })
}

pub struct TestApp {
    pub server: TestServer,
    pub state: Arc<AppState>,
}

impl TestApp {
    pub fn client(&self) -> &TestServer {
        &self.server
    }
}

pub async fn setup_test_app() -> TestApp {
    let state = build_state(test_config("http://localhost:4000"))
        .await
        .expect("state builds over memory storage");
    let server = TestServer::new(routes::setup_routes(state.clone())).expect("test server");
    TestApp { server, state }
}

/// App over a local-disk backend rooted at `dir`.
pub async fn setup_local_test_app(dir: &Path) -> TestApp {
    let mut config = test_config("http://localhost:4000");
    config.0.storage_backend = StorageBackend::Local;
    config.0.local_storage_path = Some(dir.to_string_lossy().into_owned());
    let state = build_state(config)
        .await
        .expect("state builds over local storage");
    let server = TestServer::new(routes::setup_routes(state.clone())).expect("test server");
    TestApp { server, state }
}

/// Split an absolute signed URL into its path and decoded query pairs.
pub fn split_signed_url(url: &str) -> (String, Vec<(String, String)>) {
    let parsed = reqwest::Url::parse(url).expect("signed URL parses");
    let pairs = parsed
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    (parsed.path().to_string(), pairs)
}
