use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use vidlift_core::models::SignedMethod;
use vidlift_storage::{
    delete_from_all, execute_signed_get, execute_signed_put, part_params, LocalStorage,
    MemoryStorage, SignedRequest, Storage, StorageBackend, StorageError, UrlSigner,
};

const SECRET: &str = "integration-secret-integration-secret";

fn signer() -> UrlSigner {
    UrlSigner::new(SECRET, "http://localhost:4000/api/v0")
}

fn to_request(method: SignedMethod, url: &str) -> SignedRequest {
    let (path, query) = url.split_once('?').expect("signed URL has a query");
    let key = path.split_once("/signed/").expect("signed URL path").1;
    let key = urlencoding::decode(key).unwrap().into_owned();
    let pairs = query.split('&').map(|pair| {
        let (name, value) = pair.split_once('=').unwrap();
        (
            urlencoding::decode(name).unwrap().into_owned(),
            urlencoding::decode(value).unwrap().into_owned(),
        )
    });
    SignedRequest::from_query(method, key, pairs).unwrap()
}

#[tokio::test]
async fn delete_reports_each_backend() {
    let dir = tempfile::tempdir().unwrap();
    let memory: Arc<dyn Storage> = Arc::new(MemoryStorage::new(signer()));
    let local: Arc<dyn Storage> = Arc::new(LocalStorage::new(dir.path(), signer()).await.unwrap());

    memory
        .put_object("clip.mp4", Bytes::from_static(b"frames"), "video/mp4")
        .await
        .unwrap();

    let report = delete_from_all(&[memory.clone(), local.clone()], "clip.mp4").await;
    assert_eq!(report.deleted, vec![StorageBackend::Memory]);
    assert_eq!(report.not_found, vec![StorageBackend::Local]);
    assert!(report.is_success());
    assert!(!memory.exists("clip.mp4").await.unwrap());

    let report = delete_from_all(&[memory, local], "clip.mp4").await;
    assert!(!report.removed_anywhere());
    assert_eq!(report.not_found.len(), 2);
}

#[tokio::test]
async fn signed_part_urls_drive_a_multipart_upload() {
    let dir = tempfile::tempdir().unwrap();
    let signer = signer();
    let storage = LocalStorage::new(dir.path(), signer.clone()).await.unwrap();

    let upload_id = storage.initiate_multipart("movies/long.mp4", "video/mp4").await.unwrap();
    let mut tokens = Vec::new();
    for (index, payload) in [&b"first-"[..], &b"second"[..]].iter().enumerate() {
        let url = storage
            .presign(
                SignedMethod::Put,
                "movies/long.mp4",
                Duration::from_secs(60),
                &part_params(&upload_id, index as u32),
            )
            .await
            .unwrap();
        let request = to_request(SignedMethod::Put, &url);
        let etag = execute_signed_put(&storage, &signer, &request, Bytes::copy_from_slice(payload))
            .await
            .unwrap();
        tokens.push(vidlift_core::models::CompletedPart {
            index: index as u32,
            etag,
        });
    }

    storage
        .complete_multipart("movies/long.mp4", &upload_id, &tokens)
        .await
        .unwrap();

    let url = storage
        .presign(SignedMethod::Get, "movies/long.mp4", Duration::from_secs(60), &[])
        .await
        .unwrap();
    let read = execute_signed_get(
        &storage,
        &signer,
        &to_request(SignedMethod::Get, &url),
        Some("bytes=6-11"),
    )
    .await
    .unwrap();
    assert_eq!(read.data, Bytes::from_static(b"second"));
    assert_eq!(read.range, Some((6..12, 12)));
}

#[tokio::test]
async fn tampered_signed_url_is_refused() {
    let signer = signer();
    let storage = MemoryStorage::new(signer.clone());
    let url = storage
        .presign(SignedMethod::Put, "a.mp4", Duration::from_secs(60), &[])
        .await
        .unwrap();

    let mut request = to_request(SignedMethod::Put, &url);
    request.key = "b.mp4".to_string();
    let err = execute_signed_put(&storage, &signer, &request, Bytes::from_static(b"x"))
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::SignatureInvalid(_)));
    assert!(storage.list_objects("").await.unwrap().is_empty());

    let as_get = to_request(SignedMethod::Get, &url);
    assert!(execute_signed_get(&storage, &signer, &as_get, None)
        .await
        .is_err());
}
