use std::ops::Range;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use vidlift_core::models::{
    CompletedPart, ObjectEntry, PartReceipt, SessionTicket, SignedMethod, TransferStrategy,
};
use vidlift_core::{TransferError, TransferResult};
use vidlift_storage::keys::staging_key;
use vidlift_storage::{
    LocalStorage, MemoryStorage, Storage, StorageBackend, StorageResult, StorageSet, UrlSigner,
};
use vidlift_transfer::{
    ChunkSessionStore, Coordinator, CoordinatorSettings, DirectTransport, LoopbackSignedUrlClient,
    PartTransport, ProxiedTransport, TransferJob, TransferOrchestrator,
};

const SECRET: &str = "transfer-tests-secret-transfer-tests-secret";
const MIB: u64 = 1024 * 1024;

fn signer() -> UrlSigner {
    UrlSigner::new(SECRET, "http://localhost:4000/api/v0")
}

fn memory_set() -> StorageSet {
    let signer = signer();
    StorageSet {
        primary: Arc::new(MemoryStorage::new(signer.clone())),
        mirrors: Vec::new(),
        signer,
    }
}

async fn local_set(dir: &std::path::Path) -> StorageSet {
    let signer = signer();
    StorageSet {
        primary: Arc::new(LocalStorage::new(dir, signer.clone()).await.unwrap()),
        mirrors: Vec::new(),
        signer,
    }
}

fn settings() -> CoordinatorSettings {
    CoordinatorSettings {
        default_chunk_size: 5 * MIB,
        max_part_count: 10_000,
        max_part_size: 64 * MIB,
        presign_expiry: Duration::from_secs(900),
    }
}

fn coordinator_with_ttl(set: StorageSet, ttl: Duration) -> Coordinator {
    Coordinator::new(set, ChunkSessionStore::new(16, ttl), settings())
}

fn coordinator(set: StorageSet) -> Coordinator {
    coordinator_with_ttl(set, Duration::from_secs(3600))
}

fn direct(coordinator: &Coordinator) -> TransferOrchestrator {
    let client = Arc::new(LoopbackSignedUrlClient::new(
        coordinator.storage().clone(),
        coordinator.signer().clone(),
    ));
    TransferOrchestrator::direct(coordinator.clone(), client)
}

fn sample(len: usize) -> Bytes {
    Bytes::from((0..len).map(|i| (i % 251) as u8).collect::<Vec<u8>>())
}

#[tokio::test]
async fn proxied_round_trip_is_byte_identical() {
    let coordinator = coordinator(memory_set());
    let orchestrator = TransferOrchestrator::proxied(coordinator.clone());
    let file = sample(10_000);

    let outcome = orchestrator
        .upload_file("videos/clip.mp4", file.clone(), 1_024, 3)
        .await
        .unwrap();
    assert_eq!(outcome.part_count, 10);
    assert_eq!(outcome.bytes_transferred, 10_000);
    assert_eq!(outcome.strategy, TransferStrategy::Proxied);

    let downloaded = orchestrator
        .download_file("videos/clip.mp4", 4_096, 2)
        .await
        .unwrap();
    assert_eq!(downloaded, file);

    let listed = coordinator.list_objects("").await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].name, "videos/clip.mp4");
    assert!(coordinator.sessions().is_empty().await);
}

#[tokio::test]
async fn direct_round_trip_is_byte_identical() {
    let coordinator = coordinator(memory_set());
    let orchestrator = direct(&coordinator);
    let file = sample(7_777);

    let outcome = orchestrator
        .upload_file("videos/direct.mp4", file.clone(), 1_000, 3)
        .await
        .unwrap();
    assert_eq!(outcome.part_count, 8);
    assert_eq!(outcome.strategy, TransferStrategy::Direct);

    let downloaded = orchestrator
        .download_file("videos/direct.mp4", 3_000, 3)
        .await
        .unwrap();
    assert_eq!(downloaded, file);
}

#[tokio::test]
async fn direct_round_trip_on_local_disk() {
    let dir = tempfile::tempdir().unwrap();
    let coordinator = coordinator(local_set(dir.path()).await);
    let orchestrator = direct(&coordinator);
    let file = sample(5_000);

    orchestrator
        .upload_file("movies/disk.mp4", file.clone(), 999, 4)
        .await
        .unwrap();
    let downloaded = orchestrator.download_single_shot("movies/disk.mp4").await.unwrap();
    assert_eq!(downloaded, file);
}

#[tokio::test]
async fn empty_file_round_trips_as_one_part() {
    let coordinator = coordinator(memory_set());
    for orchestrator in [TransferOrchestrator::proxied(coordinator.clone()), direct(&coordinator)] {
        let name = format!("empty/{}.mp4", orchestrator.strategy());
        let outcome = orchestrator
            .upload_file(&name, Bytes::new(), 1_024, 3)
            .await
            .unwrap();
        assert_eq!(outcome.part_count, 1);
        assert_eq!(coordinator.object_size(&name).await.unwrap(), 0);
        let downloaded = orchestrator.download_file(&name, 1_024, 3).await.unwrap();
        assert!(downloaded.is_empty());
    }
}

#[tokio::test]
async fn twelve_mib_splits_into_three_parts() {
    let coordinator = coordinator(memory_set());
    let orchestrator = TransferOrchestrator::proxied(coordinator.clone());
    let file = sample((12 * MIB) as usize);

    let outcome = orchestrator
        .upload_file("videos/large.mp4", file.clone(), 5 * MIB, 3)
        .await
        .unwrap();
    assert_eq!(outcome.part_count, 3);
    assert_eq!(
        coordinator.object_size("videos/large.mp4").await.unwrap(),
        12 * MIB
    );

    let downloaded = orchestrator
        .download_file("videos/large.mp4", 5 * MIB, 3)
        .await
        .unwrap();
    assert_eq!(downloaded.len() as u64, 12 * MIB);
    assert_eq!(downloaded, file);
}

/// Wraps a transport, tracking peak concurrency and failing one chosen index.
struct InstrumentedTransport {
    inner: Arc<dyn PartTransport>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    calls: AtomicUsize,
    fail_index: Option<u32>,
}

impl InstrumentedTransport {
    fn new(coordinator: Coordinator, fail_index: Option<u32>) -> Self {
        Self::wrapping(Arc::new(ProxiedTransport::new(coordinator)), fail_index)
    }

    fn wrapping(inner: Arc<dyn PartTransport>, fail_index: Option<u32>) -> Self {
        InstrumentedTransport {
            inner,
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
            fail_index,
        }
    }

    async fn enter(&self, index: u32) -> TransferResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(10)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        if self.fail_index == Some(index) {
            return Err(TransferError::Storage(format!("injected failure at {}", index)));
        }
        Ok(())
    }
}

#[async_trait]
impl PartTransport for InstrumentedTransport {
    async fn upload_part(
        &self,
        destination: &SessionTicket,
        index: u32,
        payload: Bytes,
    ) -> TransferResult<PartReceipt> {
        self.enter(index).await?;
        self.inner.upload_part(destination, index, payload).await
    }

    async fn download_part(
        &self,
        source: &str,
        index: u32,
        range: Range<u64>,
    ) -> TransferResult<Bytes> {
        self.enter(index).await?;
        self.inner.download_part(source, index, range).await
    }

    fn strategy(&self) -> TransferStrategy {
        self.inner.strategy()
    }
}

#[tokio::test]
async fn concurrency_never_exceeds_the_limit() {
    let coordinator = coordinator(memory_set());
    let transport = Arc::new(InstrumentedTransport::new(coordinator.clone(), None));
    let orchestrator = TransferOrchestrator::new(coordinator, transport.clone());

    orchestrator
        .upload_file("videos/bounded.mp4", sample(10 * 100), 100, 3)
        .await
        .unwrap();

    assert_eq!(transport.calls.load(Ordering::SeqCst), 10);
    assert_eq!(transport.peak.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn failed_part_aborts_and_leaves_nothing_behind() {
    let coordinator = coordinator(memory_set());
    let transport = Arc::new(InstrumentedTransport::new(coordinator.clone(), Some(1)));
    let orchestrator = TransferOrchestrator::new(coordinator.clone(), transport.clone());

    let err = orchestrator
        .upload_file("videos/broken.mp4", sample(1_000), 100, 3)
        .await
        .unwrap_err();

    match err {
        TransferError::TransferFailed { target, index, .. } => {
            assert_eq!(target, "videos/broken.mp4");
            assert_eq!(index, 1);
        }
        other => panic!("unexpected error: {other:?}"),
    }

    // Only the first window ran
    assert_eq!(transport.calls.load(Ordering::SeqCst), 3);
    assert!(coordinator.storage().list_objects("").await.unwrap().is_empty());
    assert!(coordinator.sessions().is_empty().await);
}

#[tokio::test]
async fn failed_direct_part_aborts_the_multipart_upload() {
    let memory = Arc::new(MemoryStorage::new(signer()));
    let set = StorageSet {
        primary: memory.clone(),
        mirrors: Vec::new(),
        signer: signer(),
    };
    let coordinator = coordinator(set);
    let client = Arc::new(LoopbackSignedUrlClient::new(
        coordinator.storage().clone(),
        coordinator.signer().clone(),
    ));
    let inner = DirectTransport::new(coordinator.clone(), client)
        .with_expiry(Duration::from_secs(60));
    let transport = Arc::new(InstrumentedTransport::wrapping(Arc::new(inner), Some(1)));
    let orchestrator = TransferOrchestrator::new(coordinator.clone(), transport.clone());
    assert_eq!(orchestrator.strategy(), TransferStrategy::Direct);

    let err = orchestrator
        .upload_file("videos/broken-direct.mp4", sample((12 * MIB) as usize), 5 * MIB, 3)
        .await
        .unwrap_err();

    match err {
        TransferError::TransferFailed { target, index, .. } => {
            assert_eq!(target, "videos/broken-direct.mp4");
            assert_eq!(index, 1);
        }
        other => panic!("unexpected error: {other:?}"),
    }

    assert_eq!(transport.calls.load(Ordering::SeqCst), 3);
    assert!(coordinator.storage().list_objects("").await.unwrap().is_empty());
    assert_eq!(memory.pending_uploads().await, 0);
    assert!(coordinator.sessions().is_empty().await);
}

#[tokio::test]
async fn job_progress_reaches_every_part() {
    let coordinator = coordinator(memory_set());
    let orchestrator = TransferOrchestrator::proxied(coordinator);
    let job = TransferJob::new("videos/progress.mp4", sample(2_500), 1_000, 2).unwrap();
    let progress = job.progress.clone();
    assert_eq!(progress.total_parts(), 3);
    assert_eq!(progress.fraction(), 0.0);

    orchestrator.run_upload(job).await.unwrap();

    assert_eq!(progress.completed_parts(), 3);
    assert_eq!(progress.bytes_transferred(), 2_500);
    assert_eq!(progress.fraction(), 1.0);
}

#[tokio::test]
async fn reserved_target_is_rejected_before_any_upload() {
    let memory = Arc::new(MemoryStorage::new(signer()));
    let set = StorageSet {
        primary: memory.clone(),
        mirrors: Vec::new(),
        signer: signer(),
    };
    let coordinator = coordinator(set);
    let orchestrator = direct(&coordinator);

    let err = orchestrator
        .upload_file("staging/reserved.mp4", sample(10), 5, 2)
        .await
        .unwrap_err();
    assert!(matches!(err, TransferError::InvalidArgument(_)));
    assert_eq!(memory.pending_uploads().await, 0);
    assert!(coordinator.sessions().is_empty().await);
}

#[tokio::test]
async fn finalize_requires_every_part() {
    let coordinator = coordinator(memory_set());
    let ticket = coordinator
        .initiate_session("videos/partial.mp4", 3, TransferStrategy::Proxied)
        .await
        .unwrap();

    coordinator
        .submit_part(ticket.session_id, 0, Bytes::from_static(b"aaa"))
        .await
        .unwrap();
    coordinator
        .submit_part(ticket.session_id, 2, Bytes::from_static(b"cc"))
        .await
        .unwrap();

    match coordinator.finalize(ticket.session_id).await.unwrap_err() {
        TransferError::IncompleteUpload { target, missing } => {
            assert_eq!(target, "videos/partial.mp4");
            assert_eq!(missing, vec![1]);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(!coordinator.storage().exists("videos/partial.mp4").await.unwrap());

    coordinator
        .submit_part(ticket.session_id, 1, Bytes::from_static(b"bbbb"))
        .await
        .unwrap();
    let finalized = coordinator.finalize(ticket.session_id).await.unwrap();
    assert_eq!(finalized.size, 9);
    assert_eq!(
        coordinator.fetch_object("videos/partial.mp4").await.unwrap(),
        Bytes::from_static(b"aaabbbbcc")
    );

    let err = coordinator.finalize(ticket.session_id).await.unwrap_err();
    assert!(matches!(err, TransferError::SessionNotFound(_)));
}

#[tokio::test]
async fn proxied_finalize_streams_staged_parts_on_local_disk() {
    let dir = tempfile::tempdir().unwrap();
    let coordinator = coordinator(local_set(dir.path()).await);
    let ticket = coordinator
        .initiate_session("videos/streamed.mp4", 3, TransferStrategy::Proxied)
        .await
        .unwrap();
    for (index, payload) in [(2, "cc"), (0, "aaa"), (1, "bbbb")] {
        coordinator
            .submit_part(ticket.session_id, index, Bytes::from(payload))
            .await
            .unwrap();
    }

    let finalized = coordinator.finalize(ticket.session_id).await.unwrap();
    assert_eq!(finalized.size, 9);
    assert_eq!(
        coordinator.fetch_object("videos/streamed.mp4").await.unwrap(),
        Bytes::from_static(b"aaabbbbcc")
    );

    let listed = coordinator.storage().list_objects("").await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].name, "videos/streamed.mp4");
}

#[tokio::test]
async fn failed_assembly_keeps_the_session_open() {
    let dir = tempfile::tempdir().unwrap();
    let coordinator = coordinator(local_set(dir.path()).await);
    let ticket = coordinator
        .initiate_session("videos/lost-part.mp4", 2, TransferStrategy::Proxied)
        .await
        .unwrap();
    coordinator
        .submit_part(ticket.session_id, 0, Bytes::from_static(b"first"))
        .await
        .unwrap();
    coordinator
        .submit_part(ticket.session_id, 1, Bytes::from_static(b"second"))
        .await
        .unwrap();
    coordinator
        .storage()
        .delete_object(&staging_key(ticket.session_id, 1))
        .await
        .unwrap();

    assert!(coordinator.finalize(ticket.session_id).await.is_err());
    assert!(!coordinator.storage().exists("videos/lost-part.mp4").await.unwrap());

    // Released, so abort still finds it
    coordinator.abort(ticket.session_id).await.unwrap();
    assert!(coordinator.storage().list_objects("").await.unwrap().is_empty());
}

#[tokio::test]
async fn concurrent_finalize_writes_the_object_once() {
    let coordinator = coordinator(memory_set());
    let ticket = coordinator
        .initiate_session("videos/racing.mp4", 2, TransferStrategy::Proxied)
        .await
        .unwrap();
    coordinator
        .submit_part(ticket.session_id, 0, Bytes::from_static(b"left"))
        .await
        .unwrap();
    coordinator
        .submit_part(ticket.session_id, 1, Bytes::from_static(b"right"))
        .await
        .unwrap();

    let (first, second) = tokio::join!(
        coordinator.finalize(ticket.session_id),
        coordinator.finalize(ticket.session_id)
    );

    let (won, lost) = match (first, second) {
        (Ok(won), Err(lost)) | (Err(lost), Ok(won)) => (won, lost),
        other => panic!("expected exactly one finalize to succeed: {other:?}"),
    };
    assert_eq!(won.size, 9);
    assert!(matches!(
        lost,
        TransferError::SessionConflict { .. } | TransferError::SessionNotFound(_)
    ));
    assert_eq!(
        coordinator.fetch_object("videos/racing.mp4").await.unwrap(),
        Bytes::from_static(b"leftright")
    );
    assert!(coordinator.sessions().is_empty().await);
}

/// Memory storage that reports every object one byte longer than it is.
struct OversizedStorage {
    inner: MemoryStorage,
}

#[async_trait]
impl Storage for OversizedStorage {
    async fn put_object(&self, key: &str, data: Bytes, content_type: &str) -> StorageResult<()> {
        self.inner.put_object(key, data, content_type).await
    }

    async fn get_object(&self, key: &str) -> StorageResult<Bytes> {
        self.inner.get_object(key).await
    }

    async fn get_object_range(&self, key: &str, range: Range<u64>) -> StorageResult<Bytes> {
        self.inner.get_object_range(key, range).await
    }

    async fn content_length(&self, key: &str) -> StorageResult<u64> {
        Ok(self.inner.content_length(key).await? + 1)
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        self.inner.exists(key).await
    }

    async fn delete_object(&self, key: &str) -> StorageResult<()> {
        self.inner.delete_object(key).await
    }

    async fn list_objects(&self, prefix: &str) -> StorageResult<Vec<ObjectEntry>> {
        self.inner.list_objects(prefix).await
    }

    async fn presign(
        &self,
        method: SignedMethod,
        key: &str,
        expires_in: Duration,
        extra: &[(&str, String)],
    ) -> StorageResult<String> {
        self.inner.presign(method, key, expires_in, extra).await
    }

    async fn initiate_multipart(&self, key: &str, content_type: &str) -> StorageResult<String> {
        self.inner.initiate_multipart(key, content_type).await
    }

    async fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        index: u32,
        data: Bytes,
    ) -> StorageResult<CompletedPart> {
        self.inner.upload_part(key, upload_id, index, data).await
    }

    async fn complete_multipart(
        &self,
        key: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> StorageResult<u64> {
        self.inner.complete_multipart(key, upload_id, parts).await
    }

    async fn abort_multipart(&self, key: &str, upload_id: &str) -> StorageResult<()> {
        self.inner.abort_multipart(key, upload_id).await
    }

    fn backend_type(&self) -> StorageBackend {
        self.inner.backend_type()
    }
}

#[tokio::test]
async fn size_mismatch_after_finalize_removes_the_object() {
    let signer = signer();
    let set = StorageSet {
        primary: Arc::new(OversizedStorage {
            inner: MemoryStorage::new(signer.clone()),
        }),
        mirrors: Vec::new(),
        signer,
    };
    let coordinator = coordinator(set);
    let orchestrator = TransferOrchestrator::proxied(coordinator.clone());

    let err = orchestrator
        .upload_file("videos/mis-sized.mp4", sample(300), 100, 3)
        .await
        .unwrap_err();
    assert!(matches!(err, TransferError::Internal(_)));
    assert!(!coordinator.storage().exists("videos/mis-sized.mp4").await.unwrap());
    assert!(coordinator.storage().list_objects("").await.unwrap().is_empty());
}

#[tokio::test]
async fn out_of_range_part_is_rejected() {
    let coordinator = coordinator(memory_set());
    let ticket = coordinator
        .initiate_session("videos/range.mp4", 2, TransferStrategy::Proxied)
        .await
        .unwrap();

    let err = coordinator
        .submit_part(ticket.session_id, 2, Bytes::from_static(b"x"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        TransferError::IndexOutOfRange {
            index: 2,
            expected: 2,
            ..
        }
    ));
}

#[tokio::test]
async fn second_session_for_the_same_target_conflicts() {
    let coordinator = coordinator(memory_set());
    let first = coordinator
        .initiate_session("videos/dup.mp4", 2, TransferStrategy::Proxied)
        .await
        .unwrap();
    let err = coordinator
        .initiate_session("videos/dup.mp4", 2, TransferStrategy::Direct)
        .await
        .unwrap_err();
    match err {
        TransferError::SessionConflict { existing, .. } => assert_eq!(existing, first.session_id),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn abort_removes_staged_parts() {
    let coordinator = coordinator(memory_set());
    let ticket = coordinator
        .initiate_session("videos/aborted.mp4", 2, TransferStrategy::Proxied)
        .await
        .unwrap();
    coordinator
        .submit_part(ticket.session_id, 0, Bytes::from_static(b"staged"))
        .await
        .unwrap();
    assert_eq!(coordinator.storage().list_objects("staging/").await.unwrap().len(), 1);

    coordinator.abort(ticket.session_id).await.unwrap();
    assert!(coordinator.storage().list_objects("").await.unwrap().is_empty());

    let err = coordinator.abort(ticket.session_id).await.unwrap_err();
    assert!(matches!(err, TransferError::SessionNotFound(_)));
}

#[tokio::test]
async fn expired_sessions_are_reaped_with_their_parts() {
    let coordinator = coordinator_with_ttl(memory_set(), Duration::from_millis(20));
    let ticket = coordinator
        .initiate_session("videos/stale.mp4", 2, TransferStrategy::Proxied)
        .await
        .unwrap();
    coordinator
        .submit_part(ticket.session_id, 0, Bytes::from_static(b"stale"))
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(60)).await;

    assert_eq!(coordinator.reap_expired().await, 1);
    assert!(coordinator.sessions().is_empty().await);
    assert!(coordinator.storage().list_objects("").await.unwrap().is_empty());

    // The target is free again
    coordinator
        .initiate_session("videos/stale.mp4", 1, TransferStrategy::Proxied)
        .await
        .unwrap();
}

#[tokio::test]
async fn download_of_missing_object_is_not_found() {
    let coordinator = coordinator(memory_set());
    let orchestrator = TransferOrchestrator::proxied(coordinator);
    let err = orchestrator
        .download_file("videos/nothing.mp4", 1_024, 3)
        .await
        .unwrap_err();
    assert!(matches!(err, TransferError::NotFound(_)));
}

#[tokio::test]
async fn path_helpers_move_files_through_disk() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("in.mp4");
    let destination = dir.path().join("out").join("copy.mp4");
    let file = sample(4_321);
    tokio::fs::write(&source, &file).await.unwrap();

    let coordinator = coordinator(memory_set());
    let orchestrator = direct(&coordinator);
    orchestrator
        .upload_path("videos/from-disk.mp4", &source, 1_000, 2)
        .await
        .unwrap();
    let outcome = orchestrator
        .download_to_path("videos/from-disk.mp4", &destination, 1_000, 2)
        .await
        .unwrap();
    assert_eq!(outcome.bytes_transferred, 4_321);
    assert_eq!(tokio::fs::read(&destination).await.unwrap(), file.to_vec());
}
