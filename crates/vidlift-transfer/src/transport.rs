//! How one part's bytes travel between client and backend.

use std::ops::Range;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use vidlift_core::models::{PartReceipt, SessionTicket, TransferStrategy};
use vidlift_core::{TransferError, TransferResult};

use crate::coordinator::Coordinator;
use crate::signed_client::SignedUrlClient;

/// Moves single parts. A failing part never touches the bytes of another part.
#[async_trait]
pub trait PartTransport: Send + Sync {
    /// Deliver one part of an open upload session.
    async fn upload_part(
        &self,
        destination: &SessionTicket,
        index: u32,
        payload: Bytes,
    ) -> TransferResult<PartReceipt>;

    /// Read exactly `range` of `source`; `index` identifies the part for diagnostics.
    async fn download_part(&self, source: &str, index: u32, range: Range<u64>)
        -> TransferResult<Bytes>;

    fn strategy(&self) -> TransferStrategy;
}

fn check_length(source: &str, index: u32, range: &Range<u64>, data: &Bytes) -> TransferResult<()> {
    let expected = range.end - range.start;
    if data.len() as u64 != expected {
        return Err(TransferError::Storage(format!(
            "Part {} of {} returned {} bytes, expected {}",
            index,
            source,
            data.len(),
            expected
        )));
    }
    Ok(())
}

/// Every byte passes through the coordinator.
#[derive(Clone)]
pub struct ProxiedTransport {
    coordinator: Coordinator,
}

impl ProxiedTransport {
    pub fn new(coordinator: Coordinator) -> Self {
        ProxiedTransport { coordinator }
    }
}

#[async_trait]
impl PartTransport for ProxiedTransport {
    async fn upload_part(
        &self,
        destination: &SessionTicket,
        index: u32,
        payload: Bytes,
    ) -> TransferResult<PartReceipt> {
        self.coordinator
            .submit_part(destination.session_id, index, payload)
            .await
    }

    async fn download_part(
        &self,
        source: &str,
        index: u32,
        range: Range<u64>,
    ) -> TransferResult<Bytes> {
        let data = self.coordinator.fetch_part(source, range.clone()).await?;
        check_length(source, index, &range, &data)?;
        Ok(data)
    }

    fn strategy(&self) -> TransferStrategy {
        TransferStrategy::Proxied
    }
}

/// Bytes move through signed URLs; the coordinator only signs and records tokens.
#[derive(Clone)]
pub struct DirectTransport {
    coordinator: Coordinator,
    client: Arc<dyn SignedUrlClient>,
    expiry: Option<Duration>,
}

impl DirectTransport {
    pub fn new(coordinator: Coordinator, client: Arc<dyn SignedUrlClient>) -> Self {
        DirectTransport {
            coordinator,
            client,
            expiry: None,
        }
    }

    /// Lifetime of the signed URLs this transport requests.
    pub fn with_expiry(mut self, expiry: Duration) -> Self {
        self.expiry = Some(expiry);
        self
    }
}

#[async_trait]
impl PartTransport for DirectTransport {
    async fn upload_part(
        &self,
        destination: &SessionTicket,
        index: u32,
        payload: Bytes,
    ) -> TransferResult<PartReceipt> {
        let part_url = self
            .coordinator
            .signed_part_url(destination.session_id, index, self.expiry)
            .await?;
        let etag = self.client.put(&part_url.url, payload).await?;
        self.coordinator
            .acknowledge_part(destination.session_id, index, etag)
            .await
    }

    async fn download_part(
        &self,
        source: &str,
        index: u32,
        range: Range<u64>,
    ) -> TransferResult<Bytes> {
        if range.is_empty() {
            return Ok(Bytes::new());
        }
        let url = self
            .coordinator
            .signed_download_url(source, self.expiry)
            .await?;
        let data = self.client.get_range(&url, range.clone()).await?;
        check_length(source, index, &range, &data)?;
        Ok(data)
    }

    fn strategy(&self) -> TransferStrategy {
        TransferStrategy::Direct
    }
}
