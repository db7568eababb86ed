//! Whole-content fetch and write.

use crate::arena::{NativeBufferArena, PendingBuffer};
use crate::content::{ContentAccessor, ContentHandle, ContentMetadata, WriteMode};
use crate::error::{BridgeResult, TransferError};
use crate::logging::sanitize_for_log;
use log::{error, info};
use std::io::{Read, Write};
use std::sync::Arc;
use std::time::Instant;

/// Result of a bulk fetch whose buffer is still owned by the current call.
pub struct FetchedContent {
    pub buffer: PendingBuffer,
    pub metadata: ContentMetadata,
}

/// Bulk transfer protocol over one accessor and arena.
#[derive(Clone)]
pub struct BulkTransfer {
    pub(super) accessor: ContentAccessor,
    arena: Arc<NativeBufferArena>,
    max_bulk_bytes: usize,
}

impl BulkTransfer {
    pub fn new(
        accessor: ContentAccessor,
        arena: Arc<NativeBufferArena>,
        max_bulk_bytes: usize,
    ) -> Self {
        Self {
            accessor,
            arena,
            max_bulk_bytes,
        }
    }

    /// Reads `handle` completely into a new arena buffer.
    ///
    /// The content is held twice while copying (accumulator and native
    /// buffer), so content above `max_bulk_bytes` is refused with
    /// `TransferError::TooLarge`.
    ///
    /// # Errors
    /// - `Resolution` when the handle cannot be opened or queried.
    /// - `Transfer` on read failure or oversized content.
    /// - `Allocation` when the arena cannot hold the content.
    pub fn fetch_all(&self, handle: &ContentHandle) -> BridgeResult<FetchedContent> {
        let started_at = Instant::now();
        let result = self.fetch_all_inner(handle);
        match &result {
            Ok(fetched) => info!(
                "event=bulk_fetch module=transfer status=ok length={} duration_ms={}",
                fetched.buffer.buffer().map(|b| b.length).unwrap_or_default(),
                started_at.elapsed().as_millis()
            ),
            Err(err) => error!(
                "event=bulk_fetch module=transfer status=error error_kind={} uri={} duration_ms={} error={err}",
                err.kind().as_str(),
                sanitize_for_log(handle.as_str()),
                started_at.elapsed().as_millis()
            ),
        }
        result
    }

    fn fetch_all_inner(&self, handle: &ContentHandle) -> BridgeResult<FetchedContent> {
        let accumulated = {
            let stream = self.accessor.open_read_stream(handle)?;
            read_bounded(stream, self.max_bulk_bytes)?
        };

        let buffer = PendingBuffer::new(
            Arc::clone(&self.arena),
            self.arena.allocate(accumulated.len())?,
        );
        if let Some(native) = buffer.buffer() {
            self.arena.fill(native, &accumulated)?;
        }
        drop(accumulated);

        let metadata = self.accessor.query_metadata(handle)?;
        Ok(FetchedContent { buffer, metadata })
    }

    /// Writes `bytes` to `handle` under `mode`.
    pub fn write_content(
        &self,
        handle: &ContentHandle,
        mode: WriteMode,
        bytes: &[u8],
    ) -> BridgeResult<()> {
        let mut sink = self.accessor.open_write_stream(handle, mode)?;
        sink.write_all(bytes).map_err(TransferError::Write)?;
        sink.finish().map_err(TransferError::Write)?;
        info!(
            "event=content_write module=transfer status=ok mode={} length={}",
            mode.as_host_mode(),
            bytes.len()
        );
        Ok(())
    }
}

fn read_bounded(stream: impl Read, limit: usize) -> Result<Vec<u8>, TransferError> {
    let mut accumulated = Vec::new();
    stream
        .take((limit as u64).saturating_add(1))
        .read_to_end(&mut accumulated)
        .map_err(TransferError::Read)?;
    if accumulated.len() > limit {
        return Err(TransferError::TooLarge { limit });
    }
    Ok(accumulated)
}

#[cfg(test)]
mod tests {
    use super::BulkTransfer;
    use crate::arena::NativeBufferArena;
    use crate::content::{ContentAccessor, ContentHandle, MemoryContentResolver, WriteMode};
    use crate::error::{AllocationError, BridgeError, TransferError};
    use std::sync::Arc;

    fn setup(
        max_live_bytes: Option<usize>,
        max_bulk_bytes: usize,
    ) -> (Arc<MemoryContentResolver>, Arc<NativeBufferArena>, BulkTransfer) {
        let resolver = Arc::new(MemoryContentResolver::new());
        let arena = Arc::new(NativeBufferArena::new(max_live_bytes));
        let bulk = BulkTransfer::new(
            ContentAccessor::new(resolver.clone()),
            Arc::clone(&arena),
            max_bulk_bytes,
        );
        (resolver, arena, bulk)
    }

    fn handle(raw: &str) -> ContentHandle {
        ContentHandle::parse(raw).expect("handle")
    }

    #[test]
    fn fetch_all_copies_exact_bytes_into_arena() {
        let (resolver, arena, bulk) = setup(None, 1024);
        resolver.insert_with_metadata("mem://a", b"0123456789".to_vec(), Some("text/plain"), None);

        let fetched = bulk.fetch_all(&handle("mem://a")).expect("fetch");
        assert_eq!(fetched.metadata.mime_type.as_deref(), Some("text/plain"));
        let native = fetched.buffer.hand_off().expect("buffer");
        assert_eq!(native.length, 10);
        assert_eq!(
            arena.read_buffer(native.address()).as_deref(),
            Some(&b"0123456789"[..])
        );

        arena.release(native.address()).expect("single release");
        assert_eq!(arena.stats().live_buffers, 0);
    }

    #[test]
    fn oversized_content_is_refused_without_allocation() {
        let (resolver, arena, bulk) = setup(None, 4);
        resolver.insert("mem://big", vec![7u8; 5]);

        let err = bulk.fetch_all(&handle("mem://big")).err().expect("must fail");
        assert!(matches!(
            err,
            BridgeError::Transfer(TransferError::TooLarge { limit: 4 })
        ));
        assert_eq!(arena.stats().live_buffers, 0);

        resolver.insert("mem://edge", vec![7u8; 4]);
        let fetched = bulk.fetch_all(&handle("mem://edge")).expect("limit is inclusive");
        drop(fetched);
        assert_eq!(arena.stats().live_buffers, 0);
    }

    #[test]
    fn allocation_failure_after_accumulation_leaks_nothing() {
        let (resolver, arena, bulk) = setup(Some(3), 1024);
        resolver.insert("mem://a", b"abcdef".to_vec());

        let err = bulk.fetch_all(&handle("mem://a")).err().expect("must fail");
        assert!(matches!(
            err,
            BridgeError::Allocation(AllocationError::LimitExceeded { .. })
        ));
        assert_eq!(arena.stats().live_buffers, 0);
    }

    #[test]
    fn write_content_then_fetch_round_trips() {
        let (resolver, _arena, bulk) = setup(None, 1024);
        bulk.write_content(&handle("mem://new"), WriteMode::Truncate, b"payload")
            .expect("write");
        assert_eq!(resolver.bytes("mem://new").as_deref(), Some(&b"payload"[..]));
    }
}
