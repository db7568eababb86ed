//! Scoped ownership of a buffer that has not been handed to the caller yet.

use super::native::{NativeBuffer, NativeBufferArena};
use log::{info, warn};
use std::sync::Arc;

/// Allocation produced during one call, released on drop unless handed off.
///
/// Once `hand_off` returns, the caller owns the memory and the only way back
/// is an explicit release call keyed by address.
pub struct PendingBuffer {
    arena: Arc<NativeBufferArena>,
    buffer: Option<NativeBuffer>,
}

impl PendingBuffer {
    pub(crate) fn new(arena: Arc<NativeBufferArena>, buffer: NativeBuffer) -> Self {
        Self {
            arena,
            buffer: Some(buffer),
        }
    }

    /// Descriptor of the pending allocation.
    pub fn buffer(&self) -> Option<&NativeBuffer> {
        self.buffer.as_ref()
    }

    /// Transfers ownership to the caller; the arena keeps the block live.
    pub fn hand_off(mut self) -> Option<NativeBuffer> {
        self.buffer.take()
    }

    /// Frees the allocation now instead of at drop.
    pub fn release(mut self) {
        self.reclaim();
    }

    fn reclaim(&mut self) {
        let Some(buffer) = self.buffer.take() else {
            return;
        };
        match self.arena.release_handle(buffer.handle) {
            Ok(length) => info!(
                "event=buffer_reclaim module=arena status=ok address={:#x} length={length}",
                buffer.address()
            ),
            Err(err) => warn!(
                "event=buffer_reclaim module=arena status=error address={:#x} error={err}",
                buffer.address()
            ),
        }
    }
}

impl Drop for PendingBuffer {
    fn drop(&mut self) {
        self.reclaim();
    }
}

#[cfg(test)]
mod tests {
    use super::PendingBuffer;
    use crate::arena::NativeBufferArena;
    use std::sync::Arc;

    #[test]
    fn drop_without_hand_off_frees_memory() {
        let arena = Arc::new(NativeBufferArena::default());
        let buffer = arena.allocate(16).expect("allocation");
        {
            let _pending = PendingBuffer::new(Arc::clone(&arena), buffer);
            assert_eq!(arena.stats().live_buffers, 1);
        }
        assert_eq!(arena.stats().live_buffers, 0);
    }

    #[test]
    fn hand_off_keeps_memory_live_for_caller() {
        let arena = Arc::new(NativeBufferArena::default());
        let buffer = arena.allocate(16).expect("allocation");
        let pending = PendingBuffer::new(Arc::clone(&arena), buffer);

        let owned = pending.hand_off().expect("buffer should be handed off");
        assert!(arena.is_live(owned.address()));
        arena.release(owned.address()).expect("caller release");
    }
}
