//! Generation-tagged native buffer table.

use crate::error::AllocationError;
use log::{debug, warn};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

pub type AllocationResult<T> = Result<T, AllocationError>;

/// Cross-boundary token for one allocation.
///
/// `address` is the raw memory address the caller reads from; `generation`
/// disambiguates reuse of the same address after release.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct BufferHandle {
    pub address: u64,
    pub generation: u64,
}

/// Descriptor of one live allocation handed out by the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct NativeBuffer {
    pub handle: BufferHandle,
    pub length: usize,
}

impl NativeBuffer {
    pub fn address(&self) -> u64 {
        self.handle.address
    }

    pub fn generation(&self) -> u64 {
        self.handle.generation
    }
}

/// Point-in-time arena occupancy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ArenaStats {
    pub live_buffers: usize,
    pub live_bytes: usize,
}

struct Allocation {
    generation: u64,
    length: usize,
    // Backing block never moves while owned by the table, so its address is
    // stable for the lifetime of the allocation. Zero-length requests still
    // reserve one byte to keep addresses unique.
    memory: Box<[u8]>,
}

/// Arena of native blocks keyed by address.
///
/// The table lock only guards bookkeeping; each block is single-owner by
/// contract and never touched concurrently by the arena and the caller.
pub struct NativeBufferArena {
    allocations: Mutex<HashMap<u64, Allocation>>,
    next_generation: AtomicU64,
    max_live_bytes: Option<usize>,
}

impl Default for NativeBufferArena {
    fn default() -> Self {
        Self::new(None)
    }
}

impl NativeBufferArena {
    pub fn new(max_live_bytes: Option<usize>) -> Self {
        Self {
            allocations: Mutex::new(HashMap::new()),
            next_generation: AtomicU64::new(1),
            max_live_bytes,
        }
    }

    /// Allocates exactly `size` zeroed bytes.
    ///
    /// # Errors
    /// - `LimitExceeded` when the arena ceiling would be crossed.
    /// - `OutOfMemory` when the system allocator cannot satisfy the request.
    pub fn allocate(&self, size: usize) -> AllocationResult<NativeBuffer> {
        let mut allocations = self.lock();

        if let Some(limit) = self.max_live_bytes {
            let live_bytes = live_bytes(&allocations);
            if live_bytes.saturating_add(size) > limit {
                return Err(AllocationError::LimitExceeded {
                    requested: size,
                    live_bytes,
                    limit,
                });
            }
        }

        let backing_len = size.max(1);
        let mut memory = Vec::new();
        memory
            .try_reserve_exact(backing_len)
            .map_err(|_| AllocationError::OutOfMemory { requested: size })?;
        memory.resize(backing_len, 0u8);
        let memory = memory.into_boxed_slice();

        let address = memory.as_ptr() as u64;
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        allocations.insert(
            address,
            Allocation {
                generation,
                length: size,
                memory,
            },
        );
        debug!(
            "event=buffer_alloc module=arena status=ok address={address:#x} generation={generation} length={size}"
        );

        Ok(NativeBuffer {
            handle: BufferHandle {
                address,
                generation,
            },
            length: size,
        })
    }

    /// Copies `bytes` into a live buffer of exactly the same length.
    pub fn fill(&self, buffer: &NativeBuffer, bytes: &[u8]) -> AllocationResult<()> {
        self.with_buffer_mut(buffer.handle, |view| {
            if view.len() != bytes.len() {
                return Err(AllocationError::SizeMismatch {
                    address: buffer.address(),
                    expected: view.len(),
                    actual: bytes.len(),
                });
            }
            view.copy_from_slice(bytes);
            Ok(())
        })?
    }

    /// Runs `f` over the writable view of a live buffer.
    pub fn with_buffer_mut<T>(
        &self,
        handle: BufferHandle,
        f: impl FnOnce(&mut [u8]) -> T,
    ) -> AllocationResult<T> {
        let mut allocations = self.lock();
        let allocation = checked_entry(&mut allocations, handle)?;
        let length = allocation.length;
        Ok(f(&mut allocation.memory[..length]))
    }

    /// Returns a copy of the bytes held at a live address.
    pub fn read_buffer(&self, address: u64) -> Option<Vec<u8>> {
        let allocations = self.lock();
        allocations
            .get(&address)
            .map(|allocation| allocation.memory[..allocation.length].to_vec())
    }

    /// Returns whether `address` currently names a live allocation.
    pub fn is_live(&self, address: u64) -> bool {
        self.lock().contains_key(&address)
    }

    /// Frees the allocation at `address` and returns its length.
    ///
    /// # Errors
    /// - `NotLive` when the address was never allocated or already released.
    pub fn release(&self, address: u64) -> AllocationResult<usize> {
        let mut allocations = self.lock();
        match allocations.remove(&address) {
            Some(allocation) => {
                debug!(
                    "event=buffer_release module=arena status=ok address={address:#x} generation={} length={}",
                    allocation.generation, allocation.length
                );
                Ok(allocation.length)
            }
            None => {
                warn!(
                    "event=buffer_release module=arena status=error address={address:#x} error_code=not_live"
                );
                Err(AllocationError::NotLive { address })
            }
        }
    }

    /// Frees the allocation named by `handle`, checking its generation.
    ///
    /// # Errors
    /// - `NotLive` when nothing is allocated at the address.
    /// - `StaleHandle` when the address was reused by a newer allocation.
    pub fn release_handle(&self, handle: BufferHandle) -> AllocationResult<usize> {
        let mut allocations = self.lock();
        checked_entry(&mut allocations, handle)?;
        let length = allocations
            .remove(&handle.address)
            .map(|allocation| allocation.length)
            .unwrap_or_default();
        debug!(
            "event=buffer_release module=arena status=ok address={:#x} generation={} length={length}",
            handle.address, handle.generation
        );
        Ok(length)
    }

    pub fn stats(&self) -> ArenaStats {
        let allocations = self.lock();
        ArenaStats {
            live_buffers: allocations.len(),
            live_bytes: live_bytes(&allocations),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<u64, Allocation>> {
        self.allocations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

fn checked_entry(
    allocations: &mut HashMap<u64, Allocation>,
    handle: BufferHandle,
) -> AllocationResult<&mut Allocation> {
    let allocation =
        allocations
            .get_mut(&handle.address)
            .ok_or(AllocationError::NotLive {
                address: handle.address,
            })?;
    if allocation.generation != handle.generation {
        return Err(AllocationError::StaleHandle {
            address: handle.address,
            generation: handle.generation,
            live_generation: allocation.generation,
        });
    }
    Ok(allocation)
}

fn live_bytes(allocations: &HashMap<u64, Allocation>) -> usize {
    allocations.values().map(|allocation| allocation.length).sum()
}
