//! Native buffer arena for out-of-band bulk handoff.
//!
//! # Responsibility
//! - Allocate memory blocks whose address crosses the boundary instead of the
//!   bytes themselves.
//! - Track liveness so release of a dead or stale handle is an error, not
//!   undefined behavior.
//!
//! # Invariants
//! - A live address maps to exactly one allocation and one generation.
//! - Released memory is never reachable through the arena again.

mod native;
mod pending;

pub use native::{ArenaStats, BufferHandle, NativeBuffer, NativeBufferArena};
pub use pending::PendingBuffer;
