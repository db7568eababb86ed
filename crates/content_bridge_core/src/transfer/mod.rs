//! Bulk transfer paths: whole-content fetch into the native arena, direct
//! writes, and pass-through copies to local files.
//!
//! # Responsibility
//! - Materialize bounded content into one arena allocation.
//! - Keep unbounded content off this path through the bulk size ceiling.
//!
//! # Invariants
//! - A fetch either hands back a filled buffer or leaves zero live buffers.
//! - Host streams are closed before a result or error leaves this module.

mod bulk;
mod local_file;

pub use bulk::{BulkTransfer, FetchedContent};
