//! Content resolution through the host collaborator.
//!
//! # Responsibility
//! - Validate opaque content handles.
//! - Open read/write streams and query metadata via a `ContentResolver`.
//! - Translate host failures into `ResolutionError`.
//!
//! # Invariants
//! - Every opened host stream is closed on every exit path (ownership + drop).
//! - Metadata is recomputed on each query; nothing is cached.

mod accessor;
mod file;
mod handle;
mod memory;
mod resolver;

pub use accessor::{ByteSink, ByteStream, ContentAccessor, ContentMetadata};
pub use file::FileContentResolver;
pub use handle::ContentHandle;
pub use memory::MemoryContentResolver;
pub use resolver::{ContentResolver, HostReader, HostWriter, WriteMode};
