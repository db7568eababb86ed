//! Chunked push-streaming over the boundary channel.
//!
//! # Responsibility
//! - Drain a source stream through a fixed-size working buffer.
//! - Push one `data` event per chunk and wait for its acknowledgment before
//!   reading again.
//! - End every session with exactly one terminal event (`close` or `abort`).
//!
//! # Invariants
//! - At most one chunk per session is in flight.
//! - Event `k` carries `offset == sum(len(data_1..data_{k-1}))`.
//! - `close.total_size` equals the sum of all chunk lengths.
//! - Each session runs on its own worker; other calls are never blocked.

mod event;
mod protocol;
mod session;
mod sink;

pub use event::{Acknowledgement, SessionId, StreamEvent};
pub use protocol::{StreamTask, StreamingProtocol};
pub use session::{SessionOutcome, SessionState, StreamSession};
pub use sink::{event_channel, ChannelEventSink, EventSink};
