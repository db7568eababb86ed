//! Session registry: id allocation, worker spawn and acknowledgment routing.

use super::event::{Acknowledgement, SessionId};
use super::session::{SessionOutcome, StreamSession};
use super::sink::EventSink;
use crate::error::{BridgeError, BridgeResult, ProtocolError};
use crossbeam_channel::{bounded, Sender, TrySendError};
use log::{info, warn};
use std::collections::HashMap;
use std::io::Read;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

type AckRoutes = Arc<Mutex<HashMap<SessionId, Sender<Acknowledgement>>>>;

/// Handle to one running session worker.
pub struct StreamTask {
    id: SessionId,
    worker: JoinHandle<SessionOutcome>,
}

impl StreamTask {
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Blocks until the session reaches a terminal state.
    pub fn wait(self) -> Result<SessionOutcome, ProtocolError> {
        self.worker
            .join()
            .map_err(|_| ProtocolError::WorkerPanicked(self.id))
    }
}

/// Chunked streaming protocol over one event sink.
pub struct StreamingProtocol {
    sink: Arc<dyn EventSink>,
    routes: AckRoutes,
    next_id: AtomicU64,
    ack_timeout: Duration,
    max_buffer_size: usize,
}

impl StreamingProtocol {
    pub fn new(sink: Arc<dyn EventSink>, ack_timeout: Duration, max_buffer_size: usize) -> Self {
        Self {
            sink,
            routes: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(1),
            ack_timeout,
            max_buffer_size,
        }
    }

    /// Starts draining `source` on a dedicated worker.
    ///
    /// Without `requested_id` a fresh id is generated; a requested id that
    /// belongs to a live session is rejected.
    ///
    /// # Errors
    /// - `InvalidArgument` when `buffer_size` is 0 or above the configured max.
    /// - `Protocol(SessionIdInUse)` on a live id collision.
    /// - `Protocol(Spawn)` when the worker thread cannot start.
    pub fn start<R>(
        &self,
        requested_id: Option<SessionId>,
        source: R,
        buffer_size: usize,
    ) -> BridgeResult<StreamTask>
    where
        R: Read + Send + 'static,
    {
        if buffer_size == 0 || buffer_size > self.max_buffer_size {
            return Err(BridgeError::InvalidArgument(format!(
                "bufferSize must be within 1..={}, got {buffer_size}",
                self.max_buffer_size
            )));
        }

        let (ack_sender, ack_receiver) = bounded(1);
        let id = {
            let mut routes = lock_routes(&self.routes);
            let id = match requested_id {
                Some(id) if routes.contains_key(&id) => {
                    return Err(ProtocolError::SessionIdInUse(id).into());
                }
                Some(id) => id,
                None => self.generate_id(&routes),
            };
            routes.insert(id, ack_sender);
            id
        };

        let session = StreamSession::new(id, source, buffer_size, ack_receiver, self.ack_timeout);
        let sink = Arc::clone(&self.sink);
        let routes = Arc::clone(&self.routes);
        let spawned = thread::Builder::new()
            .name(format!("content-stream-{id}"))
            .spawn(move || {
                let outcome = session.run(sink.as_ref());
                lock_routes(&routes).remove(&id);
                outcome
            });

        match spawned {
            Ok(worker) => {
                info!(
                    "event=stream_start module=streaming status=ok session_id={id} buffer_size={buffer_size}"
                );
                Ok(StreamTask { id, worker })
            }
            Err(err) => {
                lock_routes(&self.routes).remove(&id);
                warn!(
                    "event=stream_start module=streaming status=error session_id={id} error={err}"
                );
                Err(ProtocolError::Spawn(err).into())
            }
        }
    }

    /// Routes the caller's acknowledgment of the chunk at `offset`.
    ///
    /// # Errors
    /// - `SessionNotFound` when the session is unknown or already terminal.
    /// - `AckBacklog` when an acknowledgment is already queued.
    pub fn acknowledge(&self, id: SessionId, offset: u64) -> Result<(), ProtocolError> {
        let sender = lock_routes(&self.routes)
            .get(&id)
            .cloned()
            .ok_or(ProtocolError::SessionNotFound(id))?;
        match sender.try_send(Acknowledgement { offset }) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(ProtocolError::AckBacklog { session_id: id }),
            Err(TrySendError::Disconnected(_)) => Err(ProtocolError::SessionNotFound(id)),
        }
    }

    /// Sorted ids of sessions that have not reached a terminal state.
    pub fn active_sessions(&self) -> Vec<SessionId> {
        let mut ids: Vec<SessionId> = lock_routes(&self.routes).keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    fn generate_id(&self, routes: &HashMap<SessionId, Sender<Acknowledgement>>) -> SessionId {
        loop {
            let candidate = self.next_id.fetch_add(1, Ordering::Relaxed);
            if !routes.contains_key(&candidate) {
                return candidate;
            }
        }
    }
}

fn lock_routes(
    routes: &Mutex<HashMap<SessionId, Sender<Acknowledgement>>>,
) -> MutexGuard<'_, HashMap<SessionId, Sender<Acknowledgement>>> {
    routes.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::StreamingProtocol;
    use crate::error::{BridgeError, ProtocolError};
    use crate::streaming::{event_channel, SessionOutcome, StreamEvent};
    use std::io::Cursor;
    use std::sync::Arc;
    use std::time::Duration;

    fn protocol() -> (StreamingProtocol, crossbeam_channel::Receiver<StreamEvent>) {
        let (sink, events) = event_channel();
        (
            StreamingProtocol::new(Arc::new(sink), Duration::from_secs(5), 1024),
            events,
        )
    }

    #[test]
    fn ten_bytes_with_four_byte_buffer_yields_three_acked_chunks() {
        let (protocol, events) = protocol();
        let task = protocol
            .start(None, Cursor::new(b"0123456789".to_vec()), 4)
            .expect("start");
        let id = task.id();

        let mut seen = Vec::new();
        loop {
            match events.recv().expect("event") {
                StreamEvent::Data { id: event_id, offset, data } => {
                    assert_eq!(event_id, id);
                    // Gate: nothing else may arrive before this chunk is acknowledged.
                    assert!(events.recv_timeout(Duration::from_millis(30)).is_err());
                    seen.push((offset, data.len()));
                    protocol.acknowledge(id, offset).expect("ack");
                }
                StreamEvent::Close { id: event_id, total_size } => {
                    assert_eq!(event_id, id);
                    assert_eq!(total_size, 10);
                    break;
                }
                StreamEvent::Abort { cause, .. } => panic!("unexpected abort: {cause}"),
            }
        }
        assert_eq!(seen, vec![(0, 4), (4, 4), (8, 2)]);
        assert!(matches!(
            task.wait().expect("worker"),
            SessionOutcome::Closed { total_size: 10, chunks: 3 }
        ));
        assert!(protocol.active_sessions().is_empty());
    }

    #[test]
    fn empty_source_emits_only_close() {
        let (protocol, events) = protocol();
        let task = protocol
            .start(None, Cursor::new(Vec::new()), 64)
            .expect("start");
        let id = task.id();
        task.wait().expect("worker");

        let received: Vec<StreamEvent> = events.try_iter().collect();
        assert_eq!(received, vec![StreamEvent::Close { id, total_size: 0 }]);
    }

    #[test]
    fn generated_ids_are_unique_and_requested_collisions_rejected() {
        let (protocol, _events) = protocol();
        let first = protocol
            .start(None, Cursor::new(vec![1u8; 8]), 4)
            .expect("start first");
        let second = protocol
            .start(None, Cursor::new(vec![1u8; 8]), 4)
            .expect("start second");
        assert_ne!(first.id(), second.id());

        let err = protocol
            .start(Some(first.id()), Cursor::new(vec![1u8]), 4)
            .err()
            .expect("live id must be rejected");
        assert!(matches!(
            err,
            BridgeError::Protocol(ProtocolError::SessionIdInUse(_))
        ));
        assert_eq!(protocol.active_sessions(), {
            let mut ids = vec![first.id(), second.id()];
            ids.sort_unstable();
            ids
        });
    }

    #[test]
    fn rejects_zero_and_oversized_buffer_sizes() {
        let (protocol, events) = protocol();
        for size in [0usize, 4096] {
            let err = protocol
                .start(None, Cursor::new(vec![1u8]), size)
                .err()
                .expect("invalid size must be rejected");
            assert!(matches!(err, BridgeError::InvalidArgument(_)));
        }
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn acknowledging_unknown_session_fails() {
        let (protocol, _events) = protocol();
        let err = protocol
            .acknowledge(404, 0)
            .expect_err("unknown session must fail");
        assert!(matches!(err, ProtocolError::SessionNotFound(404)));
    }
}
