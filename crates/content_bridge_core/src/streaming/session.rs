//! Per-session read/push/acknowledge state machine.

use super::event::{Acknowledgement, SessionId, StreamEvent};
use super::sink::EventSink;
use crate::error::{BridgeError, ProtocolError, TransferError};
use crossbeam_channel::{Receiver, RecvTimeoutError};
use log::{debug, info, warn};
use std::io::{self, Read};
use std::time::Duration;

/// Session lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Reading,
    DrainingChunk { length: usize },
    Closed,
    Aborted,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Closed | Self::Aborted)
    }
}

/// How a session ended.
#[derive(Debug)]
pub enum SessionOutcome {
    Closed { total_size: u64, chunks: u64 },
    Aborted { offset: u64, cause: BridgeError },
}

/// One chunked transfer of a single source stream.
pub struct StreamSession<R: Read> {
    id: SessionId,
    source: Option<R>,
    working_buffer: Vec<u8>,
    bytes_read_so_far: u64,
    chunks_emitted: u64,
    state: SessionState,
    acks: Receiver<Acknowledgement>,
    ack_timeout: Duration,
}

impl<R: Read> StreamSession<R> {
    /// Creates a session with a working buffer of `buffer_size` bytes.
    ///
    /// `buffer_size` must be at least 1; the protocol layer validates it.
    pub fn new(
        id: SessionId,
        source: R,
        buffer_size: usize,
        acks: Receiver<Acknowledgement>,
        ack_timeout: Duration,
    ) -> Self {
        Self {
            id,
            source: Some(source),
            working_buffer: vec![0u8; buffer_size.max(1)],
            bytes_read_so_far: 0,
            chunks_emitted: 0,
            state: SessionState::Reading,
            acks,
            ack_timeout,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn bytes_read_so_far(&self) -> u64 {
        self.bytes_read_so_far
    }

    /// Drives the session to a terminal state, pushing events into `sink`.
    pub fn run(mut self, sink: &dyn EventSink) -> SessionOutcome {
        while !self.state.is_terminal() {
            match self.advance(sink) {
                Ok(next) => self.state = next,
                Err(cause) => return self.abort(sink, cause),
            }
        }
        self.close(sink)
    }

    /// Performs one transition; terminal states map to themselves.
    fn advance(&mut self, sink: &dyn EventSink) -> Result<SessionState, BridgeError> {
        match self.state {
            SessionState::Reading => {
                let length = self.fill_working_buffer().map_err(TransferError::Read)?;
                if length == 0 {
                    Ok(SessionState::Closed)
                } else {
                    Ok(SessionState::DrainingChunk { length })
                }
            }
            SessionState::DrainingChunk { length } => {
                self.drain_chunk(sink, length)?;
                Ok(SessionState::Reading)
            }
            terminal @ (SessionState::Closed | SessionState::Aborted) => Ok(terminal),
        }
    }

    /// Reads until the working buffer is full or the source is exhausted.
    fn fill_working_buffer(&mut self) -> io::Result<usize> {
        let Some(source) = self.source.as_mut() else {
            return Ok(0);
        };
        let mut filled = 0;
        while filled < self.working_buffer.len() {
            match source.read(&mut self.working_buffer[filled..]) {
                Ok(0) => break,
                Ok(read) => filled += read,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(err),
            }
        }
        Ok(filled)
    }

    fn drain_chunk(&mut self, sink: &dyn EventSink, length: usize) -> Result<(), ProtocolError> {
        let offset = self.bytes_read_so_far;
        sink.push(StreamEvent::Data {
            id: self.id,
            offset,
            data: self.working_buffer[..length].to_vec(),
        })?;

        let ack = match self.acks.recv_timeout(self.ack_timeout) {
            Ok(ack) => ack,
            Err(RecvTimeoutError::Timeout) => {
                return Err(ProtocolError::AckTimeout {
                    offset,
                    timeout_ms: self.ack_timeout.as_millis(),
                });
            }
            Err(RecvTimeoutError::Disconnected) => return Err(ProtocolError::ChannelClosed),
        };
        if ack.offset != offset {
            return Err(ProtocolError::UnexpectedAck {
                expected: offset,
                received: ack.offset,
            });
        }

        self.bytes_read_so_far += length as u64;
        self.chunks_emitted += 1;
        debug!(
            "event=stream_chunk module=streaming status=ok session_id={} offset={offset} length={length}",
            self.id
        );
        Ok(())
    }

    fn close(mut self, sink: &dyn EventSink) -> SessionOutcome {
        self.source.take();
        let total_size = self.bytes_read_so_far;
        if let Err(err) = sink.push(StreamEvent::Close {
            id: self.id,
            total_size,
        }) {
            warn!(
                "event=stream_close module=streaming status=error session_id={} error={err}",
                self.id
            );
            self.state = SessionState::Aborted;
            return SessionOutcome::Aborted {
                offset: total_size,
                cause: err.into(),
            };
        }
        info!(
            "event=stream_close module=streaming status=ok session_id={} total_size={total_size} chunks={}",
            self.id, self.chunks_emitted
        );
        SessionOutcome::Closed {
            total_size,
            chunks: self.chunks_emitted,
        }
    }

    fn abort(mut self, sink: &dyn EventSink, cause: BridgeError) -> SessionOutcome {
        self.state = SessionState::Aborted;
        self.source.take();
        let offset = self.bytes_read_so_far;
        warn!(
            "event=stream_abort module=streaming status=error session_id={} offset={offset} error_kind={} error={cause}",
            self.id,
            cause.kind().as_str()
        );
        if let Err(err) = sink.push(StreamEvent::Abort {
            id: self.id,
            offset,
            cause: cause.to_string(),
        }) {
            warn!(
                "event=stream_abort module=streaming status=undelivered session_id={} error={err}",
                self.id
            );
        }
        SessionOutcome::Aborted { offset, cause }
    }
}
