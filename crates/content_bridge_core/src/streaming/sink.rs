//! Push side of the boundary channel.

use super::event::StreamEvent;
use crate::error::ProtocolError;
use crossbeam_channel::{unbounded, Receiver, Sender};

/// Host-to-caller push invocation.
///
/// `push` only delivers the event; acknowledgments travel back separately
/// through `StreamingProtocol::acknowledge`.
pub trait EventSink: Send + Sync {
    fn push(&self, event: StreamEvent) -> Result<(), ProtocolError>;
}

/// Sink that forwards events into an in-process channel.
#[derive(Debug, Clone)]
pub struct ChannelEventSink {
    sender: Sender<StreamEvent>,
}

impl EventSink for ChannelEventSink {
    fn push(&self, event: StreamEvent) -> Result<(), ProtocolError> {
        self.sender
            .send(event)
            .map_err(|_| ProtocolError::ChannelClosed)
    }
}

/// Creates a channel sink plus the receiver the caller side drains.
///
/// Unbounded is safe here: each session holds at most one unacknowledged data
/// event plus its terminal event.
pub fn event_channel() -> (ChannelEventSink, Receiver<StreamEvent>) {
    let (sender, receiver) = unbounded();
    (ChannelEventSink { sender }, receiver)
}
