//! Per-session transport boundary
//!
//! Uses crossbeam-channel in both directions so the transport task never
//! blocks the tick loop and the tick loop never blocks on I/O:
//! - inputs flow from the transport into the session and are drained once per tick
//! - outbound messages are `try_send` enqueues the transport drains at its own pace

use crossbeam_channel::{bounded, Receiver, Sender, TryRecvError, TrySendError};
use smallvec::SmallVec;

use crate::net::protocol::{ClientInput, ServerMessage};
use crate::session::error::SessionError;

/// Inputs drained in one tick; a handful is typical
pub type DrainedInputs = SmallVec<[ClientInput; 8]>;

/// Session side of a client connection
#[derive(Debug)]
pub struct ClientLink {
    inputs: Receiver<ClientInput>,
    outbound: Sender<ServerMessage>,
    /// Negotiated protocol version; 0 until the handshake arrives
    protocol: u32,
    closed: bool,
}

/// Transport side of a client connection.
///
/// Dropping the handle is how the transport reports the connection closed.
#[derive(Debug)]
pub struct ClientHandle {
    inputs: Sender<ClientInput>,
    outbound: Receiver<ServerMessage>,
}

/// Create a connected link/handle pair with the given queue capacities
pub fn pair(input_capacity: usize, outbound_capacity: usize) -> (ClientLink, ClientHandle) {
    let (input_tx, input_rx) = bounded(input_capacity);
    let (out_tx, out_rx) = bounded(outbound_capacity);
    (
        ClientLink {
            inputs: input_rx,
            outbound: out_tx,
            protocol: 0,
            closed: false,
        },
        ClientHandle {
            inputs: input_tx,
            outbound: out_rx,
        },
    )
}

impl ClientLink {
    /// Drain every input queued since the last tick.
    ///
    /// Notices a dropped transport handle and flags the link closed.
    pub fn drain(&mut self) -> DrainedInputs {
        let mut drained = DrainedInputs::new();
        loop {
            match self.inputs.try_recv() {
                Ok(input) => drained.push(input),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.closed = true;
                    break;
                }
            }
        }
        drained
    }

    /// Enqueue a message without blocking
    pub fn send(&mut self, message: ServerMessage) -> Result<(), LinkError> {
        self.outbound.try_send(message).map_err(|e| match e {
            TrySendError::Full(_) => LinkError::Full,
            TrySendError::Disconnected(_) => {
                self.closed = true;
                LinkError::Closed
            }
        })
    }

    #[inline]
    pub fn protocol(&self) -> u32 {
        self.protocol
    }

    pub fn set_protocol(&mut self, protocol: u32) {
        self.protocol = protocol;
    }

    /// Whether the handshake has completed
    pub fn ensure_ready(&self) -> Result<(), SessionError> {
        if self.protocol == 0 {
            Err(SessionError::TransportNotReady)
        } else {
            Ok(())
        }
    }

    /// Whether the transport side has gone away
    #[inline]
    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl ClientHandle {
    /// Submit an input (non-blocking)
    pub fn push(&self, input: ClientInput) -> Result<(), LinkError> {
        self.inputs.try_send(input).map_err(|e| match e {
            TrySendError::Full(_) => LinkError::Full,
            TrySendError::Disconnected(_) => LinkError::Closed,
        })
    }

    /// Next pending outbound message, if any
    pub fn try_recv(&self) -> Option<ServerMessage> {
        self.outbound.try_recv().ok()
    }

    /// All pending outbound messages
    pub fn drain(&self) -> Vec<ServerMessage> {
        self.outbound.try_iter().collect()
    }

    /// Pending outbound messages, or `Closed` once the session side is
    /// gone and nothing is left to deliver
    pub fn recv_pending(&self) -> Result<Vec<ServerMessage>, LinkError> {
        let mut pending = Vec::new();
        loop {
            match self.outbound.try_recv() {
                Ok(message) => pending.push(message),
                Err(TryRecvError::Empty) => return Ok(pending),
                Err(TryRecvError::Disconnected) if pending.is_empty() => return Err(LinkError::Closed),
                Err(TryRecvError::Disconnected) => return Ok(pending),
            }
        }
    }

    /// Number of outbound messages waiting
    #[inline]
    pub fn pending(&self) -> usize {
        self.outbound.len()
    }
}

/// Link errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum LinkError {
    /// Queue is full (backpressure)
    #[error("queue full")]
    Full,
    /// The other side is gone
    #[error("link closed")]
    Closed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drain_returns_inputs_in_order() {
        let (mut link, handle) = pair(8, 8);
        handle.push(ClientInput::Split).unwrap();
        handle.push(ClientInput::Eject).unwrap();

        let drained = link.drain();
        assert_eq!(drained.as_slice(), &[ClientInput::Split, ClientInput::Eject]);
        assert!(link.drain().is_empty());
        assert!(!link.is_closed());
    }

    #[test]
    fn test_dropped_handle_closes_link() {
        let (mut link, handle) = pair(8, 8);
        handle.push(ClientInput::Split).unwrap();
        drop(handle);

        // Queued inputs still arrive, then the closure is noticed
        let drained = link.drain();
        assert_eq!(drained.len(), 1);
        assert!(link.is_closed());
    }

    #[test]
    fn test_outbound_backpressure() {
        let (mut link, handle) = pair(8, 1);
        assert!(link.send(ServerMessage::ClearNodes).is_ok());
        assert_eq!(link.send(ServerMessage::ClearNodes), Err(LinkError::Full));
        assert_eq!(handle.pending(), 1);
        assert_eq!(handle.drain(), vec![ServerMessage::ClearNodes]);
    }

    #[test]
    fn test_send_after_close() {
        let (mut link, handle) = pair(8, 8);
        drop(handle);
        assert_eq!(link.send(ServerMessage::ClearNodes), Err(LinkError::Closed));
        assert!(link.is_closed());
    }

    #[test]
    fn test_recv_pending_reports_closure_after_drain() {
        let (mut link, handle) = pair(8, 8);
        link.send(ServerMessage::ClearNodes).unwrap();
        drop(link);

        assert_eq!(handle.recv_pending(), Ok(vec![ServerMessage::ClearNodes]));
        assert_eq!(handle.recv_pending(), Err(LinkError::Closed));
    }

    #[test]
    fn test_input_backpressure() {
        let (_link, handle) = pair(1, 8);
        assert!(handle.push(ClientInput::Split).is_ok());
        assert_eq!(handle.push(ClientInput::Split), Err(LinkError::Full));
    }

    #[test]
    fn test_readiness() {
        let (mut link, _handle) = pair(8, 8);
        assert_eq!(link.ensure_ready(), Err(SessionError::TransportNotReady));
        link.set_protocol(6);
        assert!(link.ensure_ready().is_ok());
        assert_eq!(link.protocol(), 6);
    }
}
