//! Peer transport link.
//!
//! A [`PeerLink`] is the bridge's view of the browser connection: a duplex
//! of compressed frames plus an observable [`PeerState`]. The other end,
//! [`RemotePeer`], is driven by whatever carries the frames (the browser
//! WebSocket handler in the server, or a test directly).
//!
//! # State Machine
//!
//! ```text
//! Idle --activate--> Active --close--> Closed
//!   \______________________close______^
//! ```

use std::fmt;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{mpsc, watch};

use crate::core::audio::{AudioFormat, AudioFrame};

/// Connection state of a peer link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PeerState {
    /// Created, not yet bridged
    #[default]
    Idle,
    /// Audio is flowing
    Active,
    /// Torn down; terminal
    Closed,
}

impl fmt::Display for PeerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PeerState::Idle => write!(f, "Idle"),
            PeerState::Active => write!(f, "Active"),
            PeerState::Closed => write!(f, "Closed"),
        }
    }
}

/// Errors raised by the remote end of a peer link.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PeerError {
    #[error("Peer link closed")]
    Closed,
}

/// Create a connected link/remote pair for a peer speaking `format`.
pub fn peer_link(format: AudioFormat, capacity: usize) -> (PeerLink, RemotePeer) {
    let (to_bridge_tx, to_bridge_rx) = mpsc::channel(capacity);
    let (from_bridge_tx, from_bridge_rx) = mpsc::channel(capacity);
    let (state_tx, state_rx) = watch::channel(PeerState::Idle);

    let link = PeerLink {
        format,
        inbound: to_bridge_rx,
        outbound: from_bridge_tx,
        state: PeerStateHandle(Arc::new(state_tx)),
    };
    let remote = RemotePeer {
        format,
        to_bridge: to_bridge_tx,
        from_bridge: from_bridge_rx,
        state: state_rx,
    };
    (link, remote)
}

// =============================================================================
// Bridge Side
// =============================================================================

/// Bridge-side end of a peer connection.
pub struct PeerLink {
    format: AudioFormat,
    inbound: mpsc::Receiver<AudioFrame>,
    outbound: mpsc::Sender<AudioFrame>,
    state: PeerStateHandle,
}

impl PeerLink {
    /// Declared peer audio format.
    pub fn format(&self) -> AudioFormat {
        self.format
    }

    pub fn state(&self) -> PeerState {
        self.state.get()
    }

    /// Whether the remote end has gone away.
    pub fn is_remote_closed(&self) -> bool {
        self.outbound.is_closed()
    }

    /// Split into frames-from-peer, frames-to-peer and the state handle.
    pub fn into_parts(
        self,
    ) -> (
        mpsc::Receiver<AudioFrame>,
        mpsc::Sender<AudioFrame>,
        PeerStateHandle,
    ) {
        (self.inbound, self.outbound, self.state)
    }
}

/// Writer for the peer state. Enforces the state machine.
#[derive(Debug, Clone)]
pub struct PeerStateHandle(Arc<watch::Sender<PeerState>>);

impl PeerStateHandle {
    pub fn get(&self) -> PeerState {
        *self.0.borrow()
    }

    /// Idle → Active. Returns `false` if the link was not idle.
    pub fn activate(&self) -> bool {
        self.0.send_if_modified(|state| {
            if *state == PeerState::Idle {
                *state = PeerState::Active;
                true
            } else {
                false
            }
        })
    }

    /// Move to the terminal state.
    pub fn close(&self) {
        self.0.send_if_modified(|state| {
            if *state == PeerState::Closed {
                false
            } else {
                *state = PeerState::Closed;
                true
            }
        });
    }
}

// =============================================================================
// Remote Side
// =============================================================================

/// Remote end of a peer connection: pushes peer frames in, pulls bridged
/// frames out. Dropping it closes the link.
pub struct RemotePeer {
    format: AudioFormat,
    to_bridge: mpsc::Sender<AudioFrame>,
    from_bridge: mpsc::Receiver<AudioFrame>,
    state: watch::Receiver<PeerState>,
}

impl RemotePeer {
    pub fn format(&self) -> AudioFormat {
        self.format
    }

    /// Deliver a frame captured from the peer.
    pub async fn send(&self, frame: AudioFrame) -> Result<(), PeerError> {
        self.to_bridge.send(frame).await.map_err(|_| PeerError::Closed)
    }

    /// Next frame to play out to the peer. `None` once the bridge is done.
    pub async fn recv(&mut self) -> Option<AudioFrame> {
        self.from_bridge.recv().await
    }

    /// Current state as set by the bridge.
    pub fn state(&self) -> PeerState {
        *self.state.borrow()
    }

    /// Wait until the bridge moves the link into `target`.
    ///
    /// Returns `false` if the bridge side went away first.
    pub async fn wait_for_state(&mut self, target: PeerState) -> bool {
        self.state.wait_for(|state| *state == target).await.is_ok()
    }

    /// Receiver observing state changes.
    pub fn state_changes(&self) -> watch::Receiver<PeerState> {
        self.state.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_frames_flow_both_ways() {
        let (link, mut remote) = peer_link(AudioFormat::opus(48000, 1), 4);
        let (mut inbound, outbound, _state) = link.into_parts();

        let frame = AudioFrame::new(vec![1u8, 2, 3], AudioFormat::opus(48000, 1));
        remote.send(frame.clone()).await.unwrap();
        assert_eq!(inbound.recv().await, Some(frame.clone()));

        outbound.send(frame.clone()).await.unwrap();
        assert_eq!(remote.recv().await, Some(frame));
    }

    #[tokio::test]
    async fn test_state_transitions() {
        let (link, mut remote) = peer_link(AudioFormat::SPEECH, 4);
        assert_eq!(link.state(), PeerState::Idle);
        let (_inbound, _outbound, state) = link.into_parts();

        assert!(state.activate());
        assert!(!state.activate());
        assert!(remote.wait_for_state(PeerState::Active).await);

        state.close();
        assert_eq!(remote.state(), PeerState::Closed);
        // Closed is terminal
        assert!(!state.activate());
        assert_eq!(state.get(), PeerState::Closed);
    }

    #[tokio::test]
    async fn test_dropping_link_leaves_last_state() {
        let (link, mut remote) = peer_link(AudioFormat::SPEECH, 4);
        drop(link);
        assert_eq!(remote.state(), PeerState::Idle);
        assert!(!remote.wait_for_state(PeerState::Active).await);
        assert_eq!(
            remote.send(AudioFrame::speech(vec![0u8; 2])).await,
            Err(PeerError::Closed)
        );
        assert_eq!(remote.recv().await, None);
    }

    #[test]
    fn test_remote_drop_is_visible() {
        let (link, remote) = peer_link(AudioFormat::SPEECH, 4);
        assert!(!link.is_remote_closed());
        drop(remote);
        assert!(link.is_remote_closed());
    }
}
