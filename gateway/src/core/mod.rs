pub mod audio;
pub mod bridge;
pub mod pacing;
pub mod peer;
pub mod pipeline;
pub mod realtime;

// Re-export commonly used types for convenience
pub use audio::{AudioEncoding, AudioFormat, AudioFrame};

pub use bridge::{BridgeError, FormatBridge};

pub use pacing::{Clock, PacedItem, PacingStage, TokioClock};

pub use peer::{PeerLink, PeerState, RemotePeer, peer_link};

pub use pipeline::{
    BridgeSession, BridgeSessionConfig, SessionError, SessionHandle, SessionNotice,
    SessionResult, SessionSummary,
};

pub use realtime::{
    OpenAIRealtime, RealtimeConfig, RealtimeError, RealtimeResult, RealtimeTransport,
    TransportEvent,
};
