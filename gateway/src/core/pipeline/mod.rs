//! Session pipeline.
//!
//! Composes the transport, format bridge and pacing stage into a fixed
//! graph for one browser peer:
//!
//! ```text
//! peer inbound -> decode -> transport -> pacing -> encode -> peer outbound
//! ```
//!
//! Every stage is a tokio task connected to its neighbours by a bounded
//! channel. The graph is built once at session start; the first stage to
//! finish cancels the others and the session outcome is reported through
//! the [`SessionHandle`].

mod error;
mod session;
mod stages;

pub use error::{SessionError, SessionResult};
pub use session::{
    BridgeSession, BridgeSessionConfig, DEFAULT_CHANNEL_CAPACITY, EndReason, SessionHandle,
    SessionNotice, SessionSummary,
};
