//! Browser bridge WebSocket handlers
//!
//! # Protocol
//!
//! ## Client → Server
//!
//! - **config**: Declare codec, sample rate, channels and optional
//!   voice/instructions. Must be the first message.
//! - **Binary frames**: Audio in the declared codec (one Opus packet per frame)
//! - **stop**: End the session
//!
//! ## Server → Client
//!
//! - **session_started**: Session established, audio may flow
//! - **session_created**: Speech service session ID
//! - **transcript**: Transcript of the assistant's response
//! - **speech_event**: Server VAD events (started/stopped)
//! - **error**: Error message
//! - **closed**: Session ended
//! - **Binary frames**: Assistant audio in the declared codec

mod handler;
pub mod messages;

pub use handler::bridge_handler;
