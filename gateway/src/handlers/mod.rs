//! HTTP and WebSocket request handlers
//!
//! - `api` - Health check endpoint
//! - `bridge` - Browser audio bridge WebSocket

pub mod api;
pub mod bridge;

pub use bridge::bridge_handler;
