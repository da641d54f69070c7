//! Pacing stage.
//!
//! The speech service delivers response audio faster than real time. This
//! stage holds each PCM frame until the previous one would have finished
//! playing, so the peer receives audio at playback speed. Time is read
//! only through the [`Clock`] trait.

mod clock;
mod pacer;
mod stage;

pub use clock::{Clock, TokioClock};
pub use pacer::Pacer;
pub use stage::{PacedItem, PacingError, PacingStage, PacingStats};
