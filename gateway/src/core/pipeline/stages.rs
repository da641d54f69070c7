//! Stage tasks of a bridging session.
//!
//! ```text
//! peer ──► uplink (decode, send) ──► speech service
//!                                          │
//! peer ◄── encoder ◄── pacing ◄── downlink ◄┘
//! ```

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{broadcast, mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::error::{SessionError, SessionResult};
use super::session::SessionNotice;
use crate::core::audio::AudioFrame;
use crate::core::bridge::{InboundBridge, OutboundBridge};
use crate::core::pacing::PacedItem;
use crate::core::realtime::{
    BoxedRealtimeTransport, ControlEvent, RealtimeError, TransportEvent,
};

/// Stage identifiers, used for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Stage {
    Uplink,
    Downlink,
    Pacing,
    Encoder,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Uplink => write!(f, "uplink"),
            Stage::Downlink => write!(f, "downlink"),
            Stage::Pacing => write!(f, "pacing"),
            Stage::Encoder => write!(f, "encoder"),
        }
    }
}

/// Why a stage returned without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StageExit {
    /// The peer stopped sending or stopped receiving
    PeerClosed,
    /// The speech service closed the connection cleanly
    TransportClosed,
    /// Session cancellation fired
    Cancelled,
    /// A neighbouring stage ended first
    NeighborClosed,
}

/// Frame counters shared by every stage.
#[derive(Debug, Default)]
pub(crate) struct SessionCounters {
    pub frames_from_peer: AtomicU64,
    pub frames_to_speech: AtomicU64,
    pub frames_dropped: AtomicU64,
    pub frames_from_speech: AtomicU64,
    pub frames_to_peer: AtomicU64,
    pub responses_completed: AtomicU64,
}

impl SessionCounters {
    #[inline]
    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn get(counter: &AtomicU64) -> u64 {
        counter.load(Ordering::Relaxed)
    }
}

// =============================================================================
// Uplink: peer -> speech service
// =============================================================================

/// Decode peer frames and hand them to the transport.
///
/// Owns the transport and disconnects it on exit, whatever the reason.
pub(crate) async fn run_uplink(
    mut transport: BoxedRealtimeTransport,
    mut peer_rx: mpsc::Receiver<AudioFrame>,
    mut inbound: InboundBridge,
    counters: &SessionCounters,
    cancel: CancellationToken,
) -> SessionResult<StageExit> {
    let result = loop {
        let frame = tokio::select! {
            biased;
            _ = cancel.cancelled() => break Ok(StageExit::Cancelled),
            frame = peer_rx.recv() => match frame {
                Some(frame) => frame,
                None => {
                    info!("Peer stopped sending audio");
                    break Ok(StageExit::PeerClosed);
                }
            },
        };
        SessionCounters::incr(&counters.frames_from_peer);

        let pcm = match inbound.decode(&frame) {
            Ok(pcm) => pcm,
            Err(e) => break Err(SessionError::from(e)),
        };
        if pcm.is_empty() {
            continue;
        }

        match transport.send_audio(&pcm) {
            Ok(()) => SessionCounters::incr(&counters.frames_to_speech),
            Err(RealtimeError::Backpressure) => {
                SessionCounters::incr(&counters.frames_dropped);
                warn!(bytes = pcm.len(), "Speech service queue full, dropping frame");
            }
            Err(e) => break Err(SessionError::from(e)),
        }
    };

    if let Err(e) = transport.disconnect().await {
        warn!(error = %e, "Failed to disconnect transport");
    }
    result
}

// =============================================================================
// Downlink: speech service -> pacing
// =============================================================================

/// Route transport events: audio and response boundaries to the pacer,
/// everything else to session notices.
pub(crate) async fn run_downlink(
    mut events: mpsc::Receiver<TransportEvent>,
    pace_tx: mpsc::Sender<PacedItem>,
    notices: broadcast::Sender<SessionNotice>,
    session_id: watch::Sender<Option<String>>,
    counters: &SessionCounters,
    cancel: CancellationToken,
) -> SessionResult<StageExit> {
    loop {
        let event = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(StageExit::Cancelled),
            event = events.recv() => match event {
                Some(event) => event,
                None => return Ok(StageExit::TransportClosed),
            },
        };

        let item = match event {
            TransportEvent::Audio(frame) => {
                SessionCounters::incr(&counters.frames_from_speech);
                PacedItem::Audio(frame)
            }
            TransportEvent::Control(ControlEvent::ResponseAudioDone { .. }) => {
                PacedItem::ResponseDone
            }
            TransportEvent::Control(ControlEvent::SessionCreated { session_id: id }) => {
                session_id.send_replace(Some(id.clone()));
                let _ = notices.send(SessionNotice::SessionCreated { session_id: id });
                continue;
            }
            TransportEvent::Control(ControlEvent::TranscriptDone { text, .. }) => {
                let _ = notices.send(SessionNotice::Transcript { text });
                continue;
            }
            TransportEvent::Control(ControlEvent::SpeechStarted { audio_start_ms }) => {
                debug!(audio_start_ms, "Speech started");
                let _ = notices.send(SessionNotice::SpeechStarted);
                continue;
            }
            TransportEvent::Control(ControlEvent::SpeechStopped { audio_end_ms }) => {
                debug!(audio_end_ms, "Speech stopped");
                let _ = notices.send(SessionNotice::SpeechStopped);
                continue;
            }
            TransportEvent::Control(ControlEvent::ServiceError { code, message, .. }) => {
                let _ = notices.send(SessionNotice::ServiceError { code, message });
                continue;
            }
            TransportEvent::Closed(None) => {
                info!("Speech service closed the connection");
                return Ok(StageExit::TransportClosed);
            }
            TransportEvent::Closed(Some(e)) => return Err(e.into()),
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(StageExit::Cancelled),
            sent = pace_tx.send(item) => {
                if sent.is_err() {
                    return Ok(StageExit::NeighborClosed);
                }
            }
        }
    }
}

// =============================================================================
// Encoder: pacing -> peer
// =============================================================================

/// Encode paced PCM into the peer codec and deliver it.
///
/// `ResponseDone` flushes the encoder so the tail of a response is not
/// held back waiting for the next one.
pub(crate) async fn run_encoder(
    mut paced_rx: mpsc::Receiver<PacedItem>,
    mut outbound: OutboundBridge,
    peer_tx: mpsc::Sender<AudioFrame>,
    counters: &SessionCounters,
    cancel: CancellationToken,
) -> SessionResult<StageExit> {
    loop {
        let item = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                flush_on_teardown(&mut outbound, &peer_tx);
                return Ok(StageExit::Cancelled);
            }
            item = paced_rx.recv() => item,
        };

        let frames = match item {
            Some(PacedItem::Audio(pcm)) => outbound.encode(&pcm)?,
            Some(PacedItem::ResponseDone) => {
                SessionCounters::incr(&counters.responses_completed);
                outbound.flush()?
            }
            None => {
                flush_on_teardown(&mut outbound, &peer_tx);
                return Ok(StageExit::NeighborClosed);
            }
        };

        for frame in frames {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(StageExit::Cancelled),
                sent = peer_tx.send(frame) => {
                    if sent.is_err() {
                        info!("Peer stopped receiving audio");
                        return Ok(StageExit::PeerClosed);
                    }
                }
            }
            SessionCounters::incr(&counters.frames_to_peer);
        }
    }
}

/// Push out buffered audio without waiting on the peer.
fn flush_on_teardown(outbound: &mut OutboundBridge, peer_tx: &mpsc::Sender<AudioFrame>) {
    match outbound.flush() {
        Ok(frames) => {
            for frame in frames {
                if peer_tx.try_send(frame).is_err() {
                    break;
                }
            }
        }
        Err(e) => debug!(error = %e, "Encoder flush failed during teardown"),
    }
}
