use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, warn};

use super::error::{SessionError, SessionResult};
use super::stages::{SessionCounters, Stage, StageExit, run_downlink, run_encoder, run_uplink};
use crate::core::bridge::FormatBridge;
use crate::core::pacing::{Clock, PacingStage, TokioClock};
use crate::core::peer::{PeerLink, PeerStateHandle};
use crate::core::realtime::{BoxedRealtimeTransport, OpenAIRealtime, RealtimeConfig};

/// Default capacity of the channels between stages.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;

/// Capacity of the session notice broadcast.
const NOTICE_CAPACITY: usize = 64;

// =============================================================================
// Configuration
// =============================================================================

/// Parameters of one bridging session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeSessionConfig {
    /// Speech service connection settings
    pub realtime: RealtimeConfig,
    /// Capacity of each inter-stage channel
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

fn default_channel_capacity() -> usize {
    DEFAULT_CHANNEL_CAPACITY
}

impl BridgeSessionConfig {
    pub fn new(realtime: RealtimeConfig) -> Self {
        Self {
            realtime,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

// =============================================================================
// Outcome
// =============================================================================

/// Non-audio information published while a session runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionNotice {
    /// The speech service assigned a session ID
    SessionCreated { session_id: String },
    /// Transcript of a finished response
    Transcript { text: String },
    /// Server VAD heard the user start speaking
    SpeechStarted,
    /// Server VAD heard the user stop speaking
    SpeechStopped,
    /// The speech service rejected a request; the session continues
    ServiceError {
        code: Option<String>,
        message: String,
    },
}

/// Why a session ended without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    /// The peer closed its side
    PeerClosed,
    /// The speech service closed the connection cleanly
    TransportClosed,
    /// `shutdown` was called
    Shutdown,
}

/// Counters reported when a session ends cleanly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSummary {
    pub id: String,
    pub session_id: Option<String>,
    pub end_reason: EndReason,
    pub frames_from_peer: u64,
    pub frames_to_speech: u64,
    pub frames_dropped: u64,
    pub frames_from_speech: u64,
    pub frames_to_peer: u64,
    pub responses_completed: u64,
}

// =============================================================================
// Session
// =============================================================================

/// Entry point for bridging sessions.
pub struct BridgeSession;

impl BridgeSession {
    /// Start a session against the OpenAI Realtime API.
    pub async fn start(
        config: BridgeSessionConfig,
        peer: PeerLink,
        clock: Arc<dyn Clock>,
    ) -> SessionResult<SessionHandle> {
        config.realtime.validate()?;
        let transport = OpenAIRealtime::new(config.realtime.clone())?;
        Self::start_with_transport(config, Box::new(transport), peer, clock).await
    }

    /// Start a session against the real clock.
    pub async fn start_realtime(
        config: BridgeSessionConfig,
        peer: PeerLink,
    ) -> SessionResult<SessionHandle> {
        Self::start(config, peer, Arc::new(TokioClock)).await
    }

    /// Start a session over an already constructed transport.
    ///
    /// Configuration problems are reported before anything connects and
    /// leave the peer `Idle`.
    pub async fn start_with_transport(
        config: BridgeSessionConfig,
        mut transport: BoxedRealtimeTransport,
        peer: PeerLink,
        clock: Arc<dyn Clock>,
    ) -> SessionResult<SessionHandle> {
        config.realtime.validate()?;
        if config.channel_capacity == 0 {
            return Err(SessionError::Configuration(
                "channel_capacity must be greater than zero".to_string(),
            ));
        }
        let (inbound, outbound) = FormatBridge::new(peer.format())?.into_parts();
        if peer.is_remote_closed() {
            return Err(SessionError::PeerClosed);
        }

        let id = uuid::Uuid::new_v4().to_string();
        let span = info_span!("bridge_session", id = %id, peer_format = %peer.format());

        let events = transport.connect().instrument(span.clone()).await?;

        let (peer_rx, peer_tx, peer_state) = peer.into_parts();
        peer_state.activate();

        let cancel = CancellationToken::new();
        let counters = Arc::new(SessionCounters::default());
        let (notice_tx, _) = broadcast::channel(NOTICE_CAPACITY);
        let (session_id_tx, session_id_rx) = watch::channel(None);
        let (pace_tx, pace_rx) = mpsc::channel(config.channel_capacity);
        let (encode_tx, encode_rx) = mpsc::channel(config.channel_capacity);

        let mut stages: JoinSet<(Stage, SessionResult<StageExit>)> = JoinSet::new();
        {
            let counters = counters.clone();
            let cancel = cancel.clone();
            stages.spawn(
                async move {
                    let result = run_uplink(transport, peer_rx, inbound, &counters, cancel).await;
                    (Stage::Uplink, result)
                }
                .instrument(span.clone()),
            );
        }
        {
            let counters = counters.clone();
            let cancel = cancel.clone();
            let notices = notice_tx.clone();
            stages.spawn(
                async move {
                    let result =
                        run_downlink(events, pace_tx, notices, session_id_tx, &counters, cancel)
                            .await;
                    (Stage::Downlink, result)
                }
                .instrument(span.clone()),
            );
        }
        {
            let cancel = cancel.clone();
            let pacing = PacingStage::new(clock);
            stages.spawn(
                async move {
                    let result = match pacing.run(pace_rx, encode_tx, cancel.clone()).await {
                        Ok(stats) => {
                            debug!(
                                frames_released = stats.frames_released,
                                responses_completed = stats.responses_completed,
                                "Pacing stage finished"
                            );
                            Ok(if cancel.is_cancelled() {
                                StageExit::Cancelled
                            } else {
                                StageExit::NeighborClosed
                            })
                        }
                        Err(e) => Err(SessionError::from(e)),
                    };
                    (Stage::Pacing, result)
                }
                .instrument(span.clone()),
            );
        }
        {
            let counters = counters.clone();
            let cancel = cancel.clone();
            stages.spawn(
                async move {
                    let result = run_encoder(encode_rx, outbound, peer_tx, &counters, cancel).await;
                    (Stage::Encoder, result)
                }
                .instrument(span.clone()),
            );
        }

        info!(parent: &span, "Bridge session started");

        let supervisor = tokio::spawn(
            supervise(
                id.clone(),
                stages,
                cancel.clone(),
                counters,
                session_id_rx.clone(),
                peer_state,
            )
            .instrument(span),
        );

        Ok(SessionHandle {
            id,
            cancel,
            task: supervisor,
            session_id: session_id_rx,
            notices: notice_tx,
        })
    }
}

/// Wait for the first stage to end, cancel the rest and collect the outcome.
async fn supervise(
    id: String,
    mut stages: JoinSet<(Stage, SessionResult<StageExit>)>,
    cancel: CancellationToken,
    counters: Arc<SessionCounters>,
    session_id: watch::Receiver<Option<String>>,
    peer_state: PeerStateHandle,
) -> SessionResult<SessionSummary> {
    let mut end_reason: Option<EndReason> = None;
    let mut failure: Option<SessionError> = None;

    while let Some(joined) = stages.join_next().await {
        let (stage, result) = match joined {
            Ok(output) => output,
            Err(e) => {
                error!(error = %e, "Session stage panicked");
                failure.get_or_insert(SessionError::Internal(e.to_string()));
                cancel.cancel();
                continue;
            }
        };

        match result {
            Ok(exit) => {
                debug!(%stage, ?exit, "Stage finished");
                if end_reason.is_none() && failure.is_none() {
                    end_reason = match exit {
                        StageExit::PeerClosed => Some(EndReason::PeerClosed),
                        StageExit::TransportClosed => Some(EndReason::TransportClosed),
                        StageExit::Cancelled => Some(EndReason::Shutdown),
                        StageExit::NeighborClosed => None,
                    };
                }
            }
            Err(e) => {
                if failure.is_none() {
                    warn!(%stage, error = %e, "Stage failed, ending session");
                    failure = Some(e);
                } else {
                    debug!(%stage, error = %e, "Stage failed after session end");
                }
            }
        }
        cancel.cancel();
    }

    peer_state.close();

    if let Some(e) = failure {
        return Err(e);
    }

    let summary = SessionSummary {
        id,
        session_id: session_id.borrow().clone(),
        end_reason: end_reason.unwrap_or(EndReason::Shutdown),
        frames_from_peer: SessionCounters::get(&counters.frames_from_peer),
        frames_to_speech: SessionCounters::get(&counters.frames_to_speech),
        frames_dropped: SessionCounters::get(&counters.frames_dropped),
        frames_from_speech: SessionCounters::get(&counters.frames_from_speech),
        frames_to_peer: SessionCounters::get(&counters.frames_to_peer),
        responses_completed: SessionCounters::get(&counters.responses_completed),
    };
    info!(
        end_reason = ?summary.end_reason,
        frames_from_peer = summary.frames_from_peer,
        frames_to_peer = summary.frames_to_peer,
        "Bridge session ended"
    );
    Ok(summary)
}

// =============================================================================
// Handle
// =============================================================================

/// Handle to a running session.
///
/// Dropping the handle does not stop the session; call
/// [`shutdown`](Self::shutdown) or cancel the token from
/// [`cancel_token`](Self::cancel_token).
pub struct SessionHandle {
    id: String,
    cancel: CancellationToken,
    task: JoinHandle<SessionResult<SessionSummary>>,
    session_id: watch::Receiver<Option<String>>,
    notices: broadcast::Sender<SessionNotice>,
}

impl SessionHandle {
    /// Locally generated session identifier.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Session ID assigned by the speech service, once received.
    pub fn session_id(&self) -> Option<String> {
        self.session_id.borrow().clone()
    }

    /// Subscribe to session notices (transcripts, VAD events).
    pub fn subscribe(&self) -> broadcast::Receiver<SessionNotice> {
        self.notices.subscribe()
    }

    /// Token that ends the session when cancelled.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the session to end on its own.
    pub async fn wait(self) -> SessionResult<SessionSummary> {
        match self.task.await {
            Ok(outcome) => outcome,
            Err(e) if e.is_cancelled() => Err(SessionError::Cancelled),
            Err(e) => Err(SessionError::Internal(e.to_string())),
        }
    }

    /// Cancel every stage, close the transport and the peer, and return
    /// the outcome.
    pub async fn shutdown(self) -> SessionResult<SessionSummary> {
        self.cancel.cancel();
        self.wait().await
    }
}
