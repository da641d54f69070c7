use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use super::clock::Clock;
use super::pacer::Pacer;
use crate::core::audio::{AudioFormat, AudioFrame};

/// Item flowing through the pacing stage.
#[derive(Debug, Clone, PartialEq)]
pub enum PacedItem {
    /// Response audio (PCM 16-bit, 24kHz, mono)
    Audio(AudioFrame),
    /// All audio for the current response has been delivered
    ResponseDone,
}

/// Errors raised by the pacing stage.
#[derive(Debug, Error)]
pub enum PacingError {
    /// A frame without a computable playback duration reached the pacer
    #[error("Pacing requires {expected}, got {actual}")]
    FormatMismatch {
        expected: AudioFormat,
        actual: AudioFormat,
    },
}

/// Counters reported when the stage ends.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PacingStats {
    pub frames_released: u64,
    pub responses_completed: u64,
}

/// Re-times burst-delivered PCM to playback speed.
///
/// Items are handled strictly in arrival order. Only audio is delayed;
/// a `ResponseDone` resets the pacer when it is reached and is forwarded
/// right away.
pub struct PacingStage {
    clock: Arc<dyn Clock>,
    pacer: Pacer,
    stats: PacingStats,
}

impl PacingStage {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            pacer: Pacer::new(),
            stats: PacingStats::default(),
        }
    }

    /// Run until the input closes, the output closes or `cancel` fires.
    ///
    /// Pending release timers are abandoned on cancellation.
    pub async fn run(
        mut self,
        mut input: mpsc::Receiver<PacedItem>,
        output: mpsc::Sender<PacedItem>,
        cancel: CancellationToken,
    ) -> Result<PacingStats, PacingError> {
        loop {
            let item = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                item = input.recv() => match item {
                    Some(item) => item,
                    None => break,
                },
            };

            match item {
                PacedItem::Audio(frame) => {
                    let duration = match frame.format() {
                        AudioFormat::SPEECH => frame.duration().unwrap_or_default(),
                        actual => {
                            return Err(PacingError::FormatMismatch {
                                expected: AudioFormat::SPEECH,
                                actual,
                            });
                        }
                    };

                    let release = self.pacer.schedule(self.clock.now(), duration);
                    trace!(bytes = frame.len(), ?duration, "Pacing frame");

                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => break,
                        _ = self.clock.sleep_until(release) => {}
                    }

                    if output.send(PacedItem::Audio(frame)).await.is_err() {
                        debug!("Pacing output closed");
                        break;
                    }
                    self.stats.frames_released += 1;
                }
                PacedItem::ResponseDone => {
                    self.pacer.reset();
                    self.stats.responses_completed += 1;
                    debug!(
                        frames_released = self.stats.frames_released,
                        "Response audio done, pacing baseline reset"
                    );
                    if output.send(PacedItem::ResponseDone).await.is_err() {
                        debug!("Pacing output closed");
                        break;
                    }
                }
            }
        }

        Ok(self.stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::pacing::TokioClock;
    use std::time::Duration;
    use tokio::time::Instant;

    fn frame_20ms() -> PacedItem {
        PacedItem::Audio(AudioFrame::speech(vec![0u8; 960]))
    }

    fn spawn_stage(
        capacity: usize,
    ) -> (
        mpsc::Sender<PacedItem>,
        mpsc::Receiver<PacedItem>,
        CancellationToken,
        tokio::task::JoinHandle<Result<PacingStats, PacingError>>,
    ) {
        let (in_tx, in_rx) = mpsc::channel(capacity);
        let (out_tx, out_rx) = mpsc::channel(capacity);
        let cancel = CancellationToken::new();
        let stage = PacingStage::new(Arc::new(TokioClock));
        let handle = tokio::spawn(stage.run(in_rx, out_tx, cancel.clone()));
        (in_tx, out_rx, cancel, handle)
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_released_at_playback_speed() {
        let (in_tx, mut out_rx, _cancel, handle) = spawn_stage(16);
        let t0 = Instant::now();

        for _ in 0..5 {
            in_tx.send(frame_20ms()).await.unwrap();
        }
        drop(in_tx);

        let mut arrivals = Vec::new();
        while let Some(item) = out_rx.recv().await {
            assert!(matches!(item, PacedItem::Audio(_)));
            arrivals.push(Instant::now() - t0);
        }

        assert_eq!(arrivals.len(), 5);
        for (n, arrival) in arrivals.iter().enumerate() {
            assert!(
                *arrival >= Duration::from_millis(20) * n as u32,
                "frame {} released after {:?}",
                n,
                arrival
            );
        }
        let stats = handle.await.unwrap().unwrap();
        assert_eq!(stats.frames_released, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_response_done_resets_baseline() {
        let (in_tx, mut out_rx, _cancel, handle) = spawn_stage(16);
        let t0 = Instant::now();

        in_tx.send(frame_20ms()).await.unwrap();
        in_tx.send(frame_20ms()).await.unwrap();
        in_tx.send(PacedItem::ResponseDone).await.unwrap();
        in_tx.send(frame_20ms()).await.unwrap();
        drop(in_tx);

        let mut items = Vec::new();
        while let Some(item) = out_rx.recv().await {
            items.push((item, Instant::now() - t0));
        }

        assert_eq!(items.len(), 4);
        assert_eq!(items[2].0, PacedItem::ResponseDone);
        // Without the reset the third frame would wait until 40ms
        assert!(items[3].1 < Duration::from_millis(40));
        assert!(items[3].1 >= items[1].1);

        let stats = handle.await.unwrap().unwrap();
        assert_eq!(stats.responses_completed, 1);
        assert_eq!(stats.frames_released, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_response_done_without_audio() {
        let (in_tx, mut out_rx, _cancel, handle) = spawn_stage(4);

        in_tx.send(PacedItem::ResponseDone).await.unwrap();
        drop(in_tx);

        assert_eq!(out_rx.recv().await, Some(PacedItem::ResponseDone));
        assert_eq!(out_rx.recv().await, None);

        let stats = handle.await.unwrap().unwrap();
        assert_eq!(stats.frames_released, 0);
        assert_eq!(stats.responses_completed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_abandons_pending_timer() {
        let (in_tx, mut out_rx, cancel, handle) = spawn_stage(16);

        // One long frame (10s) followed by another that must wait for it
        in_tx
            .send(PacedItem::Audio(AudioFrame::speech(vec![0u8; 480_000])))
            .await
            .unwrap();
        in_tx.send(frame_20ms()).await.unwrap();

        assert!(matches!(out_rx.recv().await, Some(PacedItem::Audio(_))));
        let before = Instant::now();
        cancel.cancel();

        let stats = handle.await.unwrap().unwrap();
        assert_eq!(stats.frames_released, 1);
        assert!(Instant::now() - before < Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejects_non_speech_frames() {
        let (in_tx, _out_rx, _cancel, handle) = spawn_stage(4);
        in_tx
            .send(PacedItem::Audio(AudioFrame::new(
                vec![0u8; 10],
                AudioFormat::opus(48000, 1),
            )))
            .await
            .unwrap();

        match handle.await.unwrap() {
            Err(PacingError::FormatMismatch { actual, .. }) => {
                assert_eq!(actual, AudioFormat::opus(48000, 1));
            }
            other => panic!("Expected FormatMismatch, got {:?}", other),
        }
    }
}
