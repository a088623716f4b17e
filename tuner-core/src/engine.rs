//! # Tuning Engine Module
//!
//! Owns the dedicated worker thread that drives capture → framing →
//! analysis, and the single-slot snapshot consumers poll.
//!
//! ## Architecture
//! - **Worker thread**: opens the capture source, frames incoming chunks and
//!   analyzes every frame in order
//! - **Snapshot slot**: the worker swaps in a whole new `Arc<TunerSnapshot>`
//!   per frame; readers clone the `Arc` and never see a half-written update
//! - **Target cell**: the consumer selects the target pitch through an
//!   atomic that the worker reads once per frame
//! - **Shutdown**: a crossbeam channel watched alongside the sample channel,
//!   so a stop request interrupts the wait for samples

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender, TryRecvError};
use serde::{Deserialize, Serialize};

use crate::analysis::{Analyzer, Reading};
use crate::audio::CpalCapture;
use crate::capture::{CaptureEvent, CaptureSource};
use crate::classify::TargetPitch;
use crate::config::EngineConfig;
use crate::error::Result;
use crate::tuning;
use crate::window::Windower;

/// Failure message when the capture source panics outside frame analysis.
const CAPTURE_PANICKED: &str = "capture source panicked";

/// How often [`TunerHandle::wait_for`] re-checks the snapshot.
const POLL_INTERVAL: Duration = Duration::from_millis(2);

/// Lifecycle of the engine worker as seen by consumers.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum EngineStatus {
    /// The worker is opening the capture source.
    #[default]
    Starting,
    /// Frames are being analyzed.
    Running,
    /// Stopped on request.
    Stopped,
    /// The capture stream closed.
    Ended,
    /// The capture source failed to open or reported an error.
    Failed(String),
}

impl EngineStatus {
    /// True once the worker has exited; nothing is published afterwards.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Stopped | Self::Ended | Self::Failed(_))
    }
}

/// The unit of publication from the worker to consumers.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TunerSnapshot {
    /// Increases by one with every publish.
    pub sequence: u64,
    /// Frames analyzed so far.
    pub frames: u64,
    pub status: EngineStatus,
    /// Target the reading was classified against.
    pub target: TargetPitch,
    /// Reading of the most recent frame.
    pub reading: Reading,
}

impl TunerSnapshot {
    /// Note name for display, `"N/A"` when there is none.
    pub fn note_label(&self) -> String {
        tuning::note_label(self.reading.note)
    }
}

/// State shared between the worker and its handle.
#[derive(Debug)]
struct Shared {
    latest: Mutex<Arc<TunerSnapshot>>,
    /// `f32` bits of the target in Hz; 0.0 means unset.
    target: AtomicU32,
}

impl Shared {
    fn new() -> Self {
        Self {
            latest: Mutex::new(Arc::new(TunerSnapshot::default())),
            target: AtomicU32::new(0),
        }
    }

    fn latest(&self) -> Arc<TunerSnapshot> {
        Arc::clone(&self.latest.lock().unwrap_or_else(PoisonError::into_inner))
    }

    fn publish(&self, snapshot: TunerSnapshot) {
        *self.latest.lock().unwrap_or_else(PoisonError::into_inner) = Arc::new(snapshot);
    }

    fn target(&self) -> TargetPitch {
        TargetPitch::hz(f32::from_bits(self.target.load(Ordering::Acquire)))
    }

    fn set_target(&self, target: TargetPitch) {
        let bits = target.frequency().map_or(0, f32::to_bits);
        self.target.store(bits, Ordering::Release);
    }
}

/// Entry points for starting the engine.
pub struct TunerEngine;

impl TunerEngine {
    /// Starts a worker that analyzes the default microphone.
    pub fn spawn_microphone(config: EngineConfig) -> Result<TunerHandle> {
        Self::spawn(config, |config| CpalCapture::open(config.sample_rate))
    }

    /// Starts a worker thread around a capture source.
    ///
    /// `open` runs on the worker thread, so the source itself need not be
    /// `Send` (CPAL streams are not on every platform).
    ///
    /// # Errors
    /// * `InvalidConfig` if the configuration is rejected
    /// * `Io` if the thread cannot be spawned
    pub fn spawn<S, F>(config: EngineConfig, open: F) -> Result<TunerHandle>
    where
        S: CaptureSource,
        F: FnOnce(&EngineConfig) -> anyhow::Result<S> + Send + 'static,
    {
        config.validate()?;

        let shared = Arc::new(Shared::new());
        let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded(1);
        let worker_shared = Arc::clone(&shared);
        let thread_handle = thread::Builder::new()
            .name("tuner-worker".into())
            .spawn(move || run_worker(config, open, worker_shared, shutdown_rx))?;

        Ok(TunerHandle {
            shared,
            shutdown_tx,
            thread_handle: Some(thread_handle),
        })
    }
}

/// Consumer side of a running engine. Dropping it stops the worker.
#[derive(Debug)]
pub struct TunerHandle {
    shared: Arc<Shared>,
    shutdown_tx: Sender<()>,
    thread_handle: Option<JoinHandle<()>>,
}

impl TunerHandle {
    /// The most recently published snapshot. Never blocks on analysis.
    pub fn latest(&self) -> Arc<TunerSnapshot> {
        self.shared.latest()
    }

    /// Selects the pitch to tune toward; applies from the next frame on.
    pub fn set_target(&self, target: TargetPitch) {
        self.shared.set_target(target);
    }

    pub fn target(&self) -> TargetPitch {
        self.shared.target()
    }

    /// True once the worker thread has exited.
    pub fn is_finished(&self) -> bool {
        self.thread_handle.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Polls until a snapshot satisfies `predicate` or `timeout` elapses.
    pub fn wait_for(
        &self,
        timeout: Duration,
        mut predicate: impl FnMut(&TunerSnapshot) -> bool,
    ) -> Option<Arc<TunerSnapshot>> {
        let deadline = Instant::now() + timeout;
        loop {
            let snapshot = self.latest();
            if predicate(&snapshot) {
                return Some(snapshot);
            }
            if Instant::now() >= deadline {
                return None;
            }
            thread::sleep(POLL_INTERVAL);
        }
    }

    /// Stops the worker, waits for it to release the capture source, and
    /// returns the final status.
    pub fn stop(mut self) -> EngineStatus {
        self.shutdown();
        self.latest().status.clone()
    }

    fn shutdown(&mut self) {
        if let Some(handle) = self.thread_handle.take() {
            // Fails only if the worker already exited.
            let _ = self.shutdown_tx.try_send(());
            if handle.join().is_err() {
                tracing::error!("tuner worker panicked");
                let latest = self.shared.latest();
                if !latest.status.is_terminal() {
                    self.shared.publish(TunerSnapshot {
                        sequence: latest.sequence + 1,
                        status: EngineStatus::Failed("tuner worker panicked".into()),
                        ..(*latest).clone()
                    });
                }
            }
        }
    }
}

impl Drop for TunerHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Body of the worker thread.
fn run_worker<S, F>(config: EngineConfig, open: F, shared: Arc<Shared>, shutdown_rx: Receiver<()>)
where
    S: CaptureSource,
    F: FnOnce(&EngineConfig) -> anyhow::Result<S>,
{
    tracing::info!("starting tuner worker");
    let mut analyzer = match Analyzer::new(&config) {
        Ok(analyzer) => analyzer,
        Err(e) => return publish_failure(&shared, e.to_string()),
    };
    let mut capture = match catch_unwind(AssertUnwindSafe(|| open(&config))) {
        Ok(Ok(capture)) => capture,
        Ok(Err(e)) => {
            tracing::error!(error = %e, "failed to open capture source");
            return publish_failure(&shared, e.to_string());
        }
        Err(_) => {
            tracing::error!("capture source panicked while opening");
            return publish_failure(&shared, CAPTURE_PANICKED.to_string());
        }
    };

    let sample_rate = capture.sample_rate();
    if sample_rate != config.sample_rate {
        tracing::warn!(
            configured = config.sample_rate,
            actual = sample_rate,
            "capture sample rate differs from configuration"
        );
    }
    if config.frame_size < analyzer.required_frame_size(sample_rate) {
        tracing::warn!(
            frame_size = config.frame_size,
            sample_rate,
            "frame too short for the lag range at this rate; pitch will read unvoiced"
        );
    }

    let mut publisher = Publisher::new(&shared);
    publisher.publish(EngineStatus::Running, Reading::default(), shared.target());

    let status = match Windower::new(config.frame_size, config.hop_size, sample_rate) {
        Ok(mut windower) => process_stream(
            &capture,
            &mut windower,
            &mut analyzer,
            &mut publisher,
            &shutdown_rx,
        ),
        Err(e) => EngineStatus::Failed(e.to_string()),
    };

    tracing::info!(?status, frames = publisher.frames, "stopping capture");
    let released = catch_unwind(AssertUnwindSafe(move || {
        let result = capture.release();
        drop(capture);
        result
    }));
    let status = match released {
        Ok(Ok(())) => status,
        Ok(Err(e)) => {
            tracing::warn!(error = %e, "error releasing capture source");
            status
        }
        Err(_) => {
            tracing::error!("capture source panicked while releasing");
            if matches!(status, EngineStatus::Failed(_)) {
                status
            } else {
                EngineStatus::Failed(CAPTURE_PANICKED.to_string())
            }
        }
    };

    let (reading, target) = (publisher.last_reading, publisher.last_target);
    publisher.publish(status, reading, target);
    tracing::info!("tuner worker finished");
}

/// Reads capture events until the stream ends, fails, or a stop arrives.
fn process_stream<S: CaptureSource>(
    capture: &S,
    windower: &mut Windower,
    analyzer: &mut Analyzer,
    publisher: &mut Publisher<'_>,
    shutdown_rx: &Receiver<()>,
) -> EngineStatus {
    loop {
        crossbeam_channel::select! {
            recv(capture.events()) -> msg => match msg {
                Ok(CaptureEvent::Samples(chunk)) => {
                    windower.push(&chunk);
                    while let Some(frame) = windower.next_frame() {
                        let target = publisher.shared.target();
                        match catch_unwind(AssertUnwindSafe(|| analyzer.analyze(&frame, target))) {
                            Ok(reading) => {
                                publisher.frames += 1;
                                publisher.publish(EngineStatus::Running, reading, target);
                            }
                            Err(_) => tracing::error!("frame analysis panicked, skipping frame"),
                        }
                        // A large chunk can hold many frames; stay responsive.
                        if !matches!(shutdown_rx.try_recv(), Err(TryRecvError::Empty)) {
                            tracing::info!("received shutdown signal");
                            return EngineStatus::Stopped;
                        }
                    }
                }
                Ok(CaptureEvent::Failed(message)) => {
                    tracing::error!(%message, "capture source failed");
                    return EngineStatus::Failed(message);
                }
                Err(_) => {
                    tracing::info!("capture stream closed");
                    return EngineStatus::Ended;
                }
            },
            recv(shutdown_rx) -> _ => {
                tracing::info!("received shutdown signal");
                return EngineStatus::Stopped;
            },
        }
    }
}

/// Single writer of the snapshot slot; keeps the sequence strictly
/// increasing.
struct Publisher<'a> {
    shared: &'a Shared,
    sequence: u64,
    frames: u64,
    last_reading: Reading,
    last_target: TargetPitch,
}

impl<'a> Publisher<'a> {
    fn new(shared: &'a Shared) -> Self {
        Self {
            shared,
            sequence: 0,
            frames: 0,
            last_reading: Reading::default(),
            last_target: TargetPitch::UNSET,
        }
    }

    fn publish(&mut self, status: EngineStatus, reading: Reading, target: TargetPitch) {
        self.sequence += 1;
        self.last_reading = reading;
        self.last_target = target;
        self.shared.publish(TunerSnapshot {
            sequence: self.sequence,
            frames: self.frames,
            status,
            target,
            reading,
        });
    }
}

fn publish_failure(shared: &Shared, message: String) {
    let mut publisher = Publisher::new(shared);
    publisher.publish(EngineStatus::Failed(message), Reading::default(), TargetPitch::UNSET);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_cell_round_trips() {
        let shared = Shared::new();
        assert_eq!(shared.target(), TargetPitch::UNSET);
        shared.set_target(TargetPitch::hz(82.41));
        assert_eq!(shared.target().frequency(), Some(82.41));
        shared.set_target(TargetPitch::UNSET);
        assert!(!shared.target().is_set());
    }

    #[test]
    fn publisher_sequence_increases() {
        let shared = Shared::new();
        let mut publisher = Publisher::new(&shared);
        publisher.publish(EngineStatus::Running, Reading::default(), TargetPitch::UNSET);
        let first = shared.latest();
        publisher.publish(EngineStatus::Ended, Reading::default(), TargetPitch::UNSET);
        let second = shared.latest();
        assert!(second.sequence > first.sequence);
        assert!(second.status.is_terminal());
        assert!(!first.status.is_terminal());
    }

    #[test]
    fn snapshot_serializes_for_display() {
        let json = serde_json::to_string(&TunerSnapshot::default()).unwrap();
        assert!(json.contains("\"status\":\"Starting\""));
        assert_eq!(TunerSnapshot::default().note_label(), "N/A");
    }
}
