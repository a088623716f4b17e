//! # Capture Module
//!
//! The seam between the engine and whatever produces audio. A capture
//! source delivers chunks of `f32` samples in [-1, 1] over a channel and is
//! released exactly once by the worker that owns it.

use crossbeam_channel::{Receiver, Sender};

use crate::error::{Result, TunerError};

/// Chunks a capture queue holds before the producer is throttled (feeder)
/// or chunks are dropped (live device).
pub const CAPTURE_QUEUE_CHUNKS: usize = 64;

/// Something a capture source reports to the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureEvent {
    /// A chunk of mono samples in [-1, 1].
    Samples(Vec<f32>),
    /// The device failed; the stream will not recover.
    Failed(String),
}

/// A live or synthetic audio source driven by the engine worker.
///
/// The stream ends when the sender side of [`CaptureSource::events`]
/// disconnects.
pub trait CaptureSource {
    /// Sample rate of the delivered samples in Hz.
    fn sample_rate(&self) -> u32;

    /// Channel the samples arrive on.
    fn events(&self) -> &Receiver<CaptureEvent>;

    /// Stops the underlying device. Called once, when the worker exits.
    fn release(&mut self) -> anyhow::Result<()>;
}

/// Converts signed 16-bit PCM to `f32` in [-1, 1).
pub fn samples_from_i16(pcm: &[i16]) -> Vec<f32> {
    pcm.iter().map(|&s| s as f32 / 32_768.0).collect()
}

/// In-memory capture fed by a [`SampleFeeder`].
///
/// Lets a caller that manages its own device push samples into the engine.
#[derive(Debug)]
pub struct ChannelCapture {
    sample_rate: u32,
    events: Receiver<CaptureEvent>,
}

/// Producer half of a [`ChannelCapture`]. Dropping it (or calling
/// [`SampleFeeder::close`]) ends the stream.
///
/// The queue is bounded: feeding blocks while [`CAPTURE_QUEUE_CHUNKS`]
/// chunks are waiting, so a fast producer cannot run ahead of analysis.
#[derive(Debug, Clone)]
pub struct SampleFeeder {
    sender: Sender<CaptureEvent>,
}

impl ChannelCapture {
    pub fn new(sample_rate: u32) -> (Self, SampleFeeder) {
        let (sender, events) = crossbeam_channel::bounded(CAPTURE_QUEUE_CHUNKS);
        (
            Self {
                sample_rate,
                events,
            },
            SampleFeeder { sender },
        )
    }
}

impl CaptureSource for ChannelCapture {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn events(&self) -> &Receiver<CaptureEvent> {
        &self.events
    }

    fn release(&mut self) -> anyhow::Result<()> {
        Ok(())
    }
}

impl SampleFeeder {
    /// Feeds `f32` samples in [-1, 1].
    ///
    /// # Errors
    /// * `Device` once the consuming engine has gone away
    pub fn feed(&self, samples: &[f32]) -> Result<()> {
        self.send(CaptureEvent::Samples(samples.to_vec()))
    }

    /// Feeds signed 16-bit PCM samples.
    pub fn feed_i16(&self, pcm: &[i16]) -> Result<()> {
        self.send(CaptureEvent::Samples(samples_from_i16(pcm)))
    }

    /// Reports a device failure; the engine stops with a failed status.
    pub fn fail(&self, message: impl Into<String>) -> Result<()> {
        self.send(CaptureEvent::Failed(message.into()))
    }

    /// Ends the stream.
    pub fn close(self) {}

    fn send(&self, event: CaptureEvent) -> Result<()> {
        self.sender
            .send(event)
            .map_err(|_| TunerError::Device("capture consumer disconnected".into()))
    }
}
