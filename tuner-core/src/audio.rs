//! # Audio Capture Module
//!
//! Real-time microphone capture using CPAL (Cross-Platform Audio Library).
//! The stream callback only forwards raw chunks; framing and analysis happen
//! on the engine worker.
//!
//! ## Features
//! - Default input device selection
//! - Closest supported sample rate to the requested one
//! - Mono down-mixing for multi-channel devices
//! - Device errors forwarded to the engine as [`CaptureEvent::Failed`]

use anyhow::{Result, anyhow};
use cpal::SupportedStreamConfigRange;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::{Receiver, Sender, TrySendError};

use crate::capture::{CAPTURE_QUEUE_CHUNKS, CaptureEvent, CaptureSource};

/// Microphone capture through the default CPAL host.
///
/// `cpal::Stream` is not `Send` on every platform, so this must be opened on
/// the thread that drives it (the engine worker does exactly that).
pub struct CpalCapture {
    stream: Option<cpal::Stream>,
    sample_rate: u32,
    events: Receiver<CaptureEvent>,
}

impl CpalCapture {
    /// Opens the default input device near `target_rate` and starts it.
    ///
    /// # Returns
    /// * `Ok(capture)` - Running stream
    /// * `Err(e)` - No device, no `f32` input format, or the stream failed to start
    pub fn open(target_rate: u32) -> Result<Self> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or_else(|| anyhow!("No input device available"))?;

        let name = device.name()?;
        tracing::info!(device = %name, "using audio input device");

        let configs = device.supported_input_configs()?.collect::<Vec<_>>();
        let supported_config = find_supported_config(configs, target_rate)
            .ok_or_else(|| anyhow!("No suitable f32 input format found"))?;

        let rate = target_rate.clamp(
            supported_config.min_sample_rate().0,
            supported_config.max_sample_rate().0,
        );
        let config = supported_config.with_sample_rate(cpal::SampleRate(rate));
        let channels = usize::from(config.channels()).max(1);
        let config: cpal::StreamConfig = config.into();

        if rate != target_rate {
            tracing::warn!(
                requested = target_rate,
                selected = rate,
                "sample rate differs from request"
            );
        }
        tracing::info!(sample_rate = rate, channels, "selected input format");

        let (sender, events) = crossbeam_channel::bounded(CAPTURE_QUEUE_CHUNKS);
        let error_sender = sender.clone();
        let stream = device.build_input_stream(
            &config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                forward_chunk(&sender, data, channels);
            },
            move |err| {
                tracing::error!(%err, "an error occurred on the audio stream");
                if let Err(TrySendError::Full(_)) =
                    error_sender.try_send(CaptureEvent::Failed(err.to_string()))
                {
                    tracing::warn!("capture queue full, device error not delivered");
                }
            },
            None,
        )?;

        stream.play()?;

        Ok(Self {
            stream: Some(stream),
            sample_rate: rate,
            events,
        })
    }
}

impl CaptureSource for CpalCapture {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn events(&self) -> &Receiver<CaptureEvent> {
        &self.events
    }

    fn release(&mut self) -> anyhow::Result<()> {
        if let Some(stream) = self.stream.take() {
            stream.pause()?;
            drop(stream);
            tracing::debug!("audio stream released");
        }
        Ok(())
    }
}

/// Queues one callback's worth of samples, down-mixed to mono.
///
/// Never blocks the audio thread: when the worker has fallen behind and the
/// queue is full, the chunk is dropped.
fn forward_chunk(sender: &Sender<CaptureEvent>, data: &[f32], channels: usize) {
    let mono = if channels == 1 {
        data.to_vec()
    } else {
        data.chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
            .collect()
    };
    match sender.try_send(CaptureEvent::Samples(mono)) {
        Ok(()) => {}
        Err(TrySendError::Full(_)) => tracing::trace!("capture queue full, dropping chunk"),
        // The worker may already be gone during shutdown.
        Err(TrySendError::Disconnected(_)) => {}
    }
}

/// Finds the best supported input configuration for the target sample rate.
///
/// Prefers `f32` mono, falls back to `f32` with any channel count, and among
/// those picks the range closest to `target_rate`.
fn find_supported_config(
    configs: Vec<SupportedStreamConfigRange>,
    target_rate: u32,
) -> Option<SupportedStreamConfigRange> {
    let distance = |c: &SupportedStreamConfigRange| {
        let min = c.min_sample_rate().0;
        let max = c.max_sample_rate().0;
        if (min..=max).contains(&target_rate) {
            0
        } else {
            min.abs_diff(target_rate).min(max.abs_diff(target_rate))
        }
    };
    configs
        .into_iter()
        .filter(|c| c.sample_format() == cpal::SampleFormat::F32)
        .min_by_key(|c| (c.channels() != 1, distance(c)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forwards_mono_unchanged() {
        let (tx, rx) = crossbeam_channel::unbounded();
        forward_chunk(&tx, &[0.1, 0.2, 0.3], 1);
        assert_eq!(rx.recv().unwrap(), CaptureEvent::Samples(vec![0.1, 0.2, 0.3]));
    }

    #[test]
    fn drops_chunks_when_the_queue_is_full() {
        let (tx, rx) = crossbeam_channel::bounded(1);
        forward_chunk(&tx, &[0.1], 1);
        forward_chunk(&tx, &[0.2], 1);
        assert_eq!(rx.len(), 1);
        assert_eq!(rx.recv().unwrap(), CaptureEvent::Samples(vec![0.1]));

        drop(rx);
        forward_chunk(&tx, &[0.3], 1);
    }

    #[test]
    fn down_mixes_interleaved_stereo() {
        let (tx, rx) = crossbeam_channel::unbounded();
        forward_chunk(&tx, &[0.2, 0.4, -1.0, 1.0], 2);
        match rx.recv().unwrap() {
            CaptureEvent::Samples(mono) => {
                assert_eq!(mono.len(), 2);
                assert!((mono[0] - 0.3).abs() < 1e-6);
                assert_eq!(mono[1], 0.0);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }
}
