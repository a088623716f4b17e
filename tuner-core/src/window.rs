//! # Framing Module
//!
//! Turns a continuous stream of samples into fixed-size analysis frames.
//! Frames overlap when the hop is smaller than the frame; a frame is only
//! ever produced whole, so the tail of a closed stream that does not fill a
//! frame is dropped.

use crossbeam_channel::Receiver;

use crate::config::EngineConfig;
use crate::error::{Result, TunerError};

/// One analysis frame: `f32` samples in [-1, 1] plus the rate they were
/// captured at.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    samples: Vec<f32>,
    sample_rate: u32,
}

impl AudioFrame {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Accumulates pushed samples and hands out overlapping frames.
#[derive(Debug, Clone)]
pub struct Windower {
    frame_size: usize,
    hop_size: usize,
    sample_rate: u32,
    buffer: Vec<f32>,
}

impl Windower {
    /// Creates a windower producing `frame_size`-sample frames every
    /// `hop_size` samples.
    ///
    /// # Errors
    /// * `InvalidConfig` if either size is zero or the hop exceeds the frame.
    pub fn new(frame_size: usize, hop_size: usize, sample_rate: u32) -> Result<Self> {
        if frame_size == 0 {
            return Err(TunerError::config("frame_size must be positive"));
        }
        if hop_size == 0 {
            return Err(TunerError::config("hop_size must be positive"));
        }
        if hop_size > frame_size {
            return Err(TunerError::config(format!(
                "hop_size ({hop_size}) must not exceed frame_size ({frame_size})"
            )));
        }
        Ok(Self {
            frame_size,
            hop_size,
            sample_rate,
            buffer: Vec::with_capacity(frame_size * 2),
        })
    }

    pub fn from_config(config: &EngineConfig) -> Result<Self> {
        Self::new(config.frame_size, config.hop_size, config.sample_rate)
    }

    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    pub fn hop_size(&self) -> usize {
        self.hop_size
    }

    /// Number of samples waiting to be framed.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Appends samples to the internal buffer.
    pub fn push(&mut self, samples: &[f32]) {
        self.buffer.extend_from_slice(samples);
    }

    /// Returns the next full frame, or `None` if fewer than `frame_size`
    /// samples are buffered.
    pub fn next_frame(&mut self) -> Option<AudioFrame> {
        if self.buffer.len() < self.frame_size {
            return None;
        }
        let frame = self.buffer[..self.frame_size].to_vec();
        self.buffer.drain(..self.hop_size);
        Some(AudioFrame::new(frame, self.sample_rate))
    }

    /// Drops everything buffered so a new stream starts from a clean slate.
    pub fn reset(&mut self) {
        self.buffer.clear();
    }

    /// Blocking iterator of frames read from a sample channel.
    ///
    /// Waits for chunks whenever the buffer cannot fill a frame. Once the
    /// channel disconnects the remaining full frames are yielded and the
    /// iterator ends.
    pub fn frames<'a>(&'a mut self, receiver: &'a Receiver<Vec<f32>>) -> Frames<'a> {
        Frames {
            windower: self,
            receiver,
            closed: false,
        }
    }
}

/// Iterator returned by [`Windower::frames`].
pub struct Frames<'a> {
    windower: &'a mut Windower,
    receiver: &'a Receiver<Vec<f32>>,
    closed: bool,
}

impl Iterator for Frames<'_> {
    type Item = AudioFrame;

    fn next(&mut self) -> Option<AudioFrame> {
        loop {
            if let Some(frame) = self.windower.next_frame() {
                return Some(frame);
            }
            if self.closed {
                return None;
            }
            match self.receiver.recv() {
                Ok(chunk) => self.windower.push(&chunk),
                Err(_) => self.closed = true,
            }
        }
    }
}
