// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! Procedural synthesis of switch click waveforms.
//!
//! Each click is a decaying fundamental with two harmonics, optionally topped with a short
//! burst of noise that models the mechanical contact of the switch. Buffers are rendered
//! once, ahead of playback, and never mutated afterwards.

use std::f32::consts::PI;
use std::time::Duration;

use rand::Rng;

/// The sample rate of every synthesized buffer.
pub const SAMPLE_RATE: u32 = 44_100;

/// The channel count of every synthesized buffer. Content is mono, duplicated to stereo.
pub const CHANNEL_COUNT: u16 = 2;

/// Exponential decay rate of the amplitude envelope over the normalized buffer length.
const DECAY_RATE: f32 = 5.0;

/// (frequency multiple, weight) pairs for the fundamental and its harmonics.
const PARTIALS: [(f32, f32); 3] = [(1.0, 1.0), (2.0, 0.3), (3.0, 0.15)];

/// Portion of the buffer, as normalized time, that carries the click transient.
const CLICK_WINDOW: f32 = 0.1;

/// Gain applied to the click transient noise.
const CLICK_GAIN: f32 = 0.2;

/// Errors produced while synthesizing a buffer.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SynthError {
    #[error("invalid synthesis parameter {name}: {value}")]
    InvalidParameter { name: &'static str, value: f32 },
}

/// The acoustic parameters of a single click.
///
/// A `SynthParams` obtained through [`SynthParams::new`] is always valid, which makes
/// rendering it infallible.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SynthParams {
    frequency: f32,
    duration: f32,
    amplitude: f32,
    clickiness: f32,
}

impl SynthParams {
    /// Creates validated synthesis parameters.
    pub fn new(
        frequency: f32,
        duration: f32,
        amplitude: f32,
        clickiness: f32,
    ) -> Result<SynthParams, SynthError> {
        let params = SynthParams {
            frequency,
            duration,
            amplitude,
            clickiness,
        };
        params.validate()?;
        Ok(params)
    }

    /// Builds parameters for the built-in preset table without validation. Every preset is
    /// checked by the profile library tests.
    pub(crate) const fn preset(
        frequency: f32,
        duration: f32,
        amplitude: f32,
        clickiness: f32,
    ) -> SynthParams {
        SynthParams {
            frequency,
            duration,
            amplitude,
            clickiness,
        }
    }

    /// Checks that the parameters describe a renderable, non-empty buffer.
    pub fn validate(&self) -> Result<(), SynthError> {
        if !(self.frequency.is_finite() && self.frequency > 0.0) {
            return Err(SynthError::InvalidParameter {
                name: "frequency",
                value: self.frequency,
            });
        }
        if !(self.duration.is_finite() && self.duration > 0.0) || self.frame_count() == 0 {
            return Err(SynthError::InvalidParameter {
                name: "duration",
                value: self.duration,
            });
        }
        if !(0.0..=1.0).contains(&self.amplitude) {
            return Err(SynthError::InvalidParameter {
                name: "amplitude",
                value: self.amplitude,
            });
        }
        if !(0.0..=1.0).contains(&self.clickiness) {
            return Err(SynthError::InvalidParameter {
                name: "clickiness",
                value: self.clickiness,
            });
        }
        Ok(())
    }

    /// Fundamental frequency in Hz.
    pub fn frequency(&self) -> f32 {
        self.frequency
    }

    /// Buffer duration in seconds.
    pub fn duration(&self) -> f32 {
        self.duration
    }

    /// Peak amplitude of the envelope.
    pub fn amplitude(&self) -> f32 {
        self.amplitude
    }

    /// Weight of the noise transient.
    pub fn clickiness(&self) -> f32 {
        self.clickiness
    }

    /// The number of frames a buffer rendered from these parameters will have.
    pub fn frame_count(&self) -> usize {
        (f64::from(SAMPLE_RATE) * f64::from(self.duration)).round() as usize
    }
}

/// An immutable, interleaved PCM buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct SoundBuffer {
    samples: Vec<f32>,
    channel_count: u16,
    sample_rate: u32,
}

impl SoundBuffer {
    /// Wraps interleaved samples. Trailing samples that don't fill a whole frame are dropped.
    pub fn from_interleaved(mut samples: Vec<f32>, channel_count: u16, sample_rate: u32) -> Self {
        let channels = usize::from(channel_count.max(1));
        samples.truncate(samples.len() / channels * channels);
        SoundBuffer {
            samples,
            channel_count: channel_count.max(1),
            sample_rate,
        }
    }

    /// The number of frames (samples per channel).
    pub fn frames(&self) -> usize {
        self.samples.len() / usize::from(self.channel_count)
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn channel_count(&self) -> u16 {
        self.channel_count
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// All samples, interleaved.
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    /// The samples of a single frame, one per channel.
    pub fn frame(&self, index: usize) -> Option<&[f32]> {
        let channels = usize::from(self.channel_count);
        self.samples.get(index * channels..(index + 1) * channels)
    }

    /// Iterates over the samples of one channel.
    pub fn channel(&self, channel: u16) -> impl Iterator<Item = f32> + '_ {
        self.samples
            .iter()
            .skip(usize::from(channel))
            .step_by(usize::from(self.channel_count))
            .copied()
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.frames() as f64 / f64::from(self.sample_rate))
    }

    /// Memory held by the sample data, in bytes.
    pub fn memory_size(&self) -> usize {
        self.samples.len() * std::mem::size_of::<f32>()
    }
}

/// The amplitude envelope at the given normalized time (0.0 at the start of the buffer, 1.0
/// at its end).
pub fn envelope(amplitude: f32, normalized_time: f32) -> f32 {
    amplitude * (-DECAY_RATE * normalized_time).exp()
}

/// Synthesizes a click from raw parameters.
pub fn synthesize(
    frequency: f32,
    duration: f32,
    amplitude: f32,
    clickiness: f32,
) -> Result<SoundBuffer, SynthError> {
    Ok(render(&SynthParams::new(
        frequency, duration, amplitude, clickiness,
    )?))
}

/// Renders validated parameters into a stereo buffer.
///
/// The tonal part is deterministic. When clickiness is non-zero the first tenth of the
/// buffer also receives uniform noise, so two renders of the same parameters differ there.
pub fn render(params: &SynthParams) -> SoundBuffer {
    let frames = params.frame_count();
    let channels = usize::from(CHANNEL_COUNT);
    let sample_rate = SAMPLE_RATE as f32;
    let mut rng = rand::thread_rng();
    let mut samples = Vec::with_capacity(frames * channels);

    for frame in 0..frames {
        let time = frame as f32 / sample_rate;
        let normalized_time = time / params.duration;
        let env = envelope(params.amplitude, normalized_time);

        let mut value: f32 = PARTIALS
            .iter()
            .map(|(multiple, weight)| weight * (2.0 * PI * params.frequency * multiple * time).sin())
            .sum::<f32>()
            * env;

        if params.clickiness > 0.0 && normalized_time < CLICK_WINDOW {
            let click_env = params.clickiness * (1.0 - normalized_time / CLICK_WINDOW);
            value += rng.gen_range(-1.0f32..=1.0) * click_env * CLICK_GAIN;
        }

        for _ in 0..channels {
            samples.push(value);
        }
    }

    SoundBuffer {
        samples,
        channel_count: CHANNEL_COUNT,
        sample_rate: SAMPLE_RATE,
    }
}
