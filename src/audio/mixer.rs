// Copyright (C) 2025 Michael Wilson <mike@mdwn.dev>
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
// Render-side voice mixing that can be used by both CPAL and test implementations
use std::sync::Arc;

use crate::playback::{PendingStart, VoiceStatus};
use crate::random::cents_to_rate;
use crate::settings::Settings;
use crate::synth::SoundBuffer;

/// The render state of a buffer playing on a voice.
struct Playing {
    buffer: Arc<SoundBuffer>,
    generation: u64,
    /// Fractional read position in buffer frames.
    position: f64,
    /// Buffer frames advanced per output frame.
    step: f64,
}

/// A voice as seen by the render thread.
struct RenderVoice {
    status: Arc<VoiceStatus>,
    playing: Option<Playing>,
    pitch_cents: f32,
}

/// Mixes the voice pool's voices into an interleaved output buffer.
///
/// The mixer is owned by the render thread. Starts are picked up from each voice's pending
/// slot and the volume is read from the shared settings once per block, so nothing here
/// waits on the event thread.
pub struct VoiceMixer {
    voices: Vec<RenderVoice>,
    settings: Arc<Settings>,
    num_channels: u16,
    sample_rate: u32,
}

impl VoiceMixer {
    /// Creates a mixer for the given voice statuses, in slot order. The output defaults to
    /// stereo at the synthesis sample rate until the device configures it.
    pub fn new(statuses: Vec<Arc<VoiceStatus>>, settings: Arc<Settings>) -> Self {
        Self {
            voices: statuses
                .into_iter()
                .map(|status| RenderVoice {
                    status,
                    playing: None,
                    pitch_cents: 0.0,
                })
                .collect(),
            settings,
            num_channels: crate::synth::CHANNEL_COUNT,
            sample_rate: crate::synth::SAMPLE_RATE,
        }
    }

    /// Sets the output format.
    pub fn configure(&mut self, num_channels: u16, sample_rate: u32) {
        self.num_channels = num_channels.max(1);
        self.sample_rate = sample_rate.max(1);
        for voice in self.voices.iter_mut() {
            let pitch_cents = voice.pitch_cents;
            let sample_rate = self.sample_rate;
            if let Some(playing) = voice.playing.as_mut() {
                playing.step = Self::step(&playing.buffer, pitch_cents, sample_rate);
            }
        }
    }

    /// Gets the output sample rate
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Returns the number of voices currently rendering.
    pub fn active_count(&self) -> usize {
        self.voices.iter().filter(|v| v.playing.is_some()).count()
    }

    fn step(buffer: &SoundBuffer, pitch_cents: f32, output_rate: u32) -> f64 {
        cents_to_rate(pitch_cents) * f64::from(buffer.sample_rate()) / f64::from(output_rate)
    }

    /// Starts the pending triggers of all voices. A busy voice is cut and retargeted.
    fn start_pending(&mut self) {
        let sample_rate = self.sample_rate;
        for voice in self.voices.iter_mut() {
            let Some(PendingStart {
                generation,
                buffer,
                pitch_cents,
            }) = voice.status.take_pending()
            else {
                continue;
            };

            voice.pitch_cents = pitch_cents;
            voice.playing = Some(Playing {
                step: Self::step(&buffer, pitch_cents, sample_rate),
                buffer,
                generation,
                position: 0.0,
            });
        }
    }

    /// Mixes into the interleaved output. The output is overwritten; trailing samples that
    /// don't fill a whole frame are zeroed.
    pub fn process_into_output(&mut self, output: &mut [f32]) {
        self.start_pending();
        output.fill(0.0);

        let channels = usize::from(self.num_channels);
        let frames = output.len() / channels;

        for voice in self.voices.iter_mut() {
            let Some(playing) = voice.playing.as_mut() else {
                continue;
            };

            let buffer = &playing.buffer;
            let buffer_frames = buffer.frames();
            let buffer_channels = usize::from(buffer.channel_count());
            let samples = buffer.samples();
            let mapped = channels.min(buffer_channels);

            for frame in 0..frames {
                let index = playing.position as usize;
                if index >= buffer_frames {
                    break;
                }
                let frac = (playing.position - index as f64) as f32;
                let next = (index + 1).min(buffer_frames - 1);

                let out = &mut output[frame * channels..frame * channels + mapped];
                for (channel, sample) in out.iter_mut().enumerate() {
                    let a = samples[index * buffer_channels + channel];
                    let b = samples[next * buffer_channels + channel];
                    *sample += a + (b - a) * frac;
                }
                playing.position += playing.step;
            }

            if playing.position as usize >= buffer_frames {
                voice.status.release(playing.generation);
                voice.playing = None;
            }
        }

        let gain = self.settings.gain();
        for sample in output.iter_mut() {
            *sample = (*sample * gain).clamp(-1.0, 1.0);
        }
    }

    /// Mixes the given number of frames into a new buffer.
    pub fn process_frames(&mut self, num_frames: usize) -> Vec<f32> {
        let mut frames = vec![0.0; num_frames * usize::from(self.num_channels)];
        self.process_into_output(&mut frames);
        frames
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_mixer(voices: usize, volume: u8) -> (VoiceMixer, Vec<Arc<VoiceStatus>>) {
        let statuses: Vec<_> = (0..voices).map(|_| Arc::new(VoiceStatus::new())).collect();
        let settings = Arc::new(Settings::new(true, volume, "Default"));
        (VoiceMixer::new(statuses.clone(), settings), statuses)
    }

    fn start(
        statuses: &[Arc<VoiceStatus>],
        voice: usize,
        generation: u64,
        buffer: Arc<SoundBuffer>,
    ) {
        statuses[voice].schedule(PendingStart {
            generation,
            buffer,
            pitch_cents: 0.0,
        });
    }

    #[test]
    fn test_basic_mixing() {
        let (mut mixer, statuses) = create_mixer(2, 100);
        let buffer = Arc::new(SoundBuffer::from_interleaved(
            vec![0.5, 0.5, 0.8, 0.8],
            2,
            44100,
        ));
        start(&statuses, 0, 1, buffer);

        let frames = mixer.process_frames(3);
        assert_eq!(frames, vec![0.5, 0.5, 0.8, 0.8, 0.0, 0.0]);
        assert!(!statuses[0].is_busy());
        assert_eq!(mixer.active_count(), 0);
    }

    #[test]
    fn test_multiple_voice_mixing() {
        let (mut mixer, statuses) = create_mixer(2, 100);
        let first = Arc::new(SoundBuffer::from_interleaved(vec![0.5, 0.25], 2, 44100));
        let second = Arc::new(SoundBuffer::from_interleaved(vec![0.25, 0.125], 2, 44100));
        start(&statuses, 0, 1, first);
        start(&statuses, 1, 2, second);

        let frame = mixer.process_frames(1);
        assert_eq!(frame, vec![0.75, 0.375]);
    }

    #[test]
    fn test_volume_applies_to_mix() {
        let (mut mixer, statuses) = create_mixer(1, 50);
        let buffer = Arc::new(SoundBuffer::from_interleaved(vec![0.5; 8], 2, 44100));
        start(&statuses, 0, 1, buffer);

        assert_eq!(mixer.process_frames(1), vec![0.25, 0.25]);

        // Volume changes reach voices that are already rendering.
        mixer.settings.set_volume(100);
        assert_eq!(mixer.process_frames(1), vec![0.5, 0.5]);
        mixer.settings.set_volume(0);
        assert_eq!(mixer.process_frames(1), vec![0.0, 0.0]);
    }

    #[test]
    fn test_output_is_clamped() {
        let (mut mixer, statuses) = create_mixer(3, 100);
        for voice in 0..3 {
            let buffer = Arc::new(SoundBuffer::from_interleaved(vec![0.5, -0.5], 2, 44100));
            start(&statuses, voice, voice as u64 + 1, buffer);
        }
        assert_eq!(mixer.process_frames(1), vec![1.0, -1.0]);
    }

    #[test]
    fn test_retarget_cuts_previous_buffer() {
        let (mut mixer, statuses) = create_mixer(1, 100);
        let long = Arc::new(SoundBuffer::from_interleaved(vec![0.1; 200], 2, 44100));
        let short = Arc::new(SoundBuffer::from_interleaved(vec![0.7, 0.7], 2, 44100));
        start(&statuses, 0, 1, long);
        assert_eq!(mixer.process_frames(1), vec![0.1, 0.1]);

        start(&statuses, 0, 2, short);
        assert_eq!(mixer.process_frames(2), vec![0.7, 0.7, 0.0, 0.0]);
        assert!(!statuses[0].is_busy());
    }

    #[test]
    fn test_only_latest_pending_start_plays() {
        let (mut mixer, statuses) = create_mixer(1, 100);
        let first = Arc::new(SoundBuffer::from_interleaved(vec![0.25, 0.25], 2, 44100));
        let second = Arc::new(SoundBuffer::from_interleaved(vec![0.5, 0.5], 2, 44100));
        start(&statuses, 0, 1, first);
        start(&statuses, 0, 2, second);

        assert_eq!(mixer.process_frames(2), vec![0.5, 0.5, 0.0, 0.0]);
        assert!(!statuses[0].is_busy());
    }

    #[test]
    fn test_stale_completion_keeps_voice_busy() {
        let (mut mixer, statuses) = create_mixer(1, 100);
        let buffer = Arc::new(SoundBuffer::from_interleaved(vec![0.2, 0.2], 2, 44100));
        start(&statuses, 0, 1, buffer);

        // A new trigger claims the voice before its start is picked up.
        statuses[0].claim(2);
        mixer.process_frames(2);
        assert!(statuses[0].is_busy());
    }

    #[test]
    fn test_sample_rate_conversion() {
        let (mut mixer, statuses) = create_mixer(1, 100);
        mixer.configure(1, 88200);
        let buffer = Arc::new(SoundBuffer::from_interleaved(
            vec![0.0, 0.0, 1.0, 1.0],
            2,
            44100,
        ));
        start(&statuses, 0, 1, buffer);

        // Twice the output rate reads each buffer frame twice, interpolating in between.
        let frames = mixer.process_frames(4);
        assert_eq!(frames, vec![0.0, 0.5, 1.0, 1.0]);
    }

    #[test]
    fn test_pitch_shortens_playback() {
        let (mut mixer, statuses) = create_mixer(1, 100);
        let buffer = Arc::new(SoundBuffer::from_interleaved(vec![0.1; 2000], 2, 44100));
        statuses[0].schedule(PendingStart {
            generation: 1,
            buffer,
            pitch_cents: 1200.0,
        });

        // One octave up plays the 1000 frame buffer in 500 output frames.
        mixer.process_frames(499);
        assert!(statuses[0].is_busy());
        mixer.process_frames(1);
        assert!(!statuses[0].is_busy());
    }
}
