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

//! The voice pool: voice selection, pitch randomization and scheduling.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, span, Level};

use super::voice::VoiceManager;
use super::{Playback, PlaybackError, PlaybackRequest};
use crate::audio::{self, VoiceMixer};
use crate::random::{ratio_to_cents, Randomizer};
use crate::settings::Settings;
use crate::synth::SoundBuffer;

/// A fixed set of voices rendering through an audio device.
pub struct VoicePool {
    /// Voice allocation state. Only held for the duration of an allocation.
    manager: Mutex<VoiceManager>,
    /// Set once the output is stopped.
    stopped: AtomicBool,
    /// The device rendering the voices.
    device: Arc<dyn audio::Device>,
    randomizer: Arc<dyn Randomizer>,
}

impl VoicePool {
    /// Creates a pool with the given number of voices and starts rendering on the device.
    pub fn new(
        device: Arc<dyn audio::Device>,
        voice_count: usize,
        settings: Arc<Settings>,
        randomizer: Arc<dyn Randomizer>,
    ) -> Result<VoicePool, PlaybackError> {
        let span = span!(Level::INFO, "voice pool");
        let _enter = span.enter();

        let manager = VoiceManager::new(voice_count);
        let mixer = VoiceMixer::new(manager.statuses(), settings);

        device
            .start(mixer)
            .map_err(PlaybackError::AudioBackendInitFailure)?;

        info!(
            device = device.to_string(),
            voices = manager.len(),
            "Voice pool started."
        );

        Ok(VoicePool {
            manager: Mutex::new(manager),
            stopped: AtomicBool::new(false),
            device,
            randomizer,
        })
    }

    /// Returns the number of voices.
    pub fn voice_count(&self) -> usize {
        self.manager.lock().len()
    }

    /// Returns the number of busy voices.
    pub fn active_voices(&self) -> usize {
        self.manager.lock().active_count()
    }

    /// The buffer most recently assigned to the given voice.
    pub fn voice_buffer(&self, index: usize) -> Option<Arc<SoundBuffer>> {
        self.manager
            .lock()
            .voice(index)
            .and_then(|voice| voice.buffer().cloned())
    }

    /// The pitch offset most recently applied to the given voice.
    pub fn voice_pitch_cents(&self, index: usize) -> Option<f32> {
        self.manager.lock().voice(index).map(|voice| voice.pitch_cents())
    }

    /// Stops the audio output. Anything still playing is cut off and later triggers are
    /// dropped.
    pub fn shutdown(&self) {
        self.stopped.store(true, Ordering::Release);
        self.device.stop();

        let manager = self.manager.lock();
        for status in manager.statuses() {
            status.reset();
        }
    }
}

impl Playback for VoicePool {
    fn play(&self, request: PlaybackRequest) {
        let pitch_cents = ratio_to_cents(self.randomizer.pitch_variation());

        let mut manager = self.manager.lock();
        if self.stopped.load(Ordering::Acquire) {
            debug!("Output stopped, dropping trigger");
            return;
        }
        let allocation = manager.allocate(request.buffer, pitch_cents);
        let latency = manager
            .voice(allocation.index)
            .and_then(|voice| voice.started_at())
            .map(|started_at| started_at.saturating_duration_since(request.triggered_at));
        drop(manager);

        debug!(
            voice = allocation.index,
            stolen = allocation.stolen,
            pitch_cents,
            latency_us = latency.map(|latency| latency.as_micros() as u64),
            "Voice started"
        );
    }
}

impl Drop for VoicePool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for VoicePool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VoicePool")
            .field("device", &self.device.to_string())
            .field("voices", &*self.manager.lock())
            .finish()
    }
}
