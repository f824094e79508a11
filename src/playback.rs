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

//! Polyphonic playback of keystroke sounds.
//!
//! This module provides:
//! - A fixed pool of voices with first-idle selection and voice 0 stealing
//! - Per-trigger pitch randomization
//! - Lossless hand-off of starts to the render thread, one pending start per voice

use std::sync::Arc;
use std::time::Instant;

use crate::audio::AudioError;
use crate::synth::SoundBuffer;

mod pool;
mod voice;

pub use pool::VoicePool;
pub use voice::{PendingStart, VoiceStatus};

/// The default number of voices.
pub const DEFAULT_VOICE_COUNT: usize = 20;

/// A request to play a buffer, created for each dispatched key event.
#[derive(Clone)]
pub struct PlaybackRequest {
    pub buffer: Arc<SoundBuffer>,
    /// When the triggering key event happened.
    pub triggered_at: Instant,
}

impl PlaybackRequest {
    pub fn new(buffer: Arc<SoundBuffer>, triggered_at: Instant) -> PlaybackRequest {
        PlaybackRequest {
            buffer,
            triggered_at,
        }
    }
}

/// Something that can play buffers. Implementations must not block.
pub trait Playback: Send + Sync {
    fn play(&self, request: PlaybackRequest);
}

impl<P: Playback + ?Sized> Playback for Arc<P> {
    fn play(&self, request: PlaybackRequest) {
        (**self).play(request)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PlaybackError {
    #[error("audio backend failed to initialize: {0}")]
    AudioBackendInitFailure(#[source] AudioError),
}
