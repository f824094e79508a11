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

//! Voice slots and the allocation policy.
//!
//! Handles voice selection, stealing, and the busy status shared with the render thread.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crossbeam_utils::atomic::AtomicCell;
use tracing::debug;

use crate::synth::SoundBuffer;

/// A trigger waiting for the render thread to pick it up.
pub struct PendingStart {
    pub generation: u64,
    pub buffer: Arc<SoundBuffer>,
    pub pitch_cents: f32,
}

/// Busy status of a voice, shared between the voice pool and the render thread.
///
/// Holds the generation of the trigger that currently owns the voice, or 0 when idle. The
/// render thread only clears the status if the generation it finished is still the current
/// one, so a completion racing with a new trigger can't mark the new trigger idle.
///
/// Each voice also has a single pending start slot. A newer trigger replaces a pending one
/// that the render thread hasn't picked up yet, so the hand-off never drops the latest
/// trigger and never holds more than one start per voice.
#[derive(Default)]
pub struct VoiceStatus {
    generation: AtomicU64,
    pending: AtomicCell<Option<PendingStart>>,
}

impl VoiceStatus {
    pub fn new() -> VoiceStatus {
        VoiceStatus::default()
    }

    pub fn is_busy(&self) -> bool {
        self.generation.load(Ordering::Acquire) != 0
    }

    /// Marks the voice busy on behalf of the given (non-zero) trigger generation.
    pub fn claim(&self, generation: u64) {
        self.generation.store(generation, Ordering::Release);
    }

    /// Claims the voice for the trigger and leaves it for the render thread, replacing any
    /// start still pending.
    pub fn schedule(&self, start: PendingStart) {
        self.claim(start.generation);
        self.pending.store(Some(start));
    }

    /// Takes the pending start, if any.
    pub fn take_pending(&self) -> Option<PendingStart> {
        self.pending.take()
    }

    /// Drops the pending start, if any, and marks the voice idle.
    pub fn reset(&self) {
        self.pending.take();
        self.generation.store(0, Ordering::Release);
    }

    /// Marks the voice idle if the given generation still owns it. Returns true if it did.
    pub fn release(&self, generation: u64) -> bool {
        self.generation
            .compare_exchange(generation, 0, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// The generation currently owning the voice, 0 when idle.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }
}

impl fmt::Debug for VoiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VoiceStatus")
            .field("generation", &self.generation())
            .finish()
    }
}

/// A playback slot.
pub struct Voice {
    /// Busy status, shared with the render side.
    status: Arc<VoiceStatus>,
    /// The buffer most recently assigned to this voice.
    buffer: Option<Arc<SoundBuffer>>,
    /// The pitch offset of the current assignment, in cents.
    pitch_cents: f32,
    /// When the current assignment was made.
    started_at: Option<Instant>,
}

impl Voice {
    /// Creates an idle voice.
    fn new() -> Self {
        Self {
            status: Arc::new(VoiceStatus::new()),
            buffer: None,
            pitch_cents: 0.0,
            started_at: None,
        }
    }

    pub fn is_busy(&self) -> bool {
        self.status.is_busy()
    }

    /// The buffer most recently assigned to this voice. It stays set after playback completes.
    pub fn buffer(&self) -> Option<&Arc<SoundBuffer>> {
        self.buffer.as_ref()
    }

    pub fn pitch_cents(&self) -> f32 {
        self.pitch_cents
    }

    pub fn started_at(&self) -> Option<Instant> {
        self.started_at
    }

    /// Returns a clone of this voice's status handle.
    pub fn status(&self) -> Arc<VoiceStatus> {
        self.status.clone()
    }

    fn assign(&mut self, buffer: Arc<SoundBuffer>, pitch_cents: f32, generation: u64) {
        self.status.schedule(PendingStart {
            generation,
            buffer: buffer.clone(),
            pitch_cents,
        });
        self.buffer = Some(buffer);
        self.pitch_cents = pitch_cents;
        self.started_at = Some(Instant::now());
    }
}

/// The outcome of a voice allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Allocation {
    /// The voice that was assigned.
    pub index: usize,
    /// The generation the voice was claimed with.
    pub generation: u64,
    /// True if the voice was busy and its playback was interrupted.
    pub stolen: bool,
}

/// Manages a fixed set of voices.
pub struct VoiceManager {
    /// Voices in slot order.
    voices: Vec<Voice>,
    /// The last generation handed out.
    generation: u64,
}

impl VoiceManager {
    /// Creates a voice manager with the given number of voices (at least one).
    pub fn new(voice_count: usize) -> Self {
        Self {
            voices: (0..voice_count.max(1)).map(|_| Voice::new()).collect(),
            generation: 0,
        }
    }

    /// Picks the voice for the next trigger: the first idle voice in slot order, or voice 0
    /// when every voice is busy. Returns the index and whether the voice was busy.
    pub fn select(&self) -> (usize, bool) {
        match self.voices.iter().position(|v| !v.is_busy()) {
            Some(index) => (index, false),
            None => (0, true),
        }
    }

    /// Selects a voice and assigns the buffer to it.
    pub fn allocate(&mut self, buffer: Arc<SoundBuffer>, pitch_cents: f32) -> Allocation {
        let (index, stolen) = self.select();
        self.generation += 1;
        let generation = self.generation;
        self.voices[index].assign(buffer, pitch_cents, generation);

        if stolen {
            debug!(
                voices = self.voices.len(),
                "All voices busy, stealing voice 0"
            );
        }

        Allocation {
            index,
            generation,
            stolen,
        }
    }

    pub fn voice(&self, index: usize) -> Option<&Voice> {
        self.voices.get(index)
    }

    /// Returns the status handles of all voices in slot order.
    pub fn statuses(&self) -> Vec<Arc<VoiceStatus>> {
        self.voices.iter().map(|v| v.status()).collect()
    }

    /// Returns the number of voices.
    pub fn len(&self) -> usize {
        self.voices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.voices.is_empty()
    }

    /// Returns the current number of busy voices.
    pub fn active_count(&self) -> usize {
        self.voices.iter().filter(|v| v.is_busy()).count()
    }
}

impl fmt::Debug for VoiceManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VoiceManager")
            .field("active_voices", &self.active_count())
            .field("max_voices", &self.voices.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_buffer(value: f32) -> Arc<SoundBuffer> {
        Arc::new(SoundBuffer::from_interleaved(vec![value; 8], 2, 44100))
    }

    #[test]
    fn test_first_idle_voice_in_order() {
        let mut manager = VoiceManager::new(4);

        for expected in 0..4 {
            let allocation = manager.allocate(make_buffer(0.1), 0.0);
            assert_eq!(allocation.index, expected);
            assert!(!allocation.stolen);
        }
        assert_eq!(manager.active_count(), 4);
    }

    #[test]
    fn test_steals_voice_zero_when_full() {
        let mut manager = VoiceManager::new(3);
        let buffers: Vec<_> = (0..4).map(|i| make_buffer(i as f32)).collect();

        for buffer in buffers.iter().take(3) {
            manager.allocate(buffer.clone(), 0.0);
        }

        let allocation = manager.allocate(buffers[3].clone(), 12.0);
        assert_eq!(allocation.index, 0);
        assert!(allocation.stolen);
        assert_eq!(manager.active_count(), 3);

        assert!(Arc::ptr_eq(manager.voice(0).unwrap().buffer().unwrap(), &buffers[3]));
        assert_eq!(manager.voice(0).unwrap().pitch_cents(), 12.0);
        assert!(Arc::ptr_eq(manager.voice(1).unwrap().buffer().unwrap(), &buffers[1]));
        assert!(Arc::ptr_eq(manager.voice(2).unwrap().buffer().unwrap(), &buffers[2]));
    }

    #[test]
    fn test_released_voice_is_reused() {
        let mut manager = VoiceManager::new(3);
        let allocations: Vec<_> = (0..3)
            .map(|_| manager.allocate(make_buffer(0.1), 0.0))
            .collect();

        // Completion of voice 1 frees it for the next trigger.
        assert!(manager
            .voice(1)
            .unwrap()
            .status()
            .release(allocations[1].generation));
        assert_eq!(manager.select(), (1, false));

        let allocation = manager.allocate(make_buffer(0.2), 0.0);
        assert_eq!(allocation.index, 1);
        assert!(!allocation.stolen);
    }

    #[test]
    fn test_stale_release_is_ignored() {
        let mut manager = VoiceManager::new(1);
        let first = manager.allocate(make_buffer(0.1), 0.0);
        let second = manager.allocate(make_buffer(0.2), 0.0);
        assert!(second.stolen);

        // The first trigger's completion arrives after the steal.
        let status = manager.voice(0).unwrap().status();
        assert!(!status.release(first.generation));
        assert!(status.is_busy());
        assert!(status.release(second.generation));
        assert!(!status.is_busy());
    }

    #[test]
    fn test_newer_start_replaces_pending_one() {
        let mut manager = VoiceManager::new(1);
        let first = make_buffer(0.1);
        let second = make_buffer(0.2);
        manager.allocate(first, 0.0);
        let allocation = manager.allocate(second.clone(), 30.0);

        let status = manager.voice(0).unwrap().status();
        assert_eq!(status.generation(), allocation.generation);

        let pending = status.take_pending().unwrap();
        assert_eq!(pending.generation, allocation.generation);
        assert!(Arc::ptr_eq(&pending.buffer, &second));
        assert_eq!(pending.pitch_cents, 30.0);
        assert!(status.take_pending().is_none());
    }

    #[test]
    fn test_reset_clears_pending_start() {
        let mut manager = VoiceManager::new(2);
        manager.allocate(make_buffer(0.1), 0.0);

        let status = manager.voice(0).unwrap().status();
        status.reset();
        assert!(!status.is_busy());
        assert!(status.take_pending().is_none());
        assert_eq!(manager.active_count(), 0);
    }

    #[test]
    fn test_voice_count_is_at_least_one() {
        let manager = VoiceManager::new(0);
        assert_eq!(manager.len(), 1);
        assert_eq!(manager.select(), (0, false));
    }
}
