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
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use crossbeam_channel::{Receiver, Sender};
use parking_lot::{Mutex, RwLock};
use tracing::debug;

/// The maximum volume.
pub const MAX_VOLUME: u8 = 100;

/// A change published to settings subscribers.
#[derive(Debug, Clone, PartialEq)]
pub enum SettingsChange {
    Enabled(bool),
    Volume(u8),
    Profile(String),
}

/// Live user settings, shared between the event thread, the render thread and whatever
/// thread handles user input. Scalars are atomics so readers on the render path never wait.
pub struct Settings {
    enabled: AtomicBool,
    volume: AtomicU8,
    profile: RwLock<String>,
    subscribers: Mutex<Vec<Sender<SettingsChange>>>,
}

impl Settings {
    /// Creates new settings. Volume is clamped to [0, 100].
    pub fn new(enabled: bool, volume: u8, profile: &str) -> Settings {
        Settings {
            enabled: AtomicBool::new(enabled),
            volume: AtomicU8::new(volume.min(MAX_VOLUME)),
            profile: RwLock::new(profile.to_string()),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    pub fn set_enabled(&self, enabled: bool) {
        if self.enabled.swap(enabled, Ordering::AcqRel) != enabled {
            self.publish(SettingsChange::Enabled(enabled));
        }
    }

    /// Flips the enabled flag and returns the new value.
    pub fn toggle(&self) -> bool {
        let enabled = !self.enabled.fetch_xor(true, Ordering::AcqRel);
        self.publish(SettingsChange::Enabled(enabled));
        enabled
    }

    /// The volume in [0, 100].
    pub fn volume(&self) -> u8 {
        self.volume.load(Ordering::Relaxed)
    }

    pub fn set_volume(&self, volume: u8) {
        let volume = volume.min(MAX_VOLUME);
        if self.volume.swap(volume, Ordering::Relaxed) != volume {
            self.publish(SettingsChange::Volume(volume));
        }
    }

    /// The volume as a linear gain in [0.0, 1.0].
    pub fn gain(&self) -> f32 {
        f32::from(self.volume()) / f32::from(MAX_VOLUME)
    }

    /// The selected profile name.
    pub fn profile(&self) -> String {
        self.profile.read().clone()
    }

    pub fn set_profile(&self, profile: &str) {
        {
            let mut current = self.profile.write();
            if *current == profile {
                return;
            }
            *current = profile.to_string();
        }
        self.publish(SettingsChange::Profile(profile.to_string()));
    }

    /// Returns a receiver for all subsequent changes.
    pub fn subscribe(&self) -> Receiver<SettingsChange> {
        let (tx, rx) = crossbeam_channel::unbounded();
        self.subscribers.lock().push(tx);
        rx
    }

    fn publish(&self, change: SettingsChange) {
        debug!(change = ?change, "Settings changed");
        // Subscribers that hung up are dropped.
        self.subscribers
            .lock()
            .retain(|tx| tx.send(change.clone()).is_ok());
    }
}

impl std::fmt::Debug for Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Settings")
            .field("enabled", &self.is_enabled())
            .field("volume", &self.volume())
            .field("profile", &self.profile())
            .finish()
    }
}
