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
use serde::Deserialize;

use crate::playback::DEFAULT_VOICE_COUNT;

/// A YAML representation of the audio configuration.
#[derive(Deserialize, Clone, Debug)]
pub struct Audio {
    /// The audio device. "default" for the default output, a cpal device name, or a name
    /// starting with "mock" for a device that discards its output.
    #[serde(default = "default_device")]
    device: String,

    /// The number of voices in the pool (default: 20).
    voices: Option<usize>,
}

fn default_device() -> String {
    "default".to_string()
}

impl Audio {
    /// New will create a new Audio configuration.
    pub fn new(device: &str) -> Audio {
        Audio {
            device: device.to_string(),
            voices: None,
        }
    }

    /// Returns the device from the configuration.
    pub fn device(&self) -> &str {
        &self.device
    }

    /// Returns the number of voices, at least one.
    pub fn voices(&self) -> usize {
        self.voices.unwrap_or(DEFAULT_VOICE_COUNT).max(1)
    }
}

impl Default for Audio {
    fn default() -> Self {
        Audio::new(&default_device())
    }
}
