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
use std::{fmt, sync::Arc};

use crate::config;

pub mod cpal;
pub mod error;
pub mod mixer;
pub mod mock;

pub use error::AudioError;
pub use mixer::VoiceMixer;

/// An audio output that renders a voice mixer.
pub trait Device: fmt::Display + std::marker::Send + std::marker::Sync {
    /// Starts rendering the given mixer. The mixer moves to the device's render thread.
    fn start(&self, mixer: VoiceMixer) -> Result<(), AudioError>;

    /// Stops rendering. Anything still playing is cut off.
    fn stop(&self);
}

/// Lists output devices known to cpal.
pub fn list_devices() -> Result<Vec<Box<dyn Device>>, AudioError> {
    cpal::Device::list()
}

/// Gets the output device named by the configuration.
pub fn get_device(config: &config::Audio) -> Result<Arc<dyn Device>, AudioError> {
    let device = config.device();
    if device.starts_with("mock") {
        return Ok(Arc::new(mock::Device::get(device)));
    };

    Ok(Arc::new(cpal::Device::get(device)?))
}
