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
use std::path::Path;

use config::{Config, Environment, File};
use serde::Deserialize;

use super::audio::Audio;
use super::error::ConfigError;
use crate::profiles::DEFAULT_PROFILE;
use crate::settings::MAX_VOLUME;

const DEFAULT_VOLUME: u8 = 50;

/// The prefix of environment variables that override file values, e.g. KEYCLACK_VOLUME or
/// KEYCLACK_AUDIO__DEVICE.
pub const ENV_PREFIX: &str = "KEYCLACK";

/// The configuration for the keystroke sound engine.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct Engine {
    /// The audio configuration.
    audio: Option<Audio>,
    /// Whether sounds play at startup.
    enabled: Option<bool>,
    /// The volume at startup, 0-100.
    volume: Option<u8>,
    /// The profile selected at startup.
    profile: Option<String>,
}

impl Engine {
    /// Parses the configuration from a YAML file. Environment overrides apply on top.
    pub fn deserialize(path: &Path) -> Result<Engine, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }

        Ok(Config::builder()
            .add_source(File::from(path))
            .add_source(Self::environment())
            .build()?
            .try_deserialize::<Engine>()?)
    }

    /// Builds the configuration from environment overrides alone.
    pub fn from_env() -> Result<Engine, ConfigError> {
        Ok(Config::builder()
            .add_source(Self::environment())
            .build()?
            .try_deserialize::<Engine>()?)
    }

    fn environment() -> Environment {
        Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true)
    }

    /// Returns the audio configuration.
    pub fn audio(&self) -> Audio {
        self.audio.clone().unwrap_or_default()
    }

    /// Returns whether sounds play at startup (default: true).
    pub fn enabled(&self) -> bool {
        self.enabled.unwrap_or(true)
    }

    /// Returns the startup volume (default: 50).
    pub fn volume(&self) -> u8 {
        self.volume.unwrap_or(DEFAULT_VOLUME).min(MAX_VOLUME)
    }

    /// Returns the startup profile name (default: "Default").
    pub fn profile(&self) -> &str {
        self.profile.as_deref().unwrap_or(DEFAULT_PROFILE)
    }
}
