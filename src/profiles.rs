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

//! Switch profiles: named pairs of precomputed key-down and key-up buffers.
//!
//! Profiles are synthesized on first request from a preset table and cached for the life of
//! the library. The active profile is swapped as a whole, so buffers already handed to the
//! voice pool stay valid after a switch.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tracing::{debug, info};

use crate::dispatch::KeyEventKind;
use crate::synth::{self, SoundBuffer, SynthError, SynthParams};

/// The name of the fallback profile.
pub const DEFAULT_PROFILE: &str = "Default";

/// A built-in preset entry.
struct BuiltinPreset {
    name: &'static str,
    key_down: SynthParams,
    key_up: SynthParams,
}

/// Built-in presets, in display order. Clicky switches sit high and short with a strong
/// transient, linear and tactile switches lower and longer, and the deep linears have almost
/// no transient at all. Key-up sounds carry half the key-down clickiness.
const BUILTIN_PRESETS: [BuiltinPreset; 6] = [
    BuiltinPreset {
        name: DEFAULT_PROFILE,
        key_down: SynthParams::preset(800.0, 0.05, 0.3, 0.5),
        key_up: SynthParams::preset(600.0, 0.03, 0.3, 0.5),
    },
    BuiltinPreset {
        name: "Cherry MX Blue",
        key_down: SynthParams::preset(2500.0, 0.025, 0.35, 0.8),
        key_up: SynthParams::preset(1800.0, 0.018, 0.25, 0.4),
    },
    BuiltinPreset {
        name: "Cherry MX Brown",
        key_down: SynthParams::preset(1200.0, 0.035, 0.25, 0.3),
        key_up: SynthParams::preset(900.0, 0.02, 0.18, 0.15),
    },
    BuiltinPreset {
        name: "Cherry MX Red",
        key_down: SynthParams::preset(800.0, 0.03, 0.22, 0.1),
        key_up: SynthParams::preset(600.0, 0.02, 0.15, 0.05),
    },
    BuiltinPreset {
        name: "Gateron Milky Yellow",
        key_down: SynthParams::preset(700.0, 0.035, 0.28, 0.04),
        key_up: SynthParams::preset(500.0, 0.025, 0.18, 0.02),
    },
    BuiltinPreset {
        name: "NovelKeys Cream",
        key_down: SynthParams::preset(600.0, 0.04, 0.3, 0.02),
        key_up: SynthParams::preset(450.0, 0.03, 0.2, 0.01),
    },
];

/// Synthesis parameters for one switch.
#[derive(Debug, Clone, PartialEq)]
pub struct SwitchPreset {
    name: String,
    key_down: SynthParams,
    key_up: SynthParams,
}

impl SwitchPreset {
    /// Creates a preset, rejecting parameters that can't be synthesized.
    pub fn new(
        name: &str,
        key_down: SynthParams,
        key_up: SynthParams,
    ) -> Result<SwitchPreset, SynthError> {
        key_down.validate()?;
        key_up.validate()?;
        Ok(SwitchPreset {
            name: name.to_string(),
            key_down,
            key_up,
        })
    }

    fn builtin(preset: &BuiltinPreset) -> SwitchPreset {
        SwitchPreset {
            name: preset.name.to_string(),
            key_down: preset.key_down,
            key_up: preset.key_up,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn key_down(&self) -> &SynthParams {
        &self.key_down
    }

    pub fn key_up(&self) -> &SynthParams {
        &self.key_up
    }
}

/// A fully synthesized switch profile.
#[derive(Debug)]
pub struct SoundProfile {
    name: String,
    key_down: Arc<SoundBuffer>,
    key_up: Arc<SoundBuffer>,
}

impl SoundProfile {
    /// Synthesizes both buffers of a preset.
    pub fn synthesize(preset: &SwitchPreset) -> SoundProfile {
        SoundProfile {
            name: preset.name.clone(),
            key_down: Arc::new(synth::render(&preset.key_down)),
            key_up: Arc::new(synth::render(&preset.key_up)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn key_down(&self) -> &Arc<SoundBuffer> {
        &self.key_down
    }

    pub fn key_up(&self) -> &Arc<SoundBuffer> {
        &self.key_up
    }

    /// The buffer played for the given event kind. Every key shares the same two buffers.
    pub fn buffer(&self, kind: KeyEventKind) -> &Arc<SoundBuffer> {
        match kind {
            KeyEventKind::KeyDown => &self.key_down,
            KeyEventKind::KeyUp => &self.key_up,
        }
    }

    /// Memory held by both buffers, in bytes.
    pub fn memory_size(&self) -> usize {
        self.key_down.memory_size() + self.key_up.memory_size()
    }

    /// Writes the key-down buffer, a silent gap and the key-up buffer to a 32-bit float WAV.
    pub fn write_wav(&self, path: &Path, gap: Duration) -> Result<(), hound::Error> {
        let spec = hound::WavSpec {
            channels: self.key_down.channel_count(),
            sample_rate: self.key_down.sample_rate(),
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };
        let gap_samples = (gap.as_secs_f64() * f64::from(spec.sample_rate)).round() as usize
            * usize::from(spec.channels);

        let mut writer = hound::WavWriter::create(path, spec)?;
        for sample in self.key_down.samples() {
            writer.write_sample(*sample)?;
        }
        for _ in 0..gap_samples {
            writer.write_sample(0.0f32)?;
        }
        for sample in self.key_up.samples() {
            writer.write_sample(*sample)?;
        }
        writer.finalize()?;

        debug!(profile = self.name, path = ?path, "Profile written");
        Ok(())
    }
}

/// Owns every synthesized profile and tracks the active one.
pub struct ProfileLibrary {
    /// Presets by display order.
    presets: RwLock<Vec<SwitchPreset>>,
    /// Synthesized profiles by preset name.
    cache: RwLock<HashMap<String, Arc<SoundProfile>>>,
    /// The profile key events currently resolve to.
    active: RwLock<Option<Arc<SoundProfile>>>,
}

impl ProfileLibrary {
    /// Creates a library with the built-in presets. Nothing is synthesized and no profile is
    /// active until one is requested.
    pub fn new() -> ProfileLibrary {
        ProfileLibrary {
            presets: RwLock::new(BUILTIN_PRESETS.iter().map(SwitchPreset::builtin).collect()),
            cache: RwLock::new(HashMap::new()),
            active: RwLock::new(None),
        }
    }

    /// Returns the preset for the given name, falling back to the default preset for names
    /// that aren't registered.
    pub fn preset(&self, name: &str) -> SwitchPreset {
        resolve(&self.presets.read(), name)
    }

    /// Returns the named profile, synthesizing and caching it on first use. Unknown names
    /// resolve to the default profile.
    pub fn get_profile(&self, name: &str) -> Arc<SoundProfile> {
        // Held until the profile is cached so a replacement can't slip in between.
        let presets = self.presets.read();
        let preset = resolve(&presets, name);
        if preset.name != name {
            debug!(
                requested = name,
                resolved = preset.name,
                "Unknown profile, using default"
            );
        }

        if let Some(profile) = self.cache.read().get(&preset.name) {
            return profile.clone();
        }

        let mut cache = self.cache.write();
        // Another thread may have synthesized it while we waited for the lock.
        if let Some(profile) = cache.get(&preset.name) {
            return profile.clone();
        }

        let profile = Arc::new(SoundProfile::synthesize(&preset));
        info!(
            profile = profile.name(),
            down_ms = profile.key_down().duration().as_millis() as u64,
            up_ms = profile.key_up().duration().as_millis() as u64,
            memory_kb = profile.memory_size() / 1024,
            "Profile synthesized"
        );
        cache.insert(preset.name, profile.clone());
        profile
    }

    /// Makes the named profile the one key events resolve to.
    pub fn set_active_profile(&self, name: &str) -> Arc<SoundProfile> {
        let profile = self.get_profile(name);
        *self.active.write() = Some(profile.clone());
        info!(profile = profile.name(), "Active profile set");
        profile
    }

    /// Returns the active profile's buffer for the event kind, or `None` if no profile is
    /// active yet.
    pub fn lookup(&self, kind: KeyEventKind) -> Option<Arc<SoundBuffer>> {
        self.active
            .read()
            .as_ref()
            .map(|profile| profile.buffer(kind).clone())
    }

    /// The name of the active profile, if any.
    pub fn current_profile(&self) -> Option<String> {
        self.active
            .read()
            .as_ref()
            .map(|profile| profile.name().to_string())
    }

    /// All selectable profile names, default first.
    pub fn available_profiles(&self) -> Vec<String> {
        self.presets
            .read()
            .iter()
            .map(|preset| preset.name.clone())
            .collect()
    }

    /// Adds a preset or replaces the one with the same name. A replaced preset's cached
    /// profile is evicted; the active profile keeps playing its old buffers until it is set
    /// again.
    pub fn register_preset(&self, preset: SwitchPreset) {
        let mut presets = self.presets.write();
        match presets.iter().position(|p| p.name == preset.name) {
            Some(index) => {
                self.cache.write().remove(&preset.name);
                info!(profile = preset.name, "Preset replaced");
                presets[index] = preset;
            }
            None => {
                info!(profile = preset.name, "Preset registered");
                presets.push(preset);
            }
        }
    }

    /// Synthesizes every registered preset.
    pub fn preload(&self) {
        for name in self.available_profiles() {
            self.get_profile(&name);
        }
    }

    /// The number of synthesized profiles.
    pub fn cached_count(&self) -> usize {
        self.cache.read().len()
    }
}

/// Finds the named preset, or the default one.
fn resolve(presets: &[SwitchPreset], name: &str) -> SwitchPreset {
    presets
        .iter()
        .find(|preset| preset.name == name)
        .or_else(|| presets.iter().find(|preset| preset.name == DEFAULT_PROFILE))
        .cloned()
        .unwrap_or_else(|| SwitchPreset::builtin(&BUILTIN_PRESETS[0]))
}

impl Default for ProfileLibrary {
    fn default() -> Self {
        ProfileLibrary::new()
    }
}

impl std::fmt::Debug for ProfileLibrary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProfileLibrary")
            .field("presets", &self.presets.read().len())
            .field("cached", &self.cached_count())
            .field("active", &self.current_profile())
            .finish()
    }
}
