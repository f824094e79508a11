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
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{select, Receiver, Sender};
use parking_lot::Mutex;
use tracing::{error, info, span, trace, Level, Span};

use crate::audio::{self, AudioError};
use crate::config;
use crate::dispatch::{Dispatcher, KeyEvent};
use crate::playback::{PlaybackError, VoicePool};
use crate::profiles::ProfileLibrary;
use crate::random::Randomizer;
use crate::settings::{Settings, SettingsChange};

/// The settings watcher thread.
struct Watcher {
    shutdown_tx: Sender<()>,
    handle: JoinHandle<()>,
}

/// Wires settings, the profile library, the voice pool and the dispatcher together.
///
/// If the audio backend can't be started, the engine runs without sound: key events are
/// dropped, but settings and profiles keep working.
pub struct Engine {
    settings: Arc<Settings>,
    library: Arc<ProfileLibrary>,
    /// The dispatcher, absent when running without sound.
    dispatcher: Option<Dispatcher<Arc<VoicePool>>>,
    /// Serializes applying the selected profile to the library.
    profile_lock: Arc<Mutex<()>>,
    watcher: Mutex<Option<Watcher>>,
    span: Span,
}

impl Engine {
    /// Starts an engine on the device named by the configuration.
    pub fn start(config: &config::Engine, randomizer: Arc<dyn Randomizer>) -> Engine {
        let audio = config.audio();
        let device = audio::get_device(&audio);
        Engine::with_device(config, device, randomizer)
    }

    /// Starts an engine on the given device. A device error puts the engine in sound-disabled
    /// mode.
    pub fn with_device(
        config: &config::Engine,
        device: Result<Arc<dyn audio::Device>, AudioError>,
        randomizer: Arc<dyn Randomizer>,
    ) -> Engine {
        let span = span!(Level::INFO, "engine");
        let _enter = span.enter();

        let library = Arc::new(ProfileLibrary::new());
        library.preload();
        let profile = library.preset(config.profile());
        let settings = Arc::new(Settings::new(
            config.enabled(),
            config.volume(),
            profile.name(),
        ));
        library.set_active_profile(profile.name());

        let audio = config.audio();
        let pool = device
            .map_err(PlaybackError::AudioBackendInitFailure)
            .and_then(|device| {
                VoicePool::new(
                    device,
                    audio.voices(),
                    settings.clone(),
                    randomizer,
                )
            });

        let dispatcher = match pool {
            Ok(pool) => Some(Dispatcher::new(
                settings.clone(),
                library.clone(),
                Arc::new(pool),
            )),
            Err(e) => {
                error!(err = %e, "Unable to start audio, running without sound");
                None
            }
        };

        let profile_lock = Arc::new(Mutex::new(()));
        let watcher = Engine::spawn_watcher(
            settings.clone(),
            library.clone(),
            profile_lock.clone(),
        );

        info!(
            profile = settings.profile(),
            enabled = settings.is_enabled(),
            volume = settings.volume(),
            sound = dispatcher.is_some(),
            "Engine started."
        );

        drop(_enter);
        Engine {
            settings,
            library,
            dispatcher,
            profile_lock,
            watcher: Mutex::new(watcher),
            span,
        }
    }

    /// Applies settings changes made through the shared settings handle.
    fn spawn_watcher(
        settings: Arc<Settings>,
        library: Arc<ProfileLibrary>,
        profile_lock: Arc<Mutex<()>>,
    ) -> Option<Watcher> {
        let changes: Receiver<SettingsChange> = settings.subscribe();
        let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded::<()>(0);
        let spawned = thread::Builder::new()
            .name("keyclack-settings".to_string())
            .spawn(move || loop {
                select! {
                    recv(changes) -> change => match change {
                        Ok(SettingsChange::Profile(_)) => {
                            Engine::sync_profile(&settings, &library, &profile_lock);
                        }
                        Ok(SettingsChange::Enabled(enabled)) => info!(enabled, "Sound toggled."),
                        Ok(SettingsChange::Volume(volume)) => info!(volume, "Volume changed."),
                        Err(_) => return,
                    },
                    recv(shutdown_rx) -> _ => return,
                }
            });

        match spawned {
            Ok(handle) => Some(Watcher {
                shutdown_tx,
                handle,
            }),
            Err(e) => {
                error!(err = %e, "Unable to start settings watcher");
                None
            }
        }
    }

    /// Activates the selected profile. Always reads the latest selection, so a stale change
    /// notification can't override a newer one.
    fn sync_profile(settings: &Settings, library: &ProfileLibrary, profile_lock: &Mutex<()>) {
        let _guard = profile_lock.lock();
        library.set_active_profile(&settings.profile());
    }

    /// Handles a key event from the key source.
    pub fn handle(&self, event: KeyEvent) {
        match &self.dispatcher {
            Some(dispatcher) => dispatcher.handle(event),
            None => trace!(key = event.key, "Sound disabled, dropping event"),
        }
    }

    /// Selects a profile. The next key event uses it.
    pub fn set_profile(&self, name: &str) {
        let _enter = self.span.enter();
        let preset = self.library.preset(name);
        self.settings.set_profile(preset.name());
        Engine::sync_profile(&self.settings, &self.library, &self.profile_lock);
    }

    /// The shared settings handle.
    pub fn settings(&self) -> &Arc<Settings> {
        &self.settings
    }

    pub fn library(&self) -> &Arc<ProfileLibrary> {
        &self.library
    }

    /// Returns true if the audio backend started.
    pub fn has_sound(&self) -> bool {
        self.dispatcher.is_some()
    }

    /// The names of all selectable profiles.
    pub fn list_available_profiles(&self) -> Vec<String> {
        self.library.available_profiles()
    }

    /// The name of the active profile.
    pub fn current_profile(&self) -> Option<String> {
        self.library.current_profile()
    }

    /// The voice pool, if sound is available.
    pub fn voice_pool(&self) -> Option<&Arc<VoicePool>> {
        self.dispatcher.as_ref().map(|dispatcher| dispatcher.playback())
    }

    /// Stops the settings watcher and the audio output.
    pub fn shutdown(&self) {
        let _enter = self.span.enter();
        if let Some(watcher) = self.watcher.lock().take() {
            drop(watcher.shutdown_tx);
            if watcher.handle.join().is_err() {
                error!("Settings watcher panicked");
            }
        }
        if let Some(pool) = self.voice_pool() {
            pool.shutdown();
            info!("Engine stopped.");
        }
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use ::config::{Config, File, FileFormat};

    use super::*;
    use crate::audio::mock;
    use crate::audio::Device as _;
    use crate::audio::VoiceMixer;
    use crate::random::SeededRandomizer;
    use crate::testutil::{calculate_rms, eventually};

    fn engine_config(yaml: &str) -> crate::config::Engine {
        Config::builder()
            .add_source(File::from_str(yaml, FileFormat::Yaml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    fn create_engine(yaml: &str) -> (Engine, Arc<mock::Device>) {
        let device = Arc::new(mock::Device::manual("mock-engine"));
        let output: Arc<dyn audio::Device> = device.clone();
        let engine = Engine::with_device(
            &engine_config(yaml),
            Ok(output),
            Arc::new(SeededRandomizer::new(11)),
        );
        (engine, device)
    }

    #[test]
    fn test_key_event_plays_configured_profile() {
        let (engine, device) = create_engine("profile: Cherry MX Blue\nvolume: 100");
        assert!(engine.has_sound());
        assert_eq!(engine.current_profile().as_deref(), Some("Cherry MX Blue"));

        engine.handle(KeyEvent::down(11));

        let pool = engine.voice_pool().unwrap();
        let blue = engine.library().get_profile("Cherry MX Blue");
        assert!(Arc::ptr_eq(&pool.voice_buffer(0).unwrap(), blue.key_down()));

        let output = device.render(256);
        assert!(calculate_rms(&output) > 0.0);
    }

    #[test]
    fn test_settings_profile_change_is_applied() {
        let (engine, _device) = create_engine("profile: Default");
        engine.settings().set_profile("Cherry MX Red");

        eventually(
            || engine.current_profile().as_deref() == Some("Cherry MX Red"),
            "Profile change was never applied",
        );
    }

    #[test]
    fn test_set_profile_applies_immediately() {
        let (engine, _device) = create_engine("profile: Default");
        engine.set_profile("Gateron Milky Yellow");
        assert_eq!(
            engine.current_profile().as_deref(),
            Some("Gateron Milky Yellow")
        );
        assert_eq!(engine.settings().profile(), "Gateron Milky Yellow");

        // Unknown names fall back to the default profile.
        engine.set_profile("Topre");
        assert_eq!(engine.current_profile().as_deref(), Some("Default"));
        assert_eq!(engine.settings().profile(), "Default");
    }

    #[test]
    fn test_disabled_engine_ignores_keys() {
        let (engine, _device) = create_engine("enabled: false");
        engine.handle(KeyEvent::down(11));
        assert!(engine.voice_pool().unwrap().voice_buffer(0).is_none());
    }

    #[test]
    fn test_runs_without_sound_when_backend_fails() {
        let device = Arc::new(mock::Device::manual("mock-taken"));
        device
            .start(VoiceMixer::new(
                Vec::new(),
                Arc::new(Settings::new(true, 50, "Default")),
            ))
            .unwrap();

        let output: Arc<dyn audio::Device> = device;
        let engine = Engine::with_device(
            &engine_config("{}"),
            Ok(output),
            Arc::new(SeededRandomizer::new(1)),
        );
        assert!(!engine.has_sound());

        // Key events are dropped, settings still work.
        engine.handle(KeyEvent::down(11));
        engine.set_profile("Cherry MX Brown");
        assert_eq!(engine.current_profile().as_deref(), Some("Cherry MX Brown"));
        assert_eq!(engine.list_available_profiles().len(), 6);
    }

    #[test]
    fn test_runs_without_sound_when_device_missing() {
        let engine = Engine::with_device(
            &engine_config("{}"),
            Err(AudioError::DeviceNotFound("nope".to_string())),
            Arc::new(SeededRandomizer::new(1)),
        );
        assert!(!engine.has_sound());
        assert_eq!(engine.current_profile().as_deref(), Some("Default"));
    }

    #[test]
    fn test_shutdown_stops_output() {
        let (engine, device) = create_engine("{}");
        assert!(device.is_started());
        engine.shutdown();
        assert!(!device.is_started());
    }
}
