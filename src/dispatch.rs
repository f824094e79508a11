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

//! Turns key events into playback requests.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use tracing::trace;

use crate::playback::{Playback, PlaybackRequest};
use crate::profiles::ProfileLibrary;
use crate::settings::Settings;

/// Whether a key went down or came up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyEventKind {
    KeyDown,
    KeyUp,
}

impl fmt::Display for KeyEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyEventKind::KeyDown => write!(f, "down"),
            KeyEventKind::KeyUp => write!(f, "up"),
        }
    }
}

/// A key event from the key source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEvent {
    pub kind: KeyEventKind,
    /// The platform key code. All keys currently share a profile's two buffers.
    pub key: i64,
    pub timestamp: Instant,
}

impl KeyEvent {
    pub fn new(kind: KeyEventKind, key: i64) -> KeyEvent {
        KeyEvent {
            kind,
            key,
            timestamp: Instant::now(),
        }
    }

    pub fn down(key: i64) -> KeyEvent {
        KeyEvent::new(KeyEventKind::KeyDown, key)
    }

    pub fn up(key: i64) -> KeyEvent {
        KeyEvent::new(KeyEventKind::KeyUp, key)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchState {
    Disabled,
    Enabled,
}

/// Routes key events to a playback implementation, gated by the enabled setting.
pub struct Dispatcher<P: Playback> {
    settings: Arc<Settings>,
    library: Arc<ProfileLibrary>,
    playback: P,
}

impl<P: Playback> Dispatcher<P> {
    pub fn new(settings: Arc<Settings>, library: Arc<ProfileLibrary>, playback: P) -> Self {
        Dispatcher {
            settings,
            library,
            playback,
        }
    }

    /// The current state, read from the settings.
    pub fn state(&self) -> DispatchState {
        if self.settings.is_enabled() {
            DispatchState::Enabled
        } else {
            DispatchState::Disabled
        }
    }

    /// Handles a key event. Events are ignored while disabled, and dropped if no profile is
    /// active.
    pub fn handle(&self, event: KeyEvent) {
        if self.state() == DispatchState::Disabled {
            return;
        }

        let Some(buffer) = self.library.lookup(event.kind) else {
            trace!(kind = %event.kind, key = event.key, "No active profile, dropping event");
            return;
        };

        self.playback
            .play(PlaybackRequest::new(buffer, event.timestamp));
    }

    pub fn playback(&self) -> &P {
        &self.playback
    }
}

#[cfg(test)]
mod tests {
    use parking_lot::Mutex;

    use super::*;
    use crate::audio::mock;
    use crate::playback::VoicePool;
    use crate::random::SeededRandomizer;
    use crate::synth::SoundBuffer;

    #[derive(Default)]
    struct RecordingPlayback {
        played: Mutex<Vec<Arc<SoundBuffer>>>,
    }

    impl Playback for RecordingPlayback {
        fn play(&self, request: PlaybackRequest) {
            self.played.lock().push(request.buffer);
        }
    }

    fn create_dispatcher(
        enabled: bool,
        profile: Option<&str>,
    ) -> (Dispatcher<RecordingPlayback>, Arc<Settings>, Arc<ProfileLibrary>) {
        let settings = Arc::new(Settings::new(enabled, 50, "Default"));
        let library = Arc::new(ProfileLibrary::new());
        if let Some(profile) = profile {
            library.set_active_profile(profile);
        }
        let dispatcher = Dispatcher::new(
            settings.clone(),
            library.clone(),
            RecordingPlayback::default(),
        );
        (dispatcher, settings, library)
    }

    #[test]
    fn test_disabled_ignores_events() {
        let (dispatcher, _, _) = create_dispatcher(false, Some("Default"));
        assert_eq!(dispatcher.state(), DispatchState::Disabled);

        dispatcher.handle(KeyEvent::down(11));
        dispatcher.handle(KeyEvent::up(11));
        assert!(dispatcher.playback().played.lock().is_empty());
    }

    #[test]
    fn test_enabled_plays_active_profile_buffer() {
        let (dispatcher, _, library) = create_dispatcher(true, Some("Cherry MX Blue"));
        assert_eq!(dispatcher.state(), DispatchState::Enabled);

        dispatcher.handle(KeyEvent::down(11));

        let played = dispatcher.playback().played.lock();
        assert_eq!(played.len(), 1);
        let profile = library.get_profile("Cherry MX Blue");
        assert!(Arc::ptr_eq(&played[0], profile.key_down()));
    }

    #[test]
    fn test_key_up_uses_key_up_buffer() {
        let (dispatcher, _, library) = create_dispatcher(true, Some("Default"));
        dispatcher.handle(KeyEvent::up(42));

        let played = dispatcher.playback().played.lock();
        assert!(Arc::ptr_eq(&played[0], library.get_profile("Default").key_up()));
    }

    #[test]
    fn test_no_active_profile_drops_event() {
        let (dispatcher, _, _) = create_dispatcher(true, None);
        dispatcher.handle(KeyEvent::down(11));
        assert!(dispatcher.playback().played.lock().is_empty());
    }

    #[test]
    fn test_toggle_takes_effect_on_next_event() {
        let (dispatcher, settings, _) = create_dispatcher(true, Some("Default"));
        dispatcher.handle(KeyEvent::down(1));
        settings.toggle();
        dispatcher.handle(KeyEvent::down(2));
        settings.toggle();
        dispatcher.handle(KeyEvent::down(3));
        assert_eq!(dispatcher.playback().played.lock().len(), 2);
    }

    #[test]
    fn test_profile_switch_keeps_playing_voice() {
        let settings = Arc::new(Settings::new(true, 50, "Default"));
        let library = Arc::new(ProfileLibrary::new());
        library.set_active_profile("Default");

        let device = Arc::new(mock::Device::manual("mock-dispatch"));
        let pool = VoicePool::new(
            device,
            4,
            settings.clone(),
            Arc::new(SeededRandomizer::new(3)),
        )
        .unwrap();
        let dispatcher = Dispatcher::new(settings, library.clone(), pool);

        dispatcher.handle(KeyEvent::down(11));
        let default_down = library.get_profile("Default").key_down().clone();
        assert!(Arc::ptr_eq(
            &dispatcher.playback().voice_buffer(0).unwrap(),
            &default_down
        ));

        library.set_active_profile("Cherry MX Red");
        assert!(Arc::ptr_eq(
            &dispatcher.playback().voice_buffer(0).unwrap(),
            &default_down
        ));

        let red_down = library.get_profile("Cherry MX Red").key_down().clone();
        assert!(Arc::ptr_eq(
            &library.lookup(KeyEventKind::KeyDown).unwrap(),
            &red_down
        ));

        dispatcher.handle(KeyEvent::down(12));
        assert!(Arc::ptr_eq(
            &dispatcher.playback().voice_buffer(1).unwrap(),
            &red_down
        ));
    }
}
