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
use std::{
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    thread,
    time::Duration,
};

use crossbeam_channel::{RecvTimeoutError, Sender};
use parking_lot::Mutex;
use tracing::{info, span, Level};

use super::{AudioError, VoiceMixer};

/// Frames rendered per block by the realtime mock.
const BLOCK_FRAMES: usize = 512;

/// A mock device. Renders the mixer without any hardware and discards the output.
///
/// A realtime mock renders on its own thread at the mixer's sample rate, like a real device
/// would. A manual mock only renders when [`Device::render`] is called.
#[derive(Clone)]
pub struct Device {
    name: String,
    realtime: bool,
    mixer: Arc<Mutex<Option<VoiceMixer>>>,
    render_thread: Arc<Mutex<Option<RenderThread>>>,
    rendered_frames: Arc<AtomicU64>,
}

struct RenderThread {
    shutdown_tx: Sender<()>,
    handle: thread::JoinHandle<()>,
}

impl Device {
    /// Gets the given realtime mock device.
    pub fn get(name: &str) -> Device {
        Device::new(name, true)
    }

    /// Gets a mock device that only renders on request.
    pub fn manual(name: &str) -> Device {
        Device::new(name, false)
    }

    fn new(name: &str, realtime: bool) -> Device {
        Device {
            name: name.to_string(),
            realtime,
            mixer: Arc::new(Mutex::new(None)),
            render_thread: Arc::new(Mutex::new(None)),
            rendered_frames: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Returns true if a mixer is attached.
    pub fn is_started(&self) -> bool {
        self.mixer.lock().is_some()
    }

    /// Renders the given number of frames and returns the interleaved output. Returns an
    /// empty buffer if the device hasn't been started.
    pub fn render(&self, frames: usize) -> Vec<f32> {
        match self.mixer.lock().as_mut() {
            Some(mixer) => {
                self.rendered_frames
                    .fetch_add(frames as u64, Ordering::Relaxed);
                mixer.process_frames(frames)
            }
            None => Vec::new(),
        }
    }

    /// The total number of frames rendered so far.
    pub fn rendered_frames(&self) -> u64 {
        self.rendered_frames.load(Ordering::Relaxed)
    }

    fn spawn_render_thread(&self, sample_rate: u32) -> Result<RenderThread, AudioError> {
        let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded::<()>(1);
        let device = self.clone();
        let block = Duration::from_secs_f64(BLOCK_FRAMES as f64 / f64::from(sample_rate));

        let handle = thread::Builder::new()
            .name(format!("{}-render", self.name))
            .spawn(move || loop {
                match shutdown_rx.recv_timeout(block) {
                    Err(RecvTimeoutError::Timeout) => {
                        device.render(BLOCK_FRAMES);
                    }
                    _ => return,
                }
            })?;

        Ok(RenderThread {
            shutdown_tx,
            handle,
        })
    }
}

impl super::Device for Device {
    fn start(&self, mixer: VoiceMixer) -> Result<(), AudioError> {
        let span = span!(Level::INFO, "start output (mock)");
        let _enter = span.enter();

        let sample_rate = mixer.sample_rate();
        {
            let mut current = self.mixer.lock();
            if current.is_some() {
                return Err(AudioError::AlreadyStarted(self.name.clone()));
            }
            *current = Some(mixer);
        }

        if self.realtime {
            let render_thread = self.spawn_render_thread(sample_rate)?;
            *self.render_thread.lock() = Some(render_thread);
        }

        info!(device = self.name, realtime = self.realtime, "Mock output started.");
        Ok(())
    }

    fn stop(&self) {
        if let Some(render_thread) = self.render_thread.lock().take() {
            let _ = render_thread.shutdown_tx.send(());
            let _ = render_thread.handle.join();
        }
        if self.mixer.lock().take().is_some() {
            info!(device = self.name, "Mock output stopped.");
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (Mock)", self.name,)
    }
}
