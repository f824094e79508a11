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
use std::{fmt, thread};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::Sender;
use parking_lot::Mutex;
use tracing::{error, info, span, Level};

use super::{AudioError, VoiceMixer};

/// An output device backed by cpal.
pub struct Device {
    /// The name of the device.
    name: String,
    /// The host ID of the device.
    host_id: cpal::HostId,
    /// The underlying cpal device.
    device: cpal::Device,
    /// The running output thread, if started.
    output: Mutex<Option<OutputThread>>,
}

/// The thread that owns the cpal stream. Streams aren't Send, so the stream is created and
/// dropped on this thread. Dropping the shutdown sender ends it.
struct OutputThread {
    shutdown_tx: Sender<()>,
    handle: thread::JoinHandle<()>,
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.host_id.name())
    }
}

/// f32 callback: mix directly into the cpal buffer.
fn create_f32_callback(
    mut mixer: VoiceMixer,
) -> impl FnMut(&mut [f32], &cpal::OutputCallbackInfo) + Send + 'static {
    move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
        mixer.process_into_output(data);
    }
}

/// Upper bound on the frames mixed per conversion chunk.
const MAX_SCRATCH_FRAMES: usize = 8192;

/// The conversion scratch length in samples, from the largest buffer the device reports.
fn scratch_len(buffer_size: &cpal::SupportedBufferSize, channels: u16) -> usize {
    let frames = match buffer_size {
        cpal::SupportedBufferSize::Range { max, .. } => (*max as usize).min(MAX_SCRATCH_FRAMES),
        cpal::SupportedBufferSize::Unknown => MAX_SCRATCH_FRAMES,
    };
    frames.max(1) * usize::from(channels.max(1))
}

/// Mixes into the scratch buffer a chunk at a time and converts each chunk into the output.
/// The scratch length must be a whole number of frames.
fn mix_converted<T>(mixer: &mut VoiceMixer, scratch: &mut [f32], data: &mut [T])
where
    T: cpal::SizedSample + cpal::FromSample<f32>,
{
    for chunk in data.chunks_mut(scratch.len()) {
        let scratch = &mut scratch[..chunk.len()];
        mixer.process_into_output(scratch);

        for (dst, &src) in chunk.iter_mut().zip(scratch.iter()) {
            *dst = T::from_sample(src);
        }
    }
}

/// Integer callback: mix into a preallocated scratch buffer and convert.
fn create_converting_callback<T>(
    mut mixer: VoiceMixer,
    scratch_len: usize,
) -> impl FnMut(&mut [T], &cpal::OutputCallbackInfo) + Send + 'static
where
    T: cpal::SizedSample + cpal::FromSample<f32>,
{
    let mut scratch: Vec<f32> = vec![0.0; scratch_len];
    move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
        mix_converted(&mut mixer, &mut scratch, data);
    }
}

/// Builds and plays an output stream on the device's default output configuration.
fn build_stream(device: &cpal::Device, mut mixer: VoiceMixer) -> Result<cpal::Stream, AudioError> {
    let supported = device.default_output_config()?;
    let sample_format = supported.sample_format();
    let buffer_size = supported.buffer_size().clone();
    let config: cpal::StreamConfig = supported.into();
    mixer.configure(config.channels, config.sample_rate.0);
    let scratch_len = scratch_len(&buffer_size, config.channels);

    info!(
        channels = config.channels,
        sample_rate = config.sample_rate.0,
        format = ?sample_format,
        "Building output stream."
    );

    let on_error = |err: cpal::StreamError| error!("cpal output stream error: {}", err);
    let stream = match sample_format {
        cpal::SampleFormat::F32 => {
            device.build_output_stream(&config, create_f32_callback(mixer), on_error, None)?
        }
        cpal::SampleFormat::I16 => device.build_output_stream(
            &config,
            create_converting_callback::<i16>(mixer, scratch_len),
            on_error,
            None,
        )?,
        cpal::SampleFormat::I32 => device.build_output_stream(
            &config,
            create_converting_callback::<i32>(mixer, scratch_len),
            on_error,
            None,
        )?,
        cpal::SampleFormat::U16 => device.build_output_stream(
            &config,
            create_converting_callback::<u16>(mixer, scratch_len),
            on_error,
            None,
        )?,
        other => return Err(AudioError::UnsupportedFormat(format!("{:?}", other))),
    };

    stream.play()?;
    Ok(stream)
}

impl Device {
    /// Lists cpal devices and produces the Device trait.
    pub fn list() -> Result<Vec<Box<dyn super::Device>>, AudioError> {
        Ok(Device::list_cpal_devices()?
            .into_iter()
            .map(|device| {
                let device: Box<dyn super::Device> = Box::new(device);
                device
            })
            .collect())
    }

    /// Lists cpal output devices.
    fn list_cpal_devices() -> Result<Vec<Device>, AudioError> {
        // Suppress noisy output here.
        let _shh_stdout = shh::stdout()?;
        let _shh_stderr = shh::stderr()?;

        let mut devices: Vec<Device> = Vec::new();
        for host_id in cpal::available_hosts() {
            let host_devices = match cpal::host_from_id(host_id)?.output_devices() {
                Ok(host_devices) => host_devices,
                Err(e) => {
                    error!(
                        err = e.to_string(),
                        host = host_id.name(),
                        "Unable to list devices for host"
                    );
                    continue;
                }
            };

            for device in host_devices {
                let name = match device.name() {
                    Ok(name) => name,
                    Err(_) => continue,
                };
                devices.push(Device::new(name, host_id, device));
            }
        }

        devices.sort_by_key(|device| device.name.to_string());
        Ok(devices)
    }

    fn new(name: String, host_id: cpal::HostId, device: cpal::Device) -> Device {
        Device {
            name,
            host_id,
            device,
            output: Mutex::new(None),
        }
    }

    /// Gets the given cpal device. "default" is the default host's default output device.
    pub fn get(name: &str) -> Result<Device, AudioError> {
        if name == "default" {
            let host = cpal::default_host();
            let device = host
                .default_output_device()
                .ok_or(AudioError::NoDefaultDevice)?;
            return Ok(Device::new(device.name()?, host.id(), device));
        }

        Device::list_cpal_devices()?
            .into_iter()
            .find(|device| device.name.trim() == name)
            .ok_or_else(|| AudioError::DeviceNotFound(name.to_string()))
    }
}

impl super::Device for Device {
    fn start(&self, mixer: VoiceMixer) -> Result<(), AudioError> {
        let span = span!(Level::INFO, "start output (cpal)");
        let _enter = span.enter();

        let mut output = self.output.lock();
        if output.is_some() {
            return Err(AudioError::AlreadyStarted(self.name.clone()));
        }

        let (init_tx, init_rx) = crossbeam_channel::bounded::<Result<(), AudioError>>(1);
        let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded::<()>(0);
        let device = self.device.clone();

        let handle = thread::Builder::new()
            .name("keyclack-output".to_string())
            .spawn(move || {
                let stream = match build_stream(&device, mixer) {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = init_tx.send(Err(e));
                        return;
                    }
                };
                let _ = init_tx.send(Ok(()));

                // Keep the stream alive until the device is stopped.
                let _ = shutdown_rx.recv();
                drop(stream);
            })?;

        match init_rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                let _ = handle.join();
                return Err(e);
            }
            Err(_) => {
                let _ = handle.join();
                return Err(AudioError::OutputThreadExited);
            }
        }

        info!(device = self.name, "Output stream started.");
        *output = Some(OutputThread {
            shutdown_tx,
            handle,
        });
        Ok(())
    }

    fn stop(&self) {
        if let Some(output) = self.output.lock().take() {
            drop(output.shutdown_tx);
            if output.handle.join().is_err() {
                error!(device = self.name, "Output thread panicked");
            }
            info!(device = self.name, "Output stream stopped.");
        }
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        use super::Device as _;
        self.stop();
    }
}
