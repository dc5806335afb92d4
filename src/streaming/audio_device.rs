//! Audio device sink using rodio
//!
//! The device thread pulls interleaved samples from a [`CallbackSource`],
//! which refills itself in batches through the installed sink callback.

use super::sink::{Sink, SinkCallback};
use crate::{CsndError, Result, StereoFrame};
use parking_lot::Mutex;
use rodio::cpal::traits::{DeviceTrait, HostTrait};
use rodio::{OutputStream, OutputStreamHandle, Source};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Frames pulled from the callback per refill
const BATCH_FRAMES: usize = 512;

type SharedCallback = Arc<Mutex<Option<SinkCallback>>>;

/// rodio source that pulls frames through the sink callback
struct CallbackSource {
    callback: SharedCallback,
    requested_rate: Arc<AtomicU32>,
    sample_rate: u32,
    finished: Arc<AtomicBool>,
    buffer: Vec<StereoFrame>,
    /// Interleaved sample position in `buffer`
    position: usize,
}

impl CallbackSource {
    fn new(callback: SharedCallback, requested_rate: Arc<AtomicU32>, finished: Arc<AtomicBool>) -> Self {
        let sample_rate = requested_rate.load(Ordering::Relaxed);
        CallbackSource {
            callback,
            requested_rate,
            sample_rate,
            finished,
            buffer: vec![[0, 0]; BATCH_FRAMES],
            position: BATCH_FRAMES * 2, // Start by pulling a new batch
        }
    }

    fn refill(&mut self) {
        // rate changes take effect at batch boundaries
        self.sample_rate = self.requested_rate.load(Ordering::Relaxed);
        match self.callback.lock().as_mut() {
            Some(callback) => callback(&mut self.buffer),
            None => self.buffer.fill([0, 0]),
        }
        self.position = 0;
    }
}

impl Source for CallbackSource {
    fn current_frame_len(&self) -> Option<usize> {
        match self.buffer.len() * 2 - self.position {
            0 => Some(BATCH_FRAMES * 2),
            remaining => Some(remaining),
        }
    }

    fn channels(&self) -> u16 {
        2
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn total_duration(&self) -> Option<Duration> {
        None
    }
}

impl Iterator for CallbackSource {
    type Item = i16;

    fn next(&mut self) -> Option<i16> {
        if self.finished.load(Ordering::Relaxed) {
            return None;
        }
        if self.position >= self.buffer.len() * 2 {
            self.refill();
        }
        let frame = self.buffer[self.position / 2];
        let sample = frame[self.position % 2];
        self.position += 1;
        Some(sample)
    }
}

/// Output device sink backed by rodio
pub struct AudioDevice {
    _stream: OutputStream,
    _handle: OutputStreamHandle,
    player: rodio::Sink,
    callback: SharedCallback,
    sample_rate: Arc<AtomicU32>,
    finished: Arc<AtomicBool>,
    device_name: String,
}

impl AudioDevice {
    /// Open `device_id` (`"auto"` for the host default) and start playback
    ///
    /// A named device that cannot be opened falls back to the default one.
    pub fn new(device_id: &str, sample_rate: u32) -> Result<Self> {
        let (stream, handle, device_name) = Self::open_stream(device_id)?;

        let player = rodio::Sink::try_new(&handle)
            .map_err(|e| CsndError::AudioDeviceError(format!("Failed to create audio sink: {}", e)))?;

        let callback: SharedCallback = Arc::new(Mutex::new(None));
        let requested_rate = Arc::new(AtomicU32::new(sample_rate));
        let finished = Arc::new(AtomicBool::new(false));

        player.append(CallbackSource::new(
            Arc::clone(&callback),
            Arc::clone(&requested_rate),
            Arc::clone(&finished),
        ));

        info!("Audio output on '{}' at {}Hz", device_name, sample_rate);

        Ok(AudioDevice {
            _stream: stream,
            _handle: handle,
            player,
            callback,
            sample_rate: requested_rate,
            finished,
            device_name,
        })
    }

    fn open_stream(device_id: &str) -> Result<(OutputStream, OutputStreamHandle, String)> {
        if device_id != "auto" {
            let host = rodio::cpal::default_host();
            let device = host
                .output_devices()
                .ok()
                .and_then(|mut devices| {
                    devices.find(|d| d.name().map(|n| n == device_id).unwrap_or(false))
                });
            match device.map(|d| OutputStream::try_from_device(&d)) {
                Some(Ok((stream, handle))) => return Ok((stream, handle, device_id.to_string())),
                Some(Err(e)) => warn!("Audio device '{}' failed to open: {}, using default", device_id, e),
                None => warn!("Audio device '{}' not found, using default", device_id),
            }
        }

        let (stream, handle) = OutputStream::try_default()
            .map_err(|e| CsndError::AudioDeviceError(format!("Failed to create audio stream: {}", e)))?;
        Ok((stream, handle, "default".to_string()))
    }

    /// Names of the host's output devices
    pub fn list_devices() -> Vec<String> {
        let host = rodio::cpal::default_host();
        match host.output_devices() {
            Ok(devices) => devices.filter_map(|d| d.name().ok()).collect(),
            Err(e) => {
                warn!("Failed to enumerate audio devices: {}", e);
                Vec::new()
            }
        }
    }

    /// Name of the opened device
    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    /// Pause playback
    pub fn pause(&self) {
        self.player.pause();
    }

    /// Resume playback
    pub fn play(&self) {
        self.player.play();
    }

    /// Whether playback is paused
    pub fn is_paused(&self) -> bool {
        self.player.is_paused()
    }
}

impl Sink for AudioDevice {
    fn name(&self) -> &'static str {
        "rodio"
    }

    fn native_sample_rate(&self) -> u32 {
        self.sample_rate.load(Ordering::Relaxed)
    }

    fn set_native_sample_rate(&mut self, sample_rate: u32) {
        self.sample_rate.store(sample_rate, Ordering::Relaxed);
    }

    fn set_callback(&mut self, callback: SinkCallback) {
        *self.callback.lock() = Some(callback);
    }

    fn clear_callback(&mut self) {
        *self.callback.lock() = None;
    }
}

impl Drop for AudioDevice {
    fn drop(&mut self) {
        self.finished.store(true, Ordering::Relaxed);
        self.player.pause();
    }
}
