//! Audio sink abstraction
//!
//! A sink pulls frames by invoking the callback it was given, on whatever
//! thread its backend runs. The engine only installs the callback and sets
//! the rate; the frontend owns the sink.

use crate::constants::NATIVE_SAMPLE_RATE;
use crate::StereoFrame;

/// Pull callback: fill the whole slice with output frames
pub type SinkCallback = Box<dyn FnMut(&mut [StereoFrame]) + Send>;

/// Host audio output
pub trait Sink {
    /// Backend identifier
    fn name(&self) -> &'static str;

    /// Rate the sink consumes frames at (Hz)
    fn native_sample_rate(&self) -> u32;

    /// Tell the sink which rate the callback produces
    fn set_native_sample_rate(&mut self, sample_rate: u32);

    /// Install the pull callback, replacing any previous one
    fn set_callback(&mut self, callback: SinkCallback);

    /// Remove the pull callback; the sink plays silence afterwards
    fn clear_callback(&mut self);
}

/// Sink without a device
///
/// Frames are pulled only when [`render`](NullSink::render) is called, which
/// makes it the sink for headless runs, offline rendering and tests.
pub struct NullSink {
    sample_rate: u32,
    callback: Option<SinkCallback>,
}

impl std::fmt::Debug for NullSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NullSink")
            .field("sample_rate", &self.sample_rate)
            .field("has_callback", &self.callback.is_some())
            .finish()
    }
}

impl Default for NullSink {
    fn default() -> Self {
        Self::new()
    }
}

impl NullSink {
    /// Create a sink at the native rate with no callback
    pub fn new() -> Self {
        NullSink {
            sample_rate: NATIVE_SAMPLE_RATE,
            callback: None,
        }
    }

    /// Pull `out.len()` frames through the callback
    ///
    /// Returns `false` (and writes silence) when no callback is installed.
    pub fn render(&mut self, out: &mut [StereoFrame]) -> bool {
        match self.callback.as_mut() {
            Some(callback) => {
                callback(out);
                true
            }
            None => {
                out.fill([0, 0]);
                false
            }
        }
    }

    /// Whether a callback is installed
    pub fn has_callback(&self) -> bool {
        self.callback.is_some()
    }
}

impl Sink for NullSink {
    fn name(&self) -> &'static str {
        "null"
    }

    fn native_sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn set_native_sample_rate(&mut self, sample_rate: u32) {
        self.sample_rate = sample_rate;
    }

    fn set_callback(&mut self, callback: SinkCallback) {
        self.callback = Some(callback);
    }

    fn clear_callback(&mut self) {
        self.callback = None;
    }
}
