//! Frame queue, time stretching and device output
//!
//! The tick pushes mixed frames into a bounded [`FrameQueue`]; the sink's
//! callback drains it through an [`OutputPipeline`] on the device thread.
//! The queue is the only state the two sides share besides the control
//! flags and counters.

#[cfg(feature = "streaming")]
pub mod audio_device;
pub mod pipeline;
pub mod ring_buffer;
pub mod sink;
pub mod stretch;

#[cfg(feature = "streaming")]
pub use audio_device::AudioDevice;
pub use pipeline::{volume_factor, OutputPipeline, PipelineControls, PipelineStats, StatsSnapshot};
pub use ring_buffer::FrameQueue;
pub use sink::{NullSink, Sink, SinkCallback};
pub use stretch::TimeStretcher;

use crate::{CsndError, Result};

/// Sink backends this build knows about
pub fn available_sinks() -> &'static [&'static str] {
    #[cfg(feature = "streaming")]
    {
        &["auto", "rodio", "null"]
    }
    #[cfg(not(feature = "streaming"))]
    {
        &["auto", "null"]
    }
}

/// Open the sink named by `sink_id` on `device_id`
///
/// `"auto"` prefers a real device and falls back to [`NullSink`] when none
/// can be opened.
pub fn create_sink(sink_id: &str, device_id: &str) -> Result<Box<dyn Sink>> {
    match sink_id {
        "null" => Ok(Box::new(NullSink::new())),
        "auto" => {
            #[cfg(feature = "streaming")]
            {
                match AudioDevice::new(device_id, crate::constants::NATIVE_SAMPLE_RATE) {
                    Ok(device) => return Ok(Box::new(device)),
                    Err(e) => tracing::warn!("{}, falling back to null sink", e),
                }
            }
            #[cfg(not(feature = "streaming"))]
            {
                let _ = device_id;
                tracing::info!("Built without audio output, using null sink");
            }
            Ok(Box::new(NullSink::new()))
        }
        #[cfg(feature = "streaming")]
        "rodio" => Ok(Box::new(AudioDevice::new(
            device_id,
            crate::constants::NATIVE_SAMPLE_RATE,
        )?)),
        other => Err(CsndError::ConfigError(format!(
            "Unknown sink '{}' (available: {})",
            other,
            available_sinks().join(", ")
        ))),
    }
}
