//! Device-side half of the output pipeline
//!
//! [`OutputPipeline`] runs inside the sink's pull callback. It takes frames
//! from the queue (directly or through the stretcher), applies the volume
//! curve and masks underruns by repeating the last emitted frame.

use super::{FrameQueue, TimeStretcher};
use crate::constants::VOLUME_CURVE_K;
use crate::StereoFrame;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

/// Gain for a linear UI volume in `[0.0, 1.0]`
///
/// `exp(K * (v - 1))` spans 60 dB and hits exactly 1.0 at full volume;
/// zero volume mutes.
pub fn volume_factor(volume: f32) -> f32 {
    if volume <= 0.0 {
        return 0.0;
    }
    (VOLUME_CURVE_K * (volume.min(1.0) - 1.0)).exp()
}

/// Control flags written by the frontend and read by the device callback
#[derive(Debug)]
pub struct PipelineControls {
    stretching: AtomicBool,
    flushing: AtomicBool,
    volume_bits: AtomicU32,
}

impl PipelineControls {
    /// Create controls with the given initial state
    pub fn new(volume: f32, stretching: bool) -> Self {
        PipelineControls {
            stretching: AtomicBool::new(stretching),
            flushing: AtomicBool::new(false),
            volume_bits: AtomicU32::new(volume.clamp(0.0, 1.0).to_bits()),
        }
    }

    /// Enable or disable stretching; disabling schedules one flushing call
    pub fn set_stretching(&self, enabled: bool) {
        let was_enabled = self.stretching.swap(enabled, Ordering::AcqRel);
        if was_enabled && !enabled {
            self.flushing.store(true, Ordering::Release);
        }
    }

    /// Whether stretching is enabled
    pub fn stretching(&self) -> bool {
        self.stretching.load(Ordering::Acquire)
    }

    /// Whether a flush is pending
    pub fn flush_pending(&self) -> bool {
        self.flushing.load(Ordering::Acquire)
    }

    fn take_flush(&self) -> bool {
        self.flushing.swap(false, Ordering::AcqRel)
    }

    /// Set the linear UI volume (clamped to `[0.0, 1.0]`)
    pub fn set_volume(&self, volume: f32) {
        let volume = if volume.is_nan() { 0.0 } else { volume.clamp(0.0, 1.0) };
        self.volume_bits.store(volume.to_bits(), Ordering::Relaxed);
    }

    /// Current linear UI volume
    pub fn volume(&self) -> f32 {
        f32::from_bits(self.volume_bits.load(Ordering::Relaxed))
    }
}

impl Default for PipelineControls {
    fn default() -> Self {
        Self::new(1.0, false)
    }
}

/// Counters shared between the tick and the device callback
#[derive(Debug, Default)]
pub struct PipelineStats {
    frames_pushed: AtomicU64,
    frames_dropped: AtomicU64,
    frames_played: AtomicU64,
    underrun_frames: AtomicU64,
}

/// Point-in-time copy of [`PipelineStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Frames the tick queued
    pub frames_pushed: u64,
    /// Frames the tick could not queue (queue full)
    pub frames_dropped: u64,
    /// Real frames handed to the device
    pub frames_played: u64,
    /// Padding frames emitted on underrun
    pub underrun_frames: u64,
}

impl PipelineStats {
    /// Record a push of `requested` frames of which `pushed` were queued
    pub fn record_push(&self, requested: usize, pushed: usize) {
        self.frames_pushed.fetch_add(pushed as u64, Ordering::Relaxed);
        self.frames_dropped
            .fetch_add((requested - pushed) as u64, Ordering::Relaxed);
    }

    fn record_callback(&self, real: usize, padded: usize) {
        self.frames_played.fetch_add(real as u64, Ordering::Relaxed);
        self.underrun_frames
            .fetch_add(padded as u64, Ordering::Relaxed);
    }

    /// Copy the current counters
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            frames_pushed: self.frames_pushed.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            frames_played: self.frames_played.load(Ordering::Relaxed),
            underrun_frames: self.underrun_frames.load(Ordering::Relaxed),
        }
    }
}

/// Consumer state owned by the sink callback
#[derive(Debug)]
pub struct OutputPipeline {
    queue: Arc<FrameQueue>,
    controls: Arc<PipelineControls>,
    stats: Arc<PipelineStats>,
    stretcher: TimeStretcher,
    scratch: Vec<StereoFrame>,
    last_emitted: StereoFrame,
}

impl OutputPipeline {
    /// Create the consumer side for a device running at `sample_rate`
    pub fn new(
        queue: Arc<FrameQueue>,
        controls: Arc<PipelineControls>,
        stats: Arc<PipelineStats>,
        sample_rate: u32,
    ) -> Self {
        let scratch = vec![[0, 0]; queue.capacity()];
        OutputPipeline {
            queue,
            controls,
            stats,
            stretcher: TimeStretcher::new(sample_rate),
            scratch,
            last_emitted: [0, 0],
        }
    }

    /// Fill `out` completely for one device callback
    pub fn fill(&mut self, out: &mut [StereoFrame]) {
        let requested = out.len();
        if requested == 0 {
            return;
        }

        let real = if self.controls.take_flush() {
            // final stretched call: hand the stretcher everything still queued
            let queued = self.queue.pop(&mut self.scratch);
            self.stretcher.process(&self.scratch[..queued], &mut []);
            self.stretcher.flush();
            self.stretcher.receive(out)
        } else if self.controls.stretching() {
            let queued = self.queue.pop(&mut self.scratch);
            self.stretcher.process(&self.scratch[..queued], out)
        } else {
            // frames left over from a flush go out first
            let from_stretcher = self.stretcher.receive(out);
            from_stretcher + self.queue.pop(&mut out[from_stretcher..])
        };

        let factor = volume_factor(self.controls.volume());
        if factor != 1.0 {
            for frame in &mut out[..real] {
                frame[0] = (frame[0] as f32 * factor) as i16;
                frame[1] = (frame[1] as f32 * factor) as i16;
            }
        }

        if real > 0 {
            self.last_emitted = out[real - 1];
        }
        out[real..].fill(self.last_emitted);

        self.stats.record_callback(real, requested - real);
    }

    /// Last frame handed to the device
    pub fn last_emitted(&self) -> StereoFrame {
        self.last_emitted
    }

    /// Stretcher state (ratio, backlog)
    pub fn stretcher(&self) -> &TimeStretcher {
        &self.stretcher
    }
}
