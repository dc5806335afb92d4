//! Tempo-adaptive time stretcher
//!
//! Absorbs the drift between the emulated tick rate and the host device
//! rate. Each call estimates the ratio of frames supplied to frames
//! requested, nudges it so the internal backlog settles around half of the
//! target latency, smooths it with a low-pass filter and plays the input at
//! that tempo. Pitch is preserved by windowed overlap-add of fixed grains.

use crate::StereoFrame;
use std::collections::VecDeque;
use std::f32::consts::PI;
use tracing::trace;

/// Grain length in frames
const GRAIN: usize = 512;

/// Output hop between grains (50% overlap)
const HOP: usize = GRAIN / 2;

/// Backlog the ratio controller aims at, in seconds of output
const MAX_LATENCY: f64 = 0.25;

/// Backlog fullness above which new input is discarded
const MAX_BACKLOG_FULLNESS: f64 = 4.0;

/// Response time of the backlog correction (seconds)
const TWEAK_TIME_SCALE: f64 = 0.05;

/// Response time of the ratio low-pass filter (seconds)
const LPF_TIME_SCALE: f64 = 0.712;

/// Slowest tempo; long runs of startup silence need no stretching
const MIN_RATIO: f64 = 0.05;

/// Time stretcher fed from the frame queue by the device callback
#[derive(Debug)]
pub struct TimeStretcher {
    sample_rate: u32,
    stretch_ratio: f64,
    window: Vec<f32>,
    input: Vec<[f32; 2]>,
    input_pos: f64,
    overlap: Vec<[f32; 2]>,
    output: VecDeque<StereoFrame>,
}

impl TimeStretcher {
    /// Create a stretcher for a device running at `sample_rate`
    pub fn new(sample_rate: u32) -> Self {
        // periodic Hann: two windows half a grain apart sum to one
        let window = (0..GRAIN)
            .map(|n| 0.5 - 0.5 * (2.0 * PI * n as f32 / GRAIN as f32).cos())
            .collect();
        TimeStretcher {
            sample_rate: sample_rate.max(1),
            stretch_ratio: 1.0,
            window,
            input: Vec::new(),
            input_pos: 0.0,
            overlap: vec![[0.0; 2]; GRAIN],
            output: VecDeque::new(),
        }
    }

    /// Change the device rate the ratio controller works in
    pub fn set_output_sample_rate(&mut self, sample_rate: u32) {
        self.sample_rate = sample_rate.max(1);
    }

    /// Current smoothed tempo (input frames consumed per output frame)
    pub fn stretch_ratio(&self) -> f64 {
        self.stretch_ratio
    }

    /// Frames ready to be handed out
    pub fn backlog(&self) -> usize {
        self.output.len()
    }

    /// Feed `input` and write up to `out.len()` stretched frames
    ///
    /// Returns the number of frames written to the front of `out`.
    pub fn process(&mut self, input: &[StereoFrame], out: &mut [StereoFrame]) -> usize {
        if out.is_empty() {
            self.put_frames(input);
            return 0;
        }

        let num_out = out.len() as f64;
        let time_delta = num_out / self.sample_rate as f64;
        let mut current_ratio = input.len() as f64 / num_out;

        let max_backlog = self.sample_rate as f64 * MAX_LATENCY;
        let backlog_fullness = self.output.len() as f64 / max_backlog;
        let input: &[StereoFrame] = if backlog_fullness > MAX_BACKLOG_FULLNESS {
            &[]
        } else {
            input
        };

        // aim for a half-full backlog
        let tweak_correction = (backlog_fullness - 0.5) * (time_delta / TWEAK_TIME_SCALE);
        current_ratio *= (1.0 + 2.0 * tweak_correction).powf(if tweak_correction < 0.0 {
            3.0
        } else {
            1.0
        });

        let lpf_gain = 1.0 - (-time_delta / LPF_TIME_SCALE).exp();
        self.stretch_ratio += lpf_gain * (current_ratio - self.stretch_ratio);
        self.stretch_ratio = self.stretch_ratio.max(MIN_RATIO);

        trace!(
            "{:5}/{:5} ratio:{:0.6} backlog:{:0.6}",
            input.len(),
            out.len(),
            self.stretch_ratio,
            backlog_fullness
        );

        self.put_frames(input);
        self.receive(out)
    }

    /// Move every buffered input frame to the output, padding the last grain
    pub fn flush(&mut self) {
        if self.input.is_empty() && self.overlap.iter().all(|f| *f == [0.0, 0.0]) {
            return;
        }
        self.input.extend(std::iter::repeat([0.0, 0.0]).take(GRAIN));
        self.run();

        let tail = GRAIN - HOP;
        for frame in &self.overlap[..tail] {
            self.output.push_back(to_frame(*frame));
        }
        self.input.clear();
        self.input_pos = 0.0;
        self.overlap.fill([0.0, 0.0]);
    }

    /// Pop already stretched frames without feeding input or touching the ratio
    pub fn receive(&mut self, out: &mut [StereoFrame]) -> usize {
        let count = self.output.len().min(out.len());
        for (dst, frame) in out.iter_mut().zip(self.output.drain(..count)) {
            *dst = frame;
        }
        count
    }

    /// Drop all buffered audio and reset the tempo
    pub fn clear(&mut self) {
        self.input.clear();
        self.input_pos = 0.0;
        self.overlap.fill([0.0, 0.0]);
        self.output.clear();
        self.stretch_ratio = 1.0;
    }

    fn put_frames(&mut self, frames: &[StereoFrame]) {
        self.input
            .extend(frames.iter().map(|f| [f[0] as f32, f[1] as f32]));
        self.run();
    }

    /// Overlap-add every grain the buffered input can supply
    fn run(&mut self) {
        let analysis_hop = HOP as f64 * self.stretch_ratio;
        loop {
            let start = self.input_pos as usize;
            if start + GRAIN > self.input.len() {
                break;
            }

            for ((acc, sample), w) in self
                .overlap
                .iter_mut()
                .zip(&self.input[start..start + GRAIN])
                .zip(&self.window)
            {
                acc[0] += sample[0] * w;
                acc[1] += sample[1] * w;
            }

            for frame in &self.overlap[..HOP] {
                self.output.push_back(to_frame(*frame));
            }
            self.overlap.copy_within(HOP.., 0);
            self.overlap[GRAIN - HOP..].fill([0.0, 0.0]);

            self.input_pos += analysis_hop;
            let consumed = (self.input_pos as usize).min(self.input.len());
            self.input.drain(..consumed);
            self.input_pos -= consumed as f64;
        }
    }
}

#[inline]
fn to_frame(frame: [f32; 2]) -> StereoFrame {
    [
        frame[0].round().clamp(-32768.0, 32767.0) as i16,
        frame[1].round().clamp(-32768.0, 32767.0) as i16,
    ]
}
