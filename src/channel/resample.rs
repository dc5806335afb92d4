//! Sample rate conversion using rubato
//!
//! Blocks are converted once, at configuration time, from the channel's
//! timer-derived rate to the native mixing rate.

use crate::{CsndError, Result, StereoFrame};
use rubato::{FastFixedIn, PolynomialDegree, Resampler};
use tracing::debug;

/// Convert stereo frames from `input_rate` to `output_rate`
///
/// Equal rates (and empty input) return an exact copy.
pub fn resample(frames: &[StereoFrame], input_rate: u32, output_rate: u32) -> Result<Vec<StereoFrame>> {
    if input_rate == output_rate || frames.is_empty() {
        return Ok(frames.to_vec());
    }
    if input_rate == 0 || output_rate == 0 {
        return Err(CsndError::Resample(format!(
            "cannot convert {}Hz to {}Hz",
            input_rate, output_rate
        )));
    }

    debug!(
        "Resampling {} frames from {}Hz to {}Hz",
        frames.len(),
        input_rate,
        output_rate
    );

    let planar_input = deinterleave(frames);

    let mut resampler = FastFixedIn::<f32>::new(
        output_rate as f64 / input_rate as f64,
        1.0,
        PolynomialDegree::Cubic,
        frames.len(),
        2,
    )
    .map_err(|e| CsndError::Resample(e.to_string()))?;

    let planar_output = resampler
        .process(&planar_input, None)
        .map_err(|e| CsndError::Resample(e.to_string()))?;

    Ok(interleave(&planar_output))
}

fn deinterleave(frames: &[StereoFrame]) -> [Vec<f32>; 2] {
    let mut left = Vec::with_capacity(frames.len());
    let mut right = Vec::with_capacity(frames.len());
    for frame in frames {
        left.push(frame[0] as f32 / 32768.0);
        right.push(frame[1] as f32 / 32768.0);
    }
    [left, right]
}

fn interleave(planar: &[Vec<f32>]) -> Vec<StereoFrame> {
    let (Some(left), Some(right)) = (planar.first(), planar.get(1)) else {
        return Vec::new();
    };
    left.iter()
        .zip(right)
        .map(|(&l, &r)| [to_i16(l), to_i16(r)])
        .collect()
}

#[inline]
fn to_i16(sample: f32) -> i16 {
    (sample * 32768.0).round().clamp(-32768.0, 32767.0) as i16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_rate_is_exact_copy() {
        let frames: Vec<StereoFrame> = (0..100).map(|i| [i * 7, -i * 3]).collect();
        let output = resample(&frames, 32728, 32728).unwrap();
        assert_eq!(output, frames);
    }

    #[test]
    fn test_empty_input() {
        assert!(resample(&[], 22050, 32728).unwrap().is_empty());
    }

    #[test]
    fn test_upsample_length() {
        let input_rate = 16364;
        let frames: Vec<StereoFrame> = (0..1000)
            .map(|i| {
                let t = i as f32 / input_rate as f32;
                let s = ((2.0 * std::f32::consts::PI * 440.0 * t).sin() * 8000.0) as i16;
                [s, s]
            })
            .collect();

        let output = resample(&frames, input_rate, 32728).unwrap();
        let expected = 2000usize;
        assert!(
            output.len().abs_diff(expected) <= 32,
            "Expected ~{} frames, got {}",
            expected,
            output.len()
        );
    }

    #[test]
    fn test_interleave_round_trip_scale() {
        let planar = deinterleave(&[[16384, -16384]]);
        assert_eq!(planar[0], vec![0.5]);
        assert_eq!(interleave(&planar), vec![[16384, -16384]]);
    }
}
