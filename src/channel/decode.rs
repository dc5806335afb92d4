//! Sample block decoders
//!
//! Decoders produce stereo frames at the channel's own sample rate. Mono
//! sources are duplicated into both channels.

use super::Encoding;
use crate::{CsndError, Result, StereoFrame};

/// Decode signed 8-bit mono samples (`v` becomes `v * 256` on both sides)
pub fn decode_pcm8(data: &[u8]) -> Vec<StereoFrame> {
    data.iter()
        .map(|&byte| {
            let sample = ((byte as i8) as i16) << 8;
            [sample, sample]
        })
        .collect()
}

/// Decode signed 16-bit little-endian interleaved stereo samples
///
/// A trailing partial frame is ignored.
pub fn decode_pcm16(data: &[u8]) -> Vec<StereoFrame> {
    data.chunks_exact(4)
        .map(|c| {
            [
                i16::from_le_bytes([c[0], c[1]]),
                i16::from_le_bytes([c[2], c[3]]),
            ]
        })
        .collect()
}

/// Decode a raw block in the given encoding
pub fn decode_block(encoding: Encoding, data: &[u8]) -> Result<Vec<StereoFrame>> {
    match encoding {
        Encoding::Pcm8 => Ok(decode_pcm8(data)),
        Encoding::Pcm16 => Ok(decode_pcm16(data)),
        other => Err(CsndError::UnsupportedEncoding(other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pcm8_decode_law() {
        let data: Vec<u8> = (i8::MIN..=i8::MAX).map(|v| v as u8).collect();
        let frames = decode_pcm8(&data);

        assert_eq!(frames.len(), 256);
        for (v, frame) in (i8::MIN..=i8::MAX).zip(&frames) {
            assert_eq!(frame[0], v as i16 * 256);
            assert_eq!(frame[0], frame[1], "mono source duplicated to both sides");
        }
        assert_eq!(frames[0], [-32768, -32768]);
        assert_eq!(frames[255], [32512, 32512]);
    }

    #[test]
    fn test_pcm16_passthrough() {
        let samples: [i16; 6] = [100, -100, i16::MAX, i16::MIN, 0, 7];
        let data: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
        let frames = decode_pcm16(&data);

        let flat: Vec<i16> = frames.iter().flatten().copied().collect();
        assert_eq!(flat, samples);
    }

    #[test]
    fn test_pcm16_ignores_partial_frame() {
        let frames = decode_pcm16(&[1, 0, 2, 0, 3, 0]);
        assert_eq!(frames, vec![[1, 2]]);
    }

    #[test]
    fn test_unsupported_encodings() {
        for encoding in [Encoding::Adpcm, Encoding::Tone, Encoding::Unknown(5)] {
            assert!(matches!(
                decode_block(encoding, &[0; 16]),
                Err(CsndError::UnsupportedEncoding(e)) if e == encoding
            ));
        }
    }
}
