//! Per-channel decode and playback
//!
//! A channel is configured once from a [`ChannelConfig`](crate::ChannelConfig):
//! its sample blocks are read from guest memory, decoded to stereo frames and
//! converted to the native rate up front. Afterwards every tick pulls a fixed
//! number of frames from it.

pub mod decode;
pub mod resample;
mod source;

pub use source::{ActiveBlock, BlockDescriptor, ChannelSource, PlaybackState};

/// Sample encoding of a channel's blocks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Encoding {
    /// Signed 8-bit mono
    #[default]
    Pcm8,
    /// Signed 16-bit interleaved stereo
    Pcm16,
    /// IMA-ADPCM (not decoded)
    Adpcm,
    /// Tone generator (not synthesized)
    Tone,
    /// Encoding value outside the hardware field
    Unknown(u8),
}

impl Encoding {
    /// Map the 2-bit hardware field
    pub fn from_raw(raw: u8) -> Self {
        match raw {
            0 => Encoding::Pcm8,
            1 => Encoding::Pcm16,
            2 => Encoding::Adpcm,
            3 => Encoding::Tone,
            other => Encoding::Unknown(other),
        }
    }

    /// Hardware field value
    pub fn raw(self) -> u8 {
        match self {
            Encoding::Pcm8 => 0,
            Encoding::Pcm16 => 1,
            Encoding::Adpcm => 2,
            Encoding::Tone => 3,
            Encoding::Unknown(raw) => raw,
        }
    }

    /// Whether blocks in this encoding can be decoded
    pub fn is_supported(self) -> bool {
        matches!(self, Encoding::Pcm8 | Encoding::Pcm16)
    }

    /// Encoded bytes consumed per decoded stereo frame
    ///
    /// Block exhaustion is measured in bytes of the source block, so this is
    /// the factor between frames played and bytes consumed.
    pub fn width_factor(self) -> f64 {
        match self {
            Encoding::Pcm8 => 1.0,
            Encoding::Pcm16 => 4.0,
            Encoding::Adpcm => 0.5,
            Encoding::Tone | Encoding::Unknown(_) => 1.0,
        }
    }
}

/// What happens when a block is exhausted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RepeatMode {
    /// Play the first block once, then stay silent
    #[default]
    OneShot,
    /// Play the first block, then repeat the second block forever
    Loop,
}

impl RepeatMode {
    /// Map the 2-bit hardware field; only `1` loops
    pub fn from_raw(raw: u8) -> Self {
        match raw {
            1 => RepeatMode::Loop,
            _ => RepeatMode::OneShot,
        }
    }

    /// Hardware field value
    pub fn raw(self) -> u8 {
        match self {
            RepeatMode::Loop => 1,
            RepeatMode::OneShot => 2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encoding_raw_mapping() {
        for raw in 0..4 {
            assert_eq!(Encoding::from_raw(raw).raw(), raw);
        }
        assert_eq!(Encoding::from_raw(7), Encoding::Unknown(7));
        assert!(Encoding::Pcm16.is_supported());
        assert!(!Encoding::Adpcm.is_supported());
        assert!(!Encoding::Tone.is_supported());
    }

    #[test]
    fn test_repeat_mode_raw_mapping() {
        assert_eq!(RepeatMode::from_raw(0), RepeatMode::OneShot);
        assert_eq!(RepeatMode::from_raw(1), RepeatMode::Loop);
        assert_eq!(RepeatMode::from_raw(2), RepeatMode::OneShot);
        assert_eq!(RepeatMode::from_raw(3), RepeatMode::OneShot);
        assert_eq!(RepeatMode::from_raw(RepeatMode::Loop.raw()), RepeatMode::Loop);
    }
}
