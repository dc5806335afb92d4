//! Channel playback source
//!
//! Holds one channel's decoded blocks and walks them tick by tick.

use super::decode::decode_block;
use super::resample::resample;
use super::RepeatMode;
use crate::command::ChannelConfig;
use crate::constants::{timer_to_sample_rate, MAX_BLOCK_SIZE};
use crate::memory::MemoryAccessor;
use crate::{CsndError, Result, StereoFrame};
use tracing::{debug, trace, warn};

/// Block currently being played
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ActiveBlock {
    /// First block, played once
    #[default]
    First,
    /// Loop block
    Second,
}

/// Observable playback state of a source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    /// No decoded data (not loaded, or decoding failed)
    Idle,
    /// Reading the first block
    PlayingFirst,
    /// Reading the loop block
    PlayingSecond,
    /// One-shot source past the end of its block
    Exhausted,
}

/// Guest memory range holding one raw block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockDescriptor {
    /// Physical start address
    pub address: u32,
    /// Length in bytes
    pub size: u32,
}

/// One configured hardware channel
#[derive(Debug, Clone)]
pub struct ChannelSource {
    config: ChannelConfig,
    native_rate: u32,
    source_rate: Option<u32>,
    first_samples: Vec<StereoFrame>,
    second_samples: Vec<StereoFrame>,
    active_block: ActiveBlock,
    read_offset: usize,
    block_progress: f64,
    playback_enabled: bool,
    exhausted: bool,
    loaded: bool,
}

impl ChannelSource {
    /// Create an idle source for `config`; call [`load`](Self::load) to decode
    pub fn new(config: &ChannelConfig, native_rate: u32) -> Self {
        ChannelSource {
            config: *config,
            native_rate,
            source_rate: timer_to_sample_rate(config.timer),
            first_samples: Vec::new(),
            second_samples: Vec::new(),
            active_block: ActiveBlock::First,
            read_offset: 0,
            block_progress: 0.0,
            playback_enabled: config.enable_playback,
            exhausted: false,
            loaded: false,
        }
    }

    /// Read, decode and rate-convert the configured blocks
    ///
    /// On error the source stays idle and produces silence, but keeps
    /// accepting playback toggles.
    pub fn load(&mut self, memory: &dyn MemoryAccessor) -> Result<()> {
        self.first_samples.clear();
        self.second_samples.clear();
        self.reset_position();
        self.loaded = false;

        let channel = self.config.channel_index;
        let Some(source_rate) = self.source_rate else {
            warn!(
                "Channel {}: invalid timer divisor {}, channel stays silent",
                channel, self.config.timer
            );
            return Err(CsndError::InvalidTimer(self.config.timer));
        };
        if !self.config.encoding.is_supported() {
            warn!(
                "Channel {}: unsupported encoding {:?}, channel stays silent",
                channel, self.config.encoding
            );
            return Err(CsndError::UnsupportedEncoding(self.config.encoding));
        }

        self.first_samples = self.load_block(memory, self.first_block(), source_rate)?;
        if self.config.repeat_mode == RepeatMode::Loop {
            self.second_samples = self.load_block(memory, self.second_block(), source_rate)?;
        }
        self.loaded = true;

        debug!(
            "Channel {}: loaded {:?} {:?} at {}Hz, {} + {} frames",
            channel,
            self.config.encoding,
            self.config.repeat_mode,
            source_rate,
            self.first_samples.len(),
            self.second_samples.len()
        );
        Ok(())
    }

    fn load_block(
        &self,
        memory: &dyn MemoryAccessor,
        block: BlockDescriptor,
        source_rate: u32,
    ) -> Result<Vec<StereoFrame>> {
        if block.size as usize > MAX_BLOCK_SIZE {
            return Err(CsndError::UnmappedMemory {
                addr: block.address,
                len: block.size as usize,
            });
        }
        let mut raw = vec![0u8; block.size as usize];
        memory.read_physical(block.address, &mut raw)?;

        let decoded = decode_block(self.config.encoding, &raw)?;
        match resample(&decoded, source_rate, self.native_rate) {
            Ok(frames) => Ok(frames),
            Err(e) => {
                warn!(
                    "Channel {}: {}, playing block unconverted",
                    self.config.channel_index, e
                );
                Ok(decoded)
            }
        }
    }

    /// Produce the next `out.len()` frames
    ///
    /// `out` is always fully written; positions past the decoded data are
    /// silent.
    pub fn tick(&mut self, out: &mut [StereoFrame]) {
        out.fill([0, 0]);
        if !self.playback_enabled || !self.loaded || self.exhausted {
            return;
        }

        if self.block_progress > self.config.block_size as f64 {
            match self.config.repeat_mode {
                RepeatMode::Loop => {
                    trace!(
                        "Channel {}: block exhausted, (re)starting loop block",
                        self.config.channel_index
                    );
                    self.active_block = ActiveBlock::Second;
                    self.read_offset = 0;
                    self.block_progress = 0.0;
                }
                RepeatMode::OneShot => {
                    trace!("Channel {}: one-shot block exhausted", self.config.channel_index);
                    self.exhausted = true;
                    return;
                }
            }
        }

        let samples = match self.active_block {
            ActiveBlock::First => &self.first_samples,
            ActiveBlock::Second => &self.second_samples,
        };
        if let Some(available) = samples.get(self.read_offset..) {
            let count = available.len().min(out.len());
            out[..count].copy_from_slice(&available[..count]);
        }

        let frames = out.len();
        self.read_offset = self.read_offset.saturating_add(frames);
        self.block_progress += frames as f64 * self.rate_ratio() * self.config.encoding.width_factor();
    }

    fn rate_ratio(&self) -> f64 {
        match self.source_rate {
            Some(rate) if self.native_rate != 0 => rate as f64 / self.native_rate as f64,
            _ => 0.0,
        }
    }

    fn reset_position(&mut self) {
        self.active_block = ActiveBlock::First;
        self.read_offset = 0;
        self.block_progress = 0.0;
        self.exhausted = false;
    }

    /// Start or pause playback; the position is kept either way
    pub fn set_playback_enabled(&mut self, enabled: bool) {
        self.playback_enabled = enabled;
    }

    /// Whether the channel is playing
    pub fn playback_enabled(&self) -> bool {
        self.playback_enabled
    }

    /// Current playback state
    pub fn playback_state(&self) -> PlaybackState {
        if !self.loaded {
            return PlaybackState::Idle;
        }
        let past_end = self.block_progress > self.config.block_size as f64;
        if self.exhausted || (past_end && self.config.repeat_mode == RepeatMode::OneShot) {
            return PlaybackState::Exhausted;
        }
        match self.active_block {
            ActiveBlock::First => PlaybackState::PlayingFirst,
            ActiveBlock::Second => PlaybackState::PlayingSecond,
        }
    }

    /// Configuration this source was built from
    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    /// Hardware channel index
    pub fn channel_index(&self) -> u8 {
        self.config.channel_index
    }

    /// Sample rate derived from the timer, `None` for a degenerate timer
    pub fn source_sample_rate(&self) -> Option<u32> {
        self.source_rate
    }

    /// First block range
    pub fn first_block(&self) -> BlockDescriptor {
        BlockDescriptor {
            address: self.config.first_block_address,
            size: self.config.block_size,
        }
    }

    /// Loop block range
    pub fn second_block(&self) -> BlockDescriptor {
        BlockDescriptor {
            address: self.config.second_block_address,
            size: self.config.block_size,
        }
    }

    /// Block currently read from
    pub fn active_block(&self) -> ActiveBlock {
        self.active_block
    }

    /// Frame offset into the active block
    pub fn read_offset(&self) -> usize {
        self.read_offset
    }

    /// Bytes of the active source block consumed so far
    pub fn block_progress(&self) -> f64 {
        self.block_progress
    }

    /// Decoded frames of the first block
    pub fn first_samples(&self) -> &[StereoFrame] {
        &self.first_samples
    }

    /// Decoded frames of the loop block
    pub fn second_samples(&self) -> &[StereoFrame] {
        &self.second_samples
    }
}
