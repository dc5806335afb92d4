//! Byte-exact command record layouts
//!
//! Every record is 0x20 bytes, little-endian:
//!
//! | Offset | Field                                             |
//! |--------|---------------------------------------------------|
//! | 0x00   | next record offset (`u16`, `0xFFFF` ends a chain) |
//! | 0x02   | command id (`u16`)                                |
//! | 0x04   | finished (`u32`, bit 0 set once processed)        |
//! | 0x08   | flags / first parameter word (`u32`)              |
//! | 0x0C   | 20 parameter bytes                                |

use crate::channel::{Encoding, RepeatMode};
use crate::{CsndError, Result};
use bitflags::bitflags;

/// Size of one command record in bytes
pub const RECORD_SIZE: usize = 0x20;

/// Next-offset value that terminates a command chain
pub const END_OF_CHAIN: u16 = 0xFFFF;

bitflags! {
    /// Completion word of a record
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct RecordStatus: u32 {
        /// Set by the unit after the record was processed
        const FINISHED = 1 << 0;
    }
}

#[inline]
pub(crate) fn read_u16(bytes: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([bytes[offset], bytes[offset + 1]])
}

#[inline]
pub(crate) fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        bytes[offset],
        bytes[offset + 1],
        bytes[offset + 2],
        bytes[offset + 3],
    ])
}

#[inline]
pub(crate) fn write_u16(bytes: &mut [u8], offset: usize, value: u16) {
    bytes[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
}

#[inline]
pub(crate) fn write_u32(bytes: &mut [u8], offset: usize, value: u32) {
    bytes[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

/// Generic record header shared by all commands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordHeader {
    /// Offset of the next record in the shared region
    pub next_offset: u16,
    /// Command id selecting the parameter layout
    pub command_id: u16,
    /// Completion word
    pub status: RecordStatus,
    /// First parameter word
    pub flags: u32,
    /// Remaining parameter bytes
    pub parameters: [u8; 20],
}

impl RecordHeader {
    /// Parse the header of the record at the start of `record`
    pub fn parse(record: &[u8]) -> Result<Self> {
        if record.len() < RECORD_SIZE {
            return Err(CsndError::TruncatedRecord {
                offset: 0,
                len: record.len(),
            });
        }
        let mut parameters = [0u8; 20];
        parameters.copy_from_slice(&record[0x0C..RECORD_SIZE]);
        Ok(RecordHeader {
            next_offset: read_u16(record, 0x00),
            command_id: read_u16(record, 0x02),
            status: RecordStatus::from_bits_retain(read_u32(record, 0x04)),
            flags: read_u32(record, 0x08),
            parameters,
        })
    }

    /// Whether the record was already processed
    pub fn is_finished(&self) -> bool {
        self.status.contains(RecordStatus::FINISHED)
    }
}

/// Set the finished bit of the record at the start of `record`
pub fn mark_finished(record: &mut [u8]) -> Result<()> {
    if record.len() < RECORD_SIZE {
        return Err(CsndError::TruncatedRecord {
            offset: 0,
            len: record.len(),
        });
    }
    let status = RecordStatus::from_bits_retain(read_u32(record, 0x04)) | RecordStatus::FINISHED;
    write_u32(record, 0x04, status.bits());
    Ok(())
}

/// Packed channel flags and timer word of the configuration record
///
/// | Bits   | Field                 |
/// |--------|-----------------------|
/// | 0..5   | channel index         |
/// | 5      | linear interpolation  |
/// | 6..9   | reserved              |
/// | 9..11  | repeat mode           |
/// | 11..13 | encoding              |
/// | 13     | enable playback       |
/// | 14     | reserved              |
/// | 15..32 | timer divisor         |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FlagsTimer(pub u32);

impl FlagsTimer {
    const INTERPOLATION: u32 = 1 << 5;
    const REPEAT_SHIFT: u32 = 9;
    const ENCODING_SHIFT: u32 = 11;
    const PLAYBACK: u32 = 1 << 13;
    const TIMER_SHIFT: u32 = 15;
    const TIMER_MAX: u32 = (1 << 17) - 1;

    /// Channel index (5 bits)
    pub fn channel_index(self) -> u8 {
        (self.0 & 0x1F) as u8
    }

    /// Linear interpolation hint
    pub fn interpolation_enabled(self) -> bool {
        self.0 & Self::INTERPOLATION != 0
    }

    /// Raw repeat mode field (2 bits)
    pub fn repeat_mode_raw(self) -> u8 {
        ((self.0 >> Self::REPEAT_SHIFT) & 0x3) as u8
    }

    /// Raw encoding field (2 bits)
    pub fn encoding_raw(self) -> u8 {
        ((self.0 >> Self::ENCODING_SHIFT) & 0x3) as u8
    }

    /// Start playback immediately after configuration
    pub fn enable_playback(self) -> bool {
        self.0 & Self::PLAYBACK != 0
    }

    /// Timer divisor (17 bits)
    pub fn timer(self) -> u32 {
        self.0 >> Self::TIMER_SHIFT
    }

    /// Pack the word from its fields; out-of-range values are masked
    pub fn pack(
        channel_index: u8,
        interpolation_enabled: bool,
        repeat_mode_raw: u8,
        encoding_raw: u8,
        enable_playback: bool,
        timer: u32,
    ) -> Self {
        let mut raw = (channel_index as u32) & 0x1F;
        if interpolation_enabled {
            raw |= Self::INTERPOLATION;
        }
        raw |= ((repeat_mode_raw as u32) & 0x3) << Self::REPEAT_SHIFT;
        raw |= ((encoding_raw as u32) & 0x3) << Self::ENCODING_SHIFT;
        if enable_playback {
            raw |= Self::PLAYBACK;
        }
        raw |= (timer & Self::TIMER_MAX) << Self::TIMER_SHIFT;
        FlagsTimer(raw)
    }
}

/// Full channel configuration carried by command 0xE
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChannelConfig {
    /// Hardware channel (0..32)
    pub channel_index: u8,
    /// Linear interpolation hint
    pub interpolation_enabled: bool,
    /// One-shot or looping playback
    pub repeat_mode: RepeatMode,
    /// Sample encoding of both blocks
    pub encoding: Encoding,
    /// Start playback immediately
    pub enable_playback: bool,
    /// Timer divisor of the channel sample rate
    pub timer: u32,
    /// Left channel volume
    pub left_volume: u32,
    /// Right channel volume
    pub right_volume: u32,
    /// Capture volume
    pub capture_volume: u32,
    /// Physical address of the first block
    pub first_block_address: u32,
    /// Physical address of the loop block
    pub second_block_address: u32,
    /// Size of each block in bytes
    pub block_size: u32,
}

impl ChannelConfig {
    /// Decode the parameters of a 0xE record
    ///
    /// The volume word holds the left volume in its low half and the right
    /// volume in its high half.
    pub(crate) fn from_record(record: &[u8]) -> Self {
        let flags = FlagsTimer(read_u32(record, 0x08));
        let volume = read_u32(record, 0x0C);
        ChannelConfig {
            channel_index: flags.channel_index(),
            interpolation_enabled: flags.interpolation_enabled(),
            repeat_mode: RepeatMode::from_raw(flags.repeat_mode_raw()),
            encoding: Encoding::from_raw(flags.encoding_raw()),
            enable_playback: flags.enable_playback(),
            timer: flags.timer(),
            left_volume: volume & 0xFFFF,
            right_volume: volume >> 16,
            capture_volume: read_u32(record, 0x10),
            first_block_address: read_u32(record, 0x14),
            second_block_address: read_u32(record, 0x18),
            block_size: read_u32(record, 0x1C),
        }
    }

    /// Packed flags/timer word for this configuration
    pub fn flags_timer(&self) -> FlagsTimer {
        FlagsTimer::pack(
            self.channel_index,
            self.interpolation_enabled,
            self.repeat_mode.raw(),
            self.encoding.raw(),
            self.enable_playback,
            self.timer,
        )
    }

    pub(crate) fn write_parameters(&self, record: &mut [u8]) {
        write_u32(record, 0x08, self.flags_timer().0);
        write_u32(
            record,
            0x0C,
            (self.left_volume & 0xFFFF) | ((self.right_volume & 0xFFFF) << 16),
        );
        write_u32(record, 0x10, self.capture_volume);
        write_u32(record, 0x14, self.first_block_address);
        write_u32(record, 0x18, self.second_block_address);
        write_u32(record, 0x1C, self.block_size);
    }
}
