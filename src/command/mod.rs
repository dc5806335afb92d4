//! Command record decoding
//!
//! Raw records are turned into a typed [`Command`] before any handler runs,
//! so every id the unit does not implement takes the same error path.

mod record;

pub use record::{
    mark_finished, ChannelConfig, FlagsTimer, RecordHeader, RecordStatus, END_OF_CHAIN,
    RECORD_SIZE,
};

use crate::constants::MAX_CHANNELS;
use crate::{CsndError, Result};
use record::{read_u32, write_u16, write_u32};

/// Command id of the playback toggle
pub const CMD_SET_PLAY_STATE: u16 = 0x1;

/// Legacy id handled as a playback toggle
pub const CMD_SET_PLAY_STATE_LEGACY: u16 = 0x0;

/// Command id of the full channel configuration
pub const CMD_CONFIGURE_CHANNEL: u16 = 0xE;

/// A decoded command record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Start or stop an already configured channel
    SetPlayState {
        /// Target channel
        channel_index: u8,
        /// Play (`true`) or stop (`false`)
        enable_playback: bool,
    },
    /// Replace a channel with a freshly configured one
    ConfigureChannel(ChannelConfig),
}

impl Command {
    /// Decode the record at the start of `record`
    pub fn decode(record: &[u8]) -> Result<Self> {
        let header = RecordHeader::parse(record)?;
        match header.command_id {
            CMD_SET_PLAY_STATE | CMD_SET_PLAY_STATE_LEGACY => {
                let channel_index = read_u32(record, 0x08);
                if channel_index as usize >= MAX_CHANNELS {
                    return Err(CsndError::ChannelIndexOutOfRange(channel_index));
                }
                Ok(Command::SetPlayState {
                    channel_index: channel_index as u8,
                    enable_playback: read_u32(record, 0x0C) != 0,
                })
            }
            CMD_CONFIGURE_CHANNEL => Ok(Command::ConfigureChannel(ChannelConfig::from_record(
                record,
            ))),
            id => Err(CsndError::UnknownCommand(id)),
        }
    }

    /// Command id this command is encoded with
    pub fn command_id(&self) -> u16 {
        match self {
            Command::SetPlayState { .. } => CMD_SET_PLAY_STATE,
            Command::ConfigureChannel(_) => CMD_CONFIGURE_CHANNEL,
        }
    }

    /// Channel the command targets
    pub fn channel_index(&self) -> u8 {
        match self {
            Command::SetPlayState { channel_index, .. } => *channel_index,
            Command::ConfigureChannel(config) => config.channel_index,
        }
    }

    /// Encode as a guest would write it, with an unset finished bit
    pub fn encode(&self, next_offset: u16) -> [u8; RECORD_SIZE] {
        let mut record = [0u8; RECORD_SIZE];
        write_u16(&mut record, 0x00, next_offset);
        write_u16(&mut record, 0x02, self.command_id());
        match self {
            Command::SetPlayState {
                channel_index,
                enable_playback,
            } => {
                write_u32(&mut record, 0x08, *channel_index as u32);
                write_u32(&mut record, 0x0C, *enable_playback as u32);
            }
            Command::ConfigureChannel(config) => config.write_parameters(&mut record),
        }
        record
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{Encoding, RepeatMode};

    #[test]
    fn test_decode_configure_channel() {
        let config = ChannelConfig {
            channel_index: 9,
            interpolation_enabled: true,
            repeat_mode: RepeatMode::Loop,
            encoding: Encoding::Pcm8,
            enable_playback: true,
            timer: 0x1000,
            left_volume: 0x8000,
            right_volume: 0x4000,
            capture_volume: 0x7FFF,
            first_block_address: 0x2000_1000,
            second_block_address: 0x2000_2000,
            block_size: 0x800,
        };
        let record = Command::ConfigureChannel(config).encode(END_OF_CHAIN);

        assert_eq!(
            Command::decode(&record).unwrap(),
            Command::ConfigureChannel(config)
        );
    }

    #[test]
    fn test_decode_play_state() {
        let record = Command::SetPlayState {
            channel_index: 12,
            enable_playback: false,
        }
        .encode(0x40);
        let header = RecordHeader::parse(&record).unwrap();
        assert_eq!(header.next_offset, 0x40);
        assert_eq!(header.command_id, CMD_SET_PLAY_STATE);

        match Command::decode(&record).unwrap() {
            Command::SetPlayState {
                channel_index,
                enable_playback,
            } => {
                assert_eq!(channel_index, 12);
                assert!(!enable_playback);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_legacy_id_is_play_state() {
        let mut record = [0u8; RECORD_SIZE];
        write_u16(&mut record, 0x02, CMD_SET_PLAY_STATE_LEGACY);
        write_u32(&mut record, 0x08, 4);
        write_u32(&mut record, 0x0C, 1);

        assert_eq!(
            Command::decode(&record).unwrap(),
            Command::SetPlayState {
                channel_index: 4,
                enable_playback: true
            }
        );
    }

    #[test]
    fn test_unknown_command_rejected() {
        let mut record = [0u8; RECORD_SIZE];
        write_u16(&mut record, 0x02, 0x0009);
        assert!(matches!(
            Command::decode(&record),
            Err(CsndError::UnknownCommand(0x9))
        ));
    }

    #[test]
    fn test_play_state_channel_out_of_range() {
        let mut record = [0u8; RECORD_SIZE];
        write_u16(&mut record, 0x02, CMD_SET_PLAY_STATE);
        write_u32(&mut record, 0x08, 32);
        assert!(matches!(
            Command::decode(&record),
            Err(CsndError::ChannelIndexOutOfRange(32))
        ));
    }
}
