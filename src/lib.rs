//! CSND sound coprocessor HLE
//!
//! High-level emulation of the fixed-function, 32-channel CSND audio unit.
//! Guest software hands the unit 32-byte command records through shared
//! memory; this crate decodes those records, turns the referenced sample
//! blocks into per-channel playback sources, mixes all channels into one
//! saturated stereo stream once per tick, and serves that stream to a host
//! audio device through a bounded frame queue.
//!
//! # Features
//! - PCM8 and PCM16 sample decoding with rate conversion to the native rate
//! - One-shot and looping (first block, then second block) playback
//! - Saturating 32-channel mixer
//! - Virtual-clock tick scheduling with lateness correction
//! - Device callback with time stretching, underrun masking and a 60 dB
//!   volume curve
//!
//! # Crate feature flags
//! - `streaming` (opt-in): Real-time audio output via rodio (`AudioDevice`)
//! - `export-wav` (opt-in): Offline rendering to WAV files (`export`)
//!
//! # Quick start
//! ```no_run
//! use std::sync::Arc;
//! use csnd::{Csnd, CsndConfig, NullSink, PhysicalMemory, VirtualClock};
//! use csnd::command::{ChannelConfig, Command};
//! use csnd::channel::{Encoding, RepeatMode};
//!
//! let memory = Arc::new(PhysicalMemory::new());
//! memory.map_region(0x2000_0000, 0x1000);
//! memory.write(0x2000_0000, &[0u8; 64]).unwrap();
//!
//! let mut clock = VirtualClock::new();
//! let csnd = Csnd::new(CsndConfig::default(), memory, &mut clock);
//!
//! let mut sink = NullSink::new();
//! csnd.engine().set_sink(&mut sink).unwrap();
//!
//! let config = ChannelConfig {
//!     channel_index: 8,
//!     encoding: Encoding::Pcm16,
//!     repeat_mode: RepeatMode::OneShot,
//!     enable_playback: true,
//!     timer: 2048,
//!     first_block_address: 0x2000_0000,
//!     block_size: 64,
//!     ..ChannelConfig::default()
//! };
//! csnd.submit(&Command::ConfigureChannel(config)).unwrap();
//!
//! clock.advance(csnd::constants::TICK_PERIOD_CYCLES);
//! let mut out = vec![[0i16; 2]; 160];
//! sink.render(&mut out);
//! ```

#![warn(missing_docs)]

pub mod channel; // Per-channel decode and playback
pub mod command; // Command record decoding
pub mod config; // Runtime configuration
pub mod constants; // Hardware constants
pub mod engine; // Control plane and tick
pub mod memory; // Guest physical memory access
pub mod mixer; // Channel table and saturating mixer
pub mod service; // Guest-facing service surface
pub mod streaming; // Frame queue, stretching and device output
pub mod timing; // Virtual clock scheduling

#[cfg(feature = "export-wav")]
pub mod export; // Offline WAV rendering

use channel::Encoding;

/// One stereo output sample pair: `[left, right]`.
pub type StereoFrame = [i16; 2];

/// Error types for CSND emulation
#[derive(thiserror::Error, Debug)]
pub enum CsndError {
    /// Channel encoding has no decoder; the channel stays silent
    #[error("Unsupported encoding: {0:?}")]
    UnsupportedEncoding(Encoding),

    /// Timer divisor that cannot produce a sample rate
    #[error("Invalid timer divisor: {0}")]
    InvalidTimer(u32),

    /// Command references a channel with no active source
    #[error("No active source for channel {0}")]
    UnknownChannel(u8),

    /// Channel index outside the hardware channel range
    #[error("Channel index {0} out of range")]
    ChannelIndexOutOfRange(u32),

    /// A fixed-capacity resource has no free slot
    #[error("Resource exhausted: {0}")]
    ResourceExhausted(&'static str),

    /// No audio sink is selected
    ///
    /// Only queue accessors report this. A tick without a sink mixes as
    /// usual and drops the frames silently.
    #[error("No audio sink selected")]
    SinkUnavailable,

    /// Command record with an id this unit does not implement
    #[error("Unknown command id 0x{0:02X}")]
    UnknownCommand(u16),

    /// Record extends past the end of the backing buffer
    #[error("Truncated command record at offset 0x{offset:X} ({len} bytes available)")]
    TruncatedRecord {
        /// Offset of the record
        offset: usize,
        /// Bytes available from that offset
        len: usize,
    },

    /// Physical address range not backed by memory
    #[error("Unmapped physical memory at 0x{addr:08X} (+0x{len:X})")]
    UnmappedMemory {
        /// Start address
        addr: u32,
        /// Requested length
        len: usize,
    },

    /// Command execution requested before the shared region exists
    #[error("Shared memory not initialized")]
    SharedMemoryNotInitialized,

    /// Capture unit index outside the unit table
    #[error("Invalid capture unit {0}")]
    InvalidCaptureUnit(u32),

    /// Sample rate conversion failure
    #[error("Resampling failed: {0}")]
    Resample(String),

    /// Audio device error
    #[error("Audio device error: {0}")]
    AudioDeviceError(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    /// IO error from filesystem or device
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for CSND operations
pub type Result<T> = std::result::Result<T, CsndError>;

// Public API exports
pub use channel::ChannelSource;
pub use command::{ChannelConfig, Command};
pub use config::CsndConfig;
pub use engine::{Csnd, CsndEngine};
pub use memory::{MemoryAccessor, PhysicalMemory};
pub use mixer::Mixer;
pub use service::CsndService;
pub use streaming::{FrameQueue, NullSink, Sink, TimeStretcher};
pub use timing::{Scheduler, VirtualClock};

#[cfg(feature = "streaming")]
pub use streaming::AudioDevice;
