//! CSND Hardware Constants
//!
//! Clock rates, channel counts and pipeline sizes shared across components.

/// Clock the channel timers divide down: `sample_rate = FIXED_CLOCK / timer`.
pub const FIXED_CLOCK: u32 = 0x3FEC3FC;

/// Rate every channel is converted to before mixing (Hz).
pub const NATIVE_SAMPLE_RATE: u32 = 32728;

/// Stereo frames produced by the mixer per tick.
pub const SAMPLES_PER_TICK: usize = 160;

/// ARM11 core clock (Hz), the unit of the virtual clock.
pub const BASE_CLOCK_RATE_ARM11: u64 = 268_111_856;

/// Virtual-clock cycles between two mixer ticks (one audio frame, ARM11 cycles).
pub const TICK_PERIOD_CYCLES: u64 = 1_310_252;

/// Number of hardware channels.
pub const MAX_CHANNELS: usize = 32;

/// Default capacity of the frame queue between the tick and the device callback.
pub const FRAME_QUEUE_CAPACITY: usize = 0x2000;

/// Largest block a channel may reference (size of guest FCRAM).
pub const MAX_BLOCK_SIZE: usize = 0x0800_0000;

/// Number of capture units the unit exposes.
pub const MAX_CAPTURE_UNITS: usize = 2;

/// Channel mask reported to guests acquiring sound channels.
pub const SOUND_CHANNEL_MASK: u32 = 0xFFFF_FF00;

/// Exponent of the volume slider curve (`ln(1000)`, 60 dB of range).
pub const VOLUME_CURVE_K: f32 = 6.907_755;

/// Convert a duration in microseconds to virtual-clock cycles.
#[inline]
pub fn us_to_cycles(us: u64) -> u64 {
    ((us as u128 * BASE_CLOCK_RATE_ARM11 as u128) / 1_000_000) as u64
}

/// Derive a channel's sample rate from its timer divisor.
///
/// Returns `None` for divisors that cannot produce a usable rate
/// (zero, or larger than the clock itself).
#[inline]
pub fn timer_to_sample_rate(timer: u32) -> Option<u32> {
    if timer == 0 {
        return None;
    }
    match FIXED_CLOCK / timer {
        0 => None,
        rate => Some(rate),
    }
}
