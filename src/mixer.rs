//! Channel table and saturating frame mixer

use crate::channel::ChannelSource;
use crate::constants::MAX_CHANNELS;
use crate::StereoFrame;

/// Clamp a wide accumulator sample into the 16-bit output range
#[inline]
pub fn saturate(sample: i32) -> i16 {
    sample.clamp(i16::MIN as i32, i16::MAX as i32) as i16
}

/// Fixed table of channel sources, one slot per hardware channel
///
/// Installing into an occupied slot replaces the previous source, so a
/// channel index never has more than one source.
#[derive(Debug)]
pub struct Mixer {
    slots: [Option<ChannelSource>; MAX_CHANNELS],
    channel_scratch: Vec<StereoFrame>,
    accumulator: Vec<[i32; 2]>,
}

impl Default for Mixer {
    fn default() -> Self {
        Self::new()
    }
}

impl Mixer {
    /// Create a mixer with every slot empty
    pub fn new() -> Self {
        Mixer {
            slots: std::array::from_fn(|_| None),
            channel_scratch: Vec::new(),
            accumulator: Vec::new(),
        }
    }

    /// Put `source` into its channel slot, returning the source it replaced
    pub fn install(&mut self, source: ChannelSource) -> Option<ChannelSource> {
        let index = source.channel_index() as usize;
        self.slots.get_mut(index)?.replace(source)
    }

    /// Source in slot `index`
    pub fn get(&self, index: u8) -> Option<&ChannelSource> {
        self.slots.get(index as usize)?.as_ref()
    }

    /// Mutable source in slot `index`
    pub fn get_mut(&mut self, index: u8) -> Option<&mut ChannelSource> {
        self.slots.get_mut(index as usize)?.as_mut()
    }

    /// Empty slot `index`
    pub fn remove(&mut self, index: u8) -> Option<ChannelSource> {
        self.slots.get_mut(index as usize)?.take()
    }

    /// Empty every slot
    pub fn clear(&mut self) {
        self.slots.iter_mut().for_each(|slot| *slot = None);
    }

    /// Number of occupied slots
    pub fn active_count(&self) -> usize {
        self.slots.iter().flatten().count()
    }

    /// Indices of occupied slots, ascending
    pub fn active_channels(&self) -> impl Iterator<Item = u8> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.is_some())
            .map(|(index, _)| index as u8)
    }

    /// Tick every source for `out.len()` frames and write the saturated sum
    ///
    /// Disabled sources are ticked too; they emit silence without moving.
    pub fn mix_into(&mut self, out: &mut [StereoFrame]) {
        let frames = out.len();
        self.accumulator.clear();
        self.accumulator.resize(frames, [0, 0]);
        self.channel_scratch.resize(frames, [0, 0]);

        for source in self.slots.iter_mut().flatten() {
            source.tick(&mut self.channel_scratch);
            for (acc, frame) in self.accumulator.iter_mut().zip(&self.channel_scratch) {
                acc[0] += frame[0] as i32;
                acc[1] += frame[1] as i32;
            }
        }

        for (dst, acc) in out.iter_mut().zip(&self.accumulator) {
            *dst = [saturate(acc[0]), saturate(acc[1])];
        }
    }
}
