//! Guest-facing service surface
//!
//! Owns the shared-memory region guests write command records into, walks
//! command chains in it and forwards the decoded commands to the engine.
//! Channel and capture-unit bookkeeping is kept here as well.

use crate::command::{mark_finished, Command, RecordHeader, END_OF_CHAIN, RECORD_SIZE};
use crate::constants::{MAX_CAPTURE_UNITS, SOUND_CHANNEL_MASK};
use crate::engine::{Csnd, CsndEngine};
use crate::{CsndError, Result};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, error, trace, warn};

/// Shared memory is allocated in whole pages
pub const PAGE_SIZE: u32 = 0x1000;

/// Upper bound on records processed by one `execute_commands` call
pub const MAX_CHAINED_COMMANDS: usize = 256;

/// Service state for one guest session
pub struct CsndService {
    engine: Arc<Mutex<CsndEngine>>,
    shared_memory: Option<Vec<u8>>,
    offsets: [u32; 4],
    capture_units: [bool; MAX_CAPTURE_UNITS],
    channels_acquired: bool,
}

impl std::fmt::Debug for CsndService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CsndService")
            .field("shared_memory_size", &self.shared_memory.as_ref().map(Vec::len))
            .field("offsets", &self.offsets)
            .field("capture_units", &self.capture_units)
            .field("channels_acquired", &self.channels_acquired)
            .finish()
    }
}

impl CsndService {
    /// Create a service forwarding to `engine`
    pub fn new(engine: Arc<Mutex<CsndEngine>>) -> Self {
        CsndService {
            engine,
            shared_memory: None,
            offsets: [0; 4],
            capture_units: [false; MAX_CAPTURE_UNITS],
            channels_acquired: false,
        }
    }

    /// Create a service forwarding to the engine behind `csnd`
    pub fn for_csnd(csnd: &Csnd) -> Self {
        Self::new(csnd.shared_engine())
    }

    /// Allocate the zeroed shared region; `size` is rounded up to whole pages
    ///
    /// Returns the allocated size.
    pub fn initialize(&mut self, size: u32, offsets: [u32; 4]) -> u32 {
        let size = size.div_ceil(PAGE_SIZE).saturating_mul(PAGE_SIZE);
        self.shared_memory = Some(vec![0; size as usize]);
        self.offsets = offsets;
        debug!(
            "Initialize: size=0x{:08X} offset0=0x{:08X} offset1=0x{:08X} offset2=0x{:08X} offset3=0x{:08X}",
            size, offsets[0], offsets[1], offsets[2], offsets[3]
        );
        size
    }

    /// Release the shared region
    pub fn shutdown(&mut self) {
        self.shared_memory = None;
        debug!("Shutdown");
    }

    /// Whether the shared region exists
    pub fn is_initialized(&self) -> bool {
        self.shared_memory.is_some()
    }

    /// Offsets of the status areas passed to [`initialize`](Self::initialize)
    pub fn offsets(&self) -> [u32; 4] {
        self.offsets
    }

    /// Shared region, for reading back record status
    pub fn shared_memory(&self) -> Option<&[u8]> {
        self.shared_memory.as_deref()
    }

    /// Shared region, for the guest side to write records into
    pub fn shared_memory_mut(&mut self) -> Option<&mut [u8]> {
        self.shared_memory.as_deref_mut()
    }

    /// Process the command chain starting at `offset`
    ///
    /// Every visited record gets its finished bit set. Command failures are
    /// logged and do not stop the chain. The walk ends at an end-of-chain
    /// marker, a record pointing at itself, a record outside the region or
    /// after [`MAX_CHAINED_COMMANDS`] records. Returns the number of records
    /// processed.
    pub fn execute_commands(&mut self, offset: u32) -> Result<usize> {
        let Some(region) = self.shared_memory.as_mut() else {
            error!("ExecuteCommands called before shared memory was allocated");
            return Err(CsndError::SharedMemoryNotInitialized);
        };
        let mut engine = self.engine.lock();

        let mut offset = offset as usize;
        let mut processed = 0;
        while processed < MAX_CHAINED_COMMANDS {
            let len = region.len();
            let Some(record) = offset
                .checked_add(RECORD_SIZE)
                .and_then(|end| region.get_mut(offset..end))
            else {
                let err = CsndError::TruncatedRecord {
                    offset,
                    len: len.saturating_sub(offset),
                };
                if processed == 0 {
                    return Err(err);
                }
                warn!("Command chain left shared memory: {}", err);
                break;
            };

            mark_finished(record)?;
            let header = RecordHeader::parse(record)?;
            processed += 1;

            match Command::decode(record) {
                Ok(command) => {
                    if let Err(e) = engine.submit(&command) {
                        warn!("Command 0x{:X} at 0x{:X}: {}", header.command_id, offset, e);
                    }
                }
                Err(e) => error!("Record at 0x{:X}: {}", offset, e),
            }

            let next = header.next_offset;
            if next == END_OF_CHAIN || next as usize == offset {
                break;
            }
            offset = next as usize;
        }

        if processed == MAX_CHAINED_COMMANDS {
            warn!("Command chain cut after {} records", MAX_CHAINED_COMMANDS);
        }
        trace!("ExecuteCommands processed {} records", processed);
        Ok(processed)
    }

    /// Reserve the sound channels; returns the usable channel mask
    pub fn acquire_sound_channels(&mut self) -> u32 {
        self.channels_acquired = true;
        debug!("AcquireSoundChannels: mask=0x{:08X}", SOUND_CHANNEL_MASK);
        SOUND_CHANNEL_MASK
    }

    /// Give the sound channels back
    pub fn release_sound_channels(&mut self) {
        self.channels_acquired = false;
        debug!("ReleaseSoundChannels");
    }

    /// Whether the sound channels are reserved
    pub fn sound_channels_acquired(&self) -> bool {
        self.channels_acquired
    }

    /// Take the first free capture unit
    pub fn acquire_capture_unit(&mut self) -> Result<u32> {
        match self.capture_units.iter().position(|in_use| !in_use) {
            Some(index) => {
                self.capture_units[index] = true;
                debug!("AcquireCapUnit: unit {}", index);
                Ok(index as u32)
            }
            None => {
                warn!("No more capture units available");
                Err(CsndError::ResourceExhausted("capture unit"))
            }
        }
    }

    /// Free capture unit `index`
    pub fn release_capture_unit(&mut self, index: u32) -> Result<()> {
        let unit = self
            .capture_units
            .get_mut(index as usize)
            .ok_or(CsndError::InvalidCaptureUnit(index))?;
        *unit = false;
        debug!("ReleaseCapUnit: unit {}", index);
        Ok(())
    }

    /// Cache maintenance; guest memory is always coherent here
    pub fn flush_data_cache(&self, address: u32, size: u32) {
        trace!("FlushDataCache address=0x{:08X}, size=0x{:08X}", address, size);
    }

    /// Cache maintenance; guest memory is always coherent here
    pub fn store_data_cache(&self, address: u32, size: u32) {
        trace!("StoreDataCache address=0x{:08X}, size=0x{:08X}", address, size);
    }

    /// Cache maintenance; guest memory is always coherent here
    pub fn invalidate_data_cache(&self, address: u32, size: u32) {
        trace!("InvalidateDataCache address=0x{:08X}, size=0x{:08X}", address, size);
    }

    /// Accepted and ignored
    pub fn reset(&mut self) {
        warn!("Reset (ignored)");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CsndConfig;
    use crate::memory::PhysicalMemory;

    fn service() -> CsndService {
        let engine = CsndEngine::new(CsndConfig::default(), Arc::new(PhysicalMemory::new()));
        CsndService::new(Arc::new(Mutex::new(engine)))
    }

    #[test]
    fn test_initialize_rounds_to_pages() {
        let mut service = service();
        assert_eq!(service.initialize(0x1001, [0, 8, 0x100, 0x200]), 0x2000);
        assert_eq!(service.shared_memory().map(<[u8]>::len), Some(0x2000));
        assert_eq!(service.initialize(0x1000, [0; 4]), 0x1000);

        service.shutdown();
        assert!(!service.is_initialized());
    }

    #[test]
    fn test_execute_requires_shared_memory() {
        let mut service = service();
        assert!(matches!(
            service.execute_commands(0),
            Err(CsndError::SharedMemoryNotInitialized)
        ));
    }

    #[test]
    fn test_execute_out_of_range_offset() {
        let mut service = service();
        service.initialize(0x1000, [0; 4]);
        assert!(matches!(
            service.execute_commands(0xFF0),
            Err(CsndError::TruncatedRecord { offset: 0xFF0, len: 0x10 })
        ));
    }

    #[test]
    fn test_self_referencing_record_runs_once() {
        let mut service = service();
        service.initialize(0x1000, [0; 4]);
        let record = Command::SetPlayState {
            channel_index: 0,
            enable_playback: true,
        }
        .encode(0x40);
        if let Some(memory) = service.shared_memory_mut() {
            memory[0x40..0x60].copy_from_slice(&record);
        }

        assert_eq!(service.execute_commands(0x40).unwrap(), 1);
    }

    #[test]
    fn test_capture_units() {
        let mut service = service();
        assert_eq!(service.acquire_capture_unit().unwrap(), 0);
        assert_eq!(service.acquire_capture_unit().unwrap(), 1);
        assert!(matches!(
            service.acquire_capture_unit(),
            Err(CsndError::ResourceExhausted(_))
        ));

        service.release_capture_unit(0).unwrap();
        assert_eq!(service.acquire_capture_unit().unwrap(), 0);
        assert!(matches!(
            service.release_capture_unit(2),
            Err(CsndError::InvalidCaptureUnit(2))
        ));
    }

    #[test]
    fn test_sound_channels() {
        let mut service = service();
        assert_eq!(service.acquire_sound_channels(), 0xFFFF_FF00);
        assert!(service.sound_channels_acquired());
        service.release_sound_channels();
        assert!(!service.sound_channels_acquired());
    }
}
