//! Guest physical memory access
//!
//! Channel configuration references sample blocks by physical address. The
//! engine only ever reads those blocks, once per configuration, through the
//! [`MemoryAccessor`] it was constructed with.

use crate::{CsndError, Result};
use parking_lot::RwLock;

/// Read access to guest physical memory
pub trait MemoryAccessor: Send + Sync {
    /// Copy `dest.len()` bytes starting at physical address `addr` into `dest`.
    ///
    /// Fails with [`CsndError::UnmappedMemory`] if any byte of the range is
    /// not backed by memory.
    fn read_physical(&self, addr: u32, dest: &mut [u8]) -> Result<()>;
}

#[derive(Debug)]
struct Region {
    base: u32,
    data: Vec<u8>,
}

impl Region {
    fn offset_of(&self, addr: u32, len: usize) -> Option<usize> {
        let offset = addr.checked_sub(self.base)? as usize;
        let end = offset.checked_add(len)?;
        (end <= self.data.len()).then_some(offset)
    }
}

/// Physical memory made of independently mapped regions
///
/// A small stand-in for the emulator's memory system, used by the demo
/// binary and the tests. Regions may be written while the engine holds a
/// shared reference.
#[derive(Debug, Default)]
pub struct PhysicalMemory {
    regions: RwLock<Vec<Region>>,
}

impl PhysicalMemory {
    /// Create an empty address space
    pub fn new() -> Self {
        Self::default()
    }

    /// Map a zero-filled region of `size` bytes at `base`
    pub fn map_region(&self, base: u32, size: usize) {
        self.regions.write().push(Region {
            base,
            data: vec![0; size],
        });
    }

    /// Write bytes into mapped memory
    pub fn write(&self, addr: u32, bytes: &[u8]) -> Result<()> {
        let mut regions = self.regions.write();
        let region = regions
            .iter_mut()
            .find_map(|r| r.offset_of(addr, bytes.len()).map(|off| (r, off)));
        match region {
            Some((region, offset)) => {
                region.data[offset..offset + bytes.len()].copy_from_slice(bytes);
                Ok(())
            }
            None => Err(CsndError::UnmappedMemory {
                addr,
                len: bytes.len(),
            }),
        }
    }
}

impl MemoryAccessor for PhysicalMemory {
    fn read_physical(&self, addr: u32, dest: &mut [u8]) -> Result<()> {
        let regions = self.regions.read();
        for region in regions.iter() {
            if let Some(offset) = region.offset_of(addr, dest.len()) {
                dest.copy_from_slice(&region.data[offset..offset + dest.len()]);
                return Ok(());
            }
        }
        Err(CsndError::UnmappedMemory {
            addr,
            len: dest.len(),
        })
    }
}
