//! Address-space and memory-region collaborator contracts.
//!
//! These stand in for `AddressSpace`/`MemoryRegion` from the donor's QEMU memory API:
//! an [`AddressSpace`] is what the DMA engine moves bytes through, and a
//! [`MemoryRegion`] is what a flash chip-select sub-region resizes/relocates itself
//! against when the segment registers change.

use thiserror::Error;

/// A failure reported by a collaborator address space, e.g. an unmapped or faulting
/// access. Analogous to `MemTxResult != MEMTX_OK` in the donor.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("transport error accessing address space at {addr:#x}")]
pub struct TransportError {
    pub addr: u32,
}

/// A 32-bit little-endian addressable space, e.g. the flash window or DRAM.
pub trait AddressSpace {
    fn load_u32_le(&self, addr: u32) -> Result<u32, TransportError>;
    fn store_u32_le(&mut self, addr: u32, word: u32) -> Result<(), TransportError>;
}

/// A resizable, relocatable sub-region of a larger container region.
///
/// Implementations must make `set_size`/`set_address`/`set_enabled` visible to
/// readers only once `commit_transaction` runs, matching
/// `memory_region_transaction_begin/commit` in the donor — this is the "batching
/// primitive" `SPEC_FULL.md` §9 asks for.
pub trait MemoryRegion {
    fn begin_transaction(&mut self) {}
    fn set_size(&mut self, size: u32);
    fn set_address(&mut self, address: u32);
    fn set_enabled(&mut self, enabled: bool);
    fn commit_transaction(&mut self) {}

    /// Convenience wrapper bracketing a resize+relocate+enable with a transaction, the
    /// one combination the segment updater ever performs (`SPEC_FULL.md` §4.2.1 step 7).
    fn relocate(&mut self, address: u32, size: u32, enabled: bool) {
        self.begin_transaction();
        self.set_size(size);
        self.set_address(address);
        self.set_enabled(enabled);
        self.commit_transaction();
    }
}

#[cfg(test)]
pub(crate) mod test_doubles {
    use super::*;
    use std::collections::HashMap;

    /// A flat byte-addressable RAM/flash stand-in used by DMA and flash-window tests.
    #[derive(Default, Clone)]
    pub struct FlatMemory {
        words: HashMap<u32, u32>,
    }

    impl FlatMemory {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_words(base: u32, data: &[u32]) -> Self {
            let mut m = Self::new();
            for (i, w) in data.iter().enumerate() {
                m.words.insert(base + (i as u32) * 4, *w);
            }
            m
        }
    }

    impl AddressSpace for FlatMemory {
        fn load_u32_le(&self, addr: u32) -> Result<u32, TransportError> {
            Ok(*self.words.get(&addr).unwrap_or(&0))
        }

        fn store_u32_le(&mut self, addr: u32, word: u32) -> Result<(), TransportError> {
            self.words.insert(addr, word);
            Ok(())
        }
    }

    /// A sub-region stand-in that just records its last committed geometry.
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
    pub struct TrackedRegion {
        pub address: u32,
        pub size: u32,
        pub enabled: bool,
        pending_address: u32,
        pending_size: u32,
        pending_enabled: bool,
    }

    impl MemoryRegion for TrackedRegion {
        fn begin_transaction(&mut self) {
            self.pending_address = self.address;
            self.pending_size = self.size;
            self.pending_enabled = self.enabled;
        }

        fn set_size(&mut self, size: u32) {
            self.pending_size = size;
        }

        fn set_address(&mut self, address: u32) {
            self.pending_address = address;
        }

        fn set_enabled(&mut self, enabled: bool) {
            self.pending_enabled = enabled;
        }

        fn commit_transaction(&mut self) {
            self.address = self.pending_address;
            self.size = self.pending_size;
            self.enabled = self.pending_enabled;
        }
    }
}
