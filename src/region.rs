//! The Region descriptor: the contract's ABI representation of a byte slice.

use thiserror::Error;

/// Size of an encoded [`Region`] in bytes.
pub const REGION_SIZE: usize = 12;

/// Number of bytes in one Wasm linear-memory page.
pub const WASM_PAGE_SIZE: u64 = 65_536;

/// A Region descriptor violating one of its invariants.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum RegionValidationError {
    #[error("region has zero offset")]
    ZeroOffset,
    #[error("region length {length} exceeds capacity {capacity}")]
    LengthExceedsCapacity {
        length: u32,
        capacity: u32,
    },
    #[error("region out of range: offset {offset}, capacity {capacity}")]
    OutOfRange {
        offset: u32,
        capacity: u32,
    },
    #[error("region exceeds memory bounds: offset={offset}, capacity={capacity}, memory size={memory_size}")]
    ExceedsMemory {
        offset: u32,
        capacity: u32,
        memory_size: u64,
    },
}

/// Describes data allocated in the contract's linear memory.
///
/// Laid out as three little-endian `u32`s. The *address* of a Region is what
/// crosses the Wasm boundary; its body stays in contract memory.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Region {
    /// Start of the payload within linear memory.
    pub offset: u32,
    /// Number of bytes reserved at `offset`.
    pub capacity: u32,
    /// Number of bytes in use, `<= capacity`.
    pub length: u32,
}

impl Region {
    /// Decodes the 12-byte wire representation. The caller validates the
    /// result before touching any memory it points at.
    pub fn decode(data: &[u8; REGION_SIZE]) -> Self {
        Region {
            offset: u32::from_le_bytes(data[0..4].try_into().expect("4-byte slice")),
            capacity: u32::from_le_bytes(data[4..8].try_into().expect("4-byte slice")),
            length: u32::from_le_bytes(data[8..12].try_into().expect("4-byte slice")),
        }
    }

    /// Encodes into the 12-byte wire representation.
    pub fn encode(&self) -> [u8; REGION_SIZE] {
        let mut data = [0u8; REGION_SIZE];
        data[0..4].copy_from_slice(&self.offset.to_le_bytes());
        data[4..8].copy_from_slice(&self.capacity.to_le_bytes());
        data[8..12].copy_from_slice(&self.length.to_le_bytes());
        data
    }

    /// Plausibility checks that hold for any Region regardless of the memory
    /// it lives in.
    pub fn validate(&self) -> Result<(), RegionValidationError> {
        if self.offset == 0 {
            return Err(RegionValidationError::ZeroOffset);
        }
        if self.length > self.capacity {
            return Err(RegionValidationError::LengthExceedsCapacity {
                length: self.length,
                capacity: self.capacity,
            });
        }
        if u64::from(self.offset) + u64::from(self.capacity) > u64::from(u32::MAX) {
            return Err(RegionValidationError::OutOfRange {
                offset: self.offset,
                capacity: self.capacity,
            });
        }
        Ok(())
    }

    /// Full validation against the instance's current memory size in pages.
    pub fn validate_in_memory(&self, memory_pages: usize) -> Result<(), RegionValidationError> {
        self.validate()?;
        let memory_size = memory_pages as u64 * WASM_PAGE_SIZE;
        if u64::from(self.offset) + u64::from(self.capacity) > memory_size {
            return Err(RegionValidationError::ExceedsMemory {
                offset: self.offset,
                capacity: self.capacity,
                memory_size,
            });
        }
        Ok(())
    }
}
