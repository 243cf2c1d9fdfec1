//! Moving byte slices in and out of the contract's linear memory.
//!
//! All contract-visible buffers are owned by the contract: the host only ever
//! frees allocations it made itself, and frees them on every error path
//! between a successful `allocate` and the hand-off to the contract.

use wasmi::{Externals, MemoryRef, ModuleRef, RuntimeValue};

use crate::execution::Error;
use crate::region::{Region, REGION_SIZE};

/// Reads and writes contract-side buffers for one `(memory, instance)` pair.
///
/// Handles are reference-counted, so cloning a manager is cheap and clones
/// operate on the same instance.
#[derive(Clone)]
pub(crate) struct MemoryManager {
    instance: ModuleRef,
    memory: MemoryRef,
}

impl MemoryManager {
    pub(crate) fn new(instance: ModuleRef, memory: MemoryRef) -> Self {
        MemoryManager { instance, memory }
    }

    fn memory_pages(&self) -> usize {
        self.memory.current_size().0
    }

    /// Reads and validates the Region at `ptr`.
    pub(crate) fn read_region(&self, ptr: u32) -> Result<Region, Error> {
        if ptr == 0 {
            return Err(Error::NullRegionPointer);
        }
        let data = self
            .memory
            .get(ptr, REGION_SIZE)
            .map_err(|e| Error::Interpreter(e.to_string()))?;
        let encoded: [u8; REGION_SIZE] = data.as_slice().try_into().expect("12-byte read");
        let region = Region::decode(&encoded);
        region.validate_in_memory(self.memory_pages())?;
        Ok(region)
    }

    /// Reads the Region at `ptr` and returns a host-owned copy of its
    /// payload. The contract may reuse the memory afterwards.
    pub(crate) fn read_from_memory(&self, ptr: u32) -> Result<Vec<u8>, Error> {
        let region = self.read_region(ptr)?;
        self.memory
            .get(region.offset, region.length as usize)
            .map_err(|e| Error::Interpreter(e.to_string()))
    }

    /// Allocates contract memory for `data`, writes a Region followed by the
    /// payload, and returns the Region pointer.
    pub(crate) fn write_to_memory<E: Externals>(
        &self,
        data: &[u8],
        externals: &mut E,
    ) -> Result<u32, Error> {
        let ptr = self.allocate(data.len() + REGION_SIZE, externals)?;

        let offset = match ptr.checked_add(REGION_SIZE as u32) {
            Some(offset) => offset,
            None => {
                self.deallocate(ptr, externals);
                return Err(Error::Region(
                    crate::region::RegionValidationError::OutOfRange {
                        offset: ptr,
                        capacity: REGION_SIZE as u32,
                    },
                ));
            }
        };
        let region = Region {
            offset,
            capacity: data.len() as u32,
            length: data.len() as u32,
        };
        if let Err(e) = region.validate_in_memory(self.memory_pages()) {
            self.deallocate(ptr, externals);
            return Err(e.into());
        }
        if let Err(e) = self.memory.set(ptr, &region.encode()) {
            self.deallocate(ptr, externals);
            return Err(Error::Interpreter(e.to_string()));
        }
        if let Err(e) = self.memory.set(region.offset, data) {
            self.deallocate(ptr, externals);
            return Err(Error::Interpreter(e.to_string()));
        }
        Ok(ptr)
    }

    fn allocate<E: Externals>(&self, size: usize, externals: &mut E) -> Result<u32, Error> {
        if self.instance.export_by_name("allocate").and_then(|e| e.as_func().cloned()).is_none() {
            return Err(Error::FunctionNotFound("allocate".to_string()));
        }
        let result = self
            .instance
            .invoke_export(
                "allocate",
                &[RuntimeValue::I32(size as i32)],
                externals,
            )
            .map_err(Error::from)?;
        match result {
            Some(RuntimeValue::I32(ptr)) => Ok(ptr as u32),
            other => Err(Error::Interpreter(format!(
                "allocate returned unexpected result: {:?}",
                other
            ))),
        }
    }

    /// Best-effort release of an allocation the contract never received.
    pub(crate) fn deallocate<E: Externals>(&self, ptr: u32, externals: &mut E) {
        let _ = self.instance.invoke_export(
            "deallocate",
            &[RuntimeValue::I32(ptr as i32)],
            externals,
        );
    }
}

/// Concatenates sections, each preceded by its 4-byte big-endian length.
/// This is the framing `db_next` uses for key/value pairs and the batch
/// crypto functions use for their parallel arrays.
pub(crate) fn encode_sections(sections: &[&[u8]]) -> Vec<u8> {
    let total: usize = sections.iter().map(|s| s.len() + 4).sum();
    let mut out = Vec::with_capacity(total);
    for section in sections {
        out.extend_from_slice(&(section.len() as u32).to_be_bytes());
        out.extend_from_slice(section);
    }
    out
}

/// Splits length-prefixed sections back into owned buffers.
pub(crate) fn decode_sections(data: &[u8]) -> Result<Vec<Vec<u8>>, Error> {
    let mut sections = Vec::new();
    let mut cursor = 0usize;
    while cursor < data.len() {
        if data.len() - cursor < 4 {
            return Err(Error::InvalidSection("truncated section length"));
        }
        let header: [u8; 4] = data[cursor..cursor + 4].try_into().expect("4-byte slice");
        let length = u32::from_be_bytes(header) as usize;
        cursor += 4;
        if data.len() - cursor < length {
            return Err(Error::InvalidSection("section shorter than its length"));
        }
        sections.push(data[cursor..cursor + length].to_vec());
        cursor += length;
    }
    Ok(sections)
}
