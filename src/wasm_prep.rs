//! Static analysis of contract bytecode at store time.

use std::collections::BTreeSet;

use parity_wasm::elements::{Internal, Module};
use serde::Serialize;
use thiserror::Error;

use crate::execution::Error;

/// Entry points whose presence marks a contract as IBC-enabled.
pub const IBC_ENTRY_POINTS: [&str; 8] = [
    "ibc_channel_open",
    "ibc_channel_connect",
    "ibc_channel_close",
    "ibc_packet_receive",
    "ibc_packet_ack",
    "ibc_packet_timeout",
    "ibc_source_callback",
    "ibc_destination_callback",
];

/// Name of the custom section carrying the contract's migrate version as
/// ASCII decimal.
pub const MIGRATE_VERSION_SECTION: &str = "migrate_version";

/// Fallback migrate version for contracts that export `migrate` without a
/// version section.
pub const DEFAULT_CONTRACT_MIGRATE_VERSION: u64 = 42;

/// An error emitted by static bytecode validation.
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum WasmValidationError {
    /// The contract must export exactly one linear memory.
    #[error("Wasm contract must contain exactly one memory")]
    ExactlyOneMemory {
        /// Number of memories actually exported.
        actual: usize,
    },
    /// Declared memory exceeds the configured page limit.
    #[error("module requested {actual} pages of memory, limit is {max}")]
    TooMuchMemory {
        /// Allowed maximum pages.
        max: u32,
        /// Pages requested in the Wasm.
        actual: u32,
    },
    /// Start functions are never run, so modules carrying one are rejected.
    #[error("start function is not supported")]
    StartFunction,
}

/// Deserializes raw bytecode into a module for inspection.
pub(crate) fn deserialize(wasm: &[u8]) -> Result<Module, Error> {
    parity_wasm::deserialize_buffer::<Module>(wasm).map_err(|_| Error::Deserialization)
}

/// Names of all exported functions, in export-section order de-duplicated
/// into a set.
pub(crate) fn exported_function_names(module: &Module) -> BTreeSet<String> {
    module
        .export_section()
        .map(|exports| {
            exports
                .entries()
                .iter()
                .filter(|entry| matches!(entry.internal(), Internal::Function(_)))
                .map(|entry| entry.field().to_string())
                .collect()
        })
        .unwrap_or_default()
}

fn exported_memory_count(module: &Module) -> usize {
    module
        .export_section()
        .map(|exports| {
            exports
                .entries()
                .iter()
                .filter(|entry| matches!(entry.internal(), Internal::Memory(_)))
                .count()
        })
        .unwrap_or_default()
}

fn ensure_exactly_one_memory(module: &Module) -> Result<(), WasmValidationError> {
    let actual = exported_memory_count(module);
    if actual != 1 {
        return Err(WasmValidationError::ExactlyOneMemory { actual });
    }
    Ok(())
}

fn ensure_memory_limit(module: &Module, max_pages: u32) -> Result<(), WasmValidationError> {
    if let Some(memories) = module.memory_section() {
        for memory in memories.entries() {
            let initial = memory.limits().initial();
            let maximum = memory.limits().maximum().unwrap_or(initial);
            if initial > max_pages || maximum > max_pages {
                return Err(WasmValidationError::TooMuchMemory {
                    max: max_pages,
                    actual: initial.max(maximum),
                });
            }
        }
    }
    Ok(())
}

fn ensure_no_start(module: &Module) -> Result<(), WasmValidationError> {
    if module.start_section().is_some() {
        return Err(WasmValidationError::StartFunction);
    }
    Ok(())
}

/// Full store-time validation.
pub(crate) fn validate_module(module: &Module, max_pages: u32) -> Result<(), WasmValidationError> {
    ensure_exactly_one_memory(module)?;
    ensure_no_start(module)?;
    ensure_memory_limit(module, max_pages)?;
    Ok(())
}

/// Relaxed validation used by `store_code_unchecked`: only the memory-count
/// requirement is kept.
pub(crate) fn validate_module_relaxed(module: &Module) -> Result<(), WasmValidationError> {
    ensure_exactly_one_memory(module)
}

/// Extracts the migrate version from the `migrate_version` custom section,
/// if present and well-formed.
pub(crate) fn contract_migrate_version(module: &Module) -> Option<u64> {
    module
        .custom_sections()
        .find(|section| section.name() == MIGRATE_VERSION_SECTION)
        .and_then(|section| std::str::from_utf8(section.payload()).ok())
        .and_then(|text| text.trim().parse::<u64>().ok())
}

/// What a stored module exposes, derived purely from its exports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnalysisReport {
    /// True when any IBC entry point is exported.
    pub has_ibc_entry_points: bool,
    /// Chain capabilities the contract needs the host to provide.
    pub required_capabilities: BTreeSet<String>,
    /// Migrate version of non-IBC contracts exporting `migrate`.
    pub contract_migrate_version: Option<u64>,
    /// All exported function names.
    pub entrypoints: Vec<String>,
}

/// Builds the analysis report for a module with the given export set and
/// extracted migrate version. Pure: same inputs, same report.
pub(crate) fn analyze(
    exports: &BTreeSet<String>,
    migrate_version: Option<u64>,
) -> AnalysisReport {
    let has_ibc_entry_points = IBC_ENTRY_POINTS
        .iter()
        .any(|name| exports.contains(*name));

    let required_capabilities = if has_ibc_entry_points {
        ["iterator", "stargate"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    } else {
        BTreeSet::new()
    };

    let contract_migrate_version = if exports.contains("migrate") && !has_ibc_entry_points {
        Some(migrate_version.unwrap_or(DEFAULT_CONTRACT_MIGRATE_VERSION))
    } else {
        None
    };

    AnalysisReport {
        has_ibc_entry_points,
        required_capabilities,
        contract_migrate_version,
        entrypoints: exports.iter().cloned().collect(),
    }
}
