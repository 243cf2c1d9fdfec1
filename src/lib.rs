//! CosmWasm contract execution runtime.
//!
//! This crate loads, validates, caches and executes WebAssembly smart
//! contracts against a host-supplied key/value store, address API and
//! querier. It mediates every interaction between untrusted Wasm code and
//! the outside world: arguments are marshalled through the contract's linear
//! memory as 12-byte Region descriptors, the well-known entry points
//! (`instantiate`, `execute`, `query`, `migrate`, `sudo`, `reply` and the
//! IBC family) are dispatched with a fresh host-function environment per
//! call, and every call returns structured results with gas accounting.
//!
//! The embedding host drives [`WasmVm`]: store bytecode once, then dispatch
//! entry points against the returned checksum with a [`Backend`] of host
//! collaborators per call.

pub mod backend;
mod cache;
mod checksum;
mod env;
pub mod execution;
mod gas;
mod memory;
mod region;
mod runtime;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;
mod vm;
mod wasm_prep;

pub use backend::{
    Api, Backend, BackendError, GasMeter, Order, Querier, Record, Storage, StorageIterator,
};
pub use cache::{Metrics, PerModuleMetrics, PinnedMetrics, WasmCache};
pub use checksum::{Checksum, CHECKSUM_LENGTH};
pub use env::{BlockInfo, ContractInfo, Env, EnvError, TransactionInfo};
pub use execution::Error;
pub use gas::{GasLimitError, GasReport, HostFunctionCosts};
pub use region::{Region, RegionValidationError, REGION_SIZE, WASM_PAGE_SIZE};
pub use runtime::cryptography::CryptoError;
pub use vm::{CallResult, VmConfig, WasmVm};
pub use wasm_prep::{
    AnalysisReport, WasmValidationError, DEFAULT_CONTRACT_MIGRATE_VERSION, IBC_ENTRY_POINTS,
    MIGRATE_VERSION_SECTION,
};
