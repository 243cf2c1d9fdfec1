//! In-memory module cache, content-addressed by checksum.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::checksum::Checksum;
use crate::execution::Error;
use crate::wasm_prep::{self, AnalysisReport};

/// A stored module's compiled artifact plus everything analysis needs,
/// derived once at store time.
pub(crate) struct CompiledModule {
    /// Loaded and validated interpreter module, ready to instantiate.
    pub wasm_module: wasmi::Module,
    /// Exported function names.
    pub exports: BTreeSet<String>,
    /// Migrate version extracted from the custom section, if any.
    pub migrate_version: Option<u64>,
}

/// Aggregate cache counters.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Metrics {
    pub hits_pinned_memory_cache: u64,
    pub hits_memory_cache: u64,
    pub misses: u64,
    pub elements_pinned_memory_cache: u64,
    pub elements_memory_cache: u64,
    pub size_pinned_memory_cache: u64,
    pub size_memory_cache: u64,
}

/// Counters of a single pinned module.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct PerModuleMetrics {
    /// Number of entry-point calls dispatched against the module while
    /// pinned.
    pub hits: u32,
    /// `len(checksum) + len(bytecode)`.
    pub size: u64,
}

/// Snapshot of all pinned modules' counters.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PinnedMetrics {
    pub per_module: Vec<(Checksum, PerModuleMetrics)>,
}

/// The five maps of the cache, all guarded by one mutex.
#[derive(Default)]
struct CacheState {
    bytecode: HashMap<String, Vec<u8>>,
    compiled: HashMap<String, Arc<CompiledModule>>,
    pinned: HashSet<String>,
    hits: HashMap<String, u32>,
    sizes: HashMap<String, u64>,
    hits_memory_cache: u64,
    misses: u64,
}

/// Process-wide store of raw bytecode and compiled modules.
///
/// The mutex is held only for map lookups and mutations, never across a
/// contract invocation or a call into host-supplied collaborators.
pub struct WasmCache {
    state: Mutex<CacheState>,
    max_memory_pages: u32,
}

fn lock_poison_tolerant(state: &Mutex<CacheState>) -> std::sync::MutexGuard<'_, CacheState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl WasmCache {
    pub fn new(max_memory_pages: u32) -> Self {
        WasmCache {
            state: Mutex::new(CacheState::default()),
            max_memory_pages,
        }
    }

    fn compile(&self, wasm: &[u8], relaxed: bool) -> Result<CompiledModule, Error> {
        if wasm.is_empty() {
            return Err(Error::Deserialization);
        }
        let module = wasm_prep::deserialize(wasm)?;
        if relaxed {
            wasm_prep::validate_module_relaxed(&module)?;
        } else {
            wasm_prep::validate_module(&module, self.max_memory_pages)?;
        }
        let exports = wasm_prep::exported_function_names(&module);
        let migrate_version = wasm_prep::contract_migrate_version(&module);
        let wasm_module = wasmi::Module::from_buffer(wasm).map_err(|_| Error::Deserialization)?;
        Ok(CompiledModule {
            wasm_module,
            exports,
            migrate_version,
        })
    }

    fn store_compiled(&self, wasm: &[u8], compiled: CompiledModule) -> Checksum {
        let checksum = Checksum::generate(wasm);
        let key = checksum.to_hex();
        let mut state = lock_poison_tolerant(&self.state);
        // Idempotent: a second store of the same code drops the fresh
        // compilation and keeps the existing entry.
        if !state.compiled.contains_key(&key) {
            state.bytecode.insert(key.clone(), wasm.to_vec());
            state.compiled.insert(key, Arc::new(compiled));
        }
        checksum
    }

    /// Compiles, validates and (when `persist` is set) stores the bytecode.
    pub fn store_code(&self, wasm: &[u8], persist: bool) -> Result<Checksum, Error> {
        let compiled = self.compile(wasm, false)?;
        if !persist {
            return Ok(Checksum::generate(wasm));
        }
        Ok(self.store_compiled(wasm, compiled))
    }

    /// Stores bytecode with validation relaxed to the memory-count check.
    pub fn store_code_unchecked(&self, wasm: &[u8]) -> Result<Checksum, Error> {
        let compiled = self.compile(wasm, true)?;
        Ok(self.store_compiled(wasm, compiled))
    }

    /// Validates without storing. The returned flag reports that nothing was
    /// persisted.
    pub fn simulate_store_code(&self, wasm: &[u8]) -> Result<(Checksum, bool), Error> {
        self.compile(wasm, false)?;
        Ok((Checksum::generate(wasm), false))
    }

    /// Returns a copy of the bytecode stored under the checksum.
    pub fn get_code(&self, checksum: &[u8]) -> Result<Vec<u8>, Error> {
        let checksum = Checksum::from_slice(checksum)?;
        let state = lock_poison_tolerant(&self.state);
        state
            .bytecode
            .get(&checksum.to_hex())
            .cloned()
            .ok_or(Error::CodeNotFound)
    }

    /// Drops a stored module from every map, including the pinned set and
    /// its counters.
    pub fn remove_code(&self, checksum: &[u8]) -> Result<(), Error> {
        let checksum = Checksum::from_slice(checksum)?;
        let key = checksum.to_hex();
        let mut state = lock_poison_tolerant(&self.state);
        if state.compiled.remove(&key).is_none() {
            return Err(Error::CodeDoesNotExist);
        }
        state.bytecode.remove(&key);
        state.pinned.remove(&key);
        state.hits.remove(&key);
        state.sizes.remove(&key);
        Ok(())
    }

    /// Flags a stored module as hot and starts tracking its counters.
    pub fn pin(&self, checksum: &[u8]) -> Result<(), Error> {
        let checksum = Checksum::from_slice(checksum)?;
        let key = checksum.to_hex();
        let mut state = lock_poison_tolerant(&self.state);
        let code_len = match state.bytecode.get(&key) {
            Some(code) => code.len(),
            None => return Err(Error::CodeNotFound),
        };
        state.pinned.insert(key.clone());
        state.hits.entry(key.clone()).or_insert(0);
        state
            .sizes
            .insert(key, (checksum.as_ref().len() + code_len) as u64);
        Ok(())
    }

    /// Unflags a module and clears its counters.
    pub fn unpin(&self, checksum: &[u8]) -> Result<(), Error> {
        let checksum = Checksum::from_slice(checksum)?;
        let key = checksum.to_hex();
        let mut state = lock_poison_tolerant(&self.state);
        state.pinned.remove(&key);
        state.hits.remove(&key);
        state.sizes.remove(&key);
        Ok(())
    }

    /// Reports what a stored module exports. Pure with respect to the
    /// compiled module; repeated calls return the same report.
    pub fn analyze_code(&self, checksum: &[u8]) -> Result<AnalysisReport, Error> {
        let checksum = Checksum::from_slice(checksum)?;
        let state = lock_poison_tolerant(&self.state);
        let module = state
            .compiled
            .get(&checksum.to_hex())
            .ok_or(Error::CodeNotFound)?;
        Ok(wasm_prep::analyze(&module.exports, module.migrate_version))
    }

    /// Looks up the compiled module for dispatch, bumping hit counters.
    pub(crate) fn get_module(&self, checksum: &Checksum) -> Result<Arc<CompiledModule>, Error> {
        let key = checksum.to_hex();
        let mut state = lock_poison_tolerant(&self.state);
        match state.compiled.get(&key) {
            Some(module) => {
                let module = Arc::clone(module);
                if state.pinned.contains(&key) {
                    *state.hits.entry(key).or_insert(0) += 1;
                } else {
                    state.hits_memory_cache += 1;
                }
                Ok(module)
            }
            None => {
                state.misses += 1;
                Err(Error::ModuleNotCompiled(key))
            }
        }
    }

    /// Aggregate counters over the whole cache.
    pub fn get_metrics(&self) -> Metrics {
        let state = lock_poison_tolerant(&self.state);
        let hits_pinned: u64 = state
            .pinned
            .iter()
            .filter_map(|key| state.hits.get(key))
            .map(|hits| u64::from(*hits))
            .sum();
        let size_pinned: u64 = state
            .pinned
            .iter()
            .filter_map(|key| state.sizes.get(key))
            .sum();
        let unpinned = |key: &String| !state.pinned.contains(key);
        Metrics {
            hits_pinned_memory_cache: hits_pinned,
            hits_memory_cache: state.hits_memory_cache,
            misses: state.misses,
            elements_pinned_memory_cache: state.pinned.len() as u64,
            elements_memory_cache: state.compiled.keys().filter(|k| unpinned(k)).count() as u64,
            size_pinned_memory_cache: size_pinned,
            size_memory_cache: state
                .bytecode
                .iter()
                .filter(|(key, _)| unpinned(key))
                .map(|(_, code)| code.len() as u64)
                .sum(),
        }
    }

    /// Per-module counters, one entry per pinned checksum.
    pub fn get_pinned_metrics(&self) -> PinnedMetrics {
        let state = lock_poison_tolerant(&self.state);
        let mut per_module: Vec<(Checksum, PerModuleMetrics)> = state
            .pinned
            .iter()
            .filter_map(|key| {
                let raw = base16::decode(key.as_bytes()).ok()?;
                let checksum = Checksum::from_slice(&raw).ok()?;
                Some((
                    checksum,
                    PerModuleMetrics {
                        hits: state.hits.get(key).copied().unwrap_or(0),
                        size: state.sizes.get(key).copied().unwrap_or(0),
                    },
                ))
            })
            .collect();
        per_module.sort_by_key(|(checksum, _)| *checksum);
        PinnedMetrics { per_module }
    }

    /// Empties every map and drops all compiled artifacts.
    pub fn release(&self) {
        let mut state = lock_poison_tolerant(&self.state);
        let dropped = state.compiled.len();
        *state = CacheState::default();
        debug!(modules = dropped, "released module cache");
    }
}
