//! Mock host collaborators and contract fixtures.
//!
//! Nothing in this module is reachable from production paths; it is compiled
//! for this crate's tests and for downstream test code via the
//! `test-support` feature.

use std::cell::Cell;
use std::collections::BTreeMap;
use std::ops::Bound;

use crate::backend::{
    Api, BackendError, GasMeter, Order, Querier, Record, Storage, StorageIterator,
};

/// BTreeMap-backed storage. Iterators snapshot the matching range at open
/// time, so later writes never invalidate them.
#[derive(Debug, Default, Clone)]
pub struct MemoryStorage {
    data: BTreeMap<Vec<u8>, Vec<u8>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        MemoryStorage::default()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

struct SnapshotIterator {
    records: std::vec::IntoIter<Record>,
}

impl StorageIterator for SnapshotIterator {
    fn next_record(&mut self) -> Result<Option<Record>, BackendError> {
        Ok(self.records.next())
    }
}

impl Storage for MemoryStorage {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, BackendError> {
        Ok(self.data.get(key).cloned())
    }

    fn set(&mut self, key: &[u8], value: &[u8]) -> Result<(), BackendError> {
        self.data.insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn remove(&mut self, key: &[u8]) -> Result<(), BackendError> {
        self.data.remove(key);
        Ok(())
    }

    fn scan(
        &self,
        start: Option<&[u8]>,
        end: Option<&[u8]>,
        order: Order,
    ) -> Result<Box<dyn StorageIterator>, BackendError> {
        let empty = matches!((start, end), (Some(s), Some(e)) if s > e);
        let mut records: Vec<Record> = if empty {
            Vec::new()
        } else {
            let lower = match start {
                Some(s) => Bound::Included(s),
                None => Bound::Unbounded,
            };
            let upper = match end {
                Some(e) => Bound::Excluded(e),
                None => Bound::Unbounded,
            };
            self.data
                .range::<[u8], _>((lower, upper))
                .map(|(key, value)| Record {
                    key: key.clone(),
                    value: value.clone(),
                })
                .collect()
        };
        if order == Order::Descending {
            records.reverse();
        }
        Ok(Box::new(SnapshotIterator {
            records: records.into_iter(),
        }))
    }
}

/// Address API treating addresses as opaque lowercase strings; canonical
/// form is the raw UTF-8 bytes.
#[derive(Debug, Default, Clone)]
pub struct MockApi;

impl Api for MockApi {
    fn validate_address(&self, human: &str) -> Result<(), BackendError> {
        if human.is_empty() {
            return Err(BackendError::InvalidAddress("empty address".to_string()));
        }
        if human != human.to_lowercase() {
            return Err(BackendError::InvalidAddress(format!(
                "address {} is not normalized",
                human
            )));
        }
        Ok(())
    }

    fn canonicalize_address(&self, human: &str) -> Result<Vec<u8>, BackendError> {
        self.validate_address(human)?;
        Ok(human.as_bytes().to_vec())
    }

    fn humanize_address(&self, canonical: &[u8]) -> Result<String, BackendError> {
        String::from_utf8(canonical.to_vec())
            .map_err(|_| BackendError::InvalidAddress("invalid canonical address".to_string()))
    }
}

/// Querier returning a canned response and charging a fixed amount of
/// external gas per query.
#[derive(Debug)]
pub struct MockQuerier {
    response: Result<Vec<u8>, BackendError>,
    gas_per_query: u64,
    consumed: Cell<u64>,
}

impl Default for MockQuerier {
    fn default() -> Self {
        MockQuerier {
            response: Ok(br#"{"ok":true}"#.to_vec()),
            gas_per_query: 0,
            consumed: Cell::new(0),
        }
    }
}

impl MockQuerier {
    pub fn with_response(response: Vec<u8>) -> Self {
        MockQuerier {
            response: Ok(response),
            ..MockQuerier::default()
        }
    }

    pub fn with_error(error: BackendError) -> Self {
        MockQuerier {
            response: Err(error),
            ..MockQuerier::default()
        }
    }

    pub fn with_gas_cost(mut self, gas_per_query: u64) -> Self {
        self.gas_per_query = gas_per_query;
        self
    }
}

impl Querier for MockQuerier {
    fn query_raw(&self, _request: &[u8], _gas_limit: u64) -> Result<Vec<u8>, BackendError> {
        self.consumed.set(self.consumed.get() + self.gas_per_query);
        self.response.clone()
    }

    fn gas_consumed(&self) -> u64 {
        self.consumed.get()
    }
}

/// Gas meter that reports a fixed consumption.
#[derive(Debug, Default)]
pub struct NoopGasMeter {
    pub consumed: u64,
}

impl GasMeter for NoopGasMeter {
    fn gas_consumed(&self) -> u64 {
        self.consumed
    }
}

#[cfg(test)]
pub(crate) use fixtures::*;

#[cfg(test)]
mod fixtures {
    use wasmi::{Externals, ImportsBuilder, ModuleInstance, ModuleRef, RuntimeArgs, RuntimeValue, Trap};

    use crate::execution::Error;
    use crate::memory::MemoryManager;
    use crate::runtime::EnvImportResolver;

    /// A well-behaved contract: a bump allocator, `instantiate`/`execute`
    /// writing a fixed config entry, `query` reading it back, and pass-through
    /// `migrate`/`sudo`/`reply`.
    ///
    /// Static data (page 0): Regions at 256/272/288 describing the key
    /// "config" at 304, its value at 320 and the "{}" response at 400. The
    /// allocator heap starts at page 2.
    const STANDARD_CONTRACT_WAT: &str = r#"
(module
  (import "env" "db_read" (func $db_read (param i32) (result i32)))
  (import "env" "db_write" (func $db_write (param i32 i32)))
  (memory (export "memory") 4)
  (data (i32.const 256) "\30\01\00\00\06\00\00\00\06\00\00\00")
  (data (i32.const 272) "\40\01\00\00\3a\00\00\00\3a\00\00\00")
  (data (i32.const 288) "\90\01\00\00\02\00\00\00\02\00\00\00")
  (data (i32.const 304) "config")
  (data (i32.const 320) "{\"verifier\":\"fred\",\"beneficiary\":\"bob\",\"funder\":\"creator\"}")
  (data (i32.const 400) "{}")
  (global $heap (mut i32) (i32.const 131072))
  (func (export "allocate") (param $size i32) (result i32)
    (local $ptr i32)
    (local.set $ptr (global.get $heap))
    (global.set $heap (i32.add (global.get $heap) (local.get $size)))
    (local.get $ptr))
  (func (export "deallocate") (param i32))
  (func (export "instantiate") (param i32 i32 i32) (result i32)
    (call $db_write (i32.const 256) (i32.const 272))
    (i32.const 288))
  (func (export "execute") (param i32 i32 i32) (result i32)
    (call $db_write (i32.const 256) (i32.const 272))
    (i32.const 288))
  (func (export "query") (param i32 i32) (result i32)
    (call $db_read (i32.const 256)))
  (func (export "migrate") (param i32 i32) (result i32)
    (i32.const 288))
  (func (export "sudo") (param i32 i32) (result i32)
    (i32.const 288))
  (func (export "reply") (param i32 i32) (result i32)
    (i32.const 288)))
"#;

    /// `execute` burns gas in an endless `db_read` loop.
    const GAS_GUZZLER_WAT: &str = r#"
(module
  (import "env" "db_read" (func $db_read (param i32) (result i32)))
  (memory (export "memory") 4)
  (data (i32.const 256) "\30\01\00\00\06\00\00\00\06\00\00\00")
  (data (i32.const 304) "config")
  (global $heap (mut i32) (i32.const 131072))
  (func (export "allocate") (param $size i32) (result i32)
    (local $ptr i32)
    (local.set $ptr (global.get $heap))
    (global.set $heap (i32.add (global.get $heap) (local.get $size)))
    (local.get $ptr))
  (func (export "deallocate") (param i32))
  (func (export "execute") (param i32 i32 i32) (result i32)
    (loop $forever
      (drop (call $db_read (i32.const 256)))
      (br $forever))
    (unreachable)))
"#;

    /// `execute` aborts with a static message.
    const ABORTING_WAT: &str = r#"
(module
  (import "env" "abort" (func $abort (param i32)))
  (memory (export "memory") 4)
  (data (i32.const 256) "\10\01\00\00\0e\00\00\00\0e\00\00\00")
  (data (i32.const 272) "out of balance")
  (global $heap (mut i32) (i32.const 131072))
  (func (export "allocate") (param $size i32) (result i32)
    (local $ptr i32)
    (local.set $ptr (global.get $heap))
    (global.set $heap (i32.add (global.get $heap) (local.get $size)))
    (local.get $ptr))
  (func (export "deallocate") (param i32))
  (func (export "execute") (param i32 i32 i32) (result i32)
    (call $abort (i32.const 256))
    (unreachable)))
"#;

    /// `execute` opens an unbounded ascending scan and returns the second
    /// record.
    const ITERATING_WAT: &str = r#"
(module
  (import "env" "db_scan" (func $db_scan (param i32 i32 i32) (result i32)))
  (import "env" "db_next" (func $db_next (param i32) (result i32)))
  (memory (export "memory") 4)
  (global $heap (mut i32) (i32.const 131072))
  (func (export "allocate") (param $size i32) (result i32)
    (local $ptr i32)
    (local.set $ptr (global.get $heap))
    (global.set $heap (i32.add (global.get $heap) (local.get $size)))
    (local.get $ptr))
  (func (export "deallocate") (param i32))
  (func (export "execute") (param i32 i32 i32) (result i32)
    (local $iter i32)
    (local.set $iter (call $db_scan (i32.const 0) (i32.const 0) (i32.const 1)))
    (drop (call $db_next (local.get $iter)))
    (call $db_next (local.get $iter))))
"#;

    pub(crate) fn contract_fixture() -> Vec<u8> {
        wabt::wat2wasm(STANDARD_CONTRACT_WAT).expect("fixture should assemble")
    }

    pub(crate) fn gas_guzzler_fixture() -> Vec<u8> {
        wabt::wat2wasm(GAS_GUZZLER_WAT).expect("fixture should assemble")
    }

    pub(crate) fn aborting_fixture() -> Vec<u8> {
        wabt::wat2wasm(ABORTING_WAT).expect("fixture should assemble")
    }

    pub(crate) fn iterating_fixture() -> Vec<u8> {
        wabt::wat2wasm(ITERATING_WAT).expect("fixture should assemble")
    }

    /// A module whose exports include IBC entry points, for analysis tests.
    /// Function bodies are irrelevant to analysis.
    pub(crate) fn ibc_fixture() -> Vec<u8> {
        use parity_wasm::builder;
        use parity_wasm::elements::{Instruction, Instructions};

        let mut module_builder = builder::module();
        for _ in 0..3 {
            module_builder = module_builder
                .function()
                .signature()
                .build()
                .body()
                .with_instructions(Instructions::new(vec![Instruction::End]))
                .build()
                .build();
        }
        let module = module_builder
            .export()
            .field("instantiate")
            .internal()
            .func(0)
            .build()
            .export()
            .field("ibc_packet_receive")
            .internal()
            .func(1)
            .build()
            .export()
            .field("migrate")
            .internal()
            .func(2)
            .build()
            .memory()
            .with_min(1)
            .build()
            .export()
            .field("memory")
            .internal()
            .memory(0)
            .build()
            .build();
        parity_wasm::serialize(module).expect("fixture should serialize")
    }

    /// A module with no exported memory; fails store-time validation.
    pub(crate) fn memoryless_fixture() -> Vec<u8> {
        use parity_wasm::builder;
        use parity_wasm::elements::{Instruction, Instructions};

        let module = builder::module()
            .function()
            .signature()
            .build()
            .body()
            .with_instructions(Instructions::new(vec![Instruction::End]))
            .build()
            .build()
            .export()
            .field("instantiate")
            .internal()
            .func(0)
            .build()
            .build();
        parity_wasm::serialize(module).expect("fixture should serialize")
    }

    /// Instantiates a fixture against the `env` resolver and hands back the
    /// instance with its memory manager.
    pub(crate) fn instantiate_contract(wasm: &[u8]) -> (ModuleRef, MemoryManager) {
        let module = wasmi::Module::from_buffer(wasm).expect("fixture should load");
        let instance = ModuleInstance::new(
            &module,
            &ImportsBuilder::new().with_resolver("env", &EnvImportResolver),
        )
        .expect("fixture should instantiate")
        .assert_no_start();
        let memory = instance
            .export_by_name("memory")
            .and_then(|export| export.as_memory().cloned())
            .expect("fixture exports memory");
        (instance.clone(), MemoryManager::new(instance, memory))
    }

    /// Externals that reject every host call; for driving contracts that
    /// only use their own exports.
    pub(crate) struct NoopExternals;

    impl Externals for NoopExternals {
        fn invoke_index(
            &mut self,
            index: usize,
            _args: RuntimeArgs,
        ) -> Result<Option<RuntimeValue>, Trap> {
            Err(Error::Interpreter(format!(
                "unexpected host call {} in a pure-contract test",
                index
            ))
            .into())
        }
    }
}
