//! The entry-point dispatcher and the host-facing API of the runtime.

use std::sync::atomic::{AtomicU64, Ordering};

use wasmi::{ImportsBuilder, ModuleInstance, RuntimeValue};

use crate::backend::Backend;
use crate::cache::{CompiledModule, Metrics, PinnedMetrics, WasmCache};
use crate::checksum::Checksum;
use crate::env::validate_env;
use crate::execution::Error;
use crate::gas::{GasReport, HostFunctionCosts};
use crate::memory::MemoryManager;
use crate::runtime::{EnvImportResolver, RuntimeEnvironment};
use crate::wasm_prep::AnalysisReport;

/// Runtime construction parameters.
#[derive(Debug, Copy, Clone)]
pub struct VmConfig {
    /// Upper bound on the linear memory a contract may declare, in 64 KiB
    /// pages.
    pub max_memory_pages: u32,
    /// Gas charged by the host function surface.
    pub costs: HostFunctionCosts,
}

impl Default for VmConfig {
    fn default() -> Self {
        VmConfig {
            max_memory_pages: 512,
            costs: HostFunctionCosts::default(),
        }
    }
}

/// Outcome of one entry-point call.
///
/// Both arms carry a [`GasReport`]. Failures before a runtime environment
/// exists (bad checksum, cache miss, env validation) report zeroes; the
/// gas-exhaustion path reports the exhausted counter with zero remaining.
#[derive(Debug)]
pub enum CallResult {
    Success {
        /// The contract's response Region contents, JSON per the response
        /// schema.
        data: Vec<u8>,
        gas_report: GasReport,
    },
    Failure {
        error: Error,
        gas_report: GasReport,
    },
}

impl CallResult {
    fn failure(error: Error) -> Self {
        CallResult::Failure {
            error,
            gas_report: GasReport::default(),
        }
    }

    /// The gas report of either arm.
    pub fn gas_report(&self) -> GasReport {
        match self {
            CallResult::Success { gas_report, .. } => *gas_report,
            CallResult::Failure { gas_report, .. } => *gas_report,
        }
    }

    /// Collapses into a plain result, dropping the failure-side report.
    pub fn into_result(self) -> Result<(Vec<u8>, GasReport), Error> {
        match self {
            CallResult::Success { data, gas_report } => Ok((data, gas_report)),
            CallResult::Failure { error, .. } => Err(error),
        }
    }
}

/// The contract execution runtime: a process-wide module cache plus the
/// entry-point dispatcher.
///
/// One `WasmVm` serves concurrent calls; each call runs synchronously on the
/// caller's thread against a private environment.
pub struct WasmVm {
    cache: WasmCache,
    costs: HostFunctionCosts,
    next_call_id: AtomicU64,
}

impl WasmVm {
    pub fn new(config: VmConfig) -> Self {
        WasmVm {
            cache: WasmCache::new(config.max_memory_pages),
            costs: config.costs,
            next_call_id: AtomicU64::new(1),
        }
    }

    // Cache operations.

    pub fn store_code(&self, wasm: &[u8], persist: bool) -> Result<Checksum, Error> {
        self.cache.store_code(wasm, persist)
    }

    pub fn store_code_unchecked(&self, wasm: &[u8]) -> Result<Checksum, Error> {
        self.cache.store_code_unchecked(wasm)
    }

    pub fn simulate_store_code(&self, wasm: &[u8]) -> Result<(Checksum, bool), Error> {
        self.cache.simulate_store_code(wasm)
    }

    pub fn get_code(&self, checksum: &[u8]) -> Result<Vec<u8>, Error> {
        self.cache.get_code(checksum)
    }

    pub fn remove_code(&self, checksum: &[u8]) -> Result<(), Error> {
        self.cache.remove_code(checksum)
    }

    pub fn pin(&self, checksum: &[u8]) -> Result<(), Error> {
        self.cache.pin(checksum)
    }

    pub fn unpin(&self, checksum: &[u8]) -> Result<(), Error> {
        self.cache.unpin(checksum)
    }

    pub fn analyze_code(&self, checksum: &[u8]) -> Result<AnalysisReport, Error> {
        self.cache.analyze_code(checksum)
    }

    pub fn get_metrics(&self) -> Metrics {
        self.cache.get_metrics()
    }

    pub fn get_pinned_metrics(&self) -> PinnedMetrics {
        self.cache.get_pinned_metrics()
    }

    /// Drops all stored bytecode and compiled modules.
    pub fn release_cache(&self) {
        self.cache.release()
    }

    // Entry points.

    pub fn instantiate(
        &self,
        checksum: &[u8],
        env: &[u8],
        info: &[u8],
        msg: &[u8],
        backend: Backend<'_>,
        gas_limit: u64,
    ) -> CallResult {
        self.call_contract_fn("instantiate", checksum, env, Some(info), msg, backend, gas_limit)
    }

    pub fn execute(
        &self,
        checksum: &[u8],
        env: &[u8],
        info: &[u8],
        msg: &[u8],
        backend: Backend<'_>,
        gas_limit: u64,
    ) -> CallResult {
        self.call_contract_fn("execute", checksum, env, Some(info), msg, backend, gas_limit)
    }

    /// Runs a query. The message must be a JSON object with exactly one
    /// top-level field; other shapes fail before any instantiation.
    pub fn query(
        &self,
        checksum: &[u8],
        env: &[u8],
        msg: &[u8],
        backend: Backend<'_>,
        gas_limit: u64,
    ) -> CallResult {
        if let Err(error) = validate_query_msg(msg) {
            return CallResult::failure(error);
        }
        self.call_contract_fn("query", checksum, env, None, msg, backend, gas_limit)
    }

    pub fn migrate(
        &self,
        checksum: &[u8],
        env: &[u8],
        msg: &[u8],
        backend: Backend<'_>,
        gas_limit: u64,
    ) -> CallResult {
        self.call_contract_fn("migrate", checksum, env, None, msg, backend, gas_limit)
    }

    /// Like [`migrate`](WasmVm::migrate) for contracts whose `migrate` entry
    /// point takes a migrate-info argument.
    pub fn migrate_with_info(
        &self,
        checksum: &[u8],
        env: &[u8],
        msg: &[u8],
        migrate_info: &[u8],
        backend: Backend<'_>,
        gas_limit: u64,
    ) -> CallResult {
        self.call_contract_fn(
            "migrate",
            checksum,
            env,
            Some(migrate_info),
            msg,
            backend,
            gas_limit,
        )
    }

    pub fn sudo(
        &self,
        checksum: &[u8],
        env: &[u8],
        msg: &[u8],
        backend: Backend<'_>,
        gas_limit: u64,
    ) -> CallResult {
        self.call_contract_fn("sudo", checksum, env, None, msg, backend, gas_limit)
    }

    pub fn reply(
        &self,
        checksum: &[u8],
        env: &[u8],
        reply: &[u8],
        backend: Backend<'_>,
        gas_limit: u64,
    ) -> CallResult {
        self.call_contract_fn("reply", checksum, env, None, reply, backend, gas_limit)
    }

    pub fn ibc_channel_open(
        &self,
        checksum: &[u8],
        env: &[u8],
        msg: &[u8],
        backend: Backend<'_>,
        gas_limit: u64,
    ) -> CallResult {
        self.call_contract_fn("ibc_channel_open", checksum, env, None, msg, backend, gas_limit)
    }

    pub fn ibc_channel_connect(
        &self,
        checksum: &[u8],
        env: &[u8],
        msg: &[u8],
        backend: Backend<'_>,
        gas_limit: u64,
    ) -> CallResult {
        self.call_contract_fn(
            "ibc_channel_connect",
            checksum,
            env,
            None,
            msg,
            backend,
            gas_limit,
        )
    }

    pub fn ibc_channel_close(
        &self,
        checksum: &[u8],
        env: &[u8],
        msg: &[u8],
        backend: Backend<'_>,
        gas_limit: u64,
    ) -> CallResult {
        self.call_contract_fn(
            "ibc_channel_close",
            checksum,
            env,
            None,
            msg,
            backend,
            gas_limit,
        )
    }

    pub fn ibc_packet_receive(
        &self,
        checksum: &[u8],
        env: &[u8],
        msg: &[u8],
        backend: Backend<'_>,
        gas_limit: u64,
    ) -> CallResult {
        self.call_contract_fn(
            "ibc_packet_receive",
            checksum,
            env,
            None,
            msg,
            backend,
            gas_limit,
        )
    }

    pub fn ibc_packet_ack(
        &self,
        checksum: &[u8],
        env: &[u8],
        msg: &[u8],
        backend: Backend<'_>,
        gas_limit: u64,
    ) -> CallResult {
        self.call_contract_fn("ibc_packet_ack", checksum, env, None, msg, backend, gas_limit)
    }

    pub fn ibc_packet_timeout(
        &self,
        checksum: &[u8],
        env: &[u8],
        msg: &[u8],
        backend: Backend<'_>,
        gas_limit: u64,
    ) -> CallResult {
        self.call_contract_fn(
            "ibc_packet_timeout",
            checksum,
            env,
            None,
            msg,
            backend,
            gas_limit,
        )
    }

    pub fn ibc_source_callback(
        &self,
        checksum: &[u8],
        env: &[u8],
        msg: &[u8],
        backend: Backend<'_>,
        gas_limit: u64,
    ) -> CallResult {
        self.call_contract_fn(
            "ibc_source_callback",
            checksum,
            env,
            None,
            msg,
            backend,
            gas_limit,
        )
    }

    pub fn ibc_destination_callback(
        &self,
        checksum: &[u8],
        env: &[u8],
        msg: &[u8],
        backend: Backend<'_>,
        gas_limit: u64,
    ) -> CallResult {
        self.call_contract_fn(
            "ibc_destination_callback",
            checksum,
            env,
            None,
            msg,
            backend,
            gas_limit,
        )
    }

    /// The dispatcher shared by every entry point, parameterized by the
    /// export name and an optional info buffer.
    fn call_contract_fn(
        &self,
        name: &'static str,
        checksum: &[u8],
        env: &[u8],
        info: Option<&[u8]>,
        msg: &[u8],
        backend: Backend<'_>,
        gas_limit: u64,
    ) -> CallResult {
        let checksum = match Checksum::from_call_argument(checksum) {
            Ok(checksum) => checksum,
            Err(error) => return CallResult::failure(error),
        };
        let module = match self.cache.get_module(&checksum) {
            Ok(module) => module,
            Err(error) => return CallResult::failure(error),
        };
        let adapted_env = match validate_env(env) {
            Ok(adapted) => adapted,
            Err(error) => return CallResult::failure(error.into()),
        };

        let call_id = self.next_call_id.fetch_add(1, Ordering::Relaxed);
        let mut runtime = RuntimeEnvironment::new(backend, gas_limit, self.costs, call_id);

        let outcome = run_call(name, &module, &adapted_env, info, msg, &mut runtime);
        runtime.close_iterators();

        match outcome {
            Ok(data) => CallResult::Success {
                data,
                gas_report: runtime.gas_report(),
            },
            Err(error @ Error::GasLimit) => CallResult::Failure {
                error,
                gas_report: runtime.gas_report(),
            },
            Err(error) => CallResult::failure(error),
        }
    }
}

/// Steps 5 through 11 of a dispatcher call: instantiate, marshal, invoke,
/// decode. Instance handles are reference-counted and released when the last
/// clone drops at the end of this scope.
fn run_call(
    name: &'static str,
    module: &CompiledModule,
    env: &[u8],
    info: Option<&[u8]>,
    msg: &[u8],
    runtime: &mut RuntimeEnvironment<'_>,
) -> Result<Vec<u8>, Error> {
    let resolver = EnvImportResolver;
    let imports = ImportsBuilder::new().with_resolver("env", &resolver);
    let not_started = ModuleInstance::new(&module.wasm_module, &imports).map_err(Error::from)?;
    if not_started.has_start() {
        return Err(Error::UnsupportedWasmStart);
    }
    let instance = not_started.assert_no_start();

    let memory = instance
        .export_by_name("memory")
        .and_then(|export| export.as_memory().cloned())
        .ok_or(Error::MissingMemory)?;
    let mem = MemoryManager::new(instance.clone(), memory);
    runtime.set_memory(mem.clone());

    let env_ptr = mem.write_to_memory(env, runtime)?;
    let msg_ptr = mem.write_to_memory(msg, runtime)?;

    let params: Vec<RuntimeValue> = match name {
        "instantiate" | "execute" => {
            let info = info.ok_or(Error::MissingInfo(name))?;
            let info_ptr = mem.write_to_memory(info, runtime)?;
            vec![
                RuntimeValue::I32(env_ptr as i32),
                RuntimeValue::I32(info_ptr as i32),
                RuntimeValue::I32(msg_ptr as i32),
            ]
        }
        "migrate" => match info {
            Some(info) => {
                let info_ptr = mem.write_to_memory(info, runtime)?;
                vec![
                    RuntimeValue::I32(env_ptr as i32),
                    RuntimeValue::I32(info_ptr as i32),
                    RuntimeValue::I32(msg_ptr as i32),
                ]
            }
            None => vec![
                RuntimeValue::I32(env_ptr as i32),
                RuntimeValue::I32(msg_ptr as i32),
            ],
        },
        _ => vec![
            RuntimeValue::I32(env_ptr as i32),
            RuntimeValue::I32(msg_ptr as i32),
        ],
    };

    if instance
        .export_by_name(name)
        .and_then(|export| export.as_func().cloned())
        .is_none()
    {
        return Err(Error::FunctionNotFound(name.to_string()));
    }

    let returned = instance
        .invoke_export(name, &params, runtime)
        .map_err(Error::from)?;
    let result_ptr = match returned {
        Some(RuntimeValue::I32(ptr)) => ptr as u32,
        Some(_) => return Err(Error::UnexpectedReturnType(name.to_string())),
        None => {
            return Err(Error::UnexpectedReturnCount {
                name: name.to_string(),
                returned: 0,
            })
        }
    };

    mem.read_from_memory(result_ptr)
}

fn validate_query_msg(msg: &[u8]) -> Result<(), Error> {
    let value: serde_json::Value =
        serde_json::from_slice(msg).map_err(|e| Error::InvalidQueryFormat(e.to_string()))?;
    match value.as_object() {
        Some(fields) if fields.len() == 1 => Ok(()),
        Some(_) => Err(Error::QueryFieldCount),
        None => Err(Error::InvalidQueryFormat(
            "query message must be a JSON object".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendError, Storage};
    use crate::env::{BlockInfo, ContractInfo, Env, TransactionInfo};
    use crate::testing::{
        aborting_fixture, contract_fixture, gas_guzzler_fixture, ibc_fixture, iterating_fixture,
        memoryless_fixture, MemoryStorage, MockApi, MockQuerier, NoopGasMeter,
    };
    use crate::wasm_prep::DEFAULT_CONTRACT_MIGRATE_VERSION;

    const GAS_LIMIT: u64 = 5_000_000;

    fn env_json() -> Vec<u8> {
        serde_json::to_vec(&Env {
            block: BlockInfo {
                height: 12_345,
                time: "1571797419879305533".to_string(),
                chain_id: "testing".to_string(),
            },
            transaction: Some(TransactionInfo { index: 3 }),
            contract: ContractInfo {
                address: "contract".to_string(),
            },
        })
        .unwrap()
    }

    fn info_json() -> Vec<u8> {
        br#"{"sender":"creator","funds":[]}"#.to_vec()
    }

    struct Hosts {
        storage: MemoryStorage,
        api: MockApi,
        querier: MockQuerier,
        gas_meter: NoopGasMeter,
    }

    impl Hosts {
        fn new() -> Self {
            Hosts {
                storage: MemoryStorage::new(),
                api: MockApi,
                querier: MockQuerier::default(),
                gas_meter: NoopGasMeter::default(),
            }
        }

        fn backend(&mut self) -> Backend<'_> {
            Backend {
                storage: &mut self.storage,
                api: &self.api,
                querier: &self.querier,
                gas_meter: &mut self.gas_meter,
            }
        }
    }

    fn store(vm: &WasmVm, wasm: &[u8]) -> Checksum {
        vm.store_code(wasm, true).unwrap()
    }

    #[test]
    fn store_get_and_analyze() {
        let vm = WasmVm::new(VmConfig::default());
        let wasm = contract_fixture();
        let checksum = store(&vm, &wasm);
        assert_eq!(checksum.as_ref().len(), 32);
        assert_eq!(vm.get_code(checksum.as_ref()).unwrap(), wasm);

        let report = vm.analyze_code(checksum.as_ref()).unwrap();
        assert!(!report.has_ibc_entry_points);
        assert!(report.required_capabilities.is_empty());
        assert!(report.entrypoints.iter().any(|e| e == "allocate"));
        assert!(report.entrypoints.iter().any(|e| e == "deallocate"));
        assert_eq!(
            report.contract_migrate_version,
            Some(DEFAULT_CONTRACT_MIGRATE_VERSION)
        );
    }

    #[test]
    fn analyze_detects_ibc_contracts() {
        let vm = WasmVm::new(VmConfig::default());
        let checksum = store(&vm, &ibc_fixture());
        let report = vm.analyze_code(checksum.as_ref()).unwrap();
        assert!(report.has_ibc_entry_points);
        assert!(report.required_capabilities.contains("iterator"));
        assert!(report.required_capabilities.contains("stargate"));
        assert_eq!(report.contract_migrate_version, None);
    }

    #[test]
    fn bad_checksums_are_rejected_before_dispatch() {
        let vm = WasmVm::new(VmConfig::default());
        let mut hosts = Hosts::new();

        let result = vm.instantiate(&[], &env_json(), &info_json(), b"{}", hosts.backend(), GAS_LIMIT);
        match result {
            CallResult::Failure { error, gas_report } => {
                assert_eq!(error.to_string(), "Null/Nil argument: checksum");
                assert_eq!(gas_report, GasReport::default());
            }
            other => panic!("expected failure, got {:?}", other),
        }

        let result = vm.instantiate(
            &[0u8; 31],
            &env_json(),
            &info_json(),
            b"{}",
            hosts.backend(),
            GAS_LIMIT,
        );
        match result {
            CallResult::Failure { error, .. } => {
                assert!(error.to_string().contains("must be 32 bytes"));
            }
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[test]
    fn storing_memoryless_contract_fails() {
        let vm = WasmVm::new(VmConfig::default());
        let error = vm.store_code(&memoryless_fixture(), true).unwrap_err();
        assert!(error
            .to_string()
            .contains("Wasm contract must contain exactly one memory"));
    }

    #[test]
    fn instantiate_then_query_round_trip() {
        let vm = WasmVm::new(VmConfig::default());
        let checksum = store(&vm, &contract_fixture());
        let mut hosts = Hosts::new();

        let result = vm.instantiate(
            checksum.as_ref(),
            &env_json(),
            &info_json(),
            br#"{"verifier":"fred","beneficiary":"bob"}"#,
            hosts.backend(),
            GAS_LIMIT,
        );
        let (data, gas_report) = result.into_result().unwrap();
        assert_eq!(data, b"{}");
        assert!(gas_report.used_internally > 0);
        assert_eq!(
            gas_report.remaining + gas_report.used_internally,
            gas_report.limit
        );

        let result = vm.query(
            checksum.as_ref(),
            &env_json(),
            br#"{"raw":{"key":"config"}}"#,
            hosts.backend(),
            GAS_LIMIT,
        );
        let (data, _) = result.into_result().unwrap();
        let decoded: serde_json::Value = serde_json::from_slice(&data).unwrap();
        assert_eq!(decoded["verifier"], "fred");
        assert_eq!(decoded["beneficiary"], "bob");
        assert_eq!(decoded["funder"], "creator");
    }

    #[test]
    fn query_validates_message_shape_before_dispatch() {
        let vm = WasmVm::new(VmConfig::default());
        let checksum = store(&vm, &contract_fixture());
        let mut hosts = Hosts::new();

        let result = vm.query(
            checksum.as_ref(),
            &env_json(),
            br#"{"a":1,"b":2}"#,
            hosts.backend(),
            GAS_LIMIT,
        );
        assert!(matches!(
            result,
            CallResult::Failure {
                error: Error::QueryFieldCount,
                ..
            }
        ));

        let result = vm.query(checksum.as_ref(), &env_json(), b"[1,2]", hosts.backend(), GAS_LIMIT);
        assert!(matches!(
            result,
            CallResult::Failure {
                error: Error::InvalidQueryFormat(_),
                ..
            }
        ));

        let result = vm.query(checksum.as_ref(), &env_json(), b"not json", hosts.backend(), GAS_LIMIT);
        assert!(matches!(
            result,
            CallResult::Failure {
                error: Error::InvalidQueryFormat(_),
                ..
            }
        ));
    }

    #[test]
    fn env_blob_is_validated() {
        let vm = WasmVm::new(VmConfig::default());
        let checksum = store(&vm, &contract_fixture());
        let mut hosts = Hosts::new();

        let env = br#"{"block":{"height":1,"time":"0","chain_id":""},
                       "transaction":{"index":0},
                       "contract":{"address":"c"}}"#;
        let result = vm.instantiate(
            checksum.as_ref(),
            env,
            &info_json(),
            b"{}",
            hosts.backend(),
            GAS_LIMIT,
        );
        match result {
            CallResult::Failure { error, .. } => {
                assert!(error.to_string().contains("missing required field: block.chain_id"));
            }
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[test]
    fn sudo_reply_and_migrate_dispatch() {
        let vm = WasmVm::new(VmConfig::default());
        let checksum = store(&vm, &contract_fixture());
        let mut hosts = Hosts::new();

        for result in [
            vm.sudo(checksum.as_ref(), &env_json(), br#"{"step":1}"#, hosts.backend(), GAS_LIMIT),
            vm.reply(checksum.as_ref(), &env_json(), br#"{"id":1}"#, hosts.backend(), GAS_LIMIT),
            vm.migrate(checksum.as_ref(), &env_json(), b"{}", hosts.backend(), GAS_LIMIT),
        ] {
            let (data, _) = result.into_result().unwrap();
            assert_eq!(data, b"{}");
        }
    }

    #[test]
    fn missing_entry_point_is_reported() {
        let vm = WasmVm::new(VmConfig::default());
        // The aborting fixture only exports execute.
        let checksum = store(&vm, &aborting_fixture());
        let mut hosts = Hosts::new();
        let result = vm.sudo(checksum.as_ref(), &env_json(), br#"{"x":1}"#, hosts.backend(), GAS_LIMIT);
        match result {
            CallResult::Failure { error: Error::FunctionNotFound(name), .. } => {
                assert_eq!(name, "sudo");
            }
            other => panic!("expected FunctionNotFound, got {:?}", other),
        }
    }

    #[test]
    fn ibc_entry_points_dispatch_by_name() {
        let vm = WasmVm::new(VmConfig::default());
        let checksum = store(&vm, &contract_fixture());
        let mut hosts = Hosts::new();
        // The fixture is not an IBC contract, so the lookup fails with the
        // entry point's own name, proving the dispatch path is shared.
        let result = vm.ibc_channel_open(
            checksum.as_ref(),
            &env_json(),
            b"{}",
            hosts.backend(),
            GAS_LIMIT,
        );
        match result {
            CallResult::Failure { error: Error::FunctionNotFound(name), .. } => {
                assert_eq!(name, "ibc_channel_open");
            }
            other => panic!("expected FunctionNotFound, got {:?}", other),
        }
    }

    #[test]
    fn pinned_modules_count_hits() {
        let vm = WasmVm::new(VmConfig::default());
        let wasm = contract_fixture();
        let checksum = store(&vm, &wasm);
        vm.pin(checksum.as_ref()).unwrap();

        let mut hosts = Hosts::new();
        for _ in 0..3 {
            vm.execute(
                checksum.as_ref(),
                &env_json(),
                &info_json(),
                br#"{"run":{}}"#,
                hosts.backend(),
                GAS_LIMIT,
            )
            .into_result()
            .unwrap();
        }

        let pinned = vm.get_pinned_metrics();
        assert_eq!(pinned.per_module.len(), 1);
        let (reported, metrics) = &pinned.per_module[0];
        assert_eq!(reported, &checksum);
        assert_eq!(metrics.hits, 3);
        assert_eq!(metrics.size, 32 + wasm.len() as u64);

        vm.unpin(checksum.as_ref()).unwrap();
        assert!(vm.get_pinned_metrics().per_module.is_empty());
    }

    #[test]
    fn gas_exhaustion_reports_zero_remaining() {
        let vm = WasmVm::new(VmConfig::default());
        let checksum = store(&vm, &gas_guzzler_fixture());
        let mut hosts = Hosts::new();

        let result = vm.execute(
            checksum.as_ref(),
            &env_json(),
            &info_json(),
            br#"{"burn":{}}"#,
            hosts.backend(),
            1_000,
        );
        match result {
            CallResult::Failure { error, gas_report } => {
                assert!(matches!(error, Error::GasLimit));
                assert_eq!(gas_report.limit, 1_000);
                assert_eq!(gas_report.remaining, 0);
                assert_eq!(gas_report.used_internally, 1_000);
            }
            other => panic!("expected gas exhaustion, got {:?}", other),
        }
    }

    #[test]
    fn contract_abort_surfaces_the_message() {
        let vm = WasmVm::new(VmConfig::default());
        let checksum = store(&vm, &aborting_fixture());
        let mut hosts = Hosts::new();
        let result = vm.execute(
            checksum.as_ref(),
            &env_json(),
            &info_json(),
            br#"{"go":{}}"#,
            hosts.backend(),
            GAS_LIMIT,
        );
        match result {
            CallResult::Failure { error: Error::Aborted(message), .. } => {
                assert_eq!(message, "out of balance");
            }
            other => panic!("expected Aborted, got {:?}", other),
        }
    }

    #[test]
    fn iterating_contract_reads_the_second_record() {
        let vm = WasmVm::new(VmConfig::default());
        let checksum = store(&vm, &iterating_fixture());
        let mut hosts = Hosts::new();
        hosts.storage.set(b"alpha", b"1").unwrap();
        hosts.storage.set(b"beta", b"2").unwrap();

        let result = vm.execute(
            checksum.as_ref(),
            &env_json(),
            &info_json(),
            br#"{"walk":{}}"#,
            hosts.backend(),
            GAS_LIMIT,
        );
        let (data, _) = result.into_result().unwrap();
        let sections = crate::memory::decode_sections(&data).unwrap();
        assert_eq!(sections[0], b"beta");
        assert_eq!(sections[1], b"2");
    }

    #[test]
    fn concurrent_calls_are_isolated() {
        use std::sync::Arc;

        let vm = Arc::new(WasmVm::new(VmConfig::default()));
        let checksum = store(&vm, &iterating_fixture());

        std::thread::scope(|scope| {
            for (first, second) in [(b"a1", b"a2"), (b"b1", b"b2")] {
                let vm = Arc::clone(&vm);
                scope.spawn(move || {
                    let mut hosts = Hosts::new();
                    hosts.storage.set(first, b"x").unwrap();
                    hosts.storage.set(second, b"y").unwrap();
                    let result = vm.execute(
                        checksum.as_ref(),
                        &env_json(),
                        &info_json(),
                        br#"{"walk":{}}"#,
                        hosts.backend(),
                        GAS_LIMIT,
                    );
                    let (data, _) = result.into_result().unwrap();
                    let sections = crate::memory::decode_sections(&data).unwrap();
                    // Each call only ever sees its own store.
                    assert_eq!(sections[0], second.to_vec());
                });
            }
        });
    }

    #[test]
    fn instantiate_requires_info() {
        let vm = WasmVm::new(VmConfig::default());
        let checksum = store(&vm, &contract_fixture());
        let mut hosts = Hosts::new();
        // Calling the dispatcher directly models a host passing null info.
        let result = vm.call_contract_fn(
            "instantiate",
            checksum.as_ref(),
            &env_json(),
            None,
            b"{}",
            hosts.backend(),
            GAS_LIMIT,
        );
        match result {
            CallResult::Failure { error: Error::MissingInfo(name), .. } => {
                assert_eq!(name, "instantiate");
            }
            other => panic!("expected MissingInfo, got {:?}", other),
        }
    }

    #[test]
    fn removed_code_cannot_be_called() {
        let vm = WasmVm::new(VmConfig::default());
        let checksum = store(&vm, &contract_fixture());
        vm.remove_code(checksum.as_ref()).unwrap();

        let mut hosts = Hosts::new();
        let result = vm.instantiate(
            checksum.as_ref(),
            &env_json(),
            &info_json(),
            b"{}",
            hosts.backend(),
            GAS_LIMIT,
        );
        assert!(matches!(
            result,
            CallResult::Failure {
                error: Error::ModuleNotCompiled(_),
                ..
            }
        ));
        assert_eq!(vm.get_metrics().misses, 1);
    }

    #[test]
    fn unused_failing_querier_does_not_poison_a_call() {
        let vm = WasmVm::new(VmConfig::default());
        let checksum = store(&vm, &contract_fixture());
        let mut hosts = Hosts::new();
        hosts.querier = MockQuerier::with_error(BackendError::generic("chain unavailable"));
        // The standard fixture never queries; the failing querier must stay
        // inert.
        let result = vm.instantiate(
            checksum.as_ref(),
            &env_json(),
            &info_json(),
            b"{}",
            hosts.backend(),
            GAS_LIMIT,
        );
        assert!(result.into_result().is_ok());
    }

    #[test]
    fn release_cache_forgets_modules() {
        let vm = WasmVm::new(VmConfig::default());
        let checksum = store(&vm, &contract_fixture());
        vm.release_cache();
        let mut hosts = Hosts::new();
        let result = vm.instantiate(
            checksum.as_ref(),
            &env_json(),
            &info_json(),
            b"{}",
            hosts.backend(),
            GAS_LIMIT,
        );
        assert!(matches!(
            result,
            CallResult::Failure {
                error: Error::ModuleNotCompiled(_),
                ..
            }
        ));
    }

    #[test]
    fn unpinned_calls_count_into_memory_cache_hits() {
        let vm = WasmVm::new(VmConfig::default());
        let checksum = store(&vm, &contract_fixture());
        let mut hosts = Hosts::new();
        vm.execute(
            checksum.as_ref(),
            &env_json(),
            &info_json(),
            b"{}",
            hosts.backend(),
            GAS_LIMIT,
        )
        .into_result()
        .unwrap();
        let metrics = vm.get_metrics();
        assert_eq!(metrics.hits_memory_cache, 1);
        assert_eq!(metrics.hits_pinned_memory_cache, 0);
        assert_eq!(metrics.elements_memory_cache, 1);
    }
}
