//! Import resolution for the `env` host module.

use wasmi::{
    Error as InterpreterError, FuncInstance, FuncRef, ModuleImportResolver, Signature, ValueType,
};

use super::function_index::FunctionIndex;

/// Resolves the contract's `env` imports to host function references.
///
/// Signatures declared here are checked by the interpreter against the
/// contract's import declarations at instantiation time; a mismatch fails
/// the call before any contract code runs.
pub(crate) struct EnvImportResolver;

impl ModuleImportResolver for EnvImportResolver {
    fn resolve_func(
        &self,
        field_name: &str,
        _signature: &Signature,
    ) -> Result<FuncRef, InterpreterError> {
        let func_ref = match field_name {
            "db_read" => FuncInstance::alloc_host(
                Signature::new(&[ValueType::I32; 1][..], Some(ValueType::I32)),
                FunctionIndex::DbRead.into(),
            ),
            "db_write" => FuncInstance::alloc_host(
                Signature::new(&[ValueType::I32; 2][..], None),
                FunctionIndex::DbWrite.into(),
            ),
            "db_remove" => FuncInstance::alloc_host(
                Signature::new(&[ValueType::I32; 1][..], None),
                FunctionIndex::DbRemove.into(),
            ),
            "db_scan" => FuncInstance::alloc_host(
                Signature::new(&[ValueType::I32; 3][..], Some(ValueType::I32)),
                FunctionIndex::DbScan.into(),
            ),
            "db_next" => FuncInstance::alloc_host(
                Signature::new(&[ValueType::I32; 1][..], Some(ValueType::I32)),
                FunctionIndex::DbNext.into(),
            ),
            "addr_validate" => FuncInstance::alloc_host(
                Signature::new(&[ValueType::I32; 1][..], Some(ValueType::I32)),
                FunctionIndex::AddrValidate.into(),
            ),
            "addr_canonicalize" => FuncInstance::alloc_host(
                Signature::new(&[ValueType::I32; 1][..], Some(ValueType::I32)),
                FunctionIndex::AddrCanonicalize.into(),
            ),
            "addr_humanize" => FuncInstance::alloc_host(
                Signature::new(&[ValueType::I32; 1][..], Some(ValueType::I32)),
                FunctionIndex::AddrHumanize.into(),
            ),
            "query_chain" => FuncInstance::alloc_host(
                Signature::new(&[ValueType::I32; 1][..], Some(ValueType::I32)),
                FunctionIndex::QueryChain.into(),
            ),
            "secp256k1_verify" => FuncInstance::alloc_host(
                Signature::new(&[ValueType::I32; 3][..], Some(ValueType::I32)),
                FunctionIndex::Secp256k1Verify.into(),
            ),
            "secp256k1_recover_pubkey" => FuncInstance::alloc_host(
                Signature::new(&[ValueType::I32; 3][..], Some(ValueType::I32)),
                FunctionIndex::Secp256k1RecoverPubkey.into(),
            ),
            "ed25519_verify" => FuncInstance::alloc_host(
                Signature::new(&[ValueType::I32; 3][..], Some(ValueType::I32)),
                FunctionIndex::Ed25519Verify.into(),
            ),
            "ed25519_batch_verify" => FuncInstance::alloc_host(
                Signature::new(&[ValueType::I32; 3][..], Some(ValueType::I32)),
                FunctionIndex::Ed25519BatchVerify.into(),
            ),
            "abort" => FuncInstance::alloc_host(
                Signature::new(&[ValueType::I32; 1][..], None),
                FunctionIndex::Abort.into(),
            ),
            "debug" => FuncInstance::alloc_host(
                Signature::new(&[ValueType::I32; 1][..], None),
                FunctionIndex::Debug.into(),
            ),
            _ => {
                return Err(InterpreterError::Function(format!(
                    "host module doesn't export function with name {}",
                    field_name
                )));
            }
        };
        Ok(func_ref)
    }
}
