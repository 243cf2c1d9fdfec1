use thiserror::Error;

use crate::backend::BackendError;
use crate::env::EnvError;
use crate::gas::GasLimitError;
use crate::region::RegionValidationError;
use crate::runtime::cryptography::CryptoError;
use crate::wasm_prep::WasmValidationError;

/// Possible runtime errors.
///
/// Several variants render fixed English strings for compatibility with the
/// messages hosts already match on; those strings must not be reworded.
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum Error {
    /// A required argument was null (passed as an empty buffer).
    #[error("Null/Nil argument: {0}")]
    NullArgument(&'static str),
    /// A checksum of the wrong length was passed to a cache operation.
    #[error("Checksum not of length 32")]
    InvalidChecksumLength,
    /// A checksum of the wrong length was passed to an entry-point call.
    #[error("invalid argument: checksum must be 32 bytes, got {actual}")]
    InvalidChecksumArgument {
        /// Number of bytes actually supplied.
        actual: usize,
    },
    /// Bytecode failed to decode.
    #[error("Wasm bytecode could not be deserialized")]
    Deserialization,
    /// Bytecode decoded but failed a static check.
    #[error("Error during static Wasm validation: {0}")]
    StaticValidation(#[from] WasmValidationError),
    /// Checksum absent from the bytecode map.
    #[error("Error opening Wasm file for reading")]
    CodeNotFound,
    /// Checksum absent when removing.
    #[error("Wasm file does not exist")]
    CodeDoesNotExist,
    /// Checksum absent from the compiled-module map during dispatch.
    #[error("code for {0} not found in compiled modules")]
    ModuleNotCompiled(String),
    /// The env blob did not satisfy the contract's requirements.
    #[error("failed to adapt environment: {0}")]
    EnvAdaptation(#[from] EnvError),
    /// The query message was not valid JSON.
    #[error("invalid query message format: {0}")]
    InvalidQueryFormat(String),
    /// The query message was not an object with exactly one field.
    #[error("query message must have exactly one field")]
    QueryFieldCount,
    /// A contract with a start section cannot be run.
    #[error("Unsupported Wasm start")]
    UnsupportedWasmStart,
    /// The contract module exports no linear memory.
    #[error("no memory section in module")]
    MissingMemory,
    /// A Region pointer of zero where a Region was required.
    #[error("null region pointer")]
    NullRegionPointer,
    /// A Region descriptor violated one of its invariants.
    #[error("invalid region: {0}")]
    Region(#[from] RegionValidationError),
    /// A named export was not found in the contract module.
    #[error("function {0:?} not found in contract")]
    FunctionNotFound(String),
    /// A non-optional info buffer was missing.
    #[error("{0} requires a non-null info parameter")]
    MissingInfo(&'static str),
    /// The entry point did not return exactly one value.
    #[error("function {name} returned {returned} results (wanted 1)")]
    UnexpectedReturnCount {
        /// Entry-point name.
        name: String,
        /// Number of values actually returned.
        returned: usize,
    },
    /// The entry point returned a non-i32 value.
    #[error("function {0} returned an unexpected value type")]
    UnexpectedReturnType(String),
    /// The contract referenced an iterator this call does not own.
    #[error("iterator {0} not found")]
    IteratorNotFound(u32),
    /// Length-prefixed section data did not decode.
    #[error("invalid section encoding: {0}")]
    InvalidSection(&'static str),
    /// `db_scan` was called with an unknown order.
    #[error("unknown order {0}, must be 1 (ascending) or 2 (descending)")]
    InvalidOrder(i32),
    /// Execution exceeded the gas limit.
    #[error("Out of gas error")]
    GasLimit,
    /// The contract called `abort`.
    #[error("Aborted: {0}")]
    Aborted(String),
    /// A host collaborator (store, api, querier) reported a failure.
    #[error("backend error: {0}")]
    Backend(#[from] BackendError),
    /// A cryptographic host function received malformed input.
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),
    /// Raw Wasm interpreter error.
    #[error("Interpreter error: {0}")]
    Interpreter(String),
}

impl From<GasLimitError> for Error {
    fn from(_: GasLimitError) -> Self {
        Error::GasLimit
    }
}

impl wasmi::HostError for Error {}

impl From<wasmi::Error> for Error {
    fn from(error: wasmi::Error) -> Self {
        match error
            .as_host_error()
            .and_then(|host_error| host_error.downcast_ref::<Error>())
        {
            Some(error) => error.clone(),
            None => Error::Interpreter(error.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compatibility_strings_are_fixed() {
        assert_eq!(
            Error::NullArgument("wasm").to_string(),
            "Null/Nil argument: wasm"
        );
        assert_eq!(
            Error::NullArgument("checksum").to_string(),
            "Null/Nil argument: checksum"
        );
        assert_eq!(
            Error::InvalidChecksumLength.to_string(),
            "Checksum not of length 32"
        );
        assert_eq!(
            Error::Deserialization.to_string(),
            "Wasm bytecode could not be deserialized"
        );
        assert_eq!(
            Error::CodeNotFound.to_string(),
            "Error opening Wasm file for reading"
        );
        assert_eq!(
            Error::CodeDoesNotExist.to_string(),
            "Wasm file does not exist"
        );
        assert_eq!(
            Error::StaticValidation(WasmValidationError::ExactlyOneMemory { actual: 0 })
                .to_string(),
            "Error during static Wasm validation: Wasm contract must contain exactly one memory"
        );
    }

    #[test]
    fn host_error_survives_the_trap_round_trip() {
        let trap: wasmi::Trap = Error::GasLimit.into();
        let wasmi_error = wasmi::Error::Trap(trap);
        match Error::from(wasmi_error) {
            Error::GasLimit => (),
            other => panic!("expected GasLimit, got {:?}", other),
        }
    }

    #[test]
    fn foreign_interpreter_error_is_wrapped() {
        let wasmi_error = wasmi::Error::Instantiation("boom".to_string());
        match Error::from(wasmi_error) {
            Error::Interpreter(message) => assert!(message.contains("boom")),
            other => panic!("expected Interpreter, got {:?}", other),
        }
    }
}
