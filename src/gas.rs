//! Gas accounting for a single contract call.

use thiserror::Error;

/// Raised when a charge would push the counter past its limit.
#[derive(Error, Debug, Copy, Clone, PartialEq, Eq)]
#[error("gas limit exceeded")]
pub struct GasLimitError;

/// Tracks gas used against a fixed limit.
///
/// The counter only ever grows. A charge that would exceed the limit
/// saturates the counter at the limit and fails, so a report taken after
/// exhaustion shows zero remaining.
#[derive(Debug, Copy, Clone)]
pub struct GasCounter {
    limit: u64,
    used: u64,
}

impl GasCounter {
    pub fn new(limit: u64) -> Self {
        GasCounter { limit, used: 0 }
    }

    /// Adds a gas charge.
    pub fn charge(&mut self, amount: u64) -> Result<(), GasLimitError> {
        let updated = self.used.saturating_add(amount);
        if updated > self.limit {
            self.used = self.limit;
            return Err(GasLimitError);
        }
        self.used = updated;
        Ok(())
    }

    pub fn limit(&self) -> u64 {
        self.limit
    }

    pub fn used(&self) -> u64 {
        self.used
    }

    pub fn remaining(&self) -> u64 {
        self.limit - self.used
    }
}

/// Gas accounting summary of one entry-point call.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct GasReport {
    /// The limit the call ran under.
    pub limit: u64,
    /// `limit - used_internally`.
    pub remaining: u64,
    /// Gas charged by the runtime's own host functions.
    pub used_internally: u64,
    /// Gas attributed to work the host performed on the contract's behalf
    /// (querier traffic).
    pub used_externally: u64,
}

/// Cost table consulted before every host function call.
///
/// `per_byte` applies to payload traffic crossing the Wasm boundary: keys and
/// values moved in and out of storage, query requests and responses.
#[derive(Debug, Copy, Clone)]
pub struct HostFunctionCosts {
    pub db_read: u64,
    pub db_write: u64,
    pub db_remove: u64,
    pub db_scan: u64,
    pub db_next: u64,
    pub addr_validate: u64,
    pub addr_canonicalize: u64,
    pub addr_humanize: u64,
    pub query_chain: u64,
    pub secp256k1_verify: u64,
    pub secp256k1_recover_pubkey: u64,
    pub ed25519_verify: u64,
    pub ed25519_batch_verify_base: u64,
    pub ed25519_batch_verify_per_item: u64,
    pub per_byte: u64,
}

impl Default for HostFunctionCosts {
    fn default() -> Self {
        HostFunctionCosts {
            db_read: 300,
            db_write: 600,
            db_remove: 300,
            db_scan: 500,
            db_next: 300,
            addr_validate: 200,
            addr_canonicalize: 200,
            addr_humanize: 200,
            query_chain: 1_000,
            secp256k1_verify: 3_600,
            secp256k1_recover_pubkey: 7_200,
            ed25519_verify: 2_100,
            ed25519_batch_verify_base: 1_500,
            ed25519_batch_verify_per_item: 2_100,
            per_byte: 1,
        }
    }
}
