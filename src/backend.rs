//! Interfaces of the host collaborators the runtime drives on a contract's
//! behalf.
//!
//! The embedding host supplies a key/value store, an address API, a chain
//! querier and a gas meter for every call. The runtime borrows them for the
//! duration of one entry-point invocation and never stores them beyond it.

use thiserror::Error;

/// Failure reported by a host collaborator. The runtime propagates the
/// message as-is and terminates the current call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum BackendError {
    /// Catch-all for host failures that carry only a message.
    #[error("{0}")]
    Generic(String),
    /// The host ran out of gas while serving the request.
    #[error("out of gas in host operation")]
    OutOfGas,
    /// The underlying store could not provide a stable iteration snapshot.
    #[error("iterator snapshot unavailable: {0}")]
    IteratorUnavailable(String),
    /// An address was rejected by the host's address rules.
    #[error("invalid address: {0}")]
    InvalidAddress(String),
}

impl BackendError {
    /// Convenience constructor for message-only failures.
    pub fn generic(message: impl Into<String>) -> Self {
        BackendError::Generic(message.into())
    }
}

/// Iteration direction for [`Storage::scan`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Order {
    /// Ascending byte-lexicographic key order.
    Ascending = 1,
    /// Descending byte-lexicographic key order.
    Descending = 2,
}

impl TryFrom<i32> for Order {
    type Error = i32;

    fn try_from(value: i32) -> Result<Self, i32> {
        match value {
            1 => Ok(Order::Ascending),
            2 => Ok(Order::Descending),
            other => Err(other),
        }
    }
}

/// A single key/value pair yielded by an iterator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

/// A host-owned iterator over a storage snapshot.
///
/// Implementations must stay valid under writes performed through
/// [`Storage::set`]/[`Storage::remove`] after the iterator was opened, or
/// return an error from `next_record` if the snapshot was invalidated. They
/// must never yield data from a torn view.
pub trait StorageIterator {
    /// Returns the current record and advances, or `None` when exhausted.
    fn next_record(&mut self) -> Result<Option<Record>, BackendError>;
}

/// The host's key/value store as seen by one contract call.
pub trait Storage {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, BackendError>;

    fn set(&mut self, key: &[u8], value: &[u8]) -> Result<(), BackendError>;

    /// Deletes the key. Removing an absent key is not an error.
    fn remove(&mut self, key: &[u8]) -> Result<(), BackendError>;

    /// Opens an iterator over `[start, end)`. `None` bounds are unbounded on
    /// that side.
    fn scan(
        &self,
        start: Option<&[u8]>,
        end: Option<&[u8]>,
        order: Order,
    ) -> Result<Box<dyn StorageIterator>, BackendError>;
}

/// The host's address API: bech32 or whatever convention the chain uses.
/// The runtime treats addresses as opaque strings and byte blobs.
pub trait Api {
    fn validate_address(&self, human: &str) -> Result<(), BackendError>;

    fn canonicalize_address(&self, human: &str) -> Result<Vec<u8>, BackendError>;

    fn humanize_address(&self, canonical: &[u8]) -> Result<String, BackendError>;
}

/// The host's querier for reaching other modules or contracts.
pub trait Querier {
    /// Executes the serialized query request under `gas_limit` and returns
    /// the serialized response.
    fn query_raw(&self, request: &[u8], gas_limit: u64) -> Result<Vec<u8>, BackendError>;

    /// Total gas the querier has consumed so far. The runtime reports the
    /// delta over a call as externally used gas.
    fn gas_consumed(&self) -> u64;
}

/// The host's transaction-level gas meter. The runtime does not charge into
/// it (its own counter is authoritative for the call) but keeps it available
/// for host-side accounting.
pub trait GasMeter {
    fn gas_consumed(&self) -> u64;
}

/// The four collaborators bundled for one entry-point call.
pub struct Backend<'a> {
    pub storage: &'a mut dyn Storage,
    pub api: &'a dyn Api,
    pub querier: &'a dyn Querier,
    pub gas_meter: &'a mut dyn GasMeter,
}
