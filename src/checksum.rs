//! Content addressing of stored Wasm bytecode.

use std::fmt::{self, Display, Formatter};

use sha2::{Digest, Sha256};

use crate::execution::Error;

/// The number of bytes in a [`Checksum`].
pub const CHECKSUM_LENGTH: usize = 32;

/// A SHA-256 digest of contract bytecode.
///
/// This is the only identity under which a stored module can be referenced.
/// Hex renderings are used internally as map keys and in log output, never as
/// an exchange format.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Checksum([u8; CHECKSUM_LENGTH]);

impl Checksum {
    /// Computes the checksum of the given bytecode.
    pub fn generate(wasm: &[u8]) -> Self {
        Checksum(Sha256::digest(wasm).into())
    }

    /// Parses a checksum supplied by the host for a cache operation.
    ///
    /// An empty slice stands in for a missing argument and reports
    /// `Null/Nil argument: checksum`; any other length than 32 reports
    /// `Checksum not of length 32`.
    pub fn from_slice(data: &[u8]) -> Result<Self, Error> {
        if data.is_empty() {
            return Err(Error::NullArgument("checksum"));
        }
        let bytes: [u8; CHECKSUM_LENGTH] = data
            .try_into()
            .map_err(|_| Error::InvalidChecksumLength)?;
        Ok(Checksum(bytes))
    }

    /// Parses a checksum supplied to an entry-point call. Same rules as
    /// [`Checksum::from_slice`] but the length failure carries the byte count,
    /// matching the dispatcher's compatibility message.
    pub fn from_call_argument(data: &[u8]) -> Result<Self, Error> {
        if data.is_empty() {
            return Err(Error::NullArgument("checksum"));
        }
        let bytes: [u8; CHECKSUM_LENGTH] = data
            .try_into()
            .map_err(|_| Error::InvalidChecksumArgument { actual: data.len() })?;
        Ok(Checksum(bytes))
    }

    /// The raw digest bytes.
    pub fn as_bytes(&self) -> &[u8; CHECKSUM_LENGTH] {
        &self.0
    }

    /// Lowercase hex rendering, used as the cache map key.
    pub fn to_hex(&self) -> String {
        base16::encode_lower(&self.0)
    }
}

impl From<[u8; CHECKSUM_LENGTH]> for Checksum {
    fn from(bytes: [u8; CHECKSUM_LENGTH]) -> Self {
        Checksum(bytes)
    }
}

impl AsRef<[u8]> for Checksum {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl Display for Checksum {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}
