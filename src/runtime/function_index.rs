//! Dense indices of the host functions exported under the `env` namespace.

/// One entry per host function. The resolver hands the index to the
/// interpreter and the `Externals` impl dispatches on it.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum FunctionIndex {
    DbRead,
    DbWrite,
    DbRemove,
    DbScan,
    DbNext,
    AddrValidate,
    AddrCanonicalize,
    AddrHumanize,
    QueryChain,
    Secp256k1Verify,
    Secp256k1RecoverPubkey,
    Ed25519Verify,
    Ed25519BatchVerify,
    Abort,
    Debug,
}

impl From<FunctionIndex> for usize {
    fn from(index: FunctionIndex) -> usize {
        index as usize
    }
}

impl TryFrom<usize> for FunctionIndex {
    type Error = usize;

    fn try_from(value: usize) -> Result<Self, usize> {
        use FunctionIndex::*;
        let index = match value {
            0 => DbRead,
            1 => DbWrite,
            2 => DbRemove,
            3 => DbScan,
            4 => DbNext,
            5 => AddrValidate,
            6 => AddrCanonicalize,
            7 => AddrHumanize,
            8 => QueryChain,
            9 => Secp256k1Verify,
            10 => Secp256k1RecoverPubkey,
            11 => Ed25519Verify,
            12 => Ed25519BatchVerify,
            13 => Abort,
            14 => Debug,
            other => return Err(other),
        };
        Ok(index)
    }
}
