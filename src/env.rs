//! The env blob: block, transaction and contract context passed to every
//! entry point.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The env blob failed validation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum EnvError {
    #[error("failed to unmarshal env: {0}")]
    Deserialization(String),
    #[error("missing required field: {0}")]
    MissingField(&'static str),
}

/// Block context. Hosts serialize this as part of [`Env`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockInfo {
    pub height: u64,
    /// Nanosecond timestamp, stringified to survive JSON number limits.
    pub time: String,
    pub chain_id: String,
}

/// Transaction context; `None` outside transactions (e.g. begin-block sudo).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionInfo {
    pub index: u32,
}

/// The called contract's own address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractInfo {
    pub address: String,
}

/// Typed shape of the env blob for hosts that build it in Rust. Contracts
/// receive the serialized JSON, not this struct.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Env {
    pub block: BlockInfo,
    pub transaction: Option<TransactionInfo>,
    pub contract: ContractInfo,
}

/// Lenient mirror of [`Env`] used only to check the required fields without
/// constraining anything else the host put in the blob.
#[derive(Debug, Default, Deserialize)]
struct EnvCheck {
    #[serde(default)]
    block: BlockCheck,
    #[serde(default)]
    transaction: Option<serde_json::Value>,
    #[serde(default)]
    contract: ContractCheck,
}

#[derive(Debug, Default, Deserialize)]
struct BlockCheck {
    #[serde(default)]
    chain_id: String,
}

#[derive(Debug, Default, Deserialize)]
struct ContractCheck {
    #[serde(default)]
    address: String,
}

/// Validates the env blob and returns the byte buffer to hand to the
/// contract.
///
/// The original bytes pass through untouched so fields this runtime does not
/// know about are preserved; adaptation may rewrite them once cross-version
/// rules require it.
pub(crate) fn validate_env(env: &[u8]) -> Result<Vec<u8>, EnvError> {
    let check: EnvCheck = serde_json::from_slice(env)
        .map_err(|e| EnvError::Deserialization(e.to_string()))?;
    if check.block.chain_id.is_empty() {
        return Err(EnvError::MissingField("block.chain_id"));
    }
    if check.contract.address.is_empty() {
        return Err(EnvError::MissingField("contract.address"));
    }
    if check.transaction.is_none() {
        return Err(EnvError::MissingField("transaction"));
    }
    Ok(env.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_env_json() -> String {
        serde_json::to_string(&Env {
            block: BlockInfo {
                height: 12_345,
                time: "1571797419879305533".to_string(),
                chain_id: "cosmos-testnet-14002".to_string(),
            },
            transaction: Some(TransactionInfo { index: 3 }),
            contract: ContractInfo {
                address: "contract".to_string(),
            },
        })
        .unwrap()
    }

    #[test]
    fn accepts_valid_env_and_passes_bytes_through() {
        let env = valid_env_json();
        let adapted = validate_env(env.as_bytes()).unwrap();
        assert_eq!(adapted, env.as_bytes());
    }

    #[test]
    fn preserves_unknown_fields() {
        let env = r#"{
            "block": {"height": 1, "time": "0", "chain_id": "chain"},
            "transaction": {"index": 0},
            "contract": {"address": "addr"},
            "custom_extension": {"anything": true}
        }"#;
        let adapted = validate_env(env.as_bytes()).unwrap();
        assert_eq!(adapted, env.as_bytes());
    }

    #[test]
    fn rejects_missing_chain_id() {
        let env = r#"{"block": {"height": 1, "time": "0", "chain_id": ""},
                      "transaction": {"index": 0},
                      "contract": {"address": "addr"}}"#;
        assert_eq!(
            validate_env(env.as_bytes()),
            Err(EnvError::MissingField("block.chain_id"))
        );
        let env = r#"{"transaction": {"index": 0}, "contract": {"address": "addr"}}"#;
        assert_eq!(
            validate_env(env.as_bytes()),
            Err(EnvError::MissingField("block.chain_id"))
        );
    }

    #[test]
    fn rejects_missing_contract_address() {
        let env = r#"{"block": {"height": 1, "time": "0", "chain_id": "chain"},
                      "transaction": {"index": 0},
                      "contract": {"address": ""}}"#;
        assert_eq!(
            validate_env(env.as_bytes()),
            Err(EnvError::MissingField("contract.address"))
        );
    }

    #[test]
    fn rejects_missing_or_null_transaction() {
        let env = r#"{"block": {"height": 1, "time": "0", "chain_id": "chain"},
                      "contract": {"address": "addr"}}"#;
        assert_eq!(
            validate_env(env.as_bytes()),
            Err(EnvError::MissingField("transaction"))
        );
        let env = r#"{"block": {"height": 1, "time": "0", "chain_id": "chain"},
                      "transaction": null,
                      "contract": {"address": "addr"}}"#;
        assert_eq!(
            validate_env(env.as_bytes()),
            Err(EnvError::MissingField("transaction"))
        );
    }

    #[test]
    fn rejects_malformed_json() {
        match validate_env(b"not json") {
            Err(EnvError::Deserialization(_)) => (),
            other => panic!("expected deserialization failure, got {:?}", other),
        }
    }
}
