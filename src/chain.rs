//! Solana RPC collaborator. The chain is external: the only call this
//! service makes is fetching a recent blockhash to stamp into unsigned
//! transactions.

use crate::wire::{Blockhash, WireError};
use reqwest::redirect::Policy;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use url::Url;

const RPC_USER_AGENT: &str = "dropregards/0.1";
const RPC_COMMITMENT: &str = "finalized";

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum SolanaCluster {
    Devnet,
    Testnet,
    MainnetBeta,
}

impl SolanaCluster {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "devnet" => Some(Self::Devnet),
            "testnet" => Some(Self::Testnet),
            "mainnet-beta" | "mainnet" => Some(Self::MainnetBeta),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Devnet => "devnet",
            Self::Testnet => "testnet",
            Self::MainnetBeta => "mainnet-beta",
        }
    }

    pub fn default_rpc_url(self) -> &'static str {
        match self {
            Self::Devnet => "https://api.devnet.solana.com",
            Self::Testnet => "https://api.testnet.solana.com",
            Self::MainnetBeta => "https://api.mainnet-beta.solana.com",
        }
    }

    /// CAIP-2 id advertised to action clients in `x-blockchain-ids`.
    pub fn caip2_id(self) -> &'static str {
        match self {
            Self::Devnet => "solana:EtWTRABZaYq6iMfeYKouRu166VU2xqa1",
            Self::Testnet => "solana:4uhcVJyU9pJkvQyS88uRDiswHXSCkY3z",
            Self::MainnetBeta => "solana:5eykt4UsFv8P8NJdTREpY1vzqKqZKvdp",
        }
    }
}

#[derive(Debug, Error)]
pub enum ChainError {
    #[error("rpc transport failure: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("rpc returned http status {0}")]
    Status(u16),
    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },
    #[error("rpc response is missing {0}")]
    Malformed(&'static str),
    #[error("rpc returned an unusable blockhash: {0}")]
    BadBlockhash(#[from] WireError),
}

impl ChainError {
    pub fn error_class(&self) -> &'static str {
        match self {
            Self::Transport(_) => "rpc_transport",
            Self::Status(_) => "rpc_http_status",
            Self::Rpc { .. } => "rpc_error",
            Self::Malformed(_) => "rpc_malformed",
            Self::BadBlockhash(_) => "rpc_bad_blockhash",
        }
    }
}

#[derive(Debug)]
pub struct LatestBlockhash {
    pub blockhash: Blockhash,
    pub last_valid_block_height: u64,
}

#[derive(Deserialize)]
struct RpcEnvelope {
    result: Option<RpcBlockhashResult>,
    error: Option<RpcErrorBody>,
}

#[derive(Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

#[derive(Deserialize)]
struct RpcBlockhashResult {
    value: RpcBlockhashValue,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcBlockhashValue {
    blockhash: String,
    last_valid_block_height: u64,
}

pub struct ChainClient {
    http: reqwest::Client,
    rpc_url: Url,
}

impl ChainClient {
    pub fn new(rpc_url: Url, request_timeout: Duration, connect_timeout: Duration) -> Result<Self, ChainError> {
        let http = reqwest::Client::builder()
            .redirect(Policy::none())
            .timeout(request_timeout)
            .connect_timeout(connect_timeout)
            .user_agent(RPC_USER_AGENT)
            .build()?;

        Ok(Self { http, rpc_url })
    }

    pub fn rpc_host(&self) -> String {
        self.rpc_url.host_str().unwrap_or("unknown").to_string()
    }

    pub async fn latest_blockhash(&self) -> Result<LatestBlockhash, ChainError> {
        let body = serde_json::json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "getLatestBlockhash",
            "params": [{ "commitment": RPC_COMMITMENT }],
        });

        let response = self.http.post(self.rpc_url.clone()).json(&body).send().await?;
        if !response.status().is_success() {
            return Err(ChainError::Status(response.status().as_u16()));
        }

        let envelope: RpcEnvelope = response.json().await?;
        parse_blockhash_envelope(envelope)
    }
}

fn parse_blockhash_envelope(envelope: RpcEnvelope) -> Result<LatestBlockhash, ChainError> {
    if let Some(error) = envelope.error {
        return Err(ChainError::Rpc {
            code: error.code,
            message: error.message,
        });
    }

    let result = envelope.result.ok_or(ChainError::Malformed("result"))?;
    let blockhash: Blockhash = result.value.blockhash.parse()?;

    Ok(LatestBlockhash {
        blockhash,
        last_valid_block_height: result.value.last_valid_block_height,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope(value: serde_json::Value) -> RpcEnvelope {
        serde_json::from_value(value).expect("envelope deserializes")
    }

    #[test]
    fn well_formed_blockhash_response_parses() {
        let parsed = parse_blockhash_envelope(envelope(serde_json::json!({
            "jsonrpc": "2.0",
            "id": 1,
            "result": {
                "context": { "slot": 123 },
                "value": {
                    "blockhash": "11111111111111111111111111111111",
                    "lastValidBlockHeight": 98_765
                }
            }
        })))
        .expect("response parses");

        assert_eq!(parsed.blockhash, Blockhash::from_bytes([0u8; 32]));
        assert_eq!(parsed.last_valid_block_height, 98_765);
    }

    #[test]
    fn rpc_error_bodies_become_typed_errors() {
        let result = parse_blockhash_envelope(envelope(serde_json::json!({
            "jsonrpc": "2.0",
            "id": 1,
            "error": { "code": -32_005, "message": "node is behind" }
        })));

        match result {
            Err(ChainError::Rpc { code, message }) => {
                assert_eq!(code, -32_005);
                assert_eq!(message, "node is behind");
            }
            other => panic!("expected rpc error, got {other:?}"),
        }
    }

    #[test]
    fn missing_result_is_reported_as_malformed() {
        let result = parse_blockhash_envelope(envelope(serde_json::json!({
            "jsonrpc": "2.0",
            "id": 1
        })));

        assert!(matches!(result, Err(ChainError::Malformed("result"))));
    }

    #[test]
    fn unparseable_blockhash_is_rejected() {
        let result = parse_blockhash_envelope(envelope(serde_json::json!({
            "result": {
                "value": { "blockhash": "not base58 0OIl", "lastValidBlockHeight": 1 }
            }
        })));

        assert!(matches!(result, Err(ChainError::BadBlockhash(_))));
    }

    #[test]
    fn cluster_names_parse_and_map_to_rpc_urls() {
        assert_eq!(SolanaCluster::parse("devnet"), Some(SolanaCluster::Devnet));
        assert_eq!(SolanaCluster::parse("MAINNET-BETA"), Some(SolanaCluster::MainnetBeta));
        assert_eq!(SolanaCluster::parse("mainnet"), Some(SolanaCluster::MainnetBeta));
        assert_eq!(SolanaCluster::parse("localnet"), None);

        assert_eq!(
            SolanaCluster::Devnet.default_rpc_url(),
            "https://api.devnet.solana.com"
        );
        assert!(SolanaCluster::Testnet.caip2_id().starts_with("solana:"));
    }
}
