//! Protocol constants and node connection settings.
//!
//! `ProtocolConfig` is built once and handed to every engine component, so a
//! test can run the builders against a different fee schedule or dust floor.
//! `NodeConfig` is read from the environment by the CLI.

use anyhow::{anyhow, Result};

use crate::models::{PubKey, SecretKey};

pub const NETWORK_FEE: u64 = 10_000;
pub const MARKER_FEE: u64 = 10_000;
pub const ROYALTY_DIVISOR: u64 = 1000;
pub const ASSETS_NORMAL_DUST: u64 = 500;
/// Four weeks of one-minute blocks.
pub const ASSETS_EXPIRY_DEFAULT: i32 = 4 * 7 * 24 * 60;

pub const EVAL_TOKENSV2: u8 = 0xf5;
pub const EVAL_ASSETSV2: u8 = 0xf6;
pub const EVAL_TOKELDATA: u8 = 0xf7;
pub const ASSETS_RECORD_VERSION: u8 = 1;

/// Shared Assets-V2 escrow key pair. The private half is published with the
/// protocol; escrow spends are policed by the chain validator.
pub const ASSETS_GLOBAL_PUBKEY: &str =
    "0345d2e7ab018619da6ed58ccc0138c5f58a7b754bd8e9a1a9d2b811c5fe72d467";
pub const ASSETS_GLOBAL_PRIVKEY: [u8; 32] = [
    0x46, 0x58, 0x3b, 0x18, 0xee, 0x16, 0x63, 0x51, 0x6f, 0x60, 0x6e, 0x09, 0xdf, 0x9d, 0x27, 0xc8,
    0xa7, 0xa2, 0x72, 0xa5, 0xd4, 0x6a, 0x9b, 0xcb, 0xd5, 0x4f, 0x7d, 0x1c, 0xb1, 0x2e, 0x63, 0x21,
];

#[derive(Debug, Clone)]
pub struct ProtocolConfig {
    pub network_fee: u64,
    pub marker_fee: u64,
    pub royalty_divisor: u64,
    /// Minimum economic amount; also the floor below which change is dropped.
    pub min_dust: u64,
    pub default_expiry_window: i32,
    pub tokens_eval: u8,
    pub assets_eval: u8,
    pub tokel_eval: u8,
    pub record_version: u8,
    pub escrow_pubkey: PubKey,
    pub escrow_secret: SecretKey,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        let escrow_pubkey = PubKey::new(
            hex::decode(ASSETS_GLOBAL_PUBKEY).unwrap_or_default(),
        );
        Self {
            network_fee: NETWORK_FEE,
            marker_fee: MARKER_FEE,
            royalty_divisor: ROYALTY_DIVISOR,
            min_dust: ASSETS_NORMAL_DUST,
            default_expiry_window: ASSETS_EXPIRY_DEFAULT,
            tokens_eval: EVAL_TOKENSV2,
            assets_eval: EVAL_ASSETSV2,
            tokel_eval: EVAL_TOKELDATA,
            record_version: ASSETS_RECORD_VERSION,
            escrow_pubkey,
            escrow_secret: SecretKey::new(ASSETS_GLOBAL_PRIVKEY),
        }
    }
}

impl ProtocolConfig {
    /// Eval codes locking escrowed tokens.
    pub fn token_escrow_evals(&self) -> [u8; 2] {
        [self.tokens_eval, self.assets_eval]
    }
}

#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub url: String,
    pub rpc_user: Option<String>,
    pub rpc_password: Option<String>,
    pub retries: u32,
    pub timeout_secs: u64,
}

impl NodeConfig {
    pub fn from_env() -> Result<Self> {
        let cfg = NodeConfig {
            url: env_string("ASSETS_NODE_URL", "http://127.0.0.1:7771"),
            rpc_user: std::env::var("ASSETS_RPC_USER").ok(),
            rpc_password: std::env::var("ASSETS_RPC_PASSWORD").ok(),
            retries: env_u32("ASSETS_RPC_RETRIES", 3),
            timeout_secs: env_u64("ASSETS_RPC_TIMEOUT_SECS", 300),
        };
        if !cfg.url.starts_with("http://") && !cfg.url.starts_with("https://") {
            return Err(anyhow!("ASSETS_NODE_URL must be an http(s) url, got {}", cfg.url));
        }
        if cfg.rpc_user.is_some() != cfg.rpc_password.is_some() {
            return Err(anyhow!("ASSETS_RPC_USER and ASSETS_RPC_PASSWORD must be set together"));
        }
        Ok(cfg)
    }
}

fn env_string(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u32>().ok())
        .unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_protocol_constants() {
        let cfg = ProtocolConfig::default();
        assert_eq!(cfg.network_fee, 10_000);
        assert_eq!(cfg.marker_fee, 10_000);
        assert_eq!(cfg.royalty_divisor, 1000);
        assert_eq!(cfg.min_dust, 500);
        assert_eq!(cfg.default_expiry_window, 40_320);
        assert_eq!(cfg.escrow_pubkey.to_hex(), ASSETS_GLOBAL_PUBKEY);
        assert_eq!(cfg.token_escrow_evals(), [0xf5, 0xf6]);
    }
}
