use anyhow::{anyhow, bail, Result};
use assets_v2_rs::builder::TransactionBuilder;
use assets_v2_rs::codec::{AssetRecord, EnvelopeCodec};
use assets_v2_rs::conditions::{ConditionProbe, Conditions, OpDropData, ProbeSpend};
use assets_v2_rs::export::{save_to_file, OrderSnapshot};
use assets_v2_rs::models::{PubKey, Script, SecretKey, TxId};
use assets_v2_rs::{DexError, NodeConfig, NodeRpc, OrderQuery, ProtocolConfig};
use serde::Serialize;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

const OP_CHECKSIG: u8 = 0xac;

/// Read-only stand-in for the condition signer: it can name keys but never signs.
struct WatchOnly;

impl Conditions for WatchOnly {
    fn escrow_output(&self, _: &[u8], _: &[PubKey], _: u8, _: Option<&OpDropData>) -> Script {
        Script::default()
    }

    fn spend_probe(&self, eval_codes: &[u8], pubkeys: &[PubKey], threshold: u8) -> ConditionProbe {
        ConditionProbe::new(eval_codes, pubkeys, threshold)
    }

    fn address_probe(&self, eval_codes: &[u8], address: &str, threshold: u8) -> ConditionProbe {
        ConditionProbe::for_address(eval_codes, address, threshold)
    }

    fn pay_to_pubkey(&self, pubkey: &PubKey) -> Script {
        let mut bytes = vec![pubkey.as_bytes().len() as u8];
        bytes.extend_from_slice(pubkey.as_bytes());
        bytes.push(OP_CHECKSIG);
        Script::new(bytes)
    }

    fn address(&self, pubkey: &PubKey) -> String {
        pubkey.to_hex()
    }

    fn finalize(&self, _: &SecretKey, _: &mut TransactionBuilder, _: &[ProbeSpend]) -> assets_v2_rs::Result<()> {
        Err(DexError::RemoteRequestFailed("watch-only client cannot sign".to_string()))
    }
}

fn print_usage(bin: &str) {
    eprintln!("Usage:");
    eprintln!("  {} orders <tokenid> [--out <file>]", bin);
    eprintln!("  {} my-orders --pubkey <hex> [--out <file>]", bin);
    eprintln!("  {} order <orderid> [--pubkey <hex>]", bin);
    eprintln!("  {} decode <record-or-script-hex>", bin);
    eprintln!();
    eprintln!("  Node: ASSETS_NODE_URL, ASSETS_RPC_USER, ASSETS_RPC_PASSWORD");
    eprintln!("  Logging: RUST_LOG (default info)");
}

struct Args {
    command: String,
    positional: Vec<String>,
    pubkey: Option<String>,
    out: Option<String>,
}

fn parse_args(raw: &[String]) -> Result<Args> {
    let mut positional = Vec::new();
    let mut pubkey = None;
    let mut out = None;
    let mut i = 1;
    while i < raw.len() {
        match raw[i].as_str() {
            "--pubkey" | "--out" => {
                let flag = raw[i].clone();
                i += 1;
                let value = raw.get(i).cloned().ok_or_else(|| anyhow!("{} requires a value", flag))?;
                if flag == "--pubkey" {
                    pubkey = Some(value);
                } else {
                    out = Some(value);
                }
            }
            _ => positional.push(raw[i].clone()),
        }
        i += 1;
    }
    if positional.is_empty() {
        bail!("missing command");
    }
    let command = positional.remove(0);
    Ok(Args { command, positional, pubkey, out })
}

fn emit<T: Serialize>(data: &T, out: Option<&str>) -> Result<()> {
    match out {
        Some(path) => {
            save_to_file(data, path)?;
            tracing::info!(path, "saved");
        }
        None => println!("{}", serde_json::to_string_pretty(data)?),
    }
    Ok(())
}

fn query(pubkey: Option<&str>) -> Result<OrderQuery> {
    let config = NodeConfig::from_env()?;
    let node = NodeRpc::new(&config)?;
    // Order listings do not need a caller key; the node only uses it for lookups.
    let pubkey = match pubkey {
        Some(hex) => PubKey::from_hex(hex)?,
        None => PubKey::from_hex(assets_v2_rs::config::ASSETS_GLOBAL_PUBKEY)?,
    };
    Ok(OrderQuery::new(
        Arc::new(node),
        Arc::new(WatchOnly),
        pubkey,
        Arc::new(ProtocolConfig::default()),
    ))
}

fn decode(hex_str: &str) -> Result<serde_json::Value> {
    let script = Script::from_hex(hex_str)?;
    let codec = EnvelopeCodec::from_config(&ProtocolConfig::default());
    if script.op_return_payload().is_some() {
        let envelope = codec
            .decode_order(&script)?
            .ok_or_else(|| anyhow!("not a token transfer envelope"))?;
        return Ok(serde_json::json!({
            "token_id": envelope.token_id,
            "record": envelope.record,
        }));
    }
    let record = AssetRecord::decode(script.as_bytes())?;
    Ok(serde_json::to_value(record)?)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let raw: Vec<String> = std::env::args().collect();
    let bin = raw.first().map(String::as_str).unwrap_or("assets-v2");
    let args = match parse_args(&raw) {
        Ok(a) => a,
        Err(e) => {
            eprintln!("{}", e);
            print_usage(bin);
            std::process::exit(1);
        }
    };

    match (args.command.as_str(), args.positional.as_slice()) {
        ("orders", [token]) => {
            let token_id = TxId::from_hex(token)?;
            let orders = query(args.pubkey.as_deref())?
                .fetch_orders_for_token(&token_id)
                .await?;
            tracing::info!(count = orders.len(), "fetched orders");
            let snapshot = OrderSnapshot { token_id: Some(token_id), orders };
            emit(&snapshot, args.out.as_deref())?;
        }
        ("my-orders", []) => {
            let pubkey = args
                .pubkey
                .as_deref()
                .ok_or_else(|| anyhow!("my-orders requires --pubkey"))?;
            let orders = query(Some(pubkey))?.fetch_my_orders().await?;
            let snapshot = OrderSnapshot { token_id: None, orders };
            emit(&snapshot, args.out.as_deref())?;
        }
        ("order", [order]) => {
            let order_id = TxId::from_hex(order)?;
            let detail = query(args.pubkey.as_deref())?.fetch_order(&order_id).await?;
            emit(&detail, args.out.as_deref())?;
        }
        ("decode", [hex_str]) => {
            emit(&decode(hex_str)?, None)?;
        }
        _ => {
            print_usage(bin);
            std::process::exit(1);
        }
    }

    Ok(())
}
