//! # assets-v2-rs
//!
//! Transaction engine for the Assets-V2 on-chain token exchange.
//!
//! Trade intents (post, fill or cancel an ask or bid) become value-conserving
//! transactions over crypto-condition escrow outputs, and existing order
//! transactions are decoded back into structured orders.
//!
//! | Operation | Consumes | Produces |
//! |-----------|----------|----------|
//! | post ask | my tokens, fee coin | token escrow, marker, `s` record |
//! | post bid | coin | coin escrow, marker, `b` record |
//! | fill ask | ask escrow, coin | remaining escrow, tokens to me, payment, `S` record |
//! | fill bid | bid escrow, my tokens | residual escrow, payment to me, tokens to bidder, `B` record |
//! | cancel ask | ask escrow, marker | tokens to creator, `x` record |
//! | cancel bid | bid escrow, marker | coin to creator, `o` record |
//!
//! The node transport ([`RemoteNode`]) and the condition signer
//! ([`conditions::Conditions`]) are injected; [`NodeRpc`] is the JSON-RPC
//! implementation of the former.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use assets_v2_rs::{NodeConfig, NodeRpc, OrderQuery, ProtocolConfig};
//! # use assets_v2_rs::conditions::Conditions;
//! # fn signer() -> Arc<dyn Conditions> { unimplemented!() }
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let node = NodeRpc::new(&NodeConfig::from_env()?)?;
//!     let me = assets_v2_rs::models::PubKey::from_hex("02aabb")?;
//!     let query = OrderQuery::new(Arc::new(node), signer(), me, Arc::new(ProtocolConfig::default()));
//!
//!     for order in query.fetch_my_orders().await? {
//!         println!("{} {} @ {:?}", order.funcid, order.txid, order.price);
//!     }
//!     Ok(())
//! }
//! ```

pub mod builder;
pub mod codec;
pub mod conditions;
pub mod config;
pub mod dex;
pub mod error;
pub mod export;
pub mod models;
pub mod node;
pub mod rpc;
pub mod utils;

#[cfg(test)]
mod testing;

pub use builder::{PreparedTransaction, TransactionBuilder, ValueKind};
pub use config::{NodeConfig, ProtocolConfig};
pub use dex::{AssetsV2, OrderQuery, TradeIntent};
pub use error::{DexError, Result};
pub use node::RemoteNode;
pub use rpc::NodeRpc;
