use crate::models::{PubKey, Token, TxId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    /// Tokens escrowed, coins wanted.
    Ask,
    /// Coins escrowed, tokens wanted.
    Bid,
}

/// A single open order decoded from its on-chain transaction.
#[derive(Debug, Clone, Serialize)]
pub struct OrderDetail {
    pub order_id: TxId,
    pub side: OrderSide,
    /// Token units still open (escrowed tokens for an ask, escrowed coin / price for a bid)
    pub amount: u64,
    pub unit_price: u64,
    pub origin_pubkey: PubKey,
    pub origin_address: String,
    pub expiry_height: i32,
    pub token: Token,
}

/// An order-book row as returned by the node's order index. The engine never
/// interprets these rows; they go back to the caller as received.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawOrder {
    pub funcid: String,
    pub txid: String,
    #[serde(default)]
    pub vout: u32,
    #[serde(default)]
    pub amount: Option<serde_json::Value>,
    #[serde(default)]
    pub tokenid: Option<String>,
    #[serde(default)]
    pub price: Option<serde_json::Value>,
    #[serde(default)]
    pub origaddress: Option<String>,
    #[serde(default, rename = "expiryHeight")]
    pub expiry_height: Option<i64>,
    /// Anything else the indexer reports.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}
