use crate::models::{PubKey, TxId};
use serde::{Deserialize, Serialize};

/// A fungible token as described by its creation transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    /// Txid of the token creation tx.
    pub token_id: TxId,
    pub creator_pubkey: PubKey,
    pub name: String,
    pub description: String,
    /// Per-mille share of every fill paid to the creator, from tokel data.
    pub royalty: Option<u16>,
}

impl Token {
    /// Royalty fraction with "no royalty" mapped to zero.
    pub fn royalty_fraction(&self) -> u64 {
        self.royalty.map(u64::from).unwrap_or(0)
    }
}
