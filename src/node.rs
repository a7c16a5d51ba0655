use async_trait::async_trait;

use crate::error::Result;
use crate::models::{ChainInfo, FundingTx, PubKey, RawOrder, Transaction, TxId};

/// Remote node the engine reads chain state from.
///
/// Implementations own transport, timeouts and retries. Failures surface as
/// `DexError::RemoteRequestFailed` with the node's message.
#[async_trait]
pub trait RemoteNode: Send + Sync {
    async fn get_info(&self) -> Result<ChainInfo>;

    /// Select normal (coin) UTXOs of `pubkey` worth at least `amount`.
    async fn aggregate_coin_inputs(&self, pubkey: &PubKey, amount: u64) -> Result<FundingTx>;

    /// Select token UTXOs of `pubkey` holding at least `amount` units of `token_id`.
    async fn aggregate_token_inputs(
        &self,
        token_id: &TxId,
        pubkey: &PubKey,
        amount: u64,
    ) -> Result<FundingTx>;

    /// Fetch transactions by id, in request order. Fails if any id is unknown.
    async fn fetch_transactions(&self, pubkey: &PubKey, ids: &[TxId]) -> Result<Vec<Transaction>>;

    /// Order-book rows for `token_id`, or the caller's own orders when `None`.
    async fn query_orders(&self, pubkey: &PubKey, token_id: Option<&TxId>) -> Result<Vec<RawOrder>>;
}
