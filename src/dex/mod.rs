//! Assets-V2 order builders and the engine facade.

use serde::{Deserialize, Serialize};
use std::slice;
use std::sync::Arc;
use tracing::{debug, info};

use crate::builder::{PreparedTransaction, TransactionBuilder, ValueKind};
use crate::codec::{AssetOp, AssetRecord, EnvelopeCodec};
use crate::conditions::{Conditions, OpDropData, ProbeSpend};
use crate::config::ProtocolConfig;
use crate::error::{DexError, Result};
use crate::models::{FundingTx, PubKey, Script, TxId, Wallet};
use crate::node::RemoteNode;

pub mod cancel;
pub mod fill;
pub mod issue;
pub mod query;
pub mod royalty;

pub use cancel::OrderCanceller;
pub use fill::OrderFiller;
pub use issue::AskBidIssuer;
pub use query::{LoadedOrder, OrderQuery};
pub use royalty::{DustRoyaltyPolicy, DustVerdict, Payee, RoyaltySplit};

/// Handles and helpers shared by every builder.
pub(crate) struct Context {
    pub node: Arc<dyn RemoteNode>,
    pub conditions: Arc<dyn Conditions>,
    pub wallet: Wallet,
    pub config: Arc<ProtocolConfig>,
    pub codec: EnvelopeCodec,
}

impl Context {
    pub fn me(&self) -> &PubKey {
        &self.wallet.pubkey
    }

    pub fn record(&self, op: AssetOp) -> AssetRecord {
        AssetRecord::new(self.config.assets_eval, self.config.record_version, op)
    }

    /// Token output spendable by `owner`, tagged with `token_id`.
    pub fn token_output(&self, token_id: TxId, owner: &PubKey) -> Script {
        let tokens_eval = self.config.tokens_eval;
        let drop = OpDropData {
            eval_code: tokens_eval,
            m: 1,
            n: 1,
            pubkeys: vec![owner.clone()],
            data: self.codec.token_output_data(token_id),
        };
        self.conditions
            .escrow_output(&[tokens_eval], slice::from_ref(owner), 1, Some(&drop))
    }

    /// Tokens held by the module escrow key.
    pub fn token_escrow_output(&self) -> Script {
        self.conditions.escrow_output(
            &self.config.token_escrow_evals(),
            slice::from_ref(&self.config.escrow_pubkey),
            1,
            None,
        )
    }

    /// Coin held by the module escrow key.
    pub fn coin_escrow_output(&self) -> Script {
        self.conditions.escrow_output(
            &[self.config.assets_eval],
            slice::from_ref(&self.config.escrow_pubkey),
            1,
            None,
        )
    }

    /// 1-of-2 marker that lets `owner` find the order by key.
    pub fn marker_output(&self, owner: &PubKey) -> Script {
        self.conditions.escrow_output(
            &[self.config.assets_eval],
            &[owner.clone(), self.config.escrow_pubkey.clone()],
            1,
            None,
        )
    }

    pub fn token_escrow_probe(&self) -> ProbeSpend {
        let probe = self.conditions.spend_probe(
            &self.config.token_escrow_evals(),
            slice::from_ref(&self.config.escrow_pubkey),
            1,
        );
        ProbeSpend::with_key(probe, self.config.escrow_secret.clone())
    }

    pub fn coin_escrow_probe(&self) -> ProbeSpend {
        let probe = self.conditions.spend_probe(
            &[self.config.assets_eval],
            slice::from_ref(&self.config.escrow_pubkey),
            1,
        );
        ProbeSpend::with_key(probe, self.config.escrow_secret.clone())
    }

    pub fn marker_probe(&self) -> ProbeSpend {
        let probe = self.conditions.spend_probe(
            &[self.config.assets_eval],
            &[self.me().clone(), self.config.escrow_pubkey.clone()],
            1,
        );
        ProbeSpend::with_key(probe, self.wallet.secret.clone())
    }

    /// Probes for spending my own token outputs, whether they were paid to
    /// my pubkey or to my normal address.
    pub fn my_token_probes(&self) -> [ProbeSpend; 2] {
        let evals = [self.config.tokens_eval];
        let by_key = self.conditions.spend_probe(&evals, slice::from_ref(self.me()), 1);
        let address = self.conditions.address(self.me());
        let by_address = self.conditions.address_probe(&evals, &address, 1);
        [ProbeSpend::own_key(by_key), ProbeSpend::own_key(by_address)]
    }

    /// Add the node's coin inputs, failing if they fall short of `required`.
    pub fn add_coin_funding(
        &self,
        tx: &mut TransactionBuilder,
        funding: &FundingTx,
        required: u64,
    ) -> Result<u64> {
        let added = tx.add_funding(funding, ValueKind::Coin);
        if added < required {
            return Err(DexError::InsufficientFunds { required, added });
        }
        Ok(added)
    }

    pub fn add_token_funding(
        &self,
        tx: &mut TransactionBuilder,
        funding: &FundingTx,
        required: u64,
    ) -> Result<u64> {
        let added = tx.add_funding(funding, ValueKind::Token);
        if added < required {
            return Err(DexError::InsufficientTokens { required, added });
        }
        Ok(added)
    }

    /// Pay whatever coin is left after outputs and fee back to me, unless it
    /// is dust, in which case it goes to the fee.
    pub fn add_coin_change(&self, tx: &mut TransactionBuilder) -> Result<u64> {
        let coin_in: u128 = tx
            .inputs()
            .iter()
            .filter(|i| i.kind == ValueKind::Coin)
            .map(|i| i.value as u128)
            .sum();
        let coin_out: u128 = tx
            .outputs()
            .iter()
            .filter(|o| o.kind == ValueKind::Coin)
            .map(|o| o.value as u128)
            .sum();
        let required = coin_out + self.config.network_fee as u128;
        let change = coin_in.checked_sub(required).ok_or(DexError::InsufficientFunds {
            required: u64::try_from(required).unwrap_or(u64::MAX),
            added: u64::try_from(coin_in).unwrap_or(u64::MAX),
        })?;
        let change = u64::try_from(change)
            .map_err(|_| DexError::InvalidAmount(format!("change {} overflows", change)))?;
        debug!(change, dust = change <= self.config.min_dust, "coin change");
        if change > self.config.min_dust {
            tx.add_output(self.conditions.pay_to_pubkey(self.me()), change, ValueKind::Coin);
        }
        Ok(change)
    }

    /// Append the trailing order record, sign and run the local balance checks.
    pub fn finish(
        &self,
        operation: &'static str,
        token_id: TxId,
        record: &AssetRecord,
        mut tx: TransactionBuilder,
        probes: &[ProbeSpend],
    ) -> Result<PreparedTransaction> {
        tx.add_output(self.codec.order_output(token_id, record), 0, ValueKind::Coin);
        self.conditions.finalize(&self.wallet.secret, &mut tx, probes)?;
        let prepared = tx.build(self.config.network_fee)?;
        info!(
            operation,
            token_id = %token_id,
            inputs = prepared.inputs.len(),
            outputs = prepared.outputs.len(),
            "prepared transaction"
        );
        Ok(prepared)
    }
}

/// A trade the caller wants turned into a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum TradeIntent {
    PostAsk {
        units: u64,
        token_id: TxId,
        unit_price: i64,
        #[serde(default)]
        expiry_height: Option<i32>,
    },
    PostBid {
        units: u64,
        token_id: TxId,
        unit_price: i64,
        #[serde(default)]
        expiry_height: Option<i32>,
    },
    FillAsk {
        token_id: TxId,
        ask_id: TxId,
        fill_units: u64,
        /// Overrides the posted price.
        #[serde(default)]
        unit_price: Option<i64>,
    },
    FillBid {
        token_id: TxId,
        bid_id: TxId,
        fill_units: u64,
        #[serde(default)]
        unit_price: Option<i64>,
    },
    CancelAsk {
        token_id: TxId,
        ask_id: TxId,
    },
    CancelBid {
        token_id: TxId,
        bid_id: TxId,
    },
}

/// Entry point: one wallet, one node, one condition signer.
pub struct AssetsV2 {
    query: OrderQuery,
    issuer: AskBidIssuer,
    filler: OrderFiller,
    canceller: OrderCanceller,
}

impl AssetsV2 {
    pub fn new(
        node: Arc<dyn RemoteNode>,
        conditions: Arc<dyn Conditions>,
        wallet: Wallet,
        config: ProtocolConfig,
    ) -> Self {
        let config = Arc::new(config);
        let query = OrderQuery::new(
            node.clone(),
            conditions.clone(),
            wallet.pubkey.clone(),
            config.clone(),
        );
        let ctx = Arc::new(Context {
            codec: EnvelopeCodec::from_config(&config),
            node,
            conditions,
            wallet,
            config,
        });
        Self {
            issuer: AskBidIssuer::new(ctx.clone()),
            filler: OrderFiller::new(ctx.clone(), query.clone()),
            canceller: OrderCanceller::new(ctx, query.clone()),
            query,
        }
    }

    pub fn query(&self) -> &OrderQuery {
        &self.query
    }

    pub async fn execute(&self, intent: TradeIntent) -> Result<PreparedTransaction> {
        match intent {
            TradeIntent::PostAsk {
                units,
                token_id,
                unit_price,
                expiry_height,
            } => {
                self.issuer
                    .post_ask(units, token_id, unit_price, expiry_height)
                    .await
            }
            TradeIntent::PostBid {
                units,
                token_id,
                unit_price,
                expiry_height,
            } => {
                self.issuer
                    .post_bid(units, token_id, unit_price, expiry_height)
                    .await
            }
            TradeIntent::FillAsk {
                token_id,
                ask_id,
                fill_units,
                unit_price,
            } => {
                self.filler
                    .fill_ask(token_id, ask_id, fill_units, unit_price)
                    .await
            }
            TradeIntent::FillBid {
                token_id,
                bid_id,
                fill_units,
                unit_price,
            } => {
                self.filler
                    .fill_bid(token_id, bid_id, fill_units, unit_price)
                    .await
            }
            TradeIntent::CancelAsk { token_id, ask_id } => {
                self.canceller.cancel_ask(token_id, ask_id).await
            }
            TradeIntent::CancelBid { token_id, bid_id } => {
                self.canceller.cancel_bid(token_id, bid_id).await
            }
        }
    }
}
