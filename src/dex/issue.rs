//! Posting new asks and bids.

use std::sync::Arc;
use tokio::try_join;
use tracing::debug;

use super::Context;
use crate::builder::{PreparedTransaction, TransactionBuilder, ValueKind};
use crate::codec::{AssetOp, OrderTerms};
use crate::error::{DexError, Result};
use crate::models::{ChainInfo, TxId};
use crate::utils::{checked_total, order_value};

pub struct AskBidIssuer {
    ctx: Arc<Context>,
}

impl AskBidIssuer {
    pub(crate) fn new(ctx: Arc<Context>) -> Self {
        Self { ctx }
    }

    /// Escrow `units` tokens for sale at `unit_price` coins each.
    pub async fn post_ask(
        &self,
        units: u64,
        token_id: TxId,
        unit_price: i64,
        expiry_height: Option<i32>,
    ) -> Result<PreparedTransaction> {
        if unit_price < 0 {
            return Err(DexError::InvalidPrice(unit_price));
        }
        if units == 0 {
            return Err(DexError::InvalidAmount("ask for zero units".to_string()));
        }
        let ctx = &self.ctx;
        let cfg = &ctx.config;
        let expiry_height = requested_expiry(expiry_height);
        let normal_amount = checked_total(&[cfg.network_fee, cfg.marker_fee])?;

        let (info, coins, tokens) = try_join!(
            self.chain_info(expiry_height),
            ctx.node.aggregate_coin_inputs(ctx.me(), normal_amount),
            ctx.node.aggregate_token_inputs(&token_id, ctx.me(), units),
        )?;

        let mut tx = TransactionBuilder::new(coins.template);
        ctx.add_coin_funding(&mut tx, &coins, normal_amount)?;
        let tokens_added = ctx.add_token_funding(&mut tx, &tokens, units)?;
        let expiry_height = self.resolve_expiry(expiry_height, info)?;
        debug!(units, unit_price, tokens_added, expiry_height, "post ask");

        tx.add_output(ctx.token_escrow_output(), units, ValueKind::Token);
        tx.add_output(ctx.marker_output(ctx.me()), cfg.marker_fee, ValueKind::Coin);
        if tokens_added > units {
            tx.add_output(
                ctx.token_output(token_id, ctx.me()),
                tokens_added - units,
                ValueKind::Token,
            );
        }
        ctx.add_coin_change(&mut tx)?;

        let record = ctx.record(AssetOp::Ask(OrderTerms {
            unit_price,
            origin_pubkey: ctx.me().clone(),
            expiry_height,
        }));
        ctx.finish("post_ask", token_id, &record, tx, &ctx.my_token_probes())
    }

    /// Escrow `units * unit_price` coins to buy `units` tokens.
    pub async fn post_bid(
        &self,
        units: u64,
        token_id: TxId,
        unit_price: i64,
        expiry_height: Option<i32>,
    ) -> Result<PreparedTransaction> {
        if unit_price < 0 {
            return Err(DexError::InvalidPrice(unit_price));
        }
        if units == 0 {
            return Err(DexError::InvalidAmount("bid for zero units".to_string()));
        }
        let ctx = &self.ctx;
        let cfg = &ctx.config;
        let expiry_height = requested_expiry(expiry_height);
        let bid_amount = order_value(units, unit_price)?;
        let normal_amount = checked_total(&[bid_amount, cfg.network_fee, cfg.marker_fee])?;

        let (info, coins) = try_join!(
            self.chain_info(expiry_height),
            ctx.node.aggregate_coin_inputs(ctx.me(), normal_amount),
        )?;

        let mut tx = TransactionBuilder::new(coins.template);
        ctx.add_coin_funding(&mut tx, &coins, normal_amount)?;
        let expiry_height = self.resolve_expiry(expiry_height, info)?;
        debug!(units, unit_price, bid_amount, expiry_height, "post bid");

        tx.add_output(ctx.coin_escrow_output(), bid_amount, ValueKind::Coin);
        tx.add_output(ctx.marker_output(ctx.me()), cfg.marker_fee, ValueKind::Coin);
        ctx.add_coin_change(&mut tx)?;

        let record = ctx.record(AssetOp::Bid(OrderTerms {
            unit_price,
            origin_pubkey: ctx.me().clone(),
            expiry_height,
        }));
        ctx.finish("post_bid", token_id, &record, tx, &[])
    }

    /// Chain tip, fetched only when the caller left the expiry open.
    async fn chain_info(&self, expiry_height: Option<i32>) -> Result<Option<ChainInfo>> {
        match expiry_height {
            Some(_) => Ok(None),
            None => self.ctx.node.get_info().await.map(Some),
        }
    }

    fn resolve_expiry(&self, expiry_height: Option<i32>, info: Option<ChainInfo>) -> Result<i32> {
        if let Some(h) = expiry_height {
            return Ok(h);
        }
        let height = info.map(|i| i.height).unwrap_or(0);
        i32::try_from(height)
            .ok()
            .and_then(|h| h.checked_add(self.ctx.config.default_expiry_window))
            .ok_or_else(|| DexError::InvalidAmount(format!("expiry past height {} overflows", height)))
    }
}

/// Height 0 means "not supplied", as on the node RPCs.
fn requested_expiry(expiry_height: Option<i32>) -> Option<i32> {
    expiry_height.filter(|&h| h != 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::AssetRecord;
    use crate::conditions::Conditions;
    use crate::dex::AssetsV2;
    use crate::testing::{pubkey, txid, wallet, Chain, FakeNode};
    use crate::TradeIntent;

    fn engine(chain: &Chain, node: FakeNode) -> AssetsV2 {
        AssetsV2::new(
            Arc::new(node),
            chain.conditions.clone(),
            wallet(1),
            chain.config.clone(),
        )
    }

    fn trailing_record(chain: &Chain, tx: &PreparedTransaction) -> AssetRecord {
        let script = &tx.last_output().unwrap().script;
        chain.codec.decode_order(script).unwrap().unwrap().record.unwrap()
    }

    #[tokio::test]
    async fn test_post_ask_100_at_5() {
        let chain = Chain::new();
        let node = Arc::new(FakeNode {
            height: 150_000,
            coin_inputs: vec![35_000],
            token_inputs: vec![100],
            ..Default::default()
        });
        let engine = AssetsV2::new(
            node.clone(),
            chain.conditions.clone(),
            wallet(1),
            chain.config.clone(),
        );

        let tx = engine
            .execute(TradeIntent::PostAsk {
                units: 100,
                token_id: txid(0xaa),
                unit_price: 5,
                expiry_height: None,
            })
            .await
            .unwrap();

        let escrows: Vec<_> = tx
            .outputs
            .iter()
            .filter(|o| o.script == chain.conditions.escrow_output(
                &chain.config.token_escrow_evals(),
                &[chain.config.escrow_pubkey.clone()],
                1,
                None,
            ))
            .collect();
        assert_eq!(escrows.len(), 1);
        assert_eq!(escrows[0].value, 100);
        assert_eq!(escrows[0].kind, ValueKind::Token);

        let markers: Vec<_> = tx.outputs.iter().filter(|o| o.value == 10_000).collect();
        assert_eq!(markers.len(), 1);
        assert_eq!(
            markers[0].script,
            chain.conditions.escrow_output(
                &[0xf6],
                &[pubkey(1), chain.config.escrow_pubkey.clone()],
                1,
                None
            )
        );

        // escrow, marker, change of 15_000, trailing record
        assert_eq!(tx.outputs.len(), 4);
        assert_eq!(tx.outputs[2].value, 15_000);

        let record = trailing_record(&chain, &tx);
        assert_eq!(record.func_id(), 's');
        assert_eq!(record.unit_price(), Some(5));
        assert_eq!(record.origin_pubkey(), Some(&pubkey(1)));
        assert_eq!(record.expiry_height(), Some(150_000 + 40_320));

        assert_eq!(tx.fee(), 10_000);
        assert!(tx.inputs.iter().all(|i| i.witness.is_some()));
        assert_eq!(node.calls().len(), 3);

        let probes = chain.conditions.last_probes();
        assert_eq!(probes.len(), 2);
        assert_eq!(probes[0].0.eval_codes, vec![0xf5]);
        assert_eq!(probes[0].0.pubkeys, vec![pubkey(1)]);
        assert!(probes[0].1.is_none());
        // tokens sent to my normal address are signed too
        assert_eq!(probes[1].0.eval_codes, vec![0xf5]);
        assert!(probes[1].0.pubkeys.is_empty());
        assert_eq!(probes[1].0.addresses, vec![chain.conditions.address(&pubkey(1))]);
        assert!(probes[1].1.is_none());
    }

    #[tokio::test]
    async fn test_post_ask_with_expiry_skips_getinfo() {
        let chain = Chain::new();
        let node = Arc::new(FakeNode {
            coin_inputs: vec![20_000],
            token_inputs: vec![60, 60],
            fail_info: Some("getinfo must not be called".to_string()),
            ..Default::default()
        });
        let engine = AssetsV2::new(
            node.clone(),
            chain.conditions.clone(),
            wallet(1),
            chain.config.clone(),
        );
        let tx = engine
            .execute(TradeIntent::PostAsk {
                units: 100,
                token_id: txid(0xaa),
                unit_price: 0,
                expiry_height: Some(777),
            })
            .await
            .unwrap();

        assert!(!node.calls().contains(&"info".to_string()));
        assert_eq!(trailing_record(&chain, &tx).expiry_height(), Some(777));
        // escrow, marker, token change of 20, trailing record; no coin change
        assert_eq!(tx.outputs.len(), 4);
        assert_eq!(tx.outputs[2].value, 20);
        assert_eq!(tx.outputs[2].kind, ValueKind::Token);
        assert_eq!(
            tx.outputs[2].script,
            engine.issuer.ctx.token_output(txid(0xaa), &pubkey(1))
        );
    }

    #[tokio::test]
    async fn test_zero_expiry_uses_default_window() {
        let chain = Chain::new();
        let node = Arc::new(FakeNode {
            height: 5_000,
            coin_inputs: vec![20_000],
            token_inputs: vec![100],
            ..Default::default()
        });
        let engine = AssetsV2::new(
            node.clone(),
            chain.conditions.clone(),
            wallet(1),
            chain.config.clone(),
        );
        let tx = engine
            .execute(TradeIntent::PostAsk {
                units: 100,
                token_id: txid(0xaa),
                unit_price: 5,
                expiry_height: Some(0),
            })
            .await
            .unwrap();

        assert!(node.calls().contains(&"info".to_string()));
        assert_eq!(trailing_record(&chain, &tx).expiry_height(), Some(5_000 + 40_320));
    }

    #[tokio::test]
    async fn test_post_ask_short_inputs() {
        let chain = Chain::new();
        let short_coin = FakeNode {
            coin_inputs: vec![19_999],
            token_inputs: vec![100],
            ..Default::default()
        };
        assert_eq!(
            engine(&chain, short_coin)
                .execute(TradeIntent::PostAsk {
                    units: 100,
                    token_id: txid(0xaa),
                    unit_price: 5,
                    expiry_height: Some(1),
                })
                .await,
            Err(DexError::InsufficientFunds { required: 20_000, added: 19_999 })
        );

        let short_tokens = FakeNode {
            coin_inputs: vec![20_000],
            token_inputs: vec![99],
            ..Default::default()
        };
        assert_eq!(
            engine(&chain, short_tokens)
                .execute(TradeIntent::PostAsk {
                    units: 100,
                    token_id: txid(0xaa),
                    unit_price: 5,
                    expiry_height: Some(1),
                })
                .await,
            Err(DexError::InsufficientTokens { required: 100, added: 99 })
        );
    }

    #[tokio::test]
    async fn test_post_rejects_bad_input_before_remote_calls() {
        let chain = Chain::new();
        let node = Arc::new(FakeNode::default());
        let engine = AssetsV2::new(
            node.clone(),
            chain.conditions.clone(),
            wallet(1),
            chain.config.clone(),
        );
        let negative = engine
            .execute(TradeIntent::PostBid {
                units: 10,
                token_id: txid(0xaa),
                unit_price: -1,
                expiry_height: None,
            })
            .await;
        assert_eq!(negative, Err(DexError::InvalidPrice(-1)));
        let zero = engine
            .execute(TradeIntent::PostAsk {
                units: 0,
                token_id: txid(0xaa),
                unit_price: 1,
                expiry_height: None,
            })
            .await;
        assert!(matches!(zero, Err(DexError::InvalidAmount(_))));
        let overflow = engine
            .execute(TradeIntent::PostBid {
                units: u64::MAX,
                token_id: txid(0xaa),
                unit_price: 2,
                expiry_height: None,
            })
            .await;
        assert!(matches!(overflow, Err(DexError::InvalidAmount(_))));
        assert!(node.calls().is_empty());
    }

    #[tokio::test]
    async fn test_post_bid_escrows_coin() {
        let chain = Chain::new();
        let node = FakeNode {
            height: 10,
            coin_inputs: vec![15_000, 15_000],
            ..Default::default()
        };
        let tx = engine(&chain, node)
            .execute(TradeIntent::PostBid {
                units: 20,
                token_id: txid(0xaa),
                unit_price: 250,
                expiry_height: None,
            })
            .await
            .unwrap();

        assert_eq!(tx.outputs[0].value, 5_000);
        assert_eq!(
            tx.outputs[0].script,
            chain.conditions.escrow_output(&[0xf6], &[chain.config.escrow_pubkey.clone()], 1, None)
        );
        assert_eq!(tx.outputs[1].value, 10_000);
        // 30_000 - 5_000 - 10_000 marker - 10_000 fee = 5_000 change
        assert_eq!(tx.outputs[2].value, 5_000);
        assert_eq!(tx.outputs[2].script, chain.conditions.pay_to_pubkey(&pubkey(1)));
        assert_eq!(tx.outputs.len(), 4);
        assert_eq!(tx.input_sum(ValueKind::Token), 0);

        let record = trailing_record(&chain, &tx);
        assert_eq!(record.func_id(), 'b');
        assert_eq!(record.expiry_height(), Some(10 + 40_320));
        assert!(chain.conditions.last_probes().is_empty());
    }

    #[tokio::test]
    async fn test_post_bid_drops_dust_change() {
        let chain = Chain::new();
        let node = FakeNode {
            coin_inputs: vec![25_500],
            ..Default::default()
        };
        let tx = engine(&chain, node)
            .execute(TradeIntent::PostBid {
                units: 5,
                token_id: txid(0xaa),
                unit_price: 1_000,
                expiry_height: Some(99),
            })
            .await
            .unwrap();
        // 500 of change is not above the dust floor
        assert_eq!(tx.outputs.len(), 3);
        assert_eq!(tx.fee(), 10_500);
    }

    #[tokio::test]
    async fn test_remote_failure_aborts_post() {
        let chain = Chain::new();
        let node = FakeNode {
            coin_inputs: vec![30_000],
            token_inputs: vec![100],
            fail_info: Some("connection refused".to_string()),
            ..Default::default()
        };
        let res = engine(&chain, node)
            .execute(TradeIntent::PostAsk {
                units: 100,
                token_id: txid(0xaa),
                unit_price: 5,
                expiry_height: None,
            })
            .await;
        assert_eq!(res, Err(DexError::RemoteRequestFailed("connection refused".to_string())));
    }
}
