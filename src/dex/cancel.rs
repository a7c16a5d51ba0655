use std::sync::Arc;
use tracing::debug;

use super::query::{LoadedOrder, OrderQuery};
use super::Context;
use crate::builder::{PreparedTransaction, TransactionBuilder, ValueKind};
use crate::codec::AssetOp;
use crate::error::{DexError, Result};
use crate::models::{OrderSide, OutPoint, TxId};

const ORDER_VOUT: u32 = 0;
/// Marker position on a freshly posted order.
const OPEN_MARKER_VOUT: u32 = 1;
/// Marker position on a reissued (partially filled) order.
const REISSUED_MARKER_VOUT: u32 = 3;

/// Withdraws an order's escrow back to its creator and burns its marker.
pub struct OrderCanceller {
    ctx: Arc<Context>,
    query: OrderQuery,
}

impl OrderCanceller {
    pub(crate) fn new(ctx: Arc<Context>, query: OrderQuery) -> Self {
        Self { ctx, query }
    }

    pub async fn cancel_ask(&self, token_id: TxId, ask_id: TxId) -> Result<PreparedTransaction> {
        self.cancel(token_id, ask_id, OrderSide::Ask).await
    }

    pub async fn cancel_bid(&self, token_id: TxId, bid_id: TxId) -> Result<PreparedTransaction> {
        self.cancel(token_id, bid_id, OrderSide::Bid).await
    }

    async fn cancel(&self, token_id: TxId, order_id: TxId, side: OrderSide) -> Result<PreparedTransaction> {
        let ctx = &self.ctx;
        let cfg = &ctx.config;
        let loaded = self.query.load_order(&token_id, &order_id).await?;
        let marker_vout = marker_vout(&loaded, side)?;
        let origin = loaded
            .record
            .origin_pubkey()
            .cloned()
            .ok_or_else(|| DexError::InvalidOrderStructure("record has no origin pubkey".to_string()))?;
        let escrow = loaded.escrow_value();
        let marker_value = loaded.order_tx.output_value(marker_vout as usize).unwrap_or(0);
        debug!(?side, escrow, marker_vout, marker_value, "cancel order");

        let coins = ctx.node.aggregate_coin_inputs(ctx.me(), cfg.network_fee).await?;
        let mut tx = TransactionBuilder::new(coins.template);
        ctx.add_coin_funding(&mut tx, &coins, cfg.network_fee)?;

        let escrow_kind = match side {
            OrderSide::Ask => ValueKind::Token,
            OrderSide::Bid => ValueKind::Coin,
        };
        tx.add_input(OutPoint::new(order_id, ORDER_VOUT), escrow, escrow_kind);
        tx.add_input(OutPoint::new(order_id, marker_vout), marker_value, ValueKind::Coin);

        let (record_op, escrow_probe) = match side {
            OrderSide::Ask => {
                tx.add_output(ctx.token_output(token_id, &origin), escrow, ValueKind::Token);
                (AssetOp::CancelAsk, ctx.token_escrow_probe())
            }
            OrderSide::Bid => {
                // Dust is only allowed on condition outputs.
                let script = if escrow > cfg.min_dust {
                    ctx.conditions.pay_to_pubkey(&origin)
                } else {
                    ctx.coin_escrow_output()
                };
                tx.add_output(script, escrow, ValueKind::Coin);
                (AssetOp::CancelBid, ctx.coin_escrow_probe())
            }
        };
        ctx.add_coin_change(&mut tx)?;

        let record = ctx.record(record_op);
        let operation = match side {
            OrderSide::Ask => "cancel_ask",
            OrderSide::Bid => "cancel_bid",
        };
        ctx.finish(operation, token_id, &record, tx, &[escrow_probe, ctx.marker_probe()])
    }
}

fn marker_vout(loaded: &LoadedOrder, side: OrderSide) -> Result<u32> {
    let outputs = loaded.order_tx.outputs.len();
    let vout = match (side, &loaded.record.op) {
        (OrderSide::Ask, AssetOp::Ask(_)) | (OrderSide::Bid, AssetOp::Bid(_)) if outputs > 1 => {
            OPEN_MARKER_VOUT
        }
        (OrderSide::Ask, AssetOp::AskReissue(_)) | (OrderSide::Bid, AssetOp::BidReissue(_))
            if outputs > 3 =>
        {
            REISSUED_MARKER_VOUT
        }
        _ => {
            return Err(DexError::InvalidOrderStructure(format!(
                "funcid '{}' with {} outputs has no {:?} marker",
                loaded.record.func_id(),
                outputs,
                side
            )))
        }
    };
    Ok(vout)
}
