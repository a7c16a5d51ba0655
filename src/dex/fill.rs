//! Filling open asks and bids, wholly or in part.
//!
//! A partial fill reissues the order: the remaining escrow goes back to the
//! module key, a fresh marker is created for the order owner, and the trailing
//! record switches to the uppercase funcid with the original terms. A full
//! fill leaves no marker behind.

use std::sync::Arc;
use tokio::try_join;
use tracing::debug;

use super::query::{LoadedOrder, OrderQuery};
use super::royalty::{DustRoyaltyPolicy, Payee};
use super::Context;
use crate::builder::{PreparedTransaction, TransactionBuilder, ValueKind};
use crate::codec::{AssetOp, OrderTerms};
use crate::error::{DexError, Result};
use crate::models::{OutPoint, TxId};
use crate::utils::{checked_total, order_value};

/// Escrow output of every order tx.
const ORDER_VOUT: u32 = 0;

pub struct OrderFiller {
    ctx: Arc<Context>,
    query: OrderQuery,
    policy: DustRoyaltyPolicy,
}

impl OrderFiller {
    pub(crate) fn new(ctx: Arc<Context>, query: OrderQuery) -> Self {
        let policy = DustRoyaltyPolicy::from_config(&ctx.config);
        Self { ctx, query, policy }
    }

    /// Buy `fill_units` tokens from ask `ask_id`.
    pub async fn fill_ask(
        &self,
        token_id: TxId,
        ask_id: TxId,
        fill_units: u64,
        unit_price: Option<i64>,
    ) -> Result<PreparedTransaction> {
        let ctx = &self.ctx;
        let cfg = &ctx.config;
        let loaded = self.query.load_order(&token_id, &ask_id).await?;
        let terms = match &loaded.record.op {
            AssetOp::Ask(t) | AssetOp::AskReissue(t) => t.clone(),
            _ => return Err(not_an_order(&loaded, "ask")),
        };
        let unit_price = unit_price.unwrap_or(terms.unit_price);
        if unit_price <= 0 {
            return Err(DexError::InvalidPrice(unit_price));
        }

        let ask_tokens = loaded.escrow_value();
        check_fill(fill_units, ask_tokens)?;
        let remaining = ask_tokens - fill_units;
        let paid = order_value(fill_units, unit_price)?;
        let split = self.policy.split(loaded.token.royalty_fraction(), paid);
        let marker_fee = if remaining > 0 { cfg.marker_fee } else { 0 };
        let normal_amount = checked_total(&[cfg.network_fee, paid, marker_fee])?;
        debug!(
            ask_tokens,
            fill_units,
            paid,
            royalty = split.royalty,
            payee = ?split.payee,
            "fill ask"
        );

        let coins = ctx.node.aggregate_coin_inputs(ctx.me(), normal_amount).await?;
        let mut tx = TransactionBuilder::new(coins.template);
        ctx.add_coin_funding(&mut tx, &coins, normal_amount)?;
        tx.add_input(OutPoint::new(ask_id, ORDER_VOUT), ask_tokens, ValueKind::Token);

        tx.add_output(ctx.token_escrow_output(), remaining, ValueKind::Token);
        tx.add_output(ctx.token_output(token_id, ctx.me()), fill_units, ValueKind::Token);
        let seller = match split.payee {
            Payee::Counterparty => &terms.origin_pubkey,
            Payee::TokenCreator => &loaded.token.creator_pubkey,
        };
        tx.add_output(ctx.conditions.pay_to_pubkey(seller), split.seller_amount, ValueKind::Coin);
        if split.royalty > 0 {
            tx.add_output(
                ctx.conditions.pay_to_pubkey(&loaded.token.creator_pubkey),
                split.royalty,
                ValueKind::Coin,
            );
        }
        if remaining > 0 {
            tx.add_output(ctx.marker_output(&terms.origin_pubkey), cfg.marker_fee, ValueKind::Coin);
        }
        ctx.add_coin_change(&mut tx)?;

        let record = ctx.record(AssetOp::AskReissue(terms));
        let probes = [ctx.token_escrow_probe(), ctx.marker_probe()];
        ctx.finish("fill_ask", token_id, &record, tx, &probes)
    }

    /// Sell `fill_units` tokens into bid `bid_id`.
    pub async fn fill_bid(
        &self,
        token_id: TxId,
        bid_id: TxId,
        fill_units: u64,
        unit_price: Option<i64>,
    ) -> Result<PreparedTransaction> {
        let ctx = &self.ctx;
        let cfg = &ctx.config;
        let loaded = self.query.load_order(&token_id, &bid_id).await?;
        let terms: OrderTerms = match &loaded.record.op {
            AssetOp::Bid(t) | AssetOp::BidReissue(t) => t.clone(),
            _ => return Err(not_an_order(&loaded, "bid")),
        };
        if terms.unit_price <= 0 {
            return Err(DexError::InvalidOrderPrice(terms.unit_price.to_string()));
        }
        let unit_price = unit_price.unwrap_or(terms.unit_price);
        if unit_price <= 0 {
            return Err(DexError::InvalidPrice(unit_price));
        }

        let bid_amount = loaded.escrow_value();
        let bid_tokens = bid_amount / terms.unit_price as u64;
        check_fill(fill_units, bid_tokens)?;
        let paid = order_value(fill_units, unit_price)?;
        if paid > bid_amount {
            return Err(DexError::InvalidAmount(format!(
                "payment {} exceeds bid escrow {}",
                paid, bid_amount
            )));
        }
        let remaining = bid_tokens - fill_units;
        let residual = bid_amount - paid;
        let split = self.policy.split(loaded.token.royalty_fraction(), paid);
        let marker_fee = if remaining > 0 { cfg.marker_fee } else { 0 };
        let normal_amount = checked_total(&[cfg.network_fee, marker_fee])?;
        debug!(
            bid_amount,
            bid_tokens,
            fill_units,
            paid,
            residual,
            royalty = split.royalty,
            payee = ?split.payee,
            "fill bid"
        );

        let (coins, tokens) = try_join!(
            ctx.node.aggregate_coin_inputs(ctx.me(), normal_amount),
            ctx.node.aggregate_token_inputs(&token_id, ctx.me(), fill_units),
        )?;
        let mut tx = TransactionBuilder::new(coins.template);
        ctx.add_coin_funding(&mut tx, &coins, normal_amount)?;
        tx.add_input(OutPoint::new(bid_id, ORDER_VOUT), bid_amount, ValueKind::Coin);
        let tokens_added = ctx.add_token_funding(&mut tx, &tokens, fill_units)?;

        let bidder = &terms.origin_pubkey;
        // Dust-sized coin cannot sit on a plain output, so it stays in escrow.
        let residual_script = if remaining > 0 || residual <= cfg.min_dust {
            ctx.coin_escrow_output()
        } else {
            ctx.conditions.pay_to_pubkey(bidder)
        };
        tx.add_output(residual_script, residual, ValueKind::Coin);
        let seller = match split.payee {
            Payee::Counterparty => ctx.me(),
            Payee::TokenCreator => &loaded.token.creator_pubkey,
        };
        tx.add_output(ctx.conditions.pay_to_pubkey(seller), split.seller_amount, ValueKind::Coin);
        if split.royalty > 0 {
            tx.add_output(
                ctx.conditions.pay_to_pubkey(&loaded.token.creator_pubkey),
                split.royalty,
                ValueKind::Coin,
            );
        }
        tx.add_output(ctx.token_output(token_id, bidder), fill_units, ValueKind::Token);
        if remaining > 0 {
            tx.add_output(ctx.marker_output(bidder), cfg.marker_fee, ValueKind::Coin);
        }
        if tokens_added > fill_units {
            tx.add_output(
                ctx.token_output(token_id, ctx.me()),
                tokens_added - fill_units,
                ValueKind::Token,
            );
        }
        ctx.add_coin_change(&mut tx)?;

        let record = ctx.record(AssetOp::BidReissue(terms));
        let [by_key, by_address] = ctx.my_token_probes();
        let probes = [by_key, by_address, ctx.coin_escrow_probe(), ctx.marker_probe()];
        ctx.finish("fill_bid", token_id, &record, tx, &probes)
    }
}

fn check_fill(fill_units: u64, open_units: u64) -> Result<()> {
    if fill_units == 0 || fill_units > open_units {
        return Err(DexError::InvalidAmount(format!(
            "fill of {} units against {} open",
            fill_units, open_units
        )));
    }
    Ok(())
}

fn not_an_order(loaded: &LoadedOrder, side: &str) -> DexError {
    DexError::InvalidOrderStructure(format!(
        "{} is not an open {} (funcid '{}')",
        loaded.order_tx.txid,
        side,
        loaded.record.func_id()
    ))
}
