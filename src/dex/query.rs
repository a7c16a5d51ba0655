//! Read side of the exchange: order-book listings and single-order decoding.

use std::sync::Arc;

use crate::codec::{AssetOp, AssetRecord, EnvelopeCodec, OrderEnvelope};
use crate::conditions::Conditions;
use crate::config::ProtocolConfig;
use crate::error::{DexError, Result};
use crate::models::{OrderDetail, OrderSide, PubKey, RawOrder, Token, Transaction, TxId};
use crate::node::RemoteNode;

/// Token and order transactions needed to fill or cancel an order.
#[derive(Debug, Clone)]
pub struct LoadedOrder {
    pub token: Token,
    pub order_tx: Transaction,
    pub record: AssetRecord,
}

impl LoadedOrder {
    /// Value of the order escrow output (tokens for asks, coin for bids).
    pub fn escrow_value(&self) -> u64 {
        self.order_tx.output_value(0).unwrap_or(0)
    }
}

#[derive(Clone)]
pub struct OrderQuery {
    node: Arc<dyn RemoteNode>,
    conditions: Arc<dyn Conditions>,
    pubkey: PubKey,
    config: Arc<ProtocolConfig>,
    codec: EnvelopeCodec,
}

impl OrderQuery {
    pub fn new(
        node: Arc<dyn RemoteNode>,
        conditions: Arc<dyn Conditions>,
        pubkey: PubKey,
        config: Arc<ProtocolConfig>,
    ) -> Self {
        let codec = EnvelopeCodec::from_config(&config);
        Self {
            node,
            conditions,
            pubkey,
            config,
            codec,
        }
    }

    pub async fn fetch_orders_for_token(&self, token_id: &TxId) -> Result<Vec<RawOrder>> {
        self.node.query_orders(&self.pubkey, Some(token_id)).await
    }

    pub async fn fetch_my_orders(&self) -> Result<Vec<RawOrder>> {
        self.node.query_orders(&self.pubkey, None).await
    }

    /// Decode an open (`s` or `b`) order and resolve its token.
    pub async fn fetch_order(&self, order_id: &TxId) -> Result<OrderDetail> {
        let txs = self.node.fetch_transactions(&self.pubkey, &[*order_id]).await?;
        let order_tx = match txs.as_slice() {
            [tx] => tx,
            _ => {
                return Err(DexError::InvalidOrderStructure(format!(
                    "expected 1 tx for {}, got {}",
                    order_id,
                    txs.len()
                )))
            }
        };
        if order_tx.outputs.len() < 2 {
            return Err(DexError::InvalidOrderStructure("too few outputs".to_string()));
        }

        let (envelope, record) = self.order_record(order_tx)?;
        let (side, terms) = match &record.op {
            AssetOp::Ask(t) => (OrderSide::Ask, t),
            AssetOp::Bid(t) => (OrderSide::Bid, t),
            _ => {
                return Err(DexError::InvalidOrderStructure(format!(
                    "funcid '{}' is not an open order",
                    record.func_id()
                )))
            }
        };
        if terms.unit_price <= 0 {
            return Err(DexError::InvalidOrderPrice(terms.unit_price.to_string()));
        }
        let unit_price = terms.unit_price as u64;

        let escrow = order_tx.output_value(0).unwrap_or(0);
        let amount = match side {
            OrderSide::Ask => escrow,
            OrderSide::Bid => escrow / unit_price,
        };

        let token_txs = self
            .node
            .fetch_transactions(&self.pubkey, &[envelope.token_id])
            .await?;
        let token = match token_txs.first() {
            Some(tx) => self.resolve_token(tx)?,
            None => {
                return Err(DexError::InvalidTokenReference(format!(
                    "token {} not found",
                    envelope.token_id
                )))
            }
        };

        Ok(OrderDetail {
            order_id: *order_id,
            side,
            amount,
            unit_price,
            origin_address: self.conditions.address(&terms.origin_pubkey),
            origin_pubkey: terms.origin_pubkey.clone(),
            expiry_height: terms.expiry_height,
            token,
        })
    }

    /// Fetch token and order txs in one request and decode both.
    pub async fn load_order(&self, token_id: &TxId, order_id: &TxId) -> Result<LoadedOrder> {
        let txs = self
            .node
            .fetch_transactions(&self.pubkey, &[*token_id, *order_id])
            .await?;
        let (token_tx, order_tx) = match txs.as_slice() {
            [token_tx, order_tx] => (token_tx, order_tx),
            _ => {
                return Err(DexError::InvalidTokenReference(format!(
                    "expected token and order txs, got {}",
                    txs.len()
                )))
            }
        };
        if token_tx.outputs.len() < 2 {
            return Err(DexError::InvalidTokenReference("too few outputs in token tx".to_string()));
        }
        if order_tx.outputs.len() < 2 {
            return Err(DexError::InvalidOrderStructure("too few outputs".to_string()));
        }

        let token = self.resolve_token(token_tx)?;
        let (envelope, record) = self.order_record(order_tx)?;
        if envelope.token_id != *token_id {
            return Err(DexError::InvalidOrderStructure(format!(
                "order is for token {}, not {}",
                envelope.token_id, token_id
            )));
        }

        Ok(LoadedOrder {
            token,
            order_tx: order_tx.clone(),
            record,
        })
    }

    fn order_record(&self, tx: &Transaction) -> Result<(OrderEnvelope, AssetRecord)> {
        let script = &tx
            .last_output()
            .ok_or_else(|| DexError::InvalidOrderStructure("no outputs".to_string()))?
            .script;
        let mut envelope = self
            .codec
            .decode_order(script)?
            .ok_or_else(|| DexError::InvalidOrderStructure("no token transfer data".to_string()))?;
        let record = envelope
            .record
            .take()
            .filter(|r| r.tag == self.config.assets_eval)
            .ok_or_else(|| DexError::InvalidOrderStructure("no asset record".to_string()))?;
        Ok((envelope, record))
    }

    fn resolve_token(&self, tx: &Transaction) -> Result<Token> {
        let script = &tx
            .last_output()
            .ok_or_else(|| DexError::InvalidTokenReference("no outputs in token tx".to_string()))?
            .script;
        let token = self
            .codec
            .decode_token(tx.txid, script)?
            .ok_or_else(|| DexError::InvalidTokenReference(format!("{} is not a token", tx.txid)))?;
        if token.royalty_fraction() > self.config.royalty_divisor {
            return Err(DexError::InvalidTokenReference(format!(
                "royalty {} exceeds {}",
                token.royalty_fraction(),
                self.config.royalty_divisor
            )));
        }
        Ok(token)
    }
}
