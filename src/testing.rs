//! In-memory collaborators and chain fixtures for unit tests.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::builder::TransactionBuilder;
use crate::codec::{AssetOp, AssetRecord, EnvelopeCodec, OrderTerms, TokenEnvelope};
use crate::conditions::{ConditionProbe, Conditions, OpDropData, ProbeSpend};
use crate::config::ProtocolConfig;
use crate::error::{DexError, Result};
use crate::models::{
    ChainInfo, FundingInput, FundingTx, OutPoint, PubKey, RawOrder, Script, SecretKey, Transaction,
    TxId, TxOut, TxTemplate, Wallet,
};

pub const TEMPLATE: TxTemplate = TxTemplate {
    version: 4,
    version_group_id: 0x892f_2085,
    expiry_height: 0,
};

pub fn pubkey(tag: u8) -> PubKey {
    let mut bytes = vec![0x02];
    bytes.extend_from_slice(&[tag; 32]);
    PubKey::new(bytes)
}

pub fn wallet(tag: u8) -> Wallet {
    Wallet::new(pubkey(tag), SecretKey::new([tag; 32]))
}

pub fn txid(tag: u8) -> TxId {
    TxId::from_internal([tag; 32])
}

#[derive(Default)]
pub struct FakeNode {
    pub height: u32,
    pub coin_inputs: Vec<u64>,
    pub token_inputs: Vec<u64>,
    pub transactions: HashMap<TxId, Transaction>,
    pub orders: Vec<RawOrder>,
    pub fail_info: Option<String>,
    pub calls: Mutex<Vec<String>>,
}

impl FakeNode {
    pub fn with_tx(mut self, tx: Transaction) -> Self {
        self.transactions.insert(tx.txid, tx);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    fn record(&self, call: String) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
    }

    fn funding(source: u8, values: &[u64]) -> FundingTx {
        FundingTx {
            template: TEMPLATE,
            inputs: values
                .iter()
                .enumerate()
                .map(|(i, v)| FundingInput {
                    outpoint: OutPoint::new(txid(source), i as u32),
                    value: *v,
                    script: Script::default(),
                })
                .collect(),
        }
    }
}

#[async_trait]
impl crate::node::RemoteNode for FakeNode {
    async fn get_info(&self) -> Result<ChainInfo> {
        self.record("info".to_string());
        match &self.fail_info {
            Some(msg) => Err(DexError::RemoteRequestFailed(msg.clone())),
            None => Ok(ChainInfo { height: self.height }),
        }
    }

    async fn aggregate_coin_inputs(&self, _pubkey: &PubKey, amount: u64) -> Result<FundingTx> {
        self.record(format!("coin:{}", amount));
        Ok(Self::funding(0xc0, &self.coin_inputs))
    }

    async fn aggregate_token_inputs(
        &self,
        _token_id: &TxId,
        _pubkey: &PubKey,
        amount: u64,
    ) -> Result<FundingTx> {
        self.record(format!("token:{}", amount));
        Ok(Self::funding(0x70, &self.token_inputs))
    }

    async fn fetch_transactions(&self, _pubkey: &PubKey, ids: &[TxId]) -> Result<Vec<Transaction>> {
        self.record(format!("fetch:{}", ids.len()));
        ids.iter()
            .map(|id| {
                self.transactions
                    .get(id)
                    .cloned()
                    .ok_or_else(|| DexError::RemoteRequestFailed(format!("tx {} not found", id)))
            })
            .collect()
    }

    async fn query_orders(&self, _pubkey: &PubKey, token_id: Option<&TxId>) -> Result<Vec<RawOrder>> {
        self.record("orders".to_string());
        let wanted = token_id.map(|t| t.to_hex());
        Ok(self
            .orders
            .iter()
            .filter(|o| wanted.is_none() || o.tokenid == wanted)
            .cloned()
            .collect())
    }
}

/// Deterministic script builder that records every finalize call.
#[derive(Default)]
pub struct FakeConditions {
    pub finalized: Mutex<Vec<Vec<(ConditionProbe, Option<SecretKey>)>>>,
}

impl FakeConditions {
    pub fn last_probes(&self) -> Vec<(ConditionProbe, Option<SecretKey>)> {
        self.finalized
            .lock()
            .ok()
            .and_then(|f| f.last().cloned())
            .unwrap_or_default()
    }
}

impl Conditions for FakeConditions {
    fn escrow_output(
        &self,
        eval_codes: &[u8],
        pubkeys: &[PubKey],
        threshold: u8,
        op_drop: Option<&OpDropData>,
    ) -> Script {
        let mut bytes = vec![0xcc, threshold, eval_codes.len() as u8];
        bytes.extend_from_slice(eval_codes);
        bytes.push(pubkeys.len() as u8);
        for pk in pubkeys {
            bytes.extend_from_slice(pk.as_bytes());
        }
        if let Some(drop) = op_drop {
            bytes.push(0x75);
            bytes.extend_from_slice(&drop.data);
        }
        Script::new(bytes)
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
        bytes.push(0xac);
        Script::new(bytes)
    }

    fn address(&self, pubkey: &PubKey) -> String {
        format!("R{}", &pubkey.to_hex()[..10])
    }

    fn finalize(
        &self,
        _signer: &SecretKey,
        tx: &mut TransactionBuilder,
        probes: &[ProbeSpend],
    ) -> Result<()> {
        for i in 0..tx.inputs().len() {
            tx.set_witness(i, vec![0x30])?;
        }
        if let Ok(mut f) = self.finalized.lock() {
            f.push(probes.iter().map(|p| (p.probe.clone(), p.secret.clone())).collect());
        }
        Ok(())
    }
}

/// Chain fixtures built with the real codecs and the fake script builder.
pub struct Chain {
    pub config: ProtocolConfig,
    pub codec: EnvelopeCodec,
    pub conditions: Arc<FakeConditions>,
}

impl Chain {
    pub fn new() -> Self {
        let config = ProtocolConfig::default();
        Self {
            codec: EnvelopeCodec::from_config(&config),
            config,
            conditions: Arc::new(FakeConditions::default()),
        }
    }

    pub fn token_tx(&self, id: TxId, creator: &PubKey, royalty: Option<u16>) -> Transaction {
        let blobs = royalty
            .map(|r| vec![self.codec.tokel_royalty_blob(r)])
            .unwrap_or_default();
        let payload = self.codec.encode(&TokenEnvelope::Create {
            creator_pubkey: creator.clone(),
            name: "TKN".to_string(),
            description: "test token".to_string(),
            blobs,
        });
        Transaction {
            txid: id,
            outputs: vec![
                TxOut { value: 1_000_000, script: Script::new(vec![0xcc]) },
                TxOut { value: 0, script: Script::op_return(&payload) },
            ],
        }
    }

    pub fn record(&self, op: AssetOp) -> AssetRecord {
        AssetRecord::new(self.config.assets_eval, self.config.record_version, op)
    }

    pub fn terms(&self, price: i64, creator: &PubKey) -> OrderTerms {
        OrderTerms {
            unit_price: price,
            origin_pubkey: creator.clone(),
            expiry_height: 200_000,
        }
    }

    /// Order tx with `escrow` on output 0 and the marker where the builders put it:
    /// index 1 for open orders, index 3 for reissued ones.
    pub fn order_tx(&self, id: TxId, token_id: TxId, escrow: u64, record: AssetRecord) -> Transaction {
        let marker = TxOut { value: self.config.marker_fee, script: Script::new(vec![0xcc, 0x01]) };
        let filler = TxOut { value: 777, script: Script::new(vec![0x01]) };
        let mut outputs = vec![TxOut { value: escrow, script: Script::new(vec![0xcc, 0x00]) }];
        match record.op {
            AssetOp::AskReissue(_) | AssetOp::BidReissue(_) => {
                outputs.push(filler.clone());
                outputs.push(filler);
                outputs.push(marker);
            }
            _ => outputs.push(marker),
        }
        outputs.push(TxOut { value: 0, script: self.codec.order_output(token_id, &record) });
        Transaction { txid: id, outputs }
    }
}
