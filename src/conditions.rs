//! Crypto-condition collaborator boundary.
//!
//! Building condition scripts and producing threshold signatures lives outside
//! this crate. The engine only says which eval codes and keys lock an output,
//! and which conditions must be satisfied when spending escrow and marker
//! outputs.

use serde::Serialize;

use crate::builder::TransactionBuilder;
use crate::error::Result;
use crate::models::{PubKey, Script, SecretKey};

/// Extra data committed into a condition output (token ownership tag).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OpDropData {
    pub eval_code: u8,
    pub m: u8,
    pub n: u8,
    pub pubkeys: Vec<PubKey>,
    pub data: Vec<u8>,
}

/// An M-of-N condition the signer must be able to fulfil.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConditionProbe {
    pub eval_codes: Vec<u8>,
    pub pubkeys: Vec<PubKey>,
    /// Normal addresses standing in for keys, for tokens paid to an address.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub addresses: Vec<String>,
    pub threshold: u8,
}

impl ConditionProbe {
    pub fn new(eval_codes: &[u8], pubkeys: &[PubKey], threshold: u8) -> Self {
        Self {
            eval_codes: eval_codes.to_vec(),
            pubkeys: pubkeys.to_vec(),
            addresses: Vec::new(),
            threshold,
        }
    }

    pub fn for_address(eval_codes: &[u8], address: &str, threshold: u8) -> Self {
        Self {
            eval_codes: eval_codes.to_vec(),
            pubkeys: Vec::new(),
            addresses: vec![address.to_string()],
            threshold,
        }
    }
}

/// A probe plus the key that fulfils it. `None` means the caller's own key.
#[derive(Debug, Clone)]
pub struct ProbeSpend {
    pub probe: ConditionProbe,
    pub secret: Option<SecretKey>,
}

impl ProbeSpend {
    pub fn own_key(probe: ConditionProbe) -> Self {
        Self { probe, secret: None }
    }

    pub fn with_key(probe: ConditionProbe, secret: SecretKey) -> Self {
        Self {
            probe,
            secret: Some(secret),
        }
    }
}

pub trait Conditions: Send + Sync {
    /// Output script locked by `threshold`-of-`pubkeys` under `eval_codes`.
    fn escrow_output(
        &self,
        eval_codes: &[u8],
        pubkeys: &[PubKey],
        threshold: u8,
        op_drop: Option<&OpDropData>,
    ) -> Script;

    fn spend_probe(&self, eval_codes: &[u8], pubkeys: &[PubKey], threshold: u8) -> ConditionProbe;

    /// Like `spend_probe`, but keyed by a normal address instead of pubkeys.
    fn address_probe(&self, eval_codes: &[u8], address: &str, threshold: u8) -> ConditionProbe;

    /// Plain payable output script for `pubkey`.
    fn pay_to_pubkey(&self, pubkey: &PubKey) -> Script;

    /// Normal address for `pubkey`.
    fn address(&self, pubkey: &PubKey) -> String;

    /// Sign every input of `tx` in place, using the probe keys for condition
    /// inputs and `signer` for everything else.
    fn finalize(
        &self,
        signer: &SecretKey,
        tx: &mut TransactionBuilder,
        probes: &[ProbeSpend],
    ) -> Result<()>;
}
