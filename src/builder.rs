//! In-memory transaction under assembly.
//!
//! Every input and output is tagged with what its value counts: native coin
//! or token units. Token outputs carry satoshi values on chain just like coin
//! outputs, so the tag is the only way to check the two balances separately
//! before handing the transaction back.

use serde::Serialize;

use crate::error::{DexError, Result};
use crate::models::{FundingTx, OutPoint, Script, TxTemplate};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
    Coin,
    Token,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PreparedInput {
    pub prevout: OutPoint,
    pub value: u64,
    pub kind: ValueKind,
    /// Filled in by the condition signer.
    pub witness: Option<Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PreparedOutput {
    pub script: Script,
    pub value: u64,
    pub kind: ValueKind,
}

#[derive(Debug, Clone)]
pub struct TransactionBuilder {
    template: TxTemplate,
    inputs: Vec<PreparedInput>,
    outputs: Vec<PreparedOutput>,
}

impl TransactionBuilder {
    pub fn new(template: TxTemplate) -> Self {
        Self {
            template,
            inputs: Vec::new(),
            outputs: Vec::new(),
        }
    }

    /// Add every input selected by the node and return their total value.
    pub fn add_funding(&mut self, funding: &FundingTx, kind: ValueKind) -> u64 {
        for input in &funding.inputs {
            self.add_input(input.outpoint, input.value, kind);
        }
        funding.total()
    }

    pub fn add_input(&mut self, prevout: OutPoint, value: u64, kind: ValueKind) {
        self.inputs.push(PreparedInput {
            prevout,
            value,
            kind,
            witness: None,
        });
    }

    pub fn add_output(&mut self, script: Script, value: u64, kind: ValueKind) {
        self.outputs.push(PreparedOutput { script, value, kind });
    }

    pub fn template(&self) -> TxTemplate {
        self.template
    }

    pub fn inputs(&self) -> &[PreparedInput] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[PreparedOutput] {
        &self.outputs
    }

    pub fn set_witness(&mut self, index: usize, witness: Vec<u8>) -> Result<()> {
        let input = self.inputs.get_mut(index).ok_or_else(|| {
            DexError::InvalidOrderStructure(format!("no input at index {}", index))
        })?;
        input.witness = Some(witness);
        Ok(())
    }

    /// Check both balances and freeze the transaction.
    ///
    /// Token units in must equal token units out. Coin in must cover coin out
    /// plus `fee`; any surplus is change that was too small to emit.
    pub fn build(self, fee: u64) -> Result<PreparedTransaction> {
        let tx = PreparedTransaction {
            template: self.template,
            inputs: self.inputs,
            outputs: self.outputs,
        };
        let (token_in, token_out) = (tx.input_sum(ValueKind::Token), tx.output_sum(ValueKind::Token));
        if token_in != token_out {
            return Err(DexError::ConservationViolated(format!(
                "token inputs {} != token outputs {}",
                token_in, token_out
            )));
        }
        let (coin_in, coin_out) = (tx.input_sum(ValueKind::Coin), tx.output_sum(ValueKind::Coin));
        if coin_in < coin_out + fee as u128 {
            return Err(DexError::ConservationViolated(format!(
                "coin inputs {} do not cover outputs {} plus fee {}",
                coin_in, coin_out, fee
            )));
        }
        Ok(tx)
    }
}

/// A signed transaction ready for serialization and broadcast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PreparedTransaction {
    pub template: TxTemplate,
    pub inputs: Vec<PreparedInput>,
    pub outputs: Vec<PreparedOutput>,
}

impl PreparedTransaction {
    pub fn input_sum(&self, kind: ValueKind) -> u128 {
        self.inputs
            .iter()
            .filter(|i| i.kind == kind)
            .map(|i| i.value as u128)
            .sum()
    }

    pub fn output_sum(&self, kind: ValueKind) -> u128 {
        self.outputs
            .iter()
            .filter(|o| o.kind == kind)
            .map(|o| o.value as u128)
            .sum()
    }

    /// Coin left to miners.
    pub fn fee(&self) -> u128 {
        self.input_sum(ValueKind::Coin) - self.output_sum(ValueKind::Coin)
    }

    pub fn last_output(&self) -> Option<&PreparedOutput> {
        self.outputs.last()
    }

    pub fn spends(&self, prevout: &OutPoint) -> bool {
        self.inputs.iter().any(|i| &i.prevout == prevout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TxId;

    fn outpoint(vout: u32) -> OutPoint {
        OutPoint::new(TxId::from_internal([9; 32]), vout)
    }

    #[test]
    fn test_build_accepts_balanced_tx() {
        let mut b = TransactionBuilder::new(TxTemplate::default());
        b.add_input(outpoint(0), 30_000, ValueKind::Coin);
        b.add_input(outpoint(1), 100, ValueKind::Token);
        b.add_output(Script::new(vec![1]), 100, ValueKind::Token);
        b.add_output(Script::new(vec![2]), 20_000, ValueKind::Coin);
        let tx = b.build(10_000).unwrap();
        assert_eq!(tx.fee(), 10_000);
        assert!(tx.spends(&outpoint(1)));
    }

    #[test]
    fn test_build_rejects_token_leak() {
        let mut b = TransactionBuilder::new(TxTemplate::default());
        b.add_input(outpoint(0), 20_000, ValueKind::Coin);
        b.add_input(outpoint(1), 100, ValueKind::Token);
        b.add_output(Script::new(vec![1]), 99, ValueKind::Token);
        assert!(matches!(b.build(10_000), Err(DexError::ConservationViolated(_))));
    }

    #[test]
    fn test_build_rejects_uncovered_fee() {
        let mut b = TransactionBuilder::new(TxTemplate::default());
        b.add_input(outpoint(0), 15_000, ValueKind::Coin);
        b.add_output(Script::new(vec![2]), 10_000, ValueKind::Coin);
        assert!(matches!(b.build(10_000), Err(DexError::ConservationViolated(_))));
    }

    #[test]
    fn test_set_witness_out_of_range() {
        let mut b = TransactionBuilder::new(TxTemplate::default());
        b.add_input(outpoint(0), 1, ValueKind::Coin);
        b.set_witness(0, vec![1]).unwrap();
        assert!(b.set_witness(1, vec![1]).is_err());
        assert_eq!(b.inputs()[0].witness, Some(vec![1]));
    }
}
