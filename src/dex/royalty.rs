//! Royalty split and dust redirection for fills.
//!
//! The arithmetic mirrors the chain validator exactly, including dividing by
//! the royalty divisor before multiplying by the fraction. Changing the
//! operation order would produce royalties the validator rejects.

use serde::Serialize;

use crate::config::ProtocolConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DustVerdict {
    pub is_order_dust: bool,
    /// Set only for dust orders: whether the royalty share was the small one.
    pub is_royalty_dust: Option<bool>,
}

/// Who receives the seller amount of a fill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Payee {
    /// The order counterparty: the ask creator on fill-ask, the filler on fill-bid.
    Counterparty,
    TokenCreator,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RoyaltySplit {
    pub royalty: u64,
    pub seller_amount: u64,
    pub payee: Payee,
    pub verdict: DustVerdict,
}

#[derive(Debug, Clone, Copy)]
pub struct DustRoyaltyPolicy {
    divisor: u64,
    min_dust: u64,
}

impl DustRoyaltyPolicy {
    pub fn new(divisor: u64, min_dust: u64) -> Self {
        Self { divisor, min_dust }
    }

    pub fn from_config(config: &ProtocolConfig) -> Self {
        Self::new(config.royalty_divisor, config.min_dust)
    }

    /// Whether the smaller of royalty and seller share of `total` is dust.
    /// `fraction` must not exceed the divisor.
    pub fn classify(&self, fraction: u64, total: u64) -> DustVerdict {
        let smaller = fraction.min(self.divisor.saturating_sub(fraction));
        let share = (total / self.divisor).saturating_mul(smaller);
        if share <= self.min_dust {
            DustVerdict {
                is_order_dust: true,
                is_royalty_dust: Some(fraction < self.divisor / 2),
            }
        } else {
            DustVerdict {
                is_order_dust: false,
                is_royalty_dust: None,
            }
        }
    }

    /// Split a fill payment into royalty and seller amount and pick the payee.
    pub fn split(&self, fraction: u64, paid: u64) -> RoyaltySplit {
        let verdict = self.classify(fraction, paid);
        let mut royalty = if fraction > 0 {
            (paid / self.divisor).saturating_mul(fraction)
        } else {
            0
        };
        if verdict.is_order_dust {
            royalty = 0;
        }

        let payee = match verdict.is_royalty_dust {
            Some(true) if fraction > 0 => Payee::TokenCreator,
            _ => Payee::Counterparty,
        };

        RoyaltySplit {
            royalty,
            seller_amount: paid - royalty,
            payee,
            verdict,
        }
    }
}
