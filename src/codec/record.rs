//! The Assets-V2 order record carried in the first blob of a token transfer
//! envelope.
//!
//! Layout (big-endian integers, no presence flags):
//!
//! | offset | field          | width                 | present for  |
//! |--------|----------------|-----------------------|--------------|
//! | 0      | module tag     | 1                     | all          |
//! | 1      | funcid         | 1 (ASCII)             | all          |
//! | 2      | version        | 1                     | all          |
//! | 3      | unit price     | 8, signed             | s, S, b, B   |
//! | 11     | origin pubkey  | compact-size + N      | s, S, b, B   |
//! | next   | expiry height  | 4, signed             | s, S, b, B   |
//!
//! Which fields follow the header is decided by the funcid alone, so each
//! funcid maps to one `AssetOp` variant with a fixed shape.

use serde::Serialize;

use super::wire::{write_var_slice, WireReader};
use crate::error::Result;
use crate::models::{OrderSide, PubKey};

pub const FUNCID_ASK: u8 = b's';
pub const FUNCID_ASK_REISSUE: u8 = b'S';
pub const FUNCID_BID: u8 = b'b';
pub const FUNCID_BID_REISSUE: u8 = b'B';
pub const FUNCID_CANCEL_ASK: u8 = b'x';
pub const FUNCID_CANCEL_BID: u8 = b'o';

/// Price, owner and expiry of an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderTerms {
    /// Coins per token unit.
    pub unit_price: i64,
    pub origin_pubkey: PubKey,
    pub expiry_height: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum AssetOp {
    Ask(OrderTerms),
    AskReissue(OrderTerms),
    Bid(OrderTerms),
    BidReissue(OrderTerms),
    CancelAsk,
    CancelBid,
    /// Funcid this codec does not know; nothing past the header is read.
    Unknown(u8),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssetRecord {
    pub tag: u8,
    pub version: u8,
    pub op: AssetOp,
}

impl AssetRecord {
    pub fn new(tag: u8, version: u8, op: AssetOp) -> Self {
        Self { tag, version, op }
    }

    pub fn func_id_byte(&self) -> u8 {
        match &self.op {
            AssetOp::Ask(_) => FUNCID_ASK,
            AssetOp::AskReissue(_) => FUNCID_ASK_REISSUE,
            AssetOp::Bid(_) => FUNCID_BID,
            AssetOp::BidReissue(_) => FUNCID_BID_REISSUE,
            AssetOp::CancelAsk => FUNCID_CANCEL_ASK,
            AssetOp::CancelBid => FUNCID_CANCEL_BID,
            AssetOp::Unknown(b) => *b,
        }
    }

    pub fn func_id(&self) -> char {
        self.func_id_byte() as char
    }

    pub fn terms(&self) -> Option<&OrderTerms> {
        match &self.op {
            AssetOp::Ask(t) | AssetOp::AskReissue(t) | AssetOp::Bid(t) | AssetOp::BidReissue(t) => {
                Some(t)
            }
            _ => None,
        }
    }

    pub fn unit_price(&self) -> Option<i64> {
        self.terms().map(|t| t.unit_price)
    }

    pub fn origin_pubkey(&self) -> Option<&PubKey> {
        self.terms().map(|t| &t.origin_pubkey)
    }

    pub fn expiry_height(&self) -> Option<i32> {
        self.terms().map(|t| t.expiry_height)
    }

    /// Side of a live (open or reissued) order record.
    pub fn side(&self) -> Option<OrderSide> {
        match &self.op {
            AssetOp::Ask(_) | AssetOp::AskReissue(_) => Some(OrderSide::Ask),
            AssetOp::Bid(_) | AssetOp::BidReissue(_) => Some(OrderSide::Bid),
            _ => None,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(3 + 8 + 34 + 4);
        out.push(self.tag);
        out.push(self.func_id_byte());
        out.push(self.version);
        if let Some(terms) = self.terms() {
            out.extend_from_slice(&terms.unit_price.to_be_bytes());
            write_var_slice(&mut out, terms.origin_pubkey.as_bytes());
            out.extend_from_slice(&terms.expiry_height.to_be_bytes());
        }
        out
    }

    pub fn decode(buf: &[u8]) -> Result<Self> {
        let mut r = WireReader::new(buf);
        let tag = r.read_u8()?;
        let funcid = r.read_u8()?;
        let version = r.read_u8()?;

        let op = match funcid {
            FUNCID_ASK | FUNCID_ASK_REISSUE | FUNCID_BID | FUNCID_BID_REISSUE => {
                let terms = read_terms(&mut r)?;
                match funcid {
                    FUNCID_ASK => AssetOp::Ask(terms),
                    FUNCID_ASK_REISSUE => AssetOp::AskReissue(terms),
                    FUNCID_BID => AssetOp::Bid(terms),
                    _ => AssetOp::BidReissue(terms),
                }
            }
            FUNCID_CANCEL_ASK => AssetOp::CancelAsk,
            FUNCID_CANCEL_BID => AssetOp::CancelBid,
            other => AssetOp::Unknown(other),
        };

        Ok(Self { tag, version, op })
    }
}

fn read_terms(r: &mut WireReader<'_>) -> Result<OrderTerms> {
    let unit_price = r.read_i64_be()?;
    let origin_pubkey = PubKey::new(r.read_var_slice()?.to_vec());
    let expiry_height = r.read_i32_be()?;
    Ok(OrderTerms {
        unit_price,
        origin_pubkey,
        expiry_height,
    })
}
