use anyhow::{anyhow, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

const OP_RETURN: u8 = 0x6a;
const OP_PUSHDATA1: u8 = 0x4c;
const OP_PUSHDATA2: u8 = 0x4d;
const OP_PUSHDATA4: u8 = 0x4e;

/// Transaction id. Stored in internal byte order; displayed reversed, the way
/// node RPCs print hashes.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TxId([u8; 32]);

impl TxId {
    pub fn from_internal(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Parse the display (reversed) hex form.
    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = hex::decode(s.trim()).map_err(|e| anyhow!("invalid txid hex: {}", e))?;
        let mut arr: [u8; 32] = bytes
            .try_into()
            .map_err(|b: Vec<u8>| anyhow!("txid must be 32 bytes, got {}", b.len()))?;
        arr.reverse();
        Ok(Self(arr))
    }

    pub fn internal_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        let mut display = self.0;
        display.reverse();
        hex::encode(display)
    }
}

impl fmt::Debug for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TxId({})", self.to_hex())
    }
}

impl fmt::Display for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Serialize for TxId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for TxId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        TxId::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OutPoint {
    pub txid: TxId,
    pub vout: u32,
}

impl OutPoint {
    pub fn new(txid: TxId, vout: u32) -> Self {
        Self { txid, vout }
    }
}

/// Raw output script bytes.
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct Script(Vec<u8>);

impl Script {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn from_hex(s: &str) -> Result<Self> {
        Ok(Self(hex::decode(s.trim()).map_err(|e| anyhow!("invalid script hex: {}", e))?))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }

    /// `OP_RETURN <push payload>` with the minimal push opcode for the length.
    pub fn op_return(payload: &[u8]) -> Self {
        let mut out = Vec::with_capacity(payload.len() + 6);
        out.push(OP_RETURN);
        let len = payload.len();
        if len < OP_PUSHDATA1 as usize {
            out.push(len as u8);
        } else if len <= 0xff {
            out.push(OP_PUSHDATA1);
            out.push(len as u8);
        } else if len <= 0xffff {
            out.push(OP_PUSHDATA2);
            out.extend_from_slice(&(len as u16).to_le_bytes());
        } else {
            out.push(OP_PUSHDATA4);
            out.extend_from_slice(&(len as u32).to_le_bytes());
        }
        out.extend_from_slice(payload);
        Self(out)
    }

    /// The single data push following OP_RETURN, if this is such a script.
    pub fn op_return_payload(&self) -> Option<&[u8]> {
        let (&first, rest) = self.0.split_first()?;
        if first != OP_RETURN {
            return None;
        }
        let (&op, rest) = rest.split_first()?;
        let (len, rest) = match op {
            n if n < OP_PUSHDATA1 => (n as usize, rest),
            OP_PUSHDATA1 => {
                let (&n, rest) = rest.split_first()?;
                (n as usize, rest)
            }
            OP_PUSHDATA2 => {
                let n = u16::from_le_bytes(rest.get(..2)?.try_into().ok()?);
                (n as usize, &rest[2..])
            }
            OP_PUSHDATA4 => {
                let n = u32::from_le_bytes(rest.get(..4)?.try_into().ok()?);
                (n as usize, &rest[4..])
            }
            _ => return None,
        };
        rest.get(..len)
    }
}

impl fmt::Debug for Script {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Script({})", self.to_hex())
    }
}

impl Serialize for Script {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Script {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Script::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOut {
    pub value: u64,
    pub script: Script,
}

/// A confirmed transaction as returned by the remote node, reduced to what the
/// engine reads: its id and outputs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub txid: TxId,
    pub outputs: Vec<TxOut>,
}

impl Transaction {
    pub fn output_value(&self, vout: usize) -> Option<u64> {
        self.outputs.get(vout).map(|o| o.value)
    }

    pub fn last_output(&self) -> Option<&TxOut> {
        self.outputs.last()
    }
}

/// Header fields copied from the node's funding transaction into the new one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxTemplate {
    pub version: i32,
    pub version_group_id: u32,
    pub expiry_height: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FundingInput {
    pub outpoint: OutPoint,
    pub value: u64,
    pub script: Script,
}

/// Result of a coin or token input aggregation request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FundingTx {
    pub template: TxTemplate,
    pub inputs: Vec<FundingInput>,
}

impl FundingTx {
    /// Sum of the selected input values; saturates rather than wrapping on a
    /// hostile node response.
    pub fn total(&self) -> u64 {
        self.inputs
            .iter()
            .fold(0u64, |acc, i| acc.saturating_add(i.value))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainInfo {
    pub height: u32,
}
