//! Token-module envelopes carried in OP_RETURN outputs.
//!
//! Payload layouts (token eval code first, then funcid and version):
//!
//!   create:   eval 'c' ver <varslice creator_pk> <varslice name>
//!             <varslice description> <compact n> n * <varslice blob>
//!   transfer: eval 't' ver tokenid[32] <compact k> k * <varslice pubkey>
//!             <compact n> n * <varslice blob>
//!
//! Blobs belong to other modules. An Assets-V2 order record is the first blob
//! of a transfer; a tokel-data blob on the create envelope carries royalty.

use super::record::AssetRecord;
use super::wire::{write_compact_size, write_var_slice, WireReader};
use crate::config::ProtocolConfig;
use crate::error::{DexError, Result};
use crate::models::{PubKey, Script, Token, TxId};

const FUNCID_CREATE: u8 = b'c';
const FUNCID_TRANSFER: u8 = b't';
const ENVELOPE_VERSION: u8 = 1;

const TKLPROP_ID: u8 = 1;
const TKLPROP_URL: u8 = 2;
const TKLPROP_ROYALTY: u8 = 3;
const TKLPROP_ARBITRARY: u8 = 4;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenEnvelope {
    Create {
        creator_pubkey: PubKey,
        name: String,
        description: String,
        blobs: Vec<Vec<u8>>,
    },
    Transfer {
        token_id: TxId,
        pubkeys: Vec<PubKey>,
        blobs: Vec<Vec<u8>>,
    },
}

/// Token id and decoded order record found on an order tx's trailing output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderEnvelope {
    pub token_id: TxId,
    /// `None` when the transfer carries no blob.
    pub record: Option<AssetRecord>,
}

#[derive(Debug, Clone, Copy)]
pub struct EnvelopeCodec {
    tokens_eval: u8,
    tokel_eval: u8,
}

impl EnvelopeCodec {
    pub fn new(tokens_eval: u8, tokel_eval: u8) -> Self {
        Self {
            tokens_eval,
            tokel_eval,
        }
    }

    pub fn from_config(config: &ProtocolConfig) -> Self {
        Self::new(config.tokens_eval, config.tokel_eval)
    }

    /// Parse a token envelope from an output script. Scripts that are not
    /// OP_RETURN, or whose payload belongs to another module, yield `None`.
    pub fn decode(&self, script: &Script) -> Result<Option<TokenEnvelope>> {
        let payload = match script.op_return_payload() {
            Some(p) => p,
            None => return Ok(None),
        };
        let mut r = WireReader::new(payload);
        if r.read_u8()? != self.tokens_eval {
            return Ok(None);
        }
        let funcid = r.read_u8()?;
        let _version = r.read_u8()?;

        let envelope = match funcid {
            FUNCID_CREATE => {
                let creator_pubkey = PubKey::new(r.read_var_slice()?.to_vec());
                let name = String::from_utf8_lossy(r.read_var_slice()?).into_owned();
                let description = String::from_utf8_lossy(r.read_var_slice()?).into_owned();
                let blobs = read_blobs(&mut r)?;
                TokenEnvelope::Create {
                    creator_pubkey,
                    name,
                    description,
                    blobs,
                }
            }
            FUNCID_TRANSFER => {
                let token_id = TxId::from_internal(r.read_bytes32()?);
                let count = r.read_compact_size()?;
                let mut pubkeys = Vec::new();
                for _ in 0..count {
                    pubkeys.push(PubKey::new(r.read_var_slice()?.to_vec()));
                }
                let blobs = read_blobs(&mut r)?;
                TokenEnvelope::Transfer {
                    token_id,
                    pubkeys,
                    blobs,
                }
            }
            _ => return Ok(None),
        };
        Ok(Some(envelope))
    }

    pub fn encode(&self, envelope: &TokenEnvelope) -> Vec<u8> {
        let mut out = vec![self.tokens_eval];
        match envelope {
            TokenEnvelope::Create {
                creator_pubkey,
                name,
                description,
                blobs,
            } => {
                out.push(FUNCID_CREATE);
                out.push(ENVELOPE_VERSION);
                write_var_slice(&mut out, creator_pubkey.as_bytes());
                write_var_slice(&mut out, name.as_bytes());
                write_var_slice(&mut out, description.as_bytes());
                write_blobs(&mut out, blobs);
            }
            TokenEnvelope::Transfer {
                token_id,
                pubkeys,
                blobs,
            } => {
                out.push(FUNCID_TRANSFER);
                out.push(ENVELOPE_VERSION);
                out.extend_from_slice(token_id.internal_bytes());
                write_compact_size(&mut out, pubkeys.len() as u64);
                for pk in pubkeys {
                    write_var_slice(&mut out, pk.as_bytes());
                }
                write_blobs(&mut out, blobs);
            }
        }
        out
    }

    /// Trailing OP_RETURN output of an order tx.
    pub fn order_output(&self, token_id: TxId, record: &AssetRecord) -> Script {
        let payload = self.encode(&TokenEnvelope::Transfer {
            token_id,
            pubkeys: Vec::new(),
            blobs: vec![record.encode()],
        });
        Script::op_return(&payload)
    }

    /// Op-drop data attached to a token output so the token validator can
    /// attribute it to `token_id`.
    pub fn token_output_data(&self, token_id: TxId) -> Vec<u8> {
        self.encode(&TokenEnvelope::Transfer {
            token_id,
            pubkeys: Vec::new(),
            blobs: Vec::new(),
        })
    }

    /// Decode the order record from a transfer envelope's first blob.
    pub fn decode_order(&self, script: &Script) -> Result<Option<OrderEnvelope>> {
        match self.decode(script)? {
            Some(TokenEnvelope::Transfer {
                token_id, blobs, ..
            }) => {
                let record = match blobs.first() {
                    Some(blob) => Some(AssetRecord::decode(blob)?),
                    None => None,
                };
                Ok(Some(OrderEnvelope { token_id, record }))
            }
            _ => Ok(None),
        }
    }

    /// Decode the token described by a create envelope on `txid`'s trailing output.
    pub fn decode_token(&self, txid: TxId, script: &Script) -> Result<Option<Token>> {
        match self.decode(script)? {
            Some(TokenEnvelope::Create {
                creator_pubkey,
                name,
                description,
                blobs,
            }) => {
                let mut royalty = None;
                for blob in blobs.iter().filter(|b| b.first() == Some(&self.tokel_eval)) {
                    royalty = parse_tokel_royalty(blob)?;
                }
                Ok(Some(Token {
                    token_id: txid,
                    creator_pubkey,
                    name,
                    description,
                    royalty,
                }))
            }
            _ => Ok(None),
        }
    }

    /// Tokel-data blob with only the royalty property set.
    pub fn tokel_royalty_blob(&self, royalty: u16) -> Vec<u8> {
        let mut out = vec![self.tokel_eval, 1];
        write_compact_size(&mut out, 1);
        out.push(TKLPROP_ROYALTY);
        write_compact_size(&mut out, royalty as u64);
        out
    }
}

fn read_blobs(r: &mut WireReader<'_>) -> Result<Vec<Vec<u8>>> {
    // Older transfers end right after the pubkeys.
    if r.remaining() == 0 {
        return Ok(Vec::new());
    }
    let count = r.read_compact_size()?;
    let mut blobs = Vec::new();
    for _ in 0..count {
        blobs.push(r.read_var_slice()?.to_vec());
    }
    Ok(blobs)
}

fn write_blobs(out: &mut Vec<u8>, blobs: &[Vec<u8>]) {
    write_compact_size(out, blobs.len() as u64);
    for blob in blobs {
        write_var_slice(out, blob);
    }
}

fn parse_tokel_royalty(blob: &[u8]) -> Result<Option<u16>> {
    let mut r = WireReader::new(blob);
    let _eval = r.read_u8()?;
    let _version = r.read_u8()?;
    let count = r.read_compact_size()?;
    let mut royalty = None;
    for _ in 0..count {
        match r.read_u8()? {
            TKLPROP_ROYALTY => {
                let value = r.read_compact_size()?;
                let value = u16::try_from(value).map_err(|_| {
                    DexError::InvalidTokenReference(format!("royalty {} out of range", value))
                })?;
                royalty = Some(value);
            }
            TKLPROP_ID | TKLPROP_URL | TKLPROP_ARBITRARY => {
                r.read_var_slice()?;
            }
            other => {
                return Err(DexError::InvalidTokenReference(format!(
                    "unknown tokel property {}",
                    other
                )))
            }
        }
    }
    Ok(royalty)
}
