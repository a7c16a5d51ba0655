use anyhow::{anyhow, Result};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use crate::models::{RawOrder, TxId};

/// Order-book listing written by the CLI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderSnapshot {
    /// `None` for a "my orders" listing.
    pub token_id: Option<TxId>,
    pub orders: Vec<RawOrder>,
}

/// Write `data` as pretty JSON.
pub fn save_to_file<T: Serialize>(data: &T, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let file = File::create(path).map_err(|e| anyhow!("failed to create {}: {}", path.display(), e))?;
    serde_json::to_writer_pretty(BufWriter::new(file), data)
        .map_err(|e| anyhow!("failed to write {}: {}", path.display(), e))?;
    Ok(())
}

pub fn load_from_file<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| anyhow!("failed to open {}: {}", path.display(), e))?;
    serde_json::from_reader(BufReader::new(file))
        .map_err(|e| anyhow!("failed to parse {}: {}", path.display(), e))
}
