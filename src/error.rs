use thiserror::Error;

/// Errors raised while parsing order records or preparing Assets-V2 transactions.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DexError {
    /// Record or envelope buffer ended before a field could be read.
    #[error("malformed record: field at offset {offset} needs {needed} bytes, {available} available")]
    MalformedRecord {
        offset: usize,
        needed: usize,
        available: usize,
    },

    /// Wrong output count, unexpected funcid or marker position.
    #[error("invalid order tx ({0})")]
    InvalidOrderStructure(String),

    /// Caller supplied a negative or zero unit price.
    #[error("invalid unit price {0}")]
    InvalidPrice(i64),

    /// The order record carries no usable unit price.
    #[error("invalid order tx (unit price {0})")]
    InvalidOrderPrice(String),

    /// Token lookup failed or the token tx is malformed.
    #[error("invalid tokenid ({0})")]
    InvalidTokenReference(String),

    #[error("insufficient normal inputs: required {required}, added {added}")]
    InsufficientFunds { required: u64, added: u64 },

    #[error("insufficient token inputs: required {required}, added {added}")]
    InsufficientTokens { required: u64, added: u64 },

    /// Zero units, fills larger than the order, or amount overflow.
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    /// The assembled transaction failed a local balance check.
    #[error("transaction does not balance: {0}")]
    ConservationViolated(String),

    /// Remote node or transport failure, message passed through verbatim.
    #[error("remote request failed: {0}")]
    RemoteRequestFailed(String),
}

impl DexError {
    pub fn remote(err: impl std::fmt::Display) -> Self {
        DexError::RemoteRequestFailed(err.to_string())
    }
}

impl From<anyhow::Error> for DexError {
    fn from(err: anyhow::Error) -> Self {
        DexError::RemoteRequestFailed(format!("{:#}", err))
    }
}

pub type Result<T> = std::result::Result<T, DexError>;
