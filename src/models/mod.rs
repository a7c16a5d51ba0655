pub mod keys;
pub mod order;
pub mod token;
pub mod tx;

pub use keys::{PubKey, SecretKey, Wallet};
pub use order::{OrderDetail, OrderSide, RawOrder};
pub use token::Token;
pub use tx::{ChainInfo, FundingInput, FundingTx, OutPoint, Script, Transaction, TxId, TxOut, TxTemplate};
