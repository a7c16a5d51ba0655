/// Binary codecs for Assets-V2 order records and the token envelopes that carry them.
pub mod envelope;
pub mod record;
pub mod wire;

pub use envelope::{EnvelopeCodec, OrderEnvelope, TokenEnvelope};
pub use record::{AssetOp, AssetRecord, OrderTerms};
