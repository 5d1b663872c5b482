//! Record identity, dedup and persistence services.

mod identity;
mod writer;

pub use identity::{vendor_id, BlobDigest, DedupEngine, ResolvedDocument};
pub use writer::{RecordHandler, RelationWriter, WriteOutcome};
