//! Data models for crawled portal records.

mod document;
mod opportunity;
mod record;
mod vendor;

pub use document::{DocType, Document};
pub use opportunity::{Opportunity, OpportunityField};
pub use record::{Record, RecordKind};
pub use vendor::{parse_status_codes, Vendor};
