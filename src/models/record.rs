//! Tagged union of the records produced by a crawl.

use super::{Document, Opportunity, Vendor};

/// Discriminant for [`Record`], used to key handler tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    Opportunity,
    Vendor,
    Document,
}

impl RecordKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Opportunity => "opportunity",
            Self::Vendor => "vendor",
            Self::Document => "document",
        }
    }
}

impl std::fmt::Display for RecordKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A record extracted from the portal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    Opportunity(Opportunity),
    Vendor(Vendor),
    Document(Document),
}

impl Record {
    pub fn kind(&self) -> RecordKind {
        match self {
            Self::Opportunity(_) => RecordKind::Opportunity,
            Self::Vendor(_) => RecordKind::Vendor,
            Self::Document(_) => RecordKind::Document,
        }
    }

    /// Opportunity the record belongs to.
    pub fn system_id(&self) -> &str {
        match self {
            Self::Opportunity(o) => &o.system_id,
            Self::Vendor(v) => &v.system_id,
            Self::Document(d) => &d.system_id,
        }
    }
}
