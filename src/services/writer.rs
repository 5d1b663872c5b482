//! Relation writer: upserts record metadata and links it to its opportunity.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};
use tracing::{debug, error};

use super::identity::{vendor_id, DedupEngine};
use crate::config::TableNames;
use crate::error::{CrawlError, CrawlResult};
use crate::models::{Document, Opportunity, OpportunityField, Record, RecordKind, Vendor};
use crate::storage::{AttributeValue, Item, ItemKey, KvStore};

const ATTR_SYSTEM_ID: &str = "SystemId";
const ATTR_VENDOR_ID: &str = "VendorId";
const ATTR_DOCUMENT_ID: &str = "DocumentId";
const ATTR_VENDORS: &str = "Vendors";
const ATTR_DOCUMENTS: &str = "Documents";

/// Set attributes on an opportunity that only grow through set-union updates.
const OPPORTUNITY_RELATION_SETS: &[&str] = &[ATTR_VENDORS, ATTR_DOCUMENTS];

/// What a successful write produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteOutcome {
    pub kind: RecordKind,
    /// Key of the upserted item.
    pub key: String,
    /// For documents: whether the blob was newly uploaded.
    pub blob_uploaded: Option<bool>,
}

/// Handler for one record kind.
pub type RecordHandler =
    for<'a> fn(&'a RelationWriter, &'a Record) -> BoxFuture<'a, CrawlResult<WriteOutcome>>;

/// Persists records and maintains opportunity relation sets.
///
/// Multi-step writes are not rolled back: a stored blob or vendor item stays
/// in place if the following step fails, and a re-crawl completes it.
pub struct RelationWriter {
    kv: Arc<dyn KvStore>,
    dedup: DedupEngine,
    tables: TableNames,
    handlers: HashMap<RecordKind, RecordHandler>,
}

impl RelationWriter {
    pub fn new(kv: Arc<dyn KvStore>, dedup: DedupEngine, tables: TableNames) -> Self {
        let mut handlers: HashMap<RecordKind, RecordHandler> = HashMap::new();
        handlers.insert(RecordKind::Opportunity, handle_opportunity);
        handlers.insert(RecordKind::Vendor, handle_vendor);
        handlers.insert(RecordKind::Document, handle_document);

        Self {
            kv,
            dedup,
            tables,
            handlers,
        }
    }

    /// Dispatch a record to the handler registered for its kind.
    pub async fn process(&self, record: &Record) -> CrawlResult<WriteOutcome> {
        let kind = record.kind();
        match self.handlers.get(&kind) {
            Some(handler) => handler(self, record).await,
            None => Err(CrawlError::RecordValidation {
                kind: kind.as_str(),
                message: "no handler registered".to_string(),
            }),
        }
    }

    /// Upsert an opportunity. Absent optional fields are left out of the item.
    pub async fn write_opportunity(&self, opp: &Opportunity) -> CrawlResult<WriteOutcome> {
        require_system_id(RecordKind::Opportunity, &opp.system_id)?;

        let mut item = Item::new();
        item.insert(ATTR_SYSTEM_ID.to_string(), AttributeValue::S(opp.system_id.clone()));
        for field in OpportunityField::ALL {
            if let Some(value) = opp.get(field).filter(|v| !v.is_empty()) {
                item.insert(field.attribute().to_string(), AttributeValue::S(value.to_string()));
            }
        }
        insert_set(&mut item, "CommodityCodes", &opp.commodity_codes);
        insert_set(&mut item, "Counties", &opp.counties);

        let table = &self.tables.opportunities;
        if let Err(e) = self
            .kv
            .put_item(table, ATTR_SYSTEM_ID, item, OPPORTUNITY_RELATION_SETS)
            .await
        {
            error!(
                "Failed to write opportunity {} to table {}: {}",
                opp.system_id, table, e
            );
            return Err(e.into());
        }

        debug!("Wrote opportunity {}", opp.system_id);
        Ok(WriteOutcome {
            kind: RecordKind::Opportunity,
            key: opp.system_id.clone(),
            blob_uploaded: None,
        })
    }

    /// Upsert a vendor and add it to its opportunity's vendor set.
    pub async fn write_vendor(&self, vendor: &Vendor) -> CrawlResult<WriteOutcome> {
        require_system_id(RecordKind::Vendor, &vendor.system_id)?;

        let id = vendor_id(vendor);
        let mut item = Item::new();
        item.insert(ATTR_VENDOR_ID.to_string(), AttributeValue::S(id.clone()));
        insert_nonempty(&mut item, "CompanyName", &vendor.company_name);
        insert_nonempty(&mut item, "Email", &vendor.email);
        insert_nonempty(&mut item, "Phone", &vendor.phone);
        let status: BTreeSet<String> = vendor
            .status
            .iter()
            .filter(|s| !s.is_empty())
            .cloned()
            .collect();
        insert_set(&mut item, "Status", &status);

        let table = &self.tables.vendors;
        if let Err(e) = self.kv.put_item(table, ATTR_VENDOR_ID, item, &[]).await {
            error!(
                "Failed to write vendor {} ({}) to table {}: {}",
                id, vendor.company_name, table, e
            );
            return Err(e.into());
        }

        self.link(&vendor.system_id, ATTR_VENDORS, &id).await?;

        Ok(WriteOutcome {
            kind: RecordKind::Vendor,
            key: id,
            blob_uploaded: None,
        })
    }

    /// Store a document's blob (once per payload), upsert its metadata, and
    /// add it to its opportunity's document set.
    pub async fn write_document(&self, doc: &Document) -> CrawlResult<WriteOutcome> {
        require_system_id(RecordKind::Document, &doc.system_id)?;

        let resolved = self.dedup.resolve_document(doc).await?;
        let location = self.dedup.location();

        let mut item = Item::new();
        item.insert(
            ATTR_DOCUMENT_ID.to_string(),
            AttributeValue::S(resolved.document_id.clone()),
        );
        item.insert("Filename".to_string(), AttributeValue::S(doc.filename.clone()));
        item.insert(
            "ContentLength".to_string(),
            AttributeValue::N(doc.content_length().to_string()),
        );
        item.insert("BlobBucket".to_string(), AttributeValue::S(location.bucket.clone()));
        item.insert("BlobKey".to_string(), AttributeValue::S(resolved.blob_key.clone()));
        item.insert("BlobUrl".to_string(), AttributeValue::S(resolved.blob_url.clone()));
        insert_nonempty(&mut item, "ContentType", &doc.content_type);
        item.insert(
            "DocType".to_string(),
            AttributeValue::S(doc.doc_type.as_str().to_string()),
        );
        insert_nonempty(&mut item, "OriginalUrl", &doc.original_url);
        if let Some(date) = &doc.date {
            insert_nonempty(&mut item, "PostedDate", date);
        }

        let table = &self.tables.documents;
        if let Err(e) = self.kv.put_item(table, ATTR_DOCUMENT_ID, item, &[]).await {
            error!(
                "Failed to write document {} ({}) to table {}: {}",
                resolved.document_id, doc.filename, table, e
            );
            return Err(e.into());
        }

        self.link(&doc.system_id, ATTR_DOCUMENTS, &resolved.document_id)
            .await?;

        Ok(WriteOutcome {
            kind: RecordKind::Document,
            key: resolved.document_id,
            blob_uploaded: Some(resolved.uploaded),
        })
    }

    /// Set-union `id` into the opportunity's `attribute` set.
    async fn link(&self, system_id: &str, attribute: &str, id: &str) -> CrawlResult<()> {
        let table = &self.tables.opportunities;
        let key = ItemKey::new(ATTR_SYSTEM_ID, system_id);
        let values = BTreeSet::from([id.to_string()]);

        if let Err(e) = self.kv.add_to_set(table, &key, attribute, values).await {
            error!(
                "Failed to add {} to {} of opportunity {} in table {}: {}",
                id, attribute, system_id, table, e
            );
            return Err(e.into());
        }
        Ok(())
    }
}

fn require_system_id(kind: RecordKind, system_id: &str) -> CrawlResult<()> {
    if system_id.trim().is_empty() {
        return Err(CrawlError::RecordValidation {
            kind: kind.as_str(),
            message: "missing system_id".to_string(),
        });
    }
    Ok(())
}

fn insert_nonempty(item: &mut Item, attribute: &str, value: &str) {
    if !value.is_empty() {
        item.insert(attribute.to_string(), AttributeValue::S(value.to_string()));
    }
}

fn insert_set(item: &mut Item, attribute: &str, values: &BTreeSet<String>) {
    if !values.is_empty() {
        item.insert(attribute.to_string(), AttributeValue::SS(values.clone()));
    }
}

fn mismatched(expected: RecordKind, record: &Record) -> CrawlError {
    CrawlError::RecordValidation {
        kind: expected.as_str(),
        message: format!("handler received a {} record", record.kind()),
    }
}

fn handle_opportunity<'a>(
    writer: &'a RelationWriter,
    record: &'a Record,
) -> BoxFuture<'a, CrawlResult<WriteOutcome>> {
    async move {
        match record {
            Record::Opportunity(opp) => writer.write_opportunity(opp).await,
            other => Err(mismatched(RecordKind::Opportunity, other)),
        }
    }
    .boxed()
}

fn handle_vendor<'a>(
    writer: &'a RelationWriter,
    record: &'a Record,
) -> BoxFuture<'a, CrawlResult<WriteOutcome>> {
    async move {
        match record {
            Record::Vendor(vendor) => writer.write_vendor(vendor).await,
            other => Err(mismatched(RecordKind::Vendor, other)),
        }
    }
    .boxed()
}

fn handle_document<'a>(
    writer: &'a RelationWriter,
    record: &'a Record,
) -> BoxFuture<'a, CrawlResult<WriteOutcome>> {
    async move {
        match record {
            Record::Document(doc) => writer.write_document(doc).await,
            other => Err(mismatched(RecordKind::Document, other)),
        }
    }
    .boxed()
}
