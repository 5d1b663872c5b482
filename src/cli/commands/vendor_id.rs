//! `vendor-id` command.

use crate::models::{parse_status_codes, Vendor};
use crate::services::vendor_id;

pub fn cmd_vendor_id(company: &str, email: &str, phone: &str, status: &str) -> anyhow::Result<()> {
    println!("{}", raw_vendor_id(company, email, phone, status));
    Ok(())
}

/// Identity of a vendor row given as the portal shows it.
///
/// The status cell goes through the same parsing as a crawled row, so a
/// blank status yields one empty code rather than none.
fn raw_vendor_id(company: &str, email: &str, phone: &str, status: &str) -> String {
    let vendor = Vendor::new("", company, email, phone, parse_status_codes(status));
    vendor_id(&vendor)
}
