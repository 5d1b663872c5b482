//! Vendor model.

use serde::{Deserialize, Serialize};

/// A vendor that downloaded an opportunity's bid package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vendor {
    /// Opportunity this vendor was listed on.
    pub system_id: String,
    pub company_name: String,
    pub email: String,
    pub phone: String,
    /// Status codes, always sorted.
    pub status: Vec<String>,
}

impl Vendor {
    /// Create a vendor, normalizing the status code order.
    pub fn new(
        system_id: impl Into<String>,
        company_name: impl Into<String>,
        email: impl Into<String>,
        phone: impl Into<String>,
        mut status: Vec<String>,
    ) -> Self {
        status.sort();
        Self {
            system_id: system_id.into(),
            company_name: company_name.into(),
            email: email.into(),
            phone: phone.into(),
            status,
        }
    }
}

/// Split a raw status cell such as `"B - C - A"` into sorted codes.
pub fn parse_status_codes(raw: &str) -> Vec<String> {
    let mut codes: Vec<String> = raw
        .trim()
        .split('-')
        .map(|code| code.trim().to_string())
        .collect();
    codes.sort();
    codes
}
