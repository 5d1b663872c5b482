//! Bid opportunity model.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Scalar fields of an opportunity detail page.
///
/// Each field knows the element it is read from and the attribute name it is
/// stored under, so extraction and persistence share one table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpportunityField {
    CustomerRefNum,
    OrgName,
    Title,
    Description,
    DatePosted,
    DateClosed,
    EstimatedValue,
    ContactName,
    ContactPhone,
    ContactEmail,
}

impl OpportunityField {
    pub const ALL: [OpportunityField; 10] = [
        Self::CustomerRefNum,
        Self::OrgName,
        Self::Title,
        Self::Description,
        Self::DatePosted,
        Self::DateClosed,
        Self::EstimatedValue,
        Self::ContactName,
        Self::ContactPhone,
        Self::ContactEmail,
    ];

    /// Selector for the span holding this field on the detail page.
    pub fn selector(&self) -> &'static str {
        match self {
            Self::CustomerRefNum => "span#txtReferenceNumber",
            Self::OrgName => "span#txtOrgName",
            Self::Title => "span#txtTitle",
            Self::Description => "span#txtDescription",
            Self::DatePosted => "span#txtActiveDate",
            Self::DateClosed => "span#txtInactiveDate",
            Self::EstimatedValue => "span#txtEstimatedValue",
            Self::ContactName => "span#txtContactName",
            Self::ContactPhone => "span#txtContactPhone",
            Self::ContactEmail => "span#txtEmail",
        }
    }

    /// Attribute name in the opportunities table.
    pub fn attribute(&self) -> &'static str {
        match self {
            Self::CustomerRefNum => "CustomerRefNum",
            Self::OrgName => "OrgName",
            Self::Title => "Title",
            Self::Description => "Description",
            Self::DatePosted => "DatePosted",
            Self::DateClosed => "DateClosed",
            Self::EstimatedValue => "EstimatedValue",
            Self::ContactName => "ContactName",
            Self::ContactPhone => "ContactPhone",
            Self::ContactEmail => "ContactEmail",
        }
    }
}

/// A bid opportunity as shown on its detail page.
///
/// Optional fields stay `None` when the page does not carry them; they are
/// left out of the stored item rather than written empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Opportunity {
    /// Portal-assigned identifier; the table key.
    pub system_id: String,
    pub customer_ref_num: Option<String>,
    pub org_name: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub date_posted: Option<String>,
    pub date_closed: Option<String>,
    pub estimated_value: Option<String>,
    pub contact_name: Option<String>,
    pub contact_phone: Option<String>,
    pub contact_email: Option<String>,
    pub commodity_codes: BTreeSet<String>,
    pub counties: BTreeSet<String>,
}

impl Opportunity {
    pub fn new(system_id: impl Into<String>) -> Self {
        Self {
            system_id: system_id.into(),
            ..Default::default()
        }
    }

    pub fn get(&self, field: OpportunityField) -> Option<&str> {
        let value = match field {
            OpportunityField::CustomerRefNum => &self.customer_ref_num,
            OpportunityField::OrgName => &self.org_name,
            OpportunityField::Title => &self.title,
            OpportunityField::Description => &self.description,
            OpportunityField::DatePosted => &self.date_posted,
            OpportunityField::DateClosed => &self.date_closed,
            OpportunityField::EstimatedValue => &self.estimated_value,
            OpportunityField::ContactName => &self.contact_name,
            OpportunityField::ContactPhone => &self.contact_phone,
            OpportunityField::ContactEmail => &self.contact_email,
        };
        value.as_deref()
    }

    /// Set a scalar field. Blank values are treated as absent.
    pub fn set(&mut self, field: OpportunityField, value: Option<String>) {
        let value = value.filter(|v| !v.is_empty());
        let slot = match field {
            OpportunityField::CustomerRefNum => &mut self.customer_ref_num,
            OpportunityField::OrgName => &mut self.org_name,
            OpportunityField::Title => &mut self.title,
            OpportunityField::Description => &mut self.description,
            OpportunityField::DatePosted => &mut self.date_posted,
            OpportunityField::DateClosed => &mut self.date_closed,
            OpportunityField::EstimatedValue => &mut self.estimated_value,
            OpportunityField::ContactName => &mut self.contact_name,
            OpportunityField::ContactPhone => &mut self.contact_phone,
            OpportunityField::ContactEmail => &mut self.contact_email,
        };
        *slot = value;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_blank_is_absent() {
        let mut opp = Opportunity::new("ABC123");
        opp.set(OpportunityField::Title, Some(String::new()));
        assert_eq!(opp.get(OpportunityField::Title), None);

        opp.set(OpportunityField::Title, Some("Road paving".to_string()));
        assert_eq!(opp.get(OpportunityField::Title), Some("Road paving"));
    }

    #[test]
    fn test_field_attributes_unique() {
        let mut attrs: Vec<&str> = OpportunityField::ALL.iter().map(|f| f.attribute()).collect();
        attrs.sort();
        attrs.dedup();
        assert_eq!(attrs.len(), OpportunityField::ALL.len());
    }
}
