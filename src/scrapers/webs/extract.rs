//! Field extraction for WEBS pages.
//!
//! Everything here is a pure function of a parsed [`Page`]; skipped rows and
//! links are logged with enough context to find them again.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use scraper::{ElementRef, Node, Selector};
use tracing::{error, warn};

use super::super::form::{Form, PostBack};
use super::super::page::{direct_texts, element_text, Page};
use crate::error::{CrawlError, CrawlResult};
use crate::models::{parse_status_codes, DocType, Opportunity, OpportunityField, Vendor};

fn selector(css: &str) -> Selector {
    Selector::parse(css).unwrap()
}

static LISTING_LINKS: LazyLock<Selector> = LazyLock::new(|| {
    selector("tr.Grid3File1 a.ctext-hyperlink, tr.Grid3File2 a.ctext-hyperlink")
});
static LISTING_PAGER: LazyLock<Selector> = LazyLock::new(|| selector("tr.Grid3Pager a"));
static VENDOR_PAGER: LazyLock<Selector> = LazyLock::new(|| selector("tr.GridPager a"));
static SYSTEM_ID: LazyLock<Selector> = LazyLock::new(|| selector("span#txtSystemIdentifier"));
static COMMODITY_CODES: LazyLock<Selector> = LazyLock::new(|| selector("span#labelCommCodes"));
static COUNTIES: LazyLock<Selector> = LazyLock::new(|| selector("span#labelCounties"));
static FIELDS: LazyLock<Vec<(OpportunityField, Selector)>> = LazyLock::new(|| {
    OpportunityField::ALL
        .iter()
        .map(|field| (*field, selector(field.selector())))
        .collect()
});
static DOCUMENT_LINKS: LazyLock<Selector> =
    LazyLock::new(|| selector("table#dataGridBidDocuments tr.GridFile1 td a"));
static AMENDMENT_ROWS: LazyLock<Selector> = LazyLock::new(|| {
    selector("table#dataGridBidAmendments tr.GridFile1 td table tr.GridFile1")
});
static AMENDMENT_DATE: LazyLock<Selector> = LazyLock::new(|| selector("td:first-child span.ctext"));
static ANCHOR: LazyLock<Selector> = LazyLock::new(|| selector("a"));
static SECTION_HEADERS: LazyLock<Selector> =
    LazyLock::new(|| selector("table#Table4 tr > td.header"));
static VENDOR_ROWS: LazyLock<Selector> = LazyLock::new(|| selector("table.ctext tr.GridFile1"));
static CELL: LazyLock<Selector> = LazyLock::new(|| selector("td"));

const VENDOR_SECTION_TITLE: &str = "Vendors Downloading";
const VENDOR_CELLS: usize = 4;

/// A document or amendment link found on a detail page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentLink {
    pub doc_type: DocType,
    /// Link text; may be missing, in which case the response names the file.
    pub filename: Option<String>,
    pub url: String,
    pub date: Option<String>,
}

/// Absolute URLs of the opportunity detail pages on a listing page.
pub fn listing_detail_links(page: &Page) -> Vec<String> {
    let mut links = Vec::new();
    for href in page.attrs(&LISTING_LINKS, "href") {
        match page.resolve(&href) {
            Some(url) => links.push(url.to_string()),
            None => warn!("Skipping unresolvable detail link {:?} on {}", href, page.url()),
        }
    }
    links
}

/// Post-back submissions for the listing pager on `page`.
pub fn listing_pager(page: &Page, form: &Form) -> Vec<Form> {
    pager_forms(page, form, &LISTING_PAGER)
}

/// Post-back submissions for the vendor pager on `page`.
pub fn vendor_pager(page: &Page, form: &Form) -> Vec<Form> {
    pager_forms(page, form, &VENDOR_PAGER)
}

fn pager_forms(page: &Page, form: &Form, pager: &Selector) -> Vec<Form> {
    page.attrs(pager, "href")
        .into_iter()
        .filter_map(|href| match PostBack::parse(&href) {
            Some(postback) => Some(postback.apply(form)),
            None => {
                error!("Failed to parse __doPostBack link {:?} on {}", href, page.url());
                None
            }
        })
        .collect()
}

/// The `system_id` shown on a detail or vendor page.
pub fn system_id(page: &Page) -> Option<String> {
    page.first_text(&SYSTEM_ID)
}

/// Scalar fields, commodity codes and counties of a detail page.
pub fn opportunity(page: &Page) -> CrawlResult<Opportunity> {
    let system_id = system_id(page).ok_or_else(|| CrawlError::RecordValidation {
        kind: "opportunity",
        message: format!("no txtSystemIdentifier on {}", page.url()),
    })?;

    let mut opp = Opportunity::new(system_id);
    for (field, sel) in FIELDS.iter() {
        opp.set(*field, page.first_text(sel));
    }

    // One code per line; the lines are separated by <br>.
    opp.commodity_codes = page.all_texts(&COMMODITY_CODES).into_iter().collect();
    opp.counties = page
        .first_text(&COUNTIES)
        .map(|text| split_counties(&text))
        .unwrap_or_default();

    Ok(opp)
}

fn split_counties(text: &str) -> BTreeSet<String> {
    text.split(',')
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_string)
        .collect()
}

/// Document and amendment links on a detail page.
pub fn document_links(page: &Page) -> Vec<DocumentLink> {
    let mut links = Vec::new();

    for a in page.select(&DOCUMENT_LINKS) {
        if let Some(link) = document_link(page, a, DocType::Document, None) {
            links.push(link);
        }
    }

    for row in page.select(&AMENDMENT_ROWS) {
        let date = row
            .select(&AMENDMENT_DATE)
            .next()
            .and_then(|span| direct_texts(span).into_iter().next());
        match row.select(&ANCHOR).next() {
            Some(a) => {
                if let Some(link) = document_link(page, a, DocType::Amendment, date) {
                    links.push(link);
                }
            }
            None => warn!("Amendment row without a link on {}", page.url()),
        }
    }

    links
}

fn document_link(
    page: &Page,
    a: ElementRef<'_>,
    doc_type: DocType,
    date: Option<String>,
) -> Option<DocumentLink> {
    let Some(href) = a.value().attr("href") else {
        warn!("Skipping {} link without href on {}", doc_type.as_str(), page.url());
        return None;
    };
    let Some(url) = page.resolve(href) else {
        warn!("Skipping unresolvable {} link {:?} on {}", doc_type.as_str(), href, page.url());
        return None;
    };
    let filename = Some(element_text(a)).filter(|name| !name.is_empty());

    Some(DocumentLink {
        doc_type,
        filename,
        url: url.to_string(),
        date,
    })
}

/// Vendor rows from the "Vendors Downloading" section of a vendor page.
///
/// Rows that do not have exactly four cells are logged and dropped.
pub fn vendors(page: &Page, system_id: &str) -> Vec<Vendor> {
    let Some(section) = vendor_section(page) else {
        return Vec::new();
    };

    let mut vendors = Vec::new();
    for row in section.select(&VENDOR_ROWS) {
        let cells: Vec<String> = row.select(&CELL).flat_map(cell_texts).collect();
        if cells.len() != VENDOR_CELLS {
            error!(
                "Failed to parse vendor row on {}: got {} parts, expected {}: {}",
                page.url(),
                cells.len(),
                VENDOR_CELLS,
                row.html()
            );
            continue;
        }

        vendors.push(Vendor::new(
            system_id,
            cells[0].as_str(),
            cells[1].as_str(),
            cells[2].as_str(),
            parse_status_codes(&cells[3]),
        ));
    }
    vendors
}

/// The table row following the "Vendors Downloading" header.
///
/// The header row is the one that directly holds the header cell, so an
/// outer layout row wrapping a nested table is never taken for it.
fn vendor_section(page: &Page) -> Option<ElementRef<'_>> {
    let header = page
        .select(&SECTION_HEADERS)
        .find(|cell| element_text(*cell).contains(VENDOR_SECTION_TITLE))?;
    let header_row = header.parent().and_then(ElementRef::wrap)?;
    header_row.next_siblings().find_map(ElementRef::wrap)
}

/// Every text node directly inside a cell, trimmed but kept when blank.
fn cell_texts(td: ElementRef<'_>) -> Vec<String> {
    td.children()
        .filter_map(|child| match child.value() {
            Node::Text(text) => Some(text.trim().to_string()),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use url::Url;

    fn page(body: &str) -> Page {
        Page::parse(
            Url::parse("https://portal.test/Search_Bid_Detail.aspx?ID=1").unwrap(),
            body,
        )
    }

    const DETAIL: &str = r#"
        <html><body><form id="Form1" method="post" action="Search_Bid_Detail.aspx?ID=1">
        <span id="txtSystemIdentifier">ABC123</span>
        <span id="txtReferenceNumber">RFP-77</span>
        <span id="txtTitle">Road salt</span>
        <span id="txtDescription">Line one<br>Line two</span>
        <span id="txtInactiveDate"></span>
        <span id="labelCommCodes">100-01<br> 200-02 <br></span>
        <span id="labelCounties">King, Pierce,, </span>
        <table id="dataGridBidDocuments">
          <tr class="GridFile1"><td><a href="Doc.aspx?f=1">spec.pdf</a></td></tr>
          <tr class="GridFile1"><td><a href="Doc.aspx?f=2"></a></td></tr>
          <tr class="GridFile1"><td><a>nohref.pdf</a></td></tr>
        </table>
        <table id="dataGridBidAmendments">
          <tr class="GridFile1"><td><table>
            <tr class="GridFile1">
              <td><span class="ctext">01/02/2024</span></td>
              <td><a href="Amend.aspx?f=9">addendum-1.pdf</a></td>
            </tr>
          </table></td></tr>
        </table>
        </form></body></html>"#;

    #[test]
    fn test_opportunity_fields() {
        let opp = opportunity(&page(DETAIL)).unwrap();
        assert_eq!(opp.system_id, "ABC123");
        assert_eq!(opp.customer_ref_num.as_deref(), Some("RFP-77"));
        assert_eq!(opp.title.as_deref(), Some("Road salt"));
        assert_eq!(opp.description.as_deref(), Some("Line one\nLine two"));
        assert_eq!(opp.date_closed, None);
        assert_eq!(opp.org_name, None);
        assert_eq!(
            opp.commodity_codes.into_iter().collect::<Vec<_>>(),
            vec!["100-01", "200-02"]
        );
        assert_eq!(
            opp.counties.into_iter().collect::<Vec<_>>(),
            vec!["King", "Pierce"]
        );
    }

    #[test]
    fn test_opportunity_requires_system_id() {
        let err = opportunity(&page("<span id='txtTitle'>x</span>")).unwrap_err();
        assert!(matches!(err, CrawlError::RecordValidation { .. }));
    }

    #[test]
    fn test_document_links() {
        let links = document_links(&page(DETAIL));
        assert_eq!(links.len(), 3);

        assert_eq!(links[0].doc_type, DocType::Document);
        assert_eq!(links[0].filename.as_deref(), Some("spec.pdf"));
        assert_eq!(links[0].url, "https://portal.test/Doc.aspx?f=1");
        assert_eq!(links[1].filename, None);

        assert_eq!(links[2].doc_type, DocType::Amendment);
        assert_eq!(links[2].filename.as_deref(), Some("addendum-1.pdf"));
        assert_eq!(links[2].date.as_deref(), Some("01/02/2024"));
    }

    #[test]
    fn test_listing_links_and_pager() {
        let body = r#"
            <form id="Form1" method="post" action="Search_Bid_Result.aspx">
              <input type="hidden" name="__EVENTTARGET" value="" />
              <input type="hidden" name="__EVENTARGUMENT" value="" />
            </form>
            <table>
              <tr class="Grid3File1"><td><a class="ctext-hyperlink" href="Detail.aspx?ID=1">1</a></td></tr>
              <tr class="Grid3File2"><td><a class="ctext-hyperlink" href="Detail.aspx?ID=2">2</a></td></tr>
              <tr class="Grid3File1"><td><a href="Other.aspx">not a detail link</a></td></tr>
              <tr class="Grid3Pager"><td>
                <span>1</span>
                <a href="javascript:__doPostBack('DataGrid1$_ctl54$_ctl1','')">2</a>
                <a href="javascript:void(0)">broken</a>
                <a href="javascript:__doPostBack('DataGrid1$_ctl54$_ctl2','')">3</a>
              </td></tr>
            </table>"#;
        let p = page(body);
        assert_eq!(
            listing_detail_links(&p),
            vec![
                "https://portal.test/Detail.aspx?ID=1",
                "https://portal.test/Detail.aspx?ID=2"
            ]
        );

        let form = Form::from_page(&p, "Form1").unwrap();
        let pages = listing_pager(&p, &form);
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].get("__EVENTTARGET"), Some("DataGrid1$_ctl54$_ctl1"));
        assert_eq!(pages[1].get("__EVENTTARGET"), Some("DataGrid1$_ctl54$_ctl2"));
    }

    const VENDORS: &str = r#"
        <table id="Table4">
          <tr><td class="header">Bid Documents</td></tr>
          <tr><td class="header">Vendors Downloading Documents</td></tr>
          <tr><td>
            <table class="ctext">
              <tr class="GridHeader"><td>Company</td><td>Email</td><td>Phone</td><td>Status</td></tr>
              <tr class="GridFile1"><td>Acme Corp</td><td>bids@acme.test</td><td>555-0100</td><td>B - C - A</td></tr>
              <tr class="GridFile1"><td>Short Row</td><td>x@y.test</td><td>555-0101</td></tr>
              <tr class="GridFile1"><td> Widgets </td><td>w@w.test</td><td>555-0102</td><td>MWBE</td></tr>
            </table>
          </td></tr>
        </table>"#;

    #[test]
    fn test_vendors_drop_short_rows() {
        let vendors = vendors(&page(VENDORS), "ABC123");
        assert_eq!(vendors.len(), 2);
        assert_eq!(vendors[0].system_id, "ABC123");
        assert_eq!(vendors[0].company_name, "Acme Corp");
        assert_eq!(vendors[0].email, "bids@acme.test");
        assert_eq!(vendors[0].phone, "555-0100");
        assert_eq!(vendors[0].status, vec!["A", "B", "C"]);
        assert_eq!(vendors[1].company_name, "Widgets");
    }

    #[test]
    fn test_vendors_section_inside_nested_table() {
        let html = r#"
            <table id="Table4">
              <tr><td>
                <table>
                  <tr><td class="header">Vendors Downloading Documents</td></tr>
                  <tr><td><table class="ctext">
                    <tr class="GridFile1"><td>Acme</td><td>a@acme.test</td><td>555</td><td>MBE</td></tr>
                  </table></td></tr>
                </table>
              </td></tr>
              <tr><td><table class="ctext">
                <tr class="GridFile1"><td>Wrong</td><td>w@wrong.test</td><td>0</td><td>WBE</td></tr>
              </table></td></tr>
            </table>
        "#;
        let found: Vec<String> = vendors(&page(html), "ABC123")
            .into_iter()
            .map(|v| v.company_name)
            .collect();
        assert_eq!(found, vec!["Acme".to_string()]);
    }

    #[test]
    fn test_vendors_without_section() {
        assert!(vendors(&page("<table id='Table4'></table>"), "X").is_empty());
    }
}
