//! Crawler for the Washington State WEBS vendor portal.
//!
//! The portal is an ASP.NET WebForms site: every view change is a post-back
//! of `Form1`, and the session cookie plus view state tie each request to
//! the page rendered just before it.

pub mod extract;
mod navigator;

pub use extract::DocumentLink;
pub use navigator::{CrawlSummary, Credentials, NavStep, Navigator, NavigatorConfig, Transition, Visit};

pub const LOGIN_PATH: &str = "/LoginPage.aspx";
pub const SEARCH_PATH: &str = "/Search_Bid.aspx";
pub const SEARCH_RESULT_PATH: &str = "/Search_Bid_Result.aspx";
pub const FORM_ID: &str = "Form1";

pub const LOGIN_EMAIL_FIELD: &str = "txtEmail";
pub const LOGIN_PASSWORD_FIELD: &str = "txtPassword";
pub const SUBMIT_BUTTON: &str = "Image1";
pub const VENDORS_BUTTON: &str = "Imagebutton1";

/// Search criteria: all commodity codes, all counties, all organizations.
pub const SEARCH_ALL_FIELDS: &[(&str, &str)] = &[
    ("radCommCodes", "1"),
    ("radCounties", "1"),
    ("ddlOrgName", "0"),
    ("textBoxBidCustRefNum", ""),
];
