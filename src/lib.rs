//! Crawler for the WEBS government bid portal.
//!
//! Walks the portal's listing, detail and vendor pages, extracts
//! opportunities, vendors and documents, and stores them with deterministic
//! identities so that repeated crawls only ever converge.

pub mod cli;
pub mod config;
pub mod error;
pub mod models;
pub mod scrapers;
pub mod services;
pub mod storage;

pub use config::{DocumentsLocation, Settings, TableNames};
pub use error::{CrawlError, CrawlResult};
