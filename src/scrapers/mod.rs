//! Portal scraping: transport, page and form helpers, and the WEBS crawler.

pub mod form;
mod http_client;
pub mod page;
pub mod webs;

pub use form::{Form, FormError, PostBack};
pub use http_client::{
    parse_content_disposition_filename, resolve_user_agent, FetchError, FetchedPage, Fetcher,
    HttpClient, Method, PageRequest, USER_AGENT,
};
pub use page::Page;
pub use webs::{CrawlSummary, Credentials, NavStep, Navigator, NavigatorConfig};
