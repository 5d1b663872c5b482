//! Navigation state machine for the WEBS portal.
//!
//! Each fetched page is interpreted by [`transition`], a pure function from
//! the step that requested it and the response to the follow-up visits and
//! extracted records. [`Navigator::run`] drives those transitions through a
//! breadth-first queue with one request in flight, handing records to a
//! writer task over a bounded channel.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use url::Url;

use super::extract::{self, DocumentLink};
use super::{
    FORM_ID, LOGIN_EMAIL_FIELD, LOGIN_PASSWORD_FIELD, LOGIN_PATH, SEARCH_ALL_FIELDS, SEARCH_PATH,
    SEARCH_RESULT_PATH, SUBMIT_BUTTON, VENDORS_BUTTON,
};
use crate::error::{CrawlError, CrawlResult};
use crate::models::{Document, Record};
use crate::scrapers::form::Form;
use crate::scrapers::http_client::{FetchedPage, Fetcher, PageRequest};
use crate::scrapers::page::Page;
use crate::services::RelationWriter;

/// Records buffered between the navigator and the writer task.
const RECORD_CHANNEL_CAPACITY: usize = 64;

/// Portal login.
#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"********")
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct NavigatorConfig {
    pub base_url: Url,
    pub credentials: Credentials,
    /// Highest listing page number to visit; `None` visits all of them.
    pub max_listing_pages: Option<u32>,
}

impl NavigatorConfig {
    fn allows_listing_page(&self, page: u32) -> bool {
        self.max_listing_pages.map_or(true, |max| page <= max)
    }
}

/// What a fetched page is expected to be, plus the context carried to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavStep {
    /// The login form, before credentials are submitted.
    LoginForm,
    /// Response to the credential submission.
    LoggingIn,
    /// The opportunity search form.
    SearchForm,
    /// Response to the search: listing page 1.
    SearchSubmitted,
    /// A listing page reached through the pager.
    ListingPage { page: u32 },
    DetailPage { listing_page: u32 },
    VendorPage {
        listing_page: u32,
        system_id: String,
        /// Only the first vendor page follows the vendor pager.
        first: bool,
    },
    DocumentFetch {
        listing_page: u32,
        system_id: String,
        link: DocumentLink,
    },
}

impl NavStep {
    pub fn name(&self) -> &'static str {
        match self {
            Self::LoginForm => "login form",
            Self::LoggingIn => "login",
            Self::SearchForm => "search form",
            Self::SearchSubmitted => "search result",
            Self::ListingPage { .. } => "listing page",
            Self::DetailPage { .. } => "detail page",
            Self::VendorPage { .. } => "vendor page",
            Self::DocumentFetch { .. } => "document",
        }
    }

    /// Steps that establish the session; any failure here ends the run.
    fn is_session(&self) -> bool {
        matches!(self, Self::LoginForm | Self::LoggingIn)
    }
}

/// A request to issue and how to interpret its response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Visit {
    pub request: PageRequest,
    pub step: NavStep,
}

impl Visit {
    pub fn new(request: PageRequest, step: NavStep) -> Self {
        Self { request, step }
    }
}

/// Output of one transition.
#[derive(Debug, Default)]
pub struct Transition {
    pub visits: Vec<Visit>,
    pub records: Vec<Record>,
}

/// Counters for one crawl run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CrawlSummary {
    pub listing_pages: usize,
    pub detail_pages: usize,
    pub vendor_pages: usize,
    pub documents_fetched: usize,
    pub records_written: usize,
    pub records_failed: usize,
    pub pages_skipped: usize,
    pub blobs_uploaded: usize,
    pub blobs_deduplicated: usize,
}

impl CrawlSummary {
    fn count_fetch(&mut self, step: &NavStep) {
        match step {
            NavStep::SearchSubmitted | NavStep::ListingPage { .. } => self.listing_pages += 1,
            NavStep::DetailPage { .. } => self.detail_pages += 1,
            NavStep::VendorPage { .. } => self.vendor_pages += 1,
            NavStep::DocumentFetch { .. } => self.documents_fetched += 1,
            _ => {}
        }
    }

    fn add_writes(&mut self, writes: &CrawlSummary) {
        self.records_written += writes.records_written;
        self.records_failed += writes.records_failed;
        self.blobs_uploaded += writes.blobs_uploaded;
        self.blobs_deduplicated += writes.blobs_deduplicated;
    }
}

impl fmt::Display for CrawlSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Listing pages:      {}", self.listing_pages)?;
        writeln!(f, "Detail pages:       {}", self.detail_pages)?;
        writeln!(f, "Vendor pages:       {}", self.vendor_pages)?;
        writeln!(f, "Documents fetched:  {}", self.documents_fetched)?;
        writeln!(f, "Records written:    {}", self.records_written)?;
        writeln!(f, "Records failed:     {}", self.records_failed)?;
        writeln!(f, "Pages skipped:      {}", self.pages_skipped)?;
        writeln!(f, "Blobs uploaded:     {}", self.blobs_uploaded)?;
        write!(f, "Blobs deduplicated: {}", self.blobs_deduplicated)
    }
}

/// Walks the portal and feeds what it finds to a [`RelationWriter`].
pub struct Navigator {
    fetcher: Arc<dyn Fetcher>,
    writer: Arc<RelationWriter>,
    config: NavigatorConfig,
}

impl Navigator {
    pub fn new(fetcher: Arc<dyn Fetcher>, writer: Arc<RelationWriter>, config: NavigatorConfig) -> Self {
        Self {
            fetcher,
            writer,
            config,
        }
    }

    /// The first visit of every run: the login page.
    pub fn start(&self) -> Visit {
        start(&self.config)
    }

    pub fn transition(&self, step: &NavStep, fetched: &FetchedPage) -> CrawlResult<Transition> {
        transition(&self.config, step, fetched)
    }

    /// Run one crawl pass.
    ///
    /// Returns an error when authentication fails or the record writer dies;
    /// every other failure is logged and counted in the summary.
    pub async fn run(&self) -> CrawlResult<CrawlSummary> {
        let (tx, rx) = mpsc::channel(RECORD_CHANNEL_CAPACITY);
        let writer = tokio::spawn(write_records(self.writer.clone(), rx));

        let mut summary = CrawlSummary::default();
        let result = self.navigate(tx, &mut summary).await;

        // The sender is gone once navigation returns, so the writer drains and exits.
        match writer.await {
            Ok(writes) => summary.add_writes(&writes),
            Err(e) => error!("Record writer task failed: {}", e),
        }

        result?;
        info!(
            "Crawl finished: {} listing pages, {} detail pages, {} records written, {} failed",
            summary.listing_pages, summary.detail_pages, summary.records_written, summary.records_failed
        );
        Ok(summary)
    }

    async fn navigate(&self, tx: mpsc::Sender<Record>, summary: &mut CrawlSummary) -> CrawlResult<()> {
        let mut queue: VecDeque<Visit> = VecDeque::new();
        queue.push_back(self.start());

        while let Some(visit) = queue.pop_front() {
            debug!(
                "Visiting {} {} ({}; {} queued)",
                visit.request.method.as_str(),
                visit.request.url,
                visit.step.name(),
                queue.len()
            );

            let fetched = match self.fetcher.fetch(&visit.request).await {
                Ok(fetched) => fetched,
                Err(e) if visit.step.is_session() => {
                    return Err(CrawlError::Authentication(format!(
                        "{} request to {} failed: {}",
                        visit.step.name(),
                        visit.request.url,
                        e
                    )));
                }
                Err(e) => {
                    warn!(
                        "Skipping {} {}: {}",
                        visit.step.name(),
                        visit.request.url,
                        e
                    );
                    summary.pages_skipped += 1;
                    continue;
                }
            };
            summary.count_fetch(&visit.step);

            let transition = match self.transition(&visit.step, &fetched) {
                Ok(transition) => transition,
                Err(e) if e.is_fatal() => {
                    error!("{}", e);
                    return Err(e);
                }
                Err(e) => {
                    error!("Skipping {} {}: {}", visit.step.name(), fetched.url, e);
                    summary.pages_skipped += 1;
                    continue;
                }
            };

            for record in transition.records {
                if tx.send(record).await.is_err() {
                    error!("Record writer stopped; abandoning crawl at {}", fetched.url);
                    return Err(CrawlError::WriterStopped);
                }
            }
            queue.extend(transition.visits);
        }

        Ok(())
    }
}

async fn write_records(writer: Arc<RelationWriter>, mut rx: mpsc::Receiver<Record>) -> CrawlSummary {
    let mut writes = CrawlSummary::default();
    while let Some(record) = rx.recv().await {
        match writer.process(&record).await {
            Ok(outcome) => {
                writes.records_written += 1;
                match outcome.blob_uploaded {
                    Some(true) => writes.blobs_uploaded += 1,
                    Some(false) => writes.blobs_deduplicated += 1,
                    None => {}
                }
            }
            Err(e) => {
                error!(
                    "Failed to write {} record for opportunity {}: {}",
                    record.kind(),
                    record.system_id(),
                    e
                );
                writes.records_failed += 1;
            }
        }
    }
    writes
}

pub fn start(config: &NavigatorConfig) -> Visit {
    let url = join(&config.base_url, LOGIN_PATH);
    Visit::new(PageRequest::get(url), NavStep::LoginForm)
}

/// Interpret a fetched page.
pub fn transition(
    config: &NavigatorConfig,
    step: &NavStep,
    fetched: &FetchedPage,
) -> CrawlResult<Transition> {
    if let NavStep::DocumentFetch {
        listing_page,
        system_id,
        link,
    } = step
    {
        info!(
            "Opportunity document (listing page {}, system_id {}): {}",
            listing_page, system_id, fetched.url
        );
        return Ok(Transition {
            visits: Vec::new(),
            records: vec![Record::Document(document(system_id, link, fetched))],
        });
    }

    let url = Url::parse(&fetched.url)
        .map_err(|e| CrawlError::navigation(&fetched.url, format!("invalid final URL: {e}")))?;
    let page = Page::parse(url, &fetched.text());

    match step {
        NavStep::LoginForm => {
            let mut form = Form::from_page(&page, FORM_ID).map_err(|e| {
                CrawlError::Authentication(format!("no login form on {}: {}", page.url(), e))
            })?;
            form.set(LOGIN_EMAIL_FIELD, config.credentials.username.as_str());
            form.set(LOGIN_PASSWORD_FIELD, config.credentials.password.as_str());
            click(&mut form, SUBMIT_BUTTON, "33", "1");
            Ok(visits(vec![Visit::new(form.to_request(), NavStep::LoggingIn)]))
        }
        NavStep::LoggingIn => {
            if page.url().path().ends_with(LOGIN_PATH) {
                return Err(CrawlError::Authentication(format!(
                    "still on the login page after submitting credentials: {}",
                    page.url()
                )));
            }
            info!("Logged in successfully; final URL: {}", page.url());
            let search = join(page.url(), SEARCH_PATH);
            Ok(visits(vec![Visit::new(PageRequest::get(search), NavStep::SearchForm)]))
        }
        NavStep::SearchForm => {
            let mut form = page_form(&page)?;
            for (name, value) in SEARCH_ALL_FIELDS {
                form.set(name, *value);
            }
            click(&mut form, SUBMIT_BUTTON, "30", "3");
            Ok(visits(vec![Visit::new(form.to_request(), NavStep::SearchSubmitted)]))
        }
        NavStep::SearchSubmitted => {
            if !page.url().path().ends_with(SEARCH_RESULT_PATH) {
                return Err(CrawlError::navigation(
                    page.url().as_str(),
                    "search did not reach the search result page",
                ));
            }
            let mut next = listing(&page, 1);

            let form = match Form::from_page(&page, FORM_ID) {
                Ok(form) => form,
                Err(e) => {
                    warn!("Cannot page listings on {}: {}", page.url(), e);
                    return Ok(next);
                }
            };
            let mut listing_page = 1;
            for pager_form in extract::listing_pager(&page, &form) {
                listing_page += 1;
                if !config.allows_listing_page(listing_page) {
                    debug!("Not following listing page {} (limit reached)", listing_page);
                    continue;
                }
                next.visits.push(Visit::new(
                    pager_form.to_request(),
                    NavStep::ListingPage { page: listing_page },
                ));
            }
            Ok(next)
        }
        NavStep::ListingPage { page: n } => Ok(listing(&page, *n)),
        NavStep::DetailPage { listing_page } => detail(&page, *listing_page),
        NavStep::VendorPage {
            listing_page,
            system_id,
            first,
        } => Ok(vendor_page(&page, *listing_page, system_id, *first)),
        NavStep::DocumentFetch { .. } => Ok(Transition::default()),
    }
}

fn visits(visits: Vec<Visit>) -> Transition {
    Transition {
        visits,
        records: Vec::new(),
    }
}

fn listing(page: &Page, listing_page: u32) -> Transition {
    info!("Opportunity listing page {}: {}", listing_page, page.url());
    let visits = extract::listing_detail_links(page)
        .into_iter()
        .map(|url| Visit::new(PageRequest::get(url), NavStep::DetailPage { listing_page }))
        .collect();
    Transition {
        visits,
        records: Vec::new(),
    }
}

fn detail(page: &Page, listing_page: u32) -> CrawlResult<Transition> {
    info!(
        "Opportunity detail page (listing page {}): {}",
        listing_page,
        page.url()
    );
    let opp = extract::opportunity(page)?;
    let system_id = opp.system_id.clone();
    let mut next = Transition {
        visits: Vec::new(),
        records: vec![Record::Opportunity(opp)],
    };

    for link in extract::document_links(page) {
        next.visits.push(Visit::new(
            PageRequest::get(link.url.clone()),
            NavStep::DocumentFetch {
                listing_page,
                system_id: system_id.clone(),
                link,
            },
        ));
    }

    match Form::from_page(page, FORM_ID) {
        Ok(mut form) => match form.click_image(VENDORS_BUTTON, "0", "0") {
            Ok(()) => next.visits.push(Visit::new(
                form.to_request(),
                NavStep::VendorPage {
                    listing_page,
                    system_id,
                    first: true,
                },
            )),
            Err(e) => warn!("No vendor list for {} on {}: {}", system_id, page.url(), e),
        },
        Err(e) => warn!("No vendor list for {} on {}: {}", system_id, page.url(), e),
    }

    Ok(next)
}

fn vendor_page(page: &Page, listing_page: u32, carried_id: &str, first: bool) -> Transition {
    info!(
        "Opportunity vendors (listing page {}): {}",
        listing_page,
        page.url()
    );
    let system_id = extract::system_id(page).unwrap_or_else(|| carried_id.to_string());
    let records = extract::vendors(page, &system_id)
        .into_iter()
        .map(Record::Vendor)
        .collect();

    let mut visits = Vec::new();
    if first {
        match Form::from_page(page, FORM_ID) {
            Ok(form) => {
                for pager_form in extract::vendor_pager(page, &form) {
                    visits.push(Visit::new(
                        pager_form.to_request(),
                        NavStep::VendorPage {
                            listing_page,
                            system_id: system_id.clone(),
                            first: false,
                        },
                    ));
                }
            }
            Err(e) => warn!("Cannot page vendors of {} on {}: {}", system_id, page.url(), e),
        }
    }

    Transition { visits, records }
}

fn document(system_id: &str, link: &DocumentLink, fetched: &FetchedPage) -> Document {
    let filename = link
        .filename
        .clone()
        .or_else(|| fetched.content_disposition_filename())
        .or_else(|| filename_from_url(&fetched.url))
        .unwrap_or_else(|| "document".to_string());

    Document {
        system_id: system_id.to_string(),
        doc_type: link.doc_type,
        filename,
        date: link.date.clone(),
        original_url: fetched.url.clone(),
        contents: fetched.body.clone(),
        content_type: fetched.content_type().unwrap_or_default().to_string(),
    }
}

fn filename_from_url(url: &str) -> Option<String> {
    let url = Url::parse(url).ok()?;
    url.path_segments()?
        .next_back()
        .filter(|segment| !segment.is_empty())
        .map(|segment| {
            urlencoding::decode(segment)
                .map(|s| s.into_owned())
                .unwrap_or_else(|_| segment.to_string())
        })
}

fn page_form(page: &Page) -> CrawlResult<Form> {
    Form::from_page(page, FORM_ID).map_err(|e| CrawlError::navigation(page.url().as_str(), e.to_string()))
}

/// Submit through an image button, whether or not the form declares it.
fn click(form: &mut Form, button: &str, x: &str, y: &str) {
    if form.click_image(button, x, y).is_err() {
        form.set(&format!("{button}.x"), x);
        form.set(&format!("{button}.y"), y);
    }
}

fn join(base: &Url, path: &str) -> String {
    base.join(path)
        .map(|u| u.to_string())
        .unwrap_or_else(|_| format!("{}{}", base.as_str().trim_end_matches('/'), path))
}
