//! `crawl` command.

use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use crate::config::{Settings, TableNames};
use crate::scrapers::{Credentials, HttpClient, Navigator, NavigatorConfig};
use crate::services::{DedupEngine, RelationWriter};
use crate::storage::{FsBlobStore, FsKvStore};

pub async fn cmd_crawl(settings: &Settings, max_listing_pages: Option<u32>) -> anyhow::Result<()> {
    let location = settings.documents_location()?;
    let base_url = settings.base_url()?;
    let credentials = match (&settings.username, &settings.password) {
        (Some(username), Some(password)) => Credentials {
            username: username.clone(),
            password: password.clone(),
        },
        _ => anyhow::bail!("Portal credentials missing: set WEBS_USERNAME and WEBS_PASSWORD"),
    };

    let kv = Arc::new(FsKvStore::new(settings.data_dir.join("kv")));
    let blobs = Arc::new(FsBlobStore::new(settings.data_dir.join("blobs")));
    let tables = TableNames::with_prefix(&settings.table_prefix);
    info!(
        "Writing to tables {}, {}, {} and blobs under {}",
        tables.opportunities,
        tables.vendors,
        tables.documents,
        location.url_for(&location.prefix)
    );

    let writer = Arc::new(RelationWriter::new(kv, DedupEngine::new(blobs, location), tables));
    let client = HttpClient::new(
        Some(&settings.user_agent),
        settings.request_timeout(),
        settings.request_delay(),
    )
    .context("Failed to create HTTP client")?;

    let navigator = Navigator::new(
        Arc::new(client),
        writer,
        NavigatorConfig {
            base_url,
            credentials,
            max_listing_pages,
        },
    );
    let summary = navigator.run().await?;

    println!("{summary}");
    Ok(())
}
