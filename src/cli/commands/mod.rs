//! CLI parser and command dispatch.

mod config_cmd;
mod crawl;
mod vendor_id;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::{Settings, SettingsOverrides};

#[derive(Parser)]
#[command(name = "govscout")]
#[command(about = "Crawl the WEBS bid portal into key-value and blob stores")]
#[command(version)]
pub struct Cli {
    /// Config file path (defaults to the first govscout.toml found)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Portal root URL
    #[arg(long, global = true, env = "WEBS_BASE_URL")]
    base_url: Option<String>,

    /// Portal login email
    #[arg(long, global = true, env = "WEBS_USERNAME")]
    username: Option<String>,

    /// Portal password
    #[arg(long, global = true, env = "WEBS_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Blob location, `<scheme>://<bucket>[/<prefix>]`
    #[arg(long, global = true, env = "WEBS_DOCUMENTS_URL")]
    documents_url: Option<String>,

    /// Prefix for the Opportunities, Vendors and Documents tables
    #[arg(long, global = true, env = "DYNAMODB_TABLE_PREFIX")]
    table_prefix: Option<String>,

    #[arg(long, global = true, env = "AWS_REGION")]
    region: Option<String>,

    /// Delay after each request, in milliseconds
    #[arg(long, global = true, env = "WEBS_REQUEST_DELAY_MS")]
    request_delay_ms: Option<u64>,

    /// Root directory for the local stores
    #[arg(long, global = true, env = "GOVSCOUT_DATA_DIR")]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    fn overrides(&self) -> SettingsOverrides {
        SettingsOverrides {
            base_url: self.base_url.clone(),
            username: self.username.clone(),
            password: self.password.clone(),
            documents_url: self.documents_url.clone(),
            table_prefix: self.table_prefix.clone(),
            region: self.region.clone(),
            user_agent: None,
            request_delay_ms: self.request_delay_ms,
            data_dir: self.data_dir.clone(),
        }
    }
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Subcommand)]
enum Commands {
    /// Run one crawl pass over every open opportunity
    Crawl {
        /// Stop after this many listing pages
        #[arg(long)]
        max_listing_pages: Option<u32>,
    },

    /// Print the effective settings (password redacted)
    Config,

    /// Print the identity a vendor row would be stored under
    VendorId {
        #[arg(long)]
        company: String,
        #[arg(long, default_value = "")]
        email: String,
        #[arg(long, default_value = "")]
        phone: String,
        /// Raw status cell, e.g. "B - C - A"
        #[arg(long, default_value = "")]
        status: String,
    },
}

pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let settings = Settings::load(cli.config.as_deref()).await?.with_overrides(cli.overrides());

    match cli.command {
        Commands::Crawl { max_listing_pages } => crawl::cmd_crawl(&settings, max_listing_pages).await,
        Commands::Config => config_cmd::cmd_config(&settings),
        Commands::VendorId {
            company,
            email,
            phone,
            status,
        } => vendor_id::cmd_vendor_id(&company, &email, &phone, &status),
    }
}
