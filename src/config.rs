//! Crawl settings.
//!
//! Settings are resolved once at start-up from built-in defaults, an optional
//! TOML file, and environment/CLI overrides, then shared read-only.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Default portal root.
pub const DEFAULT_BASE_URL: &str = "https://pr-webs-vendor.des.wa.gov";

/// Name `prefer` uses to discover `govscout.toml` when no path is given.
pub const CONFIG_NAME: &str = "govscout";

static DOCUMENTS_URL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([A-Za-z][A-Za-z0-9+.-]*)://([^/]+)(?:/(.*))?$").unwrap());

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("documents_url (WEBS_DOCUMENTS_URL) is required")]
    MissingDocumentsUrl,
    #[error("Invalid documents_url: {0}")]
    InvalidDocumentsUrl(String),
    #[error("Invalid base_url {url}: {source}")]
    InvalidBaseUrl {
        url: String,
        source: url::ParseError,
    },
    #[error("Failed to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse {path:?}: {source}")]
    Toml {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// Where document blobs are stored: `<scheme>://<bucket>/<prefix>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentsLocation {
    pub scheme: String,
    pub bucket: String,
    /// Key prefix; empty or ending in `/`.
    pub prefix: String,
}

impl DocumentsLocation {
    pub fn parse(url: &str) -> Result<Self, ConfigError> {
        let caps = DOCUMENTS_URL_RE
            .captures(url)
            .ok_or_else(|| ConfigError::InvalidDocumentsUrl(url.to_string()))?;

        let mut prefix = caps
            .get(3)
            .map(|m| m.as_str().to_string())
            .unwrap_or_default();
        if !prefix.is_empty() && !prefix.ends_with('/') {
            prefix.push('/');
        }

        Ok(Self {
            scheme: caps[1].to_string(),
            bucket: caps[2].to_string(),
            prefix,
        })
    }

    /// Blob key for a hex content digest.
    pub fn key_for(&self, digest_hex: &str) -> String {
        format!("{}{}", self.prefix, digest_hex)
    }

    /// Full URL of a stored blob.
    pub fn url_for(&self, key: &str) -> String {
        format!("{}://{}/{}", self.scheme, self.bucket, key)
    }
}

/// Crawl settings as read from the config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub base_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub documents_url: Option<String>,
    pub table_prefix: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    pub user_agent: String,
    pub request_timeout_secs: u64,
    pub request_delay_ms: u64,
    pub data_dir: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            username: None,
            password: None,
            documents_url: None,
            table_prefix: String::new(),
            region: None,
            user_agent: crate::scrapers::USER_AGENT.to_string(),
            request_timeout_secs: 30,
            request_delay_ms: 0,
            data_dir: PathBuf::from("govscout-data"),
        }
    }
}

/// Values that take precedence over the config file (environment and flags).
#[derive(Debug, Clone, Default)]
pub struct SettingsOverrides {
    pub base_url: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub documents_url: Option<String>,
    pub table_prefix: Option<String>,
    pub region: Option<String>,
    pub user_agent: Option<String>,
    pub request_delay_ms: Option<u64>,
    pub data_dir: Option<PathBuf>,
}

impl Settings {
    /// Load settings from `path`, or from the first `govscout` config file
    /// `prefer` discovers. Falls back to defaults when none exists.
    pub async fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = path {
            return Self::load_from_path(path).await;
        }

        match prefer::load(CONFIG_NAME).await {
            Ok(pref_config) => match pref_config.source_path() {
                Some(path) => Self::load_from_path(path).await,
                None => Ok(Self::default()),
            },
            Err(e) => {
                debug!("No {} config file found: {}", CONFIG_NAME, e);
                Ok(Self::default())
            }
        }
    }

    /// Load settings from a specific TOML file.
    pub async fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        Self::from_toml(&content).map_err(|source| ConfigError::Toml {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    pub fn with_overrides(mut self, overrides: SettingsOverrides) -> Self {
        if let Some(v) = overrides.base_url {
            self.base_url = v;
        }
        if overrides.username.is_some() {
            self.username = overrides.username;
        }
        if overrides.password.is_some() {
            self.password = overrides.password;
        }
        if overrides.documents_url.is_some() {
            self.documents_url = overrides.documents_url;
        }
        if let Some(v) = overrides.table_prefix {
            self.table_prefix = v;
        }
        if overrides.region.is_some() {
            self.region = overrides.region;
        }
        if let Some(v) = overrides.user_agent {
            self.user_agent = v;
        }
        if let Some(v) = overrides.request_delay_ms {
            self.request_delay_ms = v;
        }
        if let Some(v) = overrides.data_dir {
            self.data_dir = v;
        }
        self
    }

    /// Parsed blob location; required for any crawl that stores documents.
    pub fn documents_location(&self) -> Result<DocumentsLocation, ConfigError> {
        let url = self
            .documents_url
            .as_deref()
            .ok_or(ConfigError::MissingDocumentsUrl)?;
        DocumentsLocation::parse(url)
    }

    pub fn base_url(&self) -> Result<url::Url, ConfigError> {
        url::Url::parse(&self.base_url).map_err(|source| ConfigError::InvalidBaseUrl {
            url: self.base_url.clone(),
            source,
        })
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }

    /// Copy safe to print.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if copy.password.is_some() {
            copy.password = Some("********".to_string());
        }
        copy
    }
}

/// Table names derived from the configured prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableNames {
    pub opportunities: String,
    pub vendors: String,
    pub documents: String,
}

impl TableNames {
    pub fn with_prefix(prefix: &str) -> Self {
        Self {
            opportunities: format!("{prefix}Opportunities"),
            vendors: format!("{prefix}Vendors"),
            documents: format!("{prefix}Documents"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_documents_location_with_prefix() {
        let loc = DocumentsLocation::parse("s3://govscout-docs/webs").unwrap();
        assert_eq!(loc.scheme, "s3");
        assert_eq!(loc.bucket, "govscout-docs");
        assert_eq!(loc.prefix, "webs/");
        assert_eq!(loc.key_for("ab12"), "webs/ab12");
        assert_eq!(loc.url_for("webs/ab12"), "s3://govscout-docs/webs/ab12");
    }

    #[test]
    fn test_documents_location_without_prefix() {
        let loc = DocumentsLocation::parse("s3://bucket").unwrap();
        assert_eq!(loc.prefix, "");
        assert_eq!(loc.key_for("ff"), "ff");

        let loc = DocumentsLocation::parse("s3://bucket/already/").unwrap();
        assert_eq!(loc.prefix, "already/");
    }

    #[test]
    fn test_documents_location_invalid() {
        assert!(DocumentsLocation::parse("not a url").is_err());
        assert!(DocumentsLocation::parse("s3:///nobucket").is_err());
    }

    #[test]
    fn test_missing_documents_url() {
        let settings = Settings::default();
        assert!(matches!(
            settings.documents_location(),
            Err(ConfigError::MissingDocumentsUrl)
        ));
    }

    #[test]
    fn test_toml_then_overrides() {
        let settings = Settings::from_toml(
            r#"
            table_prefix = "Test"
            documents_url = "s3://from-file"
            request_delay_ms = 250
            "#,
        )
        .unwrap();
        assert_eq!(settings.base_url, DEFAULT_BASE_URL);
        assert_eq!(settings.request_delay(), Duration::from_millis(250));

        let settings = settings.with_overrides(SettingsOverrides {
            documents_url: Some("s3://from-env/x".to_string()),
            ..Default::default()
        });
        assert_eq!(settings.table_prefix, "Test");
        assert_eq!(settings.documents_location().unwrap().bucket, "from-env");
    }

    #[tokio::test]
    async fn test_load_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("govscout.toml");
        tokio::fs::write(
            &path,
            "documents_url = \"s3://from-file/webs\"\ntable_prefix = \"File\"\n",
        )
        .await
        .unwrap();

        let settings = Settings::load(Some(&path)).await.unwrap();
        assert_eq!(settings.table_prefix, "File");
        assert_eq!(settings.documents_location().unwrap().bucket, "from-file");
    }

    #[tokio::test]
    async fn test_load_missing_path() {
        let dir = tempfile::tempdir().unwrap();
        let err = Settings::load(Some(&dir.path().join("absent.toml"))).await.unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[tokio::test]
    async fn test_load_malformed_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("govscout.toml");
        tokio::fs::write(&path, "table_prefix = [").await.unwrap();
        let err = Settings::load(Some(&path)).await.unwrap_err();
        assert!(matches!(err, ConfigError::Toml { .. }));
    }

    #[test]
    fn test_table_names() {
        let names = TableNames::with_prefix("Prod");
        assert_eq!(names.opportunities, "ProdOpportunities");
        assert_eq!(names.vendors, "ProdVendors");
        assert_eq!(names.documents, "ProdDocuments");
    }

    #[test]
    fn test_redacted() {
        let settings = Settings {
            password: Some("hunter2".to_string()),
            ..Default::default()
        };
        assert_eq!(settings.redacted().password.as_deref(), Some("********"));
    }
}
