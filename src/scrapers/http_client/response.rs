//! Fetched page wrapper.

use std::collections::HashMap;

use reqwest::StatusCode;

/// A fully read HTTP response.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// Final URL after redirects.
    pub url: String,
    pub status: StatusCode,
    /// Header names are lowercase.
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl FetchedPage {
    /// Build a successful HTML page (used by scripted transports).
    pub fn html(url: impl Into<String>, body: impl Into<String>) -> Self {
        let mut headers = HashMap::new();
        headers.insert("content-type".to_string(), "text/html; charset=utf-8".to_string());
        Self {
            url: url.into(),
            status: StatusCode::OK,
            headers,
            body: body.into().into_bytes(),
        }
    }

    /// Build a successful binary response.
    pub fn bytes(url: impl Into<String>, content_type: &str, body: Vec<u8>) -> Self {
        let mut headers = HashMap::new();
        headers.insert("content-type".to_string(), content_type.to_string());
        Self {
            url: url.into(),
            status: StatusCode::OK,
            headers,
            body,
        }
    }

    /// Content-Type header, parameters included.
    pub fn content_type(&self) -> Option<&str> {
        self.headers.get("content-type").map(|s| s.as_str())
    }

    pub fn content_disposition_filename(&self) -> Option<String> {
        self.headers
            .get("content-disposition")
            .and_then(|h| parse_content_disposition_filename(h))
    }

    /// Body decoded as UTF-8, replacing invalid sequences.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Filename from a Content-Disposition value.
///
/// An RFC 5987 `filename*=charset''value` parameter wins over `filename=`.
pub fn parse_content_disposition_filename(header: &str) -> Option<String> {
    let mut plain = None;
    let mut extended = None;

    for param in header.split(';').skip(1) {
        let Some((name, value)) = param.split_once('=') else {
            continue;
        };
        let value = value.trim();
        match name.trim().to_ascii_lowercase().as_str() {
            "filename*" => {
                extended = value
                    .split_once("''")
                    .and_then(|(_, encoded)| urlencoding::decode(encoded).ok())
                    .map(|decoded| decoded.trim().to_string());
            }
            "filename" => plain = Some(value.trim_matches('"').trim().to_string()),
            _ => {}
        }
    }

    extended
        .filter(|name| !name.is_empty())
        .or(plain.filter(|name| !name.is_empty()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_content_disposition_quoted() {
        let header = r#"attachment; filename="bid package.pdf""#;
        assert_eq!(
            parse_content_disposition_filename(header),
            Some("bid package.pdf".to_string())
        );
    }

    #[test]
    fn test_parse_content_disposition_rfc5987_wins() {
        let header = r#"attachment; filename="fallback.pdf"; filename*=UTF-8''addendum%201.pdf"#;
        assert_eq!(
            parse_content_disposition_filename(header),
            Some("addendum 1.pdf".to_string())
        );
    }

    #[test]
    fn test_parse_content_disposition_none() {
        assert_eq!(parse_content_disposition_filename("inline"), None);
    }

    #[test]
    fn test_page_accessors() {
        let page = FetchedPage::bytes("https://x.test/a", "application/pdf", vec![1, 2]);
        assert_eq!(page.status, StatusCode::OK);
        assert_eq!(page.content_type(), Some("application/pdf"));
        assert_eq!(page.content_disposition_filename(), None);
    }
}
