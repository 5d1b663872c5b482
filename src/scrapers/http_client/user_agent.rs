//! User agent handling for HTTP requests.

pub const USER_AGENT: &str =
    "Mozilla/5.0 (compatible; GovScout/0.1; +https://github.com/dacut/govscout-backend)";

/// Resolve user agent from config value; blank falls back to the default.
pub fn resolve_user_agent(config_value: Option<&str>) -> String {
    match config_value.map(str::trim) {
        Some(ua) if !ua.is_empty() => ua.to_string(),
        _ => USER_AGENT.to_string(),
    }
}
