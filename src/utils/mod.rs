//! Utility functions and helpers.

pub mod date;
pub mod http;

use url::Url;

/// Resolve a potentially relative URL against a base URL.
pub fn resolve_url(base: &Url, href: &str) -> String {
    base.join(href)
        .map(|u| u.to_string())
        .unwrap_or_else(|_| href.to_string())
}

/// Resolve a URL string against a base URL string.
pub fn resolve(base_url: &str, href: &str) -> Option<String> {
    Url::parse(base_url)
        .ok()
        .map(|base| resolve_url(&base, href))
}

/// Last path segment of a link with any query string removed.
///
/// `/1669879400/JuK3a?refer_flag=1001` → `JuK3a`
pub fn last_path_segment(href: &str) -> String {
    let path = href.split('?').next().unwrap_or("");
    path.rsplit('/').next().unwrap_or("").to_string()
}
