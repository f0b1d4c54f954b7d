// src/error.rs

//! Unified error handling for the search crawler.

use std::fmt;

use thiserror::Error;

/// Result type alias for crawler operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// Unified application error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing failed
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// URL parsing failed
    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    /// CSS selector parsing failed
    #[error("Invalid selector '{selector}': {message}")]
    Selector { selector: String, message: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Data validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// A page could not be fetched
    #[error("Fetch failed for {url}: {message}")]
    Fetch { url: String, message: String },

    /// Search results were served without the structure of a logged-in page.
    /// Fatal for the whole run.
    #[error(
        "Invalid or expired session ({context}): the search page is missing required fields. \
         Refresh the cookie in the [crawler] config section and re-run."
    )]
    InvalidSession { context: String },

    /// Browser automation failed
    #[error("Browser error: {0}")]
    Browser(String),

    /// Crawling error
    #[error("Crawl error for {context}: {message}")]
    Crawl { context: String, message: String },
}

impl AppError {
    /// Create a selector parsing error.
    pub fn selector(selector: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Selector {
            selector: selector.into(),
            message: message.to_string(),
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a fetch error for a URL.
    pub fn fetch(url: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Fetch {
            url: url.into(),
            message: message.to_string(),
        }
    }

    /// Create an invalid-session error naming the missing field.
    pub fn invalid_session(context: impl Into<String>) -> Self {
        Self::InvalidSession {
            context: context.into(),
        }
    }

    /// Create a browser automation error.
    pub fn browser(message: impl fmt::Display) -> Self {
        Self::Browser(message.to_string())
    }

    /// Create a crawl error with context.
    pub fn crawl(context: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Crawl {
            context: context.into(),
            message: message.to_string(),
        }
    }

    /// Whether this error must stop the whole run rather than one partition.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::InvalidSession { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_invalid_session_is_fatal() {
        assert!(AppError::invalid_session("mid").is_fatal());
        assert!(!AppError::fetch("https://s.weibo.com", "timeout").is_fatal());
        assert!(!AppError::browser("crashed").is_fatal());
    }

    #[test]
    fn invalid_session_message_points_at_cookie() {
        let message = AppError::invalid_session("feed_list_forward").to_string();
        assert!(message.contains("feed_list_forward"));
        assert!(message.contains("cookie"));
    }
}
