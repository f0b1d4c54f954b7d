// src/config.rs

//! Configuration loading utilities.
//!
//! This module provides convenience functions for loading the configuration,
//! the keyword list and the authenticated cookie set from files.

use std::fs;
use std::path::Path;

use crate::error::{AppError, Result};
use crate::models::{Config, CookieEntry};

/// Load configuration from a TOML file and resolve the keyword file.
///
/// A missing file falls back to defaults; a malformed one is an error.
pub fn load_config(path: &Path) -> Result<Config> {
    let mut config = if path.exists() {
        Config::load(path)?
    } else {
        log::warn!("Config file {} not found, using defaults", path.display());
        Config::default()
    };

    if let Some(file) = &config.search.keyword_file {
        config.search.keywords = load_keywords(Path::new(file))?;
        log::info!(
            "Loaded {} keywords from {}",
            config.search.keywords.len(),
            file
        );
    }
    Ok(config)
}

/// Load keywords, one per line; blank lines are skipped.
pub fn load_keywords(path: &Path) -> Result<Vec<String>> {
    let content = fs::read_to_string(path).map_err(|e| {
        AppError::config(format!("Cannot read keyword file {}: {e}", path.display()))
    })?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}

/// Load the cookie set exported from a logged-in browser.
///
/// A missing file yields an empty set, which disables the cookie fallback
/// during comment harvesting.
pub fn load_cookies(path: &Path) -> Result<Vec<CookieEntry>> {
    if !path.exists() {
        log::warn!(
            "Cookie file {} not found; login redirects cannot be recovered",
            path.display()
        );
        return Ok(Vec::new());
    }
    let content = fs::read_to_string(path)?;
    let cookies: Vec<CookieEntry> = serde_json::from_str(&content)?;
    if let Some(bad) = cookies.iter().find(|c| c.name.trim().is_empty()) {
        return Err(AppError::validation(format!(
            "Cookie with value '{}' in {} has no name",
            bad.value,
            path.display()
        )));
    }
    Ok(cookies)
}
