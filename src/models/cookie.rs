// src/models/cookie.rs

//! Authenticated cookie set installed into browser sessions.

use serde::{Deserialize, Serialize};

/// One cookie from the exported cookie file.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CookieEntry {
    pub name: String,
    pub value: String,

    #[serde(default)]
    pub domain: Option<String>,

    #[serde(default)]
    pub path: Option<String>,
}
