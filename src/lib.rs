// src/lib.rs

//! Weibo keyword search crawler.
//!
//! Enumerates every search result for a keyword past the result window cap
//! by splitting queries over days, hours, regions and cities, and harvests
//! the comment threads of busy posts through a headless browser.

pub mod config;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod services;
pub mod storage;
pub mod utils;
