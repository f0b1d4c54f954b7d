// src/models/mod.rs

//! Domain models for the search crawler.
//!
//! This module contains all data structures used throughout the application,
//! organized by their primary purpose.

mod comment;
mod config;
mod cookie;
mod partition;
mod post;
mod region;

// Re-export all public types
pub use comment::Comment;
pub use config::{
    CommentConfig, Config, ContainType, CrawlerConfig, LoggingConfig, OutputConfig, PostType,
    SearchConfig,
};
pub use cookie::CookieEntry;
pub use partition::{Granularity, Partition, RegionFilter};
pub use post::{HarvestRequest, Post, SearchRecord};
pub use region::{City, Region, RegionCatalog};

/// Sentinel user type for authors without a classification badge.
pub const OTHER_USER_TYPE: &str = "其他";
