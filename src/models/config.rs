//! Application configuration structures.

use std::fs;
use std::path::Path;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// HTTP and crawling behavior settings
    #[serde(default)]
    pub crawler: CrawlerConfig,

    /// What to search for
    #[serde(default)]
    pub search: SearchConfig,

    /// Comment harvesting settings
    #[serde(default)]
    pub comments: CommentConfig,

    /// Where records are written
    #[serde(default)]
    pub output: OutputConfig,

    /// Log verbosity
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        if self.crawler.user_agent.trim().is_empty() {
            return Err(AppError::validation("crawler.user_agent is empty"));
        }
        if self.crawler.timeout_secs == 0 {
            return Err(AppError::validation("crawler.timeout_secs must be > 0"));
        }
        if self.crawler.max_concurrent == 0 {
            return Err(AppError::validation("crawler.max_concurrent must be > 0"));
        }
        if self.search.keywords.is_empty() && self.search.keyword_file.is_none() {
            return Err(AppError::validation("No keywords defined"));
        }
        if self.search.window_cap == 0 {
            return Err(AppError::validation("search.window_cap must be > 0"));
        }
        let (start, end) = self.search.date_range()?;
        if start > end {
            return Err(AppError::validation(format!(
                "search.start_date {start} is after search.end_date {end}"
            )));
        }
        if self.comments.max_sessions == 0 {
            return Err(AppError::validation("comments.max_sessions must be > 0"));
        }
        if self.comments.wait_timeout_ms == 0 {
            return Err(AppError::validation("comments.wait_timeout_ms must be > 0"));
        }
        if self.comments.harvest_timeout_secs == 0 {
            return Err(AppError::validation(
                "comments.harvest_timeout_secs must be > 0",
            ));
        }
        Ok(())
    }
}

/// HTTP client and crawling behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlerConfig {
    /// User-Agent header for HTTP requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Request timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,

    /// Delay between pages of one partition in milliseconds
    #[serde(default = "defaults::request_delay")]
    pub request_delay_ms: u64,

    /// Maximum root partitions crawled concurrently
    #[serde(default = "defaults::max_concurrent")]
    pub max_concurrent: usize,

    /// Raw `Cookie` header sent with every search request
    #[serde(default)]
    pub cookie: String,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            user_agent: defaults::user_agent(),
            timeout_secs: defaults::timeout(),
            request_delay_ms: defaults::request_delay(),
            max_concurrent: defaults::max_concurrent(),
            cookie: String::new(),
        }
    }
}

/// Post type filter of the search surface.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PostType {
    #[default]
    All,
    Original,
    Hot,
    Following,
    Verified,
    Media,
    Opinion,
}

impl PostType {
    /// Query string fragment selecting this post type.
    pub fn query_param(self) -> &'static str {
        match self {
            PostType::All => "&typeall=1",
            PostType::Original => "&scope=ori",
            PostType::Hot => "&xsort=hot",
            PostType::Following => "&atten=1",
            PostType::Verified => "&vip=1",
            PostType::Media => "&category=4",
            PostType::Opinion => "&viewpoint=1",
        }
    }
}

/// Content filter of the search surface.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContainType {
    #[default]
    All,
    Image,
    Video,
    Music,
    Link,
}

impl ContainType {
    /// Query string fragment selecting this content filter.
    pub fn query_param(self) -> &'static str {
        match self {
            ContainType::All => "&suball=1",
            ContainType::Image => "&haspic=1",
            ContainType::Video => "&hasvideo=1",
            ContainType::Music => "&hasmusic=1",
            ContainType::Link => "&haslink=1",
        }
    }
}

/// Search query settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Keywords to search for
    #[serde(default)]
    pub keywords: Vec<String>,

    /// Optional file with one keyword per line; replaces `keywords` when set
    #[serde(default)]
    pub keyword_file: Option<String>,

    /// First day to search (YYYY-MM-DD), defaults to today
    #[serde(default = "defaults::today")]
    pub start_date: String,

    /// Last day to search (YYYY-MM-DD), inclusive, defaults to today
    #[serde(default = "defaults::today")]
    pub end_date: String,

    #[serde(default)]
    pub post_type: PostType,

    #[serde(default)]
    pub contain_type: ContainType,

    /// Region names to restrict the search to; empty or "全部" means everywhere
    #[serde(default)]
    pub regions: Vec<String>,

    /// Search surface base URL
    #[serde(default = "defaults::search_base")]
    pub search_base: String,

    /// Navigation strip length at which a query window is considered saturated
    #[serde(default = "defaults::window_cap")]
    pub window_cap: usize,
}

impl SearchConfig {
    /// Parse the configured date range.
    pub fn date_range(&self) -> Result<(NaiveDate, NaiveDate)> {
        let parse = |field: &str, value: &str| {
            NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|e| {
                AppError::config(format!("search.{field} '{value}' is not YYYY-MM-DD: {e}"))
            })
        };
        Ok((
            parse("start_date", &self.start_date)?,
            parse("end_date", &self.end_date)?,
        ))
    }

    /// Whether the search should run without any region filter.
    pub fn is_nationwide(&self) -> bool {
        self.regions.is_empty() || self.regions.iter().any(|r| r == defaults::ALL_REGIONS)
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            keywords: Vec::new(),
            keyword_file: None,
            start_date: defaults::today(),
            end_date: defaults::today(),
            post_type: PostType::default(),
            contain_type: ContainType::default(),
            regions: Vec::new(),
            search_base: defaults::search_base(),
            window_cap: defaults::window_cap(),
        }
    }
}

/// Comment harvesting settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommentConfig {
    /// Harvest comments at all
    #[serde(default = "defaults::enabled")]
    pub enabled: bool,

    /// Base URL of the post detail view
    #[serde(default = "defaults::detail_base")]
    pub detail_base: String,

    /// Maximum comments kept per post
    #[serde(default = "defaults::max_comments")]
    pub max_comments: usize,

    /// Posts with more comments than this are harvested
    #[serde(default = "defaults::harvest_threshold")]
    pub harvest_threshold: u64,

    /// Browser sessions running at the same time
    #[serde(default = "defaults::max_sessions")]
    pub max_sessions: usize,

    /// Pause after each interaction, in milliseconds
    #[serde(default = "defaults::settle_delay")]
    pub settle_delay_ms: u64,

    /// How long to wait for an element before treating it as absent
    #[serde(default = "defaults::wait_timeout")]
    pub wait_timeout_ms: u64,

    /// Polling interval while waiting for an element
    #[serde(default = "defaults::poll_interval")]
    pub poll_interval_ms: u64,

    /// Upper bound on "load more" clicks per post
    #[serde(default = "defaults::max_load_more")]
    pub max_load_more: usize,

    /// Overall time budget for loading one thread, in seconds
    #[serde(default = "defaults::harvest_timeout")]
    pub harvest_timeout_secs: u64,

    /// JSON file with the authenticated cookie set
    #[serde(default = "defaults::cookies_file")]
    pub cookies_file: String,

    /// Chrome/Chromium binary; auto-detected when unset
    #[serde(default)]
    pub chrome_executable: Option<String>,

    #[serde(default = "defaults::enabled")]
    pub headless: bool,
}

impl Default for CommentConfig {
    fn default() -> Self {
        Self {
            enabled: defaults::enabled(),
            detail_base: defaults::detail_base(),
            max_comments: defaults::max_comments(),
            harvest_threshold: defaults::harvest_threshold(),
            max_sessions: defaults::max_sessions(),
            settle_delay_ms: defaults::settle_delay(),
            wait_timeout_ms: defaults::wait_timeout(),
            poll_interval_ms: defaults::poll_interval(),
            max_load_more: defaults::max_load_more(),
            harvest_timeout_secs: defaults::harvest_timeout(),
            cookies_file: defaults::cookies_file(),
            chrome_executable: None,
            headless: defaults::enabled(),
        }
    }
}

/// Output location for the local sink.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "defaults::output_dir")]
    pub dir: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: defaults::output_dir(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "defaults::log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: defaults::log_level(),
        }
    }
}

mod defaults {
    pub const ALL_REGIONS: &str = "全部";

    // Crawler defaults
    pub fn user_agent() -> String {
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) \
         Chrome/120.0 Safari/537.36"
            .into()
    }
    pub fn timeout() -> u64 {
        30
    }
    pub fn request_delay() -> u64 {
        100
    }
    pub fn max_concurrent() -> usize {
        4
    }

    // Search defaults
    pub fn today() -> String {
        chrono::Local::now().format("%Y-%m-%d").to_string()
    }
    pub fn search_base() -> String {
        "https://s.weibo.com".into()
    }
    pub fn window_cap() -> usize {
        50
    }

    // Comment defaults
    pub fn enabled() -> bool {
        true
    }
    pub fn detail_base() -> String {
        "https://weibo.com".into()
    }
    pub fn max_comments() -> usize {
        10_000
    }
    pub fn harvest_threshold() -> u64 {
        20
    }
    pub fn max_sessions() -> usize {
        2
    }
    pub fn settle_delay() -> u64 {
        1000
    }
    pub fn wait_timeout() -> u64 {
        3000
    }
    pub fn poll_interval() -> u64 {
        500
    }
    pub fn max_load_more() -> usize {
        1000
    }
    pub fn harvest_timeout() -> u64 {
        1800
    }
    pub fn cookies_file() -> String {
        "data/cookies.json".into()
    }

    pub fn output_dir() -> String {
        "output".into()
    }
    pub fn log_level() -> String {
        "info".into()
    }
}
