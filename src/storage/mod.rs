//! Storage abstractions for crawl output.
//!
//! Records are handed to a [`RecordSink`] as soon as they are extracted.
//! The local backend writes JSON lines per keyword:
//!
//! ```text
//! {output.dir}/
//! └── {keyword}-{digest}/
//!     ├── posts.jsonl       # posts and retweets, tagged with "kind"
//!     └── comments.jsonl
//! ```

pub mod local;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::Result;
use crate::models::{Comment, SearchRecord};

// Re-export for convenience
pub use local::JsonlStorage;

/// One output line: the record plus its kind and originating keyword.
#[derive(Debug, Serialize)]
pub struct StoredLine<'a, T: Serialize> {
    pub kind: &'static str,
    pub keyword: &'a str,
    #[serde(flatten)]
    pub record: &'a T,
}

/// Trait for record sink backends.
#[async_trait]
pub trait RecordSink: Send + Sync {
    /// Store a post or retweet. Returns `false` when it was already stored.
    async fn write_record(&self, keyword: &str, record: &SearchRecord) -> Result<bool>;

    /// Store a comment. Returns `false` when it was already stored.
    async fn write_comment(&self, keyword: &str, comment: &Comment) -> Result<bool>;
}
