//! Local filesystem storage implementation.
//!
//! Appends JSON lines under one directory per keyword and drops records
//! already written during this run.

use std::collections::HashSet;
use std::path::PathBuf;

use async_trait::async_trait;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::error::Result;
use crate::models::{Comment, SearchRecord};
use crate::storage::{RecordSink, StoredLine};

const POSTS_FILE: &str = "posts.jsonl";
const COMMENTS_FILE: &str = "comments.jsonl";
const MAX_NAME_CHARS: usize = 32;

/// JSON-lines storage backend.
pub struct JsonlStorage {
    root_dir: PathBuf,
    seen: Mutex<HashSet<(&'static str, String)>>,
}

impl JsonlStorage {
    /// Create a new JsonlStorage rooted at the given directory.
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
            seen: Mutex::new(HashSet::new()),
        }
    }

    /// Directory holding the output of one keyword.
    ///
    /// Keywords may contain characters that are not valid in paths, so the
    /// name is a sanitized prefix followed by a digest of the full keyword.
    pub fn keyword_dir(&self, keyword: &str) -> PathBuf {
        let safe: String = keyword
            .chars()
            .map(|c| if c.is_alphanumeric() { c } else { '_' })
            .take(MAX_NAME_CHARS)
            .collect();
        let digest = hex::encode(Sha256::digest(keyword.as_bytes()));
        self.root_dir.join(format!("{}-{}", safe, &digest[..12]))
    }

    pub fn posts_path(&self, keyword: &str) -> PathBuf {
        self.keyword_dir(keyword).join(POSTS_FILE)
    }

    pub fn comments_path(&self, keyword: &str) -> PathBuf {
        self.keyword_dir(keyword).join(COMMENTS_FILE)
    }

    /// Append one line unless `(kind, id)` was written before.
    async fn append<T: Serialize + Sync>(
        &self,
        path: PathBuf,
        kind: &'static str,
        id: &str,
        keyword: &str,
        record: &T,
    ) -> Result<bool> {
        let mut seen = self.seen.lock().await;
        if !id.is_empty() && seen.contains(&(kind, id.to_string())) {
            log::debug!("Skipping duplicate {} {}", kind, id);
            return Ok(false);
        }

        let line = StoredLine {
            kind,
            keyword,
            record,
        };
        let mut bytes = serde_json::to_vec(&line)?;
        bytes.push(b'\n');

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        file.write_all(&bytes).await?;
        file.flush().await?;

        if !id.is_empty() {
            seen.insert((kind, id.to_string()));
        }
        Ok(true)
    }
}

#[async_trait]
impl RecordSink for JsonlStorage {
    async fn write_record(&self, keyword: &str, record: &SearchRecord) -> Result<bool> {
        let (kind, post) = match record {
            SearchRecord::Post(post) => ("post", post),
            SearchRecord::Retweet(post) => ("retweet", post),
        };
        self.append(self.posts_path(keyword), kind, &post.id, keyword, post)
            .await
    }

    async fn write_comment(&self, keyword: &str, comment: &Comment) -> Result<bool> {
        self.append(
            self.comments_path(keyword),
            "comment",
            &comment.id,
            keyword,
            comment,
        )
        .await
    }
}
