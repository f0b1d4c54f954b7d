// src/models/post.rs

//! Post and retweet records extracted from search result pages.

use serde::{Deserialize, Serialize};

/// A search result post. Embedded retweets use the same shape.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Post {
    /// Stable numeric post id (`mid`)
    pub id: String,

    /// Short id from the permalink (`bid`)
    pub bid: String,

    pub user_id: String,
    pub screen_name: String,

    /// Author classification badge, `其他` when absent
    pub user_type: String,

    pub text: String,

    /// Headline article short link, empty when the post is not an article share
    pub article_url: String,

    pub location: String,

    /// Mentioned screen names, first-seen order, no duplicates
    pub at_users: Vec<String>,

    /// Topic names without the surrounding `#`, first-seen order, no duplicates
    pub topics: Vec<String>,

    /// Counts keep the site's formatting (e.g. `2万`)
    pub reposts_count: String,
    pub comments_count: String,
    pub attitudes_count: String,

    /// `YYYY-MM-DD HH:MM` when the site's wording could be normalized
    pub created_at: String,

    /// Client the post was sent from
    pub source: String,

    pub pics: Vec<String>,
    pub video_url: String,

    /// Id of the sibling retweet record, empty when there is none
    pub retweet_id: String,
}

impl Post {
    /// Reference used to queue this post for comment harvesting.
    pub fn harvest_request(&self) -> HarvestRequest {
        HarvestRequest {
            post_id: self.id.clone(),
            bid: self.bid.clone(),
            user_id: self.user_id.clone(),
        }
    }
}

/// Output of the search side of the crawl.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchRecord {
    Post(Post),
    /// The forwarded original of a post, emitted as its own record
    Retweet(Post),
}

impl SearchRecord {
    pub fn post(&self) -> &Post {
        match self {
            SearchRecord::Post(post) | SearchRecord::Retweet(post) => post,
        }
    }
}

/// Identifies a post whose comment thread should be harvested.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HarvestRequest {
    pub post_id: String,
    pub bid: String,
    pub user_id: String,
}

impl HarvestRequest {
    /// Detail view URL: `{base}/{user_id}/{bid}`.
    pub fn detail_url(&self, base: &str) -> String {
        format!("{}/{}/{}", base.trim_end_matches('/'), self.user_id, self.bid)
    }
}
