// src/models/comment.rs

//! Comment records harvested from a post's detail view.

use serde::{Deserialize, Serialize};

/// A single comment in a post's thread.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Comment {
    /// Comment id, empty when the block carries none
    pub id: String,

    /// Parent post id, short id and author id
    pub weibo_id: String,
    pub weibo_bid: String,
    pub weibo_user_id: String,

    pub user_id: String,
    pub screen_name: String,

    /// Badge titles joined with `;`, `其他` when there are none
    pub user_type: String,

    pub text: String,

    /// Like count, `0` when the site shows the placeholder label
    pub attitudes_count: String,

    /// Site wording with whitespace and the trailing `前` part removed
    pub created_at: String,
}
