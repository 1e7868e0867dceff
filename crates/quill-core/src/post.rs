//! Post models and listing queries

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Default page size for listings
pub const DEFAULT_LIMIT: i64 = 20;

/// Largest page size a client may request
pub const MAX_LIMIT: i64 = 100;

/// Maximum title length in characters
pub const MAX_TITLE_LEN: usize = 255;

/// A blog post
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: Uuid,
    pub title: String,
    pub content: String,
    pub tags: Vec<String>,
    pub author_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Post {
    pub fn from_new(new: NewPost) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            title: new.title,
            content: new.content,
            tags: normalize_tags(new.tags),
            author_id: new.author_id,
            created_at: now,
            updated_at: now,
        }
    }

    /// Apply a partial update in place
    pub fn apply(&mut self, update: &PostUpdate) {
        if let Some(title) = &update.title {
            self.title = title.clone();
        }
        if let Some(content) = &update.content {
            self.content = content.clone();
        }
        if let Some(tags) = &update.tags {
            self.tags = normalize_tags(tags.clone());
        }
        self.updated_at = Utc::now();
    }
}

/// Input for creating a post
#[derive(Debug, Clone)]
pub struct NewPost {
    pub title: String,
    pub content: String,
    pub tags: Vec<String>,
    pub author_id: Uuid,
}

/// Partial update; `None` leaves the field untouched
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PostUpdate {
    pub title: Option<String>,
    pub content: Option<String>,
    pub tags: Option<Vec<String>>,
}

impl PostUpdate {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.content.is_none() && self.tags.is_none()
    }
}

/// Ordering by creation time
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

/// Listing filter shared by `/posts` and `/feed`.
///
/// Build one, then call [`PostQuery::normalized`] before handing it to a
/// store or using it as a cache key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PostQuery {
    pub limit: i64,
    pub offset: i64,
    pub sort: SortOrder,
    /// Every tag must be present on a matching post
    pub tags: Vec<String>,
    /// Case-insensitive substring of title or content
    pub search: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub author_id: Option<Uuid>,
}

impl PostQuery {
    /// Clamp paging and canonicalise filters
    pub fn normalized(mut self) -> Self {
        self.limit = if self.limit <= 0 {
            DEFAULT_LIMIT
        } else {
            self.limit.min(MAX_LIMIT)
        };
        self.offset = self.offset.max(0);
        self.tags = normalize_tags(std::mem::take(&mut self.tags));
        self.search = self
            .search
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        self
    }

    /// Whether `post` satisfies every filter (paging is not considered)
    pub fn matches(&self, post: &Post) -> bool {
        if let Some(author) = self.author_id {
            if post.author_id != author {
                return false;
            }
        }
        if !self.tags.iter().all(|t| post.tags.contains(t)) {
            return false;
        }
        if let Some(since) = self.since {
            if post.created_at < since {
                return false;
            }
        }
        if let Some(until) = self.until {
            if post.created_at > until {
                return false;
            }
        }
        if let Some(search) = &self.search {
            let needle = search.to_lowercase();
            if !post.title.to_lowercase().contains(&needle)
                && !post.content.to_lowercase().contains(&needle)
            {
                return false;
            }
        }
        true
    }
}

/// Trim, lowercase, drop empties and duplicates (first occurrence wins)
pub fn normalize_tags(tags: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(tags.len());
    for tag in tags {
        let tag = tag.trim().to_lowercase();
        if !tag.is_empty() && !out.contains(&tag) {
            out.push(tag);
        }
    }
    out
}

/// Escape `%`, `_` and `\` for use inside a LIKE pattern
pub fn escape_like(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
