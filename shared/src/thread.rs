//! Client-side state of one comment's reply subtree.
//!
//! Replies are fetched lazily on first expansion and cached afterwards;
//! collapsing and expanding again never refetches.

use crate::{Comment, RepliesPage};

/// Nesting depth past which replies stop being indented further.
pub const MAX_INDENT_DEPTH: usize = 3;

pub fn indent_level(depth: usize) -> usize {
    depth.min(MAX_INDENT_DEPTH)
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReplyThread {
    pub replies: Vec<Comment>,
    pub reply_count: i64,
    pub expanded: bool,
    pub loading: bool,
    pub loaded: bool,
    pub error: Option<String>,
    next_page: Option<u32>,
}

impl ReplyThread {
    pub fn from_comment(comment: &Comment) -> Self {
        // a subtree the server already materialized counts as loaded
        let loaded = !comment.replies.is_empty()
            && comment.replies.len() as i64 >= comment.reply_count;
        Self {
            replies: comment.replies.clone(),
            reply_count: comment.reply_count,
            loaded,
            next_page: if loaded { None } else { Some(1) },
            ..Self::default()
        }
    }

    pub fn is_expandable(&self) -> bool {
        self.reply_count > 0 || !self.replies.is_empty()
    }

    /// Flips the expanded flag. Returns the page to fetch when this is the
    /// first expansion.
    pub fn toggle(&mut self) -> Option<u32> {
        self.expanded = !self.expanded;
        if self.expanded && !self.loaded && !self.loading {
            self.loading = true;
            self.error = None;
            return Some(self.next_page.unwrap_or(1));
        }
        None
    }

    /// Page to request for the "more replies" control, if any.
    pub fn load_more(&mut self) -> Option<u32> {
        if self.loading || !self.loaded {
            return None;
        }
        let page = self.next_page?;
        self.loading = true;
        self.error = None;
        Some(page)
    }

    /// Re-issues the request that last failed.
    pub fn retry(&mut self) -> Option<u32> {
        if self.loading || self.error.is_none() {
            return None;
        }
        self.loading = true;
        self.error = None;
        Some(self.next_page.unwrap_or(1))
    }

    pub fn finish_load(&mut self, result: Result<RepliesPage, String>) {
        self.loading = false;
        match result {
            Ok(page) => {
                let first = page.pagination.page <= 1;
                if first {
                    // the server copy and order win over replies posted meanwhile
                    let fetched: Vec<i64> = page.replies.iter().map(|c| c.id).collect();
                    self.replies.retain(|c| !fetched.contains(&c.id));
                }
                for reply in page.replies {
                    if !self.replies.iter().any(|c| c.id == reply.id) {
                        self.replies.push(reply);
                    }
                }
                self.reply_count = self.reply_count.max(page.pagination.total);
                self.next_page = page
                    .pagination
                    .has_next
                    .then(|| page.pagination.page + 1);
                self.loaded = true;
            }
            Err(message) => self.error = Some(message),
        }
    }

    pub fn has_more(&self) -> bool {
        self.loaded && self.next_page.is_some()
    }

    /// A reply was just posted under this comment. Returns the page to fetch
    /// when the existing replies were never loaded.
    pub fn add_reply(&mut self, reply: Comment) -> Option<u32> {
        let had_replies = self.reply_count > 0;
        self.replies.insert(0, reply);
        self.reply_count += 1;
        self.expanded = true;
        if self.loaded || self.loading {
            return None;
        }
        if !had_replies {
            // nothing on the server to merge with
            self.loaded = true;
            self.next_page = None;
            return None;
        }
        self.loading = true;
        self.error = None;
        Some(self.next_page.unwrap_or(1))
    }

    pub fn replace_reply(&mut self, updated: Comment) {
        if let Some(slot) = self.replies.iter_mut().find(|c| c.id == updated.id) {
            let replies = std::mem::take(&mut slot.replies);
            *slot = Comment { replies, ..updated };
        }
    }

    pub fn remove_reply(&mut self, id: i64) {
        let before = self.replies.len();
        self.replies.retain(|c| c.id != id);
        if self.replies.len() < before {
            self.reply_count = (self.reply_count - 1).max(0);
        }
    }
}
