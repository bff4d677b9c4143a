//! comments
//!
//! Filtering and search over unified [`Comment`] lists.
//!
//! # Design
//!
//! Every forge returns comments oldest-first; listing operations accept a
//! [`CommentFilter`] and run it through [`filter_comments`] here, so the
//! author/regex/ordering behavior is identical across forges. Filtering
//! never touches the network.

use regex::Regex;

use crate::types::Comment;

/// Filter applied to a comment listing.
///
/// An empty filter (the default) passes every comment through in API order.
#[derive(Debug, Clone, Default)]
pub struct CommentFilter {
    /// Return newest-first instead of API order
    pub reverse: bool,
    /// Keep only comments by this username
    pub author: Option<String>,
    /// Keep only comments whose body matches
    pub regex: Option<Regex>,
}

impl CommentFilter {
    /// An empty filter: every comment, API order.
    pub fn new() -> Self {
        Self::default()
    }

    /// Return comments newest-first.
    pub fn reversed(mut self) -> Self {
        self.reverse = true;
        self
    }

    /// Keep only comments by `author` (exact username match).
    pub fn by_author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    /// Keep only comments whose body matches `regex`.
    pub fn matching(mut self, regex: Regex) -> Self {
        self.regex = Some(regex);
        self
    }
}

/// Apply `filter` to a comment list.
///
/// Author and body filters keep the comments' relative order; reversal is
/// applied to whatever survives.
pub fn filter_comments(comments: Vec<Comment>, filter: &CommentFilter) -> Vec<Comment> {
    let mut comments: Vec<Comment> = comments
        .into_iter()
        .filter(|c| match &filter.author {
            Some(author) => &c.author == author,
            None => true,
        })
        .filter(|c| match &filter.regex {
            Some(regex) => regex.is_match(&c.body),
            None => true,
        })
        .collect();

    if filter.reverse {
        comments.reverse();
    }
    comments
}

/// Find the first match of `pattern` across comment bodies, in list order.
///
/// Returns the matched text, not the comment carrying it.
pub fn search_in_comments(comments: &[Comment], pattern: &Regex) -> Option<String> {
    comments
        .iter()
        .find_map(|c| pattern.find(&c.body).map(|m| m.as_str().to_string()))
}
