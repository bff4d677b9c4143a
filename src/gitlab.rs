//! gitlab
//!
//! GitLab note conversion and a service stub.
//!
//! # Design
//!
//! The useful piece here is the comment adapter: GitLab's API returns
//! "notes" on merge requests and issues, and [`comment_from_note`] converts
//! one into the unified [`Comment`]. The note arrives as a typed
//! [`GitlabNote`] so a payload missing any consumed field fails at
//! deserialization instead of surfacing later as a broken comment.
//!
//! [`GitlabService`] itself is a stub: it holds connection parameters,
//! resolves through the registry, and returns stable `NotImplemented`
//! errors for project operations. It exists to prove the multi-service
//! architecture; full GitLab API support is a separate effort.
//!
//! # Example
//!
//! ```
//! use anyforge::gitlab::{comment_from_note, GitlabNote};
//!
//! let note: GitlabNote = serde_json::from_str(
//!     r#"{
//!         "body": "hi",
//!         "author": {"username": "praiskup"},
//!         "created_at": "2019-01-07T11:11:18.302Z",
//!         "updated_at": "2019-01-07T11:11:18.302Z"
//!     }"#,
//! )
//! .unwrap();
//! let comment = comment_from_note(note);
//! assert_eq!(comment.author, "praiskup");
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::traits::{
    CreateProjectRequest, ForgeError, GitProject, GitService, GitUser, ServiceConfig,
};
use crate::types::{Comment, ProjectRef};

/// Default GitLab instance URL.
const DEFAULT_INSTANCE_URL: &str = "https://gitlab.com";

/// A GitLab note (comment on a merge request or issue), reduced to the
/// fields this layer consumes.
///
/// Deserializing rejects payloads missing any of them.
#[derive(Debug, Clone, Deserialize)]
pub struct GitlabNote {
    /// Note text
    pub body: String,
    /// Note author
    pub author: GitlabNoteAuthor,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last update time (equals `created_at` for never-edited notes)
    pub updated_at: DateTime<Utc>,
}

/// The author block of a GitLab note.
#[derive(Debug, Clone, Deserialize)]
pub struct GitlabNoteAuthor {
    /// Author username
    pub username: String,
}

/// Convert a GitLab note into a unified comment.
///
/// The four fields are copied verbatim: no transformation, no validation.
pub fn comment_from_note(note: GitlabNote) -> Comment {
    Comment {
        body: note.body,
        author: note.author.username,
        created: note.created_at,
        edited: Some(note.updated_at),
    }
}

/// Convert a note listing, keeping API order.
pub fn comments_from_notes(notes: Vec<GitlabNote>) -> Vec<Comment> {
    notes.into_iter().map(comment_from_note).collect()
}

/// GitLab service stub.
///
/// Holds connection parameters and answers `NotImplemented` for every
/// project operation, so registry-driven callers get a stable, actionable
/// error instead of a resolution failure.
#[derive(Clone)]
pub struct GitlabService {
    /// Instance base URL
    instance_url: String,
    /// API token, unused until project operations exist
    token: Option<String>,
}

// Custom Debug to avoid exposing the token
impl std::fmt::Debug for GitlabService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitlabService")
            .field("instance_url", &self.instance_url)
            .field("has_token", &self.token.is_some())
            .finish()
    }
}

impl GitlabService {
    /// Create a GitLab service from construction parameters.
    ///
    /// Falls back to `https://gitlab.com` when no instance URL is given.
    pub fn new(config: ServiceConfig) -> Self {
        GitlabService {
            instance_url: config
                .instance_url
                .unwrap_or_else(|| DEFAULT_INSTANCE_URL.to_string()),
            token: config.token,
        }
    }

    /// Check if the service has a token configured.
    pub fn has_token(&self) -> bool {
        self.token.is_some()
    }

    fn not_implemented<T>(what: &str) -> Result<T, ForgeError> {
        Err(ForgeError::NotImplemented(format!(
            "GitLab {} is not implemented; only note conversion is available",
            what
        )))
    }
}

#[async_trait]
impl GitService for GitlabService {
    fn name(&self) -> &'static str {
        "gitlab"
    }

    fn instance_url(&self) -> &str {
        &self.instance_url
    }

    async fn get_project(&self, _spec: ProjectRef) -> Result<Box<dyn GitProject>, ForgeError> {
        Self::not_implemented("project lookup")
    }

    async fn get_project_from_url(&self, _url: &str) -> Result<Box<dyn GitProject>, ForgeError> {
        Self::not_implemented("project lookup")
    }

    async fn project_create(
        &self,
        _request: CreateProjectRequest,
    ) -> Result<Box<dyn GitProject>, ForgeError> {
        Self::not_implemented("project creation")
    }

    fn user(&self) -> Box<dyn GitUser> {
        Box::new(GitlabUser)
    }
}

/// Stub user matching the stub service.
struct GitlabUser;

#[async_trait]
impl GitUser for GitlabUser {
    async fn get_username(&self) -> Result<String, ForgeError> {
        GitlabService::not_implemented("user lookup")
    }

    async fn get_forks(&self) -> Result<Vec<Box<dyn GitProject>>, ForgeError> {
        GitlabService::not_implemented("fork listing")
    }
}
