//! traits
//!
//! Service, project, and user traits for talking to remote Git forges.
//!
//! # Design
//!
//! Three trait objects model a forge session:
//!
//! - [`GitService`] - an authenticated connection to one forge instance;
//!   resolves and creates projects.
//! - [`GitProject`] - a handle to one repository (possibly a fork), through
//!   which pull requests, issues, comments, files, and commit statuses are
//!   reached.
//! - [`GitUser`] - the authenticated user behind the service token.
//!
//! All traits are async because every operation involves network I/O, and all
//! errors surface as [`ForgeError`] so callers pattern-match on the error kind
//! rather than downcasting. Handles are cheap: a project borrows nothing from
//! its service beyond a shared session, so they can be moved across tasks.
//!
//! # Example
//!
//! ```ignore
//! use anyforge::{CreatePrRequest, ForgeError, GitService};
//!
//! async fn open_pr(service: &dyn GitService) -> Result<(), ForgeError> {
//!     let project = service
//!         .get_project_from_url("https://pagure.io/some-namespace/some-repo")
//!         .await?;
//!     let pr = project
//!         .pr_create(CreatePrRequest {
//!             title: "Add feature".to_string(),
//!             body: None,
//!             source_branch: "feature".to_string(),
//!             target_branch: "main".to_string(),
//!         })
//!         .await?;
//!     println!("Opened PR #{}: {}", pr.id, pr.title);
//!     Ok(())
//! }
//! ```

use async_trait::async_trait;
use regex::Regex;
use thiserror::Error;

use crate::comments::CommentFilter;
use crate::types::{
    Comment, CommitFlag, CommitStatus, GitUrls, Issue, IssueStatus, ProjectRef, PrStatus,
    PullRequest, Release,
};

/// Errors from forge operations.
///
/// One tagged enum covers every failure mode of this layer; each variant
/// carries the structured context callers need to branch (URL, HTTP status,
/// decoded error body) without parsing display strings.
#[derive(Debug, Clone, Error)]
pub enum ForgeError {
    /// The requested resource was not found (HTTP 404).
    ///
    /// `reason` is the forge-reported `error` string when the response body
    /// carried one.
    #[error("not found: {url}")]
    NotFound {
        /// URL of the missing resource
        url: String,
        /// Error message extracted from the response body, if any
        reason: Option<String>,
    },

    /// The response body was absent, not valid JSON, or didn't match the
    /// expected shape on a checked call.
    #[error("could not decode JSON response from `{url}`")]
    Decode {
        /// URL whose response could not be decoded
        url: String,
    },

    /// The API returned a non-success status other than 404.
    #[error("API error: {status} when calling `{url}`{}", reason_suffix(reason))]
    Api {
        /// URL of the failing call
        url: String,
        /// HTTP status code
        status: u16,
        /// The `error` string from the response body, if present
        reason: Option<String>,
        /// The full decoded error body, if the response had one
        body: Option<serde_json::Value>,
    },

    /// Connection-level failure; the request never produced a response.
    #[error("cannot connect to `{url}`: {message}")]
    Transport {
        /// URL of the attempted request
        url: String,
        /// Underlying network error text
        message: String,
    },

    /// Project creation was rejected because the namespace is not available
    /// to the authenticated user.
    #[error("cannot create project in given namespace: {namespace}")]
    InvalidNamespace {
        /// The rejected namespace
        namespace: String,
    },

    /// The string could not be parsed as a git repository URL.
    #[error("invalid git URL: {0}")]
    InvalidUrl(String),

    /// No registered service matches the URL.
    #[error("no matching service for `{url}` (valid: {known})")]
    UnknownService {
        /// The unmatched URL
        url: String,
        /// Comma-separated registry keys
        known: String,
    },

    /// The operation is not supported by this forge.
    #[error("not implemented: {0}")]
    NotImplemented(String),
}

fn reason_suffix(reason: &Option<String>) -> String {
    match reason {
        Some(r) => format!(": {}", r),
        None => String::new(),
    }
}

impl ForgeError {
    /// Extract the forge-reported error message, if this error carries one.
    pub fn forge_message(&self) -> Option<&str> {
        match self {
            ForgeError::NotFound { reason, .. } | ForgeError::Api { reason, .. } => {
                reason.as_deref()
            }
            _ => None,
        }
    }
}

/// Construction parameters for a forge service.
///
/// `token` controls whether an auth header is sent at all; `insecure`
/// disables TLS certificate verification for self-signed instances;
/// `read_only` is stored and exposed for callers that gate writes, this
/// layer itself never blocks a request on it.
#[derive(Clone)]
pub struct ServiceConfig {
    /// API token; requests go unauthenticated when absent
    pub token: Option<String>,
    /// Forge instance base URL; each service falls back to its canonical
    /// instance when absent
    pub instance_url: Option<String>,
    /// Advisory read-only marker
    pub read_only: bool,
    /// Skip TLS certificate verification
    pub insecure: bool,
    /// Transport-level retry bound for connection failures
    pub max_retries: u32,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        ServiceConfig {
            token: None,
            instance_url: None,
            read_only: false,
            insecure: false,
            max_retries: 5,
        }
    }
}

// Custom Debug to avoid exposing the token
impl std::fmt::Debug for ServiceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceConfig")
            .field("has_token", &self.token.is_some())
            .field("instance_url", &self.instance_url)
            .field("read_only", &self.read_only)
            .field("insecure", &self.insecure)
            .field("max_retries", &self.max_retries)
            .finish()
    }
}

impl ServiceConfig {
    /// Config carrying just a token, everything else default.
    pub fn with_token(token: impl Into<String>) -> Self {
        ServiceConfig {
            token: Some(token.into()),
            ..Default::default()
        }
    }
}

/// Request to create a new project.
#[derive(Debug, Clone, Default)]
pub struct CreateProjectRequest {
    /// Repository name
    pub repo: String,
    /// Namespace to create the project in (instance root when `None`)
    pub namespace: Option<String>,
    /// Project description (defaults to the repository name)
    pub description: Option<String>,
}

/// Request to create a pull request.
#[derive(Debug, Clone)]
pub struct CreatePrRequest {
    /// PR title
    pub title: String,
    /// PR body/description
    pub body: Option<String>,
    /// Branch the changes live on
    pub source_branch: String,
    /// Branch to merge into
    pub target_branch: String,
}

/// Request to update a pull request.
#[derive(Debug, Clone, Default)]
pub struct UpdatePrRequest {
    /// PR id
    pub id: u64,
    /// New title (if changing)
    pub title: Option<String>,
    /// New body (if changing)
    pub body: Option<String>,
}

/// Request to set a commit flag (CI status).
#[derive(Debug, Clone)]
pub struct CommitFlagRequest {
    /// Full commit hash
    pub commit: String,
    /// Flag state
    pub state: CommitStatus,
    /// Flag name (e.g. the CI system reporting it)
    pub context: String,
    /// Short human-readable result
    pub description: String,
    /// Link to details (build log etc.)
    pub url: Option<String>,
}

/// An authenticated connection to one forge instance.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync` to allow use across async tasks.
///
/// # Error Handling
///
/// All methods return `Result<T, ForgeError>`. Callers should handle:
/// - `NotFound`: the project doesn't exist (or is private to the token)
/// - `Api`: the forge rejected the call; the decoded body is attached
/// - `Transport`: the instance could not be reached
/// - `InvalidNamespace`: project creation into a namespace the token
///   may not use
#[async_trait]
pub trait GitService: Send + Sync {
    /// Get the service name (e.g., "pagure", "gitlab").
    fn name(&self) -> &'static str;

    /// Base URL of the forge instance this service talks to.
    fn instance_url(&self) -> &str;

    /// Build a handle to the project described by `spec`.
    ///
    /// For forks with no explicit `username`, the authenticated user is
    /// resolved first; plain projects never touch the network here.
    async fn get_project(&self, spec: ProjectRef) -> Result<Box<dyn GitProject>, ForgeError>;

    /// Parse a repository URL and build a handle to the project it names.
    ///
    /// # Errors
    ///
    /// - `InvalidUrl` if the URL cannot be parsed
    async fn get_project_from_url(&self, url: &str) -> Result<Box<dyn GitProject>, ForgeError>;

    /// Create a new project.
    ///
    /// # Errors
    ///
    /// - `InvalidNamespace` if the forge rejects the requested namespace
    /// - `Api` for any other rejection, with the decoded error body attached
    async fn project_create(
        &self,
        request: CreateProjectRequest,
    ) -> Result<Box<dyn GitProject>, ForgeError>;

    /// The user the service token authenticates as.
    fn user(&self) -> Box<dyn GitUser>;
}

// Debug on the trait object rather than as a supertrait, so the trait's
// bounds stay at `Send + Sync`; only identity accessors are printed.
impl std::fmt::Debug for dyn GitService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitService")
            .field("name", &self.name())
            .field("instance_url", &self.instance_url())
            .finish()
    }
}

/// A handle to one repository on a forge.
///
/// Identity accessors (`full_repo_name`, `get_web_url`, `get_git_urls`,
/// `is_fork`) are derived locally and never touch the network; everything
/// else issues one API call per invocation with no caching.
#[async_trait]
pub trait GitProject: Send + Sync {
    /// Get the service name this project lives on.
    fn service_name(&self) -> &'static str;

    /// Full repository path as the forge addresses it
    /// (e.g. `namespace/repo` or `fork/user/namespace/repo`).
    fn full_repo_name(&self) -> String;

    /// Web URL for viewing the project.
    fn get_web_url(&self) -> String;

    /// Anonymous and ssh clone URLs.
    fn get_git_urls(&self) -> GitUrls;

    /// Whether this handle points at a user's fork.
    fn is_fork(&self) -> bool;

    /// Whether the project exists on the forge.
    ///
    /// A 404 answers `false`; any other failure propagates.
    async fn exists(&self) -> Result<bool, ForgeError>;

    /// Project description.
    async fn get_description(&self) -> Result<String, ForgeError>;

    /// Branch names in the repository.
    async fn get_branches(&self) -> Result<Vec<String>, ForgeError>;

    /// Releases published for the project.
    async fn get_releases(&self) -> Result<Vec<Release>, ForgeError>;

    /// Raw content of a file at the given ref.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the path does not exist at that ref
    async fn get_file_content(&self, path: &str, ref_name: &str) -> Result<String, ForgeError>;

    /// The parent project, when this one is a fork.
    async fn parent(&self) -> Result<Option<Box<dyn GitProject>>, ForgeError>;

    /// Usernames owning the project.
    async fn get_owners(&self) -> Result<Vec<String>, ForgeError>;

    /// Usernames allowed to merge pull requests.
    async fn who_can_merge_pr(&self) -> Result<Vec<String>, ForgeError>;

    /// Whether `username` may merge pull requests.
    async fn can_merge_pr(&self, username: &str) -> Result<bool, ForgeError>;

    /// Usernames allowed to close issues.
    async fn who_can_close_issue(&self) -> Result<Vec<String>, ForgeError>;

    /// Whether `username` may close issues.
    async fn can_close_issue(&self, username: &str) -> Result<bool, ForgeError>;

    /// Create a pull request.
    async fn pr_create(&self, request: CreatePrRequest) -> Result<PullRequest, ForgeError>;

    /// List pull requests, filtered by status (`PrStatus::All` lists every
    /// state).
    async fn get_pr_list(&self, status: PrStatus) -> Result<Vec<PullRequest>, ForgeError>;

    /// Get one pull request by id.
    async fn get_pr_info(&self, id: u64) -> Result<PullRequest, ForgeError>;

    /// Update title/body of a pull request.
    async fn update_pr_info(&self, request: UpdatePrRequest) -> Result<PullRequest, ForgeError>;

    /// Comments on a pull request, filtered per `filter`.
    async fn get_pr_comments(
        &self,
        id: u64,
        filter: &CommentFilter,
    ) -> Result<Vec<Comment>, ForgeError>;

    /// Search a pull request for the first match of `pattern`.
    ///
    /// Comments are searched oldest-first, or newest-first with `reverse`.
    /// With `include_description` the PR description joins the search at the
    /// oldest position. Returns the matched text.
    async fn search_in_pr(
        &self,
        id: u64,
        pattern: &Regex,
        reverse: bool,
        include_description: bool,
    ) -> Result<Option<String>, ForgeError>;

    /// Add a comment to a pull request.
    async fn pr_comment(&self, id: u64, body: &str) -> Result<Comment, ForgeError>;

    /// Close a pull request without merging.
    async fn pr_close(&self, id: u64) -> Result<PullRequest, ForgeError>;

    /// Merge a pull request.
    async fn pr_merge(&self, id: u64) -> Result<PullRequest, ForgeError>;

    /// List issues, filtered by status (`IssueStatus::All` lists every
    /// state).
    async fn get_issue_list(&self, status: IssueStatus) -> Result<Vec<Issue>, ForgeError>;

    /// Get one issue by id.
    async fn get_issue_info(&self, id: u64) -> Result<Issue, ForgeError>;

    /// Comments on an issue, filtered per `filter`.
    async fn get_issue_comments(
        &self,
        id: u64,
        filter: &CommentFilter,
    ) -> Result<Vec<Comment>, ForgeError>;

    /// Add a comment to an issue.
    async fn issue_comment(&self, id: u64, body: &str) -> Result<Comment, ForgeError>;

    /// Close an issue.
    async fn issue_close(&self, id: u64) -> Result<Issue, ForgeError>;

    /// CI statuses reported for a commit.
    async fn get_commit_statuses(&self, commit: &str) -> Result<Vec<CommitFlag>, ForgeError>;

    /// Report a CI status for a commit.
    async fn set_commit_status(
        &self,
        request: CommitFlagRequest,
    ) -> Result<CommitFlag, ForgeError>;

    /// The authenticated user's fork of this project.
    ///
    /// With `create`, a missing fork is created first; without it, a missing
    /// fork answers `None`.
    async fn get_fork(&self, create: bool) -> Result<Option<Box<dyn GitProject>>, ForgeError>;

    /// Whether the authenticated user has a fork of this project.
    async fn is_forked(&self) -> Result<bool, ForgeError>;

    /// Fork this project for the authenticated user.
    ///
    /// Returns a handle to the fork; forking an already-forked project is an
    /// API error on most forges.
    async fn fork_create(&self) -> Result<Box<dyn GitProject>, ForgeError>;
}

// Debug on the trait object rather than as a supertrait, so the trait's
// bounds stay at `Send + Sync`; only identity accessors are printed.
impl std::fmt::Debug for dyn GitProject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitProject")
            .field("service_name", &self.service_name())
            .field("full_repo_name", &self.full_repo_name())
            .field("is_fork", &self.is_fork())
            .finish()
    }
}

/// The authenticated user behind a service token.
#[async_trait]
pub trait GitUser: Send + Sync {
    /// Username the service token authenticates as.
    async fn get_username(&self) -> Result<String, ForgeError>;

    /// Projects the user forked from elsewhere.
    async fn get_forks(&self) -> Result<Vec<Box<dyn GitProject>>, ForgeError>;
}
