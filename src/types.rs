//! types
//!
//! Forge-neutral value types produced by listing and lookup operations.
//!
//! # Design
//!
//! Every type here is a plain owned value: constructed once from a
//! forge-native payload by the service that issued the call, then handed to
//! the caller with no further lifecycle. Conversions from wire formats live
//! next to the services that know those formats; nothing in this module
//! performs I/O.

use chrono::{DateTime, Utc};

/// A single timestamped, authored text entry on an issue or pull request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comment {
    /// Comment text
    pub body: String,
    /// Author username
    pub author: String,
    /// Creation time
    pub created: DateTime<Utc>,
    /// Last edit time, when the forge reports one
    pub edited: Option<DateTime<Utc>>,
}

/// An issue on a project.
#[derive(Debug, Clone, PartialEq)]
pub struct Issue {
    /// Issue id
    pub id: u64,
    /// Issue title
    pub title: String,
    /// Issue body text
    pub description: String,
    /// Current state
    pub status: IssueStatus,
    /// Username that opened the issue
    pub author: String,
    /// Creation time
    pub created: DateTime<Utc>,
}

/// Issue state, also usable as a listing filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueStatus {
    /// Issue is open
    Open,
    /// Issue is closed
    Closed,
    /// Listing filter only: every state
    All,
}

impl IssueStatus {
    /// Map the forge's status string onto a state; unknown strings read as
    /// open.
    pub fn from_api(status: &str) -> IssueStatus {
        match status {
            "Closed" => IssueStatus::Closed,
            _ => IssueStatus::Open,
        }
    }
}

impl std::fmt::Display for IssueStatus {
    /// Displays in the capitalization the API expects in `status=` filters.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IssueStatus::Open => write!(f, "Open"),
            IssueStatus::Closed => write!(f, "Closed"),
            IssueStatus::All => write!(f, "All"),
        }
    }
}

/// A pull request on a project.
#[derive(Debug, Clone, PartialEq)]
pub struct PullRequest {
    /// PR id
    pub id: u64,
    /// PR title
    pub title: String,
    /// PR body/initial comment
    pub description: String,
    /// Current state
    pub status: PrStatus,
    /// Username that opened the PR
    pub author: String,
    /// Branch the changes live on
    pub source_branch: String,
    /// Branch the PR merges into
    pub target_branch: String,
    /// Creation time
    pub created: DateTime<Utc>,
}

/// Pull request state, also usable as a listing filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrStatus {
    /// PR is open and awaiting review/merge
    Open,
    /// PR is closed without being merged
    Closed,
    /// PR has been merged
    Merged,
    /// Listing filter only: every state
    All,
}

impl PrStatus {
    /// Map the forge's status string onto a state; unknown strings read as
    /// open.
    pub fn from_api(status: &str) -> PrStatus {
        match status {
            "Closed" => PrStatus::Closed,
            "Merged" => PrStatus::Merged,
            _ => PrStatus::Open,
        }
    }
}

impl std::fmt::Display for PrStatus {
    /// Displays in the capitalization the API expects in `status=` filters.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PrStatus::Open => write!(f, "Open"),
            PrStatus::Closed => write!(f, "Closed"),
            PrStatus::Merged => write!(f, "Merged"),
            PrStatus::All => write!(f, "All"),
        }
    }
}

/// A CI status flag attached to a commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitFlag {
    /// Full commit hash the flag is attached to
    pub commit: String,
    /// Flag state
    pub state: CommitStatus,
    /// Flag name (e.g. the CI system reporting it)
    pub context: String,
    /// Short human-readable result
    pub comment: String,
    /// Link to details, when reported
    pub url: Option<String>,
}

/// State of a commit flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitStatus {
    /// Check is still running
    Pending,
    /// Check passed
    Success,
    /// Check failed
    Failure,
    /// Check errored before producing a result
    Error,
    /// Check was canceled
    Canceled,
}

impl CommitStatus {
    /// Map the forge's flag keyword onto a state; unknown keywords read as
    /// an error state rather than silently passing.
    pub fn from_keyword(keyword: &str) -> CommitStatus {
        match keyword {
            "pending" => CommitStatus::Pending,
            "success" => CommitStatus::Success,
            "failure" => CommitStatus::Failure,
            "canceled" => CommitStatus::Canceled,
            _ => CommitStatus::Error,
        }
    }

    /// The keyword the API expects for this state.
    pub fn keyword(&self) -> &'static str {
        match self {
            CommitStatus::Pending => "pending",
            CommitStatus::Success => "success",
            CommitStatus::Failure => "failure",
            CommitStatus::Error => "error",
            CommitStatus::Canceled => "canceled",
        }
    }
}

impl std::fmt::Display for CommitStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.keyword())
    }
}

/// A published release/tag of a project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Release {
    /// Tag name of the release
    pub tag: String,
    /// Release title
    pub title: String,
    /// Web URL of the release, when the forge exposes one
    pub url: Option<String>,
}

/// Clone URL pair for a project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitUrls {
    /// Anonymous clone URL
    pub git: String,
    /// Authenticated ssh clone URL
    pub ssh: String,
}

/// The key identifying one project on a forge.
///
/// A fork is addressed by the owning `username` plus the upstream
/// namespace/repo pair; `is_fork` with no `username` means "the
/// authenticated user's fork" and is resolved by the service.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectRef {
    /// Repository name
    pub repo: String,
    /// Namespace the repository lives in, if any
    pub namespace: Option<String>,
    /// Fork owner, when addressing a fork
    pub username: Option<String>,
    /// Whether this addresses a fork rather than the upstream project
    pub is_fork: bool,
}

impl ProjectRef {
    /// Reference a project at the instance root.
    pub fn new(repo: impl Into<String>) -> Self {
        ProjectRef {
            repo: repo.into(),
            ..Default::default()
        }
    }

    /// Reference a project inside a namespace.
    pub fn in_namespace(repo: impl Into<String>, namespace: impl Into<String>) -> Self {
        ProjectRef {
            repo: repo.into(),
            namespace: Some(namespace.into()),
            ..Default::default()
        }
    }
}
