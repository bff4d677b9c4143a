//! mock
//!
//! Mock service implementation for deterministic testing.
//!
//! # Design
//!
//! [`MockService`] implements all three traits against in-memory state, so
//! code written against `Box<dyn GitService>` runs in tests without a forge.
//! Projects, PRs, issues, comments, files, and flags are seeded through
//! builders; write operations are recorded for verification and can be made
//! to fail through [`FailOn`].
//!
//! Service, project, and user handles share one state behind an
//! `Arc<Mutex<...>>`, so a comment added through one handle is visible
//! through every other.
//!
//! # Example
//!
//! ```
//! use anyforge::mock::MockService;
//! use anyforge::{CreatePrRequest, GitProject, GitService, ProjectRef, PrStatus};
//!
//! # tokio_test::block_on(async {
//! let service = MockService::new().with_project(&ProjectRef::new("demo"));
//! let project = service.get_project(ProjectRef::new("demo")).await.unwrap();
//!
//! let pr = project
//!     .pr_create(CreatePrRequest {
//!         title: "Add feature".to_string(),
//!         body: None,
//!         source_branch: "feature".to_string(),
//!         target_branch: "main".to_string(),
//!     })
//!     .await
//!     .unwrap();
//!
//! assert_eq!(pr.id, 1);
//! assert_eq!(pr.status, PrStatus::Open);
//! # });
//! ```

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use regex::Regex;

use crate::comments::{filter_comments, search_in_comments, CommentFilter};
use crate::parsing::parse_git_repo;
use crate::traits::{
    CommitFlagRequest, CreateProjectRequest, CreatePrRequest, ForgeError, GitProject, GitService,
    GitUser, UpdatePrRequest,
};
use crate::types::{
    Comment, CommitFlag, CommitStatus, GitUrls, Issue, IssueStatus, ProjectRef, PrStatus,
    PullRequest, Release,
};

/// Mock service for testing.
///
/// Thread-safe via internal `Arc<Mutex<...>>` wrapping; clones and the
/// handles built from them share one state.
#[derive(Debug, Clone)]
pub struct MockService {
    /// Instance URL reported by accessors; never changes after construction.
    instance_url: String,
    /// Internal state shared across clones and handles.
    inner: Arc<Mutex<MockInner>>,
}

/// Internal mutable state.
#[derive(Debug)]
struct MockInner {
    /// The authenticated username.
    username: String,
    /// Stored projects keyed by full repo name.
    projects: BTreeMap<String, ProjectState>,
    /// Operation to fail (for testing error paths).
    fail_on: Option<FailOn>,
    /// Recorded write operations for verification.
    operations: Vec<MockOperation>,
}

/// Per-project stored state.
#[derive(Debug)]
struct ProjectState {
    spec: ProjectRef,
    description: String,
    branches: Vec<String>,
    /// Owners stand in for every access role.
    owners: Vec<String>,
    /// File content keyed by (ref, path).
    files: BTreeMap<(String, String), String>,
    prs: BTreeMap<u64, PullRequest>,
    pr_comments: BTreeMap<u64, Vec<Comment>>,
    issues: BTreeMap<u64, Issue>,
    issue_comments: BTreeMap<u64, Vec<Comment>>,
    /// Commit flags keyed by commit hash.
    flags: BTreeMap<String, Vec<CommitFlag>>,
    next_pr_id: u64,
    next_issue_id: u64,
}

impl ProjectState {
    fn new(spec: ProjectRef) -> Self {
        ProjectState {
            spec,
            description: String::new(),
            branches: vec!["main".to_string()],
            owners: Vec::new(),
            files: BTreeMap::new(),
            prs: BTreeMap::new(),
            pr_comments: BTreeMap::new(),
            issues: BTreeMap::new(),
            issue_comments: BTreeMap::new(),
            flags: BTreeMap::new(),
            next_pr_id: 1,
            next_issue_id: 1,
        }
    }
}

/// Configuration for which operation should fail.
#[derive(Debug, Clone)]
pub enum FailOn {
    /// Fail project_create with the given error.
    ProjectCreate(ForgeError),
    /// Fail pr_create with the given error.
    PrCreate(ForgeError),
    /// Fail get_pr_list with the given error.
    GetPrList(ForgeError),
    /// Fail pr_merge with the given error.
    PrMerge(ForgeError),
    /// Fail issue_close with the given error.
    IssueClose(ForgeError),
    /// Fail get_file_content with the given error.
    GetFileContent(ForgeError),
    /// Fail set_commit_status with the given error.
    SetCommitStatus(ForgeError),
    /// Fail fork_create with the given error.
    ForkCreate(ForgeError),
}

/// Recorded write operation for test verification.
#[derive(Debug, Clone)]
pub enum MockOperation {
    ProjectCreate {
        full_repo_name: String,
    },
    PrCreate {
        full_repo_name: String,
        title: String,
        source_branch: String,
        target_branch: String,
    },
    PrUpdate {
        full_repo_name: String,
        id: u64,
        title: Option<String>,
        body: Option<String>,
    },
    PrComment {
        full_repo_name: String,
        id: u64,
        body: String,
    },
    PrClose {
        full_repo_name: String,
        id: u64,
    },
    PrMerge {
        full_repo_name: String,
        id: u64,
    },
    IssueComment {
        full_repo_name: String,
        id: u64,
        body: String,
    },
    IssueClose {
        full_repo_name: String,
        id: u64,
    },
    SetCommitStatus {
        full_repo_name: String,
        commit: String,
        state: CommitStatus,
        context: String,
    },
    ForkCreate {
        full_repo_name: String,
    },
}

/// Full repo name for a project spec, as forges address it.
fn repo_key(spec: &ProjectRef) -> String {
    let mut parts: Vec<&str> = Vec::new();
    if spec.is_fork {
        parts.push("fork");
        if let Some(ref username) = spec.username {
            parts.push(username);
        }
    }
    if let Some(ref namespace) = spec.namespace {
        parts.push(namespace);
    }
    parts.push(&spec.repo);
    parts.join("/")
}

/// Register a project, keeping existing state when it is already there.
fn upsert_project<'a>(inner: &'a mut MockInner, spec: &ProjectRef) -> &'a mut ProjectState {
    let username = inner.username.clone();
    inner.projects.entry(repo_key(spec)).or_insert_with(|| {
        let mut state = ProjectState::new(spec.clone());
        state.description = spec.repo.clone();
        state.owners = vec![username];
        state
    })
}

fn record(inner: &Mutex<MockInner>, op: MockOperation) {
    inner.lock().unwrap().operations.push(op);
}

/// Check if the named operation should fail and return the error if so.
fn check_fail<T>(inner: &Mutex<MockInner>, expected: &str) -> Option<Result<T, ForgeError>> {
    let inner = inner.lock().unwrap();
    match &inner.fail_on {
        Some(FailOn::ProjectCreate(e)) if expected == "project_create" => Some(Err(e.clone())),
        Some(FailOn::PrCreate(e)) if expected == "pr_create" => Some(Err(e.clone())),
        Some(FailOn::GetPrList(e)) if expected == "get_pr_list" => Some(Err(e.clone())),
        Some(FailOn::PrMerge(e)) if expected == "pr_merge" => Some(Err(e.clone())),
        Some(FailOn::IssueClose(e)) if expected == "issue_close" => Some(Err(e.clone())),
        Some(FailOn::GetFileContent(e)) if expected == "get_file_content" => Some(Err(e.clone())),
        Some(FailOn::SetCommitStatus(e)) if expected == "set_commit_status" => {
            Some(Err(e.clone()))
        }
        Some(FailOn::ForkCreate(e)) if expected == "fork_create" => Some(Err(e.clone())),
        _ => None,
    }
}

impl MockService {
    /// Create a new empty mock service.
    ///
    /// The authenticated username starts as `mock-user` and the instance
    /// URL as `https://mock.example.com`.
    pub fn new() -> Self {
        MockService {
            instance_url: "https://mock.example.com".to_string(),
            inner: Arc::new(Mutex::new(MockInner {
                username: "mock-user".to_string(),
                projects: BTreeMap::new(),
                fail_on: None,
                operations: Vec::new(),
            })),
        }
    }

    /// Set the authenticated username.
    ///
    /// Set this before registering projects so ownership follows.
    pub fn with_username(self, username: impl Into<String>) -> Self {
        {
            let mut inner = self.inner.lock().unwrap();
            inner.username = username.into();
        }
        self
    }

    /// Register an empty project.
    ///
    /// The description defaults to the repo name and the authenticated user
    /// becomes the owner, matching what project creation produces.
    pub fn with_project(self, spec: &ProjectRef) -> Self {
        {
            let mut inner = self.inner.lock().unwrap();
            upsert_project(&mut inner, spec);
        }
        self
    }

    /// Set the owners of a project, registering it if needed.
    pub fn with_owners(self, spec: &ProjectRef, owners: &[&str]) -> Self {
        {
            let mut inner = self.inner.lock().unwrap();
            let state = upsert_project(&mut inner, spec);
            state.owners = owners.iter().map(|o| o.to_string()).collect();
        }
        self
    }

    /// Set the branches of a project, registering it if needed.
    pub fn with_branches(self, spec: &ProjectRef, branches: &[&str]) -> Self {
        {
            let mut inner = self.inner.lock().unwrap();
            let state = upsert_project(&mut inner, spec);
            state.branches = branches.iter().map(|b| b.to_string()).collect();
        }
        self
    }

    /// Seed a pull request, registering the project if needed.
    ///
    /// New PRs created later get ids above the highest seeded one.
    pub fn with_pr(self, spec: &ProjectRef, pr: PullRequest) -> Self {
        {
            let mut inner = self.inner.lock().unwrap();
            let state = upsert_project(&mut inner, spec);
            state.next_pr_id = state.next_pr_id.max(pr.id + 1);
            state.prs.insert(pr.id, pr);
        }
        self
    }

    /// Seed comments on a pull request.
    pub fn with_pr_comments(self, spec: &ProjectRef, id: u64, comments: Vec<Comment>) -> Self {
        {
            let mut inner = self.inner.lock().unwrap();
            let state = upsert_project(&mut inner, spec);
            state.pr_comments.entry(id).or_default().extend(comments);
        }
        self
    }

    /// Seed an issue, registering the project if needed.
    pub fn with_issue(self, spec: &ProjectRef, issue: Issue) -> Self {
        {
            let mut inner = self.inner.lock().unwrap();
            let state = upsert_project(&mut inner, spec);
            state.next_issue_id = state.next_issue_id.max(issue.id + 1);
            state.issues.insert(issue.id, issue);
        }
        self
    }

    /// Seed comments on an issue.
    pub fn with_issue_comments(self, spec: &ProjectRef, id: u64, comments: Vec<Comment>) -> Self {
        {
            let mut inner = self.inner.lock().unwrap();
            let state = upsert_project(&mut inner, spec);
            state.issue_comments.entry(id).or_default().extend(comments);
        }
        self
    }

    /// Seed a file at a ref, registering the project if needed.
    pub fn with_file(self, spec: &ProjectRef, ref_name: &str, path: &str, content: &str) -> Self {
        {
            let mut inner = self.inner.lock().unwrap();
            let state = upsert_project(&mut inner, spec);
            state
                .files
                .insert((ref_name.to_string(), path.to_string()), content.to_string());
        }
        self
    }

    /// Configure the mock to fail on a specific operation.
    ///
    /// # Example
    ///
    /// ```
    /// use anyforge::mock::{FailOn, MockService};
    /// use anyforge::ForgeError;
    ///
    /// let service = MockService::new().fail_on(FailOn::PrCreate(ForgeError::Transport {
    ///     url: "https://mock.example.com".to_string(),
    ///     message: "connection refused".to_string(),
    /// }));
    /// ```
    pub fn fail_on(self, fail_on: FailOn) -> Self {
        {
            let mut inner = self.inner.lock().unwrap();
            inner.fail_on = Some(fail_on);
        }
        self
    }

    /// Clear the failure configuration.
    pub fn clear_fail_on(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.fail_on = None;
    }

    /// Get all recorded write operations.
    pub fn operations(&self) -> Vec<MockOperation> {
        let inner = self.inner.lock().unwrap();
        inner.operations.clone()
    }

    /// Clear recorded operations.
    pub fn clear_operations(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.operations.clear();
    }

    fn handle(&self, spec: ProjectRef) -> MockProject {
        MockProject {
            inner: Arc::clone(&self.inner),
            instance_url: self.instance_url.clone(),
            spec,
        }
    }
}

impl Default for MockService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GitService for MockService {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn instance_url(&self) -> &str {
        &self.instance_url
    }

    async fn get_project(&self, spec: ProjectRef) -> Result<Box<dyn GitProject>, ForgeError> {
        let username = match spec.username {
            Some(username) => Some(username),
            None if spec.is_fork => Some(self.inner.lock().unwrap().username.clone()),
            None => None,
        };
        Ok(Box::new(self.handle(ProjectRef { username, ..spec })))
    }

    async fn get_project_from_url(&self, url: &str) -> Result<Box<dyn GitProject>, ForgeError> {
        let repo_url = parse_git_repo(url)?;
        self.get_project(ProjectRef {
            repo: repo_url.repo,
            namespace: repo_url.namespace,
            username: repo_url.username,
            is_fork: repo_url.is_fork,
        })
        .await
    }

    async fn project_create(
        &self,
        request: CreateProjectRequest,
    ) -> Result<Box<dyn GitProject>, ForgeError> {
        let spec = ProjectRef {
            repo: request.repo.clone(),
            namespace: request.namespace.clone(),
            ..Default::default()
        };
        record(
            &self.inner,
            MockOperation::ProjectCreate {
                full_repo_name: repo_key(&spec),
            },
        );

        if let Some(result) = check_fail(&self.inner, "project_create") {
            return result;
        }

        {
            let mut inner = self.inner.lock().unwrap();
            let key = repo_key(&spec);
            if inner.projects.contains_key(&key) {
                return Err(ForgeError::Api {
                    url: format!("{}/api/0/new", self.instance_url),
                    status: 400,
                    reason: Some(format!("Repo \"{}\" already exists", key)),
                    body: None,
                });
            }
            let state = upsert_project(&mut inner, &spec);
            if let Some(description) = request.description {
                state.description = description;
            }
        }

        Ok(Box::new(self.handle(spec)))
    }

    fn user(&self) -> Box<dyn GitUser> {
        Box::new(MockUser {
            inner: Arc::clone(&self.inner),
            instance_url: self.instance_url.clone(),
        })
    }
}

/// A project handle over the shared mock state.
#[derive(Debug, Clone)]
pub struct MockProject {
    inner: Arc<Mutex<MockInner>>,
    instance_url: String,
    spec: ProjectRef,
}

impl MockProject {
    /// Run `f` against this project's state, answering `NotFound` when the
    /// project was never registered.
    fn with_project<T>(
        &self,
        f: impl FnOnce(&str, &mut ProjectState) -> Result<T, ForgeError>,
    ) -> Result<T, ForgeError> {
        let mut inner = self.inner.lock().unwrap();
        let username = inner.username.clone();
        let key = repo_key(&self.spec);
        let state = inner
            .projects
            .get_mut(&key)
            .ok_or_else(|| ForgeError::NotFound {
                url: format!("{}/{}", self.instance_url, key),
                reason: Some("Project not found".to_string()),
            })?;
        f(&username, state)
    }

    fn pr_not_found(&self, id: u64) -> ForgeError {
        ForgeError::NotFound {
            url: format!("{}/pull-request/{}", self.get_web_url(), id),
            reason: Some("Pull-Request not found".to_string()),
        }
    }

    fn issue_not_found(&self, id: u64) -> ForgeError {
        ForgeError::NotFound {
            url: format!("{}/issue/{}", self.get_web_url(), id),
            reason: Some("Issue not found".to_string()),
        }
    }

    fn fork_spec(&self, username: &str) -> ProjectRef {
        ProjectRef {
            repo: self.spec.repo.clone(),
            namespace: self.spec.namespace.clone(),
            username: Some(username.to_string()),
            is_fork: true,
        }
    }

    fn sibling(&self, spec: ProjectRef) -> MockProject {
        MockProject {
            inner: Arc::clone(&self.inner),
            instance_url: self.instance_url.clone(),
            spec,
        }
    }
}

#[async_trait]
impl GitProject for MockProject {
    fn service_name(&self) -> &'static str {
        "mock"
    }

    fn full_repo_name(&self) -> String {
        repo_key(&self.spec)
    }

    fn get_web_url(&self) -> String {
        format!("{}/{}", self.instance_url, self.full_repo_name())
    }

    fn get_git_urls(&self) -> GitUrls {
        let full_repo_name = self.full_repo_name();
        let hostname = self
            .instance_url
            .strip_prefix("https://")
            .or_else(|| self.instance_url.strip_prefix("http://"))
            .unwrap_or(&self.instance_url);
        GitUrls {
            git: format!("{}/{}.git", self.instance_url, full_repo_name),
            ssh: format!("ssh://git@{}/{}.git", hostname, full_repo_name),
        }
    }

    fn is_fork(&self) -> bool {
        self.spec.is_fork
    }

    async fn exists(&self) -> Result<bool, ForgeError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.projects.contains_key(&repo_key(&self.spec)))
    }

    async fn get_description(&self) -> Result<String, ForgeError> {
        self.with_project(|_, state| Ok(state.description.clone()))
    }

    async fn get_branches(&self) -> Result<Vec<String>, ForgeError> {
        self.with_project(|_, state| Ok(state.branches.clone()))
    }

    async fn get_releases(&self) -> Result<Vec<Release>, ForgeError> {
        self.with_project(|_, _| Ok(Vec::new()))
    }

    async fn get_file_content(&self, path: &str, ref_name: &str) -> Result<String, ForgeError> {
        if let Some(result) = check_fail(&self.inner, "get_file_content") {
            return result;
        }

        let not_found = ForgeError::NotFound {
            url: format!("{}/raw/{}/f/{}", self.get_web_url(), ref_name, path),
            reason: None,
        };
        self.with_project(|_, state| {
            state
                .files
                .get(&(ref_name.to_string(), path.to_string()))
                .cloned()
                .ok_or(not_found)
        })
    }

    async fn parent(&self) -> Result<Option<Box<dyn GitProject>>, ForgeError> {
        if !self.spec.is_fork {
            return Ok(None);
        }
        Ok(Some(Box::new(self.sibling(ProjectRef {
            repo: self.spec.repo.clone(),
            namespace: self.spec.namespace.clone(),
            ..Default::default()
        }))))
    }

    async fn get_owners(&self) -> Result<Vec<String>, ForgeError> {
        self.with_project(|_, state| Ok(state.owners.clone()))
    }

    async fn who_can_merge_pr(&self) -> Result<Vec<String>, ForgeError> {
        self.with_project(|_, state| {
            let mut users = state.owners.clone();
            users.sort();
            users.dedup();
            Ok(users)
        })
    }

    async fn can_merge_pr(&self, username: &str) -> Result<bool, ForgeError> {
        Ok(self
            .who_can_merge_pr()
            .await?
            .iter()
            .any(|u| u == username))
    }

    async fn who_can_close_issue(&self) -> Result<Vec<String>, ForgeError> {
        self.who_can_merge_pr().await
    }

    async fn can_close_issue(&self, username: &str) -> Result<bool, ForgeError> {
        Ok(self
            .who_can_close_issue()
            .await?
            .iter()
            .any(|u| u == username))
    }

    async fn pr_create(&self, request: CreatePrRequest) -> Result<PullRequest, ForgeError> {
        record(
            &self.inner,
            MockOperation::PrCreate {
                full_repo_name: self.full_repo_name(),
                title: request.title.clone(),
                source_branch: request.source_branch.clone(),
                target_branch: request.target_branch.clone(),
            },
        );

        if let Some(result) = check_fail(&self.inner, "pr_create") {
            return result;
        }

        self.with_project(|username, state| {
            let id = state.next_pr_id;
            state.next_pr_id += 1;

            let pr = PullRequest {
                id,
                title: request.title,
                description: request.body.unwrap_or_default(),
                status: PrStatus::Open,
                author: username.to_string(),
                source_branch: request.source_branch,
                target_branch: request.target_branch,
                created: Utc::now(),
            };
            state.prs.insert(id, pr.clone());
            Ok(pr)
        })
    }

    async fn get_pr_list(&self, status: PrStatus) -> Result<Vec<PullRequest>, ForgeError> {
        if let Some(result) = check_fail(&self.inner, "get_pr_list") {
            return result;
        }

        self.with_project(|_, state| {
            Ok(state
                .prs
                .values()
                .filter(|pr| status == PrStatus::All || pr.status == status)
                .cloned()
                .collect())
        })
    }

    async fn get_pr_info(&self, id: u64) -> Result<PullRequest, ForgeError> {
        let not_found = self.pr_not_found(id);
        self.with_project(|_, state| state.prs.get(&id).cloned().ok_or(not_found))
    }

    async fn update_pr_info(&self, request: UpdatePrRequest) -> Result<PullRequest, ForgeError> {
        record(
            &self.inner,
            MockOperation::PrUpdate {
                full_repo_name: self.full_repo_name(),
                id: request.id,
                title: request.title.clone(),
                body: request.body.clone(),
            },
        );

        let not_found = self.pr_not_found(request.id);
        self.with_project(|_, state| {
            let pr = state.prs.get_mut(&request.id).ok_or(not_found)?;
            if let Some(title) = request.title {
                pr.title = title;
            }
            if let Some(body) = request.body {
                pr.description = body;
            }
            Ok(pr.clone())
        })
    }

    async fn get_pr_comments(
        &self,
        id: u64,
        filter: &CommentFilter,
    ) -> Result<Vec<Comment>, ForgeError> {
        let not_found = self.pr_not_found(id);
        let comments = self.with_project(|_, state| {
            if !state.prs.contains_key(&id) {
                return Err(not_found);
            }
            Ok(state.pr_comments.get(&id).cloned().unwrap_or_default())
        })?;
        Ok(filter_comments(comments, filter))
    }

    async fn search_in_pr(
        &self,
        id: u64,
        pattern: &Regex,
        reverse: bool,
        include_description: bool,
    ) -> Result<Option<String>, ForgeError> {
        let filter = CommentFilter {
            reverse,
            ..Default::default()
        };
        let mut comments = self.get_pr_comments(id, &filter).await?;

        if include_description {
            let info = self.get_pr_info(id).await?;
            let description = Comment {
                body: info.description,
                author: info.author,
                created: info.created,
                edited: None,
            };
            if reverse {
                comments.push(description);
            } else {
                comments.insert(0, description);
            }
        }

        Ok(search_in_comments(&comments, pattern))
    }

    async fn pr_comment(&self, id: u64, body: &str) -> Result<Comment, ForgeError> {
        record(
            &self.inner,
            MockOperation::PrComment {
                full_repo_name: self.full_repo_name(),
                id,
                body: body.to_string(),
            },
        );

        let not_found = self.pr_not_found(id);
        self.with_project(|username, state| {
            if !state.prs.contains_key(&id) {
                return Err(not_found);
            }
            let comment = Comment {
                body: body.to_string(),
                author: username.to_string(),
                created: Utc::now(),
                edited: None,
            };
            state.pr_comments.entry(id).or_default().push(comment.clone());
            Ok(comment)
        })
    }

    async fn pr_close(&self, id: u64) -> Result<PullRequest, ForgeError> {
        record(
            &self.inner,
            MockOperation::PrClose {
                full_repo_name: self.full_repo_name(),
                id,
            },
        );

        let not_found = self.pr_not_found(id);
        self.with_project(|_, state| {
            let pr = state.prs.get_mut(&id).ok_or(not_found)?;
            pr.status = PrStatus::Closed;
            Ok(pr.clone())
        })
    }

    async fn pr_merge(&self, id: u64) -> Result<PullRequest, ForgeError> {
        record(
            &self.inner,
            MockOperation::PrMerge {
                full_repo_name: self.full_repo_name(),
                id,
            },
        );

        if let Some(result) = check_fail(&self.inner, "pr_merge") {
            return result;
        }

        let not_found = self.pr_not_found(id);
        let merge_url = format!("{}/pull-request/{}/merge", self.get_web_url(), id);
        self.with_project(|_, state| {
            let pr = state.prs.get_mut(&id).ok_or(not_found)?;
            if pr.status != PrStatus::Open {
                return Err(ForgeError::Api {
                    url: merge_url,
                    status: 400,
                    reason: Some("This pull-request was merged or closed".to_string()),
                    body: None,
                });
            }
            pr.status = PrStatus::Merged;
            Ok(pr.clone())
        })
    }

    async fn get_issue_list(&self, status: IssueStatus) -> Result<Vec<Issue>, ForgeError> {
        self.with_project(|_, state| {
            Ok(state
                .issues
                .values()
                .filter(|issue| status == IssueStatus::All || issue.status == status)
                .cloned()
                .collect())
        })
    }

    async fn get_issue_info(&self, id: u64) -> Result<Issue, ForgeError> {
        let not_found = self.issue_not_found(id);
        self.with_project(|_, state| state.issues.get(&id).cloned().ok_or(not_found))
    }

    async fn get_issue_comments(
        &self,
        id: u64,
        filter: &CommentFilter,
    ) -> Result<Vec<Comment>, ForgeError> {
        let not_found = self.issue_not_found(id);
        let comments = self.with_project(|_, state| {
            if !state.issues.contains_key(&id) {
                return Err(not_found);
            }
            Ok(state.issue_comments.get(&id).cloned().unwrap_or_default())
        })?;
        Ok(filter_comments(comments, filter))
    }

    async fn issue_comment(&self, id: u64, body: &str) -> Result<Comment, ForgeError> {
        record(
            &self.inner,
            MockOperation::IssueComment {
                full_repo_name: self.full_repo_name(),
                id,
                body: body.to_string(),
            },
        );

        let not_found = self.issue_not_found(id);
        self.with_project(|username, state| {
            if !state.issues.contains_key(&id) {
                return Err(not_found);
            }
            let comment = Comment {
                body: body.to_string(),
                author: username.to_string(),
                created: Utc::now(),
                edited: None,
            };
            state
                .issue_comments
                .entry(id)
                .or_default()
                .push(comment.clone());
            Ok(comment)
        })
    }

    async fn issue_close(&self, id: u64) -> Result<Issue, ForgeError> {
        record(
            &self.inner,
            MockOperation::IssueClose {
                full_repo_name: self.full_repo_name(),
                id,
            },
        );

        if let Some(result) = check_fail(&self.inner, "issue_close") {
            return result;
        }

        let not_found = self.issue_not_found(id);
        self.with_project(|_, state| {
            let issue = state.issues.get_mut(&id).ok_or(not_found)?;
            issue.status = IssueStatus::Closed;
            Ok(issue.clone())
        })
    }

    async fn get_commit_statuses(&self, commit: &str) -> Result<Vec<CommitFlag>, ForgeError> {
        self.with_project(|_, state| Ok(state.flags.get(commit).cloned().unwrap_or_default()))
    }

    async fn set_commit_status(
        &self,
        request: CommitFlagRequest,
    ) -> Result<CommitFlag, ForgeError> {
        record(
            &self.inner,
            MockOperation::SetCommitStatus {
                full_repo_name: self.full_repo_name(),
                commit: request.commit.clone(),
                state: request.state,
                context: request.context.clone(),
            },
        );

        if let Some(result) = check_fail(&self.inner, "set_commit_status") {
            return result;
        }

        self.with_project(|_, state| {
            let flag = CommitFlag {
                commit: request.commit.clone(),
                state: request.state,
                context: request.context,
                comment: request.description,
                url: request.url,
            };
            state
                .flags
                .entry(request.commit)
                .or_default()
                .push(flag.clone());
            Ok(flag)
        })
    }

    async fn get_fork(&self, create: bool) -> Result<Option<Box<dyn GitProject>>, ForgeError> {
        let username = self.inner.lock().unwrap().username.clone();
        let fork = self.sibling(self.fork_spec(&username));
        if fork.exists().await? {
            return Ok(Some(Box::new(fork)));
        }
        if create {
            Ok(Some(self.fork_create().await?))
        } else {
            Ok(None)
        }
    }

    async fn is_forked(&self) -> Result<bool, ForgeError> {
        let username = self.inner.lock().unwrap().username.clone();
        self.sibling(self.fork_spec(&username)).exists().await
    }

    async fn fork_create(&self) -> Result<Box<dyn GitProject>, ForgeError> {
        record(
            &self.inner,
            MockOperation::ForkCreate {
                full_repo_name: self.full_repo_name(),
            },
        );

        if let Some(result) = check_fail(&self.inner, "fork_create") {
            return result;
        }

        let mut inner = self.inner.lock().unwrap();
        let username = inner.username.clone();
        let fork_spec = self.fork_spec(&username);
        let fork_key = repo_key(&fork_spec);

        if inner.projects.contains_key(&fork_key) {
            return Err(ForgeError::Api {
                url: format!("{}/api/0/fork", self.instance_url),
                status: 400,
                reason: Some(format!("Repo \"{}\" already exists", fork_key)),
                body: None,
            });
        }

        let upstream_key = repo_key(&self.spec);
        let (description, branches) = match inner.projects.get(&upstream_key) {
            Some(upstream) => (upstream.description.clone(), upstream.branches.clone()),
            None => {
                return Err(ForgeError::NotFound {
                    url: format!("{}/{}", self.instance_url, upstream_key),
                    reason: Some("Project not found".to_string()),
                })
            }
        };

        let mut state = ProjectState::new(fork_spec.clone());
        state.description = description;
        state.branches = branches;
        state.owners = vec![username];
        inner.projects.insert(fork_key, state);
        drop(inner);

        Ok(Box::new(self.sibling(fork_spec)))
    }
}

/// The authenticated user over the shared mock state.
#[derive(Debug, Clone)]
pub struct MockUser {
    inner: Arc<Mutex<MockInner>>,
    instance_url: String,
}

#[async_trait]
impl GitUser for MockUser {
    async fn get_username(&self) -> Result<String, ForgeError> {
        Ok(self.inner.lock().unwrap().username.clone())
    }

    async fn get_forks(&self) -> Result<Vec<Box<dyn GitProject>>, ForgeError> {
        let inner = self.inner.lock().unwrap();
        let me = inner.username.clone();
        Ok(inner
            .projects
            .values()
            .filter(|p| p.spec.is_fork && p.spec.username.as_deref() == Some(me.as_str()))
            .map(|p| {
                Box::new(MockProject {
                    inner: Arc::clone(&self.inner),
                    instance_url: self.instance_url.clone(),
                    spec: p.spec.clone(),
                }) as Box<dyn GitProject>
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pr(id: u64, title: &str) -> PullRequest {
        PullRequest {
            id,
            title: title.to_string(),
            description: String::new(),
            status: PrStatus::Open,
            author: "mock-user".to_string(),
            source_branch: "feature".to_string(),
            target_branch: "main".to_string(),
            created: Utc::now(),
        }
    }

    fn issue(id: u64, title: &str) -> Issue {
        Issue {
            id,
            title: title.to_string(),
            description: String::new(),
            status: IssueStatus::Open,
            author: "mock-user".to_string(),
            created: Utc::now(),
        }
    }

    async fn project(service: &MockService, spec: ProjectRef) -> Box<dyn GitProject> {
        service.get_project(spec).await.unwrap()
    }

    #[tokio::test]
    async fn pr_create_assigns_sequential_ids() {
        let service = MockService::new().with_project(&ProjectRef::new("demo"));
        let p = project(&service, ProjectRef::new("demo")).await;

        for expected in 1..=2 {
            let created = p
                .pr_create(CreatePrRequest {
                    title: format!("PR {}", expected),
                    body: None,
                    source_branch: "feature".to_string(),
                    target_branch: "main".to_string(),
                })
                .await
                .unwrap();
            assert_eq!(created.id, expected);
            assert_eq!(created.author, "mock-user");
        }
    }

    #[tokio::test]
    async fn with_pr_starts_ids_after_seeded() {
        let spec = ProjectRef::new("demo");
        let service = MockService::new().with_pr(&spec, pr(42, "Existing"));
        let p = project(&service, spec).await;

        assert_eq!(p.get_pr_info(42).await.unwrap().title, "Existing");

        let new_pr = p
            .pr_create(CreatePrRequest {
                title: "New".to_string(),
                body: None,
                source_branch: "feature".to_string(),
                target_branch: "main".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(new_pr.id, 43);
    }

    #[tokio::test]
    async fn get_pr_info_not_found() {
        let service = MockService::new().with_project(&ProjectRef::new("demo"));
        let p = project(&service, ProjectRef::new("demo")).await;

        let err = p.get_pr_info(999).await.unwrap_err();
        assert!(matches!(err, ForgeError::NotFound { .. }));
    }

    #[tokio::test]
    async fn unregistered_project_is_not_found() {
        let service = MockService::new();
        let p = project(&service, ProjectRef::new("ghost")).await;

        assert!(!p.exists().await.unwrap());
        let err = p.get_description().await.unwrap_err();
        assert!(matches!(err, ForgeError::NotFound { .. }));
    }

    #[tokio::test]
    async fn update_pr_changes_fields() {
        let spec = ProjectRef::new("demo");
        let service = MockService::new().with_pr(&spec, pr(1, "Original"));
        let p = project(&service, spec).await;

        let updated = p
            .update_pr_info(UpdatePrRequest {
                id: 1,
                title: Some("New title".to_string()),
                body: Some("New body".to_string()),
            })
            .await
            .unwrap();

        assert_eq!(updated.title, "New title");
        assert_eq!(updated.description, "New body");
    }

    #[tokio::test]
    async fn pr_list_filters_by_status() {
        let spec = ProjectRef::new("demo");
        let mut closed = pr(2, "Closed one");
        closed.status = PrStatus::Closed;
        let service = MockService::new()
            .with_pr(&spec, pr(1, "Open one"))
            .with_pr(&spec, closed);
        let p = project(&service, spec).await;

        let open = p.get_pr_list(PrStatus::Open).await.unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].id, 1);

        let all = p.get_pr_list(PrStatus::All).await.unwrap();
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn pr_merge_and_merge_again_fails() {
        let spec = ProjectRef::new("demo");
        let service = MockService::new().with_pr(&spec, pr(1, "To merge"));
        let p = project(&service, spec).await;

        let merged = p.pr_merge(1).await.unwrap();
        assert_eq!(merged.status, PrStatus::Merged);

        let err = p.pr_merge(1).await.unwrap_err();
        match err {
            ForgeError::Api { status, reason, .. } => {
                assert_eq!(status, 400);
                assert_eq!(
                    reason.as_deref(),
                    Some("This pull-request was merged or closed")
                );
            }
            other => panic!("expected Api error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn comments_flow_through_shared_state() {
        let spec = ProjectRef::new("demo");
        let service = MockService::new().with_pr(&spec, pr(1, "PR"));
        let p = project(&service, spec.clone()).await;

        p.pr_comment(1, "first").await.unwrap();
        p.pr_comment(1, "second").await.unwrap();

        // A fresh handle sees the same comments.
        let again = project(&service, spec).await;
        let comments = again
            .get_pr_comments(1, &CommentFilter::default())
            .await
            .unwrap();
        assert_eq!(comments.len(), 2);
        assert_eq!(comments[0].body, "first");
        assert_eq!(comments[0].author, "mock-user");
    }

    #[tokio::test]
    async fn comment_filter_applies() {
        let spec = ProjectRef::new("demo");
        let service = MockService::new()
            .with_username("alice")
            .with_pr(&spec, pr(1, "PR"));
        let p = project(&service, spec).await;

        p.pr_comment(1, "from alice").await.unwrap();

        let by_bob = p
            .get_pr_comments(1, &CommentFilter::default().by_author("bob"))
            .await
            .unwrap();
        assert!(by_bob.is_empty());

        let by_alice = p
            .get_pr_comments(1, &CommentFilter::default().by_author("alice"))
            .await
            .unwrap();
        assert_eq!(by_alice.len(), 1);
    }

    #[tokio::test]
    async fn search_in_pr_includes_description_when_asked() {
        let spec = ProjectRef::new("demo");
        let mut seeded = pr(1, "PR");
        seeded.description = "the needle is here".to_string();
        let service = MockService::new().with_pr(&spec, seeded);
        let p = project(&service, spec).await;

        let pattern = Regex::new(r"needle \w+").unwrap();
        assert_eq!(p.search_in_pr(1, &pattern, false, false).await.unwrap(), None);
        assert_eq!(
            p.search_in_pr(1, &pattern, false, true).await.unwrap(),
            Some("needle is".to_string())
        );
    }

    #[tokio::test]
    async fn issue_close_sets_status() {
        let spec = ProjectRef::new("demo");
        let service = MockService::new().with_issue(&spec, issue(4, "Bug"));
        let p = project(&service, spec).await;

        let closed = p.issue_close(4).await.unwrap();
        assert_eq!(closed.status, IssueStatus::Closed);

        let open = p.get_issue_list(IssueStatus::Open).await.unwrap();
        assert!(open.is_empty());
    }

    #[tokio::test]
    async fn file_content_found_and_missing() {
        let spec = ProjectRef::new("demo");
        let service = MockService::new().with_file(&spec, "main", "README.md", "# Demo");
        let p = project(&service, spec).await;

        assert_eq!(
            p.get_file_content("README.md", "main").await.unwrap(),
            "# Demo"
        );
        let err = p.get_file_content("missing.md", "main").await.unwrap_err();
        assert!(matches!(err, ForgeError::NotFound { reason: None, .. }));
    }

    #[tokio::test]
    async fn commit_status_round_trip() {
        let spec = ProjectRef::new("demo");
        let service = MockService::new().with_project(&spec);
        let p = project(&service, spec).await;

        let flag = p
            .set_commit_status(CommitFlagRequest {
                commit: "abc123".to_string(),
                state: CommitStatus::Success,
                context: "ci/build".to_string(),
                description: "build passed".to_string(),
                url: None,
            })
            .await
            .unwrap();
        assert_eq!(flag.state, CommitStatus::Success);

        let flags = p.get_commit_statuses("abc123").await.unwrap();
        assert_eq!(flags.len(), 1);
        assert_eq!(flags[0].context, "ci/build");
    }

    #[tokio::test]
    async fn fork_flow() {
        let spec = ProjectRef::in_namespace("glibc", "rpms");
        let service = MockService::new().with_project(&spec);
        let p = project(&service, spec).await;

        assert!(!p.is_forked().await.unwrap());
        assert!(p.get_fork(false).await.unwrap().is_none());

        let fork = p.get_fork(true).await.unwrap().unwrap();
        assert!(fork.is_fork());
        assert_eq!(fork.full_repo_name(), "fork/mock-user/rpms/glibc");

        assert!(p.is_forked().await.unwrap());

        // Forking again is rejected like the real API does.
        let err = p.fork_create().await.unwrap_err();
        assert!(matches!(err, ForgeError::Api { status: 400, .. }));
    }

    #[tokio::test]
    async fn user_lists_only_own_forks() {
        let mine = ProjectRef {
            repo: "glibc".into(),
            namespace: Some("rpms".into()),
            username: Some("mock-user".into()),
            is_fork: true,
        };
        let theirs = ProjectRef {
            repo: "glibc".into(),
            namespace: Some("rpms".into()),
            username: Some("someone-else".into()),
            is_fork: true,
        };
        let service = MockService::new().with_project(&mine).with_project(&theirs);

        let user = service.user();
        assert_eq!(user.get_username().await.unwrap(), "mock-user");

        let forks = user.get_forks().await.unwrap();
        assert_eq!(forks.len(), 1);
        assert_eq!(forks[0].full_repo_name(), "fork/mock-user/rpms/glibc");
    }

    #[tokio::test]
    async fn fail_on_pr_create() {
        let spec = ProjectRef::new("demo");
        let service = MockService::new()
            .with_project(&spec)
            .fail_on(FailOn::PrCreate(ForgeError::Transport {
                url: "https://mock.example.com".to_string(),
                message: "connection refused".to_string(),
            }));
        let p = project(&service, spec).await;

        let result = p
            .pr_create(CreatePrRequest {
                title: "Doomed".to_string(),
                body: None,
                source_branch: "feature".to_string(),
                target_branch: "main".to_string(),
            })
            .await;
        assert!(matches!(result, Err(ForgeError::Transport { .. })));

        service.clear_fail_on();
        let result = p
            .pr_create(CreatePrRequest {
                title: "Fine now".to_string(),
                body: None,
                source_branch: "feature".to_string(),
                target_branch: "main".to_string(),
            })
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn operations_recorded() {
        let spec = ProjectRef::new("demo");
        let service = MockService::new().with_pr(&spec, pr(1, "PR"));
        let p = project(&service, spec).await;

        p.pr_comment(1, "hello").await.unwrap();
        p.pr_close(1).await.unwrap();

        let ops = service.operations();
        assert_eq!(ops.len(), 2);
        assert!(matches!(ops[0], MockOperation::PrComment { .. }));
        assert!(matches!(ops[1], MockOperation::PrClose { id: 1, .. }));

        service.clear_operations();
        assert!(service.operations().is_empty());
    }

    #[tokio::test]
    async fn project_create_registers_and_rejects_duplicates() {
        let service = MockService::new();
        let created = service
            .project_create(CreateProjectRequest {
                repo: "fresh".to_string(),
                namespace: None,
                description: Some("a fresh repo".to_string()),
            })
            .await
            .unwrap();

        assert!(created.exists().await.unwrap());
        assert_eq!(created.get_description().await.unwrap(), "a fresh repo");

        let err = service
            .project_create(CreateProjectRequest {
                repo: "fresh".to_string(),
                namespace: None,
                description: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ForgeError::Api { status: 400, .. }));
    }

    #[test]
    fn service_name_and_urls() {
        let service = MockService::new();
        assert_eq!(service.name(), "mock");
        assert_eq!(service.instance_url(), "https://mock.example.com");

        let p = service.handle(ProjectRef::in_namespace("glibc", "rpms"));
        assert_eq!(p.get_web_url(), "https://mock.example.com/rpms/glibc");
        let urls = p.get_git_urls();
        assert_eq!(urls.ssh, "ssh://git@mock.example.com/rpms/glibc.git");
    }
}
