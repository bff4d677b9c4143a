//! pagure::project
//!
//! Project handle: pull requests, issues, comments, files, flags, forks.
//!
//! # Design
//!
//! A [`PagureProject`] is a cheap handle: the (namespace, repo, username,
//! is_fork) key plus a clone of the service it was built from. Identity
//! accessors derive everything locally; remote operations issue one checked
//! call each and decode the payload into the unified types. Nothing is
//! cached between calls.
//!
//! Wire payloads are decoded through private DTOs at the bottom of this
//! file; Pagure reports timestamps as unix-seconds strings, which a custom
//! deserializer turns into `DateTime<Utc>`.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use regex::Regex;
use reqwest::Method;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::comments::{filter_comments, search_in_comments, CommentFilter};
use crate::traits::{
    CommitFlagRequest, CreatePrRequest, ForgeError, GitProject, UpdatePrRequest,
};
use crate::types::{
    Comment, CommitFlag, CommitStatus, GitUrls, Issue, IssueStatus, ProjectRef, PrStatus,
    PullRequest, Release,
};

use super::service::{decode_payload, PagureService};

/// A handle to one project on a Pagure instance.
#[derive(Debug, Clone)]
pub struct PagureProject {
    /// Service the handle was built from (shares session and token state)
    service: PagureService,
    /// Repository name
    repo: String,
    /// Namespace the repository lives in, if any
    namespace: Option<String>,
    /// Fork owner, when the handle points at a fork
    username: Option<String>,
    /// Whether the handle points at a fork
    is_fork: bool,
}

impl PagureProject {
    /// Build a handle from its identifying pieces.
    ///
    /// Fork handles should carry a `username`; [`PagureService::get_project`]
    /// resolves the authenticated user for forks that don't.
    pub(crate) fn new(service: PagureService, spec: ProjectRef) -> Self {
        PagureProject {
            service,
            repo: spec.repo,
            namespace: spec.namespace,
            username: spec.username,
            is_fork: spec.is_fork,
        }
    }

    /// Build the API URL for this project with `tail` segments appended.
    fn project_api_url(&self, tail: &[Option<&str>]) -> String {
        self.project_url(tail, true)
    }

    /// As [`project_api_url`], optionally outside the `/api/0/` root.
    ///
    /// [`project_api_url`]: PagureProject::project_api_url
    fn project_url(&self, tail: &[Option<&str>], add_api_endpoint_part: bool) -> String {
        let mut parts: Vec<Option<&str>> = vec![
            self.is_fork.then_some("fork"),
            if self.is_fork {
                self.username.as_deref()
            } else {
                None
            },
            self.namespace.as_deref(),
            Some(self.repo.as_str()),
        ];
        parts.extend_from_slice(tail);
        self.service.get_api_url(&parts, add_api_endpoint_part)
    }

    /// Fetch the project info payload.
    async fn project_info(&self) -> Result<ProjectInfoDto, ForgeError> {
        let url = self.project_api_url(&[]);
        let value = self.service.call_api(&url, Method::GET, &[], &[]).await?;
        decode_payload(&url, value)
    }

    /// Fetch one PR with its inline comments.
    async fn pr_info(&self, id: u64) -> Result<PullRequestDto, ForgeError> {
        let id_segment = id.to_string();
        let url = self.project_api_url(&[Some("pull-request"), Some(&id_segment)]);
        let value = self.service.call_api(&url, Method::GET, &[], &[]).await?;
        decode_payload(&url, value)
    }

    /// Fetch one issue with its inline comments.
    async fn issue_info(&self, id: u64) -> Result<IssueDto, ForgeError> {
        let id_segment = id.to_string();
        let url = self.project_api_url(&[Some("issue"), Some(&id_segment)]);
        let value = self.service.call_api(&url, Method::GET, &[], &[]).await?;
        decode_payload(&url, value)
    }

    /// The authenticated user's fork of this project, as a handle.
    async fn fork_handle(&self) -> Result<PagureProject, ForgeError> {
        let username = self.service.whoami().await?;
        Ok(PagureProject::new(
            self.service.clone(),
            ProjectRef {
                repo: self.repo.clone(),
                namespace: self.namespace.clone(),
                username: Some(username),
                is_fork: true,
            },
        ))
    }

    /// Raw commit flag payloads, undecoded.
    ///
    /// [`get_commit_statuses`] is the typed view of the same endpoint.
    ///
    /// [`get_commit_statuses`]: GitProject::get_commit_statuses
    pub async fn get_commit_flags(&self, commit: &str) -> Result<Vec<Value>, ForgeError> {
        let url = self.project_api_url(&[Some("c"), Some(commit), Some("flag")]);
        let value = self.service.call_api(&url, Method::GET, &[], &[]).await?;
        let flags: FlagListDto = decode_payload(&url, value)?;
        Ok(flags.flags)
    }
}

#[async_trait]
impl GitProject for PagureProject {
    fn service_name(&self) -> &'static str {
        "pagure"
    }

    fn full_repo_name(&self) -> String {
        let mut parts: Vec<&str> = Vec::new();
        if self.is_fork {
            parts.push("fork");
            if let Some(ref username) = self.username {
                parts.push(username);
            }
        }
        if let Some(ref namespace) = self.namespace {
            parts.push(namespace);
        }
        parts.push(&self.repo);
        parts.join("/")
    }

    fn get_web_url(&self) -> String {
        format!("{}/{}", self.service.instance_url(), self.full_repo_name())
    }

    fn get_git_urls(&self) -> GitUrls {
        let full_repo_name = self.full_repo_name();
        GitUrls {
            git: format!("{}/{}.git", self.service.instance_url(), full_repo_name),
            ssh: format!(
                "ssh://git@{}/{}.git",
                self.service.hostname(),
                full_repo_name
            ),
        }
    }

    fn is_fork(&self) -> bool {
        self.is_fork
    }

    async fn exists(&self) -> Result<bool, ForgeError> {
        match self.project_info().await {
            Ok(_) => Ok(true),
            Err(ForgeError::NotFound { .. }) => Ok(false),
            Err(err) => Err(err),
        }
    }

    async fn get_description(&self) -> Result<String, ForgeError> {
        Ok(self.project_info().await?.description)
    }

    async fn get_branches(&self) -> Result<Vec<String>, ForgeError> {
        let url = self.project_api_url(&[Some("git"), Some("branches")]);
        let value = self.service.call_api(&url, Method::GET, &[], &[]).await?;
        let branches: BranchListDto = decode_payload(&url, value)?;
        Ok(branches.branches)
    }

    async fn get_releases(&self) -> Result<Vec<Release>, ForgeError> {
        // Pagure exposes no release API; git tags are the closest thing and
        // carry no release metadata.
        Ok(Vec::new())
    }

    async fn get_file_content(&self, path: &str, ref_name: &str) -> Result<String, ForgeError> {
        // Raw files live outside /api/0/.
        let url = self.project_url(&[Some("raw"), Some(ref_name), Some("f"), Some(path)], false);
        let response = self.service.call_api_raw(&url, Method::GET, &[], &[]).await?;

        if response.status_code == 404 {
            return Err(ForgeError::NotFound { url, reason: None });
        }
        if !response.ok {
            return Err(ForgeError::Api {
                url,
                status: response.status_code,
                reason: None,
                body: response.json,
            });
        }
        Ok(String::from_utf8_lossy(&response.content).into_owned())
    }

    async fn parent(&self) -> Result<Option<Box<dyn GitProject>>, ForgeError> {
        let info = self.project_info().await?;
        Ok(info.parent.map(|parent| {
            Box::new(PagureProject::new(
                self.service.clone(),
                ProjectRef {
                    repo: parent.name,
                    namespace: parent.namespace,
                    ..Default::default()
                },
            )) as Box<dyn GitProject>
        }))
    }

    async fn get_owners(&self) -> Result<Vec<String>, ForgeError> {
        Ok(self.project_info().await?.access_users.owner)
    }

    async fn who_can_merge_pr(&self) -> Result<Vec<String>, ForgeError> {
        let access = self.project_info().await?.access_users;
        Ok(access.with_commit_access())
    }

    async fn can_merge_pr(&self, username: &str) -> Result<bool, ForgeError> {
        Ok(self
            .who_can_merge_pr()
            .await?
            .iter()
            .any(|u| u == username))
    }

    async fn who_can_close_issue(&self) -> Result<Vec<String>, ForgeError> {
        let access = self.project_info().await?.access_users;
        Ok(access.with_ticket_access())
    }

    async fn can_close_issue(&self, username: &str) -> Result<bool, ForgeError> {
        Ok(self
            .who_can_close_issue()
            .await?
            .iter()
            .any(|u| u == username))
    }

    async fn pr_create(&self, request: CreatePrRequest) -> Result<PullRequest, ForgeError> {
        let url = self.project_api_url(&[Some("pull-request"), Some("new")]);
        let mut form: Vec<(&str, &str)> = vec![
            ("title", request.title.as_str()),
            ("branch_to", request.target_branch.as_str()),
            ("branch_from", request.source_branch.as_str()),
        ];
        if let Some(ref body) = request.body {
            form.push(("initial_comment", body));
        }
        let value = self.service.call_api(&url, Method::POST, &[], &form).await?;
        let pr: PullRequestDto = decode_payload(&url, value)?;
        Ok(pr.into())
    }

    async fn get_pr_list(&self, status: PrStatus) -> Result<Vec<PullRequest>, ForgeError> {
        let url = self.project_api_url(&[Some("pull-requests")]);
        let status_param = status.to_string();
        let params = [("status", status_param.as_str())];
        let value = self.service.call_api(&url, Method::GET, &params, &[]).await?;
        let list: PullRequestListDto = decode_payload(&url, value)?;
        Ok(list.requests.into_iter().map(Into::into).collect())
    }

    async fn get_pr_info(&self, id: u64) -> Result<PullRequest, ForgeError> {
        Ok(self.pr_info(id).await?.into())
    }

    async fn update_pr_info(&self, request: UpdatePrRequest) -> Result<PullRequest, ForgeError> {
        let id_segment = request.id.to_string();
        let url = self.project_api_url(&[Some("pull-request"), Some(&id_segment)]);
        let mut form: Vec<(&str, &str)> = Vec::new();
        if let Some(ref title) = request.title {
            form.push(("title", title));
        }
        if let Some(ref body) = request.body {
            form.push(("initial_comment", body));
        }
        let value = self.service.call_api(&url, Method::POST, &[], &form).await?;
        let pr: PullRequestDto = decode_payload(&url, value)?;
        Ok(pr.into())
    }

    async fn get_pr_comments(
        &self,
        id: u64,
        filter: &CommentFilter,
    ) -> Result<Vec<Comment>, ForgeError> {
        let pr = self.pr_info(id).await?;
        let comments = pr.comments.into_iter().map(Into::into).collect();
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
            // The description is the oldest text on the PR; it joins the
            // search at the position matching the requested order.
            if reverse {
                comments.push(description);
            } else {
                comments.insert(0, description);
            }
        }

        Ok(search_in_comments(&comments, pattern))
    }

    async fn pr_comment(&self, id: u64, body: &str) -> Result<Comment, ForgeError> {
        let id_segment = id.to_string();
        let url = self.project_api_url(&[Some("pull-request"), Some(&id_segment), Some("comment")]);
        let form = [("comment", body)];
        self.service.call_api(&url, Method::POST, &[], &form).await?;

        // The API only answers with a confirmation message; echo the comment
        // back with the authenticated author and the local clock.
        Ok(Comment {
            body: body.to_string(),
            author: self.service.whoami().await?,
            created: Utc::now(),
            edited: None,
        })
    }

    async fn pr_close(&self, id: u64) -> Result<PullRequest, ForgeError> {
        let id_segment = id.to_string();
        let url = self.project_api_url(&[Some("pull-request"), Some(&id_segment), Some("close")]);
        self.service.call_api(&url, Method::POST, &[], &[]).await?;
        self.get_pr_info(id).await
    }

    async fn pr_merge(&self, id: u64) -> Result<PullRequest, ForgeError> {
        let id_segment = id.to_string();
        let url = self.project_api_url(&[Some("pull-request"), Some(&id_segment), Some("merge")]);
        self.service.call_api(&url, Method::POST, &[], &[]).await?;
        self.get_pr_info(id).await
    }

    async fn get_issue_list(&self, status: IssueStatus) -> Result<Vec<Issue>, ForgeError> {
        let url = self.project_api_url(&[Some("issues")]);
        let status_param = status.to_string();
        let params = [("status", status_param.as_str())];
        let value = self.service.call_api(&url, Method::GET, &params, &[]).await?;
        let list: IssueListDto = decode_payload(&url, value)?;
        Ok(list.issues.into_iter().map(Into::into).collect())
    }

    async fn get_issue_info(&self, id: u64) -> Result<Issue, ForgeError> {
        Ok(self.issue_info(id).await?.into())
    }

    async fn get_issue_comments(
        &self,
        id: u64,
        filter: &CommentFilter,
    ) -> Result<Vec<Comment>, ForgeError> {
        let issue = self.issue_info(id).await?;
        let comments = issue.comments.into_iter().map(Into::into).collect();
        Ok(filter_comments(comments, filter))
    }

    async fn issue_comment(&self, id: u64, body: &str) -> Result<Comment, ForgeError> {
        let id_segment = id.to_string();
        let url = self.project_api_url(&[Some("issue"), Some(&id_segment), Some("comment")]);
        let form = [("comment", body)];
        self.service.call_api(&url, Method::POST, &[], &form).await?;

        Ok(Comment {
            body: body.to_string(),
            author: self.service.whoami().await?,
            created: Utc::now(),
            edited: None,
        })
    }

    async fn issue_close(&self, id: u64) -> Result<Issue, ForgeError> {
        let id_segment = id.to_string();
        let url = self.project_api_url(&[Some("issue"), Some(&id_segment), Some("status")]);
        let form = [("status", "Closed")];
        self.service.call_api(&url, Method::POST, &[], &form).await?;
        self.get_issue_info(id).await
    }

    async fn get_commit_statuses(&self, commit: &str) -> Result<Vec<CommitFlag>, ForgeError> {
        let url = self.project_api_url(&[Some("c"), Some(commit), Some("flag")]);
        let value = self.service.call_api(&url, Method::GET, &[], &[]).await?;
        let flags: TypedFlagListDto = decode_payload(&url, value)?;
        Ok(flags.flags.into_iter().map(Into::into).collect())
    }

    async fn set_commit_status(
        &self,
        request: CommitFlagRequest,
    ) -> Result<CommitFlag, ForgeError> {
        let url = self.project_api_url(&[Some("c"), Some(&request.commit), Some("flag")]);
        // Pagure requires a target URL on flags; an empty one is still
        // accepted by test instances.
        let target_url = request.url.as_deref().unwrap_or("");
        let form = [
            ("username", request.context.as_str()),
            ("comment", request.description.as_str()),
            ("url", target_url),
            ("status", request.state.keyword()),
        ];
        let value = self.service.call_api(&url, Method::POST, &[], &form).await?;
        let flag = value
            .get("flag")
            .cloned()
            .ok_or(ForgeError::Decode { url: url.clone() })?;
        let dto: CommitFlagDto = decode_payload(&url, flag)?;
        Ok(dto.into())
    }

    async fn get_fork(&self, create: bool) -> Result<Option<Box<dyn GitProject>>, ForgeError> {
        let fork = self.fork_handle().await?;
        if fork.exists().await? {
            return Ok(Some(Box::new(fork)));
        }
        if create {
            Ok(Some(self.fork_create().await?))
        } else {
            tracing::info!(
                "fork of {} for the authenticated user does not exist",
                self.full_repo_name()
            );
            Ok(None)
        }
    }

    async fn is_forked(&self) -> Result<bool, ForgeError> {
        self.fork_handle().await?.exists().await
    }

    async fn fork_create(&self) -> Result<Box<dyn GitProject>, ForgeError> {
        let fork = self.fork_handle().await?;
        let url = self.service.get_api_url(&[Some("fork")], true);
        let mut form: Vec<(&str, &str)> = vec![("repo", self.repo.as_str()), ("wait", "true")];
        if let Some(ref namespace) = self.namespace {
            form.push(("namespace", namespace));
        }
        self.service.call_api(&url, Method::POST, &[], &form).await?;
        Ok(Box::new(fork))
    }
}

// --------------------------------------------------------------------------
// Wire payloads
// --------------------------------------------------------------------------

/// Project info payload (subset this layer consumes).
#[derive(Deserialize)]
struct ProjectInfoDto {
    description: String,
    parent: Option<ParentInfoDto>,
    #[serde(default)]
    access_users: AccessUsersDto,
}

/// The parent block of a fork's project info.
#[derive(Deserialize)]
struct ParentInfoDto {
    name: String,
    namespace: Option<String>,
}

/// Per-role user lists of a project.
#[derive(Deserialize, Default)]
struct AccessUsersDto {
    #[serde(default)]
    owner: Vec<String>,
    #[serde(default)]
    admin: Vec<String>,
    #[serde(default)]
    commit: Vec<String>,
    #[serde(default)]
    ticket: Vec<String>,
}

impl AccessUsersDto {
    /// Users with at least commit access, sorted and deduplicated.
    fn with_commit_access(self) -> Vec<String> {
        let mut users: Vec<String> = self
            .owner
            .into_iter()
            .chain(self.admin)
            .chain(self.commit)
            .collect();
        users.sort();
        users.dedup();
        users
    }

    /// Users who may act on tickets, sorted and deduplicated.
    fn with_ticket_access(self) -> Vec<String> {
        let mut users: Vec<String> = self
            .owner
            .into_iter()
            .chain(self.admin)
            .chain(self.commit)
            .chain(self.ticket)
            .collect();
        users.sort();
        users.dedup();
        users
    }
}

#[derive(Deserialize)]
struct BranchListDto {
    branches: Vec<String>,
}

/// Pagure PR payload: `branch` is the target, `branch_from` the source.
#[derive(Deserialize)]
struct PullRequestDto {
    id: u64,
    title: String,
    #[serde(default)]
    initial_comment: Option<String>,
    status: String,
    branch: String,
    branch_from: String,
    user: UserRefDto,
    #[serde(deserialize_with = "unix_seconds")]
    date_created: DateTime<Utc>,
    #[serde(default)]
    comments: Vec<CommentDto>,
}

#[derive(Deserialize)]
struct PullRequestListDto {
    requests: Vec<PullRequestDto>,
}

#[derive(Deserialize)]
struct IssueDto {
    id: u64,
    title: String,
    #[serde(default)]
    content: String,
    status: String,
    user: UserRefDto,
    #[serde(deserialize_with = "unix_seconds")]
    date_created: DateTime<Utc>,
    #[serde(default)]
    comments: Vec<CommentDto>,
}

#[derive(Deserialize)]
struct IssueListDto {
    issues: Vec<IssueDto>,
}

#[derive(Deserialize)]
struct CommentDto {
    comment: String,
    user: UserRefDto,
    #[serde(deserialize_with = "unix_seconds")]
    date_created: DateTime<Utc>,
    #[serde(default, deserialize_with = "opt_unix_seconds")]
    edited_on: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
struct UserRefDto {
    name: String,
}

#[derive(Deserialize)]
struct FlagListDto {
    #[serde(default)]
    flags: Vec<Value>,
}

#[derive(Deserialize)]
struct TypedFlagListDto {
    #[serde(default)]
    flags: Vec<CommitFlagDto>,
}

/// Commit flag payload: Pagure calls the flag name `username`.
#[derive(Deserialize)]
struct CommitFlagDto {
    commit_hash: String,
    username: String,
    #[serde(default)]
    comment: String,
    status: String,
    #[serde(default)]
    url: Option<String>,
}

impl From<PullRequestDto> for PullRequest {
    fn from(pr: PullRequestDto) -> Self {
        PullRequest {
            id: pr.id,
            title: pr.title,
            description: pr.initial_comment.unwrap_or_default(),
            status: PrStatus::from_api(&pr.status),
            author: pr.user.name,
            source_branch: pr.branch_from,
            target_branch: pr.branch,
            created: pr.date_created,
        }
    }
}

impl From<IssueDto> for Issue {
    fn from(issue: IssueDto) -> Self {
        Issue {
            id: issue.id,
            title: issue.title,
            description: issue.content,
            status: IssueStatus::from_api(&issue.status),
            author: issue.user.name,
            created: issue.date_created,
        }
    }
}

impl From<CommentDto> for Comment {
    fn from(comment: CommentDto) -> Self {
        Comment {
            body: comment.comment,
            author: comment.user.name,
            created: comment.date_created,
            edited: comment.edited_on,
        }
    }
}

impl From<CommitFlagDto> for CommitFlag {
    fn from(flag: CommitFlagDto) -> Self {
        CommitFlag {
            commit: flag.commit_hash,
            state: CommitStatus::from_keyword(&flag.status),
            context: flag.username,
            comment: flag.comment,
            url: flag.url.filter(|u| !u.is_empty()),
        }
    }
}

/// Pagure reports timestamps as unix seconds, usually as a string.
#[derive(Deserialize)]
#[serde(untagged)]
enum UnixSecondsRepr {
    Text(String),
    Number(i64),
}

impl UnixSecondsRepr {
    fn into_datetime<E: serde::de::Error>(self) -> Result<DateTime<Utc>, E> {
        let seconds = match self {
            UnixSecondsRepr::Text(text) => text.parse::<i64>().map_err(E::custom)?,
            UnixSecondsRepr::Number(number) => number,
        };
        Utc.timestamp_opt(seconds, 0)
            .single()
            .ok_or_else(|| E::custom(format!("unix timestamp out of range: {}", seconds)))
    }
}

fn unix_seconds<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
    UnixSecondsRepr::deserialize(deserializer)?.into_datetime()
}

fn opt_unix_seconds<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<DateTime<Utc>>, D::Error> {
    match Option::<UnixSecondsRepr>::deserialize(deserializer)? {
        Some(repr) => repr.into_datetime().map(Some),
        None => Ok(None),
    }
}
