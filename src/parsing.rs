//! parsing
//!
//! Forge-neutral parsing of git repository URLs.
//!
//! # Design
//!
//! [`parse_git_repo`] breaks a clone or web URL into the pieces the rest of
//! the crate addresses projects by: hostname, optional namespace path, repo
//! name, and fork ownership. The registry keys on the hostname; services
//! consume the rest to build a project handle. Parsing is purely lexical,
//! with no DNS or network involvement.

use crate::traits::ForgeError;

/// The pieces of a parsed repository URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoUrl {
    /// Host the repository lives on (port kept when given)
    pub hostname: String,
    /// Namespace path between host and repo, if any (nested namespaces
    /// join with `/`)
    pub namespace: Option<String>,
    /// Repository name, without any `.git` suffix
    pub repo: String,
    /// Fork owner, when the URL addresses a fork
    pub username: Option<String>,
    /// Whether the URL addresses a fork
    pub is_fork: bool,
}

/// Parse a git repository URL.
///
/// Supports web and clone URL shapes:
/// - `https://pagure.io/namespace/repo`
/// - `https://pagure.io/fork/user/namespace/repo`
/// - `ssh://git@pagure.io/forks/user/repo.git`
/// - `git@pagure.io:namespace/repo.git`
/// - scheme-less `pagure.io/namespace/repo`
///
/// A leading `fork/<user>/` (web and API form) or `forks/<user>/` (ssh
/// form) path marks a fork and is consumed into `username`. A trailing
/// `.git` on the repo name is dropped. Anything without a host and at
/// least one path segment is rejected.
///
/// # Example
///
/// ```
/// use anyforge::parsing::parse_git_repo;
///
/// let repo = parse_git_repo("https://pagure.io/fork/alice/rpms/glibc.git").unwrap();
/// assert_eq!(repo.hostname, "pagure.io");
/// assert_eq!(repo.namespace.as_deref(), Some("rpms"));
/// assert_eq!(repo.repo, "glibc");
/// assert_eq!(repo.username.as_deref(), Some("alice"));
/// assert!(repo.is_fork);
/// ```
pub fn parse_git_repo(potential_url: &str) -> Result<RepoUrl, ForgeError> {
    let url = potential_url.trim().trim_end_matches('/');
    if url.is_empty() {
        return Err(ForgeError::InvalidUrl(potential_url.to_string()));
    }

    let (host_part, path) = if let Some(split) = split_scp_like(url) {
        split
    } else {
        let rest = url
            .strip_prefix("git+ssh://")
            .or_else(|| url.strip_prefix("ssh://"))
            .or_else(|| url.strip_prefix("https://"))
            .or_else(|| url.strip_prefix("http://"))
            .unwrap_or(url);
        match rest.split_once('/') {
            Some((host, path)) => (host, path),
            None => return Err(ForgeError::InvalidUrl(potential_url.to_string())),
        }
    };

    // Drop ssh userinfo ("git@pagure.io" -> "pagure.io").
    let hostname = host_part
        .rsplit_once('@')
        .map(|(_, host)| host)
        .unwrap_or(host_part);
    if hostname.is_empty() {
        return Err(ForgeError::InvalidUrl(potential_url.to_string()));
    }

    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    let mut segments = &segments[..];

    let (is_fork, username) = match segments.first() {
        Some(&"fork") | Some(&"forks") if segments.len() >= 3 => {
            let username = segments[1].to_string();
            segments = &segments[2..];
            (true, Some(username))
        }
        _ => (false, None),
    };

    let (repo_segment, namespace_segments) = match segments.split_last() {
        Some(split) => split,
        None => return Err(ForgeError::InvalidUrl(potential_url.to_string())),
    };
    let repo = repo_segment.strip_suffix(".git").unwrap_or(repo_segment);
    if repo.is_empty() {
        return Err(ForgeError::InvalidUrl(potential_url.to_string()));
    }

    let namespace = if namespace_segments.is_empty() {
        None
    } else {
        Some(namespace_segments.join("/"))
    };

    Ok(RepoUrl {
        hostname: hostname.to_string(),
        namespace,
        repo: repo.to_string(),
        username,
        is_fork,
    })
}

/// Split an scp-style URL (`git@host:path`) into host and path parts.
///
/// Requires the userinfo `@` so that scheme-less host:port URLs don't get
/// mistaken for scp form.
fn split_scp_like(url: &str) -> Option<(&str, &str)> {
    if url.contains("://") || !url.contains('@') {
        return None;
    }
    let (userhost, path) = url.split_once(':')?;
    if !userhost.contains('@') || path.is_empty() {
        return None;
    }
    Some((userhost, path))
}
