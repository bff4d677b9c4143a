//! pagure::service
//!
//! Pagure service client: session, URL building, raw and checked API calls.
//!
//! # Design
//!
//! [`PagureService`] owns one HTTP client and the auth state derived from
//! the configured token. Everything higher up (projects, users) goes through
//! two entry points:
//!
//! - [`call_api_raw`] issues a request and hands back the response as-is:
//!   status, raw bytes, and the JSON body when one decoded. A non-JSON body
//!   is not an error here; file-content endpoints depend on that.
//! - [`call_api`] wraps the raw call and raises on anything but a decoded
//!   2xx: 404 becomes `NotFound`, a missing JSON body becomes `Decode`
//!   whatever the status, and any other non-success becomes `Api` carrying
//!   the decoded error payload.
//!
//! Connection-level failures are retried up to the configured bound before
//! surfacing as `Transport`; HTTP responses are never retried.
//!
//! Service handles are cheap clones sharing the session and the token
//! state, so [`change_token`] is observed by every project and user handle
//! already built from this service.
//!
//! [`call_api_raw`]: PagureService::call_api_raw
//! [`call_api`]: PagureService::call_api
//! [`change_token`]: PagureService::change_token

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use reqwest::{Client, Method, Response};
use serde_json::Value;

use crate::parsing::parse_git_repo;
use crate::traits::{
    CreateProjectRequest, ForgeError, GitProject, GitService, GitUser, ServiceConfig,
};
use crate::types::ProjectRef;

use super::project::PagureProject;
use super::user::PagureUser;

/// Default Pagure instance URL.
const DEFAULT_INSTANCE_URL: &str = "https://src.fedoraproject.org";

/// Decode a checked-call payload into a typed value.
///
/// A body that decoded as JSON but doesn't match the expected shape is the
/// same failure class as no JSON at all.
pub(crate) fn decode_payload<T: serde::de::DeserializeOwned>(
    url: &str,
    value: Value,
) -> Result<T, ForgeError> {
    serde_json::from_value(value).map_err(|err| {
        tracing::debug!("unexpected payload shape from `{url}`: {err}");
        ForgeError::Decode {
            url: url.to_string(),
        }
    })
}

/// A response as the API returned it, before any success checking.
///
/// Exactly one of "`json` is present" / "`json` is absent" holds; callers
/// branch on that before touching decoded fields.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestResponse {
    /// HTTP status code
    pub status_code: u16,
    /// Whether the status is in the 2xx range
    pub ok: bool,
    /// Raw response body
    pub content: Vec<u8>,
    /// Decoded JSON body, when the body was valid JSON
    pub json: Option<Value>,
    /// Canonical reason phrase for the status
    pub reason: String,
}

/// Token and the auth header derived from it.
///
/// The header is recomputed only when the token changes, never per request.
struct AuthState {
    token: Option<String>,
    header: Option<String>,
}

impl AuthState {
    fn new(token: Option<String>) -> Self {
        let header = token.as_deref().map(|t| format!("token {}", t));
        AuthState { token, header }
    }
}

/// Pagure service client.
///
/// Implements the `GitService` trait for Pagure-family forges
/// (pagure.io, src.fedoraproject.org, self-hosted instances).
#[derive(Clone)]
pub struct PagureService {
    /// HTTP client for making requests
    client: Client,
    /// Forge instance base URL, no trailing slash
    instance_url: String,
    /// Token + derived header, shared across handle clones
    auth: Arc<RwLock<AuthState>>,
    /// Advisory read-only marker
    read_only: bool,
    /// Retry bound for connection-level failures
    max_retries: u32,
}

// Custom Debug to avoid exposing the token
impl std::fmt::Debug for PagureService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let has_token = self
            .auth
            .read()
            .map(|a| a.token.is_some())
            .unwrap_or(false);
        f.debug_struct("PagureService")
            .field("instance_url", &self.instance_url)
            .field("has_token", &has_token)
            .field("read_only", &self.read_only)
            .field("max_retries", &self.max_retries)
            .finish()
    }
}

impl PagureService {
    /// Create a Pagure service from construction parameters.
    ///
    /// Falls back to `https://src.fedoraproject.org` when no instance URL
    /// is given. With `insecure`, TLS certificate verification is disabled
    /// for self-signed instances.
    pub fn new(config: ServiceConfig) -> Result<PagureService, ForgeError> {
        let instance_url = config
            .instance_url
            .unwrap_or_else(|| DEFAULT_INSTANCE_URL.to_string())
            .trim_end_matches('/')
            .to_string();

        let client = Client::builder()
            .danger_accept_invalid_certs(config.insecure)
            .build()
            .map_err(|err| ForgeError::Transport {
                url: instance_url.clone(),
                message: format!("cannot build HTTP client: {}", err),
            })?;

        Ok(PagureService {
            client,
            instance_url,
            auth: Arc::new(RwLock::new(AuthState::new(config.token))),
            read_only: config.read_only,
            max_retries: config.max_retries,
        })
    }

    /// The advisory read-only marker this service was built with.
    pub fn read_only(&self) -> bool {
        self.read_only
    }

    /// Base URL of the instance this service talks to, no trailing slash.
    pub fn instance_url(&self) -> &str {
        &self.instance_url
    }

    /// Hostname of the instance (no scheme), as it appears in ssh URLs.
    pub fn hostname(&self) -> &str {
        let rest = self
            .instance_url
            .strip_prefix("https://")
            .or_else(|| self.instance_url.strip_prefix("http://"))
            .unwrap_or(&self.instance_url);
        rest.split('/').next().unwrap_or(rest)
    }

    /// API root of the instance: `{instance_url}/api/0/`.
    pub fn api_url(&self) -> String {
        format!("{}/api/0/", self.instance_url)
    }

    /// Build a URL from path segments, skipping absent ones.
    ///
    /// With `add_api_endpoint_part` the segments go under [`api_url`];
    /// otherwise directly under the instance URL. No double slashes are
    /// produced either way.
    ///
    /// [`api_url`]: PagureService::api_url
    pub fn get_api_url(&self, parts: &[Option<&str>], add_api_endpoint_part: bool) -> String {
        let joined = parts
            .iter()
            .flatten()
            .copied()
            .collect::<Vec<&str>>()
            .join("/");

        if add_api_endpoint_part {
            format!("{}{}", self.api_url(), joined)
        } else {
            format!("{}/{}", self.instance_url, joined)
        }
    }

    /// Replace the token and recompute the auth header.
    ///
    /// Every handle cloned from this service sends the new header from the
    /// next request on; requests already in flight keep the old one.
    pub fn change_token(&self, token: impl Into<String>) {
        let token = token.into();
        let mut auth = self.auth.write().expect("auth state lock poisoned");
        auth.header = Some(format!("token {}", token));
        auth.token = Some(token);
    }

    /// The current `Authorization` header value, when a token is set.
    fn auth_header(&self) -> Option<String> {
        self.auth
            .read()
            .expect("auth state lock poisoned")
            .header
            .clone()
    }

    /// Issue a request and return the response without success checking.
    ///
    /// Query `params` and form `data` are skipped when empty. Connection
    /// failures are retried up to the configured bound; any other transport
    /// failure surfaces immediately as `Transport`. A body that is not
    /// valid JSON is kept as raw bytes with `json` absent, not an error.
    pub async fn call_api_raw(
        &self,
        url: &str,
        method: Method,
        params: &[(&str, &str)],
        data: &[(&str, &str)],
    ) -> Result<RequestResponse, ForgeError> {
        let mut attempt: u32 = 0;
        loop {
            match self.send_request(url, method.clone(), params, data).await {
                Ok(response) => return self.read_response(url, response).await,
                Err(err) if err.is_connect() && attempt < self.max_retries => {
                    attempt += 1;
                    tracing::warn!(
                        "connection to `{url}` failed, retrying ({attempt}/{}): {err}",
                        self.max_retries
                    );
                }
                Err(err) => {
                    tracing::error!("request to `{url}` failed: {err}");
                    return Err(ForgeError::Transport {
                        url: url.to_string(),
                        message: err.to_string(),
                    });
                }
            }
        }
    }

    /// One request attempt with the configured auth header.
    async fn send_request(
        &self,
        url: &str,
        method: Method,
        params: &[(&str, &str)],
        data: &[(&str, &str)],
    ) -> Result<Response, reqwest::Error> {
        let mut request = self.client.request(method, url);
        if let Some(header) = self.auth_header() {
            request = request.header(AUTHORIZATION, header);
        }
        if !params.is_empty() {
            request = request.query(params);
        }
        if !data.is_empty() {
            request = request.form(data);
        }
        request.send().await
    }

    /// Read a response body into a [`RequestResponse`], attempting JSON
    /// decoding and degrading to raw bytes when the body is not JSON.
    async fn read_response(
        &self,
        url: &str,
        response: Response,
    ) -> Result<RequestResponse, ForgeError> {
        let status = response.status();
        let reason = status.canonical_reason().unwrap_or("").to_string();
        let content = response
            .bytes()
            .await
            .map_err(|err| ForgeError::Transport {
                url: url.to_string(),
                message: err.to_string(),
            })?
            .to_vec();

        let json = match serde_json::from_slice(&content) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::debug!(
                    "non-JSON response from `{url}`: {}",
                    String::from_utf8_lossy(&content)
                );
                None
            }
        };

        Ok(RequestResponse {
            status_code: status.as_u16(),
            ok: status.is_success(),
            content,
            json,
            reason,
        })
    }

    /// Issue a request and return the decoded JSON body, raising on any
    /// non-success outcome.
    ///
    /// # Errors
    ///
    /// - `NotFound` on 404, with the body's `error` string when present
    /// - `Decode` when the body is missing or not JSON, whatever the status
    /// - `Api` on any other non-2xx, carrying the decoded error payload
    /// - `Transport` when the request never produced a response
    pub async fn call_api(
        &self,
        url: &str,
        method: Method,
        params: &[(&str, &str)],
        data: &[(&str, &str)],
    ) -> Result<Value, ForgeError> {
        let response = self.call_api_raw(url, method, params, data).await?;

        if response.status_code == 404 {
            let reason = response
                .json
                .as_ref()
                .and_then(|json| json.get("error"))
                .and_then(|err| err.as_str())
                .map(String::from);
            return Err(ForgeError::NotFound {
                url: url.to_string(),
                reason,
            });
        }

        let json = match response.json {
            Some(json) => json,
            None => {
                return Err(ForgeError::Decode {
                    url: url.to_string(),
                })
            }
        };

        if !response.ok {
            tracing::error!("API error from `{url}`: {json}");
            let reason = json
                .get("error")
                .and_then(|err| err.as_str())
                .map(String::from);
            return Err(ForgeError::Api {
                url: url.to_string(),
                status: response.status_code,
                reason,
                body: Some(json),
            });
        }

        Ok(json)
    }

    /// Get the API version the instance reports.
    pub async fn get_api_version(&self) -> Result<String, ForgeError> {
        let url = self.get_api_url(&[Some("version")], true);
        let value = self.call_api(&url, Method::GET, &[], &[]).await?;
        value
            .get("version")
            .and_then(|v| v.as_str())
            .map(String::from)
            .ok_or(ForgeError::Decode { url })
    }

    /// Get the error codes the instance can answer with.
    pub async fn get_error_codes(&self) -> Result<Value, ForgeError> {
        let url = self.get_api_url(&[Some("error_codes")], true);
        self.call_api(&url, Method::GET, &[], &[]).await
    }

    /// Username the configured token authenticates as.
    pub async fn whoami(&self) -> Result<String, ForgeError> {
        let url = self.get_api_url(&[Some("-"), Some("whoami")], true);
        let value = self.call_api(&url, Method::POST, &[], &[]).await?;
        value
            .get("username")
            .and_then(|v| v.as_str())
            .map(String::from)
            .ok_or(ForgeError::Decode { url })
    }

    /// Create a new project and return a handle to it.
    ///
    /// The API call waits for the project to exist before returning; no
    /// further verification is done here. A namespace the forge rejects as
    /// "Not a valid choice" surfaces as `InvalidNamespace`; every other
    /// failure propagates unchanged.
    pub async fn project_create(
        &self,
        request: CreateProjectRequest,
    ) -> Result<PagureProject, ForgeError> {
        let url = self.get_api_url(&[Some("new")], true);
        let description = request
            .description
            .clone()
            .unwrap_or_else(|| request.repo.clone());

        let mut form: Vec<(&str, &str)> = vec![
            ("name", request.repo.as_str()),
            ("description", description.as_str()),
            ("wait", "true"),
        ];
        if let Some(ref namespace) = request.namespace {
            form.push(("namespace", namespace));
        }

        if let Err(err) = self.call_api(&url, Method::POST, &[], &form).await {
            if let ForgeError::Api {
                body: Some(ref body),
                ..
            } = err
            {
                let namespace_error = body
                    .pointer("/errors/namespace/0")
                    .and_then(|v| v.as_str());
                if namespace_error == Some("Not a valid choice") {
                    return Err(ForgeError::InvalidNamespace {
                        namespace: request.namespace.clone().unwrap_or_default(),
                    });
                }
            }
            return Err(err);
        }

        Ok(PagureProject::new(
            self.clone(),
            ProjectRef {
                repo: request.repo,
                namespace: request.namespace,
                ..Default::default()
            },
        ))
    }

    /// Build a handle to the project described by `spec`.
    ///
    /// A fork with no explicit owner belongs to the authenticated user,
    /// which costs one `whoami` call; plain projects are built locally.
    pub async fn get_project(&self, spec: ProjectRef) -> Result<PagureProject, ForgeError> {
        let username = match spec.username {
            Some(username) => Some(username),
            None if spec.is_fork => Some(self.whoami().await?),
            None => None,
        };
        Ok(PagureProject::new(
            self.clone(),
            ProjectRef { username, ..spec },
        ))
    }

    /// Parse a repository URL and build a handle to the project it names.
    pub async fn get_project_from_url(&self, url: &str) -> Result<PagureProject, ForgeError> {
        let repo_url = parse_git_repo(url)?;
        self.get_project(ProjectRef {
            repo: repo_url.repo,
            namespace: repo_url.namespace,
            username: repo_url.username,
            is_fork: repo_url.is_fork,
        })
        .await
    }

    /// The user the service token authenticates as.
    pub fn user(&self) -> PagureUser {
        PagureUser::new(self.clone())
    }
}

#[async_trait]
impl GitService for PagureService {
    fn name(&self) -> &'static str {
        "pagure"
    }

    fn instance_url(&self) -> &str {
        &self.instance_url
    }

    async fn get_project(&self, spec: ProjectRef) -> Result<Box<dyn GitProject>, ForgeError> {
        Ok(Box::new(PagureService::get_project(self, spec).await?))
    }

    async fn get_project_from_url(&self, url: &str) -> Result<Box<dyn GitProject>, ForgeError> {
        Ok(Box::new(
            PagureService::get_project_from_url(self, url).await?,
        ))
    }

    async fn project_create(
        &self,
        request: CreateProjectRequest,
    ) -> Result<Box<dyn GitProject>, ForgeError> {
        Ok(Box::new(PagureService::project_create(self, request).await?))
    }

    fn user(&self) -> Box<dyn GitUser> {
        Box::new(PagureService::user(self))
    }
}
