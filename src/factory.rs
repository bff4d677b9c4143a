//! factory
//!
//! Service selection and creation.
//!
//! # Design
//!
//! One explicit registry maps hostnames and keywords onto service
//! factories. Callers resolve a URL through the registry instead of
//! importing specific service implementations, and self-hosted instances
//! are covered two ways:
//!
//! - an exact hostname key (`src.fedoraproject.org`) pins one instance to
//!   one service;
//! - a keyword key (`pagure`, `gitlab`) matches anywhere in the hostname,
//!   so `gitlab.example.com` finds the GitLab service without its own
//!   entry.
//!
//! Exact matches always win over keyword matches, and keyword matches are
//! tried in key order, so resolution is deterministic. Unknown hosts get
//! extra keys via [`ServiceRegistry::register`].
//!
//! # Example
//!
//! ```ignore
//! use anyforge::project_from_url;
//!
//! let project = project_from_url("https://pagure.io/ogr-tests", Some(token)).await?;
//! println!("{}", project.full_repo_name());
//! ```

use std::collections::BTreeMap;

use crate::gitlab::GitlabService;
use crate::pagure::PagureService;
use crate::parsing::parse_git_repo;
use crate::traits::{ForgeError, GitProject, GitService, ServiceConfig};

/// Builds a service from construction parameters.
pub type ServiceFactory = fn(ServiceConfig) -> Result<Box<dyn GitService>, ForgeError>;

/// Supported service backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceKind {
    /// Pagure (pagure.io, src.fedoraproject.org, self-hosted)
    Pagure,
    /// GitLab (note conversion only)
    Gitlab,
}

impl ServiceKind {
    /// All service backends this build knows about.
    pub fn all() -> &'static [ServiceKind] {
        &[ServiceKind::Pagure, ServiceKind::Gitlab]
    }

    /// The service name, as [`GitService::name`] reports it.
    pub fn name(&self) -> &'static str {
        match self {
            ServiceKind::Pagure => "pagure",
            ServiceKind::Gitlab => "gitlab",
        }
    }

    /// Registry keys this backend claims by default.
    ///
    /// Bare words are keywords (substring match); dotted entries are exact
    /// hostnames.
    fn registry_keys(&self) -> &'static [&'static str] {
        match self {
            ServiceKind::Pagure => &["pagure", "pagure.io", "src.fedoraproject.org"],
            ServiceKind::Gitlab => &["gitlab"],
        }
    }

    fn factory(&self) -> ServiceFactory {
        match self {
            ServiceKind::Pagure => pagure_factory,
            ServiceKind::Gitlab => gitlab_factory,
        }
    }
}

impl std::fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

fn pagure_factory(config: ServiceConfig) -> Result<Box<dyn GitService>, ForgeError> {
    Ok(Box::new(PagureService::new(config)?))
}

fn gitlab_factory(config: ServiceConfig) -> Result<Box<dyn GitService>, ForgeError> {
    Ok(Box::new(GitlabService::new(config)))
}

/// Names of all known services, for configuration validation.
pub fn valid_service_names() -> Vec<&'static str> {
    ServiceKind::all().iter().map(|kind| kind.name()).collect()
}

/// Maps hostnames and keywords onto service factories.
#[derive(Debug, Clone)]
pub struct ServiceRegistry {
    factories: BTreeMap<String, ServiceFactory>,
}

impl ServiceRegistry {
    /// An empty registry; resolves nothing until keys are registered.
    pub fn new() -> Self {
        ServiceRegistry {
            factories: BTreeMap::new(),
        }
    }

    /// A registry preloaded with every known backend's default keys.
    pub fn with_defaults() -> Self {
        let mut registry = ServiceRegistry::new();
        for kind in ServiceKind::all() {
            for key in kind.registry_keys() {
                registry.register(*key, kind.factory());
            }
        }
        registry
    }

    /// Map `key` onto `factory`, replacing any earlier mapping.
    ///
    /// A dotted key acts as an exact hostname; a bare word matches as a
    /// substring of the hostname.
    pub fn register(&mut self, key: impl Into<String>, factory: ServiceFactory) {
        self.factories.insert(key.into(), factory);
    }

    /// Resolve the factory responsible for `url`.
    ///
    /// # Errors
    ///
    /// - `InvalidUrl` if the URL cannot be parsed
    /// - `UnknownService` if no key matches the hostname
    pub fn resolve(&self, url: &str) -> Result<ServiceFactory, ForgeError> {
        let hostname = parse_git_repo(url)?.hostname;
        self.factory_for_hostname(&hostname)
            .ok_or_else(|| self.unknown_service(url))
    }

    /// Build a service for `url`, authenticated per `config`.
    ///
    /// The instance URL is always derived from the URL's hostname; an
    /// `instance_url` already present in `config` is ignored.
    pub fn service_from_url(
        &self,
        url: &str,
        config: ServiceConfig,
    ) -> Result<Box<dyn GitService>, ForgeError> {
        let hostname = parse_git_repo(url)?.hostname;
        let factory = self
            .factory_for_hostname(&hostname)
            .ok_or_else(|| self.unknown_service(url))?;
        factory(ServiceConfig {
            instance_url: Some(format!("https://{}", hostname)),
            ..config
        })
    }

    /// Build a service for `url` and resolve the project the URL names.
    pub async fn project_from_url(
        &self,
        url: &str,
        config: ServiceConfig,
    ) -> Result<Box<dyn GitProject>, ForgeError> {
        let service = self.service_from_url(url, config)?;
        service.get_project_from_url(url).await
    }

    fn factory_for_hostname(&self, hostname: &str) -> Option<ServiceFactory> {
        if let Some(factory) = self.factories.get(hostname) {
            return Some(*factory);
        }
        // Keyword fallback; key order makes the first match deterministic.
        self.factories
            .iter()
            .find(|(key, _)| hostname.contains(key.as_str()))
            .map(|(_, factory)| *factory)
    }

    fn unknown_service(&self, url: &str) -> ForgeError {
        ForgeError::UnknownService {
            url: url.to_string(),
            known: self
                .factories
                .keys()
                .map(String::as_str)
                .collect::<Vec<_>>()
                .join(", "),
        }
    }
}

impl Default for ServiceRegistry {
    /// Same as [`ServiceRegistry::with_defaults`].
    fn default() -> Self {
        ServiceRegistry::with_defaults()
    }
}

/// Build a service for `url` from the default registry.
pub fn service_from_url(
    url: &str,
    token: Option<&str>,
) -> Result<Box<dyn GitService>, ForgeError> {
    ServiceRegistry::with_defaults().service_from_url(
        url,
        ServiceConfig {
            token: token.map(String::from),
            ..Default::default()
        },
    )
}

/// Resolve the project a URL names, using the default registry.
pub async fn project_from_url(
    url: &str,
    token: Option<&str>,
) -> Result<Box<dyn GitProject>, ForgeError> {
    let registry = ServiceRegistry::with_defaults();
    registry
        .project_from_url(
            url,
            ServiceConfig {
                token: token.map(String::from),
                ..Default::default()
            },
        )
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    mod service_kind {
        use super::*;

        #[test]
        fn name_returns_lowercase() {
            assert_eq!(ServiceKind::Pagure.name(), "pagure");
            assert_eq!(ServiceKind::Gitlab.name(), "gitlab");
        }

        #[test]
        fn display() {
            assert_eq!(format!("{}", ServiceKind::Pagure), "pagure");
        }

        #[test]
        fn all_includes_every_backend() {
            let all = ServiceKind::all();
            assert!(all.contains(&ServiceKind::Pagure));
            assert!(all.contains(&ServiceKind::Gitlab));
        }
    }

    mod registry {
        use super::*;

        #[test]
        fn exact_hostname_match() {
            let service = ServiceRegistry::with_defaults()
                .service_from_url("https://pagure.io/ogr-tests", ServiceConfig::default())
                .unwrap();
            assert_eq!(service.name(), "pagure");
        }

        #[test]
        fn fedora_dist_git_is_pagure() {
            let service = ServiceRegistry::with_defaults()
                .service_from_url(
                    "https://src.fedoraproject.org/rpms/glibc",
                    ServiceConfig::default(),
                )
                .unwrap();
            assert_eq!(service.name(), "pagure");
            assert_eq!(service.instance_url(), "https://src.fedoraproject.org");
        }

        #[test]
        fn keyword_matches_self_hosted_instance() {
            let registry = ServiceRegistry::with_defaults();

            let pagure = registry
                .service_from_url("https://pagure.example.com/some/repo", ServiceConfig::default())
                .unwrap();
            assert_eq!(pagure.name(), "pagure");

            let gitlab = registry
                .service_from_url("https://gitlab.cee.example.com/g/p", ServiceConfig::default())
                .unwrap();
            assert_eq!(gitlab.name(), "gitlab");
        }

        #[test]
        fn exact_match_wins_over_keyword() {
            // An instance whose hostname contains a keyword can still be
            // pinned to a different backend with an exact key.
            fn pagure_backed(config: ServiceConfig) -> Result<Box<dyn GitService>, ForgeError> {
                Ok(Box::new(PagureService::new(config)?))
            }

            let mut registry = ServiceRegistry::with_defaults();
            registry.register("gitlab.gnome.org", pagure_backed);

            let service = registry
                .service_from_url("https://gitlab.gnome.org/GNOME/glib", ServiceConfig::default())
                .unwrap();
            assert_eq!(service.name(), "pagure");
        }

        #[test]
        fn register_adds_custom_key() {
            fn pagure_backed(config: ServiceConfig) -> Result<Box<dyn GitService>, ForgeError> {
                Ok(Box::new(PagureService::new(config)?))
            }

            let mut registry = ServiceRegistry::new();
            assert!(registry.resolve("https://git.example.com/repo").is_err());

            registry.register("git.example.com", pagure_backed);
            assert!(registry.resolve("https://git.example.com/repo").is_ok());
        }

        #[test]
        fn unknown_hostname_is_an_error() {
            let err = ServiceRegistry::with_defaults()
                .resolve("https://github.com/owner/repo")
                .unwrap_err();
            match err {
                ForgeError::UnknownService { url, known } => {
                    assert_eq!(url, "https://github.com/owner/repo");
                    assert!(known.contains("pagure"));
                    assert!(known.contains("gitlab"));
                }
                other => panic!("expected UnknownService, got {:?}", other),
            }
        }

        #[test]
        fn invalid_url_propagates() {
            let err = ServiceRegistry::with_defaults()
                .resolve("not a url")
                .unwrap_err();
            assert!(matches!(err, ForgeError::InvalidUrl(_)));
        }

        #[test]
        fn instance_url_derives_from_hostname() {
            let service = service_from_url("https://pagure.io/rpms/glibc", None).unwrap();
            assert_eq!(service.instance_url(), "https://pagure.io");
        }

        #[tokio::test]
        async fn project_from_url_builds_handle() {
            // Plain (non-fork) project handles are built without touching
            // the network.
            let project = project_from_url("https://pagure.io/rpms/glibc", None)
                .await
                .unwrap();
            assert_eq!(project.service_name(), "pagure");
            assert_eq!(project.full_repo_name(), "rpms/glibc");
            assert!(!project.is_fork());
        }
    }

    mod valid_names {
        use super::*;

        #[test]
        fn includes_every_backend() {
            let names = valid_service_names();
            assert!(names.contains(&"pagure"));
            assert!(names.contains(&"gitlab"));
        }
    }
}
