//! pagure::user
//!
//! The authenticated user behind a Pagure service token.

use async_trait::async_trait;
use reqwest::Method;
use serde::Deserialize;

use crate::traits::{ForgeError, GitProject, GitUser};
use crate::types::ProjectRef;

use super::project::PagureProject;
use super::service::{decode_payload, PagureService};

/// The user a [`PagureService`] token authenticates as.
///
/// Carries no state of its own; the username is fetched per call.
#[derive(Debug, Clone)]
pub struct PagureUser {
    service: PagureService,
}

impl PagureUser {
    pub(crate) fn new(service: PagureService) -> Self {
        PagureUser { service }
    }
}

#[async_trait]
impl GitUser for PagureUser {
    async fn get_username(&self) -> Result<String, ForgeError> {
        self.service.whoami().await
    }

    async fn get_forks(&self) -> Result<Vec<Box<dyn GitProject>>, ForgeError> {
        let username = self.service.whoami().await?;
        let url = self
            .service
            .get_api_url(&[Some("user"), Some(&username)], true);
        let value = self.service.call_api(&url, Method::GET, &[], &[]).await?;
        let info: UserInfoDto = decode_payload(&url, value)?;

        Ok(info
            .forks
            .into_iter()
            .map(|fork| {
                Box::new(PagureProject::new(
                    self.service.clone(),
                    ProjectRef {
                        repo: fork.name,
                        namespace: fork.namespace,
                        username: Some(username.clone()),
                        is_fork: true,
                    },
                )) as Box<dyn GitProject>
            })
            .collect())
    }
}

/// User info payload (subset this layer consumes).
#[derive(Deserialize)]
struct UserInfoDto {
    #[serde(default)]
    forks: Vec<ForkRefDto>,
}

#[derive(Deserialize)]
struct ForkRefDto {
    name: String,
    namespace: Option<String>,
}
