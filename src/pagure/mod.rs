//! pagure
//!
//! Pagure implementation of the forge traits (pagure.io,
//! src.fedoraproject.org, self-hosted instances).
//!
//! # Modules
//!
//! - `service`: session, URL building, raw and checked API calls
//! - `project`: project handle carrying PRs, issues, files, flags, forks
//! - `user`: the authenticated user behind the token
//!
//! # Example
//!
//! ```ignore
//! use anyforge::pagure::PagureService;
//! use anyforge::{GitProject, PrStatus, ServiceConfig};
//!
//! let service = PagureService::new(ServiceConfig::with_token(token))?;
//! let project = service
//!     .get_project_from_url("https://pagure.io/ogr-tests")
//!     .await?;
//!
//! for pr in project.get_pr_list(PrStatus::Open).await? {
//!     println!("#{}: {}", pr.id, pr.title);
//! }
//! ```

mod project;
mod service;
mod user;

pub use project::PagureProject;
pub use service::{PagureService, RequestResponse};
pub use user::PagureUser;
