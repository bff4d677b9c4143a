//! Anyforge - one typed client for many Git forges
//!
//! Anyforge wraps the HTTP APIs of Git hosting services behind a single set
//! of traits, so tooling can open projects, file pull requests, and read
//! issues without caring which forge serves them. Backends are selected from
//! the repository URL at runtime and returned as trait objects.
//!
//! # Architecture
//!
//! - [`pagure`] - Pagure implementation over its REST API
//! - [`gitlab`] - GitLab comment adapter and service scaffold
//! - [`mock`] - Mock implementation for deterministic testing
//! - [`parsing`] - Git URL parsing shared by every backend
//! - [`comments`] - Comment filtering and search shared by every backend
//! - `factory` - Registry mapping hostnames to backends (re-exported here)
//! - `traits` - Service/project/user traits, requests, and errors
//! - `types` - Unified domain types (PRs, issues, comments, flags)
//!
//! # API Contract
//!
//! Every backend upholds the same rules:
//!
//! 1. Project handles are built without network traffic; requests happen
//!    when an operation is called
//! 2. Checked API calls turn HTTP failures into typed [`ForgeError`]
//!    variants; raw calls hand back the response as-is
//! 3. Read operations work without a token; write operations need one
//!
//! # Example
//!
//! ```ignore
//! use anyforge::{project_from_url, PrStatus};
//!
//! // Build a project handle from any supported forge URL.
//! let project = project_from_url("https://pagure.io/fedora-infra/ansible", token).await?;
//!
//! for pr in project.get_pr_list(PrStatus::Open).await? {
//!     println!("#{} {}", pr.id, pr.title);
//! }
//! ```

pub mod comments;
mod factory;
pub mod gitlab;
pub mod mock;
pub mod pagure;
pub mod parsing;
mod traits;
mod types;

pub use factory::{
    project_from_url, service_from_url, valid_service_names, ServiceFactory, ServiceKind,
    ServiceRegistry,
};
pub use traits::*;
pub use types::*;
