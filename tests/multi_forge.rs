//! Cross-service integration tests.
//!
//! These tests verify URL resolution through the service registry and drive
//! complete workflows through the trait objects, so nothing below this file
//! depends on a concrete backend type.

use anyforge::mock::{FailOn, MockOperation, MockService};
use anyforge::parsing::parse_git_repo;
use anyforge::{
    valid_service_names, CommitFlagRequest, CommitStatus, CreatePrRequest, ForgeError,
    GitProject, GitService, Issue, IssueStatus, ProjectRef, PrStatus, ServiceConfig,
    ServiceKind, ServiceRegistry,
};
use chrono::Utc;

// =============================================================================
// Registry resolution
// =============================================================================

mod registry_resolution {
    use super::*;

    fn open(url: &str) -> Result<Box<dyn GitService>, ForgeError> {
        ServiceRegistry::with_defaults().service_from_url(url, ServiceConfig::default())
    }

    #[test]
    fn known_hostnames_resolve_to_their_service() {
        let cases = [
            ("https://pagure.io/rpms/glibc", "pagure"),
            ("https://src.fedoraproject.org/rpms/glibc", "pagure"),
            ("https://pagure.example.com/namespace/repo", "pagure"),
            ("https://gitlab.gnome.org/GNOME/gtk", "gitlab"),
        ];

        for (url, expected) in cases {
            let service = open(url).unwrap();
            assert_eq!(service.name(), expected, "for {}", url);
        }
    }

    #[test]
    fn instance_url_is_derived_from_the_repo_url() {
        let service = open("https://src.fedoraproject.org/rpms/glibc").unwrap();
        assert_eq!(service.instance_url(), "https://src.fedoraproject.org");
    }

    #[test]
    fn unknown_hostname_names_the_known_services() {
        let err = open("https://github.com/owner/repo").unwrap_err();
        match err {
            ForgeError::UnknownService { url, known } => {
                assert_eq!(url, "https://github.com/owner/repo");
                assert!(known.contains("pagure"));
                assert!(known.contains("gitlab"));
            }
            other => panic!("expected UnknownService, got {:?}", other),
        }
    }

    fn mock_factory(_config: ServiceConfig) -> Result<Box<dyn GitService>, ForgeError> {
        Ok(Box::new(MockService::new()))
    }

    #[test]
    fn registered_factory_serves_its_hostname() {
        let mut registry = ServiceRegistry::with_defaults();
        registry.register("forge.internal.example.com", mock_factory);

        let service = registry
            .service_from_url(
                "https://forge.internal.example.com/tools/deploy",
                ServiceConfig::default(),
            )
            .unwrap();
        assert_eq!(service.name(), "mock");
    }

    #[tokio::test]
    async fn project_from_url_builds_a_lazy_handle() {
        // No network: plain project handles are constructed locally.
        let registry = ServiceRegistry::with_defaults();
        let project = registry
            .project_from_url("https://pagure.io/rpms/glibc", ServiceConfig::default())
            .await
            .unwrap();

        assert_eq!(project.service_name(), "pagure");
        assert_eq!(project.full_repo_name(), "rpms/glibc");
        assert_eq!(project.get_web_url(), "https://pagure.io/rpms/glibc");
    }

    #[tokio::test]
    async fn free_function_project_from_url_matches_the_registry() {
        let project = anyforge::project_from_url("https://pagure.io/fedora-infra/ansible", None)
            .await
            .unwrap();
        assert_eq!(project.full_repo_name(), "fedora-infra/ansible");
    }
}

// =============================================================================
// URL parsing across forges
// =============================================================================

mod url_parsing {
    use super::*;

    #[test]
    fn common_url_forms() {
        let cases = [
            ("https://pagure.io/ogr-tests", None, "ogr-tests", false),
            (
                "https://src.fedoraproject.org/rpms/glibc",
                Some("rpms"),
                "glibc",
                false,
            ),
            (
                "https://src.fedoraproject.org/rpms/glibc.git",
                Some("rpms"),
                "glibc",
                false,
            ),
            (
                "ssh://git@pagure.io/fork/alice/rpms/glibc.git",
                Some("rpms"),
                "glibc",
                true,
            ),
            ("git@gitlab.com:owner/repo.git", Some("owner"), "repo", false),
        ];

        for (url, namespace, repo, is_fork) in cases {
            let parsed = parse_git_repo(url).unwrap();
            assert_eq!(parsed.namespace.as_deref(), namespace, "for {}", url);
            assert_eq!(parsed.repo, repo, "for {}", url);
            assert_eq!(parsed.is_fork, is_fork, "for {}", url);
        }
    }

    #[test]
    fn fork_urls_carry_the_owner() {
        let parsed = parse_git_repo("https://pagure.io/fork/alice/rpms/glibc").unwrap();
        assert_eq!(parsed.username.as_deref(), Some("alice"));
        assert!(parsed.is_fork);
    }

    #[test]
    fn invalid_urls_are_rejected() {
        assert!(matches!(
            parse_git_repo("not a url"),
            Err(ForgeError::InvalidUrl(_))
        ));
        assert!(matches!(
            parse_git_repo(""),
            Err(ForgeError::InvalidUrl(_))
        ));
    }
}

// =============================================================================
// Service kinds
// =============================================================================

mod service_kinds {
    use super::*;

    #[test]
    fn every_backend_is_listed() {
        let names: Vec<&str> = ServiceKind::all().iter().map(|k| k.name()).collect();
        assert_eq!(names, vec!["pagure", "gitlab"]);

        for name in names {
            assert!(valid_service_names().contains(&name));
        }
    }
}

// =============================================================================
// Workflows through trait objects (using MockService)
// =============================================================================

mod workflows {
    use super::*;

    fn issue(id: u64, title: &str, author: &str) -> Issue {
        Issue {
            id,
            title: title.to_string(),
            description: String::new(),
            status: IssueStatus::Open,
            author: author.to_string(),
            created: Utc::now(),
        }
    }

    async fn open_project(service: &dyn GitService, url: &str) -> Box<dyn GitProject> {
        service.get_project_from_url(url).await.unwrap()
    }

    #[tokio::test]
    async fn contribution_flow_forks_proposes_and_merges() {
        let upstream_spec = ProjectRef::in_namespace("glibc", "rpms");
        let mock = MockService::new().with_project(&upstream_spec);
        let service: &dyn GitService = &mock;

        let upstream = open_project(service, "https://mock.example.com/rpms/glibc").await;

        // Fork, then propose the change against upstream.
        let fork = upstream.get_fork(true).await.unwrap().unwrap();
        assert_eq!(fork.full_repo_name(), "fork/mock-user/rpms/glibc");

        let pr = upstream
            .pr_create(CreatePrRequest {
                title: "Backport upstream fix".to_string(),
                body: Some("Fixes the build on rawhide".to_string()),
                source_branch: "fix".to_string(),
                target_branch: "main".to_string(),
            })
            .await
            .unwrap();

        upstream.pr_comment(pr.id, "CI is green").await.unwrap();
        upstream
            .set_commit_status(CommitFlagRequest {
                commit: "abc123".to_string(),
                state: CommitStatus::Success,
                context: "ci/build".to_string(),
                description: "build passed".to_string(),
                url: None,
            })
            .await
            .unwrap();

        let merged = upstream.pr_merge(pr.id).await.unwrap();
        assert_eq!(merged.status, PrStatus::Merged);

        // The whole flow is visible in the recorded operations, in order.
        let ops = mock.operations();
        assert_eq!(ops.len(), 5);
        assert!(matches!(&ops[0], MockOperation::ForkCreate { .. }));
        assert!(matches!(&ops[1], MockOperation::PrCreate { .. }));
        assert!(matches!(&ops[2], MockOperation::PrComment { .. }));
        assert!(matches!(&ops[3], MockOperation::SetCommitStatus { .. }));
        assert!(matches!(&ops[4], MockOperation::PrMerge { .. }));
    }

    #[tokio::test]
    async fn triage_flow_comments_and_closes_open_issues() {
        let spec = ProjectRef::new("infra-docs");
        let mock = MockService::new()
            .with_issue(&spec, issue(1, "Stale doc", "alice"))
            .with_issue(&spec, issue(2, "Broken link", "bob"));
        let service: &dyn GitService = &mock;

        let project = open_project(service, "https://mock.example.com/infra-docs").await;

        let open = project.get_issue_list(IssueStatus::Open).await.unwrap();
        assert_eq!(open.len(), 2);

        for issue in &open {
            project
                .issue_comment(issue.id, "Closing as part of cleanup")
                .await
                .unwrap();
            project.issue_close(issue.id).await.unwrap();
        }

        let still_open = project.get_issue_list(IssueStatus::Open).await.unwrap();
        assert!(still_open.is_empty());

        let closed = project.get_issue_list(IssueStatus::Closed).await.unwrap();
        assert_eq!(closed.len(), 2);
    }

    #[tokio::test]
    async fn merge_failure_leaves_the_pr_open() {
        let spec = ProjectRef::new("demo");
        let mock = MockService::new().with_project(&spec);
        let service: &dyn GitService = &mock;

        let project = open_project(service, "https://mock.example.com/demo").await;
        let pr = project
            .pr_create(CreatePrRequest {
                title: "Risky change".to_string(),
                body: None,
                source_branch: "risky".to_string(),
                target_branch: "main".to_string(),
            })
            .await
            .unwrap();

        let mock = mock.fail_on(FailOn::PrMerge(ForgeError::Api {
            url: "https://mock.example.com/demo".to_string(),
            status: 500,
            reason: Some("Internal server error".to_string()),
            body: None,
        }));

        let result = project.pr_merge(pr.id).await;
        assert!(matches!(result, Err(ForgeError::Api { status: 500, .. })));

        // The failed merge changed nothing.
        let unchanged = project.get_pr_info(pr.id).await.unwrap();
        assert_eq!(unchanged.status, PrStatus::Open);

        mock.clear_fail_on();
        let merged = project.pr_merge(pr.id).await.unwrap();
        assert_eq!(merged.status, PrStatus::Merged);
    }

    #[tokio::test]
    async fn search_finds_the_comment_matching_the_requested_order() {
        let spec = ProjectRef::new("demo");
        let mock = MockService::new().with_project(&spec);
        let service: &dyn GitService = &mock;

        let project = open_project(service, "https://mock.example.com/demo").await;
        let pr = project
            .pr_create(CreatePrRequest {
                title: "Update packaging".to_string(),
                body: None,
                source_branch: "update".to_string(),
                target_branch: "main".to_string(),
            })
            .await
            .unwrap();

        project.pr_comment(pr.id, "build id: 101").await.unwrap();
        project.pr_comment(pr.id, "build id: 202").await.unwrap();

        let pattern = regex::Regex::new(r"build id: \d+").unwrap();
        let newest = project
            .search_in_pr(pr.id, &pattern, true, false)
            .await
            .unwrap();
        assert_eq!(newest.as_deref(), Some("build id: 202"));

        let oldest = project
            .search_in_pr(pr.id, &pattern, false, false)
            .await
            .unwrap();
        assert_eq!(oldest.as_deref(), Some("build id: 101"));
    }
}
