//! End-to-end review flow tests against an in-memory platform client.
//!
//! These pin the exact sequence of platform calls each transition makes,
//! including the call ordering the crash-tolerance story relies on
//! (announcement comment before label add, label add before label remove).

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use shepherd::review::{self, PullRequestSnapshot};
use shepherd::{PlatformClient, PlatformError, RepoId, ReviewRequest};

const OWNERS_PATH: &str = ".github/owners.yml";
const BASE_SHA: &str = "basesha";
const HEAD_SHA: &str = "headsha";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Call {
    GetFileContent { reference: String, path: String },
    ListChangedFiles { base: String, head: String },
    CreateComment { number: u64, body: String },
    AddLabels { number: u64, labels: Vec<String> },
    RemoveLabel { number: u64, label: String },
    GetReviewRequest { number: u64 },
}

impl Call {
    fn is_mutating(&self) -> bool {
        matches!(
            self,
            Call::CreateComment { .. } | Call::AddLabels { .. } | Call::RemoveLabel { .. }
        )
    }
}

#[derive(Default)]
struct FakePlatform {
    files: HashMap<(String, String), Vec<u8>>,
    changed_files: Vec<String>,
    review_requests: HashMap<u64, ReviewRequest>,
    calls: Mutex<Vec<Call>>,
}

impl FakePlatform {
    fn new() -> Self {
        Self::default()
    }

    fn with_config(mut self, reference: &str, yaml: &str) -> Self {
        self.files.insert(
            (reference.to_string(), OWNERS_PATH.to_string()),
            yaml.as_bytes().to_vec(),
        );
        self
    }

    fn with_changed_files(mut self, files: &[&str]) -> Self {
        self.changed_files = files.iter().map(|f| f.to_string()).collect();
        self
    }

    fn with_review_request(mut self, request: ReviewRequest) -> Self {
        self.review_requests.insert(request.number, request);
        self
    }

    fn record(&self, call: Call) {
        self.calls.lock().expect("call log poisoned").push(call);
    }

    fn calls(&self) -> Vec<Call> {
        self.calls.lock().expect("call log poisoned").clone()
    }

    fn mutating_calls(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(Call::is_mutating)
            .collect()
    }
}

#[async_trait]
impl PlatformClient for FakePlatform {
    async fn get_file_content(
        &self,
        _repo: &RepoId,
        reference: &str,
        path: &str,
    ) -> Result<Vec<u8>, PlatformError> {
        self.record(Call::GetFileContent {
            reference: reference.to_string(),
            path: path.to_string(),
        });
        self.files
            .get(&(reference.to_string(), path.to_string()))
            .cloned()
            .ok_or_else(|| PlatformError::NotFound {
                what: format!("{path} at {reference}"),
            })
    }

    async fn list_changed_files(
        &self,
        _repo: &RepoId,
        base: &str,
        head: &str,
    ) -> Result<Vec<String>, PlatformError> {
        self.record(Call::ListChangedFiles {
            base: base.to_string(),
            head: head.to_string(),
        });
        Ok(self.changed_files.clone())
    }

    async fn create_comment(
        &self,
        _repo: &RepoId,
        number: u64,
        body: &str,
    ) -> Result<(), PlatformError> {
        self.record(Call::CreateComment {
            number,
            body: body.to_string(),
        });
        Ok(())
    }

    async fn add_labels(
        &self,
        _repo: &RepoId,
        number: u64,
        labels: &[String],
    ) -> Result<(), PlatformError> {
        self.record(Call::AddLabels {
            number,
            labels: labels.to_vec(),
        });
        Ok(())
    }

    async fn remove_label(
        &self,
        _repo: &RepoId,
        number: u64,
        label: &str,
    ) -> Result<(), PlatformError> {
        self.record(Call::RemoveLabel {
            number,
            label: label.to_string(),
        });
        Ok(())
    }

    async fn get_review_request(
        &self,
        _repo: &RepoId,
        number: u64,
    ) -> Result<ReviewRequest, PlatformError> {
        self.record(Call::GetReviewRequest { number });
        self.review_requests
            .get(&number)
            .cloned()
            .ok_or_else(|| PlatformError::NotFound {
                what: format!("pull request #{number}"),
            })
    }
}

fn repo() -> RepoId {
    RepoId::new(99, "owner", "repo")
}

fn open_pr(number: u64) -> PullRequestSnapshot {
    PullRequestSnapshot {
        number,
        base_sha: BASE_SHA.to_string(),
        head_sha: HEAD_SHA.to_string(),
        labels: vec![],
    }
}

fn review_request(number: u64, labels: &[&str]) -> ReviewRequest {
    ReviewRequest {
        number,
        base_sha: BASE_SHA.to_string(),
        head_sha: HEAD_SHA.to_string(),
        labels: labels.iter().map(|l| l.to_string()).collect(),
        author: "dev".to_string(),
    }
}

const DOCS_CONFIG: &str = "components:\n  docs:\n    reviewers: [alice]\n    approvers: [bob]\n";

#[tokio::test]
async fn opening_a_pr_requests_reviewers_and_labels_it() {
    let platform = FakePlatform::new()
        .with_config(BASE_SHA, DOCS_CONFIG)
        .with_changed_files(&["docs/readme.md"]);

    review::handle_pull_request(&platform, &repo(), OWNERS_PATH, &open_pr(1))
        .await
        .expect("transition should succeed");

    assert_eq!(
        platform.calls(),
        vec![
            Call::GetFileContent {
                reference: BASE_SHA.to_string(),
                path: OWNERS_PATH.to_string(),
            },
            Call::ListChangedFiles {
                base: BASE_SHA.to_string(),
                head: HEAD_SHA.to_string(),
            },
            Call::CreateComment {
                number: 1,
                body: "Requesting review from: @alice".to_string(),
            },
            Call::AddLabels {
                number: 1,
                labels: vec!["needs lgtm".to_string()],
            },
        ]
    );
}

#[tokio::test]
async fn opening_a_pr_with_no_matching_component_still_announces() {
    let platform = FakePlatform::new()
        .with_config(BASE_SHA, DOCS_CONFIG)
        .with_changed_files(&["src/main.rs"]);

    review::handle_pull_request(&platform, &repo(), OWNERS_PATH, &open_pr(1))
        .await
        .expect("transition should succeed");

    let mutating = platform.mutating_calls();
    assert_eq!(
        mutating[0],
        Call::CreateComment {
            number: 1,
            body: "Requesting review from: ".to_string(),
        }
    );
    assert_eq!(
        mutating[1],
        Call::AddLabels {
            number: 1,
            labels: vec!["needs lgtm".to_string()],
        }
    );
}

#[tokio::test]
async fn redelivered_pr_event_is_idempotent() {
    let platform = FakePlatform::new()
        .with_config(BASE_SHA, DOCS_CONFIG)
        .with_changed_files(&["docs/readme.md"]);

    let mut pr = open_pr(1);
    pr.labels = vec!["needs lgtm".to_string()];

    review::handle_pull_request(&platform, &repo(), OWNERS_PATH, &pr)
        .await
        .expect("no-op should succeed");

    assert!(platform.calls().is_empty());
}

#[tokio::test]
async fn pr_event_on_a_ready_request_is_a_no_op() {
    let platform = FakePlatform::new()
        .with_config(BASE_SHA, DOCS_CONFIG)
        .with_changed_files(&["docs/readme.md"]);

    let mut pr = open_pr(1);
    pr.labels = vec!["ready for merge".to_string()];

    review::handle_pull_request(&platform, &repo(), OWNERS_PATH, &pr)
        .await
        .expect("no-op should succeed");

    assert!(platform.calls().is_empty());
}

#[tokio::test]
async fn lgtm_from_reviewer_promotes_to_needs_approve() {
    let platform = FakePlatform::new()
        .with_config(BASE_SHA, DOCS_CONFIG)
        .with_changed_files(&["docs/readme.md"])
        .with_review_request(review_request(5, &["needs lgtm"]));

    review::handle_comment(&platform, &repo(), OWNERS_PATH, 5, "alice", "/lgtm")
        .await
        .expect("transition should succeed");

    assert_eq!(
        platform.calls(),
        vec![
            Call::GetReviewRequest { number: 5 },
            Call::GetFileContent {
                reference: BASE_SHA.to_string(),
                path: OWNERS_PATH.to_string(),
            },
            Call::ListChangedFiles {
                base: BASE_SHA.to_string(),
                head: HEAD_SHA.to_string(),
            },
            Call::CreateComment {
                number: 5,
                body: "Requesting approval from: @bob".to_string(),
            },
            Call::AddLabels {
                number: 5,
                labels: vec!["needs approve".to_string()],
            },
            Call::RemoveLabel {
                number: 5,
                label: "needs lgtm".to_string(),
            },
        ]
    );
}

#[tokio::test]
async fn approve_from_approver_marks_ready_without_commenting() {
    let platform = FakePlatform::new()
        .with_config(BASE_SHA, DOCS_CONFIG)
        .with_changed_files(&["docs/readme.md"])
        .with_review_request(review_request(5, &["needs approve"]));

    review::handle_comment(&platform, &repo(), OWNERS_PATH, 5, "bob", "/approve")
        .await
        .expect("transition should succeed");

    assert_eq!(
        platform.mutating_calls(),
        vec![
            Call::AddLabels {
                number: 5,
                labels: vec!["ready for merge".to_string()],
            },
            Call::RemoveLabel {
                number: 5,
                label: "needs approve".to_string(),
            },
        ]
    );
}

#[tokio::test]
async fn lgtm_from_non_reviewer_makes_no_mutating_calls() {
    let platform = FakePlatform::new()
        .with_config(BASE_SHA, DOCS_CONFIG)
        .with_changed_files(&["docs/readme.md"])
        .with_review_request(review_request(5, &["needs lgtm"]));

    review::handle_comment(&platform, &repo(), OWNERS_PATH, 5, "mallory", "/lgtm")
        .await
        .expect("unauthorized command should be a silent no-op");

    assert!(platform.mutating_calls().is_empty());
}

#[tokio::test]
async fn comment_without_command_token_stops_before_config_fetch() {
    let platform = FakePlatform::new()
        .with_config(BASE_SHA, DOCS_CONFIG)
        .with_changed_files(&["docs/readme.md"])
        .with_review_request(review_request(5, &["needs lgtm"]));

    review::handle_comment(&platform, &repo(), OWNERS_PATH, 5, "alice", "thanks!")
        .await
        .expect("no-op should succeed");

    assert_eq!(platform.calls(), vec![Call::GetReviewRequest { number: 5 }]);
}

#[tokio::test]
async fn conflicting_state_labels_freeze_the_machine() {
    let platform = FakePlatform::new()
        .with_config(BASE_SHA, DOCS_CONFIG)
        .with_changed_files(&["docs/readme.md"])
        .with_review_request(review_request(5, &["needs lgtm", "needs approve"]));

    review::handle_comment(&platform, &repo(), OWNERS_PATH, 5, "alice", "/lgtm")
        .await
        .expect("no-op should succeed");

    assert_eq!(platform.calls(), vec![Call::GetReviewRequest { number: 5 }]);
}

#[tokio::test]
async fn invalid_config_fails_before_any_mutation() {
    let platform = FakePlatform::new()
        .with_config(BASE_SHA, "components:\n  docs:\n    owners: [alice]\n")
        .with_changed_files(&["docs/readme.md"]);

    let result = review::handle_pull_request(&platform, &repo(), OWNERS_PATH, &open_pr(1)).await;

    assert!(result.is_err());
    assert!(platform.mutating_calls().is_empty());
}

#[tokio::test]
async fn missing_config_propagates_not_found() {
    let platform = FakePlatform::new().with_changed_files(&["docs/readme.md"]);

    let result = review::handle_pull_request(&platform, &repo(), OWNERS_PATH, &open_pr(1)).await;

    let err = result.expect_err("missing config should fail the invocation");
    assert!(
        err.chain().any(|cause| matches!(
            cause.downcast_ref::<PlatformError>(),
            Some(PlatformError::NotFound { .. })
        )),
        "expected NotFound in {err:#}"
    );
    assert!(platform.mutating_calls().is_empty());
}

#[tokio::test]
async fn comment_on_unknown_pull_request_propagates_not_found() {
    let platform = FakePlatform::new().with_config(BASE_SHA, DOCS_CONFIG);

    let result = review::handle_comment(&platform, &repo(), OWNERS_PATH, 5, "alice", "/lgtm").await;

    assert!(result.is_err());
    assert!(platform.mutating_calls().is_empty());
}

#[tokio::test]
async fn config_is_read_at_the_base_reference() {
    // Ownership rules must come from the target branch, not from the head
    // commit the change author controls.
    let platform = FakePlatform::new()
        .with_config(BASE_SHA, DOCS_CONFIG)
        .with_config(
            HEAD_SHA,
            "components:\n  docs:\n    reviewers: [mallory]\n",
        )
        .with_changed_files(&["docs/readme.md"]);

    review::handle_pull_request(&platform, &repo(), OWNERS_PATH, &open_pr(1))
        .await
        .expect("transition should succeed");

    let comment = platform
        .mutating_calls()
        .into_iter()
        .find_map(|call| match call {
            Call::CreateComment { body, .. } => Some(body),
            _ => None,
        })
        .expect("announcement comment posted");
    assert_eq!(comment, "Requesting review from: @alice");
}
