//! The review flow: one invocation per accepted webhook event.
//!
//! Each handler re-derives everything from the platform: the phase from the
//! request's labels, the ownership rules from the config file at the
//! request's **base** SHA (so the rules are pinned to the target branch, not
//! to attacker-controlled change content), and the responsible parties from
//! the changed-file listing. Nothing is cached between invocations.

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::github::{PlatformClient, RepoId, ReviewRequest};
use crate::ownership::{resolve_owners, OwnershipConfig};
use crate::state_machine::{
    execute_effects, plan, CommitSha, InterpreterContext, ReviewEvent, ReviewPhase,
};

/// The pull request fields one invocation needs, whether they came from the
/// webhook payload (PR events) or a fresh fetch (comment events).
#[derive(Debug, Clone)]
pub struct PullRequestSnapshot {
    pub number: u64,
    pub base_sha: String,
    pub head_sha: String,
    pub labels: Vec<String>,
}

impl From<ReviewRequest> for PullRequestSnapshot {
    fn from(request: ReviewRequest) -> Self {
        Self {
            number: request.number,
            base_sha: request.base_sha,
            head_sha: request.head_sha,
            labels: request.labels,
        }
    }
}

/// Handle a pull request being opened or synchronized.
///
/// Labels come straight from the webhook payload; GitHub delivers the
/// post-event state of the PR with the event itself.
pub async fn handle_pull_request(
    client: &dyn PlatformClient,
    repo: &RepoId,
    owners_path: &str,
    pr: &PullRequestSnapshot,
) -> Result<()> {
    let event = ReviewEvent::PrUpdated {
        head_sha: CommitSha::from(pr.head_sha.as_str()),
        base_sha: CommitSha::from(pr.base_sha.as_str()),
    };
    run_transition(client, repo, owners_path, pr, event).await
}

/// Handle a comment posted on a pull request thread.
///
/// The comment payload carries stale label data at best, so the PR is
/// re-fetched for authoritative label state before deriving the phase.
pub async fn handle_comment(
    client: &dyn PlatformClient,
    repo: &RepoId,
    owners_path: &str,
    number: u64,
    author: &str,
    body: &str,
) -> Result<()> {
    let request = client
        .get_review_request(repo, number)
        .await
        .with_context(|| format!("fetching pull request #{number}"))?;
    let pr = PullRequestSnapshot::from(request);

    let event = ReviewEvent::CommentPosted {
        author: author.to_string(),
        body: body.to_string(),
    };
    run_transition(client, repo, owners_path, &pr, event).await
}

async fn run_transition(
    client: &dyn PlatformClient,
    repo: &RepoId,
    owners_path: &str,
    pr: &PullRequestSnapshot,
    event: ReviewEvent,
) -> Result<()> {
    let phase = ReviewPhase::from_labels(&pr.labels);
    if phase == ReviewPhase::Conflicted {
        warn!(
            pr = pr.number,
            "both state labels present, ignoring {}",
            event.log_summary()
        );
        return Ok(());
    }

    let Some(pending) = plan(phase, &event) else {
        debug!(
            pr = pr.number,
            %phase,
            "no transition for {}",
            event.log_summary()
        );
        return Ok(());
    };

    // Config and changed files are only fetched once we know the event can
    // transition; the idempotence guard above costs no platform calls.
    let config = load_ownership_config(client, repo, &pr.base_sha, owners_path).await?;
    let changed_files = client
        .list_changed_files(repo, &pr.base_sha, &pr.head_sha)
        .await
        .context("listing changed files")?;
    let owners = resolve_owners(&config, &changed_files);

    let result = pending.apply(&owners);
    let ctx = InterpreterContext {
        client,
        repo,
        number: pr.number,
    };
    execute_effects(&ctx, result.effects).await?;

    if result.phase != phase {
        info!(
            pr = pr.number,
            "review phase {} -> {}",
            phase,
            result.phase
        );
    }
    Ok(())
}

async fn load_ownership_config(
    client: &dyn PlatformClient,
    repo: &RepoId,
    reference: &str,
    owners_path: &str,
) -> Result<OwnershipConfig> {
    let raw = client
        .get_file_content(repo, reference, owners_path)
        .await
        .with_context(|| format!("fetching ownership config {owners_path} at {reference}"))?;
    Ok(OwnershipConfig::parse(&raw)?)
}
