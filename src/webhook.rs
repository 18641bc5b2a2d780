//! Webhook boundary: signature verification, envelope classification, and
//! dispatch into the review flow.
//!
//! Classification is a pure function over the `x-github-event` kind and the
//! payload so the routing rules are testable without a server. Anything the
//! bot does not act on classifies as `Ignored` - unknown event kinds are
//! forward compatibility, not errors.

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{Json, Response},
    routing::post,
    Router,
};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::sync::Arc;
use tracing::{error, info};

use crate::github::RepoId;
use crate::review::{self, PullRequestSnapshot};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct WebhookPayload {
    pub action: Option<String>,
    pub pull_request: Option<PullRequest>,
    pub repository: Option<Repository>,
    pub installation: Option<Installation>,
    pub comment: Option<Comment>,
    pub issue: Option<Issue>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PullRequest {
    pub number: u64,
    pub head: GitRef,
    pub base: GitRef,
    #[serde(default)]
    pub labels: Vec<Label>,
    pub user: User,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GitRef {
    pub sha: String,
    #[serde(rename = "ref")]
    pub ref_name: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Label {
    pub name: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Repository {
    pub name: String,
    pub full_name: String,
    pub owner: User,
}

#[derive(Debug, Deserialize, Clone)]
pub struct User {
    pub login: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Installation {
    pub id: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Comment {
    pub body: String,
    pub user: User,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Issue {
    pub number: u64,
    pub pull_request: Option<PullRequestLink>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PullRequestLink {
    pub url: String,
}

#[derive(Serialize)]
pub struct WebhookResponse {
    pub message: String,
}

/// Where an inbound envelope routes.
#[derive(Debug)]
pub enum WebhookDispatch<'a> {
    /// A pull request was opened or synchronized.
    PullRequest {
        repository: &'a Repository,
        installation: &'a Installation,
        pull_request: &'a PullRequest,
    },
    /// A comment was created on a pull request thread.
    PrComment {
        repository: &'a Repository,
        installation: &'a Installation,
        issue_number: u64,
        comment: &'a Comment,
    },
    /// Everything else.
    Ignored { reason: &'static str },
}

/// Classify an inbound envelope by event kind and payload shape.
pub fn classify<'a>(event_kind: &str, payload: &'a WebhookPayload) -> WebhookDispatch<'a> {
    match event_kind {
        "pull_request" | "pull_request_target" => {
            match payload.action.as_deref() {
                Some("opened") | Some("synchronize") => {}
                _ => {
                    return WebhookDispatch::Ignored {
                        reason: "unhandled pull request action",
                    }
                }
            }
            let (Some(repository), Some(installation), Some(pull_request)) = (
                payload.repository.as_ref(),
                payload.installation.as_ref(),
                payload.pull_request.as_ref(),
            ) else {
                return WebhookDispatch::Ignored {
                    reason: "pull request payload missing fields",
                };
            };
            WebhookDispatch::PullRequest {
                repository,
                installation,
                pull_request,
            }
        }

        "issue_comment" => {
            if payload.action.as_deref() != Some("created") {
                return WebhookDispatch::Ignored {
                    reason: "unhandled comment action",
                };
            }
            let (Some(repository), Some(installation), Some(comment), Some(issue)) = (
                payload.repository.as_ref(),
                payload.installation.as_ref(),
                payload.comment.as_ref(),
                payload.issue.as_ref(),
            ) else {
                return WebhookDispatch::Ignored {
                    reason: "comment payload missing fields",
                };
            };
            if issue.pull_request.is_none() {
                return WebhookDispatch::Ignored {
                    reason: "comment on a non-pull-request issue",
                };
            }
            WebhookDispatch::PrComment {
                repository,
                installation,
                issue_number: issue.number,
                comment,
            }
        }

        _ => WebhookDispatch::Ignored {
            reason: "unrecognized event kind",
        },
    }
}

type HmacSha256 = Hmac<Sha256>;

fn verify_github_signature(secret: &str, payload: &[u8], signature: &str) -> bool {
    if !signature.starts_with("sha256=") {
        return false;
    }

    let signature_hex = &signature[7..]; // Remove "sha256=" prefix

    let signature_bytes = match hex::decode(signature_hex) {
        Ok(bytes) => bytes,
        Err(_) => return false,
    };

    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return false,
    };

    mac.update(payload);

    // Use constant-time verification
    mac.verify_slice(&signature_bytes).is_ok()
}

async fn verify_webhook_signature(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let (parts, body) = request.into_parts();
    let bytes = axum::body::to_bytes(body, usize::MAX)
        .await
        .map_err(|_| StatusCode::BAD_REQUEST)?;

    let signature = parts
        .headers
        .get("x-hub-signature-256")
        .and_then(|h| h.to_str().ok())
        .ok_or(StatusCode::UNAUTHORIZED)?;

    if !verify_github_signature(&state.webhook_secret, &bytes, signature) {
        error!("Invalid webhook signature");
        return Err(StatusCode::UNAUTHORIZED);
    }

    let request = Request::from_parts(parts, axum::body::Body::from(bytes));
    Ok(next.run(request).await)
}

pub async fn github_webhook_handler(
    State(state): State<Arc<AppState>>,
    request: Request,
) -> Result<Json<WebhookResponse>, StatusCode> {
    let (parts, body) = request.into_parts();

    let event_kind = parts
        .headers
        .get("x-github-event")
        .and_then(|h| h.to_str().ok())
        .unwrap_or("")
        .to_string();
    let delivery = parts
        .headers
        .get("x-github-delivery")
        .and_then(|h| h.to_str().ok())
        .unwrap_or("-")
        .to_string();

    let bytes = axum::body::to_bytes(body, usize::MAX)
        .await
        .map_err(|_| StatusCode::BAD_REQUEST)?;
    let payload: WebhookPayload =
        serde_json::from_slice(&bytes).map_err(|_| StatusCode::BAD_REQUEST)?;

    match classify(&event_kind, &payload) {
        WebhookDispatch::PullRequest {
            repository,
            installation,
            pull_request,
        } => {
            info!(
                %delivery,
                "PR #{} {:?} in {}, by {}",
                pull_request.number,
                payload.action,
                repository.full_name,
                pull_request.user.login
            );

            let repo = RepoId::new(installation.id, &repository.owner.login, &repository.name);
            let pr = PullRequestSnapshot {
                number: pull_request.number,
                base_sha: pull_request.base.sha.clone(),
                head_sha: pull_request.head.sha.clone(),
                labels: pull_request.labels.iter().map(|l| l.name.clone()).collect(),
            };
            let platform = state.platform.clone();
            let owners_path = state.owners_path.clone();

            tokio::spawn(async move {
                if let Err(e) =
                    review::handle_pull_request(platform.as_ref(), &repo, &owners_path, &pr).await
                {
                    error!(%delivery, "Failed to handle pull request event: {:#}", e);
                }
            });
        }

        WebhookDispatch::PrComment {
            repository,
            installation,
            issue_number,
            comment,
        } => {
            info!(
                %delivery,
                "Comment on PR #{} in {}, by {}",
                issue_number, repository.full_name, comment.user.login
            );

            let repo = RepoId::new(installation.id, &repository.owner.login, &repository.name);
            let author = comment.user.login.clone();
            let body = comment.body.clone();
            let platform = state.platform.clone();
            let owners_path = state.owners_path.clone();

            tokio::spawn(async move {
                if let Err(e) = review::handle_comment(
                    platform.as_ref(),
                    &repo,
                    &owners_path,
                    issue_number,
                    &author,
                    &body,
                )
                .await
                {
                    error!(%delivery, "Failed to handle comment event: {:#}", e);
                }
            });
        }

        WebhookDispatch::Ignored { reason } => {
            info!(%delivery, "Ignoring {} event: {}", event_kind, reason);
        }
    }

    Ok(Json(WebhookResponse {
        message: "Webhook received".to_string(),
    }))
}

pub fn webhook_router(middleware_state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route("/webhook", post(github_webhook_handler))
        .route_layer(middleware::from_fn_with_state(
            middleware_state,
            verify_webhook_signature,
        ))
}
