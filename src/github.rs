//! Platform client: the capability trait the review flow consumes, and its
//! production GitHub implementation.
//!
//! The trait is the seam that keeps the state machine testable: the review
//! driver and effect interpreter only see `dyn PlatformClient`, so tests
//! drive them with an in-memory fake. `GitHubClient` authenticates as a
//! GitHub App (RS256 JWT exchanged for per-installation tokens, cached with
//! an expiry buffer).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use chrono::Utc;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{error, info};

#[derive(Debug, Error)]
pub enum PlatformError {
    /// The requested entity does not exist at the given reference.
    #[error("{what} not found")]
    NotFound { what: String },

    /// The platform rejected the request.
    #[error("GitHub API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// The request never got a usable response.
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// App credentials could not be turned into an access token.
    #[error("credential error: {0}")]
    Credentials(String),

    /// The platform answered with something we could not interpret.
    #[error("malformed response: {0}")]
    Malformed(String),
}

/// Addressing and authentication context for one repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoId {
    pub installation_id: u64,
    pub owner: String,
    pub name: String,
}

impl RepoId {
    pub fn new(installation_id: u64, owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            installation_id,
            owner: owner.into(),
            name: name.into(),
        }
    }
}

/// A pull request as fetched from the platform. Read-only to this core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewRequest {
    pub number: u64,
    pub base_sha: String,
    pub head_sha: String,
    pub labels: Vec<String>,
    pub author: String,
}

/// The platform operations the review flow consumes.
///
/// All mutation the bot performs goes through this trait; nothing is
/// persisted locally.
#[async_trait]
pub trait PlatformClient: Send + Sync {
    /// Fetch the raw bytes of a file at a reference.
    /// Fails with `PlatformError::NotFound` if absent at that reference.
    async fn get_file_content(
        &self,
        repo: &RepoId,
        reference: &str,
        path: &str,
    ) -> Result<Vec<u8>, PlatformError>;

    /// List the paths changed between two references, in the platform's
    /// order. All change statuses are included: a deletion still belongs to
    /// the component that owned the file.
    async fn list_changed_files(
        &self,
        repo: &RepoId,
        base: &str,
        head: &str,
    ) -> Result<Vec<String>, PlatformError>;

    /// Post a comment on the issue/pull-request thread.
    async fn create_comment(
        &self,
        repo: &RepoId,
        number: u64,
        body: &str,
    ) -> Result<(), PlatformError>;

    /// Add labels to the issue/pull-request.
    async fn add_labels(
        &self,
        repo: &RepoId,
        number: u64,
        labels: &[String],
    ) -> Result<(), PlatformError>;

    /// Remove a label from the issue/pull-request.
    async fn remove_label(
        &self,
        repo: &RepoId,
        number: u64,
        label: &str,
    ) -> Result<(), PlatformError>;

    /// Fetch the authoritative pull request state (labels included).
    async fn get_review_request(
        &self,
        repo: &RepoId,
        number: u64,
    ) -> Result<ReviewRequest, PlatformError>;
}

#[derive(Debug, Serialize)]
struct GitHubAppClaims {
    iss: u64,
    iat: u64,
    exp: u64,
}

#[derive(Debug, Deserialize)]
struct InstallationTokenResponse {
    token: String,
    expires_at: String,
}

#[derive(Debug, Deserialize)]
struct FileContentsResponse {
    content: String,
}

#[derive(Debug, Deserialize)]
struct CompareResponse {
    files: Vec<FileChange>,
}

#[derive(Debug, Deserialize)]
struct FileChange {
    filename: String,
}

#[derive(Debug, Serialize)]
struct CreateCommentRequest {
    body: String,
}

#[derive(Debug, Serialize)]
struct AddLabelsRequest {
    labels: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct PullRequestResponse {
    number: u64,
    head: PullRequestRefResponse,
    base: PullRequestRefResponse,
    labels: Vec<LabelResponse>,
    user: UserResponse,
}

#[derive(Debug, Deserialize)]
struct PullRequestRefResponse {
    sha: String,
}

#[derive(Debug, Deserialize)]
struct LabelResponse {
    name: String,
}

#[derive(Debug, Deserialize)]
struct UserResponse {
    login: String,
}

#[derive(Clone)]
pub struct GitHubClient {
    client: Client,
    app_id: u64,
    private_key: String,
    token_cache: Arc<RwLock<HashMap<u64, (String, SystemTime)>>>,
}

impl GitHubClient {
    pub fn new(app_id: u64, private_key: String) -> Self {
        let client = Client::builder()
            .user_agent(concat!("shepherd/", env!("CARGO_PKG_VERSION")))
            .build()
            .expect("failed to construct HTTP client");

        Self {
            client,
            app_id,
            private_key,
            token_cache: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    fn generate_jwt(&self) -> Result<String, PlatformError> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| PlatformError::Credentials(format!("failed to get current time: {e}")))?
            .as_secs();

        let claims = GitHubAppClaims {
            iss: self.app_id,
            iat: now - 60,  // Issued 60 seconds ago to account for clock skew
            exp: now + 600, // Expires in 10 minutes
        };

        let header = Header::new(Algorithm::RS256);
        let encoding_key = EncodingKey::from_rsa_pem(self.private_key.as_bytes())
            .map_err(|e| PlatformError::Credentials(format!("failed to parse private key: {e}")))?;

        encode(&header, &claims, &encoding_key)
            .map_err(|e| PlatformError::Credentials(format!("failed to encode JWT: {e}")))
    }

    async fn get_installation_token(&self, installation_id: u64) -> Result<String, PlatformError> {
        // Reuse the cached token while it has at least 5 minutes left.
        {
            let cache = self.token_cache.read().await;
            if let Some((token, expires_at)) = cache.get(&installation_id) {
                if expires_at
                    .duration_since(SystemTime::now())
                    .unwrap_or_default()
                    .as_secs()
                    > 300
                {
                    return Ok(token.clone());
                }
            }
        }

        let jwt = self.generate_jwt()?;
        let url = format!(
            "https://api.github.com/app/installations/{}/access_tokens",
            installation_id
        );

        info!("Requesting new installation access token");

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", jwt))
            .header("Accept", "application/vnd.github.v3+json")
            .send()
            .await?;

        let response = expect_success(response, "installation").await?;

        let token_response: InstallationTokenResponse = response.json().await?;

        let expires_at = chrono::DateTime::parse_from_rfc3339(&token_response.expires_at)
            .map_err(|e| PlatformError::Malformed(format!("token expiration: {e}")))?
            .with_timezone(&Utc);
        let expires_at_system =
            UNIX_EPOCH + std::time::Duration::from_secs(expires_at.timestamp().max(0) as u64);

        {
            let mut cache = self.token_cache.write().await;
            cache.insert(
                installation_id,
                (token_response.token.clone(), expires_at_system),
            );
        }

        Ok(token_response.token)
    }

    async fn get(
        &self,
        repo: &RepoId,
        url: &str,
        accept: &str,
    ) -> Result<reqwest::Response, PlatformError> {
        let token = self.get_installation_token(repo.installation_id).await?;
        let response = self
            .client
            .get(url)
            .header("Authorization", format!("Bearer {}", token))
            .header("Accept", accept)
            .send()
            .await?;
        Ok(response)
    }
}

/// Map a non-success response to an error, distinguishing 404s.
async fn expect_success(
    response: reqwest::Response,
    what: &str,
) -> Result<reqwest::Response, PlatformError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == StatusCode::NOT_FOUND {
        return Err(PlatformError::NotFound {
            what: what.to_string(),
        });
    }
    let message = response.text().await.unwrap_or_default();
    error!("GitHub API error: {} - {}", status, message);
    Err(PlatformError::Api {
        status: status.as_u16(),
        message,
    })
}

#[async_trait]
impl PlatformClient for GitHubClient {
    async fn get_file_content(
        &self,
        repo: &RepoId,
        reference: &str,
        path: &str,
    ) -> Result<Vec<u8>, PlatformError> {
        let url = format!(
            "https://api.github.com/repos/{}/{}/contents/{}?ref={}",
            repo.owner, repo.name, path, reference
        );

        info!("Fetching file contents: {} at {}", path, reference);

        let response = self.get(repo, &url, "application/vnd.github.v3+json").await?;
        let response = expect_success(response, &format!("{path} at {reference}")).await?;

        let file: FileContentsResponse = response.json().await?;
        general_purpose::STANDARD
            .decode(file.content.replace('\n', ""))
            .map_err(|e| PlatformError::Malformed(format!("base64 file content: {e}")))
    }

    async fn list_changed_files(
        &self,
        repo: &RepoId,
        base: &str,
        head: &str,
    ) -> Result<Vec<String>, PlatformError> {
        let url = format!(
            "https://api.github.com/repos/{}/{}/compare/{}...{}",
            repo.owner, repo.name, base, head
        );

        info!("Fetching changed files from {}...{}", base, head);

        let response = self.get(repo, &url, "application/vnd.github.v3+json").await?;
        let response = expect_success(response, &format!("compare {base}...{head}")).await?;

        let compare: CompareResponse = response.json().await?;
        let changed_files: Vec<String> = compare.files.into_iter().map(|f| f.filename).collect();

        info!("Found {} changed files", changed_files.len());
        Ok(changed_files)
    }

    async fn create_comment(
        &self,
        repo: &RepoId,
        number: u64,
        body: &str,
    ) -> Result<(), PlatformError> {
        let url = format!(
            "https://api.github.com/repos/{}/{}/issues/{}/comments",
            repo.owner, repo.name, number
        );

        info!(
            "Posting comment to PR #{} in {}/{}",
            number, repo.owner, repo.name
        );

        let token = self.get_installation_token(repo.installation_id).await?;
        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", token))
            .header("Accept", "application/vnd.github.v3+json")
            .json(&CreateCommentRequest {
                body: body.to_string(),
            })
            .send()
            .await?;

        expect_success(response, &format!("issue #{number}")).await?;
        Ok(())
    }

    async fn add_labels(
        &self,
        repo: &RepoId,
        number: u64,
        labels: &[String],
    ) -> Result<(), PlatformError> {
        let url = format!(
            "https://api.github.com/repos/{}/{}/issues/{}/labels",
            repo.owner, repo.name, number
        );

        info!(
            "Adding labels {:?} to PR #{} in {}/{}",
            labels, number, repo.owner, repo.name
        );

        let token = self.get_installation_token(repo.installation_id).await?;
        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", token))
            .header("Accept", "application/vnd.github.v3+json")
            .json(&AddLabelsRequest {
                labels: labels.to_vec(),
            })
            .send()
            .await?;

        expect_success(response, &format!("issue #{number}")).await?;
        Ok(())
    }

    async fn remove_label(
        &self,
        repo: &RepoId,
        number: u64,
        label: &str,
    ) -> Result<(), PlatformError> {
        // The url crate percent-encodes the spaces in label names like
        // "needs lgtm" when the request URL is parsed.
        let url = format!(
            "https://api.github.com/repos/{}/{}/issues/{}/labels/{}",
            repo.owner, repo.name, number, label
        );

        info!(
            "Removing label {:?} from PR #{} in {}/{}",
            label, number, repo.owner, repo.name
        );

        let token = self.get_installation_token(repo.installation_id).await?;
        let response = self
            .client
            .delete(&url)
            .header("Authorization", format!("Bearer {}", token))
            .header("Accept", "application/vnd.github.v3+json")
            .send()
            .await?;

        expect_success(response, &format!("label {label:?} on issue #{number}")).await?;
        Ok(())
    }

    async fn get_review_request(
        &self,
        repo: &RepoId,
        number: u64,
    ) -> Result<ReviewRequest, PlatformError> {
        let url = format!(
            "https://api.github.com/repos/{}/{}/pulls/{}",
            repo.owner, repo.name, number
        );

        info!(
            "Fetching PR #{} in {}/{}",
            number, repo.owner, repo.name
        );

        let response = self.get(repo, &url, "application/vnd.github.v3+json").await?;
        let response = expect_success(response, &format!("pull request #{number}")).await?;

        let pull: PullRequestResponse = response.json().await?;
        Ok(ReviewRequest {
            number: pull.number,
            base_sha: pull.base.sha,
            head_sha: pull.head.sha,
            labels: pull.labels.into_iter().map(|l| l.name).collect(),
            author: pull.user.login,
        })
    }
}
