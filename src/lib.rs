pub mod command;
pub mod config;
pub mod github;
pub mod ownership;
pub mod review;
pub mod state_machine;
pub mod webhook;

use std::sync::Arc;

pub use github::{GitHubClient, PlatformClient, PlatformError, RepoId, ReviewRequest};

/// Shared state for the webhook server.
///
/// The platform client is held as a trait object so that handlers can be
/// driven by a fake in tests; see `review::handle_pull_request`.
pub struct AppState {
    pub platform: Arc<dyn PlatformClient>,
    pub webhook_secret: String,
    /// Repository-relative path of the ownership config file.
    pub owners_path: String,
}
