//! Events that trigger state transitions.
//!
//! Events represent things that happened on the platform - a pull request
//! was opened or pushed to, a comment was posted. They are inputs to the
//! pure transition function.

use super::state::CommitSha;

/// All events that can trigger state transitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReviewEvent {
    /// The pull request was opened or synchronized (new commit pushed).
    /// Triggered by pull_request.opened and pull_request.synchronize webhooks
    /// (and their pull_request_target equivalents).
    PrUpdated {
        head_sha: CommitSha,
        base_sha: CommitSha,
    },

    /// A comment was posted on the pull request thread.
    CommentPosted { author: String, body: String },
}

impl ReviewEvent {
    /// Returns a summary of the event suitable for logging.
    ///
    /// Comment bodies are free text from arbitrary users; only their length
    /// is logged.
    pub fn log_summary(&self) -> String {
        match self {
            ReviewEvent::PrUpdated { head_sha, base_sha } => {
                format!(
                    "PrUpdated {{ head: {}, base: {} }}",
                    head_sha.short(),
                    base_sha.short()
                )
            }
            ReviewEvent::CommentPosted { author, body } => {
                format!(
                    "CommentPosted {{ author: {}, body_len: {} }}",
                    author,
                    body.len()
                )
            }
        }
    }
}
