//! Phase derivation from the platform label set.

use std::fmt;

/// Label marking a request that is waiting on a reviewer `/lgtm`.
pub const NEEDS_LGTM_LABEL: &str = "needs lgtm";
/// Label marking a request that is waiting on an approver `/approve`.
pub const NEEDS_APPROVE_LABEL: &str = "needs approve";
/// Label marking a request that has cleared review and approval.
pub const READY_LABEL: &str = "ready for merge";

/// Newtype for commit SHA to prevent mixing with other strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CommitSha(pub String);

impl CommitSha {
    /// Returns a truncated SHA for display (first 7 characters).
    pub fn short(&self) -> &str {
        &self.0[..7.min(self.0.len())]
    }
}

impl fmt::Display for CommitSha {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for CommitSha {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for CommitSha {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Where a pull request stands in the review lifecycle.
///
/// Derived from the label set on every invocation, never cached. The labels
/// are not mutually exclusive by construction (anyone can edit them), so the
/// derivation makes them so: both state labels at once is `Conflicted`, on
/// which every event is a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewPhase {
    /// No relevant label; reviewers have not been requested yet.
    Open,
    /// Reviewers have been requested; waiting on `/lgtm`.
    NeedsLgtm,
    /// A reviewer signed off; waiting on `/approve`.
    NeedsApprove,
    /// An approver cleared the change. Terminal for this machine.
    Ready,
    /// Both `needs lgtm` and `needs approve` are present.
    Conflicted,
}

impl ReviewPhase {
    pub fn from_labels<S: AsRef<str>>(labels: &[S]) -> Self {
        let has = |label: &str| labels.iter().any(|l| l.as_ref() == label);
        match (has(NEEDS_LGTM_LABEL), has(NEEDS_APPROVE_LABEL)) {
            (true, true) => ReviewPhase::Conflicted,
            (true, false) => ReviewPhase::NeedsLgtm,
            (false, true) => ReviewPhase::NeedsApprove,
            (false, false) if has(READY_LABEL) => ReviewPhase::Ready,
            (false, false) => ReviewPhase::Open,
        }
    }
}

impl fmt::Display for ReviewPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ReviewPhase::Open => "open",
            ReviewPhase::NeedsLgtm => "needs-lgtm",
            ReviewPhase::NeedsApprove => "needs-approve",
            ReviewPhase::Ready => "ready",
            ReviewPhase::Conflicted => "conflicted",
        };
        write!(f, "{name}")
    }
}
