//! Effects (side effects as data).
//!
//! Effects describe what should happen as a result of a state transition.
//! They are pure data - the interpreter executes them against the platform
//! client. This separation enables testing the transition logic without
//! mocking HTTP.

/// All effects that can be produced by state transitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Post a comment on the pull request thread.
    PostComment { content: CommentContent },

    /// Add a label to the pull request.
    AddLabel { label: String },

    /// Remove a label from the pull request.
    RemoveLabel { label: String },

    /// Log a message (for debugging/tracing).
    Log { level: LogLevel, message: String },
}

impl Effect {
    /// Returns true if executing this effect mutates platform state.
    pub fn is_mutating(&self) -> bool {
        !matches!(self, Effect::Log { .. })
    }
}

/// Content for a comment posted by the bot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommentContent {
    /// Announce the reviewers responsible for the change.
    ReviewersRequested { reviewers: Vec<String> },

    /// Announce the approvers responsible for the change.
    ApproversRequested { approvers: Vec<String> },
}

impl CommentContent {
    /// Render the comment body.
    ///
    /// An empty owner set still renders (and posts) the announcement line,
    /// naming nobody.
    pub fn render(&self) -> String {
        match self {
            CommentContent::ReviewersRequested { reviewers } => {
                format!("Requesting review from: {}", mention_list(reviewers))
            }
            CommentContent::ApproversRequested { approvers } => {
                format!("Requesting approval from: {}", mention_list(approvers))
            }
        }
    }
}

fn mention_list(names: &[String]) -> String {
    names
        .iter()
        .map(|name| format!("@{name}"))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Log level for logging effects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
}
