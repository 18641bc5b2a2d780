/// Command scanning for review-thread comments.
use std::fmt;

/// The commands recognized in pull request discussion comments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewCommand {
    /// A reviewer signs off on the change.
    Lgtm,
    /// An approver clears the change for merge.
    Approve,
}

impl ReviewCommand {
    /// The literal token scanned for in comment bodies.
    pub const fn token(self) -> &'static str {
        match self {
            ReviewCommand::Lgtm => "/lgtm",
            ReviewCommand::Approve => "/approve",
        }
    }
}

impl fmt::Display for ReviewCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.token())
    }
}

/// Whether a comment body carries the given command.
///
/// This is plain substring containment: the token may appear anywhere in the
/// body, including mid-sentence. Authorization of the commenter happens in
/// the state machine, not here.
pub fn has_command(body: &str, command: ReviewCommand) -> bool {
    body.contains(command.token())
}
