//! Pure state transition function.
//!
//! Deciding a transition takes two steps. `plan` classifies the
//! (phase, event) pair without needing any owner data, so the caller can
//! skip the config fetch and file listing entirely for no-ops. The returned
//! `PendingTransition` is then `apply`d to the resolved owner sets, which
//! performs the authorization check and produces the effects. `transition`
//! composes the two and is the function the tests exercise.
//!
//! Neither step has side effects - everything to do is returned as data.

use crate::command::{has_command, ReviewCommand};
use crate::ownership::OwnerSets;

use super::effect::{CommentContent, Effect, LogLevel};
use super::event::ReviewEvent;
use super::state::{
    ReviewPhase, NEEDS_APPROVE_LABEL, NEEDS_LGTM_LABEL, READY_LABEL,
};

/// Result of a state transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionResult {
    /// The phase after the transition.
    pub phase: ReviewPhase,
    /// Effects to execute, in order.
    pub effects: Vec<Effect>,
}

impl TransitionResult {
    pub fn new(phase: ReviewPhase, effects: Vec<Effect>) -> Self {
        Self { phase, effects }
    }

    pub fn no_change(phase: ReviewPhase) -> Self {
        Self {
            phase,
            effects: vec![],
        }
    }
}

/// A transition that will fire once owner data is available.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingTransition {
    /// The request entered review: announce reviewers and mark `needs lgtm`.
    RequestReviewers,
    /// A `/lgtm` comment arrived while waiting on reviewers.
    GrantLgtm { commenter: String },
    /// An `/approve` comment arrived while waiting on approvers.
    GrantApproval { commenter: String },
}

/// Classify an event against the current phase.
///
/// Returns `None` for every no-op combination: re-delivered PR events once a
/// state label is present (idempotence guard), comments without the command
/// token the phase is waiting for, anything in a terminal or conflicted
/// phase, and command comments in phases that do not accept them.
pub fn plan(phase: ReviewPhase, event: &ReviewEvent) -> Option<PendingTransition> {
    match (phase, event) {
        (ReviewPhase::Open, ReviewEvent::PrUpdated { .. }) => {
            Some(PendingTransition::RequestReviewers)
        }
        (ReviewPhase::NeedsLgtm, ReviewEvent::CommentPosted { author, body })
            if has_command(body, ReviewCommand::Lgtm) =>
        {
            Some(PendingTransition::GrantLgtm {
                commenter: author.clone(),
            })
        }
        (ReviewPhase::NeedsApprove, ReviewEvent::CommentPosted { author, body })
            if has_command(body, ReviewCommand::Approve) =>
        {
            Some(PendingTransition::GrantApproval {
                commenter: author.clone(),
            })
        }
        _ => None,
    }
}

impl PendingTransition {
    /// Authorize against the resolved owners and produce the effects.
    ///
    /// Unauthorized commands are not errors: the result stays in the current
    /// phase with nothing but a debug log effect, and the commenter is never
    /// told in the thread.
    pub fn apply(self, owners: &OwnerSets) -> TransitionResult {
        match self {
            PendingTransition::RequestReviewers => TransitionResult::new(
                ReviewPhase::NeedsLgtm,
                vec![
                    Effect::PostComment {
                        content: CommentContent::ReviewersRequested {
                            reviewers: owners.reviewers.clone(),
                        },
                    },
                    Effect::AddLabel {
                        label: NEEDS_LGTM_LABEL.to_string(),
                    },
                ],
            ),

            PendingTransition::GrantLgtm { commenter } => {
                if !owners.reviewers.iter().any(|r| *r == commenter) {
                    return unauthorized(ReviewPhase::NeedsLgtm, ReviewCommand::Lgtm, &commenter);
                }
                TransitionResult::new(
                    ReviewPhase::NeedsApprove,
                    vec![
                        Effect::PostComment {
                            content: CommentContent::ApproversRequested {
                                approvers: owners.approvers.clone(),
                            },
                        },
                        Effect::AddLabel {
                            label: NEEDS_APPROVE_LABEL.to_string(),
                        },
                        Effect::RemoveLabel {
                            label: NEEDS_LGTM_LABEL.to_string(),
                        },
                    ],
                )
            }

            PendingTransition::GrantApproval { commenter } => {
                if !owners.approvers.iter().any(|a| *a == commenter) {
                    return unauthorized(
                        ReviewPhase::NeedsApprove,
                        ReviewCommand::Approve,
                        &commenter,
                    );
                }
                TransitionResult::new(
                    ReviewPhase::Ready,
                    vec![
                        Effect::AddLabel {
                            label: READY_LABEL.to_string(),
                        },
                        Effect::RemoveLabel {
                            label: NEEDS_APPROVE_LABEL.to_string(),
                        },
                    ],
                )
            }
        }
    }
}

fn unauthorized(phase: ReviewPhase, command: ReviewCommand, commenter: &str) -> TransitionResult {
    TransitionResult {
        phase,
        effects: vec![Effect::Log {
            level: LogLevel::Debug,
            message: format!("{command} from unauthorized user {commenter}"),
        }],
    }
}

/// Pure state transition function.
///
/// Given the current phase, an event, and the owners resolved for the
/// current changed-file set, returns the next phase and the effects to
/// execute.
pub fn transition(
    phase: ReviewPhase,
    event: &ReviewEvent,
    owners: &OwnerSets,
) -> TransitionResult {
    match plan(phase, event) {
        Some(pending) => pending.apply(owners),
        None => TransitionResult::no_change(phase),
    }
}
