//! Effect interpreter that executes effects against the platform client.
//!
//! The interpreter is the boundary between the pure state machine and the
//! impure world of I/O. Effects execute sequentially, in the order the
//! transition produced them: the announcement comment is posted before the
//! state label is added, so a crash in between re-sends the comment on the
//! next delivery rather than silently dropping it. The first failed platform
//! call aborts the invocation.

use tracing::{debug, info, warn};

use super::effect::{Effect, LogLevel};
use crate::github::{PlatformClient, PlatformError, RepoId};

/// Context needed by the interpreter to execute effects.
pub struct InterpreterContext<'a> {
    pub client: &'a dyn PlatformClient,
    pub repo: &'a RepoId,
    pub number: u64,
}

/// Execute effects in order, stopping at the first failure.
pub async fn execute_effects(
    ctx: &InterpreterContext<'_>,
    effects: Vec<Effect>,
) -> Result<(), PlatformError> {
    for effect in effects {
        execute_effect(ctx, effect).await?;
    }
    Ok(())
}

async fn execute_effect(ctx: &InterpreterContext<'_>, effect: Effect) -> Result<(), PlatformError> {
    match effect {
        Effect::PostComment { content } => {
            ctx.client
                .create_comment(ctx.repo, ctx.number, &content.render())
                .await
        }

        Effect::AddLabel { label } => ctx.client.add_labels(ctx.repo, ctx.number, &[label]).await,

        Effect::RemoveLabel { label } => {
            ctx.client.remove_label(ctx.repo, ctx.number, &label).await
        }

        Effect::Log { level, message } => {
            match level {
                LogLevel::Debug => debug!("{}", message),
                LogLevel::Info => info!("{}", message),
                LogLevel::Warn => warn!("{}", message),
            }
            Ok(())
        }
    }
}
