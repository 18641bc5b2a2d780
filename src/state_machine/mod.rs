//! Explicit state machine for the review-approval lifecycle.
//!
//! The machine is pure at its core and separates:
//! - **Phase**: where the request stands, derived from its labels (`ReviewPhase`)
//! - **Events**: what happened (`ReviewEvent`)
//! - **Effects**: what to do (`Effect`)
//! - **Transition**: pure function `(Phase, Event, Owners) -> (Phase, Vec<Effect>)`
//!
//! Labels on the pull request are the only state that survives between
//! invocations; the phase is re-derived from them every time, so the machine
//! tolerates process restarts. The interpreter executes effects against the
//! platform client, in order, failing the invocation on the first error.

pub mod effect;
pub mod event;
pub mod interpreter;
pub mod state;
pub mod transition;

pub use effect::*;
pub use event::*;
pub use interpreter::*;
pub use state::*;
pub use transition::*;
