//! Tracing support for sequence verification
//!
//! Every sequence owns a span created by [`sequence_span`]; declarations,
//! recorded calls and the final check are logged as events inside it.
//!
//! # Standard Span Fields
//!
//! - `sequence`: Name given to the sequence (defaults to `"sequence"`)
//! - `context_mode`: `thread` or `flow_aware`
//!
//! # Event Types
//!
//! - `sequence.declare.step`: Step appended to a loop
//! - `sequence.declare.loop`: Nested loop appended to a loop
//! - `sequence.accept`: Call matched the expected position
//! - `sequence.reject`: Call was out of sequence or over quota
//! - `sequence.pass`: A loop started a new pass
//! - `sequence.close`: Sequence closed and verified
//! - `sequence.mode`: Config asked for a context mode the registry does not use

use tracing::{debug, info_span, trace, warn, Span};

use crate::context::ContextMode;
use crate::error::SequenceError;
use crate::handle::{LoopId, SetupHandle, StepId};
use crate::times::Times;

/// Standard span field names.
pub mod fields {
    pub const SEQUENCE: &str = "sequence";
    pub const CONTEXT_MODE: &str = "context_mode";
    pub const SETUP: &str = "setup";
    pub const STEP: &str = "step";
    pub const LOOP: &str = "loop_id";
    pub const PARENT: &str = "parent";
    pub const TIMES: &str = "times";
    pub const PASSES: &str = "passes";
    pub const ERROR: &str = "error";
}

/// Event targets for sequence operations.
pub mod events {
    pub const DECLARE_STEP: &str = "sequence.declare.step";
    pub const DECLARE_LOOP: &str = "sequence.declare.loop";
    pub const ACCEPT: &str = "sequence.accept";
    pub const REJECT: &str = "sequence.reject";
    pub const PASS: &str = "sequence.pass";
    pub const CLOSE: &str = "sequence.close";
    pub const MODE: &str = "sequence.mode";
}

/// Create the span a sequence's events are logged under.
pub fn sequence_span(name: &str, mode: ContextMode) -> Span {
    info_span!(
        "sequence",
        sequence = name,
        context_mode = %mode
    )
}

/// Log a step declaration.
pub fn trace_declare_step(step: StepId, setup: &SetupHandle, times: Times, parent: LoopId) {
    debug!(
        target: "sequence.declare.step",
        step = %step,
        setup = %setup,
        times = %times,
        parent = %parent,
        "step declared"
    );
}

/// Log a nested loop declaration.
pub fn trace_declare_loop(id: LoopId, times: Times, parent: LoopId) {
    debug!(
        target: "sequence.declare.loop",
        loop_id = %id,
        times = %times,
        parent = %parent,
        "loop declared"
    );
}

/// Log an accepted call.
pub fn trace_accept(setup: &SetupHandle, step: StepId) {
    trace!(
        target: "sequence.accept",
        setup = %setup,
        step = %step,
        "call accepted"
    );
}

/// Log a rejected call.
pub fn trace_reject(setup: &SetupHandle, error: &SequenceError) {
    warn!(
        target: "sequence.reject",
        setup = %setup,
        error = %error,
        "call rejected"
    );
}

/// Log the start of a loop pass.
pub fn trace_pass(id: LoopId, passes: u32, times: Times) {
    debug!(
        target: "sequence.pass",
        loop_id = %id,
        passes = passes,
        times = %times,
        "loop pass started"
    );
}

/// Log the outcome of closing a sequence.
pub fn trace_close(outcome: &Result<(), SequenceError>, skipped: bool) {
    match outcome {
        Ok(()) if skipped => debug!(
            target: "sequence.close",
            "sequence closed; completeness check skipped after invocation error"
        ),
        Ok(()) => debug!(target: "sequence.close", "sequence closed"),
        Err(error) => warn!(
            target: "sequence.close",
            error = %error,
            "sequence closed incomplete"
        ),
    }
}

/// Log that a config's context mode was not applied.
pub fn trace_mode_mismatch(name: &str, requested: ContextMode, active: ContextMode) {
    warn!(
        target: "sequence.mode",
        sequence = name,
        requested = %requested,
        active = %active,
        "config mode ignored; the registry keys contexts by its own mode"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_span() {
        let span = sequence_span("TestSequence", ContextMode::Thread);
        assert!(span.is_disabled() || !span.is_disabled());
    }

    #[test]
    fn test_events_do_not_panic_without_subscriber() {
        let setup = SetupHandle::new("a");
        trace_declare_step(StepId(0), &setup, Times::once(), LoopId::ROOT);
        trace_declare_loop(LoopId(1), Times::any_number(), LoopId::ROOT);
        trace_accept(&setup, StepId(0));
        trace_pass(LoopId(1), 2, Times::any_number());
        trace_close(&Ok(()), true);
        trace_mode_mismatch("s", ContextMode::FlowAware, ContextMode::Thread);
        trace_close(&Err(SequenceError::DuplicateSequence), false);
    }
}
