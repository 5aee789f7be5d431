//! Sequence scope lifecycle.
//!
//! A [`Sequence`] owns the root [`Loop`] of one verification session and the
//! registry slot for the context that opened it. It is `Open` from
//! [`Sequence::create`] until [`Sequence::close`] (or drop), then `Closed`
//! for good.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;

use tracing::Span;

use crate::config::SequenceConfig;
use crate::context::ContextKey;
use crate::error::{Result, SequenceError};
use crate::handle::{LoopId, SetupHandle, StepId};
use crate::loops::Loop;
use crate::registry::ContextRegistry;
use crate::step::Step;
use crate::times::Times;
use crate::tracing::{
    sequence_span, trace_accept, trace_close, trace_declare_loop, trace_declare_step,
    trace_mode_mismatch, trace_reject,
};

/// Context named in the completeness error raised at close.
pub const END_OF_SEQUENCE: &str = "At end of sequence";

static NEXT_SEQUENCE: AtomicU64 = AtomicU64::new(1);

#[derive(Debug)]
struct SequenceState {
    root: Loop,
    next_step: usize,
    next_loop: usize,
    recording: bool,
    failure: Option<SequenceError>,
    closed: bool,
}

impl SequenceState {
    fn check_declarable(&self) -> Result<()> {
        if self.closed {
            return Err(SequenceError::Closed);
        }
        if self.recording {
            return Err(SequenceError::DeclarationClosed);
        }
        Ok(())
    }

    fn parent_mut(&mut self, parent: LoopId) -> Result<&mut Loop> {
        self.root
            .find_loop_mut(parent)
            .ok_or(SequenceError::UnknownNode {
                kind: "loop",
                id: parent.index(),
            })
    }
}

/// State shared between a sequence, its loop handles and the registry.
#[derive(Debug)]
pub(crate) struct Shared {
    id: u64,
    span: Span,
    state: Mutex<SequenceState>,
}

impl Shared {
    fn new(span: Span) -> Self {
        Self {
            id: NEXT_SEQUENCE.fetch_add(1, Ordering::Relaxed),
            span,
            state: Mutex::new(SequenceState {
                root: Loop::root(),
                next_step: 0,
                next_loop: 1,
                recording: false,
                failure: None,
                closed: false,
            }),
        }
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    fn lock(&self) -> MutexGuard<'_, SequenceState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn create_loop(&self, parent: LoopId, times: Times) -> Result<LoopId> {
        let _enter = self.span.enter();
        let mut state = self.lock();
        state.check_declarable()?;
        let id = LoopId(state.next_loop);
        state.parent_mut(parent)?.push_loop(Loop::new(id, times));
        state.next_loop += 1;
        trace_declare_loop(id, times, parent);
        Ok(id)
    }

    pub(crate) fn create_step(
        &self,
        parent: LoopId,
        setup: &SetupHandle,
        times: Times,
    ) -> Result<StepId> {
        let _enter = self.span.enter();
        let mut state = self.lock();
        state.check_declarable()?;
        let id = StepId(state.next_step);
        state
            .parent_mut(parent)?
            .push_step(Step::new(id, setup.clone(), times));
        state.next_step += 1;
        trace_declare_step(id, setup, times, parent);
        Ok(id)
    }

    /// Record a call, remembering the first failure.
    ///
    /// Once a call has failed every later call fails with
    /// [`SequenceError::AlreadyFailed`] carrying the first error.
    pub(crate) fn record_call(&self, setup: &SetupHandle) -> Result<StepId> {
        let _enter = self.span.enter();
        let mut state = self.lock();
        if state.closed {
            return Err(SequenceError::Closed);
        }
        if let Some(first) = &state.failure {
            let err = SequenceError::AlreadyFailed {
                first: first.to_string(),
            };
            trace_reject(setup, &err);
            return Err(err);
        }
        state.recording = true;
        match state.root.record_call(setup) {
            Ok(step) => {
                trace_accept(setup, step);
                Ok(step)
            }
            Err(err) => {
                trace_reject(setup, &err);
                state.failure = Some(err.clone());
                Err(err)
            }
        }
    }

    pub(crate) fn ensure_complete(&self, context: &str) -> Result<()> {
        self.lock().root.ensure_complete(context)
    }

    fn close(&self) -> Result<()> {
        let _enter = self.span.enter();
        let mut state = self.lock();
        if state.closed {
            return Ok(());
        }
        state.closed = true;
        // An invocation error is authoritative; re-checking would only
        // report the knock-on incompleteness.
        let skipped = state.failure.is_some();
        let outcome = if skipped {
            Ok(())
        } else {
            state.root.ensure_complete(END_OF_SEQUENCE)
        };
        trace_close(&outcome, skipped);
        outcome
    }
}

/// One ordered-verification scope.
///
/// Opening a sequence claims the current context in its registry; only one
/// sequence may be open per context. The claim is released on
/// [`close`](Sequence::close) and on drop, whatever the outcome.
///
/// # Examples
///
/// ```
/// use telltale_sequence::{Sequence, SetupHandle, Times};
///
/// let open = SetupHandle::new("File::open");
/// let write = SetupHandle::new("File::write");
/// let close = SetupHandle::new("File::close");
///
/// let seq = Sequence::create().unwrap();
/// seq.create_step(&open, Times::once()).unwrap();
/// let writes = seq.create_loop(Times::at_least_once()).unwrap();
/// writes.create_step(&write, Times::once()).unwrap();
/// seq.create_step(&close, Times::once()).unwrap();
///
/// seq.record_call(&open).unwrap();
/// seq.record_call(&write).unwrap();
/// seq.record_call(&write).unwrap();
/// seq.record_call(&close).unwrap();
/// seq.close().unwrap();
/// ```
#[derive(Debug)]
pub struct Sequence {
    shared: Arc<Shared>,
    registry: Arc<ContextRegistry>,
    key: ContextKey,
    verify_on_drop: bool,
    released: bool,
}

impl Sequence {
    /// Open a sequence in the current context of the global registry.
    ///
    /// # Errors
    ///
    /// Returns [`SequenceError::DuplicateSequence`] if the context already has
    /// an open sequence.
    pub fn create() -> Result<Self> {
        Self::create_with(ContextRegistry::global(), SequenceConfig::default())
    }

    /// Open a sequence in the current context of `registry`.
    ///
    /// # Errors
    ///
    /// Returns [`SequenceError::DuplicateSequence`] if the context already has
    /// an open sequence.
    pub fn create_in(registry: &Arc<ContextRegistry>) -> Result<Self> {
        Self::create_with(registry, SequenceConfig::default())
    }

    /// Open a sequence in the global registry with explicit settings.
    ///
    /// The config's mode is not applied here; see [`SequenceConfig::install`].
    /// A mode that differs from the registry's is logged as a warning on the
    /// `sequence.mode` target.
    ///
    /// # Errors
    ///
    /// Returns [`SequenceError::DuplicateSequence`] if the context already has
    /// an open sequence.
    pub fn with_config(config: SequenceConfig) -> Result<Self> {
        Self::create_with(ContextRegistry::global(), config)
    }

    /// Open a sequence in `registry` with explicit settings.
    ///
    /// # Errors
    ///
    /// Returns [`SequenceError::DuplicateSequence`] if the context already has
    /// an open sequence.
    pub fn create_with(registry: &Arc<ContextRegistry>, config: SequenceConfig) -> Result<Self> {
        let mode = registry.mode();
        if config.mode != mode {
            trace_mode_mismatch(&config.name, config.mode, mode);
        }
        let key = mode.current_key();
        let shared = Arc::new(Shared::new(sequence_span(&config.name, mode)));
        registry.register(key, Arc::clone(&shared))?;
        Ok(Self {
            shared,
            registry: Arc::clone(registry),
            key,
            verify_on_drop: config.verify_on_drop,
            released: false,
        })
    }

    /// Process-unique id of this sequence.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.shared.id()
    }

    /// The context this sequence is registered under.
    #[must_use]
    pub fn key(&self) -> ContextKey {
        self.key
    }

    /// Append a loop with the given pass bounds to the root.
    ///
    /// # Errors
    ///
    /// Fails once calls have been recorded or the sequence is closed.
    pub fn create_loop(&self, times: Times) -> Result<LoopHandle> {
        LoopHandle::root(&self.shared).create_loop(times)
    }

    /// Append a loop that may run any number of times.
    ///
    /// # Errors
    ///
    /// Fails once calls have been recorded or the sequence is closed.
    pub fn create_loop_any(&self) -> Result<LoopHandle> {
        self.create_loop(Times::any_number())
    }

    /// Append a step to the root.
    ///
    /// # Errors
    ///
    /// Fails once calls have been recorded or the sequence is closed.
    pub fn create_step(&self, setup: &SetupHandle, times: Times) -> Result<StepId> {
        self.shared.create_step(LoopId::ROOT, setup, times)
    }

    /// Record that the call-site behind `setup` just ran.
    ///
    /// # Errors
    ///
    /// Returns the matching error for a rejected call, or
    /// [`SequenceError::AlreadyFailed`] if an earlier call was rejected.
    pub fn record_call(&self, setup: &SetupHandle) -> Result<StepId> {
        self.shared.record_call(setup)
    }

    /// Check every minimum without closing.
    ///
    /// # Errors
    ///
    /// Returns [`SequenceError::Incomplete`] naming `context`.
    pub fn ensure_complete(&self, context: &str) -> Result<()> {
        self.shared.ensure_complete(context)
    }

    /// Whether a recorded call has been rejected.
    #[must_use]
    pub fn has_failed(&self) -> bool {
        self.shared.lock().failure.is_some()
    }

    /// A copy of the expectation tree in its current state.
    #[must_use]
    pub fn snapshot(&self) -> Loop {
        self.shared.lock().root.clone()
    }

    /// Release the context and verify completeness.
    ///
    /// The registry slot is released first, so a failing sequence never
    /// blocks the next one. If a recorded call was already rejected the
    /// completeness check is skipped and this returns `Ok`.
    ///
    /// # Errors
    ///
    /// Returns [`SequenceError::Incomplete`] with context
    /// `"At end of sequence"` if some minimum was not met.
    pub fn close(mut self) -> Result<()> {
        self.finish()
    }

    fn finish(&mut self) -> Result<()> {
        if !self.released {
            self.registry.release(self.key, self.shared.id());
            self.released = true;
        }
        self.shared.close()
    }
}

impl Drop for Sequence {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(err) = self.finish() {
            if self.verify_on_drop && !thread::panicking() {
                panic!("{err}");
            }
        }
    }
}

/// Handle for declaring inside a loop of an open sequence.
#[derive(Debug, Clone)]
pub struct LoopHandle {
    shared: Arc<Shared>,
    id: LoopId,
}

impl LoopHandle {
    pub(crate) fn root(shared: &Arc<Shared>) -> Self {
        Self {
            shared: Arc::clone(shared),
            id: LoopId::ROOT,
        }
    }

    #[must_use]
    pub fn id(&self) -> LoopId {
        self.id
    }

    /// Append a step to this loop.
    ///
    /// # Errors
    ///
    /// Fails once calls have been recorded or the sequence is closed.
    pub fn create_step(&self, setup: &SetupHandle, times: Times) -> Result<StepId> {
        self.shared.create_step(self.id, setup, times)
    }

    /// Append a nested loop to this loop.
    ///
    /// # Errors
    ///
    /// Fails once calls have been recorded or the sequence is closed.
    pub fn create_loop(&self, times: Times) -> Result<LoopHandle> {
        let id = self.shared.create_loop(self.id, times)?;
        Ok(Self {
            shared: Arc::clone(&self.shared),
            id,
        })
    }

    /// Append a nested loop that may run any number of times.
    ///
    /// # Errors
    ///
    /// Fails once calls have been recorded or the sequence is closed.
    pub fn create_loop_any(&self) -> Result<LoopHandle> {
        self.create_loop(Times::any_number())
    }
}
