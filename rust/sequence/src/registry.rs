//! Process-wide map from execution context to its active sequence.
//!
//! The registry is the only state shared between sequences. Host mocking
//! layers that cannot hold on to a [`Sequence`](crate::Sequence) reach the
//! active one through it: [`ContextRegistry::record_call`] looks up the
//! sequence for the caller's context and records against it.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

use crate::config::SequenceConfig;
use crate::context::{ContextKey, ContextMode};
use crate::error::{Result, SequenceError};
use crate::handle::{LoopId, SetupHandle, StepId};
use crate::sequence::{LoopHandle, Shared};
use crate::times::Times;

static GLOBAL: OnceLock<Arc<ContextRegistry>> = OnceLock::new();

/// At most one active sequence per execution context.
#[derive(Debug, Default)]
pub struct ContextRegistry {
    mode: AtomicU8,
    slots: Mutex<HashMap<ContextKey, Arc<Shared>>>,
}

impl ContextRegistry {
    /// Create an empty registry keyed by `mode`.
    pub fn new(mode: ContextMode) -> Self {
        Self {
            mode: AtomicU8::new(mode.as_u8()),
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Create an empty registry using the config's mode.
    pub fn from_config(config: &SequenceConfig) -> Self {
        Self::new(config.mode)
    }

    /// The registry used by [`Sequence::create`](crate::Sequence::create).
    pub fn global() -> &'static Arc<ContextRegistry> {
        GLOBAL.get_or_init(|| Arc::new(ContextRegistry::new(ContextMode::Thread)))
    }

    #[must_use]
    pub fn mode(&self) -> ContextMode {
        ContextMode::from_u8(self.mode.load(Ordering::Acquire))
    }

    /// Change how contexts are identified.
    ///
    /// Sequences already open keep the key they were registered under.
    pub fn set_mode(&self, mode: ContextMode) {
        self.mode.store(mode.as_u8(), Ordering::Release);
    }

    /// Key of the caller's context under the current mode.
    #[must_use]
    pub fn current_key(&self) -> ContextKey {
        self.mode().current_key()
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<ContextKey, Arc<Shared>>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn register(&self, key: ContextKey, shared: Arc<Shared>) -> Result<()> {
        match self.slots().entry(key) {
            Entry::Occupied(_) => Err(SequenceError::DuplicateSequence),
            Entry::Vacant(slot) => {
                tracing::debug!(context = %key, sequence = shared.id(), "sequence registered");
                slot.insert(shared);
                Ok(())
            }
        }
    }

    /// Clear `key` if it still holds sequence `id`.
    pub(crate) fn release(&self, key: ContextKey, id: u64) {
        let mut slots = self.slots();
        if slots.get(&key).is_some_and(|shared| shared.id() == id) {
            slots.remove(&key);
            tracing::debug!(context = %key, sequence = id, "sequence released");
        }
    }

    /// Whether the caller's context has an open sequence.
    #[must_use]
    pub fn has_active(&self) -> bool {
        self.slots().contains_key(&self.current_key())
    }

    /// Number of contexts with an open sequence.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.slots().len()
    }

    fn active(&self, context: &'static str) -> Result<Arc<Shared>> {
        self.slots()
            .get(&self.current_key())
            .cloned()
            .ok_or(SequenceError::NoActiveSequence { context })
    }

    /// Fail unless the caller's context has an open sequence.
    ///
    /// # Errors
    ///
    /// Returns [`SequenceError::NoActiveSequence`] naming `context`.
    pub fn ensure_active(&self, context: &'static str) -> Result<()> {
        self.active(context).map(|_| ())
    }

    /// Append a loop to the active sequence's root.
    ///
    /// # Errors
    ///
    /// Returns [`SequenceError::NoActiveSequence`] outside a sequence.
    pub fn create_loop(&self, times: Times) -> Result<LoopHandle> {
        let shared = self.active("creating a loop")?;
        LoopHandle::root(&shared).create_loop(times)
    }

    /// Append a loop that may run any number of times.
    ///
    /// # Errors
    ///
    /// Returns [`SequenceError::NoActiveSequence`] outside a sequence.
    pub fn create_loop_any(&self) -> Result<LoopHandle> {
        self.create_loop(Times::any_number())
    }

    /// Append a step to the active sequence's root.
    ///
    /// # Errors
    ///
    /// Returns [`SequenceError::NoActiveSequence`] outside a sequence.
    pub fn create_step(&self, setup: &SetupHandle, times: Times) -> Result<StepId> {
        self.active("registering a step")?
            .create_step(LoopId::ROOT, setup, times)
    }

    /// Record a call against the active sequence.
    ///
    /// This is the callback a host mocking layer invokes whenever a
    /// registered call-site runs.
    ///
    /// # Errors
    ///
    /// Returns [`SequenceError::NoActiveSequence`] outside a sequence, or the
    /// sequence's rejection error.
    pub fn record_call(&self, setup: &SetupHandle) -> Result<StepId> {
        self.active("recording a call")?.record_call(setup)
    }
}

/// The process-wide context mode.
#[must_use]
pub fn context_mode() -> ContextMode {
    ContextRegistry::global().mode()
}

/// Set the process-wide context mode.
///
/// Meant to be set once at process start; it is not synchronized with
/// sequences that are already open.
pub fn set_context_mode(mode: ContextMode) {
    ContextRegistry::global().set_mode(mode);
}
