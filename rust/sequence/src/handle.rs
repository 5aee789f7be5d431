//! Typed identifiers for call-sites, steps and loops.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_SETUP: AtomicU64 = AtomicU64::new(1);

/// Opaque token for one registered call-site in the host mocking layer.
///
/// Two handles are equal only if one is a clone of the other; the name is
/// carried for error messages and never compared.
#[derive(Clone)]
pub struct SetupHandle {
    id: u64,
    name: Arc<str>,
}

impl SetupHandle {
    /// Allocate a fresh handle with a display name such as `"Writer::write"`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: NEXT_SETUP.fetch_add(1, Ordering::Relaxed),
            name: Arc::from(name.into()),
        }
    }

    /// Process-unique numeric id.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Display name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl PartialEq for SetupHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for SetupHandle {}

impl Hash for SetupHandle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for SetupHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SetupHandle({}#{})", self.name, self.id)
    }
}

impl fmt::Display for SetupHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Index of a step within its sequence, in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StepId(pub(crate) usize);

impl StepId {
    #[must_use]
    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Index of a loop within its sequence. The root loop is `LoopId(0)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LoopId(pub(crate) usize);

impl LoopId {
    pub(crate) const ROOT: LoopId = LoopId(0);

    #[must_use]
    pub fn index(&self) -> usize {
        self.0
    }

    #[must_use]
    pub fn is_root(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for LoopId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}
