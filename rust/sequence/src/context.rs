//! Execution context identity.
//!
//! A sequence is bound to the logical thread of control that opened it.
//! [`ContextMode`] decides what that identity is:
//!
//! - `Thread`: the current OS thread.
//! - `FlowAware`: the current *flow*, a tokio task-local token established
//!   with [`scope`] or [`sync_scope`]. Task-locals travel with the future, so
//!   the same flow is seen after every `.await`, even when the task resumes
//!   on another worker thread. Outside any flow a running tokio task is
//!   keyed by its task id, and code outside any task by its thread id.
//!
//! ```text
//!   scope(async {                 FlowId(7)
//!       Sequence::create()?;      registered under Flow(7)
//!       tokio::task::yield_now().await;
//!       registry.record_call(..)  still Flow(7), any worker thread
//!   })
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, ThreadId};

tokio::task_local! {
    static FLOW: FlowId;
}

static NEXT_FLOW: AtomicU64 = AtomicU64::new(1);

/// How the "current context" of a sequence is identified.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextMode {
    /// One active sequence per OS thread.
    #[default]
    Thread,
    /// One active sequence per flow, following async code across awaits.
    FlowAware,
}

impl ContextMode {
    /// Identity of the currently running context under this mode.
    #[must_use]
    pub fn current_key(self) -> ContextKey {
        match self {
            ContextMode::Thread => ContextKey::Thread(thread::current().id()),
            ContextMode::FlowAware => FlowId::current()
                .map(ContextKey::Flow)
                .or_else(|| tokio::task::try_id().map(ContextKey::Task))
                .unwrap_or_else(|| ContextKey::Thread(thread::current().id())),
        }
    }

    pub(crate) fn as_u8(self) -> u8 {
        match self {
            ContextMode::Thread => 0,
            ContextMode::FlowAware => 1,
        }
    }

    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            1 => ContextMode::FlowAware,
            _ => ContextMode::Thread,
        }
    }
}

impl fmt::Display for ContextMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContextMode::Thread => f.write_str("thread"),
            ContextMode::FlowAware => f.write_str("flow_aware"),
        }
    }
}

/// Error returned when parsing an unknown context mode.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown context mode: {0} (expected `thread` or `flow_aware`)")]
pub struct ParseContextModeError(pub String);

impl FromStr for ContextMode {
    type Err = ParseContextModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "thread" => Ok(ContextMode::Thread),
            "flow" | "flow_aware" | "flow-aware" | "flowaware" => Ok(ContextMode::FlowAware),
            other => Err(ParseContextModeError(other.to_string())),
        }
    }
}

/// Identity of one logical flow of execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FlowId(u64);

impl FlowId {
    fn next() -> Self {
        FlowId(NEXT_FLOW.fetch_add(1, Ordering::Relaxed))
    }

    /// The flow the caller is running in, if any.
    #[must_use]
    pub fn current() -> Option<FlowId> {
        FLOW.try_with(|flow| *flow).ok()
    }
}

impl fmt::Display for FlowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "flow-{}", self.0)
    }
}

/// Registry key for one execution context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContextKey {
    Thread(ThreadId),
    /// A tokio task running outside any flow scope.
    Task(tokio::task::Id),
    Flow(FlowId),
}

impl fmt::Display for ContextKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContextKey::Thread(id) => write!(f, "{id:?}"),
            ContextKey::Task(id) => write!(f, "task-{id}"),
            ContextKey::Flow(id) => write!(f, "{id}"),
        }
    }
}

/// Run `future` inside a new flow.
pub async fn scope<F: Future>(future: F) -> F::Output {
    FLOW.scope(FlowId::next(), future).await
}

/// Run `f` inside a new flow, synchronously.
pub fn sync_scope<R>(f: impl FnOnce() -> R) -> R {
    FLOW.sync_scope(FlowId::next(), f)
}

/// Spawn a tokio task that continues the caller's flow.
///
/// Plain `tokio::spawn` starts the task outside any flow, so it gets a
/// context of its own; use this when a spawned task should record calls
/// against the spawning flow's sequence.
pub fn spawn_in_flow<F>(future: F) -> tokio::task::JoinHandle<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    match FlowId::current() {
        Some(flow) => tokio::spawn(FLOW.scope(flow, future)),
        None => tokio::spawn(future),
    }
}
