//! Ordered call verification for test doubles
//!
//! This crate checks that registered call-sites run in a declared order,
//! optionally grouped into loops that must repeat a bounded number of times.
//! It sits underneath a mocking layer: the mock owns argument matching and
//! return values, and reports each call-site execution here.
//!
//! ## Features
//!
//! - Strict forward-only matching: no call may skip an unmet minimum
//! - Nested loops with their own pass bounds
//! - One active sequence per thread, or per async flow across `.await`
//! - Completeness check at close, suppressed after an invocation error
//! - Tracing instrumentation for every declaration and call
//!
//! ## Example
//!
//! ```
//! use telltale_sequence::{Sequence, SequenceError, SetupHandle, Times};
//!
//! let open = SetupHandle::new("Conn::open");
//! let send = SetupHandle::new("Conn::send");
//! let close = SetupHandle::new("Conn::close");
//!
//! let seq = Sequence::create()?;
//! seq.create_step(&open, Times::once())?;
//! seq.create_loop(Times::exactly(2))?
//!     .create_step(&send, Times::once())?;
//! seq.create_step(&close, Times::once())?;
//!
//! seq.record_call(&open)?;
//! seq.record_call(&send)?;
//! assert!(matches!(
//!     seq.record_call(&close),
//!     Err(SequenceError::OutOfSequence { .. })
//! ));
//! // The out-of-order call is the reported failure; close does not add
//! // a second "incomplete" error.
//! seq.close()?;
//! # Ok::<(), SequenceError>(())
//! ```
//!
//! ## Context Modes
//!
//! ```text
//! Thread     key = std::thread::ThreadId
//! FlowAware  key = FlowId from context::scope(..), else tokio task Id,
//!            else ThreadId
//! ```

#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod config;
pub mod context;
mod error;
mod handle;
pub mod loops;
pub mod registry;
mod sequence;
mod step;
mod times;
pub mod tracing;

pub use config::SequenceConfig;
pub use context::{ContextKey, ContextMode, FlowId};
pub use error::{Result, SequenceError};
pub use handle::{LoopId, SetupHandle, StepId};
pub use loops::{Loop, Node};
pub use registry::{context_mode, set_context_mode, ContextRegistry};
pub use sequence::{LoopHandle, Sequence, END_OF_SEQUENCE};
pub use step::Step;
pub use times::{Range, Times};
