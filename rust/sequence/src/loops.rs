//! Ordered, repeatable groups of expectations and the matching algorithm.
//!
//! A [`Loop`] holds an ordered list of children, each either a [`Step`] or a
//! nested [`Loop`], plus a [`Times`] bound on how many passes it may make.
//!
//! # Matching
//!
//! Each loop level keeps a `(passes, cursor)` pair. A recorded call is first
//! *planned* against an immutable view of the tree and only then *applied*,
//! so a rejected call never leaves partial state behind.
//!
//! Within a pass the scan starts at the cursor:
//!
//! 1. The child accepts if it is a step for the called setup with quota
//!    left, or a nested loop that accepts recursively.
//! 2. A child that does not accept may be passed over only if its minimum is
//!    already met. Passed children are closed for the rest of the pass.
//! 3. If the scan runs off the end, the loop may start a new pass when
//!    `passes < max`: every child resets and the scan restarts at index 0.
//!
//! A nested loop that was never entered behaves as if its previous pass just
//! ended, so entering it is the same as starting a new pass.
//!
//! ```text
//!   root (passes=1, at most once)
//!   ├── open            [exactly once]
//!   ├── loop #1         [between 1 and 3 passes]
//!   │   └── write       [exactly once]
//!   └── close           [exactly once]
//! ```

use crate::error::{Result, SequenceError};
use crate::handle::{LoopId, SetupHandle, StepId};
use crate::step::Step;
use crate::times::Times;
use crate::tracing::trace_pass;

/// A child of a loop.
#[derive(Debug, Clone)]
pub enum Node {
    Step(Step),
    Loop(Loop),
}

impl Node {
    fn is_satisfied_when(&self, fresh: bool) -> bool {
        match self {
            Node::Step(step) => step.is_satisfied_when(fresh),
            Node::Loop(inner) => inner.is_satisfied_when(fresh),
        }
    }

    fn reset(&mut self) {
        match self {
            Node::Step(step) => step.reset(),
            Node::Loop(inner) => inner.reset(),
        }
    }
}

/// Where an accepted call lands, one entry per loop level.
#[derive(Debug)]
struct Plan {
    new_pass: bool,
    index: usize,
    inner: Option<Box<Plan>>,
}

enum Scan {
    Hit { index: usize, inner: Option<Box<Plan>> },
    Blocked,
    Exhausted,
}

/// An ordered container of steps and nested loops with a pass-count bound.
#[derive(Debug, Clone)]
pub struct Loop {
    id: LoopId,
    expected: Times,
    children: Vec<Node>,
    passes: u32,
    cursor: usize,
}

impl Loop {
    pub(crate) fn new(id: LoopId, expected: Times) -> Self {
        Self {
            id,
            expected,
            children: Vec::new(),
            passes: 0,
            cursor: 0,
        }
    }

    /// The root loop of a sequence: at most one pass, already entered.
    pub(crate) fn root() -> Self {
        Self {
            passes: 1,
            ..Self::new(LoopId::ROOT, Times::at_most_once())
        }
    }

    #[must_use]
    pub fn id(&self) -> LoopId {
        self.id
    }

    #[must_use]
    pub fn expected(&self) -> Times {
        self.expected
    }

    /// Passes started so far, including the current one.
    #[must_use]
    pub fn passes(&self) -> u32 {
        self.passes
    }

    /// Index of the child the current pass is positioned at.
    #[must_use]
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    #[must_use]
    pub fn children(&self) -> &[Node] {
        &self.children
    }

    pub(crate) fn push_step(&mut self, step: Step) {
        self.children.push(Node::Step(step));
    }

    pub(crate) fn push_loop(&mut self, inner: Loop) {
        self.children.push(Node::Loop(inner));
    }

    /// Find a loop by id in this subtree.
    pub(crate) fn find_loop_mut(&mut self, id: LoopId) -> Option<&mut Loop> {
        if self.id == id {
            return Some(self);
        }
        for child in &mut self.children {
            if let Node::Loop(inner) = child {
                if let Some(found) = inner.find_loop_mut(id) {
                    return Some(found);
                }
            }
        }
        None
    }

    /// Find a step by id in this subtree.
    #[must_use]
    pub fn find_step(&self, id: StepId) -> Option<&Step> {
        self.children.iter().find_map(|child| match child {
            Node::Step(step) if step.id() == id => Some(step),
            Node::Step(_) => None,
            Node::Loop(inner) => inner.find_step(id),
        })
    }

    /// Match a call against the current position and advance on success.
    ///
    /// # Errors
    ///
    /// Returns [`SequenceError::CountExceeded`] when the step at the current
    /// position was called past its maximum and nothing later can take the
    /// call, and [`SequenceError::OutOfSequence`] for any other mismatch.
    /// The tree is unchanged on error.
    pub fn record_call(&mut self, setup: &SetupHandle) -> Result<StepId> {
        match self.plan(setup, false) {
            Some(plan) => self.apply(plan),
            None => Err(self.rejection(setup)),
        }
    }

    fn rejection(&self, setup: &SetupHandle) -> SequenceError {
        if let Some(step) = self.current_step() {
            if step.setup() == setup && step.is_exhausted() {
                return SequenceError::CountExceeded {
                    setup: setup.to_string(),
                    expected: step.describe(),
                };
            }
        }
        SequenceError::OutOfSequence {
            setup: setup.to_string(),
            expected: self
                .first_unmet()
                .unwrap_or_else(|| "no further calls expected".to_string()),
        }
    }

    /// The step the deepest cursor currently rests on, if any.
    fn current_step(&self) -> Option<&Step> {
        if self.passes == 0 {
            return None;
        }
        match self.children.get(self.cursor)? {
            Node::Step(step) => Some(step),
            Node::Loop(inner) => inner.current_step(),
        }
    }

    fn plan(&self, setup: &SetupHandle, fresh: bool) -> Option<Plan> {
        let (passes, cursor) = if fresh {
            (0, 0)
        } else {
            (self.passes, self.cursor)
        };

        if passes > 0 {
            match self.scan(setup, cursor, fresh) {
                Scan::Hit { index, inner } => {
                    return Some(Plan {
                        new_pass: false,
                        index,
                        inner,
                    });
                }
                Scan::Blocked => return None,
                Scan::Exhausted => {}
            }
        }

        if !self.expected.allows_more_than(passes) {
            return None;
        }
        match self.scan(setup, 0, true) {
            Scan::Hit { index, inner } => Some(Plan {
                new_pass: true,
                index,
                inner,
            }),
            Scan::Blocked | Scan::Exhausted => None,
        }
    }

    fn scan(&self, setup: &SetupHandle, from: usize, fresh: bool) -> Scan {
        for (index, child) in self.children.iter().enumerate().skip(from) {
            match child {
                Node::Step(step) if step.accepts(setup, fresh) => {
                    return Scan::Hit { index, inner: None };
                }
                Node::Loop(inner) => {
                    if let Some(plan) = inner.plan(setup, fresh) {
                        return Scan::Hit {
                            index,
                            inner: Some(Box::new(plan)),
                        };
                    }
                }
                Node::Step(_) => {}
            }
            if !child.is_satisfied_when(fresh) {
                return Scan::Blocked;
            }
        }
        Scan::Exhausted
    }

    fn apply(&mut self, plan: Plan) -> Result<StepId> {
        if plan.new_pass {
            self.start_pass();
        }
        self.cursor = plan.index;
        match (&mut self.children[plan.index], plan.inner) {
            (Node::Step(step), None) => {
                step.record()?;
                Ok(step.id())
            }
            (Node::Loop(inner), Some(inner_plan)) => inner.apply(*inner_plan),
            _ => unreachable!("plan was computed against this tree"),
        }
    }

    fn start_pass(&mut self) {
        for child in &mut self.children {
            child.reset();
        }
        self.passes += 1;
        self.cursor = 0;
        trace_pass(self.id, self.passes, self.expected);
    }

    fn reset(&mut self) {
        for child in &mut self.children {
            child.reset();
        }
        self.passes = 0;
        self.cursor = 0;
    }

    fn is_satisfied_when(&self, fresh: bool) -> bool {
        if fresh || self.passes == 0 {
            return self.expected.min() == 0;
        }
        self.passes >= self.expected.min()
            && self
                .children
                .iter()
                .all(|child| child.is_satisfied_when(false))
    }

    /// Whether every expectation in this subtree is within its bounds.
    #[must_use]
    pub fn is_satisfied(&self) -> bool {
        self.is_satisfied_when(false)
    }

    /// Describe the first expectation in this subtree whose minimum is unmet.
    fn first_unmet(&self) -> Option<String> {
        if self.passes == 0 {
            return (self.expected.min() > 0).then(|| self.describe());
        }
        for child in &self.children {
            let unmet = match child {
                Node::Step(step) => (!step.is_satisfied()).then(|| step.describe()),
                Node::Loop(inner) => inner.first_unmet(),
            };
            if unmet.is_some() {
                return unmet;
            }
        }
        (self.passes < self.expected.min()).then(|| self.describe())
    }

    fn describe(&self) -> String {
        format!(
            "loop {} expected to run {}, ran {} {}",
            self.id,
            self.expected,
            self.passes,
            if self.passes == 1 { "time" } else { "times" }
        )
    }

    /// Check that every minimum in this subtree has been met.
    ///
    /// Never mutates, so repeated checks give the same answer.
    ///
    /// # Errors
    ///
    /// Returns [`SequenceError::Incomplete`] naming `context` and the first
    /// unmet expectation.
    pub fn ensure_complete(&self, context: &str) -> Result<()> {
        match self.first_unmet() {
            None => Ok(()),
            Some(unmet) => Err(SequenceError::Incomplete {
                context: context.to_string(),
                unmet,
            }),
        }
    }
}
