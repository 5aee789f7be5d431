//! End-to-end ordering behavior of sequences.
//!
//! Verifies:
//! - In-order calls succeed, out-of-order calls fail at the first violation
//! - Loop pass bounds are enforced both while recording and at close
//! - One sequence per context, and the slot is freed on every exit path
//! - An invocation error suppresses the close-time completeness error

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

use assert_matches::assert_matches;
use std::sync::Arc;
use telltale_sequence::{
    ContextMode, ContextRegistry, Range, Sequence, SequenceError, SetupHandle, Times,
    END_OF_SEQUENCE,
};

fn registry() -> Arc<ContextRegistry> {
    Arc::new(ContextRegistry::new(ContextMode::Thread))
}

fn setups(names: &[&str]) -> Vec<SetupHandle> {
    names.iter().map(|n| SetupHandle::new(*n)).collect()
}

// ============================================================================
// Plain steps
// ============================================================================

#[test]
fn test_steps_in_declared_order_succeed() {
    let registry = registry();
    let s = setups(&["s1", "s2", "s3", "s4"]);
    let seq = Sequence::create_in(&registry).unwrap();
    for h in &s {
        seq.create_step(h, Times::once()).unwrap();
    }
    for h in &s {
        seq.record_call(h).unwrap();
    }
    seq.close().unwrap();
}

#[test]
fn test_swapped_steps_fail_at_first_out_of_order_call() {
    let registry = registry();
    let s = setups(&["s1", "s2", "s3"]);
    let seq = Sequence::create_in(&registry).unwrap();
    for h in &s {
        seq.create_step(h, Times::once()).unwrap();
    }

    seq.record_call(&s[0]).unwrap();
    let err = seq.record_call(&s[2]).unwrap_err();
    assert_matches!(err, SequenceError::OutOfSequence { ref setup, .. } if setup == "s3");
    assert!(err.to_string().contains("s2"));
    seq.close().unwrap();
}

#[test]
fn test_at_most_once_step_may_be_skipped() {
    let registry = registry();
    let s = setups(&["open", "flush", "close"]);
    let seq = Sequence::create_in(&registry).unwrap();
    seq.create_step(&s[0], Times::once()).unwrap();
    seq.create_step(&s[1], Times::at_most_once()).unwrap();
    seq.create_step(&s[2], Times::once()).unwrap();

    seq.record_call(&s[0]).unwrap();
    seq.record_call(&s[2]).unwrap();
    seq.close().unwrap();
}

#[test]
fn test_at_most_once_step_never_called_closes_cleanly() {
    let registry = registry();
    let a = SetupHandle::new("a");
    let seq = Sequence::create_in(&registry).unwrap();
    seq.create_step(&a, Times::at_most_once()).unwrap();
    seq.close().unwrap();
}

#[test]
fn test_exactly_once_step_never_called_fails_at_close() {
    let registry = registry();
    let a = SetupHandle::new("a");
    let seq = Sequence::create_in(&registry).unwrap();
    seq.create_step(&a, Times::once()).unwrap();

    let err = seq.close().unwrap_err();
    assert_matches!(err, SequenceError::Incomplete { ref context, .. } if context == END_OF_SEQUENCE);
    assert_eq!(
        err.to_string(),
        "At end of sequence: sequence is incomplete: a (#0) expected exactly once, called 0 times"
    );
}

#[test]
fn test_step_called_too_often_is_rejected() {
    let registry = registry();
    let a = SetupHandle::new("a");
    let seq = Sequence::create_in(&registry).unwrap();
    seq.create_step(&a, Times::exactly(2)).unwrap();

    seq.record_call(&a).unwrap();
    seq.record_call(&a).unwrap();
    assert_matches!(
        seq.record_call(&a),
        Err(SequenceError::CountExceeded { .. })
    );
    seq.close().unwrap();
}

#[test]
fn test_unregistered_call_site_is_rejected() {
    let registry = registry();
    let (a, stray) = (SetupHandle::new("a"), SetupHandle::new("stray"));
    let seq = Sequence::create_in(&registry).unwrap();
    seq.create_step(&a, Times::at_most_once()).unwrap();

    assert_matches!(
        seq.record_call(&stray),
        Err(SequenceError::OutOfSequence { .. })
    );
    seq.close().unwrap();
}

// ============================================================================
// Loops
// ============================================================================

fn two_pass_loop(registry: &Arc<ContextRegistry>) -> (Sequence, SetupHandle, SetupHandle) {
    let (a, b) = (SetupHandle::new("a"), SetupHandle::new("b"));
    let seq = Sequence::create_in(registry).unwrap();
    let lp = seq
        .create_loop(Times::between(2, 2, Range::Inclusive).unwrap())
        .unwrap();
    lp.create_step(&a, Times::once()).unwrap();
    lp.create_step(&b, Times::once()).unwrap();
    (seq, a, b)
}

#[test]
fn test_loop_with_exact_passes_closes_cleanly() {
    let registry = registry();
    let (seq, a, b) = two_pass_loop(&registry);
    for h in [&a, &b, &a, &b] {
        seq.record_call(h).unwrap();
    }
    seq.close().unwrap();
}

#[test]
fn test_loop_short_of_required_passes_fails_at_close() {
    let registry = registry();
    let (seq, a, b) = two_pass_loop(&registry);
    for h in [&a, &b, &a] {
        seq.record_call(h).unwrap();
    }
    assert_matches!(seq.close(), Err(SequenceError::Incomplete { .. }));
}

#[test]
fn test_loop_past_max_passes_fails_on_next_pass() {
    let registry = registry();
    let (seq, a, b) = two_pass_loop(&registry);
    for h in [&a, &b, &a, &b] {
        seq.record_call(h).unwrap();
    }
    assert_matches!(
        seq.record_call(&a),
        Err(SequenceError::OutOfSequence { .. })
    );
    // The invocation error stands alone; close adds nothing.
    seq.close().unwrap();
}

#[test]
fn test_default_loop_runs_any_number_of_times() {
    let registry = registry();
    let (open, write, close) = (
        SetupHandle::new("open"),
        SetupHandle::new("write"),
        SetupHandle::new("close"),
    );
    let seq = Sequence::create_in(&registry).unwrap();
    seq.create_step(&open, Times::once()).unwrap();
    seq.create_loop_any()
        .unwrap()
        .create_step(&write, Times::once())
        .unwrap();
    seq.create_step(&close, Times::once()).unwrap();

    seq.record_call(&open).unwrap();
    for _ in 0..10 {
        seq.record_call(&write).unwrap();
    }
    seq.record_call(&close).unwrap();
    seq.close().unwrap();
}

#[test]
fn test_nested_loops_repeat_inside_outer_passes() {
    let registry = registry();
    let (begin, item, end) = (
        SetupHandle::new("begin"),
        SetupHandle::new("item"),
        SetupHandle::new("end"),
    );
    let seq = Sequence::create_in(&registry).unwrap();
    let batch = seq.create_loop(Times::at_least_once()).unwrap();
    batch.create_step(&begin, Times::once()).unwrap();
    batch
        .create_loop(Times::between(1, 3, Range::Inclusive).unwrap())
        .unwrap()
        .create_step(&item, Times::once())
        .unwrap();
    batch.create_step(&end, Times::once()).unwrap();

    for h in [&begin, &item, &item, &end, &begin, &item, &end] {
        seq.record_call(h).unwrap();
    }
    seq.close().unwrap();
}

#[test]
fn test_nested_loop_over_max_is_rejected() {
    let registry = registry();
    let (begin, item, end) = (
        SetupHandle::new("begin"),
        SetupHandle::new("item"),
        SetupHandle::new("end"),
    );
    let seq = Sequence::create_in(&registry).unwrap();
    seq.create_step(&begin, Times::once()).unwrap();
    seq.create_loop(Times::at_most(2))
        .unwrap()
        .create_step(&item, Times::once())
        .unwrap();
    seq.create_step(&end, Times::once()).unwrap();

    seq.record_call(&begin).unwrap();
    seq.record_call(&item).unwrap();
    seq.record_call(&item).unwrap();
    assert!(seq.record_call(&item).is_err());
    assert!(seq.has_failed());
    seq.close().unwrap();
}

#[test]
fn test_required_loop_never_entered_fails_at_close() {
    let registry = registry();
    let a = SetupHandle::new("a");
    let seq = Sequence::create_in(&registry).unwrap();
    seq.create_loop(Times::at_least_once())
        .unwrap()
        .create_step(&a, Times::once())
        .unwrap();

    let err = seq.close().unwrap_err();
    assert!(err.to_string().contains("loop #1 expected to run at least once"));
}

// ============================================================================
// Scope lifecycle
// ============================================================================

#[test]
fn test_second_sequence_in_same_context_is_rejected() {
    let first = Sequence::create().unwrap();
    assert_matches!(Sequence::create(), Err(SequenceError::DuplicateSequence));
    first.close().unwrap();
    Sequence::create().unwrap().close().unwrap();
}

#[test]
fn test_failed_sequence_does_not_block_the_next_one() {
    let a = SetupHandle::new("a");
    let seq = Sequence::create().unwrap();
    seq.create_step(&a, Times::once()).unwrap();
    assert!(seq.close().is_err());

    let next = Sequence::create().unwrap();
    next.close().unwrap();
}

#[test]
fn test_out_of_order_error_is_not_followed_by_incomplete_error() {
    let registry = registry();
    let (a, b) = (SetupHandle::new("a"), SetupHandle::new("b"));
    let seq = Sequence::create_in(&registry).unwrap();
    seq.create_step(&a, Times::once()).unwrap();
    seq.create_step(&b, Times::once()).unwrap();

    assert_matches!(
        seq.record_call(&b),
        Err(SequenceError::OutOfSequence { .. })
    );
    seq.close().unwrap();
    assert!(!registry.has_active());
}

#[test]
fn test_ensure_complete_is_repeatable() {
    let registry = registry();
    let a = SetupHandle::new("a");
    let seq = Sequence::create_in(&registry).unwrap();
    seq.create_step(&a, Times::once()).unwrap();
    seq.record_call(&a).unwrap();

    seq.ensure_complete(END_OF_SEQUENCE).unwrap();
    seq.ensure_complete(END_OF_SEQUENCE).unwrap();
    seq.close().unwrap();
}

#[test]
fn test_panic_inside_scope_still_releases_context() {
    let registry = registry();
    let inner = Arc::clone(&registry);
    let result = std::panic::catch_unwind(move || {
        let seq = Sequence::create_in(&inner).unwrap();
        seq.create_step(&SetupHandle::new("a"), Times::once()).unwrap();
        panic!("test body failed");
    });
    assert!(result.is_err());
    assert!(!registry.has_active());
    Sequence::create_in(&registry).unwrap().close().unwrap();
}
