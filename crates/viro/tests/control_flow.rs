//! Loop semantics and the non-local exit protocol.

mod common;

use common::{eval, eval_err};
use pretty_assertions::assert_eq;
use viro::Datum;

// =============================================================================
// 1. loop
// =============================================================================

/// loop N runs the body exactly N times; loop 0 never runs it.
#[test]
fn loop_counts() {
    assert_eq!(eval("r: 0 loop 3 [r: r + 1] r"), Datum::Integer(3));
    assert_eq!(eval("r: 0 loop 0 [r: r + 1] r"), Datum::Integer(0));
    assert_eq!(eval("r: 0 loop -2 [r: r + 1] r"), Datum::Integer(0));
}

/// loop yields the last body value on normal completion.
#[test]
fn loop_yields_last_value() {
    assert_eq!(eval("loop 3 [7]"), Datum::Integer(7));
    assert_eq!(eval("loop 0 [7]"), Datum::None);
}

// =============================================================================
// 2. break / continue
// =============================================================================

/// break exits the loop, which yields none.
#[test]
fn break_exits_loop() {
    assert_eq!(eval("r: 0 loop 5 [r: r + 1 if r = 2 [break]] r"), Datum::Integer(2));
    assert_eq!(eval("loop 5 [break]"), Datum::None);
}

/// continue skips the rest of the body.
#[test]
fn continue_skips_body() {
    let source = "r: 0 n: 0\n\
                  loop 5 [n: n + 1 if n = 3 [continue] r: r + 1]\n\
                  r";
    assert_eq!(eval(source), Datum::Integer(4));
}

/// break --levels 2 unwinds both loops: no further iterations of either,
/// and the outer loop returns none.
#[test]
fn break_levels_two() {
    let source = "result: 0\n\
                  loop 3 [loop 3 [result: result + 1 break --levels 2]]\n\
                  result";
    assert_eq!(eval(source), Datum::Integer(1));
    assert_eq!(eval("loop 3 [loop 3 [break --levels 2]]"), Datum::None);
}

/// continue --levels 2 restarts the outer loop's next iteration.
#[test]
fn continue_levels_two() {
    let source = "outer: 0 inner: 0\n\
                  loop 3 [outer: outer + 1 loop 3 [inner: inner + 1 continue --levels 2]]\n\
                  reduce [outer inner]";
    assert_eq!(eval(source), Datum::Block(vec![Datum::Integer(3), Datum::Integer(3)]));
}

/// A level count below one is rejected.
#[test]
fn break_levels_must_be_positive() {
    let err = eval_err("loop 1 [break --levels 0]");
    assert_eq!(err.id, "invalid-arg");
}

/// Stray break/continue at the top level are script errors.
#[test]
fn stray_signals_are_errors() {
    assert_eq!(eval_err("break").id, "break");
    assert_eq!(eval_err("continue").id, "continue");
}

// =============================================================================
// 3. while
// =============================================================================

/// while runs for as long as the condition block is truthy.
#[test]
fn while_loops() {
    assert_eq!(eval("i: 0 while [i < 5] [i: i + 1] i"), Datum::Integer(5));
    assert_eq!(eval("while [false] [1]"), Datum::None);
}

/// break works inside while.
#[test]
fn while_break() {
    assert_eq!(eval("i: 0 while [true] [i: i + 1 if i = 4 [break]] i"), Datum::Integer(4));
}

// =============================================================================
// 4. foreach
// =============================================================================

/// foreach binds the loop word to each element in order.
#[test]
fn foreach_blocks() {
    assert_eq!(eval("total: 0 foreach x [1 2 3] [total: total + x] total"), Datum::Integer(6));
    assert_eq!(
        eval("out: [] foreach x [3 1 2] [insert out x] out"),
        Datum::Block(vec![Datum::Integer(2), Datum::Integer(1), Datum::Integer(3)])
    );
}

/// foreach over a string yields one-character strings.
#[test]
fn foreach_strings() {
    assert_eq!(eval("s: \"\" foreach c \"abc\" [s: join c s] s"), Datum::String("cba".into()));
}

/// foreach over a binary yields byte integers.
#[test]
fn foreach_binary() {
    assert_eq!(eval("sum: 0 foreach b #{010203} [sum: sum + b] sum"), Datum::Integer(6));
}

/// break and continue follow the loop protocol inside foreach.
#[test]
fn foreach_signals() {
    assert_eq!(eval("total: 0 foreach x [1 2 3 4] [if x = 3 [break] total: total + x] total"), Datum::Integer(3));
    assert_eq!(eval("total: 0 foreach x [1 2 3 4] [if x = 3 [continue] total: total + x] total"), Datum::Integer(7));
}

// =============================================================================
// 5. try
// =============================================================================

/// try turns a raised error into an error value.
#[test]
fn try_catches_script_errors() {
    assert_eq!(eval("e: try [1 / 0] type-of e"), Datum::Datatype("error!".into()));
    let Datum::Error { category, id, .. } = eval("try [1 / 0]") else {
        panic!("try should return an error value");
    };
    assert_eq!(category, "Math");
    assert_eq!(id, "div-by-zero");
}

/// try passes successful values through.
#[test]
fn try_passes_values() {
    assert_eq!(eval("try [1 + 2]"), Datum::Integer(3));
}

/// try never consumes control-flow signals.
#[test]
fn try_does_not_catch_signals() {
    assert_eq!(
        eval("f: fn [] [try [return 9] 0] f"),
        Datum::Integer(9),
        "return must pass through try to the function boundary"
    );
    assert_eq!(eval("r: 0 loop 3 [r: r + 1 try [break]] r"), Datum::Integer(1));
}

// =============================================================================
// 6. Cancellation
// =============================================================================

/// The embedder cancellation hook stops loops with Access/cancelled.
#[test]
fn cancellation_hook() {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use viro::{Interpreter, InterpreterOptions, NoPrint};

    static POLLS: AtomicUsize = AtomicUsize::new(0);
    let mut vm = Interpreter::with_options(InterpreterOptions {
        cancel_hook: Some(Box::new(|| POLLS.fetch_add(1, Ordering::Relaxed) >= 3)),
        ..InterpreterOptions::default()
    });
    let mut out = NoPrint;
    let err = vm
        .run_with_writer("loop 1000000 [1]", &mut out)
        .expect_err("the hook must cancel the loop");
    assert_eq!(err.category, "Access");
    assert_eq!(err.id, "cancelled");
}
