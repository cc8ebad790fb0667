//! Function definition and invocation: parameters, refinements, closure
//! capture, and the invocation error surface.

mod common;

use common::{eval, eval_err, eval_with_output};
use pretty_assertions::assert_eq;
use viro::Datum;

// =============================================================================
// 1. Definition and calls
// =============================================================================

/// A function with positional parameters applies them in order.
#[test]
fn positional_parameters() {
    assert_eq!(eval("sub: fn [a b] [a - b] sub 10 4"), Datum::Integer(6));
}

/// Arguments evaluate left to right, exactly once each.
#[test]
fn arguments_evaluate_left_to_right_once() {
    let (result, output) = eval_with_output(
        "pair: fn [a b] [join a b]\n\
         pair (print \"first\" \"x\") (print \"second\" \"y\")",
    );
    assert_eq!(result, Datum::String("xy".into()));
    assert_eq!(output, "first\nsecond\n");
}

/// A zero-argument function runs when its word is evaluated.
#[test]
fn zero_argument_function() {
    assert_eq!(eval("f: fn [] [41 + 1] f"), Datum::Integer(42));
}

/// Function results feed infix folding like any other value.
#[test]
fn function_result_folds_infix() {
    assert_eq!(eval("f: fn [] [40] f + 2"), Datum::Integer(42));
}

// =============================================================================
// 2. Refinements
// =============================================================================

/// Boolean refinements read as true when mentioned and none otherwise.
#[test]
fn boolean_refinement() {
    let source = "greet: fn [name --shout] [either shout [join name \"!\"] [name]]\n";
    assert_eq!(eval(&format!("{source} greet \"a\"")), Datum::String("a".into()));
    assert_eq!(eval(&format!("{source} greet \"a\" --shout")), Datum::String("a!".into()));
}

/// A value-taking refinement consumes the following expression.
#[test]
fn value_taking_refinement() {
    let source = "scale: fn [n --by [integer!]] [either by [n * by] [n]]\n";
    assert_eq!(eval(&format!("{source} scale 5")), Datum::Integer(5));
    assert_eq!(eval(&format!("{source} scale 5 --by 3")), Datum::Integer(15));
    assert_eq!(eval(&format!("{source} scale 5 --by 1 + 2")), Datum::Integer(15));
}

/// Refinement type hints are enforced at bind time.
#[test]
fn refinement_hint_enforced() {
    let err = eval_err("scale: fn [n --by [integer!]] [n] scale 5 --by \"x\"");
    assert_eq!(err.id, "type-mismatch");
}

// =============================================================================
// 3. Closure capture
// =============================================================================

/// A nested function reads its lexical parent's bindings at every later
/// call, independent of the caller's context.
#[test]
fn lexical_capture() {
    let source = "adder: fn [n] [fn [m] [m + n]]\n\
                  add5: adder 5\n\
                  n: 100\n\
                  add5 3";
    assert_eq!(eval(source), Datum::Integer(8));
}

/// Two closures from the same factory capture distinct frames.
#[test]
fn distinct_captured_frames() {
    let source = "adder: fn [n] [fn [m] [m + n]]\n\
                  add5: adder 5\n\
                  add9: adder 9\n\
                  (add5 1) + (add9 1)";
    assert_eq!(eval(source), Datum::Integer(16));
}

/// Function docs: a leading spec string is accepted and ignored at call
/// time.
#[test]
fn doc_string_in_spec() {
    assert_eq!(eval("f: fn [\"doubles a number\" n] [n * 2] f 21"), Datum::Integer(42));
}

// =============================================================================
// 4. return
// =============================================================================

/// return exits the function immediately with its value.
#[test]
fn return_short_circuits() {
    assert_eq!(eval("f: fn [n] [if n > 0 [return \"pos\"] \"other\"] f 5"), Datum::String("pos".into()));
    assert_eq!(eval("f: fn [n] [if n > 0 [return \"pos\"] \"other\"] f -5"), Datum::String("other".into()));
}

/// return passes through loops to the function boundary.
#[test]
fn return_bypasses_loops() {
    let source = "find-first: fn [limit] [\n\
                      i: 0\n\
                      loop limit [i: i + 1 if i = 3 [return i]]\n\
                      none\n\
                  ]\n\
                  find-first 10";
    assert_eq!(eval(source), Datum::Integer(3));
}

/// A top-level return is a script error, not a crash.
#[test]
fn stray_return_is_an_error() {
    let err = eval_err("return 5");
    assert_eq!(err.category, "Script");
    assert_eq!(err.id, "return");
}

// =============================================================================
// 5. Invocation errors
// =============================================================================

/// Running out of arguments reports arg-count with the function name.
#[test]
fn missing_arguments() {
    let err = eval_err("sub: fn [a b] [a - b] sub 1");
    assert_eq!(err.id, "arg-count");
    assert_eq!(err.args[0], "sub");
}

/// Positional type hints are enforced.
#[test]
fn positional_hint_enforced() {
    let err = eval_err("half: fn [n [integer!]] [n / 2] half \"x\"");
    assert_eq!(err.id, "type-mismatch");
    assert_eq!(err.args[0], "integer!");
}

/// A function body that is not a block is rejected at definition.
#[test]
fn body_must_be_block() {
    let err = eval_err("fn [] 5");
    assert_eq!(err.id, "no-body");
}

/// Recursion is bounded by the configured limit.
#[test]
fn recursion_limit() {
    use viro::{Interpreter, InterpreterOptions, NoPrint};
    let mut vm = Interpreter::with_options(InterpreterOptions {
        recursion_limit: 16,
        ..InterpreterOptions::default()
    });
    let mut out = NoPrint;
    let err = vm
        .run_with_writer("f: fn [] [f] f", &mut out)
        .expect_err("unbounded recursion must be stopped");
    assert_eq!(err.category, "Internal");
    assert!(err.args[0].contains("recursion"), "diagnostic should mention recursion: {err}");
}

/// Recursive functions within the limit work.
#[test]
fn recursion_within_limit() {
    let source = "fact: fn [n] [either n <= 1 [1] [n * fact n - 1]]\n\
                  fact 10";
    assert_eq!(eval(source), Datum::Integer(3_628_800));
}
