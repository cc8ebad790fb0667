//! End-to-end evaluator scenarios: literals, arithmetic, assignment,
//! infix order, and the reduce/compose laws.

mod common;

use common::{eval, eval_err, molded};
use pretty_assertions::assert_eq;
use viro::Datum;

// =============================================================================
// 1. Literals and truthiness
// =============================================================================

/// A block of literals evaluates to its last element unchanged.
#[test]
fn literals_evaluate_to_themselves() {
    assert_eq!(eval("42"), Datum::Integer(42));
    assert_eq!(eval("\"hello\""), Datum::String("hello".into()));
    assert_eq!(eval("1 2 3"), Datum::Integer(3));
    assert_eq!(eval("[1 2 3]"), Datum::Block(vec![Datum::Integer(1), Datum::Integer(2), Datum::Integer(3)]));
}

/// An empty program evaluates to none.
#[test]
fn empty_program_is_none() {
    assert_eq!(eval(""), Datum::None);
}

/// Only none and false are falsy: zero, empty strings, and empty blocks
/// all pick the true branch.
#[test]
fn truthiness() {
    assert_eq!(eval("either 0 [\"t\"] [\"f\"]"), Datum::String("t".into()));
    assert_eq!(eval("either \"\" [\"t\"] [\"f\"]"), Datum::String("t".into()));
    assert_eq!(eval("either [] [\"t\"] [\"f\"]"), Datum::String("t".into()));
    assert_eq!(eval("either none [\"t\"] [\"f\"]"), Datum::String("f".into()));
    assert_eq!(eval("either false [\"t\"] [\"f\"]"), Datum::String("f".into()));
}

// =============================================================================
// 2. Arithmetic and comparison
// =============================================================================

/// Strict left-to-right evaluation with no precedence: 3 + 4 * 2 is 14.
#[test]
fn arithmetic_is_left_to_right() {
    assert_eq!(eval("3 + 4 * 2"), Datum::Integer(14));
    assert_eq!(eval("10 - 2 - 3"), Datum::Integer(5));
    assert_eq!(eval("2 * 3 + 4"), Datum::Integer(10));
}

/// Parens group subexpressions and are auto-evaluated.
#[test]
fn parens_group() {
    assert_eq!(eval("3 + (4 * 2)"), Datum::Integer(11));
    assert_eq!(eval("(2)"), Datum::Integer(2));
}

/// Decimal promotion: equality across integer and decimal is numeric.
#[test]
fn decimal_promotion_equality() {
    assert_eq!(eval("1 = 1.0"), Datum::Logic(true));
    assert_eq!(eval("1 = 1.5"), Datum::Logic(false));
    assert_eq!(eval("1.5 + 1"), eval("2.5"));
    assert_eq!(eval("1 < 1.5"), Datum::Logic(true));
}

/// Integer division stays integral when exact and promotes otherwise.
#[test]
fn division() {
    assert_eq!(eval("6 / 2"), Datum::Integer(3));
    assert_eq!(molded("7 / 2"), "3.5");
    let err = eval_err("1 / 0");
    assert_eq!(err.category, "Math");
    assert_eq!(err.id, "div-by-zero");
}

/// Integer overflow is detected, not wrapped.
#[test]
fn overflow_detected() {
    let err = eval_err("9223372036854775807 + 1");
    assert_eq!(err.category, "Math");
    assert_eq!(err.id, "overflow");
}

/// Arithmetic on non-numbers reports the operator in the error id.
#[test]
fn math_type_error_names_operator() {
    let err = eval_err("1 + \"x\"");
    assert_eq!(err.category, "Math");
    assert_eq!(err.id, "+-type-error");
}

/// Ordering across unrelated kinds is not comparable.
#[test]
fn not_comparable() {
    let err = eval_err("1 < \"x\"");
    assert_eq!(err.id, "not-comparable");
}

// =============================================================================
// 3. Assignment and lookup
// =============================================================================

/// Set-words bind; words resolve through the frame chain.
#[test]
fn assignment_and_lookup() {
    assert_eq!(eval("x: 10 y: x + 5 y"), Datum::Integer(15));
}

/// `get` reads a binding through an evaluated word argument.
#[test]
fn get_reads_bindings() {
    assert_eq!(eval("x: 10 y: x + 5 get 'x"), Datum::Integer(10));
}

/// `set` updates the binding where the word is bound.
#[test]
fn set_writes_bindings() {
    assert_eq!(eval("x: 1 set 'x 10 x"), Datum::Integer(10));
}

/// Chained set-words assign the same value to each word.
#[test]
fn chained_set_words() {
    assert_eq!(eval("a: b: 7 a + b"), Datum::Integer(14));
}

/// A get-word returns a function value without invoking it.
#[test]
fn get_word_does_not_invoke() {
    assert_eq!(eval("f: fn [] [99] type-of :f"), Datum::Datatype("function!".into()));
    assert_eq!(eval("f: fn [] [99] f"), Datum::Integer(99));
}

/// A lit-word evaluates to the plain word.
#[test]
fn lit_word_evaluates_to_word() {
    assert_eq!(eval("'alpha"), Datum::Word("alpha".into()));
}

/// Unknown words and trailing set-words are script errors with positions.
#[test]
fn resolution_errors() {
    let err = eval_err("flibber");
    assert_eq!(err.id, "no-value");
    assert_eq!(err.args[0], "flibber");
    assert_eq!(err.position.map(|loc| loc.line), Some(1));

    let err = eval_err("x:");
    assert_eq!(err.id, "invalid-syntax");
}

// =============================================================================
// 4. Reduce and compose
// =============================================================================

/// reduce evaluates each expression; the result has one element per
/// expression.
#[test]
fn reduce_evaluates_expressions() {
    assert_eq!(
        eval("a: 2 reduce [a + 1 a * 2]"),
        Datum::Block(vec![Datum::Integer(3), Datum::Integer(4)])
    );
}

/// compose replaces parens with their values and preserves the rest.
#[test]
fn compose_replaces_parens() {
    assert_eq!(
        eval("a: 2 compose [a + 1 (a * 2)]"),
        Datum::Block(vec![
            Datum::Word("a".into()),
            Datum::Word("+".into()),
            Datum::Integer(1),
            Datum::Integer(4),
        ])
    );
}

/// compose does not descend into nested blocks.
#[test]
fn compose_is_shallow() {
    assert_eq!(
        eval("compose [[(1 + 1)] (1 + 1)]"),
        Datum::Block(vec![
            Datum::Block(vec![Datum::Paren(vec![
                Datum::Integer(1),
                Datum::Word("+".into()),
                Datum::Integer(1),
            ])]),
            Datum::Integer(2),
        ])
    );
}

/// `do` evaluates blocks and source strings.
#[test]
fn do_blocks_and_strings() {
    assert_eq!(eval("do [1 + 2]"), Datum::Integer(3));
    assert_eq!(eval("do \"1 + 2\""), Datum::Integer(3));
}

/// all/any evaluate left to right with short-circuit behavior.
#[test]
fn all_and_any() {
    assert_eq!(eval("all [1 2 3]"), Datum::Integer(3));
    assert_eq!(eval("all [1 none 3]"), Datum::None);
    assert_eq!(eval("any [none false 7]"), Datum::Integer(7));
    assert_eq!(eval("any [none false]"), Datum::None);
}

// =============================================================================
// 5. Display forms
// =============================================================================

/// form is human-readable, mold round-trippable.
#[test]
fn form_and_mold() {
    assert_eq!(eval("form \"hi\""), Datum::String("hi".into()));
    assert_eq!(eval("mold \"hi\""), Datum::String("\"hi\"".into()));
    assert_eq!(eval("form [1 \"a\"]"), Datum::String("1 a".into()));
    assert_eq!(eval("mold [1 \"a\"]"), Datum::String("[1 \"a\"]".into()));
}

/// form is idempotent: forming formed text changes nothing.
#[test]
fn form_is_idempotent() {
    assert_eq!(eval("form form [1 \"a\" 2.5]"), eval("form [1 \"a\" 2.5]"));
}

/// join concatenates formed values into a string.
#[test]
fn join_concatenates() {
    assert_eq!(eval("join \"a\" \"!\""), Datum::String("a!".into()));
    assert_eq!(eval("join \"n=\" 42"), Datum::String("n=42".into()));
}

/// type-of reports datatypes, including the native/function split.
#[test]
fn type_of() {
    assert_eq!(eval("type-of 1"), Datum::Datatype("integer!".into()));
    assert_eq!(eval("type-of 1.5"), Datum::Datatype("decimal!".into()));
    assert_eq!(eval("type-of \"s\""), Datum::Datatype("string!".into()));
    assert_eq!(eval("type-of [1]"), Datum::Datatype("block!".into()));
    assert_eq!(eval("type-of none"), Datum::Datatype("none!".into()));
    assert_eq!(eval("type-of object []"), Datum::Datatype("object!".into()));
    assert_eq!(eval("type-of :append"), Datum::Datatype("native!".into()));
    assert_eq!(eval("type-of :type-of"), Datum::Datatype("native!".into()));
    assert_eq!(eval("type-of fn [] []"), Datum::Datatype("function!".into()));
}
