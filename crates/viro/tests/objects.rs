//! Object construction, prototype lookup, field access, and reflection.

mod common;

use common::{eval, eval_err};
use pretty_assertions::assert_eq;
use viro::Datum;

// =============================================================================
// 1. Construction
// =============================================================================

/// Fields initialize in declaration order; words-of and values-of
/// correspond pairwise.
#[test]
fn construction_order_and_reflection() {
    assert_eq!(
        eval("o: object [x: 1 y: 2] words-of o"),
        Datum::Block(vec![Datum::Word("x".into()), Datum::Word("y".into())])
    );
    assert_eq!(
        eval("o: object [x: 1 y: 2] values-of o"),
        Datum::Block(vec![Datum::Integer(1), Datum::Integer(2)])
    );
    assert_eq!(eval("o: object [x: 1 y: 2] (length? words-of o) = length? values-of o"), Datum::Logic(true));
}

/// Bare words declare fields pre-seeded to none.
#[test]
fn bare_word_declarations() {
    assert_eq!(
        eval("o: object [pending x: 1] words-of o"),
        Datum::Block(vec![Datum::Word("pending".into()), Datum::Word("x".into())])
    );
    assert_eq!(eval("o: object [pending x: 1] select o 'pending"), Datum::None);
}

/// Later initializers see earlier fields; forward references see none.
#[test]
fn initializer_ordering() {
    assert_eq!(eval("o: object [a: 2 b: a * 3] select o 'b"), Datum::Integer(6));
    assert_eq!(eval("o: object [a: b b: 2] select o 'a"), Datum::None);
}

/// Reserved field names are rejected.
#[test]
fn reserved_fields_rejected() {
    assert_eq!(eval_err("object [parent: 1]").id, "reserved-field");
    assert_eq!(eval_err("object [spec: 1]").id, "reserved-field");
}

/// Duplicate field names are rejected.
#[test]
fn duplicate_fields_rejected() {
    let err = eval_err("object [x: 1 x: 2]");
    assert_eq!(err.id, "object-field-dup");
    assert_eq!(err.args[0], "x");
}

/// `object` is lexically enclosed: initializers see the caller's scope.
#[test]
fn object_sees_enclosing_scope() {
    assert_eq!(eval("n: 7 o: object [x: n + 1] select o 'x"), Datum::Integer(8));
}

/// `context` is isolated: initializers cannot reach the caller's scope.
#[test]
fn context_is_isolated() {
    assert_eq!(eval("c: context [y: 1] select c 'y"), Datum::Integer(1));
    let err = eval_err("n: 7 context [x: n]");
    assert_eq!(err.id, "no-value");
    assert_eq!(err.args[0], "n");
}

/// A failing initializer leaves no partially-built object behind.
#[test]
fn failed_construction_is_unobservable() {
    let err = eval_err("o: object [a: 1 b: 1 / 0] o");
    // The construction failed, so `o` was never bound at all.
    assert_eq!(err.id, "div-by-zero");
}

// =============================================================================
// 2. Prototypes
// =============================================================================

/// make with an object target chains a prototype for reads.
#[test]
fn prototype_reads() {
    let source = "base: object [x: 1 y: 2]\n\
                  derived: make base [z: 3]\n";
    assert_eq!(eval(&format!("{source} select derived 'x")), Datum::Integer(1));
    assert_eq!(eval(&format!("{source} select derived 'z")), Datum::Integer(3));
}

/// The derived manifest holds only its own fields.
#[test]
fn derived_manifest_is_own_fields() {
    assert_eq!(
        eval("base: object [x: 1] derived: make base [z: 3] words-of derived"),
        Datum::Block(vec![Datum::Word("z".into())])
    );
}

/// Prototype chains walk transitively; the nearest definition wins.
#[test]
fn prototype_chain_shadowing() {
    let source = "a: object [v: 1 w: 10]\n\
                  b: make a [v: 2]\n\
                  c: make b [u: 3]\n";
    assert_eq!(eval(&format!("{source} select c 'v")), Datum::Integer(2));
    assert_eq!(eval(&format!("{source} select c 'w")), Datum::Integer(10));
    assert_eq!(eval(&format!("{source} select c 'u")), Datum::Integer(3));
}

/// `make object! [...]` behaves exactly like `object`.
#[test]
fn make_object_datatype() {
    assert_eq!(eval("o: make object! [x: 5] select o 'x"), Datum::Integer(5));
}

// =============================================================================
// 3. Field access
// =============================================================================

/// select misses produce none, or the --default value.
#[test]
fn select_miss_and_default() {
    assert_eq!(eval("o: object [x: 1] select o 'missing"), Datum::None);
    assert_eq!(eval("o: object [x: 1] select o 'missing --default 42"), Datum::Integer(42));
    assert_eq!(eval("o: object [x: 1] select o 'x --default 42"), Datum::Integer(1));
}

/// put writes manifest fields and returns the value.
#[test]
fn put_writes_fields() {
    assert_eq!(eval("o: object [x: 1] put o 'x 9 select o 'x"), Datum::Integer(9));
    assert_eq!(eval("o: object [x: 1] put o 'x 9"), Datum::Integer(9));
}

/// Dynamic field addition is not permitted.
#[test]
fn put_rejects_unknown_fields() {
    let err = eval_err("o: object [x: 1] put o 'zzz 1");
    assert_eq!(err.id, "no-such-field");
    assert_eq!(err.args[0], "zzz");
}

/// put does not write through to the prototype's manifest.
#[test]
fn put_is_own_manifest_only() {
    let err = eval_err("base: object [x: 1] derived: make base [z: 3] put derived 'x 9");
    assert_eq!(err.id, "no-such-field");
}

/// Manifest type hints are enforced by put.
#[test]
fn type_hints_enforced() {
    assert_eq!(eval("o: object [age integer! name] put o 'age 30 select o 'age"), Datum::Integer(30));
    let err = eval_err("o: object [age integer! name] put o 'age \"thirty\"");
    assert_eq!(err.id, "type-mismatch");
    assert_eq!(err.args[0], "integer!");
}

/// Paths read fields with the prototype walk.
#[test]
fn path_field_access() {
    assert_eq!(eval("o: object [x: 10] o/x"), Datum::Integer(10));
    assert_eq!(eval("base: object [x: 1] derived: make base [z: 3] derived/x"), Datum::Integer(1));
    assert_eq!(eval("inner: object [v: 5] outer: object [o: inner] outer/o/v"), Datum::Integer(5));
    let err = eval_err("o: object [x: 10] o/missing");
    assert_eq!(err.id, "no-such-field");
}

/// Object equality is identity, never structural.
#[test]
fn object_equality_is_identity() {
    assert_eq!(eval("a: object [x: 1] b: object [x: 1] a = b"), Datum::Logic(false));
    assert_eq!(eval("a: object [x: 1] b: a a = b"), Datum::Logic(true));
}

/// find on an object reports field existence through the chain.
#[test]
fn find_field_existence() {
    assert_eq!(eval("base: object [x: 1] derived: make base [z: 3] find derived 'x"), Datum::Logic(true));
    assert_eq!(eval("o: object [x: 1] find o 'q"), Datum::Logic(false));
}

/// foreach over an object yields its field words in manifest order.
#[test]
fn foreach_over_object() {
    assert_eq!(
        eval("o: object [a: 1 b: 2] seen: [] foreach w o [append seen w] seen"),
        Datum::Block(vec![Datum::Word("a".into()), Datum::Word("b".into())])
    );
}
