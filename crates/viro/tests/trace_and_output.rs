//! The trace session surface, print writers, and heap statistics.

mod common;

use common::{eval_with_output, molded};
use pretty_assertions::assert_eq;
use viro::{CollectStringPrint, Datum, Interpreter, RecordingSink, TraceEvent, TraceFilter};

// =============================================================================
// 1. Print writers
// =============================================================================

/// print writes the formed value and a newline through the writer.
#[test]
fn print_forms_values() {
    assert_eq!(eval_with_output("print \"hi\"").1, "hi\n");
    assert_eq!(eval_with_output("print 42").1, "42\n");
    assert_eq!(eval_with_output("print none").1, "none\n");
}

/// print reduces a block argument and separates results with spaces.
#[test]
fn print_reduces_blocks() {
    assert_eq!(eval_with_output("x: 2 print [1 x 1 + x]").1, "1 2 3\n");
}

/// probe molds the value and passes it through.
#[test]
fn probe_molds_and_returns() {
    let (value, output) = eval_with_output("probe [1 \"a\"]");
    assert_eq!(output, "[1 \"a\"]\n");
    assert_eq!(value, Datum::Block(vec![Datum::Integer(1), Datum::String("a".into())]));
}

/// Output accumulates across statements in source order.
#[test]
fn output_order() {
    assert_eq!(eval_with_output("print 1 print 2 print 3").1, "1\n2\n3\n");
}

// =============================================================================
// 2. Trace session
// =============================================================================

fn traced(source: &str) -> Vec<TraceEvent> {
    let mut vm = Interpreter::new();
    let sink = RecordingSink::new();
    vm.set_trace_sink(Box::new(sink.clone()));
    vm.trace_session().set_enabled(true);
    let mut out = CollectStringPrint::new();
    vm.run_with_writer(source, &mut out).expect("traced script should evaluate");
    sink.events()
}

/// Function entry and return emit paired events carrying the call name.
#[test]
fn call_events() {
    let events = traced("f: fn [] [1] f");
    let enters: Vec<&TraceEvent> = events
        .iter()
        .filter(|e| matches!(e, TraceEvent::CallEnter { name, .. } if name == "f"))
        .collect();
    let returns: Vec<&TraceEvent> = events
        .iter()
        .filter(|e| matches!(e, TraceEvent::CallReturn { name, .. } if name == "f"))
        .collect();
    assert_eq!(enters.len(), 1);
    assert_eq!(returns.len(), 1);
}

/// Native calls are tagged native.
#[test]
fn native_calls_are_tagged() {
    let events = traced("join \"a\" \"b\"");
    assert!(
        events
            .iter()
            .any(|e| matches!(e, TraceEvent::CallEnter { name, native: true, .. } if name == "join")),
        "expected a native call-enter for join, got {events:?}"
    );
}

/// Object creation and field access emit object events.
#[test]
fn object_events() {
    let events = traced("o: object [x: 1] select o 'x put o 'x 2");
    assert!(
        events
            .iter()
            .any(|e| matches!(e, TraceEvent::ObjectCreated { fields } if fields == &["x".to_owned()])),
        "expected object-created, got {events:?}"
    );
    assert!(events.iter().any(|e| matches!(e, TraceEvent::FieldRead { field } if field == "x")));
    assert!(events.iter().any(|e| matches!(e, TraceEvent::FieldWrite { field } if field == "x")));
}

/// Port construction emits a port-open event.
#[test]
fn port_events() {
    let events = traced("make port! \"queue:jobs\"");
    assert!(
        events
            .iter()
            .any(|e| matches!(e, TraceEvent::PortOpen { target } if target == "queue:jobs")),
        "expected port-open, got {events:?}"
    );
}

/// A disabled session records nothing; the trace native switches it.
#[test]
fn trace_native_switches_session() {
    let mut vm = Interpreter::new();
    let sink = RecordingSink::new();
    vm.set_trace_sink(Box::new(sink.clone()));
    let mut out = CollectStringPrint::new();

    vm.run_with_writer("join \"a\" \"b\"", &mut out).unwrap();
    assert!(sink.events().is_empty(), "disabled session must stay silent");

    let state = vm.run_with_writer("trace --on", &mut out).unwrap();
    assert_eq!(state, Datum::Logic(true));
    vm.run_with_writer("join \"a\" \"b\"", &mut out).unwrap();
    assert!(!sink.events().is_empty(), "enabled session must record");

    let state = vm.run_with_writer("trace --off", &mut out).unwrap();
    assert_eq!(state, Datum::Logic(false));
}

/// The filter's function-name set narrows call events.
#[test]
fn filter_by_function_name() {
    let mut vm = Interpreter::new();
    let sink = RecordingSink::new();
    vm.set_trace_sink(Box::new(sink.clone()));
    vm.trace_session().set_enabled(true);
    vm.trace_session().set_filter(TraceFilter {
        functions: Some(ahash_set(&["wanted"])),
        ..TraceFilter::default()
    });
    let mut out = CollectStringPrint::new();
    vm.run_with_writer("wanted: fn [] [1] other: fn [] [2] wanted other", &mut out).unwrap();
    let call_names: Vec<String> = sink
        .events()
        .iter()
        .filter_map(|e| match e {
            TraceEvent::CallEnter { name, .. } => Some(name.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(call_names, vec!["wanted".to_owned()]);
}

fn ahash_set(names: &[&str]) -> ahash::AHashSet<String> {
    names.iter().map(|n| (*n).to_owned()).collect()
}

// =============================================================================
// 3. Heap statistics
// =============================================================================

/// Running code grows the heap; the slot invariant holds.
#[test]
fn heap_stats_track_allocations() {
    let mut vm = Interpreter::new();
    let before = vm.heap_stats();
    let mut out = CollectStringPrint::new();
    vm.run_with_writer("x: [1 \"two\" 3.0]", &mut out).unwrap();
    let after = vm.heap_stats();
    assert!(after.live_objects > before.live_objects, "allocations should show up in stats");
    assert_eq!(after.total_slots, after.live_objects + after.free_slots);
    assert!(after.objects_by_type.contains_key("Block"), "got {types:?}", types = after.objects_by_type);
}

/// Temporaries are released: evaluating pure expressions leaves no extra
/// live objects behind.
#[test]
fn temporaries_are_released() {
    let mut vm = Interpreter::new();
    let mut out = CollectStringPrint::new();
    vm.run_with_writer("1 + 2", &mut out).unwrap();
    let baseline = vm.heap_stats();
    vm.run_with_writer("loop 100 [join \"a\" \"b\"] none", &mut out).unwrap();
    let after = vm.heap_stats();
    assert_eq!(
        after.live_objects, baseline.live_objects,
        "unbound temporaries must all be reclaimed"
    );
}

/// Global bindings persist across run calls.
#[test]
fn state_persists_between_runs() {
    let mut vm = Interpreter::new();
    let mut out = CollectStringPrint::new();
    vm.run_with_writer("counter: 10", &mut out).unwrap();
    let result = vm.run_with_writer("counter + 1", &mut out).unwrap();
    assert_eq!(result, Datum::Integer(11));
}

// =============================================================================
// 4. Molded output details
// =============================================================================

/// Objects mold as make object! constructors.
#[test]
fn object_mold_shape() {
    assert_eq!(molded("object [x: 1 y: \"s\"]"), "make object! [\n    x: 1\n    y: \"s\"\n]");
}

/// Errors mold with category and id.
#[test]
fn error_mold_shape() {
    assert_eq!(molded("try [1 / 0]"), "make error! [Math div-by-zero]");
}
