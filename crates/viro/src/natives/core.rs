//! Constructors, evaluation natives, reflection, and output.

use super::{NativeDef, arg, arg_of, block_slice, expect_word, flag};
use crate::{
    args::{ArgValues, Refinements},
    error::{ErrorValue, RunResult},
    eval::Evaluator,
    function::{FunctionData, FunctionKind, parse_param_spec},
    heap::{Bitset, BlockBuf, HeapData, Port},
    intern::StaticSymbols,
    object::{self, ObjectParent},
    parse::parse_source,
    trace::TraceEvent,
    value::{self, Kind, Value},
};

pub(crate) static NATIVES: &[NativeDef] = &[
    NativeDef::prefix(
        "fn",
        &[arg_of("spec", Kind::Block), arg("body")],
        "Defines a function from a parameter spec block and a body block.",
        na_fn,
    ),
    NativeDef::prefix(
        "object",
        &[arg_of("spec", Kind::Block)],
        "Constructs an object lexically enclosed by the current frame.",
        na_object,
    ),
    NativeDef::prefix(
        "context",
        &[arg_of("spec", Kind::Block)],
        "Constructs an isolated object with no enclosing scope.",
        na_context,
    ),
    NativeDef::prefix(
        "make",
        &[arg("target"), arg("spec")],
        "Constructs a value: an object from object! or a prototype, a bitset, or a port.",
        na_make,
    ),
    NativeDef::prefix("do", &[arg("value")], "Evaluates a block, paren, or source string.", na_do),
    NativeDef::prefix(
        "reduce",
        &[arg_of("block", Kind::Block)],
        "Evaluates each expression of a block into a new block.",
        na_reduce,
    ),
    NativeDef::prefix(
        "compose",
        &[arg_of("block", Kind::Block)],
        "Copies a block, replacing each paren with its evaluated value.",
        na_compose,
    ),
    NativeDef::prefix("get", &[arg("word")], "Returns the value a word is bound to.", na_get),
    NativeDef::prefix("set", &[arg("word"), arg("value")], "Binds a word to a value.", na_set),
    NativeDef::prefix("type-of", &[arg("value")], "Returns the datatype of a value.", na_type_of),
    NativeDef::prefix("words-of", &[arg("value")], "Returns the field or parameter words of a value.", na_words_of),
    NativeDef::prefix("values-of", &[arg_of("object", Kind::Object)], "Returns an object's field values.", na_values_of),
    NativeDef::prefix("print", &[arg("value")], "Prints the formed value and a newline.", na_print),
    NativeDef::prefix("probe", &[arg("value")], "Prints the molded value and returns it.", na_probe),
    NativeDef::prefix("join", &[arg("value1"), arg("value2")], "Concatenates the formed texts of two values.", na_join),
    NativeDef::prefix("form", &[arg("value")], "Returns the human-readable text of a value.", na_form),
    NativeDef::prefix("mold", &[arg("value")], "Returns the source text of a value.", na_mold),
    NativeDef::prefix(
        "trace",
        &[flag("on"), flag("off")],
        "Switches execution tracing; returns the resulting state.",
        na_trace,
    ),
];

fn na_fn(ev: &mut Evaluator<'_>, args: ArgValues, _refs: &mut Refinements) -> RunResult<Value> {
    let (spec, body) = args.get_two("fn", ev.heap)?;
    let parsed = match block_slice(ev.heap, &spec) {
        Ok(slice) => parse_param_spec(ev.heap, ev.interns, slice),
        Err(err) => Err(err),
    };
    spec.drop_with_heap(ev.heap);
    let (params, docs) = match parsed {
        Ok(parsed) => parsed,
        Err(err) => {
            body.drop_with_heap(ev.heap);
            return Err(err);
        }
    };

    let body_id = match body {
        Value::Ref(id) if matches!(ev.heap.get(id), HeapData::Block(_)) => id,
        other => {
            let kind = other.kind(ev.heap);
            other.drop_with_heap(ev.heap);
            return Err(ErrorValue::no_body(kind.type_name()));
        }
    };

    // Closure capture: the current frame becomes the function's lexical
    // parent and is pinned from here on. The body refcount transfers into
    // the function value.
    let parent = ev.current_frame();
    ev.frames.mark_captured(parent);
    let function = FunctionData {
        name: StaticSymbols::Fn.into(),
        params,
        kind: FunctionKind::User { body: body_id, parent },
        infix: false,
        docs,
    };
    Ok(Value::Ref(ev.heap.allocate(HeapData::Function(function))))
}

fn na_object(ev: &mut Evaluator<'_>, args: ArgValues, _refs: &mut Refinements) -> RunResult<Value> {
    let spec = args.get_one("object", ev.heap)?;
    let result = object::construct(ev, &spec, ObjectParent::Caller, None);
    spec.drop_with_heap(ev.heap);
    result
}

fn na_context(ev: &mut Evaluator<'_>, args: ArgValues, _refs: &mut Refinements) -> RunResult<Value> {
    let spec = args.get_one("context", ev.heap)?;
    let result = object::construct(ev, &spec, ObjectParent::None, None);
    spec.drop_with_heap(ev.heap);
    result
}

fn na_make(ev: &mut Evaluator<'_>, args: ArgValues, _refs: &mut Refinements) -> RunResult<Value> {
    let (target, spec) = args.get_two("make", ev.heap)?;
    let result = make_inner(ev, &target, &spec);
    target.drop_with_heap(ev.heap);
    spec.drop_with_heap(ev.heap);
    result
}

fn make_inner(ev: &mut Evaluator<'_>, target: &Value, spec: &Value) -> RunResult<Value> {
    match target {
        Value::Datatype(Kind::Object) => object::construct(ev, spec, ObjectParent::Caller, None),
        Value::Datatype(Kind::Bitset) => make_bitset(ev, spec),
        Value::Datatype(Kind::Port) => {
            let target = value::form(spec, ev.heap, ev.frames, ev.interns);
            ev.trace_port(TraceEvent::PortOpen { target: target.clone() });
            Ok(Value::Ref(ev.heap.allocate(HeapData::Port(Port { target, open: true }))))
        }
        Value::Ref(id) if matches!(ev.heap.get(*id), HeapData::Object(_)) => {
            // The existing object becomes the new one's prototype.
            ev.heap.inc_ref(*id);
            object::construct(ev, spec, ObjectParent::Caller, Some(*id))
        }
        other => Err(ErrorValue::source_unsupported(format!(
            "cannot make from {kind}",
            kind = other.kind(ev.heap).type_name()
        ))),
    }
}

fn make_bitset(ev: &mut Evaluator<'_>, spec: &Value) -> RunResult<Value> {
    let Value::Ref(id) = spec else {
        return Err(ErrorValue::spec_unsupported("bitset spec must be a string"));
    };
    let HeapData::Str(handle) = ev.heap.get(*id) else {
        return Err(ErrorValue::spec_unsupported("bitset spec must be a string"));
    };
    let text = value::str_remainder(ev.heap, handle);
    let mut bitset = Bitset::new();
    for c in text.chars() {
        let code = u32::from(c);
        let byte = u8::try_from(code).map_err(|_| ErrorValue::invalid_arg(format!("character {c:?} exceeds 255")))?;
        bitset.set(byte);
    }
    Ok(Value::Ref(ev.heap.allocate(HeapData::Bitset(bitset))))
}

fn na_do(ev: &mut Evaluator<'_>, args: ArgValues, _refs: &mut Refinements) -> RunResult<Value> {
    let value = args.get_one("do", ev.heap)?;
    match &value {
        Value::Ref(id) => match ev.heap.get(*id) {
            HeapData::Block(_) | HeapData::Paren(_) => {
                let result = ev.do_block(&value);
                value.drop_with_heap(ev.heap);
                result
            }
            HeapData::Str(handle) => {
                let source = value::str_remainder(ev.heap, handle).to_owned();
                value.drop_with_heap(ev.heap);
                let block = parse_source(&source, ev.heap, ev.interns)
                    .map_err(|err| ErrorValue::invalid_syntax(err.to_string()))?;
                let result = ev.do_block(&block);
                block.drop_with_heap(ev.heap);
                result
            }
            _ => Ok(value),
        },
        _ => Ok(value),
    }
}

fn na_reduce(ev: &mut Evaluator<'_>, args: ArgValues, _refs: &mut Refinements) -> RunResult<Value> {
    let block = args.get_one("reduce", ev.heap)?;
    let result = reduce_inner(ev, &block);
    block.drop_with_heap(ev.heap);
    result
}

fn reduce_inner(ev: &mut Evaluator<'_>, block: &Value) -> RunResult<Value> {
    let (buf, start) = ev.series_view(block)?;
    let mut values = Vec::new();
    let mut pos = start;
    while pos < ev.buf_len(buf) {
        match ev.eval_expression(buf, pos) {
            Ok((next, value)) => {
                values.push(value);
                pos = next;
            }
            Err(err) => {
                for value in values {
                    value.drop_with_heap(ev.heap);
                }
                return Err(err);
            }
        }
    }
    Ok(ev.heap.alloc_block(BlockBuf::new(values)))
}

fn na_compose(ev: &mut Evaluator<'_>, args: ArgValues, _refs: &mut Refinements) -> RunResult<Value> {
    let block = args.get_one("compose", ev.heap)?;
    let result = compose_inner(ev, &block);
    block.drop_with_heap(ev.heap);
    result
}

/// Copies elements, auto-evaluating parens: each paren group is replaced by
/// its value, every other element (nested blocks included) is preserved.
fn compose_inner(ev: &mut Evaluator<'_>, block: &Value) -> RunResult<Value> {
    let (buf, start) = ev.series_view(block)?;
    let mut values = Vec::new();
    let mut pos = start;
    while pos < ev.buf_len(buf) {
        let element = {
            let HeapData::BlockBuf(b) = ev.heap.get(buf) else { break };
            match b.values.get(pos) {
                Some(element) => element.clone_with_heap(ev.heap),
                None => break,
            }
        };
        pos += 1;
        let paren = match &element {
            Value::Ref(id) => match ev.heap.get(*id) {
                HeapData::Paren(handle) => Some((handle.buf, handle.cursor)),
                _ => None,
            },
            _ => None,
        };
        match paren {
            Some((paren_buf, cursor)) => {
                let evaluated = ev.do_buf(paren_buf, cursor);
                element.drop_with_heap(ev.heap);
                match evaluated {
                    Ok(value) => values.push(value),
                    Err(err) => {
                        for value in values {
                            value.drop_with_heap(ev.heap);
                        }
                        return Err(err);
                    }
                }
            }
            None => values.push(element),
        }
    }
    Ok(ev.heap.alloc_block(BlockBuf::new(values)))
}

fn na_get(ev: &mut Evaluator<'_>, args: ArgValues, _refs: &mut Refinements) -> RunResult<Value> {
    let word = args.get_one("get", ev.heap)?;
    let symbol = match expect_word(ev.heap, &word) {
        Ok(symbol) => symbol,
        Err(err) => {
            word.drop_with_heap(ev.heap);
            return Err(err);
        }
    };
    word.drop_with_heap(ev.heap);
    match ev.lookup(symbol) {
        Some((bound, _)) => Ok(bound.clone_with_heap(ev.heap)),
        None => Err(ErrorValue::no_value(ev.interns.get(symbol))),
    }
}

/// `set` updates the binding where the word is already bound, falling back
/// to the current frame for new words.
fn na_set(ev: &mut Evaluator<'_>, args: ArgValues, _refs: &mut Refinements) -> RunResult<Value> {
    let (word, value) = args.get_two("set", ev.heap)?;
    let symbol = match expect_word(ev.heap, &word) {
        Ok(symbol) => symbol,
        Err(err) => {
            word.drop_with_heap(ev.heap);
            value.drop_with_heap(ev.heap);
            return Err(err);
        }
    };
    word.drop_with_heap(ev.heap);
    let target = match ev.lookup(symbol) {
        Some((_, frame)) => frame,
        None => ev.current_frame(),
    };
    let bound = value.clone_with_heap(ev.heap);
    ev.frames.bind(target, symbol, bound, ev.heap);
    Ok(value)
}

fn na_type_of(ev: &mut Evaluator<'_>, args: ArgValues, _refs: &mut Refinements) -> RunResult<Value> {
    let value = args.get_one("type-of", ev.heap)?;
    let kind = value.type_kind(ev.heap);
    value.drop_with_heap(ev.heap);
    Ok(Value::Datatype(kind))
}

fn na_words_of(ev: &mut Evaluator<'_>, args: ArgValues, _refs: &mut Refinements) -> RunResult<Value> {
    let value = args.get_one("words-of", ev.heap)?;
    let words: Option<Vec<Value>> = match &value {
        Value::Ref(id) => match ev.heap.get(*id) {
            HeapData::Object(data) => Some(data.manifest.keys().map(|sym| Value::Word(*sym)).collect()),
            HeapData::Function(f) => Some(f.params.iter().map(|p| Value::Word(p.name)).collect()),
            _ => None,
        },
        _ => None,
    };
    let kind = value.kind(ev.heap);
    value.drop_with_heap(ev.heap);
    match words {
        Some(words) => Ok(ev.heap.alloc_block(BlockBuf::new(words))),
        None => Err(ErrorValue::type_mismatch("object!", kind)),
    }
}

fn na_values_of(ev: &mut Evaluator<'_>, args: ArgValues, _refs: &mut Refinements) -> RunResult<Value> {
    let value = args.get_one("values-of", ev.heap)?;
    let values: Option<Vec<Value>> = match &value {
        Value::Ref(id) => match ev.heap.get(*id) {
            HeapData::Object(data) => Some(
                ev.frames
                    .get(data.frame)
                    .bindings()
                    .map(|(_, v)| v.clone_with_heap(ev.heap))
                    .collect(),
            ),
            _ => None,
        },
        _ => None,
    };
    let kind = value.kind(ev.heap);
    value.drop_with_heap(ev.heap);
    match values {
        Some(values) => Ok(ev.heap.alloc_block(BlockBuf::new(values))),
        None => Err(ErrorValue::type_mismatch("object!", kind)),
    }
}

fn na_print(ev: &mut Evaluator<'_>, args: ArgValues, _refs: &mut Refinements) -> RunResult<Value> {
    let value = args.get_one("print", ev.heap)?;
    // A block argument is reduced and printed with spaces between the
    // formed results.
    let is_block = matches!(&value, Value::Ref(id) if matches!(ev.heap.get(*id), HeapData::Block(_)));
    let text = if is_block {
        let reduced = reduce_inner(ev, &value);
        value.drop_with_heap(ev.heap);
        let reduced = reduced?;
        let parts: Vec<String> = match block_slice(ev.heap, &reduced) {
            Ok(elements) => elements
                .iter()
                .map(|element| value::form(element, ev.heap, ev.frames, ev.interns))
                .collect(),
            Err(err) => {
                reduced.drop_with_heap(ev.heap);
                return Err(err);
            }
        };
        reduced.drop_with_heap(ev.heap);
        parts.join(" ")
    } else {
        let text = value::form(&value, ev.heap, ev.frames, ev.interns);
        value.drop_with_heap(ev.heap);
        text
    };
    ev.out_writer().write_text(&text);
    ev.out_writer().write_char('\n');
    Ok(Value::None)
}

fn na_probe(ev: &mut Evaluator<'_>, args: ArgValues, _refs: &mut Refinements) -> RunResult<Value> {
    let value = args.get_one("probe", ev.heap)?;
    let text = value::mold(&value, ev.heap, ev.frames, ev.interns);
    ev.out_writer().write_text(&text);
    ev.out_writer().write_char('\n');
    Ok(value)
}

fn na_join(ev: &mut Evaluator<'_>, args: ArgValues, _refs: &mut Refinements) -> RunResult<Value> {
    let (a, b) = args.get_two("join", ev.heap)?;
    let mut text = value::form(&a, ev.heap, ev.frames, ev.interns);
    text.push_str(&value::form(&b, ev.heap, ev.frames, ev.interns));
    a.drop_with_heap(ev.heap);
    b.drop_with_heap(ev.heap);
    Ok(ev.heap.alloc_string(text))
}

fn na_form(ev: &mut Evaluator<'_>, args: ArgValues, _refs: &mut Refinements) -> RunResult<Value> {
    let value = args.get_one("form", ev.heap)?;
    let text = value::form(&value, ev.heap, ev.frames, ev.interns);
    value.drop_with_heap(ev.heap);
    Ok(ev.heap.alloc_string(text))
}

fn na_mold(ev: &mut Evaluator<'_>, args: ArgValues, _refs: &mut Refinements) -> RunResult<Value> {
    let value = args.get_one("mold", ev.heap)?;
    let text = value::mold(&value, ev.heap, ev.frames, ev.interns);
    value.drop_with_heap(ev.heap);
    Ok(ev.heap.alloc_string(text))
}

fn na_trace(ev: &mut Evaluator<'_>, args: ArgValues, refs: &mut Refinements) -> RunResult<Value> {
    args.drop_with_heap(ev.heap);
    if refs.flag(StaticSymbols::On.into()) {
        ev.session.set_enabled(true);
    } else if refs.flag(StaticSymbols::Off.into()) {
        ev.session.set_enabled(false);
    }
    ev.update_trace_cache();
    Ok(Value::Logic(ev.session.is_enabled()))
}
