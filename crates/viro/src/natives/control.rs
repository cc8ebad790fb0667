//! Control-flow natives: conditionals, loops, and non-local exits.
//!
//! Loops follow the signal protocol: a level-1 `break` exits the loop with
//! `none`, a level-1 `continue` starts the next pass, and higher levels are
//! re-raised with the count decremented so each enclosing loop consumes one
//! level. `return` is never consumed here; it unwinds to the nearest
//! function invocation. Every loop polls the embedder cancellation hook
//! once per iteration.

use super::{NativeDef, arg, arg_of, block_slice, raw, val};
use crate::{
    args::{ArgValues, Refinements},
    error::{ErrorValue, RunError, RunResult, ThrowSignal},
    eval::{Evaluator, LoopFlow},
    heap::HeapData,
    intern::StaticSymbols,
    value::{Kind, Value},
};

pub(crate) static NATIVES: &[NativeDef] = &[
    NativeDef::prefix(
        "either",
        &[arg("condition"), arg_of("true-block", Kind::Block), arg_of("false-block", Kind::Block)],
        "Evaluates one of two blocks depending on a condition.",
        na_either,
    ),
    NativeDef::prefix(
        "if",
        &[arg("condition"), arg_of("then-block", Kind::Block)],
        "Evaluates a block when the condition is truthy.",
        na_if,
    ),
    NativeDef::prefix(
        "loop",
        &[arg_of("count", Kind::Integer), arg_of("body", Kind::Block)],
        "Evaluates a body block a fixed number of times.",
        na_loop,
    ),
    NativeDef::prefix(
        "while",
        &[arg_of("condition", Kind::Block), arg_of("body", Kind::Block)],
        "Evaluates a body block for as long as a condition block is truthy.",
        na_while,
    ),
    NativeDef::prefix(
        "foreach",
        &[raw("word"), arg("series"), arg_of("body", Kind::Block)],
        "Evaluates a body block once for each element of a series.",
        na_foreach,
    ),
    NativeDef::prefix(
        "break",
        &[val("levels", Some(Kind::Integer))],
        "Exits the enclosing loop; --levels unwinds several loops.",
        na_break,
    ),
    NativeDef::prefix(
        "continue",
        &[val("levels", Some(Kind::Integer))],
        "Restarts the enclosing loop's next iteration; --levels reaches outward.",
        na_continue,
    ),
    NativeDef::prefix("return", &[arg("value")], "Returns a value from the enclosing function.", na_return),
    NativeDef::prefix("all", &[arg_of("block", Kind::Block)], "Evaluates expressions until one is falsy.", na_all),
    NativeDef::prefix("any", &[arg_of("block", Kind::Block)], "Evaluates expressions until one is truthy.", na_any),
    NativeDef::prefix(
        "try",
        &[arg_of("block", Kind::Block)],
        "Evaluates a block, returning a raised error as a value.",
        na_try,
    ),
];

fn na_either(ev: &mut Evaluator<'_>, args: ArgValues, _refs: &mut Refinements) -> RunResult<Value> {
    let (condition, true_block, false_block) = args.get_three("either", ev.heap)?;
    let truthy = condition.is_truthy();
    condition.drop_with_heap(ev.heap);
    let (chosen, other) = if truthy { (true_block, false_block) } else { (false_block, true_block) };
    other.drop_with_heap(ev.heap);
    let result = ev.do_block(&chosen);
    chosen.drop_with_heap(ev.heap);
    result
}

fn na_if(ev: &mut Evaluator<'_>, args: ArgValues, _refs: &mut Refinements) -> RunResult<Value> {
    let (condition, then_block) = args.get_two("if", ev.heap)?;
    let truthy = condition.is_truthy();
    condition.drop_with_heap(ev.heap);
    let result = if truthy { ev.do_block(&then_block) } else { Ok(Value::None) };
    then_block.drop_with_heap(ev.heap);
    result
}

fn na_loop(ev: &mut Evaluator<'_>, args: ArgValues, _refs: &mut Refinements) -> RunResult<Value> {
    let (count, body) = args.get_two("loop", ev.heap)?;
    let count = match count {
        Value::Int(count) => count,
        other => {
            let kind = other.kind(ev.heap);
            other.drop_with_heap(ev.heap);
            body.drop_with_heap(ev.heap);
            return Err(ErrorValue::type_mismatch("integer!", kind));
        }
    };
    let mut result = Value::None;
    for _ in 0..count.max(0) {
        if let Err(err) = ev.check_cancelled() {
            result.drop_with_heap(ev.heap);
            body.drop_with_heap(ev.heap);
            return Err(err);
        }
        match ev.run_loop_body(&body) {
            Ok(LoopFlow::Normal(value)) => {
                let previous = std::mem::replace(&mut result, value);
                previous.drop_with_heap(ev.heap);
            }
            Ok(LoopFlow::Continue) => {}
            Ok(LoopFlow::Break) => {
                result.drop_with_heap(ev.heap);
                body.drop_with_heap(ev.heap);
                return Ok(Value::None);
            }
            Err(err) => {
                result.drop_with_heap(ev.heap);
                body.drop_with_heap(ev.heap);
                return Err(err);
            }
        }
    }
    body.drop_with_heap(ev.heap);
    Ok(result)
}

fn na_while(ev: &mut Evaluator<'_>, args: ArgValues, _refs: &mut Refinements) -> RunResult<Value> {
    let (condition, body) = args.get_two("while", ev.heap)?;
    let mut result = Value::None;
    let finish = |ev: &mut Evaluator<'_>, condition: Value, body: Value, outcome: RunResult<Value>| {
        condition.drop_with_heap(ev.heap);
        body.drop_with_heap(ev.heap);
        outcome
    };
    loop {
        if let Err(err) = ev.check_cancelled() {
            result.drop_with_heap(ev.heap);
            return finish(ev, condition, body, Err(err));
        }
        let test = match ev.do_block(&condition) {
            Ok(test) => test,
            Err(err) => {
                result.drop_with_heap(ev.heap);
                return finish(ev, condition, body, Err(err));
            }
        };
        let truthy = test.is_truthy();
        test.drop_with_heap(ev.heap);
        if !truthy {
            return finish(ev, condition, body, Ok(result));
        }
        match ev.run_loop_body(&body) {
            Ok(LoopFlow::Normal(value)) => {
                let previous = std::mem::replace(&mut result, value);
                previous.drop_with_heap(ev.heap);
            }
            Ok(LoopFlow::Continue) => {}
            Ok(LoopFlow::Break) => {
                result.drop_with_heap(ev.heap);
                return finish(ev, condition, body, Ok(Value::None));
            }
            Err(err) => {
                result.drop_with_heap(ev.heap);
                return finish(ev, condition, body, Err(err));
            }
        }
    }
}

/// Collects the iteration items of a foreach subject up front, so buffer
/// mutation inside the body cannot skip or repeat elements.
fn foreach_items(ev: &mut Evaluator<'_>, series: &Value) -> RunResult<Vec<Value>> {
    match series {
        Value::Ref(id) => match ev.heap.get(*id) {
            HeapData::Block(_) | HeapData::Paren(_) => {
                let elements = block_slice(ev.heap, series)?;
                Ok(elements.iter().map(|v| v.clone_with_heap(ev.heap)).collect())
            }
            HeapData::Str(handle) => {
                let chars: Vec<char> = crate::value::str_remainder(ev.heap, handle).chars().collect();
                Ok(chars
                    .into_iter()
                    .map(|c| ev.heap.alloc_string(c.to_string()))
                    .collect())
            }
            HeapData::Binary(handle) => Ok(crate::value::bin_remainder(ev.heap, handle)
                .iter()
                .map(|byte| Value::Int(i64::from(*byte)))
                .collect()),
            HeapData::Object(data) => Ok(data.manifest.keys().map(|sym| Value::Word(*sym)).collect()),
            _ => Err(ErrorValue::type_mismatch("series", series.kind(ev.heap))),
        },
        other => Err(ErrorValue::type_mismatch("series", other.kind(ev.heap))),
    }
}

/// `foreach 'word series body`: binds the loop word in the caller's frame
/// (it remains bound after the loop) so body set-words keep reaching
/// enclosing bindings. Iterating an object yields its field words in
/// manifest order.
fn na_foreach(ev: &mut Evaluator<'_>, args: ArgValues, _refs: &mut Refinements) -> RunResult<Value> {
    let (word, series, body) = args.get_three("foreach", ev.heap)?;
    let Some(symbol) = word.word_symbol() else {
        let kind = word.kind(ev.heap);
        word.drop_with_heap(ev.heap);
        series.drop_with_heap(ev.heap);
        body.drop_with_heap(ev.heap);
        return Err(ErrorValue::type_mismatch("word!", kind));
    };
    let items = match foreach_items(ev, &series) {
        Ok(items) => items,
        Err(err) => {
            series.drop_with_heap(ev.heap);
            body.drop_with_heap(ev.heap);
            return Err(err);
        }
    };
    series.drop_with_heap(ev.heap);

    let mut items = items.into_iter();
    let mut result = Value::None;
    let outcome = loop {
        if let Err(err) = ev.check_cancelled() {
            break Err(err);
        }
        let Some(item) = items.next() else {
            break Ok(std::mem::replace(&mut result, Value::None));
        };
        let frame = ev.current_frame();
        ev.frames.bind(frame, symbol, item, ev.heap);
        match ev.run_loop_body(&body) {
            Ok(LoopFlow::Normal(value)) => {
                let previous = std::mem::replace(&mut result, value);
                previous.drop_with_heap(ev.heap);
            }
            Ok(LoopFlow::Continue) => {}
            Ok(LoopFlow::Break) => break Ok(Value::None),
            Err(err) => break Err(err),
        }
    };
    for leftover in items {
        leftover.drop_with_heap(ev.heap);
    }
    result.drop_with_heap(ev.heap);
    body.drop_with_heap(ev.heap);
    outcome
}

/// Reads the `--levels` refinement, defaulting to one level.
fn signal_levels(ev: &mut Evaluator<'_>, refs: &mut Refinements) -> RunResult<u32> {
    match refs.take(StaticSymbols::Levels.into()) {
        None => Ok(1),
        Some(value) => {
            let levels = match &value {
                Value::Int(levels) if *levels >= 1 => Ok(u32::try_from(*levels).unwrap_or(u32::MAX)),
                Value::Int(levels) => Err(ErrorValue::invalid_arg(format!("--levels must be positive, not {levels}"))),
                other => Err(ErrorValue::type_mismatch("integer!", other.kind(ev.heap))),
            };
            value.drop_with_heap(ev.heap);
            levels
        }
    }
}

fn na_break(ev: &mut Evaluator<'_>, args: ArgValues, refs: &mut Refinements) -> RunResult<Value> {
    args.drop_with_heap(ev.heap);
    let levels = signal_levels(ev, refs)?;
    Err(RunError::Throw(ThrowSignal::Break { levels }))
}

fn na_continue(ev: &mut Evaluator<'_>, args: ArgValues, refs: &mut Refinements) -> RunResult<Value> {
    args.drop_with_heap(ev.heap);
    let levels = signal_levels(ev, refs)?;
    Err(RunError::Throw(ThrowSignal::Continue { levels }))
}

fn na_return(ev: &mut Evaluator<'_>, args: ArgValues, _refs: &mut Refinements) -> RunResult<Value> {
    let value = args.get_one("return", ev.heap)?;
    Err(ev.signal_return(value))
}

fn na_all(ev: &mut Evaluator<'_>, args: ArgValues, _refs: &mut Refinements) -> RunResult<Value> {
    let block = args.get_one("all", ev.heap)?;
    let result = all_inner(ev, &block);
    block.drop_with_heap(ev.heap);
    result
}

fn all_inner(ev: &mut Evaluator<'_>, block: &Value) -> RunResult<Value> {
    let (buf, start) = ev.series_view(block)?;
    let mut result = Value::Logic(true);
    let mut pos = start;
    while pos < ev.buf_len(buf) {
        let (next, value) = match ev.eval_expression(buf, pos) {
            Ok(step) => step,
            Err(err) => {
                result.drop_with_heap(ev.heap);
                return Err(err);
            }
        };
        if !value.is_truthy() {
            value.drop_with_heap(ev.heap);
            result.drop_with_heap(ev.heap);
            return Ok(Value::None);
        }
        let previous = std::mem::replace(&mut result, value);
        previous.drop_with_heap(ev.heap);
        pos = next;
    }
    Ok(result)
}

fn na_any(ev: &mut Evaluator<'_>, args: ArgValues, _refs: &mut Refinements) -> RunResult<Value> {
    let block = args.get_one("any", ev.heap)?;
    let result = any_inner(ev, &block);
    block.drop_with_heap(ev.heap);
    result
}

fn any_inner(ev: &mut Evaluator<'_>, block: &Value) -> RunResult<Value> {
    let (buf, start) = ev.series_view(block)?;
    let mut pos = start;
    while pos < ev.buf_len(buf) {
        let (next, value) = ev.eval_expression(buf, pos)?;
        if value.is_truthy() {
            return Ok(value);
        }
        value.drop_with_heap(ev.heap);
        pos = next;
    }
    Ok(Value::None)
}

/// `try` catches script errors as error values. Control-flow signals and
/// internal errors pass through untouched.
fn na_try(ev: &mut Evaluator<'_>, args: ArgValues, _refs: &mut Refinements) -> RunResult<Value> {
    let block = args.get_one("try", ev.heap)?;
    let result = ev.do_block(&block);
    block.drop_with_heap(ev.heap);
    match result {
        Ok(value) => Ok(value),
        Err(RunError::Err(err)) => Ok(ev.heap.alloc_error(*err)),
        Err(other) => Err(other),
    }
}
