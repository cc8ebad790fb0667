//! Series and object actions.
//!
//! Every native here is a dispatcher: the implementation is selected from
//! the per-type action tables on the first argument's kind. Cursor-advancing
//! operations (`skip`, `next`, `head`, `find`) allocate a new series handle
//! sharing the buffer; mutating operations (`append`, `insert`, `remove`,
//! `sort`, `reverse`, `change`, `poke`) act on the shared buffer in place
//! and invalidate its parser source locations. `find` and `select` read
//! only. String cursors count characters, binary cursors count bytes.

use std::cmp::Ordering;

use super::{Actions, NativeDef, NativeImpl, arg, arg_of, dispatch_action, val};
use crate::{
    args::{ArgValues, Refinements},
    error::{ErrorValue, RunResult},
    eval::Evaluator,
    heap::{Heap, HeapData, HeapId, SeriesHandle},
    intern::StaticSymbols,
    object,
    value::{self, Kind, Value, value_cmp},
};

/// Declares an action dispatcher: a native whose body routes to the
/// per-type table under the given operation symbol.
macro_rules! action_dispatcher {
    ($(fn $name:ident => $op:ident;)*) => {
        $(
            fn $name(ev: &mut Evaluator<'_>, args: ArgValues, refs: &mut Refinements) -> RunResult<Value> {
                dispatch_action(ev, args, refs, StaticSymbols::$op)
            }
        )*
    };
}

action_dispatcher! {
    fn na_select => Select;
    fn na_put => Put;
    fn na_first => First;
    fn na_append => Append;
    fn na_insert => Insert;
    fn na_copy => Copy;
    fn na_find => Find;
    fn na_sort => Sort;
    fn na_reverse => Reverse;
    fn na_take => Take;
    fn na_remove => Remove;
    fn na_skip => Skip;
    fn na_next => Next;
    fn na_change => Change;
    fn na_poke => Poke;
    fn na_pick => Pick;
    fn na_head => Head;
    fn na_length => Length;
    fn na_empty => Empty;
}

pub(crate) static NATIVES: &[NativeDef] = &[
    NativeDef::prefix(
        "select",
        &[arg("series"), arg("value"), val("default", None)],
        "Finds a value and returns what follows it; object fields walk the prototype chain.",
        na_select,
    ),
    NativeDef::prefix(
        "put",
        &[arg_of("object", Kind::Object), arg("word"), arg("value")],
        "Writes an object field declared in its manifest.",
        na_put,
    ),
    NativeDef::prefix("first", &[arg("series")], "Returns the element at the current position.", na_first),
    NativeDef::prefix("append", &[arg("series"), arg("value")], "Appends a value at the tail.", na_append),
    NativeDef::prefix("insert", &[arg("series"), arg("value")], "Inserts a value at the current position.", na_insert),
    NativeDef::prefix("copy", &[arg("series")], "Copies a series from its current position.", na_copy),
    NativeDef::prefix("find", &[arg("series"), arg("value")], "Finds a value, returning the series at the match.", na_find),
    NativeDef::prefix("sort", &[arg("series")], "Sorts a series in place from its current position.", na_sort),
    NativeDef::prefix("reverse", &[arg("series")], "Reverses a series in place.", na_reverse),
    NativeDef::prefix("take", &[arg("series")], "Removes and returns the element at the position.", na_take),
    NativeDef::prefix("remove", &[arg("series")], "Removes the element at the position.", na_remove),
    NativeDef::prefix(
        "skip",
        &[arg("series"), arg_of("offset", Kind::Integer)],
        "Returns the series with its position moved by an offset.",
        na_skip,
    ),
    NativeDef::prefix("next", &[arg("series")], "Returns the series at its next position.", na_next),
    NativeDef::prefix("change", &[arg("series"), arg("value")], "Replaces the element at the current position.", na_change),
    NativeDef::prefix(
        "poke",
        &[arg("series"), arg_of("index", Kind::Integer), arg("value")],
        "Replaces the element at a one-based index.",
        na_poke,
    ),
    NativeDef::prefix(
        "pick",
        &[arg("series"), arg_of("index", Kind::Integer)],
        "Returns the element at a one-based index, or none.",
        na_pick,
    ),
    NativeDef::prefix("head", &[arg("series")], "Returns the series at its head.", na_head),
    NativeDef::prefix("length?", &[arg("series")], "Counts elements from the current position.", na_length),
    NativeDef::prefix("empty?", &[arg("series")], "True when nothing remains at the position.", na_empty),
];

/// Registers the per-type implementation tables.
pub(crate) fn register_actions(actions: &mut Actions) {
    use StaticSymbols as S;
    for kind in [Kind::Block, Kind::Paren] {
        let table: &[(S, NativeImpl)] = &[
            (S::First, block_first),
            (S::Append, block_append),
            (S::Insert, block_insert),
            (S::Copy, block_copy),
            (S::Find, block_find),
            (S::Select, block_select),
            (S::Sort, block_sort),
            (S::Reverse, block_reverse),
            (S::Take, block_take),
            (S::Remove, block_remove),
            (S::Skip, series_skip),
            (S::Next, series_next),
            (S::Head, series_head),
            (S::Change, block_change),
            (S::Poke, block_poke),
            (S::Pick, block_pick),
            (S::Length, series_length),
            (S::Empty, series_empty),
        ];
        for (op, func) in table {
            actions.register(kind, *op, *func);
        }
    }
    let string_table: &[(S, NativeImpl)] = &[
        (S::First, str_first),
        (S::Append, str_append),
        (S::Insert, str_insert),
        (S::Copy, str_copy),
        (S::Find, str_find),
        (S::Sort, str_sort),
        (S::Reverse, str_reverse),
        (S::Take, str_take),
        (S::Remove, str_remove),
        (S::Skip, series_skip),
        (S::Next, series_next),
        (S::Head, series_head),
        (S::Change, str_change),
        (S::Poke, str_poke),
        (S::Pick, str_pick),
        (S::Length, series_length),
        (S::Empty, series_empty),
    ];
    for (op, func) in string_table {
        actions.register(Kind::String, *op, *func);
    }
    let binary_table: &[(S, NativeImpl)] = &[
        (S::First, bin_first),
        (S::Append, bin_append),
        (S::Insert, bin_insert),
        (S::Copy, bin_copy),
        (S::Find, bin_find),
        (S::Sort, bin_sort),
        (S::Reverse, bin_reverse),
        (S::Take, bin_take),
        (S::Remove, bin_remove),
        (S::Skip, series_skip),
        (S::Next, series_next),
        (S::Head, series_head),
        (S::Change, bin_change),
        (S::Poke, bin_poke),
        (S::Pick, bin_pick),
        (S::Length, series_length),
        (S::Empty, series_empty),
    ];
    for (op, func) in binary_table {
        actions.register(Kind::Binary, *op, *func);
    }
    let object_table: &[(S, NativeImpl)] = &[
        (S::Select, object_select),
        (S::Put, object_put),
        (S::Find, object_find),
        (S::Length, object_length),
        (S::Empty, object_empty),
    ];
    for (op, func) in object_table {
        actions.register(Kind::Object, *op, *func);
    }
    let bitset_table: &[(S, NativeImpl)] = &[(S::Find, bitset_find), (S::Insert, bitset_insert), (S::Length, bitset_length)];
    for (op, func) in bitset_table {
        actions.register(Kind::Bitset, *op, *func);
    }
}

// ---------------------------------------------------------------------------
// Shared handle plumbing
// ---------------------------------------------------------------------------

/// The handle slot and its (buffer, cursor) pair for any series value.
fn series_parts(heap: &Heap, value: &Value) -> RunResult<(HeapId, HeapId, usize)> {
    if let Value::Ref(id) = value {
        match heap.get(*id) {
            HeapData::Str(h) | HeapData::Binary(h) | HeapData::Block(h) | HeapData::Paren(h) => {
                return Ok((*id, h.buf, h.cursor));
            }
            _ => {}
        }
    }
    Err(ErrorValue::type_mismatch("series", value.kind(heap)))
}

/// Allocates a handle of the same series kind as `like`, sharing `buf` at
/// `cursor`.
fn alloc_like(heap: &mut Heap, like: HeapId, buf: HeapId, cursor: usize) -> Value {
    heap.inc_ref(buf);
    let handle = SeriesHandle { buf, cursor };
    let data = match heap.get(like) {
        HeapData::Str(_) => HeapData::Str(handle),
        HeapData::Binary(_) => HeapData::Binary(handle),
        HeapData::Paren(_) => HeapData::Paren(handle),
        _ => HeapData::Block(handle),
    };
    Value::Ref(heap.allocate(data))
}

fn buf_len(heap: &Heap, buf: HeapId) -> usize {
    match heap.get(buf) {
        HeapData::BlockBuf(b) => b.values.len(),
        HeapData::StrBuf(s) => s.chars().count(),
        HeapData::BinBuf(b) => b.len(),
        _ => 0,
    }
}

/// `skip`, `next`, `head`: new handle at the adjusted position.
fn series_skip(ev: &mut Evaluator<'_>, args: ArgValues, _refs: &mut Refinements) -> RunResult<Value> {
    let (series, offset) = args.get_two("skip", ev.heap)?;
    let offset = match offset {
        Value::Int(offset) => offset,
        other => {
            let kind = other.kind(ev.heap);
            other.drop_with_heap(ev.heap);
            series.drop_with_heap(ev.heap);
            return Err(ErrorValue::type_mismatch("integer!", kind));
        }
    };
    let moved = skip_by(ev.heap, &series, offset);
    series.drop_with_heap(ev.heap);
    moved
}

fn series_next(ev: &mut Evaluator<'_>, args: ArgValues, _refs: &mut Refinements) -> RunResult<Value> {
    let series = args.get_one("next", ev.heap)?;
    let moved = skip_by(ev.heap, &series, 1);
    series.drop_with_heap(ev.heap);
    moved
}

fn skip_by(heap: &mut Heap, series: &Value, offset: i64) -> RunResult<Value> {
    let (handle, buf, cursor) = series_parts(heap, series)?;
    let len = buf_len(heap, buf);
    let target = i64::try_from(cursor.min(len)).unwrap_or(i64::MAX).saturating_add(offset);
    let cursor = usize::try_from(target.max(0)).unwrap_or(0).min(len);
    Ok(alloc_like(heap, handle, buf, cursor))
}

fn series_head(ev: &mut Evaluator<'_>, args: ArgValues, _refs: &mut Refinements) -> RunResult<Value> {
    let series = args.get_one("head", ev.heap)?;
    let parts = series_parts(ev.heap, &series);
    let result = parts.map(|(handle, buf, _)| alloc_like(ev.heap, handle, buf, 0));
    series.drop_with_heap(ev.heap);
    result
}

fn series_length(ev: &mut Evaluator<'_>, args: ArgValues, _refs: &mut Refinements) -> RunResult<Value> {
    let series = args.get_one("length?", ev.heap)?;
    let parts = series_parts(ev.heap, &series);
    let result = parts.map(|(_, buf, cursor)| {
        let len = buf_len(ev.heap, buf);
        Value::Int(i64::try_from(len.saturating_sub(cursor)).unwrap_or(i64::MAX))
    });
    series.drop_with_heap(ev.heap);
    result
}

fn series_empty(ev: &mut Evaluator<'_>, args: ArgValues, _refs: &mut Refinements) -> RunResult<Value> {
    let series = args.get_one("empty?", ev.heap)?;
    let parts = series_parts(ev.heap, &series);
    let result = parts.map(|(_, buf, cursor)| Value::Logic(cursor >= buf_len(ev.heap, buf)));
    series.drop_with_heap(ev.heap);
    result
}

// ---------------------------------------------------------------------------
// Block / paren implementations
// ---------------------------------------------------------------------------

/// The element values of a block buffer, for read-only scans.
fn block_values(heap: &Heap, buf: HeapId) -> &Vec<Value> {
    match heap.get(buf) {
        HeapData::BlockBuf(b) => &b.values,
        _ => panic!("block handle must point at a block buffer"),
    }
}

fn block_first(ev: &mut Evaluator<'_>, args: ArgValues, _refs: &mut Refinements) -> RunResult<Value> {
    let series = args.get_one("first", ev.heap)?;
    let (_, buf, cursor) = series_parts(ev.heap, &series)?;
    let values = block_values(ev.heap, buf);
    let result = match values.get(cursor) {
        Some(element) => Ok(element.clone_with_heap(ev.heap)),
        None => Err(ErrorValue::empty_series("first")),
    };
    series.drop_with_heap(ev.heap);
    result
}

fn block_append(ev: &mut Evaluator<'_>, args: ArgValues, _refs: &mut Refinements) -> RunResult<Value> {
    let (series, value) = args.get_two("append", ev.heap)?;
    let (_, buf, _) = series_parts(ev.heap, &series)?;
    let HeapData::BlockBuf(b) = ev.heap.get_mut(buf) else {
        value.drop_with_heap(ev.heap);
        series.drop_with_heap(ev.heap);
        return Err(ErrorValue::invalid_operation("append target has no buffer"));
    };
    b.values.push(value);
    b.locs = None;
    Ok(series)
}

fn block_insert(ev: &mut Evaluator<'_>, args: ArgValues, _refs: &mut Refinements) -> RunResult<Value> {
    let (series, value) = args.get_two("insert", ev.heap)?;
    let (_, buf, cursor) = series_parts(ev.heap, &series)?;
    let HeapData::BlockBuf(b) = ev.heap.get_mut(buf) else {
        value.drop_with_heap(ev.heap);
        series.drop_with_heap(ev.heap);
        return Err(ErrorValue::invalid_operation("insert target has no buffer"));
    };
    let at = cursor.min(b.values.len());
    b.values.insert(at, value);
    b.locs = None;
    Ok(series)
}

fn block_copy(ev: &mut Evaluator<'_>, args: ArgValues, _refs: &mut Refinements) -> RunResult<Value> {
    let series = args.get_one("copy", ev.heap)?;
    let (handle, buf, cursor) = series_parts(ev.heap, &series)?;
    let values = block_values(ev.heap, buf);
    let copied: Vec<Value> = values[cursor.min(values.len())..]
        .iter()
        .map(|v| v.clone_with_heap(ev.heap))
        .collect();
    let is_paren = matches!(ev.heap.get(handle), HeapData::Paren(_));
    series.drop_with_heap(ev.heap);
    let fresh = crate::heap::BlockBuf::new(copied);
    Ok(if is_paren {
        ev.heap.alloc_paren(fresh)
    } else {
        ev.heap.alloc_block(fresh)
    })
}

fn block_find(ev: &mut Evaluator<'_>, args: ArgValues, _refs: &mut Refinements) -> RunResult<Value> {
    let (series, value) = args.get_two("find", ev.heap)?;
    let (handle, buf, cursor) = series_parts(ev.heap, &series)?;
    let values = block_values(ev.heap, buf);
    let found = values[cursor.min(values.len())..]
        .iter()
        .position(|element| element.equals(&value, ev.heap))
        .map(|offset| cursor + offset);
    value.drop_with_heap(ev.heap);
    // Allocate the positioned handle before releasing the argument: the
    // argument may hold the last reference to the buffer.
    let result = match found {
        Some(at) => alloc_like(ev.heap, handle, buf, at),
        None => Value::None,
    };
    series.drop_with_heap(ev.heap);
    Ok(result)
}

/// Block `select`: find the value, return the element after it.
pub(crate) fn select_in_block(heap: &Heap, series: HeapId, needle: &Value) -> Value {
    let (HeapData::Block(h) | HeapData::Paren(h)) = heap.get(series) else {
        return Value::None;
    };
    let (buf, cursor) = (h.buf, h.cursor);
    let values = block_values(heap, buf);
    let rest = &values[cursor.min(values.len())..];
    for (i, element) in rest.iter().enumerate() {
        if element.equals(needle, heap) {
            return match rest.get(i + 1) {
                Some(next) => next.clone_with_heap(heap),
                None => Value::None,
            };
        }
    }
    Value::None
}

fn block_select(ev: &mut Evaluator<'_>, args: ArgValues, refs: &mut Refinements) -> RunResult<Value> {
    let (series, value) = args.get_two("select", ev.heap)?;
    let Value::Ref(id) = &series else {
        value.drop_with_heap(ev.heap);
        series.drop_with_heap(ev.heap);
        return Err(ErrorValue::type_mismatch("block!", Kind::None));
    };
    let mut found = select_in_block(ev.heap, *id, &value);
    value.drop_with_heap(ev.heap);
    series.drop_with_heap(ev.heap);
    if matches!(found, Value::None)
        && let Some(default) = refs.take(StaticSymbols::Default.into())
    {
        found = default;
    }
    Ok(found)
}

fn block_sort(ev: &mut Evaluator<'_>, args: ArgValues, _refs: &mut Refinements) -> RunResult<Value> {
    let series = args.get_one("sort", ev.heap)?;
    let (_, buf, cursor) = series_parts(ev.heap, &series)?;
    // The buffer is taken out for the sort because element comparison needs
    // heap reads (decimals, strings) the borrow rules would otherwise deny.
    let mut values = match ev.heap.get_mut(buf) {
        HeapData::BlockBuf(b) => {
            b.locs = None;
            std::mem::take(&mut b.values)
        }
        _ => Vec::new(),
    };
    let start = cursor.min(values.len());
    let mut comparable = true;
    values[start..].sort_by(|a, b| match value_cmp(a, b, ev.heap) {
        Some(ordering) => ordering,
        None => {
            comparable = false;
            Ordering::Equal
        }
    });
    if let HeapData::BlockBuf(b) = ev.heap.get_mut(buf) {
        b.values = values;
    }
    if comparable {
        Ok(series)
    } else {
        series.drop_with_heap(ev.heap);
        Err(ErrorValue::not_comparable(Kind::Block, Kind::Block))
    }
}

fn block_reverse(ev: &mut Evaluator<'_>, args: ArgValues, _refs: &mut Refinements) -> RunResult<Value> {
    let series = args.get_one("reverse", ev.heap)?;
    let (_, buf, cursor) = series_parts(ev.heap, &series)?;
    if let HeapData::BlockBuf(b) = ev.heap.get_mut(buf) {
        let start = cursor.min(b.values.len());
        b.values[start..].reverse();
        b.locs = None;
    }
    Ok(series)
}

fn block_take(ev: &mut Evaluator<'_>, args: ArgValues, _refs: &mut Refinements) -> RunResult<Value> {
    let series = args.get_one("take", ev.heap)?;
    let (_, buf, cursor) = series_parts(ev.heap, &series)?;
    let taken = match ev.heap.get_mut(buf) {
        HeapData::BlockBuf(b) if cursor < b.values.len() => {
            b.locs = None;
            Some(b.values.remove(cursor))
        }
        _ => None,
    };
    series.drop_with_heap(ev.heap);
    Ok(taken.unwrap_or(Value::None))
}

fn block_remove(ev: &mut Evaluator<'_>, args: ArgValues, _refs: &mut Refinements) -> RunResult<Value> {
    let series = args.get_one("remove", ev.heap)?;
    let (_, buf, cursor) = series_parts(ev.heap, &series)?;
    let removed = match ev.heap.get_mut(buf) {
        HeapData::BlockBuf(b) if cursor < b.values.len() => {
            b.locs = None;
            Some(b.values.remove(cursor))
        }
        _ => None,
    };
    if let Some(removed) = removed {
        removed.drop_with_heap(ev.heap);
    }
    Ok(series)
}

fn block_change(ev: &mut Evaluator<'_>, args: ArgValues, _refs: &mut Refinements) -> RunResult<Value> {
    let (series, value) = args.get_two("change", ev.heap)?;
    let (_, buf, cursor) = series_parts(ev.heap, &series)?;
    let old = match ev.heap.get_mut(buf) {
        HeapData::BlockBuf(b) => {
            b.locs = None;
            if cursor < b.values.len() {
                Some(std::mem::replace(&mut b.values[cursor], value))
            } else {
                b.values.push(value);
                None
            }
        }
        _ => Some(value),
    };
    if let Some(old) = old {
        old.drop_with_heap(ev.heap);
    }
    Ok(series)
}

fn block_poke(ev: &mut Evaluator<'_>, args: ArgValues, _refs: &mut Refinements) -> RunResult<Value> {
    let (series, index, value) = args.get_three("poke", ev.heap)?;
    let (_, buf, cursor) = series_parts(ev.heap, &series)?;
    let index = match index {
        Value::Int(index) => index,
        other => {
            let kind = other.kind(ev.heap);
            other.drop_with_heap(ev.heap);
            value.drop_with_heap(ev.heap);
            series.drop_with_heap(ev.heap);
            return Err(ErrorValue::type_mismatch("integer!", kind));
        }
    };
    let remaining = buf_len(ev.heap, buf).saturating_sub(cursor);
    let slot = match slot_for_index(index, cursor, remaining) {
        Ok(slot) => slot,
        Err(err) => {
            value.drop_with_heap(ev.heap);
            series.drop_with_heap(ev.heap);
            return Err(err);
        }
    };
    let result = value.clone_with_heap(ev.heap);
    let old = match ev.heap.get_mut(buf) {
        HeapData::BlockBuf(b) => {
            b.locs = None;
            Some(std::mem::replace(&mut b.values[slot], value))
        }
        _ => Some(value),
    };
    if let Some(old) = old {
        old.drop_with_heap(ev.heap);
    }
    series.drop_with_heap(ev.heap);
    Ok(result)
}

fn block_pick(ev: &mut Evaluator<'_>, args: ArgValues, _refs: &mut Refinements) -> RunResult<Value> {
    let (series, index) = args.get_two("pick", ev.heap)?;
    let index = match index {
        Value::Int(index) => index,
        other => {
            let kind = other.kind(ev.heap);
            other.drop_with_heap(ev.heap);
            series.drop_with_heap(ev.heap);
            return Err(ErrorValue::type_mismatch("integer!", kind));
        }
    };
    let result = match &series {
        Value::Ref(id) => pick_series(ev.heap, *id, index),
        _ => Value::None,
    };
    series.drop_with_heap(ev.heap);
    Ok(result)
}

/// One-based `pick` shared by the action and by path indexing. Out-of-range
/// indexes produce `none`; picking from a string yields a one-character
/// string.
pub(crate) fn pick_series(heap: &mut Heap, series: HeapId, index: i64) -> Value {
    if index < 1 {
        return Value::None;
    }
    let offset = usize::try_from(index - 1).unwrap_or(usize::MAX);
    match heap.get(series) {
        HeapData::Block(h) | HeapData::Paren(h) => {
            let values = block_values(heap, h.buf);
            match values.get(h.cursor.min(values.len()).saturating_add(offset)) {
                Some(element) => element.clone_with_heap(heap),
                None => Value::None,
            }
        }
        HeapData::Str(h) => {
            let picked = value::str_remainder(heap, h).chars().nth(offset);
            match picked {
                Some(c) => heap.alloc_string(c.to_string()),
                None => Value::None,
            }
        }
        HeapData::Binary(h) => value::bin_remainder(heap, h)
            .get(offset)
            .map_or(Value::None, |byte| Value::Int(i64::from(*byte))),
        _ => Value::None,
    }
}

/// Maps a one-based index from the cursor to an absolute buffer slot.
fn slot_for_index(index: i64, cursor: usize, remaining: usize) -> RunResult<usize> {
    if index < 1 || usize::try_from(index).is_ok_and(|i| i > remaining) {
        return Err(ErrorValue::index_out_of_range(index, remaining));
    }
    Ok(cursor + usize::try_from(index - 1).expect("index checked positive"))
}

// ---------------------------------------------------------------------------
// String implementations (cursors count characters)
// ---------------------------------------------------------------------------

fn str_text<'h>(heap: &'h Heap, buf: HeapId) -> &'h str {
    match heap.get(buf) {
        HeapData::StrBuf(text) => text,
        _ => panic!("string handle must point at a string buffer"),
    }
}

/// Byte offset of the `chars`-th character in `text` (clamped to the end).
fn byte_at_char(text: &str, chars: usize) -> usize {
    text.char_indices().nth(chars).map_or(text.len(), |(i, _)| i)
}

fn str_first(ev: &mut Evaluator<'_>, args: ArgValues, _refs: &mut Refinements) -> RunResult<Value> {
    let series = args.get_one("first", ev.heap)?;
    let (_, buf, cursor) = series_parts(ev.heap, &series)?;
    let first = str_text(ev.heap, buf).chars().nth(cursor);
    series.drop_with_heap(ev.heap);
    match first {
        Some(c) => Ok(ev.heap.alloc_string(c.to_string())),
        None => Err(ErrorValue::empty_series("first")),
    }
}

fn str_append(ev: &mut Evaluator<'_>, args: ArgValues, _refs: &mut Refinements) -> RunResult<Value> {
    let (series, value) = args.get_two("append", ev.heap)?;
    let (_, buf, _) = series_parts(ev.heap, &series)?;
    let formed = value::form(&value, ev.heap, ev.frames, ev.interns);
    value.drop_with_heap(ev.heap);
    if let HeapData::StrBuf(text) = ev.heap.get_mut(buf) {
        text.push_str(&formed);
    }
    Ok(series)
}

fn str_insert(ev: &mut Evaluator<'_>, args: ArgValues, _refs: &mut Refinements) -> RunResult<Value> {
    let (series, value) = args.get_two("insert", ev.heap)?;
    let (_, buf, cursor) = series_parts(ev.heap, &series)?;
    let formed = value::form(&value, ev.heap, ev.frames, ev.interns);
    value.drop_with_heap(ev.heap);
    if let HeapData::StrBuf(text) = ev.heap.get_mut(buf) {
        let at = byte_at_char(text, cursor);
        text.insert_str(at, &formed);
    }
    Ok(series)
}

fn str_copy(ev: &mut Evaluator<'_>, args: ArgValues, _refs: &mut Refinements) -> RunResult<Value> {
    let series = args.get_one("copy", ev.heap)?;
    let (_, buf, cursor) = series_parts(ev.heap, &series)?;
    let text = str_text(ev.heap, buf);
    let copied = text[byte_at_char(text, cursor)..].to_owned();
    series.drop_with_heap(ev.heap);
    Ok(ev.heap.alloc_string(copied))
}

fn str_find(ev: &mut Evaluator<'_>, args: ArgValues, _refs: &mut Refinements) -> RunResult<Value> {
    let (series, value) = args.get_two("find", ev.heap)?;
    let (handle, buf, cursor) = series_parts(ev.heap, &series)?;
    let needle = value::form(&value, ev.heap, ev.frames, ev.interns);
    value.drop_with_heap(ev.heap);
    let text = str_text(ev.heap, buf);
    let rest = &text[byte_at_char(text, cursor)..];
    let found = rest
        .find(&needle)
        .map(|byte_idx| cursor + rest[..byte_idx].chars().count());
    let result = match found {
        Some(at) => alloc_like(ev.heap, handle, buf, at),
        None => Value::None,
    };
    series.drop_with_heap(ev.heap);
    Ok(result)
}

/// Rebuilds the buffer tail from `cursor` with `rework` applied to its
/// characters.
fn str_rework_tail(ev: &mut Evaluator<'_>, buf: HeapId, cursor: usize, rework: fn(&mut Vec<char>)) {
    if let HeapData::StrBuf(text) = ev.heap.get_mut(buf) {
        let at = byte_at_char(text, cursor);
        let mut tail: Vec<char> = text[at..].chars().collect();
        rework(&mut tail);
        text.truncate(at);
        text.extend(tail);
    }
}

fn str_sort(ev: &mut Evaluator<'_>, args: ArgValues, _refs: &mut Refinements) -> RunResult<Value> {
    let series = args.get_one("sort", ev.heap)?;
    let (_, buf, cursor) = series_parts(ev.heap, &series)?;
    str_rework_tail(ev, buf, cursor, |chars| chars.sort_unstable());
    Ok(series)
}

fn str_reverse(ev: &mut Evaluator<'_>, args: ArgValues, _refs: &mut Refinements) -> RunResult<Value> {
    let series = args.get_one("reverse", ev.heap)?;
    let (_, buf, cursor) = series_parts(ev.heap, &series)?;
    str_rework_tail(ev, buf, cursor, |chars| chars.reverse());
    Ok(series)
}

fn str_take(ev: &mut Evaluator<'_>, args: ArgValues, _refs: &mut Refinements) -> RunResult<Value> {
    let series = args.get_one("take", ev.heap)?;
    let (_, buf, cursor) = series_parts(ev.heap, &series)?;
    let taken = match ev.heap.get_mut(buf) {
        HeapData::StrBuf(text) => {
            let at = byte_at_char(text, cursor);
            let first = text[at..].chars().next();
            if first.is_some() {
                text.remove(at);
            }
            first
        }
        _ => None,
    };
    series.drop_with_heap(ev.heap);
    Ok(match taken {
        Some(c) => ev.heap.alloc_string(c.to_string()),
        None => Value::None,
    })
}

fn str_remove(ev: &mut Evaluator<'_>, args: ArgValues, _refs: &mut Refinements) -> RunResult<Value> {
    let series = args.get_one("remove", ev.heap)?;
    let (_, buf, cursor) = series_parts(ev.heap, &series)?;
    if let HeapData::StrBuf(text) = ev.heap.get_mut(buf) {
        let at = byte_at_char(text, cursor);
        if at < text.len() {
            text.remove(at);
        }
    }
    Ok(series)
}

/// `change` on strings overwrites characters at the position with the
/// formed text, extending the buffer when the new text runs past the tail.
fn str_change(ev: &mut Evaluator<'_>, args: ArgValues, _refs: &mut Refinements) -> RunResult<Value> {
    let (series, value) = args.get_two("change", ev.heap)?;
    let (_, buf, cursor) = series_parts(ev.heap, &series)?;
    let formed = value::form(&value, ev.heap, ev.frames, ev.interns);
    value.drop_with_heap(ev.heap);
    if let HeapData::StrBuf(text) = ev.heap.get_mut(buf) {
        let start = byte_at_char(text, cursor);
        let overwritten = formed.chars().count();
        let end = byte_at_char(text, cursor + overwritten).max(start);
        text.replace_range(start..end, &formed);
    }
    Ok(series)
}

fn str_poke(ev: &mut Evaluator<'_>, args: ArgValues, _refs: &mut Refinements) -> RunResult<Value> {
    let (series, index, value) = args.get_three("poke", ev.heap)?;
    let (_, buf, cursor) = series_parts(ev.heap, &series)?;
    let index = match index {
        Value::Int(index) => index,
        other => {
            let kind = other.kind(ev.heap);
            other.drop_with_heap(ev.heap);
            value.drop_with_heap(ev.heap);
            series.drop_with_heap(ev.heap);
            return Err(ErrorValue::type_mismatch("integer!", kind));
        }
    };
    let c = match poke_char(ev.heap, &value) {
        Ok(c) => c,
        Err(err) => {
            value.drop_with_heap(ev.heap);
            series.drop_with_heap(ev.heap);
            return Err(err);
        }
    };
    let remaining = str_text(ev.heap, buf).chars().count().saturating_sub(cursor);
    let slot = match slot_for_index(index, cursor, remaining) {
        Ok(slot) => slot,
        Err(err) => {
            value.drop_with_heap(ev.heap);
            series.drop_with_heap(ev.heap);
            return Err(err);
        }
    };
    if let HeapData::StrBuf(text) = ev.heap.get_mut(buf) {
        let start = byte_at_char(text, slot);
        let end = byte_at_char(text, slot + 1);
        text.replace_range(start..end, &c.to_string());
    }
    series.drop_with_heap(ev.heap);
    Ok(value)
}

/// The replacement character for a string `poke`: a one-character string or
/// a character code.
fn poke_char(heap: &Heap, value: &Value) -> RunResult<char> {
    match value {
        Value::Int(code) => u32::try_from(*code)
            .ok()
            .and_then(char::from_u32)
            .ok_or_else(|| ErrorValue::invalid_arg(format!("{code} is not a character code"))),
        Value::Ref(id) => {
            if let HeapData::Str(h) = heap.get(*id) {
                let mut chars = value::str_remainder(heap, h).chars();
                if let (Some(c), None) = (chars.next(), chars.next()) {
                    return Ok(c);
                }
            }
            Err(ErrorValue::invalid_arg("poke replacement must be one character"))
        }
        other => Err(ErrorValue::type_mismatch("string!", other.kind(heap))),
    }
}

fn str_pick(ev: &mut Evaluator<'_>, args: ArgValues, refs: &mut Refinements) -> RunResult<Value> {
    block_pick(ev, args, refs)
}

// ---------------------------------------------------------------------------
// Binary implementations (byte buffers; elements are integers 0..=255)
// ---------------------------------------------------------------------------

fn bin_bytes<'h>(heap: &'h Heap, buf: HeapId) -> &'h [u8] {
    match heap.get(buf) {
        HeapData::BinBuf(bytes) => bytes,
        _ => panic!("binary handle must point at a byte buffer"),
    }
}

/// A binary element value; rejects integers outside `0..=255`.
fn byte_of(heap: &Heap, value: &Value) -> RunResult<u8> {
    match value {
        Value::Int(byte) => {
            u8::try_from(*byte).map_err(|_| ErrorValue::invalid_arg(format!("{byte} is out of byte range 0..255")))
        }
        other => Err(ErrorValue::type_mismatch("integer!", other.kind(heap))),
    }
}

fn bin_first(ev: &mut Evaluator<'_>, args: ArgValues, _refs: &mut Refinements) -> RunResult<Value> {
    let series = args.get_one("first", ev.heap)?;
    let (_, buf, cursor) = series_parts(ev.heap, &series)?;
    let first = bin_bytes(ev.heap, buf).get(cursor).copied();
    series.drop_with_heap(ev.heap);
    first.map(|byte| Value::Int(i64::from(byte))).ok_or_else(|| ErrorValue::empty_series("first"))
}

/// `append` on binaries takes a byte or splices another binary's remainder.
fn bin_append(ev: &mut Evaluator<'_>, args: ArgValues, _refs: &mut Refinements) -> RunResult<Value> {
    let (series, value) = args.get_two("append", ev.heap)?;
    let (_, buf, _) = series_parts(ev.heap, &series)?;
    let spliced: Option<Vec<u8>> = match &value {
        Value::Ref(id) => match ev.heap.get(*id) {
            HeapData::Binary(h) => Some(value::bin_remainder(ev.heap, h).to_vec()),
            _ => None,
        },
        _ => None,
    };
    let bytes = match spliced {
        Some(bytes) => bytes,
        None => match byte_of(ev.heap, &value) {
            Ok(byte) => vec![byte],
            Err(err) => {
                value.drop_with_heap(ev.heap);
                series.drop_with_heap(ev.heap);
                return Err(err);
            }
        },
    };
    value.drop_with_heap(ev.heap);
    if let HeapData::BinBuf(b) = ev.heap.get_mut(buf) {
        b.extend_from_slice(&bytes);
    }
    Ok(series)
}

fn bin_insert(ev: &mut Evaluator<'_>, args: ArgValues, _refs: &mut Refinements) -> RunResult<Value> {
    let (series, value) = args.get_two("insert", ev.heap)?;
    let (_, buf, cursor) = series_parts(ev.heap, &series)?;
    let byte = match byte_of(ev.heap, &value) {
        Ok(byte) => byte,
        Err(err) => {
            value.drop_with_heap(ev.heap);
            series.drop_with_heap(ev.heap);
            return Err(err);
        }
    };
    value.drop_with_heap(ev.heap);
    if let HeapData::BinBuf(b) = ev.heap.get_mut(buf) {
        let at = cursor.min(b.len());
        b.insert(at, byte);
    }
    Ok(series)
}

fn bin_copy(ev: &mut Evaluator<'_>, args: ArgValues, _refs: &mut Refinements) -> RunResult<Value> {
    let series = args.get_one("copy", ev.heap)?;
    let (_, buf, cursor) = series_parts(ev.heap, &series)?;
    let bytes = bin_bytes(ev.heap, buf);
    let copied = bytes[cursor.min(bytes.len())..].to_vec();
    series.drop_with_heap(ev.heap);
    Ok(ev.heap.alloc_binary(copied))
}

fn bin_find(ev: &mut Evaluator<'_>, args: ArgValues, _refs: &mut Refinements) -> RunResult<Value> {
    let (series, value) = args.get_two("find", ev.heap)?;
    let (handle, buf, cursor) = series_parts(ev.heap, &series)?;
    let needle: Vec<u8> = match &value {
        Value::Ref(id) => match ev.heap.get(*id) {
            HeapData::Binary(h) => value::bin_remainder(ev.heap, h).to_vec(),
            _ => Vec::new(),
        },
        Value::Int(_) => match byte_of(ev.heap, &value) {
            Ok(byte) => vec![byte],
            Err(err) => {
                value.drop_with_heap(ev.heap);
                series.drop_with_heap(ev.heap);
                return Err(err);
            }
        },
        _ => Vec::new(),
    };
    value.drop_with_heap(ev.heap);
    let found = if needle.is_empty() {
        None
    } else {
        let bytes = bin_bytes(ev.heap, buf);
        let rest = &bytes[cursor.min(bytes.len())..];
        rest.windows(needle.len()).position(|window| window == needle).map(|i| cursor + i)
    };
    let result = match found {
        Some(at) => alloc_like(ev.heap, handle, buf, at),
        None => Value::None,
    };
    series.drop_with_heap(ev.heap);
    Ok(result)
}

fn bin_sort(ev: &mut Evaluator<'_>, args: ArgValues, _refs: &mut Refinements) -> RunResult<Value> {
    let series = args.get_one("sort", ev.heap)?;
    let (_, buf, cursor) = series_parts(ev.heap, &series)?;
    if let HeapData::BinBuf(b) = ev.heap.get_mut(buf) {
        let start = cursor.min(b.len());
        b[start..].sort_unstable();
    }
    Ok(series)
}

fn bin_reverse(ev: &mut Evaluator<'_>, args: ArgValues, _refs: &mut Refinements) -> RunResult<Value> {
    let series = args.get_one("reverse", ev.heap)?;
    let (_, buf, cursor) = series_parts(ev.heap, &series)?;
    if let HeapData::BinBuf(b) = ev.heap.get_mut(buf) {
        let start = cursor.min(b.len());
        b[start..].reverse();
    }
    Ok(series)
}

fn bin_take(ev: &mut Evaluator<'_>, args: ArgValues, _refs: &mut Refinements) -> RunResult<Value> {
    let series = args.get_one("take", ev.heap)?;
    let (_, buf, cursor) = series_parts(ev.heap, &series)?;
    let taken = match ev.heap.get_mut(buf) {
        HeapData::BinBuf(b) if cursor < b.len() => Some(b.remove(cursor)),
        _ => None,
    };
    series.drop_with_heap(ev.heap);
    Ok(taken.map_or(Value::None, |byte| Value::Int(i64::from(byte))))
}

fn bin_remove(ev: &mut Evaluator<'_>, args: ArgValues, _refs: &mut Refinements) -> RunResult<Value> {
    let series = args.get_one("remove", ev.heap)?;
    let (_, buf, cursor) = series_parts(ev.heap, &series)?;
    if let HeapData::BinBuf(b) = ev.heap.get_mut(buf)
        && cursor < b.len()
    {
        b.remove(cursor);
    }
    Ok(series)
}

/// `change` on binaries overwrites the byte at the position, appending when
/// the cursor sits at the tail.
fn bin_change(ev: &mut Evaluator<'_>, args: ArgValues, _refs: &mut Refinements) -> RunResult<Value> {
    let (series, value) = args.get_two("change", ev.heap)?;
    let (_, buf, cursor) = series_parts(ev.heap, &series)?;
    let byte = match byte_of(ev.heap, &value) {
        Ok(byte) => byte,
        Err(err) => {
            value.drop_with_heap(ev.heap);
            series.drop_with_heap(ev.heap);
            return Err(err);
        }
    };
    value.drop_with_heap(ev.heap);
    if let HeapData::BinBuf(b) = ev.heap.get_mut(buf) {
        if cursor < b.len() {
            b[cursor] = byte;
        } else {
            b.push(byte);
        }
    }
    Ok(series)
}

fn bin_poke(ev: &mut Evaluator<'_>, args: ArgValues, _refs: &mut Refinements) -> RunResult<Value> {
    let (series, index, value) = args.get_three("poke", ev.heap)?;
    let (_, buf, cursor) = series_parts(ev.heap, &series)?;
    let index = match index {
        Value::Int(index) => index,
        other => {
            let kind = other.kind(ev.heap);
            other.drop_with_heap(ev.heap);
            value.drop_with_heap(ev.heap);
            series.drop_with_heap(ev.heap);
            return Err(ErrorValue::type_mismatch("integer!", kind));
        }
    };
    let byte = match byte_of(ev.heap, &value) {
        Ok(byte) => byte,
        Err(err) => {
            value.drop_with_heap(ev.heap);
            series.drop_with_heap(ev.heap);
            return Err(err);
        }
    };
    let remaining = bin_bytes(ev.heap, buf).len().saturating_sub(cursor);
    let slot = match slot_for_index(index, cursor, remaining) {
        Ok(slot) => slot,
        Err(err) => {
            value.drop_with_heap(ev.heap);
            series.drop_with_heap(ev.heap);
            return Err(err);
        }
    };
    if let HeapData::BinBuf(b) = ev.heap.get_mut(buf) {
        b[slot] = byte;
    }
    series.drop_with_heap(ev.heap);
    Ok(value)
}

fn bin_pick(ev: &mut Evaluator<'_>, args: ArgValues, refs: &mut Refinements) -> RunResult<Value> {
    block_pick(ev, args, refs)
}

// ---------------------------------------------------------------------------
// Object implementations
// ---------------------------------------------------------------------------

/// `select obj 'field`: prototype-walking read; `--default` supplies the
/// miss value.
fn object_select(ev: &mut Evaluator<'_>, args: ArgValues, refs: &mut Refinements) -> RunResult<Value> {
    let (obj, field) = args.get_two("select", ev.heap)?;
    let result = {
        let symbol = field.word_symbol();
        match (&obj, symbol) {
            (Value::Ref(id), Some(symbol)) => {
                ev.trace_field_read(symbol);
                Ok(object::read_field(ev.heap, ev.frames, *id, symbol))
            }
            (_, None) => Err(ErrorValue::type_mismatch("word!", field.kind(ev.heap))),
            _ => Err(ErrorValue::type_mismatch("object!", obj.kind(ev.heap))),
        }
    };
    field.drop_with_heap(ev.heap);
    obj.drop_with_heap(ev.heap);
    match result? {
        Some(value) => Ok(value),
        None => Ok(refs.take(StaticSymbols::Default.into()).unwrap_or(Value::None)),
    }
}

/// `put obj 'field value`: manifest-checked write; returns the value.
fn object_put(ev: &mut Evaluator<'_>, args: ArgValues, _refs: &mut Refinements) -> RunResult<Value> {
    let (obj, field, value) = args.get_three("put", ev.heap)?;
    let Some(symbol) = field.word_symbol() else {
        let kind = field.kind(ev.heap);
        field.drop_with_heap(ev.heap);
        value.drop_with_heap(ev.heap);
        obj.drop_with_heap(ev.heap);
        return Err(ErrorValue::type_mismatch("word!", kind));
    };
    let Value::Ref(id) = &obj else {
        let kind = obj.kind(ev.heap);
        field.drop_with_heap(ev.heap);
        value.drop_with_heap(ev.heap);
        obj.drop_with_heap(ev.heap);
        return Err(ErrorValue::type_mismatch("object!", kind));
    };
    let id = *id;
    let result = value.clone_with_heap(ev.heap);
    let written = object::write_field(ev.heap, ev.frames, ev.interns, id, symbol, value);
    field.drop_with_heap(ev.heap);
    obj.drop_with_heap(ev.heap);
    match written {
        Ok(()) => {
            ev.trace_field_write(symbol);
            Ok(result)
        }
        Err(err) => {
            result.drop_with_heap(ev.heap);
            Err(err)
        }
    }
}

/// `find obj 'field`: true when the field exists in the object or its
/// prototype chain.
fn object_find(ev: &mut Evaluator<'_>, args: ArgValues, _refs: &mut Refinements) -> RunResult<Value> {
    let (obj, field) = args.get_two("find", ev.heap)?;
    let found = match (&obj, field.word_symbol()) {
        (Value::Ref(id), Some(symbol)) => {
            let mut current = Some(*id);
            let mut found = false;
            while let Some(object) = current {
                let HeapData::Object(data) = ev.heap.get(object) else { break };
                if ev.frames.get(data.frame).has_local(symbol) {
                    found = true;
                    break;
                }
                current = data.prototype;
            }
            Ok(found)
        }
        (_, None) => Err(ErrorValue::type_mismatch("word!", field.kind(ev.heap))),
        _ => Err(ErrorValue::type_mismatch("object!", obj.kind(ev.heap))),
    };
    field.drop_with_heap(ev.heap);
    obj.drop_with_heap(ev.heap);
    found.map(Value::Logic)
}

fn object_length(ev: &mut Evaluator<'_>, args: ArgValues, _refs: &mut Refinements) -> RunResult<Value> {
    let obj = args.get_one("length?", ev.heap)?;
    let len = match &obj {
        Value::Ref(id) => match ev.heap.get(*id) {
            HeapData::Object(data) => Some(data.manifest.len()),
            _ => None,
        },
        _ => None,
    };
    obj.drop_with_heap(ev.heap);
    len.map(|len| Value::Int(i64::try_from(len).unwrap_or(i64::MAX)))
        .ok_or_else(|| ErrorValue::type_mismatch("object!", Kind::None))
}

fn object_empty(ev: &mut Evaluator<'_>, args: ArgValues, refs: &mut Refinements) -> RunResult<Value> {
    match object_length(ev, args, refs)? {
        Value::Int(len) => Ok(Value::Logic(len == 0)),
        _ => Ok(Value::Logic(false)),
    }
}

// ---------------------------------------------------------------------------
// Bitset implementations
// ---------------------------------------------------------------------------

/// The probe bytes of a bitset operand: a byte-ranged integer or the
/// characters of a string.
fn bitset_probe_bytes(ev: &Evaluator<'_>, value: &Value) -> RunResult<Vec<u8>> {
    match value {
        Value::Int(_) => byte_of(ev.heap, value).map(|byte| vec![byte]),
        Value::Ref(id) => {
            if let HeapData::Str(h) = ev.heap.get(*id) {
                value::str_remainder(ev.heap, h)
                    .chars()
                    .map(|c| {
                        u8::try_from(u32::from(c))
                            .map_err(|_| ErrorValue::invalid_arg(format!("character {c:?} exceeds 255")))
                    })
                    .collect()
            } else {
                Err(ErrorValue::type_mismatch("string!", value.kind(ev.heap)))
            }
        }
        other => Err(ErrorValue::type_mismatch("string!", other.kind(ev.heap))),
    }
}

/// `find bitset value`: true when every probe byte is in the set.
fn bitset_find(ev: &mut Evaluator<'_>, args: ArgValues, _refs: &mut Refinements) -> RunResult<Value> {
    let (set, value) = args.get_two("find", ev.heap)?;
    let probe = bitset_probe_bytes(ev, &value);
    value.drop_with_heap(ev.heap);
    let result = match (&set, probe) {
        (Value::Ref(id), Ok(bytes)) => match ev.heap.get(*id) {
            HeapData::Bitset(bitset) => Ok(Value::Logic(!bytes.is_empty() && bytes.iter().all(|b| bitset.contains(*b)))),
            _ => Err(ErrorValue::type_mismatch("bitset!", set.kind(ev.heap))),
        },
        (_, Err(err)) => Err(err),
        _ => Err(ErrorValue::type_mismatch("bitset!", set.kind(ev.heap))),
    };
    set.drop_with_heap(ev.heap);
    result
}

/// `insert bitset value`: adds the probe bytes to the set.
fn bitset_insert(ev: &mut Evaluator<'_>, args: ArgValues, _refs: &mut Refinements) -> RunResult<Value> {
    let (set, value) = args.get_two("insert", ev.heap)?;
    let probe = bitset_probe_bytes(ev, &value);
    value.drop_with_heap(ev.heap);
    let bytes = match probe {
        Ok(bytes) => bytes,
        Err(err) => {
            set.drop_with_heap(ev.heap);
            return Err(err);
        }
    };
    if let Value::Ref(id) = &set
        && let HeapData::Bitset(bitset) = ev.heap.get_mut(*id)
    {
        for byte in bytes {
            bitset.set(byte);
        }
    }
    Ok(set)
}

fn bitset_length(ev: &mut Evaluator<'_>, args: ArgValues, _refs: &mut Refinements) -> RunResult<Value> {
    let set = args.get_one("length?", ev.heap)?;
    let count = match &set {
        Value::Ref(id) => match ev.heap.get(*id) {
            HeapData::Bitset(bitset) => Some(bitset.iter().count()),
            _ => None,
        },
        _ => None,
    };
    set.drop_with_heap(ev.heap);
    count
        .map(|count| Value::Int(i64::try_from(count).unwrap_or(i64::MAX)))
        .ok_or_else(|| ErrorValue::type_mismatch("bitset!", Kind::None))
}
