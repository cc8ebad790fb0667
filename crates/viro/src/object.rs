//! Objects: an owned frame, a manifest, and optional prototype chaining.
//!
//! Construction is shared by `object`, `context`, and `make`: collect the
//! field list from the spec block, pre-seed an object frame, then evaluate
//! the spec inside that frame so set-words fill the fields in declaration
//! order. Reads walk the prototype chain; writes are manifest-checked and
//! never add fields dynamically.

use indexmap::IndexMap;

use crate::{
    error::{ErrorValue, RunResult},
    eval::Evaluator,
    frame::{FrameId, Frames},
    heap::{Heap, HeapData, HeapId},
    intern::{StaticSymbols, SymbolId},
    value::{Kind, Value},
};

/// Payload of an object value.
#[derive(Debug)]
pub(crate) struct ObjectData {
    /// The owned frame (kind `Object`), pinned for the interpreter's
    /// lifetime once construction succeeds.
    pub frame: FrameId,
    /// Insertion-ordered field list with optional per-field type hints.
    pub manifest: IndexMap<SymbolId, Option<Kind>>,
    /// Non-owning-cycle prototype reference; refcounted because the
    /// prototype always exists before its dependents (the graph is a DAG).
    pub prototype: Option<HeapId>,
}

impl ObjectData {
    pub fn release(self, heap: &mut Heap) {
        if let Some(prototype) = self.prototype {
            heap.dec_ref(prototype);
        }
    }
}

/// Parent selection for the object's owned frame.
#[derive(Debug, Clone, Copy)]
pub(crate) enum ObjectParent {
    /// `context`: isolated, no enclosing scope.
    None,
    /// `object` / `make`: lexically enclosed by the caller's current frame.
    Caller,
}

/// Constructs an object from a spec block.
///
/// `prototype` is an already-owned reference (the caller has incremented its
/// refcount); it is released here on every failure path.
pub(crate) fn construct(
    ev: &mut Evaluator<'_>,
    spec: &Value,
    parent: ObjectParent,
    prototype: Option<HeapId>,
) -> RunResult<Value> {
    let result = construct_inner(ev, spec, parent, prototype);
    if result.is_err()
        && let Some(prototype) = prototype
    {
        ev.heap.dec_ref(prototype);
    }
    result
}

fn construct_inner(
    ev: &mut Evaluator<'_>,
    spec: &Value,
    parent: ObjectParent,
    prototype: Option<HeapId>,
) -> RunResult<Value> {
    let Value::Ref(spec_id) = spec else {
        return Err(ErrorValue::spec_unsupported(format!(
            "object spec must be a block, not {kind}",
            kind = spec.kind(ev.heap).type_name()
        )));
    };
    let HeapData::Block(handle) = ev.heap.get(*spec_id) else {
        return Err(ErrorValue::spec_unsupported(format!(
            "object spec must be a block, not {kind}",
            kind = spec.kind(ev.heap).type_name()
        )));
    };
    let buf_id = handle.buf;
    let start = handle.cursor;

    let (manifest, body_start) = collect_fields(ev.heap, ev.interns, buf_id, start)?;
    let fields: Vec<SymbolId> = manifest.keys().copied().collect();

    let parent_frame = match parent {
        ObjectParent::None => None,
        ObjectParent::Caller => Some(ev.current_frame()),
    };
    let frame = ev.frames.new_object(parent_frame, &fields);

    // Initializers run inside the object frame so set-words fill fields and
    // forward references observe the pre-seeded `none` values. A failing
    // initializer pops and discards the frame: the partially-initialized
    // object is never observable.
    if let Err(err) = ev.push_frame(frame) {
        ev.frames.drop_frame(frame, ev.heap);
        return Err(err);
    }
    let run = run_initializers(ev, buf_id, body_start);
    ev.pop_frame();
    if let Err(err) = run {
        ev.frames.drop_frame(frame, ev.heap);
        return Err(err);
    }

    ev.frames.mark_captured(frame);
    let object = ObjectData {
        frame,
        manifest,
        prototype,
    };
    let id = ev.heap.allocate(HeapData::Object(object));
    ev.trace_object_created(id);
    Ok(Value::Ref(id))
}

/// Collects the ordered field list from a spec buffer.
///
/// Leading bare words (optionally followed by a datatype word) declare
/// fields without initializers; after the declaration prefix, every set-word
/// in the buffer declares a field. Returns the manifest and the position at
/// which initializer evaluation starts.
fn collect_fields(
    heap: &Heap,
    interns: &crate::intern::Interns,
    buf_id: HeapId,
    start: usize,
) -> RunResult<(IndexMap<SymbolId, Option<Kind>>, usize)> {
    let HeapData::BlockBuf(buf) = heap.get(buf_id) else {
        return Err(ErrorValue::spec_unsupported("object spec block has no buffer"));
    };
    let elements = &buf.values[start.min(buf.values.len())..];
    let mut manifest: IndexMap<SymbolId, Option<Kind>> = IndexMap::new();

    let mut declare = |manifest: &mut IndexMap<SymbolId, Option<Kind>>, symbol: SymbolId, hint| -> RunResult<()> {
        if symbol == SymbolId::from(StaticSymbols::Parent) || symbol == SymbolId::from(StaticSymbols::Spec) {
            return Err(ErrorValue::reserved_field(interns.get(symbol)));
        }
        if manifest.insert(symbol, hint).is_some() {
            return Err(ErrorValue::object_field_dup(interns.get(symbol)));
        }
        Ok(())
    };

    // Declaration prefix: bare words, each with an optional datatype word.
    let mut pos = 0usize;
    while let Some(Value::Word(symbol)) = elements.get(pos) {
        let hint = match elements.get(pos + 1) {
            Some(Value::Word(next)) => Kind::from_type_symbol(*next),
            _ => None,
        };
        declare(&mut manifest, *symbol, hint)?;
        pos += if hint.is_some() { 2 } else { 1 };
    }
    let body_start = start + pos;

    // Initializer region: every set-word declares a field.
    for element in &elements[pos..] {
        if let Value::SetWord(symbol) = element {
            declare(&mut manifest, *symbol, None)?;
        }
    }
    Ok((manifest, body_start))
}

/// Evaluates the initializer region of a spec buffer inside the (already
/// pushed) object frame, discarding expression results.
fn run_initializers(ev: &mut Evaluator<'_>, buf_id: HeapId, start: usize) -> RunResult<()> {
    let mut pos = start;
    loop {
        let len = match ev.heap.get(buf_id) {
            HeapData::BlockBuf(buf) => buf.values.len(),
            _ => 0,
        };
        if pos >= len {
            return Ok(());
        }
        let (next, value) = ev.eval_expression(buf_id, pos)?;
        value.drop_with_heap(ev.heap);
        pos = next;
    }
}

/// Reads a field with prototype walk, returning an owned clone on hit.
pub(crate) fn read_field(heap: &Heap, frames: &Frames, object: HeapId, field: SymbolId) -> Option<Value> {
    let mut current = Some(object);
    while let Some(id) = current {
        let HeapData::Object(data) = heap.get(id) else {
            return None;
        };
        if let Some(value) = frames.get(data.frame).get_local(field) {
            return Some(value.clone_with_heap(heap));
        }
        current = data.prototype;
    }
    None
}

/// Writes a field. The field must exist in the object's *own* manifest
/// (dynamic field addition is not permitted); a manifest type hint must
/// match the new value's kind.
pub(crate) fn write_field(
    heap: &mut Heap,
    frames: &mut Frames,
    interns: &crate::intern::Interns,
    object: HeapId,
    field: SymbolId,
    value: Value,
) -> RunResult<()> {
    let HeapData::Object(data) = heap.get(object) else {
        let kind = Value::Ref(object).kind(heap);
        value.drop_with_heap(heap);
        return Err(ErrorValue::type_mismatch("object!", kind));
    };
    let frame = data.frame;
    let Some(hint) = data.manifest.get(&field).copied() else {
        value.drop_with_heap(heap);
        return Err(ErrorValue::no_such_field(interns.get(field)));
    };
    if let Some(expected) = hint {
        let got = value.kind(heap);
        if got != expected {
            value.drop_with_heap(heap);
            return Err(ErrorValue::type_mismatch(expected.type_name(), got));
        }
    }
    frames.bind(frame, field, value, heap);
    Ok(())
}
