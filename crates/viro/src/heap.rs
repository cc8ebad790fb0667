//! Reference-counted arena heap for all non-immediate values.
//!
//! Series handles, shared series buffers, decimals, paths, functions,
//! objects, ports, bitsets, and error payloads live in slots of this arena
//! and are referenced by [`HeapId`]. Slots carry an explicit reference
//! count: `Value::clone_with_heap` increments, `Value::drop_with_heap`
//! decrements, and a slot whose count reaches zero is recycled through a
//! free list after releasing everything nested inside it.
//!
//! Series use two slot levels: a *handle* slot (`Str`/`Binary`/`Block`/
//! `Paren`, holding a buffer id plus a cursor) and a shared *buffer* slot
//! (`StrBuf`/`BinBuf`/`BlockBuf`). Cloning a series allocates a new handle
//! with its own cursor; the buffer is shared by refcount. Evaluation is
//! single-threaded, so no synchronization is involved.

use std::{cell::Cell, collections::BTreeMap};

use crate::{
    decimal::Decimal,
    error::{CodeLoc, ErrorValue},
    function::FunctionData,
    object::ObjectData,
    value::Value,
};

/// Index of a slot in the heap arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub(crate) struct HeapId(u32);

impl HeapId {
    fn new(index: usize) -> Self {
        Self(u32::try_from(index).expect("heap id out of u32 range"))
    }

    #[inline]
    fn index(self) -> usize {
        self.0 as usize
    }
}

/// A series handle: shared buffer reference plus this handle's cursor.
///
/// The cursor is a logical head position into the buffer; readers clamp it
/// to the buffer length, so a handle left past the end by buffer shrinking
/// simply observes an empty remainder.
#[derive(Debug, Clone, Copy)]
pub(crate) struct SeriesHandle {
    pub buf: HeapId,
    pub cursor: usize,
}

/// Shared buffer of block/paren elements.
///
/// `locs` carries per-element source locations when the buffer came from the
/// parser; any mutation invalidates them (diagnostics-only data).
#[derive(Debug, Default)]
pub(crate) struct BlockBuf {
    pub values: Vec<Value>,
    pub locs: Option<Vec<CodeLoc>>,
}

impl BlockBuf {
    pub fn new(values: Vec<Value>) -> Self {
        Self { values, locs: None }
    }

    pub fn with_locs(values: Vec<Value>, locs: Vec<CodeLoc>) -> Self {
        debug_assert_eq!(values.len(), locs.len());
        Self {
            values,
            locs: Some(locs),
        }
    }

    /// Location of the element at `index`, when the parser recorded one.
    pub fn loc_at(&self, index: usize) -> Option<CodeLoc> {
        self.locs.as_ref().and_then(|locs| locs.get(index).copied())
    }
}

/// An opaque stream handle. The core stores the target and emits trace
/// events; actual I/O lives in external collaborators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Port {
    pub target: String,
    pub open: bool,
}

/// A 256-slot character-set bit vector, as consumed by the parse dialect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Bitset {
    bits: [u64; 4],
}

impl Bitset {
    pub fn new() -> Self {
        Self { bits: [0; 4] }
    }

    /// Builds a bitset holding every byte of `text`. Characters outside the
    /// 256-slot range are rejected by the caller (`InvalidArg`).
    pub fn set(&mut self, byte: u8) {
        self.bits[usize::from(byte >> 6)] |= 1 << (byte & 63);
    }

    pub fn contains(&self, byte: u8) -> bool {
        self.bits[usize::from(byte >> 6)] & (1 << (byte & 63)) != 0
    }

    /// Iterates set bytes in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = u8> + '_ {
        (0u16..256).filter_map(|b| {
            let byte = b as u8;
            self.contains(byte).then_some(byte)
        })
    }
}

/// Payload of a heap slot.
#[derive(Debug)]
pub(crate) enum HeapData {
    /// Shared string buffer (character series storage).
    StrBuf(String),
    /// Shared byte buffer (binary series storage).
    BinBuf(Vec<u8>),
    /// Shared block/paren element buffer.
    BlockBuf(BlockBuf),
    /// String series handle.
    Str(SeriesHandle),
    /// Binary series handle.
    Binary(SeriesHandle),
    /// Block series handle.
    Block(SeriesHandle),
    /// Paren series handle (same shape as a block, distinct tag).
    Paren(SeriesHandle),
    /// Compound selector: an ordered sequence of words/values.
    Path(Vec<Value>),
    Decimal(Decimal),
    Function(FunctionData),
    Object(ObjectData),
    Bitset(Bitset),
    Port(Port),
    Error(ErrorValue),
}

impl HeapData {
    /// Static variant name, used for heap statistics breakdowns.
    pub fn variant_name(&self) -> &'static str {
        match self {
            Self::StrBuf(_) => "StrBuf",
            Self::BinBuf(_) => "BinBuf",
            Self::BlockBuf(_) => "BlockBuf",
            Self::Str(_) => "Str",
            Self::Binary(_) => "Binary",
            Self::Block(_) => "Block",
            Self::Paren(_) => "Paren",
            Self::Path(_) => "Path",
            Self::Decimal(_) => "Decimal",
            Self::Function(_) => "Function",
            Self::Object(_) => "Object",
            Self::Bitset(_) => "Bitset",
            Self::Port(_) => "Port",
            Self::Error(_) => "Error",
        }
    }
}

#[derive(Debug)]
struct HeapValue {
    data: HeapData,
    ref_count: Cell<u32>,
}

/// Snapshot of heap state at a point in time.
///
/// The `objects_by_type` map uses `BTreeMap` for deterministic iteration
/// order, making snapshots suitable for display and comparison.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeapStats {
    /// Total number of live objects on the heap.
    pub live_objects: usize,
    /// Number of free (recycled) slots available for reuse.
    pub free_slots: usize,
    /// Total heap capacity (live + free).
    pub total_slots: usize,
    /// Breakdown of live objects by heap payload variant name.
    pub objects_by_type: BTreeMap<&'static str, usize>,
    /// Number of dynamically interned symbols in the interpreter.
    pub interned_symbols: usize,
}

/// The arena heap.
#[derive(Debug)]
pub(crate) struct Heap {
    entries: Vec<Option<HeapValue>>,
    /// Ids of freed slots available for reuse. Populated by `dec_ref`,
    /// consumed by `allocate`.
    free_list: Vec<HeapId>,
}

impl Heap {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            free_list: Vec::new(),
        }
    }

    /// Allocates a slot for `data` with a reference count of one.
    pub fn allocate(&mut self, data: HeapData) -> HeapId {
        let value = HeapValue {
            data,
            ref_count: Cell::new(1),
        };
        if let Some(id) = self.free_list.pop() {
            self.entries[id.index()] = Some(value);
            id
        } else {
            let id = HeapId::new(self.entries.len());
            self.entries.push(Some(value));
            id
        }
    }

    /// Increments the reference count of a live slot.
    pub fn inc_ref(&self, id: HeapId) {
        let entry = self.entries[id.index()].as_ref().expect("inc_ref on freed heap slot");
        entry.ref_count.set(entry.ref_count.get() + 1);
    }

    /// Decrements the reference count, freeing the slot (and releasing
    /// everything nested in it) when the count reaches zero.
    pub fn dec_ref(&mut self, id: HeapId) {
        let entry = self.entries[id.index()].as_ref().expect("dec_ref on freed heap slot");
        let count = entry.ref_count.get();
        debug_assert!(count > 0, "heap refcount underflow");
        if count > 1 {
            entry.ref_count.set(count - 1);
            return;
        }
        let freed = self.entries[id.index()].take().expect("slot vanished during dec_ref");
        self.free_list.push(id);
        self.release_nested(freed.data);
    }

    /// Releases values owned by a freed payload.
    fn release_nested(&mut self, data: HeapData) {
        match data {
            HeapData::StrBuf(_)
            | HeapData::BinBuf(_)
            | HeapData::Decimal(_)
            | HeapData::Bitset(_)
            | HeapData::Port(_)
            | HeapData::Error(_) => {}
            HeapData::BlockBuf(buf) => {
                for value in buf.values {
                    value.drop_with_heap(self);
                }
            }
            HeapData::Str(handle) | HeapData::Binary(handle) | HeapData::Block(handle) | HeapData::Paren(handle) => {
                self.dec_ref(handle.buf);
            }
            HeapData::Path(segments) => {
                for value in segments {
                    value.drop_with_heap(self);
                }
            }
            HeapData::Function(function) => function.release(self),
            HeapData::Object(object) => object.release(self),
        }
    }

    /// Reads a live slot.
    ///
    /// # Panics
    /// Panics on a freed slot: handing out a dangling `HeapId` is an
    /// interpreter bug, not a user-reachable condition.
    pub fn get(&self, id: HeapId) -> &HeapData {
        &self.entries[id.index()].as_ref().expect("get on freed heap slot").data
    }

    pub fn get_mut(&mut self, id: HeapId) -> &mut HeapData {
        &mut self.entries[id.index()].as_mut().expect("get_mut on freed heap slot").data
    }

    #[cfg(test)]
    pub fn ref_count(&self, id: HeapId) -> u32 {
        self.entries[id.index()].as_ref().expect("ref_count on freed heap slot").ref_count.get()
    }

    // ------------------------------------------------------------------
    // Allocation helpers for composite values.
    // ------------------------------------------------------------------

    /// Allocates a string series (buffer + handle at cursor zero).
    pub fn alloc_string(&mut self, text: String) -> Value {
        let buf = self.allocate(HeapData::StrBuf(text));
        Value::Ref(self.allocate(HeapData::Str(SeriesHandle { buf, cursor: 0 })))
    }

    /// Allocates a binary series (buffer + handle at cursor zero).
    pub fn alloc_binary(&mut self, bytes: Vec<u8>) -> Value {
        let buf = self.allocate(HeapData::BinBuf(bytes));
        Value::Ref(self.allocate(HeapData::Binary(SeriesHandle { buf, cursor: 0 })))
    }

    /// Allocates a block series over a fresh buffer.
    pub fn alloc_block(&mut self, buf: BlockBuf) -> Value {
        let buf = self.allocate(HeapData::BlockBuf(buf));
        Value::Ref(self.allocate(HeapData::Block(SeriesHandle { buf, cursor: 0 })))
    }

    /// Allocates a paren series over a fresh buffer.
    pub fn alloc_paren(&mut self, buf: BlockBuf) -> Value {
        let buf = self.allocate(HeapData::BlockBuf(buf));
        Value::Ref(self.allocate(HeapData::Paren(SeriesHandle { buf, cursor: 0 })))
    }

    pub fn alloc_decimal(&mut self, decimal: Decimal) -> Value {
        Value::Ref(self.allocate(HeapData::Decimal(decimal)))
    }

    pub fn alloc_path(&mut self, segments: Vec<Value>) -> Value {
        Value::Ref(self.allocate(HeapData::Path(segments)))
    }

    pub fn alloc_error(&mut self, error: ErrorValue) -> Value {
        Value::Ref(self.allocate(HeapData::Error(error)))
    }

    /// Takes a heap snapshot for monitoring and tests.
    pub fn stats(&self, interned_symbols: usize) -> HeapStats {
        let mut objects_by_type: BTreeMap<&'static str, usize> = BTreeMap::new();
        let mut live_objects = 0usize;
        for entry in self.entries.iter().flatten() {
            live_objects += 1;
            *objects_by_type.entry(entry.data.variant_name()).or_insert(0) += 1;
        }
        HeapStats {
            live_objects,
            free_slots: self.free_list.len(),
            total_slots: self.entries.len(),
            objects_by_type,
            interned_symbols,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Freed slots are recycled by later allocations.
    #[test]
    fn slot_reuse_after_free() {
        let mut heap = Heap::new();
        let id = heap.allocate(HeapData::StrBuf("abc".into()));
        heap.dec_ref(id);
        let reused = heap.allocate(HeapData::StrBuf("def".into()));
        assert_eq!(id, reused);
        assert_eq!(heap.stats(0).total_slots, 1);
    }

    /// Dropping a series handle releases the shared buffer only when the
    /// last handle goes away.
    #[test]
    fn shared_buffer_released_with_last_handle() {
        let mut heap = Heap::new();
        let buf = heap.allocate(HeapData::StrBuf("shared".into()));
        let a = heap.allocate(HeapData::Str(SeriesHandle { buf, cursor: 0 }));
        heap.inc_ref(buf);
        let b = heap.allocate(HeapData::Str(SeriesHandle { buf, cursor: 3 }));
        heap.dec_ref(a);
        assert_eq!(heap.ref_count(buf), 1, "buffer must survive the first handle");
        heap.dec_ref(b);
        assert_eq!(heap.stats(0).live_objects, 0);
    }

    /// Freeing a block buffer releases nested heap values recursively.
    #[test]
    fn nested_release_through_block_buffer() {
        let mut heap = Heap::new();
        let inner = heap.alloc_string("nested".into());
        let outer = heap.alloc_block(BlockBuf::new(vec![inner]));
        outer.drop_with_heap(&mut heap);
        assert_eq!(heap.stats(0).live_objects, 0);
    }

    /// Stats break live objects down by variant name deterministically.
    #[test]
    fn stats_by_type() {
        let mut heap = Heap::new();
        let _s = heap.alloc_string("x".into());
        let _b = heap.alloc_block(BlockBuf::default());
        let stats = heap.stats(2);
        assert_eq!(stats.objects_by_type.get("Str"), Some(&1));
        assert_eq!(stats.objects_by_type.get("Block"), Some(&1));
        assert_eq!(stats.objects_by_type.get("StrBuf"), Some(&1));
        assert_eq!(stats.objects_by_type.get("BlockBuf"), Some(&1));
        assert_eq!(stats.interned_symbols, 2);
        assert_eq!(stats.total_slots, stats.live_objects + stats.free_slots);
    }
}
