//! Lexical frames: insertion-ordered binding tables with parent links.
//!
//! All frames live in one index-addressed store owned by the interpreter, so
//! a function value or object can hold a stable [`FrameId`] without forming
//! an ownership cycle with its body block. Frame slots for ordinary function
//! calls are recycled through a free list on pop; frames marked *captured*
//! (by a closure or an object) are pinned for the interpreter's lifetime,
//! which keeps every lexical parent chain alive without back-references.
//!
//! Each frame carries a small symbol-to-slot map, so lookup is O(1)
//! amortized per frame while iteration stays in insertion order (relied on
//! by `words-of`, `values-of`, and `foreach` over objects).

use ahash::AHashMap;

use crate::{heap::Heap, intern::SymbolId, value::Value};

/// Index of a frame in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub(crate) struct FrameId(u32);

impl FrameId {
    fn new(index: usize) -> Self {
        Self(u32::try_from(index).expect("frame id out of u32 range"))
    }

    #[inline]
    fn index(self) -> usize {
        self.0 as usize
    }
}

/// The global frame, created by [`Frames::new`] and never dropped.
pub(crate) const ROOT_FRAME: FrameId = FrameId(0);

/// What created a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FrameKind {
    /// The global frame; parent is none.
    Root,
    /// The lexical environment of a function invocation.
    Closure,
    /// The owned frame of an object instance.
    Object,
}

/// An ordered binding table.
#[derive(Debug)]
pub(crate) struct Frame {
    entries: Vec<(SymbolId, Value)>,
    index: AHashMap<SymbolId, usize>,
    parent: Option<FrameId>,
    kind: FrameKind,
    captured: bool,
}

impl Frame {
    fn new(kind: FrameKind, parent: Option<FrameId>) -> Self {
        Self {
            entries: Vec::new(),
            index: AHashMap::new(),
            parent,
            kind,
            captured: false,
        }
    }

    pub fn parent(&self) -> Option<FrameId> {
        self.parent
    }

    pub fn kind(&self) -> FrameKind {
        self.kind
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Bindings in insertion order.
    pub fn bindings(&self) -> impl Iterator<Item = (SymbolId, &Value)> {
        self.entries.iter().map(|(symbol, value)| (*symbol, value))
    }

    /// Reads a binding in this frame only (no parent walk).
    pub fn get_local(&self, symbol: SymbolId) -> Option<&Value> {
        self.index.get(&symbol).map(|slot| &self.entries[*slot].1)
    }

    pub fn has_local(&self, symbol: SymbolId) -> bool {
        self.index.contains_key(&symbol)
    }
}

/// Storage for all frames during execution.
///
/// Index 0 is always the root (global) frame. Non-captured frame slots are
/// reused across calls; the `free` list holds their ids.
#[derive(Debug)]
pub(crate) struct Frames {
    store: Vec<Frame>,
    free: Vec<FrameId>,
}

impl Frames {
    /// Creates the store with the root frame initialized.
    pub fn new() -> Self {
        Self {
            store: vec![Frame::new(FrameKind::Root, None)],
            free: Vec::new(),
        }
    }

    pub fn get(&self, id: FrameId) -> &Frame {
        &self.store[id.index()]
    }

    /// Creates a child frame for a function call, reusing a freed slot when
    /// one is available.
    pub fn new_closure(&mut self, parent: FrameId) -> FrameId {
        self.alloc(FrameKind::Closure, Some(parent))
    }

    /// Creates an object's owned frame, pre-seeding each field to `none` in
    /// insertion order. Field uniqueness is the constructor's concern.
    pub fn new_object(&mut self, parent: Option<FrameId>, fields: &[SymbolId]) -> FrameId {
        let id = self.alloc(FrameKind::Object, parent);
        let frame = &mut self.store[id.index()];
        for field in fields {
            let slot = frame.entries.len();
            frame.entries.push((*field, Value::None));
            frame.index.insert(*field, slot);
        }
        id
    }

    fn alloc(&mut self, kind: FrameKind, parent: Option<FrameId>) -> FrameId {
        if let Some(id) = self.free.pop() {
            let frame = &mut self.store[id.index()];
            debug_assert!(frame.entries.is_empty(), "recycled frame must be empty");
            frame.parent = parent;
            frame.kind = kind;
            frame.captured = false;
            id
        } else {
            let id = FrameId::new(self.store.len());
            self.store.push(Frame::new(kind, parent));
            id
        }
    }

    /// Binds `symbol` to `value` in `id`: updates an existing entry
    /// (releasing the previous value) or appends a new one, preserving
    /// insertion order on first bind.
    pub fn bind(&mut self, id: FrameId, symbol: SymbolId, value: Value, heap: &mut Heap) {
        let frame = &mut self.store[id.index()];
        if let Some(slot) = frame.index.get(&symbol) {
            let old = std::mem::replace(&mut frame.entries[*slot].1, value);
            old.drop_with_heap(heap);
        } else {
            let slot = frame.entries.len();
            frame.entries.push((symbol, value));
            frame.index.insert(symbol, slot);
        }
    }

    /// Looks up `symbol` starting at `start` and walking parent links.
    /// Returns the bound value and the frame it was found in.
    pub fn lookup(&self, start: FrameId, symbol: SymbolId) -> Option<(&Value, FrameId)> {
        let mut current = Some(start);
        while let Some(id) = current {
            let frame = &self.store[id.index()];
            if let Some(value) = frame.get_local(symbol) {
                return Some((value, id));
            }
            current = frame.parent;
        }
        None
    }

    /// Marks a frame and its whole parent chain as captured, pinning the
    /// slots for the interpreter's lifetime. The root frame is implicitly
    /// pinned already.
    pub fn mark_captured(&mut self, id: FrameId) {
        let mut current = Some(id);
        while let Some(frame_id) = current {
            let frame = &mut self.store[frame_id.index()];
            if frame.captured || frame.kind == FrameKind::Root {
                break;
            }
            frame.captured = true;
            current = frame.parent;
        }
    }

    pub fn is_captured(&self, id: FrameId) -> bool {
        self.store[id.index()].captured
    }

    /// Releases a frame at scope exit. Captured frames (and the root) are
    /// kept alive; everything else drains its bindings back to the heap and
    /// returns its slot to the free list.
    pub fn drop_frame(&mut self, id: FrameId, heap: &mut Heap) {
        let frame = &mut self.store[id.index()];
        if frame.captured || frame.kind == FrameKind::Root {
            return;
        }
        for (_, value) in frame.entries.drain(..) {
            value.drop_with_heap(heap);
        }
        frame.index.clear();
        self.free.push(id);
    }

    /// Number of live (non-recycled) frames, the root included.
    pub fn live_count(&self) -> usize {
        self.store.len() - self.free.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intern::Interns;

    /// Lookup walks parent links and reports the defining frame.
    #[test]
    fn lookup_walks_parents() {
        let mut frames = Frames::new();
        let mut heap = Heap::new();
        let mut interns = Interns::new();
        let x = interns.intern("x");
        let y = interns.intern("y");
        frames.bind(ROOT_FRAME, x, Value::Int(1), &mut heap);
        let child = frames.new_closure(ROOT_FRAME);
        frames.bind(child, y, Value::Int(2), &mut heap);

        let (value, found_in) = frames.lookup(child, x).expect("x visible from child");
        assert!(matches!(value, Value::Int(1)));
        assert_eq!(found_in, ROOT_FRAME);
        let (value, found_in) = frames.lookup(child, y).expect("y local to child");
        assert!(matches!(value, Value::Int(2)));
        assert_eq!(found_in, child);
        assert!(frames.lookup(ROOT_FRAME, y).is_none(), "y must not leak upward");
    }

    /// Rebinding updates in place and keeps the original insertion order.
    #[test]
    fn bind_upserts_preserving_order() {
        let mut frames = Frames::new();
        let mut heap = Heap::new();
        let mut interns = Interns::new();
        let a = interns.intern("a");
        let b = interns.intern("b");
        frames.bind(ROOT_FRAME, a, Value::Int(1), &mut heap);
        frames.bind(ROOT_FRAME, b, Value::Int(2), &mut heap);
        frames.bind(ROOT_FRAME, a, Value::Int(10), &mut heap);
        let order: Vec<SymbolId> = frames.get(ROOT_FRAME).bindings().map(|(s, _)| s).collect();
        assert_eq!(order, vec![a, b]);
        assert!(matches!(frames.get(ROOT_FRAME).get_local(a), Some(Value::Int(10))));
    }

    /// Dropped closure frames recycle their slots; captured frames do not.
    #[test]
    fn capture_pins_frame_slots() {
        let mut frames = Frames::new();
        let mut heap = Heap::new();
        let recycled = frames.new_closure(ROOT_FRAME);
        frames.drop_frame(recycled, &mut heap);
        assert_eq!(frames.live_count(), 1);
        let reused = frames.new_closure(ROOT_FRAME);
        assert_eq!(reused, recycled);

        frames.mark_captured(reused);
        assert!(frames.is_captured(reused));
        frames.drop_frame(reused, &mut heap);
        assert_eq!(frames.live_count(), 2, "captured frame must stay live");
    }

    /// Capturing a frame pins its whole parent chain.
    #[test]
    fn capture_walks_parent_chain() {
        let mut frames = Frames::new();
        let outer = frames.new_closure(ROOT_FRAME);
        let inner = frames.new_closure(outer);
        frames.mark_captured(inner);
        assert!(frames.is_captured(inner));
        assert!(frames.is_captured(outer), "parent chain must be pinned too");
    }

    /// Object frames pre-seed every declared field to none, in order.
    #[test]
    fn object_frame_preseeds_fields() {
        let mut frames = Frames::new();
        let mut interns = Interns::new();
        let fields = [interns.intern("x"), interns.intern("y")];
        let id = frames.new_object(None, &fields);
        let frame = frames.get(id);
        assert_eq!(frame.len(), 2);
        let all_none = frame.bindings().all(|(_, v)| matches!(v, Value::None));
        assert!(all_none, "fields must start as none");
        assert_eq!(frame.kind(), FrameKind::Object);
        assert_eq!(frame.parent(), None);
    }

    /// Rebinding a heap value releases the old one.
    #[test]
    fn rebind_releases_old_value() {
        let mut frames = Frames::new();
        let mut heap = Heap::new();
        let mut interns = Interns::new();
        let s = interns.intern("s");
        let first = heap.alloc_string("first".into());
        frames.bind(ROOT_FRAME, s, first, &mut heap);
        let second = heap.alloc_string("second".into());
        frames.bind(ROOT_FRAME, s, second, &mut heap);
        // first's two slots (buffer + handle) must be gone; second's remain.
        assert_eq!(heap.stats(0).live_objects, 2);
    }
}
