//! The native registry and action dispatch tables.
//!
//! Every built-in is described by a static [`NativeDef`]: parameter spec,
//! infix flag, frame policy, one-line documentation, and the host function
//! pointer. Root-frame initialization walks the table and binds each native
//! as a `Function` value, alongside the datatype words and the literal
//! words `true` / `false` / `none`.
//!
//! Polymorphic operations (`first`, `append`, `select`, ...) are *actions*:
//! their registered native is a dispatcher that selects the implementation
//! from a per-type table keyed by operation symbol. A kind without an
//! implementation fails with `ActionNoImpl`.

pub(crate) mod control;
pub(crate) mod core;
pub(crate) mod math;
pub(crate) mod series;

use ahash::AHashMap;
use smallvec::SmallVec;

use crate::{
    args::{ArgValues, Refinements},
    error::{ErrorValue, RunResult},
    eval::Evaluator,
    frame::{Frames, ROOT_FRAME},
    function::{Docs, FramePolicy, FunctionData, FunctionKind, NativeId, ParamSpec},
    heap::{Heap, HeapData},
    intern::{Interns, StaticSymbols, SymbolId},
    value::{Kind, Value},
};

/// Host function signature: `(evaluator_handle, args, refinements)`.
pub(crate) type NativeImpl = fn(&mut Evaluator<'_>, ArgValues, &mut Refinements) -> RunResult<Value>;

/// Static parameter descriptor for a native.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ParamDef {
    pub name: &'static str,
    pub eval: bool,
    pub refinement: bool,
    pub takes_value: bool,
    pub hint: Option<Kind>,
}

/// Evaluated positional parameter.
pub(crate) const fn arg(name: &'static str) -> ParamDef {
    ParamDef {
        name,
        eval: true,
        refinement: false,
        takes_value: false,
        hint: None,
    }
}

/// Typed evaluated positional parameter.
pub(crate) const fn arg_of(name: &'static str, hint: Kind) -> ParamDef {
    ParamDef {
        name,
        eval: true,
        refinement: false,
        takes_value: false,
        hint: Some(hint),
    }
}

/// Raw (lit-word) positional parameter: the caller passes the token
/// unevaluated.
pub(crate) const fn raw(name: &'static str) -> ParamDef {
    ParamDef {
        name,
        eval: false,
        refinement: false,
        takes_value: false,
        hint: None,
    }
}

/// Boolean refinement.
pub(crate) const fn flag(name: &'static str) -> ParamDef {
    ParamDef {
        name,
        eval: true,
        refinement: true,
        takes_value: false,
        hint: None,
    }
}

/// Value-taking refinement.
pub(crate) const fn val(name: &'static str, hint: Option<Kind>) -> ParamDef {
    ParamDef {
        name,
        eval: true,
        refinement: true,
        takes_value: true,
        hint,
    }
}

/// A native registration descriptor.
#[derive(Debug, Clone, Copy)]
pub(crate) struct NativeDef {
    pub name: &'static str,
    pub params: &'static [ParamDef],
    pub infix: bool,
    pub policy: FramePolicy,
    pub summary: &'static str,
    pub func: NativeImpl,
}

impl NativeDef {
    pub(crate) const fn prefix(
        name: &'static str,
        params: &'static [ParamDef],
        summary: &'static str,
        func: NativeImpl,
    ) -> Self {
        Self {
            name,
            params,
            infix: false,
            policy: FramePolicy::Caller,
            summary,
            func,
        }
    }

    pub(crate) const fn infix(
        name: &'static str,
        params: &'static [ParamDef],
        summary: &'static str,
        func: NativeImpl,
    ) -> Self {
        Self {
            name,
            params,
            infix: true,
            policy: FramePolicy::Caller,
            summary,
            func,
        }
    }
}

/// The full native table. `NativeId` is an index into this slice.
pub(crate) fn natives() -> &'static [NativeDef] {
    static TABLE: std::sync::OnceLock<Vec<NativeDef>> = std::sync::OnceLock::new();
    TABLE.get_or_init(|| {
        let mut table = Vec::new();
        table.extend_from_slice(math::NATIVES);
        table.extend_from_slice(control::NATIVES);
        table.extend_from_slice(core::NATIVES);
        table.extend_from_slice(series::NATIVES);
        table
    })
}

pub(crate) fn native_def(id: NativeId) -> &'static NativeDef {
    &natives()[id.0 as usize]
}

/// Per-type action implementation tables.
///
/// The dispatcher resolves `(first_argument_kind, operation_symbol)` with
/// one indirection: kind to type table, symbol to implementation.
#[derive(Debug, Default)]
pub(crate) struct Actions {
    tables: AHashMap<Kind, AHashMap<SymbolId, NativeImpl>>,
}

impl Actions {
    pub fn build() -> Self {
        let mut actions = Self::default();
        series::register_actions(&mut actions);
        actions
    }

    pub fn register(&mut self, kind: Kind, op: StaticSymbols, func: NativeImpl) {
        self.tables.entry(kind).or_default().insert(SymbolId::from(op), func);
    }

    pub fn lookup(&self, kind: Kind, op: SymbolId) -> Option<NativeImpl> {
        self.tables.get(&kind)?.get(&op).copied()
    }
}

/// Routes an action invocation to the implementation registered for the
/// first argument's kind.
pub(crate) fn dispatch_action(
    ev: &mut Evaluator<'_>,
    args: ArgValues,
    refs: &mut Refinements,
    op: StaticSymbols,
) -> RunResult<Value> {
    let Some(first) = args.first() else {
        args.drop_with_heap(ev.heap);
        return Err(ErrorValue::arg_count(op.as_str(), 1, 0));
    };
    let kind = first.kind(ev.heap);
    let Some(imp) = ev.actions.lookup(kind, SymbolId::from(op)) else {
        args.drop_with_heap(ev.heap);
        return Err(ErrorValue::action_no_impl(op.as_str(), kind));
    };
    imp(ev, args, refs)
}

/// Binds every native, datatype word, and literal word in the root frame.
pub(crate) fn register_root(heap: &mut Heap, frames: &mut Frames, interns: &mut Interns) {
    for (index, def) in natives().iter().enumerate() {
        let mut params: SmallVec<[ParamSpec; 4]> = SmallVec::new();
        for p in def.params {
            params.push(ParamSpec {
                name: interns.intern(p.name),
                hint: p.hint,
                eval: p.eval,
                refinement: p.refinement,
                takes_value: p.takes_value,
                optional: p.refinement,
            });
        }
        let name = interns.intern(def.name);
        let function = FunctionData {
            name,
            params,
            kind: FunctionKind::Native {
                id: NativeId(u16::try_from(index).expect("native table exceeds u16")),
                policy: def.policy,
            },
            infix: def.infix,
            docs: Some(Docs {
                summary: def.summary.to_owned(),
            }),
        };
        let id = heap.allocate(HeapData::Function(function));
        frames.bind(ROOT_FRAME, name, Value::Ref(id), heap);
    }

    frames.bind(ROOT_FRAME, StaticSymbols::True.into(), Value::Logic(true), heap);
    frames.bind(ROOT_FRAME, StaticSymbols::False.into(), Value::Logic(false), heap);
    frames.bind(ROOT_FRAME, StaticSymbols::NoneWord.into(), Value::None, heap);

    for kind in [
        Kind::None,
        Kind::Logic,
        Kind::Integer,
        Kind::Decimal,
        Kind::String,
        Kind::Binary,
        Kind::Block,
        Kind::Paren,
        Kind::Path,
        Kind::Word,
        Kind::SetWord,
        Kind::GetWord,
        Kind::LitWord,
        Kind::Datatype,
        Kind::Function,
        Kind::Native,
        Kind::Object,
        Kind::Port,
        Kind::Bitset,
        Kind::Error,
    ] {
        frames.bind(ROOT_FRAME, kind.type_symbol().into(), Value::Datatype(kind), heap);
    }
}

// ---------------------------------------------------------------------------
// Shared argument helpers
// ---------------------------------------------------------------------------

/// Borrows the elements of a block/paren argument.
pub(crate) fn block_slice<'h>(heap: &'h Heap, value: &Value) -> RunResult<&'h [Value]> {
    if let Value::Ref(id) = value
        && let HeapData::Block(handle) | HeapData::Paren(handle) = heap.get(*id)
        && let HeapData::BlockBuf(buf) = heap.get(handle.buf)
    {
        return Ok(&buf.values[handle.cursor.min(buf.values.len())..]);
    }
    Err(ErrorValue::type_mismatch("block!", value.kind(heap)))
}

/// Reads a word argument's symbol by reference.
pub(crate) fn expect_word(heap: &Heap, value: &Value) -> RunResult<SymbolId> {
    value
        .word_symbol()
        .ok_or_else(|| ErrorValue::type_mismatch("word!", value.kind(heap)))
}
