//! The runtime value model: a closed tagged sum behind a small handle type.
//!
//! Immediate values (`None`, logic, integers, the four word kinds, datatype
//! markers) are stored inline; everything else lives in the arena heap and
//! is carried as `Ref(HeapId)`.
//!
//! NOTE: `Clone` is intentionally NOT derived. Use `clone_with_heap()` to
//! alias a value and `drop_with_heap()` to dispose of one; direct cloning
//! would bypass reference counting and leak heap slots.

use std::{cmp::Ordering, fmt};

use ahash::AHashSet;

use crate::{
    frame::{FrameId, Frames},
    heap::{Heap, HeapData, HeapId},
    intern::{Interns, StaticSymbols, SymbolId},
};

/// The closed set of value kind tags.
///
/// `Native` never appears as a runtime kind tag (native and user functions
/// share the `Function` kind); it exists so `type-of` can report `native!`
/// and so datatype words cover the full surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub(crate) enum Kind {
    None,
    Logic,
    Integer,
    Decimal,
    String,
    Binary,
    Block,
    Paren,
    Path,
    Word,
    SetWord,
    GetWord,
    LitWord,
    Datatype,
    Function,
    Native,
    Object,
    Port,
    Bitset,
    Error,
}

/// Pairs every kind with its datatype word.
const KIND_SYMBOLS: [(Kind, StaticSymbols); 20] = [
    (Kind::None, StaticSymbols::NoneType),
    (Kind::Logic, StaticSymbols::LogicType),
    (Kind::Integer, StaticSymbols::IntegerType),
    (Kind::Decimal, StaticSymbols::DecimalType),
    (Kind::String, StaticSymbols::StringType),
    (Kind::Binary, StaticSymbols::BinaryType),
    (Kind::Block, StaticSymbols::BlockType),
    (Kind::Paren, StaticSymbols::ParenType),
    (Kind::Path, StaticSymbols::PathType),
    (Kind::Word, StaticSymbols::WordType),
    (Kind::SetWord, StaticSymbols::SetWordType),
    (Kind::GetWord, StaticSymbols::GetWordType),
    (Kind::LitWord, StaticSymbols::LitWordType),
    (Kind::Datatype, StaticSymbols::DatatypeType),
    (Kind::Function, StaticSymbols::FunctionType),
    (Kind::Native, StaticSymbols::NativeType),
    (Kind::Object, StaticSymbols::ObjectType),
    (Kind::Port, StaticSymbols::PortType),
    (Kind::Bitset, StaticSymbols::BitsetType),
    (Kind::Error, StaticSymbols::ErrorType),
];

impl Kind {
    /// The datatype word for this kind (`integer!`, `block!`, ...).
    pub fn type_symbol(self) -> StaticSymbols {
        KIND_SYMBOLS
            .iter()
            .find(|(kind, _)| *kind == self)
            .expect("kind missing from symbol table")
            .1
    }

    pub fn type_name(self) -> &'static str {
        self.type_symbol().as_str()
    }

    /// Resolves a datatype word symbol back to its kind.
    pub fn from_type_symbol(symbol: SymbolId) -> Option<Self> {
        KIND_SYMBOLS
            .iter()
            .find(|(_, sym)| SymbolId::from(*sym) == symbol)
            .map(|(kind, _)| *kind)
    }

    /// Series kinds carry a cursor and dispatch series actions.
    pub fn is_series(self) -> bool {
        matches!(self, Self::String | Self::Binary | Self::Block | Self::Paren)
    }
}

/// Primary handle type for runtime values.
#[derive(Debug)]
pub(crate) enum Value {
    // Immediate values (stored inline, no heap allocation)
    None,
    Logic(bool),
    Int(i64),
    Word(SymbolId),
    SetWord(SymbolId),
    GetWord(SymbolId),
    LitWord(SymbolId),
    Datatype(Kind),
    // Heap-allocated values (stored in the arena)
    Ref(HeapId),
}

impl Value {
    /// Returns the kind tag. Total: never fails.
    pub fn kind(&self, heap: &Heap) -> Kind {
        match self {
            Self::None => Kind::None,
            Self::Logic(_) => Kind::Logic,
            Self::Int(_) => Kind::Integer,
            Self::Word(_) => Kind::Word,
            Self::SetWord(_) => Kind::SetWord,
            Self::GetWord(_) => Kind::GetWord,
            Self::LitWord(_) => Kind::LitWord,
            Self::Datatype(_) => Kind::Datatype,
            Self::Ref(id) => match heap.get(*id) {
                HeapData::StrBuf(_) | HeapData::Str(_) => Kind::String,
                HeapData::BinBuf(_) | HeapData::Binary(_) => Kind::Binary,
                HeapData::BlockBuf(_) | HeapData::Block(_) => Kind::Block,
                HeapData::Paren(_) => Kind::Paren,
                HeapData::Path(_) => Kind::Path,
                HeapData::Decimal(_) => Kind::Decimal,
                HeapData::Function(_) => Kind::Function,
                HeapData::Object(_) => Kind::Object,
                HeapData::Bitset(_) => Kind::Bitset,
                HeapData::Port(_) => Kind::Port,
                HeapData::Error(_) => Kind::Error,
            },
        }
    }

    /// The kind as reported by `type-of`: functions split into `function!`
    /// and `native!`.
    pub fn type_kind(&self, heap: &Heap) -> Kind {
        if let Self::Ref(id) = self
            && let HeapData::Function(f) = heap.get(*id)
            && f.is_native()
        {
            return Kind::Native;
        }
        self.kind(heap)
    }

    /// Truthiness: only `none` and `false` are falsy. Zero, empty series,
    /// and every heap value are truthy.
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Self::None | Self::Logic(false))
    }

    /// The interned symbol of any of the four word kinds.
    pub fn word_symbol(&self) -> Option<SymbolId> {
        match self {
            Self::Word(s) | Self::SetWord(s) | Self::GetWord(s) | Self::LitWord(s) => Some(*s),
            _ => None,
        }
    }

    /// Aliases this value, incrementing the refcount of heap values.
    pub fn clone_with_heap(&self, heap: &Heap) -> Self {
        match self {
            Self::None => Self::None,
            Self::Logic(b) => Self::Logic(*b),
            Self::Int(i) => Self::Int(*i),
            Self::Word(s) => Self::Word(*s),
            Self::SetWord(s) => Self::SetWord(*s),
            Self::GetWord(s) => Self::GetWord(*s),
            Self::LitWord(s) => Self::LitWord(*s),
            Self::Datatype(k) => Self::Datatype(*k),
            Self::Ref(id) => {
                heap.inc_ref(*id);
                Self::Ref(*id)
            }
        }
    }

    /// Disposes of this value, decrementing the refcount of heap values.
    pub fn drop_with_heap(self, heap: &mut Heap) {
        if let Self::Ref(id) = self {
            heap.dec_ref(id);
        }
    }

    /// Structural equality.
    ///
    /// Series compare by remaining elements from their cursor positions;
    /// objects compare by identity (same owning frame); words include their
    /// sub-kind (use [`same_symbol`] for symbol-only comparison); integers
    /// and decimals compare numerically.
    pub fn equals(&self, other: &Self, heap: &Heap) -> bool {
        match (self, other) {
            (Self::None, Self::None) => true,
            (Self::Logic(a), Self::Logic(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Word(a), Self::Word(b))
            | (Self::SetWord(a), Self::SetWord(b))
            | (Self::GetWord(a), Self::GetWord(b))
            | (Self::LitWord(a), Self::LitWord(b)) => a == b,
            (Self::Datatype(a), Self::Datatype(b)) => a == b,
            (Self::Int(i), Self::Ref(id)) | (Self::Ref(id), Self::Int(i)) => {
                if let HeapData::Decimal(d) = heap.get(*id) {
                    *d == crate::decimal::Decimal::from_int(*i)
                } else {
                    false
                }
            }
            (Self::Ref(a), Self::Ref(b)) => {
                if a == b {
                    return true;
                }
                heap_equals(*a, *b, heap)
            }
            _ => false,
        }
    }
}

/// Symbol-comparison helper: two word values (of any sub-kind) carry the
/// same symbol. `None` when either side is not a word.
pub(crate) fn same_symbol(a: &Value, b: &Value) -> Option<bool> {
    Some(a.word_symbol()? == b.word_symbol()?)
}

/// Structural equality between two heap payloads.
fn heap_equals(a: HeapId, b: HeapId, heap: &Heap) -> bool {
    match (heap.get(a), heap.get(b)) {
        (HeapData::Decimal(x), HeapData::Decimal(y)) => x == y,
        (HeapData::Str(x), HeapData::Str(y)) => str_remainder(heap, x) == str_remainder(heap, y),
        (HeapData::Binary(x), HeapData::Binary(y)) => bin_remainder(heap, x) == bin_remainder(heap, y),
        (HeapData::Block(x), HeapData::Block(y)) | (HeapData::Paren(x), HeapData::Paren(y)) => {
            let (xb, xc) = (x.buf, x.cursor);
            let (yb, yc) = (y.buf, y.cursor);
            block_remainder_equals(heap, xb, xc, yb, yc)
        }
        (HeapData::Path(x), HeapData::Path(y)) => {
            x.len() == y.len() && x.iter().zip(y.iter()).all(|(l, r)| l.equals(r, heap))
        }
        (HeapData::Object(x), HeapData::Object(y)) => x.frame == y.frame,
        (HeapData::Bitset(x), HeapData::Bitset(y)) => x == y,
        (HeapData::Port(x), HeapData::Port(y)) => x == y,
        (HeapData::Error(x), HeapData::Error(y)) => x.category == y.category && x.id == y.id && x.args == y.args,
        // Functions (and mismatched payload pairs) are equal only by identity,
        // which the caller already checked.
        _ => false,
    }
}

fn block_remainder_equals(heap: &Heap, a_buf: HeapId, a_cursor: usize, b_buf: HeapId, b_cursor: usize) -> bool {
    let HeapData::BlockBuf(a) = heap.get(a_buf) else { return false };
    let HeapData::BlockBuf(b) = heap.get(b_buf) else { return false };
    let a_rest = &a.values[a_cursor.min(a.values.len())..];
    let b_rest = &b.values[b_cursor.min(b.values.len())..];
    a_rest.len() == b_rest.len() && a_rest.iter().zip(b_rest.iter()).all(|(l, r)| l.equals(r, heap))
}

/// The remaining text of a string series handle (cursor clamped).
pub(crate) fn str_remainder<'h>(heap: &'h Heap, handle: &crate::heap::SeriesHandle) -> &'h str {
    let HeapData::StrBuf(text) = heap.get(handle.buf) else {
        panic!("string handle must point at a string buffer");
    };
    let start = handle.cursor.min(text.chars().count());
    let byte = text.char_indices().nth(start).map_or(text.len(), |(i, _)| i);
    &text[byte..]
}

/// The remaining bytes of a binary series handle (cursor clamped).
pub(crate) fn bin_remainder<'h>(heap: &'h Heap, handle: &crate::heap::SeriesHandle) -> &'h [u8] {
    let HeapData::BinBuf(bytes) = heap.get(handle.buf) else {
        panic!("binary handle must point at a byte buffer");
    };
    &bytes[handle.cursor.min(bytes.len())..]
}

/// Numeric/string ordering used by comparison operators and `sort`.
///
/// `None` means the two values are not comparable.
pub(crate) fn value_cmp(a: &Value, b: &Value, heap: &Heap) -> Option<Ordering> {
    use crate::decimal::Decimal;
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => Some(x.cmp(y)),
        (Value::Int(x), Value::Ref(id)) => match heap.get(*id) {
            HeapData::Decimal(d) => Some(Decimal::from_int(*x).compare(d)),
            _ => None,
        },
        (Value::Ref(id), Value::Int(y)) => match heap.get(*id) {
            HeapData::Decimal(d) => Some(d.compare(&Decimal::from_int(*y))),
            _ => None,
        },
        (Value::Ref(x), Value::Ref(y)) => match (heap.get(*x), heap.get(*y)) {
            (HeapData::Decimal(dx), HeapData::Decimal(dy)) => Some(dx.compare(dy)),
            (HeapData::Str(sx), HeapData::Str(sy)) => Some(str_remainder(heap, sx).cmp(str_remainder(heap, sy))),
            (HeapData::Binary(bx), HeapData::Binary(by)) => Some(bin_remainder(heap, bx).cmp(bin_remainder(heap, by))),
            _ => None,
        },
        (Value::Logic(x), Value::Logic(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Display forms
// ---------------------------------------------------------------------------

/// Renders the human-readable **form** of a value: strings without quotes,
/// blocks without brackets, objects as `field: value` lines.
pub(crate) fn form(value: &Value, heap: &Heap, frames: &Frames, interns: &Interns) -> String {
    let mut out = String::new();
    let mut seen = AHashSet::new();
    write_value(value, heap, frames, interns, &mut out, &mut seen, false);
    out
}

/// Renders the **mold** of a value: round-trippable through the parser
/// where feasible (strings quoted, blocks bracketed, objects as
/// `make object! [...]`).
pub(crate) fn mold(value: &Value, heap: &Heap, frames: &Frames, interns: &Interns) -> String {
    let mut out = String::new();
    let mut seen = AHashSet::new();
    write_value(value, heap, frames, interns, &mut out, &mut seen, true);
    out
}

fn write_value(
    value: &Value,
    heap: &Heap,
    frames: &Frames,
    interns: &Interns,
    out: &mut String,
    seen: &mut AHashSet<HeapId>,
    molded: bool,
) {
    match value {
        Value::None => out.push_str("none"),
        Value::Logic(true) => out.push_str("true"),
        Value::Logic(false) => out.push_str("false"),
        Value::Int(i) => out.push_str(&i.to_string()),
        Value::Word(s) => out.push_str(interns.get(*s)),
        Value::SetWord(s) => {
            out.push_str(interns.get(*s));
            out.push(':');
        }
        Value::GetWord(s) => {
            out.push(':');
            out.push_str(interns.get(*s));
        }
        Value::LitWord(s) => {
            out.push('\'');
            out.push_str(interns.get(*s));
        }
        Value::Datatype(k) => out.push_str(k.type_name()),
        Value::Ref(id) => write_heap_value(*id, heap, frames, interns, out, seen, molded),
    }
}

fn write_heap_value(
    id: HeapId,
    heap: &Heap,
    frames: &Frames,
    interns: &Interns,
    out: &mut String,
    seen: &mut AHashSet<HeapId>,
    molded: bool,
) {
    match heap.get(id) {
        HeapData::Decimal(d) => out.push_str(&d.to_string()),
        HeapData::Str(handle) => {
            let text = str_remainder(heap, handle);
            if molded {
                out.push('"');
                for c in text.chars() {
                    match c {
                        '"' => out.push_str("^\""),
                        '^' => out.push_str("^^"),
                        '\n' => out.push_str("^/"),
                        '\t' => out.push_str("^-"),
                        other => out.push(other),
                    }
                }
                out.push('"');
            } else {
                out.push_str(text);
            }
        }
        HeapData::Binary(handle) => {
            out.push_str("#{");
            for byte in bin_remainder(heap, handle) {
                out.push_str(&format!("{byte:02X}"));
            }
            out.push('}');
        }
        HeapData::Block(handle) => {
            let handle = *handle;
            if molded {
                out.push('[');
            }
            write_buf_elements(handle, heap, frames, interns, out, seen, molded);
            if molded {
                out.push(']');
            }
        }
        HeapData::Paren(handle) => {
            let handle = *handle;
            out.push('(');
            write_buf_elements(handle, heap, frames, interns, out, seen, molded);
            out.push(')');
        }
        HeapData::Path(segments) => {
            for (i, segment) in segments.iter().enumerate() {
                if i > 0 {
                    out.push('/');
                }
                write_value(segment, heap, frames, interns, out, seen, molded);
            }
        }
        HeapData::Function(f) => f.write_display(heap, frames, interns, out, molded),
        HeapData::Object(object) => write_object(object.frame, heap, frames, interns, out, seen, molded),
        HeapData::Bitset(bitset) => {
            out.push_str("make bitset! \"");
            for byte in bitset.iter() {
                if byte.is_ascii_graphic() || byte == b' ' {
                    out.push(char::from(byte));
                } else {
                    out.push_str(&format!("^({byte:02X})"));
                }
            }
            out.push('"');
        }
        HeapData::Port(port) => {
            out.push_str("make port! \"");
            out.push_str(&port.target);
            out.push('"');
        }
        HeapData::Error(err) => {
            out.push_str("make error! [");
            out.push_str(err.category.as_str());
            out.push(' ');
            out.push_str(&err.id_text());
            for arg in err.args.iter().filter(|a| !a.is_empty()) {
                out.push_str(" \"");
                out.push_str(arg);
                out.push('"');
            }
            out.push(']');
        }
        HeapData::StrBuf(_) | HeapData::BinBuf(_) | HeapData::BlockBuf(_) => {
            // Buffers never leak into value position.
            out.push_str("buffer");
        }
    }
}

fn write_buf_elements(
    handle: crate::heap::SeriesHandle,
    heap: &Heap,
    frames: &Frames,
    interns: &Interns,
    out: &mut String,
    seen: &mut AHashSet<HeapId>,
    molded: bool,
) {
    if !seen.insert(handle.buf) {
        out.push_str("...");
        return;
    }
    let HeapData::BlockBuf(buf) = heap.get(handle.buf) else {
        panic!("block handle must point at a block buffer");
    };
    let rest = &buf.values[handle.cursor.min(buf.values.len())..];
    for (i, element) in rest.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        write_value(element, heap, frames, interns, out, seen, molded);
    }
    seen.remove(&handle.buf);
}

fn write_object(
    frame: FrameId,
    heap: &Heap,
    frames: &Frames,
    interns: &Interns,
    out: &mut String,
    seen: &mut AHashSet<HeapId>,
    molded: bool,
) {
    if molded {
        out.push_str("make object! [");
    }
    for (i, (symbol, value)) in frames.get(frame).bindings().enumerate() {
        if i > 0 || molded {
            out.push('\n');
        }
        if molded {
            out.push_str("    ");
        }
        out.push_str(interns.get(symbol));
        out.push_str(": ");
        write_value(value, heap, frames, interns, out, seen, true);
    }
    if molded {
        out.push_str("\n]");
    }
}

// ---------------------------------------------------------------------------
// Public owned values
// ---------------------------------------------------------------------------

/// A viro value exported out of the interpreter.
///
/// This is the public-facing value type: it owns all its data and can be
/// freely cloned, compared, and serialized without access to the heap.
/// `Display` renders the molded form.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum Datum {
    None,
    Logic(bool),
    Integer(i64),
    Decimal(crate::decimal::Decimal),
    String(String),
    Binary(Vec<u8>),
    Word(String),
    SetWord(String),
    GetWord(String),
    LitWord(String),
    Datatype(String),
    Block(Vec<Datum>),
    Paren(Vec<Datum>),
    Path(Vec<Datum>),
    Function { name: String, native: bool },
    Object(Vec<(String, Datum)>),
    Bitset(Vec<u8>),
    Port(String),
    Error {
        category: String,
        id: String,
        args: [String; 3],
    },
}

impl fmt::Display for Datum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Logic(b) => write!(f, "{b}"),
            Self::Integer(i) => write!(f, "{i}"),
            Self::Decimal(d) => write!(f, "{d}"),
            Self::String(s) => write!(f, "\"{s}\""),
            Self::Binary(bytes) => {
                write!(f, "#{{")?;
                for byte in bytes {
                    write!(f, "{byte:02X}")?;
                }
                write!(f, "}}")
            }
            Self::Word(w) => write!(f, "{w}"),
            Self::SetWord(w) => write!(f, "{w}:"),
            Self::GetWord(w) => write!(f, ":{w}"),
            Self::LitWord(w) => write!(f, "'{w}"),
            Self::Datatype(name) => write!(f, "{name}"),
            Self::Block(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Self::Paren(items) => {
                write!(f, "(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, ")")
            }
            Self::Path(segments) => {
                for (i, segment) in segments.iter().enumerate() {
                    if i > 0 {
                        write!(f, "/")?;
                    }
                    write!(f, "{segment}")?;
                }
                Ok(())
            }
            Self::Function { name, native } => {
                if *native {
                    write!(f, "make native! [{name}]")
                } else {
                    write!(f, "make function! [{name}]")
                }
            }
            Self::Object(fields) => {
                write!(f, "make object! [")?;
                for (name, value) in fields {
                    write!(f, "\n    {name}: {value}")?;
                }
                write!(f, "\n]")
            }
            Self::Bitset(bytes) => {
                write!(f, "make bitset! \"")?;
                for byte in bytes {
                    write!(f, "{c}", c = char::from(*byte))?;
                }
                write!(f, "\"")
            }
            Self::Port(target) => write!(f, "make port! \"{target}\""),
            Self::Error { category, id, args } => {
                write!(f, "make error! [{category} {id}")?;
                for arg in args.iter().filter(|a| !a.is_empty()) {
                    write!(f, " \"{arg}\"")?;
                }
                write!(f, "]")
            }
        }
    }
}

/// Exports an internal value as an owned [`Datum`].
///
/// Does not consume the value; the caller still owns its refcount. Cyclic
/// blocks export an ellipsis word at the point of recursion.
pub(crate) fn export(value: &Value, heap: &Heap, frames: &Frames, interns: &Interns) -> Datum {
    let mut seen = AHashSet::new();
    export_inner(value, heap, frames, interns, &mut seen)
}

fn export_inner(value: &Value, heap: &Heap, frames: &Frames, interns: &Interns, seen: &mut AHashSet<HeapId>) -> Datum {
    match value {
        Value::None => Datum::None,
        Value::Logic(b) => Datum::Logic(*b),
        Value::Int(i) => Datum::Integer(*i),
        Value::Word(s) => Datum::Word(interns.get(*s).to_owned()),
        Value::SetWord(s) => Datum::SetWord(interns.get(*s).to_owned()),
        Value::GetWord(s) => Datum::GetWord(interns.get(*s).to_owned()),
        Value::LitWord(s) => Datum::LitWord(interns.get(*s).to_owned()),
        Value::Datatype(k) => Datum::Datatype(k.type_name().to_owned()),
        Value::Ref(id) => match heap.get(*id) {
            HeapData::Decimal(d) => Datum::Decimal(d.clone()),
            HeapData::Str(handle) => Datum::String(str_remainder(heap, handle).to_owned()),
            HeapData::Binary(handle) => Datum::Binary(bin_remainder(heap, handle).to_vec()),
            HeapData::Block(handle) | HeapData::Paren(handle) => {
                let is_paren = matches!(heap.get(*id), HeapData::Paren(_));
                if !seen.insert(handle.buf) {
                    return Datum::Word("...".to_owned());
                }
                let HeapData::BlockBuf(buf) = heap.get(handle.buf) else {
                    panic!("block handle must point at a block buffer");
                };
                let items: Vec<Datum> = buf.values[handle.cursor.min(buf.values.len())..]
                    .iter()
                    .map(|v| export_inner(v, heap, frames, interns, seen))
                    .collect();
                seen.remove(&handle.buf);
                if is_paren { Datum::Paren(items) } else { Datum::Block(items) }
            }
            HeapData::Path(segments) => Datum::Path(
                segments
                    .iter()
                    .map(|v| export_inner(v, heap, frames, interns, seen))
                    .collect(),
            ),
            HeapData::Function(f) => Datum::Function {
                name: interns.get(f.name).to_owned(),
                native: f.is_native(),
            },
            HeapData::Object(object) => Datum::Object(
                frames
                    .get(object.frame)
                    .bindings()
                    .map(|(symbol, v)| (interns.get(symbol).to_owned(), export_inner(v, heap, frames, interns, seen)))
                    .collect(),
            ),
            HeapData::Bitset(bitset) => Datum::Bitset(bitset.iter().collect()),
            HeapData::Port(port) => Datum::Port(port.target.clone()),
            HeapData::Error(err) => Datum::Error {
                category: err.category.as_str().to_owned(),
                id: err.id_text().into_owned(),
                args: err.args.clone(),
            },
            HeapData::StrBuf(_) | HeapData::BinBuf(_) | HeapData::BlockBuf(_) => Datum::None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heap::BlockBuf;

    /// Truthiness: only none and false are falsy.
    #[test]
    fn truthiness() {
        let mut heap = Heap::new();
        assert!(!Value::None.is_truthy());
        assert!(!Value::Logic(false).is_truthy());
        assert!(Value::Logic(true).is_truthy());
        assert!(Value::Int(0).is_truthy());
        let empty = heap.alloc_string(String::new());
        assert!(empty.is_truthy());
        empty.drop_with_heap(&mut heap);
    }

    /// Integer/decimal equality promotes to decimal.
    #[test]
    fn numeric_promotion_equality() {
        let mut heap = Heap::new();
        let one_dec = heap.alloc_decimal(crate::decimal::Decimal::parse("1.0").unwrap());
        assert!(Value::Int(1).equals(&one_dec, &heap));
        assert!(!Value::Int(2).equals(&one_dec, &heap));
        one_dec.drop_with_heap(&mut heap);
    }

    /// Series equality compares from the cursor position, not the head.
    #[test]
    fn series_equality_from_cursor() {
        let mut heap = Heap::new();
        let full = heap.alloc_string("abcdef".into());
        let Value::Ref(full_id) = &full else { panic!("expected ref") };
        let HeapData::Str(handle) = heap.get(*full_id) else { panic!("expected str") };
        let buf = handle.buf;
        heap.inc_ref(buf);
        let tail = Value::Ref(heap.allocate(HeapData::Str(crate::heap::SeriesHandle { buf, cursor: 3 })));
        let def = heap.alloc_string("def".into());
        assert!(tail.equals(&def, &heap));
        assert!(!full.equals(&def, &heap));
        full.drop_with_heap(&mut heap);
        tail.drop_with_heap(&mut heap);
        def.drop_with_heap(&mut heap);
    }

    /// Words compare including sub-kind; the symbol helper ignores it.
    #[test]
    fn word_equality_and_symbol_helper() {
        let heap = Heap::new();
        let mut interns = Interns::new();
        let sym = interns.intern("alpha");
        let word = Value::Word(sym);
        let lit = Value::LitWord(sym);
        assert!(!word.equals(&lit, &heap));
        assert_eq!(same_symbol(&word, &lit), Some(true));
        assert_eq!(same_symbol(&word, &Value::Int(1)), None);
    }

    /// Mold brackets and quotes; form does not. form(form(v)) = form(v).
    #[test]
    fn form_and_mold() {
        let mut heap = Heap::new();
        let frames = Frames::new();
        let mut interns = Interns::new();
        let hello = heap.alloc_string("hello".into());
        let items = vec![Value::Int(1), hello.clone_with_heap(&heap)];
        let block = heap.alloc_block(BlockBuf::new(items));
        assert_eq!(form(&hello, &heap, &frames, &interns), "hello");
        assert_eq!(mold(&hello, &heap, &frames, &interns), "\"hello\"");
        assert_eq!(form(&block, &heap, &frames, &interns), "1 hello");
        assert_eq!(mold(&block, &heap, &frames, &interns), "[1 \"hello\"]");
        let word = Value::Word(interns.intern("x"));
        assert_eq!(mold(&word, &heap, &frames, &interns), "x");
        let formed = form(&hello, &heap, &frames, &interns);
        let reformed = heap.alloc_string(formed.clone());
        assert_eq!(form(&reformed, &heap, &frames, &interns), formed);
        hello.drop_with_heap(&mut heap);
        block.drop_with_heap(&mut heap);
        reformed.drop_with_heap(&mut heap);
    }

    /// A block that contains itself molds with an ellipsis, not forever.
    #[test]
    fn cyclic_block_mold_terminates() {
        let mut heap = Heap::new();
        let frames = Frames::new();
        let interns = Interns::new();
        let block = heap.alloc_block(BlockBuf::new(vec![]));
        let alias = block.clone_with_heap(&heap);
        let Value::Ref(id) = &block else { panic!("expected ref") };
        let HeapData::Block(handle) = heap.get(*id) else { panic!("expected block") };
        let buf = handle.buf;
        let HeapData::BlockBuf(data) = heap.get_mut(buf) else { panic!("expected buffer") };
        data.values.push(alias);
        assert_eq!(mold(&block, &heap, &frames, &interns), "[[...]]");
        block.drop_with_heap(&mut heap);
    }

    /// Datatype words resolve to kinds and back.
    #[test]
    fn kind_symbol_round_trip() {
        assert_eq!(Kind::Object.type_name(), "object!");
        assert_eq!(Kind::from_type_symbol(StaticSymbols::IntegerType.into()), Some(Kind::Integer));
        assert_eq!(Kind::from_type_symbol(StaticSymbols::Append.into()), None);
        for (kind, sym) in KIND_SYMBOLS {
            assert_eq!(Kind::from_type_symbol(sym.into()), Some(kind));
        }
    }
}
