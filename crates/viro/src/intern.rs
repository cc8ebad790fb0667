//! Symbol interning for words and field names.
//!
//! Every word in a viro program (plain, set-, get-, or lit-word) is an
//! interned symbol. The interner stores unique symbol text in a vector and
//! hands out [`SymbolId`] indices, so word comparison during evaluation is an
//! integer compare and frame binding tables never clone strings.
//!
//! SymbolIds are laid out as follows:
//! * `0..count(StaticSymbols)` - symbols the runtime itself needs (native
//!   names, datatype words, reserved field names), known at compile time
//! * `1024+` - symbols interned per interpreter instance

use ahash::AHashMap;
use strum::{EnumIter, FromRepr, IntoEnumIterator, IntoStaticStr};

/// Index into the symbol interner's storage.
///
/// Uses `u32` to save space in `Value` and in frame binding tables. This
/// limits us to ~4 billion unique symbols, which is more than sufficient.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub(crate) struct SymbolId(u32);

/// First id handed out for dynamically interned symbols.
const DYNAMIC_SYMBOL_OFFSET: u32 = 1024;

impl SymbolId {
    #[inline]
    fn dynamic(index: usize) -> Self {
        Self(DYNAMIC_SYMBOL_OFFSET + u32::try_from(index).expect("symbol index out of u32 range"))
    }
}

impl From<StaticSymbols> for SymbolId {
    #[inline]
    fn from(s: StaticSymbols) -> Self {
        Self(s as u32)
    }
}

/// Symbol text known at compile time and pre-interned in every interpreter.
///
/// Covers every word the runtime itself mentions: native names, datatype
/// words, literal words, reserved object field names, and the refinement
/// names of built-in natives. Symbol text comes from the strum serialization,
/// so the variant list below is the single source of truth for spelling.
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromRepr, EnumIter, IntoStaticStr)]
#[strum(serialize_all = "kebab-case")]
pub(crate) enum StaticSymbols {
    // ==========================
    // Infix operators
    #[strum(serialize = "+")]
    Add,
    #[strum(serialize = "-")]
    Subtract,
    #[strum(serialize = "*")]
    Multiply,
    #[strum(serialize = "/")]
    Divide,
    #[strum(serialize = "=")]
    Equal,
    #[strum(serialize = "<>")]
    NotEqual,
    #[strum(serialize = "<")]
    Less,
    #[strum(serialize = ">")]
    Greater,
    #[strum(serialize = "<=")]
    LessEqual,
    #[strum(serialize = ">=")]
    GreaterEqual,
    And,
    Or,

    // ==========================
    // Prefix natives
    Not,
    All,
    Any,
    Fn,
    Object,
    Context,
    Make,
    Do,
    Reduce,
    Compose,
    Get,
    Set,
    Try,
    TypeOf,
    WordsOf,
    ValuesOf,
    Loop,
    While,
    Foreach,
    Either,
    If,
    Break,
    Continue,
    Return,
    Print,
    Probe,
    Join,
    Form,
    Mold,
    Trace,

    // ==========================
    // Actions (dispatched on first-argument type)
    Select,
    Put,
    First,
    Append,
    Insert,
    Copy,
    Find,
    Sort,
    Reverse,
    Take,
    Remove,
    Skip,
    Next,
    Change,
    Poke,
    Pick,
    Head,
    #[strum(serialize = "length?")]
    Length,
    #[strum(serialize = "empty?")]
    Empty,

    // ==========================
    // Literal words bound in the root frame
    True,
    False,
    #[strum(serialize = "none")]
    NoneWord,

    // ==========================
    // Reserved object field names
    Parent,
    Spec,

    // ==========================
    // Refinement names used by built-in natives
    Levels,
    Default,
    On,
    Off,

    // ==========================
    // Datatype words
    #[strum(serialize = "none!")]
    NoneType,
    #[strum(serialize = "logic!")]
    LogicType,
    #[strum(serialize = "integer!")]
    IntegerType,
    #[strum(serialize = "decimal!")]
    DecimalType,
    #[strum(serialize = "string!")]
    StringType,
    #[strum(serialize = "binary!")]
    BinaryType,
    #[strum(serialize = "block!")]
    BlockType,
    #[strum(serialize = "paren!")]
    ParenType,
    #[strum(serialize = "path!")]
    PathType,
    #[strum(serialize = "word!")]
    WordType,
    #[strum(serialize = "set-word!")]
    SetWordType,
    #[strum(serialize = "get-word!")]
    GetWordType,
    #[strum(serialize = "lit-word!")]
    LitWordType,
    #[strum(serialize = "datatype!")]
    DatatypeType,
    #[strum(serialize = "function!")]
    FunctionType,
    #[strum(serialize = "native!")]
    NativeType,
    #[strum(serialize = "object!")]
    ObjectType,
    #[strum(serialize = "port!")]
    PortType,
    #[strum(serialize = "bitset!")]
    BitsetType,
    #[strum(serialize = "error!")]
    ErrorType,
}

impl StaticSymbols {
    /// Returns the symbol text for this static symbol.
    #[inline]
    pub fn as_str(self) -> &'static str {
        self.into()
    }
}

/// Storage for interned symbols, owned by the interpreter instance.
///
/// Static symbols are present in the text map from construction; dynamic
/// symbols are appended as the parser and natives encounter new words.
/// Lookups by id never fail for ids this interner produced.
#[derive(Debug)]
pub(crate) struct Interns {
    /// Dynamically interned symbol text; `SymbolId` = offset + index.
    symbols: Vec<String>,
    /// Text to id for both static and dynamic symbols.
    map: AHashMap<String, SymbolId>,
}

impl Interns {
    pub fn new() -> Self {
        let mut map = AHashMap::with_capacity(StaticSymbols::iter().count() * 2);
        for sym in StaticSymbols::iter() {
            map.insert(sym.as_str().to_owned(), SymbolId::from(sym));
        }
        Self { symbols: Vec::new(), map }
    }

    /// Interns `text`, returning the existing id if already present.
    pub fn intern(&mut self, text: &str) -> SymbolId {
        if let Some(id) = self.map.get(text) {
            return *id;
        }
        let id = SymbolId::dynamic(self.symbols.len());
        self.symbols.push(text.to_owned());
        self.map.insert(text.to_owned(), id);
        id
    }

    /// Returns the id for `text` without interning it.
    pub fn lookup(&self, text: &str) -> Option<SymbolId> {
        self.map.get(text).copied()
    }

    /// Returns the symbol text for an id.
    ///
    /// # Panics
    /// Panics if `id` was not produced by this interner (an interpreter
    /// invariant violation, not a user-reachable condition).
    pub fn get(&self, id: SymbolId) -> &str {
        if id.0 < DYNAMIC_SYMBOL_OFFSET {
            StaticSymbols::from_repr(u16::try_from(id.0).expect("static symbol id out of range"))
                .expect("invalid static symbol id")
                .as_str()
        } else {
            &self.symbols[(id.0 - DYNAMIC_SYMBOL_OFFSET) as usize]
        }
    }

    /// Number of dynamically interned symbols (excludes the static set).
    pub fn dynamic_count(&self) -> usize {
        self.symbols.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Interning the same text twice must return the same id.
    #[test]
    fn intern_is_idempotent() {
        let mut interns = Interns::new();
        let a = interns.intern("velocity");
        let b = interns.intern("velocity");
        assert_eq!(a, b);
        assert_eq!(interns.dynamic_count(), 1);
    }

    /// Static symbol text resolves to the static id, not a dynamic one.
    #[test]
    fn static_symbols_are_preinterned() {
        let mut interns = Interns::new();
        let id = interns.intern("append");
        assert_eq!(id, SymbolId::from(StaticSymbols::Append));
        assert_eq!(interns.dynamic_count(), 0);
    }

    /// Round-trip: id back to text for both static and dynamic symbols.
    #[test]
    fn get_returns_original_text() {
        let mut interns = Interns::new();
        assert_eq!(interns.get(StaticSymbols::TypeOf.into()), "type-of");
        assert_eq!(interns.get(StaticSymbols::Length.into()), "length?");
        assert_eq!(interns.get(StaticSymbols::ObjectType.into()), "object!");
        let id = interns.intern("--shout");
        assert_eq!(interns.get(id), "--shout");
    }

    /// Operator spellings survive the strum round-trip.
    #[test]
    fn operator_spellings() {
        let interns = Interns::new();
        assert_eq!(interns.lookup("+"), Some(StaticSymbols::Add.into()));
        assert_eq!(interns.lookup("<>"), Some(StaticSymbols::NotEqual.into()));
        assert_eq!(interns.lookup("<="), Some(StaticSymbols::LessEqual.into()));
    }
}
