//! Error model and the control-flow signaling channel.
//!
//! Failures and non-local exits share one channel: [`RunError`]. Ordinary
//! script failures travel as boxed [`ErrorValue`] payloads (category + id +
//! three formatting slots + optional source position), `break` / `continue` /
//! `return` travel as [`ThrowSignal`] variants that loops and function
//! invocations inspect cheaply, and invariant violations inside the
//! interpreter itself travel as `Internal` and are never catchable by user
//! code.
//!
//! Raise sites build errors through the constructor helpers on
//! [`ErrorValue`] so every error carries a well-formed id and argument
//! vector.

use std::{borrow::Cow, fmt};

use strum::IntoStaticStr;

use crate::{
    heap::Heap,
    value::{Kind, Value},
};

/// Result type alias for operations that can produce a runtime error.
pub(crate) type RunResult<T> = Result<T, RunError>;

/// A source position: 1-based line and column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct CodeLoc {
    pub line: u32,
    pub column: u32,
}

impl fmt::Display for CodeLoc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {line}, column {column}", line = self.line, column = self.column)
    }
}

/// Error category. `Throw` is reserved for control-flow signals and never
/// reaches user error handlers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoStaticStr, serde::Serialize, serde::Deserialize)]
pub(crate) enum Category {
    Script,
    Math,
    Access,
    Internal,
    Throw,
}

impl Category {
    pub fn as_str(self) -> &'static str {
        self.into()
    }
}

/// Machine-readable error kind within a category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoStaticStr, serde::Serialize, serde::Deserialize)]
#[strum(serialize_all = "kebab-case")]
pub(crate) enum ErrorId {
    // --- Script ---
    ArgCount,
    TypeMismatch,
    InvalidOperation,
    InvalidSyntax,
    InvalidArg,
    NoValue,
    NotComparable,
    OutOfBounds,
    IndexOutOfRange,
    EmptySeries,
    ReservedField,
    ObjectFieldDup,
    NoSuchField,
    NoSuchBreakpoint,
    NoBody,
    SpecUnsupported,
    SourceUnsupported,
    ActionNoImpl,
    // --- Math ---
    Overflow,
    Underflow,
    DivByZero,
    /// Operand kinds unusable for an arithmetic op. Displayed as
    /// `<op>-type-error` with the operator in the first argument slot.
    #[strum(serialize = "type-error")]
    MathType,
    // --- Access ---
    SandboxViolation,
    Cancelled,
    // --- Internal ---
    RecursionLimit,
    // --- Throw ---
    Break,
    Continue,
    Return,
}

impl ErrorId {
    pub fn as_str(self) -> &'static str {
        self.into()
    }
}

/// A first-class error payload: category, id, three string argument slots,
/// and an optional source position with the molded offending expression.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub(crate) struct ErrorValue {
    pub category: Category,
    pub id: ErrorId,
    pub args: [String; 3],
    pub position: Option<CodeLoc>,
    pub near: Option<String>,
}

impl ErrorValue {
    pub fn new(category: Category, id: ErrorId, args: [String; 3]) -> Self {
        Self {
            category,
            id,
            args,
            position: None,
            near: None,
        }
    }

    /// The id as displayed to users. `MathType` composes the failing
    /// operator into the id (`+` becomes `+-type-error`).
    pub fn id_text(&self) -> Cow<'static, str> {
        if self.id == ErrorId::MathType && !self.args[0].is_empty() {
            Cow::Owned(format!("{op}-type-error", op = self.args[0]))
        } else {
            Cow::Borrowed(self.id.as_str())
        }
    }

    // ------------------------------------------------------------------
    // Constructor helpers. Each returns a ready-to-propagate RunError.
    // ------------------------------------------------------------------

    pub fn arg_count(name: &str, expected: usize, got: usize) -> RunError {
        Self::new(
            Category::Script,
            ErrorId::ArgCount,
            [name.to_owned(), expected.to_string(), got.to_string()],
        )
        .into()
    }

    pub fn type_mismatch(expected: &str, got: Kind) -> RunError {
        Self::new(
            Category::Script,
            ErrorId::TypeMismatch,
            [expected.to_owned(), got.type_name().to_owned(), String::new()],
        )
        .into()
    }

    pub fn invalid_operation(what: impl Into<String>) -> RunError {
        Self::new(Category::Script, ErrorId::InvalidOperation, [what.into(), String::new(), String::new()]).into()
    }

    pub fn invalid_syntax(what: impl Into<String>) -> RunError {
        Self::new(Category::Script, ErrorId::InvalidSyntax, [what.into(), String::new(), String::new()]).into()
    }

    pub fn invalid_arg(what: impl Into<String>) -> RunError {
        Self::new(Category::Script, ErrorId::InvalidArg, [what.into(), String::new(), String::new()]).into()
    }

    pub fn no_value(word: &str) -> RunError {
        Self::new(Category::Script, ErrorId::NoValue, [word.to_owned(), String::new(), String::new()]).into()
    }

    pub fn not_comparable(left: Kind, right: Kind) -> RunError {
        Self::new(
            Category::Script,
            ErrorId::NotComparable,
            [left.type_name().to_owned(), right.type_name().to_owned(), String::new()],
        )
        .into()
    }

    pub fn out_of_bounds(what: impl Into<String>) -> RunError {
        Self::new(Category::Script, ErrorId::OutOfBounds, [what.into(), String::new(), String::new()]).into()
    }

    pub fn index_out_of_range(index: i64, len: usize) -> RunError {
        Self::new(
            Category::Script,
            ErrorId::IndexOutOfRange,
            [index.to_string(), len.to_string(), String::new()],
        )
        .into()
    }

    pub fn empty_series(op: &str) -> RunError {
        Self::new(Category::Script, ErrorId::EmptySeries, [op.to_owned(), String::new(), String::new()]).into()
    }

    pub fn reserved_field(name: &str) -> RunError {
        Self::new(Category::Script, ErrorId::ReservedField, [name.to_owned(), String::new(), String::new()]).into()
    }

    pub fn object_field_dup(name: &str) -> RunError {
        Self::new(Category::Script, ErrorId::ObjectFieldDup, [name.to_owned(), String::new(), String::new()]).into()
    }

    pub fn no_such_field(name: &str) -> RunError {
        Self::new(Category::Script, ErrorId::NoSuchField, [name.to_owned(), String::new(), String::new()]).into()
    }

    pub fn no_body(name: &str) -> RunError {
        Self::new(Category::Script, ErrorId::NoBody, [name.to_owned(), String::new(), String::new()]).into()
    }

    pub fn spec_unsupported(what: impl Into<String>) -> RunError {
        Self::new(Category::Script, ErrorId::SpecUnsupported, [what.into(), String::new(), String::new()]).into()
    }

    pub fn source_unsupported(what: impl Into<String>) -> RunError {
        Self::new(Category::Script, ErrorId::SourceUnsupported, [what.into(), String::new(), String::new()]).into()
    }

    pub fn action_no_impl(op: &str, kind: Kind) -> RunError {
        Self::new(
            Category::Script,
            ErrorId::ActionNoImpl,
            [op.to_owned(), kind.type_name().to_owned(), String::new()],
        )
        .into()
    }

    pub fn overflow(op: &str) -> RunError {
        Self::new(Category::Math, ErrorId::Overflow, [op.to_owned(), String::new(), String::new()]).into()
    }

    pub fn div_by_zero() -> RunError {
        Self::new(Category::Math, ErrorId::DivByZero, [String::new(), String::new(), String::new()]).into()
    }

    pub fn math_type(op: &str, left: Kind, right: Kind) -> RunError {
        Self::new(
            Category::Math,
            ErrorId::MathType,
            [op.to_owned(), left.type_name().to_owned(), right.type_name().to_owned()],
        )
        .into()
    }

    pub fn cancelled() -> RunError {
        Self::new(Category::Access, ErrorId::Cancelled, [String::new(), String::new(), String::new()]).into()
    }
}

/// Control-flow signals carried on the error channel (category `Throw`).
///
/// Loops consume level-1 `Break`/`Continue`, decrement and re-raise higher
/// levels; function invocations consume `Return` at their own boundary.
#[derive(Debug)]
pub(crate) enum ThrowSignal {
    Break { levels: u32 },
    Continue { levels: u32 },
    Return { value: Value },
}

/// The failure channel of evaluation.
#[derive(Debug)]
pub(crate) enum RunError {
    /// Internal interpreter error - indicates a bug in viro, not user code.
    /// Never catchable by `try`.
    Internal(Cow<'static, str>),
    /// A catchable script/math/access error.
    Err(Box<ErrorValue>),
    /// A control-flow signal. Never visible to user error handlers.
    Throw(ThrowSignal),
}

impl RunError {
    pub fn recursion_limit(limit: usize) -> Self {
        Self::Internal(Cow::Owned(format!("recursion depth limit of {limit} exceeded")))
    }

    /// Attaches a source position (and optionally the molded offending
    /// expression) to a script error that does not carry one yet. Signals
    /// and internal errors pass through untouched.
    pub fn with_position(mut self, loc: CodeLoc, near: Option<&str>) -> Self {
        if let Self::Err(err) = &mut self {
            if err.position.is_none() {
                err.position = Some(loc);
                if err.near.is_none() {
                    err.near = near.map(str::to_owned);
                }
            }
        }
        self
    }

    /// Releases any heap value the error carries.
    ///
    /// Only `Throw(Return)` owns a value; every discard site must route
    /// through here so refcounts stay balanced on abandoned signals.
    pub fn drop_with_heap(self, heap: &mut Heap) {
        if let Self::Throw(ThrowSignal::Return { value }) = self {
            value.drop_with_heap(heap);
        }
    }
}

impl From<ErrorValue> for RunError {
    fn from(err: ErrorValue) -> Self {
        Self::Err(Box::new(err))
    }
}

/// An error as surfaced to embedders: the formatted top-level diagnostic.
///
/// Produced when a [`RunError`] escapes evaluation. Owns all its data and is
/// independent of the interpreter that produced it.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Exception {
    /// Error category name (`Script`, `Math`, `Access`, `Internal`).
    pub category: String,
    /// Machine-readable error id (e.g. `no-value`, `arg-count`).
    pub id: String,
    /// Up to three formatting arguments; unused slots are empty.
    pub args: [String; 3],
    /// Source position of the offending expression, when known.
    pub position: Option<CodeLoc>,
    /// Molded text of the offending expression, when known.
    pub near: Option<String>,
}

impl Exception {
    pub(crate) fn from_error_value(err: &ErrorValue) -> Self {
        Self {
            category: err.category.as_str().to_owned(),
            id: err.id_text().into_owned(),
            args: err.args.clone(),
            position: err.position,
            near: err.near.clone(),
        }
    }

    pub(crate) fn internal(message: &str) -> Self {
        Self {
            category: Category::Internal.as_str().to_owned(),
            id: String::new(),
            args: [message.to_owned(), String::new(), String::new()],
            position: None,
            near: None,
        }
    }
}

impl fmt::Display for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "** {category} error", category = self.category)?;
        if !self.id.is_empty() {
            write!(f, ": {id}", id = self.id)?;
        }
        let args: Vec<&str> = self.args.iter().map(String::as_str).filter(|a| !a.is_empty()).collect();
        if !args.is_empty() {
            write!(f, ": {joined}", joined = args.join(" "))?;
        }
        if let Some(near) = &self.near {
            write!(f, "\n** Near: {near}")?;
        }
        if let Some(position) = &self.position {
            write!(f, "\n** Where: {position}")?;
        }
        Ok(())
    }
}

impl std::error::Error for Exception {}

#[cfg(test)]
mod tests {
    use super::*;

    /// Error ids serialize in kebab-case.
    #[test]
    fn error_id_spelling() {
        assert_eq!(ErrorId::ArgCount.as_str(), "arg-count");
        assert_eq!(ErrorId::DivByZero.as_str(), "div-by-zero");
        assert_eq!(ErrorId::ObjectFieldDup.as_str(), "object-field-dup");
        assert_eq!(ErrorId::ActionNoImpl.as_str(), "action-no-impl");
    }

    /// MathType composes the operator into the displayed id.
    #[test]
    fn math_type_error_id_includes_op() {
        let RunError::Err(err) = ErrorValue::math_type("+", Kind::Integer, Kind::String) else {
            panic!("expected Err variant");
        };
        assert_eq!(err.id_text(), "+-type-error");
    }

    /// The formatted diagnostic carries category, id, args, and position.
    #[test]
    fn exception_display_format() {
        let mut err = ErrorValue::new(
            Category::Script,
            ErrorId::NoValue,
            ["frobnicate".to_owned(), String::new(), String::new()],
        );
        err.position = Some(CodeLoc { line: 3, column: 7 });
        let exc = Exception::from_error_value(&err);
        let text = exc.to_string();
        assert_eq!(text, "** Script error: no-value: frobnicate\n** Where: line 3, column 7");
    }

    /// with_position does not overwrite an already-attached position.
    #[test]
    fn with_position_keeps_first_location() {
        let err = ErrorValue::no_value("x")
            .with_position(CodeLoc { line: 1, column: 1 }, Some("x"))
            .with_position(CodeLoc { line: 9, column: 9 }, None);
        let RunError::Err(err) = err else { panic!("expected Err variant") };
        assert_eq!(err.position, Some(CodeLoc { line: 1, column: 1 }));
        assert_eq!(err.near.as_deref(), Some("x"));
    }
}
