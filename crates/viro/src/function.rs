//! Function values: parameter specs, native/user split, closure capture.

use smallvec::SmallVec;

use crate::{
    error::{ErrorValue, RunResult},
    frame::{FrameId, Frames},
    heap::{Heap, HeapData, HeapId},
    intern::{Interns, SymbolId},
    value::{Kind, Value},
};

/// Index into the static native descriptor table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct NativeId(pub u16);

/// Which frame a native executes against.
///
/// The registration descriptor carries this explicitly: most natives run in
/// the caller's current frame (`Caller`); a native that binds words of its
/// own (such as `foreach`'s loop word) asks for a fresh child frame
/// (`Isolated`), which the invocation pushes and pops around the call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FramePolicy {
    Caller,
    Isolated,
}

/// One parameter of a function.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ParamSpec {
    pub name: SymbolId,
    /// Declared type, or `None` meaning any.
    pub hint: Option<Kind>,
    /// Whether the caller pre-evaluates the argument. False for lit-word
    /// parameters, which consume the raw token.
    pub eval: bool,
    pub refinement: bool,
    /// Value-taking refinement (`--name [type!]` in a spec).
    pub takes_value: bool,
    pub optional: bool,
}

impl ParamSpec {
    pub fn positional(name: SymbolId, eval: bool) -> Self {
        Self {
            name,
            hint: None,
            eval,
            refinement: false,
            takes_value: false,
            optional: false,
        }
    }

    pub fn refinement(name: SymbolId, takes_value: bool) -> Self {
        Self {
            name,
            hint: None,
            eval: true,
            refinement: true,
            takes_value,
            optional: true,
        }
    }
}

/// Documentation attached to a function: a summary line.
///
/// User functions pick this up from an optional leading string in their spec
/// block; natives carry it in the registration descriptor.
#[derive(Debug, Clone)]
pub(crate) struct Docs {
    pub summary: String,
}

/// Native (host-implemented) or user (body-bearing) function.
#[derive(Debug, Clone, Copy)]
pub(crate) enum FunctionKind {
    Native {
        id: NativeId,
        policy: FramePolicy,
    },
    /// A user function: an owned body block handle and the lexical parent
    /// frame captured at creation.
    User {
        body: HeapId,
        parent: FrameId,
    },
}

/// A function value.
#[derive(Debug)]
pub(crate) struct FunctionData {
    /// Name for diagnostics and display; the set-word it was first assigned
    /// to, or the native's registered name.
    pub name: SymbolId,
    pub params: SmallVec<[ParamSpec; 4]>,
    pub kind: FunctionKind,
    pub infix: bool,
    pub docs: Option<Docs>,
}

impl FunctionData {
    pub fn is_native(&self) -> bool {
        matches!(self.kind, FunctionKind::Native { .. })
    }

    /// Number of positional (non-refinement) parameters.
    pub fn positional_count(&self) -> usize {
        self.params.iter().filter(|p| !p.refinement).count()
    }

    /// Releases owned heap references when the function value is freed.
    pub fn release(self, heap: &mut Heap) {
        if let FunctionKind::User { body, .. } = self.kind {
            heap.dec_ref(body);
        }
    }

    pub fn write_display(&self, _heap: &Heap, _frames: &Frames, interns: &Interns, out: &mut String, _molded: bool) {
        if self.is_native() {
            out.push_str("make native! [");
        } else {
            out.push_str("make function! [");
        }
        out.push_str(interns.get(self.name));
        out.push(']');
    }
}

/// Parses a parameter-spec block into an ordered `ParamSpec` list.
///
/// Spec syntax: an optional leading string is documentation; a bare word is
/// a positional evaluated argument; a lit-word is a positional unevaluated
/// argument; a `--name` word is a refinement, value-taking when followed by
/// a block; a block after a positional parameter or value-taking refinement
/// declares a datatype hint (`name [integer!]`).
pub(crate) fn parse_param_spec(
    heap: &Heap,
    interns: &mut Interns,
    spec: &[Value],
) -> RunResult<(SmallVec<[ParamSpec; 4]>, Option<Docs>)> {
    let mut params: SmallVec<[ParamSpec; 4]> = SmallVec::new();
    let mut docs = None;
    let mut seen_refinement = false;
    let mut pos = 0usize;

    if let Some(Value::Ref(id)) = spec.first()
        && let HeapData::Str(handle) = heap.get(*id)
    {
        docs = Some(Docs {
            summary: crate::value::str_remainder(heap, handle).to_owned(),
        });
        pos += 1;
    }

    while pos < spec.len() {
        let param = match &spec[pos] {
            Value::Word(symbol) => {
                let text = interns.get(*symbol);
                if let Some(stripped) = text.strip_prefix("--") {
                    let stripped = stripped.to_owned();
                    let name = interns.intern(&stripped);
                    seen_refinement = true;
                    let takes_value = matches!(peek_block(heap, spec, pos + 1), Some(_));
                    let mut param = ParamSpec::refinement(name, takes_value);
                    if takes_value {
                        param.hint = parse_hint(heap, interns, spec, &mut pos)?;
                    }
                    param
                } else {
                    if seen_refinement {
                        return Err(ErrorValue::spec_unsupported(format!(
                            "positional parameter {text} after a refinement"
                        )));
                    }
                    let mut param = ParamSpec::positional(*symbol, true);
                    param.hint = parse_hint(heap, interns, spec, &mut pos)?;
                    param
                }
            }
            Value::LitWord(symbol) => {
                if seen_refinement {
                    return Err(ErrorValue::spec_unsupported(format!(
                        "positional parameter {name} after a refinement",
                        name = interns.get(*symbol)
                    )));
                }
                let mut param = ParamSpec::positional(*symbol, false);
                param.hint = parse_hint(heap, interns, spec, &mut pos)?;
                param
            }
            other => {
                return Err(ErrorValue::spec_unsupported(format!(
                    "unexpected {kind} in parameter spec",
                    kind = other.kind(heap).type_name()
                )));
            }
        };
        if params.iter().any(|p| p.name == param.name) {
            return Err(ErrorValue::spec_unsupported(format!(
                "duplicate parameter {name}",
                name = interns.get(param.name)
            )));
        }
        params.push(param);
        pos += 1;
    }
    Ok((params, docs))
}

/// Reads the optional datatype-hint block following the parameter at `pos`,
/// advancing `pos` past it when present.
fn parse_hint(heap: &Heap, interns: &Interns, spec: &[Value], pos: &mut usize) -> RunResult<Option<Kind>> {
    let Some(elements) = peek_block(heap, spec, *pos + 1) else {
        return Ok(None);
    };
    *pos += 1;
    match elements.first() {
        Some(Value::Word(symbol)) => match Kind::from_type_symbol(*symbol) {
            Some(kind) => Ok(Some(kind)),
            None => Err(ErrorValue::spec_unsupported(format!(
                "{word} is not a datatype",
                word = interns.get(*symbol)
            ))),
        },
        // An empty hint block constrains nothing.
        None => Ok(None),
        Some(other) => Err(ErrorValue::spec_unsupported(format!(
            "unexpected {kind} in type hint",
            kind = other.kind(heap).type_name()
        ))),
    }
}

/// The elements of a block at `pos` in the spec, if there is one.
fn peek_block<'h>(heap: &'h Heap, spec: &[Value], pos: usize) -> Option<&'h [Value]> {
    if let Some(Value::Ref(id)) = spec.get(pos)
        && let HeapData::Block(handle) = heap.get(*id)
        && let HeapData::BlockBuf(buf) = heap.get(handle.buf)
    {
        Some(&buf.values[handle.cursor.min(buf.values.len())..])
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn word(interns: &mut Interns, text: &str) -> Value {
        Value::Word(interns.intern(text))
    }

    /// `[name --shout]`: one evaluated positional, one boolean refinement.
    #[test]
    fn positional_and_boolean_refinement() {
        let heap = Heap::new();
        let mut interns = Interns::new();
        let spec = vec![word(&mut interns, "name"), word(&mut interns, "--shout")];
        let (params, docs) = parse_param_spec(&heap, &mut interns, &spec).unwrap();
        assert!(docs.is_none());
        assert_eq!(params.len(), 2);
        assert!(params[0].eval && !params[0].refinement);
        assert!(params[1].refinement && !params[1].takes_value);
        assert_eq!(interns.get(params[1].name), "shout");
    }

    /// A lit-word parameter disables argument pre-evaluation.
    #[test]
    fn lit_word_parameter_is_raw() {
        let heap = Heap::new();
        let mut interns = Interns::new();
        let spec = vec![Value::LitWord(interns.intern("target"))];
        let (params, _) = parse_param_spec(&heap, &mut interns, &spec).unwrap();
        assert!(!params[0].eval);
    }

    /// A refinement followed by a block takes a value, with a datatype hint.
    #[test]
    fn value_taking_refinement_with_hint() {
        let mut heap = Heap::new();
        let mut interns = Interns::new();
        let hint = heap.alloc_block(crate::heap::BlockBuf::new(vec![Value::Word(
            crate::intern::StaticSymbols::IntegerType.into(),
        )]));
        let spec = vec![word(&mut interns, "--levels"), hint];
        let (params, _) = parse_param_spec(&heap, &mut interns, &spec).unwrap();
        assert!(params[0].refinement && params[0].takes_value);
        assert_eq!(params[0].hint, Some(Kind::Integer));
    }

    /// A leading string becomes the documentation summary.
    #[test]
    fn leading_string_is_docs() {
        let mut heap = Heap::new();
        let mut interns = Interns::new();
        let doc = heap.alloc_string("adds one".into());
        let spec = vec![doc, word(&mut interns, "n")];
        let (params, docs) = parse_param_spec(&heap, &mut interns, &spec).unwrap();
        assert_eq!(params.len(), 1);
        assert_eq!(docs.unwrap().summary, "adds one");
    }

    /// Duplicate names and positionals after refinements are rejected.
    #[test]
    fn malformed_specs_rejected() {
        let heap = Heap::new();
        let mut interns = Interns::new();
        let dup = vec![word(&mut interns, "a"), word(&mut interns, "a")];
        assert!(parse_param_spec(&heap, &mut interns, &dup).is_err());
        let late = vec![word(&mut interns, "--flag"), word(&mut interns, "b")];
        assert!(parse_param_spec(&heap, &mut interns, &late).is_err());
    }
}
