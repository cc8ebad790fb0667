//! The interpreter facade.
//!
//! An [`Interpreter`] owns every store the evaluator borrows: the heap, the
//! frame store (with the root frame and all natives bound), the symbol
//! interner, the action dispatch tables, and the trace session. State
//! persists across [`Interpreter::run`] calls, so a REPL is a loop around
//! one instance.

use crate::{
    error::{Category, ErrorId, ErrorValue, Exception, RunError, ThrowSignal},
    eval::{CancelHook, Evaluator},
    frame::Frames,
    heap::{Heap, HeapStats},
    intern::Interns,
    io::{NoPrint, PrintWriter, StdPrint},
    natives::{Actions, register_root},
    parse::parse_source,
    trace::{TraceSession, TraceSink},
    value::{Datum, export},
};

/// Default bound on closure-frame nesting depth.
pub const DEFAULT_RECURSION_LIMIT: usize = 1000;

/// Configuration for an interpreter instance.
pub struct InterpreterOptions {
    /// Maximum closure-frame nesting depth; exceeding it raises an
    /// uncatchable internal error.
    pub recursion_limit: usize,
    /// Polled once per loop iteration; returning `true` cancels execution
    /// with an `Access/cancelled` error.
    pub cancel_hook: Option<Box<CancelHook>>,
}

impl Default for InterpreterOptions {
    fn default() -> Self {
        Self {
            recursion_limit: DEFAULT_RECURSION_LIMIT,
            cancel_hook: None,
        }
    }
}

impl std::fmt::Debug for InterpreterOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterpreterOptions")
            .field("recursion_limit", &self.recursion_limit)
            .field("cancel_hook", &self.cancel_hook.is_some())
            .finish()
    }
}

/// A viro interpreter instance.
///
/// Single-threaded by construction; an embedder may run several instances
/// in parallel, each with its own stores.
pub struct Interpreter {
    heap: Heap,
    frames: Frames,
    interns: Interns,
    actions: Actions,
    session: TraceSession,
    options: InterpreterOptions,
    err_out: Box<dyn PrintWriter>,
}

impl std::fmt::Debug for Interpreter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Interpreter")
            .field("heap", &self.heap_stats())
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

impl Interpreter {
    #[must_use]
    pub fn new() -> Self {
        Self::with_options(InterpreterOptions::default())
    }

    #[must_use]
    pub fn with_options(options: InterpreterOptions) -> Self {
        let mut heap = Heap::new();
        let mut frames = Frames::new();
        let mut interns = Interns::new();
        register_root(&mut heap, &mut frames, &mut interns);
        Self {
            heap,
            frames,
            interns,
            actions: Actions::build(),
            session: TraceSession::new(),
            options,
            err_out: Box::new(NoPrint),
        }
    }

    /// Parses and evaluates source text, printing through stdout.
    ///
    /// Returns the last expression's value, or the formatted diagnostic for
    /// an unhandled error. Global bindings persist to the next call.
    pub fn run(&mut self, source: &str) -> Result<Datum, Exception> {
        let mut out = StdPrint::default();
        self.run_with_writer(source, &mut out)
    }

    /// Like [`run`](Self::run), with `print`/`probe` output captured by the
    /// given writer.
    pub fn run_with_writer(&mut self, source: &str, out: &mut dyn PrintWriter) -> Result<Datum, Exception> {
        let block = parse_source(source, &mut self.heap, &mut self.interns).map_err(|err| Exception {
            category: Category::Script.as_str().to_owned(),
            id: ErrorId::InvalidSyntax.as_str().to_owned(),
            args: [err.message.clone(), String::new(), String::new()],
            position: Some(err.loc),
            near: None,
        })?;

        let result = {
            let mut ev = Evaluator::new(
                &mut self.heap,
                &mut self.frames,
                &mut self.interns,
                &self.actions,
                &self.session,
                out,
                self.err_out.as_mut(),
                self.options.recursion_limit,
                self.options.cancel_hook.as_deref(),
            );
            ev.do_block(&block)
        };
        block.drop_with_heap(&mut self.heap);

        match result {
            Ok(value) => {
                let datum = export(&value, &self.heap, &self.frames, &self.interns);
                value.drop_with_heap(&mut self.heap);
                Ok(datum)
            }
            Err(err) => Err(self.into_exception(err)),
        }
    }

    /// Converts an escaped failure into the top-level diagnostic.
    fn into_exception(&mut self, err: RunError) -> Exception {
        match err {
            RunError::Internal(message) => Exception::internal(&message),
            RunError::Err(err) => Exception::from_error_value(&err),
            RunError::Throw(signal) => {
                // A control-flow signal with no consumer is a script error,
                // not a crash: report which form escaped.
                let (id, what) = match signal {
                    ThrowSignal::Break { .. } => (ErrorId::Break, "break used outside a loop"),
                    ThrowSignal::Continue { .. } => (ErrorId::Continue, "continue used outside a loop"),
                    ThrowSignal::Return { value } => {
                        value.drop_with_heap(&mut self.heap);
                        (ErrorId::Return, "return used outside a function")
                    }
                };
                Exception::from_error_value(&ErrorValue::new(
                    Category::Script,
                    id,
                    [what.to_owned(), String::new(), String::new()],
                ))
            }
        }
    }

    /// Snapshot of heap state: live objects by type, slot counts, interned
    /// symbol count.
    #[must_use]
    pub fn heap_stats(&self) -> HeapStats {
        self.heap.stats(self.interns.dynamic_count())
    }

    /// The interpreter's trace session, for enabling tracing, swapping the
    /// filter, or installing a sink.
    #[must_use]
    pub fn trace_session(&self) -> &TraceSession {
        &self.session
    }

    /// Installs the trace sink events are emitted into.
    pub fn set_trace_sink(&self, sink: Box<dyn TraceSink>) {
        self.session.set_sink(sink);
    }

    /// Installs the writer used by the error-diagnostic surface exposed to
    /// natives.
    pub fn set_error_writer(&mut self, writer: Box<dyn PrintWriter>) {
        self.err_out = writer;
    }
}
