//! The expression evaluator and function invocation machinery.
//!
//! A single [`Evaluator`] borrows the interpreter's stores (heap, frames,
//! interns, action tables, trace session) and the output writers for one
//! run. It walks block buffers with a position cursor, strictly left to
//! right: literals produce themselves, words resolve through the frame
//! chain, set-words bind, paths select, and a one-element lookahead after
//! every produced value folds infix calls with no precedence table.
//!
//! The same struct is the handle natives receive: `do_block`,
//! `eval_expression`, frame push/pop, lookup, `signal_return`, writers, and
//! trace emission are all methods here.

use smallvec::SmallVec;

use crate::{
    args::{ArgValues, Refinements},
    error::{CodeLoc, ErrorValue, RunError, RunResult, ThrowSignal},
    frame::{FrameId, Frames, ROOT_FRAME},
    function::{FramePolicy, FunctionKind, ParamSpec},
    heap::{Heap, HeapData, HeapId},
    intern::{Interns, SymbolId},
    io::PrintWriter,
    natives::{Actions, native_def},
    object,
    trace::{TraceEvent, TraceSession},
    value::{self, Value},
};

/// Embedder cancellation hook, polled once per loop iteration. Returning
/// `true` raises `Access/cancelled` from the polling loop.
pub type CancelHook = dyn Fn() -> bool;

/// Result of running one loop-body iteration, after signal interpretation.
pub(crate) enum LoopFlow {
    /// The body completed; its value is carried for callers that want it.
    Normal(Value),
    /// A level-1 `break` was consumed; the loop exits with `none`.
    Break,
    /// A level-1 `continue` was consumed; the loop starts its next pass.
    Continue,
}

pub(crate) struct Evaluator<'a> {
    pub heap: &'a mut Heap,
    pub frames: &'a mut Frames,
    pub interns: &'a mut Interns,
    pub actions: &'a Actions,
    pub session: &'a TraceSession,
    out: &'a mut dyn PrintWriter,
    err: &'a mut dyn PrintWriter,
    /// The context stack; the last entry is the current frame.
    frame_stack: Vec<FrameId>,
    recursion_limit: usize,
    cancel: Option<&'a CancelHook>,
}

impl<'a> Evaluator<'a> {
    #[expect(clippy::too_many_arguments, reason = "one borrow per interpreter store")]
    pub fn new(
        heap: &'a mut Heap,
        frames: &'a mut Frames,
        interns: &'a mut Interns,
        actions: &'a Actions,
        session: &'a TraceSession,
        out: &'a mut dyn PrintWriter,
        err: &'a mut dyn PrintWriter,
        recursion_limit: usize,
        cancel: Option<&'a CancelHook>,
    ) -> Self {
        Self {
            heap,
            frames,
            interns,
            actions,
            session,
            out,
            err,
            frame_stack: vec![ROOT_FRAME],
            recursion_limit,
            cancel,
        }
    }

    // ------------------------------------------------------------------
    // The handle surface exposed to natives
    // ------------------------------------------------------------------

    pub fn current_frame(&self) -> FrameId {
        *self.frame_stack.last().expect("frame stack never empty")
    }

    pub fn frame_by_index(&self, index: usize) -> Option<FrameId> {
        self.frame_stack.get(index).copied()
    }

    /// Pushes a frame as current. Must be paired with [`pop_frame`].
    pub fn push_frame(&mut self, frame: FrameId) -> RunResult<()> {
        if self.frame_stack.len() >= self.recursion_limit {
            return Err(RunError::recursion_limit(self.recursion_limit));
        }
        self.frame_stack.push(frame);
        Ok(())
    }

    pub fn pop_frame(&mut self) {
        debug_assert!(self.frame_stack.len() > 1, "must not pop the root frame");
        self.frame_stack.pop();
    }

    /// Looks up a symbol from the current frame, walking parent links.
    pub fn lookup(&self, symbol: SymbolId) -> Option<(&Value, FrameId)> {
        self.frames.lookup(self.current_frame(), symbol)
    }

    /// Builds the `return` signal payload for `return` natives.
    pub fn signal_return(&self, value: Value) -> RunError {
        RunError::Throw(ThrowSignal::Return { value })
    }

    pub fn update_trace_cache(&self) {
        self.session.update_trace_cache();
    }

    pub fn out_writer(&mut self) -> &mut dyn PrintWriter {
        &mut *self.out
    }

    pub fn err_writer(&mut self) -> &mut dyn PrintWriter {
        &mut *self.err
    }

    /// Polls the embedder cancellation hook (used by loop natives).
    pub fn check_cancelled(&self) -> RunResult<()> {
        if self.cancel.is_some_and(|hook| hook()) {
            return Err(ErrorValue::cancelled());
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Trace emission
    // ------------------------------------------------------------------

    fn trace_call(&self, name: SymbolId, native: bool, entering: bool) {
        if !self.session.is_enabled() {
            return;
        }
        let name = self.interns.get(name).to_owned();
        let depth = self.frame_stack.len();
        let event = if entering {
            TraceEvent::CallEnter { name, native, depth }
        } else {
            TraceEvent::CallReturn { name, depth }
        };
        self.session.emit(&event);
    }

    pub fn trace_object_created(&self, object: HeapId) {
        if !self.session.is_enabled() {
            return;
        }
        let HeapData::Object(data) = self.heap.get(object) else {
            return;
        };
        let fields = data.manifest.keys().map(|sym| self.interns.get(*sym).to_owned()).collect();
        self.session.emit(&TraceEvent::ObjectCreated { fields });
    }

    pub fn trace_field_read(&self, field: SymbolId) {
        if self.session.is_enabled() {
            self.session.emit(&TraceEvent::FieldRead {
                field: self.interns.get(field).to_owned(),
            });
        }
    }

    pub fn trace_field_write(&self, field: SymbolId) {
        if self.session.is_enabled() {
            self.session.emit(&TraceEvent::FieldWrite {
                field: self.interns.get(field).to_owned(),
            });
        }
    }

    pub fn trace_port(&self, event: TraceEvent) {
        self.session.emit(&event);
    }

    // ------------------------------------------------------------------
    // Block evaluation
    // ------------------------------------------------------------------

    /// Evaluates every expression of a block (or paren) value left to
    /// right, returning the last result (`none` for an empty block).
    pub fn do_block(&mut self, block: &Value) -> RunResult<Value> {
        let (buf, cursor) = self.series_view(block)?;
        self.do_buf(buf, cursor)
    }

    /// Evaluates a buffer from `start` to its end.
    ///
    /// The buffer length is re-read every iteration: homoiconic programs may
    /// grow or shrink the block they are running from.
    pub fn do_buf(&mut self, buf: HeapId, start: usize) -> RunResult<Value> {
        let mut result = Value::None;
        let mut pos = start;
        loop {
            if pos >= self.buf_len(buf) {
                return Ok(result);
            }
            let (next, value) = match self.eval_expression(buf, pos) {
                Ok(step) => step,
                Err(err) => {
                    result.drop_with_heap(self.heap);
                    return Err(err);
                }
            };
            let previous = std::mem::replace(&mut result, value);
            previous.drop_with_heap(self.heap);
            pos = next;
        }
    }

    /// Evaluates a single expression starting at `pos`, returning the new
    /// cursor position and the value.
    pub fn eval_expression(&mut self, buf: HeapId, pos: usize) -> RunResult<(usize, Value)> {
        let loc = self.element_loc(buf, pos);
        let step = self.eval_element(buf, pos);
        let (mut pos, mut value) = match step {
            Ok(step) => step,
            Err(err) => {
                let near = self.mold_element(buf, pos);
                return Err(match loc {
                    Some(loc) => err.with_position(loc, near.as_deref()),
                    None => err,
                });
            }
        };

        // Infix lookahead: after every produced value, a word bound to an
        // infix function folds left. Strict source order, no precedence.
        loop {
            let Some(symbol) = self.word_at(buf, pos) else { break };
            let Some(fn_id) = self.infix_function(symbol) else { break };
            self.heap.inc_ref(fn_id);
            let folded = self.invoke_function(fn_id, buf, pos + 1, Some(value), symbol);
            self.heap.dec_ref(fn_id);
            let (next, result) = folded?;
            pos = next;
            value = result;
        }
        Ok((pos, value))
    }

    /// Evaluates the element at `pos` without the infix lookahead.
    fn eval_element(&mut self, buf: HeapId, pos: usize) -> RunResult<(usize, Value)> {
        let Some(element) = self.element_at(buf, pos) else {
            return Err(ErrorValue::invalid_syntax("expression expected"));
        };
        match element {
            Value::Word(symbol) => {
                let resolved = {
                    let Some((bound, _)) = self.frames.lookup(self.current_frame(), symbol) else {
                        return Err(ErrorValue::no_value(self.interns.get(symbol)));
                    };
                    match bound {
                        Value::Ref(id) if matches!(self.heap.get(*id), HeapData::Function(_)) => Err(*id),
                        other => Ok(other.clone_with_heap(self.heap)),
                    }
                };
                match resolved {
                    Ok(bound) => Ok((pos + 1, bound)),
                    Err(fn_id) => {
                        self.heap.inc_ref(fn_id);
                        let result = self.invoke_function(fn_id, buf, pos + 1, None, symbol);
                        self.heap.dec_ref(fn_id);
                        result
                    }
                }
            }
            Value::GetWord(symbol) => {
                let Some((bound, _)) = self.frames.lookup(self.current_frame(), symbol) else {
                    return Err(ErrorValue::no_value(self.interns.get(symbol)));
                };
                let bound = bound.clone_with_heap(self.heap);
                Ok((pos + 1, bound))
            }
            Value::SetWord(symbol) => {
                if pos + 1 >= self.buf_len(buf) {
                    return Err(ErrorValue::invalid_syntax(format!(
                        "{name}: has no value to assign",
                        name = self.interns.get(symbol)
                    )));
                }
                let (next, value) = self.eval_expression(buf, pos + 1)?;
                let bound = value.clone_with_heap(self.heap);
                self.frames.bind(self.current_frame(), symbol, bound, self.heap);
                Ok((next, value))
            }
            Value::LitWord(symbol) => Ok((pos + 1, Value::Word(symbol))),
            Value::Ref(id) => match self.heap.get(id) {
                HeapData::Paren(handle) => {
                    let (paren_buf, cursor) = (handle.buf, handle.cursor);
                    let result = self.do_buf(paren_buf, cursor);
                    self.heap.dec_ref(id);
                    Ok((pos + 1, result?))
                }
                HeapData::Path(_) => {
                    let result = self.eval_path(id);
                    self.heap.dec_ref(id);
                    Ok((pos + 1, result?))
                }
                _ => Ok((pos + 1, Value::Ref(id))),
            },
            literal => Ok((pos + 1, literal)),
        }
    }

    /// Resolves a path: the head symbol looks up through the frame chain,
    /// then each segment applies get-field (objects, with prototype walk)
    /// or get-index (series) semantics.
    fn eval_path(&mut self, path: HeapId) -> RunResult<Value> {
        let segments: Vec<Value> = match self.heap.get(path) {
            HeapData::Path(segments) => segments.iter().map(|s| s.clone_with_heap(self.heap)).collect(),
            _ => return Err(RunError::Internal("eval_path on a non-path".into())),
        };
        let mut iter = segments.into_iter();
        let head = iter.next().ok_or_else(|| ErrorValue::invalid_syntax("empty path"))?;
        let Value::Word(head_symbol) = head else {
            return Err(ErrorValue::invalid_syntax("path must start with a word"));
        };
        let mut current = match self.frames.lookup(self.current_frame(), head_symbol) {
            Some((bound, _)) => bound.clone_with_heap(self.heap),
            None => return Err(ErrorValue::no_value(self.interns.get(head_symbol))),
        };

        for segment in iter {
            let next = self.path_step(&current, &segment);
            current.drop_with_heap(self.heap);
            current = next?;
        }
        Ok(current)
    }

    /// One path segment applied to the value produced so far.
    fn path_step(&mut self, current: &Value, segment: &Value) -> RunResult<Value> {
        match (current, segment) {
            (Value::Ref(id), Value::Word(field)) => match self.heap.get(*id) {
                HeapData::Object(_) => {
                    self.trace_field_read(*field);
                    object::read_field(self.heap, self.frames, *id, *field)
                        .ok_or_else(|| ErrorValue::no_such_field(self.interns.get(*field)))
                }
                HeapData::Block(_) | HeapData::Paren(_) => {
                    Ok(crate::natives::series::select_in_block(self.heap, *id, &Value::Word(*field)))
                }
                _ => Err(ErrorValue::invalid_operation(format!(
                    "cannot select {field} in a {kind}",
                    field = self.interns.get(*field),
                    kind = current.kind(self.heap).type_name()
                ))),
            },
            (Value::Ref(id), Value::Int(index)) => match self.heap.get(*id) {
                HeapData::Block(_) | HeapData::Paren(_) | HeapData::Str(_) | HeapData::Binary(_) => {
                    Ok(crate::natives::series::pick_series(self.heap, *id, *index))
                }
                _ => Err(ErrorValue::invalid_operation(format!(
                    "cannot index a {kind}",
                    kind = current.kind(self.heap).type_name()
                ))),
            },
            _ => Err(ErrorValue::invalid_operation(format!(
                "invalid path segment for a {kind}",
                kind = current.kind(self.heap).type_name()
            ))),
        }
    }

    // ------------------------------------------------------------------
    // Function invocation
    // ------------------------------------------------------------------

    /// Invokes the function at `fn_id`, gathering its arguments from `buf`
    /// starting at `pos`. An infix call passes the already-computed left
    /// value, which becomes the first positional argument.
    pub fn invoke_function(
        &mut self,
        fn_id: HeapId,
        buf: HeapId,
        pos: usize,
        left: Option<Value>,
        name: SymbolId,
    ) -> RunResult<(usize, Value)> {
        let (params, kind) = match self.heap.get(fn_id) {
            HeapData::Function(f) => (f.params.clone(), f.kind),
            _ => {
                if let Some(left) = left {
                    left.drop_with_heap(self.heap);
                }
                return Err(RunError::Internal("invoke_function on a non-function".into()));
            }
        };

        let infix_call = left.is_some();
        let gathered = self.gather_arguments(&params, buf, pos, left, infix_call, name);
        let (pos, positional, mut refinements) = match gathered {
            Ok(gathered) => gathered,
            Err(err) => return Err(err),
        };

        let result = match kind {
            FunctionKind::Native { id, policy } => {
                self.trace_call(name, true, true);
                let args = ArgValues::from_vec(positional);
                let outcome = match policy {
                    FramePolicy::Caller => (native_def(id).func)(self, args, &mut refinements),
                    FramePolicy::Isolated => {
                        let frame = self.frames.new_closure(self.current_frame());
                        match self.push_frame(frame) {
                            Ok(()) => {
                                let outcome = (native_def(id).func)(self, args, &mut refinements);
                                self.pop_frame();
                                self.frames.drop_frame(frame, self.heap);
                                outcome
                            }
                            Err(err) => {
                                args.drop_with_heap(self.heap);
                                self.frames.drop_frame(frame, self.heap);
                                Err(err)
                            }
                        }
                    }
                };
                self.trace_call(name, true, false);
                outcome
            }
            FunctionKind::User { body, parent } => {
                let outcome = self.call_user_function(&params, positional, &mut refinements, body, parent, name);
                match outcome {
                    Err(RunError::Throw(ThrowSignal::Return { value })) => Ok(value),
                    other => other,
                }
            }
        };

        // Natives may keep refinement values by taking them; whatever is
        // left drains back to the heap on every path.
        let leftover: Vec<Value> = refinements.drain().map(|(_, v)| v).collect();
        for value in leftover {
            value.drop_with_heap(self.heap);
        }
        result.map(|value| (pos, value))
    }

    /// Binds parameters into a fresh closure frame parented to the
    /// function's captured lexical parent, runs the body, and releases the
    /// frame on every exit path.
    fn call_user_function(
        &mut self,
        params: &[ParamSpec],
        positional: SmallVec<[Value; 4]>,
        refinements: &mut Refinements,
        body: HeapId,
        parent: FrameId,
        name: SymbolId,
    ) -> RunResult<Value> {
        let frame = self.frames.new_closure(parent);
        let mut positional = positional.into_iter();
        for param in params {
            let value = if param.refinement {
                refinements.take(param.name).unwrap_or(Value::None)
            } else {
                positional.next().expect("gather_arguments supplied every positional")
            };
            self.frames.bind(frame, param.name, value, self.heap);
        }

        if let Err(err) = self.push_frame(frame) {
            self.frames.drop_frame(frame, self.heap);
            return Err(err);
        }
        self.trace_call(name, false, true);
        let (body_buf, cursor) = match self.heap.get(body) {
            HeapData::Block(handle) => (handle.buf, handle.cursor),
            _ => {
                self.pop_frame();
                self.frames.drop_frame(frame, self.heap);
                return Err(RunError::Internal("user function body is not a block".into()));
            }
        };
        let result = self.do_buf(body_buf, cursor);
        self.pop_frame();
        self.frames.drop_frame(frame, self.heap);
        self.trace_call(name, false, false);
        result
    }

    /// Gathers positional arguments (honoring each parameter's `Eval`
    /// setting) and scans ahead for `--name` refinement tokens.
    ///
    /// An infix call gathers its right-hand argument as a *single element*
    /// (no infix lookahead of its own): that is what makes `3 + 4 * 2`
    /// fold strictly left as `(3 + 4) * 2`. Prefix calls gather full
    /// expressions, so `probe 1 + 2` sees `3`.
    fn gather_arguments(
        &mut self,
        params: &[ParamSpec],
        buf: HeapId,
        mut pos: usize,
        mut left: Option<Value>,
        infix_call: bool,
        name: SymbolId,
    ) -> RunResult<(usize, SmallVec<[Value; 4]>, Refinements)> {
        let mut positional: SmallVec<[Value; 4]> = SmallVec::new();
        let expected = params.iter().filter(|p| !p.refinement).count();

        let fail = |ev: &mut Self, gathered: SmallVec<[Value; 4]>, refs: Refinements, err: RunError| {
            for value in gathered {
                value.drop_with_heap(ev.heap);
            }
            refs.drop_with_heap(ev.heap);
            Err(err)
        };

        for param in params.iter().filter(|p| !p.refinement) {
            let value = if let Some(value) = left.take() {
                value
            } else if param.eval {
                if pos >= self.buf_len(buf) {
                    let got = positional.len();
                    let name = self.interns.get(name).to_owned();
                    return fail(self, positional, Refinements::new(), ErrorValue::arg_count(&name, expected, got));
                }
                let step = if infix_call {
                    self.eval_element(buf, pos)
                } else {
                    self.eval_expression(buf, pos)
                };
                match step {
                    Ok((next, value)) => {
                        pos = next;
                        value
                    }
                    Err(err) => return fail(self, positional, Refinements::new(), err),
                }
            } else {
                // Lit-word parameter: consume the raw token unevaluated.
                let Some(raw) = self.element_at(buf, pos) else {
                    let got = positional.len();
                    let name = self.interns.get(name).to_owned();
                    return fail(self, positional, Refinements::new(), ErrorValue::arg_count(&name, expected, got));
                };
                pos += 1;
                raw
            };
            if let Some(expected_kind) = param.hint {
                let got = value.kind(self.heap);
                if got != expected_kind {
                    value.drop_with_heap(self.heap);
                    return fail(
                        self,
                        positional,
                        Refinements::new(),
                        ErrorValue::type_mismatch(expected_kind.type_name(), got),
                    );
                }
            }
            positional.push(value);
        }
        if let Some(stale) = left.take() {
            // An infix left value with no positional slot to land in.
            stale.drop_with_heap(self.heap);
        }

        // Refinement scan: consume `--name` tokens that match one of this
        // function's refinements; an unmatched token is left for the caller.
        let mut refinements = Refinements::new();
        loop {
            let Some(symbol) = self.word_at(buf, pos) else { break };
            let Some(stripped) = self.interns.get(symbol).strip_prefix("--").map(str::to_owned) else {
                break;
            };
            let stripped = self.interns.intern(&stripped);
            let Some(param) = params.iter().find(|p| p.refinement && p.name == stripped) else {
                break;
            };
            let param = *param;
            pos += 1;
            if param.takes_value {
                if pos >= self.buf_len(buf) {
                    let name = self.interns.get(name).to_owned();
                    return fail(
                        self,
                        positional,
                        refinements,
                        ErrorValue::arg_count(&name, expected + 1, expected),
                    );
                }
                let value = match self.eval_expression(buf, pos) {
                    Ok((next, value)) => {
                        pos = next;
                        value
                    }
                    Err(err) => return fail(self, positional, refinements, err),
                };
                if let Some(expected_kind) = param.hint {
                    let got = value.kind(self.heap);
                    if got != expected_kind {
                        value.drop_with_heap(self.heap);
                        return fail(
                            self,
                            positional,
                            refinements,
                            ErrorValue::type_mismatch(expected_kind.type_name(), got),
                        );
                    }
                }
                refinements.insert(param.name, value, self.heap);
            } else {
                refinements.insert(param.name, Value::Logic(true), self.heap);
            }
        }

        Ok((pos, positional, refinements))
    }

    // ------------------------------------------------------------------
    // Loop support
    // ------------------------------------------------------------------

    /// Runs one loop-body pass and interprets control-flow signals: level-1
    /// `break`/`continue` are consumed here; higher levels are re-raised
    /// with the count decremented so the enclosing loop sees a level-1
    /// signal; everything else (including `return`) propagates unchanged.
    pub fn run_loop_body(&mut self, body: &Value) -> RunResult<LoopFlow> {
        match self.do_block(body) {
            Ok(value) => Ok(LoopFlow::Normal(value)),
            Err(RunError::Throw(ThrowSignal::Break { levels })) => {
                if levels <= 1 {
                    Ok(LoopFlow::Break)
                } else {
                    Err(RunError::Throw(ThrowSignal::Break { levels: levels - 1 }))
                }
            }
            Err(RunError::Throw(ThrowSignal::Continue { levels })) => {
                if levels <= 1 {
                    Ok(LoopFlow::Continue)
                } else {
                    Err(RunError::Throw(ThrowSignal::Continue { levels: levels - 1 }))
                }
            }
            Err(other) => Err(other),
        }
    }

    // ------------------------------------------------------------------
    // Buffer access helpers
    // ------------------------------------------------------------------

    /// Resolves a block/paren value to its buffer and cursor.
    pub fn series_view(&self, value: &Value) -> RunResult<(HeapId, usize)> {
        if let Value::Ref(id) = value
            && let HeapData::Block(handle) | HeapData::Paren(handle) = self.heap.get(*id)
        {
            return Ok((handle.buf, handle.cursor));
        }
        Err(ErrorValue::type_mismatch("block!", value.kind(self.heap)))
    }

    pub fn buf_len(&self, buf: HeapId) -> usize {
        match self.heap.get(buf) {
            HeapData::BlockBuf(b) => b.values.len(),
            _ => 0,
        }
    }

    /// Clones out the element at `pos`, if in range.
    fn element_at(&self, buf: HeapId, pos: usize) -> Option<Value> {
        let HeapData::BlockBuf(b) = self.heap.get(buf) else {
            return None;
        };
        b.values.get(pos).map(|v| v.clone_with_heap(self.heap))
    }

    fn element_loc(&self, buf: HeapId, pos: usize) -> Option<CodeLoc> {
        match self.heap.get(buf) {
            HeapData::BlockBuf(b) => b.loc_at(pos),
            _ => None,
        }
    }

    /// The symbol of a plain word at `pos`, if that is what is there.
    fn word_at(&self, buf: HeapId, pos: usize) -> Option<SymbolId> {
        let HeapData::BlockBuf(b) = self.heap.get(buf) else {
            return None;
        };
        match b.values.get(pos) {
            Some(Value::Word(symbol)) => Some(*symbol),
            _ => None,
        }
    }

    /// The function bound to `symbol`, when it is an infix function.
    fn infix_function(&self, symbol: SymbolId) -> Option<HeapId> {
        let (bound, _) = self.frames.lookup(self.current_frame(), symbol)?;
        let Value::Ref(id) = bound else { return None };
        match self.heap.get(*id) {
            HeapData::Function(f) if f.infix => Some(*id),
            _ => None,
        }
    }

    fn mold_element(&mut self, buf: HeapId, pos: usize) -> Option<String> {
        let element = self.element_at(buf, pos)?;
        let molded = value::mold(&element, self.heap, self.frames, self.interns);
        element.drop_with_heap(self.heap);
        Some(molded)
    }
}
