//! Execution tracing.
//!
//! Each interpreter instance owns a [`TraceSession`]: a lock-free enable
//! flag, an atomically swapped filter record, and a sink behind a mutex.
//! Hot points in the evaluator (function entry/return, object creation,
//! object field read/write, port lifecycle) emit [`TraceEvent`] records when
//! the session is enabled and the filter admits them. The evaluator is
//! single-threaded, so the emitter's only contention is with an embedder's
//! log consumer.
//!
//! Sinks implement [`TraceSink`]:
//!
//! | Sink | Purpose |
//! |------|---------|
//! | [`NoopSink`] | Discards everything (production default) |
//! | [`StderrSink`] | Human-readable execution log to stderr |
//! | [`RecordingSink`] | In-memory event recording for tests and replay |
//! | [`JsonLineSink`] | One JSON object per event line; consumers are external |

use std::{
    io::Write as _,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
};

use ahash::AHashSet;

/// Trace event emitted at a hot point.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum TraceEvent {
    /// A function invocation pushed its call context.
    CallEnter {
        name: String,
        native: bool,
        /// Call depth after the push.
        depth: usize,
    },
    /// A function invocation completed (normally or by `return`).
    CallReturn { name: String, depth: usize },
    /// An object finished construction.
    ObjectCreated { fields: Vec<String> },
    /// An object field was read through `select` or a path.
    FieldRead { field: String },
    /// An object field was written through `put`.
    FieldWrite { field: String },
    PortOpen { target: String },
    PortRead { target: String },
    PortWrite { target: String },
    PortClose { target: String },
    PortError { target: String },
}

impl TraceEvent {
    /// The function name this event concerns, for name filtering.
    fn function_name(&self) -> Option<&str> {
        match self {
            Self::CallEnter { name, .. } | Self::CallReturn { name, .. } => Some(name),
            _ => None,
        }
    }

    fn is_call(&self) -> bool {
        matches!(self, Self::CallEnter { .. } | Self::CallReturn { .. })
    }

    fn is_object(&self) -> bool {
        matches!(
            self,
            Self::ObjectCreated { .. } | Self::FieldRead { .. } | Self::FieldWrite { .. }
        )
    }

    fn is_port(&self) -> bool {
        matches!(
            self,
            Self::PortOpen { .. }
                | Self::PortRead { .. }
                | Self::PortWrite { .. }
                | Self::PortClose { .. }
                | Self::PortError { .. }
        )
    }
}

/// What the session lets through.
#[derive(Debug, Clone)]
pub struct TraceFilter {
    /// Admit function entry/return events.
    pub calls: bool,
    /// Admit object creation and field access events.
    pub objects: bool,
    /// Admit port lifecycle events.
    pub ports: bool,
    /// When set, admit call events only for these function names.
    pub functions: Option<AHashSet<String>>,
}

impl Default for TraceFilter {
    fn default() -> Self {
        Self {
            calls: true,
            objects: true,
            ports: true,
            functions: None,
        }
    }
}

impl TraceFilter {
    fn admits(&self, event: &TraceEvent) -> bool {
        if event.is_call() {
            if !self.calls {
                return false;
            }
            if let (Some(names), Some(name)) = (&self.functions, event.function_name()) {
                return names.contains(name);
            }
            return true;
        }
        if event.is_object() {
            return self.objects;
        }
        if event.is_port() {
            return self.ports;
        }
        true
    }
}

/// Receives admitted trace events.
pub trait TraceSink: Send {
    fn emit(&mut self, event: &TraceEvent);
}

/// Discards all events.
#[derive(Debug, Default)]
pub struct NoopSink;

impl TraceSink for NoopSink {
    fn emit(&mut self, _event: &TraceEvent) {}
}

/// Writes one human-readable line per event to stderr.
#[derive(Debug, Default)]
pub struct StderrSink;

impl TraceSink for StderrSink {
    fn emit(&mut self, event: &TraceEvent) {
        match event {
            TraceEvent::CallEnter { name, native, depth } => {
                let tag = if *native { "native" } else { "fn" };
                eprintln!("trace: {pad}-> {name} ({tag})", pad = "  ".repeat(*depth));
            }
            TraceEvent::CallReturn { name, depth } => {
                eprintln!("trace: {pad}<- {name}", pad = "  ".repeat(*depth));
            }
            other => eprintln!("trace: {other:?}"),
        }
    }
}

/// Records events in memory. Clones share the same log, so an embedder
/// keeps a clone and reads [`RecordingSink::events`] after the run.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    events: Arc<Mutex<Vec<TraceEvent>>>,
}

impl RecordingSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A snapshot of the recorded events.
    #[must_use]
    pub fn events(&self) -> Vec<TraceEvent> {
        self.events.lock().expect("trace log poisoned").clone()
    }

    pub fn clear(&self) {
        self.events.lock().expect("trace log poisoned").clear();
    }
}

impl TraceSink for RecordingSink {
    fn emit(&mut self, event: &TraceEvent) {
        self.events.lock().expect("trace log poisoned").push(event.clone());
    }
}

/// Serializes each event as one JSON line into the wrapped writer.
#[derive(Debug)]
pub struct JsonLineSink<W: std::io::Write + Send>(pub W);

impl<W: std::io::Write + Send> TraceSink for JsonLineSink<W> {
    fn emit(&mut self, event: &TraceEvent) {
        if let Ok(line) = serde_json::to_string(event) {
            let _ = writeln!(self.0, "{line}");
        }
    }
}

/// The per-interpreter trace session.
pub struct TraceSession {
    enabled: AtomicBool,
    filter: Mutex<Arc<TraceFilter>>,
    sink: Mutex<Box<dyn TraceSink>>,
    /// Bumped by `update_trace_cache`; call sites holding cached filter
    /// state compare generations to know when to re-read.
    generation: AtomicU64,
}

impl std::fmt::Debug for TraceSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TraceSession")
            .field("enabled", &self.is_enabled())
            .field("generation", &self.generation())
            .finish_non_exhaustive()
    }
}

impl TraceSession {
    pub(crate) fn new() -> Self {
        Self {
            enabled: AtomicBool::new(false),
            filter: Mutex::new(Arc::new(TraceFilter::default())),
            sink: Mutex::new(Box::new(NoopSink)),
            generation: AtomicU64::new(0),
        }
    }

    /// Lock-free enabled check; the fast path at every hot point.
    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
        self.update_trace_cache();
    }

    /// Atomically swaps the filter record.
    pub fn set_filter(&self, filter: TraceFilter) {
        *self.filter.lock().expect("trace filter poisoned") = Arc::new(filter);
        self.update_trace_cache();
    }

    pub fn set_sink(&self, sink: Box<dyn TraceSink>) {
        *self.sink.lock().expect("trace sink poisoned") = sink;
    }

    /// Invalidates per-call-site filter caches after `trace --on/--off` or a
    /// filter swap.
    pub fn update_trace_cache(&self) {
        self.generation.fetch_add(1, Ordering::Relaxed);
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Relaxed)
    }

    /// Emits an event if the session is enabled and the filter admits it.
    pub(crate) fn emit(&self, event: &TraceEvent) {
        if !self.is_enabled() {
            return;
        }
        let filter = Arc::clone(&self.filter.lock().expect("trace filter poisoned"));
        if !filter.admits(event) {
            return;
        }
        self.sink.lock().expect("trace sink poisoned").emit(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call_event(name: &str) -> TraceEvent {
        TraceEvent::CallEnter {
            name: name.to_owned(),
            native: false,
            depth: 1,
        }
    }

    /// A disabled session emits nothing.
    #[test]
    fn disabled_session_is_silent() {
        let session = TraceSession::new();
        let sink = RecordingSink::new();
        session.set_sink(Box::new(sink.clone()));
        session.emit(&call_event("f"));
        assert!(sink.events().is_empty());
    }

    /// The name filter admits only listed functions.
    #[test]
    fn name_filter() {
        let session = TraceSession::new();
        let sink = RecordingSink::new();
        session.set_sink(Box::new(sink.clone()));
        session.set_enabled(true);
        let mut names = AHashSet::new();
        names.insert("keep".to_owned());
        session.set_filter(TraceFilter {
            functions: Some(names),
            ..TraceFilter::default()
        });
        session.emit(&call_event("keep"));
        session.emit(&call_event("drop"));
        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0], call_event("keep"));
    }

    /// Category switches drop whole event families.
    #[test]
    fn category_filter() {
        let session = TraceSession::new();
        let sink = RecordingSink::new();
        session.set_sink(Box::new(sink.clone()));
        session.set_enabled(true);
        session.set_filter(TraceFilter {
            objects: false,
            ..TraceFilter::default()
        });
        session.emit(&TraceEvent::FieldRead { field: "x".into() });
        session.emit(&TraceEvent::PortOpen { target: "t".into() });
        assert_eq!(sink.events().len(), 1);
    }

    /// Cache invalidation bumps the generation counter.
    #[test]
    fn update_trace_cache_bumps_generation() {
        let session = TraceSession::new();
        let before = session.generation();
        session.update_trace_cache();
        assert!(session.generation() > before);
    }

    /// Events serialize as tagged JSON objects.
    #[test]
    fn event_json_shape() {
        let json = serde_json::to_value(call_event("f")).unwrap();
        assert_eq!(json["event"], "call-enter");
        assert_eq!(json["name"], "f");
    }
}
