#![doc = include_str!("../../../README.md")]

mod args;
mod decimal;
mod error;
mod eval;
mod frame;
mod function;
mod heap;
mod intern;
mod interp;
mod io;
mod natives;
mod object;
mod parse;
mod trace;
mod value;

pub use crate::{
    decimal::Decimal,
    error::{CodeLoc, Exception},
    eval::CancelHook,
    heap::HeapStats,
    interp::{DEFAULT_RECURSION_LIMIT, Interpreter, InterpreterOptions},
    io::{CollectStringPrint, NoPrint, PrintWriter, StdPrint},
    trace::{JsonLineSink, NoopSink, RecordingSink, StderrSink, TraceEvent, TraceFilter, TraceSession, TraceSink},
    value::Datum,
};
