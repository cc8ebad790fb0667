//! Shared helpers for the integration suites.

#![allow(dead_code)]

use viro::{CollectStringPrint, Datum, Exception, Interpreter};

/// Evaluates source in a fresh interpreter, panicking on any error.
pub fn eval(source: &str) -> Datum {
    let mut vm = Interpreter::new();
    let mut out = CollectStringPrint::new();
    match vm.run_with_writer(source, &mut out) {
        Ok(value) => value,
        Err(exception) => panic!("script failed: {exception}\nsource: {source}"),
    }
}

/// Evaluates source expecting an error, returning the diagnostic.
pub fn eval_err(source: &str) -> Exception {
    let mut vm = Interpreter::new();
    let mut out = CollectStringPrint::new();
    match vm.run_with_writer(source, &mut out) {
        Ok(value) => panic!("script should fail but returned {value}\nsource: {source}"),
        Err(exception) => exception,
    }
}

/// Evaluates source, returning the result and everything `print`/`probe`
/// wrote.
pub fn eval_with_output(source: &str) -> (Datum, String) {
    let mut vm = Interpreter::new();
    let mut out = CollectStringPrint::new();
    match vm.run_with_writer(source, &mut out) {
        Ok(value) => (value, out.into_output()),
        Err(exception) => panic!("script failed: {exception}\nsource: {source}"),
    }
}

/// The molded text of the script's result.
pub fn molded(source: &str) -> String {
    eval(source).to_string()
}
