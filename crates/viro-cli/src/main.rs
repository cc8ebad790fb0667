use std::{
    env, fs,
    io::{self, BufRead, Write as _},
    process::ExitCode,
};

use viro::{Datum, Interpreter};

fn main() -> ExitCode {
    let args: Vec<String> = env::args().collect();
    match args.get(1).map(String::as_str) {
        Some("--help" | "-h") => {
            println!("usage: viro [script.viro]");
            println!("With no script, starts a line-oriented REPL.");
            ExitCode::SUCCESS
        }
        Some(path) => run_file(path),
        None => repl(),
    }
}

fn run_file(path: &str) -> ExitCode {
    let source = match fs::read_to_string(path) {
        Ok(source) => source,
        Err(err) => {
            eprintln!("error: cannot read {path}: {err}");
            return ExitCode::FAILURE;
        }
    };
    let mut vm = Interpreter::new();
    match vm.run(&source) {
        Ok(_) => ExitCode::SUCCESS,
        Err(exception) => {
            eprintln!("{exception}");
            ExitCode::FAILURE
        }
    }
}

fn repl() -> ExitCode {
    println!("viro {version}", version = env!("CARGO_PKG_VERSION"));
    println!("type an expression, or an empty line to quit");
    let mut vm = Interpreter::new();
    let stdin = io::stdin();
    loop {
        print!(">> ");
        let _ = io::stdout().flush();
        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) => return ExitCode::SUCCESS,
            Ok(_) => {}
            Err(err) => {
                eprintln!("error: {err}");
                return ExitCode::FAILURE;
            }
        }
        let line = line.trim();
        if line.is_empty() {
            return ExitCode::SUCCESS;
        }
        match vm.run(line) {
            // `print` already wrote its output; echo only real values.
            Ok(Datum::None) => {}
            Ok(value) => println!("== {value}"),
            Err(exception) => eprintln!("{exception}"),
        }
    }
}
