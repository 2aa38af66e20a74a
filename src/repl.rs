//! The two driver loops: an interactive REPL and a file runner.
//!
//! Both follow the same cycle per top-level form: parse into the scratch
//! arena, evaluate against the global environment, print the result (a
//! value or an error message — both go to stdout), and only then reset
//! the scratch arena. Parse errors go to stderr and abort the rest of the
//! line (REPL) or file.

use std::io;
use std::time::Instant;

use colored::Colorize;
use rustyline::{error::ReadlineError, DefaultEditor};

use crate::context::Ctx;
use crate::error::LispError;
use crate::eval::eval;
use crate::printer::pr_str;
use crate::reader::parser::Reader;
use crate::value::Value;

pub fn run_repl(ctx: &mut Ctx) -> rustyline::Result<()> {
    println!("{} {}", "lilt".bold(), env!("CARGO_PKG_VERSION"));
    let mut rl = DefaultEditor::new()?;
    loop {
        let line = match rl.readline("> ") {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) => continue,
            Err(ReadlineError::Eof) => break,
            Err(err) => {
                println!("{err}");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        rl.add_history_entry(line.as_str())?;
        run_source(ctx, &line, true);
    }
    println!("Goodbye!");
    Ok(())
}

pub fn run_file(ctx: &mut Ctx, path: &str) -> io::Result<()> {
    let source = std::fs::read_to_string(path)?;
    let started = Instant::now();
    run_source(ctx, &source, false);
    println!("Execution time: {:?}", started.elapsed());
    Ok(())
}

/// One read-eval-print-reset cycle per top-level form in `source`. A parse
/// error aborts the rest of the source.
fn run_source(ctx: &mut Ctx, source: &str, color: bool) {
    let mut reader = Reader::new(source);
    while let Some(form) = reader.read_form(ctx) {
        let result = form.map_err(LispError::Parse).and_then(|expr| {
            let genv = ctx.global_env;
            eval(ctx, expr, genv)
        });
        let abort = matches!(result, Err(LispError::Parse(_)));
        print_result(ctx, &result, color);
        // Everything worth keeping was copied by define/set!; the
        // printout above happened before this reset.
        ctx.reset_scratch();
        if abort {
            break;
        }
    }
}

/// Values and evaluation errors are results and go to stdout; parse
/// errors are diagnostics and go to stderr.
fn print_result(ctx: &Ctx, result: &Result<Value, LispError>, color: bool) {
    match result {
        Ok(value) => println!("{}", pr_str(ctx, *value)),
        Err(err @ LispError::Parse(_)) => eprintln!("Parser Error: {err}"),
        Err(err) => {
            let msg = err.to_string();
            if color {
                println!("{}", msg.red());
            } else {
                println!("{msg}");
            }
        }
    }
}
