use std::process::ExitCode;

mod arena;
mod context;
mod core;
mod env;
mod error;
mod eval;
mod printer;
mod reader;
mod repl;
mod value;

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();
    let mut ctx = context::Ctx::new();
    match args.as_slice() {
        [_] => {
            if let Err(err) = repl::run_repl(&mut ctx) {
                eprintln!("{err}");
                return ExitCode::FAILURE;
            }
            ExitCode::SUCCESS
        }
        [_, path] => {
            if let Err(err) = repl::run_file(&mut ctx, path) {
                eprintln!("Error: could not run file '{path}': {err}");
                return ExitCode::FAILURE;
            }
            ExitCode::SUCCESS
        }
        [program, ..] => {
            eprintln!("Usage: {program} [file]");
            ExitCode::FAILURE
        }
        [] => ExitCode::FAILURE,
    }
}
