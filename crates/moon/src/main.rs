//! moon CLI
//!
//! Runs Lua scripts in an embedded engine and prints what they return.

use std::path::Path;

use moon::commands::{eval_code, parse_run_args, report, run_file};

fn main() {
    moon_rt::init_tracing();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        print_usage();
        return;
    }

    let command = &args[1];

    match command.as_str() {
        "run" => {
            let (options, path) = parse_or_exit(&args[2..]);
            let Some(path) = path else {
                eprintln!("error: missing file path");
                eprintln!("Usage: moon run <file.lua> [--no-stdlib]");
                std::process::exit(1);
            };
            std::process::exit(report(run_file(Path::new(&path), &options)));
        }
        "eval" => {
            let (options, code) = parse_or_exit(&args[2..]);
            let Some(code) = code else {
                eprintln!("error: missing code");
                eprintln!("Usage: moon eval \"<code>\" [--no-stdlib]");
                std::process::exit(1);
            };
            std::process::exit(report(eval_code(&code, &options)));
        }
        "help" | "--help" | "-h" => print_usage(),
        "version" | "--version" | "-V" => {
            println!("moon {}", env!("CARGO_PKG_VERSION"));
        }
        _ => {
            eprintln!("Unknown command: {command}");
            eprintln!();
            print_usage();
            std::process::exit(1);
        }
    }
}

fn parse_or_exit(args: &[String]) -> (moon::commands::RunOptions, Option<String>) {
    match parse_run_args(args) {
        Ok(parsed) => parsed,
        Err(message) => {
            eprintln!("error: {message}");
            std::process::exit(1);
        }
    }
}

fn print_usage() {
    println!("moon - run Lua scripts");
    println!();
    println!("Usage: moon <command> [options]");
    println!();
    println!("Commands:");
    println!("  run <file.lua>     Run a script and print its results");
    println!("  eval \"<code>\"      Run a chunk of code and print its results");
    println!("  help               Show this message");
    println!("  version            Show version information");
    println!();
    println!("Options:");
    println!("  --no-stdlib        Do not load the standard libraries");
    println!();
    println!("Set RUST_LOG=moon_rt=debug for engine tracing.");
}
