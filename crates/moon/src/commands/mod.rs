//! Command implementations for the `moon` binary.
//!
//! Each command runs a chunk in a fresh engine and prints every value it
//! returns, one per line. Failures are reported as `error[<kind>]: <message>`.

use std::path::Path;

use moon_rt::{Error, Result, State, StateOptions, Value};

/// Options shared by `run` and `eval`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Skip loading the standard libraries.
    pub no_stdlib: bool,
}

impl RunOptions {
    fn state_options(&self) -> StateOptions {
        StateOptions::new().open_stdlib(!self.no_stdlib)
    }
}

/// Split command arguments into options and the first positional argument.
///
/// Unknown flags are returned as an error message.
pub fn parse_run_args(args: &[String]) -> std::result::Result<(RunOptions, Option<String>), String> {
    let mut options = RunOptions::default();
    let mut positional = None;
    for arg in args {
        if arg == "--no-stdlib" {
            options.no_stdlib = true;
        } else if arg.starts_with("--") {
            return Err(format!("unknown option '{arg}'"));
        } else if positional.is_none() {
            positional = Some(arg.clone());
        }
    }
    Ok((options, positional))
}

/// Run a script file and collect its results.
pub fn run_file(path: &Path, options: &RunOptions) -> Result<Vec<Value>> {
    tracing::debug!(path = %path.display(), "running file");
    let state = State::with_options(&options.state_options())?;
    state.do_file_multi(path)
}

/// Run a chunk of source text and collect its results.
pub fn eval_code(code: &str, options: &RunOptions) -> Result<Vec<Value>> {
    let state = State::with_options(&options.state_options())?;
    state.do_string_multi(code)
}

/// One line per result, strings unquoted.
pub fn format_results(results: &[Value]) -> String {
    results
        .iter()
        .map(Value::display_value)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Diagnostic line for a failed command.
pub fn format_error(error: &Error) -> String {
    format!("error[{}]: {}", error.kind.label(), error.message)
}

/// Print results, or the error, and return the process exit code.
pub fn report(outcome: Result<Vec<Value>>) -> i32 {
    match outcome {
        Ok(results) => {
            if !results.is_empty() {
                println!("{}", format_results(&results));
            }
            0
        }
        Err(error) => {
            eprintln!("{}", format_error(&error));
            1
        }
    }
}
