//! Library side of the `moon` command-line runner.

pub mod commands;
