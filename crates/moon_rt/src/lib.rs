//! Runtime side of the moon binding layer.
//!
//! Owns the engine handle ([`State`]), moves values across the engine stack
//! ([`marshal`]), proxies global paths ([`Variable`]), and exports host
//! functions and classes ([`export`]).
//!
//! # Safety
//!
//! This crate talks to the engine through its C API. Every operation records
//! the stack top it started from and restores it, so nested calls never see
//! each other's temporaries. Native functions generated here catch host
//! panics and drop every owned value before raising an engine error, since
//! engine errors unwind with `longjmp`.

#![warn(clippy::allow_attributes_without_reason)]
#![allow(
    clippy::cast_ptr_alignment,
    reason = "engine userdata blocks are maximally aligned"
)]

pub mod export;
pub mod marshal;
mod stack;
mod state;
mod status;
mod variable;


use std::sync::Once;

pub use mlua::ffi;
pub use moon_value::{
    errors, CFunction, Error, ErrorKind, LuaString, NativeFunction, Result, Table, UserData, Value,
    ValueKind,
};
pub use state::{State, StateOptions};
pub use variable::Variable;

static TRACING_INIT: Once = Once::new();

/// Initialize tracing for debug output.
///
/// Call this once at startup. Safe to call multiple times.
/// Enable with `RUST_LOG=moon_rt=debug` or `RUST_LOG=moon_rt=trace`.
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::{fmt, prelude::*, EnvFilter};

        // Only initialize if RUST_LOG is set
        if std::env::var("RUST_LOG").is_ok() {
            let filter = EnvFilter::from_default_env();
            tracing_subscriber::registry()
                .with(fmt::layer().with_target(true).with_level(true))
                .with(filter)
                .init();
        }
    });
}
