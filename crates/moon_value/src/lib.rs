//! Host-side value model for the moon binding layer.
//!
//! A [`Value`] is a self-contained snapshot of one Lua value: it owns every
//! nested table and userdata byte, never aliases engine memory, and can
//! outlive the engine it came from. Conversion to and from the live engine
//! stack lives in `moon_rt::marshal`; this crate has no unsafe code.
//!
//! Function values carry the engine's C function pointer type and are only
//! available with the `ffi` feature, which pulls in the engine's bindings.
//!
//! Errors from every layer of the binding share one [`Error`] type whose
//! [`ErrorKind`] mirrors the engine's status codes plus the host-side
//! structural failures (type mismatch, missing key).

pub mod errors;
mod value;

pub use errors::{Error, ErrorKind, Result};
#[cfg(feature = "ffi")]
pub use value::NativeFunction;
pub use value::{LuaString, Table, UserData, Value, ValueKind, NIL};

/// The engine's native callable signature.
#[cfg(feature = "ffi")]
pub use mlua::ffi::lua_CFunction as CFunction;
