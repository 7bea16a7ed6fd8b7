//! Translation of engine status codes into binding errors.

use std::os::raw::c_int;

use moon_value::errors::{file, handler, memory, runtime, syntax};
use moon_value::Error;

use crate::ffi;
use crate::marshal::read_string;

/// Message used when the error object is neither a string nor a number.
pub(crate) const NO_MESSAGE: &str = "no additional information about this error";

/// Map a non-zero status code and its message to an [`Error`].
///
/// Only the five codes the engine documents for load and protected call are
/// valid here. Anything else means the binding itself is broken.
pub(crate) fn translate(status: c_int, message: String) -> Error {
    match status {
        ffi::LUA_ERRRUN => runtime(message),
        ffi::LUA_ERRFILE => file(message),
        ffi::LUA_ERRSYNTAX => syntax(message),
        ffi::LUA_ERRMEM => memory(message),
        ffi::LUA_ERRERR => handler(message),
        other => unreachable!("unrecognised engine status code {other}"),
    }
}

/// Turn the result of a load or protected call into a `Result`.
///
/// On failure the error object on top of the stack is popped, so the stack
/// height matches what it was before the call.
///
/// # Safety
///
/// `state` must be valid and, when `status` is non-zero, hold the error
/// object on top of its stack.
pub(crate) unsafe fn check_status(state: *mut ffi::lua_State, status: c_int) -> Result<(), Error> {
    if status == ffi::LUA_OK {
        return Ok(());
    }
    let message = if ffi::lua_isstring(state, -1) == 0 {
        NO_MESSAGE.to_string()
    } else {
        read_string(state, -1)
    };
    ffi::lua_pop(state, 1);
    tracing::debug!(status, %message, "engine reported an error");
    Err(translate(status, message))
}
