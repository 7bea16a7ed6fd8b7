//! Stack discipline helpers.
//!
//! Every operation that touches the engine records the stack top it found
//! and restores it on exit, success or failure. That is what makes nested
//! host → guest → host calls safe.

use std::os::raw::c_int;

use crate::ffi;

/// Minimum native stack space to keep available (100KB red zone).
const RED_ZONE: usize = 100 * 1024;

/// Native stack space to allocate when growing (1MB).
const STACK_PER_RECURSION: usize = 1024 * 1024;

/// Grow the native stack if needed before running `f`.
///
/// Marshaling recurses once per level of table nesting.
#[inline]
#[cfg(not(target_arch = "wasm32"))]
pub(crate) fn ensure_sufficient_stack<R>(f: impl FnOnce() -> R) -> R {
    stacker::maybe_grow(RED_ZONE, STACK_PER_RECURSION, f)
}

#[inline]
#[cfg(target_arch = "wasm32")]
pub(crate) fn ensure_sufficient_stack<R>(f: impl FnOnce() -> R) -> R {
    f()
}

/// Restores the engine's stack top when dropped.
pub(crate) struct StackGuard {
    state: *mut ffi::lua_State,
    top: c_int,
}

impl StackGuard {
    /// # Safety
    ///
    /// `state` must stay valid for the lifetime of the guard, and the guard
    /// must be dropped before control leaves through `lua_error`.
    pub(crate) unsafe fn new(state: *mut ffi::lua_State) -> Self {
        StackGuard {
            state,
            top: ffi::lua_gettop(state),
        }
    }

    /// Stack top recorded at construction.
    #[inline]
    pub(crate) fn top(&self) -> c_int {
        self.top
    }
}

impl Drop for StackGuard {
    fn drop(&mut self) {
        // SAFETY: `new` requires the state to outlive the guard.
        unsafe { ffi::lua_settop(self.state, self.top) }
    }
}
