//! The engine handle.

use std::ffi::{CStr, CString};
use std::fmt;
use std::path::Path;
use std::ptr::NonNull;

use moon_value::errors::{file, generic};
use moon_value::{CFunction, Result, Value};

use crate::export::ExportedClass;
use crate::ffi;
use crate::marshal::read_results;
use crate::stack::StackGuard;
use crate::status::check_status;
use crate::variable::Variable;

/// Chunk name used when the source text cannot serve as one.
const FALLBACK_CHUNK_NAME: &CStr = c"=(string)";

/// Options for creating a [`State`].
#[derive(Clone, Debug)]
pub struct StateOptions {
    /// Load the standard libraries into the new engine.
    pub open_stdlib: bool,
}

impl Default for StateOptions {
    fn default() -> Self {
        StateOptions { open_stdlib: true }
    }
}

impl StateOptions {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn open_stdlib(mut self, open: bool) -> Self {
        self.open_stdlib = open;
        self
    }
}

/// Handle to one engine instance.
///
/// An owning handle closes the engine when dropped, which runs every pending
/// finalizer. Handles built with [`State::from_raw`] only borrow the engine.
/// The raw pointer makes `State` neither `Send` nor `Sync`.
pub struct State {
    raw: NonNull<ffi::lua_State>,
    owned: bool,
}

impl State {
    /// Create an engine with the standard libraries loaded.
    pub fn new() -> Result<Self> {
        Self::with_options(&StateOptions::default())
    }

    pub fn with_options(options: &StateOptions) -> Result<Self> {
        // SAFETY: luaL_newstate has no preconditions; null means allocation failed.
        let raw = NonNull::new(unsafe { ffi::luaL_newstate() })
            .ok_or_else(|| generic("could not create a Lua state"))?;
        if options.open_stdlib {
            // SAFETY: `raw` is a freshly created engine.
            unsafe { ffi::luaL_openlibs(raw.as_ptr()) }
        }
        tracing::debug!(open_stdlib = options.open_stdlib, "created engine");
        Ok(State { raw, owned: true })
    }

    /// Wrap an engine created elsewhere without taking ownership of it.
    ///
    /// # Safety
    ///
    /// `raw` must point to a live engine that outlives the returned handle.
    pub unsafe fn from_raw(raw: *mut ffi::lua_State, open_stdlib: bool) -> Result<Self> {
        let raw = NonNull::new(raw).ok_or_else(|| generic("null engine pointer"))?;
        if open_stdlib {
            ffi::luaL_openlibs(raw.as_ptr());
        }
        Ok(State { raw, owned: false })
    }

    /// Raw engine pointer, for direct use of the C API.
    #[inline]
    pub fn as_ptr(&self) -> *mut ffi::lua_State {
        self.raw.as_ptr()
    }

    /// Whether dropping this handle closes the engine.
    #[inline]
    pub fn is_owner(&self) -> bool {
        self.owned
    }

    // Execution

    /// Run `code` and return its first result, or `Nil` when there is none.
    pub fn do_string(&self, code: &str) -> Result<Value> {
        self.do_string_multi(code).map(Value::from)
    }

    /// Run `code` and return all of its results in order.
    #[tracing::instrument(level = "debug", skip_all, fields(len = code.len()))]
    pub fn do_string_multi(&self, code: &str) -> Result<Vec<Value>> {
        let name = CString::new(code).unwrap_or_else(|_| FALLBACK_CHUNK_NAME.to_owned());
        let state = self.as_ptr();
        // SAFETY: the engine is live for `&self`; the guard restores the stack.
        unsafe {
            let guard = StackGuard::new(state);
            let status = ffi::luaL_loadbuffer(state, code.as_ptr().cast(), code.len(), name.as_ptr());
            check_status(state, status)?;
            run_loaded(state, &guard)
        }
    }

    /// Run the script at `path` and return its first result.
    pub fn do_file(&self, path: impl AsRef<Path>) -> Result<Value> {
        self.do_file_multi(path).map(Value::from)
    }

    /// Run the script at `path` and return all of its results in order.
    #[tracing::instrument(level = "debug", skip_all, fields(path = %path.as_ref().display()))]
    pub fn do_file_multi(&self, path: impl AsRef<Path>) -> Result<Vec<Value>> {
        let path = path.as_ref();
        let c_path = CString::new(path.to_string_lossy().as_bytes())
            .map_err(|_| file(format!("cannot open {}: path contains a NUL byte", path.display())))?;
        let state = self.as_ptr();
        // SAFETY: the engine is live for `&self`; the guard restores the stack.
        unsafe {
            let guard = StackGuard::new(state);
            let status = ffi::luaL_loadfile(state, c_path.as_ptr());
            check_status(state, status)?;
            run_loaded(state, &guard)
        }
    }

    // Globals

    /// Proxy for the global named by `key`. Nothing is read until used.
    pub fn global(&self, key: impl Into<Value>) -> Variable<'_> {
        Variable::new(self, key.into())
    }

    /// Store a native function as a global.
    pub fn register_function(&self, name: &str, function: CFunction) -> Result<()> {
        self.global(name).assign(Value::function(function)).map(drop)
    }

    /// Store the class table for `C` under the global `C::NAME`.
    pub fn register_class<C: ExportedClass>(&self) -> Result<()> {
        self.global(C::NAME).register_class::<C>()
    }
}

/// Call the chunk on top of the stack and read everything it returns.
unsafe fn run_loaded(state: *mut ffi::lua_State, guard: &StackGuard) -> Result<Vec<Value>> {
    let status = ffi::lua_pcall(state, 0, ffi::LUA_MULTRET, 0);
    check_status(state, status)?;
    read_results(state, guard.top())
}

impl Drop for State {
    fn drop(&mut self) {
        if self.owned {
            tracing::debug!("closing engine");
            // SAFETY: an owning handle is the only one allowed to close the engine.
            unsafe { ffi::lua_close(self.raw.as_ptr()) }
        }
    }
}

impl fmt::Debug for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("State")
            .field("raw", &self.raw)
            .field("owned", &self.owned)
            .finish()
    }
}
