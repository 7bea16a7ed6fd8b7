//! Lazy proxies for values inside the engine's global environment.
//!
//! A [`Variable`] is a key path rooted at the global table, not a snapshot.
//! Every read, write or call walks the path again against the live engine,
//! so it always sees the current contents. Indexing and cloning never touch
//! the engine.
//!
//! Each `gettable`/`settable` of a walk runs under `lua_pcall`, since
//! `__index` and `__newindex` metamethods may raise. Their errors come back
//! as `RunTime` errors.

use std::fmt;
use std::os::raw::c_int;

use moon_value::errors::{memory, type_error, type_mismatch};
use moon_value::{Result, Value};
use smallvec::{smallvec, SmallVec};

use crate::ffi;
use crate::marshal::{is_storable_key, push_value, read_results, to_value, type_name_at};
use crate::stack::StackGuard;
use crate::state::State;
use crate::status::check_status;

/// Path to a slot in the engine, starting at a global.
#[derive(Clone, Debug)]
pub struct Variable<'lua> {
    state: &'lua State,
    keys: SmallVec<[Value; 4]>,
}

impl<'lua> Variable<'lua> {
    pub(crate) fn new(state: &'lua State, key: Value) -> Self {
        Variable {
            state,
            keys: smallvec![key],
        }
    }

    /// Proxy for `self[key]`.
    #[must_use]
    pub fn index(&self, key: impl Into<Value>) -> Variable<'lua> {
        let mut keys = self.keys.clone();
        keys.push(key.into());
        Variable {
            state: self.state,
            keys,
        }
    }

    /// Keys from the global table down to this slot.
    pub fn keys(&self) -> &[Value] {
        &self.keys
    }

    pub fn state(&self) -> &'lua State {
        self.state
    }

    /// Current value of the slot.
    ///
    /// A missing key reads as `Nil`. Indexing through anything that is not a
    /// table is a `TypeMismatch`.
    pub fn value(&self) -> Result<Value> {
        let state = self.state.as_ptr();
        // SAFETY: `self.state` keeps the engine alive; the guard restores the stack.
        unsafe {
            let _guard = StackGuard::new(state);
            self.push_resolved()?;
            to_value(state, -1)
        }
    }

    /// Write `value` into the slot, creating the key in its table.
    ///
    /// Returns the written value, so assignments can be chained.
    pub fn assign(&self, value: impl Into<Value>) -> Result<Value> {
        let value = value.into();
        // SAFETY: push_value leaves exactly one value on success.
        self.assign_with(|state| unsafe { push_value(state, &value) })?;
        Ok(value)
    }

    /// Copy the current value of `other` into this slot.
    ///
    /// The two slots do not alias afterwards: tables are copied.
    pub fn assign_from(&self, other: &Variable<'_>) -> Result<Value> {
        self.assign(other.value()?)
    }

    /// Call the slot's value with `args` and return every result.
    ///
    /// The value must be a function or have a `__call` metamethod. Errors
    /// raised by the callee keep their message.
    #[tracing::instrument(level = "debug", skip_all, fields(path = %self))]
    pub fn call(&self, args: &[Value]) -> Result<Vec<Value>> {
        let state = self.state.as_ptr();
        // SAFETY: `self.state` keeps the engine alive; the guard restores the stack.
        unsafe {
            let guard = StackGuard::new(state);
            self.push_resolved()?;
            if !is_callable(state, -1) {
                return Err(type_mismatch("function", &type_name_at(state, -1)));
            }
            let nargs = c_int::try_from(args.len())
                .map_err(|_| memory("too many arguments for one call"))?;
            if ffi::lua_checkstack(state, nargs) == 0 {
                return Err(memory("cannot grow the stack to pass the arguments"));
            }
            for arg in args {
                push_value(state, arg)?;
            }
            let status = ffi::lua_pcall(state, nargs, ffi::LUA_MULTRET, 0);
            check_status(state, status)?;
            read_results(state, guard.top())
        }
    }

    /// Resolve every key but the last and write the value pushed by `push`.
    ///
    /// `push` must leave exactly one value on the stack when it succeeds.
    pub(crate) fn assign_with(
        &self,
        push: impl FnOnce(*mut ffi::lua_State) -> Result<()>,
    ) -> Result<()> {
        let (last, path) = self.split_last();
        if !is_storable_key(last) {
            return Err(type_error(format!(
                "cannot assign to {self}: table index is {}",
                if last.is_nil() { "nil" } else { "NaN" }
            )));
        }
        let state = self.state.as_ptr();
        // SAFETY: `self.state` keeps the engine alive; the guard restores the stack.
        unsafe {
            let _guard = StackGuard::new(state);
            ffi::lua_pushglobaltable(state);
            for key in path {
                step(state, key)?;
            }
            require_table(state)?;
            if ffi::lua_checkstack(state, 1) == 0 {
                return Err(memory("cannot grow the stack to walk the path"));
            }
            ffi::lua_pushcfunction(state, protected_settable);
            ffi::lua_insert(state, -2);
            push_value(state, last)?;
            push(state)?;
            let status = ffi::lua_pcall(state, 3, 0, 0);
            check_status(state, status)?;
        }
        Ok(())
    }

    /// Push the slot's current value.
    unsafe fn push_resolved(&self) -> Result<()> {
        ffi::lua_pushglobaltable(self.state.as_ptr());
        for key in &self.keys {
            step(self.state.as_ptr(), key)?;
        }
        Ok(())
    }

    fn split_last(&self) -> (&Value, &[Value]) {
        match self.keys.split_last() {
            Some(split) => split,
            None => unreachable!("variable paths always hold at least one key"),
        }
    }
}

/// Replace the table on top of the stack with `table[key]`.
unsafe fn step(state: *mut ffi::lua_State, key: &Value) -> Result<()> {
    require_table(state)?;
    if ffi::lua_checkstack(state, 2) == 0 {
        return Err(memory("cannot grow the stack to walk the path"));
    }
    ffi::lua_pushcfunction(state, protected_gettable);
    ffi::lua_insert(state, -2);
    push_value(state, key)?;
    let status = ffi::lua_pcall(state, 2, 1, 0);
    check_status(state, status)
}

/// `(table, key) -> table[key]`, metamethods included.
unsafe extern "C-unwind" fn protected_gettable(state: *mut ffi::lua_State) -> c_int {
    ffi::lua_gettable(state, 1);
    1
}

/// `(table, key, value)`: `table[key] = value`, metamethods included.
unsafe extern "C-unwind" fn protected_settable(state: *mut ffi::lua_State) -> c_int {
    ffi::lua_settable(state, 1);
    0
}

unsafe fn require_table(state: *mut ffi::lua_State) -> Result<()> {
    if ffi::lua_type(state, -1) == ffi::LUA_TTABLE {
        Ok(())
    } else {
        Err(type_mismatch("table", &type_name_at(state, -1)))
    }
}

/// Functions, and anything with a `__call` metamethod.
unsafe fn is_callable(state: *mut ffi::lua_State, index: c_int) -> bool {
    if ffi::lua_type(state, index) == ffi::LUA_TFUNCTION {
        return true;
    }
    if ffi::luaL_getmetafield(state, index, c"__call".as_ptr()) == ffi::LUA_TNIL {
        return false;
    }
    ffi::lua_pop(state, 1);
    true
}

/// Same engine and same path. Resolved values are never compared.
impl PartialEq for Variable<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.state.as_ptr() == other.state.as_ptr() && self.keys == other.keys
    }
}

impl Eq for Variable<'_> {}

/// Renders as `name[key][key]`.
impl fmt::Display for Variable<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (first, rest) = match self.keys.split_first() {
            Some(split) => split,
            None => return Ok(()),
        };
        write!(f, "{}", first.display_value())?;
        for key in rest {
            write!(f, "[{key}]")?;
        }
        Ok(())
    }
}
