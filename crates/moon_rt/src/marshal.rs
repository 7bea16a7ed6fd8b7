//! Conversion between [`Value`] and the engine stack.
//!
//! [`to_value`] snapshots one stack slot into a self-contained host value;
//! [`push_value`] pushes the engine-native equivalent of a host value. Both
//! leave the stack height as they found it on failure.
//!
//! Round trips preserve value equality for nil, booleans, numbers, strings
//! and tables, identity for functions, and produce a fresh byte copy for
//! userdata.

use std::ffi::CStr;
use std::os::raw::{c_int, c_void};
use std::{ptr, slice};

use moon_value::errors::{memory, type_error};
use moon_value::{LuaString, Result, Table, Value, ValueKind};
use rustc_hash::FxHashSet;

use crate::ffi;
use crate::stack::{ensure_sufficient_stack, StackGuard};

/// Tables currently being converted, by engine identity.
type Ancestors = FxHashSet<*const c_void>;

/// Snapshot the value at `index` into a host [`Value`].
///
/// `index` may be negative (relative to the top), positive, or a
/// pseudo-index. An empty acceptable index reads as `Nil`.
///
/// Lua functions, C closures with upvalues, threads and light userdata have
/// no host representation and fail with a `Type` error, as does a table that
/// contains itself.
///
/// # Safety
///
/// `state` must be a valid engine pointer and `index` an acceptable index.
pub unsafe fn to_value(state: *mut ffi::lua_State, index: c_int) -> Result<Value> {
    let mut ancestors = Ancestors::default();
    read(state, index, &mut ancestors)
}

/// Push the engine-native equivalent of `value`.
///
/// `Nil` and NaN keys are skipped when pushing tables, since the engine
/// cannot store them. On error nothing is left on the stack.
///
/// # Safety
///
/// `state` must be a valid engine pointer.
pub unsafe fn push_value(state: *mut ffi::lua_State, value: &Value) -> Result<()> {
    if ffi::lua_checkstack(state, 1) == 0 {
        return Err(memory("cannot grow the stack to push a value"));
    }
    match value {
        Value::Nil => ffi::lua_pushnil(state),
        Value::Boolean(b) => ffi::lua_pushboolean(state, c_int::from(*b)),
        Value::Number(n) => push_number(state, *n),
        Value::String(s) => {
            ffi::lua_pushlstring(state, s.as_bytes().as_ptr().cast(), s.len());
        }
        Value::Table(table) => return ensure_sufficient_stack(|| push_table(state, table)),
        Value::Function(f) => ffi::lua_pushcfunction(state, f.get()),
        Value::UserData(data) => {
            let block = ffi::lua_newuserdatauv(state, data.len(), 0).cast::<u8>();
            if !data.is_empty() {
                // SAFETY: the engine just allocated `data.len()` bytes at `block`.
                ptr::copy_nonoverlapping(data.as_bytes().as_ptr(), block, data.len());
            }
        }
    }
    Ok(())
}

/// Integral numbers in `i64` range go in as the engine's integer subtype,
/// everything else as a float.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::float_cmp,
    reason = "range and fraction are checked before the cast"
)]
unsafe fn push_number(state: *mut ffi::lua_State, n: f64) {
    // -2^63 is exact as a float; 2^63 is the first value out of range.
    // Negative zero stays a float to keep its sign.
    let integral = n.fract() == 0.0 && !(n == 0.0 && n.is_sign_negative());
    if integral && n >= i64::MIN as f64 && n < -(i64::MIN as f64) {
        ffi::lua_pushinteger(state, n as ffi::lua_Integer);
    } else {
        ffi::lua_pushnumber(state, n);
    }
}

/// Engine type code for a value tag.
pub fn type_code(kind: ValueKind) -> c_int {
    match kind {
        ValueKind::Nil => ffi::LUA_TNIL,
        ValueKind::Boolean => ffi::LUA_TBOOLEAN,
        ValueKind::Number => ffi::LUA_TNUMBER,
        ValueKind::String => ffi::LUA_TSTRING,
        ValueKind::Table => ffi::LUA_TTABLE,
        ValueKind::Function => ffi::LUA_TFUNCTION,
        ValueKind::UserData => ffi::LUA_TUSERDATA,
    }
}

/// Whether the engine accepts `key` as a table key.
pub(crate) fn is_storable_key(key: &Value) -> bool {
    match key {
        Value::Nil => false,
        Value::Number(n) => !n.is_nan(),
        _ => true,
    }
}

/// Name of the engine type at `index`, for diagnostics.
pub(crate) unsafe fn type_name_at(state: *mut ffi::lua_State, index: c_int) -> String {
    let name = ffi::lua_typename(state, ffi::lua_type(state, index));
    if name.is_null() {
        return "no value".to_string();
    }
    CStr::from_ptr(name).to_string_lossy().into_owned()
}

/// Bytes of the string (or number, converted in place) at `index`.
///
/// The slice borrows engine memory and is only valid while the value stays
/// on the stack.
unsafe fn string_bytes<'a>(state: *mut ffi::lua_State, index: c_int) -> &'a [u8] {
    let mut len = 0usize;
    let data = ffi::lua_tolstring(state, index, &mut len);
    if data.is_null() || len == 0 {
        return &[];
    }
    slice::from_raw_parts(data.cast::<u8>(), len)
}

/// Owned copy of the string at `index`, byte for byte.
pub(crate) unsafe fn read_bytes(state: *mut ffi::lua_State, index: c_int) -> LuaString {
    LuaString::from(string_bytes(state, index))
}

/// Text of the string at `index`, for messages.
pub(crate) unsafe fn read_string(state: *mut ffi::lua_State, index: c_int) -> String {
    String::from_utf8_lossy(string_bytes(state, index)).into_owned()
}

/// Read every slot above `base`, bottom to top.
pub(crate) unsafe fn read_results(state: *mut ffi::lua_State, base: c_int) -> Result<Vec<Value>> {
    let top = ffi::lua_gettop(state);
    ((base + 1)..=top).map(|index| to_value(state, index)).collect()
}

/// Push every value in order.
pub(crate) unsafe fn push_all(state: *mut ffi::lua_State, values: &[Value]) -> Result<c_int> {
    let count =
        c_int::try_from(values.len()).map_err(|_| memory("too many values to push at once"))?;
    if ffi::lua_checkstack(state, count) == 0 {
        return Err(memory("cannot grow the stack to push the values"));
    }
    let top = ffi::lua_gettop(state);
    for value in values {
        if let Err(error) = push_value(state, value) {
            ffi::lua_settop(state, top);
            return Err(error);
        }
    }
    Ok(count)
}

// Reading

unsafe fn read(state: *mut ffi::lua_State, index: c_int, ancestors: &mut Ancestors) -> Result<Value> {
    match ffi::lua_type(state, index) {
        ffi::LUA_TNONE | ffi::LUA_TNIL => Ok(Value::Nil),
        ffi::LUA_TBOOLEAN => Ok(Value::Boolean(ffi::lua_toboolean(state, index) != 0)),
        ffi::LUA_TNUMBER => Ok(Value::Number(ffi::lua_tonumber(state, index))),
        ffi::LUA_TSTRING => Ok(Value::String(read_bytes(state, index))),
        ffi::LUA_TTABLE => ensure_sufficient_stack(|| read_table(state, index, ancestors)),
        ffi::LUA_TFUNCTION => read_function(state, index),
        ffi::LUA_TUSERDATA => Ok(read_user_data(state, index)),
        _ => Err(type_error(format!(
            "cannot convert a value of type '{}' to a host value",
            type_name_at(state, index)
        ))),
    }
}

unsafe fn read_table(
    state: *mut ffi::lua_State,
    index: c_int,
    ancestors: &mut Ancestors,
) -> Result<Value> {
    // lua_next pushes and pops, so relative indices would drift.
    let index = ffi::lua_absindex(state, index);
    let identity = ffi::lua_topointer(state, index);
    if !ancestors.insert(identity) {
        return Err(type_error("cannot convert a table that contains itself"));
    }
    if ffi::lua_checkstack(state, 3) == 0 {
        return Err(memory("cannot grow the stack to traverse a table"));
    }

    let _guard = StackGuard::new(state);
    let mut table = Table::new();
    ffi::lua_pushnil(state);
    while ffi::lua_next(state, index) != 0 {
        let key = read(state, -2, ancestors)?;
        let value = read(state, -1, ancestors)?;
        table.insert(key, value);
        ffi::lua_pop(state, 1);
    }
    ancestors.remove(&identity);
    Ok(Value::Table(table))
}

unsafe fn read_function(state: *mut ffi::lua_State, index: c_int) -> Result<Value> {
    let Some(function) = ffi::lua_tocfunction(state, index) else {
        return Err(type_error("cannot convert a Lua function to a host value"));
    };
    if !ffi::lua_getupvalue(state, index, 1).is_null() {
        ffi::lua_pop(state, 1);
        return Err(type_error(
            "cannot convert a C closure with upvalues to a host value",
        ));
    }
    Ok(Value::function(function))
}

unsafe fn read_user_data(state: *mut ffi::lua_State, index: c_int) -> Value {
    let block = ffi::lua_touserdata(state, index);
    let len = usize::try_from(ffi::lua_rawlen(state, index)).unwrap_or(0);
    if block.is_null() || len == 0 {
        return Value::user_data(Vec::new());
    }
    Value::user_data(slice::from_raw_parts(block.cast::<u8>(), len))
}

// Writing

unsafe fn push_table(state: *mut ffi::lua_State, table: &Table) -> Result<()> {
    if ffi::lua_checkstack(state, 3) == 0 {
        return Err(memory("cannot grow the stack to build a table"));
    }
    let records = c_int::try_from(table.len()).unwrap_or(0);
    ffi::lua_createtable(state, 0, records);
    let table_index = ffi::lua_gettop(state);
    for (key, value) in table {
        if !is_storable_key(key) {
            continue;
        }
        let pushed = push_value(state, key).and_then(|()| push_value(state, value));
        if let Err(error) = pushed {
            ffi::lua_settop(state, table_index - 1);
            return Err(error);
        }
        ffi::lua_settable(state, table_index);
    }
    Ok(())
}

#[cfg(test)]
mod tests;
