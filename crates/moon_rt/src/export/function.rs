//! Wrapping host functions as native engine functions.
//!
//! Every wrapper funnels through [`invoke`]: it checks the argument count,
//! converts the arguments, runs the host body, and pushes the results. Host
//! errors and panics become engine errors of the form
//! `error calling 'NAME': message`; nothing unwinds into the engine.

use std::ffi::CStr;
use std::mem::MaybeUninit;
use std::os::raw::c_int;
use std::panic::{self, AssertUnwindSafe};

use moon_value::errors::{type_error, type_mismatch, unknown_exception, wrong_arg_count};
use moon_value::{LuaString, Result, Table, Value};

use crate::ffi;
use crate::marshal::{push_all, to_value};
use crate::state::State;

/// Number of arguments an exported function accepts.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Arity {
    /// Exactly this many; any other count is an error.
    Exact(usize),
    /// Any number, all forwarded.
    Variadic,
}

impl Arity {
    fn check(self, got: usize) -> Result<()> {
        match self {
            Arity::Exact(expected) if expected != got => Err(wrong_arg_count(expected, got)),
            _ => Ok(()),
        }
    }
}

// Conversions at the boundary

/// Host types an argument can be converted to.
pub trait FromValue: Sized {
    fn from_value(value: Value) -> Result<Self>;
}

impl FromValue for Value {
    fn from_value(value: Value) -> Result<Self> {
        Ok(value)
    }
}

impl FromValue for bool {
    fn from_value(value: Value) -> Result<Self> {
        value.as_boolean()
    }
}

impl FromValue for f64 {
    fn from_value(value: Value) -> Result<Self> {
        value.as_number()
    }
}

impl FromValue for i64 {
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_precision_loss,
        reason = "range and fraction are checked before the cast"
    )]
    fn from_value(value: Value) -> Result<Self> {
        let n = value.as_number()?;
        if n.fract() == 0.0 && n >= i64::MIN as f64 && n < i64::MAX as f64 {
            Ok(n as i64)
        } else {
            Err(type_error(format!("number {n} has no integer representation")))
        }
    }
}

/// Strings that are not UTF-8 are a `Type` error; take [`LuaString`] to
/// accept any bytes.
impl FromValue for String {
    fn from_value(value: Value) -> Result<Self> {
        let text = value.as_str()?;
        Ok(text.to_owned())
    }
}

impl FromValue for LuaString {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::String(s) => Ok(s),
            other => Err(type_mismatch("string", other.type_name())),
        }
    }
}

impl FromValue for Table {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Table(t) => Ok(t),
            other => Err(type_mismatch("table", other.type_name())),
        }
    }
}

/// `Nil` becomes `None`.
impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Nil => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

/// Host return types that can be pushed back as results.
pub trait IntoResults {
    fn into_results(self) -> Result<Vec<Value>>;
}

impl IntoResults for () {
    fn into_results(self) -> Result<Vec<Value>> {
        Ok(Vec::new())
    }
}

impl IntoResults for Vec<Value> {
    fn into_results(self) -> Result<Vec<Value>> {
        Ok(self)
    }
}

macro_rules! impl_single_result {
    ($($ty:ty),* $(,)?) => {
        $(
            impl IntoResults for $ty {
                fn into_results(self) -> Result<Vec<Value>> {
                    Ok(vec![Value::from(self)])
                }
            }
        )*
    };
}

impl_single_result!(Value, Table, bool, f64, i64, i32, usize, String, &'static str, LuaString);

impl<T: IntoResults> IntoResults for Result<T> {
    fn into_results(self) -> Result<Vec<Value>> {
        self?.into_results()
    }
}

/// Positional argument reader used by the generated wrappers.
pub struct Args {
    values: std::vec::IntoIter<Value>,
    position: usize,
}

impl Args {
    pub fn new(values: Vec<Value>) -> Self {
        Args {
            values: values.into_iter(),
            position: 0,
        }
    }

    /// Convert the next argument, naming its position on failure.
    pub fn arg<T: FromValue>(&mut self) -> Result<T> {
        self.position += 1;
        let position = self.position;
        let value = self.values.next().unwrap_or_default();
        T::from_value(value).map_err(|e| e.context(format!("bad argument #{position}")))
    }
}

// Wrapper core

/// How a native function names itself in error messages.
#[derive(Copy, Clone, Debug)]
pub(crate) enum Callee {
    /// A registered function or method. Empty asks the engine for the name
    /// the caller used.
    Named(&'static str),
    /// A class-level native, reported as `CLASS.name`.
    Member {
        class: &'static str,
        name: &'static str,
    },
}

/// Body of a wrapped host function.
///
/// Checks the argument count against `arity`, reads the arguments, clears
/// the stack, runs `body` with a non-owning view of the calling engine, and
/// pushes what it returns. `name` appears in error messages; an empty name
/// falls back to the name the engine knows the call by.
///
/// # Safety
///
/// Must only be called from a native function invoked by the engine, with
/// the `state` it was given.
pub unsafe fn invoke<F>(state: *mut ffi::lua_State, name: &'static str, arity: Arity, body: F) -> c_int
where
    F: FnOnce(&State, Vec<Value>) -> Result<Vec<Value>>,
{
    guarded(state, Callee::Named(name), || {
        let args = take_args(state, 1, arity)?;
        let view = State::from_raw(state, false)?;
        let results = body(&view, args)?;
        push_all(state, &results)
    })
}

/// Run `f` and convert any error or panic into an engine error.
///
/// Every owned value is dropped before control leaves through `lua_error`.
pub(crate) unsafe fn guarded(
    state: *mut ffi::lua_State,
    callee: Callee,
    f: impl FnOnce() -> Result<c_int>,
) -> c_int {
    let message = match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(count)) => return count,
        Ok(Err(error)) => error.message,
        Err(payload) => {
            drop(payload);
            unknown_exception().message
        }
    };
    raise(state, callee, message)
}

/// Read the arguments from `first` up, check their count, and pop them.
pub(crate) unsafe fn take_args(
    state: *mut ffi::lua_State,
    first: c_int,
    arity: Arity,
) -> Result<Vec<Value>> {
    let top = ffi::lua_gettop(state);
    let got = usize::try_from(top - first + 1).unwrap_or(0);
    arity.check(got)?;
    let args = (first..=top)
        .map(|index| to_value(state, index))
        .collect::<Result<Vec<_>>>()?;
    ffi::lua_settop(state, first - 1);
    Ok(args)
}

unsafe fn raise(state: *mut ffi::lua_State, callee: Callee, message: String) -> c_int {
    let name = match callee {
        Callee::Named("") => call_site_name(state),
        Callee::Named(name) => name.to_string(),
        Callee::Member { class, name } => format!("{class}.{name}"),
    };
    let text = format!("error calling '{name}': {message}");
    tracing::trace!(%text, "raising engine error from host function");
    drop(name);
    drop(message);
    ffi::lua_pushlstring(state, text.as_ptr().cast(), text.len());
    drop(text);
    ffi::lua_error(state)
}

/// Name of the running native function as the caller sees it, or `?`.
unsafe fn call_site_name(state: *mut ffi::lua_State) -> String {
    let mut record = MaybeUninit::<ffi::lua_Debug>::zeroed();
    if ffi::lua_getstack(state, 0, record.as_mut_ptr()) == 0
        || ffi::lua_getinfo(state, c"n".as_ptr(), record.as_mut_ptr()) == 0
    {
        return "?".to_string();
    }
    let name = (*record.as_ptr()).name;
    if name.is_null() {
        return "?".to_string();
    }
    CStr::from_ptr(name).to_string_lossy().into_owned()
}

/// Generate a native engine function wrapping a host function.
///
/// ```text
/// fn modulo(a: f64, b: f64) -> f64 { a % b }
/// fn sum(args: Vec<Value>) -> Result<f64> { ... }
/// fn nested(state: &State, n: f64) -> Result<Value> { ... }
///
/// export_function!(pub fn lua_mod("Mod") => modulo(a, b));
/// export_function!(pub fn lua_sum("Sum") => sum(..));
/// export_function!(pub fn lua_nested("Nested") => nested(&state, n));
/// ```
///
/// The fixed-arity forms reject any other argument count. The string is
/// the name used in error messages.
#[macro_export]
macro_rules! export_function {
    ($(#[$meta:meta])* $vis:vis fn $wrapper:ident($name:literal) => $($func:ident)::+ (..)) => {
        $(#[$meta])*
        #[allow(
            unsafe_code,
            clippy::missing_safety_doc,
            reason = "native functions are only called by the engine"
        )]
        $vis unsafe extern "C-unwind" fn $wrapper(
            state: *mut $crate::ffi::lua_State,
        ) -> ::std::os::raw::c_int {
            $crate::export::invoke(state, $name, $crate::export::Arity::Variadic, |_, args| {
                $crate::export::IntoResults::into_results($($func)::+(args))
            })
        }
    };
    ($(#[$meta:meta])* $vis:vis fn $wrapper:ident($name:literal) => $($func:ident)::+ (&state $(, $arg:ident)*)) => {
        $(#[$meta])*
        #[allow(
            unsafe_code,
            clippy::missing_safety_doc,
            reason = "native functions are only called by the engine"
        )]
        $vis unsafe extern "C-unwind" fn $wrapper(
            state: *mut $crate::ffi::lua_State,
        ) -> ::std::os::raw::c_int {
            let arity = $crate::export::Arity::Exact(<[&str]>::len(&[$(stringify!($arg)),*]));
            $crate::export::invoke(state, $name, arity, |view, args| {
                #[allow(unused_mut, unused_variables, reason = "zero-argument functions read nothing")]
                let mut args = $crate::export::Args::new(args);
                $(let $arg = args.arg()?;)*
                $crate::export::IntoResults::into_results($($func)::+(view $(, $arg)*))
            })
        }
    };
    ($(#[$meta:meta])* $vis:vis fn $wrapper:ident($name:literal) => $($func:ident)::+ ($($arg:ident),*)) => {
        $(#[$meta])*
        #[allow(
            unsafe_code,
            clippy::missing_safety_doc,
            reason = "native functions are only called by the engine"
        )]
        $vis unsafe extern "C-unwind" fn $wrapper(
            state: *mut $crate::ffi::lua_State,
        ) -> ::std::os::raw::c_int {
            let arity = $crate::export::Arity::Exact(<[&str]>::len(&[$(stringify!($arg)),*]));
            $crate::export::invoke(state, $name, arity, |_, args| {
                #[allow(unused_mut, unused_variables, reason = "zero-argument functions read nothing")]
                let mut args = $crate::export::Args::new(args);
                $(let $arg = args.arg()?;)*
                $crate::export::IntoResults::into_results($($func)::+($($arg),*))
            })
        }
    };
}
