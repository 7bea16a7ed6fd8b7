//! Exporting host types as engine classes.
//!
//! Each object lives behind a small userdata block, an [`ObjectCell`], that
//! records where the host object is and whether the engine owns it:
//!
//! - **Owned** objects are created by the engine-visible constructor
//!   (`Class.new(...)`). The `__gc` finalizer destroys them exactly once,
//!   unless an explicit `obj:delete()` already did.
//! - **Borrowed** objects are registered with
//!   [`Variable::register_object`]. The engine never destroys them.
//!
//! The class table doubles as the objects' metatable and is kept in the
//! registry under `moon.class.<NAME>`. Its `__index` is a separate methods
//! table, so the class table holds no reference to itself.

use std::ffi::{c_void, CStr, CString};
use std::mem::size_of;
use std::os::raw::c_int;
use std::ptr;

use moon_value::errors::{memory, type_error, type_mismatch};
use moon_value::{CFunction, Result, Value};

use super::function::{guarded, take_args, Arity, Callee};
use crate::ffi;
use crate::marshal::{push_all, type_name_at};
use crate::state::State;
use crate::variable::Variable;

/// A host type the engine can construct and call methods on.
///
/// Methods take `&self`; types that need mutation use interior mutability.
/// [`export_methods!`](crate::export_methods) generates the method table.
pub trait ExportedClass: Sized + 'static {
    /// Class name, also the default global the class is registered under.
    const NAME: &'static str;

    /// Build an object from the arguments passed to `Class.new`.
    fn construct(args: Vec<Value>) -> Result<Self>;

    /// Methods callable as `obj:name(...)`.
    fn methods() -> &'static [Method];
}

/// One exported method.
#[derive(Copy, Clone, Debug)]
pub struct Method {
    pub name: &'static str,
    pub function: CFunction,
}

/// Userdata payload for an exported object.
#[repr(C)]
#[derive(Copy, Clone)]
struct ObjectCell {
    /// Null once an owned object has been deleted.
    object: *mut c_void,
    owned: bool,
}

impl Variable<'_> {
    /// Store the class table for `C` in this slot.
    ///
    /// Registering the same class again, here or elsewhere, reuses the one
    /// class table.
    #[tracing::instrument(level = "debug", skip_all, fields(class = C::NAME, path = %self))]
    pub fn register_class<C: ExportedClass>(&self) -> Result<()> {
        // SAFETY: push_class_table leaves exactly one value on success.
        self.assign_with(|state| unsafe { push_class_table::<C>(state) })
    }

    /// Store a borrowed host object in this slot.
    ///
    /// The engine can call its methods but never destroys it.
    ///
    /// # Safety
    ///
    /// `object` must outlive every use the engine makes of it, including
    /// copies of the reference stored elsewhere by scripts.
    pub unsafe fn register_object<C: ExportedClass>(&self, object: &C) -> Result<()> {
        let object = ptr::from_ref(object).cast_mut().cast::<c_void>();
        // SAFETY: push_object leaves exactly one value on success.
        self.assign_with(|state| unsafe { push_object::<C>(state, object, false) })
    }
}

/// Body of a wrapped method.
///
/// Argument 1 must be an object of class `C`; the remaining arguments are
/// checked against `arity` and passed to `body` with the object.
///
/// # Safety
///
/// Must only be called from a native function invoked by the engine, with
/// the `state` it was given.
pub unsafe fn invoke_method<C, F>(
    state: *mut ffi::lua_State,
    name: &'static str,
    arity: Arity,
    body: F,
) -> c_int
where
    C: ExportedClass,
    F: FnOnce(&State, &C, Vec<Value>) -> Result<Vec<Value>>,
{
    guarded(state, Callee::Named(name), || {
        let object = check_object::<C>(state, 1)?;
        // `self` stays in slot 1, keeping the object alive during the call.
        let args = take_args(state, 2, arity)?;
        let view = State::from_raw(state, false)?;
        let results = body(&view, &*object, args)?;
        push_all(state, &results)
    })
}

fn registry_key<C: ExportedClass>() -> Result<CString> {
    CString::new(format!("moon.class.{}", C::NAME))
        .map_err(|_| type_error(format!("invalid class name '{}'", C::NAME)))
}

fn field_name(name: &str) -> Result<CString> {
    CString::new(name).map_err(|_| type_error(format!("invalid method name '{name}'")))
}

/// Push the class table for `C`, building it on first use.
unsafe fn push_class_table<C: ExportedClass>(state: *mut ffi::lua_State) -> Result<()> {
    let key = registry_key::<C>()?;
    if ffi::lua_checkstack(state, 3) == 0 {
        return Err(memory("cannot grow the stack to build a class"));
    }
    if ffi::luaL_newmetatable(state, key.as_ptr()) == 0 {
        return Ok(());
    }
    let class = ffi::lua_gettop(state);
    if let Err(error) = fill_class_table::<C>(state, class) {
        // Leave no half-built class behind for the next registration.
        ffi::lua_pushnil(state);
        ffi::lua_setfield(state, ffi::LUA_REGISTRYINDEX, key.as_ptr());
        ffi::lua_settop(state, class - 1);
        return Err(error);
    }
    Ok(())
}

unsafe fn fill_class_table<C: ExportedClass>(state: *mut ffi::lua_State, class: c_int) -> Result<()> {
    set_function(state, class, c"new", construct::<C>);
    set_function(state, class, c"__gc", finalize::<C>);
    set_string(state, class, c"classname", C::NAME);

    ffi::lua_createtable(state, 0, 0);
    let methods = ffi::lua_gettop(state);
    for method in C::methods() {
        let name = field_name(method.name)?;
        set_function(state, class, &name, method.function);
        set_function(state, methods, &name, method.function);
    }
    set_function(state, methods, c"delete", delete::<C>);
    set_string(state, methods, c"classname", C::NAME);
    ffi::lua_setfield(state, class, c"__index".as_ptr());
    Ok(())
}

unsafe fn set_function(state: *mut ffi::lua_State, table: c_int, name: &CStr, f: CFunction) {
    ffi::lua_pushcfunction(state, f);
    ffi::lua_setfield(state, table, name.as_ptr());
}

unsafe fn set_string(state: *mut ffi::lua_State, table: c_int, name: &CStr, value: &str) {
    ffi::lua_pushlstring(state, value.as_ptr().cast(), value.len());
    ffi::lua_setfield(state, table, name.as_ptr());
}

/// Push a new userdata for `object` carrying the class metatable.
unsafe fn push_object<C: ExportedClass>(
    state: *mut ffi::lua_State,
    object: *mut c_void,
    owned: bool,
) -> Result<()> {
    push_class_table::<C>(state)?;
    let cell = ffi::lua_newuserdatauv(state, size_of::<ObjectCell>(), 0).cast::<ObjectCell>();
    // SAFETY: the engine allocated a maximally aligned block of the right size.
    cell.write(ObjectCell { object, owned });
    ffi::lua_pushvalue(state, -2);
    ffi::lua_setmetatable(state, -2);
    ffi::lua_remove(state, -2);
    Ok(())
}

/// The cell at `index`, if it is an object of class `C`.
unsafe fn check_cell<C: ExportedClass>(
    state: *mut ffi::lua_State,
    index: c_int,
) -> Result<*mut ObjectCell> {
    if ffi::lua_type(state, index) != ffi::LUA_TUSERDATA || !has_class_metatable::<C>(state, index)? {
        return Err(type_mismatch(C::NAME, &type_name_at(state, index)));
    }
    Ok(ffi::lua_touserdata(state, index).cast::<ObjectCell>())
}

/// The live object at `index`.
unsafe fn check_object<C: ExportedClass>(state: *mut ffi::lua_State, index: c_int) -> Result<*const C> {
    let cell = check_cell::<C>(state, index)?;
    let object = (*cell).object;
    if object.is_null() {
        return Err(type_error(format!("{} object has been deleted", C::NAME)));
    }
    Ok(object.cast::<C>().cast_const())
}

unsafe fn has_class_metatable<C: ExportedClass>(state: *mut ffi::lua_State, index: c_int) -> Result<bool> {
    let key = registry_key::<C>()?;
    let index = ffi::lua_absindex(state, index);
    if ffi::lua_getmetatable(state, index) == 0 {
        return Ok(false);
    }
    ffi::lua_getfield(state, ffi::LUA_REGISTRYINDEX, key.as_ptr());
    let same = ffi::lua_rawequal(state, -1, -2) != 0;
    ffi::lua_pop(state, 2);
    Ok(same)
}

/// Destroy the object in slot 1 if the engine owns it.
///
/// Borrowed objects are left alone by the finalizer and refused by an
/// explicit delete.
unsafe fn release<C: ExportedClass>(state: *mut ffi::lua_State, explicit: bool) -> Result<()> {
    let cell = check_cell::<C>(state, 1)?;
    let ObjectCell { object, owned } = *cell;
    if object.is_null() {
        return Ok(());
    }
    if !owned {
        if explicit {
            return Err(type_error(format!(
                "cannot delete a {} object owned by the host",
                C::NAME
            )));
        }
        return Ok(());
    }
    (*cell).object = ptr::null_mut();
    drop(Box::from_raw(object.cast::<C>()));
    tracing::trace!(class = C::NAME, explicit, "destroyed object");
    Ok(())
}

// Native entry points

unsafe extern "C-unwind" fn construct<C: ExportedClass>(state: *mut ffi::lua_State) -> c_int {
    let callee = Callee::Member {
        class: C::NAME,
        name: "new",
    };
    guarded(state, callee, || {
        let args = take_args(state, 1, Arity::Variadic)?;
        let object = Box::into_raw(Box::new(C::construct(args)?)).cast::<c_void>();
        if let Err(error) = push_object::<C>(state, object, true) {
            drop(Box::from_raw(object.cast::<C>()));
            return Err(error);
        }
        Ok(1)
    })
}

unsafe extern "C-unwind" fn finalize<C: ExportedClass>(state: *mut ffi::lua_State) -> c_int {
    let callee = Callee::Member {
        class: C::NAME,
        name: "__gc",
    };
    guarded(state, callee, || release::<C>(state, false).map(|()| 0))
}

unsafe extern "C-unwind" fn delete<C: ExportedClass>(state: *mut ffi::lua_State) -> c_int {
    guarded(state, Callee::Named("delete"), || release::<C>(state, true).map(|()| 0))
}

/// Generate native wrappers for the methods of an [`ExportedClass`].
///
/// ```text
/// export_methods! {
///     mod account_methods for Account {
///         fn deposit(amount);
///         fn balance();
///         fn log(..);
///     }
/// }
///
/// impl ExportedClass for Account {
///     const NAME: &'static str = "Account";
///     fn construct(args: Vec<Value>) -> Result<Self> { ... }
///     fn methods() -> &'static [Method] { account_methods::METHODS }
/// }
/// ```
///
/// Each `fn name(a, b)` calls `object.name(a, b)` with exactly that many
/// arguments after `self`; `fn name(..)` passes every argument as a
/// `Vec<Value>`.
#[macro_export]
macro_rules! export_methods {
    ($vis:vis mod $module:ident for $class:ty {
        $(fn $method:ident ($($params:tt)*);)*
    }) => {
        $vis mod $module {
            #![allow(
                unsafe_code,
                unused_imports,
                clippy::missing_safety_doc,
                reason = "native methods are only called by the engine"
            )]
            use super::*;

            $($crate::__export_method!($class, $method, ($($params)*));)*

            pub const METHODS: &[$crate::export::Method] = &[
                $($crate::export::Method {
                    name: stringify!($method),
                    function: $method,
                }),*
            ];
        }
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __export_method {
    ($class:ty, $method:ident, (..)) => {
        pub unsafe extern "C-unwind" fn $method(
            state: *mut $crate::ffi::lua_State,
        ) -> ::std::os::raw::c_int {
            $crate::export::invoke_method::<$class, _>(
                state,
                stringify!($method),
                $crate::export::Arity::Variadic,
                |_, object, args| $crate::export::IntoResults::into_results(object.$method(args)),
            )
        }
    };
    ($class:ty, $method:ident, ($($arg:ident),*)) => {
        pub unsafe extern "C-unwind" fn $method(
            state: *mut $crate::ffi::lua_State,
        ) -> ::std::os::raw::c_int {
            let arity = $crate::export::Arity::Exact(<[&str]>::len(&[$(stringify!($arg)),*]));
            $crate::export::invoke_method::<$class, _>(state, stringify!($method), arity, |_, object, args| {
                #[allow(unused_mut, unused_variables, reason = "zero-argument methods read nothing")]
                let mut args = $crate::export::Args::new(args);
                $(let $arg = args.arg()?;)*
                $crate::export::IntoResults::into_results(object.$method($($arg),*))
            })
        }
    };
}
