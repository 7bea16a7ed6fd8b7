//! Dynamic values mirroring the engine's value universe.
//!
//! # Ordering
//!
//! `Value` implements a strict total order so it can key a `BTreeMap`:
//!
//! 1. values of different types compare by type name, lexicographically
//!    (`boolean < function < nil < number < string < table < userdata`);
//! 2. values of the same type compare by payload. Numbers compare
//!    numerically with every NaN equal to every other NaN and greater than
//!    all other numbers. Strings compare bytewise, functions by address,
//!    userdata by size and then bytes, tables by size and then by their
//!    sorted `(key, value)` pairs.
//!
//! Equality is derived from the same order: `a == b` iff `a.cmp(b)` is
//! `Equal`.

mod composite;
mod table;

use std::cmp::Ordering;
use std::fmt;

use crate::errors::{no_such_key, type_mismatch, Result};
#[cfg(feature = "ffi")]
use crate::CFunction;

#[cfg(feature = "ffi")]
pub use composite::NativeFunction;
pub use composite::{LuaString, UserData};
pub use table::Table;

/// Shared `nil` returned by read-only lookups of absent keys.
pub static NIL: Value = Value::Nil;

/// Type tag of a [`Value`], matching the engine's basic types.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Nil,
    Boolean,
    Number,
    String,
    Table,
    Function,
    UserData,
}

impl ValueKind {
    /// Name the engine's `type()` function reports for this tag.
    pub fn type_name(self) -> &'static str {
        match self {
            ValueKind::Nil => "nil",
            ValueKind::Boolean => "boolean",
            ValueKind::Number => "number",
            ValueKind::String => "string",
            ValueKind::Table => "table",
            ValueKind::Function => "function",
            ValueKind::UserData => "userdata",
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_name())
    }
}

/// Host-side snapshot of one engine value.
#[derive(Clone, Debug, Default)]
pub enum Value {
    /// The absence of a value.
    #[default]
    Nil,
    Boolean(bool),
    /// Every number is the engine's float, whatever host type built it.
    Number(f64),
    /// Raw bytes; the engine does not require UTF-8.
    String(LuaString),
    Table(Table),
    /// Bare native function, compared by identity.
    #[cfg(feature = "ffi")]
    Function(NativeFunction),
    /// Owned copy of a userdata block.
    UserData(UserData),
}

impl Value {
    // Factory Methods

    /// Function value for a native callable.
    #[cfg(feature = "ffi")]
    #[inline]
    pub fn function(f: CFunction) -> Self {
        Value::Function(NativeFunction::new(f))
    }

    /// Userdata value holding a copy of `bytes`.
    #[inline]
    pub fn user_data(bytes: impl Into<Box<[u8]>>) -> Self {
        Value::UserData(UserData::new(bytes))
    }

    /// Table value built from key/value pairs.
    pub fn table<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<Value>,
        V: Into<Value>,
    {
        Value::Table(pairs.into_iter().collect())
    }

    // Type Inspection

    /// Type tag of this value.
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Nil => ValueKind::Nil,
            Value::Boolean(_) => ValueKind::Boolean,
            Value::Number(_) => ValueKind::Number,
            Value::String(_) => ValueKind::String,
            Value::Table(_) => ValueKind::Table,
            #[cfg(feature = "ffi")]
            Value::Function(_) => ValueKind::Function,
            Value::UserData(_) => ValueKind::UserData,
        }
    }

    /// Type name as the engine spells it.
    #[inline]
    pub fn type_name(&self) -> &'static str {
        self.kind().type_name()
    }

    #[inline]
    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    // Strict Accessors

    /// The boolean payload, without truthiness coercion.
    pub fn as_boolean(&self) -> Result<bool> {
        match self {
            Value::Boolean(b) => Ok(*b),
            other => Err(type_mismatch("boolean", other.type_name())),
        }
    }

    pub fn as_number(&self) -> Result<f64> {
        match self {
            Value::Number(n) => Ok(*n),
            other => Err(type_mismatch("number", other.type_name())),
        }
    }

    /// The string payload as text. Numbers are not converted, and bytes
    /// that are not UTF-8 are a `Type` error.
    pub fn as_str(&self) -> Result<&str> {
        self.as_lua_str()?.to_str()
    }

    /// The string payload as raw bytes.
    pub fn as_bytes(&self) -> Result<&[u8]> {
        self.as_lua_str().map(LuaString::as_bytes)
    }

    pub fn as_lua_str(&self) -> Result<&LuaString> {
        match self {
            Value::String(s) => Ok(s),
            other => Err(type_mismatch("string", other.type_name())),
        }
    }

    pub fn as_table(&self) -> Result<&Table> {
        match self {
            Value::Table(t) => Ok(t),
            other => Err(type_mismatch("table", other.type_name())),
        }
    }

    pub fn as_table_mut(&mut self) -> Result<&mut Table> {
        match self {
            Value::Table(t) => Ok(t),
            other => Err(type_mismatch("table", other.type_name())),
        }
    }

    #[cfg(feature = "ffi")]
    pub fn as_function(&self) -> Result<CFunction> {
        match self {
            Value::Function(f) => Ok(f.get()),
            other => Err(type_mismatch("function", other.type_name())),
        }
    }

    pub fn as_user_data(&self) -> Result<&UserData> {
        match self {
            Value::UserData(u) => Ok(u),
            other => Err(type_mismatch("userdata", other.type_name())),
        }
    }

    pub fn as_user_data_mut(&mut self) -> Result<&mut UserData> {
        match self {
            Value::UserData(u) => Ok(u),
            other => Err(type_mismatch("userdata", other.type_name())),
        }
    }

    // Table Subscript

    /// Read-only subscript. Absent keys yield [`NIL`]; the table is untouched.
    pub fn get(&self, key: &Value) -> Result<&Value> {
        Ok(self.as_table()?.get(key).unwrap_or(&NIL))
    }

    /// Mutable subscript. Absent keys are inserted as `Nil` first.
    pub fn get_mut(&mut self, key: impl Into<Value>) -> Result<&mut Value> {
        Ok(self.as_table_mut()?.entry(key.into()))
    }

    /// Strict subscript: absent keys are a `NoSuchKey` error.
    pub fn lookup(&self, key: &Value) -> Result<&Value> {
        self.as_table()?.get(key).ok_or_else(|| no_such_key(key))
    }

    /// Text for user output: like `Display`, but strings are not quoted.
    pub fn display_value(&self) -> String {
        match self {
            Value::String(s) => s.to_string(),
            other => other.to_string(),
        }
    }
}

// Ordering

/// Numeric order with NaN folded to a single greatest element.
fn compare_numbers(a: f64, b: f64) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Value::Nil, Value::Nil) => Ordering::Equal,
            (Value::Boolean(a), Value::Boolean(b)) => a.cmp(b),
            (Value::Number(a), Value::Number(b)) => compare_numbers(*a, *b),
            (Value::String(a), Value::String(b)) => a.cmp(b),
            (Value::Table(a), Value::Table(b)) => a.cmp(b),
            #[cfg(feature = "ffi")]
            (Value::Function(a), Value::Function(b)) => a.cmp(b),
            (Value::UserData(a), Value::UserData(b)) => a.cmp(b),
            _ => self.type_name().cmp(other.type_name()),
        }
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Value {}

// Conversions

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

macro_rules! impl_from_number {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                #[allow(
                    clippy::cast_precision_loss,
                    clippy::cast_lossless,
                    clippy::unnecessary_cast,
                    reason = "the engine has a single float number type"
                )]
                fn from(n: $ty) -> Self {
                    Value::Number(n as f64)
                }
            }
        )*
    };
}

impl_from_number!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize, f32, f64);

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.into())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s.into())
    }
}

impl From<&[u8]> for Value {
    fn from(bytes: &[u8]) -> Self {
        Value::String(bytes.into())
    }
}

impl From<LuaString> for Value {
    fn from(s: LuaString) -> Self {
        Value::String(s)
    }
}

impl From<Table> for Value {
    fn from(t: Table) -> Self {
        Value::Table(t)
    }
}

impl From<UserData> for Value {
    fn from(u: UserData) -> Self {
        Value::UserData(u)
    }
}

#[cfg(feature = "ffi")]
impl From<NativeFunction> for Value {
    fn from(f: NativeFunction) -> Self {
        Value::Function(f)
    }
}

#[cfg(feature = "ffi")]
impl From<CFunction> for Value {
    fn from(f: CFunction) -> Self {
        Value::function(f)
    }
}

/// Collapse a multi-value result to its first element (`Nil` when empty).
impl From<Vec<Value>> for Value {
    fn from(values: Vec<Value>) -> Self {
        values.into_iter().next().unwrap_or_default()
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "nil"),
            Value::Boolean(b) => write!(f, "{b}"),
            Value::Number(n) => write!(f, "{n}"),
            Value::String(s) => write!(f, "\"{s}\""),
            Value::Table(t) => write!(f, "{t}"),
            #[cfg(feature = "ffi")]
            Value::Function(func) => write!(f, "function: {:#x}", func.address()),
            Value::UserData(u) => write!(f, "userdata({} bytes)", u.len()),
        }
    }
}
