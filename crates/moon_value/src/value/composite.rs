//! Payloads for the string, function and userdata tags.

use std::borrow::Cow;
use std::cmp::Ordering;
use std::fmt;

use crate::errors::{type_error, Result};
#[cfg(feature = "ffi")]
use crate::CFunction;

/// An engine string: arbitrary bytes, not necessarily UTF-8.
///
/// Ordered and compared bytewise, which agrees with `str` ordering for
/// valid UTF-8.
#[derive(Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LuaString(Box<[u8]>);

impl LuaString {
    pub fn new(bytes: impl Into<Box<[u8]>>) -> Self {
        LuaString(bytes.into())
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// The text, if the bytes are valid UTF-8.
    pub fn to_str(&self) -> Result<&str> {
        std::str::from_utf8(&self.0)
            .map_err(|e| type_error(format!("string is not valid UTF-8: {e}")))
    }

    /// The text with invalid sequences replaced, for display only.
    pub fn to_string_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.0)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for LuaString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "b\"{}\"", self.0.escape_ascii())
    }
}

impl fmt::Display for LuaString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_string_lossy())
    }
}

impl From<&str> for LuaString {
    fn from(s: &str) -> Self {
        LuaString(s.as_bytes().into())
    }
}

impl From<String> for LuaString {
    fn from(s: String) -> Self {
        LuaString(s.into_bytes().into_boxed_slice())
    }
}

impl From<&[u8]> for LuaString {
    fn from(bytes: &[u8]) -> Self {
        LuaString(bytes.into())
    }
}

impl From<Vec<u8>> for LuaString {
    fn from(bytes: Vec<u8>) -> Self {
        LuaString(bytes.into_boxed_slice())
    }
}

impl PartialEq<str> for LuaString {
    fn eq(&self, other: &str) -> bool {
        self.as_bytes() == other.as_bytes()
    }
}

impl PartialEq<&str> for LuaString {
    fn eq(&self, other: &&str) -> bool {
        self.as_bytes() == other.as_bytes()
    }
}

/// Identity of a bare native function.
///
/// Carries no captured state; two values are equal iff they point at the
/// same function.
#[cfg(feature = "ffi")]
#[derive(Copy, Clone)]
pub struct NativeFunction(CFunction);

#[cfg(feature = "ffi")]
impl NativeFunction {
    #[inline]
    pub fn new(f: CFunction) -> Self {
        NativeFunction(f)
    }

    /// The callable itself.
    #[inline]
    pub fn get(self) -> CFunction {
        self.0
    }

    /// Code address, used for ordering and display.
    #[inline]
    pub fn address(self) -> usize {
        self.0 as usize
    }
}

#[cfg(feature = "ffi")]
impl Ord for NativeFunction {
    fn cmp(&self, other: &Self) -> Ordering {
        self.address().cmp(&other.address())
    }
}

#[cfg(feature = "ffi")]
impl PartialOrd for NativeFunction {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[cfg(feature = "ffi")]
impl PartialEq for NativeFunction {
    fn eq(&self, other: &Self) -> bool {
        self.address() == other.address()
    }
}

#[cfg(feature = "ffi")]
impl Eq for NativeFunction {}

#[cfg(feature = "ffi")]
impl fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NativeFunction({:#x})", self.address())
    }
}

/// Owned copy of a userdata block's bytes.
///
/// Cloning copies the bytes. Pushing one into the engine creates a fresh
/// block, so identity is never preserved across the boundary.
#[derive(Clone, Debug, Default)]
pub struct UserData(Box<[u8]>);

impl UserData {
    pub fn new(bytes: impl Into<Box<[u8]>>) -> Self {
        UserData(bytes.into())
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    #[inline]
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.0
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Size first, then bytes.
impl Ord for UserData {
    fn cmp(&self, other: &Self) -> Ordering {
        self.len()
            .cmp(&other.len())
            .then_with(|| self.as_bytes().cmp(other.as_bytes()))
    }
}

impl PartialOrd for UserData {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for UserData {
    fn eq(&self, other: &Self) -> bool {
        self.as_bytes() == other.as_bytes()
    }
}

impl Eq for UserData {}

impl From<Vec<u8>> for UserData {
    fn from(bytes: Vec<u8>) -> Self {
        UserData(bytes.into_boxed_slice())
    }
}

impl From<&[u8]> for UserData {
    fn from(bytes: &[u8]) -> Self {
        UserData(bytes.into())
    }
}
