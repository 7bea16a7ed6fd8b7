//! Exporting host functions and classes into the engine.
//!
//! [`export_function!`](crate::export_function) wraps a plain host function;
//! [`export_methods!`](crate::export_methods) together with
//! [`ExportedClass`] exposes a host type with a constructor, methods and a
//! finalizer. Both funnel through one wrapper core that validates the
//! argument count, converts values at the boundary, and turns host errors
//! and panics into engine errors.

mod class;
mod function;

pub use class::{invoke_method, ExportedClass, Method};
pub use function::{invoke, Args, Arity, FromValue, IntoResults};
