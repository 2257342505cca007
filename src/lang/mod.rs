//! Runtime value model shared by the loader and the interpreter.

pub mod value;

pub use value::{HostFunction, Value};
