//! Execution engine: interpreter state, dispatch loop, and host interface.

pub mod interpreter;
pub mod runtime_error;

pub use interpreter::{Callbacks, Interpreter, InterpreterConfig, OptionRecord};
pub use runtime_error::RuntimeError;
