//! Hollicode bytecode interpreter.
//!
//! A small stack-based virtual machine that executes precompiled scripts
//! produced by the Hollicode compiler. The VM emits lines of text, presents
//! choices, suspends for player input, and resumes in a chosen branch; a host
//! drives it through [`Interpreter::run`], [`Interpreter::go_to_option`], and
//! the callbacks on [`Callbacks`].
//!
//! ```no_run
//! use hollicode::Interpreter;
//!
//! let mut vm = Interpreter::new();
//! vm.callbacks.echo = Some(Box::new(|_, value| println!("{}", value)));
//! vm.load_file("intro.hlct")?;
//! vm.run()?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod bytecode;
pub mod lang;
pub mod runtime;

pub use bytecode::{BytecodeFormat, Header, LoadError, Op, Operator, Program};
pub use lang::value::{HostFunction, Value};
pub use runtime::interpreter::{Callbacks, Interpreter, InterpreterConfig, OptionRecord};
pub use runtime::runtime_error::RuntimeError;
