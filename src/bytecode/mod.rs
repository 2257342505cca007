pub mod disasm;
pub mod load_error;
pub mod loader;
pub mod op;
pub mod program;

pub use load_error::LoadError;
pub use loader::BytecodeFormat;
pub use op::{Op, Operator};
pub use program::{Header, Program, COMPATIBLE_BYTECODE_VERSIONS};
