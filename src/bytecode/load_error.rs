use std::path::PathBuf;

use thiserror::Error;

/// Fatal loader failures. Unknown opcodes and unknown bytecode versions are
/// deliberately not here: those are warnings and loading continues.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read bytecode file: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed structured bytecode: {0}")]
    Json(#[from] serde_json::Error),

    #[error("bytecode is missing its header")]
    MissingHeader,

    #[error("bytecode is missing its instructions array")]
    MissingInstructions,

    #[error("instruction {index} is neither an opcode string nor an [opcode, operand] pair")]
    MalformedInstruction { index: usize },

    #[error("line {line}: {opcode} requires an operand")]
    MissingOperand { opcode: String, line: usize },

    #[error("line {line}: invalid operand for {opcode}: {operand}")]
    InvalidOperand {
        opcode: String,
        operand: String,
        line: usize,
    },

    #[error("cannot infer bytecode format from file name: {}", .0.display())]
    UnknownFormat(PathBuf),
}
