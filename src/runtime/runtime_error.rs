use thiserror::Error;

/// Fatal execution failures. These propagate out of `run` unchanged; the
/// interpreter's state is left as-is so the host can inspect the instruction
/// pointer afterward.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("jump out of bounds: ip={ip}, distance={distance}, target={target}")]
    JumpOutOfBounds {
        ip: usize,
        distance: i32,
        target: i64,
    },

    #[error("type error: cannot apply {operator} to {left} and {right}")]
    BinaryTypeMismatch {
        operator: &'static str,
        left: &'static str,
        right: &'static str,
    },

    #[error("division by zero")]
    DivisionByZero,

    #[error("cannot negate {0}")]
    CannotNegate(&'static str),

    #[error("cannot index into {0}")]
    CannotIndex(&'static str),

    #[error("object keys must be strings, got {0}")]
    InvalidKey(&'static str),

    #[error("call target is nil and no function-call callback is installed")]
    CallOnNil,

    #[error("call target is {0}, not a function")]
    NotCallable(&'static str),

    #[error("option choice {choice} out of range (1..={available})")]
    OptionOutOfRange { choice: usize, available: usize },

    #[error("execution step limit exceeded ({0})")]
    StepLimitExceeded(usize),

    #[error("stack size limit exceeded ({0})")]
    StackSizeExceeded(usize),
}
