use std::collections::HashMap;
use std::path::Path;

use tracing::warn;

use crate::bytecode::load_error::LoadError;
use crate::bytecode::loader::{self, BytecodeFormat};
use crate::bytecode::op::{Op, Operator};
use crate::bytecode::program::{Header, Program};
use crate::lang::value::{HostFunction, Value};
use crate::runtime::runtime_error::RuntimeError;

#[derive(Debug, Clone)]
pub struct InterpreterConfig {
    /// Instruction budget per `run` call. `None` means unbounded; hosts that
    /// need a watchdog against runaway scripts set this.
    pub max_steps: Option<usize>,
    pub max_stack_size: usize,
}

impl Default for InterpreterConfig {
    fn default() -> Self {
        InterpreterConfig {
            max_steps: None,
            max_stack_size: 10_000,
        }
    }
}

/// A pending choice: where its `OPT` sat in the instruction vector, plus the
/// arguments that were popped for it.
#[derive(Debug, Clone, PartialEq)]
pub struct OptionRecord {
    pub ip: usize,
    pub args: Vec<Value>,
}

pub type EchoCallback = Box<dyn FnMut(&mut Interpreter, &Value)>;
pub type OptionCallback = Box<dyn FnMut(&mut Interpreter, &[Value])>;
pub type WaitCallback = Box<dyn FnMut(&mut Interpreter)>;
pub type FunctionCallCallback = Box<dyn FnMut(&mut Interpreter, &Value, &[Value])>;

/// Host hooks. All four are optional and synchronous; the interpreter is
/// mid-handler while one runs, so a callback must not re-enter `run`. A
/// callback may call `request_yield` to stop execution after the current
/// instruction.
#[derive(Default)]
pub struct Callbacks {
    pub echo: Option<EchoCallback>,
    pub option: Option<OptionCallback>,
    pub wait: Option<WaitCallback>,
    pub function_call: Option<FunctionCallCallback>,
}

/// The Hollicode virtual machine.
///
/// Instructions are stored 0-indexed; jump distances in bytecode are relative,
/// so no address translation happens at load time. Handlers advance the
/// instruction pointer themselves and the dispatcher never does, which is what
/// lets control-flow opcodes set it freely.
pub struct Interpreter {
    instructions: Vec<Op>,
    header: Option<Header>,
    ip: usize,
    stack: Vec<Value>,
    traceback: Vec<usize>,
    options: Vec<OptionRecord>,

    /// Named values readable by `GETV`, writable by the host at any time
    /// between runs.
    pub variables: HashMap<String, Value>,
    /// Host functions reachable through `GETV` when no variable shadows them.
    pub functions: HashMap<String, HostFunction>,
    pub callbacks: Callbacks,
    /// When set, `CALL` yields control back to the host after handing off the
    /// call.
    pub yield_at_function_call: bool,
    /// When set, the text loader consumes the first line without parsing or
    /// validating it as a header.
    pub ignore_text_bytecode_header: bool,

    yielded: bool,
    config: InterpreterConfig,
    steps: usize,
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

impl Interpreter {
    pub fn new() -> Self {
        Self::with_config(InterpreterConfig::default())
    }

    pub fn with_config(config: InterpreterConfig) -> Self {
        Interpreter {
            instructions: Vec::new(),
            header: None,
            ip: 0,
            stack: Vec::new(),
            traceback: Vec::new(),
            options: Vec::new(),
            variables: HashMap::new(),
            functions: HashMap::new(),
            callbacks: Callbacks::default(),
            yield_at_function_call: false,
            ignore_text_bytecode_header: false,
            yielded: false,
            config,
            steps: 0,
        }
    }

    // Loading

    /// Load a bytecode file, inferring the format from its extension.
    pub fn load_file(&mut self, path: impl AsRef<Path>) -> Result<(), LoadError> {
        let program = loader::load_path(path.as_ref(), None, self.ignore_text_bytecode_header)?;
        self.load_program(program);
        Ok(())
    }

    /// Load a bytecode file in an explicit format.
    pub fn load_file_as(
        &mut self,
        path: impl AsRef<Path>,
        format: BytecodeFormat,
    ) -> Result<(), LoadError> {
        let program =
            loader::load_path(path.as_ref(), Some(format), self.ignore_text_bytecode_header)?;
        self.load_program(program);
        Ok(())
    }

    /// Load bytecode from memory.
    pub fn load_str(&mut self, source: &str, format: BytecodeFormat) -> Result<(), LoadError> {
        let program = match format {
            BytecodeFormat::Text => loader::load_text(source, self.ignore_text_bytecode_header)?,
            BytecodeFormat::Structured => loader::load_structured(source)?,
        };
        self.load_program(program);
        Ok(())
    }

    /// Install an already-loaded program, resetting all execution state.
    pub fn load_program(&mut self, program: Program) {
        self.instructions = program.instructions;
        self.header = program.header;
        self.ip = 0;
        self.stack.clear();
        self.traceback.clear();
        self.options.clear();
        self.yielded = false;
        self.steps = 0;
    }

    // Host inspection

    pub fn header(&self) -> Option<&Header> {
        self.header.as_ref()
    }

    pub fn ip(&self) -> usize {
        self.ip
    }

    pub fn yielded(&self) -> bool {
        self.yielded
    }

    /// True once the instruction pointer has passed the end of the program.
    /// Distinguishes "ran to completion" from "suspended at a WAIT": both
    /// yield, but only a suspended program has more to execute.
    pub fn finished(&self) -> bool {
        self.ip >= self.instructions.len()
    }

    pub fn stack(&self) -> &[Value] {
        &self.stack
    }

    /// Choices recorded since the last `go_to_option`, in emission order. The
    /// 1-based position in this slice is the index `go_to_option` takes.
    pub fn pending_options(&self) -> &[OptionRecord] {
        &self.options
    }

    // Stack operations

    pub fn push(&mut self, value: Value) {
        self.stack.push(value);
    }

    /// Pop the operand stack. Popping when empty is a diagnostic, not an
    /// error: hosts may probe, and handlers treat the result as nil.
    pub fn pop(&mut self) -> Value {
        match self.stack.pop() {
            Some(value) => value,
            None => {
                warn!("popped an empty operand stack");
                Value::Nil
            }
        }
    }

    pub fn peek(&self) -> Option<&Value> {
        self.stack.last()
    }

    /// Stop execution after the current instruction. Safe to call from inside
    /// any callback.
    pub fn request_yield(&mut self) {
        self.yielded = true;
    }

    // Execution

    /// Execute until the program yields: at a `WAIT`, at end-of-program, at a
    /// `RET` with an empty traceback, or at a `CALL` when
    /// `yield_at_function_call` is set.
    pub fn run(&mut self) -> Result<(), RuntimeError> {
        self.steps = 0;
        self.yielded = false;
        while !self.yielded {
            self.step()?;
        }
        Ok(())
    }

    fn step(&mut self) -> Result<(), RuntimeError> {
        if self.ip >= self.instructions.len() {
            self.yielded = true;
            return Ok(());
        }
        self.check_limits()?;

        let op = self.instructions[self.ip].clone();
        match op {
            Op::Return => self.op_return(),
            Op::Pop => {
                self.pop();
                self.advance()
            }
            Op::Jump(distance) => self.jump(distance),
            Op::JumpIfFalse(distance) => {
                // Peek, never pop: the tested value stays on the stack. An
                // empty stack reads as nil, which is falsy.
                let falsy = self.stack.last().map_or(true, |v| v.is_falsy());
                if falsy {
                    self.jump(distance)
                } else {
                    self.advance()
                }
            }
            Op::TraceJump(distance) => {
                self.traceback.push(self.ip);
                self.jump(distance)
            }
            Op::PushString(s) => {
                self.stack.push(Value::String(s));
                self.advance()
            }
            Op::PushNumber(n) => {
                self.stack.push(Value::Number(n));
                self.advance()
            }
            Op::PushBool(b) => {
                self.stack.push(Value::Bool(b));
                self.advance()
            }
            Op::PushNil => {
                self.stack.push(Value::Nil);
                self.advance()
            }
            Op::GetVariable(name) => {
                let value = if let Some(value) = self.variables.get(&name) {
                    value.clone()
                } else if let Some(function) = self.functions.get(&name) {
                    Value::Function(function.clone())
                } else {
                    Value::Nil
                };
                self.stack.push(value);
                self.advance()
            }
            Op::Lookup => {
                let parent = self.pop();
                let child = self.pop();
                let value = match (&parent, &child) {
                    (Value::Object(map), Value::String(key)) => {
                        map.get(key).cloned().unwrap_or(Value::Nil)
                    }
                    (Value::Object(_), other) => {
                        return Err(RuntimeError::InvalidKey(other.type_name()))
                    }
                    (other, _) => return Err(RuntimeError::CannotIndex(other.type_name())),
                };
                self.stack.push(value);
                self.advance()
            }
            Op::Not => {
                let value = self.pop();
                self.stack.push(Value::Bool(value.is_falsy()));
                self.advance()
            }
            Op::Negate => {
                let value = self.pop();
                match value {
                    Value::Number(n) => self.stack.push(Value::Number(-n)),
                    other => return Err(RuntimeError::CannotNegate(other.type_name())),
                }
                self.advance()
            }
            Op::BinaryOp(operator) => {
                let left = self.pop();
                let right = self.pop();
                let result = apply_operator(operator, left, right)?;
                self.stack.push(result);
                self.advance()
            }
            Op::Call(argc) => {
                let method = self.pop();
                let args = self.pop_args(argc);
                if self.yield_at_function_call {
                    self.yielded = true;
                }
                if self.callbacks.function_call.is_some() {
                    self.emit_function_call(&method, &args);
                } else {
                    match method {
                        Value::Function(callee) => (*callee)(self, &args),
                        Value::Nil => return Err(RuntimeError::CallOnNil),
                        other => return Err(RuntimeError::NotCallable(other.type_name())),
                    }
                }
                self.advance()
            }
            Op::Echo => {
                let value = self.pop();
                self.emit_echo(&value);
                self.advance()
            }
            Op::EmitOption(argc) => {
                let args = self.pop_args(argc);
                self.options.push(OptionRecord {
                    ip: self.ip,
                    args: args.clone(),
                });
                self.emit_option(&args);
                self.advance()
            }
            Op::Wait => {
                self.yielded = true;
                self.emit_wait();
                self.advance()
            }
        }
    }

    /// Resume execution inside the body of a pending choice. `choice` is the
    /// 1-based index into the options recorded since the last selection.
    ///
    /// The current instruction pointer is saved on the traceback so the
    /// option body's `RET` continues past wherever the program was suspended,
    /// and the pending set is cleared: a recorded option can be taken once.
    pub fn go_to_option(&mut self, choice: usize) -> Result<(), RuntimeError> {
        if choice < 1 || choice > self.options.len() {
            return Err(RuntimeError::OptionOutOfRange {
                choice,
                available: self.options.len(),
            });
        }
        let record_ip = self.options[choice - 1].ip;
        self.traceback.push(self.ip);
        // Skip the OPT itself and the guard JMP the compiler emits after it.
        self.ip = record_ip + 2;
        self.options.clear();
        Ok(())
    }

    fn advance(&mut self) -> Result<(), RuntimeError> {
        self.ip += 1;
        Ok(())
    }

    fn jump(&mut self, distance: i32) -> Result<(), RuntimeError> {
        let target = self.ip as i64 + distance as i64;
        if target < 0 || target > self.instructions.len() as i64 {
            return Err(RuntimeError::JumpOutOfBounds {
                ip: self.ip,
                distance,
                target,
            });
        }
        self.ip = target as usize;
        Ok(())
    }

    fn op_return(&mut self) -> Result<(), RuntimeError> {
        match self.traceback.pop() {
            Some(saved) => {
                // Resume one past the saved index: the instruction right
                // after the TJMP, or right after wherever the host was
                // suspended when it chose an option.
                self.ip = saved + 1;
                if self.ip >= self.instructions.len() {
                    self.yielded = true;
                }
            }
            None => self.yielded = true,
        }
        Ok(())
    }

    /// Pop `count` call arguments; the first popped is argument 0.
    fn pop_args(&mut self, count: usize) -> Vec<Value> {
        (0..count).map(|_| self.pop()).collect()
    }

    fn check_limits(&mut self) -> Result<(), RuntimeError> {
        self.steps += 1;
        if let Some(max) = self.config.max_steps {
            if self.steps > max {
                return Err(RuntimeError::StepLimitExceeded(max));
            }
        }
        if self.stack.len() > self.config.max_stack_size {
            return Err(RuntimeError::StackSizeExceeded(self.config.max_stack_size));
        }
        Ok(())
    }

    // Callback emission. Each callback is taken out of its slot for the call
    // so it can receive `&mut Interpreter`, then put back unless the host
    // installed a replacement from inside it.

    fn emit_echo(&mut self, value: &Value) {
        if let Some(mut callback) = self.callbacks.echo.take() {
            callback(self, value);
            if self.callbacks.echo.is_none() {
                self.callbacks.echo = Some(callback);
            }
        }
    }

    fn emit_option(&mut self, args: &[Value]) {
        if let Some(mut callback) = self.callbacks.option.take() {
            callback(self, args);
            if self.callbacks.option.is_none() {
                self.callbacks.option = Some(callback);
            }
        }
    }

    fn emit_wait(&mut self) {
        if let Some(mut callback) = self.callbacks.wait.take() {
            callback(self);
            if self.callbacks.wait.is_none() {
                self.callbacks.wait = Some(callback);
            }
        }
    }

    fn emit_function_call(&mut self, method: &Value, args: &[Value]) {
        if let Some(mut callback) = self.callbacks.function_call.take() {
            callback(self, method, args);
            if self.callbacks.function_call.is_none() {
                self.callbacks.function_call = Some(callback);
            }
        }
    }
}

/// Apply `left <op> right`, where `left` was popped first (it sat on top of
/// the stack).
fn apply_operator(operator: Operator, left: Value, right: Value) -> Result<Value, RuntimeError> {
    let mismatch = |left: &Value, right: &Value| RuntimeError::BinaryTypeMismatch {
        operator: operator.symbol(),
        left: left.type_name(),
        right: right.type_name(),
    };

    match operator {
        // Logical operators truthy-coerce and return a strict bool.
        Operator::And => Ok(Value::Bool(left.is_truthy() && right.is_truthy())),
        Operator::Or => Ok(Value::Bool(left.is_truthy() || right.is_truthy())),

        Operator::Equal => Ok(Value::Bool(left == right)),
        Operator::NotEqual => Ok(Value::Bool(left != right)),

        Operator::Greater | Operator::Less | Operator::GreaterEqual | Operator::LessEqual => {
            match (&left, &right) {
                (Value::Number(a), Value::Number(b)) => Ok(Value::Bool(compare(operator, a, b))),
                (Value::String(a), Value::String(b)) => Ok(Value::Bool(compare(operator, a, b))),
                _ => Err(mismatch(&left, &right)),
            }
        }

        Operator::Add => match (&left, &right) {
            (Value::Number(a), Value::Number(b)) => Ok(Value::Number(a + b)),
            (Value::String(a), Value::String(b)) => Ok(Value::String(format!("{}{}", a, b))),
            _ => Err(mismatch(&left, &right)),
        },

        Operator::Subtract | Operator::Multiply | Operator::Divide => match (&left, &right) {
            (Value::Number(a), Value::Number(b)) => match operator {
                Operator::Subtract => Ok(Value::Number(a - b)),
                Operator::Multiply => Ok(Value::Number(a * b)),
                _ => {
                    if *b == 0.0 {
                        Err(RuntimeError::DivisionByZero)
                    } else {
                        Ok(Value::Number(a / b))
                    }
                }
            },
            _ => Err(mismatch(&left, &right)),
        },
    }
}

fn compare<T: PartialOrd>(operator: Operator, a: &T, b: &T) -> bool {
    match operator {
        Operator::Greater => a > b,
        Operator::Less => a < b,
        Operator::GreaterEqual => a >= b,
        _ => a <= b,
    }
}
