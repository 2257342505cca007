use std::fs;
use std::path::Path;

use serde_json::Value as JsonValue;
use tracing::warn;

use crate::bytecode::load_error::LoadError;
use crate::bytecode::op::{Op, Operator};
use crate::bytecode::program::{Header, Program};

// =============================================================================
// LOADER - text (.hlct) and structured (.hlcj) bytecode
// =============================================================================

/// Which wire format a blob of bytecode is in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BytecodeFormat {
    Text,
    Structured,
}

impl BytecodeFormat {
    /// Infer the format from a file extension: `.hlct` is text, `.hlcj` is
    /// structured.
    pub fn from_extension(path: &Path) -> Option<Self> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("hlct") => Some(BytecodeFormat::Text),
            Some("hlcj") => Some(BytecodeFormat::Structured),
            _ => None,
        }
    }
}

/// Read and load a bytecode file. When `format` is `None` it is inferred from
/// the extension; a file that matches neither extension is a load failure.
pub fn load_path(
    path: &Path,
    format: Option<BytecodeFormat>,
    ignore_text_header: bool,
) -> Result<Program, LoadError> {
    let format = match format {
        Some(format) => format,
        None => BytecodeFormat::from_extension(path)
            .ok_or_else(|| LoadError::UnknownFormat(path.to_path_buf()))?,
    };
    let source = fs::read_to_string(path)?;
    match format {
        BytecodeFormat::Text => load_text(&source, ignore_text_header),
        BytecodeFormat::Structured => load_structured(&source),
    }
}

// =============================================================================
// Text format
// =============================================================================

/// Load line-oriented text bytecode. The first line is the JSON header
/// (consumed without validation when `ignore_header` is set); every following
/// line is `OPCODE` or `OPCODE<sp>ARG`.
pub fn load_text(source: &str, ignore_header: bool) -> Result<Program, LoadError> {
    let mut lines = source.lines().enumerate();

    let header = match lines.next() {
        Some((_, first)) if !ignore_header => {
            let header: Header = serde_json::from_str(first.trim_end_matches('\r'))?;
            check_version(&header);
            Some(header)
        }
        _ => None,
    };

    let mut instructions = Vec::new();
    for (index, line) in lines {
        let line = line.trim_end_matches('\r');
        if line.is_empty() {
            continue;
        }
        let line_number = index + 1;

        // Single-space delimiter; everything after it is the raw argument.
        let (mnemonic, raw_arg) = match line.split_once(' ') {
            Some((mnemonic, arg)) => (mnemonic, Some(unescape_argument(arg))),
            None => (line, None),
        };

        match build_op_text(mnemonic, raw_arg.as_deref(), line_number)? {
            Some(op) => instructions.push(op),
            None => warn!("line {}: unrecognized opcode {:?}, skipping", line_number, mnemonic),
        }
    }

    Ok(Program {
        header,
        instructions,
    })
}

/// Process `\`-escapes in a text-format argument: `\n` newline, `\t` tab, any
/// other `\x` collapses to `x`, and a lone `\` before end of line stays `\`.
/// `\uXXXX` is deliberately not decoded; non-ASCII scripts use the structured
/// format.
fn unescape_argument(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

/// Build one op from a text-format line. `Ok(None)` means the opcode is
/// unrecognized and the line should be skipped.
fn build_op_text(
    mnemonic: &str,
    arg: Option<&str>,
    line: usize,
) -> Result<Option<Op>, LoadError> {
    let require = |arg: Option<&str>| -> Result<String, LoadError> {
        arg.map(str::to_string).ok_or_else(|| LoadError::MissingOperand {
            opcode: mnemonic.to_string(),
            line,
        })
    };
    let invalid = |operand: &str| LoadError::InvalidOperand {
        opcode: mnemonic.to_string(),
        operand: operand.to_string(),
        line,
    };

    let op = match mnemonic {
        "RET" => Op::Return,
        "POP" => Op::Pop,
        "NIL" => Op::PushNil,
        "LOOK" => Op::Lookup,
        "NOT" => Op::Not,
        "NEG" => Op::Negate,
        "ECHO" => Op::Echo,
        "WAIT" => Op::Wait,
        "STR" => Op::PushString(require(arg)?),
        "GETV" => Op::GetVariable(require(arg)?),
        "NUM" => {
            let raw = require(arg)?;
            Op::PushNumber(raw.parse::<f64>().map_err(|_| invalid(&raw))?)
        }
        "BOOL" => {
            let raw = require(arg)?;
            match raw.as_str() {
                "true" => Op::PushBool(true),
                "false" => Op::PushBool(false),
                _ => return Err(invalid(&raw)),
            }
        }
        "JMP" | "FJMP" | "TJMP" => {
            let raw = require(arg)?;
            let distance = raw.parse::<i32>().map_err(|_| invalid(&raw))?;
            match mnemonic {
                "JMP" => Op::Jump(distance),
                "FJMP" => Op::JumpIfFalse(distance),
                _ => Op::TraceJump(distance),
            }
        }
        "CALL" | "OPT" => {
            let raw = require(arg)?;
            let count = raw.parse::<usize>().map_err(|_| invalid(&raw))?;
            if mnemonic == "CALL" {
                Op::Call(count)
            } else {
                Op::EmitOption(count)
            }
        }
        "BOP" => {
            let raw = require(arg)?;
            Op::BinaryOp(Operator::parse(&raw).ok_or_else(|| invalid(&raw))?)
        }
        _ => return Ok(None),
    };
    Ok(Some(op))
}

// =============================================================================
// Structured format
// =============================================================================

/// Load structured bytecode: a JSON tree with `header` and `instructions`
/// fields, where each instruction is either a bare opcode string or an
/// `[opcode, operand]` pair with an already-typed operand.
pub fn load_structured(source: &str) -> Result<Program, LoadError> {
    let root: JsonValue = serde_json::from_str(source)?;

    let header_value = root.get("header").ok_or(LoadError::MissingHeader)?;
    let header: Header = serde_json::from_value(header_value.clone())?;
    check_version(&header);

    let elements = root
        .get("instructions")
        .and_then(|v| v.as_array())
        .ok_or(LoadError::MissingInstructions)?;

    let mut instructions = Vec::with_capacity(elements.len());
    for (index, element) in elements.iter().enumerate() {
        let (mnemonic, operand) = match element {
            JsonValue::String(mnemonic) => (mnemonic.as_str(), None),
            JsonValue::Array(parts) => {
                let mnemonic = parts
                    .first()
                    .and_then(|v| v.as_str())
                    .ok_or(LoadError::MalformedInstruction { index })?;
                (mnemonic, parts.get(1))
            }
            _ => return Err(LoadError::MalformedInstruction { index }),
        };

        match build_op_structured(mnemonic, operand, index)? {
            Some(op) => instructions.push(op),
            None => warn!("instruction {}: unrecognized opcode {:?}, skipping", index, mnemonic),
        }
    }

    Ok(Program {
        header: Some(header),
        instructions,
    })
}

/// Build one op from a structured-format element. `Ok(None)` means the opcode
/// is unrecognized and the element should be skipped.
fn build_op_structured(
    mnemonic: &str,
    operand: Option<&JsonValue>,
    index: usize,
) -> Result<Option<Op>, LoadError> {
    let missing = || LoadError::MissingOperand {
        opcode: mnemonic.to_string(),
        line: index,
    };
    let invalid = |operand: &JsonValue| LoadError::InvalidOperand {
        opcode: mnemonic.to_string(),
        operand: operand.to_string(),
        line: index,
    };

    let op = match mnemonic {
        "RET" => Op::Return,
        "POP" => Op::Pop,
        "NIL" => Op::PushNil,
        "LOOK" => Op::Lookup,
        "NOT" => Op::Not,
        "NEG" => Op::Negate,
        "ECHO" => Op::Echo,
        "WAIT" => Op::Wait,
        "STR" => {
            let value = operand.ok_or_else(missing)?;
            Op::PushString(value.as_str().ok_or_else(|| invalid(value))?.to_string())
        }
        "GETV" => {
            let value = operand.ok_or_else(missing)?;
            Op::GetVariable(value.as_str().ok_or_else(|| invalid(value))?.to_string())
        }
        "NUM" => {
            let value = operand.ok_or_else(missing)?;
            Op::PushNumber(value.as_f64().ok_or_else(|| invalid(value))?)
        }
        "BOOL" => {
            let value = operand.ok_or_else(missing)?;
            Op::PushBool(value.as_bool().ok_or_else(|| invalid(value))?)
        }
        "JMP" | "FJMP" | "TJMP" => {
            let value = operand.ok_or_else(missing)?;
            let distance = json_integer(value).ok_or_else(|| invalid(value))? as i32;
            match mnemonic {
                "JMP" => Op::Jump(distance),
                "FJMP" => Op::JumpIfFalse(distance),
                _ => Op::TraceJump(distance),
            }
        }
        "CALL" | "OPT" => {
            let value = operand.ok_or_else(missing)?;
            let count = json_integer(value)
                .filter(|n| *n >= 0)
                .ok_or_else(|| invalid(value))? as usize;
            if mnemonic == "CALL" {
                Op::Call(count)
            } else {
                Op::EmitOption(count)
            }
        }
        "BOP" => {
            let value = operand.ok_or_else(missing)?;
            let symbol = value.as_str().ok_or_else(|| invalid(value))?;
            Op::BinaryOp(Operator::parse(symbol).ok_or_else(|| invalid(value))?)
        }
        _ => return Ok(None),
    };
    Ok(Some(op))
}

/// JSON numbers may arrive as `3` or `3.0`; both are acceptable integers.
fn json_integer(value: &JsonValue) -> Option<i64> {
    value
        .as_i64()
        .or_else(|| value.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64))
}

fn check_version(header: &Header) {
    if !header.is_compatible() {
        warn!(
            "bytecode version {:?} is not in the compatible set; attempting to run anyway",
            header.bytecode_version
        );
    }
}
