use serde::Deserialize;

use crate::bytecode::op::Op;

/// Bytecode versions this interpreter knows how to execute. Anything else
/// loads with a warning.
pub const COMPATIBLE_BYTECODE_VERSIONS: &[&str] = &["0.1.0"];

/// Bytecode header. Both wire formats share this schema; unknown fields are
/// ignored.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Header {
    pub bytecode_version: String,
}

impl Header {
    pub fn is_compatible(&self) -> bool {
        COMPATIBLE_BYTECODE_VERSIONS.contains(&self.bytecode_version.as_str())
    }
}

/// A loaded bytecode program: decoded header plus the dense instruction
/// vector the interpreter executes.
///
/// The header is absent only when the host asked the text loader to skip it.
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub header: Option<Header>,
    pub instructions: Vec<Op>,
}

impl Program {
    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_compatibility() {
        let known = Header {
            bytecode_version: "0.1.0".to_string(),
        };
        let unknown = Header {
            bytecode_version: "9.9.9".to_string(),
        };
        assert!(known.is_compatible());
        assert!(!unknown.is_compatible());
    }

    #[test]
    fn test_header_decodes_camel_case_and_ignores_extras() {
        let header: Header =
            serde_json::from_str(r#"{"bytecodeVersion": "0.1.0", "compiler": "hlc 1.2"}"#)
                .expect("header should decode");
        assert_eq!(header.bytecode_version, "0.1.0");
    }
}
