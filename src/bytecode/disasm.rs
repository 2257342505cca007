use crate::bytecode::op::Op;
use crate::bytecode::program::Program;

/// Print a disassembly of a loaded program.
pub fn print_program(program: &Program) {
    match &program.header {
        Some(header) => println!("bytecode version {}", header.bytecode_version),
        None => println!("bytecode (no header)"),
    }
    println!("{} instructions", program.instructions.len());
    println!("════════════════════════════════════════");
    disassemble_ops(&program.instructions);
}

/// Print a slice of ops, one per line, marking jump targets.
pub fn disassemble_ops(ops: &[Op]) {
    let jump_targets = collect_jump_targets(ops);

    for (ip, op) in ops.iter().enumerate() {
        let marker = if jump_targets.contains(&ip) { "►" } else { " " };
        println!("{:04} {} {}", ip, marker, format_op(op, ip));
    }
}

fn collect_jump_targets(ops: &[Op]) -> Vec<usize> {
    let mut targets = Vec::new();

    for (ip, op) in ops.iter().enumerate() {
        if let Some(distance) = op.jump_distance() {
            let target = ip as i64 + distance as i64;
            if target >= 0 && (target as usize) < ops.len() && !targets.contains(&(target as usize))
            {
                targets.push(target as usize);
            }
        }
    }

    targets
}

/// Render one op in wire syntax. Jumps also show their resolved target.
pub fn format_op(op: &Op, ip: usize) -> String {
    match op {
        Op::Jump(d) | Op::JumpIfFalse(d) | Op::TraceJump(d) => {
            let target = ip as i64 + *d as i64;
            format!("{} {} -> {:04}", op.mnemonic(), d, target)
        }
        Op::PushString(s) => format!("{} {:?}", op.mnemonic(), s),
        Op::PushNumber(n) => format!("{} {}", op.mnemonic(), n),
        Op::PushBool(b) => format!("{} {}", op.mnemonic(), b),
        Op::GetVariable(name) => format!("{} {}", op.mnemonic(), name),
        Op::BinaryOp(operator) => format!("{} {}", op.mnemonic(), operator),
        Op::Call(n) => format!("{} {}", op.mnemonic(), n),
        Op::EmitOption(n) => format!("{} {}", op.mnemonic(), n),
        other => other.mnemonic().to_string(),
    }
}
