//! Variable substitution over compiled instructions.

use crate::ir::Instruction;

/// Replace each `Var(variable)` with a fresh copy of `with`. Assignment and
/// parameter targets are names, not references, and are left alone.
///
/// `with` is a complete program, so spliced in place it pushes exactly the one
/// value the reference did.
pub fn substitute(instructions: &[Instruction], variable: &str, with: &[Instruction]) -> Vec<Instruction> {
    let mut out = Vec::with_capacity(instructions.len());
    for ins in instructions {
        match ins {
            Instruction::Var(name) if name == variable => out.extend(with.iter().cloned()),
            Instruction::Expr(body) => {
                out.push(Instruction::Expr(substitute(body, variable, with)));
            }
            other => out.push(other.clone()),
        }
    }
    out
}
