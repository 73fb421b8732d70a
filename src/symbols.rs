//! Free-name extraction over compiled instructions.

use crate::interpreter::FunctionRegistry;
use crate::ir::Instruction;

/// Names referenced by `instructions`, in first-use order without duplicates.
///
/// Both references and assignment targets count. With `with_members`, a
/// variable followed by member accesses is reported as one dotted path
/// (`a.b.c`); otherwise only the root name is.
pub fn symbols(instructions: &[Instruction], with_members: bool) -> Vec<String> {
    let mut found = Vec::new();
    collect(instructions, with_members, &mut found);
    found
}

/// Like [`symbols`], minus anything whose root names a registered function.
pub fn variables(
    instructions: &[Instruction],
    with_members: bool,
    functions: &FunctionRegistry,
) -> Vec<String> {
    symbols(instructions, with_members)
        .into_iter()
        .filter(|name| !functions.contains(root(name)))
        .collect()
}

fn root(path: &str) -> &str {
    path.split('.').next().unwrap_or(path)
}

fn collect(instructions: &[Instruction], with_members: bool, found: &mut Vec<String>) {
    // variable whose member chain may still be growing
    let mut pending: Option<String> = None;

    for ins in instructions {
        match ins {
            Instruction::Var(name) | Instruction::VarName(name) => {
                if let Some(prev) = pending.take() {
                    push_unique(found, prev);
                }
                if with_members {
                    pending = Some(name.clone());
                } else {
                    push_unique(found, root(name).to_string());
                }
            }
            Instruction::Member(member) if pending.is_some() => {
                if let Some(path) = pending.as_mut() {
                    path.push('.');
                    path.push_str(member);
                }
            }
            Instruction::Expr(body) => {
                if let Some(prev) = pending.take() {
                    push_unique(found, prev);
                }
                collect(body, with_members, found);
            }
            _ => {
                if let Some(prev) = pending.take() {
                    push_unique(found, prev);
                }
            }
        }
    }

    if let Some(prev) = pending {
        push_unique(found, prev);
    }
}

fn push_unique(found: &mut Vec<String>, name: String) {
    if !found.contains(&name) {
        found.push(name);
    }
}
