use crate::error::Result;
use crate::ir::Instruction;
use crate::lexer::{OpContext, Token};

use super::ParserState;

impl ParserState<'_> {
    /// `target = value` and `f(a, b) = body`, right-associative.
    pub(super) fn parse_assignment(&mut self, instr: &mut Vec<Instruction>) -> Result<()> {
        self.nested(|p| p.parse_assignment_inner(instr))
    }

    fn parse_assignment_inner(&mut self, instr: &mut Vec<Instruction>) -> Result<()> {
        self.parse_conditional(instr)?;
        let token = self.peek()?;
        if !token.kind.is_op("=") {
            return Ok(());
        }
        self.gate(&token, "=", OpContext::Infix)?;
        self.advance()?;

        match instr.pop() {
            Some(Instruction::Call(argc)) => {
                if !self.options().fndef_enabled() {
                    return Err(self.error(&token, "function definition is not enabled"));
                }
                self.rewrite_params(instr, argc, &token)?;
                let mut body = Vec::new();
                self.parse_assignment(&mut body)?;
                instr.push(Instruction::Expr(body));
                instr.push(Instruction::FunctionDef(argc));
            }
            Some(last) => {
                let name = self.assignment_target(instr, last, &token)?;
                let mut value = Vec::new();
                self.parse_assignment(&mut value)?;
                instr.push(Instruction::VarName(name));
                instr.push(Instruction::Expr(value));
                instr.push(Instruction::Binary("=".to_string()));
            }
            None => return Err(self.error(&token, "expected variable for assignment")),
        }
        Ok(())
    }

    /// The callee and each argument of `f(a, b)` must be single variable
    /// references; they become variable names.
    fn rewrite_params(&self, instr: &mut [Instruction], argc: usize, at: &Token) -> Result<()> {
        let start = instr
            .len()
            .checked_sub(argc + 1)
            .ok_or_else(|| self.error(at, "expected function name and parameter names"))?;
        for ins in &mut instr[start..] {
            match ins {
                Instruction::Var(name) => *ins = Instruction::VarName(std::mem::take(name)),
                _ => {
                    return Err(self.error(at, "function parameters must be plain variable names"));
                }
            }
        }
        Ok(())
    }

    /// Reduce `x` or `x.a.b` at the end of `instr` to a dotted variable path.
    fn assignment_target(
        &self,
        instr: &mut Vec<Instruction>,
        last: Instruction,
        at: &Token,
    ) -> Result<String> {
        match last {
            Instruction::Var(name) => Ok(name),
            Instruction::Member(member) => {
                let mut path = vec![member];
                loop {
                    match instr.pop() {
                        Some(Instruction::Member(m)) => path.push(m),
                        Some(Instruction::Var(root)) => {
                            path.push(root);
                            break;
                        }
                        _ => return Err(self.error(at, "expected variable for assignment")),
                    }
                }
                path.reverse();
                Ok(path.join("."))
            }
            _ => Err(self.error(at, "expected variable for assignment")),
        }
    }
}
