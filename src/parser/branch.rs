use crate::error::Result;
use crate::ir::Instruction;
use crate::lexer::{OpContext, TokenKind};

use super::ParserState;

impl ParserState<'_> {
    /// `cond ? then : otherwise`. Both branches compile to sub-programs.
    pub(super) fn parse_conditional(&mut self, instr: &mut Vec<Instruction>) -> Result<()> {
        self.nested(|p| p.parse_conditional_inner(instr))
    }

    fn parse_conditional_inner(&mut self, instr: &mut Vec<Instruction>) -> Result<()> {
        self.parse_in(instr)?;
        let token = self.peek()?;
        if !token.kind.is_op("?") {
            return Ok(());
        }
        self.gate(&token, "?", OpContext::Infix)?;
        self.advance()?;
        let mut then = Vec::new();
        self.parse_conditional(&mut then)?;
        self.expect(&TokenKind::Op(":"))?;
        let mut otherwise = Vec::new();
        self.parse_conditional(&mut otherwise)?;
        instr.push(Instruction::Expr(then));
        instr.push(Instruction::Expr(otherwise));
        instr.push(Instruction::Ternary("?".to_string()));
        Ok(())
    }

    /// `x in xs` and `x not in xs`.
    fn parse_in(&mut self, instr: &mut Vec<Instruction>) -> Result<()> {
        self.parse_or(instr)?;
        loop {
            let token = self.peek()?;
            let negated = if token.kind.is_name("in") {
                false
            } else if token.kind.is_name("not") && self.peek_nth(1)?.is_name("in") {
                true
            } else {
                return Ok(());
            };
            self.gate(&token, "in", OpContext::Infix)?;
            self.advance()?;
            if negated {
                self.advance()?;
            }
            self.parse_or(instr)?;
            instr.push(Instruction::Binary("in".to_string()));
            if negated {
                instr.push(Instruction::Unary("not".to_string()));
            }
        }
    }

    fn parse_or(&mut self, instr: &mut Vec<Instruction>) -> Result<()> {
        self.parse_and(instr)?;
        while self.accept_logical("or")? {
            let mut right = Vec::new();
            self.parse_and(&mut right)?;
            instr.push(Instruction::Expr(right));
            instr.push(Instruction::Binary("or".to_string()));
        }
        Ok(())
    }

    fn parse_and(&mut self, instr: &mut Vec<Instruction>) -> Result<()> {
        self.parse_comparison(instr)?;
        while self.accept_logical("and")? {
            let mut right = Vec::new();
            self.parse_comparison(&mut right)?;
            instr.push(Instruction::Expr(right));
            instr.push(Instruction::Binary("and".to_string()));
        }
        Ok(())
    }

    fn accept_logical(&mut self, op: &str) -> Result<bool> {
        let token = self.peek()?;
        if !token.kind.is_name(op) {
            return Ok(false);
        }
        self.gate(&token, op, OpContext::Infix)?;
        self.advance()?;
        Ok(true)
    }

    /// `case [subject] when c then t ... [else e] end`, after the `case` name.
    ///
    /// Each condition and result is its own sub-program, in source order,
    /// followed by the optional `else` branch.
    pub(super) fn parse_case(&mut self, instr: &mut Vec<Instruction>) -> Result<()> {
        let has_subject = !self.peek()?.kind.is_name("when");
        if has_subject {
            self.parse_assignment(instr)?;
        }

        let mut arms = 0;
        loop {
            let token = self.peek()?;
            if !token.kind.is_name("when") {
                if arms == 0 {
                    return Err(self.error(
                        &token,
                        format!("expected 'when', got {}", token.kind.describe()),
                    ));
                }
                break;
            }
            self.advance()?;
            let mut condition = Vec::new();
            self.parse_assignment(&mut condition)?;
            self.expect_keyword("then")?;
            let mut result = Vec::new();
            self.parse_assignment(&mut result)?;
            instr.push(Instruction::Expr(condition));
            instr.push(Instruction::Expr(result));
            arms += 1;
        }

        let has_else = self.peek()?.kind.is_name("else");
        if has_else {
            self.advance()?;
            let mut otherwise = Vec::new();
            self.parse_assignment(&mut otherwise)?;
            instr.push(Instruction::Expr(otherwise));
        }
        self.expect_keyword("end")?;

        instr.push(if has_subject {
            Instruction::CaseMatch { arms, has_else }
        } else {
            Instruction::CaseCondition { arms, has_else }
        });
        Ok(())
    }

    fn expect_keyword(&mut self, word: &str) -> Result<()> {
        let token = self.peek()?;
        if token.kind.is_name(word) {
            self.advance()?;
            return Ok(());
        }
        Err(self.error(&token, format!("expected '{word}', got {}", token.kind.describe())))
    }
}
