use crate::error::Result;
use crate::ir::Instruction;
use crate::lexer::TokenKind;

use super::ParserState;

impl ParserState<'_> {
    /// Full expression including `;` separated statements.
    ///
    /// A single statement is emitted inline. A sequence is wrapped in one
    /// sub-program with `EndStatement` between statements, so its value is the
    /// value of the last one. A trailing `;` before `)` or end of input does
    /// not start a new statement.
    pub(super) fn parse_expression(&mut self, instr: &mut Vec<Instruction>) -> Result<()> {
        let mut body = Vec::new();
        self.parse_assignment(&mut body)?;
        if self.peek()?.kind != TokenKind::Semicolon {
            instr.append(&mut body);
            return Ok(());
        }
        while self.accept(&TokenKind::Semicolon)? {
            if matches!(self.peek()?.kind, TokenKind::Eof | TokenKind::Paren(')')) {
                break;
            }
            body.push(Instruction::EndStatement);
            self.parse_assignment(&mut body)?;
        }
        instr.push(Instruction::Expr(body));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::ir::Instruction;
    use crate::parser::Parser;

    fn parse_str(source: &str) -> Vec<Instruction> {
        Parser::new().parse(source).unwrap().into_instructions()
    }

    #[test]
    fn statement_sequence_is_one_subprogram() {
        assert_eq!(
            parse_str("a; b; c"),
            vec![Instruction::Expr(vec![
                Instruction::Var("a".into()),
                Instruction::EndStatement,
                Instruction::Var("b".into()),
                Instruction::EndStatement,
                Instruction::Var("c".into()),
            ])]
        );
    }

    #[test]
    fn trailing_semicolon_adds_no_statement() {
        assert_eq!(parse_str("a;"), vec![Instruction::Expr(vec![Instruction::Var("a".into())])]);
        assert_eq!(
            parse_str("(a; b;) * 2"),
            vec![
                Instruction::Expr(vec![
                    Instruction::Var("a".into()),
                    Instruction::EndStatement,
                    Instruction::Var("b".into()),
                ]),
                Instruction::number(2.0),
                Instruction::Binary("*".into()),
            ]
        );
    }

    #[test]
    fn single_statement_is_inline() {
        assert_eq!(parse_str("a"), vec![Instruction::Var("a".into())]);
    }

    #[test]
    fn empty_statement_is_an_error() {
        assert!(Parser::new().parse("a;;b").is_err());
        assert!(Parser::new().parse(";").is_err());
    }
}
