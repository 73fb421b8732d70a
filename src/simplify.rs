//! Constant folding over compiled instructions.

use crate::interpreter::{Value, Variables, ops};
use crate::ir::Instruction;
use crate::parser::ParserOptions;

/// Replay the stack discipline of `instructions`, folding every operation whose
/// operands are all known. Variables found in `values` count as known.
///
/// Operations that would fail at runtime are left in place so evaluation still
/// reports them. `and`, `or` and `=` are never folded. Sub-programs are
/// simplified on their own.
pub fn simplify(
    instructions: &[Instruction],
    values: &Variables,
    options: &ParserOptions,
) -> Vec<Instruction> {
    let mut out = Vec::with_capacity(instructions.len());
    // Known values sitting on top of the stack, not yet emitted.
    let mut known: Vec<Value> = Vec::new();

    for (i, ins) in instructions.iter().enumerate() {
        match ins {
            Instruction::Literal(value) => known.push(value.clone()),
            Instruction::Undefined => known.push(Value::Undefined),
            Instruction::Var(name) => match values.get(name) {
                Some(value) if !matches!(value, Value::Function(_)) => known.push(value.clone()),
                _ => emit(&mut out, &mut known, ins.clone()),
            },

            Instruction::Unary(op) if !known.is_empty() => {
                let Some(operand) = known.last() else { continue };
                match ops::apply_unary(op, operand) {
                    Ok(value) => replace_top(&mut known, 1, value),
                    Err(_) => emit(&mut out, &mut known, ins.clone()),
                }
            }

            Instruction::Binary(op) if known.len() >= 2 && is_foldable_binary(op) => {
                let left = &known[known.len() - 2];
                let right = &known[known.len() - 1];
                let folded = match op.as_str() {
                    "[" if options.allow_member_access => ops::index(left, right).ok(),
                    "[" => None,
                    _ => ops::apply_binary(op, left, right).ok(),
                };
                match folded {
                    Some(value) => replace_top(&mut known, 2, value),
                    None => emit(&mut out, &mut known, ins.clone()),
                }
            }

            Instruction::Member(name) if options.allow_member_access && !known.is_empty() => {
                let Some(target) = known.last() else { continue };
                match ops::member(target, name) {
                    Ok(value) => replace_top(&mut known, 1, value),
                    Err(_) => emit(&mut out, &mut known, ins.clone()),
                }
            }

            Instruction::Array(len) if known.len() >= *len => {
                let items = known.split_off(known.len() - len);
                known.push(Value::Array(items));
            }

            Instruction::Expr(body) => {
                let body = match function_params(instructions, i) {
                    // parameters shadow known values inside a function body
                    Some(params) => {
                        let mut scoped = values.clone();
                        for param in params {
                            scoped.remove(param);
                        }
                        simplify(body, &scoped, options)
                    }
                    None => simplify(body, values, options),
                };
                emit(&mut out, &mut known, Instruction::Expr(body));
            }

            other => emit(&mut out, &mut known, other.clone()),
        }
    }

    flush(&mut out, &mut known);
    out
}

/// Parameter names when the sub-program at `at` is the body of a function definition.
fn function_params(instructions: &[Instruction], at: usize) -> Option<Vec<&str>> {
    let Some(Instruction::FunctionDef(paramc)) = instructions.get(at + 1) else {
        return None;
    };
    let start = at.checked_sub(*paramc)?;
    instructions[start..at]
        .iter()
        .map(|ins| match ins {
            Instruction::VarName(name) => Some(name.as_str()),
            _ => None,
        })
        .collect()
}

fn is_foldable_binary(op: &str) -> bool {
    !matches!(op, "and" | "or" | "=")
}

fn replace_top(known: &mut Vec<Value>, n: usize, value: Value) {
    known.truncate(known.len() - n);
    known.push(value);
}

fn emit(out: &mut Vec<Instruction>, known: &mut Vec<Value>, ins: Instruction) {
    flush(out, known);
    out.push(ins);
}

fn flush(out: &mut Vec<Instruction>, known: &mut Vec<Value>) {
    out.extend(known.drain(..).map(|value| match value {
        Value::Undefined => Instruction::Undefined,
        value => Instruction::Literal(value),
    }));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Parser;

    fn simplify_str(source: &str, values: &[(&str, Value)]) -> Vec<Instruction> {
        let values: Variables =
            values.iter().map(|(k, v)| (k.to_string(), v.clone())).collect();
        let expr = Parser::new().parse(source).unwrap();
        simplify(expr.instructions(), &values, expr.options())
    }

    fn var(name: &str) -> Instruction {
        Instruction::Var(name.to_string())
    }

    #[test]
    fn folds_known_operands() {
        assert_eq!(simplify_str("2 * 3 + 1", &[]), vec![Instruction::number(7.0)]);
        assert_eq!(
            simplify_str("x * 2 + y", &[("x", Value::Number(3.0))]),
            vec![Instruction::number(6.0), var("y"), Instruction::Binary("+".into())]
        );
    }

    #[test]
    fn recurses_into_subprograms() {
        assert_eq!(
            simplify_str("a and (1 + 2)", &[]),
            vec![
                var("a"),
                Instruction::Expr(vec![Instruction::number(3.0)]),
                Instruction::Binary("and".into()),
            ]
        );
        assert_eq!(
            simplify_str("c ? 2 * 3 : b", &[]),
            vec![
                var("c"),
                Instruction::Expr(vec![Instruction::number(6.0)]),
                Instruction::Expr(vec![var("b")]),
                Instruction::Ternary("?".into()),
            ]
        );
    }

    #[test]
    fn logical_ops_stay_lazy() {
        // the right side is a sub-program, never a known value
        let out = simplify_str("true and false", &[]);
        assert_eq!(out.last(), Some(&Instruction::Binary("and".into())));
    }

    #[test]
    fn folds_members_arrays_and_calls_args() {
        let o = Value::from_json(&serde_json::json!({"a": {"b": 5}}));
        assert_eq!(simplify_str("o.a.b", &[("o", o)]), vec![Instruction::number(5.0)]);
        assert_eq!(simplify_str("[1, 2 + 3][1]", &[]), vec![Instruction::number(5.0)]);
        assert_eq!(
            simplify_str("f(2 + 3)", &[]),
            vec![var("f"), Instruction::number(5.0), Instruction::Call(1)]
        );
    }

    #[test]
    fn failing_operations_are_kept() {
        let o = Value::from_json(&serde_json::json!({}));
        assert_eq!(
            simplify_str("o.missing.x", &[("o", o)]),
            vec![Instruction::Undefined, Instruction::Member("x".into())]
        );
    }

    #[test]
    fn assignment_targets_untouched() {
        assert_eq!(
            simplify_str("x = 1 + 1", &[("x", Value::Number(9.0))]),
            vec![
                Instruction::VarName("x".into()),
                Instruction::Expr(vec![Instruction::number(2.0)]),
                Instruction::Binary("=".into()),
            ]
        );
    }

    #[test]
    fn function_parameters_are_not_folded() {
        let out = simplify_str("f(x) = x + 1; f(10)", &[("x", Value::Number(1.0))]);
        let value = crate::interpreter::evaluate(
            &out,
            &ParserOptions::default(),
            &crate::interpreter::FunctionRegistry::new(),
            &mut Variables::new(),
        )
        .unwrap();
        assert_eq!(value, Value::Number(11.0));

        // free names in the body still fold
        assert_eq!(
            simplify_str("g(a) = a * k", &[("a", Value::Number(5.0)), ("k", Value::Number(2.0))]),
            vec![
                Instruction::VarName("g".into()),
                Instruction::VarName("a".into()),
                Instruction::Expr(vec![var("a"), Instruction::number(2.0), Instruction::Binary("*".into())]),
                Instruction::FunctionDef(1),
            ]
        );
    }

    #[test]
    fn simplify_is_idempotent() {
        let values: Variables = [("x".to_string(), Value::Number(2.0))].into_iter().collect();
        for source in ["x * y + 3 * 4", "a ? x + 1 : -x", "f(x, 2 ^ 3) || 'z'", "[x, y][0] + 1"] {
            let expr = Parser::new().parse(source).unwrap();
            let once = simplify(expr.instructions(), &values, expr.options());
            let twice = simplify(&once, &values, expr.options());
            assert_eq!(once, twice, "{source}");
        }
    }
}
