use crate::interpreter::{Value, format_number};

use super::Instruction;

/// Render an instruction sequence in fully parenthesized canonical form.
///
/// Replays the sequence over a stack of strings. Statements left on the stack
/// are joined with `;`.
pub fn format(instructions: &[Instruction]) -> String {
    let mut stack: Vec<String> = Vec::new();
    // stack height and keys of each object literal being rebuilt
    let mut objects: Vec<(usize, Vec<String>)> = Vec::new();

    for ins in instructions {
        match ins {
            Instruction::Literal(value) => stack.push(fmt_literal(value)),
            Instruction::Undefined => stack.push("undefined".to_string()),
            Instruction::Var(name) | Instruction::VarName(name) => stack.push(name.clone()),
            Instruction::Unary(op) => {
                let operand = pop(&mut stack);
                stack.push(match op.as_str() {
                    "-" | "+" => format!("({op}{operand})"),
                    "!" => format!("({operand}!)"),
                    _ => format!("({op} {operand})"),
                });
            }
            Instruction::Binary(op) => {
                let right = pop(&mut stack);
                let left = pop(&mut stack);
                if op == "[" {
                    stack.push(format!("{left}[{right}]"));
                } else {
                    stack.push(format!("({left} {op} {right})"));
                }
            }
            Instruction::Ternary(_) => {
                let otherwise = pop(&mut stack);
                let then = pop(&mut stack);
                let cond = pop(&mut stack);
                stack.push(format!("({cond} ? {then} : {otherwise})"));
            }
            Instruction::Call(argc) => {
                let args = pop_n(&mut stack, *argc);
                let callee = pop(&mut stack);
                stack.push(format!("{callee}({})", args.join(", ")));
            }
            Instruction::FunctionDef(paramc) => {
                let body = pop(&mut stack);
                let params = pop_n(&mut stack, *paramc);
                let name = pop(&mut stack);
                stack.push(format!("({name}({}) = {body})", params.join(", ")));
            }
            Instruction::Expr(inner) => stack.push(format!("({})", format(inner))),
            Instruction::Member(name) => {
                let target = pop(&mut stack);
                stack.push(format!("{target}.{name}"));
            }
            Instruction::Array(len) => {
                let items = pop_n(&mut stack, *len);
                stack.push(format!("[{}]", items.join(", ")));
            }
            Instruction::ObjectStart => objects.push((stack.len(), Vec::new())),
            Instruction::Property(key) => {
                if let Some((_, keys)) = objects.last_mut() {
                    keys.push(key.clone());
                }
            }
            Instruction::ObjectEnd => {
                let (start, keys) = objects.pop().unwrap_or_default();
                let values = stack.split_off(start.min(stack.len()));
                let fields: Vec<String> = keys
                    .iter()
                    .zip(values)
                    .map(|(k, v)| format!("{}: {v}", fmt_key(k)))
                    .collect();
                stack.push(format!("{{{}}}", fields.join(", ")));
            }
            Instruction::CaseCondition { arms, has_else } => {
                let text = fmt_case(&mut stack, *arms, *has_else, false);
                stack.push(text);
            }
            Instruction::CaseMatch { arms, has_else } => {
                let text = fmt_case(&mut stack, *arms, *has_else, true);
                stack.push(text);
            }
            Instruction::EndStatement => {}
        }
    }

    stack.join(";")
}

fn pop(stack: &mut Vec<String>) -> String {
    stack.pop().unwrap_or_default()
}

fn pop_n(stack: &mut Vec<String>, n: usize) -> Vec<String> {
    let at = stack.len().saturating_sub(n);
    stack.split_off(at)
}

fn fmt_case(stack: &mut Vec<String>, arms: usize, has_else: bool, with_subject: bool) -> String {
    let otherwise = if has_else { Some(pop(stack)) } else { None };
    let pairs = pop_n(stack, arms * 2);
    let mut out = String::from("(case");
    if with_subject {
        out.push(' ');
        out.push_str(&pop(stack));
    }
    for pair in pairs.chunks(2) {
        if let [cond, then] = pair {
            out.push_str(&format!(" when {cond} then {then}"));
        }
    }
    if let Some(otherwise) = otherwise {
        out.push_str(&format!(" else {otherwise}"));
    }
    out.push_str(" end)");
    out
}

fn fmt_key(key: &str) -> String {
    let mut chars = key.chars();
    let is_ident = chars.next().is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if is_ident { key.to_string() } else { quote(key) }
}

fn fmt_literal(value: &Value) -> String {
    match value {
        Value::Number(n) if *n < 0.0 => format!("({})", format_number(*n)),
        Value::String(s) => quote(s),
        Value::Array(items) => {
            let items: Vec<String> = items.iter().map(fmt_literal).collect();
            format!("[{}]", items.join(", "))
        }
        Value::Object(map) => {
            let fields: Vec<String> =
                map.iter().map(|(k, v)| format!("{}: {}", fmt_key(k), fmt_literal(v))).collect();
            format!("{{{}}}", fields.join(", "))
        }
        Value::Function(f) => f.name().to_string(),
        other => other.to_string(),
    }
}

fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{8}' => out.push_str("\\b"),
            '\u{c}' => out.push_str("\\f"),
            c if c.is_control() => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Parser;

    fn canon(source: &str) -> String {
        Parser::new().parse(source).unwrap().to_string()
    }

    #[test]
    fn fmt_precedence() {
        assert_eq!(canon("-2^3"), "(-(2 ^ 3))");
        assert_eq!(canon("2^3!"), "(2 ^ (3!))");
        assert_eq!(canon("1 + 2 * 3"), "(1 + (2 * 3))");
        assert_eq!(canon("(1 + 2) * 3"), "((1 + 2) * 3)");
        assert_eq!(canon("2^3^2"), "(2 ^ (3 ^ 2))");
        assert_eq!(canon("a - b - c"), "((a - b) - c)");
    }

    #[test]
    fn fmt_unary_and_calls() {
        assert_eq!(canon("sin x + 1"), "((sin x) + 1)");
        assert_eq!(canon("not a"), "(not a)");
        assert_eq!(canon("f(1, x)"), "f(1, x)");
        assert_eq!(canon("sqrt(4)"), "(sqrt 4)");
    }

    #[test]
    fn fmt_lazy_branches() {
        assert_eq!(canon("a and b"), "(a and (b))");
        assert_eq!(canon("a ? b : c"), "(a ? (b) : (c))");
    }

    #[test]
    fn fmt_access_and_literals() {
        assert_eq!(canon("a.b[1]"), "a.b[1]");
        assert_eq!(canon("[1, \"x\"]"), "[1, \"x\"]");
        assert_eq!(canon("'a\"b'"), "\"a\\\"b\"");
        assert_eq!(canon("{a: 1, 'b c': 2}"), "{a: 1, \"b c\": 2}");
        assert_eq!(canon("undefined"), "undefined");
    }

    #[test]
    fn fmt_assignment_and_statements() {
        assert_eq!(canon("x = 1"), "(x = (1))");
        assert_eq!(canon("f(x) = x * 2"), "(f(x) = ((x * 2)))");
        assert_eq!(canon("x = 1; x + 1"), "((x = (1));(x + 1))");
    }

    #[test]
    fn fmt_case() {
        assert_eq!(
            canon("case x when 1 then 'a' else 'b' end"),
            "(case x when (1) then (\"a\") else (\"b\") end)"
        );
        assert_eq!(canon("case when x then 1 end"), "(case when (x) then (1) end)");
    }

    #[test]
    fn fmt_negative_literal() {
        let ins = vec![Instruction::number(-2.0), Instruction::number(3.0), Instruction::Binary("+".into())];
        assert_eq!(format(&ins), "((-2) + 3)");
    }
}
