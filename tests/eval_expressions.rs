use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use expra::{ErrorKind, Parser, ParserOptions, Value, Variables};
use proptest::prelude::*;
use serde_json::json;

fn eval_str(source: &str) -> Value {
    expra::evaluate(source, &mut Variables::new())
        .unwrap_or_else(|e| panic!("{source}: {e}"))
}

fn num(source: &str) -> f64 {
    match eval_str(source) {
        Value::Number(n) => n,
        other => panic!("{source}: expected number, got {other:?}"),
    }
}

fn context(json: serde_json::Value) -> Variables {
    match Value::from_json(&json) {
        Value::Object(map) => map.into_iter().collect(),
        other => panic!("context must be an object, got {other:?}"),
    }
}

/// Parser with a `name` function that counts its calls and returns `result`.
fn counting_parser(name: &str, result: bool) -> (Parser, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let mut parser = Parser::new();
    let counter = Arc::clone(&calls);
    parser.register_function(name, move |_: &[Value]| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(Value::Bool(result))
    });
    (parser, calls)
}

// --- Canonical form ---

#[test]
fn canonical_strings() {
    let cases = [
        ("1 + 2 * 3", "(1 + (2 * 3))"),
        ("-2^3", "(-(2 ^ 3))"),
        ("2^3!", "(2 ^ (3!))"),
        ("a || b || c", "((a || b) || c)"),
        ("a or b in c", "((a or (b)) in c)"),
        ("not a == b", "((not a) == b)"),
    ];
    for (source, expected) in cases {
        assert_eq!(expra::parse(source).unwrap().to_string(), expected, "{source}");
    }
}

// --- Numeric semantics ---

#[test]
fn numeric_results() {
    assert_eq!(num("1/0"), f64::INFINITY);
    assert!(num("0/0").is_nan());
    assert_eq!(num("5!"), 120.0);
    assert_eq!(num("(-1)!"), f64::INFINITY);
    assert_eq!(num("2^10 - 24"), 1000.0);
    assert_eq!(num("7 % 4 * 2"), 6.0);
    assert_eq!(num("0x1F + 0b101"), 36.0);
    assert_eq!(num("1.5e3 / 3"), 500.0);
    assert_eq!(num("round 2.5 + floor(-1.5)"), 1.0);
    assert!((num("sin(PI / 2)") - 1.0).abs() < 1e-12);
}

#[test]
fn strings_and_collections() {
    assert_eq!(eval_str("'foo' || 'bar'"), Value::from("foobar"));
    assert_eq!(eval_str("[1] || [2, 3]"), Value::from_json(&json!([1, 2, 3])));
    assert_eq!(eval_str("'b' in 'abc'"), Value::Bool(true));
    assert_eq!(eval_str("4 not in [1, 2]"), Value::Bool(true));
    assert_eq!(eval_str("length [1, 2, 3]"), Value::Number(3.0));
    assert_eq!(eval_str("{a: [1, {b: 'x'}]}.a[1].b"), Value::from("x"));
    assert_eq!(eval_str("'1' == 1"), Value::Bool(false));
}

// --- Short-circuit ---

#[test]
fn false_and_never_calls_right_side() {
    let (parser, calls) = counting_parser("f", true);
    let value = parser.evaluate("false and f()", &mut Variables::new()).unwrap();
    assert_eq!(value, Value::Bool(false));
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    parser.evaluate("true and f()", &mut Variables::new()).unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn true_or_never_calls_right_side() {
    let (parser, calls) = counting_parser("g", false);
    let value = parser.evaluate("true or g()", &mut Variables::new()).unwrap();
    assert_eq!(value, Value::Bool(true));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
fn conditional_evaluates_one_branch() {
    let (parser, calls) = counting_parser("h", true);
    let mut vars = Variables::new();
    parser.evaluate("1 > 2 ? h() : 0", &mut vars).unwrap();
    parser.evaluate("case when false then h() else 1 end", &mut vars).unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    parser.evaluate("1 < 2 ? h() : h()", &mut vars).unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

// --- Security ---

#[test]
fn prototype_properties_are_rejected() {
    let shapes = [json!({"a": 1}), json!([1, 2]), json!("text"), json!(3), json!(null)];
    for shape in shapes {
        for p in ["__proto__", "prototype", "constructor"] {
            for source in [format!("x.{p}"), format!("x['{p}']")] {
                let mut vars = context(json!({ "x": shape.clone() }));
                let err = expra::evaluate(&source, &mut vars).unwrap_err();
                assert_eq!(err.kind(), ErrorKind::Access, "{source} on {shape}: {err}");
            }
        }
    }
}

#[test]
fn prototype_keys_rejected_at_parse_time() {
    let err = expra::parse("{__proto__: 1}").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Access);
    assert!(err.position().is_some());
}

#[test]
fn unregistered_function_values_are_not_callable() {
    let mut other = Parser::new();
    other.register_function("leak", |_: &[Value]| Ok(Value::from("secret")));
    let leaked = other.evaluate("leak", &mut Variables::new()).unwrap();

    let mut vars = Variables::new();
    vars.insert("leak".to_string(), leaked);
    let err = Parser::new().evaluate("leak()", &mut vars).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Function);
    assert_eq!(err.to_string(), "function error: 'leak' is not an allowed function");
}

// --- Operator gating ---

#[test]
fn add_gating() {
    let options = ParserOptions::from_json(r#"{"operators": {"add": false}}"#).unwrap();
    let err = Parser::with_options(options).parse("1+2").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Parse);
    assert!(err.to_string().starts_with("parse error [1:2]"), "{err}");
    assert!(err.message().contains('+'), "{err}");

    let options = ParserOptions::from_json(r#"{"operators": {"multiply": false}}"#).unwrap();
    let value = Parser::with_options(options).evaluate("1+2", &mut Variables::new()).unwrap();
    assert_eq!(value, Value::Number(3.0));
}

#[test]
fn member_access_gating() {
    let options = ParserOptions::from_json(r#"{"allowMemberAccess": false}"#).unwrap();
    let parser = Parser::with_options(options);
    assert_eq!(parser.parse("a.b").unwrap_err().kind(), ErrorKind::Access);
    assert_eq!(parser.parse("a[0]").unwrap_err().kind(), ErrorKind::Access);
    assert!(parser.parse("a + b").is_ok());
}

// --- Assignment ---

#[test]
fn assignment_mutates_context() {
    let mut ctx = Variables::new();
    assert_eq!(expra::evaluate("x = 3*2+1", &mut ctx).unwrap(), Value::Number(7.0));
    assert_eq!(ctx["x"], Value::Number(7.0));
    assert_eq!(expra::evaluate("y = x = x*2+1", &mut ctx).unwrap(), Value::Number(15.0));
    assert_eq!(ctx["x"], Value::Number(15.0));
    assert_eq!(ctx["y"], Value::Number(15.0));
}

#[test]
fn function_definitions_persist() {
    let mut ctx = Variables::new();
    expra::evaluate("sq(n) = n * n", &mut ctx).unwrap();
    assert!(matches!(ctx["sq"], Value::Function(_)));
    assert_eq!(expra::evaluate("sq(4) + sq(3)", &mut ctx).unwrap(), Value::Number(25.0));
    assert!(!ctx.contains_key("n"));
}

// --- Errors ---

#[test]
fn errors_report_position_and_source() {
    let err = expra::parse("1 +\n  * 2").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Parse);
    let pos = err.position().unwrap();
    assert_eq!((pos.line, pos.column), (2, 3));
    assert_eq!(err.expression(), Some("1 +\n  * 2"));

    let err = expra::parse("'open").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Lex);

    let err = expra::evaluate("nope + 1", &mut Variables::new()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Evaluation);
    assert_eq!(err.expression(), Some("nope + 1"));
}

#[test]
fn nesting_beyond_ceiling_fails_cleanly() {
    let deep = format!("{}1{}", "(".repeat(500), ")".repeat(500));
    let err = expra::parse(&deep).unwrap_err();
    assert!(err.message().contains("maximum depth"), "{err}");

    let mut ctx = Variables::new();
    let err = expra::evaluate("f(n) = f(n + 1); f(0)", &mut ctx).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Evaluation);
    assert!(err.message().contains("maximum depth"), "{err}");
}

// --- Robustness ---

proptest! {
    #[test]
    fn tokenizer_never_panics(s in "\\PC*") {
        let _ = expra::lexer::tokenize(&s);
    }

    #[test]
    fn parser_never_panics(s in "[-+*/%^!()\\[\\]{}.,;:?<>=|'\" a-z0-9_$]{0,40}") {
        let _ = expra::parse(&s);
    }

    #[test]
    fn evaluate_never_panics(s in "[-+*/%^!()\\[\\]{}.,;:?<>= a-c0-9]{0,24}") {
        let mut vars = Variables::new();
        let _ = expra::evaluate(&s, &mut vars);
    }
}
