use expra::{Parser, Value, Variables};
use proptest::prelude::*;
use serde_json::json;

fn context(json: serde_json::Value) -> Variables {
    match Value::from_json(&json) {
        Value::Object(map) => map.into_iter().collect(),
        other => panic!("context must be an object, got {other:?}"),
    }
}

// --- Symbols ---

#[test]
fn symbols_with_and_without_members() {
    let expr = expra::parse("a + b.c").unwrap();
    assert_eq!(expr.symbols(false), vec!["a", "b"]);
    assert_eq!(expr.symbols(true), vec!["a", "b.c"]);
}

#[test]
fn symbols_cover_every_branch() {
    let expr = expra::parse("x > 0 ? y.z : w or v; total = x").unwrap();
    assert_eq!(expr.symbols(true), vec!["x", "y.z", "w", "v", "total"]);
}

#[test]
fn variables_skip_registered_functions() {
    let mut parser = Parser::new();
    parser.register_function("max2", |args: &[Value]| {
        let a = args.first().map(Value::to_number).unwrap_or(f64::NAN);
        let b = args.get(1).map(Value::to_number).unwrap_or(f64::NAN);
        Ok(Value::Number(a.max(b)))
    });
    let expr = parser.parse("max2(a, b) * scale").unwrap();
    assert_eq!(expr.symbols(false), vec!["max2", "a", "b", "scale"]);
    assert_eq!(expr.variables(false), vec!["a", "b", "scale"]);
}

// --- Simplify ---

#[test]
fn simplify_specializes_for_known_values() {
    let expr = expra::parse("rate * hours + bonus").unwrap();
    let known = context(json!({ "rate": 20, "hours": 8 }));
    let specialized = expr.simplify(&known);
    assert_eq!(specialized.to_string(), "(160 + bonus)");
    assert_eq!(specialized.symbols(false), vec!["bonus"]);

    let mut vars = context(json!({ "bonus": 15 }));
    assert_eq!(specialized.evaluate(&mut vars).unwrap(), Value::Number(175.0));
}

#[test]
fn simplify_preserves_results() {
    let known = context(json!({ "o": { "k": [1, 2, 3] }, "n": 4 }));
    let sources = [
        "o.k[1] * n + m",
        "n > 3 ? m : -m",
        "(n ^ 2 || '') || m",
        "length o.k + n! / m",
        "case n when 4 then m else 0 end",
        "sq(n) = n * n; sq(m) + n",
    ];
    for source in sources {
        let expr = expra::parse(source).unwrap();
        let simplified = expr.simplify(&known);

        let mut full = known.clone();
        full.insert("m".to_string(), Value::Number(2.0));
        let expected = expr.evaluate(&mut full.clone()).unwrap();
        let actual = simplified.evaluate(&mut full).unwrap();
        assert_eq!(actual, expected, "{source} => {simplified}");
    }
}

#[test]
fn simplify_keeps_runtime_errors() {
    let expr = expra::parse("o.missing.deeper + 1").unwrap();
    let known = context(json!({ "o": {} }));
    let simplified = expr.simplify(&known);
    let err = simplified.evaluate(&mut Variables::new()).unwrap_err();
    assert!(err.message().contains("cannot read property 'deeper'"), "{err}");
}

// --- Substitute ---

#[test]
fn substitute_then_evaluate() {
    let parser = Parser::new();
    let area = parser.parse("w * h").unwrap();
    let doubled = parser.parse("2 * side").unwrap();
    let expr = area.substitute("w", &doubled).substitute("h", &doubled);
    assert_eq!(expr.to_string(), "((2 * side) * (2 * side))");
    assert_eq!(expr.symbols(false), vec!["side"]);

    let mut vars = context(json!({ "side": 3 }));
    assert_eq!(expr.evaluate(&mut vars).unwrap(), Value::Number(36.0));
    assert_eq!(area.to_string(), "(w * h)");
}

#[test]
fn substitute_inside_short_circuit() {
    let parser = Parser::new();
    let expr = parser.parse("ready and x > 1").unwrap();
    let with = parser.parse("limit - 1").unwrap();
    let expr = expr.substitute("x", &with);
    assert_eq!(expr.to_string(), "(ready and (((limit - 1) > 1)))");
    let mut vars = context(json!({ "ready": false }));
    // `limit` is never looked up
    assert_eq!(expr.evaluate(&mut vars).unwrap(), Value::Bool(false));
}

// --- Properties ---

fn fixed_values() -> Variables {
    context(json!({ "x": 2, "y": "s", "o": { "a": [1, 2] } }))
}

proptest! {
    #[test]
    fn simplify_is_idempotent(s in "[-+*/%^!()\\[\\].,?:<>= xyoaz0-9]{1,30}") {
        if let Ok(expr) = expra::parse(&s) {
            let values = fixed_values();
            let once = expr.simplify(&values);
            let twice = once.simplify(&values);
            // compare rendered forms, NaN literals are unequal to themselves
            prop_assert_eq!(once.to_string(), twice.to_string());
        }
    }

    #[test]
    fn symbols_never_panic(s in "[-+*/()\\[\\].,;= a-e0-9]{0,30}") {
        if let Ok(expr) = expra::parse(&s) {
            let _ = expr.symbols(true);
            let _ = expr.symbols(false);
        }
    }
}
