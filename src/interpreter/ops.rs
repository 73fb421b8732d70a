use std::f64::consts::PI;

use crate::error::{Error, Result};

use super::value::Value;

// ---- Operator tables ----

/// Named prefix operators. Each is also callable as `name(x)` and usable as a
/// function value.
pub const NAMED_UNARY_OPS: &[&str] = &[
    "sin", "cos", "tan", "asin", "acos", "atan", "sinh", "cosh", "tanh", "asinh", "acosh",
    "atanh", "sqrt", "cbrt", "log", "ln", "log2", "log10", "lg", "expm1", "log1p", "abs", "ceil",
    "floor", "round", "trunc", "exp", "sign", "length", "not",
];

/// Property names that are never readable or writable through an expression.
pub const UNSAFE_PROPERTIES: &[&str] = &["__proto__", "prototype", "constructor"];

pub fn named_unary(name: &str) -> Option<&'static str> {
    NAMED_UNARY_OPS.iter().copied().find(|op| *op == name)
}

pub fn is_unsafe_property(name: &str) -> bool {
    UNSAFE_PROPERTIES.contains(&name)
}

pub fn check_property(name: &str) -> Result<()> {
    if is_unsafe_property(name) {
        tracing::warn!(property = name, "rejected prototype-sensitive property");
        return Err(Error::access(format!("prototype access detected: '{name}'")));
    }
    Ok(())
}

// ---- Unary ----

pub fn apply_unary(op: &str, operand: &Value) -> Result<Value> {
    let x = || operand.to_number();
    let n = match op {
        "-" => -x(),
        "+" => x(),
        "!" => factorial(x()),
        "not" => return Ok(Value::Bool(!operand.is_truthy())),
        "length" => return Ok(Value::Number(length(operand))),
        "sin" => x().sin(),
        "cos" => x().cos(),
        "tan" => x().tan(),
        "asin" => x().asin(),
        "acos" => x().acos(),
        "atan" => x().atan(),
        "sinh" => x().sinh(),
        "cosh" => x().cosh(),
        "tanh" => x().tanh(),
        "asinh" => x().asinh(),
        "acosh" => x().acosh(),
        "atanh" => x().atanh(),
        "sqrt" => x().sqrt(),
        "cbrt" => x().cbrt(),
        "log" | "ln" => x().ln(),
        "log2" => x().log2(),
        "log10" | "lg" => x().log10(),
        "expm1" => x().exp_m1(),
        "log1p" => x().ln_1p(),
        "abs" => x().abs(),
        "ceil" => x().ceil(),
        "floor" => x().floor(),
        "round" => round(x()),
        "trunc" => x().trunc(),
        "exp" => x().exp(),
        "sign" => sign(x()),
        other => return Err(Error::evaluation(format!("unknown unary operator '{other}'"))),
    };
    Ok(Value::Number(n))
}

fn length(value: &Value) -> f64 {
    match value {
        Value::Array(items) => items.len() as f64,
        Value::String(s) => s.chars().count() as f64,
        other => other.to_string().chars().count() as f64,
    }
}

/// Half-way cases round towards positive infinity.
fn round(x: f64) -> f64 {
    let floor = x.floor();
    if x - floor >= 0.5 { floor + 1.0 } else { floor }
}

/// Zero and NaN map to themselves.
fn sign(x: f64) -> f64 {
    if x == 0.0 || x.is_nan() { x } else { x.signum() }
}

// ---- Binary ----

pub fn apply_binary(op: &str, left: &Value, right: &Value) -> Result<Value> {
    let value = match op {
        "+" => Value::Number(left.to_number() + right.to_number()),
        "-" => Value::Number(left.to_number() - right.to_number()),
        "*" => Value::Number(left.to_number() * right.to_number()),
        "/" => Value::Number(left.to_number() / right.to_number()),
        "%" => Value::Number(left.to_number() % right.to_number()),
        "^" => Value::Number(left.to_number().powf(right.to_number())),
        "==" => Value::Bool(left == right),
        "!=" => Value::Bool(left != right),
        "<" | "<=" | ">" | ">=" => Value::Bool(compare(op, left, right)),
        "||" => concat(left, right),
        "in" => Value::Bool(contains(right, left)),
        other => return Err(Error::evaluation(format!("unknown binary operator '{other}'"))),
    };
    Ok(value)
}

fn compare(op: &str, left: &Value, right: &Value) -> bool {
    let ordering = match (left, right) {
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => left.to_number().partial_cmp(&right.to_number()),
    };
    let Some(ordering) = ordering else {
        return false;
    };
    match op {
        "<" => ordering.is_lt(),
        "<=" => ordering.is_le(),
        ">" => ordering.is_gt(),
        _ => ordering.is_ge(),
    }
}

fn concat(left: &Value, right: &Value) -> Value {
    match (left, right) {
        (Value::Array(a), Value::Array(b)) => {
            Value::Array(a.iter().chain(b.iter()).cloned().collect())
        }
        _ => Value::String(format!("{left}{right}")),
    }
}

fn contains(haystack: &Value, needle: &Value) -> bool {
    match haystack {
        Value::Array(items) => items.contains(needle),
        Value::String(s) => s.contains(needle.to_string().as_str()),
        Value::Object(map) => map.contains_key(&needle.to_string()),
        _ => false,
    }
}

// ---- Member and index access ----

/// `target.name`
pub fn member(target: &Value, name: &str) -> Result<Value> {
    check_property(name)?;
    match target {
        Value::Object(map) => Ok(map.get(name).cloned().unwrap_or(Value::Undefined)),
        Value::Array(items) if name == "length" => Ok(Value::Number(items.len() as f64)),
        Value::String(s) if name == "length" => Ok(Value::Number(s.chars().count() as f64)),
        Value::Undefined | Value::Null => Err(Error::evaluation(format!(
            "cannot read property '{name}' of {}",
            target.type_name()
        ))),
        _ => Ok(Value::Undefined),
    }
}

/// `target[key]`
pub fn index(target: &Value, key: &Value) -> Result<Value> {
    if let Value::String(name) = key {
        check_property(name)?;
    }
    match (target, key) {
        (Value::Array(items), Value::Number(i)) => {
            Ok(array_index(*i, items.len())?.and_then(|i| items.get(i).cloned()).unwrap_or(Value::Undefined))
        }
        (Value::String(s), Value::Number(i)) => Ok(array_index(*i, usize::MAX)?
            .and_then(|i| s.chars().nth(i))
            .map(|c| Value::String(c.to_string()))
            .unwrap_or(Value::Undefined)),
        (Value::Undefined | Value::Null, _) => Err(Error::evaluation(format!(
            "cannot index {} with '{key}'",
            target.type_name()
        ))),
        (Value::Array(_) | Value::String(_), Value::String(name)) => member(target, name),
        (Value::Object(map), _) => {
            let name = key.to_string();
            check_property(&name)?;
            Ok(map.get(&name).cloned().unwrap_or(Value::Undefined))
        }
        _ => Ok(Value::Undefined),
    }
}

/// Validates an array index. Fractional indexes are errors, out of range ones are `None`.
fn array_index(i: f64, len: usize) -> Result<Option<usize>> {
    if i.fract() != 0.0 || i.is_nan() {
        return Err(Error::evaluation(format!("array index must be an integer, got {i}")));
    }
    if i < 0.0 || i >= len as f64 {
        return Ok(None);
    }
    Ok(Some(i as usize))
}

// ---- Gamma ----

const GAMMA_G: f64 = 4.7421875;

#[allow(clippy::excessive_precision)]
const GAMMA_P: [f64; 15] = [
    0.99999999999999709182,
    57.156235665862923517,
    -59.597960355475491248,
    14.136097974741747174,
    -0.49191381609762019978,
    0.33994649984811888699e-4,
    0.46523628927048575665e-4,
    -0.98374475304879564677e-4,
    0.15808870322491248884e-3,
    -0.21026444172410488319e-3,
    0.21743961811521264320e-3,
    -0.16431810653676389022e-3,
    0.84418223983852743293e-4,
    -0.26190838401581408670e-4,
    0.36899182659531622704e-5,
];

/// Gamma function: exact product for integers, Lanczos approximation
/// otherwise, Stirling series above 85.
pub fn gamma(n: f64) -> f64 {
    if n.fract() == 0.0 {
        if n <= 0.0 {
            return if n.is_finite() { f64::INFINITY } else { f64::NAN };
        }
        if n > 171.0 {
            return f64::INFINITY;
        }
        let mut value = n - 2.0;
        let mut res = n - 1.0;
        while value > 1.0 {
            res *= value;
            value -= 1.0;
        }
        return if res == 0.0 { 1.0 } else { res };
    }
    if n.is_nan() {
        return f64::NAN;
    }
    if n < 0.5 {
        return PI / ((PI * n).sin() * gamma(1.0 - n));
    }
    if n >= 171.35 {
        return f64::INFINITY;
    }
    if n > 85.0 {
        let two_n = n * n;
        let three_n = two_n * n;
        let four_n = three_n * n;
        let five_n = four_n * n;
        return (2.0 * PI / n).sqrt()
            * (n / std::f64::consts::E).powf(n)
            * (1.0 + 1.0 / (12.0 * n) + 1.0 / (288.0 * two_n)
                - 139.0 / (51840.0 * three_n)
                - 571.0 / (2488320.0 * four_n)
                + 163879.0 / (209018880.0 * five_n)
                + 5246819.0 / (75246796800.0 * five_n * n));
    }
    let n = n - 1.0;
    let mut x = GAMMA_P[0];
    for (i, p) in GAMMA_P.iter().enumerate().skip(1) {
        x += p / (n + i as f64);
    }
    let t = n + GAMMA_G + 0.5;
    (2.0 * PI).sqrt() * t.powf(n + 0.5) * (-t).exp() * x
}

pub fn factorial(n: f64) -> f64 {
    gamma(n + 1.0)
}
