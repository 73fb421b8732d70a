use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::Result;
use crate::ir::Instruction;

use super::Variables;
use super::value::Value;

/// Host callable signature.
pub type NativeFn = dyn Fn(&[Value]) -> Result<Value> + Send + Sync;

/// Registration handle. Calls are only permitted for ids present in the
/// registry the expression was parsed with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FunctionId(u64);

static NEXT_FUNCTION_ID: AtomicU64 = AtomicU64::new(1);

impl FunctionId {
    fn next() -> Self {
        FunctionId(NEXT_FUNCTION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

#[derive(Clone)]
pub struct NativeFunction {
    id: FunctionId,
    name: String,
    func: Arc<NativeFn>,
}

impl NativeFunction {
    pub fn id(&self) -> FunctionId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn call(&self, args: &[Value]) -> Result<Value> {
        (self.func)(args)
    }
}

/// A function defined inside an expression with `f(x) = body`.
#[derive(Debug)]
pub struct Closure {
    pub name: String,
    pub params: Vec<String>,
    pub body: Vec<Instruction>,
    /// Locals of the enclosing function body, when defined inside one.
    /// Top-level definitions read the live caller-owned context instead.
    pub captured: Option<Arc<Variables>>,
}

#[derive(Clone)]
pub enum Function {
    /// One of the named unary operators used as a value, e.g. `f = sqrt`.
    Builtin(&'static str),
    Native(NativeFunction),
    Closure(Arc<Closure>),
}

impl Function {
    pub fn name(&self) -> &str {
        match self {
            Function::Builtin(name) => name,
            Function::Native(native) => native.name(),
            Function::Closure(closure) => &closure.name,
        }
    }
}

impl PartialEq for Function {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Function::Builtin(a), Function::Builtin(b)) => a == b,
            (Function::Native(a), Function::Native(b)) => a.id == b.id,
            (Function::Closure(a), Function::Closure(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Function::Builtin(name) => write!(f, "Builtin({name})"),
            Function::Native(native) => write!(f, "Native({}#{})", native.name, native.id.0),
            Function::Closure(closure) => {
                write!(f, "Closure({}({}))", closure.name, closure.params.join(", "))
            }
        }
    }
}

/// Name to callable table consulted by call instructions.
#[derive(Clone, Default)]
pub struct FunctionRegistry {
    functions: BTreeMap<String, NativeFunction>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `func` under `name`, replacing any previous entry. The returned
    /// id is what the sandbox check compares against.
    pub fn register<F>(&mut self, name: impl Into<String>, func: F) -> FunctionId
    where
        F: Fn(&[Value]) -> Result<Value> + Send + Sync + 'static,
    {
        let name = name.into();
        let id = FunctionId::next();
        tracing::debug!(function = %name, id = id.0, "registered function");
        self.functions.insert(
            name.clone(),
            NativeFunction { id, name, func: Arc::new(func) },
        );
        id
    }

    pub fn remove(&mut self, name: &str) -> Option<NativeFunction> {
        self.functions.remove(name)
    }

    pub fn get(&self, name: &str) -> Option<&NativeFunction> {
        self.functions.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    pub fn contains_id(&self, id: FunctionId) -> bool {
        self.functions.values().any(|f| f.id == id)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.functions.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

impl fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.functions.keys()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_and_call() {
        let mut registry = FunctionRegistry::new();
        let id = registry.register("double", |args: &[Value]| {
            Ok(Value::Number(args.first().map(Value::to_number).unwrap_or(f64::NAN) * 2.0))
        });
        assert!(registry.contains("double"));
        assert!(registry.contains_id(id));
        let f = registry.get("double").unwrap();
        assert_eq!(f.call(&[Value::Number(4.0)]).unwrap(), Value::Number(8.0));
    }

    #[test]
    fn reregistering_issues_new_id() {
        let mut registry = FunctionRegistry::new();
        let first = registry.register("f", |_: &[Value]| Ok(Value::Null));
        let second = registry.register("f", |_: &[Value]| Ok(Value::Null));
        assert_ne!(first, second);
        assert!(!registry.contains_id(first));
        assert!(registry.contains_id(second));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn function_identity() {
        let mut registry = FunctionRegistry::new();
        registry.register("f", |_: &[Value]| Ok(Value::Null));
        let a = Function::Native(registry.get("f").unwrap().clone());
        let b = Function::Native(registry.get("f").unwrap().clone());
        assert_eq!(a, b);
        assert_ne!(a, Function::Builtin("sin"));
        let body = Arc::new(Closure { name: "g".into(), params: vec![], body: vec![], captured: None });
        assert_eq!(Function::Closure(body.clone()), Function::Closure(body));
        assert_eq!(format!("{:?}", Function::Builtin("sqrt")), "Builtin(sqrt)");
    }
}
