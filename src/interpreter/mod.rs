use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::ir::Instruction;
use crate::parser::ParserOptions;
use crate::{STACK_GROW_SIZE, STACK_RED_ZONE};

pub mod functions;
pub mod ops;
pub mod value;

pub use functions::{Closure, Function, FunctionId, FunctionRegistry, NativeFn, NativeFunction};
pub use value::{Value, format_number};

/// Caller-owned evaluation context. Assignments and function definitions write into it.
pub type Variables = HashMap<String, Value>;

/// Entry on the operand stack.
enum Operand<'p> {
    Value(Value),
    /// Unevaluated sub-program.
    Lazy(&'p [Instruction]),
    /// Assignment or parameter target.
    Name(&'p str),
    ObjectStart,
    Key(&'p str),
}

/// Names visible to running code: the locals of the closure being called,
/// layered over the live caller-owned context.
struct Scope<'v> {
    root: &'v mut Variables,
    locals: Option<Variables>,
}

impl Scope<'_> {
    fn get(&self, name: &str) -> Option<&Value> {
        self.locals
            .as_ref()
            .and_then(|locals| locals.get(name))
            .or_else(|| self.root.get(name))
    }

    fn set(&mut self, name: &str, value: Value) {
        match &mut self.locals {
            Some(locals) => locals.insert(name.to_string(), value),
            None => self.root.insert(name.to_string(), value),
        };
    }

    /// Writable slot for `name`. Inside a closure, a value inherited from the
    /// caller-owned context is copied into the locals first.
    fn slot(&mut self, name: &str) -> &mut Value {
        let Scope { root, locals } = self;
        match locals {
            Some(locals) => locals
                .entry(name.to_string())
                .or_insert_with(|| root.get(name).cloned().unwrap_or(Value::Undefined)),
            None => root.entry(name.to_string()).or_insert(Value::Undefined),
        }
    }
}

fn underflow() -> Error {
    Error::evaluation("invalid expression: stack underflow")
}

fn parity() -> Error {
    Error::evaluation("invalid expression: stack parity")
}

fn pop<'p>(stack: &mut Vec<Operand<'p>>) -> Result<Operand<'p>> {
    stack.pop().ok_or_else(underflow)
}

/// Evaluate `instructions` against `vars` under `options`. Calls are limited to
/// the named unary operators, closures defined by the expression, and
/// functions registered in `functions`.
pub fn evaluate(
    instructions: &[Instruction],
    options: &ParserOptions,
    functions: &FunctionRegistry,
    vars: &mut Variables,
) -> Result<Value> {
    let mut scope = Scope { root: vars, locals: None };
    Evaluator { options, functions, depth: 0 }.run(instructions, &mut scope)
}

struct Evaluator<'a> {
    options: &'a ParserOptions,
    functions: &'a FunctionRegistry,
    depth: usize,
}

impl Evaluator<'_> {
    fn run(&mut self, instructions: &[Instruction], scope: &mut Scope<'_>) -> Result<Value> {
        if self.depth >= self.options.max_depth {
            tracing::debug!(depth = self.depth, "evaluation depth limit reached");
            return Err(Error::evaluation(format!(
                "expression nesting exceeds maximum depth of {}",
                self.options.max_depth
            )));
        }
        self.depth += 1;
        let result =
            stacker::maybe_grow(STACK_RED_ZONE, STACK_GROW_SIZE, || self.execute(instructions, scope));
        self.depth -= 1;
        result
    }

    fn execute<'p>(&mut self, instructions: &'p [Instruction], scope: &mut Scope<'_>) -> Result<Value> {
        let mut stack: Vec<Operand<'p>> = Vec::new();

        for ins in instructions {
            match ins {
                Instruction::Literal(value) => stack.push(Operand::Value(value.clone())),
                Instruction::Undefined => stack.push(Operand::Value(Value::Undefined)),
                Instruction::Var(name) => stack.push(Operand::Value(self.lookup(name, scope)?)),
                Instruction::VarName(name) => stack.push(Operand::Name(name)),
                Instruction::Expr(body) => stack.push(Operand::Lazy(body)),

                Instruction::Unary(op) => {
                    let operand = pop(&mut stack)?;
                    let x = self.resolve(operand, scope)?;
                    stack.push(Operand::Value(ops::apply_unary(op, &x)?));
                }

                Instruction::Binary(op) => {
                    let right = pop(&mut stack)?;
                    let left = pop(&mut stack)?;
                    let value = self.binary(op, left, right, scope)?;
                    stack.push(Operand::Value(value));
                }

                Instruction::Ternary(op) => {
                    let otherwise = pop(&mut stack)?;
                    let then = pop(&mut stack)?;
                    let cond = pop(&mut stack)?;
                    if op != "?" {
                        return Err(Error::evaluation(format!("unknown ternary operator '{op}'")));
                    }
                    let chosen = if self.resolve(cond, scope)?.is_truthy() { then } else { otherwise };
                    let value = self.resolve(chosen, scope)?;
                    stack.push(Operand::Value(value));
                }

                Instruction::Call(argc) => {
                    let mut args = Vec::with_capacity(*argc);
                    for _ in 0..*argc {
                        args.push(pop(&mut stack)?);
                    }
                    let callee = pop(&mut stack)?;
                    let callee = self.resolve(callee, scope)?;
                    let mut values = Vec::with_capacity(args.len());
                    for arg in args.into_iter().rev() {
                        values.push(self.resolve(arg, scope)?);
                    }
                    let value = self.call(&callee, &values, scope)?;
                    stack.push(Operand::Value(value));
                }

                Instruction::FunctionDef(paramc) => {
                    let value = self.define_function(&mut stack, *paramc, scope)?;
                    stack.push(Operand::Value(value));
                }

                Instruction::Member(name) => {
                    if !self.options.allow_member_access {
                        return Err(Error::access("member access is not permitted"));
                    }
                    let target = pop(&mut stack)?;
                    let target = self.resolve(target, scope)?;
                    stack.push(Operand::Value(ops::member(&target, name)?));
                }

                Instruction::Array(len) => {
                    let mut items = Vec::with_capacity(*len);
                    for _ in 0..*len {
                        items.push(pop(&mut stack)?);
                    }
                    let mut values = Vec::with_capacity(items.len());
                    for item in items.into_iter().rev() {
                        values.push(self.resolve(item, scope)?);
                    }
                    stack.push(Operand::Value(Value::Array(values)));
                }

                Instruction::ObjectStart => stack.push(Operand::ObjectStart),
                Instruction::Property(key) => stack.push(Operand::Key(key)),
                Instruction::ObjectEnd => {
                    let value = self.build_object(&mut stack, scope)?;
                    stack.push(Operand::Value(value));
                }

                Instruction::CaseCondition { arms, has_else } => {
                    let value = self.case(&mut stack, *arms, *has_else, false, scope)?;
                    stack.push(Operand::Value(value));
                }
                Instruction::CaseMatch { arms, has_else } => {
                    let value = self.case(&mut stack, *arms, *has_else, true, scope)?;
                    stack.push(Operand::Value(value));
                }

                Instruction::EndStatement => {
                    // force the finished statement for its side effects, then drop it
                    let finished = pop(&mut stack)?;
                    self.resolve(finished, scope)?;
                }
            }
        }

        if stack.len() > 1 {
            return Err(parity());
        }
        match stack.pop() {
            Some(operand) => self.resolve(operand, scope),
            None => Ok(Value::Undefined),
        }
    }

    /// Turn an operand into a value, evaluating a pending sub-program.
    fn resolve(&mut self, operand: Operand<'_>, scope: &mut Scope<'_>) -> Result<Value> {
        match operand {
            Operand::Value(value) => Ok(value),
            Operand::Lazy(body) => self.run(body, scope),
            Operand::Name(name) => Ok(Value::String(name.to_string())),
            Operand::ObjectStart | Operand::Key(_) => Err(parity()),
        }
    }

    fn lookup(&self, name: &str, scope: &Scope<'_>) -> Result<Value> {
        ops::check_property(name)?;
        if let Some(native) = self.functions.get(name) {
            return Ok(Value::Function(Function::Native(native.clone())));
        }
        if self.options.is_prefix_op(name) {
            if let Some(op) = ops::named_unary(name) {
                return Ok(Value::Function(Function::Builtin(op)));
            }
        }
        scope
            .get(name)
            .cloned()
            .ok_or_else(|| Error::evaluation(format!("undefined variable: {name}")))
    }

    fn binary(
        &mut self,
        op: &str,
        left: Operand<'_>,
        right: Operand<'_>,
        scope: &mut Scope<'_>,
    ) -> Result<Value> {
        match op {
            "and" => {
                let left = self.resolve(left, scope)?;
                Ok(Value::Bool(left.is_truthy() && self.resolve(right, scope)?.is_truthy()))
            }
            "or" => {
                let left = self.resolve(left, scope)?;
                Ok(Value::Bool(left.is_truthy() || self.resolve(right, scope)?.is_truthy()))
            }
            "=" => {
                let Operand::Name(target) = left else {
                    return Err(Error::evaluation("expected variable for assignment"));
                };
                let value = self.resolve(right, scope)?;
                self.assign(target, value.clone(), scope)?;
                Ok(value)
            }
            "[" => {
                if !self.options.allow_member_access {
                    return Err(Error::access("member access is not permitted"));
                }
                let target = self.resolve(left, scope)?;
                let key = self.resolve(right, scope)?;
                ops::index(&target, &key)
            }
            _ => {
                let left = self.resolve(left, scope)?;
                let right = self.resolve(right, scope)?;
                ops::apply_binary(op, &left, &right)
            }
        }
    }

    /// Write `value` at `path` (`x` or `x.a.b`), creating intermediate objects.
    fn assign(&self, path: &str, value: Value, scope: &mut Scope<'_>) -> Result<()> {
        let segments: Vec<&str> = path.split('.').collect();
        for segment in &segments {
            ops::check_property(segment)?;
        }
        let Some((root, rest)) = segments.split_first() else {
            return Err(Error::evaluation("expected variable for assignment"));
        };
        if rest.is_empty() {
            scope.set(root, value);
            return Ok(());
        }
        if !self.options.allow_member_access {
            return Err(Error::access("member access is not permitted"));
        }
        set_path(scope.slot(root), rest, value)
    }

    fn call(&mut self, callee: &Value, args: &[Value], scope: &mut Scope<'_>) -> Result<Value> {
        let Value::Function(function) = callee else {
            return Err(Error::function(format!("{} is not a function", callee.type_name())));
        };
        match function {
            Function::Builtin(op) => {
                ops::apply_unary(op, args.first().unwrap_or(&Value::Undefined))
            }
            Function::Native(native) => {
                if !self.functions.contains_id(native.id()) {
                    tracing::warn!(function = native.name(), "rejected call to unregistered function");
                    return Err(Error::function(format!(
                        "'{}' is not an allowed function",
                        native.name()
                    )));
                }
                native.call(args)
            }
            Function::Closure(closure) => self.call_closure(closure, args, scope),
        }
    }

    /// Parameters are bound in fresh locals over the defining context: the
    /// live caller-owned map, plus the enclosing body's locals for nested
    /// definitions. Callers' parameters are never visible.
    fn call_closure(
        &mut self,
        closure: &Arc<Closure>,
        args: &[Value],
        scope: &mut Scope<'_>,
    ) -> Result<Value> {
        tracing::trace!(function = %closure.name, args = args.len(), "calling closure");
        let mut locals = Variables::new();
        if let Some(captured) = &closure.captured {
            locals.clone_from(captured);
            // a nested definition can call itself
            locals
                .entry(closure.name.clone())
                .or_insert_with(|| Value::Function(Function::Closure(Arc::clone(closure))));
        }
        for (i, param) in closure.params.iter().enumerate() {
            locals.insert(param.clone(), args.get(i).cloned().unwrap_or(Value::Undefined));
        }
        let mut inner = Scope { root: &mut *scope.root, locals: Some(locals) };
        self.run(&closure.body, &mut inner)
    }

    fn define_function(
        &mut self,
        stack: &mut Vec<Operand<'_>>,
        paramc: usize,
        scope: &mut Scope<'_>,
    ) -> Result<Value> {
        let Operand::Lazy(body) = pop(stack)? else {
            return Err(parity());
        };
        let mut params = Vec::with_capacity(paramc);
        for _ in 0..paramc {
            match pop(stack)? {
                Operand::Name(param) => params.push(param.to_string()),
                _ => return Err(parity()),
            }
        }
        params.reverse();
        let Operand::Name(name) = pop(stack)? else {
            return Err(parity());
        };
        ops::check_property(name)?;
        tracing::debug!(function = name, params = params.len(), "defined function");
        let closure = Closure {
            name: name.to_string(),
            params,
            body: body.to_vec(),
            captured: scope.locals.clone().map(Arc::new),
        };
        let value = Value::Function(Function::Closure(Arc::new(closure)));
        scope.set(name, value.clone());
        Ok(value)
    }

    fn build_object(&mut self, stack: &mut Vec<Operand<'_>>, scope: &mut Scope<'_>) -> Result<Value> {
        let mut popped = Vec::new();
        loop {
            match pop(stack)? {
                Operand::ObjectStart => break,
                operand => popped.push(operand),
            }
        }
        popped.reverse();
        let mut map = BTreeMap::new();
        let mut entries = popped.into_iter();
        while let Some(key) = entries.next() {
            let Operand::Key(key) = key else {
                return Err(parity());
            };
            let value = entries.next().ok_or_else(parity)?;
            let value = self.resolve(value, scope)?;
            map.insert(key.to_string(), value);
        }
        Ok(Value::Object(map))
    }

    /// Arms are tested in order; only the matching result (or `else`) is evaluated.
    fn case(
        &mut self,
        stack: &mut Vec<Operand<'_>>,
        arms: usize,
        has_else: bool,
        with_subject: bool,
        scope: &mut Scope<'_>,
    ) -> Result<Value> {
        let otherwise = if has_else { Some(pop(stack)?) } else { None };
        let mut pairs = Vec::with_capacity(arms * 2);
        for _ in 0..arms * 2 {
            pairs.push(pop(stack)?);
        }
        pairs.reverse();
        let subject = if with_subject {
            let subject = pop(stack)?;
            Some(self.resolve(subject, scope)?)
        } else {
            None
        };

        let mut pairs = pairs.into_iter();
        while let (Some(condition), Some(result)) = (pairs.next(), pairs.next()) {
            let condition = self.resolve(condition, scope)?;
            let matched = match &subject {
                Some(subject) => condition == *subject,
                None => condition.is_truthy(),
            };
            if matched {
                return self.resolve(result, scope);
            }
        }
        match otherwise {
            Some(otherwise) => self.resolve(otherwise, scope),
            None => Ok(Value::Undefined),
        }
    }
}

fn set_path(target: &mut Value, path: &[&str], value: Value) -> Result<()> {
    let Some((first, rest)) = path.split_first() else {
        *target = value;
        return Ok(());
    };
    if matches!(target, Value::Undefined | Value::Null) {
        *target = Value::Object(BTreeMap::new());
    }
    match target {
        Value::Object(map) => {
            let slot = map.entry(first.to_string()).or_insert(Value::Undefined);
            set_path(slot, rest, value)
        }
        other => Err(Error::evaluation(format!(
            "cannot set property '{first}' on {}",
            other.type_name()
        ))),
    }
}
