use crate::language::ast::*;
use crate::runtime::{
    builtins,
    call,
    environment::{Context, Env},
    error::{RuntimeError, RuntimeResult},
    stream::{self, ValueStream},
    value::Value,
};
use log::debug;
use std::cell::Cell;
use std::collections::BTreeMap;
use std::iter;
use std::rc::Rc;

#[derive(Clone, Debug)]
pub struct Options {
    /// Upper bound on nested, non-tail function calls being pulled at once.
    pub max_depth: usize,
}

impl Default for Options {
    fn default() -> Self {
        Self { max_depth: 1024 }
    }
}

pub struct Interpreter {
    options: Options,
    globals: Vec<(String, Value)>,
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new(Options::default())
    }
}

impl Interpreter {
    pub fn new(options: Options) -> Self {
        Self {
            options,
            globals: Vec::new(),
        }
    }

    /// Binds `$name` in the outermost scope of every evaluation.
    pub fn with_var(mut self, name: impl Into<String>, value: Value) -> Self {
        self.globals.push((name.into(), value));
        self
    }

    pub fn evaluate<'a>(&'a self, program: &'a Program, input: Value) -> Outputs<'a> {
        let ctx = Rc::new(Context::new(builtins::natives(), self.options.clone()));
        let env = self
            .globals
            .iter()
            .fold(Env::root(ctx), |env, (name, value)| {
                env.bind_var(name, value.clone())
            });
        debug!(
            "evaluating program with {} top-level definitions",
            program.top_level_defs().len()
        );
        Outputs {
            inner: stream::terminating(eval(&program.body, env, input)),
        }
    }
}

/// The output stream of one evaluation. Ends after the first error.
pub struct Outputs<'a> {
    inner: ValueStream<'a>,
}

impl<'a> Iterator for Outputs<'a> {
    type Item = RuntimeResult<Value>;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }
}

pub(crate) fn eval<'a>(expr: &'a Expr, env: Env<'a>, input: Value) -> ValueStream<'a> {
    match &expr.kind {
        ExprKind::Identity => stream::once(input),
        ExprKind::Recurse => builtins::recurse(input),
        ExprKind::Literal(literal) => stream::once(literal_value(literal)),
        ExprKind::Variable(name) => stream::from_result(
            env.lookup_var(name)
                .ok_or_else(|| RuntimeError::UndefinedVariable { name: name.clone() }),
        ),
        ExprKind::Field { target, name } => stream::pipe(eval(target, env, input), move |value| {
            stream::from_result(value.field(name))
        }),
        ExprKind::Index { target, index } => {
            stream::pipe(eval(target, env.clone(), input.clone()), move |value| {
                stream::pipe(eval(index, env.clone(), input.clone()), move |key| {
                    stream::from_result(value.index(&key))
                })
            })
        }
        ExprKind::Slice { target, from, to } => {
            let (from, to) = (from.as_deref(), to.as_deref());
            stream::pipe(eval(target, env.clone(), input.clone()), move |value| {
                let (env, input) = (env.clone(), input.clone());
                stream::pipe(
                    eval_optional(from, env.clone(), input.clone()),
                    move |start| {
                        let value = value.clone();
                        stream::pipe(eval_optional(to, env.clone(), input.clone()), move |end| {
                            stream::from_result(value.slice(&start, &end))
                        })
                    },
                )
            })
        }
        ExprKind::Iterate(target) => {
            stream::pipe(eval(target, env, input), |value| match value.iterate() {
                Ok(items) => stream::from_values(items),
                Err(err) => stream::fail(err),
            })
        }
        ExprKind::Array(None) => stream::once(Value::array(Vec::new())),
        ExprKind::Array(Some(body)) => Box::new(iter::once_with(move || {
            eval(body, env, input)
                .collect::<RuntimeResult<Vec<_>>>()
                .map(Value::array)
        })),
        ExprKind::Object(entries) => build_object(entries, BTreeMap::new(), env, input),
        ExprKind::Neg(operand) => stream::pipe(eval(operand, env, input), |value| match value {
            Value::Number(n) => stream::once(Value::Number(-n)),
            other => stream::fail(RuntimeError::type_mismatch(format!(
                "{} cannot be negated",
                other.describe()
            ))),
        }),
        ExprKind::Binary { op, left, right } => {
            let op = *op;
            stream::pipe(eval(right, env.clone(), input.clone()), move |rhs| {
                stream::pipe(eval(left, env.clone(), input.clone()), move |lhs| {
                    stream::from_result(apply_binary(op, &lhs, &rhs))
                })
            })
        }
        ExprKind::And(left, right) => {
            stream::pipe(eval(left, env.clone(), input.clone()), move |lhs| {
                if !lhs.is_truthy() {
                    return stream::once(Value::Bool(false));
                }
                stream::pipe(eval(right, env.clone(), input.clone()), |rhs| {
                    stream::once(Value::Bool(rhs.is_truthy()))
                })
            })
        }
        ExprKind::Or(left, right) => {
            stream::pipe(eval(left, env.clone(), input.clone()), move |lhs| {
                if lhs.is_truthy() {
                    return stream::once(Value::Bool(true));
                }
                stream::pipe(eval(right, env.clone(), input.clone()), |rhs| {
                    stream::once(Value::Bool(rhs.is_truthy()))
                })
            })
        }
        ExprKind::Alternative(left, right) => eval_alternative(left, right, env, input),
        ExprKind::Comma(left, right) => {
            let first = eval(left, env.clone(), input.clone());
            stream::concat(first, move || eval(right, env, input))
        }
        ExprKind::Pipe(left, right) => {
            stream::pipe(eval(left, env.clone(), input), move |value| {
                eval(right, env.clone(), value)
            })
        }
        ExprKind::Bind { source, name, body } => {
            stream::pipe(eval(source, env.clone(), input.clone()), move |value| {
                eval(body, env.bind_var(name, value), input.clone())
            })
        }
        ExprKind::Reduce {
            source,
            name,
            init,
            update,
        } => stream::pipe(eval(init, env.clone(), input.clone()), move |acc| {
            stream::from_result(reduce(source, name, update, &env, &input, acc))
        }),
        ExprKind::If {
            branches,
            otherwise,
        } => eval_if(branches, otherwise.as_deref(), env, input),
        ExprKind::Defs { defs, rest } => {
            let env = defs.iter().fold(env, |env, def| env.define(def));
            eval(rest, env, input)
        }
        ExprKind::Call { name, args } => call::invoke(name, args, &env, input),
    }
}

fn literal_value(literal: &Literal) -> Value {
    match literal {
        Literal::Null => Value::Null,
        Literal::Bool(b) => Value::Bool(*b),
        Literal::Number(n) => Value::Number(*n),
        Literal::String(text) => Value::string(text),
    }
}

fn eval_optional<'a>(expr: Option<&'a Expr>, env: Env<'a>, input: Value) -> ValueStream<'a> {
    match expr {
        Some(expr) => eval(expr, env, input),
        None => stream::once(Value::Null),
    }
}

pub(crate) fn apply_binary(op: BinaryOp, lhs: &Value, rhs: &Value) -> RuntimeResult<Value> {
    match op {
        BinaryOp::Add => lhs.add(rhs),
        BinaryOp::Sub => lhs.sub(rhs),
        BinaryOp::Mul => lhs.mul(rhs),
        BinaryOp::Div => lhs.div(rhs),
        BinaryOp::Rem => lhs.rem(rhs),
        BinaryOp::Eq => Ok(Value::Bool(lhs == rhs)),
        BinaryOp::Ne => Ok(Value::Bool(lhs != rhs)),
        BinaryOp::Lt => Ok(Value::Bool(lhs < rhs)),
        BinaryOp::Le => Ok(Value::Bool(lhs <= rhs)),
        BinaryOp::Gt => Ok(Value::Bool(lhs > rhs)),
        BinaryOp::Ge => Ok(Value::Bool(lhs >= rhs)),
    }
}

/// `left // right`: the truthy outputs of `left`, or `right` when there are none.
/// An error in `left` ends it quietly.
fn eval_alternative<'a>(
    left: &'a Expr,
    right: &'a Expr,
    env: Env<'a>,
    input: Value,
) -> ValueStream<'a> {
    let produced = Rc::new(Cell::new(false));
    let seen = produced.clone();
    let truthy = eval(left, env.clone(), input.clone())
        .map_while(Result::ok)
        .filter(Value::is_truthy)
        .inspect(move |_| seen.set(true))
        .map(Ok);
    let fallback = iter::once_with(move || {
        if produced.get() {
            stream::empty()
        } else {
            eval(right, env, input)
        }
    })
    .flatten();
    stream::terminating(Box::new(truthy.chain(fallback)))
}

fn eval_if<'a>(
    branches: &'a [(Expr, Expr)],
    otherwise: Option<&'a Expr>,
    env: Env<'a>,
    input: Value,
) -> ValueStream<'a> {
    let Some(((cond, then), rest)) = branches.split_first() else {
        return match otherwise {
            Some(expr) => eval(expr, env, input),
            None => stream::once(input),
        };
    };
    stream::pipe(eval(cond, env.clone(), input.clone()), move |test| {
        if test.is_truthy() {
            eval(then, env.clone(), input.clone())
        } else {
            eval_if(rest, otherwise, env.clone(), input.clone())
        }
    })
}

fn reduce<'a>(
    source: &'a Expr,
    name: &'a str,
    update: &'a Expr,
    env: &Env<'a>,
    input: &Value,
    init: Value,
) -> RuntimeResult<Value> {
    let mut acc = init;
    for item in eval(source, env.clone(), input.clone()) {
        let scoped = env.bind_var(name, item?);
        let mut last = None;
        for next in eval(update, scoped, acc) {
            last = Some(next?);
        }
        acc = last.unwrap_or(Value::Null);
    }
    Ok(acc)
}

fn build_object<'a>(
    entries: &'a [ObjectEntry],
    built: BTreeMap<String, Value>,
    env: Env<'a>,
    input: Value,
) -> ValueStream<'a> {
    let Some((entry, rest)) = entries.split_first() else {
        return stream::once(Value::object(built));
    };
    let keys: ValueStream<'a> = match &entry.key {
        ObjectKey::Name(name) | ObjectKey::Variable(name) => stream::once(Value::string(name)),
        ObjectKey::Computed(expr) => eval(expr, env.clone(), input.clone()),
    };
    stream::pipe(keys, move |key| {
        let key = match key {
            Value::String(key) => key,
            other => {
                return stream::fail(RuntimeError::type_mismatch(format!(
                    "Object keys must be strings, not {}",
                    other.describe()
                )))
            }
        };
        let values = match (&entry.value, &entry.key) {
            (Some(expr), _) => eval(expr, env.clone(), input.clone()),
            (None, ObjectKey::Variable(name)) => stream::from_result(
                env.lookup_var(name)
                    .ok_or_else(|| RuntimeError::UndefinedVariable { name: name.clone() }),
            ),
            (None, _) => stream::from_result(input.field(&key)),
        };
        let (built, env, input) = (built.clone(), env.clone(), input.clone());
        stream::pipe(values, move |value| {
            let mut next = built.clone();
            next.insert(key.to_string(), value);
            build_object(rest, next, env.clone(), input.clone())
        })
    })
}
