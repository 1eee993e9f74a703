//! The builtin registry. It backs the outermost scope, so any user definition
//! with the same name and arity takes precedence.

use crate::runtime::{
    environment::Closure,
    error::RuntimeError,
    stream::{self, ValueStream},
    value::Value,
};

pub type NativeFn = for<'a> fn(Vec<Closure<'a>>, Value) -> ValueStream<'a>;

#[derive(Clone, Copy)]
pub struct Native {
    pub name: &'static str,
    pub arity: usize,
    pub run: NativeFn,
}

impl Native {
    const fn new(name: &'static str, arity: usize, run: NativeFn) -> Self {
        Self { name, arity, run }
    }
}

pub fn natives() -> Vec<Native> {
    vec![
        Native::new("empty", 0, empty),
        Native::new("error", 0, error0),
        Native::new("error", 1, error1),
        Native::new("not", 0, not),
        Native::new("length", 0, length),
        Native::new("type", 0, type_of),
        Native::new("keys", 0, keys),
        Native::new("add", 0, add),
        Native::new("tostring", 0, tostring),
        Native::new("first", 0, first0),
        Native::new("last", 0, last0),
        Native::new("first", 1, first1),
        Native::new("limit", 2, limit),
        Native::new("range", 1, range1),
        Native::new("range", 2, range2),
        Native::new("select", 1, select),
        Native::new("map", 1, map),
        Native::new("recurse", 0, recurse0),
    ]
}

macro_rules! unpack {
    ($name:literal, $args:expr, $n:literal) => {
        match <[Closure<'_>; $n]>::try_from($args) {
            Ok(args) => args,
            Err(args) => {
                return stream::fail(RuntimeError::ArityMismatch {
                    name: $name.to_string(),
                    expected: $n,
                    received: args.len(),
                })
            }
        }
    };
}

fn empty<'a>(_args: Vec<Closure<'a>>, _input: Value) -> ValueStream<'a> {
    stream::empty()
}

fn error0<'a>(_args: Vec<Closure<'a>>, input: Value) -> ValueStream<'a> {
    stream::fail(RuntimeError::User { value: input })
}

fn error1<'a>(args: Vec<Closure<'a>>, input: Value) -> ValueStream<'a> {
    let [message] = unpack!("error", args, 1);
    stream::pipe(message.run(input), |value| {
        stream::fail(RuntimeError::User { value })
    })
}

fn not<'a>(_args: Vec<Closure<'a>>, input: Value) -> ValueStream<'a> {
    stream::once(Value::Bool(!input.is_truthy()))
}

fn length<'a>(_args: Vec<Closure<'a>>, input: Value) -> ValueStream<'a> {
    stream::from_result(input.length())
}

fn type_of<'a>(_args: Vec<Closure<'a>>, input: Value) -> ValueStream<'a> {
    stream::once(Value::string(input.type_name()))
}

fn keys<'a>(_args: Vec<Closure<'a>>, input: Value) -> ValueStream<'a> {
    stream::from_result(input.keys())
}

fn add<'a>(_args: Vec<Closure<'a>>, input: Value) -> ValueStream<'a> {
    let sum = input
        .iterate()
        .and_then(|items| items.iter().try_fold(Value::Null, |acc, item| acc.add(item)));
    stream::from_result(sum)
}

fn tostring<'a>(_args: Vec<Closure<'a>>, input: Value) -> ValueStream<'a> {
    match input {
        Value::String(_) => stream::once(input),
        other => stream::once(Value::string(other.to_string())),
    }
}

fn first0<'a>(_args: Vec<Closure<'a>>, input: Value) -> ValueStream<'a> {
    stream::from_result(input.index(&Value::Number(0.0)))
}

fn last0<'a>(_args: Vec<Closure<'a>>, input: Value) -> ValueStream<'a> {
    stream::from_result(input.index(&Value::Number(-1.0)))
}

fn first1<'a>(args: Vec<Closure<'a>>, input: Value) -> ValueStream<'a> {
    let [f] = unpack!("first", args, 1);
    take(f.run(input), 1)
}

fn limit<'a>(args: Vec<Closure<'a>>, input: Value) -> ValueStream<'a> {
    let [count, f] = unpack!("limit", args, 2);
    stream::pipe(count.run(input.clone()), move |count| match count {
        Value::Number(n) if n > 0.0 => take(f.run(input.clone()), n.ceil() as usize),
        Value::Number(_) => stream::empty(),
        other => stream::fail(RuntimeError::type_mismatch(format!(
            "Invalid limit {}: must be a number",
            other.describe()
        ))),
    })
}

fn take<'a>(values: ValueStream<'a>, count: usize) -> ValueStream<'a> {
    Box::new(values.take(count))
}

fn range1<'a>(args: Vec<Closure<'a>>, input: Value) -> ValueStream<'a> {
    let [upto] = unpack!("range", args, 1);
    stream::pipe(upto.run(input), |upto| {
        counting(Value::Number(0.0), upto)
    })
}

fn range2<'a>(args: Vec<Closure<'a>>, input: Value) -> ValueStream<'a> {
    let [from, upto] = unpack!("range", args, 2);
    stream::pipe(from.run(input.clone()), move |from| {
        stream::pipe(upto.run(input.clone()), move |upto| {
            counting(from.clone(), upto)
        })
    })
}

fn counting<'a>(from: Value, upto: Value) -> ValueStream<'a> {
    match (from, upto) {
        (Value::Number(from), Value::Number(upto)) => Box::new(
            (0u64..)
                .map(move |step| from + step as f64)
                .take_while(move |n| *n < upto)
                .map(|n| Ok(Value::Number(n))),
        ),
        (from, upto) => stream::fail(RuntimeError::type_mismatch(format!(
            "Range bounds must be numbers, not {} and {}",
            from.type_name(),
            upto.type_name()
        ))),
    }
}

fn select<'a>(args: Vec<Closure<'a>>, input: Value) -> ValueStream<'a> {
    let [predicate] = unpack!("select", args, 1);
    stream::pipe(predicate.run(input.clone()), move |test| {
        if test.is_truthy() {
            stream::once(input.clone())
        } else {
            stream::empty()
        }
    })
}

fn map<'a>(args: Vec<Closure<'a>>, input: Value) -> ValueStream<'a> {
    let [f] = unpack!("map", args, 1);
    let mapped = input.iterate().and_then(|items| {
        let mut out = Vec::with_capacity(items.len());
        for item in items {
            for value in f.run(item) {
                out.push(value?);
            }
        }
        Ok(Value::array(out))
    });
    stream::from_result(mapped)
}

fn recurse0<'a>(_args: Vec<Closure<'a>>, input: Value) -> ValueStream<'a> {
    recurse(input)
}

/// Pre-order walk over `input` and every value nested inside it.
pub fn recurse<'a>(input: Value) -> ValueStream<'a> {
    let mut pending = vec![input];
    Box::new(std::iter::from_fn(move || {
        let value = pending.pop()?;
        if let Ok(children) = value.iterate() {
            pending.extend(children.into_iter().rev());
        }
        Some(Ok(value))
    }))
}
