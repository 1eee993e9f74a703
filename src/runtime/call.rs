//! Call sites: resolution by (name, arity) and the evaluation of a call.

use crate::language::ast::Expr;
use crate::runtime::{
    environment::{Callable, Closure, Context, Definition, DepthGuard, Env},
    error::RuntimeError,
    interpreter::eval,
    stream::{self, Stream, ValueStream},
    tail,
    value::Value,
};
use std::rc::Rc;

pub(crate) fn invoke<'a>(
    name: &'a str,
    args: &'a [Expr],
    env: &Env<'a>,
    input: Value,
) -> ValueStream<'a> {
    match env.resolve(name, args.len()) {
        Some(Callable::Def(def)) => call(def, args, env, input),
        Some(Callable::Filter(closure)) => stream::growing(closure.run(input)),
        Some(Callable::Native(native)) => {
            let args = args
                .iter()
                .map(|arg| Closure::new(arg, env.clone()))
                .collect();
            (native.run)(args, input)
        }
        None => stream::fail(RuntimeError::UndefinedFunction {
            name: name.to_string(),
            arity: args.len(),
        }),
    }
}

/// Evaluates `def` applied to `args` at a call site whose scope is `caller`.
///
/// Every argument becomes a closure over `caller`. Materialized (`$name`)
/// parameters are additionally evaluated against `input`; the body then runs
/// once per combination of their values, the first parameter varying slowest.
pub fn call<'a>(
    def: Rc<Definition<'a>>,
    args: &'a [Expr],
    caller: &Env<'a>,
    input: Value,
) -> ValueStream<'a> {
    if args.len() != def.arity() {
        return stream::fail(RuntimeError::ArityMismatch {
            name: def.name.to_string(),
            expected: def.arity(),
            received: args.len(),
        });
    }

    let mut callee = def.env.define_rc(def.clone());
    let mut materialized = Vec::new();
    for (param, arg) in def.params.iter().zip(args) {
        let closure = Closure::new(arg, caller.clone());
        callee = callee.bind_filter(&param.name, closure.clone());
        if param.materialize {
            materialized.push((param.name.as_str(), closure));
        }
    }

    let frames = bind_materialized(Rc::new(materialized), 0, callee, input.clone());
    let ctx = caller.context().clone();
    let body = stream::pipe(frames, move |frame| {
        if def.tail_recursive {
            tail::run(def.clone(), frame, input.clone())
        } else {
            eval(def.body, frame, input.clone())
        }
    });
    guarded(ctx, body)
}

fn bind_materialized<'a>(
    pending: Rc<Vec<(&'a str, Closure<'a>)>>,
    idx: usize,
    env: Env<'a>,
    input: Value,
) -> Stream<'a, Env<'a>> {
    let Some((name, closure)) = pending.get(idx).cloned() else {
        return stream::once(env);
    };
    stream::pipe(closure.run(input.clone()), move |value| {
        bind_materialized(
            pending.clone(),
            idx + 1,
            env.bind_var(name, value),
            input.clone(),
        )
    })
}

/// Counts the call as active while its stream is being pulled.
fn guarded<'a>(ctx: Rc<Context>, inner: ValueStream<'a>) -> ValueStream<'a> {
    stream::terminating(stream::growing(Box::new(Guarded { ctx, inner })))
}

struct Guarded<'a> {
    ctx: Rc<Context>,
    inner: ValueStream<'a>,
}

impl<'a> Iterator for Guarded<'a> {
    type Item = <ValueStream<'a> as Iterator>::Item;

    fn next(&mut self) -> Option<Self::Item> {
        match DepthGuard::enter(&self.ctx) {
            Ok(_guard) => self.inner.next(),
            Err(err) => Some(Err(err)),
        }
    }
}
