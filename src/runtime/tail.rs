//! Tail-call elimination for zero-arity self recursion.
//!
//! A body is evaluated in "tail mode": wherever a tail position holds a direct
//! call to the function being run, the evaluation produces `Step::Recur(input)`
//! instead of calling it. The trampoline then evaluates the body again with
//! that input, so the recursion never nests iterators or native frames.

use crate::language::ast::{Expr, ExprKind, FunctionDef};
use crate::runtime::{
    environment::{Callable, Definition, Env},
    interpreter::eval,
    stream::{self, Stream, ValueStream},
    value::Value,
};
use log::trace;
use std::rc::Rc;

/// Whether `def` takes no arguments and calls itself from a tail position.
pub fn is_tail_recursive(def: &FunctionDef) -> bool {
    def.params.is_empty() && has_tail_self_call(&def.body, &def.name)
}

fn has_tail_self_call(expr: &Expr, name: &str) -> bool {
    match &expr.kind {
        ExprKind::Call { name: callee, args } => args.is_empty() && callee == name,
        ExprKind::Pipe(_, right) => has_tail_self_call(right, name),
        ExprKind::Bind { body, .. } => has_tail_self_call(body, name),
        ExprKind::If {
            branches,
            otherwise,
        } => {
            branches
                .iter()
                .any(|(_, then)| has_tail_self_call(then, name))
                || otherwise
                    .as_deref()
                    .is_some_and(|expr| has_tail_self_call(expr, name))
        }
        ExprKind::Defs { defs, rest } => {
            let shadowed = defs.iter().any(|def| def.name == name && def.params.is_empty());
            !shadowed && has_tail_self_call(rest, name)
        }
        _ => false,
    }
}

enum Step {
    Emit(Value),
    Recur(Value),
}

/// Runs the body of `def` under `env` with `.` bound to `input`, looping on
/// tail self-calls.
pub fn run<'a>(def: Rc<Definition<'a>>, env: Env<'a>, input: Value) -> ValueStream<'a> {
    trace!("entering tail loop for {}/0", def.name);
    let first = eval_tail(def.body, env.clone(), input, &def);
    Box::new(Trampoline {
        def,
        env,
        frames: vec![first],
    })
}

struct Trampoline<'a> {
    def: Rc<Definition<'a>>,
    env: Env<'a>,
    frames: Vec<Stream<'a, Step>>,
}

impl<'a> Iterator for Trampoline<'a> {
    type Item = <ValueStream<'a> as Iterator>::Item;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let frame = self.frames.last_mut()?;
            match frame.next() {
                None => {
                    self.frames.pop();
                }
                Some(Err(err)) => {
                    self.frames.clear();
                    return Some(Err(err));
                }
                Some(Ok(Step::Emit(value))) => return Some(Ok(value)),
                Some(Ok(Step::Recur(input))) => {
                    let next = eval_tail(self.def.body, self.env.clone(), input, &self.def);
                    // A frame whose size hint proves it has nothing left is replaced
                    // in place, which keeps linear recursion at one frame. Anything
                    // else stays below the new frame and is resumed once it is done.
                    if frame.size_hint().1 == Some(0) {
                        *frame = next;
                    } else {
                        self.frames.push(next);
                    }
                }
            }
        }
    }
}

fn eval_tail<'a>(
    expr: &'a Expr,
    env: Env<'a>,
    input: Value,
    def: &Rc<Definition<'a>>,
) -> Stream<'a, Step> {
    match &expr.kind {
        ExprKind::Call { name, args } if args.is_empty() => match env.resolve(name, 0) {
            Some(Callable::Def(target)) if Rc::ptr_eq(&target, def) => {
                stream::once(Step::Recur(input))
            }
            _ => emit(eval(expr, env, input)),
        },
        ExprKind::Pipe(left, right) => {
            let def = def.clone();
            stream::pipe(eval(left, env.clone(), input), move |value| {
                eval_tail(right, env.clone(), value, &def)
            })
        }
        ExprKind::Bind { source, name, body } => {
            let def = def.clone();
            stream::pipe(eval(source, env.clone(), input.clone()), move |value| {
                eval_tail(body, env.bind_var(name, value), input.clone(), &def)
            })
        }
        ExprKind::If {
            branches,
            otherwise,
        } => tail_if(branches, otherwise.as_deref(), env, input, def.clone()),
        ExprKind::Defs { defs, rest } => {
            let env = defs.iter().fold(env, |env, local| env.define(local));
            eval_tail(rest, env, input, def)
        }
        _ => emit(eval(expr, env, input)),
    }
}

fn tail_if<'a>(
    branches: &'a [(Expr, Expr)],
    otherwise: Option<&'a Expr>,
    env: Env<'a>,
    input: Value,
    def: Rc<Definition<'a>>,
) -> Stream<'a, Step> {
    let Some(((cond, then), rest)) = branches.split_first() else {
        return match otherwise {
            Some(expr) => eval_tail(expr, env, input, &def),
            None => stream::once(Step::Emit(input)),
        };
    };
    stream::pipe(eval(cond, env.clone(), input.clone()), move |test| {
        if test.is_truthy() {
            eval_tail(then, env.clone(), input.clone(), &def)
        } else {
            tail_if(rest, otherwise, env.clone(), input.clone(), def.clone())
        }
    })
}

fn emit<'a>(values: ValueStream<'a>) -> Stream<'a, Step> {
    Box::new(values.map(|item| item.map(Step::Emit)))
}
