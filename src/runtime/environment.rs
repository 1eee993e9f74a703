use crate::language::ast::{Expr, FunctionDef, Param};
use crate::runtime::{
    builtins::Native,
    error::{RuntimeError, RuntimeResult},
    interpreter::{eval, Options},
    stream::ValueStream,
    tail,
    value::Value,
};
use std::cell::Cell;
use std::collections::HashMap;
use std::rc::Rc;

/// State shared by every environment of one evaluation: the builtin registry,
/// which acts as the outermost frame, and the call depth bookkeeping.
pub struct Context {
    natives: HashMap<&'static str, Vec<Native>>,
    options: Options,
    depth: Cell<usize>,
}

impl Context {
    pub fn new(natives: impl IntoIterator<Item = Native>, options: Options) -> Self {
        let mut registry: HashMap<&'static str, Vec<Native>> = HashMap::new();
        for native in natives {
            registry.entry(native.name).or_default().push(native);
        }
        Self {
            natives: registry,
            options,
            depth: Cell::new(0),
        }
    }

    fn native(&self, name: &str, arity: usize) -> Option<Native> {
        self.natives
            .get(name)
            .and_then(|overloads| overloads.iter().find(|n| n.arity == arity))
            .copied()
    }
}

pub(crate) struct DepthGuard {
    ctx: Rc<Context>,
}

impl DepthGuard {
    pub(crate) fn enter(ctx: &Rc<Context>) -> RuntimeResult<Self> {
        let depth = ctx.depth.get();
        let limit = ctx.options.max_depth;
        if depth >= limit {
            return Err(RuntimeError::DepthExceeded { limit });
        }
        ctx.depth.set(depth + 1);
        Ok(Self { ctx: ctx.clone() })
    }
}

impl Drop for DepthGuard {
    fn drop(&mut self) {
        let depth = self.ctx.depth.get();
        self.ctx.depth.set(depth.saturating_sub(1));
    }
}

/// A user definition together with the scope it was declared in.
pub struct Definition<'a> {
    pub name: &'a str,
    pub params: &'a [Param],
    pub body: &'a Expr,
    pub env: Env<'a>,
    pub tail_recursive: bool,
}

impl<'a> Definition<'a> {
    pub fn arity(&self) -> usize {
        self.params.len()
    }
}

/// An argument expression paired with the environment of its call site.
#[derive(Clone)]
pub struct Closure<'a> {
    pub expr: &'a Expr,
    pub env: Env<'a>,
}

impl<'a> Closure<'a> {
    pub fn new(expr: &'a Expr, env: Env<'a>) -> Self {
        Self { expr, env }
    }

    /// Evaluates the argument against whatever `.` is current at the reference.
    pub fn run(&self, input: Value) -> ValueStream<'a> {
        eval(self.expr, self.env.clone(), input)
    }
}

#[derive(Clone)]
pub enum Callable<'a> {
    Def(Rc<Definition<'a>>),
    Filter(Closure<'a>),
    Native(Native),
}

enum Scope<'a> {
    Root,
    Function {
        def: Rc<Definition<'a>>,
        parent: Rc<Scope<'a>>,
    },
    Filter {
        name: &'a str,
        closure: Closure<'a>,
        parent: Rc<Scope<'a>>,
    },
    Var {
        name: &'a str,
        value: Value,
        parent: Rc<Scope<'a>>,
    },
}

/// A persistent scope chain. Extending it returns a new handle that shares the
/// parent frames, so closures holding an older handle are never affected.
#[derive(Clone)]
pub struct Env<'a> {
    scope: Rc<Scope<'a>>,
    ctx: Rc<Context>,
}

impl<'a> Env<'a> {
    pub fn root(ctx: Rc<Context>) -> Self {
        Self {
            scope: Rc::new(Scope::Root),
            ctx,
        }
    }

    pub fn context(&self) -> &Rc<Context> {
        &self.ctx
    }

    fn extend(&self, scope: Scope<'a>) -> Self {
        Self {
            scope: Rc::new(scope),
            ctx: self.ctx.clone(),
        }
    }

    /// Adds `def` to the innermost frame. Its declaring scope is `self`, so the
    /// definition sees everything defined before it and nothing after.
    pub fn define(&self, def: &'a FunctionDef) -> Self {
        let definition = Definition {
            name: &def.name,
            params: &def.params,
            body: &def.body,
            env: self.clone(),
            tail_recursive: tail::is_tail_recursive(def),
        };
        self.define_rc(Rc::new(definition))
    }

    pub(crate) fn define_rc(&self, def: Rc<Definition<'a>>) -> Self {
        self.extend(Scope::Function {
            def,
            parent: self.scope.clone(),
        })
    }

    pub fn bind_filter(&self, name: &'a str, closure: Closure<'a>) -> Self {
        self.extend(Scope::Filter {
            name,
            closure,
            parent: self.scope.clone(),
        })
    }

    pub fn bind_var(&self, name: &'a str, value: Value) -> Self {
        self.extend(Scope::Var {
            name,
            value,
            parent: self.scope.clone(),
        })
    }

    /// Innermost match on (name, arity) wins; builtins are consulted last.
    pub fn resolve(&self, name: &str, arity: usize) -> Option<Callable<'a>> {
        let mut scope = &self.scope;
        loop {
            match scope.as_ref() {
                Scope::Root => return self.ctx.native(name, arity).map(Callable::Native),
                Scope::Function { def, parent } => {
                    if def.name == name && def.arity() == arity {
                        return Some(Callable::Def(def.clone()));
                    }
                    scope = parent;
                }
                Scope::Filter {
                    name: bound,
                    closure,
                    parent,
                } => {
                    if arity == 0 && *bound == name {
                        return Some(Callable::Filter(closure.clone()));
                    }
                    scope = parent;
                }
                Scope::Var { parent, .. } => scope = parent,
            }
        }
    }

    pub fn lookup_var(&self, name: &str) -> Option<Value> {
        let mut scope = &self.scope;
        loop {
            match scope.as_ref() {
                Scope::Root => return None,
                Scope::Var {
                    name: bound,
                    value,
                    parent,
                } => {
                    if *bound == name {
                        return Some(value.clone());
                    }
                    scope = parent;
                }
                Scope::Function { parent, .. } | Scope::Filter { parent, .. } => scope = parent,
            }
        }
    }
}
