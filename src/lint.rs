//! Static checks over a parsed program that do not affect evaluation.

use crate::language::{
    ast::{Expr, ExprKind, FunctionDef, ObjectKey, Program},
    span::Span,
};
use crate::runtime::builtins;
use std::collections::HashSet;

/// What a filter parameter hides inside the body of its function.
#[derive(Clone, Debug, PartialEq)]
pub enum Shadowed {
    Builtin,
    Definition(Span),
    Parameter(Span),
}

/// A parameter whose name matches a zero-arity function already in scope.
/// Inside the body, plain references to that name call the argument instead.
#[derive(Clone, Debug, PartialEq)]
pub struct ShadowingHazard {
    pub function: String,
    pub param: String,
    pub param_span: Span,
    pub shadowed: Shadowed,
}

pub fn shadowing_hazards(program: &Program) -> Vec<ShadowingHazard> {
    let mut walker = Walker {
        builtins: builtins::natives()
            .into_iter()
            .filter(|native| native.arity == 0)
            .map(|native| native.name)
            .collect(),
        visible: Vec::new(),
        hazards: Vec::new(),
    };
    walker.walk(&program.body);
    walker.hazards
}

struct Visible<'p> {
    name: &'p str,
    arity: usize,
    origin: Shadowed,
}

struct Walker<'p> {
    builtins: HashSet<&'static str>,
    visible: Vec<Visible<'p>>,
    hazards: Vec<ShadowingHazard>,
}

impl<'p> Walker<'p> {
    fn lookup(&self, name: &str) -> Option<Shadowed> {
        self.visible
            .iter()
            .rev()
            .find(|entry| entry.arity == 0 && entry.name == name)
            .map(|entry| entry.origin.clone())
            .or_else(|| self.builtins.contains(name).then_some(Shadowed::Builtin))
    }

    fn definition(&mut self, def: &'p FunctionDef) {
        self.visible.push(Visible {
            name: &def.name,
            arity: def.arity(),
            origin: Shadowed::Definition(def.span),
        });
        let scope = self.visible.len();
        for param in &def.params {
            if let Some(shadowed) = self.lookup(&param.name) {
                self.hazards.push(ShadowingHazard {
                    function: def.name.clone(),
                    param: param.name.clone(),
                    param_span: param.span,
                    shadowed,
                });
            }
        }
        for param in &def.params {
            self.visible.push(Visible {
                name: &param.name,
                arity: 0,
                origin: Shadowed::Parameter(param.span),
            });
        }
        self.walk(&def.body);
        self.visible.truncate(scope);
    }

    fn walk(&mut self, expr: &'p Expr) {
        match &expr.kind {
            ExprKind::Identity
            | ExprKind::Recurse
            | ExprKind::Literal(_)
            | ExprKind::Variable(_)
            | ExprKind::Array(None) => {}
            ExprKind::Field { target, .. } | ExprKind::Iterate(target) | ExprKind::Neg(target) => {
                self.walk(target)
            }
            ExprKind::Array(Some(body)) => self.walk(body),
            ExprKind::Index { target, index } => {
                self.walk(target);
                self.walk(index);
            }
            ExprKind::Slice { target, from, to } => {
                self.walk(target);
                for bound in [from, to].into_iter().flatten() {
                    self.walk(bound);
                }
            }
            ExprKind::Object(entries) => {
                for entry in entries {
                    if let ObjectKey::Computed(key) = &entry.key {
                        self.walk(key);
                    }
                    if let Some(value) = &entry.value {
                        self.walk(value);
                    }
                }
            }
            ExprKind::Binary { left, right, .. } => {
                self.walk(left);
                self.walk(right);
            }
            ExprKind::And(left, right)
            | ExprKind::Or(left, right)
            | ExprKind::Alternative(left, right)
            | ExprKind::Comma(left, right)
            | ExprKind::Pipe(left, right) => {
                self.walk(left);
                self.walk(right);
            }
            ExprKind::Bind { source, body, .. } => {
                self.walk(source);
                self.walk(body);
            }
            ExprKind::Reduce {
                source,
                init,
                update,
                ..
            } => {
                self.walk(source);
                self.walk(init);
                self.walk(update);
            }
            ExprKind::If {
                branches,
                otherwise,
            } => {
                for (cond, then) in branches {
                    self.walk(cond);
                    self.walk(then);
                }
                if let Some(otherwise) = otherwise {
                    self.walk(otherwise);
                }
            }
            ExprKind::Defs { defs, rest } => {
                let scope = self.visible.len();
                for def in defs {
                    self.definition(def);
                }
                self.walk(rest);
                self.visible.truncate(scope);
            }
            ExprKind::Call { args, .. } => {
                for arg in args {
                    self.walk(arg);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::language::parser::parse_program;

    fn hazards(source: &str) -> Vec<ShadowingHazard> {
        shadowing_hazards(&parse_program(source).expect("parse"))
    }

    #[test]
    fn parameter_hiding_an_earlier_definition() {
        let found = hazards(r#"def code: "x"; def equals($code): code == $code; equals(1)"#);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].function, "equals");
        assert_eq!(found[0].param, "code");
        assert!(matches!(found[0].shadowed, Shadowed::Definition(_)));
    }

    #[test]
    fn parameter_hiding_a_builtin() {
        let found = hazards("def apply(length): length; apply(1)");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].shadowed, Shadowed::Builtin);
    }

    #[test]
    fn inner_parameter_hiding_an_outer_parameter() {
        let found = hazards("def outer(f): def inner(f): f; inner(f); outer(1)");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].function, "inner");
        assert!(matches!(found[0].shadowed, Shadowed::Parameter(_)));
    }

    #[test]
    fn definitions_with_arguments_are_not_hidden() {
        assert!(hazards("def f(x): x; def g(f): f; g(1)").is_empty());
        assert!(hazards("def g(f): f; def f: 1; g(1)").is_empty());
    }
}
