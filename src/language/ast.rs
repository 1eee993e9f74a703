use crate::language::span::Span;

/// A parsed filter program: the top-level definitions followed by the main
/// expression they scope over.
#[derive(Clone, Debug)]
pub struct Program {
    pub body: Expr,
}

impl Program {
    /// Definitions at the outermost level, in program order.
    pub fn top_level_defs(&self) -> Vec<&FunctionDef> {
        let mut defs = Vec::new();
        let mut cursor = &self.body;
        while let ExprKind::Defs { defs: group, rest } = &cursor.kind {
            defs.extend(group.iter());
            cursor = rest;
        }
        defs
    }
}

#[derive(Clone, Debug)]
pub struct FunctionDef {
    pub name: String,
    pub params: Vec<Param>,
    pub body: Expr,
    pub span: Span,
}

impl FunctionDef {
    pub fn arity(&self) -> usize {
        self.params.len()
    }
}

/// A formal parameter. `$name` parameters are materialized: the argument is
/// bound both as a filter under `name` and as each of its values under `$name`.
#[derive(Clone, Debug, PartialEq)]
pub struct Param {
    pub name: String,
    pub materialize: bool,
    pub span: Span,
}

#[derive(Clone, Debug)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
}

impl Expr {
    pub fn new(kind: ExprKind, span: Span) -> Self {
        Self { kind, span }
    }
}

#[derive(Clone, Debug)]
pub enum ExprKind {
    Identity,
    Recurse,
    Literal(Literal),
    Variable(String),
    Field {
        target: Box<Expr>,
        name: String,
    },
    Index {
        target: Box<Expr>,
        index: Box<Expr>,
    },
    Slice {
        target: Box<Expr>,
        from: Option<Box<Expr>>,
        to: Option<Box<Expr>>,
    },
    Iterate(Box<Expr>),
    Array(Option<Box<Expr>>),
    Object(Vec<ObjectEntry>),
    Neg(Box<Expr>),
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Alternative(Box<Expr>, Box<Expr>),
    Comma(Box<Expr>, Box<Expr>),
    Pipe(Box<Expr>, Box<Expr>),
    Bind {
        source: Box<Expr>,
        name: String,
        body: Box<Expr>,
    },
    Reduce {
        source: Box<Expr>,
        name: String,
        init: Box<Expr>,
        update: Box<Expr>,
    },
    If {
        branches: Vec<(Expr, Expr)>,
        otherwise: Option<Box<Expr>>,
    },
    Defs {
        defs: Vec<FunctionDef>,
        rest: Box<Expr>,
    },
    Call {
        name: String,
        args: Vec<Expr>,
    },
}

#[derive(Clone, Debug, PartialEq)]
pub enum Literal {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
}

#[derive(Clone, Debug)]
pub struct ObjectEntry {
    pub key: ObjectKey,
    pub value: Option<Expr>,
}

#[derive(Clone, Debug)]
pub enum ObjectKey {
    Name(String),
    Variable(String),
    Computed(Expr),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
        }
    }
}
