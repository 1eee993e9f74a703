use crate::language::{
    ast::*,
    errors::{SyntaxError, SyntaxErrors},
    lexer::lex,
    span::Span,
    token::{Token, TokenKind},
};


pub fn parse_program(source: &str) -> Result<Program, SyntaxErrors> {
    let tokens = match lex(source) {
        Ok(tokens) => tokens,
        Err(errors) => {
            let errs = errors
                .into_iter()
                .map(|err| SyntaxError::new(err.message, err.span))
                .collect();
            return Err(SyntaxErrors::new(errs));
        }
    };
    Parser::new(tokens).parse()
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    last_span: Option<Span>,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            pos: 0,
            last_span: None,
        }
    }

    fn parse(mut self) -> Result<Program, SyntaxErrors> {
        let body = self
            .parse_pipe()
            .and_then(|body| {
                if self.is_eof() {
                    Ok(body)
                } else {
                    Err(self
                        .error_here("Unexpected tokens after the end of the program")
                        .with_help("separate alternatives with `,` and stages with `|`"))
                }
            })
            .map_err(|err| SyntaxErrors::new(vec![err]))?;
        Ok(Program { body })
    }

    fn parse_pipe(&mut self) -> Result<Expr, SyntaxError> {
        if self.check(TokenKind::Def) {
            return self.parse_defs();
        }
        let left = self.parse_comma()?;
        if self.matches(TokenKind::Pipe) {
            let right = self.parse_pipe()?;
            let span = left.span.join(right.span);
            return Ok(Expr::new(
                ExprKind::Pipe(Box::new(left), Box::new(right)),
                span,
            ));
        }
        Ok(left)
    }

    fn parse_defs(&mut self) -> Result<Expr, SyntaxError> {
        let start = self.current_span_start();
        let mut defs = Vec::new();
        while self.check(TokenKind::Def) {
            defs.push(self.parse_def()?);
        }
        let rest = if self.is_eof() {
            let end = self.last_span_end(start);
            Expr::new(ExprKind::Identity, Span::new(end, end))
        } else {
            self.parse_pipe()?
        };
        let span = Span::new(start, rest.span.end);
        Ok(Expr::new(
            ExprKind::Defs {
                defs,
                rest: Box::new(rest),
            },
            span,
        ))
    }

    fn parse_def(&mut self) -> Result<FunctionDef, SyntaxError> {
        let start = self.expect(TokenKind::Def)?.span.start;
        let name = self.expect_identifier("Expected a function name after `def`")?;
        let mut params = Vec::new();
        if self.matches(TokenKind::LParen) {
            loop {
                params.push(self.parse_param()?);
                if !self.matches(TokenKind::Semi) {
                    break;
                }
            }
            self.expect(TokenKind::RParen)?;
        }
        self.expect(TokenKind::Colon).map_err(|err| {
            err.with_help("a definition looks like `def name(params): body;`")
        })?;
        let body = self.parse_pipe()?;
        let end = self.expect(TokenKind::Semi)?.span.end;
        Ok(FunctionDef {
            name: name.0,
            params,
            body,
            span: Span::new(start, end),
        })
    }

    fn parse_param(&mut self) -> Result<Param, SyntaxError> {
        let token = self.peek().clone();
        match token.kind {
            TokenKind::Identifier(name) => {
                self.advance();
                Ok(Param {
                    name,
                    materialize: false,
                    span: token.span,
                })
            }
            TokenKind::Variable(name) => {
                self.advance();
                Ok(Param {
                    name,
                    materialize: true,
                    span: token.span,
                })
            }
            _ => Err(self
                .error_here("Expected a parameter name")
                .with_help("parameters are either `name` or `$name`")),
        }
    }

    fn parse_comma(&mut self) -> Result<Expr, SyntaxError> {
        let mut left = self.parse_alternative()?;
        while self.matches(TokenKind::Comma) {
            let right = self.parse_alternative()?;
            let span = left.span.join(right.span);
            left = Expr::new(ExprKind::Comma(Box::new(left), Box::new(right)), span);
        }
        Ok(left)
    }

    fn parse_alternative(&mut self) -> Result<Expr, SyntaxError> {
        let left = self.parse_or()?;
        if self.matches(TokenKind::SlashSlash) {
            let right = self.parse_alternative()?;
            let span = left.span.join(right.span);
            return Ok(Expr::new(
                ExprKind::Alternative(Box::new(left), Box::new(right)),
                span,
            ));
        }
        Ok(left)
    }

    fn parse_or(&mut self) -> Result<Expr, SyntaxError> {
        let mut left = self.parse_and()?;
        while self.matches(TokenKind::Or) {
            let right = self.parse_and()?;
            let span = left.span.join(right.span);
            left = Expr::new(ExprKind::Or(Box::new(left), Box::new(right)), span);
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, SyntaxError> {
        let mut left = self.parse_compare()?;
        while self.matches(TokenKind::And) {
            let right = self.parse_compare()?;
            let span = left.span.join(right.span);
            left = Expr::new(ExprKind::And(Box::new(left), Box::new(right)), span);
        }
        Ok(left)
    }

    fn parse_compare(&mut self) -> Result<Expr, SyntaxError> {
        let left = self.parse_additive()?;
        let op = match self.peek_kind() {
            TokenKind::EqEq => BinaryOp::Eq,
            TokenKind::BangEq => BinaryOp::Ne,
            TokenKind::Lt => BinaryOp::Lt,
            TokenKind::LtEq => BinaryOp::Le,
            TokenKind::Gt => BinaryOp::Gt,
            TokenKind::GtEq => BinaryOp::Ge,
            _ => return Ok(left),
        };
        self.advance();
        let right = self.parse_additive()?;
        if matches!(
            self.peek_kind(),
            TokenKind::EqEq
                | TokenKind::BangEq
                | TokenKind::Lt
                | TokenKind::LtEq
                | TokenKind::Gt
                | TokenKind::GtEq
        ) {
            return Err(self
                .error_here("Comparison operators cannot be chained")
                .with_help("wrap one side in parentheses"));
        }
        Ok(binary(op, left, right))
    }

    fn parse_additive(&mut self) -> Result<Expr, SyntaxError> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Sub,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.parse_multiplicative()?;
            left = binary(op, left, right);
        }
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, SyntaxError> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Star => BinaryOp::Mul,
                TokenKind::Slash => BinaryOp::Div,
                TokenKind::Percent => BinaryOp::Rem,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.parse_unary()?;
            left = binary(op, left, right);
        }
    }

    fn parse_unary(&mut self) -> Result<Expr, SyntaxError> {
        if self.check(TokenKind::Minus) {
            let start = self.advance().span.start;
            let operand = self.parse_unary()?;
            let span = Span::new(start, operand.span.end);
            return Ok(Expr::new(ExprKind::Neg(Box::new(operand)), span));
        }
        self.parse_binding()
    }

    /// `term as $name | body`. The body extends as far right as possible.
    fn parse_binding(&mut self) -> Result<Expr, SyntaxError> {
        let source = self.parse_postfix()?;
        if !self.matches(TokenKind::As) {
            return Ok(source);
        }
        let name = self.expect_variable("Expected `$name` after `as`")?;
        self.expect(TokenKind::Pipe)
            .map_err(|err| err.with_help("a binding looks like `term as $name | body`"))?;
        let body = self.parse_pipe()?;
        let span = source.span.join(body.span);
        Ok(Expr::new(
            ExprKind::Bind {
                source: Box::new(source),
                name,
                body: Box::new(body),
            },
            span,
        ))
    }

    fn parse_postfix(&mut self) -> Result<Expr, SyntaxError> {
        let mut expr = self.parse_primary()?;
        loop {
            match self.peek_kind() {
                TokenKind::Field(name) => {
                    let end = self.advance().span.end;
                    let span = Span::new(expr.span.start, end);
                    expr = Expr::new(
                        ExprKind::Field {
                            target: Box::new(expr),
                            name,
                        },
                        span,
                    );
                }
                TokenKind::Dot if matches!(self.peek_kind_n(1), TokenKind::String(_)) => {
                    self.advance();
                    let (name, end) = match self.peek().clone() {
                        Token {
                            kind: TokenKind::String(name),
                            span,
                        } => (name, span.end),
                        _ => return Err(self.error_here("Expected a quoted field name")),
                    };
                    self.advance();
                    let span = Span::new(expr.span.start, end);
                    expr = Expr::new(
                        ExprKind::Field {
                            target: Box::new(expr),
                            name,
                        },
                        span,
                    );
                }
                TokenKind::Dot if self.peek_kind_n(1) == TokenKind::LBracket => {
                    self.advance();
                    expr = self.parse_index_suffix(expr)?;
                }
                TokenKind::LBracket => {
                    expr = self.parse_index_suffix(expr)?;
                }
                _ => return Ok(expr),
            }
        }
    }

    fn parse_index_suffix(&mut self, target: Expr) -> Result<Expr, SyntaxError> {
        let start = target.span.start;
        self.expect(TokenKind::LBracket)?;
        let target = Box::new(target);
        let kind = if self.matches(TokenKind::RBracket) {
            ExprKind::Iterate(target)
        } else if self.matches(TokenKind::Colon) {
            let to = self.parse_pipe()?;
            self.expect(TokenKind::RBracket)?;
            ExprKind::Slice {
                target,
                from: None,
                to: Some(Box::new(to)),
            }
        } else {
            let index = self.parse_pipe()?;
            if self.matches(TokenKind::Colon) {
                let to = if self.check(TokenKind::RBracket) {
                    None
                } else {
                    Some(Box::new(self.parse_pipe()?))
                };
                self.expect(TokenKind::RBracket)?;
                ExprKind::Slice {
                    target,
                    from: Some(Box::new(index)),
                    to,
                }
            } else {
                self.expect(TokenKind::RBracket)?;
                ExprKind::Index {
                    target,
                    index: Box::new(index),
                }
            }
        };
        let end = self.last_span_end(start);
        Ok(Expr::new(kind, Span::new(start, end)))
    }

    fn parse_primary(&mut self) -> Result<Expr, SyntaxError> {
        let token = self.peek().clone();
        let span = token.span;
        match token.kind {
            TokenKind::Dot => {
                self.advance();
                Ok(Expr::new(ExprKind::Identity, span))
            }
            TokenKind::DotDot => {
                self.advance();
                Ok(Expr::new(ExprKind::Recurse, span))
            }
            TokenKind::Field(name) => {
                self.advance();
                let identity = Expr::new(ExprKind::Identity, Span::new(span.start, span.start + 1));
                Ok(Expr::new(
                    ExprKind::Field {
                        target: Box::new(identity),
                        name,
                    },
                    span,
                ))
            }
            TokenKind::Number(value) => {
                self.advance();
                Ok(Expr::new(ExprKind::Literal(Literal::Number(value)), span))
            }
            TokenKind::String(value) => {
                self.advance();
                Ok(Expr::new(ExprKind::Literal(Literal::String(value)), span))
            }
            TokenKind::True => {
                self.advance();
                Ok(Expr::new(ExprKind::Literal(Literal::Bool(true)), span))
            }
            TokenKind::False => {
                self.advance();
                Ok(Expr::new(ExprKind::Literal(Literal::Bool(false)), span))
            }
            TokenKind::Null => {
                self.advance();
                Ok(Expr::new(ExprKind::Literal(Literal::Null), span))
            }
            TokenKind::Variable(name) => {
                self.advance();
                Ok(Expr::new(ExprKind::Variable(name), span))
            }
            TokenKind::LParen => {
                self.advance();
                let mut inner = self.parse_pipe()?;
                let end = self.expect(TokenKind::RParen)?.span.end;
                inner.span = Span::new(span.start, end);
                Ok(inner)
            }
            TokenKind::LBracket => {
                self.advance();
                let body = if self.check(TokenKind::RBracket) {
                    None
                } else {
                    Some(Box::new(self.parse_pipe()?))
                };
                let end = self.expect(TokenKind::RBracket)?.span.end;
                Ok(Expr::new(ExprKind::Array(body), Span::new(span.start, end)))
            }
            TokenKind::LBrace => self.parse_object(),
            TokenKind::If => self.parse_if(),
            TokenKind::Reduce => self.parse_reduce(),
            TokenKind::Def => self.parse_defs(),
            TokenKind::Identifier(name) => {
                self.advance();
                let mut args = Vec::new();
                if self.matches(TokenKind::LParen) {
                    loop {
                        args.push(self.parse_pipe()?);
                        if !self.matches(TokenKind::Semi) {
                            break;
                        }
                    }
                    self.expect(TokenKind::RParen)
                        .map_err(|err| err.with_help("arguments are separated by `;`"))?;
                }
                let end = self.last_span_end(span.end);
                Ok(Expr::new(
                    ExprKind::Call { name, args },
                    Span::new(span.start, end),
                ))
            }
            other => Err(SyntaxError::new(
                format!("Expected an expression, found {}", other.describe()),
                span,
            )
            .with_label("expression expected here")),
        }
    }

    fn parse_object(&mut self) -> Result<Expr, SyntaxError> {
        let start = self.expect(TokenKind::LBrace)?.span.start;
        let mut entries = Vec::new();
        if !self.check(TokenKind::RBrace) {
            loop {
                entries.push(self.parse_object_entry()?);
                if !self.matches(TokenKind::Comma) {
                    break;
                }
            }
        }
        let end = self.expect(TokenKind::RBrace)?.span.end;
        Ok(Expr::new(ExprKind::Object(entries), Span::new(start, end)))
    }

    fn parse_object_entry(&mut self) -> Result<ObjectEntry, SyntaxError> {
        let token = self.peek().clone();
        let key = match token.kind {
            TokenKind::Identifier(name) | TokenKind::String(name) => {
                self.advance();
                ObjectKey::Name(name)
            }
            TokenKind::Variable(name) => {
                self.advance();
                ObjectKey::Variable(name)
            }
            TokenKind::LParen => {
                self.advance();
                let key = self.parse_pipe()?;
                self.expect(TokenKind::RParen)?;
                ObjectKey::Computed(key)
            }
            _ => return Err(self.error_here("Expected an object key")),
        };
        let value = if self.matches(TokenKind::Colon) {
            Some(self.parse_object_value()?)
        } else if matches!(key, ObjectKey::Computed(_)) {
            return Err(self
                .error_here("Expected `:` after a computed object key")
                .with_help("computed keys need a value, as in `{(.k): .v}`"));
        } else {
            None
        };
        Ok(ObjectEntry { key, value })
    }

    fn parse_object_value(&mut self) -> Result<Expr, SyntaxError> {
        let left = self.parse_alternative()?;
        if self.matches(TokenKind::Pipe) {
            let right = self.parse_object_value()?;
            let span = left.span.join(right.span);
            return Ok(Expr::new(
                ExprKind::Pipe(Box::new(left), Box::new(right)),
                span,
            ));
        }
        Ok(left)
    }

    fn parse_if(&mut self) -> Result<Expr, SyntaxError> {
        let start = self.expect(TokenKind::If)?.span.start;
        let mut branches = Vec::new();
        let cond = self.parse_pipe()?;
        self.expect(TokenKind::Then)?;
        let body = self.parse_pipe()?;
        branches.push((cond, body));
        let mut otherwise = None;
        loop {
            if self.matches(TokenKind::Elif) {
                let cond = self.parse_pipe()?;
                self.expect(TokenKind::Then)?;
                let body = self.parse_pipe()?;
                branches.push((cond, body));
            } else if self.matches(TokenKind::Else) {
                otherwise = Some(Box::new(self.parse_pipe()?));
                break;
            } else {
                break;
            }
        }
        let end = self
            .expect(TokenKind::End)
            .map_err(|err| err.with_help("close the conditional with `end`"))?
            .span
            .end;
        Ok(Expr::new(
            ExprKind::If {
                branches,
                otherwise,
            },
            Span::new(start, end),
        ))
    }

    fn parse_reduce(&mut self) -> Result<Expr, SyntaxError> {
        let start = self.expect(TokenKind::Reduce)?.span.start;
        let source = self.parse_postfix()?;
        self.expect(TokenKind::As)?;
        let name = self.expect_variable("Expected `$name` after `as`")?;
        self.expect(TokenKind::LParen)?;
        let init = self.parse_pipe()?;
        self.expect(TokenKind::Semi)?;
        let update = self.parse_pipe()?;
        let end = self.expect(TokenKind::RParen)?.span.end;
        Ok(Expr::new(
            ExprKind::Reduce {
                source: Box::new(source),
                name,
                init: Box::new(init),
                update: Box::new(update),
            },
            Span::new(start, end),
        ))
    }

    fn expect_identifier(&mut self, msg: &str) -> Result<(String, Span), SyntaxError> {
        match self.peek_kind() {
            TokenKind::Identifier(name) => {
                let span = self.advance().span;
                Ok((name, span))
            }
            _ => Err(self.error_here(msg)),
        }
    }

    fn expect_variable(&mut self, msg: &str) -> Result<String, SyntaxError> {
        match self.peek_kind() {
            TokenKind::Variable(name) => {
                self.advance();
                Ok(name)
            }
            _ => Err(self.error_here(msg)),
        }
    }

    fn expect(&mut self, kind: TokenKind) -> Result<&Token, SyntaxError> {
        if self.check(kind.clone()) {
            Ok(self.advance())
        } else {
            Err(self.error_here(&format!(
                "Expected {}, found {}",
                kind.describe(),
                self.peek_kind().describe()
            )))
        }
    }

    fn matches(&mut self, kind: TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.peek_kind() == kind
    }

    fn peek(&self) -> &Token {
        let idx = self.pos.min(self.tokens.len().saturating_sub(1));
        &self.tokens[idx]
    }

    fn peek_kind(&self) -> TokenKind {
        self.peek().kind.clone()
    }

    fn peek_kind_n(&self, n: usize) -> TokenKind {
        self.tokens
            .get(self.pos + n)
            .map(|t| t.kind.clone())
            .unwrap_or(TokenKind::Eof)
    }

    fn advance(&mut self) -> &Token {
        let idx = self.pos.min(self.tokens.len().saturating_sub(1));
        self.pos = (self.pos + 1).min(self.tokens.len());
        self.last_span = Some(self.tokens[idx].span);
        &self.tokens[idx]
    }

    fn is_eof(&self) -> bool {
        self.check(TokenKind::Eof)
    }

    fn current_span_start(&self) -> usize {
        self.peek().span.start
    }

    fn last_span_end(&self, fallback: usize) -> usize {
        self.last_span.map(|span| span.end).unwrap_or(fallback)
    }

    fn error_here(&self, message: &str) -> SyntaxError {
        SyntaxError::new(message, self.peek().span)
    }
}

fn binary(op: BinaryOp, left: Expr, right: Expr) -> Expr {
    let span = left.span.join(right.span);
    Expr::new(
        ExprKind::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        },
        span,
    )
}
