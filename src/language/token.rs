use crate::language::span::Span;

#[derive(Clone, Debug, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq)]
pub enum TokenKind {
    Identifier(String),
    Variable(String),
    Field(String),
    Number(f64),
    String(String),

    Def,
    If,
    Then,
    Elif,
    Else,
    End,
    As,
    Reduce,
    And,
    Or,
    True,
    False,
    Null,

    Dot,
    DotDot,
    Pipe,
    Comma,
    Colon,
    Semi,
    SlashSlash,
    EqEq,
    BangEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,

    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,

    Eof,
}

impl TokenKind {
    pub fn describe(&self) -> String {
        match self {
            TokenKind::Identifier(name) => format!("identifier `{name}`"),
            TokenKind::Variable(name) => format!("variable `${name}`"),
            TokenKind::Field(name) => format!("field `.{name}`"),
            TokenKind::Number(value) => format!("number `{value}`"),
            TokenKind::String(value) => format!("string {value:?}"),
            TokenKind::Eof => "end of input".to_string(),
            other => format!("`{}`", other.symbol()),
        }
    }

    fn symbol(&self) -> &'static str {
        match self {
            TokenKind::Def => "def",
            TokenKind::If => "if",
            TokenKind::Then => "then",
            TokenKind::Elif => "elif",
            TokenKind::Else => "else",
            TokenKind::End => "end",
            TokenKind::As => "as",
            TokenKind::Reduce => "reduce",
            TokenKind::And => "and",
            TokenKind::Or => "or",
            TokenKind::True => "true",
            TokenKind::False => "false",
            TokenKind::Null => "null",
            TokenKind::Dot => ".",
            TokenKind::DotDot => "..",
            TokenKind::Pipe => "|",
            TokenKind::Comma => ",",
            TokenKind::Colon => ":",
            TokenKind::Semi => ";",
            TokenKind::SlashSlash => "//",
            TokenKind::EqEq => "==",
            TokenKind::BangEq => "!=",
            TokenKind::Lt => "<",
            TokenKind::LtEq => "<=",
            TokenKind::Gt => ">",
            TokenKind::GtEq => ">=",
            TokenKind::Plus => "+",
            TokenKind::Minus => "-",
            TokenKind::Star => "*",
            TokenKind::Slash => "/",
            TokenKind::Percent => "%",
            TokenKind::LParen => "(",
            TokenKind::RParen => ")",
            TokenKind::LBrace => "{",
            TokenKind::RBrace => "}",
            TokenKind::LBracket => "[",
            TokenKind::RBracket => "]",
            _ => "?",
        }
    }
}
