use crate::language::{
    span::Span,
    token::{Token, TokenKind},
};
use nom::{
    branch::alt,
    bytes::complete::{escaped_transform, is_not, tag, take_while_m_n},
    character::complete::{alpha1, alphanumeric1, char, digit0, digit1, one_of},
    combinator::{map, map_opt, opt, recognize, value},
    multi::many0_count,
    sequence::{delimited, pair, preceded, tuple},
    IResult,
};

#[derive(Debug)]
pub struct LexError {
    pub message: String,
    pub span: Span,
}

pub fn lex(source: &str) -> Result<Vec<Token>, Vec<LexError>> {
    let mut tokens = Vec::new();
    let mut errors = Vec::new();
    let mut rest = source;

    loop {
        rest = skip_trivia(rest);
        let start = source.len() - rest.len();
        if rest.is_empty() {
            break;
        }

        match token(rest) {
            Ok((remaining, kind)) => {
                let end = source.len() - remaining.len();
                tokens.push(Token {
                    kind,
                    span: Span::new(start, end),
                });
                rest = remaining;
            }
            Err(_) => {
                let width = rest.chars().next().map(char::len_utf8).unwrap_or(1);
                let message = if rest.starts_with('"') {
                    "Unterminated or malformed string literal".to_string()
                } else {
                    format!("Unexpected character `{}`", &rest[..width])
                };
                errors.push(LexError {
                    message,
                    span: Span::new(start, start + width),
                });
                rest = &rest[width..];
            }
        }
    }

    let eof = source.len();
    tokens.push(Token {
        kind: TokenKind::Eof,
        span: Span::new(eof, eof),
    });

    if errors.is_empty() {
        Ok(tokens)
    } else {
        Err(errors)
    }
}

fn skip_trivia(mut input: &str) -> &str {
    loop {
        let trimmed = input.trim_start();
        if let Some(comment) = trimmed.strip_prefix('#') {
            input = comment.find('\n').map(|idx| &comment[idx..]).unwrap_or("");
        } else {
            return trimmed;
        }
    }
}

fn token(input: &str) -> IResult<&str, TokenKind> {
    alt((
        number,
        string_literal,
        variable,
        field,
        word,
        symbol,
    ))(input)
}

fn identifier(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        alt((alpha1, tag("_"))),
        many0_count(alt((alphanumeric1, tag("_")))),
    ))(input)
}

fn word(input: &str) -> IResult<&str, TokenKind> {
    map(identifier, |ident| match ident {
        "def" => TokenKind::Def,
        "if" => TokenKind::If,
        "then" => TokenKind::Then,
        "elif" => TokenKind::Elif,
        "else" => TokenKind::Else,
        "end" => TokenKind::End,
        "as" => TokenKind::As,
        "reduce" => TokenKind::Reduce,
        "and" => TokenKind::And,
        "or" => TokenKind::Or,
        "true" => TokenKind::True,
        "false" => TokenKind::False,
        "null" => TokenKind::Null,
        other => TokenKind::Identifier(other.to_string()),
    })(input)
}

fn variable(input: &str) -> IResult<&str, TokenKind> {
    map(preceded(char('$'), identifier), |name| {
        TokenKind::Variable(name.to_string())
    })(input)
}

fn field(input: &str) -> IResult<&str, TokenKind> {
    map(preceded(char('.'), identifier), |name| {
        TokenKind::Field(name.to_string())
    })(input)
}

fn number(input: &str) -> IResult<&str, TokenKind> {
    map_opt(
        recognize(tuple((
            digit1,
            opt(pair(char('.'), digit0)),
            opt(tuple((one_of("eE"), opt(one_of("+-")), digit1))),
        ))),
        |text: &str| text.parse::<f64>().ok().map(TokenKind::Number),
    )(input)
}

fn string_literal(input: &str) -> IResult<&str, TokenKind> {
    map(
        delimited(char('"'), opt(string_body), char('"')),
        |body| TokenKind::String(body.unwrap_or_default()),
    )(input)
}

fn string_body(input: &str) -> IResult<&str, String> {
    escaped_transform(
        is_not("\\\""),
        '\\',
        alt((
            value('\\', char('\\')),
            value('"', char('"')),
            value('/', char('/')),
            value('\n', char('n')),
            value('\t', char('t')),
            value('\r', char('r')),
            value('\u{8}', char('b')),
            value('\u{c}', char('f')),
            map_opt(
                preceded(
                    char('u'),
                    take_while_m_n(4, 4, |c: char| c.is_ascii_hexdigit()),
                ),
                |hex: &str| u32::from_str_radix(hex, 16).ok().and_then(char::from_u32),
            ),
        )),
    )(input)
}

fn symbol(input: &str) -> IResult<&str, TokenKind> {
    alt((
        alt((
            value(TokenKind::DotDot, tag("..")),
            value(TokenKind::SlashSlash, tag("//")),
            value(TokenKind::EqEq, tag("==")),
            value(TokenKind::BangEq, tag("!=")),
            value(TokenKind::LtEq, tag("<=")),
            value(TokenKind::GtEq, tag(">=")),
        )),
        alt((
            value(TokenKind::Dot, char('.')),
            value(TokenKind::Pipe, char('|')),
            value(TokenKind::Comma, char(',')),
            value(TokenKind::Colon, char(':')),
            value(TokenKind::Semi, char(';')),
            value(TokenKind::Lt, char('<')),
            value(TokenKind::Gt, char('>')),
            value(TokenKind::Plus, char('+')),
            value(TokenKind::Minus, char('-')),
            value(TokenKind::Star, char('*')),
            value(TokenKind::Slash, char('/')),
            value(TokenKind::Percent, char('%')),
        )),
        alt((
            value(TokenKind::LParen, char('(')),
            value(TokenKind::RParen, char(')')),
            value(TokenKind::LBrace, char('{')),
            value(TokenKind::RBrace, char('}')),
            value(TokenKind::LBracket, char('[')),
            value(TokenKind::RBracket, char(']')),
        )),
    ))(input)
}
