//! Tokenizer

use crate::ast::Span;
use logos::Logos;
use std::fmt::{self, Display, Formatter};

/// A token with its byte span
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    /// Kind and payload
    pub kind: TokenKind,
    /// Byte range in the source
    pub span: Span,
}

/// Token kinds
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\n\f]+")]
#[logos(skip r"//[^\n]*")]
#[logos(skip r"/\*([^*]|\*[^/])*\*/")]
pub enum TokenKind {
    // Keywords
    /// `namespace`
    #[token("namespace")]
    Namespace,
    /// `type`
    #[token("type")]
    Type,
    /// `fn`
    #[token("fn")]
    Fn,
    /// `pub`
    #[token("pub")]
    Pub,
    /// `static`
    #[token("static")]
    Static,
    /// `unsafe`
    #[token("unsafe")]
    Unsafe,
    /// `let`
    #[token("let")]
    Let,
    /// `return`
    #[token("return")]
    Return,
    /// `if`
    #[token("if")]
    If,
    /// `else`
    #[token("else")]
    Else,
    /// `while`
    #[token("while")]
    While,
    /// `true`
    #[token("true")]
    True,
    /// `false`
    #[token("false")]
    False,

    // Literals
    /// Integer literal
    #[regex(r"[0-9][0-9_]*", |lex| lex.slice().replace('_', "").parse::<i64>().ok())]
    Int(i64),
    /// Float literal
    #[regex(r"[0-9][0-9_]*\.[0-9][0-9_]*", |lex| lex.slice().replace('_', "").parse::<f64>().ok())]
    Float(f64),
    /// String literal, escapes resolved
    #[regex(r#""([^"\\\n]|\\.)*""#, |lex| unescape(lex.slice()))]
    Str(String),
    /// Identifier
    #[regex(r"[A-Za-z_][A-Za-z0-9_]*", |lex| lex.slice().to_string())]
    Ident(String),

    // Punctuation
    /// `{`
    #[token("{")]
    LBrace,
    /// `}`
    #[token("}")]
    RBrace,
    /// `(`
    #[token("(")]
    LParen,
    /// `)`
    #[token(")")]
    RParen,
    /// `[`
    #[token("[")]
    LBracket,
    /// `]`
    #[token("]")]
    RBracket,
    /// `#`
    #[token("#")]
    Hash,
    /// `;`
    #[token(";")]
    Semi,
    /// `:`
    #[token(":")]
    Colon,
    /// `,`
    #[token(",")]
    Comma,
    /// `.`
    #[token(".")]
    Dot,
    /// `->`
    #[token("->")]
    Arrow,

    // Operators
    /// `=`
    #[token("=")]
    Assign,
    /// `==`
    #[token("==")]
    EqEq,
    /// `!=`
    #[token("!=")]
    NotEq,
    /// `<`
    #[token("<")]
    Lt,
    /// `<=`
    #[token("<=")]
    Le,
    /// `>`
    #[token(">")]
    Gt,
    /// `>=`
    #[token(">=")]
    Ge,
    /// `+`
    #[token("+")]
    Plus,
    /// `-`
    #[token("-")]
    Minus,
    /// `*`
    #[token("*")]
    Star,
    /// `/`
    #[token("/")]
    Slash,
    /// `%`
    #[token("%")]
    Percent,
    /// `!`
    #[token("!")]
    Bang,
    /// `&&`
    #[token("&&")]
    AndAnd,
    /// `||`
    #[token("||")]
    OrOr,

    /// Input that starts no token
    Error,
    /// End of input
    Eof,
}

impl Display for TokenKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Namespace => "namespace",
            Self::Type => "type",
            Self::Fn => "fn",
            Self::Pub => "pub",
            Self::Static => "static",
            Self::Unsafe => "unsafe",
            Self::Let => "let",
            Self::Return => "return",
            Self::If => "if",
            Self::Else => "else",
            Self::While => "while",
            Self::True => "true",
            Self::False => "false",
            Self::Int(v) => return write!(f, "integer `{v}`"),
            Self::Float(v) => return write!(f, "float `{v}`"),
            Self::Str(_) => "string literal",
            Self::Ident(name) => return write!(f, "identifier `{name}`"),
            Self::LBrace => "{",
            Self::RBrace => "}",
            Self::LParen => "(",
            Self::RParen => ")",
            Self::LBracket => "[",
            Self::RBracket => "]",
            Self::Hash => "#",
            Self::Semi => ";",
            Self::Colon => ":",
            Self::Comma => ",",
            Self::Dot => ".",
            Self::Arrow => "->",
            Self::Assign => "=",
            Self::EqEq => "==",
            Self::NotEq => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Plus => "+",
            Self::Minus => "-",
            Self::Star => "*",
            Self::Slash => "/",
            Self::Percent => "%",
            Self::Bang => "!",
            Self::AndAnd => "&&",
            Self::OrOr => "||",
            Self::Error => "invalid input",
            Self::Eof => "end of file",
        };
        match self {
            Self::Str(_) | Self::Error | Self::Eof => write!(f, "{text}"),
            _ => write!(f, "`{text}`"),
        }
    }
}

fn unescape(slice: &str) -> Option<String> {
    let inner = &slice[1..slice.len() - 1];
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next()? {
            'n' => out.push('\n'),
            't' => out.push('\t'),
            'r' => out.push('\r'),
            '0' => out.push('\0'),
            '\\' => out.push('\\'),
            '"' => out.push('"'),
            _ => return None,
        }
    }
    Some(out)
}

/// Tokenize `source`; the result always ends with [`TokenKind::Eof`]
///
/// Unrecognized input becomes [`TokenKind::Error`] tokens so the caller can
/// report every one of them.
#[must_use]
pub fn tokenize(source: &str) -> Vec<Token> {
    let mut lexer = TokenKind::lexer(source);
    let mut tokens = Vec::new();
    while let Some(result) = lexer.next() {
        let range = lexer.span();
        let span = Span::new(range.start, range.end);
        let kind = result.unwrap_or(TokenKind::Error);
        tokens.push(Token { kind, span });
    }
    tokens.push(Token {
        kind: TokenKind::Eof,
        span: Span::new(source.len(), source.len()),
    });
    tokens
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        tokenize(source).into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn keywords_and_idents() {
        assert_eq!(
            kinds("type Player { fn typed() }"),
            vec![
                TokenKind::Type,
                TokenKind::Ident("Player".into()),
                TokenKind::LBrace,
                TokenKind::Fn,
                TokenKind::Ident("typed".into()),
                TokenKind::LParen,
                TokenKind::RParen,
                TokenKind::RBrace,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn literals() {
        assert_eq!(
            kinds(r#"1_000 2.5 "a\"b\n""#),
            vec![
                TokenKind::Int(1000),
                TokenKind::Float(2.5),
                TokenKind::Str("a\"b\n".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn operators_prefer_longest() {
        assert_eq!(
            kinds("-> == != <= >= && || = < !"),
            vec![
                TokenKind::Arrow,
                TokenKind::EqEq,
                TokenKind::NotEq,
                TokenKind::Le,
                TokenKind::Ge,
                TokenKind::AndAnd,
                TokenKind::OrOr,
                TokenKind::Assign,
                TokenKind::Lt,
                TokenKind::Bang,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn comments_are_skipped() {
        assert_eq!(
            kinds("// line\nfn /* block */ x"),
            vec![TokenKind::Fn, TokenKind::Ident("x".into()), TokenKind::Eof]
        );
    }

    #[test]
    fn invalid_characters_become_error_tokens() {
        let tokens = tokenize("let x = 1 @ 2;");
        let error = tokens
            .iter()
            .find(|t| t.kind == TokenKind::Error)
            .expect("error token");
        assert_eq!(error.span, Span::new(10, 11));
    }
}
