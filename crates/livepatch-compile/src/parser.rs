//! Recursive-descent parser
//!
//! The parser keeps going after an error by skipping to the next `type`
//! declaration, so one bad member does not hide problems further down the
//! file.

use crate::ast::{Block, Expr, ExprKind, FnDecl, Param, SourceFile, Span, Stmt, TypeDecl, TypeRef};
use crate::diagnostic::{codes, Diagnostic, LineIndex};
use crate::lexer::{tokenize, Token, TokenKind};
use livepatch_runtime::{BinaryOp, UnaryOp};
use std::mem::discriminant;
use std::path::PathBuf;

/// Deepest nesting of blocks and expressions the parser accepts
pub const MAX_NESTING: usize = 256;

/// Result type for parsing operations
pub type ParseResult<T> = Result<T, ParseError>;

/// A syntax error
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParseError {
    /// A specific token was required
    #[error("expected {expected}, found {found}")]
    ExpectedToken {
        /// What was required
        expected: String,
        /// What was there
        found: String,
        /// Where
        span: Span,
    },

    /// Token cannot start or continue the current construct
    #[error("unexpected {found}, expected {expected}")]
    UnexpectedToken {
        /// What was there
        found: String,
        /// What would have been accepted
        expected: String,
        /// Where
        span: Span,
    },

    /// Blocks or expressions nested past [`MAX_NESTING`]
    #[error("{what} nested too deeply (limit {MAX_NESTING})")]
    TooDeep {
        /// `expression` or `block`
        what: &'static str,
        /// Where the limit was hit
        span: Span,
    },

    /// Input the lexer could not match
    #[error("invalid character `{text}`")]
    InvalidCharacter {
        /// Offending text
        text: String,
        /// Where
        span: Span,
    },
}

impl ParseError {
    fn expected_token(expected: &TokenKind, found: &Token) -> Self {
        Self::ExpectedToken {
            expected: expected.to_string(),
            found: found.kind.to_string(),
            span: found.span,
        }
    }

    fn unexpected_token(found: &Token, expected: &str) -> Self {
        Self::UnexpectedToken {
            found: found.kind.to_string(),
            expected: expected.to_string(),
            span: found.span,
        }
    }

    /// Location in the source
    #[must_use]
    pub fn span(&self) -> Span {
        match self {
            Self::ExpectedToken { span, .. }
            | Self::UnexpectedToken { span, .. }
            | Self::TooDeep { span, .. }
            | Self::InvalidCharacter { span, .. } => *span,
        }
    }

    /// Diagnostic code
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidCharacter { .. } => codes::INVALID_CHARACTER,
            _ => codes::SYNTAX,
        }
    }

    /// Convert into a diagnostic
    #[must_use]
    pub fn to_diagnostic(&self, index: &LineIndex) -> Diagnostic {
        Diagnostic::error(self.code(), index.span_location(self.span()), self.to_string())
    }
}

/// Parse one file; syntax errors are returned alongside whatever parsed
#[must_use]
pub fn parse(path: impl Into<PathBuf>, source: &str) -> (SourceFile, Vec<ParseError>) {
    let mut errors = Vec::new();
    let tokens: Vec<Token> = tokenize(source)
        .into_iter()
        .filter(|token| {
            if token.kind != TokenKind::Error {
                return true;
            }
            errors.push(ParseError::InvalidCharacter {
                text: source
                    .get(token.span.start..token.span.end)
                    .unwrap_or_default()
                    .to_string(),
                span: token.span,
            });
            false
        })
        .collect();

    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
        errors,
    };
    let file = parser.parse_file(path.into());
    (file, parser.errors)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
    errors: Vec<ParseError>,
}

impl Parser {
    fn parse_file(&mut self, path: PathBuf) -> SourceFile {
        let mut namespace = None;
        if self.check(&TokenKind::Namespace) {
            match self.parse_namespace() {
                Ok(ns) => namespace = Some(ns),
                Err(e) => {
                    self.errors.push(e);
                    self.recover_to_item();
                }
            }
        }

        let mut types = Vec::new();
        while !self.is_eof() {
            if self.check(&TokenKind::Type) {
                match self.parse_type() {
                    Ok(ty) => types.push(ty),
                    Err(e) => {
                        self.errors.push(e);
                        self.recover_to_item();
                    }
                }
            } else {
                let token = self.advance();
                self.errors
                    .push(ParseError::unexpected_token(&token, "`type` declaration"));
                self.recover_to_item();
            }
        }

        SourceFile {
            path,
            namespace,
            types,
        }
    }

    fn parse_namespace(&mut self) -> ParseResult<String> {
        self.expect(&TokenKind::Namespace)?;
        let (name, _) = self.parse_dotted()?;
        self.expect(&TokenKind::Semi)?;
        Ok(name)
    }

    fn parse_type(&mut self) -> ParseResult<TypeDecl> {
        self.expect(&TokenKind::Type)?;
        let (name, span) = self.expect_ident()?;
        self.expect(&TokenKind::LBrace)?;

        let mut methods = Vec::new();
        while !self.check(&TokenKind::RBrace) && !self.is_eof() {
            methods.push(self.parse_fn()?);
        }
        self.expect(&TokenKind::RBrace)?;

        Ok(TypeDecl {
            name,
            span,
            methods,
        })
    }

    fn parse_fn(&mut self) -> ParseResult<FnDecl> {
        let mut attributes = Vec::new();
        while self.eat(&TokenKind::Hash) {
            self.expect(&TokenKind::LBracket)?;
            let (attr, _) = self.expect_ident()?;
            self.expect(&TokenKind::RBracket)?;
            attributes.push(attr);
        }

        let mut is_public = false;
        let mut is_static = false;
        let mut unsafe_span = None;
        loop {
            match self.peek().kind {
                TokenKind::Pub => is_public = true,
                TokenKind::Static => is_static = true,
                TokenKind::Unsafe => unsafe_span = Some(self.peek().span),
                _ => break,
            }
            self.advance();
        }

        self.expect(&TokenKind::Fn)?;
        let (name, span) = self.expect_ident()?;

        self.expect(&TokenKind::LParen)?;
        let mut params = Vec::new();
        while !self.check(&TokenKind::RParen) {
            let (param, param_span) = self.expect_ident()?;
            self.expect(&TokenKind::Colon)?;
            let ty = self.parse_type_ref()?;
            params.push(Param {
                name: param,
                ty,
                span: param_span,
            });
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(&TokenKind::RParen)?;

        let return_type = if self.eat(&TokenKind::Arrow) {
            Some(self.parse_type_ref()?)
        } else {
            None
        };
        let body = self.parse_block()?;

        Ok(FnDecl {
            name,
            span,
            attributes,
            is_public,
            is_static,
            unsafe_span,
            params,
            return_type,
            body,
        })
    }

    fn parse_type_ref(&mut self) -> ParseResult<TypeRef> {
        let (name, span) = self.parse_dotted()?;
        Ok(TypeRef { name, span })
    }

    fn parse_dotted(&mut self) -> ParseResult<(String, Span)> {
        let (mut name, mut span) = self.expect_ident()?;
        while self.eat(&TokenKind::Dot) {
            let (segment, segment_span) = self.expect_ident()?;
            name.push('.');
            name.push_str(&segment);
            span = span.to(segment_span);
        }
        Ok((name, span))
    }

    fn parse_block(&mut self) -> ParseResult<Block> {
        self.enter("block")?;
        let start = self.expect(&TokenKind::LBrace)?;
        let mut stmts = Vec::new();
        while !self.check(&TokenKind::RBrace) && !self.is_eof() {
            stmts.push(self.parse_stmt()?);
        }
        let end = self.expect(&TokenKind::RBrace)?;
        self.leave(1);
        Ok(Block {
            stmts,
            span: start.to(end),
        })
    }

    fn parse_stmt(&mut self) -> ParseResult<Stmt> {
        let kind = self.peek().kind.clone();
        match kind {
            TokenKind::Let => {
                self.advance();
                let (name, span) = self.expect_ident()?;
                let ty = if self.eat(&TokenKind::Colon) {
                    Some(self.parse_type_ref()?)
                } else {
                    None
                };
                self.expect(&TokenKind::Assign)?;
                let value = self.parse_expr()?;
                self.expect(&TokenKind::Semi)?;
                Ok(Stmt::Let {
                    name,
                    ty,
                    value,
                    span,
                })
            }
            TokenKind::Return => {
                let span = self.advance().span;
                let value = if self.check(&TokenKind::Semi) {
                    None
                } else {
                    Some(self.parse_expr()?)
                };
                self.expect(&TokenKind::Semi)?;
                Ok(Stmt::Return { value, span })
            }
            TokenKind::If => self.parse_if(),
            TokenKind::While => {
                self.advance();
                let cond = self.parse_expr()?;
                let body = self.parse_block()?;
                Ok(Stmt::While { cond, body })
            }
            TokenKind::Hash | TokenKind::Pub | TokenKind::Static | TokenKind::Unsafe | TokenKind::Fn => {
                Ok(Stmt::LocalFn(Box::new(self.parse_fn()?)))
            }
            TokenKind::Ident(_) if self.peek_kind(1) == &TokenKind::Assign => {
                let (name, span) = self.expect_ident()?;
                self.expect(&TokenKind::Assign)?;
                let value = self.parse_expr()?;
                self.expect(&TokenKind::Semi)?;
                Ok(Stmt::Assign { name, value, span })
            }
            _ => {
                let expr = self.parse_expr()?;
                self.expect(&TokenKind::Semi)?;
                Ok(Stmt::Expr(expr))
            }
        }
    }

    fn parse_if(&mut self) -> ParseResult<Stmt> {
        self.enter("block")?;
        self.expect(&TokenKind::If)?;
        let cond = self.parse_expr()?;
        let then_block = self.parse_block()?;

        let else_block = if self.eat(&TokenKind::Else) {
            if self.check(&TokenKind::If) {
                let start = self.peek().span;
                let nested = self.parse_if()?;
                let end = self.previous_span();
                Some(Block {
                    stmts: vec![nested],
                    span: start.to(end),
                })
            } else {
                Some(self.parse_block()?)
            }
        } else {
            None
        };

        self.leave(1);
        Ok(Stmt::If {
            cond,
            then_block,
            else_block,
        })
    }

    fn parse_expr(&mut self) -> ParseResult<Expr> {
        self.parse_binary(1)
    }

    fn parse_binary(&mut self, min_prec: u8) -> ParseResult<Expr> {
        let mut lhs = self.parse_unary()?;
        let mut chained = 0;
        while let Some((op, prec)) = binary_op(&self.peek().kind) {
            if prec < min_prec {
                break;
            }
            // each operator adds a level to the left spine
            self.enter("expression")?;
            chained += 1;
            self.advance();
            let rhs = self.parse_binary(prec + 1)?;
            let span = lhs.span.to(rhs.span);
            lhs = Expr::new(
                ExprKind::Binary {
                    op,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                },
                span,
            );
        }
        self.leave(chained);
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> ParseResult<Expr> {
        let op = match self.peek().kind {
            TokenKind::Minus => UnaryOp::Neg,
            TokenKind::Bang => UnaryOp::Not,
            _ => return self.parse_primary(),
        };
        self.enter("expression")?;
        let start = self.advance().span;
        let operand = self.parse_unary()?;
        self.leave(1);
        let span = start.to(operand.span);
        Ok(Expr::new(
            ExprKind::Unary {
                op,
                operand: Box::new(operand),
            },
            span,
        ))
    }

    fn parse_primary(&mut self) -> ParseResult<Expr> {
        let token = self.advance();
        let kind = match token.kind {
            TokenKind::Int(v) => ExprKind::Int(v),
            TokenKind::Float(v) => ExprKind::Float(v),
            TokenKind::Str(s) => ExprKind::Str(s),
            TokenKind::True => ExprKind::Bool(true),
            TokenKind::False => ExprKind::Bool(false),
            TokenKind::LParen => {
                self.enter("expression")?;
                let inner = self.parse_expr()?;
                let end = self.expect(&TokenKind::RParen)?;
                self.leave(1);
                return Ok(Expr::new(inner.kind, token.span.to(end)));
            }
            TokenKind::Ident(first) => return self.parse_path_expr(first, token.span),
            _ => return Err(ParseError::unexpected_token(&token, "expression")),
        };
        Ok(Expr::new(kind, token.span))
    }

    fn parse_path_expr(&mut self, first: String, start: Span) -> ParseResult<Expr> {
        let mut path = vec![first];
        let mut span = start;
        while self.eat(&TokenKind::Dot) {
            let (segment, segment_span) = self.expect_ident()?;
            path.push(segment);
            span = span.to(segment_span);
        }

        if !self.check(&TokenKind::LParen) {
            if path.len() == 1 {
                return Ok(Expr::new(ExprKind::Var(path.remove(0)), span));
            }
            return Err(ParseError::expected_token(&TokenKind::LParen, self.peek()));
        }

        self.enter("expression")?;
        self.advance();
        let mut args = Vec::new();
        while !self.check(&TokenKind::RParen) {
            args.push(self.parse_expr()?);
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        let end = self.expect(&TokenKind::RParen)?;
        self.leave(1);
        Ok(Expr::new(ExprKind::Call { path, args }, span.to(end)))
    }

    // Nesting

    fn enter(&mut self, what: &'static str) -> ParseResult<()> {
        if self.depth >= MAX_NESTING {
            return Err(ParseError::TooDeep {
                what,
                span: self.peek().span,
            });
        }
        self.depth += 1;
        Ok(())
    }

    fn leave(&mut self, levels: usize) {
        self.depth = self.depth.saturating_sub(levels);
    }

    // Token helpers

    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek_kind(&self, ahead: usize) -> &TokenKind {
        let index = (self.pos + ahead).min(self.tokens.len() - 1);
        &self.tokens[index].kind
    }

    fn previous_span(&self) -> Span {
        self.pos
            .checked_sub(1)
            .map_or_else(Span::default, |i| self.tokens[i].span)
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if token.kind != TokenKind::Eof {
            self.pos += 1;
        }
        token
    }

    fn is_eof(&self) -> bool {
        self.peek().kind == TokenKind::Eof
    }

    fn check(&self, kind: &TokenKind) -> bool {
        discriminant(&self.peek().kind) == discriminant(kind)
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: &TokenKind) -> ParseResult<Span> {
        if self.check(kind) {
            Ok(self.advance().span)
        } else {
            Err(ParseError::expected_token(kind, self.peek()))
        }
    }

    fn expect_ident(&mut self) -> ParseResult<(String, Span)> {
        if let TokenKind::Ident(name) = &self.peek().kind {
            let name = name.clone();
            let span = self.advance().span;
            Ok((name, span))
        } else {
            Err(ParseError::unexpected_token(self.peek(), "identifier"))
        }
    }

    fn recover_to_item(&mut self) {
        // errors unwind past `leave`
        self.depth = 0;
        while !self.is_eof() && !self.check(&TokenKind::Type) {
            self.advance();
        }
    }
}

fn binary_op(kind: &TokenKind) -> Option<(BinaryOp, u8)> {
    Some(match kind {
        TokenKind::OrOr => (BinaryOp::Or, 1),
        TokenKind::AndAnd => (BinaryOp::And, 2),
        TokenKind::EqEq => (BinaryOp::Eq, 3),
        TokenKind::NotEq => (BinaryOp::Ne, 3),
        TokenKind::Lt => (BinaryOp::Lt, 4),
        TokenKind::Le => (BinaryOp::Le, 4),
        TokenKind::Gt => (BinaryOp::Gt, 4),
        TokenKind::Ge => (BinaryOp::Ge, 4),
        TokenKind::Plus => (BinaryOp::Add, 5),
        TokenKind::Minus => (BinaryOp::Sub, 5),
        TokenKind::Star => (BinaryOp::Mul, 6),
        TokenKind::Slash => (BinaryOp::Div, 6),
        TokenKind::Percent => (BinaryOp::Rem, 6),
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn parse_ok(source: &str) -> SourceFile {
        let (file, errors) = parse("test.src", source);
        assert!(errors.is_empty(), "unexpected errors: {errors:?}");
        file
    }

    #[test]
    fn namespace_and_members() {
        let file = parse_ok(
            "namespace Game.Core;
             type Player {
                 #[no_patch]
                 pub static fn id() -> str { return \"p\"; }
                 unsafe fn raw(x: int, y: Game.Vec2) { }
             }",
        );
        assert_eq!(file.namespace.as_deref(), Some("Game.Core"));
        let player = &file.types[0];
        assert_eq!(player.name, "Player");

        let id = &player.methods[0];
        assert!(id.is_no_patch());
        assert!(id.is_public && id.is_static);
        assert_eq!(id.return_type.as_ref().map(|t| t.name.as_str()), Some("str"));

        let raw = &player.methods[1];
        assert!(raw.unsafe_span.is_some());
        assert_eq!(raw.params[1].ty.name, "Game.Vec2");
        assert!(raw.return_type.is_none());
    }

    #[test]
    fn precedence_and_associativity() {
        let file = parse_ok("type T { fn f() -> int { return 1 + 2 * 3 - 4; } }");
        let Stmt::Return { value: Some(expr), .. } = &file.types[0].methods[0].body.stmts[0] else {
            panic!("expected return");
        };
        // (1 + (2 * 3)) - 4
        let ExprKind::Binary { op: BinaryOp::Sub, lhs, .. } = &expr.kind else {
            panic!("expected subtraction at the root, got {expr:?}");
        };
        assert!(matches!(lhs.kind, ExprKind::Binary { op: BinaryOp::Add, .. }));
    }

    #[test]
    fn statements() {
        let file = parse_ok(
            "type T {
                fn f(n: int) -> int {
                    let x: int = 0;
                    x = x + n;
                    fn helper(a: int) -> int { return a; }
                    if x > 3 { return helper(x); } else if x < 0 { return 0; } else { x = 1; }
                    while x < 10 { x = x * 2; }
                    T.g();
                    return x;
                }
             }",
        );
        let stmts = &file.types[0].methods[0].body.stmts;
        assert!(matches!(stmts[0], Stmt::Let { ty: Some(_), .. }));
        assert!(matches!(stmts[1], Stmt::Assign { .. }));
        assert!(matches!(stmts[2], Stmt::LocalFn(_)));
        let Stmt::If { else_block: Some(else_block), .. } = &stmts[3] else {
            panic!("expected if/else");
        };
        assert!(matches!(else_block.stmts[0], Stmt::If { .. }));
        assert!(matches!(stmts[4], Stmt::While { .. }));
        let Stmt::Expr(Expr { kind: ExprKind::Call { path, .. }, .. }) = &stmts[5] else {
            panic!("expected call");
        };
        assert_eq!(path, &vec!["T".to_string(), "g".to_string()]);
    }

    #[test]
    fn missing_semicolon_is_reported() {
        let (_, errors) = parse("Bad.src", "type T { fn f() -> int { return 1 } }");
        assert_eq!(errors.len(), 1);
        assert!(matches!(&errors[0], ParseError::ExpectedToken { expected, .. } if expected == "`;`"));
    }

    #[test]
    fn recovers_at_next_type() {
        let (file, errors) = parse(
            "x.src",
            "type A { fn f( } type B { fn g() { } }",
        );
        assert_eq!(errors.len(), 1);
        assert_eq!(file.types.len(), 1);
        assert_eq!(file.types[0].name, "B");
    }

    #[test]
    fn invalid_characters_are_collected() {
        let (_, errors) = parse("x.src", "type A { fn f() { let x = 1 $ 2; } }");
        assert!(errors
            .iter()
            .any(|e| matches!(e, ParseError::InvalidCharacter { text, .. } if text == "$")));
    }

    fn nested(depth: usize, open: &str, close: &str) -> String {
        format!(
            "type D {{ fn m() -> int {{ return {}1{}; }} }} type E {{ fn n() {{ }} }}",
            open.repeat(depth),
            close.repeat(depth)
        )
    }

    #[test]
    fn deep_nesting_is_an_error_not_a_crash() {
        for source in [
            nested(10_000, "(", ")"),
            nested(10_000, "-", ""),
            nested(10_000, "D.m(", ")"),
            format!("type D {{ fn m() -> int {{ return 1{}; }} }} type E {{ fn n() {{ }} }}", " + 1".repeat(10_000)),
        ] {
            let (file, errors) = parse("deep.src", &source);
            assert_eq!(errors.len(), 1, "{errors:?}");
            assert!(matches!(errors[0], ParseError::TooDeep { what: "expression", .. }));
            assert_eq!(errors[0].code(), codes::SYNTAX);
            assert_eq!(file.types.len(), 1);
            assert_eq!(file.types[0].name, "E");
        }
    }

    #[test]
    fn deep_blocks_are_an_error() {
        let depth = MAX_NESTING + 10;
        let source = format!(
            "type D {{ fn m() {{ {}{} }} }}",
            "while true { ".repeat(depth),
            "}".repeat(depth)
        );
        let (_, errors) = parse("deep.src", &source);
        assert!(matches!(errors[0], ParseError::TooDeep { what: "block", .. }));

        let chain = format!(
            "type D {{ fn m() -> int {{ {} return 0; }} }}",
            "if true { return 1; } else ".repeat(depth).trim_end_matches("else ")
        );
        let (_, errors) = parse("chain.src", &chain);
        assert!(matches!(errors[0], ParseError::TooDeep { what: "block", .. }));
    }

    #[test]
    fn nesting_just_under_the_limit_parses() {
        parse_ok(&nested(MAX_NESTING - 8, "(", ")").replace(" type E { fn n() { } }", ""));
    }

    #[test]
    fn member_access_without_call_is_an_error() {
        let (_, errors) = parse("x.src", "type A { fn f() { let x = A.b; } }");
        assert_eq!(errors.len(), 1);
    }
}
