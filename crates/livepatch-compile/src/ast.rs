//! Syntax tree

use livepatch_runtime::{BinaryOp, UnaryOp};
use std::path::PathBuf;

/// Byte range in a source file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Span {
    /// Start offset, inclusive
    pub start: usize,
    /// End offset, exclusive
    pub end: usize,
}

impl Span {
    /// Create a span
    #[inline]
    #[must_use]
    pub const fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Smallest span covering both
    #[inline]
    #[must_use]
    pub fn to(self, other: Span) -> Span {
        Span::new(self.start.min(other.start), self.end.max(other.end))
    }
}

/// One parsed source file
#[derive(Debug, Clone, PartialEq)]
pub struct SourceFile {
    /// Path the text was read from
    pub path: PathBuf,
    /// `namespace` declaration, if any
    pub namespace: Option<String>,
    /// Declared types
    pub types: Vec<TypeDecl>,
}

/// `type Name { ... }`
#[derive(Debug, Clone, PartialEq)]
pub struct TypeDecl {
    /// Simple name
    pub name: String,
    /// Span of the name
    pub span: Span,
    /// Declared methods
    pub methods: Vec<FnDecl>,
}

/// Function declaration, as a type member or a local function
#[derive(Debug, Clone, PartialEq)]
pub struct FnDecl {
    /// Name
    pub name: String,
    /// Span of the name
    pub span: Span,
    /// `#[...]` attribute names
    pub attributes: Vec<String>,
    /// `pub`
    pub is_public: bool,
    /// `static`
    pub is_static: bool,
    /// `unsafe`, with the span of the keyword
    pub unsafe_span: Option<Span>,
    /// Parameters
    pub params: Vec<Param>,
    /// Declared return type; `None` means `unit`
    pub return_type: Option<TypeRef>,
    /// Body
    pub body: Block,
}

impl FnDecl {
    /// Whether the never-patch attribute is present
    #[must_use]
    pub fn is_no_patch(&self) -> bool {
        self.attributes.iter().any(|a| a == "no_patch")
    }
}

/// Function parameter
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    /// Name
    pub name: String,
    /// Declared type
    pub ty: TypeRef,
    /// Span of the name
    pub span: Span,
}

/// Possibly dotted type name as written
#[derive(Debug, Clone, PartialEq)]
pub struct TypeRef {
    /// Name as written, e.g. `int` or `Game.Vec2`
    pub name: String,
    /// Span
    pub span: Span,
}

/// `{ ... }`
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Block {
    /// Statements
    pub stmts: Vec<Stmt>,
    /// Span including braces
    pub span: Span,
}

/// Statement
#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    /// `let name (: ty)? = value;`
    Let {
        /// Variable name
        name: String,
        /// Optional annotation
        ty: Option<TypeRef>,
        /// Initializer
        value: Expr,
        /// Span of the name
        span: Span,
    },
    /// `name = value;`
    Assign {
        /// Variable name
        name: String,
        /// New value
        value: Expr,
        /// Span of the name
        span: Span,
    },
    /// `return value?;`
    Return {
        /// Returned value
        value: Option<Expr>,
        /// Span of the keyword
        span: Span,
    },
    /// `if cond { .. } else { .. }`
    If {
        /// Condition
        cond: Expr,
        /// Then block
        then_block: Block,
        /// Else block; `else if` nests another `If` inside
        else_block: Option<Block>,
    },
    /// `while cond { .. }`
    While {
        /// Condition
        cond: Expr,
        /// Body
        body: Block,
    },
    /// Nested function declaration
    LocalFn(Box<FnDecl>),
    /// Expression evaluated for effect
    Expr(Expr),
}

/// Expression with its span
#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    /// Kind
    pub kind: ExprKind,
    /// Span
    pub span: Span,
}

impl Expr {
    /// Create an expression
    #[inline]
    #[must_use]
    pub fn new(kind: ExprKind, span: Span) -> Self {
        Self { kind, span }
    }
}

/// Expression kinds
#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    /// Integer literal
    Int(i64),
    /// Float literal
    Float(f64),
    /// String literal
    Str(String),
    /// `true` / `false`
    Bool(bool),
    /// Variable reference
    Var(String),
    /// Unary operation
    Unary {
        /// Operator
        op: UnaryOp,
        /// Operand
        operand: Box<Expr>,
    },
    /// Binary operation
    Binary {
        /// Operator
        op: BinaryOp,
        /// Left operand
        lhs: Box<Expr>,
        /// Right operand
        rhs: Box<Expr>,
    },
    /// `f(..)` or `Ns.Type.f(..)`
    Call {
        /// Path segments; the last is the method name
        path: Vec<String>,
        /// Arguments
        args: Vec<Expr>,
    },
}
