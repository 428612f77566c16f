//! Lowered method bodies
//!
//! Bodies are a small tree IR over numbered local slots. Parameters occupy
//! slots `0..arity`; every other local gets a slot assigned at lowering time.
//! Calls name their target by [`MethodHandle`] so they resolve through the
//! detour table at execution time.

use crate::error::RuntimeError;
use crate::handle::MethodHandle;
use crate::value::Value;
use std::cmp::Ordering;

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    /// `+`
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/`
    Div,
    /// `%`
    Rem,
    /// `==`
    Eq,
    /// `!=`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
    /// `&&`
    And,
    /// `||`
    Or,
}

impl BinaryOp {
    /// Source symbol
    #[must_use]
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Rem => "%",
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::And => "&&",
            Self::Or => "||",
        }
    }

    /// Whether the operator yields `bool` regardless of operand type
    #[must_use]
    pub const fn is_comparison(self) -> bool {
        matches!(
            self,
            Self::Eq | Self::Ne | Self::Lt | Self::Le | Self::Gt | Self::Ge
        )
    }

    /// Whether the operator only accepts `bool` operands
    #[must_use]
    pub const fn is_logical(self) -> bool {
        matches!(self, Self::And | Self::Or)
    }

    /// Evaluate the operator on two values
    ///
    /// Both operands must have the same type. Integer arithmetic is checked.
    pub fn apply(self, lhs: &Value, rhs: &Value) -> Result<Value, RuntimeError> {
        let mismatch = || RuntimeError::TypeMismatch {
            op: self.symbol(),
            lhs: lhs.type_name(),
            rhs: rhs.type_name(),
        };

        match (lhs, rhs) {
            (Value::Int(a), Value::Int(b)) => self.apply_int(*a, *b),
            (Value::Float(a), Value::Float(b)) => self.apply_float(*a, *b).ok_or_else(mismatch),
            (Value::Str(a), Value::Str(b)) => match self {
                Self::Add => Ok(Value::Str(format!("{a}{b}"))),
                _ if self.is_comparison() => Ok(Value::Bool(compare(self, a.cmp(b)))),
                _ => Err(mismatch()),
            },
            (Value::Bool(a), Value::Bool(b)) => match self {
                Self::And => Ok(Value::Bool(*a && *b)),
                Self::Or => Ok(Value::Bool(*a || *b)),
                Self::Eq => Ok(Value::Bool(a == b)),
                Self::Ne => Ok(Value::Bool(a != b)),
                _ => Err(mismatch()),
            },
            (Value::Unit, Value::Unit) => match self {
                Self::Eq => Ok(Value::Bool(true)),
                Self::Ne => Ok(Value::Bool(false)),
                _ => Err(mismatch()),
            },
            _ => Err(mismatch()),
        }
    }

    fn apply_int(self, a: i64, b: i64) -> Result<Value, RuntimeError> {
        let arith = |r: Option<i64>| r.map(Value::Int).ok_or(RuntimeError::Overflow);
        match self {
            Self::Add => arith(a.checked_add(b)),
            Self::Sub => arith(a.checked_sub(b)),
            Self::Mul => arith(a.checked_mul(b)),
            Self::Div | Self::Rem if b == 0 => Err(RuntimeError::DivisionByZero),
            Self::Div => arith(a.checked_div(b)),
            Self::Rem => arith(a.checked_rem(b)),
            Self::And | Self::Or => Err(RuntimeError::TypeMismatch {
                op: self.symbol(),
                lhs: "int",
                rhs: "int",
            }),
            _ => Ok(Value::Bool(compare(self, a.cmp(&b)))),
        }
    }

    fn apply_float(self, a: f64, b: f64) -> Option<Value> {
        Some(match self {
            Self::Add => Value::Float(a + b),
            Self::Sub => Value::Float(a - b),
            Self::Mul => Value::Float(a * b),
            Self::Div => Value::Float(a / b),
            Self::Rem => Value::Float(a % b),
            Self::Eq => Value::Bool(a == b),
            Self::Ne => Value::Bool(a != b),
            Self::Lt => Value::Bool(a < b),
            Self::Le => Value::Bool(a <= b),
            Self::Gt => Value::Bool(a > b),
            Self::Ge => Value::Bool(a >= b),
            Self::And | Self::Or => return None,
        })
    }
}

fn compare(op: BinaryOp, ord: Ordering) -> bool {
    match op {
        BinaryOp::Eq => ord == Ordering::Equal,
        BinaryOp::Ne => ord != Ordering::Equal,
        BinaryOp::Lt => ord == Ordering::Less,
        BinaryOp::Le => ord != Ordering::Greater,
        BinaryOp::Gt => ord == Ordering::Greater,
        BinaryOp::Ge => ord != Ordering::Less,
        _ => false,
    }
}

/// Unary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    /// `-`
    Neg,
    /// `!`
    Not,
}

impl UnaryOp {
    /// Source symbol
    #[must_use]
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::Neg => "-",
            Self::Not => "!",
        }
    }

    /// Evaluate the operator
    pub fn apply(self, operand: &Value) -> Result<Value, RuntimeError> {
        match (self, operand) {
            (Self::Neg, Value::Int(v)) => v.checked_neg().map(Value::Int).ok_or(RuntimeError::Overflow),
            (Self::Neg, Value::Float(v)) => Ok(Value::Float(-v)),
            (Self::Not, Value::Bool(v)) => Ok(Value::Bool(!v)),
            _ => Err(RuntimeError::TypeMismatch {
                op: self.symbol(),
                lhs: operand.type_name(),
                rhs: "-",
            }),
        }
    }
}

/// Expression
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Literal value
    Const(Value),
    /// Read a local slot
    Load(usize),
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
    /// Method call
    Call {
        /// Callee
        target: MethodHandle,
        /// Arguments in parameter order
        args: Vec<Expr>,
    },
}

impl Expr {
    /// Literal constant
    #[inline]
    #[must_use]
    pub fn constant(value: impl Into<Value>) -> Self {
        Self::Const(value.into())
    }

    /// Binary expression
    #[inline]
    #[must_use]
    pub fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Self {
        Self::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    /// Unary expression
    #[inline]
    #[must_use]
    pub fn unary(op: UnaryOp, operand: Expr) -> Self {
        Self::Unary {
            op,
            operand: Box::new(operand),
        }
    }

    /// Call expression
    #[inline]
    #[must_use]
    pub fn call(target: MethodHandle, args: Vec<Expr>) -> Self {
        Self::Call { target, args }
    }

    /// Constant value of this expression, if it is a literal
    #[inline]
    #[must_use]
    pub fn as_const(&self) -> Option<&Value> {
        match self {
            Self::Const(v) => Some(v),
            _ => None,
        }
    }

    /// Visit every call target in this expression
    pub fn for_each_call(&self, f: &mut impl FnMut(MethodHandle)) {
        match self {
            Self::Const(_) | Self::Load(_) => {}
            Self::Unary { operand, .. } => operand.for_each_call(f),
            Self::Binary { lhs, rhs, .. } => {
                lhs.for_each_call(f);
                rhs.for_each_call(f);
            }
            Self::Call { target, args } => {
                f(*target);
                for arg in args {
                    arg.for_each_call(f);
                }
            }
        }
    }
}

/// Statement
#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    /// Write a local slot
    Store {
        /// Destination slot
        slot: usize,
        /// Value
        value: Expr,
    },
    /// Evaluate for side effects
    Eval(Expr),
    /// Leave the method
    Return(Option<Expr>),
    /// Conditional
    If {
        /// Condition, must be `bool`
        cond: Expr,
        /// Taken when true
        then_branch: Vec<Stmt>,
        /// Taken when false
        else_branch: Vec<Stmt>,
    },
    /// Loop
    While {
        /// Condition, must be `bool`
        cond: Expr,
        /// Loop body
        body: Vec<Stmt>,
    },
}

impl Stmt {
    /// Visit every call target in this statement
    pub fn for_each_call(&self, f: &mut impl FnMut(MethodHandle)) {
        match self {
            Self::Store { value, .. } | Self::Eval(value) => value.for_each_call(f),
            Self::Return(value) => {
                if let Some(value) = value {
                    value.for_each_call(f);
                }
            }
            Self::If {
                cond,
                then_branch,
                else_branch,
            } => {
                cond.for_each_call(f);
                then_branch
                    .iter()
                    .chain(else_branch)
                    .for_each(|s| s.for_each_call(f));
            }
            Self::While { cond, body } => {
                cond.for_each_call(f);
                body.iter().for_each(|s| s.for_each_call(f));
            }
        }
    }
}

/// Lowered method body
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Body {
    /// Number of local slots, parameters included
    pub slot_count: usize,
    /// Top-level statements
    pub stmts: Vec<Stmt>,
}

impl Body {
    /// Create a body
    #[inline]
    #[must_use]
    pub fn new(slot_count: usize, stmts: Vec<Stmt>) -> Self {
        Self { slot_count, stmts }
    }

    /// All distinct call targets, in first-seen order
    #[must_use]
    pub fn callees(&self) -> Vec<MethodHandle> {
        let mut out = Vec::new();
        for stmt in &self.stmts {
            stmt.for_each_call(&mut |h| {
                if !out.contains(&h) {
                    out.push(h);
                }
            });
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int_arithmetic_is_checked() {
        assert_eq!(
            BinaryOp::Add.apply(&Value::Int(2), &Value::Int(3)),
            Ok(Value::Int(5))
        );
        assert_eq!(
            BinaryOp::Add.apply(&Value::Int(i64::MAX), &Value::Int(1)),
            Err(RuntimeError::Overflow)
        );
        assert_eq!(
            BinaryOp::Div.apply(&Value::Int(1), &Value::Int(0)),
            Err(RuntimeError::DivisionByZero)
        );
        assert_eq!(
            BinaryOp::Rem.apply(&Value::Int(7), &Value::Int(3)),
            Ok(Value::Int(1))
        );
    }

    #[test]
    fn string_concat_and_compare() {
        assert_eq!(
            BinaryOp::Add.apply(&"a".into(), &"b".into()),
            Ok(Value::from("ab"))
        );
        assert_eq!(
            BinaryOp::Lt.apply(&"a".into(), &"b".into()),
            Ok(Value::Bool(true))
        );
        assert!(BinaryOp::Sub.apply(&"a".into(), &"b".into()).is_err());
    }

    #[test]
    fn mixed_operands_are_rejected() {
        let err = BinaryOp::Add
            .apply(&Value::Int(1), &Value::Float(1.0))
            .unwrap_err();
        assert_eq!(
            err,
            RuntimeError::TypeMismatch {
                op: "+",
                lhs: "int",
                rhs: "float"
            }
        );
    }

    #[test]
    fn unary_ops() {
        assert_eq!(UnaryOp::Neg.apply(&Value::Int(4)), Ok(Value::Int(-4)));
        assert_eq!(UnaryOp::Not.apply(&Value::Bool(true)), Ok(Value::Bool(false)));
        assert_eq!(
            UnaryOp::Neg.apply(&Value::Int(i64::MIN)),
            Err(RuntimeError::Overflow)
        );
        assert!(UnaryOp::Not.apply(&Value::Int(1)).is_err());
    }

    #[test]
    fn callees_are_deduplicated() {
        let a = MethodHandle::from_raw(1);
        let b = MethodHandle::from_raw(2);
        let body = Body::new(
            1,
            vec![
                Stmt::Eval(Expr::call(a, vec![Expr::call(b, vec![])])),
                Stmt::Return(Some(Expr::call(a, vec![Expr::Load(0)]))),
            ],
        );
        assert_eq!(body.callees(), vec![a, b]);
    }
}
