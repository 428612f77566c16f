//! Tree-walking interpreter for lowered bodies

use crate::error::RuntimeError;
use crate::handle::MethodHandle;
use crate::ir::{BinaryOp, Body, Expr, Stmt};
use crate::method::MethodBody;
use crate::program::Program;
use crate::value::Value;

/// Control flow out of a statement
enum Flow {
    Next,
    Return(Value),
}

/// Invoke `handle`, resolving it through the detour table first
pub(crate) fn call(
    program: &Program,
    handle: MethodHandle,
    args: Vec<Value>,
    depth: usize,
) -> Result<Value, RuntimeError> {
    if depth >= program.max_call_depth() {
        return Err(RuntimeError::CallDepthExceeded(program.max_call_depth()));
    }

    let target = program.detours().resolve(handle);
    let method = program
        .method(target)
        .ok_or(RuntimeError::UnknownMethod(target))?;

    let expected = method.signature().arity();
    if args.len() != expected {
        return Err(RuntimeError::ArityMismatch {
            method: method.signature().display_name(),
            expected,
            found: args.len(),
        });
    }

    match method.body() {
        MethodBody::Native(f) => f(&args),
        MethodBody::Interpreted(body) => Frame::new(program, body, args, depth).run(body),
    }
}

struct Frame<'p> {
    program: &'p Program,
    slots: Vec<Value>,
    depth: usize,
}

impl<'p> Frame<'p> {
    fn new(program: &'p Program, body: &Body, args: Vec<Value>, depth: usize) -> Self {
        let mut slots = args;
        slots.resize(body.slot_count.max(slots.len()), Value::Unit);
        Self {
            program,
            slots,
            depth,
        }
    }

    fn run(mut self, body: &Body) -> Result<Value, RuntimeError> {
        match self.exec_block(&body.stmts)? {
            Flow::Return(value) => Ok(value),
            Flow::Next => Ok(Value::Unit),
        }
    }

    fn exec_block(&mut self, stmts: &[Stmt]) -> Result<Flow, RuntimeError> {
        for stmt in stmts {
            if let Flow::Return(value) = self.exec(stmt)? {
                return Ok(Flow::Return(value));
            }
        }
        Ok(Flow::Next)
    }

    fn exec(&mut self, stmt: &Stmt) -> Result<Flow, RuntimeError> {
        match stmt {
            Stmt::Store { slot, value } => {
                let value = self.eval(value)?;
                *self.slot_mut(*slot)? = value;
                Ok(Flow::Next)
            }
            Stmt::Eval(expr) => {
                self.eval(expr)?;
                Ok(Flow::Next)
            }
            Stmt::Return(expr) => {
                let value = match expr {
                    Some(expr) => self.eval(expr)?,
                    None => Value::Unit,
                };
                Ok(Flow::Return(value))
            }
            Stmt::If {
                cond,
                then_branch,
                else_branch,
            } => {
                if self.condition(cond, "if")? {
                    self.exec_block(then_branch)
                } else {
                    self.exec_block(else_branch)
                }
            }
            Stmt::While { cond, body } => {
                while self.condition(cond, "while")? {
                    if let Flow::Return(value) = self.exec_block(body)? {
                        return Ok(Flow::Return(value));
                    }
                }
                Ok(Flow::Next)
            }
        }
    }

    fn condition(&mut self, cond: &Expr, op: &'static str) -> Result<bool, RuntimeError> {
        let value = self.eval(cond)?;
        value.as_bool().ok_or(RuntimeError::TypeMismatch {
            op,
            lhs: value.type_name(),
            rhs: "-",
        })
    }

    fn eval(&mut self, expr: &Expr) -> Result<Value, RuntimeError> {
        match expr {
            Expr::Const(value) => Ok(value.clone()),
            Expr::Load(slot) => self
                .slots
                .get(*slot)
                .cloned()
                .ok_or_else(|| RuntimeError::native(format!("slot {slot} out of range"))),
            Expr::Unary { op, operand } => {
                let value = self.eval(operand)?;
                op.apply(&value)
            }
            Expr::Binary { op, lhs, rhs } => {
                let left = self.eval(lhs)?;
                // short-circuit
                match (op, left.as_bool()) {
                    (BinaryOp::And, Some(false)) => return Ok(Value::Bool(false)),
                    (BinaryOp::Or, Some(true)) => return Ok(Value::Bool(true)),
                    _ => {}
                }
                let right = self.eval(rhs)?;
                op.apply(&left, &right)
            }
            Expr::Call { target, args } => {
                let args = args
                    .iter()
                    .map(|arg| self.eval(arg))
                    .collect::<Result<Vec<_>, _>>()?;
                call(self.program, *target, args, self.depth + 1)
            }
        }
    }

    fn slot_mut(&mut self, slot: usize) -> Result<&mut Value, RuntimeError> {
        self.slots
            .get_mut(slot)
            .ok_or_else(|| RuntimeError::native(format!("slot {slot} out of range")))
    }
}
