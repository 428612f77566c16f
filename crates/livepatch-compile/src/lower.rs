//! Type checking and lowering of method bodies to runtime IR
//!
//! Locals get fresh slots in declaration order (parameters first) and slots
//! are never reused, so shadowing a name simply allocates a new slot. Local
//! functions are hoisted to the top of their block, lifted to generated
//! methods on the declaring type and called like any other method.

use crate::ast::{self, Block, Expr, ExprKind, FnDecl, Span};
use crate::diagnostic::{codes, Diagnostic, LineIndex};
use crate::options::CompileOptions;
use crate::resolve::{compatible, select_overload, CallError, Catalog, CatalogMethod, ERROR_TYPE};
use livepatch_runtime::{
    ir, primitive, BinaryOp, Body, MethodBody, MethodDef, MethodFlags, MethodSignature, Program,
    UnaryOp, Value,
};
use std::collections::HashMap;

/// Everything lowering needs to know about the enclosing declaration
#[derive(Clone, Copy)]
pub(crate) struct LowerContext<'a> {
    pub(crate) catalog: &'a Catalog,
    pub(crate) type_name: &'a str,
    pub(crate) namespace: Option<&'a str>,
    pub(crate) index: &'a LineIndex,
    pub(crate) options: &'a CompileOptions,
    pub(crate) program: &'a Program,
}

/// Name given to a lifted local function
#[must_use]
pub(crate) fn local_function_name(outer: &str, inner: &str, ordinal: usize) -> String {
    format!("<{outer}>g__{inner}|{ordinal}")
}

/// Whether a block can never complete normally
#[must_use]
pub(crate) fn always_returns(stmts: &[ast::Stmt]) -> bool {
    stmts.iter().any(|stmt| match stmt {
        ast::Stmt::Return { .. } => true,
        ast::Stmt::If {
            then_block,
            else_block: Some(else_block),
            ..
        } => always_returns(&then_block.stmts) && always_returns(&else_block.stmts),
        ast::Stmt::While { cond, .. } => matches!(cond.kind, ExprKind::Bool(true)),
        _ => false,
    })
}

#[derive(Debug, Clone)]
struct Local {
    slot: usize,
    ty: String,
}

struct FnState {
    name: String,
    return_type: String,
    scopes: Vec<HashMap<String, Local>>,
    local_fns: Vec<Vec<CatalogMethod>>,
    next_slot: usize,
}

impl FnState {
    fn new(name: &str, return_type: &str, inherited: Vec<Vec<CatalogMethod>>) -> Self {
        Self {
            name: name.to_string(),
            return_type: return_type.to_string(),
            scopes: vec![HashMap::new()],
            local_fns: inherited,
            next_slot: 0,
        }
    }

    fn push_scope(&mut self) {
        self.scopes.push(HashMap::new());
        self.local_fns.push(Vec::new());
    }

    fn pop_scope(&mut self) {
        self.scopes.pop();
        self.local_fns.pop();
    }

    fn declare(&mut self, name: &str, ty: String) -> usize {
        let slot = self.next_slot;
        self.next_slot += 1;
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.to_string(), Local { slot, ty });
        }
        slot
    }

    fn lookup(&self, name: &str) -> Option<&Local> {
        self.scopes.iter().rev().find_map(|scope| scope.get(name))
    }

    fn local_candidates(&self, name: &str) -> Vec<&CatalogMethod> {
        self.local_fns
            .iter()
            .rev()
            .flat_map(|block| block.iter().filter(|m| m.name == name))
            .collect()
    }
}

struct LocalDecl {
    method: CatalogMethod,
    signature: MethodSignature,
    flags: MethodFlags,
}

/// Lowers the methods of one type, collecting diagnostics and lifted locals
pub(crate) struct Lowerer<'a> {
    ctx: LowerContext<'a>,
    pub(crate) diagnostics: Vec<Diagnostic>,
    pub(crate) generated: Vec<MethodDef>,
    local_counter: usize,
}

impl<'a> Lowerer<'a> {
    pub(crate) fn new(ctx: LowerContext<'a>) -> Self {
        Self {
            ctx,
            diagnostics: Vec::new(),
            generated: Vec::new(),
            local_counter: 0,
        }
    }

    /// Lower a declared method whose signature is already resolved
    pub(crate) fn lower_method(&mut self, decl: &FnDecl, signature: &MethodSignature) -> Body {
        self.local_counter = 0;
        self.lower_fn(decl, signature, Vec::new())
    }

    fn resolve_type(&mut self, ty: Option<&ast::TypeRef>) -> String {
        resolve_type_ref(
            self.ctx.catalog,
            self.ctx.namespace,
            self.ctx.index,
            ty,
            &mut self.diagnostics,
        )
    }

    fn check_unsafe(&mut self, decl: &FnDecl) {
        check_unsafe(self.ctx.options, self.ctx.index, decl, &mut self.diagnostics);
    }

    fn lower_fn(
        &mut self,
        decl: &FnDecl,
        signature: &MethodSignature,
        inherited: Vec<Vec<CatalogMethod>>,
    ) -> Body {
        let mut state = FnState::new(&decl.name, &signature.return_type, inherited);
        for (param, ty) in decl.params.iter().zip(&signature.params) {
            state.declare(&param.name, ty.clone());
        }

        let stmts = self.lower_block(&mut state, &decl.body);

        let returns_value =
            signature.return_type != primitive::UNIT && signature.return_type != ERROR_TYPE;
        if returns_value && !always_returns(&decl.body.stmts) {
            self.error(
                codes::MISSING_RETURN,
                decl.span,
                format!(
                    "`{}` must return `{}` on every path",
                    decl.name, signature.return_type
                ),
            );
        }

        Body::new(state.next_slot, stmts)
    }

    fn lower_block(&mut self, state: &mut FnState, block: &Block) -> Vec<ir::Stmt> {
        state.push_scope();

        let mut hoisted = Vec::new();
        for stmt in &block.stmts {
            if let ast::Stmt::LocalFn(decl) = stmt {
                hoisted.push(self.declare_local_fn(state, decl));
            }
        }
        let mut hoisted = hoisted.into_iter();

        let mut out = Vec::with_capacity(block.stmts.len());
        for stmt in &block.stmts {
            if let ast::Stmt::LocalFn(decl) = stmt {
                if let Some(Some(local)) = hoisted.next() {
                    self.lower_local_fn(state, decl, local);
                }
            } else if let Some(lowered) = self.lower_stmt(state, stmt) {
                out.push(lowered);
            }
        }

        state.pop_scope();
        out
    }

    fn declare_local_fn(&mut self, state: &mut FnState, decl: &FnDecl) -> Option<LocalDecl> {
        self.check_unsafe(decl);
        let params: Vec<String> = decl
            .params
            .iter()
            .map(|p| self.resolve_type(Some(&p.ty)))
            .collect();
        let return_type = self.resolve_type(decl.return_type.as_ref());

        let block = state.local_fns.last_mut()?;
        if block
            .iter()
            .any(|m| m.name == decl.name && m.params == params)
        {
            self.error(
                codes::DUPLICATE_METHOD,
                decl.span,
                format!("local function `{}` is declared twice with the same parameters", decl.name),
            );
            return None;
        }

        let generated_name = local_function_name(&state.name, &decl.name, self.local_counter);
        self.local_counter += 1;

        let method = CatalogMethod {
            handle: self.ctx.program.allocate_handle(),
            name: decl.name.clone(),
            params: params.clone(),
            return_type: return_type.clone(),
        };
        block.push(method.clone());

        Some(LocalDecl {
            method,
            signature: MethodSignature::new(self.ctx.type_name, generated_name, params, return_type),
            flags: MethodFlags {
                is_public: decl.is_public,
                is_static: decl.is_static,
                is_unsafe: decl.unsafe_span.is_some(),
                no_patch: decl.is_no_patch(),
            },
        })
    }

    fn lower_local_fn(&mut self, state: &FnState, decl: &FnDecl, local: LocalDecl) {
        let body = self.lower_fn(decl, &local.signature, state.local_fns.clone());
        self.generated.push(MethodDef::new(
            local.method.handle,
            local.signature,
            local.flags,
            MethodBody::interpreted(body),
        ));
    }

    fn lower_stmt(&mut self, state: &mut FnState, stmt: &ast::Stmt) -> Option<ir::Stmt> {
        let lowered = match stmt {
            ast::Stmt::Let {
                name,
                ty,
                value,
                span,
            } => {
                let (value, value_ty) = self.lower_expr(state, value);
                let ty = match ty {
                    Some(annotation) => {
                        let declared = self.resolve_type(Some(annotation));
                        if !compatible(&declared, &value_ty) {
                            self.mismatch(*span, &declared, &value_ty);
                        }
                        declared
                    }
                    None => value_ty,
                };
                let slot = state.declare(name, ty);
                ir::Stmt::Store { slot, value }
            }
            ast::Stmt::Assign { name, value, span } => {
                let (value, value_ty) = self.lower_expr(state, value);
                let Some(local) = state.lookup(name).cloned() else {
                    self.error(
                        codes::UNDEFINED_VARIABLE,
                        *span,
                        format!("cannot assign to undefined variable `{name}`"),
                    );
                    return None;
                };
                if !compatible(&local.ty, &value_ty) {
                    self.mismatch(*span, &local.ty, &value_ty);
                }
                ir::Stmt::Store {
                    slot: local.slot,
                    value,
                }
            }
            ast::Stmt::Return { value, span } => {
                let expected = state.return_type.clone();
                match value {
                    Some(value) => {
                        let (lowered, ty) = self.lower_expr(state, value);
                        if !compatible(&expected, &ty) {
                            self.mismatch(value.span, &expected, &ty);
                        }
                        ir::Stmt::Return(Some(lowered))
                    }
                    None => {
                        if !compatible(&expected, primitive::UNIT) {
                            self.mismatch(*span, &expected, primitive::UNIT);
                        }
                        ir::Stmt::Return(None)
                    }
                }
            }
            ast::Stmt::If {
                cond,
                then_block,
                else_block,
            } => {
                let cond = self.lower_condition(state, cond);
                let then_branch = self.lower_block(state, then_block);
                let else_branch = else_block
                    .as_ref()
                    .map(|block| self.lower_block(state, block))
                    .unwrap_or_default();
                ir::Stmt::If {
                    cond,
                    then_branch,
                    else_branch,
                }
            }
            ast::Stmt::While { cond, body } => {
                let cond = self.lower_condition(state, cond);
                let body = self.lower_block(state, body);
                ir::Stmt::While { cond, body }
            }
            ast::Stmt::Expr(expr) => ir::Stmt::Eval(self.lower_expr(state, expr).0),
            ast::Stmt::LocalFn(_) => return None,
        };
        Some(lowered)
    }

    fn lower_condition(&mut self, state: &mut FnState, cond: &Expr) -> ir::Expr {
        let (lowered, ty) = self.lower_expr(state, cond);
        if !compatible(primitive::BOOL, &ty) {
            self.mismatch(cond.span, primitive::BOOL, &ty);
        }
        lowered
    }

    fn lower_expr(&mut self, state: &mut FnState, expr: &Expr) -> (ir::Expr, String) {
        match &expr.kind {
            ExprKind::Int(v) => (ir::Expr::constant(*v), primitive::INT.to_string()),
            ExprKind::Float(v) => (ir::Expr::constant(*v), primitive::FLOAT.to_string()),
            ExprKind::Str(v) => (ir::Expr::constant(v.as_str()), primitive::STR.to_string()),
            ExprKind::Bool(v) => (ir::Expr::constant(*v), primitive::BOOL.to_string()),
            ExprKind::Var(name) => match state.lookup(name) {
                Some(local) => (ir::Expr::Load(local.slot), local.ty.clone()),
                None => {
                    self.error(
                        codes::UNDEFINED_VARIABLE,
                        expr.span,
                        format!("undefined variable `{name}`"),
                    );
                    error_expr()
                }
            },
            ExprKind::Unary { op, operand } => {
                let (operand, ty) = self.lower_expr(state, operand);
                let result = match (op, ty.as_str()) {
                    (_, ERROR_TYPE) => Some(ERROR_TYPE),
                    (UnaryOp::Neg, primitive::INT | primitive::FLOAT) => Some(ty.as_str()),
                    (UnaryOp::Not, primitive::BOOL) => Some(primitive::BOOL),
                    _ => None,
                }
                .map(str::to_string);
                let Some(result) = result else {
                    self.error(
                        codes::TYPE_MISMATCH,
                        expr.span,
                        format!("cannot apply `{}` to `{ty}`", op.symbol()),
                    );
                    return error_expr();
                };
                (self.fold(ir::Expr::unary(*op, operand)), result)
            }
            ExprKind::Binary { op, lhs, rhs } => {
                let (lhs, lhs_ty) = self.lower_expr(state, lhs);
                let (rhs, rhs_ty) = self.lower_expr(state, rhs);
                if lhs_ty == ERROR_TYPE || rhs_ty == ERROR_TYPE {
                    return error_expr();
                }
                let Some(result) = binary_result(*op, &lhs_ty, &rhs_ty) else {
                    self.error(
                        codes::TYPE_MISMATCH,
                        expr.span,
                        format!("cannot apply `{}` to `{lhs_ty}` and `{rhs_ty}`", op.symbol()),
                    );
                    return error_expr();
                };
                (self.fold(ir::Expr::binary(*op, lhs, rhs)), result)
            }
            ExprKind::Call { path, args } => self.lower_call(state, expr.span, path, args),
        }
    }

    fn lower_call(
        &mut self,
        state: &mut FnState,
        span: Span,
        path: &[String],
        args: &[Expr],
    ) -> (ir::Expr, String) {
        let (lowered_args, arg_types): (Vec<_>, Vec<_>) =
            args.iter().map(|arg| self.lower_expr(state, arg)).unzip();
        if arg_types.iter().any(|t| t == ERROR_TYPE) {
            return error_expr();
        }

        let Some((method, type_path)) = path.split_last() else {
            return error_expr();
        };

        let (owner, bound) = if type_path.is_empty() {
            let mut candidates = state.local_candidates(method);
            let owner = self.ctx.type_name.to_string();
            candidates.extend(self.ctx.catalog.methods_named(&owner, method));
            (owner, select_overload(&candidates, &arg_types).cloned())
        } else {
            let written = type_path.join(".");
            let Some(owner) = self
                .ctx
                .catalog
                .resolve_type_name(&written, self.ctx.namespace)
            else {
                self.error(codes::UNKNOWN_TYPE, span, format!("unknown type `{written}`"));
                return error_expr();
            };
            let bound = self.ctx.catalog.bind(&owner, method, &arg_types).cloned();
            (owner, bound)
        };

        match bound {
            Ok(target) => (
                ir::Expr::call(target.handle, lowered_args),
                target.return_type,
            ),
            Err(CallError::UnknownMethod) => {
                self.error(
                    codes::UNKNOWN_METHOD,
                    span,
                    format!("no method `{method}` found on `{owner}`"),
                );
                error_expr()
            }
            Err(CallError::NoOverload(candidates)) => {
                let available = candidates
                    .iter()
                    .map(|params| format!("({})", params.join(", ")))
                    .collect::<Vec<_>>()
                    .join(", ");
                self.error(
                    codes::NO_MATCHING_OVERLOAD,
                    span,
                    format!(
                        "no overload of `{owner}::{method}` takes ({}); candidates: {available}",
                        arg_types.join(", ")
                    ),
                );
                error_expr()
            }
        }
    }

    fn fold(&self, expr: ir::Expr) -> ir::Expr {
        if !self.ctx.options.folds_constants() {
            return expr;
        }
        let folded = match &expr {
            ir::Expr::Unary { op, operand } => operand.as_const().and_then(|v| op.apply(v).ok()),
            ir::Expr::Binary { op, lhs, rhs } => match (lhs.as_const(), rhs.as_const()) {
                (Some(a), Some(b)) => op.apply(a, b).ok(),
                _ => None,
            },
            _ => None,
        };
        folded.map_or(expr, ir::Expr::Const)
    }

    fn mismatch(&mut self, span: Span, expected: &str, found: &str) {
        self.error(
            codes::TYPE_MISMATCH,
            span,
            format!("mismatched types: expected `{expected}`, found `{found}`"),
        );
    }

    fn error(&mut self, code: &'static str, span: Span, message: String) {
        self.diagnostics
            .push(Diagnostic::error(code, self.ctx.index.span_location(span), message));
    }
}

/// Resolve a written type, reporting unknown names; `None` means `unit`
pub(crate) fn resolve_type_ref(
    catalog: &Catalog,
    namespace: Option<&str>,
    index: &LineIndex,
    ty: Option<&ast::TypeRef>,
    diagnostics: &mut Vec<Diagnostic>,
) -> String {
    let Some(ty) = ty else {
        return primitive::UNIT.to_string();
    };
    if let Some(full) = catalog.resolve_type_name(&ty.name, namespace) {
        return full;
    }
    diagnostics.push(Diagnostic::error(
        codes::UNKNOWN_TYPE,
        index.span_location(ty.span),
        format!("unknown type `{}`", ty.name),
    ));
    ERROR_TYPE.to_string()
}

/// Report `unsafe fn` when the options reject it
pub(crate) fn check_unsafe(
    options: &CompileOptions,
    index: &LineIndex,
    decl: &FnDecl,
    diagnostics: &mut Vec<Diagnostic>,
) {
    if let (Some(span), false) = (decl.unsafe_span, options.allow_unsafe) {
        diagnostics.push(Diagnostic::error(
            codes::UNSAFE_NOT_ALLOWED,
            index.span_location(span),
            format!("`unsafe fn {}` is not permitted by the compile options", decl.name),
        ));
    }
}

fn error_expr() -> (ir::Expr, String) {
    (ir::Expr::Const(Value::Unit), ERROR_TYPE.to_string())
}

fn binary_result(op: BinaryOp, lhs: &str, rhs: &str) -> Option<String> {
    if lhs != rhs {
        return None;
    }
    let numeric = matches!(lhs, primitive::INT | primitive::FLOAT);
    let ok = match op {
        BinaryOp::Add => numeric || lhs == primitive::STR,
        BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem => numeric,
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            numeric || lhs == primitive::STR
        }
        BinaryOp::Eq | BinaryOp::Ne => true,
        BinaryOp::And | BinaryOp::Or => lhs == primitive::BOOL,
    };
    if !ok {
        return None;
    }
    Some(if op.is_comparison() || op.is_logical() {
        primitive::BOOL.to_string()
    } else {
        lhs.to_string()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    #[test]
    fn local_function_names() {
        assert_eq!(local_function_name("speed", "bonus", 0), "<speed>g__bonus|0");
    }

    #[test]
    fn return_analysis() {
        let (file, errors) = parse(
            "t.src",
            "type T {
                fn a() -> int { if true { return 1; } else { return 2; } }
                fn b() -> int { if true { return 1; } }
                fn c() -> int { while true { } }
             }",
        );
        assert!(errors.is_empty());
        let methods = &file.types[0].methods;
        assert!(always_returns(&methods[0].body.stmts));
        assert!(!always_returns(&methods[1].body.stmts));
        assert!(always_returns(&methods[2].body.stmts));
    }

    #[test]
    fn binary_typing() {
        assert_eq!(binary_result(BinaryOp::Add, "str", "str"), Some("str".into()));
        assert_eq!(binary_result(BinaryOp::Lt, "int", "int"), Some("bool".into()));
        assert_eq!(binary_result(BinaryOp::Sub, "str", "str"), None);
        assert_eq!(binary_result(BinaryOp::Add, "int", "float"), None);
        assert_eq!(binary_result(BinaryOp::And, "int", "int"), None);
        assert_eq!(binary_result(BinaryOp::Eq, "Game.Vec2", "Game.Vec2"), Some("bool".into()));
    }
}
