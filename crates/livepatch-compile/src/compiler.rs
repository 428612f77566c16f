//! Batch compiler: parse, declare, lower
//!
//! Compilation runs in three passes over the whole batch so that files may
//! call into each other in any order:
//!
//! 1. every type is declared (duplicates rejected)
//! 2. every method signature is resolved and given a handle
//! 3. every body is type checked and lowered to IR
//!
//! Any error anywhere rejects the whole batch.

use crate::ast::{FnDecl, SourceFile, TypeDecl};
use crate::diagnostic::{codes, Diagnostic, LineIndex};
use crate::lower::{check_unsafe, resolve_type_ref, LowerContext, Lowerer};
use crate::options::CompileOptions;
use crate::parser::parse;
use crate::resolve::{Catalog, CatalogMethod};
use livepatch_runtime::{
    LoadedModule, MethodBody, MethodDef, MethodFlags, MethodHandle, MethodSignature, Program,
    TypeDef,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

/// Source text of one batch file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceText {
    /// Where the text came from
    pub path: PathBuf,
    /// Contents
    pub text: String,
}

impl SourceText {
    /// Create a source text
    #[inline]
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, text: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            text: text.into(),
        }
    }
}

/// Result of compiling a batch
#[derive(Debug, Default)]
pub struct CompileOutput {
    /// Every diagnostic, in discovery order
    pub diagnostics: Vec<Diagnostic>,
    /// Compiled types; empty when any error was reported
    pub types: Vec<TypeDef>,
}

impl CompileOutput {
    /// Whether any diagnostic is an error
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(Diagnostic::is_error)
    }
}

struct Unit {
    file: SourceFile,
    index: LineIndex,
}

struct DeclaredMethod<'u> {
    decl: &'u FnDecl,
    signature: MethodSignature,
    flags: MethodFlags,
    handle: MethodHandle,
}

struct DeclaredType<'u> {
    unit: &'u Unit,
    full_name: String,
    methods: Vec<DeclaredMethod<'u>>,
}

/// Full name of a type declared in `file`
#[must_use]
pub fn qualified_name(namespace: Option<&str>, name: &str) -> String {
    match namespace {
        Some(ns) => format!("{ns}.{name}"),
        None => name.to_string(),
    }
}

/// Compile `sources` against the types defined by `references`
///
/// Method handles are allocated from `program` so the output can be loaded
/// into it directly. Handles are never reused, even when compilation fails.
#[must_use]
pub fn compile_sources(
    program: &Program,
    references: &[Arc<LoadedModule>],
    sources: &[SourceText],
    options: &CompileOptions,
) -> CompileOutput {
    let mut output = CompileOutput::default();

    let mut units = Vec::with_capacity(sources.len());
    for source in sources {
        let index = LineIndex::new(&source.path, &source.text);
        let (file, errors) = parse(&source.path, &source.text);
        output
            .diagnostics
            .extend(errors.iter().map(|e| e.to_diagnostic(&index)));
        units.push(Unit { file, index });
    }
    if output.has_errors() {
        debug!(files = sources.len(), "batch has syntax errors");
        return output;
    }

    let mut catalog = Catalog::from_references(references);
    let declared = declare_types(&units, &mut catalog, &mut output.diagnostics);
    let declared = declare_methods(program, declared, &mut catalog, options, &mut output.diagnostics);

    let mut types = Vec::with_capacity(declared.len());
    for ty in declared {
        let ctx = LowerContext {
            catalog: &catalog,
            type_name: &ty.full_name,
            namespace: ty.unit.file.namespace.as_deref(),
            index: &ty.unit.index,
            options,
            program,
        };
        let mut lowerer = Lowerer::new(ctx);
        let mut def = TypeDef::new(ty.full_name.clone());
        for method in &ty.methods {
            let body = lowerer.lower_method(method.decl, &method.signature);
            def.add_method(MethodDef::new(
                method.handle,
                method.signature.clone(),
                method.flags,
                MethodBody::interpreted(body),
            ));
        }
        for generated in lowerer.generated {
            def.add_method(generated);
        }
        output.diagnostics.extend(lowerer.diagnostics);
        types.push(def);
    }

    if output.has_errors() {
        debug!(
            errors = output.diagnostics.iter().filter(|d| d.is_error()).count(),
            "batch failed type checking"
        );
    } else {
        output.types = types;
    }
    output
}

fn declare_types<'u>(
    units: &'u [Unit],
    catalog: &mut Catalog,
    diagnostics: &mut Vec<Diagnostic>,
) -> Vec<(&'u Unit, &'u TypeDecl, String)> {
    let mut declared = Vec::new();
    for unit in units {
        for ty in &unit.file.types {
            let full_name = qualified_name(unit.file.namespace.as_deref(), &ty.name);
            if catalog.declare_batch_type(&full_name) {
                declared.push((unit, ty, full_name));
            } else {
                diagnostics.push(Diagnostic::error(
                    codes::DUPLICATE_TYPE,
                    unit.index.span_location(ty.span),
                    format!("type `{full_name}` is declared more than once"),
                ));
            }
        }
    }
    declared
}

fn declare_methods<'u>(
    program: &Program,
    types: Vec<(&'u Unit, &'u TypeDecl, String)>,
    catalog: &mut Catalog,
    options: &CompileOptions,
    diagnostics: &mut Vec<Diagnostic>,
) -> Vec<DeclaredType<'u>> {
    let mut declared = Vec::with_capacity(types.len());
    for (unit, ty, full_name) in types {
        let namespace = unit.file.namespace.as_deref();
        let mut methods = Vec::with_capacity(ty.methods.len());
        for decl in &ty.methods {
            check_unsafe(options, &unit.index, decl, diagnostics);
            let params: Vec<String> = decl
                .params
                .iter()
                .map(|p| resolve_type_ref(catalog, namespace, &unit.index, Some(&p.ty), diagnostics))
                .collect();
            let return_type = resolve_type_ref(
                catalog,
                namespace,
                &unit.index,
                decl.return_type.as_ref(),
                diagnostics,
            );
            let signature = MethodSignature::new(full_name.clone(), decl.name.clone(), params, return_type);

            let handle = program.allocate_handle();
            let added = catalog.add_batch_method(
                &full_name,
                CatalogMethod {
                    handle,
                    name: signature.name.clone(),
                    params: signature.params.clone(),
                    return_type: signature.return_type.clone(),
                },
            );
            if !added {
                diagnostics.push(Diagnostic::error(
                    codes::DUPLICATE_METHOD,
                    unit.index.span_location(decl.span),
                    format!("method `{}` is declared more than once", signature.display_name()),
                ));
                continue;
            }

            methods.push(DeclaredMethod {
                decl,
                flags: MethodFlags {
                    is_public: decl.is_public,
                    is_static: decl.is_static,
                    is_unsafe: decl.unsafe_span.is_some(),
                    no_patch: decl.is_no_patch(),
                },
                signature,
                handle,
            });
        }
        declared.push(DeclaredType {
            unit,
            full_name,
            methods,
        });
    }
    declared
}

#[cfg(test)]
mod tests {
    use super::*;
    use livepatch_runtime::{ModuleBuilder, ModuleOrigin, Value};
    use pretty_assertions::assert_eq;

    fn compile(text: &str) -> (Program, CompileOutput) {
        let program = Program::new();
        let out = compile_sources(
            &program,
            &[],
            &[SourceText::new("a.src", text)],
            &CompileOptions::default(),
        );
        (program, out)
    }

    fn codes_of(out: &CompileOutput) -> Vec<&'static str> {
        out.diagnostics.iter().map(|d| d.code).collect()
    }

    fn load_and_call(program: &Program, out: CompileOutput, ty: &str, method: &str, args: Vec<Value>) -> Value {
        let mut module = ModuleBuilder::new("test", ModuleOrigin::InMemory);
        for t in out.types {
            module.add_type(t);
        }
        program.load_module(module).unwrap();
        program.call_by_name(ty, method, args).unwrap()
    }

    #[test]
    fn compiles_and_runs() {
        let (program, out) = compile(
            "namespace Game;
             type Player {
                 fn speed(level: int) -> int {
                     fn bonus(x: int) -> int { return x / 2; }
                     let base = level * 3;
                     if level > 10 { return base + bonus(level); }
                     return base;
                 }
             }",
        );
        assert!(out.diagnostics.is_empty(), "{:?}", out.diagnostics);
        let names: Vec<_> = out.types[0].methods().iter().map(|m| m.name().to_string()).collect();
        assert_eq!(names, vec!["speed", "<speed>g__bonus|0"]);

        assert_eq!(
            load_and_call(&program, out, "Game.Player", "speed", vec![Value::Int(12)]),
            Value::Int(42)
        );
    }

    #[test]
    fn files_in_a_batch_see_each_other() {
        let program = Program::new();
        let out = compile_sources(
            &program,
            &[],
            &[
                SourceText::new("a.src", "type A { fn f() -> int { return B.g() + 1; } }"),
                SourceText::new("b.src", "type B { fn g() -> int { return 41; } }"),
            ],
            &CompileOptions::default(),
        );
        assert!(!out.has_errors());
        assert_eq!(load_and_call(&program, out, "A", "f", vec![]), Value::Int(42));
    }

    #[test]
    fn type_errors_reject_the_batch() {
        let (_, out) = compile(
            "type T {
                 fn a() -> int { return \"x\"; }
                 fn b() -> int { return y; }
                 fn c() -> int { }
                 fn d() { U.f(); }
                 fn e() { T.nope(); }
                 fn f() { T.a(1); }
             }",
        );
        assert!(out.types.is_empty());
        assert_eq!(
            codes_of(&out),
            vec![
                codes::TYPE_MISMATCH,
                codes::UNDEFINED_VARIABLE,
                codes::MISSING_RETURN,
                codes::UNKNOWN_TYPE,
                codes::UNKNOWN_METHOD,
                codes::NO_MATCHING_OVERLOAD,
            ]
        );
    }

    #[test]
    fn duplicates_are_reported() {
        let (_, out) = compile(
            "type T { fn m(a: int) { } fn m(b: int) { } fn m(c: str) { } }
             type T { }",
        );
        assert_eq!(codes_of(&out), vec![codes::DUPLICATE_TYPE, codes::DUPLICATE_METHOD]);
    }

    #[test]
    fn unsafe_follows_options() {
        let program = Program::new();
        let sources = [SourceText::new("a.src", "type T { unsafe fn m() { } }")];
        let allowed = compile_sources(&program, &[], &sources, &CompileOptions::default());
        assert!(!allowed.has_errors());
        assert!(allowed.types[0].methods()[0].flags().is_unsafe);

        let strict = CompileOptions::default().with_allow_unsafe(false);
        let rejected = compile_sources(&program, &[], &sources, &strict);
        assert_eq!(codes_of(&rejected), vec![codes::UNSAFE_NOT_ALLOWED]);
    }

    #[test]
    fn release_folds_constants() {
        use crate::options::OptimizationLevel;
        use livepatch_runtime::{ir, MethodBody};

        let program = Program::new();
        let sources = [SourceText::new("a.src", "type T { fn m() -> int { return 2 * 3 + 1; } }")];
        let options = CompileOptions::default().with_optimization(OptimizationLevel::Release);
        let out = compile_sources(&program, &[], &sources, &options);
        let MethodBody::Interpreted(body) = out.types[0].methods()[0].body() else {
            panic!("expected an interpreted body");
        };
        assert_eq!(body.stmts, vec![ir::Stmt::Return(Some(ir::Expr::constant(7_i64)))]);
    }

    #[test]
    fn qualified_names() {
        assert_eq!(qualified_name(Some("Game.Core"), "Player"), "Game.Core.Player");
        assert_eq!(qualified_name(None, "Player"), "Player");
    }
}
