//! Compilation adapter: batch of changed files in, loaded module out

use crate::compiler::{compile_sources, SourceText};
use crate::diagnostic::{codes, file_location, Diagnostic};
use crate::options::CompileOptions;
use livepatch_runtime::{LoadedModule, ModuleBuilder, ModuleOrigin, Program};
use livepatch_watch::ChangeBatch;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Prefix of every module produced by a hot reload
pub const HOT_MODULE_PREFIX: &str = "livepatch.hot.";

/// Result of compiling one batch
#[derive(Debug, Clone)]
pub struct CompiledModule {
    name: String,
    diagnostics: Vec<Diagnostic>,
    module: Option<Arc<LoadedModule>>,
    types: Vec<String>,
    sources: Vec<PathBuf>,
    fingerprint: Option<String>,
}

impl CompiledModule {
    fn failed(name: String, diagnostics: Vec<Diagnostic>, sources: Vec<PathBuf>) -> Self {
        Self {
            name,
            diagnostics,
            module: None,
            types: Vec::new(),
            sources,
            fingerprint: None,
        }
    }

    /// Module name
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the module compiled and loaded
    #[inline]
    #[must_use]
    pub fn success(&self) -> bool {
        self.module.is_some() && !self.has_errors()
    }

    /// Every diagnostic, in discovery order
    #[inline]
    #[must_use]
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Error diagnostics only
    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(|d| d.is_error())
    }

    /// Whether any diagnostic is an error
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.errors().next().is_some()
    }

    /// Loaded module, on success
    #[inline]
    #[must_use]
    pub fn module(&self) -> Option<&Arc<LoadedModule>> {
        self.module.as_ref()
    }

    /// Full names of the types the module defines
    #[inline]
    #[must_use]
    pub fn types(&self) -> &[String] {
        &self.types
    }

    /// Files that were actually compiled
    #[inline]
    #[must_use]
    pub fn sources(&self) -> &[PathBuf] {
        &self.sources
    }

    /// blake3 hash of the compiled sources, hex encoded
    #[inline]
    #[must_use]
    pub fn fingerprint(&self) -> Option<&str> {
        self.fingerprint.as_deref()
    }
}

/// Compiles batches against the running program
///
/// References are resolved against every on-disk module in the program,
/// optionally narrowed to a set of module names. Modules without a location
/// (built in memory, or produced by an earlier hot reload) are never
/// referenced.
#[derive(Debug)]
pub struct CompilationAdapter {
    program: Arc<Program>,
    options: CompileOptions,
    included_modules: Vec<String>,
    generation: u64,
}

impl CompilationAdapter {
    /// Create an adapter with default options
    #[must_use]
    pub fn new(program: Arc<Program>) -> Self {
        Self {
            program,
            options: CompileOptions::default(),
            included_modules: Vec::new(),
            generation: 0,
        }
    }

    /// Set compile options
    #[must_use]
    pub fn with_options(mut self, options: CompileOptions) -> Self {
        self.options = options;
        self
    }

    /// Restrict references to the named modules; empty means all
    #[must_use]
    pub fn with_included_modules(mut self, modules: Vec<String>) -> Self {
        self.included_modules = modules;
        self
    }

    /// Replace compile options
    pub fn set_options(&mut self, options: CompileOptions) {
        self.options = options;
    }

    /// Replace the module filter
    pub fn set_included_modules(&mut self, modules: Vec<String>) {
        self.included_modules = modules;
    }

    /// Current options
    #[inline]
    #[must_use]
    pub fn options(&self) -> &CompileOptions {
        &self.options
    }

    /// Program compiled against
    #[inline]
    #[must_use]
    pub fn program(&self) -> &Arc<Program> {
        &self.program
    }

    /// Generation of this adapter's latest hot compilation; 0 before the first
    #[inline]
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Compile a batch into a new hot-reload module
    pub fn compile(&mut self, batch: &ChangeBatch) -> CompiledModule {
        self.compile_paths(batch.paths())
    }

    /// Compile an explicit list of files into a new hot-reload module
    pub fn compile_paths<I, P>(&mut self, paths: I) -> CompiledModule
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let generation = self.program.next_hot_generation();
        self.generation = generation;
        self.build(
            format!("{HOT_MODULE_PREFIX}{generation}"),
            ModuleOrigin::HotReload { generation },
            paths,
        )
    }

    /// Compile and load an on-disk module, as the host does at startup
    pub fn compile_base<I, P>(
        &mut self,
        name: impl Into<String>,
        location: impl Into<PathBuf>,
        paths: I,
    ) -> CompiledModule
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        self.build(name.into(), ModuleOrigin::Disk(location.into()), paths)
    }

    /// Modules visible to compilation
    #[must_use]
    pub fn references(&self) -> Vec<Arc<LoadedModule>> {
        self.program
            .modules()
            .into_iter()
            .filter(|m| matches!(m.origin(), ModuleOrigin::Disk(_)))
            .filter(|m| {
                self.included_modules.is_empty()
                    || self.included_modules.iter().any(|n| n == m.name())
            })
            .collect()
    }

    fn build<I, P>(&self, name: String, origin: ModuleOrigin, paths: I) -> CompiledModule
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let (sources, mut diagnostics) = read_sources(paths);
        let compiled: Vec<PathBuf> = sources.iter().map(|s| s.path.clone()).collect();

        if sources.is_empty() {
            diagnostics.push(Diagnostic::warning(
                codes::NO_SOURCES,
                file_location(PathBuf::new()),
                "no source files left to compile",
            ));
            warn!(module = %name, "nothing to compile");
            return CompiledModule::failed(name, diagnostics, compiled);
        }

        let references = self.references();
        debug!(
            module = %name,
            files = sources.len(),
            references = references.len(),
            "compiling"
        );

        let output = compile_sources(&self.program, &references, &sources, &self.options);
        diagnostics.extend(output.diagnostics);
        if diagnostics.iter().any(Diagnostic::is_error) {
            for diagnostic in diagnostics.iter().filter(|d| d.is_error()) {
                warn!(module = %name, "{diagnostic}");
            }
            return CompiledModule::failed(name, diagnostics, compiled);
        }

        let types: Vec<String> = output
            .types
            .iter()
            .map(|t| t.full_name().to_string())
            .collect();
        let mut builder = ModuleBuilder::new(name.clone(), origin);
        for ty in output.types {
            builder.add_type(ty);
        }

        match self.program.load_module(builder) {
            Ok(module) => {
                let fingerprint = fingerprint(&sources);
                info!(
                    module = %name,
                    types = types.len(),
                    methods = module.method_count(),
                    fingerprint = %&fingerprint[..12],
                    "module loaded"
                );
                CompiledModule {
                    name,
                    diagnostics,
                    module: Some(module),
                    types,
                    sources: compiled,
                    fingerprint: Some(fingerprint),
                }
            }
            Err(e) => {
                warn!(module = %name, error = %e, "module rejected on load");
                diagnostics.push(Diagnostic::error(
                    codes::LOAD_FAILED,
                    file_location(PathBuf::new()),
                    format!("module `{name}` failed to load: {e}"),
                ));
                CompiledModule::failed(name, diagnostics, compiled)
            }
        }
    }
}

/// Read every path, dropping the ones that cannot be read
fn read_sources<I, P>(paths: I) -> (Vec<SourceText>, Vec<Diagnostic>)
where
    I: IntoIterator<Item = P>,
    P: AsRef<Path>,
{
    let mut sources = Vec::new();
    let mut diagnostics = Vec::new();
    for path in paths {
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(text) => sources.push(SourceText::new(path, text)),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                diagnostics.push(Diagnostic::warning(
                    codes::FILE_NOT_FOUND,
                    file_location(path),
                    "file no longer exists; dropped from the batch",
                ));
            }
            Err(e) => {
                diagnostics.push(Diagnostic::warning(
                    codes::FILE_UNREADABLE,
                    file_location(path),
                    format!("file could not be read ({e}); dropped from the batch"),
                ));
            }
        }
    }
    (sources, diagnostics)
}

/// blake3 over every path and its contents
fn fingerprint(sources: &[SourceText]) -> String {
    let mut hasher = blake3::Hasher::new();
    for source in sources {
        hasher.update(source.path.to_string_lossy().as_bytes());
        hasher.update(&[0]);
        hasher.update(source.text.as_bytes());
        hasher.update(&[0]);
    }
    hasher.finalize().to_hex().to_string()
}
