use anyhow::{bail, Context, Result};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use livepatch_compile::{compile_sources, CompilationAdapter, CompileOptions, SourceText};
use livepatch_core::{HostLifecycle, LivePatchConfig, LivePatchSession, TickOutcome, VERSION};
use livepatch_runtime::{Program, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const BASE_MODULE: &str = "app";

#[tokio::main]
async fn main() {
    let cli = Command::new("livepatch")
        .version(VERSION)
        .about("Hot-patch a running program from edited source files")
        .arg(
            Arg::new("json-logs")
                .long("json-logs")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Emit logs as JSON lines"),
        )
        .subcommand_required(true)
        .subcommand(
            Command::new("run")
                .about("Load a source tree, call an entry method every tick and patch it on edits")
                .arg(
                    Arg::new("root")
                        .long("root")
                        .default_value(".")
                        .value_parser(value_parser!(PathBuf))
                        .help("Source tree to load and watch"),
                )
                .arg(
                    Arg::new("entry")
                        .long("entry")
                        .required(true)
                        .help("Method to call each tick, as Namespace.Type.method"),
                )
                .arg(
                    Arg::new("config")
                        .long("config")
                        .value_parser(value_parser!(PathBuf))
                        .help("TOML settings file"),
                )
                .arg(
                    Arg::new("tick-ms")
                        .long("tick-ms")
                        .default_value("100")
                        .value_parser(value_parser!(u64))
                        .help("Host frame interval in milliseconds"),
                ),
        )
        .subcommand(
            Command::new("check")
                .about("Compile source files and report diagnostics")
                .arg(
                    Arg::new("files")
                        .required(true)
                        .num_args(1..)
                        .value_parser(value_parser!(PathBuf))
                        .help("Source files"),
                ),
        );

    let matches = cli.get_matches();
    init_tracing(matches.get_flag("json-logs"));

    let result = match matches.subcommand() {
        Some(("run", args)) => run(args).await,
        Some(("check", args)) => check(args),
        _ => Ok(()),
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn run(args: &ArgMatches) -> Result<()> {
    let root = args
        .get_one::<PathBuf>("root")
        .cloned()
        .unwrap_or_else(|| PathBuf::from("."));
    let root = root
        .canonicalize()
        .with_context(|| format!("cannot open {}", root.display()))?;
    let entry = args
        .get_one::<String>("entry")
        .context("--entry is required")?;
    let (type_name, method) = entry
        .rsplit_once('.')
        .with_context(|| format!("entry `{entry}` is not Type.method"))?;
    let tick = Duration::from_millis(args.get_one::<u64>("tick-ms").copied().unwrap_or(100).max(1));

    let config = match args.get_one::<PathBuf>("config") {
        Some(path) => LivePatchConfig::load(path)?,
        None => LivePatchConfig::default(),
    };

    let filter = config.path_filter();
    let mut files = Vec::new();
    collect_sources(&root, &root, &mut |relative: &Path| filter.accepts(relative), &mut files)?;
    files.sort();
    info!("Loading {} source file(s) from {}", files.len(), root.display());

    let program = Arc::new(Program::new());
    let base = CompilationAdapter::new(Arc::clone(&program))
        .with_options(config.compile.clone())
        .compile_base(BASE_MODULE, &root, &files);
    for diagnostic in base.diagnostics() {
        eprintln!("{diagnostic}");
    }
    if !base.success() {
        bail!("base program failed to compile");
    }

    let mut session = LivePatchSession::new(Arc::clone(&program), root, config);
    session.on_session_entered();

    let mut interval = tokio::time::interval(tick);
    let mut last: Option<String> = None;
    loop {
        tokio::select! {
            _ = interval.tick() => {}
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
        }

        match session.on_tick() {
            TickOutcome::ChangesDetected(paths) => {
                info!("{} file(s) changed; auto-apply is off", paths.len());
            }
            TickOutcome::Cycle(report) => {
                for diagnostic in &report.diagnostics {
                    eprintln!("{diagnostic}");
                }
                info!(outcome = ?report.outcome, changes = report.changes, "Cycle finished");
            }
            TickOutcome::Quiet | TickOutcome::Inactive => {}
        }

        let shown = match program.call_by_name(type_name, method, Vec::<Value>::new()) {
            Ok(value) => value.to_string(),
            Err(e) => format!("error: {e}"),
        };
        if last.as_deref() != Some(shown.as_str()) {
            println!("{entry} = {shown}");
            last = Some(shown);
        }
    }

    session.on_session_exiting();
    Ok(())
}

fn check(args: &ArgMatches) -> Result<()> {
    let mut sources = Vec::new();
    for path in args.get_many::<PathBuf>("files").into_iter().flatten() {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read {}", path.display()))?;
        sources.push(SourceText::new(path.clone(), text));
    }

    let program = Program::new();
    let output = compile_sources(&program, &[], &sources, &CompileOptions::default());
    for diagnostic in &output.diagnostics {
        println!("{diagnostic}");
    }
    if output.has_errors() {
        bail!("{} file(s) failed to compile", sources.len());
    }
    println!("ok: {} type(s)", output.types.len());
    Ok(())
}

fn collect_sources(
    root: &Path,
    dir: &Path,
    accept: &mut dyn FnMut(&Path) -> bool,
    out: &mut Vec<PathBuf>,
) -> Result<()> {
    let entries =
        std::fs::read_dir(dir).with_context(|| format!("cannot list {}", dir.display()))?;
    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_dir() {
            collect_sources(root, &path, accept, out)?;
            continue;
        }
        let accepted = match path.strip_prefix(root) {
            Ok(relative) => accept(relative),
            Err(e) => {
                warn!("Skipping {}: {e}", path.display());
                false
            }
        };
        if accepted {
            out.push(path);
        }
    }
    Ok(())
}
