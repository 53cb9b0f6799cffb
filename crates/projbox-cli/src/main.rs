//! projbox CLI: toolchain discovery, project scaffolding and confined execution.
//!
//! Every subcommand is a thin wrapper over `projbox::Engine`; `serve --stdio`
//! exposes the same surface as NDJSON for a UI process.

// CLI-specific lint allowances (CLI binary, not library)
#![allow(missing_docs)]
#![allow(clippy::print_stdout)] // CLI must print to stdout
#![allow(clippy::print_stderr)] // CLI must print to stderr
#![allow(clippy::exit)] // CLI uses exit codes

mod progress;

use clap::{ArgAction, Args, CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::{generate, Shell};
use miette::{IntoDiagnostic, Result};
use projbox::model::{ExecOutcome, OutputLine, OutputStream, ProjectType, ToolchainFamily};
use projbox::runner::ExecOptions;
use projbox::settings::SettingsStore;
use projbox::snippet::SnippetLanguage;
use projbox::{Engine, EngineError, EngineResult, ExecutionResult};
use serde::Serialize;
use std::io::{self, IsTerminal, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Environment variable holding the log filter.
const LOG_ENV_VAR: &str = "PROJBOX_LOG";

/// Color output mode
#[derive(Copy, Clone, Debug, Default, ValueEnum)]
enum ColorMode {
    /// Auto-detect based on terminal and `NO_COLOR` env
    #[default]
    Auto,
    /// Always use colors
    Always,
    /// Never use colors
    Never,
}

#[derive(Debug, Parser)]
#[command(
    name = "projbox",
    version,
    about = "Toolchain discovery and confined project execution"
)]
struct Cli {
    /// Control color output
    #[arg(long, value_enum, default_value = "auto", global = true)]
    color: ColorMode,

    /// Settings file (default: $PROJBOX_SETTINGS, else the user config directory)
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    /// Log more detail to stderr (repeat for trace)
    #[arg(long, short = 'v', action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Detect installed Python, Java, Node.js and Delphi toolchains
    Toolchains {
        #[arg(long)]
        json: bool,
    },
    /// Create, inspect and run projects
    #[command(subcommand)]
    Project(ProjectCommand),
    /// Run a one-off snippet outside any project
    #[command(subcommand)]
    Snippet(SnippetCommand),
    /// Browse and edit files inside the project roots
    #[command(subcommand)]
    Fs(FsCommand),
    /// Inspect the path boundary
    #[command(subcommand)]
    Guard(GuardCommand),
    /// Show or change settings
    #[command(subcommand)]
    Settings(SettingsCommand),
    /// Serve NDJSON requests for a UI process
    Serve {
        #[arg(long, help = "Read requests from stdin and write responses to stdout")]
        stdio: bool,
    },
    /// Generate shell completions for bash, zsh, or fish
    Completions {
        #[arg(value_enum, help = "Shell to generate completions for")]
        shell: Shell,
    },
}

#[derive(Debug, Subcommand)]
enum ProjectCommand {
    /// Scaffold a new project
    Create {
        #[arg(help = "python, nodejs, java, delphi or webapp")]
        project_type: ProjectType,
        name: String,
        #[arg(long, help = "Parent directory (default: the configured root for the type)")]
        base: Option<PathBuf>,
        #[arg(long)]
        json: bool,
    },
    /// Delete a project directory
    Delete {
        path: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// Describe a project
    Show {
        path: PathBuf,
        #[arg(long, help = "Also show how the project would be launched")]
        plan: bool,
        #[arg(long)]
        json: bool,
    },
    /// List projects under every configured root
    List {
        #[arg(long)]
        json: bool,
    },
    /// Run a project
    Run {
        path: PathBuf,
        #[command(flatten)]
        exec: ExecArgs,
    },
    /// Install a project's dependencies
    Install {
        path: PathBuf,
        #[command(flatten)]
        exec: ExecArgs,
    },
    /// Run a script inside a project with its own interpreter
    Script {
        path: PathBuf,
        #[command(flatten)]
        source: SourceArgs,
        #[command(flatten)]
        exec: ExecArgs,
    },
    /// Open a project folder, or its index.html with --web
    Open {
        path: PathBuf,
        #[arg(long)]
        web: bool,
        #[arg(long)]
        json: bool,
    },
}

#[derive(Debug, Subcommand)]
enum SnippetCommand {
    /// Run Python code
    Python {
        #[command(flatten)]
        source: SourceArgs,
        #[command(flatten)]
        exec: ExecArgs,
    },
    /// Run JavaScript code with Node.js
    Node {
        #[command(flatten)]
        source: SourceArgs,
        #[command(flatten)]
        exec: ExecArgs,
    },
    /// Open an HTML fragment in the browser
    Html {
        #[command(flatten)]
        source: SourceArgs,
        #[command(flatten)]
        exec: ExecArgs,
    },
}

#[derive(Debug, Subcommand)]
enum FsCommand {
    /// List one directory level
    Ls {
        path: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// Print a file
    Cat {
        path: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// Write a file from --content or stdin
    Write {
        path: PathBuf,
        #[arg(long)]
        content: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// Copy an outside file into a project directory
    Add {
        source: PathBuf,
        target_dir: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// List every file below a directory
    Files {
        path: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// Print a directory tree
    Tree {
        path: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// Ask for a directory with the native picker
    Pick {
        #[arg(long)]
        json: bool,
    },
}

#[derive(Debug, Subcommand)]
enum GuardCommand {
    /// Explain whether a path is inside the project roots
    Check {
        path: PathBuf,
        #[arg(long)]
        json: bool,
    },
}

#[derive(Debug, Subcommand)]
enum SettingsCommand {
    /// Print the effective settings
    Show {
        #[arg(long)]
        json: bool,
    },
    /// Print the settings file location
    Path,
    /// Set or clear the project root for a type
    SetRoot {
        project_type: ProjectType,
        #[arg(required_unless_present = "clear")]
        path: Option<PathBuf>,
        #[arg(long, conflicts_with = "path")]
        clear: bool,
    },
    /// Select or clear the toolchain for a family
    SetToolchain {
        #[arg(value_enum)]
        family: FamilyArg,
        #[arg(required_unless_present = "clear")]
        path: Option<PathBuf>,
        #[arg(long, conflicts_with = "path")]
        clear: bool,
    },
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum FamilyArg {
    Python,
    Java,
    #[value(alias = "node")]
    Nodejs,
    Delphi,
}

impl From<FamilyArg> for ToolchainFamily {
    fn from(value: FamilyArg) -> Self {
        match value {
            FamilyArg::Python => Self::Python,
            FamilyArg::Java => Self::Java,
            FamilyArg::Nodejs => Self::Nodejs,
            FamilyArg::Delphi => Self::Delphi,
        }
    }
}

/// Where snippet or script code comes from; stdin when neither is given.
#[derive(Debug, Args)]
struct SourceArgs {
    #[arg(long, short = 'c', conflicts_with = "file")]
    code: Option<String>,
    #[arg(long)]
    file: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct ExecArgs {
    #[arg(long, help = "Print the result as JSON instead of streaming output")]
    json: bool,
    #[arg(long, help = "Override the configured timeout (milliseconds)")]
    timeout_ms: Option<u64>,
}

/// Configure color output based on CLI flag and environment
fn configure_colors(mode: ColorMode) {
    let use_color = match mode {
        ColorMode::Always => true,
        ColorMode::Never => false,
        ColorMode::Auto => {
            // Respect NO_COLOR environment variable
            if std::env::var("NO_COLOR").is_ok() {
                false
            } else {
                // Check if stderr supports color (where we output diagnostics)
                supports_color::on(supports_color::Stream::Stderr).is_some()
            }
        }
    };

    miette::set_hook(Box::new(move |_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .color(use_color)
                .unicode(use_color)
                .build(),
        )
    }))
    .ok(); // Ignore error if hook already set
}

/// Logs go to stderr so stdout stays machine-readable.
fn init_logging(verbose: u8) {
    let filter = match verbose {
        0 => tracing_subscriber::EnvFilter::try_from_env(LOG_ENV_VAR)
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        1 => tracing_subscriber::EnvFilter::new("debug"),
        _ => tracing_subscriber::EnvFilter::new("trace"),
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .try_init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    configure_colors(cli.color);
    init_logging(cli.verbose);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .into_diagnostic()?;
    runtime.block_on(run(cli))
}

async fn run(cli: Cli) -> Result<()> {
    let settings = cli.settings;
    match cli.command {
        Commands::Completions { shell } => cmd_completions(shell),
        Commands::Settings(SettingsCommand::Path) => cmd_settings_path(settings.as_deref()),
        Commands::Serve { stdio } => cmd_serve(settings.as_deref(), stdio).await,
        command => {
            let engine = open_engine(settings.as_deref())?;
            let cancel = install_interrupt_handler();
            match command {
                Commands::Toolchains { json } => cmd_toolchains(&engine, json, &cancel).await,
                Commands::Project(command) => cmd_project(&engine, command, &cancel).await,
                Commands::Snippet(command) => cmd_snippet(&engine, command, &cancel).await,
                Commands::Fs(command) => cmd_fs(&engine, command).await,
                Commands::Guard(GuardCommand::Check { path, json }) => cmd_guard_check(&engine, &path, json),
                Commands::Settings(command) => cmd_settings(&engine, command),
                Commands::Completions { .. } | Commands::Serve { .. } => Ok(()),
            }
        }
    }
}

fn settings_store(path: Option<&Path>) -> EngineResult<SettingsStore> {
    match path {
        Some(path) => Ok(SettingsStore::new(path)),
        None => SettingsStore::default_location(),
    }
}

fn open_engine(settings: Option<&Path>) -> Result<Engine> {
    let store = settings_store(settings)?;
    Ok(Engine::open(store)?)
}

/// Ctrl-C cancels the in-flight run; the runner then tears the process tree down.
fn install_interrupt_handler() -> CancellationToken {
    let token = CancellationToken::new();
    let handler_token = token.clone();
    if let Err(err) = ctrlc::set_handler(move || handler_token.cancel()) {
        tracing::warn!(error = %err, "failed to install Ctrl-C handler");
    }
    token
}

// =============================================================================
// Command Handlers
// =============================================================================

/// Handle the toolchains command.
async fn cmd_toolchains(engine: &Engine, json: bool, cancel: &CancellationToken) -> Result<()> {
    let spinner = progress::Spinner::start("probing toolchains", !json);
    let status = engine.detect_toolchains(Some(cancel)).await;
    spinner.finish();
    if json {
        return print_json(&status);
    }
    for family in ToolchainFamily::ALL {
        println!("{family}:");
        let found = status.family(family);
        if found.is_empty() {
            println!("  (none found)");
        }
        for toolchain in found {
            println!("  {}  {}", toolchain.name, toolchain.path.display());
        }
    }
    Ok(())
}

/// Handle the project subcommands.
async fn cmd_project(engine: &Engine, command: ProjectCommand, cancel: &CancellationToken) -> Result<()> {
    match command {
        ProjectCommand::Create {
            project_type,
            name,
            base,
            json,
        } => {
            let base = match base.map_or_else(|| default_base(engine, project_type), Ok) {
                Ok(base) => base,
                Err(err) => fail(json, err),
            };
            let options = ExecOptions::default().with_cancel(Some(cancel.clone()));
            let spinner = progress::Spinner::start("creating project", !json);
            let created = engine.create_project(project_type, &name, &base, &options).await;
            spinner.finish();
            finish(json, created, |project| {
                println!(
                    "created {} project '{}' at {}",
                    project.project_type,
                    project.name,
                    project.path.display()
                );
            })
        }
        ProjectCommand::Delete { path, json } => {
            let deleted = engine.delete_project(&path).map(|()| serde_json::json!({"deleted": path}));
            finish(json, deleted, |_| println!("deleted {}", path.display()))
        }
        ProjectCommand::Show { path, plan, json } => cmd_project_show(engine, &path, plan, json),
        ProjectCommand::List { json } => finish(json, engine.list_projects(), |projects| {
            for project in projects {
                println!(
                    "{:<8} {:<24} {}",
                    project.project_type.as_str(),
                    project.name,
                    project.path.display()
                );
            }
        }),
        ProjectCommand::Run { path, exec } => {
            let project = load_or_fail(engine, &path, exec.json);
            execute(exec, cancel, |options| async move {
                engine.run_project(&project, &options).await
            })
            .await
        }
        ProjectCommand::Install { path, exec } => {
            let project = load_or_fail(engine, &path, exec.json);
            execute(exec, cancel, |options| async move {
                engine.install_dependencies(&project, &options).await
            })
            .await
        }
        ProjectCommand::Script { path, source, exec } => {
            let project = load_or_fail(engine, &path, exec.json);
            let code = read_source(&source)?;
            execute(exec, cancel, |options| async move {
                engine.run_script(&project, &code, &options).await
            })
            .await
        }
        ProjectCommand::Open { path, web, json } => {
            let opened = if web {
                engine.open_web_app(&path).await
            } else {
                engine.open_folder(&path).await
            };
            emit_execution(json, opened, 0)
        }
    }
}

fn default_base(engine: &Engine, project_type: ProjectType) -> EngineResult<PathBuf> {
    engine
        .settings()
        .project_roots
        .get(project_type)
        .map(Path::to_path_buf)
        .ok_or_else(|| {
            EngineError::invalid_argument(
                "no project root is configured for this type",
                serde_json::json!({
                    "type": project_type,
                    "fix": format!("Pass --base or run: projbox settings set-root {project_type} <dir>"),
                }),
            )
        })
}

fn load_or_fail(engine: &Engine, path: &Path, json: bool) -> projbox::CodeProject {
    match engine.load_project(path) {
        Ok(project) => project,
        Err(err) => fail(json, err),
    }
}

fn cmd_project_show(engine: &Engine, path: &Path, plan: bool, json: bool) -> Result<()> {
    let project = load_or_fail(engine, path, json);
    let launch = if plan {
        match engine.plan_project(&project) {
            Ok(launch) => Some(launch),
            Err(err) => fail(json, err),
        }
    } else {
        None
    };
    if json {
        return print_json(&serde_json::json!({"project": project, "plan": launch}));
    }
    println!("name: {}", project.name);
    println!("type: {}", project.project_type);
    println!("id:   {}", project.id);
    println!("path: {}", project.path.display());
    if let Some(launch) = launch {
        let rendered = serde_json::to_string_pretty(&launch).into_diagnostic()?;
        println!("plan: {rendered}");
    }
    Ok(())
}

/// Handle the snippet subcommands.
async fn cmd_snippet(engine: &Engine, command: SnippetCommand, cancel: &CancellationToken) -> Result<()> {
    let (language, source, exec) = match command {
        SnippetCommand::Python { source, exec } => (SnippetLanguage::Python, source, exec),
        SnippetCommand::Node { source, exec } => (SnippetLanguage::Nodejs, source, exec),
        SnippetCommand::Html { source, exec } => (SnippetLanguage::Html, source, exec),
    };
    let code = read_source(&source)?;
    execute(exec, cancel, |options| async move {
        engine.run_snippet(language, &code, &options).await
    })
    .await
}

/// Handle the fs subcommands.
async fn cmd_fs(engine: &Engine, command: FsCommand) -> Result<()> {
    match command {
        FsCommand::Ls { path, json } => finish(json, engine.read_dir(&path), |nodes| {
            for node in nodes {
                let suffix = if node.is_directory { "/" } else { "" };
                println!("{}{suffix}", node.name);
            }
        }),
        FsCommand::Cat { path, json } => finish(json, engine.read_file(&path), |content| print!("{content}")),
        FsCommand::Write { path, content, json } => {
            let content = match content {
                Some(content) => content,
                None => read_stdin()?,
            };
            let written = engine
                .write_file(&path, &content)
                .map(|()| serde_json::json!({"written": path, "bytes": content.len()}));
            finish(json, written, |_| println!("wrote {} bytes to {}", content.len(), path.display()))
        }
        FsCommand::Add {
            source,
            target_dir,
            json,
        } => finish(json, engine.add_file_from_path(&source, &target_dir), |copied| {
            println!("added {}", copied.display());
        }),
        FsCommand::Files { path, json } => finish(json, engine.get_all_files(&path), |files| {
            for file in files {
                println!("{file}");
            }
        }),
        FsCommand::Tree { path, json } => finish(json, engine.get_file_tree(&path), |tree| print!("{tree}")),
        FsCommand::Pick { json } => {
            let picked = engine.select_directory().await;
            if json {
                print_json(&picked)?;
            } else if let Some(dir) = &picked {
                println!("{}", dir.display());
            }
            if picked.is_none() {
                std::process::exit(1);
            }
            Ok(())
        }
    }
}

/// Handle guard check. Exits with the access-denied code when the path is refused.
fn cmd_guard_check(engine: &Engine, path: &Path, json: bool) -> Result<()> {
    let explanation = engine.explain_path(path);
    if json {
        print_json(&explanation)?;
    } else if explanation.allowed {
        let root = explanation
            .matched_root
            .as_ref()
            .map(|root| root.display().to_string())
            .unwrap_or_default();
        println!("allowed: {} (root: {root})", explanation.normalized.display());
    } else {
        println!(
            "denied: {} ({})",
            explanation.normalized.display(),
            explanation.reason.as_deref().unwrap_or("outside the project roots")
        );
    }
    if !explanation.allowed {
        std::process::exit(projbox::ErrorCode::AccessDenied.exit_code());
    }
    Ok(())
}

/// Handle the settings subcommands.
fn cmd_settings(engine: &Engine, command: SettingsCommand) -> Result<()> {
    let mut settings = engine.settings();
    match command {
        SettingsCommand::Show { json } => {
            if json {
                return print_json(&settings);
            }
            let rendered = serde_json::to_string_pretty(&settings).into_diagnostic()?;
            println!("{rendered}");
            return Ok(());
        }
        SettingsCommand::Path => return Ok(()),
        SettingsCommand::SetRoot {
            project_type, path, ..
        } => settings.project_roots.set(project_type, path),
        SettingsCommand::SetToolchain { family, path, .. } => {
            settings.toolchains.set(family.into(), path);
        }
    }
    if let Err(err) = engine.save_settings(settings) {
        fail(false, err);
    }
    if let Some(path) = engine.settings_path() {
        eprintln!("settings saved to {}", path.display());
    }
    Ok(())
}

fn cmd_settings_path(settings: Option<&Path>) -> Result<()> {
    let store = settings_store(settings)?;
    println!("{}", store.path().display());
    Ok(())
}

/// Handle the serve command.
async fn cmd_serve(settings: Option<&Path>, stdio: bool) -> Result<()> {
    if !stdio {
        fail(
            false,
            EngineError::invalid_argument(
                "serve requires --stdio",
                serde_json::json!({"fix": "Run: projbox serve --stdio"}),
            ),
        );
    }
    let engine = Arc::new(open_engine(settings)?);
    projbox::driver::run_driver(engine).await?;
    Ok(())
}

/// Handle the completions command.
#[allow(clippy::unnecessary_wraps)] // Consistent with other command handlers
fn cmd_completions(shell: Shell) -> Result<()> {
    let mut cmd = Cli::command();
    let name = cmd.get_name().to_string();
    generate(shell, &mut cmd, name, &mut io::stdout());
    Ok(())
}

// =============================================================================
// Output
// =============================================================================

fn read_source(source: &SourceArgs) -> Result<String> {
    if let Some(code) = &source.code {
        return Ok(code.clone());
    }
    if let Some(file) = &source.file {
        return std::fs::read_to_string(file).into_diagnostic();
    }
    if io::stdin().is_terminal() {
        eprintln!("reading code from stdin; finish with Ctrl-D");
    }
    read_stdin()
}

fn read_stdin() -> Result<String> {
    let mut buffer = String::new();
    io::stdin().read_to_string(&mut buffer).into_diagnostic()?;
    Ok(buffer)
}

/// Run a process-backed operation. Without `--json` child output is streamed
/// as it arrives. The CLI exits with the run's exit code.
async fn execute<F, Fut>(exec: ExecArgs, cancel: &CancellationToken, operation: F) -> Result<()>
where
    F: FnOnce(ExecOptions) -> Fut,
    Fut: std::future::Future<Output = EngineResult<ExecutionResult>>,
{
    let mut options = ExecOptions::default()
        .with_cancel(Some(cancel.clone()))
        .with_timeout(exec.timeout_ms.filter(|ms| *ms > 0).map(Duration::from_millis));
    let mut printer = None;
    if !exec.json {
        let (sink, lines) = mpsc::unbounded_channel();
        options = options.with_sink(sink);
        printer = Some(spawn_printer(lines));
    }

    // The operation owns the options, so the sink closes when it returns.
    let result = operation(options).await;
    let streamed = match printer {
        Some(printer) => printer.await.unwrap_or_default(),
        None => 0,
    };
    emit_execution(exec.json, result, streamed)
}

fn spawn_printer(mut lines: mpsc::UnboundedReceiver<OutputLine>) -> JoinHandle<usize> {
    tokio::spawn(async move {
        let mut count = 0;
        while let Some(line) = lines.recv().await {
            match line.stream {
                OutputStream::Stdout => println!("{}", line.line),
                OutputStream::Stderr => eprintln!("{}", line.line),
            }
            count += 1;
        }
        count
    })
}

/// Print an execution result and exit with its code when it is not zero.
///
/// `streamed` counts lines already shown live; in that case only the final
/// annotation line is repeated.
fn emit_execution(json: bool, result: EngineResult<ExecutionResult>, streamed: usize) -> Result<()> {
    let result = match result {
        Ok(result) => result,
        Err(err) => fail(json, err),
    };
    if json {
        print_json(&result)?;
    } else if streamed == 0 {
        print!("{}", with_newline(&result.stdout));
        eprint!("{}", with_newline(&result.stderr));
    } else if matches!(
        result.outcome,
        ExecOutcome::Failed { .. } | ExecOutcome::TimedOut { .. } | ExecOutcome::Cancelled
    ) {
        if let Some(annotation) = result.stderr.lines().last() {
            eprintln!("{annotation}");
        }
    }
    let code = result.exit_code();
    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}

fn with_newline(text: &str) -> String {
    if text.is_empty() || text.ends_with('\n') {
        text.to_string()
    } else {
        format!("{text}\n")
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    let payload = serde_json::to_string(value).into_diagnostic()?;
    println!("{payload}");
    Ok(())
}

fn finish<T: Serialize>(json: bool, result: EngineResult<T>, render: impl FnOnce(&T)) -> Result<()> {
    match result {
        Ok(value) => {
            if json {
                print_json(&value)?;
            } else {
                render(&value);
            }
            Ok(())
        }
        Err(err) => fail(json, err),
    }
}

/// Report `err` and exit with its code. With `--json` the wire-format error
/// goes to stdout; otherwise a diagnostic goes to stderr.
fn fail(json: bool, err: EngineError) -> ! {
    let code = exit_code_for_error(&err);
    if json {
        if let Ok(payload) = serde_json::to_string(&err.to_error_info()) {
            println!("{payload}");
        }
    } else {
        eprintln!("{:?}", miette::Report::new(err));
    }
    std::process::exit(code);
}

fn exit_code_for_error(err: &EngineError) -> i32 {
    err.exit_code()
}
