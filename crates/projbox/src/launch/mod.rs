//! Launch Resolution: decide how a project runs, then run it.
//!
//! [`plan`] is pure inspection of the project directory and settings, so the
//! CLI can show what would happen without starting anything.

use crate::engine::Session;
use crate::error::EngineResult;
use crate::model::{CodeProject, ExecutionResult, ProjectType, ToolchainFamily};
use crate::project::{pascal_identifier, project_dir};
use crate::runner::{self, CommandSpec, ExecOptions};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Python entry points, in priority order.
pub const PYTHON_ENTRIES: &[&str] = &["main.py", "app.py", "run.py", "__main__.py", "index.py"];

/// Node.js entry points tried after the manifest, in priority order.
pub const NODE_ENTRIES: &[&str] = &[
    "index.ts",
    "main.ts",
    "app.ts",
    "server.ts",
    "index.js",
    "main.js",
    "app.js",
    "server.js",
    "index.mjs",
];

const WEB_ENTRY: &str = "index.html";

/// How a project will be started.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LaunchPlan {
    /// Run a child process and capture its output.
    Command {
        spec: CommandSpec,
        entry: Option<PathBuf>,
    },
    /// Hand a page to the default browser.
    Browser { page: PathBuf },
    /// Open a console window the user interacts with directly.
    ExternalTerminal { spec: CommandSpec, entry: PathBuf },
    /// Nothing runnable was found.
    Unavailable { reason: String, tried: Vec<String> },
}

impl LaunchPlan {
    fn unavailable(reason: impl Into<String>, tried: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self::Unavailable {
            reason: reason.into(),
            tried: tried.into_iter().map(Into::into).collect(),
        }
    }
}

/// Resolve the launch plan for `project`. Fails only when the guard refuses
/// the project path or the directory is missing.
pub fn plan(session: &Session, project: &CodeProject) -> EngineResult<LaunchPlan> {
    let dir = project_dir(session, project)?;
    let plan = match project.project_type {
        ProjectType::Python => plan_python(session, project, &dir),
        ProjectType::Nodejs => plan_node(session, &dir),
        ProjectType::Java => plan_java(session, &dir),
        ProjectType::Delphi => plan_delphi(session, &dir),
        ProjectType::Webapp => plan_web(&dir),
    };
    tracing::debug!(project = %project.name, ?plan, "launch plan resolved");
    Ok(plan)
}

fn selected_or(session: &Session, family: ToolchainFamily, fallback: &str) -> CommandSpec {
    session
        .settings
        .toolchains
        .get(family)
        .map_or_else(|| CommandSpec::new(fallback), CommandSpec::from_path)
}

fn plan_python(session: &Session, project: &CodeProject, dir: &Path) -> LaunchPlan {
    let Some(entry) = PYTHON_ENTRIES.iter().map(|name| dir.join(name)).find(|p| p.is_file()) else {
        return LaunchPlan::unavailable("No Python entry point found", PYTHON_ENTRIES.iter().copied());
    };
    let platform = session.platform;

    if platform.supports_external_terminal() && platform.venv_activate_script(dir).is_file() {
        let script = platform.activate_and_run_script(dir, &entry);
        return LaunchPlan::ExternalTerminal {
            spec: platform
                .external_terminal_command(&project.name, &script, dir)
                .envs(&session.settings.exec.env),
            entry,
        };
    }

    let venv_python = platform.venv_python(dir);
    let interpreter = if venv_python.is_file() {
        CommandSpec::from_path(&venv_python)
    } else {
        tracing::debug!(path = %venv_python.display(), "no virtual environment; using selected interpreter");
        selected_or(session, ToolchainFamily::Python, platform.default_python())
    };
    LaunchPlan::Command {
        spec: interpreter
            .arg_path(&entry)
            .cwd(dir)
            .envs(&session.settings.exec.env),
        entry: Some(entry),
    }
}

fn plan_node(session: &Session, dir: &Path) -> LaunchPlan {
    let platform = session.platform;
    let manifest = read_manifest(dir);
    let mut tried = Vec::new();

    let has_start = manifest
        .as_ref()
        .and_then(|m| m.pointer("/scripts/start"))
        .is_some_and(serde_json::Value::is_string);
    if has_start {
        return LaunchPlan::Command {
            spec: CommandSpec::new(platform.npm())
                .arg("start")
                .cwd(dir)
                .envs(&session.settings.exec.env),
            entry: None,
        };
    }
    tried.push("package.json scripts.start".to_string());

    let declared = manifest
        .as_ref()
        .and_then(|m| m.get("main"))
        .and_then(serde_json::Value::as_str)
        .map(str::to_string);
    let candidates = declared
        .iter()
        .map(String::as_str)
        .chain(NODE_ENTRIES.iter().copied());
    for name in candidates {
        tried.push(name.to_string());
        let candidate = dir.join(name);
        // `main` may point anywhere; only follow it inside the boundary.
        if !candidate.is_file() || !session.guard.is_allowed(&candidate) {
            continue;
        }
        let spec = if candidate.extension().is_some_and(|ext| ext == "ts") {
            CommandSpec::new(platform.npx()).arg("ts-node").arg_path(&candidate)
        } else {
            selected_or(session, ToolchainFamily::Nodejs, platform.default_node()).arg_path(&candidate)
        };
        return LaunchPlan::Command {
            spec: spec.cwd(dir).envs(&session.settings.exec.env),
            entry: Some(candidate),
        };
    }

    let page = dir.join(WEB_ENTRY);
    if page.is_file() {
        return LaunchPlan::Browser { page };
    }
    tried.push(WEB_ENTRY.to_string());
    LaunchPlan::unavailable("No Node.js entry point found", tried)
}

fn read_manifest(dir: &Path) -> Option<serde_json::Value> {
    let path = dir.join("package.json");
    let data = fs::read_to_string(&path).ok()?;
    match serde_json::from_str(&data) {
        Ok(manifest) => Some(manifest),
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "ignoring malformed package.json");
            None
        }
    }
}

fn plan_java(session: &Session, dir: &Path) -> LaunchPlan {
    let pom = dir.join("pom.xml");
    if !pom.is_file() {
        return LaunchPlan::unavailable("No pom.xml found", ["pom.xml"]);
    }
    LaunchPlan::Command {
        spec: CommandSpec::new(session.platform.maven())
            .args(["-q", "compile", "exec:java"])
            .cwd(dir)
            .envs(&session.settings.exec.env),
        entry: Some(pom),
    }
}

fn plan_delphi(session: &Session, dir: &Path) -> LaunchPlan {
    let Some(compiler) = session.settings.toolchains.get(ToolchainFamily::Delphi) else {
        return LaunchPlan::unavailable(
            "No Delphi compiler is selected; choose one in settings",
            ["toolchains.delphi"],
        );
    };
    if !compiler.is_file() {
        return LaunchPlan::unavailable(
            format!("Selected Delphi compiler not found at {}", compiler.display()),
            [compiler.display().to_string()],
        );
    }

    let stem = dir
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let expected = format!("{}.dpr", pascal_identifier(&stem));
    let source = Some(dir.join(&expected))
        .filter(|p| p.is_file())
        .or_else(|| first_with_extension(dir, "dpr"));
    let Some(source) = source else {
        return LaunchPlan::unavailable("No Delphi program source found", [expected, "*.dpr".to_string()]);
    };
    LaunchPlan::Command {
        spec: CommandSpec::from_path(compiler)
            .args(["-B", "-CC"])
            .arg_path(&source)
            .cwd(dir)
            .envs(&session.settings.exec.env),
        entry: Some(source),
    }
}

fn first_with_extension(dir: &Path, extension: &str) -> Option<PathBuf> {
    let mut matches: Vec<PathBuf> = fs::read_dir(dir)
        .ok()?
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_file()
                && path
                    .extension()
                    .is_some_and(|ext| ext.eq_ignore_ascii_case(extension))
        })
        .collect();
    matches.sort();
    matches.into_iter().next()
}

fn plan_web(dir: &Path) -> LaunchPlan {
    let page = dir.join(WEB_ENTRY);
    if page.is_file() {
        LaunchPlan::Browser { page }
    } else {
        LaunchPlan::unavailable("No index.html found", [WEB_ENTRY])
    }
}

/// Resolve and execute. Captured commands use the configured run timeout
/// unless the caller set one.
pub async fn run_project(
    session: &Session,
    project: &CodeProject,
    options: &ExecOptions,
) -> EngineResult<ExecutionResult> {
    let plan = plan(session, project)?;
    tracing::info!(project = %project.name, project_type = %project.project_type, "running project");
    Ok(execute(session, plan, options).await)
}

async fn execute(session: &Session, plan: LaunchPlan, options: &ExecOptions) -> ExecutionResult {
    match plan {
        LaunchPlan::Command { spec, .. } => {
            let options = session.exec_options(options, session.settings.exec.run_timeout());
            runner::run(&spec, &options).await
        }
        LaunchPlan::Browser { page } => open_in_browser(session, &page).await,
        LaunchPlan::ExternalTerminal { spec, .. } => runner::launch_detached(&spec),
        LaunchPlan::Unavailable { reason, tried } => {
            ExecutionResult::unavailable(format!("{reason}. Tried: {}", tried.join(", ")))
        }
    }
}

/// Open the project's `index.html` in the default browser.
pub async fn open_web_app(session: &Session, path: &Path) -> EngineResult<ExecutionResult> {
    let dir = session.guard.check(path)?;
    let page = dir.join(WEB_ENTRY);
    if !page.is_file() {
        return Ok(ExecutionResult::unavailable(format!(
            "{WEB_ENTRY} not found in {}",
            dir.display()
        )));
    }
    Ok(open_in_browser(session, &page).await)
}

pub(crate) async fn open_in_browser(session: &Session, page: &Path) -> ExecutionResult {
    let spec = session.platform.open_command(page);
    let options = ExecOptions::default().with_timeout(session.settings.exec.probe_timeout());
    let result = runner::run(&spec, &options).await;
    if result.success() {
        tracing::info!(page = %page.display(), "opened in browser");
        ExecutionResult::started(format!("Opened {} in the default browser", page.display()))
    } else {
        result
    }
}
