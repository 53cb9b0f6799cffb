//! Snippet Executor: run a piece of code through a temporary file.
//!
//! Script files live in a [`tempfile::NamedTempFile`], so they are removed on
//! every exit path, including when the awaiting future is dropped. HTML
//! snippets are the exception: the browser needs the file after we return.

use crate::engine::Session;
use crate::error::{EngineError, EngineResult};
use crate::launch::open_in_browser;
use crate::model::{CodeProject, ExecutionResult, ProjectType, ToolchainFamily};
use crate::project::project_dir;
use crate::runner::{self, CommandSpec, ExecOptions};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tempfile::NamedTempFile;

const SNIPPET_PREFIX: &str = "projbox-snippet-";
const SCRIPT_PREFIX: &str = ".projbox-script-";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SnippetLanguage {
    Python,
    Nodejs,
    Html,
}

impl SnippetLanguage {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Python => "python",
            Self::Nodejs => "nodejs",
            Self::Html => "html",
        }
    }

    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Python => ".py",
            Self::Nodejs => ".js",
            Self::Html => ".html",
        }
    }
}

impl fmt::Display for SnippetLanguage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SnippetLanguage {
    type Err = EngineError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "python" | "py" => Ok(Self::Python),
            "nodejs" | "node" | "js" => Ok(Self::Nodejs),
            "html" | "web" => Ok(Self::Html),
            _ => Err(EngineError::invalid_argument(
                "unknown snippet language",
                serde_json::json!({
                    "received": value,
                    "expected": ["python", "nodejs", "html"],
                }),
            )),
        }
    }
}

/// Run `code` outside any project, in the scratch directory.
pub async fn run(
    session: &Session,
    language: SnippetLanguage,
    code: &str,
    options: &ExecOptions,
) -> EngineResult<ExecutionResult> {
    let scratch = scratch_dir(session)?;
    let platform = session.platform;
    let interpreter = match language {
        SnippetLanguage::Python => interpreter(session, ToolchainFamily::Python, platform.default_python()),
        SnippetLanguage::Nodejs => interpreter(session, ToolchainFamily::Nodejs, platform.default_node()),
        SnippetLanguage::Html => {
            let page = persist_page(&scratch, code)?;
            return Ok(open_in_browser(session, &page).await);
        }
    };

    let file = stage(&scratch, SNIPPET_PREFIX, language.extension(), code)?;
    let spec = interpreter
        .arg_path(file.path())
        .envs(&session.settings.exec.env);
    tracing::debug!(%language, file = %file.path().display(), "running snippet");
    let options = session.exec_options(options, session.settings.exec.snippet_timeout());
    let result = runner::run(&spec, &options).await;
    discard(file);
    Ok(result)
}

/// Run `code` inside a project, using the project's interpreter and
/// directory. Only Python and Node.js projects accept scripts.
pub async fn run_in_project(
    session: &Session,
    project: &CodeProject,
    code: &str,
    options: &ExecOptions,
) -> EngineResult<ExecutionResult> {
    let dir = project_dir(session, project)?;
    let platform = session.platform;
    let (interpreter, extension) = match project.project_type {
        ProjectType::Python => {
            let venv_python = platform.venv_python(&dir);
            let interpreter = if venv_python.is_file() {
                CommandSpec::from_path(&venv_python)
            } else {
                interpreter(session, ToolchainFamily::Python, platform.default_python())
            };
            (interpreter, SnippetLanguage::Python.extension())
        }
        ProjectType::Nodejs => (
            interpreter(session, ToolchainFamily::Nodejs, platform.default_node()),
            SnippetLanguage::Nodejs.extension(),
        ),
        ProjectType::Java | ProjectType::Delphi | ProjectType::Webapp => {
            return Ok(ExecutionResult::not_applicable(format!(
                "Script execution is not supported for {} projects",
                project.project_type
            )));
        }
    };

    let file = stage(&dir, SCRIPT_PREFIX, extension, code)?;
    let spec = interpreter
        .arg_path(file.path())
        .cwd(&dir)
        .envs(&session.settings.exec.env);
    tracing::debug!(project = %project.name, file = %file.path().display(), "running project script");
    let options = session.exec_options(options, session.settings.exec.snippet_timeout());
    let result = runner::run(&spec, &options).await;
    discard(file);
    Ok(result)
}

fn interpreter(session: &Session, family: ToolchainFamily, fallback: &str) -> CommandSpec {
    session
        .settings
        .toolchains
        .get(family)
        .map_or_else(|| CommandSpec::new(fallback), CommandSpec::from_path)
}

fn scratch_dir(session: &Session) -> EngineResult<PathBuf> {
    match &session.settings.exec.scratch_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .map_err(|err| EngineError::io("failed to create scratch directory", dir, err))?;
            Ok(dir.clone())
        }
        None => Ok(std::env::temp_dir()),
    }
}

fn stage(dir: &Path, prefix: &str, suffix: &str, code: &str) -> EngineResult<NamedTempFile> {
    let mut file = tempfile::Builder::new()
        .prefix(prefix)
        .suffix(suffix)
        .rand_bytes(12)
        .tempfile_in(dir)
        .map_err(|err| EngineError::io("failed to create temporary script", dir, err))?;
    let path = file.path().to_path_buf();
    file.write_all(code.as_bytes())
        .and_then(|()| file.flush())
        .map_err(|err| EngineError::io("failed to write temporary script", &path, err))?;
    Ok(file)
}

fn discard(file: NamedTempFile) {
    let path = file.path().to_path_buf();
    if let Err(err) = file.close() {
        tracing::warn!(path = %path.display(), error = %err, "failed to remove temporary script");
    }
}

/// Write an HTML snippet that outlives this call.
fn persist_page(dir: &Path, code: &str) -> EngineResult<PathBuf> {
    let file = stage(dir, SNIPPET_PREFIX, SnippetLanguage::Html.extension(), code)?;
    let (_, path) = file
        .keep()
        .map_err(|err| EngineError::io("failed to keep HTML snippet", dir, err.error))?;
    Ok(path)
}
