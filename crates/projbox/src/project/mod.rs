//! Project Lifecycle: create, delete, load, list, install dependencies.

mod scaffold;

pub use scaffold::{npm_package_name, pascal_identifier};

use crate::engine::Session;
use crate::error::{EngineError, EngineResult};
use crate::model::{
    CodeProject, ExecutionResult, ProjectId, ProjectMetadata, ProjectType, PROJECT_METADATA_FILE,
};
use crate::policy::normalize_lexically;
use crate::runner::{self, CommandSpec, ExecOptions};
use crate::workspace::is_noise_dir;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

/// Reject names that are empty, path-like, or would land outside the base.
pub fn validate_name(name: &str) -> EngineResult<()> {
    let reason = if name.trim().is_empty() {
        Some("name is empty")
    } else if name != name.trim() {
        Some("name has leading or trailing whitespace")
    } else if name == "." || name == ".." {
        Some("name is a relative path component")
    } else if name.contains(['/', '\\']) {
        Some("name contains a path separator")
    } else if name.chars().any(char::is_control) {
        Some("name contains control characters")
    } else if name.starts_with('.') {
        Some("name starts with a dot")
    } else {
        None
    };
    match reason {
        None => Ok(()),
        Some(reason) => Err(EngineError::invalid_argument(
            "invalid project name",
            serde_json::json!({"name": name, "reason": reason}),
        )),
    }
}

/// Create `<base>/<name>` and scaffold it for `project_type`.
///
/// A target that already exists is a conflict and is left untouched. Any
/// failure after the directory is created removes it again.
pub async fn create(
    session: &Session,
    project_type: ProjectType,
    name: &str,
    base: &Path,
    options: &ExecOptions,
) -> EngineResult<CodeProject> {
    validate_name(name)?;
    let base = session.guard.check(base)?;
    let target = session.guard.check(&base.join(name))?;

    if fs::symlink_metadata(&target).is_ok() {
        return Err(conflict(&target));
    }
    fs::create_dir_all(&base)
        .map_err(|err| EngineError::io("failed to create base directory", &base, err))?;
    if let Err(err) = fs::create_dir(&target) {
        return Err(match err.kind() {
            std::io::ErrorKind::AlreadyExists => conflict(&target),
            _ => EngineError::io("failed to create project directory", &target, err),
        });
    }

    let project = CodeProject {
        id: ProjectId::new(),
        name: name.to_string(),
        project_type,
        path: target.clone(),
    };
    let populated = match scaffold::scaffold(session, project_type, name, &target, options).await {
        Ok(()) => write_metadata(&project),
        Err(err) => Err(err),
    };
    if let Err(err) = populated {
        tracing::warn!(path = %target.display(), error = %err, "project creation failed; rolling back");
        if let Err(cleanup) = fs::remove_dir_all(&target) {
            tracing::error!(path = %target.display(), error = %cleanup, "rollback left a partial project behind");
        }
        return Err(err);
    }

    tracing::info!(
        project = %project.name,
        project_type = %project_type,
        path = %target.display(),
        "project created"
    );
    Ok(project)
}

fn conflict(target: &Path) -> EngineError {
    EngineError::conflict(
        "a file or directory with that name already exists",
        serde_json::json!({
            "path": target.display().to_string(),
            "fix": "Choose a different project name",
        }),
    )
}

fn write_metadata(project: &CodeProject) -> EngineResult<()> {
    let created_at = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or_default();
    let metadata = ProjectMetadata {
        id: project.id,
        name: project.name.clone(),
        project_type: project.project_type,
        created_at,
    };
    let path = project.path.join(PROJECT_METADATA_FILE);
    let data = serde_json::to_string_pretty(&metadata)
        .map_err(|err| EngineError::internal(format!("failed to serialize project metadata: {err}")))?;
    fs::write(&path, data + "\n")
        .map_err(|err| EngineError::io("failed to write project metadata", &path, err))
}

/// Recursively remove a project directory. Removing a missing one succeeds.
pub fn delete(session: &Session, path: &Path) -> EngineResult<()> {
    let target = session.guard.check_descendant(path)?;
    let metadata = match fs::symlink_metadata(&target) {
        Ok(metadata) => metadata,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(path = %target.display(), "project already absent");
            return Ok(());
        }
        Err(err) => return Err(EngineError::io("failed to inspect project", &target, err)),
    };
    let removed = if metadata.is_dir() {
        fs::remove_dir_all(&target)
    } else {
        fs::remove_file(&target)
    };
    removed.map_err(|err| EngineError::io("failed to delete project", &target, err))?;
    tracing::info!(path = %target.display(), "project deleted");
    Ok(())
}

/// Describe the project at `path`.
///
/// Uses the metadata record when present; otherwise the type is inferred from
/// the configured root the directory sits in, then from marker files.
pub fn load(session: &Session, path: &Path) -> EngineResult<CodeProject> {
    let dir = session.guard.check(path)?;
    if !dir.is_dir() {
        return Err(EngineError::not_found(
            "project directory does not exist",
            serde_json::json!({"path": dir.display().to_string()}),
        ));
    }
    if let Some(metadata) = read_metadata(&dir) {
        return Ok(CodeProject {
            id: metadata.id,
            name: metadata.name,
            project_type: metadata.project_type,
            path: dir,
        });
    }

    let project_type = root_type(session, &dir)
        .or_else(|| marker_type(&dir))
        .ok_or_else(|| {
            EngineError::invalid_argument(
                "cannot determine the project type",
                serde_json::json!({
                    "path": dir.display().to_string(),
                    "fix": "Place the directory under the project root for its type",
                }),
            )
        })?;
    let name = dir
        .file_name()
        .map_or_else(|| dir.display().to_string(), |n| n.to_string_lossy().into_owned());
    Ok(CodeProject {
        id: ProjectId::for_unmanaged_path(&dir),
        name,
        project_type,
        path: dir,
    })
}

fn read_metadata(dir: &Path) -> Option<ProjectMetadata> {
    let path = dir.join(PROJECT_METADATA_FILE);
    let data = fs::read_to_string(&path).ok()?;
    match serde_json::from_str(&data) {
        Ok(metadata) => Some(metadata),
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "ignoring malformed project metadata");
            None
        }
    }
}

/// Type of the single configured root that is the direct parent of `dir`.
fn root_type(session: &Session, dir: &Path) -> Option<ProjectType> {
    let parent = dir.parent()?;
    let mut matches = session
        .settings
        .project_roots
        .configured()
        .filter(|(_, root)| normalize_lexically(root) == parent)
        .map(|(project_type, _)| project_type);
    let first = matches.next()?;
    matches.next().is_none().then_some(first)
}

fn marker_type(dir: &Path) -> Option<ProjectType> {
    let has = |name: &str| dir.join(name).is_file();
    if has("package.json") {
        return Some(ProjectType::Nodejs);
    }
    if has("pom.xml") {
        return Some(ProjectType::Java);
    }
    if has("requirements.txt") || has("main.py") || dir.join("venv").is_dir() {
        return Some(ProjectType::Python);
    }
    let has_dpr = fs::read_dir(dir).ok()?.flatten().any(|entry| {
        entry
            .path()
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("dpr"))
    });
    if has_dpr {
        return Some(ProjectType::Delphi);
    }
    has("index.html").then_some(ProjectType::Webapp)
}

/// Every project directly beneath a configured root, sorted by name.
///
/// Hidden and noise directories are skipped. A root that cannot be read is
/// logged and contributes nothing.
pub fn list(session: &Session) -> EngineResult<Vec<CodeProject>> {
    let mut seen = BTreeSet::new();
    let mut projects = Vec::new();
    for root in session.guard.roots() {
        let entries = match fs::read_dir(root) {
            Ok(entries) => entries,
            Err(err) => {
                tracing::debug!(root = %root.display(), error = %err, "project root not readable");
                continue;
            }
        };
        for entry in entries.flatten() {
            let is_dir = entry.file_type().is_ok_and(|kind| kind.is_dir());
            let name = entry.file_name();
            if !is_dir || name.to_string_lossy().starts_with('.') || is_noise_dir(&name) {
                continue;
            }
            let path = entry.path();
            if !seen.insert(path.clone()) {
                continue;
            }
            match load(session, &path) {
                Ok(project) => projects.push(project),
                Err(err) => tracing::debug!(path = %path.display(), error = %err, "skipping directory"),
            }
        }
    }
    projects.sort_by(|a, b| {
        a.name
            .to_lowercase()
            .cmp(&b.name.to_lowercase())
            .then_with(|| a.path.cmp(&b.path))
    });
    Ok(projects)
}

/// Run the type's dependency installer in the project directory.
pub async fn install_dependencies(
    session: &Session,
    project: &CodeProject,
    options: &ExecOptions,
) -> EngineResult<ExecutionResult> {
    let dir = project_dir(session, project)?;
    let platform = session.platform;
    let spec = match project.project_type {
        ProjectType::Nodejs => CommandSpec::new(platform.npm()).arg("install"),
        ProjectType::Java => CommandSpec::new(platform.maven()).arg("install"),
        ProjectType::Python => {
            let requirements = dir.join("requirements.txt");
            if !requirements.exists() {
                fs::write(&requirements, "").map_err(|err| {
                    EngineError::io("failed to create requirements.txt", &requirements, err)
                })?;
            }
            let python = platform.venv_python(&dir);
            if !python.is_file() {
                return Ok(ExecutionResult::unavailable(format!(
                    "Virtual environment not found at {}",
                    python.display()
                )));
            }
            CommandSpec::from_path(&python).args(["-m", "pip", "install", "-r", "requirements.txt"])
        }
        ProjectType::Delphi | ProjectType::Webapp => {
            return Ok(ExecutionResult::not_applicable(format!(
                "Dependency installation is not applicable for {} projects",
                project.project_type
            )));
        }
    }
    .cwd(&dir)
    .envs(&session.settings.exec.env);

    tracing::info!(project = %project.name, command = %spec, "installing dependencies");
    let options = session.exec_options(options, session.settings.exec.install_timeout());
    Ok(runner::run(&spec, &options).await)
}

/// Reveal the directory in the host file manager.
pub async fn open_folder(session: &Session, path: &Path) -> EngineResult<ExecutionResult> {
    let dir = session.guard.check(path)?;
    if !dir.is_dir() {
        return Err(EngineError::not_found(
            "directory does not exist",
            serde_json::json!({"path": dir.display().to_string()}),
        ));
    }
    let spec = session.platform.open_command(&dir);
    let options = ExecOptions::default().with_timeout(session.settings.exec.probe_timeout());
    let result = runner::run(&spec, &options).await;
    if result.success() {
        return Ok(ExecutionResult::started(format!("Opened {}", dir.display())));
    }
    Ok(result)
}

/// Guarded, existing project directory.
pub(crate) fn project_dir(session: &Session, project: &CodeProject) -> EngineResult<PathBuf> {
    let dir = session.guard.check(&project.path)?;
    if dir.is_dir() {
        Ok(dir)
    } else {
        Err(EngineError::not_found(
            "project directory does not exist",
            serde_json::json!({
                "project": project.name,
                "path": dir.display().to_string(),
            }),
        ))
    }
}
