//! Project Filesystem View.
//!
//! Listing, reading, writing and tree rendering over project directories. Every
//! entry point checks the Path Guard before touching the filesystem.

use crate::engine::Session;
use crate::error::{EngineError, EngineResult};
use crate::model::FileNode;
use crate::platform::HostPlatform;
use crate::runner::{self, ExecOptions};
use crate::ExecOutcome;
use std::cmp::Ordering;
use std::ffi::OsStr;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Version control metadata, dependency caches, virtual environments and build
/// output. Never listed, never descended into.
pub const NOISE_DIRS: &[&str] = &[
    ".git",
    ".svn",
    ".hg",
    "node_modules",
    "__pycache__",
    ".pytest_cache",
    "venv",
    ".venv",
    "target",
    "build",
    "dist",
    "out",
    "__history",
    ".idea",
    ".vscode",
];

#[must_use]
pub fn is_noise_dir(name: &OsStr) -> bool {
    name.to_str()
        .is_some_and(|name| NOISE_DIRS.contains(&name))
}

/// Directories first, then case-insensitive name, then exact name.
fn compare_entries(a_dir: bool, a_name: &str, b_dir: bool, b_name: &str) -> Ordering {
    b_dir
        .cmp(&a_dir)
        .then_with(|| a_name.to_lowercase().cmp(&b_name.to_lowercase()))
        .then_with(|| a_name.cmp(b_name))
}

fn sort_nodes(nodes: &mut [FileNode]) {
    nodes.sort_by(|a, b| compare_entries(a.is_directory, &a.name, b.is_directory, &b.name));
}

fn read_entries(dir: &Path) -> std::io::Result<Vec<FileNode>> {
    let mut nodes = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let is_directory = entry.file_type()?.is_dir();
        let name = entry.file_name();
        if is_directory && is_noise_dir(&name) {
            continue;
        }
        nodes.push(FileNode {
            name: name.to_string_lossy().into_owned(),
            path: entry.path(),
            is_directory,
        });
    }
    sort_nodes(&mut nodes);
    Ok(nodes)
}

fn require_dir(path: &Path) -> EngineResult<()> {
    if path.is_dir() {
        Ok(())
    } else {
        Err(EngineError::not_found(
            "directory does not exist",
            serde_json::json!({"path": path.display().to_string()}),
        ))
    }
}

/// One level of `path`, noise directories removed.
pub fn list_directory(session: &Session, path: &Path) -> EngineResult<Vec<FileNode>> {
    let dir = session.guard.check(path)?;
    require_dir(&dir)?;
    read_entries(&dir).map_err(|err| EngineError::io("failed to list directory", &dir, err))
}

pub fn read_file(session: &Session, path: &Path) -> EngineResult<String> {
    let file = session.guard.check(path)?;
    fs::read_to_string(&file).map_err(|err| match err.kind() {
        std::io::ErrorKind::NotFound => EngineError::not_found(
            "file does not exist",
            serde_json::json!({"path": file.display().to_string()}),
        ),
        _ => EngineError::io("failed to read file", &file, err),
    })
}

/// Write `content`, creating missing parent directories.
pub fn write_file(session: &Session, path: &Path, content: &str) -> EngineResult<()> {
    let file = session.guard.check(path)?;
    if let Some(parent) = file.parent() {
        fs::create_dir_all(parent)
            .map_err(|err| EngineError::io("failed to create parent directories", parent, err))?;
    }
    fs::write(&file, content).map_err(|err| EngineError::io("failed to write file", &file, err))?;
    tracing::debug!(path = %file.display(), bytes = content.len(), "file written");
    Ok(())
}

/// Copy an external file into `target_dir`, keeping its base name.
pub fn copy_into(session: &Session, source: &Path, target_dir: &Path) -> EngineResult<PathBuf> {
    let dir = session.guard.check(target_dir)?;
    require_dir(&dir)?;
    if !source.is_file() {
        return Err(EngineError::not_found(
            "source file does not exist",
            serde_json::json!({"path": source.display().to_string()}),
        ));
    }
    let name = source.file_name().ok_or_else(|| {
        EngineError::invalid_argument(
            "source path has no file name",
            serde_json::json!({"path": source.display().to_string()}),
        )
    })?;
    let destination = session.guard.check(&dir.join(name))?;
    fs::copy(source, &destination)
        .map_err(|err| EngineError::io("failed to copy file", &destination, err))?;
    tracing::info!(from = %source.display(), to = %destination.display(), "file added to project");
    Ok(destination)
}

/// Every file below `path`, as `/`-separated paths relative to it.
///
/// Depth-first, directories before files. Unreadable subtrees are logged and
/// left out.
pub fn list_all_files(session: &Session, path: &Path) -> EngineResult<Vec<String>> {
    let root = session.guard.check(path)?;
    require_dir(&root)?;

    let walker = WalkDir::new(&root)
        .sort_by(|a, b| {
            compare_entries(
                a.file_type().is_dir(),
                &a.file_name().to_string_lossy(),
                b.file_type().is_dir(),
                &b.file_name().to_string_lossy(),
            )
        })
        .into_iter()
        .filter_entry(|entry| {
            entry.depth() == 0 || !(entry.file_type().is_dir() && is_noise_dir(entry.file_name()))
        });

    let mut files = Vec::new();
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                tracing::warn!(path = ?err.path(), error = %err, "skipping unreadable entry");
                continue;
            }
        };
        if entry.file_type().is_dir() {
            continue;
        }
        if let Ok(relative) = entry.path().strip_prefix(&root) {
            files.push(relative_slash_path(relative));
        }
    }
    Ok(files)
}

fn relative_slash_path(relative: &Path) -> String {
    relative
        .components()
        .map(|component| component.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// ASCII tree of `path`, rooted at its directory name.
///
/// ```text
/// demo/
/// ├── b/
/// │   └── c.txt
/// └── a.txt
/// ```
pub fn render_tree(session: &Session, path: &Path) -> EngineResult<String> {
    let root = session.guard.check(path)?;
    require_dir(&root)?;
    let name = root
        .file_name()
        .map_or_else(|| root.display().to_string(), |n| n.to_string_lossy().into_owned());
    let mut out = format!("{name}/\n");
    render_children(&root, "", &mut out);
    Ok(out)
}

fn render_children(dir: &Path, prefix: &str, out: &mut String) {
    let nodes = match read_entries(dir) {
        Ok(nodes) => nodes,
        Err(err) => {
            tracing::warn!(path = %dir.display(), error = %err, "skipping unreadable directory in tree");
            return;
        }
    };
    let count = nodes.len();
    for (index, node) in nodes.iter().enumerate() {
        let last = index + 1 == count;
        let connector = if last { "└── " } else { "├── " };
        let suffix = if node.is_directory { "/" } else { "" };
        let _ = writeln!(out, "{prefix}{connector}{}{suffix}", node.name);
        if node.is_directory {
            let continuation = if last { "    " } else { "│   " };
            render_children(&node.path, &format!("{prefix}{continuation}"), out);
        }
    }
}

/// Ask the user for a directory with the host's native picker.
///
/// `None` when the user cancels or no picker is installed.
pub async fn select_directory(platform: HostPlatform) -> Option<PathBuf> {
    for picker in platform.directory_pickers() {
        let result = runner::run(&picker, &ExecOptions::default()).await;
        match result.outcome {
            ExecOutcome::Ok => {
                let chosen = result.stdout.trim();
                return (!chosen.is_empty()).then(|| PathBuf::from(chosen));
            }
            ExecOutcome::LaunchError { .. } => {
                tracing::debug!(picker = %picker.program, "directory picker not available");
            }
            _ => return None,
        }
    }
    tracing::warn!("no directory picker is available on this host");
    None
}
