//! Path Guard: the single authority on which paths engine operations may touch.
//!
//! A path is allowed iff, after lexical normalization, it equals or is a
//! separator-bounded descendant of a configured project root. Existing paths are
//! additionally resolved through symlinks and must still land under a root.

use crate::error::{EngineError, EngineResult};
use crate::model::ProjectRoots;
use crate::platform::HostPlatform;
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};

/// Environment variables that enable library injection into spawned processes.
/// Checked case-insensitively.
const DANGEROUS_ENV_VARS: &[&str] = &[
    // Linux library injection
    "LD_PRELOAD",
    "LD_LIBRARY_PATH",
    "LD_AUDIT",
    // macOS library injection
    "DYLD_INSERT_LIBRARIES",
    "DYLD_LIBRARY_PATH",
    "DYLD_FRAMEWORK_PATH",
    "DYLD_FALLBACK_LIBRARY_PATH",
    "DYLD_ROOT_PATH",
    // Interpreter hooks
    "NODE_OPTIONS",
    "PYTHONSTARTUP",
    "JAVA_TOOL_OPTIONS",
];

/// Check if an environment variable name may not be set through settings.
pub fn is_dangerous_env_var(key: &str) -> bool {
    DANGEROUS_ENV_VARS
        .iter()
        .any(|d| d.eq_ignore_ascii_case(key))
}

/// Outcome of [`PathGuard::explain`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuardExplanation {
    pub allowed: bool,
    pub normalized: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matched_root: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Clone, Debug)]
struct Root {
    /// As configured, lexically normalized.
    path: PathBuf,
    key: Vec<String>,
}

#[derive(Clone, Debug)]
pub struct PathGuard {
    roots: Vec<Root>,
    platform: HostPlatform,
}

impl PathGuard {
    /// Build a guard over explicit roots. Relative roots are ignored; settings
    /// validation rejects them before this point.
    pub fn new<I, P>(roots: I, platform: HostPlatform) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let mut built: Vec<Root> = Vec::new();
        for root in roots {
            let root = root.as_ref();
            if !is_absolute_for(root, platform) {
                tracing::warn!(root = %root.display(), "ignoring relative project root");
                continue;
            }
            let path = normalize_lexically(root);
            let key = comparison_key(&path, platform);
            if built.iter().any(|existing| existing.key == key) {
                continue;
            }
            built.push(Root { path, key });
        }
        Self {
            roots: built,
            platform,
        }
    }

    pub fn from_roots(roots: &ProjectRoots, platform: HostPlatform) -> Self {
        Self::new(roots.configured().map(|(_, path)| path), platform)
    }

    /// Configured roots, normalized.
    pub fn roots(&self) -> impl Iterator<Item = &Path> {
        self.roots.iter().map(|root| root.path.as_path())
    }

    #[must_use]
    pub fn is_allowed(&self, path: &Path) -> bool {
        self.explain(path).allowed
    }

    /// Validate `path` and return its normalized form for use by the caller.
    pub fn check(&self, path: &Path) -> EngineResult<PathBuf> {
        let explanation = self.explain(path);
        if explanation.allowed {
            return Ok(explanation.normalized);
        }
        Err(self.denied(path, explanation.reason.as_deref()))
    }

    /// Like [`Self::check`], but a configured root itself is refused. Used for
    /// operations that must never hit a root, such as recursive deletion.
    pub fn check_descendant(&self, path: &Path) -> EngineResult<PathBuf> {
        let normalized = self.check(path)?;
        let key = comparison_key(&normalized, self.platform);
        if self.roots.iter().any(|root| root.key == key) {
            return Err(EngineError::access_denied(
                "operation is not permitted on a project root itself",
                serde_json::json!({
                    "path": path.display().to_string(),
                    "fix": "Target a project directory beneath the root",
                }),
            ));
        }
        Ok(normalized)
    }

    /// Full decision for `path`, including which root matched.
    #[must_use]
    pub fn explain(&self, path: &Path) -> GuardExplanation {
        let normalized = normalize_lexically(path);
        let deny = |reason: &str| GuardExplanation {
            allowed: false,
            normalized: normalized.clone(),
            matched_root: None,
            reason: Some(reason.to_string()),
        };

        if !is_absolute_for(path, self.platform) {
            return deny("path must be absolute");
        }
        if self.roots.is_empty() {
            return deny("no project roots are configured");
        }

        let key = comparison_key(&normalized, self.platform);
        let Some(root) = self.roots.iter().find(|root| key.starts_with(&root.key)) else {
            return deny("path is outside every configured project root");
        };

        if let Some(real) = resolve_existing(&normalized) {
            let real_key = comparison_key(&real, self.platform);
            // Roots are resolved per check: one created after the guard was
            // built may sit under a symlinked ancestor.
            let inside = self.roots.iter().any(|root| {
                resolve_existing(&root.path).map_or_else(
                    || real_key.starts_with(&root.key),
                    |real_root| real_key.starts_with(&comparison_key(&real_root, self.platform)),
                )
            });
            if !inside {
                return deny("path resolves through a link to a location outside the project roots");
            }
        }

        GuardExplanation {
            allowed: true,
            normalized,
            matched_root: Some(root.path.clone()),
            reason: None,
        }
    }

    fn denied(&self, path: &Path, reason: Option<&str>) -> EngineError {
        EngineError::access_denied(
            "access denied: path is not within a configured project root",
            serde_json::json!({
                "path": path.display().to_string(),
                "reason": reason,
                "roots": self.roots().map(|r| r.display().to_string()).collect::<Vec<_>>(),
                "fix": "Configure a project root that contains this path",
            }),
        )
    }
}

/// Normalizes a path by removing `.` and resolving `..` components.
///
/// This does NOT follow symlinks. `..` at the root is ignored, so the result
/// can never climb above the filesystem root.
#[must_use]
pub fn normalize_lexically(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    let mut depth = 0usize;

    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if depth > 0 {
                    normalized.pop();
                    depth -= 1;
                }
            }
            Component::Normal(part) => {
                normalized.push(part);
                depth += 1;
            }
            Component::RootDir => normalized.push(Component::RootDir.as_os_str()),
            Component::Prefix(prefix) => normalized.push(prefix.as_os_str()),
        }
    }

    if normalized.as_os_str().is_empty() {
        PathBuf::from(std::path::MAIN_SEPARATOR_STR)
    } else {
        normalized
    }
}

/// Per-platform comparison key: one string per path segment.
///
/// On Windows segments are lower-cased and `/` is treated as `\`, so that
/// `C:/Projects` and `c:\projects` compare equal. The key is built from text
/// so Windows rules apply regardless of the host running the check.
fn comparison_key(path: &Path, platform: HostPlatform) -> Vec<String> {
    let text = path.to_string_lossy();
    if platform.case_insensitive_paths() {
        let unified = text.replace('/', "\\").to_lowercase();
        let mut segments: Vec<String> = Vec::new();
        for part in unified.split('\\').filter(|part| !part.is_empty()) {
            match part {
                "." => {}
                ".." => {
                    if segments.len() > 1 {
                        segments.pop();
                    }
                }
                other => segments.push(other.to_string()),
            }
        }
        segments
    } else {
        normalize_lexically(path)
            .components()
            .map(|component| component.as_os_str().to_string_lossy().into_owned())
            .collect()
    }
}

fn is_absolute_for(path: &Path, platform: HostPlatform) -> bool {
    match platform {
        HostPlatform::Posix => path.has_root(),
        HostPlatform::Windows => {
            let text = path.to_string_lossy().replace('/', "\\");
            let bytes = text.as_bytes();
            let drive = matches!(
                (bytes.first(), bytes.get(1), bytes.get(2)),
                (Some(letter), Some(b':'), Some(b'\\')) if letter.is_ascii_alphabetic()
            );
            drive || text.starts_with("\\\\")
        }
    }
}

/// Resolve symlinks on the longest existing prefix of `path`, then re-append
/// the part that does not exist yet.
fn resolve_existing(path: &Path) -> Option<PathBuf> {
    let mut existing = path;
    let mut suffix: Vec<&std::ffi::OsStr> = Vec::new();
    loop {
        if let Ok(real) = std::fs::canonicalize(existing) {
            let mut resolved = real;
            for part in suffix.iter().rev() {
                resolved.push(part);
            }
            return Some(resolved);
        }
        suffix.push(existing.file_name()?);
        existing = existing.parent()?;
    }
}

/// Why a configured root is too broad to confine anything, if it is.
pub(crate) fn disallowed_root_reason(path: &Path, home_dir: Option<&Path>) -> Option<&'static str> {
    let normalized = normalize_lexically(path);
    if normalized.parent().is_none() {
        return Some("filesystem root");
    }
    if let Some(home) = home_dir {
        if normalized == normalize_lexically(home) {
            return Some("home directory");
        }
    }
    None
}
