//! Persisted engine settings.
//!
//! Everything optional is spelled out as `Option`; numeric defaults are filled in
//! by serde at load time so the rest of the engine never re-derives them.

use crate::model::project::ProjectType;
use crate::model::toolchain::ToolchainFamily;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_RUN_TIMEOUT_MS: u64 = 600_000;
pub const DEFAULT_INSTALL_TIMEOUT_MS: u64 = 900_000;
pub const DEFAULT_SNIPPET_TIMEOUT_MS: u64 = 60_000;
pub const DEFAULT_PROBE_TIMEOUT_MS: u64 = 15_000;

/// The single settings document.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    #[serde(default)]
    pub toolchains: ToolchainSelection,
    #[serde(default)]
    pub project_roots: ProjectRoots,
    #[serde(default)]
    pub exec: ExecSettings,
}

/// Toolchain binary chosen by the user for each family.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ToolchainSelection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub python: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub java: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nodejs: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delphi: Option<PathBuf>,
}

impl ToolchainSelection {
    #[must_use]
    pub fn get(&self, family: ToolchainFamily) -> Option<&Path> {
        match family {
            ToolchainFamily::Python => self.python.as_deref(),
            ToolchainFamily::Java => self.java.as_deref(),
            ToolchainFamily::Nodejs => self.nodejs.as_deref(),
            ToolchainFamily::Delphi => self.delphi.as_deref(),
        }
    }

    pub fn set(&mut self, family: ToolchainFamily, path: Option<PathBuf>) {
        let slot = match family {
            ToolchainFamily::Python => &mut self.python,
            ToolchainFamily::Java => &mut self.java,
            ToolchainFamily::Nodejs => &mut self.nodejs,
            ToolchainFamily::Delphi => &mut self.delphi,
        };
        *slot = path;
    }
}

/// Base directory configured for each project type.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProjectRoots {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub python: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nodejs: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub java: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delphi: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webapp: Option<PathBuf>,
}

impl ProjectRoots {
    #[must_use]
    pub fn get(&self, project_type: ProjectType) -> Option<&Path> {
        match project_type {
            ProjectType::Python => self.python.as_deref(),
            ProjectType::Nodejs => self.nodejs.as_deref(),
            ProjectType::Java => self.java.as_deref(),
            ProjectType::Delphi => self.delphi.as_deref(),
            ProjectType::Webapp => self.webapp.as_deref(),
        }
    }

    pub fn set(&mut self, project_type: ProjectType, path: Option<PathBuf>) {
        let slot = match project_type {
            ProjectType::Python => &mut self.python,
            ProjectType::Nodejs => &mut self.nodejs,
            ProjectType::Java => &mut self.java,
            ProjectType::Delphi => &mut self.delphi,
            ProjectType::Webapp => &mut self.webapp,
        };
        *slot = path;
    }

    /// Configured roots paired with their project type, in declaration order.
    pub fn configured(&self) -> impl Iterator<Item = (ProjectType, &Path)> + '_ {
        ProjectType::ALL
            .into_iter()
            .filter_map(move |ty| self.get(ty).map(|path| (ty, path)))
    }
}

/// Process execution knobs. A timeout of `0` disables the deadline.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExecSettings {
    #[serde(default = "default_run_timeout_ms")]
    pub run_timeout_ms: u64,
    #[serde(default = "default_install_timeout_ms")]
    pub install_timeout_ms: u64,
    #[serde(default = "default_snippet_timeout_ms")]
    pub snippet_timeout_ms: u64,
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,
    /// Directory for snippet temp files; the OS temp dir when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scratch_dir: Option<PathBuf>,
    /// Extra environment for every spawned process.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
}

impl Default for ExecSettings {
    fn default() -> Self {
        Self {
            run_timeout_ms: DEFAULT_RUN_TIMEOUT_MS,
            install_timeout_ms: DEFAULT_INSTALL_TIMEOUT_MS,
            snippet_timeout_ms: DEFAULT_SNIPPET_TIMEOUT_MS,
            probe_timeout_ms: DEFAULT_PROBE_TIMEOUT_MS,
            scratch_dir: None,
            env: BTreeMap::new(),
        }
    }
}

impl ExecSettings {
    #[must_use]
    pub fn run_timeout(&self) -> Option<Duration> {
        deadline(self.run_timeout_ms)
    }

    #[must_use]
    pub fn install_timeout(&self) -> Option<Duration> {
        deadline(self.install_timeout_ms)
    }

    #[must_use]
    pub fn snippet_timeout(&self) -> Option<Duration> {
        deadline(self.snippet_timeout_ms)
    }

    #[must_use]
    pub fn probe_timeout(&self) -> Option<Duration> {
        deadline(self.probe_timeout_ms)
    }
}

fn deadline(ms: u64) -> Option<Duration> {
    (ms > 0).then(|| Duration::from_millis(ms))
}

fn default_run_timeout_ms() -> u64 {
    DEFAULT_RUN_TIMEOUT_MS
}

fn default_install_timeout_ms() -> u64 {
    DEFAULT_INSTALL_TIMEOUT_MS
}

fn default_snippet_timeout_ms() -> u64 {
    DEFAULT_SNIPPET_TIMEOUT_MS
}

fn default_probe_timeout_ms() -> u64 {
    DEFAULT_PROBE_TIMEOUT_MS
}
