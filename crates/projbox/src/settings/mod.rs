//! Settings persistence: one document, read at startup, rewritten wholesale on save.

use crate::error::{EngineError, EngineResult};
use crate::model::Settings;
use crate::policy::{disallowed_root_reason, is_dangerous_env_var};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Environment variable overriding the settings file location.
pub const SETTINGS_ENV_VAR: &str = "PROJBOX_SETTINGS";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Format {
    Json,
    Yaml,
}

impl Format {
    fn for_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("yaml" | "yml") => Self::Yaml,
            _ => Self::Json,
        }
    }
}

/// Location of the settings document plus load/save.
#[derive(Clone, Debug)]
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `$PROJBOX_SETTINGS`, else `<config dir>/projbox/settings.json`.
    pub fn default_location() -> EngineResult<Self> {
        if let Some(path) = std::env::var_os(SETTINGS_ENV_VAR) {
            return Ok(Self::new(path));
        }
        let base = dirs::config_dir().ok_or_else(|| {
            EngineError::config(
                "no configuration directory is known for this user",
                serde_json::json!({
                    "fix": format!("Set {SETTINGS_ENV_VAR} or pass --settings"),
                }),
            )
        })?;
        Ok(Self::new(base.join("projbox").join("settings.json")))
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load and validate. A missing file yields defaults.
    pub fn load(&self) -> EngineResult<Settings> {
        let data = match fs::read_to_string(&self.path) {
            Ok(data) => data,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %self.path.display(), "no settings file; using defaults");
                return Ok(Settings::default());
            }
            Err(err) => {
                return Err(EngineError::io(
                    "failed to read settings file",
                    &self.path,
                    err,
                ))
            }
        };
        let settings = parse_settings(&data, Format::for_path(&self.path)).map_err(|reason| {
            EngineError::config(
                "failed to parse settings file",
                serde_json::json!({
                    "path": self.path.display().to_string(),
                    "parse_error": reason,
                }),
            )
        })?;
        validate_settings(&settings)?;
        Ok(settings)
    }

    /// Validate, then atomically replace the whole document.
    pub fn save(&self, settings: &Settings) -> EngineResult<()> {
        validate_settings(settings)?;
        let data = match Format::for_path(&self.path) {
            Format::Json => serde_json::to_string_pretty(settings).map_err(|err| err.to_string()),
            Format::Yaml => serde_yml::to_string(settings).map_err(|err| err.to_string()),
        }
        .map_err(|reason| {
            EngineError::internal(format!("failed to serialize settings: {reason}"))
        })?;

        let dir = match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)
            .map_err(|err| EngineError::io("failed to create settings directory", &dir, err))?;
        let mut staged = tempfile::NamedTempFile::new_in(&dir)
            .map_err(|err| EngineError::io("failed to stage settings file", &dir, err))?;
        let staged_path = staged.path().to_path_buf();
        writeln!(staged, "{data}")
            .map_err(|err| EngineError::io("failed to write settings file", &staged_path, err))?;
        staged
            .persist(&self.path)
            .map_err(|err| EngineError::io("failed to replace settings file", &self.path, err.error))?;
        tracing::info!(path = %self.path.display(), "settings saved");
        Ok(())
    }
}

fn parse_settings(data: &str, format: Format) -> Result<Settings, String> {
    if data.trim().is_empty() {
        return Ok(Settings::default());
    }
    match format {
        Format::Json => serde_json::from_str(data).map_err(|err| err.to_string()),
        Format::Yaml => serde_yml::from_str(data).map_err(|err| err.to_string()),
    }
}

/// Reject settings that would weaken the path boundary or inject into children.
pub fn validate_settings(settings: &Settings) -> EngineResult<()> {
    let home_dir = dirs::home_dir();
    for (project_type, root) in settings.project_roots.configured() {
        if !root.is_absolute() {
            return Err(EngineError::config(
                "project roots must be absolute paths",
                serde_json::json!({
                    "type": project_type,
                    "path": root.display().to_string(),
                    "fix": "Use an absolute directory path",
                }),
            ));
        }
        if let Some(reason) = disallowed_root_reason(root, home_dir.as_deref()) {
            return Err(EngineError::config(
                "project root is too broad",
                serde_json::json!({
                    "type": project_type,
                    "path": root.display().to_string(),
                    "reason": reason,
                    "fix": "Point the root at a dedicated projects directory",
                }),
            ));
        }
    }
    for key in settings.exec.env.keys() {
        if is_dangerous_env_var(key) {
            return Err(EngineError::config(
                "environment variable is not allowed in exec.env",
                serde_json::json!({
                    "variable": key,
                    "reason": "it can inject code into every spawned process",
                }),
            ));
        }
    }
    if let Some(dir) = &settings.exec.scratch_dir {
        if !dir.is_absolute() {
            return Err(EngineError::config(
                "exec.scratch_dir must be an absolute path",
                serde_json::json!({"path": dir.display().to_string()}),
            ));
        }
    }
    Ok(())
}
