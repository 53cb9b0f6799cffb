//! The engine: one settings-derived [`Session`] shared by every operation, and
//! the request surface the CLI and the stdio service call into.

use crate::error::EngineResult;
use crate::launch;
use crate::model::{
    CodeProject, ExecutionResult, FileNode, ProjectType, Settings, ToolchainStatus,
};
use crate::platform::HostPlatform;
use crate::policy::{GuardExplanation, PathGuard};
use crate::project;
use crate::runner::ExecOptions;
use crate::settings::{validate_settings, SettingsStore};
use crate::snippet::{self, SnippetLanguage};
use crate::toolchain;
use crate::workspace;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use tokio_util::sync::CancellationToken;

/// Immutable configuration snapshot handed to every component.
#[derive(Clone, Debug)]
pub struct Session {
    pub settings: Settings,
    pub guard: PathGuard,
    pub platform: HostPlatform,
}

impl Session {
    #[must_use]
    pub fn new(settings: Settings, platform: HostPlatform) -> Self {
        let guard = PathGuard::from_roots(&settings.project_roots, platform);
        Self {
            settings,
            guard,
            platform,
        }
    }

    /// Caller options with the configured deadline filled in when none was given.
    #[must_use]
    pub fn exec_options(&self, options: &ExecOptions, default_timeout: Option<std::time::Duration>) -> ExecOptions {
        let mut options = options.clone();
        if options.timeout.is_none() {
            options.timeout = default_timeout;
        }
        options
    }
}

/// Owns the settings store and the current session.
///
/// Settings are read once at construction. [`Engine::reload`] and
/// [`Engine::save_settings`] swap in a fresh session; operations already in
/// flight keep the session they started with.
#[derive(Debug)]
pub struct Engine {
    store: Option<SettingsStore>,
    session: RwLock<Arc<Session>>,
}

impl Engine {
    /// Load settings from `store` and build the first session.
    pub fn open(store: SettingsStore) -> EngineResult<Self> {
        let settings = store.load()?;
        Ok(Self {
            store: Some(store),
            session: RwLock::new(Arc::new(Session::new(settings, HostPlatform::current()))),
        })
    }

    /// Engine over in-memory settings; saves only replace the session.
    pub fn in_memory(settings: Settings, platform: HostPlatform) -> EngineResult<Self> {
        validate_settings(&settings)?;
        Ok(Self {
            store: None,
            session: RwLock::new(Arc::new(Session::new(settings, platform))),
        })
    }

    #[must_use]
    pub fn session(&self) -> Arc<Session> {
        Arc::clone(&self.session.read().unwrap_or_else(PoisonError::into_inner))
    }

    #[must_use]
    pub fn settings(&self) -> Settings {
        self.session().settings.clone()
    }

    #[must_use]
    pub fn settings_path(&self) -> Option<&Path> {
        self.store.as_ref().map(SettingsStore::path)
    }

    fn replace_session(&self, settings: Settings) {
        let platform = self.session().platform;
        let fresh = Arc::new(Session::new(settings, platform));
        *self.session.write().unwrap_or_else(PoisonError::into_inner) = fresh;
    }

    /// Re-read the settings document.
    pub fn reload(&self) -> EngineResult<Settings> {
        let settings = match &self.store {
            Some(store) => store.load()?,
            None => self.settings(),
        };
        self.replace_session(settings.clone());
        tracing::debug!("settings reloaded");
        Ok(settings)
    }

    /// Persist `settings` wholesale, then switch to them.
    pub fn save_settings(&self, settings: Settings) -> EngineResult<()> {
        match &self.store {
            Some(store) => store.save(&settings)?,
            None => validate_settings(&settings)?,
        }
        self.replace_session(settings);
        Ok(())
    }

    // Toolchains

    pub async fn detect_toolchains(&self, cancel: Option<&CancellationToken>) -> ToolchainStatus {
        toolchain::detect_all(&self.session(), cancel).await
    }

    // Projects

    pub async fn create_project(
        &self,
        project_type: ProjectType,
        name: &str,
        base_path: &Path,
        options: &ExecOptions,
    ) -> EngineResult<CodeProject> {
        project::create(&self.session(), project_type, name, base_path, options).await
    }

    pub fn delete_project(&self, path: &Path) -> EngineResult<()> {
        project::delete(&self.session(), path)
    }

    pub fn load_project(&self, path: &Path) -> EngineResult<CodeProject> {
        project::load(&self.session(), path)
    }

    pub fn list_projects(&self) -> EngineResult<Vec<CodeProject>> {
        project::list(&self.session())
    }

    pub async fn open_folder(&self, path: &Path) -> EngineResult<ExecutionResult> {
        project::open_folder(&self.session(), path).await
    }

    pub async fn open_web_app(&self, path: &Path) -> EngineResult<ExecutionResult> {
        launch::open_web_app(&self.session(), path).await
    }

    pub async fn install_dependencies(
        &self,
        project: &CodeProject,
        options: &ExecOptions,
    ) -> EngineResult<ExecutionResult> {
        project::install_dependencies(&self.session(), project, options).await
    }

    pub fn plan_project(&self, project: &CodeProject) -> EngineResult<launch::LaunchPlan> {
        launch::plan(&self.session(), project)
    }

    pub async fn run_project(
        &self,
        project: &CodeProject,
        options: &ExecOptions,
    ) -> EngineResult<ExecutionResult> {
        launch::run_project(&self.session(), project, options).await
    }

    pub async fn run_script(
        &self,
        project: &CodeProject,
        code: &str,
        options: &ExecOptions,
    ) -> EngineResult<ExecutionResult> {
        snippet::run_in_project(&self.session(), project, code, options).await
    }

    // Snippets

    pub async fn run_snippet(
        &self,
        language: SnippetLanguage,
        code: &str,
        options: &ExecOptions,
    ) -> EngineResult<ExecutionResult> {
        snippet::run(&self.session(), language, code, options).await
    }

    // Filesystem

    pub async fn select_directory(&self) -> Option<PathBuf> {
        workspace::select_directory(self.session().platform).await
    }

    pub fn read_dir(&self, path: &Path) -> EngineResult<Vec<FileNode>> {
        workspace::list_directory(&self.session(), path)
    }

    pub fn read_file(&self, path: &Path) -> EngineResult<String> {
        workspace::read_file(&self.session(), path)
    }

    pub fn write_file(&self, path: &Path, content: &str) -> EngineResult<()> {
        workspace::write_file(&self.session(), path, content)
    }

    pub fn add_file_from_path(&self, source: &Path, target_dir: &Path) -> EngineResult<PathBuf> {
        workspace::copy_into(&self.session(), source, target_dir)
    }

    pub fn get_all_files(&self, path: &Path) -> EngineResult<Vec<String>> {
        workspace::list_all_files(&self.session(), path)
    }

    pub fn get_file_tree(&self, path: &Path) -> EngineResult<String> {
        workspace::render_tree(&self.session(), path)
    }

    #[must_use]
    pub fn explain_path(&self, path: &Path) -> GuardExplanation {
        self.session().guard.explain(path)
    }
}
