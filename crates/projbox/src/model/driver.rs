use crate::error::ErrorInfo;
use crate::model::project::{CodeProject, ProjectType};
use crate::model::settings::Settings;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;

/// Request envelope read from one NDJSON line.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DriverRequest {
    /// Protocol version for request/response compatibility.
    pub protocol_version: u32,
    /// Client-provided request identifier echoed in the response.
    pub request_id: String,
    /// Operation to perform.
    pub command: DriverCommand,
}

/// Every operation the UI may request.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum DriverCommand {
    DetectToolchains,
    GetSettings,
    SaveSettings {
        settings: Settings,
    },
    ReloadSettings,
    CreateProject {
        #[serde(rename = "type")]
        project_type: ProjectType,
        name: String,
        base_path: PathBuf,
    },
    DeleteProject {
        path: PathBuf,
    },
    LoadProject {
        path: PathBuf,
    },
    ListProjects,
    OpenFolder {
        path: PathBuf,
    },
    OpenWebApp {
        path: PathBuf,
    },
    InstallDependencies {
        project: CodeProject,
    },
    RunProject {
        project: CodeProject,
    },
    RunScript {
        project: CodeProject,
        code: String,
    },
    RunPython {
        code: String,
    },
    RunNodejs {
        code: String,
    },
    RunHtml {
        code: String,
    },
    SelectDirectory,
    ReadDir {
        path: PathBuf,
    },
    ReadFile {
        path: PathBuf,
    },
    WriteFile {
        path: PathBuf,
        content: String,
    },
    AddFileFromPath {
        source_path: PathBuf,
        target_dir: PathBuf,
    },
    GetAllFiles {
        path: PathBuf,
    },
    GetFileTree {
        path: PathBuf,
    },
    ExplainPath {
        path: PathBuf,
    },
    /// Cancel the in-flight request with this id.
    Cancel {
        request_id: String,
    },
}

impl DriverCommand {
    /// Whether the command may run a child process and so honors `cancel`.
    #[must_use]
    pub fn is_cancellable(&self) -> bool {
        matches!(
            self,
            Self::DetectToolchains
                | Self::CreateProject { .. }
                | Self::InstallDependencies { .. }
                | Self::RunProject { .. }
                | Self::RunScript { .. }
                | Self::RunPython { .. }
                | Self::RunNodejs { .. }
        )
    }
}

/// Response status.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DriverResponseStatus {
    /// Command executed successfully.
    Ok,
    /// Command was rejected.
    Error,
}

/// Response envelope written as one NDJSON line.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DriverResponse {
    /// Protocol version for request/response compatibility.
    pub protocol_version: u32,
    /// Request identifier echoed from request.
    pub request_id: String,
    /// Response status.
    pub status: DriverResponseStatus,
    /// Command output on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Structured error on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
}
