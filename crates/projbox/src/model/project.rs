use crate::error::EngineError;
use crate::model::ids::ProjectId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Kind of code project; decides scaffolding, dependency install and launch strategy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectType {
    Python,
    Nodejs,
    Java,
    Delphi,
    Webapp,
}

impl ProjectType {
    pub const ALL: [Self; 5] = [
        Self::Python,
        Self::Nodejs,
        Self::Java,
        Self::Delphi,
        Self::Webapp,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Python => "python",
            Self::Nodejs => "nodejs",
            Self::Java => "java",
            Self::Delphi => "delphi",
            Self::Webapp => "webapp",
        }
    }
}

impl fmt::Display for ProjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProjectType {
    type Err = EngineError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let lowered = value.trim().to_ascii_lowercase();
        match lowered.as_str() {
            "python" | "py" => Ok(Self::Python),
            "nodejs" | "node" | "js" => Ok(Self::Nodejs),
            "java" => Ok(Self::Java),
            "delphi" => Ok(Self::Delphi),
            "webapp" | "web" | "html" => Ok(Self::Webapp),
            _ => Err(EngineError::invalid_argument(
                "unknown project type",
                serde_json::json!({
                    "received": value,
                    "expected": Self::ALL.iter().map(|t| t.as_str()).collect::<Vec<_>>(),
                }),
            )),
        }
    }
}

/// A typed project living in its own directory.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeProject {
    pub id: ProjectId,
    pub name: String,
    #[serde(rename = "type")]
    pub project_type: ProjectType,
    pub path: PathBuf,
}

/// On-disk metadata record stored at the project root.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProjectMetadata {
    pub id: ProjectId,
    pub name: String,
    #[serde(rename = "type")]
    pub project_type: ProjectType,
    /// Seconds since the Unix epoch.
    #[serde(default)]
    pub created_at: u64,
}
