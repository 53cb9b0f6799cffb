use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Language family a toolchain belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolchainFamily {
    Python,
    Java,
    Nodejs,
    Delphi,
}

impl ToolchainFamily {
    pub const ALL: [Self; 4] = [Self::Python, Self::Java, Self::Nodejs, Self::Delphi];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Python => "python",
            Self::Java => "java",
            Self::Nodejs => "nodejs",
            Self::Delphi => "delphi",
        }
    }
}

impl fmt::Display for ToolchainFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A discovered, verified interpreter or compiler.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Toolchain {
    pub path: PathBuf,
    pub version: String,
    pub name: String,
}

/// One probing cycle's results, grouped by family.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolchainStatus {
    pub python: Vec<Toolchain>,
    pub java: Vec<Toolchain>,
    pub nodejs: Vec<Toolchain>,
    pub delphi: Vec<Toolchain>,
}

impl ToolchainStatus {
    #[must_use]
    pub fn family(&self, family: ToolchainFamily) -> &[Toolchain] {
        match family {
            ToolchainFamily::Python => &self.python,
            ToolchainFamily::Java => &self.java,
            ToolchainFamily::Nodejs => &self.nodejs,
            ToolchainFamily::Delphi => &self.delphi,
        }
    }

    #[must_use]
    pub fn total(&self) -> usize {
        self.python.len() + self.java.len() + self.nodejs.len() + self.delphi.len()
    }
}
