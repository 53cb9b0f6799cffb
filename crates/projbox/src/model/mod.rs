pub mod driver;
pub mod exec;
pub mod fs;
pub mod ids;
pub mod project;
pub mod settings;
pub mod toolchain;

pub use driver::*;
pub use exec::*;
pub use fs::*;
pub use ids::ProjectId;
pub use project::*;
pub use settings::*;
pub use toolchain::*;

/// Version of the NDJSON request/response protocol spoken by `projbox serve`.
pub const PROTOCOL_VERSION: u32 = 1;

/// File name of the per-project metadata record written at scaffolding time.
pub const PROJECT_METADATA_FILE: &str = ".projbox.json";
