// Test module - relaxed lint rules
#![allow(clippy::indexing_slicing)]
#![allow(clippy::panic)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(missing_docs)]

//! Create, load, list, delete and install against temporary project roots.

use projbox::model::{
    ExecOutcome, ProjectType, Settings, ToolchainFamily, PROJECT_METADATA_FILE,
};
use projbox::platform::HostPlatform;
use projbox::runner::ExecOptions;
use projbox::{Engine, ErrorCode};
use std::fs;
use std::path::{Path, PathBuf};

/// One root per project type under a shared temp dir.
struct Fixture {
    _tmp: tempfile::TempDir,
    base: PathBuf,
    engine: Engine,
}

impl Fixture {
    fn new() -> Self {
        Self::with(|_| {})
    }

    fn with(configure: impl FnOnce(&mut Settings)) -> Self {
        let tmp = tempfile::tempdir().unwrap();
        let base = tmp.path().to_path_buf();
        let mut settings = Settings::default();
        for project_type in ProjectType::ALL {
            let root = base.join(project_type.as_str());
            fs::create_dir_all(&root).unwrap();
            settings.project_roots.set(project_type, Some(root));
        }
        configure(&mut settings);
        let engine = Engine::in_memory(settings, HostPlatform::current()).unwrap();
        Self {
            _tmp: tmp,
            base,
            engine,
        }
    }

    fn root(&self, project_type: ProjectType) -> PathBuf {
        self.base.join(project_type.as_str())
    }
}

fn read(path: &Path) -> String {
    fs::read_to_string(path).unwrap()
}

#[tokio::test]
async fn webapp_is_scaffolded_with_metadata() {
    let fx = Fixture::new();
    let root = fx.root(ProjectType::Webapp);
    let project = fx
        .engine
        .create_project(ProjectType::Webapp, "site", &root, &ExecOptions::default())
        .await
        .unwrap();

    assert_eq!(project.path, root.join("site"));
    assert_eq!(project.project_type, ProjectType::Webapp);
    assert!(read(&project.path.join("index.html")).contains("<title>site</title>"));

    let metadata: serde_json::Value =
        serde_json::from_str(&read(&project.path.join(PROJECT_METADATA_FILE))).unwrap();
    assert_eq!(metadata["type"], "webapp");
    assert_eq!(metadata["name"], "site");
    assert_eq!(metadata["id"], project.id.to_string());

    let loaded = fx.engine.load_project(&project.path).unwrap();
    assert_eq!(loaded, project);
}

#[tokio::test]
async fn node_and_java_scaffolds_are_runnable_layouts() {
    let fx = Fixture::new();
    let node = fx
        .engine
        .create_project(
            ProjectType::Nodejs,
            "My Api",
            &fx.root(ProjectType::Nodejs),
            &ExecOptions::default(),
        )
        .await
        .unwrap();
    let manifest: serde_json::Value =
        serde_json::from_str(&read(&node.path.join("package.json"))).unwrap();
    assert_eq!(manifest["name"], "my-api");
    assert_eq!(manifest["scripts"]["start"], "node index.js");
    assert!(node.path.join("index.js").is_file());

    let java = fx
        .engine
        .create_project(
            ProjectType::Java,
            "calc",
            &fx.root(ProjectType::Java),
            &ExecOptions::default(),
        )
        .await
        .unwrap();
    assert!(read(&java.path.join("pom.xml")).contains("<mainClass>Main</mainClass>"));
    assert!(read(&java.path.join("src/main/java/Main.java")).contains("public class Main"));
}

#[tokio::test]
async fn delphi_source_is_named_after_the_project() {
    let fx = Fixture::new();
    let project = fx
        .engine
        .create_project(
            ProjectType::Delphi,
            "Hello World",
            &fx.root(ProjectType::Delphi),
            &ExecOptions::default(),
        )
        .await
        .unwrap();
    let source = read(&project.path.join("Hello_World.dpr"));
    assert!(source.starts_with("program Hello_World;"));
}

#[tokio::test]
async fn existing_target_is_a_conflict_and_left_alone() {
    let fx = Fixture::new();
    let root = fx.root(ProjectType::Webapp);
    fs::create_dir_all(root.join("taken")).unwrap();
    fs::write(root.join("taken").join("keep.txt"), "mine").unwrap();

    let err = fx
        .engine
        .create_project(ProjectType::Webapp, "taken", &root, &ExecOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::Conflict);
    assert_eq!(read(&root.join("taken").join("keep.txt")), "mine");
    assert!(!root.join("taken").join("index.html").exists());
}

#[tokio::test]
async fn path_like_names_are_rejected() {
    let fx = Fixture::new();
    let root = fx.root(ProjectType::Webapp);
    for name in ["../evil", "a/b", "..", ""] {
        let err = fx
            .engine
            .create_project(ProjectType::Webapp, name, &root, &ExecOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidArgument, "name {:?}", name);
    }
    assert!(!fx.base.join("evil").exists());
}

#[tokio::test]
async fn base_outside_roots_is_denied() {
    let fx = Fixture::new();
    let outside = fx.base.join("elsewhere");
    let err = fx
        .engine
        .create_project(ProjectType::Webapp, "site", &outside, &ExecOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::AccessDenied);
    assert!(!outside.exists());
}

#[cfg(unix)]
#[tokio::test]
async fn failed_scaffold_is_rolled_back() {
    let fx = Fixture::with(|settings| {
        settings
            .toolchains
            .set(ToolchainFamily::Python, Some(PathBuf::from("/bin/false")));
    });
    let root = fx.root(ProjectType::Python);
    let err = fx
        .engine
        .create_project(ProjectType::Python, "broken", &root, &ExecOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::Io);
    assert!(!root.join("broken").exists());
}

#[tokio::test]
async fn delete_is_idempotent_and_spares_roots() {
    let fx = Fixture::new();
    let root = fx.root(ProjectType::Webapp);
    let project = fx
        .engine
        .create_project(ProjectType::Webapp, "gone", &root, &ExecOptions::default())
        .await
        .unwrap();

    fx.engine.delete_project(&project.path).unwrap();
    assert!(!project.path.exists());
    fx.engine.delete_project(&project.path).unwrap();

    let err = fx.engine.delete_project(&root).unwrap_err();
    assert_eq!(err.code, ErrorCode::AccessDenied);
    assert!(root.is_dir());

    let err = fx.engine.delete_project(&fx.base).unwrap_err();
    assert_eq!(err.code, ErrorCode::AccessDenied);
}

#[test]
fn unmanaged_directories_get_inferred_type_and_stable_id() {
    let fx = Fixture::new();
    let in_node_root = fx.root(ProjectType::Nodejs).join("legacy");
    fs::create_dir_all(&in_node_root).unwrap();

    let first = fx.engine.load_project(&in_node_root).unwrap();
    let second = fx.engine.load_project(&in_node_root).unwrap();
    assert_eq!(first.project_type, ProjectType::Nodejs);
    assert_eq!(first.name, "legacy");
    assert_eq!(first.id, second.id);

    let other = fx.root(ProjectType::Nodejs).join("legacy2");
    fs::create_dir_all(&other).unwrap();
    assert_ne!(fx.engine.load_project(&other).unwrap().id, first.id);
}

#[test]
fn listing_skips_hidden_and_noise_directories() {
    let fx = Fixture::new();
    let python_root = fx.root(ProjectType::Python);
    for dir in ["alpha", "Beta", ".hidden", "__pycache__"] {
        fs::create_dir_all(python_root.join(dir)).unwrap();
    }
    fs::write(python_root.join("loose.py"), "").unwrap();
    fs::create_dir_all(fx.root(ProjectType::Webapp).join("gamma")).unwrap();

    let projects = fx.engine.list_projects().unwrap();
    let names: Vec<_> = projects.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, vec!["alpha", "Beta", "gamma"]);
    assert_eq!(projects[0].project_type, ProjectType::Python);
    assert_eq!(projects[2].project_type, ProjectType::Webapp);
}

#[tokio::test]
async fn install_is_not_applicable_for_static_types() {
    let fx = Fixture::new();
    let project = fx
        .engine
        .create_project(
            ProjectType::Webapp,
            "static",
            &fx.root(ProjectType::Webapp),
            &ExecOptions::default(),
        )
        .await
        .unwrap();
    let result = fx
        .engine
        .install_dependencies(&project, &ExecOptions::default())
        .await
        .unwrap();
    assert!(matches!(result.outcome, ExecOutcome::NotApplicable { .. }));
    assert_eq!(result.exit_code(), 0);
}

#[tokio::test]
async fn python_install_seeds_requirements_and_needs_a_venv() {
    let fx = Fixture::new();
    let dir = fx.root(ProjectType::Python).join("novenv");
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("main.py"), "print('hi')\n").unwrap();
    let project = fx.engine.load_project(&dir).unwrap();

    let result = fx
        .engine
        .install_dependencies(&project, &ExecOptions::default())
        .await
        .unwrap();
    assert!(dir.join("requirements.txt").is_file());
    assert!(matches!(result.outcome, ExecOutcome::Unavailable { .. }));
    assert!(result.stderr.contains("Virtual environment not found"));
}
