// Test module - relaxed lint rules
#![allow(clippy::indexing_slicing)]
#![allow(clippy::panic)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(missing_docs)]

//! Directory listings, file access and tree rendering inside project roots.

use projbox::model::{ProjectType, Settings};
use projbox::platform::HostPlatform;
use projbox::{Engine, ErrorCode};
use std::fs;
use std::path::PathBuf;

struct Fixture {
    tmp: tempfile::TempDir,
    root: PathBuf,
    engine: Engine,
}

fn fixture() -> Fixture {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path().join("projects");
    fs::create_dir_all(&root).unwrap();
    let mut settings = Settings::default();
    settings
        .project_roots
        .set(ProjectType::Python, Some(root.clone()));
    let engine = Engine::in_memory(settings, HostPlatform::current()).unwrap();
    Fixture { tmp, root, engine }
}

fn touch(path: PathBuf) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, "x").unwrap();
}

#[test]
fn listing_hides_noise_and_puts_directories_first() {
    let fx = fixture();
    let demo = fx.root.join("demo");
    touch(demo.join("zeta.txt"));
    touch(demo.join("Alpha.txt"));
    touch(demo.join("src").join("lib.py"));
    touch(demo.join("node_modules").join("dep.js"));
    touch(demo.join(".git").join("HEAD"));
    touch(demo.join("venv").join("pyvenv.cfg"));

    let nodes = fx.engine.read_dir(&demo).unwrap();
    let names: Vec<_> = nodes.iter().map(|n| n.name.as_str()).collect();
    assert_eq!(names, vec!["src", "Alpha.txt", "zeta.txt"]);
    assert!(nodes[0].is_directory);
    assert_eq!(nodes[1].path, demo.join("Alpha.txt"));
}

#[test]
fn nested_noise_directories_are_hidden_at_every_level() {
    let fx = fixture();
    let demo = fx.root.join("demo");
    touch(demo.join("src").join("lib.py"));
    touch(demo.join("src").join(".git").join("HEAD"));
    touch(demo.join("pkg").join("node_modules").join("x.js"));
    touch(demo.join("pkg").join("index.js"));

    let src: Vec<_> = fx
        .engine
        .read_dir(&demo.join("src"))
        .unwrap()
        .into_iter()
        .map(|n| n.name)
        .collect();
    assert_eq!(src, vec!["lib.py"]);

    let tree = fx.engine.get_file_tree(&demo).unwrap();
    assert_eq!(
        tree,
        "demo/\n├── pkg/\n│   └── index.js\n└── src/\n    └── lib.py\n"
    );
}

#[test]
fn tree_renders_with_box_drawing() {
    let fx = fixture();
    let demo = fx.root.join("demo");
    touch(demo.join("a.txt"));
    touch(demo.join("b").join("c.txt"));
    touch(demo.join("__pycache__").join("a.pyc"));

    let tree = fx.engine.get_file_tree(&demo).unwrap();
    assert_eq!(tree, "demo/\n├── b/\n│   └── c.txt\n└── a.txt\n");
}

#[test]
fn empty_directory_tree_is_just_the_root() {
    let fx = fixture();
    let demo = fx.root.join("empty");
    fs::create_dir_all(&demo).unwrap();
    assert_eq!(fx.engine.get_file_tree(&demo).unwrap(), "empty/\n");
}

#[test]
fn all_files_are_relative_slash_paths() {
    let fx = fixture();
    let demo = fx.root.join("demo");
    touch(demo.join("main.py"));
    touch(demo.join("pkg").join("sub").join("mod.py"));
    touch(demo.join("pkg").join("__init__.py"));
    touch(demo.join("build").join("out.bin"));
    touch(demo.join("pkg").join("node_modules").join("x.js"));
    touch(demo.join("pkg").join("sub").join(".git").join("HEAD"));

    let files = fx.engine.get_all_files(&demo).unwrap();
    assert_eq!(files, vec!["pkg/sub/mod.py", "pkg/__init__.py", "main.py"]);
}

#[test]
fn read_missing_file_is_not_found() {
    let fx = fixture();
    let err = fx
        .engine
        .read_file(&fx.root.join("demo").join("missing.txt"))
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::NotFound);
}

#[test]
fn write_creates_parents_and_reads_back() {
    let fx = fixture();
    let file = fx.root.join("demo").join("deep").join("notes.md");
    fx.engine.write_file(&file, "# notes\n").unwrap();
    assert_eq!(fx.engine.read_file(&file).unwrap(), "# notes\n");

    fx.engine.write_file(&file, "").unwrap();
    assert_eq!(fx.engine.read_file(&file).unwrap(), "");
}

#[test]
fn writes_outside_the_roots_are_denied() {
    let fx = fixture();
    let outside = fx.tmp.path().join("outside.txt");
    let err = fx.engine.write_file(&outside, "nope").unwrap_err();
    assert_eq!(err.code, ErrorCode::AccessDenied);
    assert!(!outside.exists());

    let sneaky = fx.root.join("demo").join("..").join("..").join("outside.txt");
    let err = fx.engine.write_file(&sneaky, "nope").unwrap_err();
    assert_eq!(err.code, ErrorCode::AccessDenied);
    assert!(!outside.exists());
}

#[test]
fn external_files_are_copied_in_by_base_name() {
    let fx = fixture();
    let source = fx.tmp.path().join("download").join("data.csv");
    touch(source.clone());
    let target = fx.root.join("demo");
    fs::create_dir_all(&target).unwrap();

    let copied = fx.engine.add_file_from_path(&source, &target).unwrap();
    assert_eq!(copied, target.join("data.csv"));
    assert_eq!(fs::read_to_string(&copied).unwrap(), "x");
    assert!(source.exists());
}

#[test]
fn copy_requires_existing_source_and_allowed_target() {
    let fx = fixture();
    let target = fx.root.join("demo");
    fs::create_dir_all(&target).unwrap();

    let err = fx
        .engine
        .add_file_from_path(&fx.tmp.path().join("nope.csv"), &target)
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::NotFound);

    let source = fx.tmp.path().join("data.csv");
    touch(source.clone());
    let err = fx
        .engine
        .add_file_from_path(&source, fx.tmp.path())
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::AccessDenied);
}

#[test]
fn listing_a_file_or_missing_directory_is_not_found() {
    let fx = fixture();
    touch(fx.root.join("demo").join("file.txt"));
    let err = fx
        .engine
        .read_dir(&fx.root.join("demo").join("file.txt"))
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::NotFound);
    let err = fx.engine.get_file_tree(&fx.root.join("ghost")).unwrap_err();
    assert_eq!(err.code, ErrorCode::NotFound);
}
