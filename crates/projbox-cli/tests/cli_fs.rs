// Test module - relaxed lint rules
#![allow(clippy::indexing_slicing)]
#![allow(clippy::panic)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(missing_docs)]

//! End-to-end runs of the binary against a temporary settings file.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use std::io::Write;

struct Sandbox {
    tmp: tempfile::TempDir,
    settings: PathBuf,
    root: PathBuf,
}

impl Sandbox {
    /// Settings with one root for every project type.
    fn new() -> Self {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("projects");
        fs::create_dir_all(&root).unwrap();
        let settings = tmp.path().join("settings.json");
        let sandbox = Self {
            tmp,
            settings,
            root,
        };
        for ty in ["python", "nodejs", "java", "delphi", "webapp"] {
            let output = sandbox.run(&["settings", "set-root", ty, sandbox.root.to_str().unwrap()]);
            assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
        }
        sandbox
    }

    fn command(&self, args: &[&str]) -> Command {
        let mut command = Command::new(env!("CARGO_BIN_EXE_projbox"));
        command
            .arg("--settings")
            .arg(&self.settings)
            .arg("--color=never")
            .args(args)
            .env_remove("PROJBOX_LOG");
        command
    }

    fn run(&self, args: &[&str]) -> Output {
        self.command(args).output().expect("failed to execute")
    }

    fn path(&self, relative: &str) -> String {
        self.root.join(relative).display().to_string()
    }
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn json(output: &Output) -> serde_json::Value {
    serde_json::from_slice(&output.stdout).unwrap_or_else(|err| {
        panic!(
            "stdout is not JSON ({err}): {}\nstderr: {}",
            stdout(output),
            String::from_utf8_lossy(&output.stderr)
        )
    })
}

#[test]
fn settings_round_trip_through_the_cli() {
    let sandbox = Sandbox::new();
    let output = sandbox.run(&["settings", "show", "--json"]);
    assert!(output.status.success());
    let settings = json(&output);
    assert_eq!(settings["project_roots"]["webapp"], sandbox.root.display().to_string());

    let output = sandbox.run(&["settings", "set-root", "webapp", "--clear"]);
    assert!(output.status.success());
    let settings = json(&sandbox.run(&["settings", "show", "--json"]));
    assert!(settings["project_roots"].get("webapp").is_none());
}

#[test]
fn relative_root_is_a_config_error() {
    let sandbox = Sandbox::new();
    let output = sandbox.run(&["settings", "set-root", "python", "relative/dir"]);
    assert_eq!(output.status.code(), Some(8));
}

#[test]
fn write_cat_and_tree() {
    let sandbox = Sandbox::new();
    let file = sandbox.path("demo/b/c.txt");
    let output = sandbox.run(&["fs", "write", &file, "--content", "hello\n"]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let mut child = sandbox
        .command(&["fs", "write", &sandbox.path("demo/a.txt")])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .spawn()
        .unwrap();
    child.stdin.take().unwrap().write_all(b"from stdin").unwrap();
    assert!(child.wait_with_output().unwrap().status.success());

    assert_eq!(stdout(&sandbox.run(&["fs", "cat", &file])), "hello\n");
    assert_eq!(
        stdout(&sandbox.run(&["fs", "cat", &sandbox.path("demo/a.txt")])),
        "from stdin"
    );
    assert_eq!(
        stdout(&sandbox.run(&["fs", "tree", &sandbox.path("demo")])),
        "demo/\n├── b/\n│   └── c.txt\n└── a.txt\n"
    );
    assert_eq!(
        stdout(&sandbox.run(&["fs", "files", &sandbox.path("demo")])),
        "b/c.txt\na.txt\n"
    );
    assert_eq!(stdout(&sandbox.run(&["fs", "ls", &sandbox.path("demo")])), "b/\na.txt\n");
}

#[test]
fn access_outside_roots_exits_with_denied_code() {
    let sandbox = Sandbox::new();
    let outside = sandbox.tmp.path().join("secret.txt");
    fs::write(&outside, "s").unwrap();

    let output = sandbox.run(&["fs", "cat", outside.to_str().unwrap(), "--json"]);
    assert_eq!(output.status.code(), Some(2));
    assert_eq!(json(&output)["code"], "E_ACCESS_DENIED");

    let output = sandbox.run(&["guard", "check", outside.to_str().unwrap(), "--json"]);
    assert_eq!(output.status.code(), Some(2));
    assert_eq!(json(&output)["allowed"], false);

    let output = sandbox.run(&["guard", "check", &sandbox.path("x/y"), "--json"]);
    assert!(output.status.success());
    assert_eq!(json(&output)["allowed"], true);
}

#[test]
fn missing_file_exits_with_not_found_code() {
    let sandbox = Sandbox::new();
    let output = sandbox.run(&["fs", "cat", &sandbox.path("nope.txt")]);
    assert_eq!(output.status.code(), Some(9));
    assert!(String::from_utf8_lossy(&output.stderr).contains("E_NOT_FOUND"));
}

#[test]
fn webapp_project_lifecycle() {
    let sandbox = Sandbox::new();
    let output = sandbox.run(&["project", "create", "webapp", "site", "--json"]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let project = json(&output);
    assert_eq!(project["type"], "webapp");
    assert_eq!(project["name"], "site");
    let dir = PathBuf::from(project["path"].as_str().unwrap());
    assert!(dir.join("index.html").is_file());

    let output = sandbox.run(&["project", "create", "webapp", "site", "--json"]);
    assert_eq!(output.status.code(), Some(3));

    let listed = json(&sandbox.run(&["project", "list", "--json"]));
    assert_eq!(listed.as_array().unwrap().len(), 1);
    assert_eq!(listed[0]["id"], project["id"]);

    let shown = json(&sandbox.run(&["project", "show", dir.to_str().unwrap(), "--plan", "--json"]));
    assert_eq!(shown["plan"]["kind"], "browser");

    let output = sandbox.run(&["project", "install", dir.to_str().unwrap(), "--json"]);
    assert!(output.status.success());
    assert_eq!(json(&output)["outcome"]["kind"], "not_applicable");

    let output = sandbox.run(&["project", "delete", dir.to_str().unwrap()]);
    assert!(output.status.success());
    assert!(!Path::new(&dir).exists());
}

#[cfg(unix)]
#[test]
fn snippet_exit_code_is_mirrored() {
    let sandbox = Sandbox::new();
    let output = sandbox.run(&["settings", "set-toolchain", "python", "/bin/sh"]);
    assert!(output.status.success());

    let output = sandbox.run(&["snippet", "python", "-c", "echo streamed; exit 3"]);
    assert_eq!(output.status.code(), Some(3));
    assert_eq!(stdout(&output), "streamed\n");

    let output = sandbox.run(&["snippet", "python", "-c", "sleep 5", "--timeout-ms", "200", "--json"]);
    assert_eq!(output.status.code(), Some(124));
    assert_eq!(json(&output)["outcome"]["kind"], "timed_out");
}
