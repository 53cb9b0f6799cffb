// Test module - relaxed lint rules
#![cfg(unix)]
#![allow(clippy::indexing_slicing)]
#![allow(clippy::panic)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(missing_docs)]

//! Snippets and project scripts leave no temporary files behind.
//!
//! `/bin/sh` stands in for the interpreters so the scripts are shell code.

use projbox::model::{ExecOutcome, ProjectType, Settings, ToolchainFamily};
use projbox::platform::HostPlatform;
use projbox::runner::ExecOptions;
use projbox::snippet::SnippetLanguage;
use projbox::{CodeProject, Engine, ProjectId};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

struct Fixture {
    _tmp: tempfile::TempDir,
    scratch: PathBuf,
    root: PathBuf,
    engine: Engine,
}

fn fixture() -> Fixture {
    fixture_with_python(Path::new("/bin/sh"))
}

fn fixture_with_python(python: &Path) -> Fixture {
    let tmp = tempfile::tempdir().unwrap();
    let scratch = tmp.path().join("scratch");
    let root = tmp.path().join("projects");
    fs::create_dir_all(&root).unwrap();

    let mut settings = Settings::default();
    for project_type in ProjectType::ALL {
        settings.project_roots.set(project_type, Some(root.clone()));
    }
    settings
        .toolchains
        .set(ToolchainFamily::Python, Some(python.to_path_buf()));
    settings
        .toolchains
        .set(ToolchainFamily::Nodejs, Some(PathBuf::from("/bin/sh")));
    settings.exec.scratch_dir = Some(scratch.clone());
    let engine = Engine::in_memory(settings, HostPlatform::Posix).unwrap();
    Fixture {
        _tmp: tmp,
        scratch,
        root,
        engine,
    }
}

fn entries(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

fn project(fx: &Fixture, name: &str, project_type: ProjectType) -> CodeProject {
    let path = fx.root.join(name);
    fs::create_dir_all(&path).unwrap();
    fs::write(path.join("keep.txt"), "").unwrap();
    CodeProject {
        id: ProjectId::new(),
        name: name.to_string(),
        project_type,
        path,
    }
}

#[tokio::test]
async fn snippet_output_is_captured_and_file_removed() {
    let fx = fixture();
    let result = fx
        .engine
        .run_snippet(SnippetLanguage::Python, "echo hello\necho oops >&2\n", &ExecOptions::default())
        .await
        .unwrap();
    assert_eq!(result.outcome, ExecOutcome::Ok);
    assert_eq!(result.stdout, "hello\n");
    assert_eq!(result.stderr, "oops\n");
    assert!(entries(&fx.scratch).is_empty());
}

#[tokio::test]
async fn failing_snippet_still_cleans_up() {
    let fx = fixture();
    let result = fx
        .engine
        .run_snippet(SnippetLanguage::Nodejs, "exit 4\n", &ExecOptions::default())
        .await
        .unwrap();
    assert_eq!(result.outcome, ExecOutcome::Failed { exit_code: Some(4) });
    assert_eq!(result.exit_code(), 4);
    assert!(entries(&fx.scratch).is_empty());
}

#[tokio::test]
async fn timed_out_snippet_still_cleans_up() {
    let fx = fixture();
    let options = ExecOptions::default().with_timeout(Some(Duration::from_millis(200)));
    let result = fx
        .engine
        .run_snippet(SnippetLanguage::Python, "sleep 5\n", &options)
        .await
        .unwrap();
    assert!(matches!(result.outcome, ExecOutcome::TimedOut { timeout_ms: 200 }));
    assert!(entries(&fx.scratch).is_empty());
}

#[tokio::test]
async fn missing_interpreter_still_cleans_up() {
    let fx = fixture_with_python(Path::new("/no/such/python3"));
    let result = fx
        .engine
        .run_snippet(SnippetLanguage::Python, "print(1)\n", &ExecOptions::default())
        .await
        .unwrap();
    assert!(matches!(result.outcome, ExecOutcome::LaunchError { .. }));
    assert_eq!(result.exit_code(), 127);
    assert!(result.stderr.contains("/no/such/python3"));
    assert!(entries(&fx.scratch).is_empty());

    let p = project(&fx, "tool", ProjectType::Python);
    let result = fx
        .engine
        .run_script(&p, "print(1)\n", &ExecOptions::default())
        .await
        .unwrap();
    assert!(matches!(result.outcome, ExecOutcome::LaunchError { .. }));
    assert_eq!(entries(&p.path), vec!["keep.txt"]);
}

#[tokio::test]
async fn dropped_snippet_future_removes_its_file() {
    let fx = fixture();
    let opts = ExecOptions::default();
    let run = fx
        .engine
        .run_snippet(SnippetLanguage::Python, "sleep 5\n", &opts);
    let outcome = tokio::time::timeout(Duration::from_millis(200), run).await;
    assert!(outcome.is_err());
    assert!(entries(&fx.scratch).is_empty());
}

#[tokio::test]
async fn project_script_runs_in_the_project_directory() {
    let fx = fixture();
    let p = project(&fx, "tool", ProjectType::Python);
    let result = fx
        .engine
        .run_script(&p, "pwd\n", &ExecOptions::default())
        .await
        .unwrap();
    assert_eq!(result.outcome, ExecOutcome::Ok);
    assert_eq!(
        fs::canonicalize(result.stdout.trim()).unwrap(),
        fs::canonicalize(&p.path).unwrap()
    );
    assert_eq!(entries(&p.path), vec!["keep.txt"]);
}

#[tokio::test]
async fn scripts_are_refused_for_compiled_and_static_projects() {
    let fx = fixture();
    for project_type in [ProjectType::Java, ProjectType::Delphi, ProjectType::Webapp] {
        let p = project(&fx, project_type.as_str(), project_type);
        let result = fx
            .engine
            .run_script(&p, "echo hi\n", &ExecOptions::default())
            .await
            .unwrap();
        assert!(
            matches!(result.outcome, ExecOutcome::NotApplicable { .. }),
            "{} gave {:?}",
            project_type,
            result.outcome
        );
        assert!(result.stdout.contains("not supported"));
        assert_eq!(entries(&p.path), vec!["keep.txt"]);
    }
}

#[tokio::test]
async fn html_snippet_is_kept_for_the_browser() {
    let fx = fixture();
    let _ = fx
        .engine
        .run_snippet(SnippetLanguage::Html, "<h1>hi</h1>", &ExecOptions::default())
        .await
        .unwrap();
    let names = entries(&fx.scratch);
    assert_eq!(names.len(), 1);
    assert!(names[0].ends_with(".html"));
    assert_eq!(
        fs::read_to_string(fx.scratch.join(&names[0])).unwrap(),
        "<h1>hi</h1>"
    );
}
