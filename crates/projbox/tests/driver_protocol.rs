// Test module - relaxed lint rules
#![allow(clippy::indexing_slicing)]
#![allow(clippy::panic)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(missing_docs)]

//! NDJSON service driven from an in-memory transcript.

use projbox::driver::serve;
use projbox::model::{ProjectType, Settings, ToolchainFamily, PROTOCOL_VERSION};
use projbox::platform::HostPlatform;
use projbox::Engine;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

struct Fixture {
    _tmp: tempfile::TempDir,
    root: PathBuf,
    engine: Arc<Engine>,
}

fn fixture() -> Fixture {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path().join("projects");
    fs::create_dir_all(root.join("alpha")).unwrap();
    fs::write(root.join("alpha").join("index.html"), "<p/>").unwrap();
    let mut settings = Settings::default();
    settings.project_roots.set(ProjectType::Webapp, Some(root.clone()));
    if cfg!(unix) {
        settings
            .toolchains
            .set(ToolchainFamily::Python, Some(PathBuf::from("/bin/sh")));
    }
    settings.exec.scratch_dir = Some(tmp.path().join("scratch"));
    let engine = Engine::in_memory(settings, HostPlatform::current()).unwrap();
    Fixture {
        _tmp: tmp,
        root,
        engine: Arc::new(engine),
    }
}

fn request(id: &str, command: Value) -> String {
    json!({
        "protocol_version": PROTOCOL_VERSION,
        "request_id": id,
        "command": command,
    })
    .to_string()
}

async fn transcript(engine: Arc<Engine>, lines: &[String]) -> Vec<Value> {
    let input = lines.join("\n") + "\n";
    let output = serve(engine, input.as_bytes(), Vec::new()).await.unwrap();
    String::from_utf8(output)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

fn by_id(responses: &[Value]) -> HashMap<String, Value> {
    responses
        .iter()
        .map(|r| (r["request_id"].as_str().unwrap().to_string(), r.clone()))
        .collect()
}

#[tokio::test]
async fn bad_lines_do_not_stop_the_loop() {
    let fx = fixture();
    let lines = vec![
        "{oops".to_string(),
        String::new(),
        request("r1", json!({"type": "list_projects"})),
    ];
    let responses = transcript(Arc::clone(&fx.engine), &lines).await;
    assert_eq!(responses.len(), 2);
    assert_eq!(responses[0]["request_id"], "unknown");
    assert_eq!(responses[0]["status"], "error");
    assert_eq!(responses[0]["error"]["code"], "E_PROTOCOL");

    let list = &responses[1];
    assert_eq!(list["request_id"], "r1");
    assert_eq!(list["status"], "ok");
    assert_eq!(list["result"][0]["name"], "alpha");
    assert_eq!(list["result"][0]["type"], "webapp");
}

#[tokio::test]
async fn version_mismatch_reports_both_versions() {
    let fx = fixture();
    let line = json!({
        "protocol_version": PROTOCOL_VERSION + 1,
        "request_id": "v",
        "command": {"type": "get_settings"},
    })
    .to_string();
    let responses = transcript(Arc::clone(&fx.engine), &[line]).await;
    let error = &responses[0]["error"];
    assert_eq!(responses[0]["request_id"], "v");
    assert_eq!(error["code"], "E_PROTOCOL");
    assert_eq!(error["context"]["provided_version"], PROTOCOL_VERSION + 1);
    assert_eq!(error["context"]["supported_version"], PROTOCOL_VERSION);
}

#[tokio::test]
async fn file_commands_round_trip_through_the_guard() {
    let fx = fixture();
    let file = fx.root.join("alpha").join("notes.txt");
    let outside = fx.root.parent().unwrap().join("escape.txt");
    let lines = vec![
        request(
            "w",
            json!({"type": "write_file", "payload": {"path": file, "content": "hi"}}),
        ),
        request(
            "x",
            json!({"type": "write_file", "payload": {"path": outside, "content": "no"}}),
        ),
    ];
    let responses = by_id(&transcript(Arc::clone(&fx.engine), &lines).await);
    assert_eq!(responses["w"]["result"]["bytes"], 2);
    assert_eq!(responses["x"]["error"]["code"], "E_ACCESS_DENIED");
    assert!(!outside.exists());

    let read = request("r", json!({"type": "read_file", "payload": {"path": file}}));
    let responses = transcript(Arc::clone(&fx.engine), &[read]).await;
    assert_eq!(responses[0]["result"], "hi");
}

#[tokio::test]
async fn cancel_outside_any_request_reports_false() {
    let fx = fixture();
    let line = request("c", json!({"type": "cancel", "payload": {"request_id": "ghost"}}));
    let responses = transcript(Arc::clone(&fx.engine), &[line]).await;
    assert_eq!(responses[0]["status"], "ok");
    assert_eq!(responses[0]["result"]["cancelled"], false);
}

#[cfg(unix)]
#[tokio::test]
async fn running_snippet_can_be_cancelled() {
    let fx = fixture();
    let lines = vec![
        request("run", json!({"type": "run_python", "payload": {"code": "sleep 5\n"}})),
        request("run", json!({"type": "run_python", "payload": {"code": "echo twin\n"}})),
        request("stop", json!({"type": "cancel", "payload": {"request_id": "run"}})),
    ];
    let started = std::time::Instant::now();
    let responses = transcript(Arc::clone(&fx.engine), &lines).await;
    assert!(started.elapsed() < std::time::Duration::from_secs(4));
    assert_eq!(responses.len(), 3);

    let stop = responses.iter().find(|r| r["request_id"] == "stop").unwrap();
    assert_eq!(stop["result"]["cancelled"], true);

    let runs: Vec<_> = responses.iter().filter(|r| r["request_id"] == "run").collect();
    assert!(runs
        .iter()
        .any(|r| r["error"]["code"] == "E_CONFLICT"));
    assert!(runs
        .iter()
        .any(|r| r["result"]["outcome"]["kind"] == "cancelled"));
}
