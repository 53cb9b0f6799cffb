//! Stdio service: NDJSON requests in, NDJSON responses out.
//!
//! Each request runs on its own task, so a long project run does not block
//! file reads issued after it. Responses are written in completion order and
//! matched to requests by `request_id`.

use crate::engine::Engine;
use crate::error::{EngineError, EngineResult};
use crate::model::{
    DriverCommand, DriverRequest, DriverResponse, DriverResponseStatus, PROTOCOL_VERSION,
};
use crate::runner::ExecOptions;
use crate::snippet::SnippetLanguage;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

type InFlight = Arc<Mutex<HashMap<String, CancellationToken>>>;

/// Serve requests from stdin until it closes.
pub async fn run_driver(engine: Arc<Engine>) -> EngineResult<()> {
    let input = BufReader::new(tokio::io::stdin());
    serve(engine, input, tokio::io::stdout()).await.map(drop)
}

/// Serve requests from `input`, writing responses to `output`.
///
/// Returns once the input is exhausted and every in-flight request has been
/// answered, handing `output` back to the caller.
pub async fn serve<R, W>(engine: Arc<Engine>, input: R, output: W) -> EngineResult<W>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (responses, pending) = mpsc::unbounded_channel();
    let writer = tokio::spawn(write_responses(output, pending));
    let in_flight: InFlight = Arc::default();
    let mut tasks = JoinSet::new();

    tracing::info!(protocol_version = PROTOCOL_VERSION, "driver started");
    let mut lines = input.lines();
    while let Some(line) = lines
        .next_line()
        .await
        .map_err(|err| EngineError::io("failed to read driver input", "<stdin>", err))?
    {
        if line.trim().is_empty() {
            continue;
        }
        let request = match parse_request(&line) {
            Ok(request) => request,
            Err(response) => {
                let _ = responses.send(*response);
                continue;
            }
        };
        let DriverRequest {
            request_id,
            command,
            ..
        } = request;
        tracing::debug!(%request_id, command = command_name(&command), "request received");

        if let DriverCommand::Cancel { request_id: target } = command {
            let cancelled = lock(&in_flight).get(&target).map(CancellationToken::cancel).is_some();
            tracing::debug!(%target, cancelled, "cancel requested");
            let _ = responses.send(ok_response(
                request_id,
                serde_json::json!({"request_id": target, "cancelled": cancelled}),
            ));
            continue;
        }

        let token = CancellationToken::new();
        let mut registration = None;
        if command.is_cancellable() {
            let mut registry = lock(&in_flight);
            if registry.contains_key(&request_id) {
                drop(registry);
                let err = EngineError::conflict(
                    "a request with this id is still running",
                    serde_json::json!({"request_id": request_id}),
                );
                let _ = responses.send(error_response(request_id, &err));
                continue;
            }
            registry.insert(request_id.clone(), token.clone());
            registration = Some(Registration {
                in_flight: Arc::clone(&in_flight),
                request_id: request_id.clone(),
            });
        }

        let engine = Arc::clone(&engine);
        let responses = responses.clone();
        tasks.spawn(async move {
            let outcome = isolate(async move { dispatch(&engine, command, &token).await }).await;
            drop(registration);
            let response = match outcome {
                Ok(result) => ok_response(request_id, result),
                Err(err) => {
                    tracing::debug!(%request_id, error = %err, "request failed");
                    error_response(request_id, &err)
                }
            };
            let _ = responses.send(response);
        });
    }

    while let Some(joined) = tasks.join_next().await {
        if let Err(err) = joined {
            tracing::error!(error = %err, "request task failed");
        }
    }
    drop(responses);
    let output = writer
        .await
        .map_err(|err| EngineError::internal(format!("driver writer task failed: {err}")))??;
    tracing::info!("driver stopped");
    Ok(output)
}

/// Removes a cancellable request from the registry when its task ends,
/// however it ends.
struct Registration {
    in_flight: InFlight,
    request_id: String,
}

impl Drop for Registration {
    fn drop(&mut self) {
        lock(&self.in_flight).remove(&self.request_id);
    }
}

/// Run one request on its own task so a panic becomes an `E_INTERNAL`
/// response instead of a lost request.
async fn isolate<F>(work: F) -> EngineResult<Value>
where
    F: Future<Output = EngineResult<Value>> + Send + 'static,
{
    match tokio::spawn(work).await {
        Ok(outcome) => outcome,
        Err(err) => {
            tracing::error!(error = %err, "request task failed");
            Err(EngineError::internal(format!("request handler failed: {err}")))
        }
    }
}

fn lock(in_flight: &InFlight) -> std::sync::MutexGuard<'_, HashMap<String, CancellationToken>> {
    in_flight.lock().unwrap_or_else(PoisonError::into_inner)
}

async fn write_responses<W>(
    mut output: W,
    mut pending: mpsc::UnboundedReceiver<DriverResponse>,
) -> EngineResult<W>
where
    W: AsyncWrite + Unpin,
{
    while let Some(response) = pending.recv().await {
        let mut payload = serde_json::to_string(&response)
            .map_err(|err| EngineError::internal(format!("failed to serialize driver response: {err}")))?;
        payload.push('\n');
        output
            .write_all(payload.as_bytes())
            .await
            .map_err(|err| EngineError::io("failed to write driver response", "<stdout>", err))?;
        output
            .flush()
            .await
            .map_err(|err| EngineError::io("failed to flush driver response", "<stdout>", err))?;
    }
    Ok(output)
}

fn parse_request(line: &str) -> Result<DriverRequest, Box<DriverResponse>> {
    let value: Value = serde_json::from_str(line).map_err(|err| {
        protocol_error(
            "unknown".to_string(),
            "invalid json request",
            serde_json::json!({
                "parse_error": err.to_string(),
                "received": line.chars().take(200).collect::<String>(),
            }),
        )
    })?;
    let request_id = value
        .get("request_id")
        .and_then(Value::as_str)
        .unwrap_or("unknown")
        .to_string();
    let request: DriverRequest = serde_json::from_value(value).map_err(|err| {
        protocol_error(
            request_id.clone(),
            "malformed request",
            serde_json::json!({
                "parse_error": err.to_string(),
                "hint": "request must carry protocol_version, request_id and command {type, payload}",
            }),
        )
    })?;
    if request.protocol_version != PROTOCOL_VERSION {
        return Err(protocol_error(
            request_id,
            "unsupported protocol version",
            serde_json::json!({
                "provided_version": request.protocol_version,
                "supported_version": PROTOCOL_VERSION,
            }),
        ));
    }
    Ok(request)
}

fn protocol_error(request_id: String, message: &str, context: Value) -> Box<DriverResponse> {
    Box::new(error_response(request_id, &EngineError::protocol(message, context)))
}

fn ok_response(request_id: String, result: Value) -> DriverResponse {
    DriverResponse {
        protocol_version: PROTOCOL_VERSION,
        request_id,
        status: DriverResponseStatus::Ok,
        result: Some(result),
        error: None,
    }
}

fn error_response(request_id: String, err: &EngineError) -> DriverResponse {
    DriverResponse {
        protocol_version: PROTOCOL_VERSION,
        request_id,
        status: DriverResponseStatus::Error,
        result: None,
        error: Some(err.to_error_info()),
    }
}

fn to_json<T: Serialize>(value: &T) -> EngineResult<Value> {
    serde_json::to_value(value)
        .map_err(|err| EngineError::internal(format!("failed to serialize result: {err}")))
}

/// Execute one command against the engine.
pub async fn dispatch(
    engine: &Engine,
    command: DriverCommand,
    cancel: &CancellationToken,
) -> EngineResult<Value> {
    let options = ExecOptions::default().with_cancel(Some(cancel.clone()));
    match command {
        DriverCommand::DetectToolchains => to_json(&engine.detect_toolchains(Some(cancel)).await),
        DriverCommand::GetSettings => to_json(&engine.settings()),
        DriverCommand::SaveSettings { settings } => {
            engine.save_settings(settings)?;
            to_json(&engine.settings())
        }
        DriverCommand::ReloadSettings => to_json(&engine.reload()?),
        DriverCommand::CreateProject {
            project_type,
            name,
            base_path,
        } => to_json(
            &engine
                .create_project(project_type, &name, &base_path, &options)
                .await?,
        ),
        DriverCommand::DeleteProject { path } => {
            engine.delete_project(&path)?;
            Ok(serde_json::json!({"deleted": path}))
        }
        DriverCommand::LoadProject { path } => to_json(&engine.load_project(&path)?),
        DriverCommand::ListProjects => to_json(&engine.list_projects()?),
        DriverCommand::OpenFolder { path } => to_json(&engine.open_folder(&path).await?),
        DriverCommand::OpenWebApp { path } => to_json(&engine.open_web_app(&path).await?),
        DriverCommand::InstallDependencies { project } => {
            to_json(&engine.install_dependencies(&project, &options).await?)
        }
        DriverCommand::RunProject { project } => {
            to_json(&engine.run_project(&project, &options).await?)
        }
        DriverCommand::RunScript { project, code } => {
            to_json(&engine.run_script(&project, &code, &options).await?)
        }
        DriverCommand::RunPython { code } => {
            to_json(&engine.run_snippet(SnippetLanguage::Python, &code, &options).await?)
        }
        DriverCommand::RunNodejs { code } => {
            to_json(&engine.run_snippet(SnippetLanguage::Nodejs, &code, &options).await?)
        }
        DriverCommand::RunHtml { code } => {
            to_json(&engine.run_snippet(SnippetLanguage::Html, &code, &options).await?)
        }
        DriverCommand::SelectDirectory => to_json(&engine.select_directory().await),
        DriverCommand::ReadDir { path } => to_json(&engine.read_dir(&path)?),
        DriverCommand::ReadFile { path } => to_json(&engine.read_file(&path)?),
        DriverCommand::WriteFile { path, content } => {
            engine.write_file(&path, &content)?;
            Ok(serde_json::json!({"written": path, "bytes": content.len()}))
        }
        DriverCommand::AddFileFromPath {
            source_path,
            target_dir,
        } => to_json(&engine.add_file_from_path(&source_path, &target_dir)?),
        DriverCommand::GetAllFiles { path } => to_json(&engine.get_all_files(&path)?),
        DriverCommand::GetFileTree { path } => to_json(&engine.get_file_tree(&path)?),
        DriverCommand::ExplainPath { path } => to_json(&engine.explain_path(&path)),
        DriverCommand::Cancel { request_id } => Err(EngineError::invalid_argument(
            "cancel is handled by the request loop",
            serde_json::json!({"request_id": request_id}),
        )),
    }
}

fn command_name(command: &DriverCommand) -> &'static str {
    match command {
        DriverCommand::DetectToolchains => "detect_toolchains",
        DriverCommand::GetSettings => "get_settings",
        DriverCommand::SaveSettings { .. } => "save_settings",
        DriverCommand::ReloadSettings => "reload_settings",
        DriverCommand::CreateProject { .. } => "create_project",
        DriverCommand::DeleteProject { .. } => "delete_project",
        DriverCommand::LoadProject { .. } => "load_project",
        DriverCommand::ListProjects => "list_projects",
        DriverCommand::OpenFolder { .. } => "open_folder",
        DriverCommand::OpenWebApp { .. } => "open_web_app",
        DriverCommand::InstallDependencies { .. } => "install_dependencies",
        DriverCommand::RunProject { .. } => "run_project",
        DriverCommand::RunScript { .. } => "run_script",
        DriverCommand::RunPython { .. } => "run_python",
        DriverCommand::RunNodejs { .. } => "run_nodejs",
        DriverCommand::RunHtml { .. } => "run_html",
        DriverCommand::SelectDirectory => "select_directory",
        DriverCommand::ReadDir { .. } => "read_dir",
        DriverCommand::ReadFile { .. } => "read_file",
        DriverCommand::WriteFile { .. } => "write_file",
        DriverCommand::AddFileFromPath { .. } => "add_file_from_path",
        DriverCommand::GetAllFiles { .. } => "get_all_files",
        DriverCommand::GetFileTree { .. } => "get_file_tree",
        DriverCommand::ExplainPath { .. } => "explain_path",
        DriverCommand::Cancel { .. } => "cancel",
    }
}
