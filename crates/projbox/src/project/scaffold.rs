//! Starter files for each project type.

use crate::engine::Session;
use crate::error::{EngineError, EngineResult};
use crate::model::{ProjectType, ToolchainFamily};
use crate::runner::{self, CommandSpec, ExecOptions};
use std::fs;
use std::path::Path;

/// Populate a freshly created, empty project directory.
pub(crate) async fn scaffold(
    session: &Session,
    project_type: ProjectType,
    name: &str,
    dir: &Path,
    options: &ExecOptions,
) -> EngineResult<()> {
    match project_type {
        ProjectType::Python => {
            write(dir, "main.py", &python_main(name))?;
            create_venv(session, dir, options).await
        }
        ProjectType::Nodejs => {
            write(dir, "package.json", &node_manifest(name)?)?;
            write(dir, "index.js", &node_index(name))
        }
        ProjectType::Java => {
            write(dir, "pom.xml", &maven_pom(name))?;
            write(dir, "src/main/java/Main.java", &java_main(name))
        }
        ProjectType::Delphi => {
            let program = pascal_identifier(name);
            write(dir, &format!("{program}.dpr"), &delphi_program(&program, name))
        }
        ProjectType::Webapp => write(dir, "index.html", &web_index(name)),
    }
}

fn write(dir: &Path, relative: &str, content: &str) -> EngineResult<()> {
    let path = dir.join(relative);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|err| EngineError::io("failed to create scaffold directory", parent, err))?;
    }
    fs::write(&path, content).map_err(|err| EngineError::io("failed to write scaffold file", &path, err))
}

async fn create_venv(session: &Session, dir: &Path, options: &ExecOptions) -> EngineResult<()> {
    let python = session
        .settings
        .toolchains
        .get(ToolchainFamily::Python)
        .map_or_else(
            || CommandSpec::new(session.platform.default_python()),
            CommandSpec::from_path,
        );
    let spec = python
        .args(["-m", "venv", "venv"])
        .cwd(dir)
        .envs(&session.settings.exec.env);
    let options = session.exec_options(options, session.settings.exec.install_timeout());
    let result = runner::run(&spec, &options).await;
    if result.success() {
        return Ok(());
    }
    Err(EngineError::new(
        crate::ErrorCode::Io,
        "failed to create the virtual environment",
        serde_json::json!({
            "command": spec.to_string(),
            "outcome": result.outcome,
            "stderr": result.stderr,
            "fix": "Select a working Python toolchain in settings",
        }),
    ))
}

/// Lower-case, URL-safe package name accepted by npm.
#[must_use]
pub fn npm_package_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.trim().chars() {
        if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
            out.push(c.to_ascii_lowercase());
        } else if !out.ends_with('-') {
            out.push('-');
        }
    }
    let trimmed = out.trim_matches(|c| matches!(c, '-' | '.' | '_'));
    if trimmed.is_empty() {
        "app".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Valid Pascal program identifier derived from a display name.
#[must_use]
pub fn pascal_identifier(name: &str) -> String {
    let mut out: String = name
        .trim()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if out.chars().all(|c| c == '_') {
        return "Project".to_string();
    }
    if out.starts_with(|c: char| c.is_ascii_digit()) {
        out.insert(0, 'P');
    }
    out
}

fn quoted(text: &str) -> String {
    serde_json::Value::String(text.to_string()).to_string()
}

fn html_escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn python_main(name: &str) -> String {
    format!(
        "def main():\n    print({})\n\n\nif __name__ == \"__main__\":\n    main()\n",
        quoted(&format!("Hello from {name}!"))
    )
}

fn node_manifest(name: &str) -> EngineResult<String> {
    let manifest = serde_json::json!({
        "name": npm_package_name(name),
        "version": "1.0.0",
        "description": "",
        "main": "index.js",
        "scripts": {
            "start": "node index.js"
        },
        "license": "ISC"
    });
    serde_json::to_string_pretty(&manifest)
        .map(|text| text + "\n")
        .map_err(|err| EngineError::internal(format!("failed to render package.json: {err}")))
}

fn node_index(name: &str) -> String {
    format!("console.log({});\n", quoted(&format!("Hello from {name}!")))
}

fn maven_pom(name: &str) -> String {
    let artifact = npm_package_name(name);
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<project xmlns="http://maven.apache.org/POM/4.0.0"
         xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance"
         xsi:schemaLocation="http://maven.apache.org/POM/4.0.0 http://maven.apache.org/xsd/maven-4.0.0.xsd">
  <modelVersion>4.0.0</modelVersion>

  <groupId>com.example</groupId>
  <artifactId>{artifact}</artifactId>
  <version>1.0-SNAPSHOT</version>
  <name>{display}</name>

  <properties>
    <maven.compiler.source>17</maven.compiler.source>
    <maven.compiler.target>17</maven.compiler.target>
    <project.build.sourceEncoding>UTF-8</project.build.sourceEncoding>
  </properties>

  <build>
    <plugins>
      <plugin>
        <groupId>org.codehaus.mojo</groupId>
        <artifactId>exec-maven-plugin</artifactId>
        <version>3.1.0</version>
        <configuration>
          <mainClass>Main</mainClass>
        </configuration>
      </plugin>
    </plugins>
  </build>
</project>
"#,
        display = html_escape(name)
    )
}

fn java_main(name: &str) -> String {
    format!(
        "public class Main {{\n    public static void main(String[] args) {{\n        System.out.println({});\n    }}\n}}\n",
        quoted(&format!("Hello from {name}!"))
    )
}

fn delphi_program(program: &str, name: &str) -> String {
    let greeting = format!("Hello from {name}!").replace('\'', "''");
    format!(
        "program {program};\n\n{{$APPTYPE CONSOLE}}\n\nuses\n  System.SysUtils;\n\nbegin\n  Writeln('{greeting}');\nend.\n"
    )
}

fn web_index(name: &str) -> String {
    let title = html_escape(name);
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="UTF-8">
  <meta name="viewport" content="width=device-width, initial-scale=1.0">
  <title>{title}</title>
  <style>
    body {{ font-family: system-ui, sans-serif; margin: 2rem; }}
  </style>
</head>
<body>
  <h1>{title}</h1>
  <p>Edit index.html to get started.</p>
</body>
</html>
"#
    )
}
