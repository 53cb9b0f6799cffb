//! Toolchain Prober.
//!
//! Each family runs its discovery commands concurrently, unions the candidate
//! paths, then verifies candidates one at a time by asking for a version. A
//! candidate that cannot report a version is logged and dropped: discovery is
//! best-effort and partial results are normal.

use crate::engine::Session;
use crate::model::{Toolchain, ToolchainFamily, ToolchainStatus};
use crate::platform::HostPlatform;
use crate::runner::{self, CommandSpec, ExecOptions};
use crate::ExecOutcome;
use regex::Regex;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Probe every family concurrently and return one complete snapshot.
pub async fn detect_all(session: &Session, cancel: Option<&CancellationToken>) -> ToolchainStatus {
    let (python, java, nodejs, delphi) = tokio::join!(
        detect_family(session, ToolchainFamily::Python, cancel),
        detect_family(session, ToolchainFamily::Java, cancel),
        detect_family(session, ToolchainFamily::Nodejs, cancel),
        detect_family(session, ToolchainFamily::Delphi, cancel),
    );
    let status = ToolchainStatus {
        python,
        java,
        nodejs,
        delphi,
    };
    tracing::info!(found = status.total(), "toolchain probe finished");
    status
}

pub async fn detect_family(
    session: &Session,
    family: ToolchainFamily,
    cancel: Option<&CancellationToken>,
) -> Vec<Toolchain> {
    let platform = session.platform;
    let options = ExecOptions::default()
        .with_timeout(session.settings.exec.probe_timeout())
        .with_cancel(cancel.cloned());

    let listings = discover(platform.discovery_commands(family), &options).await;

    if family == ToolchainFamily::Delphi {
        return listings
            .iter()
            .flat_map(|listing| parse_delphi_registry(listing))
            .filter_map(|install| {
                let compiler = install.compiler_path();
                if compiler.is_file() {
                    Some(Toolchain {
                        name: delphi_product_name(&install.bds_version),
                        version: install.bds_version,
                        path: compiler,
                    })
                } else {
                    tracing::debug!(path = %compiler.display(), "registered Delphi compiler is missing");
                    None
                }
            })
            .collect();
    }

    let candidates: BTreeSet<PathBuf> = listings
        .iter()
        .flat_map(|listing| parse_candidates(listing, platform))
        .collect();

    let mut found = Vec::new();
    for candidate in candidates {
        match verify(&candidate, family, platform, &options).await {
            Some(toolchain) => found.push(toolchain),
            None => {
                tracing::warn!(%family, candidate = %candidate.display(), "dropping toolchain candidate without a version");
            }
        }
    }
    found
}

/// Run discovery commands in parallel and return the stdout of each that ran.
async fn discover(commands: Vec<CommandSpec>, options: &ExecOptions) -> Vec<String> {
    let mut tasks = JoinSet::new();
    for spec in commands {
        let options = options.clone();
        tasks.spawn(async move {
            let result = runner::run(&spec, &options).await;
            (spec, result)
        });
    }

    let mut listings = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((spec, result)) => match result.outcome {
                // `which`/`where` exit non-zero when nothing matched; any
                // output they did print is still usable.
                ExecOutcome::Ok | ExecOutcome::Failed { .. } => listings.push(result.stdout),
                other => {
                    tracing::debug!(command = %spec, outcome = ?other, "discovery command did not run");
                }
            },
            Err(err) => tracing::warn!(error = %err, "discovery task failed"),
        }
    }
    listings
}

async fn verify(
    candidate: &Path,
    family: ToolchainFamily,
    platform: HostPlatform,
    options: &ExecOptions,
) -> Option<Toolchain> {
    let (binary, flag) = match family {
        ToolchainFamily::Python => (candidate.to_path_buf(), "--version"),
        ToolchainFamily::Java => (platform.java_runtime_from_compiler(candidate), "-version"),
        ToolchainFamily::Nodejs => (candidate.to_path_buf(), "--version"),
        ToolchainFamily::Delphi => return None,
    };
    let result = runner::run(&CommandSpec::from_path(&binary).arg(flag), options).await;
    if !result.success() {
        tracing::debug!(binary = %binary.display(), outcome = ?result.outcome, "version query failed");
        return None;
    }
    // Older interpreters and every JVM print the version on stderr.
    let combined = format!("{}\n{}", result.stdout, result.stderr);
    let version = parse_version(family, &combined)?;
    let name = match family {
        ToolchainFamily::Python => format!("Python {version}"),
        ToolchainFamily::Java => format!("Java {version}"),
        ToolchainFamily::Nodejs => format!("Node.js {version}"),
        ToolchainFamily::Delphi => delphi_product_name(&version),
    };
    Some(Toolchain {
        path: binary,
        version,
        name,
    })
}

/// Candidate binary paths from one discovery listing.
///
/// Plain lines are paths. Lines from the Windows `py -0p` launcher look like
/// ` -V:3.12 *        C:\Python312\python.exe`; the tag and default marker are
/// stripped.
#[must_use]
pub fn parse_candidates(listing: &str, platform: HostPlatform) -> Vec<PathBuf> {
    listing
        .lines()
        .filter_map(|line| {
            let line = line.trim();
            if line.is_empty() {
                return None;
            }
            let path = if line.starts_with('-') {
                let (_, rest) = line.split_once(char::is_whitespace)?;
                rest.trim_start().trim_start_matches('*').trim()
            } else {
                line
            };
            if path.is_empty() {
                return None;
            }
            // App-execution aliases that open the Store instead of running Python.
            if platform.is_windows() && path.to_ascii_lowercase().contains("\\windowsapps\\") {
                return None;
            }
            Some(PathBuf::from(path))
        })
        .collect()
}

fn version_regex(family: ToolchainFamily) -> Option<&'static Regex> {
    static PYTHON: OnceLock<Option<Regex>> = OnceLock::new();
    static JAVA: OnceLock<Option<Regex>> = OnceLock::new();
    static NODE: OnceLock<Option<Regex>> = OnceLock::new();
    let (cell, pattern) = match family {
        ToolchainFamily::Python => (&PYTHON, r"Python (\d+\.\d+(?:\.\d+)?)"),
        ToolchainFamily::Java => (&JAVA, r#"version "([^"]+)""#),
        ToolchainFamily::Nodejs => (&NODE, r"v?(\d+\.\d+\.\d+)"),
        ToolchainFamily::Delphi => return None,
    };
    cell.get_or_init(|| Regex::new(pattern).ok()).as_ref()
}

/// Extract a version string from a tool's version output.
#[must_use]
pub fn parse_version(family: ToolchainFamily, output: &str) -> Option<String> {
    let captures = version_regex(family)?.captures(output)?;
    captures.get(1).map(|m| m.as_str().to_string())
}

/// One RAD Studio installation found in the registry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DelphiInstall {
    pub bds_version: String,
    pub root_dir: String,
}

impl DelphiInstall {
    #[must_use]
    pub fn compiler_path(&self) -> PathBuf {
        let root = self.root_dir.trim_end_matches(['\\', '/']);
        PathBuf::from(format!(r"{root}\bin\dcc32.exe"))
    }
}

/// Parse `reg query <BDS key> /s /v RootDir` output.
#[must_use]
pub fn parse_delphi_registry(listing: &str) -> Vec<DelphiInstall> {
    let mut installs = Vec::new();
    let mut current_version: Option<String> = None;
    for line in listing.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with("HKEY_") {
            current_version = trimmed
                .rsplit('\\')
                .next()
                .filter(|segment| segment.chars().next().is_some_and(|c| c.is_ascii_digit()))
                .map(str::to_string);
            continue;
        }
        let Some(version) = current_version.as_ref() else {
            continue;
        };
        let mut fields = trimmed.splitn(2, "REG_SZ");
        let (Some(name), Some(value)) = (fields.next(), fields.next()) else {
            continue;
        };
        if name.trim().eq_ignore_ascii_case("RootDir") && !value.trim().is_empty() {
            installs.push(DelphiInstall {
                bds_version: version.clone(),
                root_dir: value.trim().to_string(),
            });
        }
    }
    installs
}

/// Marketing name for a BDS registry version.
#[must_use]
pub fn delphi_product_name(bds_version: &str) -> String {
    let product = match bds_version {
        "17.0" => "Delphi 10 Seattle",
        "18.0" => "Delphi 10.1 Berlin",
        "19.0" => "Delphi 10.2 Tokyo",
        "20.0" => "Delphi 10.3 Rio",
        "21.0" => "Delphi 10.4 Sydney",
        "22.0" => "Delphi 11 Alexandria",
        "23.0" => "Delphi 12 Athens",
        other => return format!("Delphi (BDS {other})"),
    };
    product.to_string()
}
