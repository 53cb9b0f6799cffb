//! Host platform capabilities.
//!
//! All OS-specific command construction lives here. Components ask the
//! [`HostPlatform`] for the right program names, discovery commands and desktop
//! integration commands instead of branching on the OS themselves. The variant is
//! a plain value so Windows behavior can be exercised from any host in tests.

use crate::model::ToolchainFamily;
use crate::runner::CommandSpec;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};

/// Registry key holding one sub-key per installed RAD Studio / Delphi release.
pub const DELPHI_REGISTRY_KEY: &str = r"HKLM\SOFTWARE\WOW6432Node\Embarcadero\BDS";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HostPlatform {
    Posix,
    Windows,
}

impl HostPlatform {
    /// The platform this binary was compiled for.
    #[must_use]
    pub const fn current() -> Self {
        if cfg!(windows) {
            Self::Windows
        } else {
            Self::Posix
        }
    }

    #[must_use]
    pub const fn is_windows(self) -> bool {
        matches!(self, Self::Windows)
    }

    /// Paths compare case-insensitively and `/` is an alias for `\`.
    #[must_use]
    pub const fn case_insensitive_paths(self) -> bool {
        self.is_windows()
    }

    /// Commands whose stdout lists candidate binaries for `family`, one per line.
    ///
    /// No single command is reliable for Python, so several strategies are
    /// returned and the prober unions their results.
    #[must_use]
    pub fn discovery_commands(self, family: ToolchainFamily) -> Vec<CommandSpec> {
        match (self, family) {
            (Self::Posix, ToolchainFamily::Python) => vec![
                CommandSpec::new("which").args(["-a", "python3"]),
                CommandSpec::new("which").args(["-a", "python"]),
            ],
            (Self::Windows, ToolchainFamily::Python) => vec![
                CommandSpec::new("where").arg("python"),
                CommandSpec::new("where").arg("python3"),
                CommandSpec::new("py").arg("-0p"),
            ],
            (Self::Posix, ToolchainFamily::Java) => {
                vec![CommandSpec::new("which").args(["-a", "javac"])]
            }
            (Self::Windows, ToolchainFamily::Java) => vec![CommandSpec::new("where").arg("javac")],
            (Self::Posix, ToolchainFamily::Nodejs) => {
                vec![CommandSpec::new("which").args(["-a", "node"])]
            }
            (Self::Windows, ToolchainFamily::Nodejs) => vec![CommandSpec::new("where").arg("node")],
            (Self::Posix, ToolchainFamily::Delphi) => Vec::new(),
            (Self::Windows, ToolchainFamily::Delphi) => vec![CommandSpec::new("reg").args([
                "query",
                DELPHI_REGISTRY_KEY,
                "/s",
                "/v",
                "RootDir",
            ])],
        }
    }

    /// Interpreter used when no Python toolchain is selected.
    #[must_use]
    pub const fn default_python(self) -> &'static str {
        match self {
            Self::Posix => "python3",
            Self::Windows => "python",
        }
    }

    /// Node.js binary used when none is selected.
    #[must_use]
    pub const fn default_node(self) -> &'static str {
        match self {
            Self::Posix => "node",
            Self::Windows => "node.exe",
        }
    }

    #[must_use]
    pub const fn npm(self) -> &'static str {
        match self {
            Self::Posix => "npm",
            Self::Windows => "npm.cmd",
        }
    }

    #[must_use]
    pub const fn npx(self) -> &'static str {
        match self {
            Self::Posix => "npx",
            Self::Windows => "npx.cmd",
        }
    }

    #[must_use]
    pub const fn maven(self) -> &'static str {
        match self {
            Self::Posix => "mvn",
            Self::Windows => "mvn.cmd",
        }
    }

    /// Interpreter inside a project's `venv` virtual environment.
    #[must_use]
    pub fn venv_python(self, project_dir: &Path) -> PathBuf {
        match self {
            Self::Posix => project_dir.join("venv").join("bin").join("python"),
            Self::Windows => project_dir
                .join("venv")
                .join("Scripts")
                .join("python.exe"),
        }
    }

    /// Batch script that activates the project's virtual environment.
    #[must_use]
    pub fn venv_activate_script(self, project_dir: &Path) -> PathBuf {
        match self {
            Self::Posix => project_dir.join("venv").join("bin").join("activate"),
            Self::Windows => project_dir
                .join("venv")
                .join("Scripts")
                .join("activate.bat"),
        }
    }

    /// Runtime paired with a discovered compiler, found by swapping the file name.
    #[must_use]
    pub fn java_runtime_from_compiler(self, javac: &Path) -> PathBuf {
        let runtime = match javac.extension().and_then(OsStr::to_str) {
            Some(ext) if ext.eq_ignore_ascii_case("exe") => "java.exe",
            _ => "java",
        };
        javac.with_file_name(runtime)
    }

    /// Open a file or folder with the desktop's default handler.
    #[must_use]
    pub fn open_command(self, target: &Path) -> CommandSpec {
        match self {
            Self::Windows => CommandSpec::new("cmd")
                .args(["/C", "start", ""])
                .arg_path(target),
            Self::Posix if cfg!(target_os = "macos") => {
                CommandSpec::new("open").arg_path(target)
            }
            Self::Posix => CommandSpec::new("xdg-open").arg_path(target),
        }
    }

    /// Only Windows can hand a script to a new visible console window.
    #[must_use]
    pub const fn supports_external_terminal(self) -> bool {
        self.is_windows()
    }

    /// Start `script` in a new console window that stays open afterwards.
    ///
    /// The script is a single command line evaluated by `cmd`, which is what lets
    /// the virtual environment be activated before the interpreter runs.
    ///
    /// `start` takes its first quoted argument as the window title, so the title
    /// is always quoted. The rest is cmd syntax and is handed over verbatim; the
    /// outer quotes around `script` keep its `&&` away from the first `cmd`.
    #[must_use]
    pub fn external_terminal_command(self, title: &str, script: &str, cwd: &Path) -> CommandSpec {
        match self {
            Self::Windows => CommandSpec::new("cmd")
                .args(["/C", "start"])
                .verbatim(format!("\"{}\" cmd /K \"{script}\"", title.replace('"', "")))
                .cwd(cwd),
            Self::Posix => CommandSpec::new("sh").args(["-c", script]).cwd(cwd),
        }
    }

    /// Script that activates `venv` and runs `entry` with it.
    #[must_use]
    pub fn activate_and_run_script(self, project_dir: &Path, entry: &Path) -> String {
        let activate = self.venv_activate_script(project_dir);
        match self {
            Self::Windows => format!(
                "call \"{}\" && python \"{}\"",
                activate.display(),
                entry.display()
            ),
            Self::Posix => format!(
                ". '{}' && python '{}'",
                activate.display(),
                entry.display()
            ),
        }
    }

    /// Native folder pickers to try in order. The chosen path is printed on stdout;
    /// cancellation shows up as a non-zero exit or empty output.
    #[must_use]
    pub fn directory_pickers(self) -> Vec<CommandSpec> {
        match self {
            Self::Windows => vec![CommandSpec::new("powershell").args([
                "-NoProfile",
                "-Command",
                "Add-Type -AssemblyName System.Windows.Forms; \
                 $d = New-Object System.Windows.Forms.FolderBrowserDialog; \
                 if ($d.ShowDialog() -eq 'OK') { $d.SelectedPath }",
            ])],
            Self::Posix if cfg!(target_os = "macos") => vec![CommandSpec::new("osascript")
                .args(["-e", "POSIX path of (choose folder)"])],
            Self::Posix => vec![
                CommandSpec::new("zenity").args(["--file-selection", "--directory"]),
                CommandSpec::new("kdialog").args(["--getexistingdirectory"]),
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn windows_python_discovery_includes_launcher_listing() {
        let cmds = HostPlatform::Windows.discovery_commands(ToolchainFamily::Python);
        let programs: Vec<_> = cmds.iter().map(|c| c.program.clone()).collect();
        assert_eq!(programs, vec!["where", "where", "py"]);
    }

    #[test]
    fn delphi_discovery_is_windows_only() {
        assert!(HostPlatform::Posix
            .discovery_commands(ToolchainFamily::Delphi)
            .is_empty());
        assert_eq!(
            HostPlatform::Windows
                .discovery_commands(ToolchainFamily::Delphi)
                .len(),
            1
        );
    }

    #[test]
    fn venv_layout_differs_per_platform() {
        let dir = Path::new("/p");
        assert_eq!(
            HostPlatform::Posix.venv_python(dir),
            PathBuf::from("/p/venv/bin/python")
        );
        assert!(HostPlatform::Windows
            .venv_python(dir)
            .ends_with("Scripts/python.exe"));
    }

    #[test]
    fn java_runtime_is_found_next_to_compiler() {
        let p = HostPlatform::Posix;
        assert_eq!(
            p.java_runtime_from_compiler(Path::new("/usr/lib/jvm/bin/javac")),
            PathBuf::from("/usr/lib/jvm/bin/java")
        );
        assert_eq!(
            p.java_runtime_from_compiler(Path::new("/jdk/bin/javac.exe")),
            PathBuf::from("/jdk/bin/java.exe")
        );
    }

    #[test]
    fn external_terminal_quotes_the_title() {
        let spec = HostPlatform::Windows.external_terminal_command(
            "say \"hi\"",
            "call \"a.bat\" && python \"m.py\"",
            Path::new(r"C:\p"),
        );
        assert_eq!(spec.program, "cmd");
        assert_eq!(spec.args, vec!["/C", "start"]);
        assert_eq!(
            spec.verbatim.as_deref(),
            Some(r#""say hi" cmd /K "call "a.bat" && python "m.py"""#)
        );
    }

    #[test]
    fn build_tools_use_cmd_shims_on_windows() {
        assert_eq!(HostPlatform::Windows.npm(), "npm.cmd");
        assert_eq!(HostPlatform::Windows.maven(), "mvn.cmd");
        assert_eq!(HostPlatform::Posix.npx(), "npx");
    }
}
