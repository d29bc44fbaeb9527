//! External Collaborators - Compiler, Packager, Release Notes
//!
//! Each collaborator is a trait so builds can run against fakes. The system
//! implementations shell out and let tool output flow to the operator.

use std::path::Path;
use std::process::{Command, ExitStatus, Stdio};

use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("failed to launch {tool}: {source}")]
    Spawn {
        tool: String,
        source: std::io::Error,
    },

    #[error("{tool} exited with {status}")]
    Failed { tool: String, status: ExitStatus },

    #[error("{tool} did not produce {path}")]
    MissingOutput { tool: String, path: String },
}

/// Produces the package binary for one architecture
pub trait Compiler {
    /// Fetch dependencies once before any architecture is built
    fn fetch(&self, _source: &Path) -> Result<(), ToolError> {
        Ok(())
    }

    fn compile(&self, arch: &str, output: &Path, source: &Path) -> Result<(), ToolError>;
}

/// Seals a staging tree into a package file
pub trait Packager {
    fn package(&self, staging: &Path, destination: &Path) -> Result<(), ToolError>;
}

/// Best-effort changelog source
pub trait ReleaseNotes {
    fn collect(&self, source: &Path) -> Result<String, ToolError>;
}

/// The collaborators one build uses
pub struct Toolchain {
    pub compiler: Box<dyn Compiler>,
    pub packager: Box<dyn Packager>,
    pub release_notes: Box<dyn ReleaseNotes>,
}

impl Toolchain {
    /// `go`, `dpkg-deb` and `git` from PATH
    pub fn system() -> Self {
        Self::with_programs("go", "dpkg-deb", "git")
    }

    pub fn with_programs(compiler: &str, packager: &str, git: &str) -> Self {
        Self {
            compiler: Box::new(GoCompiler::new(compiler)),
            packager: Box::new(DpkgDeb::new(packager)),
            release_notes: Box::new(GitLog::new(git)),
        }
    }
}

impl Default for Toolchain {
    fn default() -> Self {
        Self::system()
    }
}

fn run(tool: &str, cmd: &mut Command) -> Result<(), ToolError> {
    debug!("Running {:?}", cmd);
    let status = cmd.status().map_err(|source| ToolError::Spawn {
        tool: tool.to_string(),
        source,
    })?;
    if !status.success() {
        return Err(ToolError::Failed {
            tool: tool.to_string(),
            status,
        });
    }
    Ok(())
}

/// `go build` with the target architecture passed to the child only
#[derive(Debug, Clone)]
pub struct GoCompiler {
    program: String,
    arch_var: String,
}

impl GoCompiler {
    pub fn new(program: &str) -> Self {
        Self {
            program: program.to_string(),
            arch_var: "GOARCH".to_string(),
        }
    }
}

impl Compiler for GoCompiler {
    fn fetch(&self, source: &Path) -> Result<(), ToolError> {
        if !source.join("go.mod").exists() {
            return Ok(());
        }
        run(
            &self.program,
            Command::new(&self.program)
                .args(["mod", "download"])
                .current_dir(source),
        )
    }

    fn compile(&self, arch: &str, output: &Path, source: &Path) -> Result<(), ToolError> {
        run(
            &self.program,
            Command::new(&self.program)
                .arg("build")
                .arg("-o")
                .arg(output)
                .arg(".")
                .current_dir(source)
                .env(&self.arch_var, arch),
        )
    }
}

/// `dpkg-deb --build <staging> <destination>`
#[derive(Debug, Clone)]
pub struct DpkgDeb {
    program: String,
}

impl DpkgDeb {
    pub fn new(program: &str) -> Self {
        Self {
            program: program.to_string(),
        }
    }
}

impl Packager for DpkgDeb {
    fn package(&self, staging: &Path, destination: &Path) -> Result<(), ToolError> {
        run(
            &self.program,
            Command::new(&self.program)
                .arg("--build")
                .arg(staging)
                .arg(destination),
        )
    }
}

/// `git log` of the project directory
#[derive(Debug, Clone)]
pub struct GitLog {
    program: String,
}

impl GitLog {
    pub fn new(program: &str) -> Self {
        Self {
            program: program.to_string(),
        }
    }
}

impl ReleaseNotes for GitLog {
    fn collect(&self, source: &Path) -> Result<String, ToolError> {
        let mut cmd = Command::new(&self.program);
        cmd.arg("-C").arg(source).arg("log").stderr(Stdio::null());
        debug!("Running {:?}", cmd);
        let output = cmd.output().map_err(|source| ToolError::Spawn {
            tool: self.program.clone(),
            source,
        })?;
        if !output.status.success() {
            return Err(ToolError::Failed {
                tool: self.program.clone(),
                status: output.status,
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}
