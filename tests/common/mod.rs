//! Shared fakes for the build collaborators
//!
//! The fake packager snapshots the staging tree next to the package file
//! (`<package>.tree/`) because the real staging directory is gone by the
//! time a test can look at it.

use chrono::{TimeZone, Utc};
use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use packforge::staging::copy_tree;
use packforge::{Compiler, HostFacts, Packager, ReleaseNotes, ToolError, Toolchain};

#[derive(Debug, Default)]
pub struct Calls {
    pub fetched: usize,
    pub compiled: Vec<String>,
    pub staging_dirs: Vec<PathBuf>,
}

pub type Shared = Rc<RefCell<Calls>>;

pub struct FakeCompiler {
    calls: Shared,
    fail_arch: Option<String>,
}

impl Compiler for FakeCompiler {
    fn fetch(&self, _source: &Path) -> Result<(), ToolError> {
        self.calls.borrow_mut().fetched += 1;
        Ok(())
    }

    fn compile(&self, arch: &str, output: &Path, _source: &Path) -> Result<(), ToolError> {
        self.calls.borrow_mut().compiled.push(arch.to_string());
        if self.fail_arch.as_deref() == Some(arch) {
            return Err(ToolError::MissingOutput {
                tool: "fake-compiler".to_string(),
                path: output.display().to_string(),
            });
        }
        fs::write(output, format!("binary for {}", arch)).unwrap();
        Ok(())
    }
}

pub struct FakePackager {
    calls: Shared,
}

impl Packager for FakePackager {
    fn package(&self, staging: &Path, destination: &Path) -> Result<(), ToolError> {
        self.calls
            .borrow_mut()
            .staging_dirs
            .push(staging.to_path_buf());
        copy_tree(staging, &tree_of(destination)).unwrap();
        fs::write(destination, format!("package of {}", staging.display())).unwrap();
        Ok(())
    }
}

pub struct FakeNotes(pub Option<String>);

impl ReleaseNotes for FakeNotes {
    fn collect(&self, _source: &Path) -> Result<String, ToolError> {
        self.0.clone().ok_or_else(|| ToolError::MissingOutput {
            tool: "fake-git".to_string(),
            path: "log".to_string(),
        })
    }
}

pub fn fake_tools(calls: &Shared) -> Toolchain {
    tools_with(calls, None, None)
}

pub fn tools_with(calls: &Shared, fail_arch: Option<&str>, notes: Option<&str>) -> Toolchain {
    Toolchain {
        compiler: Box::new(FakeCompiler {
            calls: calls.clone(),
            fail_arch: fail_arch.map(str::to_string),
        }),
        packager: Box::new(FakePackager {
            calls: calls.clone(),
        }),
        release_notes: Box::new(FakeNotes(notes.map(str::to_string))),
    }
}

/// Staging snapshot taken by the fake packager
pub fn tree_of(package: &Path) -> PathBuf {
    let mut name = package.as_os_str().to_owned();
    name.push(".tree");
    PathBuf::from(name)
}

pub fn host() -> HostFacts {
    HostFacts {
        user: Some("tester".to_string()),
        arch: "amd64".to_string(),
        timestamp: Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap(),
    }
}
