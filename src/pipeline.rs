//! Build Pipeline - Single Entry Point
//!
//! resolve defaults -> self-render -> stage -> assemble -> compile + package per arch.
//! Nothing is staged until the descriptor has fully resolved.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::artifacts::{self, Layout, Script};
use crate::defaults::{resolve_defaults, ConfigError, HostFacts};
use crate::descriptor::{Descriptor, PROJECT_PACKAGE_FILE};
use crate::hashing::sha256_file;
use crate::resolve::resolve_templates;
use crate::staging::{copy_tree, StagingDir};
use crate::template::TemplateError;
use crate::toolchain::{ToolError, Toolchain};

const SCRIPT_MODE: u32 = 0o755;
const DATA_MODE: u32 = 0o644;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Invalid descriptor: {0}")]
    Config(#[from] ConfigError),

    #[error("Template error: {0}")]
    Template(#[from] TemplateError),

    #[error("Build tool error: {0}")]
    Tool(#[from] ToolError),

    #[error("I/O error at {path}: {source}")]
    Io { path: String, source: io::Error },

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

fn io_err(path: &Path) -> impl FnOnce(io::Error) -> PipelineError + '_ {
    move |source| PipelineError::Io {
        path: path.display().to_string(),
        source,
    }
}

/// One package file produced by `Project::make`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuiltPackage {
    pub arch: String,
    pub path: PathBuf,
    pub sha256: String,
}

/// In-memory build session for one project
///
/// `descriptor` stays as loaded; each `make` resolves a fresh copy into
/// `resolved` and assembles its scripts from scratch.
#[derive(Debug, Clone)]
pub struct Project {
    pub descriptor: Descriptor,
    pub resolved: Option<Descriptor>,
    pub release_notes: Option<String>,
    /// Project source directory; hooks and resources resolve relative to it
    pub work_dir: PathBuf,
}

/// Maintainer scripts for one build, in control-file order
struct Scripts {
    pre_install: Script,
    post_install: Script,
    pre_remove: Script,
}

impl Project {
    pub fn new(descriptor: Descriptor, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            descriptor,
            resolved: None,
            release_notes: None,
            work_dir: work_dir.into(),
        }
    }

    /// Read `package.json` from `dir`
    pub fn open(dir: &Path) -> Result<Self, PipelineError> {
        let file = dir.join(PROJECT_PACKAGE_FILE);
        let content = fs::read_to_string(&file).map_err(io_err(&file))?;
        let descriptor = Descriptor::from_json(&content)?;
        Ok(Self::new(descriptor, dir))
    }

    /// Build one package per declared architecture into `output_dir`
    pub fn make(
        &mut self,
        output_dir: &Path,
        tools: &Toolchain,
    ) -> Result<Vec<BuiltPackage>, PipelineError> {
        self.make_with(output_dir, tools, &HostFacts::detect())
    }

    pub fn make_with(
        &mut self,
        output_dir: &Path,
        tools: &Toolchain,
        host: &HostFacts,
    ) -> Result<Vec<BuiltPackage>, PipelineError> {
        self.resolved = None;
        self.release_notes = None;

        let defaulted = resolve_defaults(self.descriptor.clone(), host)?;
        let d = resolve_templates(defaulted)?;
        info!("Packaging {} {}", d.unit_name(), d.version);
        let scripts = self.assemble_scripts(&d)?;

        let staging = StagingDir::create().map_err(io_err(Path::new("staging")))?;
        let layout = Layout::new(staging.path(), &d);

        let bin_file = layout.binary();
        if let Some(bin_dir) = bin_file.parent() {
            fs::create_dir_all(bin_dir).map_err(io_err(bin_dir))?;
        }

        self.stage_resources(&d, &layout)?;
        if d.service.is_some() {
            stage_service(&d, &staging, &layout)?;
        }
        self.collect_release_notes(tools);
        self.stage_control_files(&scripts, &staging, &layout)?;

        fs::create_dir_all(output_dir).map_err(io_err(output_dir))?;
        tools.compiler.fetch(&self.work_dir)?;

        let mut built = vec![];
        for arch in &d.architectures {
            let arch = arch.to_lowercase();
            info!("Building for {}", arch);

            let control = artifacts::control(&d, &arch)?;
            let control_file = layout.control_dir().join("control");
            staging
                .write(&control_file, &control, DATA_MODE)
                .map_err(io_err(&control_file))?;

            tools.compiler.compile(&arch, &bin_file, &self.work_dir)?;
            if !bin_file.is_file() {
                return Err(ToolError::MissingOutput {
                    tool: "compiler".to_string(),
                    path: bin_file.display().to_string(),
                }
                .into());
            }

            let package = output_dir.join(format!(
                "{}-{}_{}.deb",
                d.bin_name, d.version, arch
            ));
            tools.packager.package(staging.path(), &package)?;
            if !package.is_file() {
                return Err(ToolError::MissingOutput {
                    tool: "packager".to_string(),
                    path: package.display().to_string(),
                }
                .into());
            }

            let sha256 = sha256_file(&package).map_err(io_err(&package))?;
            info!("Built {} (sha256 {})", package.display(), sha256);
            built.push(BuiltPackage {
                arch,
                path: package,
                sha256,
            });
        }

        self.resolved = Some(d);
        Ok(built)
    }

    fn hook(&self, source: &str) -> Result<String, PipelineError> {
        let path = self.work_dir.join(source);
        artifacts::resolve_hook(source, &self.work_dir).map_err(io_err(&path))
    }

    fn assemble_scripts(&self, d: &Descriptor) -> Result<Scripts, PipelineError> {
        let mut scripts = Scripts {
            pre_install: Script::new(),
            post_install: Script::new(),
            pre_remove: Script::new(),
        };
        scripts
            .pre_install
            .extend(artifacts::pre_install(d, &self.hook(&d.pre_inst)?)?);
        scripts
            .post_install
            .extend(artifacts::post_install(d, &self.hook(&d.post_inst)?)?);
        scripts
            .pre_remove
            .extend(artifacts::pre_remove(d, &self.hook(&d.pre_rm)?)?);
        Ok(scripts)
    }

    fn stage_resources(&self, d: &Descriptor, layout: &Layout) -> Result<(), PipelineError> {
        let source = self.work_dir.join(&d.resources);
        if !source.is_dir() {
            debug!("No resources at {}", source.display());
            return Ok(());
        }
        let target = layout.resources();
        let report = copy_tree(&source, &target).map_err(io_err(&source))?;
        if report.skipped > 0 {
            warn!(
                "Copied {} resource files, skipped {}",
                report.files, report.skipped
            );
        } else {
            debug!("Copied {} resource files", report.files);
        }
        Ok(())
    }

    fn collect_release_notes(&mut self, tools: &Toolchain) {
        match tools.release_notes.collect(&self.work_dir) {
            Ok(notes) if !notes.is_empty() => self.release_notes = Some(notes),
            Ok(_) => {}
            Err(e) => warn!("Skipping release notes: {}", e),
        }
    }

    fn stage_control_files(
        &self,
        scripts: &Scripts,
        staging: &StagingDir,
        layout: &Layout,
    ) -> Result<(), PipelineError> {
        let control_dir = layout.control_dir();
        fs::create_dir_all(&control_dir).map_err(io_err(&control_dir))?;

        let named = [
            ("preinst", &scripts.pre_install),
            ("postinst", &scripts.post_install),
            ("prerm", &scripts.pre_remove),
        ];
        for (name, script) in named {
            if let Some(body) = script.render() {
                let path = control_dir.join(name);
                staging
                    .write(&path, &body, SCRIPT_MODE)
                    .map_err(io_err(&path))?;
            }
        }

        if let Some(notes) = &self.release_notes {
            let path = control_dir.join("changelog");
            staging
                .write(&path, notes, DATA_MODE)
                .map_err(io_err(&path))?;
        }
        Ok(())
    }
}

fn stage_service(d: &Descriptor, staging: &StagingDir, layout: &Layout) -> Result<(), PipelineError> {
    let unit = artifacts::service_unit(d)?;
    let unit_file = layout.service_unit();
    staging
        .write(&unit_file, &unit, DATA_MODE)
        .map_err(io_err(&unit_file))?;

    let env = artifacts::service_env(d);
    let env_file = layout.service_env();
    staging
        .write(&env_file, &env, SCRIPT_MODE)
        .map_err(io_err(&env_file))?;
    Ok(())
}
