//! Packforge Core - Debian Packages From A package.json Descriptor
//!
//! # The Pipeline
//! 1. Defaults fill what the descriptor leaves out
//! 2. The descriptor renders its own templates, in a fixed field order
//! 3. Artifacts (control, scripts, service unit) render from the result
//! 4. One compiler + packager run per target architecture

pub mod descriptor;
pub mod defaults;
pub mod template;
pub mod resolve;
pub mod artifacts;
pub mod staging;
pub mod toolchain;
pub mod hashing;
pub mod pipeline;

pub use descriptor::{Descriptor, Service, RunOpts, PROJECT_PACKAGE_FILE};
pub use defaults::{resolve_defaults, ConfigError, HostFacts, SUPPORTED_INIT};
pub use template::{render, Template, TemplateError};
pub use resolve::{resolve_templates, Field};
pub use artifacts::{Layout, Script};
pub use toolchain::{Compiler, Packager, ReleaseNotes, ToolError, Toolchain};
pub use pipeline::{BuiltPackage, PipelineError, Project};
