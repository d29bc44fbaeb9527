//! Artifact Assembler - Control Files, Scripts, Service Unit
//!
//! Every body here is rendered from a fully resolved descriptor.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::descriptor::Descriptor;
use crate::template::{render, TemplateError};

/// Control directory inside the staging tree
pub const CONTROL_DIR: &str = "DEBIAN";

macro_rules! service_config_file {
    () => {
        "service.conf"
    };
}

/// Service environment file inside the configuration directory
pub const SERVICE_CONFIG_FILE: &str = service_config_file!();
pub const SHEBANG: &str = "#!/bin/bash";

const STOP_SERVICE: &str =
    "service {{.Group}}-{{.Name}} stop || echo 'No installed {{.Group}} {{.Name}} instance running'\n";

const START_SERVICE: &str =
    "service {{.Group}}-{{.Name}} start || echo 'No {{.Group}} {{.Name}} instance'\n";

const BACKUP_CONFIG: &str = r#"# backup old configuration
BACKUP_DIR="/tmp/backups/{{.Group}}/{{.Name}}"
if [ -d "{{.TargetConfDir}}" ]; then
    rm -rf "$BACKUP_DIR"
    mkdir -p "$BACKUP_DIR"
    cp -r "{{.TargetConfDir}}"/* "$BACKUP_DIR"/
fi
"#;

const RESTORE_CONFIG: &str = r#"# restore old configuration
BACKUP_DIR="/tmp/backups/{{.Group}}/{{.Name}}"
if [ -d "$BACKUP_DIR" ]; then
    cp -r "$BACKUP_DIR"/* "{{.TargetConfDir}}"/ && rm -rf "$BACKUP_DIR"
fi
"#;

const SERVICE_UNIT: &str = concat!(
    r#"# {{.Group}} {{.Name}}

description         "{{.Description}}"

start on runlevel [2345]
stop on runlevel [!2345]
{{if .Service.Restart}}
respawn
respawn limit 99999999 {{.Service.RestartDelay}}
{{end}}

script
  . {{.TargetConfDir}}/"#,
    service_config_file!(),
    r#"
  exec {{.TargetBinDir}}/{{.BinName}} $RUN_OPTS 2>&1 | logger -t '{{.Group}}-{{.Name}}'
end script
"#
);

/// Debian architecture token; bare numbers such as `386` become `i386`
pub fn normalize_arch(arch: &str) -> String {
    if arch.parse::<u64>().is_ok() {
        format!("i{}", arch)
    } else {
        arch.to_string()
    }
}

fn render_with(d: &Descriptor, template: &str) -> Result<String, TemplateError> {
    render(template, &d.context())
}

/// DEBIAN/control for one architecture
pub fn control(d: &Descriptor, arch: &str) -> Result<String, TemplateError> {
    let mut t = String::from("Package: {{.Group}}-{{.Name}}\nVersion: {{.Version}}\n");
    t += &format!("Architecture: {}\n", normalize_arch(arch));
    t += "Maintainer: {{.Author}}\n";
    if !d.depends.is_empty() {
        t += &format!("Depends: {}\n", d.depends.join(", "));
    }
    t += "Description: {{.Description}}\n";
    render_with(d, &t)
}

/// Hook text: the file's contents when `source` names a file under `base`, else `source` itself.
///
/// A hook whose inline text happens to be an existing path is read as a
/// file. Only a missing file falls back to inline text; a file that exists
/// but cannot be read is an error. Contents need not be UTF-8.
pub fn resolve_hook(source: &str, base: &Path) -> io::Result<String> {
    if source.is_empty() {
        return Ok(String::new());
    }
    let path = base.join(source);
    if !path.is_file() {
        return Ok(source.to_string());
    }
    let bytes = fs::read(&path)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

fn stop_and_backup(d: &Descriptor) -> Result<Vec<String>, TemplateError> {
    if d.service.is_none() {
        return Ok(vec![]);
    }
    Ok(vec![render_with(d, STOP_SERVICE)?, render_with(d, BACKUP_CONFIG)?])
}

/// Fragments of the pre-install script, in order. `hook` is the resolved hook text.
pub fn pre_install(d: &Descriptor, hook: &str) -> Result<Vec<String>, TemplateError> {
    let mut fragments = stop_and_backup(d)?;
    fragments.push(render_with(d, hook)?);
    Ok(fragments)
}

/// Fragments of the post-install script, in order
pub fn post_install(d: &Descriptor, hook: &str) -> Result<Vec<String>, TemplateError> {
    let mut fragments = vec![];
    if let Some(service) = &d.service {
        if service.auto_start {
            fragments.push(render_with(d, START_SERVICE)?);
        }
        fragments.push(render_with(d, RESTORE_CONFIG)?);
    }
    fragments.push(render_with(d, hook)?);
    Ok(fragments)
}

/// Fragments of the pre-remove script; removal stops and backs up like install does
pub fn pre_remove(d: &Descriptor, hook: &str) -> Result<Vec<String>, TemplateError> {
    let mut fragments = stop_and_backup(d)?;
    fragments.push(render_with(d, hook)?);
    Ok(fragments)
}

/// Init-system job description. Requires a service section.
pub fn service_unit(d: &Descriptor) -> Result<String, TemplateError> {
    render_with(d, SERVICE_UNIT)
}

/// Shell file sourced by the service unit; exports follow declaration order
pub fn service_env(d: &Descriptor) -> String {
    let mut body = format!("{}\n", SHEBANG);
    let Some(service) = &d.service else {
        return body;
    };
    for (key, value) in &service.env {
        body += &format!("export {}=\"{}\"\n", key, value);
    }
    body += &format!("RUN_OPTS=\"{}\"\n", service.run_opts.joined());
    body
}

pub fn service_file_name(d: &Descriptor) -> String {
    format!("{}.conf", d.unit_name())
}

/// Lifecycle script built from ordered fragments
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Script {
    fragments: Vec<String>,
}

impl Script {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, fragment: impl Into<String>) {
        self.fragments.push(fragment.into());
    }

    pub fn extend(&mut self, fragments: impl IntoIterator<Item = String>) {
        self.fragments.extend(fragments);
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.iter().all(String::is_empty)
    }

    /// Script body, or `None` when no fragment has content
    pub fn render(&self) -> Option<String> {
        if self.is_empty() {
            return None;
        }
        let mut body = String::from(SHEBANG);
        for fragment in self.fragments.iter().filter(|f| !f.is_empty()) {
            body.push('\n');
            body.push_str(fragment);
        }
        Some(body)
    }
}

/// Maps resolved install paths into a staging root
#[derive(Debug, Clone, Copy)]
pub struct Layout<'a> {
    root: &'a Path,
    descriptor: &'a Descriptor,
}

impl<'a> Layout<'a> {
    pub fn new(root: &'a Path, descriptor: &'a Descriptor) -> Self {
        Self { root, descriptor }
    }

    /// Absolute install path re-rooted under the staging directory
    pub fn staged(&self, install_path: &str) -> PathBuf {
        self.root.join(install_path.trim_start_matches('/'))
    }

    pub fn binary(&self) -> PathBuf {
        self.staged(&self.descriptor.target_bin_dir)
            .join(&self.descriptor.bin_name)
    }

    pub fn resources(&self) -> PathBuf {
        self.staged(&self.descriptor.target_resources_dir)
    }

    pub fn service_unit(&self) -> PathBuf {
        self.staged(&self.descriptor.target_service_dir)
            .join(service_file_name(self.descriptor))
    }

    pub fn service_env(&self) -> PathBuf {
        self.staged(&self.descriptor.target_conf_dir)
            .join(SERVICE_CONFIG_FILE)
    }

    pub fn control_dir(&self) -> PathBuf {
        self.root.join(CONTROL_DIR)
    }
}
