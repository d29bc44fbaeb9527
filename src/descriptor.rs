//! Descriptor Model - package.json Contract
//!
//! Field names on disk follow the persisted `package.json` format.
//! Field names inside templates follow `Descriptor::context`.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fs;
use std::io;
use std::path::Path;

/// Conventional descriptor file name inside a project directory
pub const PROJECT_PACKAGE_FILE: &str = "package.json";

/// Full project description
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Descriptor {
    #[serde(default)]
    pub group: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends: Vec<String>,
    #[serde(default, rename = "arch", skip_serializing_if = "Vec::is_empty")]
    pub architectures: Vec<String>,
    #[serde(default, rename = "bin", skip_serializing_if = "String::is_empty")]
    pub bin_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<Service>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub resources: String,
    /// Inline script text or a path to a script file
    #[serde(default, rename = "preinst", skip_serializing_if = "String::is_empty")]
    pub pre_inst: String,
    #[serde(default, rename = "postinst", skip_serializing_if = "String::is_empty")]
    pub post_inst: String,
    #[serde(default, rename = "prerm", skip_serializing_if = "String::is_empty")]
    pub pre_rm: String,
    #[serde(default, rename = "resourcesDir", skip_serializing_if = "String::is_empty")]
    pub target_resources_dir: String,
    #[serde(default, rename = "binDir", skip_serializing_if = "String::is_empty")]
    pub target_bin_dir: String,
    #[serde(default, rename = "confDir", skip_serializing_if = "String::is_empty")]
    pub target_conf_dir: String,
    #[serde(default, rename = "serviceDir", skip_serializing_if = "String::is_empty")]
    pub target_service_dir: String,
}

/// Background process lifecycle
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub env: IndexMap<String, String>,
    #[serde(default, rename = "opts", skip_serializing_if = "RunOpts::is_empty")]
    pub run_opts: RunOpts,
    #[serde(default)]
    pub restart: bool,
    #[serde(default, rename = "autostart")]
    pub auto_start: bool,
    #[serde(default, rename = "restartDelay")]
    pub restart_delay: u32,
    #[serde(default, rename = "target", skip_serializing_if = "String::is_empty")]
    pub target_init: String,
}

/// Run-time arguments: either a raw option string or an argument list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RunOpts {
    Raw(String),
    Args(Vec<String>),
}

impl Default for RunOpts {
    fn default() -> Self {
        RunOpts::Raw(String::new())
    }
}

impl RunOpts {
    pub fn is_empty(&self) -> bool {
        match self {
            RunOpts::Raw(raw) => raw.is_empty(),
            RunOpts::Args(args) => args.is_empty(),
        }
    }

    /// Options as one string, list entries joined by single spaces
    pub fn joined(&self) -> String {
        match self {
            RunOpts::Raw(raw) => raw.clone(),
            RunOpts::Args(args) => args.join(" "),
        }
    }

    pub fn args(&self) -> Vec<String> {
        match self {
            RunOpts::Raw(raw) if raw.is_empty() => vec![],
            RunOpts::Raw(raw) => vec![raw.clone()],
            RunOpts::Args(args) => args.clone(),
        }
    }
}

impl Service {
    /// Service section written by `create --service`
    pub fn stub() -> Self {
        Self {
            env: IndexMap::new(),
            run_opts: RunOpts::default(),
            restart: true,
            auto_start: true,
            restart_delay: 5,
            target_init: String::new(),
        }
    }

    fn context(&self) -> Value {
        json!({
            "Env": self.env,
            "RunOpts": self.run_opts.joined(),
            "Args": self.run_opts.args(),
            "Restart": self.restart,
            "AutoStart": self.auto_start,
            "RestartDelay": self.restart_delay,
            "TargetInit": self.target_init,
        })
    }
}

impl Descriptor {
    /// Read a descriptor from a JSON document. Unknown keys are ignored.
    pub fn load(path: &Path) -> io::Result<Self> {
        let content = fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(io::Error::from)
    }

    pub fn from_json(content: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(content)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        let mut buf = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
        self.serialize(&mut ser)?;
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }

    /// Write `package.json` into `dir`
    pub fn save(&self, dir: &Path) -> io::Result<()> {
        let content = self.to_json().map_err(io::Error::from)?;
        fs::write(dir.join(PROJECT_PACKAGE_FILE), content)
    }

    /// New descriptor for `group-name` (or `name`, which doubles as the group)
    pub fn scaffold(packet: &str, author: &str) -> Self {
        let (group, name) = match packet.split_once('-') {
            Some((group, name)) => (group, name),
            None => (packet, packet),
        };
        Self {
            group: group.to_string(),
            name: name.to_string(),
            author: author.to_string(),
            version: "1.0.0".to_string(),
            description: format!("Implementation of {}", packet),
            ..Default::default()
        }
    }

    /// Unit name used by the init system, `<group>-<name>`
    pub fn unit_name(&self) -> String {
        format!("{}-{}", self.group, self.name)
    }

    /// Template evaluation context.
    ///
    /// Built field by field rather than through serde so the template
    /// vocabulary stays stable if the on-disk keys change.
    pub fn context(&self) -> Value {
        json!({
            "Group": self.group,
            "Name": self.name,
            "Version": self.version,
            "Author": self.author,
            "Description": self.description,
            "Depends": self.depends,
            "Architectures": self.architectures,
            "BinName": self.bin_name,
            "Resources": self.resources,
            "PreInst": self.pre_inst,
            "PostInst": self.post_inst,
            "PreRm": self.pre_rm,
            "TargetResourcesDir": self.target_resources_dir,
            "TargetBinDir": self.target_bin_dir,
            "TargetConfDir": self.target_conf_dir,
            "TargetServiceDir": self.target_service_dir,
            "Service": self.service.as_ref().map(Service::context),
        })
    }
}
