//! Default Resolver - Fills What The User Left Out
//!
//! Policy lives in `DEFAULTS`; this module never renders templates.
//! Populated fields are never overwritten, so resolving twice is a no-op.

use chrono::{DateTime, SecondsFormat, Utc};
use thiserror::Error;
use tracing::debug;

use crate::descriptor::Descriptor;
use crate::resolve::Field;

/// The only init system services can target
pub const SUPPORTED_INIT: &str = "upstart";

/// Static defaults, applied when the field is empty
pub const DEFAULTS: &[(Field, &str)] = &[
    (Field::Resources, "resources"),
    (Field::Version, "0.0.0"),
    (Field::BinName, "{{.Group}}-{{.Name}}"),
    (Field::TargetResourcesDir, "/usr/local/share/{{.Group}}/{{.Name}}"),
    (Field::TargetBinDir, "/usr/local/bin"),
    (Field::TargetConfDir, "/etc/{{.Group}}/{{.Name}}"),
    (Field::TargetServiceDir, "/etc/init"),
];

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be specified")]
    MissingField(&'static str),

    #[error("author is not set and the current user cannot be determined")]
    IdentityLookup,

    #[error("Only 'upstart' target init system is allowed for services, got '{0}'")]
    UnsupportedInit(String),
}

/// Facts about the build host that feed computed defaults
#[derive(Debug, Clone)]
pub struct HostFacts {
    pub user: Option<String>,
    pub arch: String,
    pub timestamp: DateTime<Utc>,
}

impl HostFacts {
    pub fn detect() -> Self {
        Self {
            user: current_user(),
            arch: host_arch().to_string(),
            timestamp: Utc::now(),
        }
    }
}

/// Display name of the invoking user.
///
/// Looked up by uid in the passwd database (the GECOS full name, or the
/// login name when that is blank). `$USER` and `$USERNAME` are consulted
/// only when the lookup finds nothing.
pub fn current_user() -> Option<String> {
    passwd_user().or_else(env_user)
}

#[cfg(unix)]
fn passwd_user() -> Option<String> {
    use nix::unistd::{Uid, User};

    match User::from_uid(Uid::current()) {
        Ok(Some(user)) => Some(display_name(&user.gecos.to_string_lossy(), &user.name)),
        Ok(None) => None,
        Err(e) => {
            debug!("passwd lookup failed: {}", e);
            None
        }
    }
}

#[cfg(not(unix))]
fn passwd_user() -> Option<String> {
    None
}

fn env_user() -> Option<String> {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .ok()
        .filter(|u| !u.is_empty())
}

fn display_name(gecos: &str, login: &str) -> String {
    match gecos.split(',').next().map(str::trim) {
        Some(full) if !full.is_empty() => full.to_string(),
        _ => login.to_string(),
    }
}

/// Host architecture in the packaging/compiler vocabulary
pub fn host_arch() -> &'static str {
    match std::env::consts::ARCH {
        "x86_64" => "amd64",
        "x86" => "386",
        "aarch64" => "arm64",
        "powerpc64" => "ppc64",
        "loongarch64" => "loong64",
        other => other,
    }
}

/// Fill every unset field; name and group have no default
pub fn resolve_defaults(mut d: Descriptor, host: &HostFacts) -> Result<Descriptor, ConfigError> {
    if d.name.is_empty() {
        return Err(ConfigError::MissingField("name"));
    }
    if d.group.is_empty() {
        return Err(ConfigError::MissingField("group"));
    }
    if d.author.is_empty() {
        d.author = host.user.clone().ok_or(ConfigError::IdentityLookup)?;
    }
    if d.description.is_empty() {
        d.description = format!(
            "{{{{.Group}}}} {{{{.Name}}}} built at {}",
            host.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true)
        );
    }
    if d.architectures.is_empty() {
        d.architectures.push(host.arch.clone());
    }
    if let Some(service) = d.service.as_mut() {
        if service.target_init.is_empty() {
            service.target_init = SUPPORTED_INIT.to_string();
        } else if service.target_init != SUPPORTED_INIT {
            return Err(ConfigError::UnsupportedInit(service.target_init.clone()));
        }
    }

    for (field, default) in DEFAULTS {
        let slot = field.slot(&mut d);
        if slot.is_empty() {
            *slot = default.to_string();
        }
    }

    Ok(d)
}
