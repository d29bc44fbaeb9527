//! Self-Resolution - Rendering A Descriptor Against Itself
//!
//! Fields resolve in the order of `Field::RESOLUTION_ORDER`. Each field sees
//! every field resolved before it; a field that references one resolved
//! later sees that field's raw text. Hooks are rendered at assembly time,
//! not here.

use serde_json::Value;

use crate::descriptor::{Descriptor, RunOpts, Service};
use crate::template::{render, TemplateError};

/// Scalar descriptor fields that carry templates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Name,
    Resources,
    Group,
    Version,
    BinName,
    Description,
    Author,
    TargetServiceDir,
    TargetResourcesDir,
    TargetBinDir,
    TargetConfDir,
}

impl Field {
    pub const RESOLUTION_ORDER: [Field; 11] = [
        Field::Name,
        Field::Resources,
        Field::Group,
        Field::Version,
        Field::BinName,
        Field::Description,
        Field::Author,
        Field::TargetServiceDir,
        Field::TargetResourcesDir,
        Field::TargetBinDir,
        Field::TargetConfDir,
    ];

    /// Key in package.json
    pub fn key(self) -> &'static str {
        match self {
            Field::Name => "name",
            Field::Resources => "resources",
            Field::Group => "group",
            Field::Version => "version",
            Field::BinName => "bin",
            Field::Description => "description",
            Field::Author => "author",
            Field::TargetServiceDir => "serviceDir",
            Field::TargetResourcesDir => "resourcesDir",
            Field::TargetBinDir => "binDir",
            Field::TargetConfDir => "confDir",
        }
    }

    pub fn slot(self, d: &mut Descriptor) -> &mut String {
        match self {
            Field::Name => &mut d.name,
            Field::Resources => &mut d.resources,
            Field::Group => &mut d.group,
            Field::Version => &mut d.version,
            Field::BinName => &mut d.bin_name,
            Field::Description => &mut d.description,
            Field::Author => &mut d.author,
            Field::TargetServiceDir => &mut d.target_service_dir,
            Field::TargetResourcesDir => &mut d.target_resources_dir,
            Field::TargetBinDir => &mut d.target_bin_dir,
            Field::TargetConfDir => &mut d.target_conf_dir,
        }
    }
}

/// Render `text` against a fresh snapshot of `d`
fn render_against(d: &Descriptor, text: &str, field: &str) -> Result<String, TemplateError> {
    if !text.contains("{{") {
        return Ok(text.to_string());
    }
    let context: Value = d.context();
    render(text, &context).map_err(|e| e.in_field(field))
}

fn resolve_list(
    d: &mut Descriptor,
    key: &str,
    get: fn(&mut Descriptor) -> &mut Vec<String>,
) -> Result<(), TemplateError> {
    for i in 0..get(d).len() {
        let raw = get(d)[i].clone();
        let resolved = render_against(d, &raw, &format!("{}[{}]", key, i))?;
        get(d)[i] = resolved;
    }
    Ok(())
}

fn depends(d: &mut Descriptor) -> &mut Vec<String> {
    &mut d.depends
}

fn architectures(d: &mut Descriptor) -> &mut Vec<String> {
    &mut d.architectures
}

/// Resolve every template-bearing field in place, in declared order
pub fn resolve_templates(mut d: Descriptor) -> Result<Descriptor, TemplateError> {
    for field in Field::RESOLUTION_ORDER {
        let raw = field.slot(&mut d).clone();
        let resolved = render_against(&d, &raw, field.key())?;
        *field.slot(&mut d) = resolved;
    }

    resolve_list(&mut d, "depends", depends)?;
    resolve_list(&mut d, "arch", architectures)?;

    let Some(service) = d.service.clone() else {
        return Ok(d);
    };

    let target_init = render_against(&d, &service.target_init, "service.target")?;
    set_service(&mut d, |s| s.target_init = target_init);

    for (key, raw) in &service.env {
        let resolved = render_against(&d, raw, &format!("service.env.{}", key))?;
        set_service(&mut d, |s| {
            s.env.insert(key.clone(), resolved);
        });
    }

    match &service.run_opts {
        RunOpts::Raw(raw) => {
            let resolved = render_against(&d, raw, "service.opts")?;
            set_service(&mut d, |s| s.run_opts = RunOpts::Raw(resolved));
        }
        RunOpts::Args(args) => {
            for (i, raw) in args.iter().enumerate() {
                let resolved = render_against(&d, raw, &format!("service.opts[{}]", i))?;
                set_service(&mut d, |s| {
                    if let RunOpts::Args(args) = &mut s.run_opts {
                        args[i] = resolved;
                    }
                });
            }
        }
    }

    Ok(d)
}

fn set_service(d: &mut Descriptor, apply: impl FnOnce(&mut Service)) {
    if let Some(service) = d.service.as_mut() {
        apply(service);
    }
}
