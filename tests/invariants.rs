//! Build Invariant Tests
//!
//! End-to-end builds run against fake collaborators from `common`.

mod common;

use std::fs;
use tempfile::TempDir;

use common::{fake_tools, host, tools_with, tree_of, Shared};
use packforge::{
    resolve_defaults, resolve_templates, ConfigError, Descriptor, HostFacts, PipelineError,
    Project,
};

fn project(json: &str, work: &TempDir) -> Project {
    Project::new(Descriptor::from_json(json).unwrap(), work.path())
}

#[test]
fn invariant_minimal_descriptor_builds_one_package() {
    let work = TempDir::new().unwrap();
    let out = work.path().join("out");
    let calls = Shared::default();

    let mut p = project(r#"{"group": "acme", "name": "tool"}"#, &work);
    let built = p.make_with(&out, &fake_tools(&calls), &host()).unwrap();

    assert_eq!(built.len(), 1);
    assert_eq!(built[0].arch, "amd64");
    assert_eq!(built[0].path, out.join("acme-tool-0.0.0_amd64.deb"));
    assert_eq!(built[0].sha256.len(), 64);

    let d = p.resolved.as_ref().unwrap();
    assert_eq!(d.version, "0.0.0");
    assert_eq!(d.bin_name, "acme-tool");
    assert_eq!(d.author, "tester");
    assert_eq!(d.description, "acme tool built at 2026-01-02T03:04:05Z");
    assert_eq!(d.target_resources_dir, "/usr/local/share/acme/tool");
    assert_eq!(d.target_bin_dir, "/usr/local/bin");
    assert_eq!(d.target_conf_dir, "/etc/acme/tool");
    assert_eq!(d.target_service_dir, "/etc/init");

    let tree = tree_of(&built[0].path);
    let control = fs::read_to_string(tree.join("DEBIAN/control")).unwrap();
    assert!(control.starts_with("Package: acme-tool\n"));
    assert!(control.contains("Version: 0.0.0\n"));
    assert!(control.contains("Architecture: amd64\n"));
    assert!(control.contains("Maintainer: tester\n"));
    assert!(!control.contains("Depends:"));

    assert!(!tree.join("DEBIAN/preinst").exists());
    assert!(!tree.join("DEBIAN/postinst").exists());
    assert!(!tree.join("DEBIAN/prerm").exists());
    assert!(!tree.join("DEBIAN/changelog").exists());
    assert_eq!(
        fs::read_to_string(tree.join("usr/local/bin/acme-tool")).unwrap(),
        "binary for amd64"
    );

    let calls = calls.borrow();
    assert_eq!(calls.fetched, 1);
    assert_eq!(calls.compiled, vec!["amd64"]);
}

#[test]
fn invariant_service_scripts_and_unit() {
    let work = TempDir::new().unwrap();
    let out = work.path().join("out");
    let calls = Shared::default();

    let mut p = project(
        r#"{
            "group": "acme", "name": "tool", "depends": ["libc6", "curl"],
            "service": {"autostart": true, "restart": true, "restartDelay": 5,
                        "env": {"PORT": "8080", "HOME_DIR": "{{.TargetConfDir}}"},
                        "opts": ["--port", "$PORT"]}
        }"#,
        &work,
    );
    let built = p.make_with(&out, &fake_tools(&calls), &host()).unwrap();
    let tree = tree_of(&built[0].path);

    let postinst = fs::read_to_string(tree.join("DEBIAN/postinst")).unwrap();
    assert!(postinst.starts_with("#!/bin/bash\n"));
    assert!(postinst.contains("service acme-tool start"));
    assert!(postinst.contains("# restore old configuration"));

    let preinst = fs::read_to_string(tree.join("DEBIAN/preinst")).unwrap();
    assert!(preinst.contains("service acme-tool stop"));
    assert!(preinst.contains("cp -r \"/etc/acme/tool\"/* \"$BACKUP_DIR\"/"));
    let prerm = fs::read_to_string(tree.join("DEBIAN/prerm")).unwrap();
    assert_eq!(prerm, preinst);

    let unit = fs::read_to_string(tree.join("etc/init/acme-tool.conf")).unwrap();
    assert!(unit.contains("respawn limit 99999999 5"));
    assert!(unit.contains(". /etc/acme/tool/service.conf"));
    assert!(unit.contains("exec /usr/local/bin/acme-tool $RUN_OPTS 2>&1 | logger -t 'acme-tool'"));

    let env = fs::read_to_string(tree.join("etc/acme/tool/service.conf")).unwrap();
    assert_eq!(
        env,
        "#!/bin/bash\nexport PORT=\"8080\"\nexport HOME_DIR=\"/etc/acme/tool\"\nRUN_OPTS=\"--port $PORT\"\n"
    );

    let control = fs::read_to_string(tree.join("DEBIAN/control")).unwrap();
    assert!(control.contains("Depends: libc6, curl\n"));
}

#[test]
fn invariant_service_without_autostart_does_not_start() {
    let work = TempDir::new().unwrap();
    let out = work.path().join("out");
    let calls = Shared::default();

    let mut p = project(
        r#"{"group": "acme", "name": "tool", "service": {"restart": false}}"#,
        &work,
    );
    let built = p.make_with(&out, &fake_tools(&calls), &host()).unwrap();
    let tree = tree_of(&built[0].path);

    let postinst = fs::read_to_string(tree.join("DEBIAN/postinst")).unwrap();
    assert!(!postinst.contains("start"));
    let unit = fs::read_to_string(tree.join("etc/init/acme-tool.conf")).unwrap();
    assert!(!unit.contains("respawn"));
}

#[test]
fn invariant_missing_identity_has_no_side_effects() {
    let work = TempDir::new().unwrap();
    let out = work.path().join("out");
    let calls = Shared::default();

    let mut p = project(r#"{"group": "acme"}"#, &work);
    let err = p.make_with(&out, &fake_tools(&calls), &host()).unwrap_err();

    assert!(matches!(
        err,
        PipelineError::Config(ConfigError::MissingField("name"))
    ));
    assert!(!out.exists());
    assert!(calls.borrow().compiled.is_empty());

    let mut p = project(r#"{"name": "tool"}"#, &work);
    let err = p.make_with(&out, &fake_tools(&calls), &host()).unwrap_err();
    assert!(matches!(
        err,
        PipelineError::Config(ConfigError::MissingField("group"))
    ));
}

#[test]
fn invariant_failed_arch_aborts_and_cleans_staging() {
    let work = TempDir::new().unwrap();
    let out = work.path().join("out");
    let calls = Shared::default();

    let mut p = project(
        r#"{"group": "acme", "name": "tool", "arch": ["AMD64", "arm64", "386"]}"#,
        &work,
    );
    let tools = tools_with(&calls, Some("arm64"), None);
    let err = p.make_with(&out, &tools, &host()).unwrap_err();

    assert!(matches!(err, PipelineError::Tool(_)));
    assert!(out.join("acme-tool-0.0.0_amd64.deb").exists());
    assert!(!out.join("acme-tool-0.0.0_arm64.deb").exists());

    let calls = calls.borrow();
    assert_eq!(calls.compiled, vec!["amd64", "arm64"]);
    for staging in &calls.staging_dirs {
        assert!(!staging.exists());
    }
}

#[test]
fn invariant_control_is_rendered_per_arch() {
    let work = TempDir::new().unwrap();
    let out = work.path().join("out");
    let calls = Shared::default();

    let mut p = project(
        r#"{"group": "acme", "name": "tool", "arch": ["amd64", "386"]}"#,
        &work,
    );
    let built = p.make_with(&out, &fake_tools(&calls), &host()).unwrap();

    assert_eq!(built.len(), 2);
    let control = fs::read_to_string(tree_of(&built[1].path).join("DEBIAN/control")).unwrap();
    assert!(control.contains("Architecture: i386\n"));
    assert_eq!(built[1].path, out.join("acme-tool-0.0.0_386.deb"));
}

#[test]
fn invariant_release_notes_become_changelog() {
    let work = TempDir::new().unwrap();
    let out = work.path().join("out");
    let calls = Shared::default();

    let mut p = project(r#"{"group": "acme", "name": "tool"}"#, &work);
    let tools = tools_with(&calls, None, Some("commit abc\n\n    first"));
    let built = p.make_with(&out, &tools, &host()).unwrap();

    let changelog = fs::read_to_string(tree_of(&built[0].path).join("DEBIAN/changelog")).unwrap();
    assert_eq!(changelog, "commit abc\n\n    first");
    assert_eq!(p.release_notes.as_deref(), Some("commit abc\n\n    first"));
}

#[test]
fn invariant_hooks_resolve_from_file_or_inline() {
    let work = TempDir::new().unwrap();
    let out = work.path().join("out");
    let calls = Shared::default();
    fs::create_dir_all(work.path().join("hooks")).unwrap();
    fs::write(work.path().join("hooks/pre.sh"), "echo installing {{.Name}}").unwrap();

    let mut p = project(
        r#"{"group": "acme", "name": "tool",
            "preinst": "hooks/pre.sh", "postinst": "echo done {{.Version}}"}"#,
        &work,
    );
    let built = p.make_with(&out, &fake_tools(&calls), &host()).unwrap();
    let tree = tree_of(&built[0].path);

    assert_eq!(
        fs::read_to_string(tree.join("DEBIAN/preinst")).unwrap(),
        "#!/bin/bash\necho installing tool"
    );
    assert_eq!(
        fs::read_to_string(tree.join("DEBIAN/postinst")).unwrap(),
        "#!/bin/bash\necho done 0.0.0"
    );
    assert!(!tree.join("DEBIAN/prerm").exists());
}

#[test]
fn invariant_repeated_builds_do_not_accumulate_scripts() {
    let work = TempDir::new().unwrap();
    let out = work.path().join("out");
    let calls = Shared::default();

    let mut p = project(
        r#"{"group": "acme", "name": "tool", "preinst": "echo hi", "bin": "{{.Name}}-bin"}"#,
        &work,
    );
    let first = p.make_with(&out, &fake_tools(&calls), &host()).unwrap();
    let first_preinst = fs::read_to_string(tree_of(&first[0].path).join("DEBIAN/preinst")).unwrap();
    let second = p.make_with(&out, &fake_tools(&calls), &host()).unwrap();
    let second_preinst = fs::read_to_string(tree_of(&second[0].path).join("DEBIAN/preinst")).unwrap();

    assert_eq!(first_preinst, "#!/bin/bash\necho hi");
    assert_eq!(second_preinst, first_preinst);
    assert_eq!(p.descriptor.bin_name, "{{.Name}}-bin");
    assert_eq!(p.resolved.as_ref().unwrap().bin_name, "tool-bin");
    assert_eq!(first[0].path, second[0].path);
}

#[test]
fn invariant_hook_file_with_latin1_bytes_is_read() {
    let work = TempDir::new().unwrap();
    let out = work.path().join("out");
    let calls = Shared::default();
    fs::write(work.path().join("pre.sh"), b"echo caf\xe9").unwrap();

    let mut p = project(r#"{"group": "acme", "name": "tool", "preinst": "pre.sh"}"#, &work);
    let built = p.make_with(&out, &fake_tools(&calls), &host()).unwrap();

    let preinst = fs::read(tree_of(&built[0].path).join("DEBIAN/preinst")).unwrap();
    let preinst = String::from_utf8_lossy(&preinst);
    assert!(preinst.starts_with("#!/bin/bash\necho caf"));
    assert!(!preinst.contains("pre.sh"));
}

#[test]
fn invariant_resources_are_staged() {
    let work = TempDir::new().unwrap();
    let out = work.path().join("out");
    let calls = Shared::default();
    fs::create_dir_all(work.path().join("resources/sub")).unwrap();
    fs::write(work.path().join("resources/a.txt"), "a").unwrap();
    fs::write(work.path().join("resources/sub/b.txt"), "b").unwrap();

    let mut p = project(r#"{"group": "acme", "name": "tool"}"#, &work);
    let built = p.make_with(&out, &fake_tools(&calls), &host()).unwrap();
    let res = tree_of(&built[0].path).join("usr/local/share/acme/tool");

    assert_eq!(fs::read_to_string(res.join("a.txt")).unwrap(), "a");
    assert_eq!(fs::read_to_string(res.join("sub/b.txt")).unwrap(), "b");
}

#[test]
fn invariant_bad_hook_template_is_fatal() {
    let work = TempDir::new().unwrap();
    let out = work.path().join("out");
    let calls = Shared::default();

    let mut p = project(
        r#"{"group": "acme", "name": "tool", "prerm": "echo {{.Nope}}"}"#,
        &work,
    );
    let err = p.make_with(&out, &fake_tools(&calls), &host()).unwrap_err();
    match err {
        PipelineError::Template(e) => assert!(!e.is_parse()),
        other => panic!("unexpected error: {}", other),
    }
    assert!(calls.borrow().compiled.is_empty());
}

#[test]
fn invariant_defaults_are_idempotent() {
    let d = Descriptor::from_json(
        r#"{"group": "acme", "name": "tool", "service": {"env": {"A": "1"}}}"#,
    )
    .unwrap();

    let once = resolve_defaults(d, &host()).unwrap();
    let twice = resolve_defaults(once.clone(), &host()).unwrap();
    assert_eq!(once, twice);
    assert_eq!(once.service.unwrap().target_init, "upstart");
}

#[test]
fn invariant_default_arch_is_host_arch() {
    let d = Descriptor::from_json(r#"{"group": "acme", "name": "tool"}"#).unwrap();
    let host = HostFacts {
        user: Some("tester".to_string()),
        ..HostFacts::detect()
    };

    let resolved = resolve_defaults(d, &host).unwrap();
    assert_eq!(resolved.architectures, vec![packforge::defaults::host_arch()]);
}

#[test]
fn invariant_unsupported_init_is_rejected() {
    let d = Descriptor::from_json(
        r#"{"group": "acme", "name": "tool", "service": {"target": "systemd"}}"#,
    )
    .unwrap();

    let err = resolve_defaults(d, &host()).unwrap_err();
    assert_eq!(err, ConfigError::UnsupportedInit("systemd".to_string()));
}

#[test]
fn invariant_author_requires_identity() {
    let d = Descriptor::from_json(r#"{"group": "acme", "name": "tool"}"#).unwrap();
    let anonymous = HostFacts {
        user: None,
        ..host()
    };

    assert_eq!(
        resolve_defaults(d.clone(), &anonymous).unwrap_err(),
        ConfigError::IdentityLookup
    );

    let d = Descriptor {
        author: "Jo".to_string(),
        ..d
    };
    assert_eq!(resolve_defaults(d, &anonymous).unwrap().author, "Jo");
}

#[test]
fn invariant_self_resolution_respects_field_order() {
    let d = Descriptor::from_json(
        r#"{"group": "acme", "name": "tool",
            "bin": "{{.Group}}-{{.Name}}-bin",
            "confDir": "/etc/{{.BinName}}",
            "version": "{{.BinName}}"}"#,
    )
    .unwrap();

    let d = resolve_templates(resolve_defaults(d, &host()).unwrap()).unwrap();

    assert_eq!(d.bin_name, "acme-tool-bin");
    // confDir resolves after bin and sees the resolved value
    assert_eq!(d.target_conf_dir, "/etc/acme-tool-bin");
    // version resolves before bin and sees the raw text
    assert_eq!(d.version, "{{.Group}}-{{.Name}}-bin");
}

#[test]
fn invariant_self_resolution_renders_service_fields() {
    let d = Descriptor::from_json(
        r#"{"group": "acme", "name": "tool",
            "service": {"env": {"B": "{{.Name}}", "A": "{{.Group}}"},
                        "opts": ["--name", "{{.BinName}}"]}}"#,
    )
    .unwrap();

    let d = resolve_templates(resolve_defaults(d, &host()).unwrap()).unwrap();
    let service = d.service.unwrap();

    let env: Vec<_> = service.env.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
    assert_eq!(env, vec![("B", "tool"), ("A", "acme")]);
    assert_eq!(service.run_opts.joined(), "--name acme-tool");
}

#[test]
fn invariant_template_errors_name_the_field() {
    let d = Descriptor::from_json(
        r#"{"group": "acme", "name": "tool", "confDir": "/etc/{{.Missing}}"}"#,
    )
    .unwrap();

    let err = resolve_templates(resolve_defaults(d, &host()).unwrap()).unwrap_err();
    assert!(err.to_string().contains("confDir"));
    assert!(!err.is_parse());

    let d = Descriptor::from_json(r#"{"group": "acme", "name": "tool", "bin": "{{.Name"}"#).unwrap();
    let err = resolve_templates(resolve_defaults(d, &host()).unwrap()).unwrap_err();
    assert!(err.is_parse());
}
