//! Document to configuration properties
//!
//! End-to-end checks of parser + projector on realistic config documents.

use nanoinit::config::projector::{project, try_project};
use nanoinit::config::source::ConfigSource;
use nanoinit::{ConfigError, OutputTarget};
use std::path::PathBuf;

#[test]
fn test_selector_scoping() {
    let doc = br#"{"a":{"ni":{"apps":{"x":{"path":"/bin/true"}}}}}"#;

    let config = project(doc, "/a/ni/apps");
    assert_eq!(config.len(), 1);
    let x = &config.applications()[0];
    assert_eq!(x.name(), "x");
    assert_eq!(x.path(), "/bin/true");
    assert!(x.args().is_empty());
    assert!(!x.autorestart());
    assert!(!x.manual());

    assert!(project(doc, "/missing").is_empty());
    assert!(matches!(
        try_project(doc, "/missing"),
        Err(ConfigError::SelectorNotFound(_))
    ));
}

#[test]
fn test_contiguous_blocks_in_document_order() {
    let doc = br#"
    // nanoinit settings live next to unrelated host config
    {
        "host": {"hostname": "box", "ports": [80, 443]},
        "nanoinit-settings": {
            "sshd": {
                "path": "/usr/sbin/sshd",
                "args": ["-D", "-e"],   // stay in foreground
                "autorestart": true,
            },
            "cron": {"path": "/usr/sbin/cron", "manual": true, "stdout": "/var/log/cron.log"},
            "agent": {"path": "/opt/agent", "stderr": ""}
        },
        "after": {"ignored": true}
    }
    "#;

    let config = project(doc, "nanoinit-settings");
    let names: Vec<&str> = config.applications().iter().map(|a| a.name()).collect();
    assert_eq!(names, vec!["sshd", "cron", "agent"]);

    let sshd = config.get("sshd").unwrap();
    assert_eq!(sshd.args(), &["-D".to_string(), "-e".to_string()]);
    assert!(sshd.autorestart());

    let cron = config.get("cron").unwrap();
    assert!(cron.manual());
    assert_eq!(
        cron.stdout(),
        &OutputTarget::File(PathBuf::from("/var/log/cron.log"))
    );
    assert_eq!(cron.stderr(), &OutputTarget::Inherit);

    let agent = config.get("agent").unwrap();
    assert_eq!(agent.stdout(), &OutputTarget::Inherit);
    assert_eq!(agent.stderr(), &OutputTarget::Discard);
}

#[test]
fn test_args_as_string_discards_everything() {
    let doc = br#"{"apps": {
        "good": {"path": "/bin/true"},
        "bad": {"path": "/bin/false", "args": "-x"}
    }}"#;
    assert!(project(doc, "/apps").is_empty());
    let err = try_project(doc, "/apps").unwrap_err();
    assert_eq!(err.class(), "malformed-structure");
}

#[test]
fn test_repeated_name_after_other_name_is_distinct() {
    let doc = br#"{
        "a": {"path": "/bin/a"},
        "b": {"path": "/bin/b"},
        "a": {"path": "/bin/a2"}
    }"#;
    let config = project(doc, "");
    let pairs: Vec<(&str, &str)> = config
        .applications()
        .iter()
        .map(|a| (a.name(), a.path()))
        .collect();
    assert_eq!(pairs, vec![("a", "/bin/a"), ("b", "/bin/b"), ("a", "/bin/a2")]);
}

#[test]
fn test_escaped_strings_are_decoded() {
    let doc = format!(
        r#"{{"x": {{"path": "/opt/caf\{}/run", "args": ["He said \"hi\"\n"]}}}}"#,
        "u00e9"
    );
    let config = project(doc.as_bytes(), "");
    let x = config.get("x").unwrap();
    assert_eq!(x.path(), "/opt/caf\u{e9}/run");
    assert_eq!(x.args(), &["He said \"hi\"\n".to_string()]);
}

#[test]
fn test_syntax_error_yields_empty() {
    assert!(project(br#"{"x": {"path": "/bin/true"}"#, "").is_empty());
    assert!(project(b"", "").is_empty());
    assert!(matches!(try_project(b"", ""), Err(ConfigError::NoInput)));
}

#[test]
fn test_excess_depth_yields_empty() {
    let mut doc = String::from(r#"{"x": {"path": "/bin/true", "args": "#);
    doc.push_str(&"[".repeat(80));
    doc.push_str(&"]".repeat(80));
    doc.push_str("}}");
    let err = try_project(doc.as_bytes(), "").unwrap_err();
    assert_eq!(err.class(), "allocation");
}

#[test]
fn test_identical_input_projects_identically() {
    let doc = br#"{"apps": {"a": {"path": "/bin/a", "args": ["1", "2"]}, "b": {"path": "/bin/b"}}}"#;
    assert_eq!(project(doc, "/apps"), project(doc, "/apps"));
}

#[test]
fn test_source_loads_file_with_comments() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nanoinit.json");
    std::fs::write(
        &path,
        "// supervisor config\n{\"ni\": {\"web\": {\"path\": \"/usr/bin/web\"}}}\n// end\n",
    )
    .unwrap();

    let source = ConfigSource::new(Some(path), Some("ni/"));
    let config = source.load();
    assert_eq!(config.len(), 1);
    assert_eq!(config.applications()[0].name(), "web");
}
