/// Config projection
///
/// Walks the parser's leaf events through an operator-selected sub-path and
/// builds the application list. The selector match is a byte-prefix test on
/// the serialized path (`/a/ni/apps` matches `/a/ni/apps/web/path` and also
/// `/a/ni/apps2/path`, naming an application `2`).
///
/// Per application the recognized fields are `path`, `args`, `autorestart`,
/// `manual`, `stdout` and `stderr`. Any schema violation discards the whole
/// result.
use crate::config::types::{ApplicationDescriptor, ConfigError, Configuration, OutputTarget};
use crate::json::{parse, Flow, Path, PathElement, Value};
use log::{debug, error, info};

/// Nesting limit used when parsing config documents.
pub const MAX_DEPTH: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProjectorState {
    Searching,
    Found,
    Finished,
}

/// Canonical selector form: trimmed, leading `/`, no trailing `/`.
/// Empty (or `/`) selects the document root.
pub fn normalize_selector(selector: &str) -> String {
    let trimmed = selector.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{}", trimmed)
    }
}

/// Project `document` into a configuration. Never fails: any error is logged
/// and yields the empty configuration.
pub fn project(document: &[u8], selector: &str) -> Configuration {
    match try_project(document, selector) {
        Ok(config) => {
            info!("config projection produced {} application(s)", config.len());
            config
        }
        Err(err) => {
            error!(
                "config projection failed ({}): {}; using empty configuration",
                err.class(),
                err
            );
            Configuration::empty()
        }
    }
}

/// Like [`project`] but reports why a document was rejected.
pub fn try_project(document: &[u8], selector: &str) -> Result<Configuration, ConfigError> {
    let selector = normalize_selector(selector);
    let mut projector = Projector::new(&selector);

    let parsed = parse(document, MAX_DEPTH, |path, value| projector.on_leaf(path, value));

    // A schema error stops the parser through the callback, so it has to be
    // checked before the parse result.
    if let Some(err) = projector.error.take() {
        return Err(err);
    }
    parsed?;
    projector.finish()
}

struct Projector<'s> {
    selector: &'s str,
    state: ProjectorState,
    applications: Vec<ApplicationDescriptor>,
    error: Option<ConfigError>,
}

impl<'s> Projector<'s> {
    fn new(selector: &'s str) -> Self {
        Self {
            selector,
            state: ProjectorState::Searching,
            applications: Vec::new(),
            error: None,
        }
    }

    fn on_leaf(&mut self, path: &Path<'_, '_>, value: Value<'_>) -> Flow {
        match self.step(path, value) {
            Ok(flow) => flow,
            Err(err) => {
                self.error = Some(err);
                Flow::Stop
            }
        }
    }

    fn step(&mut self, path: &Path<'_, '_>, value: Value<'_>) -> Result<Flow, ConfigError> {
        let segments = path.segments()?;
        let serialized = segments.concat();
        let inside =
            serialized.len() > self.selector.len() && serialized.starts_with(self.selector);

        match self.state {
            ProjectorState::Searching if !inside => return Ok(Flow::Continue),
            ProjectorState::Searching => {
                debug!("selector '{}' entered at {}", self.selector, serialized);
                self.state = ProjectorState::Found;
            }
            ProjectorState::Found if !inside => {
                debug!("selector '{}' left at {}", self.selector, serialized);
                self.state = ProjectorState::Finished;
                return Ok(Flow::Stop);
            }
            ProjectorState::Found => {}
            ProjectorState::Finished => return Ok(Flow::Stop),
        }

        self.apply(path, &segments, &serialized, value)?;
        Ok(Flow::Continue)
    }

    fn apply(
        &mut self,
        path: &Path<'_, '_>,
        segments: &[String],
        serialized: &str,
        value: Value<'_>,
    ) -> Result<(), ConfigError> {
        let selector_len = self.selector.len();

        // The application name is the segment that carries the path past the
        // end of the selector.
        let mut seg_start = 0;
        let mut name_at = None;
        for (k, segment) in segments.iter().enumerate() {
            let seg_end = seg_start + segment.len();
            if seg_end > selector_len {
                name_at = Some(k);
                break;
            }
            seg_start = seg_end;
        }
        let name_at = name_at.ok_or_else(|| {
            ConfigError::Malformed(format!("no application name under {}", serialized))
        })?;

        let name = match path.get(name_at) {
            Some(PathElement::Key(_)) => {
                let tail = &segments[name_at][selector_len.saturating_sub(seg_start)..];
                tail.strip_prefix('/').unwrap_or(tail)
            }
            _ => {
                return Err(ConfigError::Malformed(format!(
                    "expected an object of applications at {}",
                    serialized
                )))
            }
        };

        let field = match path.get(name_at + 1) {
            Some(PathElement::Key(_)) => {
                let segment = segments[name_at + 1].as_str();
                segment.strip_prefix('/').unwrap_or(segment)
            }
            _ => {
                return Err(ConfigError::Malformed(format!(
                    "application '{}' must be an object",
                    name
                )))
            }
        };
        let nested = path.len() - (name_at + 2);

        if self.applications.last().map(ApplicationDescriptor::name) != Some(name) {
            self.applications.push(ApplicationDescriptor::new(name, ""));
        }
        let app = match self.applications.last_mut() {
            Some(app) => app,
            None => return Err(ConfigError::Malformed(format!("lost application '{}'", name))),
        };

        match field {
            "path" => {
                expect_flat(name, field, nested)?;
                app.set_path(string_value(name, field, value)?);
            }
            "args" => {
                let is_element = nested == 1
                    && matches!(path.get(name_at + 2), Some(PathElement::Index(_)));
                if nested == 0 {
                    return Err(wrong_type(name, field, "a list of strings"));
                }
                if !is_element {
                    return Err(ConfigError::UnexpectedNesting {
                        app: name.to_string(),
                        field: field.to_string(),
                    });
                }
                match value {
                    Value::String(raw) => app.push_arg(raw.unescape()?),
                    _ => return Err(wrong_type(name, field, "a list of strings")),
                }
            }
            "autorestart" => {
                expect_flat(name, field, nested)?;
                app.set_autorestart(bool_value(name, field, value)?);
            }
            "manual" => {
                expect_flat(name, field, nested)?;
                app.set_manual(bool_value(name, field, value)?);
            }
            "stdout" => {
                expect_flat(name, field, nested)?;
                let target = string_value(name, field, value)?;
                app.set_stdout(OutputTarget::from_field(Some(&target)));
            }
            "stderr" => {
                expect_flat(name, field, nested)?;
                let target = string_value(name, field, value)?;
                app.set_stderr(OutputTarget::from_field(Some(&target)));
            }
            _ => {
                return Err(ConfigError::UnknownField {
                    app: name.to_string(),
                    field: field.to_string(),
                })
            }
        }
        Ok(())
    }

    fn finish(self) -> Result<Configuration, ConfigError> {
        if self.state == ProjectorState::Searching {
            let shown = if self.selector.is_empty() {
                "/"
            } else {
                self.selector
            };
            return Err(ConfigError::SelectorNotFound(shown.to_string()));
        }
        Configuration::from_descriptors(self.applications)
    }
}

fn expect_flat(app: &str, field: &str, nested: usize) -> Result<(), ConfigError> {
    if nested == 0 {
        Ok(())
    } else {
        Err(ConfigError::UnexpectedNesting {
            app: app.to_string(),
            field: field.to_string(),
        })
    }
}

fn wrong_type(app: &str, field: &str, expected: &'static str) -> ConfigError {
    ConfigError::WrongType {
        app: app.to_string(),
        field: field.to_string(),
        expected,
    }
}

fn string_value(app: &str, field: &str, value: Value<'_>) -> Result<String, ConfigError> {
    match value {
        Value::String(raw) => Ok(raw.unescape()?),
        _ => Err(wrong_type(app, field, "a string")),
    }
}

fn bool_value(app: &str, field: &str, value: Value<'_>) -> Result<bool, ConfigError> {
    match value {
        Value::Bool(b) => Ok(b),
        _ => Err(wrong_type(app, field, "a boolean")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_selector() {
        assert_eq!(normalize_selector(""), "");
        assert_eq!(normalize_selector("/"), "");
        assert_eq!(normalize_selector("nanoinit-settings"), "/nanoinit-settings");
        assert_eq!(normalize_selector(" /a/ni/apps/ "), "/a/ni/apps");
    }

    #[test]
    fn test_root_selector() {
        let doc = br#"{"web": {"path": "/usr/bin/web", "autorestart": true}}"#;
        let config = try_project(doc, "").unwrap();
        assert_eq!(config.len(), 1);
        let web = config.get("web").unwrap();
        assert_eq!(web.path(), "/usr/bin/web");
        assert!(web.autorestart());
        assert!(!web.manual());
    }

    #[test]
    fn test_stops_after_leaving_selected_subtree() {
        // Everything after the selected object is malformed; projection must
        // stop before reaching it.
        let doc = br#"{"apps": {"x": {"path": "/bin/true"}}, "tail": 1, oops"#;
        let config = try_project(doc, "/apps").unwrap();
        assert_eq!(config.len(), 1);
    }

    #[test]
    fn test_prefix_match_is_bytewise() {
        let doc = br#"{"apps": {"x": {"path": "/bin/x"}}, "apps2": {"path": "/bin/y"}}"#;
        let config = try_project(doc, "/apps").unwrap();
        let names: Vec<&str> = config.applications().iter().map(|a| a.name()).collect();
        assert_eq!(names, vec!["x", "2"]);
    }

    #[test]
    fn test_unknown_field_is_rejected() {
        let doc = br#"{"x": {"path": "/bin/true", "user": "root"}}"#;
        let err = try_project(doc, "").unwrap_err();
        assert!(matches!(err, ConfigError::UnknownField { ref field, .. } if field == "user"));
        assert_eq!(err.class(), "malformed-structure");
    }

    #[test]
    fn test_path_with_children_is_rejected() {
        let doc = br#"{"x": {"path": {"bin": "/bin/true"}}}"#;
        assert!(matches!(
            try_project(doc, ""),
            Err(ConfigError::UnexpectedNesting { .. })
        ));
    }

    #[test]
    fn test_wrong_types_are_rejected() {
        for doc in [
            &br#"{"x": {"path": "/bin/true", "autorestart": "yes"}}"#[..],
            &br#"{"x": {"path": 5}}"#[..],
            &br#"{"x": {"path": "/bin/true", "stdout": null}}"#[..],
            &br#"{"x": {"path": "/bin/true", "args": [1]}}"#[..],
        ] {
            assert!(matches!(
                try_project(doc, ""),
                Err(ConfigError::WrongType { .. })
            ));
        }
    }

    #[test]
    fn test_nested_args_are_rejected() {
        let doc = br#"{"x": {"path": "/bin/true", "args": [["a"]]}}"#;
        assert!(matches!(
            try_project(doc, ""),
            Err(ConfigError::UnexpectedNesting { .. })
        ));
    }

    #[test]
    fn test_application_must_be_object() {
        let doc = br#"{"x": "/bin/true"}"#;
        assert!(matches!(try_project(doc, ""), Err(ConfigError::Malformed(_))));
    }

    #[test]
    fn test_missing_path_discards_everything() {
        let doc = br#"{"x": {"path": "/bin/true"}, "y": {"autorestart": true}}"#;
        let err = try_project(doc, "").unwrap_err();
        assert!(matches!(err, ConfigError::MissingPath { ref app } if app == "y"));
        assert!(project(doc, "").is_empty());
    }

    #[test]
    fn test_syntax_error_reports_offset() {
        let err = try_project(br#"{"x": {"path": "/bin/true",, }}"#, "").unwrap_err();
        assert!(matches!(err, ConfigError::Syntax { offset: 28 }));
    }

    #[test]
    fn test_invalid_string_escape_in_value() {
        let doc = br#"{"x": {"path": "/bin/\uD800"}}"#;
        let err = try_project(doc, "").unwrap_err();
        assert_eq!(err.class(), "invalid-string");
    }

    #[test]
    fn test_selector_not_found_at_root() {
        let err = try_project(b"{}", "").unwrap_err();
        assert!(matches!(err, ConfigError::SelectorNotFound(ref s) if s == "/"));
    }
}
