use crate::json::{EscapeError, ParseError};
use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

/// Where a child's stdout or stderr goes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputTarget {
    /// Field absent: the child shares the supervisor's stream.
    #[default]
    Inherit,
    /// Field present but empty: `/dev/null`.
    Discard,
    /// Open, create and truncate this file.
    File(PathBuf),
}

impl OutputTarget {
    /// Map a config field to a target: `None` inherits, `""` discards.
    pub fn from_field(value: Option<&str>) -> Self {
        match value {
            None => OutputTarget::Inherit,
            Some("") => OutputTarget::Discard,
            Some(path) => OutputTarget::File(PathBuf::from(path)),
        }
    }
}

/// One managed application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApplicationDescriptor {
    name: String,
    path: String,
    args: Vec<String>,
    autorestart: bool,
    manual: bool,
    stdout: OutputTarget,
    stderr: OutputTarget,
}

impl ApplicationDescriptor {
    pub fn new(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            args: Vec::new(),
            autorestart: false,
            manual: false,
            stdout: OutputTarget::Inherit,
            stderr: OutputTarget::Inherit,
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_autorestart(mut self, autorestart: bool) -> Self {
        self.autorestart = autorestart;
        self
    }

    pub fn with_manual(mut self, manual: bool) -> Self {
        self.manual = manual;
        self
    }

    pub fn with_stdout(mut self, target: OutputTarget) -> Self {
        self.stdout = target;
        self
    }

    pub fn with_stderr(mut self, target: OutputTarget) -> Self {
        self.stderr = target;
        self
    }

    pub(crate) fn set_path(&mut self, path: String) {
        self.path = path;
    }

    pub(crate) fn push_arg(&mut self, arg: String) {
        self.args.push(arg);
    }

    pub(crate) fn set_autorestart(&mut self, autorestart: bool) {
        self.autorestart = autorestart;
    }

    pub(crate) fn set_manual(&mut self, manual: bool) {
        self.manual = manual;
    }

    pub(crate) fn set_stdout(&mut self, target: OutputTarget) {
        self.stdout = target;
    }

    pub(crate) fn set_stderr(&mut self, target: OutputTarget) {
        self.stderr = target;
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn autorestart(&self) -> bool {
        self.autorestart
    }

    pub fn manual(&self) -> bool {
        self.manual
    }

    pub fn stdout(&self) -> &OutputTarget {
        &self.stdout
    }

    pub fn stderr(&self) -> &OutputTarget {
        &self.stderr
    }

    pub(crate) fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.name.is_empty() {
            return Err(ConfigError::MissingName);
        }
        if self.path.is_empty() {
            return Err(ConfigError::MissingPath {
                app: self.name.clone(),
            });
        }
        Ok(())
    }
}

/// Ordered application list. Either every descriptor is valid or the
/// configuration is empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Configuration {
    applications: Vec<ApplicationDescriptor>,
}

impl Configuration {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a configuration, rejecting it whole if any descriptor lacks a
    /// name or path.
    pub fn from_descriptors(
        applications: Vec<ApplicationDescriptor>,
    ) -> std::result::Result<Self, ConfigError> {
        for app in &applications {
            app.validate()?;
        }
        Ok(Self { applications })
    }

    pub fn applications(&self) -> &[ApplicationDescriptor] {
        &self.applications
    }

    pub fn len(&self) -> usize {
        self.applications.len()
    }

    pub fn is_empty(&self) -> bool {
        self.applications.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&ApplicationDescriptor> {
        self.applications.iter().find(|app| app.name == name)
    }
}

/// Why a projection produced no configuration. Only used for diagnostics;
/// every variant degrades to [`Configuration::empty`].
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("could not read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("selector '{0}' not found in document")]
    SelectorNotFound(String),

    #[error("application '{app}': unknown field '{field}'")]
    UnknownField { app: String, field: String },

    #[error("application '{app}': field '{field}' has unexpected structure")]
    UnexpectedNesting { app: String, field: String },

    #[error("application '{app}': field '{field}' must be {expected}")]
    WrongType {
        app: String,
        field: String,
        expected: &'static str,
    },

    #[error("malformed application list: {0}")]
    Malformed(String),

    #[error("document nesting exceeds {max_depth} levels")]
    DepthExceeded { max_depth: usize },

    #[error("invalid string encoding: {0}")]
    InvalidString(#[from] EscapeError),

    #[error("syntax error at byte {offset}")]
    Syntax { offset: usize },

    #[error("empty input")]
    NoInput,

    #[error("application with empty name")]
    MissingName,

    #[error("application '{app}' has no path")]
    MissingPath { app: String },
}

impl ConfigError {
    /// Diagnostic class this error belongs to.
    pub fn class(&self) -> &'static str {
        match self {
            ConfigError::Io { .. } | ConfigError::NoInput => "io",
            ConfigError::SelectorNotFound(_) => "selector-not-found",
            ConfigError::UnknownField { .. }
            | ConfigError::UnexpectedNesting { .. }
            | ConfigError::WrongType { .. }
            | ConfigError::Malformed(_)
            | ConfigError::MissingName
            | ConfigError::MissingPath { .. } => "malformed-structure",
            ConfigError::DepthExceeded { .. } => "allocation",
            ConfigError::InvalidString(_) => "invalid-string",
            ConfigError::Syntax { .. } => "syntax",
        }
    }
}

impl From<ParseError> for ConfigError {
    fn from(err: ParseError) -> Self {
        match err {
            ParseError::NoInput => ConfigError::NoInput,
            ParseError::DepthExceeded { max_depth } => ConfigError::DepthExceeded { max_depth },
            ParseError::Syntax { offset } => ConfigError::Syntax { offset },
        }
    }
}

/// Crate-wide error type.
#[derive(Error, Debug)]
pub enum NanoinitError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Signal error: {0}")]
    Signal(String),

    #[error("Failed to spawn '{app}': {reason}")]
    Spawn { app: String, reason: String },

    #[error("Process error: {0}")]
    Process(String),
}

impl NanoinitError {
    /// Faults of the supervisor itself (no fork, no pipe, bad signal setup),
    /// as opposed to one application failing to start.
    pub fn is_supervisor_fault(&self) -> bool {
        !matches!(self, NanoinitError::Spawn { .. } | NanoinitError::Config(_))
    }
}

pub type Result<T> = std::result::Result<T, NanoinitError>;
