//! Error types for sandboxed commands and plugin dispatch

use std::fmt;

use srcgraph_core::{CoreError, UnitId};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ToolchainError>;

/// The plugin capabilities a registry dispatches on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PluginKind {
    Scanner,
    Lister,
    Resolver,
    Grapher,
}

impl fmt::Display for PluginKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PluginKind::Scanner => "scanner",
            PluginKind::Lister => "dependency lister",
            PluginKind::Resolver => "dependency resolver",
            PluginKind::Grapher => "grapher",
        })
    }
}

#[derive(Error, Debug)]
pub enum ToolchainError {
    #[error("no {kind} registered for {key:?}")]
    NotRegistered { kind: PluginKind, key: String },

    #[error("source unit {0} reported twice by scanners")]
    DuplicateUnit(UnitId),

    #[error("expected a {expected} unit, got {found}")]
    WrongUnit { expected: &'static str, found: String },

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Command(#[from] CommandError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ToolchainError {
    /// The sandbox failure behind this error, if that is what it is.
    pub fn as_command_error(&self) -> Option<&CommandError> {
        match self {
            ToolchainError::Command(err) => Some(err),
            _ => None,
        }
    }
}

/// How a sandboxed command failed. Each class calls for different recovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The sandbox could not be built or the tool could not be started.
    Environment,
    /// The tool exited unsuccessfully; retrying may help.
    Exited,
    /// The transform rejected the tool's output; the toolchain version
    /// probably needs a bump.
    UnusableOutput,
    /// Canonical output did not match the declared type; the schema needs
    /// fixing.
    SchemaMismatch,
}

#[derive(Error, Debug)]
pub enum CommandError {
    #[error("preparing {sandbox} sandbox for {program}: {message}")]
    Environment {
        sandbox: &'static str,
        program: String,
        message: String,
    },

    #[error("{program} exited with {status}\n{stderr}")]
    Exited {
        program: String,
        status: String,
        stderr: String,
    },

    #[error("unusable output from {program}: {source}\n{stderr}")]
    UnusableOutput {
        program: String,
        #[source]
        source: anyhow::Error,
        stderr: String,
    },

    #[error("output of {program} does not match {expected}: {source}")]
    SchemaMismatch {
        program: String,
        expected: &'static str,
        #[source]
        source: serde_json::Error,
        output: String,
        stderr: String,
    },
}

impl CommandError {
    pub fn kind(&self) -> FailureKind {
        match self {
            CommandError::Environment { .. } => FailureKind::Environment,
            CommandError::Exited { .. } => FailureKind::Exited,
            CommandError::UnusableOutput { .. } => FailureKind::UnusableOutput,
            CommandError::SchemaMismatch { .. } => FailureKind::SchemaMismatch,
        }
    }

    /// Diagnostic text the tool wrote to stderr.
    pub fn stderr(&self) -> Option<&str> {
        match self {
            CommandError::Environment { .. } => None,
            CommandError::Exited { stderr, .. }
            | CommandError::UnusableOutput { stderr, .. }
            | CommandError::SchemaMismatch { stderr, .. } => Some(stderr),
        }
    }
}
