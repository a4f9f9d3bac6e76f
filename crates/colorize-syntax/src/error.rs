//! Errors surfaced by a colorize run.

use std::time::Duration;

use thiserror::Error;

/// Broad category of a [`ColorizeError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The options (or a value derived from them) cannot be satisfied.
    Configuration,
    /// An external highlighter could not be found or did not succeed.
    Execution,
    /// The document itself could not be rewritten.
    Document,
}

/// Errors that abort a whole colorize run.
///
/// There is no partial success: when any of these is returned, no document
/// was produced.
#[derive(Debug, Error)]
pub enum ColorizeError {
    /// Unrecognized serialization mode.
    #[error("unknown syntax `{0}` (expected one of: html, xhtml, xml)")]
    UnknownSyntax(String),

    /// A language was routed to a colorizer name that does not exist.
    #[error("no colorizer named `{colorizer}` (requested for language `{language}`)")]
    UnknownColorizer { colorizer: String, language: String },

    /// Malformed configuration file or value.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// An external highlighter failed while colorizing a block.
    #[error("failed to colorize {language} code: {source}")]
    Execution {
        language: String,
        #[source]
        source: ToolError,
    },

    /// The in-process highlighter failed on a language it has a grammar for.
    #[error("failed to highlight {language} code: {message}")]
    Highlight { language: String, message: String },

    /// The HTML rewriter gave up.
    #[error("failed to rewrite document: {0}")]
    Rewrite(#[from] lol_html::errors::RewritingError),
}

impl ColorizeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ColorizeError::UnknownSyntax(_)
            | ColorizeError::UnknownColorizer { .. }
            | ColorizeError::InvalidConfig(_) => ErrorKind::Configuration,
            ColorizeError::Execution { .. } | ColorizeError::Highlight { .. } => {
                ErrorKind::Execution
            }
            ColorizeError::Rewrite(_) => ErrorKind::Document,
        }
    }

    /// The executable involved in an execution failure, if any.
    pub fn executable(&self) -> Option<&str> {
        match self {
            ColorizeError::Execution { source, .. } => Some(source.executable()),
            _ => None,
        }
    }
}

/// Failure of a single external tool invocation.
#[derive(Debug, Error)]
pub enum ToolError {
    /// The executable is not on the search path.
    #[error("`{executable}` not found in search path")]
    NotFound { executable: String },

    /// The process ran and exited unsuccessfully.
    #[error("`{executable}` exited with {}{}", exit_status(.code), stderr_suffix(.stderr))]
    Failed {
        executable: String,
        code: Option<i32>,
        stderr: String,
    },

    /// The process did not exit in time and was killed.
    #[error("`{executable}` timed out after {}ms", millis(.timeout))]
    Timeout {
        executable: String,
        timeout: Duration,
    },

    /// Spawning or talking to the process failed.
    #[error("failed to run `{executable}`: {source}")]
    Io {
        executable: String,
        #[source]
        source: std::io::Error,
    },
}

impl ToolError {
    pub fn executable(&self) -> &str {
        match self {
            ToolError::NotFound { executable }
            | ToolError::Failed { executable, .. }
            | ToolError::Timeout { executable, .. }
            | ToolError::Io { executable, .. } => executable,
        }
    }
}

fn exit_status(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("status {code}"),
        None => "no status (killed by signal)".to_string(),
    }
}

fn millis(timeout: &Duration) -> u128 {
    timeout.as_millis()
}

fn stderr_suffix(stderr: &str) -> String {
    let stderr = stderr.trim();
    if stderr.is_empty() {
        String::new()
    } else {
        format!(": {stderr}")
    }
}
