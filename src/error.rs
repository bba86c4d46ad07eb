use std::fmt;

use image::error::ImageError;
use serde::Serialize;

/// Longest diagnostic excerpt carried by process and probe failures.
pub const MAX_DIAGNOSTIC_CHARS: usize = 500;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Invalid job input: {0}")]
    UserInput(String),

    #[error("Job rejected: {0}")]
    Policy(String),

    #[error("Failed to fetch source video: {0}")]
    Fetch(String),

    #[error("Media inspection failed: {0}")]
    ProbeExecution(String),

    #[error("Unusable media: {0}")]
    Media(String),

    #[error("{tool} failed: {message}")]
    ProcessExecution { tool: String, message: String },

    #[error("Missing configuration: {0}")]
    EnvironmentConfig(String),

    #[error("Failed to publish output: {0}")]
    Publish(String),

    #[error("I/O operation failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to process image: {0}")]
    Image(#[from] ImageError),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Stable, serialisable classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    UserInput,
    Policy,
    Fetch,
    ProbeExecution,
    Media,
    ProcessExecution,
    EnvironmentConfig,
    Publish,
    Io,
    Internal,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::UserInput(_) => ErrorKind::UserInput,
            Error::Policy(_) => ErrorKind::Policy,
            Error::Fetch(_) => ErrorKind::Fetch,
            Error::ProbeExecution(_) => ErrorKind::ProbeExecution,
            Error::Media(_) => ErrorKind::Media,
            Error::ProcessExecution { .. } => ErrorKind::ProcessExecution,
            Error::EnvironmentConfig(_) => ErrorKind::EnvironmentConfig,
            Error::Publish(_) => ErrorKind::Publish,
            Error::Io(_) => ErrorKind::Io,
            Error::Image(_) => ErrorKind::Media,
            Error::Internal(_) => ErrorKind::Internal,
        }
    }

    pub fn process(tool: impl Into<String>, message: impl AsRef<str>) -> Self {
        Error::ProcessExecution {
            tool: tool.into(),
            message: excerpt(message.as_ref(), MAX_DIAGNOSTIC_CHARS),
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::UserInput => "UserInputError",
            ErrorKind::Policy => "PolicyError",
            ErrorKind::Fetch => "FetchError",
            ErrorKind::ProbeExecution => "ProbeExecutionError",
            ErrorKind::Media => "MediaError",
            ErrorKind::ProcessExecution => "ProcessExecutionError",
            ErrorKind::EnvironmentConfig => "EnvironmentConfigError",
            ErrorKind::Publish => "PublishError",
            ErrorKind::Io => "IoError",
            ErrorKind::Internal => "InternalError",
        };
        f.write_str(name)
    }
}

/// Keeps the tail of `text`, where tools put the line that explains the failure.
pub fn excerpt(text: &str, max_chars: usize) -> String {
    let text = text.trim();
    let count = text.chars().count();
    if count <= max_chars {
        return text.to_string();
    }
    text.chars().skip(count - max_chars).collect()
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn excerpt_keeps_short_text() {
        assert_eq!(excerpt("  boom \n", 500), "boom");
    }

    #[test]
    fn excerpt_keeps_tail_within_limit() {
        let long = format!("{}END", "x".repeat(1000));
        let cut = excerpt(&long, MAX_DIAGNOSTIC_CHARS);
        assert_eq!(cut.chars().count(), MAX_DIAGNOSTIC_CHARS);
        assert!(cut.ends_with("END"));
    }

    #[test]
    fn excerpt_respects_char_boundaries() {
        let text = "é".repeat(600);
        assert_eq!(excerpt(&text, 10), "é".repeat(10));
    }

    #[test]
    fn process_errors_are_truncated() {
        let error = Error::process("ffmpeg", "y".repeat(2000));
        match error {
            Error::ProcessExecution { message, .. } => assert_eq!(message.len(), MAX_DIAGNOSTIC_CHARS),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn kinds_display_taxonomy_names() {
        assert_eq!(Error::Policy("x".into()).kind().to_string(), "PolicyError");
        assert_eq!(Error::Publish("x".into()).kind().to_string(), "PublishError");
    }
}
