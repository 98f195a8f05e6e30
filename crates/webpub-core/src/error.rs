use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExitCode {
    Success = 0,
    NotFound = 1,
    InvalidName = 2,
    InvalidUrl = 3,
    InvalidPath = 4,
    DuplicateName = 5,
    DuplicateUrl = 6,
    ArtifactExists = 7,
    MalformedConfig = 8,
    TemplateRender = 9,
    Io = 10,
    InvalidConfig = 11,
}

impl ExitCode {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Success),
            1 => Some(Self::NotFound),
            2 => Some(Self::InvalidName),
            3 => Some(Self::InvalidUrl),
            4 => Some(Self::InvalidPath),
            5 => Some(Self::DuplicateName),
            6 => Some(Self::DuplicateUrl),
            7 => Some(Self::ArtifactExists),
            8 => Some(Self::MalformedConfig),
            9 => Some(Self::TemplateRender),
            10 => Some(Self::Io),
            11 => Some(Self::InvalidConfig),
            _ => None,
        }
    }
}

/// Structural problem found while scanning server configuration text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("line {line}: {message}")]
pub struct MalformedConfig {
    pub line: usize,
    pub message: String,
}

impl MalformedConfig {
    pub fn new(line: usize, message: impl Into<String>) -> Self {
        Self {
            line,
            message: message.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("publication '{name}' not found")]
    NotFound { name: String },

    #[error("invalid publication name '{name}': {reason}")]
    InvalidName { name: String, reason: String },

    #[error("invalid publication url '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("invalid {field} '{value}': {reason}")]
    InvalidPath {
        field: String,
        value: String,
        reason: String,
    },

    #[error("publication '{name}' already exists")]
    DuplicateName { name: String },

    #[error("url '{url}' is already used by publication '{owner}'")]
    DuplicateUrl { url: String, owner: String },

    #[error("can't create publication '{name}': {} already exists", path.display())]
    ArtifactExists { name: String, path: PathBuf },

    #[error("malformed server config {}: {source}", path.display())]
    MalformedConfig {
        path: PathBuf,
        #[source]
        source: MalformedConfig,
    },

    #[error("failed to render template '{template}': {message}")]
    TemplateRender { template: String, message: String },

    #[error("i/o failure on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl PublishError {
    pub fn exit_code(&self) -> ExitCode {
        match self {
            Self::NotFound { .. } => ExitCode::NotFound,
            Self::InvalidName { .. } => ExitCode::InvalidName,
            Self::InvalidUrl { .. } => ExitCode::InvalidUrl,
            Self::InvalidPath { .. } => ExitCode::InvalidPath,
            Self::DuplicateName { .. } => ExitCode::DuplicateName,
            Self::DuplicateUrl { .. } => ExitCode::DuplicateUrl,
            Self::ArtifactExists { .. } => ExitCode::ArtifactExists,
            Self::MalformedConfig { .. } => ExitCode::MalformedConfig,
            Self::TemplateRender { .. } => ExitCode::TemplateRender,
            Self::Io { .. } => ExitCode::Io,
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn template(template: impl Into<String>, message: impl Into<String>) -> Self {
        Self::TemplateRender {
            template: template.into(),
            message: message.into(),
        }
    }
}

pub type PublishResult<T> = Result<T, PublishError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_round_trip_through_u8() {
        for code in [
            ExitCode::Success,
            ExitCode::NotFound,
            ExitCode::DuplicateUrl,
            ExitCode::MalformedConfig,
            ExitCode::InvalidConfig,
        ] {
            assert_eq!(ExitCode::from_u8(code as u8), Some(code));
        }
        assert_eq!(ExitCode::from_u8(200), None);
    }

    #[test]
    fn malformed_config_names_file_and_line() {
        let err = PublishError::MalformedConfig {
            path: PathBuf::from("/etc/apache2/1c.conf"),
            source: MalformedConfig::new(12, "unterminated publication block 'a'"),
        };
        assert_eq!(
            err.to_string(),
            "malformed server config /etc/apache2/1c.conf: line 12: unterminated publication block 'a'"
        );
        assert_eq!(err.exit_code(), ExitCode::MalformedConfig);
    }
}
