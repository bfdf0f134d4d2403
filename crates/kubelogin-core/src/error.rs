//! Error types for kubelogin.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    // Configuration errors
    #[error("{0}")]
    Configuration(String),

    // Identity provider errors
    #[error("{}", format_auth(.code, .message))]
    Auth {
        code: Option<String>,
        message: String,
    },

    #[error("HTTP request failed: {0}")]
    Http(String),

    // Storage errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{}: {source}", .path.display())]
    IoPath {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("not supported: {0}")]
    NotSupported(String),

    // Lifecycle errors
    #[error("operation cancelled")]
    Cancelled,

    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

fn format_auth(code: &Option<String>, message: &str) -> String {
    match code {
        Some(code) => format!("authentication failed ({}): {}", code, message),
        None => format!("authentication failed: {}", message),
    }
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn config(message: impl Into<String>) -> Self {
        Error::Configuration(message.into())
    }

    pub fn auth(code: Option<String>, message: impl Into<String>) -> Self {
        Error::Auth {
            code,
            message: message.into(),
        }
    }

    /// Attach a path to an IO error.
    pub fn io_at(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::IoPath {
            path: path.into(),
            source,
        }
    }

    pub fn is_not_found(&self) -> bool {
        match self {
            Error::NotFound(_) => true,
            Error::Io(e) | Error::IoPath { source: e, .. } => {
                e.kind() == std::io::ErrorKind::NotFound
            }
            _ => false,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            // reqwest does not report the configured limit
            Error::Timeout(Duration::ZERO)
        } else {
            Error::Http(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_display_includes_code() {
        let err = Error::auth(Some("AADSTS70011".into()), "invalid scope");
        assert_eq!(
            err.to_string(),
            "authentication failed (AADSTS70011): invalid scope"
        );
        let err = Error::auth(None, "denied");
        assert_eq!(err.to_string(), "authentication failed: denied");
    }

    #[test]
    fn test_not_found_detection() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        assert!(Error::io_at("/tmp/x", io).is_not_found());
        assert!(Error::NotFound("cache".into()).is_not_found());
        assert!(!Error::Cancelled.is_not_found());
    }
}
