use std::{fmt, io};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The machine-readable error kind surfaced across the query façade (§6.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidParams,
    NotFound,
    NodeExists,
    LinkIntegrity,
    ProviderError,
}

#[derive(Debug, Error)]
pub enum RouxError {
    #[error("invalid parameters: {0}")]
    InvalidParams(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("node already exists: {0}")]
    NodeExists(String),
    #[error("link integrity violation: {0}")]
    LinkIntegrity(String),
    #[error("provider unavailable: {0}")]
    ProviderError(String),
    #[error("path escapes source root: {0}")]
    PathTraversal(String),
    #[error("cache error: {0}")]
    Cache(String),
    #[error("codec error: {0}")]
    Codec(String),
    #[error("I/O error: {0}")]
    Io(String),
    #[error("permission denied")]
    PermissionDenied,
    #[error("(de)serialization error: {0}")]
    Serialization(String),
}

impl RouxError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RouxError::InvalidParams(_) => ErrorKind::InvalidParams,
            RouxError::NotFound(_) => ErrorKind::NotFound,
            RouxError::NodeExists(_) => ErrorKind::NodeExists,
            RouxError::LinkIntegrity(_) => ErrorKind::LinkIntegrity,
            RouxError::ProviderError(_) => ErrorKind::ProviderError,
            RouxError::PathTraversal(_) => ErrorKind::InvalidParams,
            RouxError::Cache(_)
            | RouxError::Codec(_)
            | RouxError::Io(_)
            | RouxError::PermissionDenied
            | RouxError::Serialization(_) => ErrorKind::ProviderError,
        }
    }
}

impl From<io::Error> for RouxError {
    fn from(x: io::Error) -> Self {
        match x.kind() {
            io::ErrorKind::NotFound => RouxError::NotFound(format!("{x}")),
            io::ErrorKind::PermissionDenied => RouxError::PermissionDenied,
            _ => RouxError::Io(format!("{}: {x}", x.kind())),
        }
    }
}

impl From<fmt::Error> for RouxError {
    fn from(x: fmt::Error) -> Self {
        RouxError::Codec(format!("{x}"))
    }
}

impl From<serde_json::Error> for RouxError {
    fn from(x: serde_json::Error) -> Self {
        RouxError::Serialization(format!("JSON (de)serialization error: {x}"))
    }
}

impl From<serde_yaml::Error> for RouxError {
    fn from(x: serde_yaml::Error) -> Self {
        RouxError::Serialization(format!("YAML (de)serialization error: {x}"))
    }
}

impl From<toml::de::Error> for RouxError {
    fn from(x: toml::de::Error) -> Self {
        RouxError::Serialization(format!("TOML deserialization error: {x}"))
    }
}

impl From<toml::ser::Error> for RouxError {
    fn from(x: toml::ser::Error) -> Self {
        RouxError::Serialization(format!("TOML serialization error: {x}"))
    }
}

impl From<notify::Error> for RouxError {
    fn from(x: notify::Error) -> Self {
        use notify::ErrorKind as NotifyErrorKind;
        match x.kind {
            NotifyErrorKind::PathNotFound => {
                RouxError::NotFound(format!("watch path(s) not found: {:?}", x.paths))
            }
            NotifyErrorKind::MaxFilesWatch => {
                RouxError::Io("file watcher hit the max-files-watched limit".into())
            }
            _ => RouxError::Io(format!("watcher error: {x}")),
        }
    }
}

impl From<sqlx::Error> for RouxError {
    fn from(x: sqlx::Error) -> Self {
        RouxError::Cache(format!("{x}"))
    }
}

impl From<sqlx::migrate::MigrateError> for RouxError {
    fn from(x: sqlx::migrate::MigrateError) -> Self {
        RouxError::Cache(format!("migration failed: {x}"))
    }
}

impl From<tokio::sync::mpsc::error::SendError<crate::watch::RawFsEvent>> for RouxError {
    fn from(x: tokio::sync::mpsc::error::SendError<crate::watch::RawFsEvent>) -> Self {
        RouxError::Io(format!("watcher channel closed while sending {:?}", x.0))
    }
}
