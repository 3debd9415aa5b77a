//! Error types for linkhook

use std::fmt;
use std::io;

#[derive(Debug)]
pub enum LinkhookError {
    /// IO error
    Io(io::Error),
    /// networkctl query failed, interface directory could not be rebuilt
    DirectoryUnavailable(String),
    /// Event references an interface the directory does not know
    UnknownInterface(String),
    /// Hook script failed the ownership/executable checks
    PermissionDenied(String),
    /// Parse error
    ParseError(String),
    /// D-Bus error
    Bus(String),
}

impl fmt::Display for LinkhookError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkhookError::Io(e) => write!(f, "IO error: {}", e),
            LinkhookError::DirectoryUnavailable(msg) => {
                write!(f, "Interface directory unavailable: {}", msg)
            }
            LinkhookError::UnknownInterface(name) => write!(f, "Unknown interface: {}", name),
            LinkhookError::PermissionDenied(msg) => write!(f, "Permission denied: {}", msg),
            LinkhookError::ParseError(msg) => write!(f, "Parse error: {}", msg),
            LinkhookError::Bus(msg) => write!(f, "D-Bus error: {}", msg),
        }
    }
}

impl std::error::Error for LinkhookError {}

impl From<io::Error> for LinkhookError {
    fn from(error: io::Error) -> Self {
        LinkhookError::Io(error)
    }
}

impl From<serde_json::Error> for LinkhookError {
    fn from(error: serde_json::Error) -> Self {
        LinkhookError::ParseError(error.to_string())
    }
}

impl From<zbus::Error> for LinkhookError {
    fn from(error: zbus::Error) -> Self {
        LinkhookError::Bus(error.to_string())
    }
}

pub type LinkhookResult<T> = Result<T, LinkhookError>;
