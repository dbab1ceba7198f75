use serde::Serialize;
use std::fmt::Display;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Usage,
    Config,
    Remote,
    Io,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    Success = 0,
    Usage = 2,
    Config = 3,
    Remote = 4,
    Io = 5,
}

impl ExitCode {
    pub fn as_i32(self) -> i32 {
        self as i32
    }
}

#[derive(Debug, Clone, thiserror::Error, Serialize)]
#[error("{message}")]
pub struct CairnError {
    pub kind: ErrorKind,
    pub message: String,
}

impl CairnError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn usage(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Usage, message)
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Config, message)
    }

    pub fn remote(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Remote, message)
    }

    pub fn io(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Io, message)
    }

    pub fn exit_code(&self) -> ExitCode {
        match self.kind {
            ErrorKind::Usage => ExitCode::Usage,
            ErrorKind::Config => ExitCode::Config,
            ErrorKind::Remote => ExitCode::Remote,
            ErrorKind::Io => ExitCode::Io,
        }
    }
}

impl From<std::io::Error> for CairnError {
    fn from(value: std::io::Error) -> Self {
        Self::io(value.to_string())
    }
}

impl From<&str> for CairnError {
    fn from(value: &str) -> Self {
        Self::usage(value)
    }
}

impl From<String> for CairnError {
    fn from(value: String) -> Self {
        Self::usage(value)
    }
}

impl<T: Display> From<(ErrorKind, T)> for CairnError {
    fn from((kind, value): (ErrorKind, T)) -> Self {
        Self::new(kind, value.to_string())
    }
}

pub type CairnResult<T> = Result<T, CairnError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_follow_error_kind() {
        assert_eq!(CairnError::usage("x").exit_code(), ExitCode::Usage);
        assert_eq!(CairnError::config("x").exit_code().as_i32(), 3);
        assert_eq!(CairnError::remote("x").exit_code().as_i32(), 4);
        assert_eq!(CairnError::io("x").exit_code().as_i32(), 5);
        assert_eq!(ExitCode::Success.as_i32(), 0);
    }

    #[test]
    fn io_errors_convert_to_io_kind() {
        let error: CairnError =
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied").into();
        assert_eq!(error.kind, ErrorKind::Io);
        assert!(error.message.contains("denied"));
    }
}
