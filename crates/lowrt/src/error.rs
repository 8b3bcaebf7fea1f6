use std::fmt;

/// Coarse classification of a raw OS code. The raw code always travels with it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    AlreadyExists,
    PermissionDenied,
    Interrupted,
    Unsupported,
    Other,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::NotFound => "not found",
            ErrorKind::AlreadyExists => "already exists",
            ErrorKind::PermissionDenied => "permission denied",
            ErrorKind::Interrupted => "interrupted",
            ErrorKind::Unsupported => "unsupported",
            ErrorKind::Other => "os error",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("{kind} (raw code {code})")]
    Os { kind: ErrorKind, code: i32 },
    #[error("child process exited with status {code}")]
    Exit { code: i32 },
    #[error("child process terminated by signal {signal}")]
    Signaled { signal: i32 },
}

impl Error {
    pub fn os(kind: ErrorKind, code: i32) -> Self {
        Error::Os { kind, code }
    }

    /// Kind of an OS failure; `None` for child-exit errors.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            Error::Os { kind, .. } => Some(*kind),
            Error::Exit { .. } | Error::Signaled { .. } => None,
        }
    }

    pub fn raw_code(&self) -> Option<i32> {
        match self {
            Error::Os { code, .. } => Some(*code),
            Error::Exit { .. } | Error::Signaled { .. } => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == Some(ErrorKind::NotFound)
    }

    pub fn is_already_exists(&self) -> bool {
        self.kind() == Some(ErrorKind::AlreadyExists)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
