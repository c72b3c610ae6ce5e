//! Error taxonomy shared by tiers, the chain engine, and both facades.

use thiserror::Error;

/// Every failure the engine can surface.
///
/// Tier-level errors bubble up through the chain unchanged; the FUSE layer
/// collapses them to errnos via [`FsError::errno`], the HTTP facade to status
/// codes in `server`.
#[derive(Debug, Error)]
pub enum FsError {
    #[error("no such file or directory: {0}")]
    NotFound(String),

    #[error("not a directory: {0}")]
    NotADirectory(String),

    #[error("is a directory: {0}")]
    IsADirectory(String),

    /// The tier lacks the capability for the requested operation.
    #[error("filesystem does not support this operation")]
    Unsupported,

    /// The path is locked in a way that excludes the caller.
    #[error("file is locked")]
    Busy,

    #[error("lock belongs to a different process")]
    NotOwner,

    #[error("file is not locked")]
    NotLocked,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Bad request body or parameters.
    #[error("malformed request: {0}")]
    Malformed(String),

    /// HTTP failure between a remote mount and the server node.
    #[error("transport error: {0}")]
    Transport(String),
}

impl FsError {
    /// Classify a raw filesystem error against the path that produced it.
    #[must_use]
    pub fn from_io(path: &str, err: std::io::Error) -> Self {
        use std::io::ErrorKind;

        match err.kind() {
            ErrorKind::NotFound => Self::NotFound(path.to_owned()),
            ErrorKind::NotADirectory => Self::NotADirectory(path.to_owned()),
            ErrorKind::IsADirectory => Self::IsADirectory(path.to_owned()),
            _ => Self::Io(err),
        }
    }

    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// The errno the FUSE layer replies with for this error.
    #[must_use]
    pub fn errno(&self) -> i32 {
        match self {
            Self::NotFound(_) => libc::ENOENT,
            Self::NotADirectory(_) => libc::ENOTDIR,
            Self::IsADirectory(_) => libc::EISDIR,
            Self::Unsupported => libc::EPERM,
            Self::Busy | Self::NotOwner | Self::NotLocked => libc::EACCES,
            Self::Io(e) => e.raw_os_error().unwrap_or(libc::EIO),
            Self::Malformed(_) => libc::EINVAL,
            Self::Transport(_) => libc::EIO,
        }
    }
}

impl From<FsError> for i32 {
    fn from(e: FsError) -> Self {
        e.errno()
    }
}
