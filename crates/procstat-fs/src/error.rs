//! Error types for the statistics tree
//!
//! Every error maps onto the errno the FUSE adapter replies with, see
//! [`StatsError::errno`].

use thiserror::Error;

/// Errors produced by the tree, the protocol handlers and the mount layer
#[derive(Debug, Error)]
pub enum StatsError {
    /// Name or handle does not resolve to a registered item
    #[error("No such registered item")]
    NotFound,

    /// A registered sibling already uses this name
    #[error("An item named {0:?} already exists")]
    AlreadyExists(String),

    /// Bad parent or bad name
    #[error("Invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// Directory operation on a leaf
    #[error("Item is not a directory")]
    NotADirectory,

    /// File operation on a directory
    #[error("Item is a directory")]
    IsADirectory,

    /// Allocation failed while creating an item or building a listing
    #[error("Out of memory")]
    OutOfMemory,

    /// The kernel released more references than it holds.
    ///
    /// The tree and the kernel have diverged; the session must not go on.
    #[error("Protocol violation on handle {handle:#x}: released {released}, outstanding {outstanding}")]
    ProtocolViolation {
        handle: u64,
        released: u64,
        outstanding: u64,
    },

    /// Mount point creation or FUSE session setup failed
    #[error("Mount failed: {0}")]
    Mount(#[from] std::io::Error),
}

impl StatsError {
    /// The errno reported to the kernel for this error
    pub fn errno(&self) -> libc::c_int {
        match self {
            Self::NotFound => libc::ENOENT,
            Self::AlreadyExists(_) => libc::EEXIST,
            Self::InvalidArgument(_) => libc::EINVAL,
            Self::NotADirectory => libc::ENOTDIR,
            Self::IsADirectory => libc::EISDIR,
            Self::OutOfMemory => libc::ENOMEM,
            Self::ProtocolViolation { .. } => libc::EIO,
            Self::Mount(e) => e.raw_os_error().unwrap_or(libc::EIO),
        }
    }
}

/// Result type for statistics operations
pub type StatsResult<T> = Result<T, StatsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_errno_mapping() {
        assert_eq!(StatsError::NotFound.errno(), libc::ENOENT);
        assert_eq!(StatsError::AlreadyExists("x".into()).errno(), libc::EEXIST);
        assert_eq!(StatsError::InvalidArgument("bad").errno(), libc::EINVAL);
        assert_eq!(StatsError::OutOfMemory.errno(), libc::ENOMEM);
        let io = std::io::Error::from_raw_os_error(libc::EPERM);
        assert_eq!(StatsError::from(io).errno(), libc::EPERM);
    }
}
