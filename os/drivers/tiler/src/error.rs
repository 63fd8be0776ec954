use tiler_container::{ContainerError, PageTableError, PinError};

/// Failures reported to callers of the allocator.
///
/// Every operation returning one of these has restored the state it found.
#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum TilerError {
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
    #[error("out of container or page memory")]
    OutOfMemory,
    #[error("no such block, buffer or process")]
    NotFound,
    #[error("access denied")]
    AccessDenied,
}

pub type Result<T> = core::result::Result<T, TilerError>;

impl From<ContainerError> for TilerError {
    fn from(_: ContainerError) -> Self {
        Self::OutOfMemory
    }
}

impl From<PageTableError> for TilerError {
    fn from(_: PageTableError) -> Self {
        Self::OutOfMemory
    }
}

impl From<PinError> for TilerError {
    fn from(err: PinError) -> Self {
        match err {
            PinError::Permission | PinError::Fault => Self::AccessDenied,
            PinError::NoMemory => Self::OutOfMemory,
        }
    }
}
