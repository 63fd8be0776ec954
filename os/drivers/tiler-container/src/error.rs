#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum ContainerError {
    #[error("no free slots for the requested area")]
    NoSpace,
    #[error("area is not reserved in this container")]
    InvalidArea,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum PageTableError {
    #[error("out of physical pages")]
    OutOfPages,
    #[error("failed to program the page table")]
    CommitFailed,
    #[error("operation not supported by this page table programmer")]
    Unsupported,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum PinError {
    #[error("user pages are not accessible")]
    Permission,
    #[error("out of memory while pinning user pages")]
    NoMemory,
    #[error("fault while pinning user pages")]
    Fault,
}
