use thiserror::Error;

/// Rejection of a device operation before anything is dispatched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeviceError {
    #[error("no input with index {index} ({count} configured)")]
    UnknownInput { index: usize, count: usize },
}
