use crate::cloud::PlyError;

/// Errors surfaced by the sort subsystem and its collaborators.
#[derive(Debug)]
pub enum SortError {
    /// No compatible GPU adapter was found.
    NoAdapter(String),
    RequestDevice(String),
    /// The device went away; everything built on it must be recreated.
    DeviceLost(String),
    CapacityExceeded { count: usize, capacity: u32 },
    /// More splats than a `u32` index can address.
    TooManySplats(usize),
    InvalidConfig(String),
    Ply(PlyError),
    BufferMap(String),
}

impl std::fmt::Display for SortError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SortError::NoAdapter(s) => write!(f, "No GPU adapter: {}", s),
            SortError::RequestDevice(s) => write!(f, "Device request failed: {}", s),
            SortError::DeviceLost(s) => write!(f, "GPU device lost: {}", s),
            SortError::CapacityExceeded { count, capacity } => write!(
                f,
                "Point cloud has {} splats but sort capacity is {}",
                count, capacity
            ),
            SortError::TooManySplats(n) => {
                write!(f, "{} splats cannot be indexed with 32-bit indices", n)
            }
            SortError::InvalidConfig(s) => write!(f, "Invalid sort configuration: {}", s),
            SortError::Ply(e) => write!(f, "{}", e),
            SortError::BufferMap(s) => write!(f, "Buffer mapping failed: {}", s),
        }
    }
}

impl std::error::Error for SortError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SortError::Ply(e) => Some(e),
            _ => None,
        }
    }
}

impl From<PlyError> for SortError {
    fn from(e: PlyError) -> Self {
        SortError::Ply(e)
    }
}

impl From<wgpu::RequestAdapterError> for SortError {
    fn from(e: wgpu::RequestAdapterError) -> Self {
        SortError::NoAdapter(e.to_string())
    }
}

impl From<wgpu::RequestDeviceError> for SortError {
    fn from(e: wgpu::RequestDeviceError) -> Self {
        SortError::RequestDevice(e.to_string())
    }
}

impl From<wgpu::BufferAsyncError> for SortError {
    fn from(e: wgpu::BufferAsyncError) -> Self {
        SortError::BufferMap(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SortError>;
