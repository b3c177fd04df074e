pub mod error;
pub mod types;

mod linalg;

#[cfg(feature = "statistics")]
pub mod statistics;

#[cfg(feature = "optimization")]
pub mod optimization;

#[cfg(feature = "pipeline")]
pub mod pipeline;

pub use error::AllocationError;
pub use types::*;

/// Standard result type for all allocator operations
pub type AllocResult<T> = Result<T, AllocationError>;
