pub mod config;
pub mod resource;
pub mod resource_limits;
pub mod snapshot;
pub mod utils;

pub use pulsevm_error::{ChainError, ErrorSeverity, Resource};
pub use pulsevm_name::Name;
pub use resource_limits::ResourceLimitsManager;
