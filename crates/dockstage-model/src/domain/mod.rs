mod image_ref;
pub use image_ref::{DEFAULT_REGISTRY, DEFAULT_TAG, ImageRef};

mod registry_address;
pub use registry_address::RegistryAddress;

mod execution_metadata;
pub use execution_metadata::{ExecutionMetadata, ExposedPort};

mod staging_result;
pub use staging_result::StagingResult;

/// Timeout value in milliseconds.
pub type TimeoutMs = u64;
