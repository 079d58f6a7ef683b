pub mod config;
pub mod error;
pub mod types;

pub use error::{BndlError, BndlResult};
pub use types::{BundleDescriptor, COMPRESSION_PACKED, FRAME_OVERHEAD, HASH_SIZE, HEADER_SIZE};
