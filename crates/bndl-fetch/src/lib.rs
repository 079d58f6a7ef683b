//! bndl-fetch: catalog provider, fetch transport, and the
//! download/verify/retry orchestrator that drives the container codec
//! across thousands of independent bundles.

pub mod catalog;
pub mod orchestrator;
pub mod transport;

pub use catalog::Catalog;
pub use orchestrator::{DownloadStats, Downloader, Progress};
pub use transport::{HttpTransport, Transport};
