//! Fetch transport: whole-payload retrieval from the delivery endpoint.
//!
//! The transport performs no retries of its own; failure recovery runs
//! at whole-bundle granularity in the orchestrator. The trait seam keeps
//! the orchestrator testable against an in-process fake.

use std::future::Future;
use std::sync::Arc;

use anyhow::{Context, Result};
use opendal::Operator;

use bndl_core::{BndlError, BndlResult};

/// Whole-payload fetch by endpoint-relative path.
pub trait Transport: Send + Sync + 'static {
    fn fetch(&self, rel_path: &str) -> impl Future<Output = BndlResult<Vec<u8>>> + Send;
}

impl<T: Transport> Transport for Arc<T> {
    fn fetch(&self, rel_path: &str) -> impl Future<Output = BndlResult<Vec<u8>>> + Send {
        (**self).fetch(rel_path)
    }
}

/// OpenDAL-backed transport over a read-only HTTP endpoint.
///
/// The operator's connection pool is shared across all workers; the
/// transport itself holds no mutable state.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    op: Operator,
}

impl HttpTransport {
    pub fn new(base_url: &str) -> Result<Self> {
        let builder = opendal::services::Http::default().endpoint(base_url);

        let op = Operator::new(builder)
            .context("creating OpenDAL HTTP operator")?
            .layer(opendal::layers::LoggingLayer::default())
            .finish();

        Ok(Self { op })
    }
}

impl Transport for HttpTransport {
    async fn fetch(&self, rel_path: &str) -> BndlResult<Vec<u8>> {
        let buf = self
            .op
            .read(rel_path)
            .await
            .map_err(|e| BndlError::Transport(format!("{rel_path}: {e}")))?;
        Ok(buf.to_bytes().to_vec())
    }
}
