//! Download/verify/retry orchestrator.
//!
//! For one catalog's worth of bundle descriptors:
//!   1. pre-create every parent directory the relative paths imply
//!   2. size-verify already-materialized files (up to N workers)
//!   3. download, unpack, and persist missing or stale bundles (N workers)
//!   4. while a pass leaves failures behind, retry just those bundles with
//!      concurrency reduced to 1, until a pass comes back clean or the
//!      configured pass ceiling is hit
//!
//! A failing bundle never aborts the batch; only output-root creation is
//! fatal here. Decryption is CPU-bound and per-bundle-keyed, so the only
//! parallelism is across bundles, never inside one keystream.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use bndl_core::{BndlError, BndlResult, BundleDescriptor};

use crate::transport::Transport;

/// Shared pass progress, polled by an external observer (progress bar,
/// log reporter) while workers update it.
///
/// `completed` moves forward exactly once per finished operation within a
/// pass and is reset only at pass boundaries.
#[derive(Debug, Default)]
pub struct Progress {
    completed: AtomicU64,
    total: AtomicU64,
}

impl Progress {
    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }

    pub fn total(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }

    fn begin_pass(&self, total: u64) {
        self.total.store(total, Ordering::Relaxed);
        self.completed.store(0, Ordering::Relaxed);
    }

    fn record_one(&self) {
        self.completed.fetch_add(1, Ordering::Relaxed);
    }
}

/// Outcome of a full orchestrator run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownloadStats {
    /// Pre-existing files whose size already matched the expected
    /// plaintext size.
    pub verified_ok: usize,
    /// Bundles fetched, decrypted, and persisted (each counted once, on
    /// whichever pass finally succeeded).
    pub downloaded: usize,
    /// Download passes executed (1 = no retries were needed, 0 = nothing
    /// to download).
    pub passes: u32,
}

pub struct Downloader<T> {
    transport: Arc<T>,
    output_root: PathBuf,
    workers: usize,
    max_passes: u32,
    progress: Arc<Progress>,
}

impl<T: Transport> Downloader<T> {
    /// `workers` caps concurrent bundles per pass; 0 means the CPU count.
    pub fn new(transport: T, output_root: impl Into<PathBuf>, workers: usize) -> Self {
        let workers = if workers == 0 {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4)
        } else {
            workers
        };
        Self {
            transport: Arc::new(transport),
            output_root: output_root.into(),
            workers,
            max_passes: 0,
            progress: Arc::new(Progress::default()),
        }
    }

    /// Ceiling on download passes, counting the first (0 = retry until a
    /// pass comes back clean).
    pub fn with_max_passes(mut self, max_passes: u32) -> Self {
        self.max_passes = max_passes;
        self
    }

    /// Handle for observers; safe to read concurrently with a run.
    pub fn progress(&self) -> Arc<Progress> {
        self.progress.clone()
    }

    /// Materialize every bundle's plaintext at `output_root/relative_path`.
    pub async fn run(&self, bundles: &[BundleDescriptor]) -> Result<DownloadStats> {
        self.prepare_directories(bundles).await?;

        let (verified_ok, mut pending) = self.verify_existing(bundles).await;
        if verified_ok > 0 {
            info!(current = verified_ok, stale_or_missing = pending.len(), "verification pass done");
        }

        let mut stats = DownloadStats {
            verified_ok,
            downloaded: 0,
            passes: 0,
        };
        let mut workers = self.workers;

        while !pending.is_empty() {
            if self.max_passes != 0 && stats.passes >= self.max_passes {
                anyhow::bail!(
                    "{} bundles still failing after {} passes",
                    pending.len(),
                    stats.passes
                );
            }
            stats.passes += 1;
            info!(pass = stats.passes, pending = pending.len(), workers, "download pass");

            let failed = self.download_pass(&pending, workers).await;
            stats.downloaded += pending.len() - failed.len();

            if failed.is_empty() {
                break;
            }
            warn!(
                pass = stats.passes,
                failed = failed.len(),
                "pass left failures behind, retrying single-threaded"
            );
            pending = failed;
            workers = 1;
        }

        Ok(stats)
    }

    /// Create the output root and every distinct parent directory before
    /// any fetch begins, so workers never race on directory creation.
    async fn prepare_directories(&self, bundles: &[BundleDescriptor]) -> Result<()> {
        tokio::fs::create_dir_all(&self.output_root)
            .await
            .with_context(|| format!("creating output root: {}", self.output_root.display()))?;

        let parents: BTreeSet<PathBuf> = bundles
            .iter()
            .filter_map(|d| self.target_path(d).parent().map(Path::to_path_buf))
            .collect();

        for dir in parents {
            tokio::fs::create_dir_all(&dir)
                .await
                .with_context(|| format!("creating dir: {}", dir.display()))?;
        }
        Ok(())
    }

    /// Size-check files that already exist; anything missing or with an
    /// unexpected size is queued for (re)download. Runs only when at
    /// least one target file is already materialized.
    async fn verify_existing(
        &self,
        bundles: &[BundleDescriptor],
    ) -> (usize, Vec<BundleDescriptor>) {
        let mut existing = Vec::new();
        let mut pending = Vec::new();
        for desc in bundles {
            if self.target_path(desc).exists() {
                existing.push(desc.clone());
            } else {
                pending.push(desc.clone());
            }
        }
        if existing.is_empty() {
            return (0, pending);
        }

        let existing_count = existing.len();
        self.progress.begin_pass(existing_count as u64);
        let semaphore = Arc::new(Semaphore::new(self.workers));
        let stale: Arc<Mutex<Vec<BundleDescriptor>>> = Arc::new(Mutex::new(Vec::new()));

        let mut handles = Vec::with_capacity(existing.len());
        for desc in existing {
            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .expect("semaphore closed");
            let path = self.target_path(&desc);
            let stale = stale.clone();
            let progress = self.progress.clone();

            handles.push(tokio::spawn(async move {
                let _permit = permit;
                let expected = desc.plaintext_size();
                let current = tokio::fs::metadata(&path).await.map(|m| m.len());
                match current {
                    Ok(size) if size == expected => {
                        debug!(path = %path.display(), size, "verified");
                    }
                    Ok(size) => {
                        debug!(path = %path.display(), size, expected, "stale, queueing redownload");
                        stale.lock().expect("stale-set lock poisoned").push(desc);
                    }
                    Err(err) => {
                        debug!(path = %path.display(), error = %err, "unreadable, queueing redownload");
                        stale.lock().expect("stale-set lock poisoned").push(desc);
                    }
                }
                // exactly one increment per completed verification
                progress.record_one();
            }));
        }
        for handle in handles {
            if let Err(err) = handle.await {
                warn!(error = %err, "verification worker panicked");
            }
        }

        let stale = std::mem::take(&mut *stale.lock().expect("stale-set lock poisoned"));
        let verified_ok = existing_count - stale.len();
        pending.extend(stale);
        (verified_ok, pending)
    }

    /// One bounded-concurrency download pass; returns the failed set.
    async fn download_pass(
        &self,
        pending: &[BundleDescriptor],
        workers: usize,
    ) -> Vec<BundleDescriptor> {
        self.progress.begin_pass(pending.len() as u64);
        let semaphore = Arc::new(Semaphore::new(workers));
        let failed: Arc<Mutex<Vec<BundleDescriptor>>> = Arc::new(Mutex::new(Vec::new()));

        let mut handles = Vec::with_capacity(pending.len());
        for desc in pending {
            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .expect("semaphore closed");
            let desc = desc.clone();
            let target = self.target_path(&desc);
            let transport = self.transport.clone();
            let failed = failed.clone();
            let progress = self.progress.clone();

            handles.push(tokio::spawn(async move {
                let _permit = permit; // released when the bundle completes
                match materialize(transport.as_ref(), &desc, &target).await {
                    Ok(bytes) => {
                        debug!(path = %desc.relative_path, bytes, "materialized");
                        progress.record_one();
                    }
                    Err(err) => {
                        match &err {
                            // may indicate a key-derivation fault rather
                            // than a transient failure
                            BndlError::ProtocolCorruption(_) => {
                                warn!(path = %desc.relative_path, error = %err, "decode failure")
                            }
                            _ => {
                                warn!(path = %desc.relative_path, error = %err, "bundle failed, will retry")
                            }
                        }
                        failed.lock().expect("failed-set lock poisoned").push(desc);
                    }
                }
            }));
        }
        for handle in handles {
            if let Err(err) = handle.await {
                warn!(error = %err, "download worker panicked");
            }
        }

        let result = std::mem::take(&mut *failed.lock().expect("failed-set lock poisoned"));
        result
    }

    fn target_path(&self, desc: &BundleDescriptor) -> PathBuf {
        self.output_root.join(&desc.relative_path)
    }
}

/// Fetch → unpack → persist one bundle; returns the plaintext byte count.
async fn materialize<T: Transport>(
    transport: &T,
    desc: &BundleDescriptor,
    target: &Path,
) -> BndlResult<u64> {
    let raw = transport.fetch(&desc.relative_path).await?;
    let plain = bndl_crypto::unpack(desc, &raw)?;
    let bytes = plain.len() as u64;
    tokio::fs::write(target, plain).await?;
    Ok(bytes)
}
