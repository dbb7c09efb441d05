//! Ordered server-side apply of built manifests
//!
//! Documents are applied strictly in manifest order, one at a time. Each
//! document gets its own retry budget for transient API failures; the
//! first definitive failure stops the rollout so later documents never
//! land on top of a broken prerequisite.

use std::time::Duration;

use kube::api::DynamicObject;
use tracing::info;

use crate::cluster::ClusterApi;
use crate::error::Error;
use crate::manifest::Manifest;
use crate::retry::{retry_with_backoff, RetryConfig};

/// Default number of retries after the first failed apply attempt
pub const DEFAULT_APPLY_RETRIES: u32 = 3;
/// Default delay before the first apply retry
pub const DEFAULT_INITIAL_BACKOFF: Duration = Duration::from_secs(1);

/// Options governing how manifest documents are applied
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ApplyOptions {
    /// Submit server-side dry-run requests instead of persisting changes
    pub dry_run: bool,
    /// Take ownership of fields held by other field managers
    pub force: bool,
    /// Retries after the first attempt, per document
    pub max_retries: u32,
    /// Delay before the first retry, doubled after each failure
    pub initial_backoff: Duration,
}

impl Default for ApplyOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            force: false,
            max_retries: DEFAULT_APPLY_RETRIES,
            initial_backoff: DEFAULT_INITIAL_BACKOFF,
        }
    }
}

impl ApplyOptions {
    /// The retry schedule used for each document
    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.max_retries.saturating_add(1),
            initial_delay: self.initial_backoff,
            ..RetryConfig::default()
        }
    }
}

/// Apply every document of the manifest, in order.
///
/// Returns the server's view of each applied object, in the same order as
/// the input documents. On failure the error names the document position
/// and resource identity; documents after it are left untouched.
pub async fn apply_manifests(
    cluster: &dyn ClusterApi,
    manifest: &Manifest,
    options: &ApplyOptions,
) -> Result<Vec<DynamicObject>, Error> {
    let documents = manifest.documents()?;
    let retry = options.retry_config();
    let mut applied = Vec::with_capacity(documents.len());

    for document in &documents {
        let operation = format!("apply {}/{}", document.kind, document.name);
        let object = retry_with_backoff(&retry, &operation, || cluster.apply(document, options))
            .await
            .map_err(|e| {
                Error::apply_failed(document.index, &document.kind, &document.name, e.to_string())
            })?;
        applied.push(object);
    }

    info!(
        documents = applied.len(),
        dry_run = options.dry_run,
        "applied manifest documents"
    );
    Ok(applied)
}
