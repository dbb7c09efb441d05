//! Kustomization directives and the kustomize build collaborator
//!
//! A bootstrap run names one or more kustomizations (local paths or remote
//! URLs, optionally pinned to a git ref) and renders them into one
//! multi-document manifest. Rendering shells out to `kustomize build`;
//! the trait seam keeps the rest of the pipeline testable without the
//! binary or the network.

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use serde_json::Value;
use tokio::process::Command;
use tracing::{debug, info};

use crate::error::Error;
use crate::manifest::Manifest;

/// Kustomization used when the caller does not name one
pub const DEFAULT_KUSTOMIZATION: &str =
    "https://github.com/kyma-project/lifecycle-manager/config/default@main";

/// One parsed build directive
///
/// The raw form is `location` or `location@ref`, where location is a local
/// directory or a remote kustomization URL and ref is a git branch or tag.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Kustomization {
    /// Local path or remote URL to build
    pub location: String,
    /// Git ref for remote locations, when pinned
    pub reference: Option<String>,
}

impl Kustomization {
    /// Parse a raw directive of the form `location` or `location@ref`
    pub fn parse(raw: &str) -> Result<Self, Error> {
        let trimmed = raw.trim();
        let parts: Vec<&str> = trimmed.split('@').collect();

        match parts.as_slice() {
            [location] => {
                if location.is_empty() {
                    return Err(Error::directive(raw, "location is empty"));
                }
                Ok(Self {
                    location: (*location).to_string(),
                    reference: None,
                })
            }
            [location, reference] => {
                if location.is_empty() {
                    return Err(Error::directive(raw, "location is empty"));
                }
                if reference.is_empty() {
                    return Err(Error::directive(raw, "ref after '@' is empty"));
                }
                Ok(Self {
                    location: (*location).to_string(),
                    reference: Some((*reference).to_string()),
                })
            }
            _ => Err(Error::directive(raw, "more than one '@' separator")),
        }
    }

    /// The target argument handed to `kustomize build`
    ///
    /// A pinned ref becomes a `?ref=` query on the location, which is how
    /// kustomize addresses remote revisions.
    pub fn build_target(&self) -> String {
        match &self.reference {
            Some(reference) => format!("{}?ref={}", self.location, reference),
            None => self.location.clone(),
        }
    }
}

/// A transformation applied to the parsed document stream between build
/// and apply
///
/// Filters run in registration order and may drop, rewrite or reorder
/// documents. The filtered stream is what gets applied and scanned, so a
/// filter that removes the Kyma CRD also changes the detection outcome.
pub trait ManifestFilter: Send + Sync {
    /// Transform the document stream, returning the documents to keep
    fn apply(&self, documents: Vec<Value>) -> Result<Vec<Value>, Error>;
}

/// Source of built manifests for the bootstrap pipeline
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ManifestSource: Send + Sync {
    /// Build the combined manifest for the given kustomizations, in order
    async fn build(&self, kustomizations: &[Kustomization]) -> Result<Manifest, Error>;
}

/// Manifest source backed by the `kustomize` binary
pub struct KustomizeBuild {
    binary: String,
    filters: Vec<Box<dyn ManifestFilter>>,
}

impl KustomizeBuild {
    /// Create a source that invokes `kustomize` from PATH
    pub fn new() -> Self {
        Self {
            binary: "kustomize".to_string(),
            filters: Vec::new(),
        }
    }

    /// Create a source that invokes a specific kustomize binary
    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            filters: Vec::new(),
        }
    }

    /// Register a filter to run over the built document stream
    pub fn add_filter(mut self, filter: Box<dyn ManifestFilter>) -> Self {
        self.filters.push(filter);
        self
    }

    async fn build_one(&self, kustomization: &Kustomization) -> Result<String, Error> {
        let target = kustomization.build_target();
        debug!(target = %target, "running kustomize build");

        let output = Command::new(&self.binary)
            .arg("build")
            .arg(&target)
            .output()
            .await
            .map_err(|e| Error::build(format!("failed to run {}: {}", self.binary, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::build(format!(
                "kustomize build {} failed: {}",
                target,
                stderr.trim()
            )));
        }

        String::from_utf8(output.stdout)
            .map_err(|e| Error::build(format!("kustomize build {} produced non-UTF-8: {}", target, e)))
    }

    /// Parse the built text, run every filter, and re-render the stream.
    ///
    /// Only called when filters are registered; an unfiltered build keeps
    /// the kustomize output byte for byte.
    fn run_filters(&self, text: &str) -> Result<String, Error> {
        let mut documents: Vec<Value> = Vec::new();
        for chunk in text.split("\n---") {
            let chunk = chunk.trim();
            if !chunk.contains("apiVersion") {
                continue;
            }
            documents.push(
                serde_yaml::from_str(chunk)
                    .map_err(|e| Error::serialization(format!("filter input: {}", e)))?,
            );
        }

        for filter in &self.filters {
            documents = filter.apply(documents)?;
        }

        let mut rendered = Vec::with_capacity(documents.len());
        for document in &documents {
            rendered.push(
                serde_yaml::to_string(document)
                    .map_err(|e| Error::serialization(format!("filter output: {}", e)))?,
            );
        }
        Ok(rendered.join("---\n"))
    }
}

impl Default for KustomizeBuild {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ManifestSource for KustomizeBuild {
    async fn build(&self, kustomizations: &[Kustomization]) -> Result<Manifest, Error> {
        let mut manifest = Manifest::default();
        for kustomization in kustomizations {
            let text = self.build_one(kustomization).await?;
            manifest.append_document(text.trim_end());
        }

        if !self.filters.is_empty() {
            manifest = Manifest::new(self.run_filters(manifest.as_str())?);
        }

        info!(
            kustomizations = kustomizations.len(),
            bytes = manifest.as_str().len(),
            "built manifests"
        );
        Ok(manifest)
    }
}
