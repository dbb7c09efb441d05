//! Error types for the bootstrap pipeline
//!
//! Errors are structured with fields to aid debugging in production.
//! Each variant carries the context a failed bootstrap needs to report:
//! document indexes, resource identities, and underlying causes.

use std::time::Duration;

use thiserror::Error;

/// Namespace filler for deployment errors when the object carries none
pub const UNKNOWN_NAMESPACE: &str = "unknown";

/// Main error type for bootstrap operations
#[derive(Debug, Error)]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {source}")]
    Kube {
        /// The underlying kube-rs error
        #[from]
        source: kube::Error,
    },

    /// Cluster connection configuration error
    #[error("kubeconfig error: {message}")]
    Config {
        /// Description of what failed
        message: String,
    },

    /// A kustomization directive could not be parsed
    #[error("invalid kustomization '{directive}': {message}")]
    Directive {
        /// The raw directive as given on the command line
        directive: String,
        /// Description of what's invalid
        message: String,
    },

    /// Manifest generation failed before anything touched the cluster
    #[error("manifest build error: {message}")]
    Build {
        /// Description of what failed
        message: String,
    },

    /// YAML/JSON processing error
    #[error("serialization error{}: {message}", document_label(.document))]
    Serialization {
        /// Description of what failed
        message: String,
        /// Index of the manifest document being processed (if known)
        document: Option<usize>,
    },

    /// A manifest document could not be applied to the cluster
    #[error("apply error for document {index} ({kind}/{name}): {message}")]
    Apply {
        /// Zero-based index of the document in the built manifest
        index: usize,
        /// Resource kind of the failing document
        kind: String,
        /// Resource name of the failing document
        name: String,
        /// Description of what failed, after retries were exhausted
        message: String,
    },

    /// The kcp-mode patch could not be computed or submitted
    #[error("patch error for deployment {namespace}/{name}: {message}")]
    Patch {
        /// Namespace of the deployment being patched
        namespace: String,
        /// Name of the deployment being patched
        name: String,
        /// Description of what failed
        message: String,
    },

    /// A deployment never reported an Available condition within the deadline
    #[error("deployment {namespace}/{name} was not ready after {timeout:?}")]
    ReadinessTimeout {
        /// Namespace of the deployment that was watched
        namespace: String,
        /// Name of the deployment that was watched
        name: String,
        /// How long the prober waited
        timeout: Duration,
    },

    /// A deployment reported Available=False when the readiness deadline hit
    #[error("deployment {namespace}/{name} still reported Available=False at the readiness deadline")]
    ReadinessUnavailable {
        /// Namespace of the deployment that was watched
        namespace: String,
        /// Name of the deployment that was watched
        name: String,
    },

    /// The CRD detector could not inspect the manifest
    #[error("CRD detection error: {message}")]
    Detection {
        /// Description of what failed
        message: String,
    },
}

fn document_label(document: &Option<usize>) -> String {
    match document {
        Some(index) => format!(" in document {}", index),
        None => String::new(),
    }
}

impl Error {
    /// Create a configuration error with the given message
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a directive error for a raw kustomization string
    pub fn directive(directive: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Directive {
            directive: directive.into(),
            message: msg.into(),
        }
    }

    /// Create a build error with the given message
    pub fn build(msg: impl Into<String>) -> Self {
        Self::Build {
            message: msg.into(),
        }
    }

    /// Create a serialization error with the given message
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
            document: None,
        }
    }

    /// Create a serialization error tagged with a manifest document index
    pub fn serialization_in_document(index: usize, msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
            document: Some(index),
        }
    }

    /// Create an apply error for a specific manifest document
    pub fn apply_failed(
        index: usize,
        kind: impl Into<String>,
        name: impl Into<String>,
        msg: impl Into<String>,
    ) -> Self {
        Self::Apply {
            index,
            kind: kind.into(),
            name: name.into(),
            message: msg.into(),
        }
    }

    /// Create a patch error for a specific deployment
    pub fn patch_for(
        namespace: impl Into<String>,
        name: impl Into<String>,
        msg: impl Into<String>,
    ) -> Self {
        Self::Patch {
            namespace: namespace.into(),
            name: name.into(),
            message: msg.into(),
        }
    }

    /// Create a readiness timeout error for a specific deployment
    pub fn readiness_timeout(
        namespace: impl Into<String>,
        name: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self::ReadinessTimeout {
            namespace: namespace.into(),
            name: name.into(),
            timeout,
        }
    }

    /// Create a readiness error for a deployment that stayed unavailable
    pub fn readiness_unavailable(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self::ReadinessUnavailable {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Create a detection error with the given message
    pub fn detection(msg: impl Into<String>) -> Self {
        Self::Detection {
            message: msg.into(),
        }
    }

    /// Check if this error is worth another attempt
    ///
    /// Conflicts (409), throttling (429), server-side failures (5xx) and
    /// transport errors are transient. Other 4xx responses mean the request
    /// itself is wrong and will not succeed on a repeat. Pipeline errors
    /// (directives, builds, decoding, exhausted applies) are definitive.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Kube { source } => match source {
                kube::Error::Api(ae) => {
                    matches!(ae.code, 409 | 429) || ae.code >= 500
                }
                // Connection resets, timeouts, DNS hiccups
                _ => true,
            },
            Error::Config { .. } => false,
            Error::Directive { .. } => false,
            Error::Build { .. } => false,
            Error::Serialization { .. } => false,
            Error::Apply { .. } => false,
            Error::Patch { .. } => false,
            Error::ReadinessTimeout { .. } => false,
            Error::ReadinessUnavailable { .. } => false,
            Error::Detection { .. } => false,
        }
    }

    /// Get the deployment identity if this error is tied to one
    pub fn deployment(&self) -> Option<(&str, &str)> {
        match self {
            Error::Patch {
                namespace, name, ..
            }
            | Error::ReadinessTimeout {
                namespace, name, ..
            }
            | Error::ReadinessUnavailable {
                namespace, name, ..
            } => Some((namespace, name)),
            _ => None,
        }
    }

    /// Get the manifest document index if this error is tied to one
    pub fn document_index(&self) -> Option<usize> {
        match self {
            Error::Apply { index, .. } => Some(*index),
            Error::Serialization { document, .. } => *document,
            _ => None,
        }
    }
}
