//! Built manifest handling
//!
//! A bootstrap run produces one multi-document YAML stream. This module
//! owns that stream: splitting it into documents, extracting the identity
//! fields server-side apply needs, and appending extra documents without
//! corrupting the ones already there.

use kube::discovery::ApiResource;
use serde_json::Value;

use crate::error::Error;

/// A built multi-document YAML manifest.
///
/// The raw text is kept verbatim. CRD detection runs over exactly the
/// bytes the builder produced, so nothing in here re-serializes the
/// stream behind the caller's back.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Manifest {
    text: String,
}

impl Manifest {
    /// Create a manifest from already-built YAML text
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    /// The raw manifest text
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Append one more YAML document (or document group) to the stream.
    ///
    /// A `---` separator is inserted unless the current text already ends
    /// with one, so the appended document never merges into the previous one.
    pub fn append_document(&mut self, document: &str) {
        if !self.text.is_empty() {
            if !self.text.ends_with('\n') {
                self.text.push('\n');
            }
            if !self.text.trim_end().ends_with("---") {
                self.text.push_str("---\n");
            }
        }
        self.text.push_str(document);
        if !document.ends_with('\n') {
            self.text.push('\n');
        }
    }

    /// Split the stream into parsed documents, in input order.
    ///
    /// Chunks without an `apiVersion` (empty chunks, comment blocks) are
    /// skipped. Documents that do have one must parse and carry a kind and
    /// a metadata.name, otherwise the error names the document position.
    pub fn documents(&self) -> Result<Vec<ManifestDocument>, Error> {
        let mut documents = Vec::new();
        for chunk in self.text.split("\n---") {
            let chunk = chunk.trim();
            // Skip non-manifest documents (empty, comments-only, etc.)
            if !chunk.contains("apiVersion") {
                continue;
            }
            documents.push(ManifestDocument::parse(documents.len(), chunk)?);
        }
        Ok(documents)
    }
}

impl From<String> for Manifest {
    fn from(text: String) -> Self {
        Self::new(text)
    }
}

/// One parsed manifest document with the identity fields needed to apply it
#[derive(Debug, Clone, PartialEq)]
pub struct ManifestDocument {
    /// Zero-based position among the parseable documents of the stream
    pub index: usize,
    /// The parsed JSON value, submitted as the apply body
    pub value: Value,
    /// Full apiVersion string (e.g. "apps/v1")
    pub api_version: String,
    /// Resource kind (e.g. "Deployment")
    pub kind: String,
    /// Resource name from metadata.name
    pub name: String,
    /// Resource namespace, when the document carries one
    pub namespace: Option<String>,
}

impl ManifestDocument {
    /// Parse a single YAML document and extract its identity fields
    pub fn parse(index: usize, source: &str) -> Result<Self, Error> {
        let value: Value = serde_yaml::from_str(source)
            .map_err(|e| Error::serialization_in_document(index, format!("invalid YAML: {}", e)))?;

        let api_version = value
            .get("apiVersion")
            .and_then(|v| v.as_str())
            .ok_or_else(|| Error::serialization_in_document(index, "missing apiVersion"))?
            .to_string();

        let kind = value
            .get("kind")
            .and_then(|v| v.as_str())
            .ok_or_else(|| Error::serialization_in_document(index, "missing kind"))?
            .to_string();

        let name = value
            .pointer("/metadata/name")
            .and_then(|v| v.as_str())
            .ok_or_else(|| Error::serialization_in_document(index, "missing metadata.name"))?
            .to_string();

        let namespace = value
            .pointer("/metadata/namespace")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string());

        Ok(Self {
            index,
            value,
            api_version,
            kind,
            name,
            namespace,
        })
    }

    /// Build the ApiResource for this document
    pub fn api_resource(&self) -> ApiResource {
        build_api_resource(&self.api_version, &self.kind)
    }
}

/// Build an ApiResource from a known apiVersion and kind.
///
/// The version is used exactly as given, which is what server-side apply of
/// a rendered manifest wants: the document decides its own version.
pub fn build_api_resource(api_version: &str, kind: &str) -> ApiResource {
    let (group, version) = parse_api_version(api_version);
    ApiResource {
        group,
        version,
        kind: kind.to_string(),
        api_version: api_version.to_string(),
        plural: pluralize_kind(kind),
    }
}

/// Parse apiVersion into (group, version)
///
/// ```
/// use kyma_bootstrap::manifest::parse_api_version;
///
/// let (group, version) = parse_api_version("apps/v1");
/// assert_eq!(group, "apps");
/// assert_eq!(version, "v1");
///
/// let (group, version) = parse_api_version("v1");
/// assert_eq!(group, "");
/// assert_eq!(version, "v1");
/// ```
pub fn parse_api_version(api_version: &str) -> (String, String) {
    match api_version.split_once('/') {
        Some((group, version)) => (group.to_string(), version.to_string()),
        None => (String::new(), api_version.to_string()),
    }
}

/// Pluralize a Kubernetes resource kind for the API request path
///
/// Simple English rules cover the kinds a control-plane manifest set
/// contains (kymas, moduletemplates, networkpolicies, ingresses).
pub fn pluralize_kind(kind: &str) -> String {
    let lower = kind.to_lowercase();

    if lower.ends_with('s') || lower.ends_with("ch") || lower.ends_with("sh") {
        format!("{}es", lower)
    } else if lower.ends_with('y') && !lower.ends_with("ay") && !lower.ends_with("ey") {
        format!("{}ies", &lower[..lower.len() - 1])
    } else {
        format!("{}s", lower)
    }
}
