//! Kyma CRD detection
//!
//! Decides whether a built manifest ships the Kyma custom resource
//! definition. Later provisioning steps only make sense when the CRD is
//! part of what was just applied, so the answer feeds the caller's
//! "create a default Kyma resource now?" decision.
//!
//! The check is textual on purpose: it runs on the manifest exactly as
//! built, before apply, and never consults live cluster state.

use regex::Regex;

use crate::error::Error;

/// Ordered markers of the Kyma CRD inside a names block.
///
/// `(?s)` lets `.` cross lines, so the three markers may sit anywhere in
/// the stream as long as they appear in this order: a `names:` block,
/// then `kind: Kyma`, then `plural: kymas`.
const KYMA_CRD_PATTERN: &str = r"names:(?s:.)*kind: Kyma(?s:.)*plural: kymas";

/// Check whether the manifest text declares the Kyma CRD.
///
/// Returns false for manifests without the markers or with the markers in
/// the wrong order. The scan is ordering-sensitive and substring-based, so
/// it tolerates arbitrary YAML between the markers but never reorders them.
pub fn detects_kyma_crd(manifest: &str) -> Result<bool, Error> {
    let matcher = Regex::new(KYMA_CRD_PATTERN)
        .map_err(|e| Error::detection(format!("invalid detection pattern: {}", e)))?;
    Ok(matcher.is_match(manifest))
}

#[cfg(test)]
mod tests {
    use super::*;

    const KYMA_CRD_SNIPPET: &str = r#"apiVersion: apiextensions.k8s.io/v1
kind: CustomResourceDefinition
metadata:
  name: kymas.operator.kyma-project.io
spec:
  group: operator.kyma-project.io
  names:
    kind: Kyma
    listKind: KymaList
    plural: kymas
    singular: kyma
  scope: Namespaced"#;

    #[test]
    fn test_detects_kyma_crd_in_full_definition() {
        assert!(detects_kyma_crd(KYMA_CRD_SNIPPET).unwrap());
    }

    #[test]
    fn test_detects_markers_spread_across_documents() {
        // The scan is stream-wide, so unrelated documents between the
        // markers do not break detection.
        let manifest = format!(
            "apiVersion: v1\nkind: Namespace\nmetadata:\n  name: kcp-system\n---\n{}\n---\napiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: tail\n",
            KYMA_CRD_SNIPPET
        );
        assert!(detects_kyma_crd(&manifest).unwrap());
    }

    #[test]
    fn test_rejects_markers_out_of_order() {
        // plural before kind: all three markers present, wrong order
        let manifest = "names:\n  plural: kymas\n  kind: Kyma\n";
        assert!(!detects_kyma_crd(manifest).unwrap());
    }

    #[test]
    fn test_rejects_missing_names_block() {
        let manifest = "kind: Kyma\nplural: kymas\n";
        assert!(!detects_kyma_crd(manifest).unwrap());
    }

    #[test]
    fn test_rejects_partial_markers() {
        let manifest = "names:\n  kind: Kyma\n  singular: kyma\n";
        assert!(!detects_kyma_crd(manifest).unwrap());
    }

    #[test]
    fn test_rejects_unrelated_crd() {
        let manifest = r#"spec:
  names:
    kind: ModuleTemplate
    plural: moduletemplates"#;
        assert!(!detects_kyma_crd(manifest).unwrap());
    }

    #[test]
    fn test_rejects_empty_manifest() {
        assert!(!detects_kyma_crd("").unwrap());
    }

    #[test]
    fn test_detection_is_case_sensitive() {
        let manifest = "names:\n  kind: kyma\n  plural: kymas\n";
        assert!(!detects_kyma_crd(manifest).unwrap());
    }
}
