//! Idempotent kcp-mode flag patching
//!
//! When the manifests are bootstrapped into a central control plane, the
//! lifecycle-manager must run with `--in-kcp-mode`. Rendered manifests do
//! not carry the flag, so after apply the patcher appends it to the first
//! container of every applied Deployment that does not already have it.
//! A second run over the same cluster state is a no-op.

use json_patch::{AddOperation, PatchOperation};
use jsonptr::PointerBuf;
use k8s_openapi::api::apps::v1::Deployment;
use kube::api::DynamicObject;
use kube::ResourceExt;
use serde::Deserialize;
use tracing::{debug, info};

use crate::cluster::ClusterApi;
use crate::error::{Error, UNKNOWN_NAMESPACE};

/// Flag that puts the lifecycle-manager into control-plane mode
pub const KCP_MODE_FLAG: &str = "--in-kcp-mode";
/// Explicit boolean spelling of the same flag
pub const KCP_MODE_FLAG_TRUE: &str = "--in-kcp-mode=true";

/// Typed view of the parts of a Deployment the patcher inspects.
///
/// Everything else in the object is irrelevant here and must survive
/// unseen, which is why the patch is computed from this view but applied
/// as a JSON patch rather than a full-object update.
#[derive(Debug, Deserialize)]
struct DeploymentArgsView {
    spec: DeploymentSpecView,
}

#[derive(Debug, Deserialize)]
struct DeploymentSpecView {
    template: PodTemplateView,
}

#[derive(Debug, Deserialize)]
struct PodTemplateView {
    spec: PodSpecView,
}

#[derive(Debug, Deserialize)]
struct PodSpecView {
    #[serde(default)]
    containers: Vec<ContainerView>,
}

#[derive(Debug, Deserialize)]
struct ContainerView {
    #[serde(default)]
    args: Vec<String>,
}

/// Check whether the argument list already carries the kcp-mode flag.
///
/// Both the bare flag and the explicit `=true` spelling count as present.
/// Any other spelling (including `=false`) does not.
pub fn has_kcp_mode_flag(args: &[String]) -> bool {
    args.iter()
        .any(|arg| arg == KCP_MODE_FLAG || arg == KCP_MODE_FLAG_TRUE)
}

/// The single-operation JSON patch that appends the kcp-mode flag to the
/// first container's args
pub fn kcp_mode_patch() -> json_patch::Patch {
    json_patch::Patch(vec![PatchOperation::Add(AddOperation {
        path: PointerBuf::from_tokens(["spec", "template", "spec", "containers", "0", "args", "-"]),
        value: serde_json::Value::String(KCP_MODE_FLAG.to_string()),
    })])
}

/// Ensure every applied Deployment carries the kcp-mode flag when kcp mode
/// is enabled.
///
/// Objects of other kinds are ignored. Each Deployment's pod spec is
/// decoded first (a malformed one is an error even when kcp mode is off),
/// then patched only if the flag is enabled and absent. Returns the
/// server's view of the last deployment actually patched, or `None` when
/// no request was made.
pub async fn ensure_kcp_mode_flag(
    cluster: &dyn ClusterApi,
    objects: &[DynamicObject],
    in_kcp_mode: bool,
) -> Result<Option<Deployment>, Error> {
    let mut patched = None;

    for object in objects {
        if object.types.as_ref().map(|t| t.kind.as_str()) != Some("Deployment") {
            continue;
        }

        let name = object.name_any();
        let namespace = object.namespace().ok_or_else(|| {
            Error::patch_for(
                UNKNOWN_NAMESPACE,
                &name,
                "applied deployment carries no namespace",
            )
        })?;

        let view: DeploymentArgsView =
            serde_json::from_value(object.data.clone()).map_err(|e| {
                Error::patch_for(
                    &namespace,
                    &name,
                    format!("failed to decode deployment spec: {}", e),
                )
            })?;

        let containers = &view.spec.template.spec.containers;
        if containers.is_empty() {
            return Err(Error::patch_for(
                &namespace,
                &name,
                "pod template has no containers",
            ));
        }

        if !in_kcp_mode {
            debug!(
                namespace = %namespace,
                name = %name,
                "kcp mode disabled, leaving deployment args untouched"
            );
            continue;
        }

        if has_kcp_mode_flag(&containers[0].args) {
            debug!(
                namespace = %namespace,
                name = %name,
                "deployment already carries the kcp-mode flag, skipping patch"
            );
            continue;
        }

        let deployment = cluster
            .patch_deployment_json(&namespace, &name, &kcp_mode_patch())
            .await
            .map_err(|e| Error::patch_for(&namespace, &name, e.to_string()))?;
        info!(
            namespace = %namespace,
            name = %name,
            flag = KCP_MODE_FLAG,
            "appended kcp-mode flag to first container"
        );
        patched = Some(deployment);
    }

    Ok(patched)
}
