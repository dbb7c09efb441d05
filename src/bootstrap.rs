//! Bootstrap orchestration
//!
//! One [`Bootstrap`] run takes rendered kustomizations onto a cluster:
//! parse the directives, build the combined manifest, optionally append
//! wildcard permissions, apply everything in order, ensure the kcp-mode
//! flag on applied Deployments, and finally report whether the manifest
//! shipped the Kyma CRD. Any stage error aborts the run; detection is
//! computed from the built text and never from live cluster state.

use std::time::Duration;

use kube::api::DynamicObject;
use tracing::{debug, info, warn};

use crate::apply::{apply_manifests, ApplyOptions};
use crate::cluster::ClusterApi;
use crate::detect::detects_kyma_crd;
use crate::error::Error;
use crate::kustomize::{Kustomization, ManifestSource};
use crate::patch::ensure_kcp_mode_flag;
use crate::readiness::wait_ready;

/// Cluster-admin role and binding for the lifecycle-manager service
/// account, appended verbatim when wildcard permissions are requested.
///
/// This is deliberately broad and meant for development setups where the
/// lifecycle-manager needs to manage arbitrary module resources without a
/// curated role.
pub const WILDCARD_ROLE_AND_BINDING: &str = r#"apiVersion: rbac.authorization.k8s.io/v1
kind: ClusterRole
metadata:
  name: kyma-cli-provisioned-wildcard
rules:
- apiGroups: ["*"]
  resources: ["*"]
  verbs: ["*"]
---
apiVersion: rbac.authorization.k8s.io/v1
kind: ClusterRoleBinding
metadata:
  name: lifecycle-manager-wildcard
roleRef:
  apiGroup: rbac.authorization.k8s.io
  kind: ClusterRole
  name: kyma-cli-provisioned-wildcard
subjects:
- kind: ServiceAccount
  name: lifecycle-manager-controller-manager
  namespace: kcp-system"#;

/// Configuration for one bootstrap run
#[derive(Clone, Debug, Default)]
pub struct Bootstrap {
    /// Raw kustomization directives (`location` or `location@ref`)
    pub kustomizations: Vec<String>,
    /// Append [`WILDCARD_ROLE_AND_BINDING`] to the built manifest
    pub wildcard_permissions: bool,
    /// How documents are applied (dry run, force, retry budget)
    pub apply_options: ApplyOptions,
    /// Patch applied Deployments to run with the kcp-mode flag
    pub in_kcp_mode: bool,
}

/// What a completed pipeline run produced
struct Outcome {
    applied: Vec<DynamicObject>,
    kyma_crd_detected: bool,
}

impl Bootstrap {
    /// Create a run over the given raw kustomization directives
    pub fn new(kustomizations: Vec<String>) -> Self {
        Self {
            kustomizations,
            ..Self::default()
        }
    }

    /// Run the pipeline.
    ///
    /// Returns whether the built manifest declared the Kyma CRD. The
    /// caller uses that answer to decide whether provisioning a default
    /// Kyma resource makes sense next.
    pub async fn run(
        &self,
        source: &dyn ManifestSource,
        cluster: &dyn ClusterApi,
    ) -> Result<bool, Error> {
        Ok(self.execute(source, cluster).await?.kyma_crd_detected)
    }

    /// Run the pipeline, then wait for the applied Deployments to report
    /// Available=True.
    ///
    /// The wait is skipped for dry runs (nothing was persisted) and when
    /// `readiness_timeout` is zero.
    pub async fn run_and_wait(
        &self,
        source: &dyn ManifestSource,
        cluster: &dyn ClusterApi,
        readiness_timeout: Duration,
    ) -> Result<bool, Error> {
        let outcome = self.execute(source, cluster).await?;

        if self.apply_options.dry_run {
            debug!("dry run, skipping readiness wait");
        } else if readiness_timeout.is_zero() {
            debug!("readiness wait disabled");
        } else {
            wait_ready(cluster, &outcome.applied, readiness_timeout).await?;
        }

        Ok(outcome.kyma_crd_detected)
    }

    async fn execute(
        &self,
        source: &dyn ManifestSource,
        cluster: &dyn ClusterApi,
    ) -> Result<Outcome, Error> {
        // Parse every directive before anything touches the network
        let kustomizations = self
            .kustomizations
            .iter()
            .map(|raw| Kustomization::parse(raw))
            .collect::<Result<Vec<_>, Error>>()?;
        info!(kustomizations = kustomizations.len(), "loading kustomizations");

        let mut manifest = source.build(&kustomizations).await?;

        if self.wildcard_permissions {
            warn!("appending wildcard cluster-admin permissions for the lifecycle-manager");
            manifest.append_document(WILDCARD_ROLE_AND_BINDING);
        }

        let applied = apply_manifests(cluster, &manifest, &self.apply_options).await?;

        ensure_kcp_mode_flag(cluster, &applied, self.in_kcp_mode).await?;

        // Detection reads the built text, not cluster state
        let kyma_crd_detected = detects_kyma_crd(manifest.as_str())?;
        info!(
            kyma_crd_detected,
            dry_run = self.apply_options.dry_run,
            "bootstrap complete"
        );

        Ok(Outcome {
            applied,
            kyma_crd_detected,
        })
    }
}
