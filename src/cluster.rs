//! Cluster access for the bootstrap pipeline
//!
//! Everything that talks to the Kubernetes API goes through [`ClusterApi`],
//! so the applier, patcher and prober can be exercised against a mock.
//! [`KubeCluster`] is the real implementation on top of kube-rs.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use kube::api::{Api, DynamicObject, Patch, PatchParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};
#[cfg(test)]
use mockall::automock;
use tracing::debug;

use crate::apply::ApplyOptions;
use crate::error::Error;
use crate::manifest::ManifestDocument;
use crate::FIELD_MANAGER;

/// Default connection timeout for kube clients
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
/// Default read timeout for kube clients
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(30);

/// The Kubernetes operations the pipeline performs
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ClusterApi: Send + Sync {
    /// Server-side apply one manifest document, returning the server's view
    /// of the resulting object
    async fn apply(
        &self,
        document: &ManifestDocument,
        options: &ApplyOptions,
    ) -> Result<DynamicObject, Error>;

    /// Submit an RFC 6902 JSON patch to a deployment
    async fn patch_deployment_json(
        &self,
        namespace: &str,
        name: &str,
        patch: &json_patch::Patch,
    ) -> Result<Deployment, Error>;

    /// Fetch a deployment
    async fn get_deployment(&self, namespace: &str, name: &str) -> Result<Deployment, Error>;
}

/// Build the PatchParams for one server-side apply request
fn apply_params(options: &ApplyOptions) -> PatchParams {
    let mut params = PatchParams::apply(FIELD_MANAGER);
    if options.force {
        params = params.force();
    }
    params.dry_run = options.dry_run;
    params
}

/// Real cluster access backed by a kube-rs client
#[derive(Clone)]
pub struct KubeCluster {
    client: Client,
}

impl KubeCluster {
    /// Wrap an existing client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Connect using an explicit kubeconfig path, or infer the config from
    /// the environment, with default timeouts
    pub async fn connect(kubeconfig: Option<&Path>) -> Result<Self, Error> {
        Self::connect_with_timeout(kubeconfig, DEFAULT_CONNECT_TIMEOUT, DEFAULT_READ_TIMEOUT).await
    }

    /// Connect with custom connect/read timeouts
    pub async fn connect_with_timeout(
        kubeconfig: Option<&Path>,
        connect_timeout: Duration,
        read_timeout: Duration,
    ) -> Result<Self, Error> {
        let mut config = match kubeconfig {
            Some(path) => {
                let kubeconfig = Kubeconfig::read_from(path).map_err(|e| {
                    Error::config(format!("failed to read kubeconfig {}: {}", path.display(), e))
                })?;
                Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                    .await
                    .map_err(|e| Error::config(format!("failed to load kubeconfig: {}", e)))?
            }
            None => Config::infer()
                .await
                .map_err(|e| Error::config(format!("failed to infer kube config: {}", e)))?,
        };
        config.connect_timeout = Some(connect_timeout);
        config.read_timeout = Some(read_timeout);

        let client = Client::try_from(config)?;
        Ok(Self { client })
    }

    /// The underlying client
    pub fn client(&self) -> &Client {
        &self.client
    }
}

#[async_trait]
impl ClusterApi for KubeCluster {
    async fn apply(
        &self,
        document: &ManifestDocument,
        options: &ApplyOptions,
    ) -> Result<DynamicObject, Error> {
        let ar = document.api_resource();
        let params = apply_params(options);

        let api: Api<DynamicObject> = match &document.namespace {
            Some(ns) => Api::namespaced_with(self.client.clone(), ns, &ar),
            None => Api::all_with(self.client.clone(), &ar),
        };

        let applied = api
            .patch(&document.name, &params, &Patch::Apply(&document.value))
            .await?;

        debug!(
            kind = %document.kind,
            name = %document.name,
            namespace = document.namespace.as_deref().unwrap_or(""),
            dry_run = options.dry_run,
            "applied manifest document"
        );
        Ok(applied)
    }

    async fn patch_deployment_json(
        &self,
        namespace: &str,
        name: &str,
        patch: &json_patch::Patch,
    ) -> Result<Deployment, Error> {
        let api: Api<Deployment> = Api::namespaced(self.client.clone(), namespace);
        let patched = api
            .patch(name, &PatchParams::default(), &Patch::Json::<()>(patch.clone()))
            .await?;

        debug!(namespace = %namespace, name = %name, "patched deployment");
        Ok(patched)
    }

    async fn get_deployment(&self, namespace: &str, name: &str) -> Result<Deployment, Error> {
        let api: Api<Deployment> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get(name).await?)
    }
}
