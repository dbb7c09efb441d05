//! Deployment readiness probing
//!
//! After the manifests are applied the lifecycle-manager needs time to
//! come up. The prober polls each applied Deployment's `Available`
//! condition until it turns `True` or a deadline passes. Polling is
//! read-only and cancellation-safe: dropping the future stops it at the
//! next poll boundary.

use std::time::{Duration, Instant};

use k8s_openapi::api::apps::v1::Deployment;
use kube::api::DynamicObject;
use kube::ResourceExt;
use tracing::{debug, trace, warn};

use crate::cluster::ClusterApi;
use crate::error::Error;

/// The "Available" condition type on deployments
pub const CONDITION_AVAILABLE: &str = "Available";
/// The "True" status value for conditions
pub const STATUS_TRUE: &str = "True";
/// Default polling interval for readiness waits
pub const READINESS_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Read the deployment's Available condition: `Some(true)` when True,
/// `Some(false)` when present but not True, `None` when absent
fn available_status(deployment: &Deployment) -> Option<bool> {
    deployment
        .status
        .as_ref()
        .and_then(|status| status.conditions.as_ref())
        .and_then(|conditions| {
            conditions
                .iter()
                .find(|condition| condition.type_ == CONDITION_AVAILABLE)
        })
        .map(|condition| condition.status == STATUS_TRUE)
}

/// Wait for every applied Deployment to report Available=True, with the
/// default polling interval
pub async fn wait_ready(
    cluster: &dyn ClusterApi,
    objects: &[DynamicObject],
    timeout: Duration,
) -> Result<(), Error> {
    wait_ready_with_interval(cluster, objects, timeout, READINESS_POLL_INTERVAL).await
}

/// Wait for every applied Deployment to report Available=True.
///
/// Objects of other kinds are ignored. Each Deployment gets the full
/// timeout; the wait returns on the first deployment that misses its
/// deadline, with the error naming that deployment.
pub async fn wait_ready_with_interval(
    cluster: &dyn ClusterApi,
    objects: &[DynamicObject],
    timeout: Duration,
    poll_interval: Duration,
) -> Result<(), Error> {
    for object in objects {
        if object.types.as_ref().map(|t| t.kind.as_str()) != Some("Deployment") {
            continue;
        }
        let name = object.name_any();
        // Manifests without an explicit namespace land in default
        let namespace = object.namespace().unwrap_or_else(|| "default".to_string());
        wait_for_deployment(cluster, &namespace, &name, timeout, poll_interval).await?;
    }
    Ok(())
}

/// Poll one deployment until its Available condition turns True.
///
/// Not-found responses and transient read failures keep the poll going;
/// they are normal while the rollout is still in flight. At the deadline
/// the error distinguishes a deployment that reported Available=False
/// from one that never reported the condition at all.
pub async fn wait_for_deployment(
    cluster: &dyn ClusterApi,
    namespace: &str,
    name: &str,
    timeout: Duration,
    poll_interval: Duration,
) -> Result<(), Error> {
    let start = Instant::now();
    let mut observed_false = false;

    debug!(
        namespace = %namespace,
        name = %name,
        timeout = ?timeout,
        "waiting for deployment to become Available"
    );

    loop {
        match cluster.get_deployment(namespace, name).await {
            Ok(deployment) => match available_status(&deployment) {
                Some(true) => {
                    debug!(namespace = %namespace, name = %name, "deployment is Available");
                    return Ok(());
                }
                Some(false) => {
                    observed_false = true;
                    trace!(namespace = %namespace, name = %name, "Available=False, still waiting");
                }
                None => {
                    trace!(namespace = %namespace, name = %name, "no Available condition yet");
                }
            },
            Err(Error::Kube {
                source: kube::Error::Api(e),
            }) if e.code == 404 => {
                trace!(namespace = %namespace, name = %name, "deployment not found yet");
            }
            Err(e) if e.is_retryable() => {
                warn!(
                    namespace = %namespace,
                    name = %name,
                    error = %e,
                    "readiness poll failed, retrying"
                );
            }
            Err(e) => return Err(e),
        }

        if start.elapsed() >= timeout {
            return Err(if observed_false {
                Error::readiness_unavailable(namespace, name)
            } else {
                Error::readiness_timeout(namespace, name, timeout)
            });
        }
        tokio::time::sleep(poll_interval).await;
    }
}
