//! Kyma bootstrap - deploys the lifecycle-manager prerequisites onto a control plane
//!
//! The crate renders one or more kustomizations into a combined manifest,
//! applies every document in order with server-side apply, and prepares the
//! lifecycle-manager Deployment for running inside a Kyma control plane (KCP).
//!
//! # Pipeline
//!
//! A [`bootstrap::Bootstrap`] run walks fixed stages:
//! - Parse `location@ref` directives into [`kustomize::Kustomization`]s
//! - Render them with `kustomize build` through a [`kustomize::ManifestSource`]
//! - Optionally append wildcard permissions for development clusters
//! - Apply each document in manifest order, retrying transient API errors
//! - Patch the kcp-mode flag into applied Deployments when requested
//! - Report whether the manifest shipped the Kyma CRD
//!
//! Readiness is a separate concern: [`readiness::wait_ready`] polls applied
//! Deployments for an `Available=True` condition.
//!
//! # Modules
//!
//! - [`bootstrap`] - Pipeline orchestration
//! - [`kustomize`] - Directive parsing and `kustomize build` execution
//! - [`manifest`] - Multi-document manifest handling
//! - [`apply`] - Ordered server-side apply with retry
//! - [`patch`] - kcp-mode flag patching for Deployments
//! - [`detect`] - Kyma CRD detection in manifest text
//! - [`readiness`] - Deployment availability polling
//! - [`cluster`] - Kubernetes API access behind a mockable trait
//! - [`retry`] - Exponential backoff for transient failures
//! - [`error`] - Error types for the pipeline

#![deny(missing_docs)]

pub mod apply;
pub mod bootstrap;
pub mod cluster;
pub mod detect;
pub mod error;
pub mod kustomize;
pub mod manifest;
pub mod patch;
pub mod readiness;
pub mod retry;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Field manager name recorded by server-side apply.
///
/// Every object this tool applies carries this manager, which lets the API
/// server attribute field ownership and lets later runs take over fields
/// from earlier ones.
pub const FIELD_MANAGER: &str = "kyma-bootstrap";
