//! Kyma bootstrap CLI - deploys the lifecycle-manager prerequisites

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use kyma_bootstrap::apply::{ApplyOptions, DEFAULT_APPLY_RETRIES};
use kyma_bootstrap::bootstrap::Bootstrap;
use kyma_bootstrap::cluster::KubeCluster;
use kyma_bootstrap::kustomize::{KustomizeBuild, DEFAULT_KUSTOMIZATION};

/// Kyma bootstrap - deploys the lifecycle-manager prerequisites
#[derive(Parser, Debug)]
#[command(name = "kyma-bootstrap", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Render kustomizations and apply them to the target cluster
    ///
    /// Builds every kustomization with `kustomize build`, applies the
    /// combined manifest in order with server-side apply, patches the
    /// kcp-mode flag into the lifecycle-manager when requested, and waits
    /// for the applied Deployments to become available.
    Deploy(DeployArgs),
}

/// Deploy mode arguments
#[derive(Parser, Debug)]
struct DeployArgs {
    /// Kustomization to build, as `location` or `location@ref`
    ///
    /// May be given multiple times; the rendered outputs are applied in
    /// the order the flags appear.
    #[arg(
        short = 'k',
        long = "kustomization",
        default_value = DEFAULT_KUSTOMIZATION
    )]
    kustomizations: Vec<String>,

    /// Grant the lifecycle-manager wildcard cluster-admin permissions
    ///
    /// Development convenience only; production setups ship a curated role.
    #[arg(long)]
    wildcard_permissions: bool,

    /// Run the lifecycle-manager in control-plane (KCP) mode
    #[arg(long)]
    in_kcp_mode: bool,

    /// Validate against the API server without persisting anything
    #[arg(long)]
    dry_run: bool,

    /// Take ownership of fields held by other field managers
    #[arg(long)]
    force: bool,

    /// Retries per document for transient API errors
    #[arg(long, default_value_t = DEFAULT_APPLY_RETRIES)]
    retries: u32,

    /// First retry delay in seconds, doubled per attempt
    #[arg(long, default_value_t = 1)]
    initial_backoff_secs: u64,

    /// How long to wait for applied Deployments to become available, 0 disables
    #[arg(long, default_value_t = 300)]
    readiness_timeout_secs: u64,

    /// Path to the kubeconfig file, otherwise the in-cluster or default config
    #[arg(long, env = "KUBECONFIG")]
    kubeconfig: Option<PathBuf>,

    /// The kustomize binary to shell out to
    #[arg(long, default_value = "kustomize")]
    kustomize_bin: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Deploy(args) => run_deploy(args).await,
    }
}

/// Run the deploy pipeline against the configured cluster
async fn run_deploy(args: DeployArgs) -> anyhow::Result<()> {
    println!("=== Kyma Bootstrap ===");
    for kustomization in &args.kustomizations {
        println!("Kustomization: {}", kustomization);
    }
    if args.dry_run {
        println!("Mode: dry run (nothing is persisted)");
    }
    println!();

    let cluster = KubeCluster::connect(args.kubeconfig.as_deref())
        .await
        .map_err(|e| anyhow::anyhow!("Failed to connect to the cluster: {}", e))?;

    let source = KustomizeBuild::with_binary(&args.kustomize_bin);

    let bootstrap = Bootstrap {
        kustomizations: args.kustomizations,
        wildcard_permissions: args.wildcard_permissions,
        apply_options: ApplyOptions {
            dry_run: args.dry_run,
            force: args.force,
            max_retries: args.retries,
            initial_backoff: Duration::from_secs(args.initial_backoff_secs),
        },
        in_kcp_mode: args.in_kcp_mode,
    };

    let readiness_timeout = Duration::from_secs(args.readiness_timeout_secs);
    let kyma_crd_detected = bootstrap
        .run_and_wait(&source, &cluster, readiness_timeout)
        .await
        .map_err(|e| anyhow::anyhow!("{}", e))?;

    if kyma_crd_detected {
        println!("Kyma CRD deployed - a default Kyma resource can be provisioned next");
    }
    println!("Bootstrap finished");
    Ok(())
}
