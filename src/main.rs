//! Declarative reconciler operator
//!
//! Main entry point for the operator. Sets up the Kubernetes client, builds
//! the reconciler from the process configuration and runs the Addon
//! controller.

use std::sync::Arc;

use kube::Client;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use declarative_reconciler::{
    adapters::{AddonStatusWriter, FsManifestLoader, KubeStore, Kubectl, KustomizeCli, WebhookSink},
    config::OperatorConfig,
    controllers::{self, Context},
    crd::Addon,
    metrics,
    reconcilers::{
        source_as_owner, source_label, ManifestController, Reconciler, ReconcilerOption,
    },
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    init_tracing();

    info!("Starting declarative reconciler");

    let config = OperatorConfig::from_env()?;
    info!(
        manifest_dir = %config.manifest_dir.display(),
        prune = config.enable_prune,
        kustomize = config.use_kustomize,
        "Loaded configuration"
    );

    // Create Kubernetes client
    let client = Client::try_default().await?;
    info!("Connected to Kubernetes API server");

    let reconciler = build_reconciler(&config, client.clone())?;
    let context = Arc::new(Context::new(Arc::new(reconciler)));

    // Start metrics server
    let metrics_handle = tokio::spawn(metrics::serve(config.metrics_port));
    info!("Metrics server starting on port {}", config.metrics_port);

    let addon_controller = controllers::run_addon_controller(client.clone(), context.clone());

    // Handle graceful shutdown
    tokio::select! {
        _ = addon_controller => {
            error!("Addon controller exited unexpectedly");
        }
        _ = metrics_handle => {
            error!("Metrics server exited unexpectedly");
        }
        _ = shutdown_signal() => {
            info!("Received shutdown signal, stopping operator");
        }
    }

    info!("Declarative reconciler stopped");
    Ok(())
}

/// Assemble the Addon reconciler from the operator configuration
fn build_reconciler(config: &OperatorConfig, client: Client) -> anyhow::Result<Reconciler<Addon>> {
    let manifest_dir = config.manifest_dir.clone();

    let mut builder = Reconciler::<Addon>::builder()
        .default_manifest_loader(Arc::new(
            move || -> anyhow::Result<Arc<dyn ManifestController<Addon>>> {
                Ok(Arc::new(FsManifestLoader::<Addon>::new(manifest_dir.clone())))
            },
        ))
        .with(ReconcilerOption::Labels(Arc::new(|addon: &Addon| {
            source_label(addon)
        })))
        .with(ReconcilerOption::OwnerFn(source_as_owner::<Addon>()))
        .end(ReconcilerOption::Status(Arc::new(AddonStatusWriter::new(
            client.clone(),
        ))));

    if config.enable_prune {
        builder = builder.with(ReconcilerOption::ApplyPrune);
    }
    if config.apply_validate {
        builder = builder.with(ReconcilerOption::ApplyValidation);
    }
    if config.use_kustomize {
        builder = builder
            .with(ReconcilerOption::Kustomize)
            .overlay(Arc::new(KustomizeCli::new()));
    }
    if let Some(url) = &config.notify_url {
        builder = builder.with(ReconcilerOption::Sink(Arc::new(WebhookSink::new(url.clone())?)));
    }

    let reconciler = builder.build(Arc::new(KubeStore::new(client)), Arc::new(Kubectl::new()))?;
    Ok(reconciler)
}

/// Initialize tracing subscriber
fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,kube=warn,hyper=warn"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().json())
        .init();
}

/// Wait for shutdown signal (SIGTERM or SIGINT)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install CTRL+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received CTRL+C signal");
        }
        _ = terminate => {
            info!("Received SIGTERM signal");
        }
    }
}
