//! Addon controller
//!
//! Watches Addon resources and triggers reconciliation.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use kube::{
    api::ListParams,
    runtime::{
        controller::{Action, Controller},
        reflector::ObjectRef,
        watcher::Config as WatcherConfig,
    },
    Api, Client, ResourceExt,
};
use tracing::{error, info, instrument};

use crate::controllers::Context;
use crate::crd::Addon;
use crate::error::{Error, Result};
use crate::metrics;

const KIND: &str = "Addon";

/// Run the Addon controller
pub async fn run(client: Client, context: Arc<Context>) {
    let api: Api<Addon> = Api::all(client.clone());

    // Verify CRD is installed
    if let Err(e) = api.list(&ListParams::default().limit(1)).await {
        error!("Addon CRD not installed: {}", e);
        return;
    }

    info!(
        kustomize = context.reconciler.is_kustomize_option_used(),
        "Starting Addon controller"
    );

    Controller::new(api, WatcherConfig::default())
        .shutdown_on_signal()
        .run(reconcile, error_policy, context)
        .for_each(|result| async move {
            match result {
                Ok((obj, _action)) => {
                    info!(
                        name = %obj.name,
                        namespace = obj.namespace.as_deref().unwrap_or("default"),
                        "Reconciled Addon"
                    );
                }
                Err(e) => {
                    error!(error = %e, "Reconciliation error");
                }
            }
        })
        .await;
}

/// Main reconciliation function
#[instrument(skip(ctx), fields(name = %obj.name_any(), namespace = obj.namespace()))]
async fn reconcile(obj: Arc<Addon>, ctx: Arc<Context>) -> Result<Action> {
    let _timer = metrics::RECONCILE_DURATION
        .with_label_values(&[KIND])
        .start_timer();
    metrics::RECONCILIATIONS.with_label_values(&[KIND]).inc();

    let key = ObjectRef::from_obj(&*obj);
    ctx.reconciler.reconcile(&key).await.map_err(|e| {
        metrics::RECONCILIATION_ERRORS
            .with_label_values(&[KIND, e.stage()])
            .inc();
        e
    })
}

/// Error policy for the controller
pub fn error_policy(obj: Arc<Addon>, error: &Error, _ctx: Arc<Context>) -> Action {
    let name = obj.name_any();
    error!(
        name = %name,
        stage = error.stage(),
        error = %error,
        "Reconciliation failed, scheduling retry"
    );

    Action::requeue(requeue_after(error))
}

/// Retry delay for a failed pass
///
/// Failures that need a change to the resource or its packages back off
/// longest; transient cluster and tool failures retry sooner.
pub fn requeue_after(error: &Error) -> Duration {
    match error {
        Error::Kube(_) => Duration::from_secs(30),
        Error::Preflight(_)
        | Error::Config(_)
        | Error::InvalidOptions(_)
        | Error::ManifestResolution(_)
        | Error::Transform(_)
        | Error::Parse(_) => Duration::from_secs(300),
        Error::Apply(_) | Error::Overlay(_) | Error::Notify(_) => Duration::from_secs(60),
        _ => Duration::from_secs(30),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requeue_after() {
        assert_eq!(
            requeue_after(&Error::Preflight(anyhow::anyhow!("suspended"))),
            Duration::from_secs(300)
        );
        assert_eq!(requeue_after(&Error::parse("bad")), Duration::from_secs(300));
        assert_eq!(
            requeue_after(&Error::Apply(anyhow::anyhow!("exit 1"))),
            Duration::from_secs(60)
        );
        assert_eq!(
            requeue_after(&Error::Io(std::io::Error::other("disk"))),
            Duration::from_secs(30)
        );
    }
}
