//! Declarative reconciler
//!
//! Runs one reconciliation pass for a resource instance:
//! - Fetch the instance (gone means nothing to do)
//! - Preflight through the status hook
//! - Build: resolve, transform, parse, label and order the target objects
//! - Inject owner references
//! - Render through the overlay engine or as JSON
//! - Apply (with prune) and notify the sink
//!
//! Once the build succeeds the status hook is told about the pass whatever
//! happens afterwards.

use std::path::Path;
use std::sync::Arc;

use kube::runtime::controller::Action;
use kube::runtime::reflector::ObjectRef;
use tracing::{debug, error, info};

use crate::error::{Error, Result};
use crate::manifest::{parse_objects, MemoryFs, Objects};
use crate::metrics;

use super::hooks::{ApplyClient, DeclarativeObject, ObjectStore, OverlayAdapter};
use super::options::{apply_args, ReconcilerBuilder, ReconcilerParams};
use super::order::default_object_order;
use super::owner::{inject_owner_refs, Scheme};
use super::transforms::add_labels;

/// Reconciles instances of `K` into applied target objects
pub struct Reconciler<K: DeclarativeObject> {
    store: Arc<dyn ObjectStore<K>>,
    kubectl: Arc<dyn ApplyClient>,
    overlay: Option<Arc<dyn OverlayAdapter>>,
    scheme: Scheme,
    options: ReconcilerParams<K>,
}

impl<K: DeclarativeObject> Reconciler<K> {
    pub fn builder() -> ReconcilerBuilder<K> {
        ReconcilerBuilder::new()
    }

    pub(crate) fn from_parts(
        store: Arc<dyn ObjectStore<K>>,
        kubectl: Arc<dyn ApplyClient>,
        overlay: Option<Arc<dyn OverlayAdapter>>,
        scheme: Scheme,
        options: ReconcilerParams<K>,
    ) -> Self {
        Self {
            store,
            kubectl,
            overlay,
            scheme,
            options,
        }
    }

    /// Whether the pipeline renders through the overlay engine
    pub fn is_kustomize_option_used(&self) -> bool {
        self.options.kustomize
    }

    /// Run one reconciliation pass for the named instance
    pub async fn reconcile(&self, key: &ObjectRef<K>) -> Result<Action> {
        let instance = match self.store.get(key).await {
            Ok(Some(instance)) => instance,
            Ok(None) => {
                // Applied objects carry owner references and are garbage collected
                debug!(object = %key, "Object not found, nothing to reconcile");
                let _ = metrics::MANAGED_OBJECTS
                    .remove_label_values(&[key.namespace.as_deref().unwrap_or_default(), &key.name]);
                return Ok(Action::await_change());
            }
            Err(e) => {
                error!(object = %key, error = %e, "Error reading object");
                return Err(Error::Kube(e));
            }
        };

        if let Some(status) = &self.options.status {
            if let Err(e) = status.preflight(&instance).await {
                error!(object = %key, error = %e, "Preflight check failed, not reconciling");
                return Err(Error::Preflight(e));
            }
        }

        self.reconcile_exists(key, &instance).await
    }

    async fn reconcile_exists(&self, key: &ObjectRef<K>, instance: &K) -> Result<Action> {
        info!(object = %key, "Reconciling");

        let mut objects = self.build_deployment_objects(instance).await.map_err(|e| {
            error!(object = %key, error = %e, "Building deployment objects");
            e
        })?;
        info!(object = %key, objects = objects.items.len(), "Built deployment objects");
        metrics::MANAGED_OBJECTS
            .with_label_values(&[key.namespace.as_deref().unwrap_or_default(), &key.name])
            .set(objects.items.len() as f64);

        let result = self.apply_objects(key, instance, &mut objects).await;

        if let Some(status) = &self.options.status {
            if let Err(e) = status.reconciled(instance, &objects).await {
                error!(object = %key, error = %e, "Failed to reconcile status");
            }
        }

        result
    }

    async fn apply_objects(
        &self,
        key: &ObjectRef<K>,
        instance: &K,
        objects: &mut Objects,
    ) -> Result<Action> {
        inject_owner_refs(
            self.options.owner_fn.as_ref(),
            &self.scheme,
            instance,
            objects,
        )?;

        let manifest = self.render(objects).await?;

        let labels = match (&self.options.label_maker, self.options.prune) {
            (Some(maker), true) => maker(instance),
            _ => Default::default(),
        };
        let extra_args = apply_args(self.options.prune, &labels, &self.options.prune_whitelist);

        let namespace = if self.options.preserve_namespace {
            ""
        } else {
            key.namespace.as_deref().unwrap_or_default()
        };

        if let Err(e) = self
            .kubectl
            .apply(namespace, &manifest, self.options.validate, &extra_args)
            .await
        {
            error!(object = %key, error = %e, "Applying manifest");
            metrics::APPLIES_TOTAL.with_label_values(&["failure"]).inc();
            return Err(Error::Apply(e));
        }
        metrics::APPLIES_TOTAL.with_label_values(&["success"]).inc();

        if let Some(sink) = &self.options.sink {
            if let Err(e) = sink.notify(instance, objects).await {
                error!(object = %key, error = %e, "Notifying sink");
                return Err(Error::Notify(e));
            }
        }

        Ok(Action::await_change())
    }

    /// Final manifest text: overlay output, or the objects' own JSON
    async fn render(&self, objects: &Objects) -> Result<String> {
        let Some(overlay) = self.overlay.as_ref().filter(|_| self.options.kustomize) else {
            return objects.json_manifest();
        };

        let mut fs = MemoryFs::new();
        objects.materialize(&mut fs)?;

        info!(root = %objects.path, files = fs.len(), "Running overlay to create final manifest");
        overlay.run(&fs, &objects.path).await.map_err(|e| {
            error!(error = %e, "Running overlay to create final manifest");
            Error::Overlay(e)
        })
    }

    /// Build the final, ordered set of objects without applying it
    pub async fn build_deployment_objects(&self, instance: &K) -> Result<Objects> {
        self.build_deployment_objects_with_fs(instance, None).await
    }

    /// Build the objects, also writing them into `fs` when given
    ///
    /// Each object (as JSON) and each blob is written under the manifest path
    /// it came from, before ordering.
    pub async fn build_deployment_objects_with_fs(
        &self,
        instance: &K,
        mut fs: Option<&mut MemoryFs>,
    ) -> Result<Objects> {
        let Some(controller) = &self.options.manifest_controller else {
            return Err(Error::invalid_options("no manifest controller configured"));
        };

        let manifest_files = controller.resolve_manifest(instance).await.map_err(|e| {
            error!(error = %e, "Error loading raw manifest");
            Error::ManifestResolution(e)
        })?;

        let label_transform = self
            .options
            .label_maker
            .as_ref()
            .map(|maker| add_labels::<K>(maker(instance)));

        let mut manifest_objects = Objects::default();
        for (manifest_path, mut manifest_str) in manifest_files {
            for transform in &self.options.raw_manifest_operations {
                manifest_str = transform(instance, &manifest_str).map_err(|e| {
                    error!(path = %manifest_path, error = %e, "Error performing raw manifest operations");
                    Error::Transform(e)
                })?;
            }

            let mut objects = parse_objects(&manifest_str).map_err(|e| {
                error!(path = %manifest_path, error = %e, "Error parsing manifest");
                e
            })?;
            objects.set_origin(&manifest_path);

            for transform in self
                .options
                .object_transformations
                .iter()
                .chain(label_transform.iter())
            {
                transform(instance, &mut objects).map_err(|e| {
                    error!(path = %manifest_path, error = %e, "Error performing object transformations");
                    Error::Transform(e)
                })?;
            }

            if let Some(fs) = fs.as_deref_mut() {
                objects.materialize(fs)?;
            }

            manifest_objects.path = manifest_dir(&manifest_path);
            manifest_objects.append(objects);
        }

        // Dependent objects often live in the same manifest (service account, deployment)
        manifest_objects.sort(default_object_order);

        Ok(manifest_objects)
    }
}

/// Directory of a manifest path, "." for bare file names
fn manifest_dir(path: &str) -> String {
    match Path::new(path).parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_string_lossy().into_owned(),
        _ => ".".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manifest_dir() {
        assert_eq!(manifest_dir("packages/app/1.0/manifest.yaml"), "packages/app/1.0");
        assert_eq!(manifest_dir("/abs/manifest.yaml"), "/abs");
        assert_eq!(manifest_dir("manifest.yaml"), ".");
    }
}
