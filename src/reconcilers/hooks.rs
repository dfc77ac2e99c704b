//! Collaborator interfaces consumed by the reconciler
//!
//! The reconciler never talks to the cluster, the overlay engine or the
//! manifest repository directly; everything goes through these traits so the
//! adapters can be swapped (see `crate::adapters`) or faked in tests.

use std::collections::BTreeMap;
use std::fmt::Debug;

use async_trait::async_trait;
use kube::runtime::reflector::ObjectRef;
use kube::Resource;

use crate::manifest::{MemoryFs, Objects};

/// A custom resource that can drive a declarative reconciliation
pub trait DeclarativeObject: Resource<DynamicType = ()> + Clone + Debug + Send + Sync + 'static {}

impl<T> DeclarativeObject for T where T: Resource<DynamicType = ()> + Clone + Debug + Send + Sync + 'static
{}

/// Resolves the raw manifest text for an instance, keyed by path
#[async_trait]
pub trait ManifestController<K: DeclarativeObject>: Send + Sync {
    async fn resolve_manifest(&self, instance: &K) -> anyhow::Result<BTreeMap<String, String>>;
}

/// Applies a manifest to the cluster
///
/// Implementations must be idempotent: applying the same manifest twice is a
/// no-op the second time.
#[async_trait]
pub trait ApplyClient: Send + Sync {
    async fn apply(
        &self,
        namespace: &str,
        manifest: &str,
        validate: bool,
        extra_args: &[String],
    ) -> anyhow::Result<()>;
}

/// Renders the final manifest from a filesystem root (kustomize or similar)
#[async_trait]
pub trait OverlayAdapter: Send + Sync {
    async fn run(&self, fs: &MemoryFs, root: &str) -> anyhow::Result<String>;
}

/// Status hook: may veto a pass and records its outcome
#[async_trait]
pub trait Status<K: DeclarativeObject>: Send + Sync {
    /// Returning an error aborts the pass before anything is built or applied
    async fn preflight(&self, _instance: &K) -> anyhow::Result<()> {
        Ok(())
    }

    /// Called after every pass whose build stage succeeded
    async fn reconciled(&self, instance: &K, objects: &Objects) -> anyhow::Result<()>;
}

/// Notified after a successful apply
#[async_trait]
pub trait Sink<K: DeclarativeObject>: Send + Sync {
    async fn notify(&self, instance: &K, objects: &Objects) -> anyhow::Result<()>;
}

/// Loads the resource instance being reconciled
#[async_trait]
pub trait ObjectStore<K: DeclarativeObject>: Send + Sync {
    /// `Ok(None)` when the instance no longer exists
    async fn get(&self, key: &ObjectRef<K>) -> Result<Option<K>, kube::Error>;
}
