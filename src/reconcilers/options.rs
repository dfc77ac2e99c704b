//! Reconciler options
//!
//! Options are named steps applied in order to a [`ReconcilerParams`]. The
//! builder wraps per-reconciler steps between a `begin` and an `end` list of
//! defaults, applies them once, then validates the result as a batch.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use kube::core::{DynamicObject, GroupVersionKind};
use tracing::debug;

use crate::error::{Error, Result};
use crate::manifest::{Object, Objects};

use super::hooks::{
    ApplyClient, DeclarativeObject, ManifestController, ObjectStore, OverlayAdapter, Sink, Status,
};
use super::owner::Scheme;
use super::reconciler::Reconciler;

/// Text pass applied to each raw manifest before parsing
pub type RawTransform<K> = Arc<dyn Fn(&K, &str) -> anyhow::Result<String> + Send + Sync>;

/// Pass over the parsed objects of one manifest path
pub type ObjectTransform<K> = Arc<dyn Fn(&K, &mut Objects) -> anyhow::Result<()> + Send + Sync>;

/// Derives the labels stamped on every object and used as the prune selector
pub type LabelMaker<K> = Arc<dyn Fn(&K) -> BTreeMap<String, String> + Send + Sync>;

/// Picks the owner of a target object
pub type OwnerFn<K> =
    Arc<dyn Fn(&K, &Object, &Objects) -> anyhow::Result<Option<DynamicObject>> + Send + Sync>;

/// Produces a manifest controller when none is configured explicitly
pub type ManifestLoaderFactory<K> =
    Arc<dyn Fn() -> anyhow::Result<Arc<dyn ManifestController<K>>> + Send + Sync>;

/// Group used for prune whitelist entries that leave it empty
pub const CORE_GROUP: &str = "core";

/// A single named configuration step
pub enum ReconcilerOption<K: DeclarativeObject> {
    ManifestController(Arc<dyn ManifestController<K>>),
    RawManifestOperation(RawTransform<K>),
    ObjectTransformation(ObjectTransform<K>),
    Labels(LabelMaker<K>),
    OwnerFn(OwnerFn<K>),
    ApplyPrune,
    PruneWhitelist(Vec<GroupVersionKind>),
    PreserveNamespace,
    ApplyValidation,
    Kustomize,
    Status(Arc<dyn Status<K>>),
    Sink(Arc<dyn Sink<K>>),
}

impl<K: DeclarativeObject> Clone for ReconcilerOption<K> {
    fn clone(&self) -> Self {
        match self {
            Self::ManifestController(c) => Self::ManifestController(c.clone()),
            Self::RawManifestOperation(t) => Self::RawManifestOperation(t.clone()),
            Self::ObjectTransformation(t) => Self::ObjectTransformation(t.clone()),
            Self::Labels(l) => Self::Labels(l.clone()),
            Self::OwnerFn(f) => Self::OwnerFn(f.clone()),
            Self::ApplyPrune => Self::ApplyPrune,
            Self::PruneWhitelist(gvks) => Self::PruneWhitelist(gvks.clone()),
            Self::PreserveNamespace => Self::PreserveNamespace,
            Self::ApplyValidation => Self::ApplyValidation,
            Self::Kustomize => Self::Kustomize,
            Self::Status(s) => Self::Status(s.clone()),
            Self::Sink(s) => Self::Sink(s.clone()),
        }
    }
}

impl<K: DeclarativeObject> ReconcilerOption<K> {
    pub fn name(&self) -> &'static str {
        match self {
            Self::ManifestController(_) => "ManifestController",
            Self::RawManifestOperation(_) => "RawManifestOperation",
            Self::ObjectTransformation(_) => "ObjectTransformation",
            Self::Labels(_) => "Labels",
            Self::OwnerFn(_) => "OwnerFn",
            Self::ApplyPrune => "ApplyPrune",
            Self::PruneWhitelist(_) => "PruneWhitelist",
            Self::PreserveNamespace => "PreserveNamespace",
            Self::ApplyValidation => "ApplyValidation",
            Self::Kustomize => "Kustomize",
            Self::Status(_) => "Status",
            Self::Sink(_) => "Sink",
        }
    }
}

impl<K: DeclarativeObject> fmt::Debug for ReconcilerOption<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PruneWhitelist(gvks) => f.debug_tuple("PruneWhitelist").field(gvks).finish(),
            other => f.write_str(other.name()),
        }
    }
}

/// Finalized reconciler configuration
pub struct ReconcilerParams<K: DeclarativeObject> {
    pub(crate) manifest_controller: Option<Arc<dyn ManifestController<K>>>,
    pub(crate) raw_manifest_operations: Vec<RawTransform<K>>,
    pub(crate) object_transformations: Vec<ObjectTransform<K>>,
    pub(crate) label_maker: Option<LabelMaker<K>>,
    pub(crate) owner_fn: Option<OwnerFn<K>>,
    pub(crate) prune: bool,
    pub(crate) prune_whitelist: Vec<GroupVersionKind>,
    pub(crate) preserve_namespace: bool,
    pub(crate) validate: bool,
    pub(crate) kustomize: bool,
    pub(crate) status: Option<Arc<dyn Status<K>>>,
    pub(crate) sink: Option<Arc<dyn Sink<K>>>,
}

impl<K: DeclarativeObject> Default for ReconcilerParams<K> {
    fn default() -> Self {
        Self {
            manifest_controller: None,
            raw_manifest_operations: Vec::new(),
            object_transformations: Vec::new(),
            label_maker: None,
            owner_fn: None,
            prune: false,
            prune_whitelist: Vec::new(),
            preserve_namespace: false,
            validate: false,
            kustomize: false,
            status: None,
            sink: None,
        }
    }
}

impl<K: DeclarativeObject> ReconcilerParams<K> {
    /// Apply options in order; later steps override earlier ones
    pub fn from_options(options: impl IntoIterator<Item = ReconcilerOption<K>>) -> Self {
        let mut params = Self::default();
        for option in options {
            debug!(option = option.name(), "Applying reconciler option");
            params.apply(option);
        }
        params.prune_whitelist = normalize_prune_whitelist(params.prune_whitelist);
        params
    }

    fn apply(&mut self, option: ReconcilerOption<K>) {
        match option {
            ReconcilerOption::ManifestController(c) => self.manifest_controller = Some(c),
            ReconcilerOption::RawManifestOperation(t) => self.raw_manifest_operations.push(t),
            ReconcilerOption::ObjectTransformation(t) => self.object_transformations.push(t),
            ReconcilerOption::Labels(l) => self.label_maker = Some(l),
            ReconcilerOption::OwnerFn(f) => self.owner_fn = Some(f),
            ReconcilerOption::ApplyPrune => self.prune = true,
            ReconcilerOption::PruneWhitelist(gvks) => {
                self.prune = true;
                self.prune_whitelist.extend(gvks);
            }
            ReconcilerOption::PreserveNamespace => self.preserve_namespace = true,
            ReconcilerOption::ApplyValidation => self.validate = true,
            ReconcilerOption::Kustomize => self.kustomize = true,
            ReconcilerOption::Status(s) => self.status = Some(s),
            ReconcilerOption::Sink(s) => self.sink = Some(s),
        }
    }

    /// Check option compatibility, reporting every problem at once
    pub fn validate(&self) -> Result<()> {
        let mut errs = Vec::new();

        if self.prune && self.label_maker.is_none() {
            errs.push("ApplyPrune and PruneWhitelist must be used with the Labels option".to_string());
        }
        for gvk in &self.prune_whitelist {
            if gvk.group.is_empty() || gvk.version.is_empty() || gvk.kind.is_empty() {
                errs.push(format!(
                    "Incomplete GroupVersionKind was specified as part of the prune whitelist: \"{}/{}/{}\"",
                    gvk.group, gvk.version, gvk.kind
                ));
            }
        }
        if self.manifest_controller.is_none() {
            errs.push(
                "ManifestController must be set either by configuring a default manifest loader or specifying the ManifestController option"
                    .to_string(),
            );
        }

        if errs.is_empty() {
            Ok(())
        } else {
            Err(Error::invalid_options(errs.join(", ")))
        }
    }
}

/// Default empty whitelist groups to "core"
pub fn normalize_prune_whitelist(gvks: Vec<GroupVersionKind>) -> Vec<GroupVersionKind> {
    gvks.into_iter()
        .map(|mut gvk| {
            if gvk.group.is_empty() {
                gvk.group = CORE_GROUP.to_string();
            }
            gvk
        })
        .collect()
}

/// Arguments passed to the apply client alongside the manifest
///
/// Always forces; with prune enabled adds the label selector (labels in key
/// order) and one whitelist entry per group/version/kind.
pub fn apply_args(
    prune: bool,
    labels: &BTreeMap<String, String>,
    prune_whitelist: &[GroupVersionKind],
) -> Vec<String> {
    let mut args = vec!["--force".to_string()];

    if prune {
        let selector = labels
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(",");
        args.extend(["--prune".to_string(), "--selector".to_string(), selector]);

        for gvk in prune_whitelist {
            args.push("--prune-whitelist".to_string());
            args.push(format!("{}/{}/{}", gvk.group, gvk.version, gvk.kind));
        }
    }

    args
}

/// Assembles and validates a [`Reconciler`]
pub struct ReconcilerBuilder<K: DeclarativeObject> {
    begin: Vec<ReconcilerOption<K>>,
    options: Vec<ReconcilerOption<K>>,
    end: Vec<ReconcilerOption<K>>,
    default_manifest_loader: Option<ManifestLoaderFactory<K>>,
    overlay: Option<Arc<dyn OverlayAdapter>>,
    scheme: Scheme,
}

impl<K: DeclarativeObject> Default for ReconcilerBuilder<K> {
    fn default() -> Self {
        Self {
            begin: Vec::new(),
            options: Vec::new(),
            end: Vec::new(),
            default_manifest_loader: None,
            overlay: None,
            scheme: Scheme::new().register::<K>(),
        }
    }
}

impl<K: DeclarativeObject> ReconcilerBuilder<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a default applied before every per-reconciler option
    pub fn begin(mut self, option: ReconcilerOption<K>) -> Self {
        self.begin.push(option);
        self
    }

    /// Add a per-reconciler option
    pub fn with(mut self, option: ReconcilerOption<K>) -> Self {
        self.options.push(option);
        self
    }

    /// Add a default applied after every per-reconciler option
    pub fn end(mut self, option: ReconcilerOption<K>) -> Self {
        self.end.push(option);
        self
    }

    /// Manifest controller factory used when no option sets one
    pub fn default_manifest_loader(mut self, factory: ManifestLoaderFactory<K>) -> Self {
        self.default_manifest_loader = Some(factory);
        self
    }

    /// Overlay engine used when the Kustomize option is set
    pub fn overlay(mut self, overlay: Arc<dyn OverlayAdapter>) -> Self {
        self.overlay = Some(overlay);
        self
    }

    /// Scheme used to resolve owner types; the reconciled kind is registered already
    pub fn scheme(mut self, scheme: Scheme) -> Self {
        self.scheme = scheme;
        self
    }

    /// Finalize the options and construct the reconciler
    pub fn build(
        self,
        store: Arc<dyn ObjectStore<K>>,
        kubectl: Arc<dyn ApplyClient>,
    ) -> Result<Reconciler<K>> {
        let options = self
            .begin
            .into_iter()
            .chain(self.options)
            .chain(self.end);
        let mut params = ReconcilerParams::from_options(options);

        if params.manifest_controller.is_none() {
            if let Some(factory) = &self.default_manifest_loader {
                let loader = factory().map_err(|e| {
                    Error::invalid_options(format!("default manifest loader failed: {}", e))
                })?;
                params.manifest_controller = Some(loader);
            }
        }

        params.validate()?;
        if params.kustomize && self.overlay.is_none() {
            return Err(Error::invalid_options(
                "Kustomize option requires an overlay adapter",
            ));
        }

        Ok(Reconciler::from_parts(
            store,
            kubectl,
            self.overlay,
            self.scheme,
            params,
        ))
    }
}
