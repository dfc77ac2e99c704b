//! Custom Resource Definitions for the declarative reconciler

mod addon;

pub use addon::*;

use kube::CustomResourceExt;

/// Generate all CRD YAML manifests
pub fn generate_crds() -> Result<Vec<String>, serde_yaml::Error> {
    Ok(vec![serde_yaml::to_string(&Addon::crd())?])
}
