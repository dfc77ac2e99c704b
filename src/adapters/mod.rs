//! Adapters for the reconciler's external collaborators
//!
//! Default implementations of the traits in [`crate::reconcilers`]: manifest
//! loading from disk, `kubectl`/`kustomize` invocation, instance fetch and
//! status writes through the Kubernetes API, and webhook notifications.

mod kubectl;
mod kustomize;
mod loader;
mod status;
mod store;
mod webhook;

pub use kubectl::*;
pub use kustomize::*;
pub use loader::*;
pub use status::*;
pub use store::*;
pub use webhook::*;
