//! Kubernetes controllers
//!
//! Watches Addon resources and hands each change to the declarative
//! reconciler.

mod addon_controller;

pub use addon_controller::{error_policy, requeue_after, run as run_addon_controller};

use std::sync::Arc;

use crate::crd::Addon;
use crate::reconcilers::Reconciler;

/// Shared context for the controller
pub struct Context {
    /// Reconciler driving every pass
    pub reconciler: Arc<Reconciler<Addon>>,
}

impl Context {
    /// Create a new context
    pub fn new(reconciler: Arc<Reconciler<Addon>>) -> Self {
        Self { reconciler }
    }
}
