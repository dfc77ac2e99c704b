//! Declarative reconciliation pipeline
//!
//! This module contains the business logic that turns a resource instance into
//! applied cluster objects. It is responsible for:
//! - Assembling and validating reconciler options
//! - Resolving, transforming and parsing manifests
//! - Ordering objects for deployment
//! - Injecting owner references
//! - Driving the apply client and the status/sink hooks

mod hooks;
mod options;
mod order;
mod owner;
mod reconciler;
mod transforms;

pub use hooks::*;
pub use options::*;
pub use order::*;
pub use owner::*;
pub use reconciler::*;
pub use transforms::*;
