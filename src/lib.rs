//! Declarative reconciler for Kubernetes
//!
//! Turns a custom resource instance into a set of target objects loaded from
//! manifest packages, transforms and orders them, links them to their owner
//! and applies them to the cluster.

pub mod adapters;
pub mod config;
pub mod controllers;
pub mod crd;
pub mod error;
pub mod manifest;
pub mod metrics;
pub mod reconcilers;

pub use error::{Error, Result};
