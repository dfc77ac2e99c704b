//! Error types for the declarative reconciler

use thiserror::Error;

/// Result type alias using the reconciler's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Reconciler error types
///
/// Every stage of a reconciliation pass has its own variant so callers can
/// tell where a pass failed and pick a retry policy accordingly.
#[derive(Error, Debug)]
pub enum Error {
    /// Kubernetes API error (fetching the resource instance, status writes)
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    /// Reconciler options are inconsistent
    #[error("Invalid reconciler options: {0}")]
    InvalidOptions(String),

    /// Status hook vetoed the pass
    #[error("Preflight check failed: {0}")]
    Preflight(#[source] anyhow::Error),

    /// Manifest controller could not resolve the raw manifest
    #[error("Error loading manifest: {0}")]
    ManifestResolution(#[source] anyhow::Error),

    /// A raw or object transformation failed
    #[error("Error transforming manifest: {0}")]
    Transform(#[source] anyhow::Error),

    /// Manifest text could not be parsed into objects
    #[error("Error parsing manifest: {0}")]
    Parse(String),

    /// Overlay engine failed to render the final manifest
    #[error("Error running overlay: {0}")]
    Overlay(#[source] anyhow::Error),

    /// Owner function failed
    #[error("Error resolving owner reference: {0}")]
    OwnerResolution(#[source] anyhow::Error),

    /// Apply client failed
    #[error("Error applying manifest: {0}")]
    Apply(#[source] anyhow::Error),

    /// Sink notification failed
    #[error("Error notifying sink: {0}")]
    Notify(#[source] anyhow::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Create a parse error
    pub fn parse(msg: impl Into<String>) -> Self {
        Error::Parse(msg.into())
    }

    /// Create an options validation error
    pub fn invalid_options(msg: impl Into<String>) -> Self {
        Error::InvalidOptions(msg.into())
    }

    /// Short stage name, used as a metrics label
    pub fn stage(&self) -> &'static str {
        match self {
            Error::Kube(_) => "fetch",
            Error::InvalidOptions(_) => "options",
            Error::Preflight(_) => "preflight",
            Error::ManifestResolution(_) => "manifest",
            Error::Transform(_) => "transform",
            Error::Parse(_) => "parse",
            Error::Overlay(_) => "overlay",
            Error::OwnerResolution(_) => "owner",
            Error::Apply(_) => "apply",
            Error::Notify(_) => "notify",
            Error::Config(_) => "config",
            Error::Serialization(_) => "serialization",
            Error::Io(_) => "io",
        }
    }
}
