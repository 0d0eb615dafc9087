//! Error types for detector attach and attribute publishing

use thiserror::Error;

/// Failures of the attribute tree capability.
#[derive(Error, Debug)]
pub enum TreeError {
    /// An attribute or node with this name is already published
    #[error("Attribute already exists: {name}")]
    AlreadyExists {
        /// Conflicting name
        name: String,
    },

    /// The namespace node has been removed or was never created
    #[error("Namespace node missing: {node}")]
    NodeMissing {
        /// Node path
        node: String,
    },

    /// The tree refused to create the entry
    #[error("Attribute rejected: {name}")]
    Rejected {
        /// Rejected name
        name: String,
    },

    /// IO error from a directory-backed tree
    #[error("IO error: {source}")]
    Io {
        /// Source IO error
        #[from]
        source: std::io::Error,
    },
}

/// Errors surfaced by `attach`.
///
/// Every variant is returned only after all partial state of the failed
/// attach has been released.
#[derive(Error, Debug)]
pub enum DetectorError {
    /// No usable register descriptor was supplied
    #[error("Register resource unavailable: {reason}")]
    ResourceUnavailable {
        /// What was wrong with the descriptor
        reason: String,
    },

    /// The register region could not be mapped
    #[error("Failed to map register at {path}: {source}")]
    MapFailed {
        /// Backing path of the region
        path: String,
        /// Source IO error
        source: std::io::Error,
    },

    /// The namespace node could not be created
    #[error("Failed to create namespace node {node}: {source}")]
    NamespaceCreateFailed {
        /// Requested node
        node: String,
        /// Source tree error
        source: TreeError,
    },

    /// Attribute publishing failed and was rolled back
    #[error("Failed to publish attributes: {source}")]
    PublishFailed {
        /// Source tree error
        #[from]
        source: TreeError,
    },

    /// A detector instance is already attached
    #[error("Detector already attached")]
    AlreadyAttached,

    /// Configuration rejected before attach
    #[error("Configuration error: {source}")]
    Config {
        /// Source configuration error
        #[from]
        source: hwmod::config::ConfigError,
    },
}

/// Result type for detector operations
pub type DetectorResult<T> = Result<T, DetectorError>;
