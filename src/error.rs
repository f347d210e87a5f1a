use std::path::PathBuf;

use thiserror::Error;

/// everything that can go wrong between reading the site configuration
/// and emitting a template. All of these surface before any deployment
/// engine is contacted.
#[derive(Debug, Error)]
pub enum DescriptorError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {path:?}: {source}")]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Failed to parse {path:?}: {source}")]
    DotEnv {
        path: PathBuf,
        #[source]
        source: dotenvy::Error,
    },

    #[error("Invalid principal: {0}")]
    InvalidPrincipal(String),

    #[error("Invalid certificate: {0}")]
    InvalidCertificate(String),

    #[error("Certificate for {certificate_domain} does not cover the site domain {site_domain}")]
    DomainMismatch {
        certificate_domain: String,
        site_domain: String,
    },

    #[error("Validation failed on resource '{name}'\n{message}")]
    InvalidResource { name: String, message: String },

    #[error("Invalid resource graph: {0}")]
    DependencyGraph(String),

    #[error("Failed to serialize template: {0}")]
    Serialize(#[from] serde_json::Error),
}
