//! Startup-level errors. Per-connection failures never surface here; they
//! are handled by tearing down the affected connection.

use crate::catalog::CatalogError;
use crate::config::ConfigError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    /// Failed to bind the listen address.
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Item catalog error: {0}")]
    Catalog(#[from] CatalogError),
}
