use std::path::PathBuf;
use thiserror::Error;

/// Error returned by collaborators (container runtime, SQL driver).
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum FixtureError {
    #[error("init script path should be absolute but was {}", path.display())]
    InvalidSpec { path: PathBuf },

    #[error("failed to materialize inline init script: {source}")]
    ResolutionIo {
        #[source]
        source: std::io::Error,
    },

    #[error("container {image} failed to start: {source}")]
    RuntimeLaunch { image: String, source: BoxError },

    #[error("failed to query endpoint of container {container}: {source}")]
    EndpointQuery { container: String, source: BoxError },

    #[error("failed to provision database {database}: {source}")]
    Provision { database: String, source: BoxError },

    #[error("invalid fixture configuration: {reason}")]
    InvalidConfig { reason: String },
}

impl FixtureError {
    pub(crate) fn provision<E: Into<BoxError>>(database: &str, source: E) -> Self {
        FixtureError::Provision {
            database: database.to_string(),
            source: source.into(),
        }
    }
}
