use crate::{error::BoxError, ready::ReadyStrategy};
use async_trait::async_trait;
use std::{collections::HashMap, fmt::Display, path::PathBuf, time::Duration};

/// Everything a runtime needs to bring up one service container.
#[derive(Debug, Clone)]
pub struct LaunchRequest {
    pub image: String,
    /// Container tcp port published on a random host port.
    pub exposed_port: u16,
    pub env: HashMap<String, String>,
    /// Host path to container path.
    pub bind_mounts: HashMap<PathBuf, String>,
    pub ready_strategy: ReadyStrategy,
    pub start_timeout: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContainerId(pub String);

impl Display for ContainerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Container lifecycle operations a fixture relies on.
///
/// `launch` only returns once the container is ready. An implementation that
/// fails after creating the container removes it before returning the error.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    async fn launch(&self, request: &LaunchRequest) -> Result<ContainerId, BoxError>;

    async fn host(&self, container: &ContainerId) -> Result<String, BoxError>;

    async fn mapped_port(&self, container: &ContainerId, port: u16) -> Result<u16, BoxError>;

    async fn terminate(&self, container: &ContainerId) -> Result<(), BoxError>;
}
