use crate::error::{BoxError, FixtureError};
use async_trait::async_trait;
use futures_util::future::{BoxFuture, FutureExt};
use regex::Regex;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;

/// What a readiness strategy can observe about a started container.
#[async_trait]
pub trait ContainerProbe: Send + Sync {
    async fn logs(&self) -> Result<String, BoxError>;

    async fn health_state(&self) -> Result<Option<String>, BoxError>;

    /// Host and host port the given container tcp port is published on, if any yet.
    async fn published_address(&self, container_port: u16)
        -> Result<Option<(String, u16)>, BoxError>;
}

/// Decides when a freshly started container may be handed to tests.
#[derive(Debug, Clone)]
pub enum ReadyStrategy {
    /// The published port accepts tcp connections.
    ListeningPort(u16),
    /// The combined stdout/stderr matches `regex` at least `times` times.
    LogMessage { regex: Regex, times: usize },
    /// Docker reports the container healthcheck as `healthy`.
    Healthy,
    All(Vec<ReadyStrategy>),
    None,
}

impl ReadyStrategy {
    pub fn log_message(regex: &str, times: usize) -> Result<Self, FixtureError> {
        let regex = Regex::new(regex).map_err(|e| FixtureError::InvalidConfig {
            reason: format!("a valid regular expression was expected but got {regex}: {e}"),
        })?;
        Ok(ReadyStrategy::LogMessage { regex, times })
    }

    pub(crate) fn is_ready<'a>(
        &'a self,
        probe: &'a dyn ContainerProbe,
    ) -> BoxFuture<'a, Result<bool, BoxError>> {
        async move {
            match self {
                ReadyStrategy::ListeningPort(port) => match probe.published_address(*port).await? {
                    Some((host, host_port)) => {
                        Ok(TcpStream::connect((host.as_str(), host_port)).await.is_ok())
                    }
                    None => Ok(false),
                },
                ReadyStrategy::LogMessage { regex, times } => {
                    let logs = probe.logs().await?;
                    Ok(regex.find_iter(&logs).count() >= *times)
                }
                ReadyStrategy::Healthy => {
                    Ok(probe.health_state().await?.as_deref() == Some("healthy"))
                }
                ReadyStrategy::All(strategies) => {
                    for strategy in strategies {
                        if !strategy.is_ready(probe).await? {
                            return Ok(false);
                        }
                    }
                    Ok(true)
                }
                ReadyStrategy::None => Ok(true),
            }
        }
        .boxed()
    }

    /// Polls the probe every 100ms until ready or until `timeout` elapses.
    pub(crate) async fn wait(
        &self,
        probe: &dyn ContainerProbe,
        timeout: Duration,
    ) -> Result<(), BoxError> {
        let timeout_instant = Instant::now() + timeout;
        loop {
            if self.is_ready(probe).await? {
                return Ok(());
            }
            if timeout_instant < Instant::now() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        Err(format!("container takes more than {timeout:?} to be ready").into())
    }
}
