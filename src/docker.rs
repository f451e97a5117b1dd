use crate::{
    error::BoxError,
    image::ImageName,
    ready::{ContainerProbe, ReadyStrategy},
    runtime::{ContainerId, ContainerRuntime, LaunchRequest},
};
use async_trait::async_trait;
use docker_api::{
    models::{ContainerInspect200Response, ImageBuildChunk},
    opts::{ContainerCreateOpts, ContainerRemoveOpts, ImageListOpts, LogsOpts, PublishPort, PullOpts},
    Container, Docker,
};
use futures_util::StreamExt;
use log::{debug, info, warn};
use std::time::Duration;

/// [`ContainerRuntime`] backed by the local docker daemon.
pub struct DockerRuntime {
    docker: Docker,
    host: String,
}

impl Default for DockerRuntime {
    fn default() -> Self {
        Self::new(Docker::unix("/var/run/docker.sock"), "localhost")
    }
}

impl DockerRuntime {
    /// `host` is the address published container ports are reachable on.
    pub fn new<S: Into<String>>(docker: Docker, host: S) -> Self {
        DockerRuntime {
            docker,
            host: host.into(),
        }
    }

    async fn image_exists_locally(&self, image: &ImageName) -> Result<bool, docker_api::Error> {
        let images = self
            .docker
            .images()
            .list(&ImageListOpts::builder().filter(vec![image.local_filter()]).build())
            .await?;
        Ok(!images.is_empty())
    }

    /// Streams the pull, failing on the first error the daemon reports.
    async fn pull(&self, image: &ImageName) -> Result<(), BoxError> {
        let images = self.docker.images();
        let mut stream = images.pull(&PullOpts::builder().image(image.full_name()).build());
        while let Some(chunk) = stream.next().await {
            match chunk? {
                ImageBuildChunk::Error { error_detail, .. } => {
                    return Err(format!("pulling {image} failed: {}", error_detail.message).into())
                }
                chunk => debug!("🐋 {image}: {}", pull_progress(&chunk)),
            }
        }
        Ok(())
    }

    fn client(&self, container: &ContainerId) -> ContainerClient {
        ContainerClient {
            container: self.docker.containers().get(container.0.clone()),
            host: self.host.clone(),
        }
    }
}

fn create_opts(request: &LaunchRequest) -> ContainerCreateOpts {
    ContainerCreateOpts::builder()
        .image(request.image.as_str())
        .env(
            request
                .env
                .iter()
                .map(|(name, value)| format!("{name}={value}")),
        )
        .volumes(
            request
                .bind_mounts
                .iter()
                .map(|(host_path, container_path)| {
                    format!("{}:{container_path}", host_path.display())
                }),
        )
        .publish(PublishPort::tcp(request.exposed_port.into()))
        .publish_all_ports()
        .build()
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn launch(&self, request: &LaunchRequest) -> Result<ContainerId, BoxError> {
        let image: ImageName = request.image.parse()?;
        if !self.image_exists_locally(&image).await? {
            info!("🐋 Pulling image {image}");
            self.pull(&image).await?;
        }

        let client = ContainerClient {
            container: self.docker.containers().create(&create_opts(request)).await?,
            host: self.host.clone(),
        };
        let id = ContainerId(client.container.id().to_string());
        info!("🐋 Starting container {id} from {image}");

        if let Err(e) = client
            .start_and_wait(&request.ready_strategy, request.start_timeout)
            .await
        {
            if let Err(remove_error) = client.remove().await {
                warn!("🐋 Could not remove container {id} after failed start: {remove_error}");
            }
            return Err(e);
        }
        info!("🐋 Container {id} is ready");
        Ok(id)
    }

    async fn host(&self, container: &ContainerId) -> Result<String, BoxError> {
        let inspect = self.client(container).container.inspect().await?;
        let running = inspect
            .state
            .and_then(|state| state.running)
            .unwrap_or(false);
        if running {
            Ok(self.host.clone())
        } else {
            Err(format!("container {container} is not running").into())
        }
    }

    async fn mapped_port(&self, container: &ContainerId, port: u16) -> Result<u16, BoxError> {
        self.client(container)
            .published_address(port)
            .await?
            .map(|(_, host_port)| host_port)
            .ok_or_else(|| format!("port {port}/tcp of container {container} is not published").into())
    }

    async fn terminate(&self, container: &ContainerId) -> Result<(), BoxError> {
        self.client(container).remove().await?;
        info!("🐋 Container {container} is removed");
        Ok(())
    }
}

struct ContainerClient {
    container: Container,
    host: String,
}

impl ContainerClient {
    async fn start_and_wait(
        &self,
        ready_strategy: &ReadyStrategy,
        timeout: Duration,
    ) -> Result<(), BoxError> {
        self.container.start().await?;
        ready_strategy.wait(self, timeout).await
    }

    async fn remove(&self) -> Result<(), docker_api::Error> {
        self.container
            .remove(&ContainerRemoveOpts::builder().force(true).volumes(true).build())
            .await?;
        Ok(())
    }
}

#[async_trait]
impl ContainerProbe for ContainerClient {
    async fn logs(&self) -> Result<String, BoxError> {
        let opts = LogsOpts::builder().stdout(true).stderr(true).all().build();
        let mut stream = self.container.logs(&opts);
        let mut output = Vec::new();
        while let Some(chunk) = stream.next().await {
            output.extend_from_slice(&chunk?);
        }
        Ok(String::from_utf8_lossy(&output).into_owned())
    }

    async fn health_state(&self) -> Result<Option<String>, BoxError> {
        let health = self.container.inspect().await?.state.and_then(|s| s.health);
        Ok(health.and_then(|health| health.status))
    }

    async fn published_address(
        &self,
        container_port: u16,
    ) -> Result<Option<(String, u16)>, BoxError> {
        let inspect = self.container.inspect().await?;
        Ok(published_port(inspect, container_port).map(|port| (self.host.clone(), port)))
    }
}

/// Host port bound on all ipv4 interfaces for `container_port/tcp`.
fn published_port(inspect: ContainerInspect200Response, container_port: u16) -> Option<u16> {
    let port_spec = format!("{container_port}/tcp");
    inspect
        .network_settings?
        .ports?
        .remove(&port_spec)??
        .into_iter()
        .filter(|binding| binding.host_ip.as_deref() == Some("0.0.0.0"))
        .find_map(|binding| binding.host_port?.parse().ok())
}

fn pull_progress(chunk: &ImageBuildChunk) -> String {
    match chunk {
        ImageBuildChunk::PullStatus {
            status,
            id,
            progress,
            ..
        } => [Some(status.as_str()), id.as_deref(), progress.as_deref()]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>()
            .join(" "),
        ImageBuildChunk::Update { stream } => stream.trim().to_string(),
        ImageBuildChunk::Digest { aux } => format!("digest {}", aux.id),
        ImageBuildChunk::Error { error, .. } => error.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pull_status_skips_missing_parts() {
        let chunk = ImageBuildChunk::PullStatus {
            status: "Downloading".to_string(),
            id: Some("a1b2c3".to_string()),
            progress: None,
            progress_detail: None,
        };

        assert_eq!(pull_progress(&chunk), "Downloading a1b2c3");
    }

    #[test]
    fn update_stream_is_trimmed() {
        let chunk = ImageBuildChunk::Update {
            stream: "Status: Image is up to date\n".to_string(),
        };

        assert_eq!(pull_progress(&chunk), "Status: Image is up to date");
    }
}
