use crate::{
    docker::DockerRuntime,
    error::FixtureError,
    fixture::{ContainerFixture, Endpoint, FixtureRequest, ServiceDefinition},
    ready::ReadyStrategy,
    runtime::ContainerRuntime,
};
use std::{collections::HashMap, sync::Arc};

pub const ETCD_IMAGE: &str = "quay.io/coreos/etcd:v3.5.15";
pub const ETCD_PORT: u16 = 2379;

pub fn service() -> ServiceDefinition {
    let client_url = format!("http://0.0.0.0:{ETCD_PORT}");
    ServiceDefinition {
        name: "etcd",
        image: ETCD_IMAGE,
        port: ETCD_PORT,
        default_env: HashMap::from([
            ("ETCD_LISTEN_CLIENT_URLS".to_string(), client_url.clone()),
            ("ETCD_ADVERTISE_CLIENT_URLS".to_string(), client_url),
        ]),
        ready_strategy: ReadyStrategy::ListeningPort(ETCD_PORT),
    }
}

/// A single-node etcd without authentication.
pub struct EtcdFixture {
    fixture: ContainerFixture,
}

impl EtcdFixture {
    pub async fn start(request: FixtureRequest) -> Result<Self, FixtureError> {
        Self::start_with(Arc::new(DockerRuntime::default()), request).await
    }

    pub async fn start_with(
        runtime: Arc<dyn ContainerRuntime>,
        request: FixtureRequest,
    ) -> Result<Self, FixtureError> {
        let fixture = ContainerFixture::create(runtime, &service(), request).await?;
        Ok(EtcdFixture { fixture })
    }

    pub fn endpoint(&self) -> &Endpoint {
        self.fixture.endpoint()
    }

    /// Client endpoint as `host:port`.
    pub fn url(&self) -> String {
        self.fixture.endpoint().to_string()
    }

    pub fn fixture(&self) -> &ContainerFixture {
        &self.fixture
    }

    pub async fn teardown(&self) {
        self.fixture.teardown().await
    }
}
