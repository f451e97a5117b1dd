use crate::{
    cleanup::CleanupRegistry,
    error::{BoxError, FixtureError},
    merge::merge,
    ready::ReadyStrategy,
    runtime::{ContainerId, ContainerRuntime, LaunchRequest},
    scripts::InitScripts,
};
use log::{debug, info, warn};
use std::{
    collections::HashMap,
    fmt::Display,
    path::PathBuf,
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

/// Defaults of a containerized service; requests are merged on top of them.
#[derive(Debug, Clone)]
pub struct ServiceDefinition {
    pub name: &'static str,
    pub image: &'static str,
    pub port: u16,
    pub default_env: HashMap<String, String>,
    pub ready_strategy: ReadyStrategy,
}

/// What a test asks for. Unset values fall back to the service defaults.
#[derive(Debug, Clone)]
pub struct FixtureRequest {
    image: Option<String>,
    env: HashMap<String, String>,
    bind_mounts: HashMap<PathBuf, String>,
    init_scripts: InitScripts,
    start_timeout: Duration,
}

impl Default for FixtureRequest {
    fn default() -> Self {
        FixtureRequest {
            image: None,
            env: HashMap::new(),
            bind_mounts: HashMap::new(),
            init_scripts: InitScripts::None,
            start_timeout: Duration::from_secs(60),
        }
    }
}

impl FixtureRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_image<S: Into<String>>(mut self, image: S) -> Self {
        self.image = Some(image.into());
        self
    }

    pub fn add_env<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn add_bind_mount<P: Into<PathBuf>, S: Into<String>>(
        mut self,
        host_path: P,
        container_path: S,
    ) -> Self {
        self.bind_mounts.insert(host_path.into(), container_path.into());
        self
    }

    pub fn with_init_scripts(mut self, init_scripts: InitScripts) -> Self {
        self.init_scripts = init_scripts;
        self
    }

    /// Accepts human durations such as `90s` or `2 minutes`.
    pub fn with_start_timeout(mut self, duration_expression: &str) -> Result<Self, FixtureError> {
        self.start_timeout = parse_duration::parse(duration_expression).map_err(|e| {
            FixtureError::InvalidConfig {
                reason: format!(
                    "a parseable duration was expected but got {duration_expression}: {e}"
                ),
            }
        })?;
        Ok(self)
    }

    pub fn start_timeout(&self) -> Duration {
        self.start_timeout
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FixtureState {
    Unstarted,
    Starting,
    Running,
    Failed,
    TornDown,
}

/// A started service container plus the temporary files it depends on.
///
/// Only running fixtures are ever handed out: [`ContainerFixture::create`]
/// rolls back and returns the error when any step fails.
pub struct ContainerFixture {
    service: &'static str,
    runtime: Arc<dyn ContainerRuntime>,
    container: ContainerId,
    endpoint: Endpoint,
    env: HashMap<String, String>,
    cleanup: CleanupRegistry,
    state: Mutex<FixtureState>,
}

impl ContainerFixture {
    pub async fn create(
        runtime: Arc<dyn ContainerRuntime>,
        service: &ServiceDefinition,
        request: FixtureRequest,
    ) -> Result<Self, FixtureError> {
        let cleanup = CleanupRegistry::default();
        let mut state = FixtureState::Unstarted;
        transition(service.name, &mut state, FixtureState::Starting);

        match launch(runtime.as_ref(), service, request, &cleanup).await {
            Ok((container, endpoint, env)) => {
                transition(service.name, &mut state, FixtureState::Running);
                info!("🐋 {} is listening on {endpoint}", service.name);
                Ok(ContainerFixture {
                    service: service.name,
                    runtime,
                    container,
                    endpoint,
                    env,
                    cleanup,
                    state: Mutex::new(state),
                })
            }
            Err(e) => {
                transition(service.name, &mut state, FixtureState::Failed);
                cleanup.purge();
                Err(e)
            }
        }
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn container(&self) -> &ContainerId {
        &self.container
    }

    /// Environment the container was started with, defaults included.
    pub fn env(&self) -> &HashMap<String, String> {
        &self.env
    }

    pub fn cleanup(&self) -> &CleanupRegistry {
        &self.cleanup
    }

    pub fn state(&self) -> FixtureState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Removes the temporary files and terminates the container.
    ///
    /// Failures are logged, not returned. Calling it again does nothing.
    pub async fn teardown(&self) {
        {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            if *state == FixtureState::TornDown {
                return;
            }
            transition(self.service, &mut *state, FixtureState::TornDown);
        }
        self.cleanup.purge();
        terminate_quietly(self.runtime.as_ref(), &self.container).await;
    }
}

fn transition(service: &str, state: &mut FixtureState, next: FixtureState) {
    debug!("🐋 {service}: {state:?} -> {next:?}");
    *state = next;
}

async fn launch(
    runtime: &dyn ContainerRuntime,
    service: &ServiceDefinition,
    request: FixtureRequest,
    cleanup: &CleanupRegistry,
) -> Result<(ContainerId, Endpoint, HashMap<String, String>), FixtureError> {
    let resolved = request.init_scripts.resolve()?;
    cleanup.adopt(resolved.temp_file);

    let env = merge(&service.default_env, &request.env);
    let launch_request = LaunchRequest {
        image: request.image.unwrap_or_else(|| service.image.to_string()),
        exposed_port: service.port,
        env: env.clone(),
        bind_mounts: merge(&resolved.mounts, &request.bind_mounts),
        ready_strategy: service.ready_strategy.clone(),
        start_timeout: request.start_timeout,
    };
    let container = runtime
        .launch(&launch_request)
        .await
        .map_err(|source| FixtureError::RuntimeLaunch {
            image: launch_request.image.clone(),
            source,
        })?;

    match query_endpoint(runtime, &container, service.port).await {
        Ok(endpoint) => Ok((container, endpoint, env)),
        Err(source) => {
            terminate_quietly(runtime, &container).await;
            Err(FixtureError::EndpointQuery {
                container: container.to_string(),
                source,
            })
        }
    }
}

async fn query_endpoint(
    runtime: &dyn ContainerRuntime,
    container: &ContainerId,
    port: u16,
) -> Result<Endpoint, BoxError> {
    let host = runtime.host(container).await?;
    let port = runtime.mapped_port(container, port).await?;
    Ok(Endpoint { host, port })
}

async fn terminate_quietly(runtime: &dyn ContainerRuntime, container: &ContainerId) {
    if let Err(e) = runtime.terminate(container).await {
        warn!("🐋 Could not terminate container {container}: {e}");
    }
}
