use crate::{
    docker::DockerRuntime,
    dsn::postgres_dsn,
    error::FixtureError,
    fixture::{ContainerFixture, Endpoint, FixtureRequest, ServiceDefinition},
    ready::ReadyStrategy,
    runtime::ContainerRuntime,
    scripts::InitScripts,
    sql::{PostgresConnector, SqlConnector, SqlSession},
};
use log::info;
use std::{
    collections::HashMap,
    path::PathBuf,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::{SystemTime, UNIX_EPOCH},
};
use tokio::sync::RwLock;

pub const POSTGRES_IMAGE: &str = "postgres:12.4-alpine";
pub const POSTGRES_PORT: u16 = 5432;

const ENV_USER: &str = "POSTGRES_USER";
const ENV_PASSWORD: &str = "POSTGRES_PASSWORD";
const ENV_DB: &str = "POSTGRES_DB";

const DEFAULT_USER: &str = "postgres";
const DEFAULT_PASSWORD: &str = "password";
const DEFAULT_DB: &str = "postgres";

/// The server logs this once for the bootstrap instance that runs the init
/// scripts and once more for the final one.
const READY_LOG: &str = "database system is ready to accept connections";

pub fn service() -> Result<ServiceDefinition, FixtureError> {
    Ok(ServiceDefinition {
        name: "postgres",
        image: POSTGRES_IMAGE,
        port: POSTGRES_PORT,
        default_env: HashMap::from([
            (ENV_DB.to_string(), DEFAULT_DB.to_string()),
            (ENV_PASSWORD.to_string(), DEFAULT_PASSWORD.to_string()),
        ]),
        ready_strategy: ReadyStrategy::All(vec![
            ReadyStrategy::log_message(READY_LOG, 2)?,
            ReadyStrategy::ListeningPort(POSTGRES_PORT),
        ]),
    })
}

/// A disposable PostgreSQL server able to hand out fresh databases.
///
/// ```no_run
/// # async fn demo() -> Result<(), testfixtures::FixtureError> {
/// use testfixtures::{FixtureRequest, InitScripts, PostgresFixture};
///
/// let postgres = PostgresFixture::start(FixtureRequest::new()).await?;
/// let dsn = postgres
///     .create_database("orders", InitScripts::inline("create table orders(id int);"))
///     .await?;
/// // ... run the code under test against `dsn`
/// postgres.teardown().await;
/// # Ok(())
/// # }
/// ```
pub struct PostgresFixture {
    fixture: ContainerFixture,
    connector: Arc<dyn SqlConnector>,
    primary: RwLock<Option<Box<dyn SqlSession>>>,
}

impl PostgresFixture {
    pub async fn start(request: FixtureRequest) -> Result<Self, FixtureError> {
        Self::start_with(
            Arc::new(DockerRuntime::default()),
            Arc::new(PostgresConnector),
            request,
        )
        .await
    }

    /// Starts the server and opens the session later used to create databases.
    pub async fn start_with(
        runtime: Arc<dyn ContainerRuntime>,
        connector: Arc<dyn SqlConnector>,
        request: FixtureRequest,
    ) -> Result<Self, FixtureError> {
        let fixture = ContainerFixture::create(runtime, &service()?, request).await?;
        let mut postgres = PostgresFixture {
            fixture,
            connector,
            primary: RwLock::new(None),
        };
        let dsn = postgres.dsn();
        match postgres.connector.connect(&dsn).await {
            Ok(session) => {
                postgres.primary = RwLock::new(Some(session));
                Ok(postgres)
            }
            Err(source) => {
                postgres.fixture.teardown().await;
                Err(FixtureError::provision(postgres.database(), source))
            }
        }
    }

    pub fn endpoint(&self) -> &Endpoint {
        self.fixture.endpoint()
    }

    pub fn fixture(&self) -> &ContainerFixture {
        &self.fixture
    }

    pub fn user(&self) -> &str {
        self.env_or(ENV_USER, DEFAULT_USER)
    }

    pub fn password(&self) -> &str {
        self.env_or(ENV_PASSWORD, DEFAULT_PASSWORD)
    }

    pub fn database(&self) -> &str {
        self.env_or(ENV_DB, DEFAULT_DB)
    }

    /// Connection string of the database created with the container.
    pub fn dsn(&self) -> String {
        self.dsn_for(self.database())
    }

    fn dsn_for(&self, database: &str) -> String {
        let endpoint = self.fixture.endpoint();
        postgres_dsn(
            self.user(),
            self.password(),
            &endpoint.host,
            endpoint.port,
            database,
        )
    }

    fn env_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.fixture.env().get(key).map_or(default, String::as_str)
    }

    /// Creates `{prefix}_{nanos}` (lowercased), runs `scripts` against it and returns its
    /// connection string.
    ///
    /// A database whose scripts fail is left in place for inspection.
    pub async fn create_database(
        &self,
        prefix: &str,
        scripts: InitScripts,
    ) -> Result<String, FixtureError> {
        let name = unique_database_name(prefix);

        let resolved = scripts.resolve()?;
        let files = resolved
            .script_files()
            .await
            .map_err(|e| FixtureError::provision(&name, e))?;
        self.fixture.cleanup().adopt(resolved.temp_file);

        {
            let primary = self.primary.read().await;
            let primary = primary
                .as_ref()
                .ok_or_else(|| FixtureError::provision(&name, "fixture is torn down"))?;
            primary
                .batch_execute(&format!("create database {name}"))
                .await
                .map_err(|e| FixtureError::provision(&name, e))?;
        }

        let dsn = self.dsn_for(&name);
        let session = self
            .connector
            .connect(&dsn)
            .await
            .map_err(|e| FixtureError::provision(&name, e))?;
        let applied = apply_scripts(session.as_ref(), &files, &name).await;
        session.close();
        applied?;

        info!("🐋 Database {name} is ready");
        Ok(dsn)
    }

    /// Closes the primary session, then tears the container down.
    pub async fn teardown(&self) {
        if let Some(session) = self.primary.write().await.take() {
            session.close();
        }
        self.fixture.teardown().await;
    }
}

async fn apply_scripts(
    session: &dyn SqlSession,
    files: &[PathBuf],
    database: &str,
) -> Result<(), FixtureError> {
    for file in files {
        let sql = tokio::fs::read_to_string(file).await.map_err(|e| {
            FixtureError::provision(database, format!("could not read {}: {e}", file.display()))
        })?;
        session
            .batch_execute(&sql)
            .await
            .map_err(|e| FixtureError::provision(database, e))?;
    }
    Ok(())
}

static LAST_SUFFIX: AtomicU64 = AtomicU64::new(0);

/// Suffixes are unix nanoseconds, bumped when the clock has not moved on.
/// The prefix is lowercased since postgres folds unquoted identifiers.
fn unique_database_name(prefix: &str) -> String {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_nanos() as u64);
    let next = |last: u64| now.max(last + 1);
    let previous = LAST_SUFFIX
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| Some(next(last)))
        .unwrap_or_else(|last| last);
    format!("{}_{}", prefix.to_lowercase(), next(previous))
}
