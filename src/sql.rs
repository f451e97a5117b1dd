use crate::error::BoxError;
use async_trait::async_trait;
use log::{debug, warn};
use tokio_postgres::{Client, NoTls};

/// Opens driver-level sessions from a connection string.
#[async_trait]
pub trait SqlConnector: Send + Sync {
    async fn connect(&self, dsn: &str) -> Result<Box<dyn SqlSession>, BoxError>;
}

#[async_trait]
pub trait SqlSession: Send + Sync {
    /// Runs `sql` as one batch of semicolon separated statements.
    async fn batch_execute(&self, sql: &str) -> Result<(), BoxError>;

    /// Ends the session; the driver connection shuts down with it.
    fn close(self: Box<Self>);
}

/// [`SqlConnector`] for PostgreSQL through `tokio-postgres`, without TLS.
#[derive(Debug, Default, Clone, Copy)]
pub struct PostgresConnector;

#[async_trait]
impl SqlConnector for PostgresConnector {
    async fn connect(&self, dsn: &str) -> Result<Box<dyn SqlSession>, BoxError> {
        let (client, connection) = tokio_postgres::connect(dsn, NoTls).await?;
        tokio::spawn(async move {
            match connection.await {
                Ok(()) => debug!("🐋 PostgreSQL connection closed"),
                Err(e) => warn!("🐋 PostgreSQL connection error: {e}"),
            }
        });
        Ok(Box::new(PostgresSession { client }))
    }
}

struct PostgresSession {
    client: Client,
}

#[async_trait]
impl SqlSession for PostgresSession {
    async fn batch_execute(&self, sql: &str) -> Result<(), BoxError> {
        self.client.batch_execute(sql).await?;
        Ok(())
    }

    fn close(self: Box<Self>) {
        // the spawned connection task completes once its client is dropped
        drop(self.client);
    }
}
