//! In-memory collaborators for unit tests.

use crate::{
    error::BoxError,
    runtime::{ContainerId, ContainerRuntime, LaunchRequest},
    sql::{SqlConnector, SqlSession},
};
use async_trait::async_trait;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex,
};

#[derive(Default)]
pub(crate) struct FakeRuntime {
    pub fail_launch: bool,
    pub fail_port: bool,
    pub launches: Mutex<Vec<LaunchRequest>>,
    pub terminated: Mutex<Vec<ContainerId>>,
}

impl FakeRuntime {
    pub fn launches(&self) -> Vec<LaunchRequest> {
        self.launches.lock().unwrap().clone()
    }

    pub fn terminated(&self) -> Vec<ContainerId> {
        self.terminated.lock().unwrap().clone()
    }
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn launch(&self, request: &LaunchRequest) -> Result<ContainerId, BoxError> {
        let mut launches = self.launches.lock().unwrap();
        launches.push(request.clone());
        if self.fail_launch {
            return Err("image not found".into());
        }
        Ok(ContainerId(format!("fake-{}", launches.len())))
    }

    async fn host(&self, _: &ContainerId) -> Result<String, BoxError> {
        Ok("localhost".to_string())
    }

    async fn mapped_port(&self, _: &ContainerId, _: u16) -> Result<u16, BoxError> {
        if self.fail_port {
            return Err("port is not published".into());
        }
        Ok(49153)
    }

    async fn terminate(&self, container: &ContainerId) -> Result<(), BoxError> {
        self.terminated.lock().unwrap().push(container.clone());
        Ok(())
    }
}

/// Records every batch per connection string instead of talking to a server.
#[derive(Default, Clone)]
pub(crate) struct FakeConnector {
    /// Batches containing this text fail.
    pub fail_on: Option<String>,
    pub refuse_connections: bool,
    pub executed: Arc<Mutex<Vec<(String, String)>>>,
    pub open_sessions: Arc<AtomicUsize>,
}

impl FakeConnector {
    pub fn executed(&self) -> Vec<(String, String)> {
        self.executed.lock().unwrap().clone()
    }

    pub fn open_sessions(&self) -> usize {
        self.open_sessions.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SqlConnector for FakeConnector {
    async fn connect(&self, dsn: &str) -> Result<Box<dyn SqlSession>, BoxError> {
        if self.refuse_connections {
            return Err("connection refused".into());
        }
        self.open_sessions.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeSession {
            dsn: dsn.to_string(),
            connector: self.clone(),
        }))
    }
}

struct FakeSession {
    dsn: String,
    connector: FakeConnector,
}

#[async_trait]
impl SqlSession for FakeSession {
    async fn batch_execute(&self, sql: &str) -> Result<(), BoxError> {
        self.connector
            .executed
            .lock()
            .unwrap()
            .push((self.dsn.clone(), sql.to_string()));
        match &self.connector.fail_on {
            Some(needle) if sql.contains(needle.as_str()) => Err(format!("syntax error in {sql}").into()),
            _ => Ok(()),
        }
    }

    fn close(self: Box<Self>) {
        self.connector.open_sessions.fetch_sub(1, Ordering::SeqCst);
    }
}
