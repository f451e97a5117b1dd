//! Disposable etcd and PostgreSQL containers for integration tests.
//!
//! A fixture resolves its seed scripts, merges the request over the service
//! defaults, starts the container through a [`ContainerRuntime`] and exposes
//! the published endpoint until [`ContainerFixture::teardown`].

pub use error::{BoxError, FixtureError};
pub use etcd::EtcdFixture;
pub use fixture::{ContainerFixture, Endpoint, FixtureRequest, FixtureState, ServiceDefinition};
pub use postgres::PostgresFixture;
pub use runtime::{ContainerId, ContainerRuntime, LaunchRequest};
pub use scripts::InitScripts;

pub mod cleanup;
pub mod docker;
pub mod dsn;
pub mod error;
pub mod etcd;
pub mod fixture;
pub mod image;
pub mod merge;
pub mod postgres;
pub mod ready;
pub mod runtime;
pub mod scripts;
pub mod sql;

#[cfg(test)]
mod testing;
