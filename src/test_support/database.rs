//! Disposable PostgreSQL databases loaded with the Mastodon tables the
//! importers read.

use log::LevelFilter;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{ConnectOptions, Executor, PgPool};
use testcontainers::{GenericImage, ImageExt, core::WaitFor};
use testcontainers_modules::testcontainers::{
    ContainerAsync, core::error::TestcontainersError, runners::AsyncRunner,
};
use thiserror::Error;
use tokio::runtime::Handle;
use uuid::Uuid;

const SCHEMA: &str = include_str!("schema.sql");

#[derive(Debug, Error)]
pub enum TestDatabaseError {
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("container error: {0}")]
    Container(#[from] TestcontainersError),
}

/// One fresh database per test, dropped again on `close` or drop.
pub struct TestDatabase {
    pool: Option<PgPool>,
    admin_options: PgConnectOptions,
    database_name: String,
    container: Option<ContainerAsync<GenericImage>>,
}

impl TestDatabase {
    /// Use the server at `TEST_DATABASE_URL` when set, otherwise launch a
    /// Postgres container.
    pub async fn new_from_env() -> Result<Self, TestDatabaseError> {
        match std::env::var("TEST_DATABASE_URL") {
            Ok(url) => Self::provision(&url, None).await,
            Err(_) => Self::new().await,
        }
    }

    /// Provision a database inside a disposable Postgres container.
    pub async fn new() -> Result<Self, TestDatabaseError> {
        let container = GenericImage::new("postgres", "16-alpine")
            .with_wait_for(WaitFor::message_on_stdout(
                "database system is ready to accept connections",
            ))
            .with_wait_for(WaitFor::message_on_stderr(
                "database system is ready to accept connections",
            ))
            .with_env_var("POSTGRES_DB", "postgres")
            .with_env_var("POSTGRES_USER", "postgres")
            .with_env_var("POSTGRES_PASSWORD", "postgres")
            .start()
            .await?;

        let host = container.get_host().await?.to_string();
        let port = container.get_host_port_ipv4(5432).await?;
        let admin_url = format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

        Self::provision(&admin_url, Some(container)).await
    }

    async fn provision(
        admin_url: &str,
        container: Option<ContainerAsync<GenericImage>>,
    ) -> Result<Self, TestDatabaseError> {
        let base_options: PgConnectOptions = admin_url.parse()?;
        let base_options = base_options.log_statements(LevelFilter::Off);

        let base_name = base_options
            .get_database()
            .map(|name| name.to_string())
            .unwrap_or_else(|| "postgres".to_string());

        let admin_options = base_options.clone();
        let admin_pool = PgPoolOptions::new()
            .max_connections(1)
            .connect_with(admin_options.clone())
            .await?;

        let database_name = format!("{}_{}", base_name, Uuid::new_v4().simple());
        let create_sql = format!("CREATE DATABASE \"{}\" TEMPLATE template0", database_name);
        sqlx::query(&create_sql).execute(&admin_pool).await?;
        admin_pool.close().await;

        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect_with(base_options.database(&database_name))
            .await?;
        pool.execute(SCHEMA).await?;

        Ok(Self {
            pool: Some(pool),
            admin_options,
            database_name,
            container,
        })
    }

    pub fn pool(&self) -> &PgPool {
        self.pool.as_ref().expect("test database pool is available")
    }

    pub fn pool_clone(&self) -> PgPool {
        self.pool().clone()
    }

    /// Run a multi-statement fixture script.
    pub async fn seed(&self, script: &str) -> Result<(), TestDatabaseError> {
        self.pool().execute(script).await?;
        Ok(())
    }

    /// Close the pool and drop the database.
    pub async fn close(mut self) -> Result<(), TestDatabaseError> {
        if let Some(pool) = self.pool.take() {
            pool.close().await;
        }

        drop_database(self.admin_options.clone(), &self.database_name).await?;
        self.container.take();
        Ok(())
    }
}

async fn drop_database(admin_options: PgConnectOptions, name: &str) -> Result<(), sqlx::Error> {
    let admin_pool = PgPoolOptions::new()
        .max_connections(1)
        .connect_with(admin_options)
        .await?;

    let drop_sql = format!("DROP DATABASE IF EXISTS \"{}\" WITH (FORCE)", name);
    sqlx::query(&drop_sql).execute(&admin_pool).await?;
    admin_pool.close().await;
    Ok(())
}

impl Drop for TestDatabase {
    fn drop(&mut self) {
        // a container takes its databases with it
        if self.container.is_some() {
            return;
        }

        if let Some(pool) = self.pool.take() {
            let admin_options = self.admin_options.clone();
            let name = self.database_name.clone();
            if let Ok(handle) = Handle::try_current() {
                handle.spawn(async move {
                    pool.close().await;
                    let _ = drop_database(admin_options, &name).await;
                });
            }
        }
    }
}
