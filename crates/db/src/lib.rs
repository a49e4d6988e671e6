//! Content graph store and persistence helpers.
//!
//! - [`store`] holds the transactional in-memory graph of containers,
//!   resources, tags, relationships and segments.
//! - [`signals`] is the observer list notified on every mutation.
//! - [`resolution`] builds the read projections used for serving and
//!   indexing.
//! - [`repositories`] persist failed index writes to Postgres.

use sqlx::postgres::PgPoolOptions;

pub mod attachment;
pub mod models;
pub mod repositories;
pub mod resolution;
pub mod signals;
pub mod store;

pub use store::{GraphStore, Snapshot, Tables, UnitOfWork};

pub type DbPool = sqlx::PgPool;

/// Create a connection pool from a database URL.
pub async fn create_pool(database_url: &str) -> Result<DbPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await
}

/// Apply the bundled migrations.
pub async fn run_migrations(pool: &DbPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}

/// Verify the database answers a trivial query.
pub async fn health_check(pool: &DbPool) -> Result<(), sqlx::Error> {
    sqlx::query_scalar::<_, i32>("SELECT 1")
        .fetch_one(pool)
        .await
        .map(|_| ())
}
