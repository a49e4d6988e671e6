//! Postgres repositories.

pub mod index_failure_repo;

pub use index_failure_repo::IndexFailureRepo;
