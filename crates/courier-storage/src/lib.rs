//! Courier Storage - PostgreSQL persistence
//!
//! Row models, repository traits with their sqlx implementations, and the
//! durable `jobs` queue the delivery worker polls.

pub mod db;
pub mod models;
pub mod repository;

pub use db::DatabasePool;
pub use models::*;
pub use repository::*;
