//! Linked advertising accounts
//!
//! - [`models`]: the [`LinkedAccount`] record and the [`AccountFields`] carried into upserts
//! - [`repository`]: the storage seam, the [`AccountLinker`] upsert engine and an in-memory store
//! - `postgres`: the `PostgreSQL` store (feature `postgres`)
//! - [`handlers`]: listing and disconnecting accounts over HTTP

pub mod handlers;
pub mod models;
#[cfg(feature = "postgres")]
pub mod postgres;
pub mod repository;

pub use models::{AccountFields, AccountStatus, LinkedAccount, UnknownStatus};
#[cfg(feature = "postgres")]
pub use postgres::PgAccountRepository;
pub use repository::{
    AccountLinker, LinkedAccountRepository, MemoryAccountRepository, RepositoryError,
};
