pub mod connection;
pub mod migrations;
pub mod repositories;
pub mod store;

pub use connection::{connect, ephemeral_config, DbPool};
pub use repositories::{
    InMemoryRequestRepository, RepositoryError, RequestRepository, SqlRequestRepository,
};
pub use store::{RequestStore, StoreError};
