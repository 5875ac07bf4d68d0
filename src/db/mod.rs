//! Storage for user records.

pub mod connection;
pub mod credentials;
#[cfg(any(test, feature = "test-support"))]
pub mod memory;
pub mod store;

pub use connection::{
    ConnectionManager, Connector, MongoConnector, AUTH_DB, USERS_COLLECTION,
};
#[cfg(any(test, feature = "test-support"))]
pub use memory::InMemoryUserStore;
pub use store::{MongoUserStore, UserStore};
