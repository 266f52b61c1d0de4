pub mod connection;
pub mod cache;

pub use connection::{DatabaseConfig, Db, create_connection, ensure_schema};
pub use cache::ResolutionCache;
