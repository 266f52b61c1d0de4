use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;
use surrealdb::Surreal;
use surrealdb::engine::any::Any;
use surrealdb::opt::auth::Root;

pub type Db = Surreal<Any>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Engine URL. `memory` for an in-process store, `surrealkv://path`
    /// for a file-backed store that survives restarts.
    pub url: String,
    pub namespace: String,
    pub database: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: env::var("RESOLVER_DB_URL").unwrap_or_else(|_| "memory".to_string()),
            namespace: env::var("RESOLVER_DB_NAMESPACE").unwrap_or_else(|_| "resolver".to_string()),
            database: env::var("RESOLVER_DB_DATABASE").unwrap_or_else(|_| "cache".to_string()),
            username: env::var("RESOLVER_DB_USERNAME").ok(),
            password: env::var("RESOLVER_DB_PASSWORD").ok(),
        }
    }
}

impl DatabaseConfig {
    /// Config pointing at the given engine URL, defaults for the rest.
    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }
}

pub async fn create_connection(config: DatabaseConfig) -> Result<Db> {
    let db = surrealdb::engine::any::connect(config.url).await?;

    // Sign in if credentials are provided
    if let (Some(username), Some(password)) = (config.username, config.password) {
        db.signin(Root {
            username: &username,
            password: &password,
        })
        .await?;
    }

    db.use_ns(config.namespace).use_db(config.database).await?;

    Ok(db)
}

pub async fn ensure_schema(db: &Db) -> Result<()> {
    // Single key-value table: record id = hex cache key, value = handler name.
    let schema_queries = vec![
        "DEFINE TABLE IF NOT EXISTS resolution_cache SCHEMAFULL;
         DEFINE FIELD IF NOT EXISTS handler ON TABLE resolution_cache TYPE string;
         DEFINE FIELD IF NOT EXISTS created_at ON TABLE resolution_cache VALUE time::now() READONLY;
         DEFINE FIELD IF NOT EXISTS updated_at ON TABLE resolution_cache VALUE time::now();",
    ];

    for query in schema_queries {
        db.query(query).await?;
    }

    Ok(())
}
