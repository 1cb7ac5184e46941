//! SurrealDB connection backing the vector store collections.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use surrealdb::engine::any::Any;
use surrealdb::opt::auth::Root;
use surrealdb::opt::capabilities::Capabilities;
use surrealdb::Surreal;

use crate::AutoembedError;

/// Database handle shared by every collection, embedded or remote.
pub type AutoembedDb = Surreal<Any>;

pub const DB_URL_ENV: &str = "AUTOEMBED_DB_URL";
pub const DB_USER_ENV: &str = "AUTOEMBED_DB_USER";
pub const DB_PASS_ENV: &str = "AUTOEMBED_DB_PASS";

const DEFAULT_NAMESPACE: &str = "autoembed";
const DEFAULT_DATABASE: &str = "embeddings";
const DEFAULT_ROOT: &str = "root";

/// `database` section of the project config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum DbConfig {
    /// RocksDB inside the process. Defaults to the data path.
    Embedded {
        #[serde(default)]
        path: Option<PathBuf>,
    },
    /// SurrealDB server over WebSocket, e.g. `ws://127.0.0.1:8000`.
    Remote {
        endpoint: String,
        #[serde(default)]
        username: Option<String>,
        #[serde(default)]
        password: Option<String>,
        #[serde(default)]
        namespace: Option<String>,
        #[serde(default)]
        database: Option<String>,
    },
}

impl Default for DbConfig {
    fn default() -> Self {
        Self::Embedded { path: None }
    }
}

/// Root credentials for a remote server.
#[derive(Debug, Clone, PartialEq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl DbConfig {
    /// Remote config from `AUTOEMBED_DB_URL`, if set.
    pub fn from_env() -> Option<Self> {
        let endpoint = std::env::var(DB_URL_ENV).ok()?;
        Some(Self::Remote {
            endpoint,
            username: None,
            password: None,
            namespace: None,
            database: None,
        })
    }

    /// Connection string handed to `surrealdb::engine::any::connect`.
    pub fn address(&self, data_path: &Path) -> String {
        match self {
            Self::Embedded { path } => {
                let path = path.as_deref().unwrap_or(data_path);
                format!("rocksdb:{}", path.display())
            }
            Self::Remote { endpoint, .. } => endpoint.clone(),
        }
    }

    /// Namespace and database the collections live in.
    pub fn scope(&self) -> (&str, &str) {
        match self {
            Self::Embedded { .. } => (DEFAULT_NAMESPACE, DEFAULT_DATABASE),
            Self::Remote {
                namespace,
                database,
                ..
            } => (
                namespace.as_deref().unwrap_or(DEFAULT_NAMESPACE),
                database.as_deref().unwrap_or(DEFAULT_DATABASE),
            ),
        }
    }

    /// Config fields win over `AUTOEMBED_DB_USER`/`AUTOEMBED_DB_PASS`, then `root`.
    /// Embedded databases need none.
    pub fn credentials(&self) -> Option<Credentials> {
        let Self::Remote {
            username, password, ..
        } = self
        else {
            return None;
        };
        let pick = |field: &Option<String>, env: &str| {
            field
                .clone()
                .or_else(|| std::env::var(env).ok())
                .unwrap_or_else(|| DEFAULT_ROOT.to_string())
        };
        Some(Credentials {
            username: pick(username, DB_USER_ENV),
            password: pick(password, DB_PASS_ENV),
        })
    }
}

/// Project `database` section, else `AUTOEMBED_DB_URL`, else embedded.
pub fn resolve_db_config(configured: Option<&DbConfig>) -> DbConfig {
    configured
        .cloned()
        .or_else(|| {
            let from_env = DbConfig::from_env();
            if from_env.is_some() {
                tracing::info!("Using remote vector store from {}", DB_URL_ENV);
            }
            from_env
        })
        .unwrap_or_default()
}

/// Connect, sign in when remote, and select the namespace and database.
pub async fn init_db(config: &DbConfig, data_path: &Path) -> Result<AutoembedDb, AutoembedError> {
    let address = config.address(data_path);
    let db = match config {
        DbConfig::Embedded { .. } => {
            let options = surrealdb::opt::Config::new()
                .capabilities(Capabilities::all().with_all_experimental_features_allowed());
            surrealdb::engine::any::connect((address.as_str(), options)).await?
        }
        DbConfig::Remote { .. } => surrealdb::engine::any::connect(address.as_str()).await?,
    };

    if let Some(credentials) = config.credentials() {
        db.signin(Root {
            username: &credentials.username,
            password: &credentials.password,
        })
        .await?;
    }

    let (namespace, database) = config.scope();
    db.use_ns(namespace).use_db(database).await?;
    tracing::debug!(address = %address, namespace, database, "Vector store connected");
    Ok(db)
}
