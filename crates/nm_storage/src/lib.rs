use async_trait::async_trait;
use nm_core::{ArticleStore, Error, Result};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

pub mod backends;

pub use backends::*;

#[async_trait]
pub trait StorageBackend: Send + Sync {
    fn get_error_message() -> &'static str;
    async fn connect(location: &str) -> Result<Self> where Self: Sized;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StorageKind {
    Memory,
    #[default]
    SQLite,
}

impl fmt::Display for StorageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageKind::Memory => write!(f, "memory"),
            StorageKind::SQLite => write!(f, "sqlite"),
        }
    }
}

impl FromStr for StorageKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "memory" => Ok(StorageKind::Memory),
            "sqlite" => Ok(StorageKind::SQLite),
            other => Err(Error::Config(format!("Unknown storage backend: {}", other))),
        }
    }
}

impl StorageKind {
    pub fn error_message(self) -> &'static str {
        match self {
            StorageKind::Memory => MemoryStorage::get_error_message(),
            #[cfg(feature = "sqlite")]
            StorageKind::SQLite => SQLiteStorage::get_error_message(),
            #[cfg(not(feature = "sqlite"))]
            StorageKind::SQLite => "SQLite support was not compiled in",
        }
    }
}

async fn connect_backend<B>(location: &str) -> Result<Arc<dyn ArticleStore>>
where
    B: StorageBackend + ArticleStore + 'static,
{
    let backend = B::connect(location).await?;
    Ok(Arc::new(backend))
}

/// Opens the chosen backend. `location` is the database path for SQLite and
/// ignored by the memory store.
pub async fn create_storage(kind: StorageKind, location: &str) -> Result<Arc<dyn ArticleStore>> {
    match kind {
        StorageKind::Memory => connect_backend::<MemoryStorage>(location).await,
        #[cfg(feature = "sqlite")]
        StorageKind::SQLite => connect_backend::<SQLiteStorage>(location).await,
        #[cfg(not(feature = "sqlite"))]
        StorageKind::SQLite => Err(Error::Config("SQLite support was not compiled in".to_string())),
    }
}

pub mod prelude {
    pub use super::backends::*;
    pub use super::{create_storage, StorageBackend, StorageKind};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_kind_parsing() {
        assert_eq!("SQLite".parse::<StorageKind>().unwrap(), StorageKind::SQLite);
        assert_eq!("memory".parse::<StorageKind>().unwrap(), StorageKind::Memory);
        assert!("qdrant".parse::<StorageKind>().is_err());
    }

    #[tokio::test]
    async fn test_create_memory_storage() {
        let storage = create_storage(StorageKind::Memory, "").await.unwrap();
        storage.ping().await.unwrap();
        assert!(!storage.exists("http://example.com").await.unwrap());
    }
}
