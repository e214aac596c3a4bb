mod config;
mod error;
mod models;
pub mod store;

pub use config::MongoConfig;
pub use error::MongoDaoError;
pub use store::MongoBingoStore;

use crate::dao::storage::StorageError;

impl From<MongoDaoError> for StorageError {
    fn from(err: MongoDaoError) -> Self {
        match err {
            MongoDaoError::CorruptedDocument {
                collection,
                message,
            } => StorageError::corrupted(collection, message),
            other => StorageError::unavailable(other.to_string(), other),
        }
    }
}
