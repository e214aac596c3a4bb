use std::time::Duration;

use mongodb::options::ClientOptions;

use super::error::{MongoDaoError, MongoResult};

/// Lease applied to the claim lock when no override is configured.
const DEFAULT_CLAIM_LOCK_LEASE: Duration = Duration::from_secs(30);
/// Pings attempted per connection before reporting the deployment unreachable.
const DEFAULT_CONNECT_ATTEMPTS: u32 = 5;

#[derive(Clone)]
pub struct MongoConfig {
    pub options: ClientOptions,
    pub database_name: String,
    /// How long a claim lock survives a holder that never releases it.
    pub claim_lock_lease: Duration,
    pub connect_attempts: u32,
}

impl MongoConfig {
    pub async fn from_uri(uri: &str, db_name: Option<&str>) -> MongoResult<Self> {
        let database_name = db_name.unwrap_or("ticket_bingo").to_owned();
        let options =
            ClientOptions::parse(uri)
                .await
                .map_err(|source| MongoDaoError::InvalidUri {
                    uri: uri.to_owned(),
                    source,
                })?;

        Ok(Self {
            options,
            database_name,
            claim_lock_lease: DEFAULT_CLAIM_LOCK_LEASE,
            connect_attempts: DEFAULT_CONNECT_ATTEMPTS,
        })
    }

    /// Override the claim lock lease.
    pub fn with_claim_lock_lease(mut self, lease: Duration) -> Self {
        self.claim_lock_lease = lease;
        self
    }

    /// Override how many pings a connection attempt makes; at least one.
    pub fn with_connect_attempts(mut self, attempts: u32) -> Self {
        self.connect_attempts = attempts.max(1);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn connect_attempts_default_and_floor() {
        let config = MongoConfig::from_uri("mongodb://localhost:27017", None)
            .await
            .expect("plain uri parses");
        assert_eq!(config.connect_attempts, DEFAULT_CONNECT_ATTEMPTS);
        assert_eq!(config.database_name, "ticket_bingo");

        let config = config.with_connect_attempts(0);
        assert_eq!(config.connect_attempts, 1);
    }

    #[tokio::test]
    async fn malformed_uri_is_reported() {
        let result = MongoConfig::from_uri("not-a-uri", Some("bingo")).await;
        assert!(matches!(result, Err(MongoDaoError::InvalidUri { .. })));
    }
}
