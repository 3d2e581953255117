use super::CacheBackend;
use crate::cli::Args;
use crate::error::CacheError;
use crate::models::RawValue;
use async_trait::async_trait;
use log::{ info, warn };
use redis::{ AsyncCommands, Client };
use redis::aio::MultiplexedConnection;

/// Turn windows kept as Redis lists (LPUSH/LRANGE/LTRIM/EXPIRE).
// EXPIRE takes a signed count; a wrapped negative value would delete the key.
fn expiry_secs(seconds: u64) -> i64 {
    i64::try_from(seconds).unwrap_or(i64::MAX)
}

#[derive(Clone)]
pub struct RedisCacheBackend {
    conn: MultiplexedConnection,
}

impl RedisCacheBackend {
    pub fn new(conn: MultiplexedConnection) -> Self {
        Self { conn }
    }

    /// Connects when cache credentials are configured. Any failure disables
    /// caching for the process instead of aborting start-up.
    pub async fn init(args: &Args) -> Option<Self> {
        let url = args.cache_url()?;
        let client = match Client::open(url) {
            Ok(client) => client,
            Err(e) => {
                warn!("Invalid cache Redis URL, caching disabled: {}", e);
                return None;
            }
        };
        match client.get_multiplexed_async_connection().await {
            Ok(conn) => {
                info!("Turn cache connected to Redis");
                Some(Self::new(conn))
            }
            Err(e) => {
                warn!("Could not connect to cache Redis, caching disabled: {}", e);
                None
            }
        }
    }

    // Multiplexed connections are cheap to clone and safe to use concurrently.
    fn conn(&self) -> MultiplexedConnection {
        self.conn.clone()
    }
}

#[async_trait]
impl CacheBackend for RedisCacheBackend {
    async fn push_front(&self, key: &str, values: &[String]) -> Result<(), CacheError> {
        if values.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn();
        let _: () = conn.lpush(key, values.to_vec()).await?;
        Ok(())
    }

    async fn range(
        &self,
        key: &str,
        start: isize,
        stop: isize
    ) -> Result<Vec<RawValue>, CacheError> {
        let mut conn = self.conn();
        let entries: Vec<String> = conn.lrange(key, start, stop).await?;
        Ok(entries.into_iter().map(RawValue::Text).collect())
    }

    async fn trim(&self, key: &str, start: isize, stop: isize) -> Result<(), CacheError> {
        let mut conn = self.conn();
        let _: () = conn.ltrim(key, start, stop).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        let mut conn = self.conn();
        let _: () = conn.del(key).await?;
        Ok(())
    }

    async fn expire(&self, key: &str, seconds: u64) -> Result<(), CacheError> {
        let mut conn = self.conn();
        let _: () = conn.expire(key, expiry_secs(seconds)).await?;
        Ok(())
    }

    async fn replace_list(
        &self,
        key: &str,
        values: &[String],
        keep: usize,
        ttl_secs: u64
    ) -> Result<(), CacheError> {
        let mut conn = self.conn();
        let mut pipe = redis::pipe();
        pipe.atomic().del(key).ignore();
        if !values.is_empty() {
            pipe.lpush(key, values.to_vec())
                .ignore()
                .ltrim(key, 0, (keep as isize) - 1)
                .ignore()
                .expire(key, expiry_secs(ttl_secs))
                .ignore();
        }
        let _: () = pipe.query_async(&mut conn).await?;
        Ok(())
    }

    async fn push_bounded(
        &self,
        key: &str,
        value: String,
        keep: usize,
        ttl_secs: u64
    ) -> Result<(), CacheError> {
        let mut conn = self.conn();
        let _: () = redis::pipe()
            .atomic()
            .lpush(key, value)
            .ignore()
            .ltrim(key, 0, (keep as isize) - 1)
            .ignore()
            .expire(key, expiry_secs(ttl_secs))
            .ignore()
            .query_async(&mut conn).await?;
        Ok(())
    }
}
