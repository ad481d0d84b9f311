use std::time::Duration;

use async_trait::async_trait;

use super::core::RedisPersistence;
use crate::common::error::Result;
use crate::persistence::traits::KvCache;
use deadpool_redis::redis::AsyncCommands;

#[async_trait]
impl KvCache for RedisPersistence {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.pool.get().await?;
        let value: Option<String> = conn.get(self.key_cache(key)).await?;
        Ok(value)
    }

    async fn put(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let mut conn = self.pool.get().await?;
        // EX 最小 1 秒
        let secs = ttl.as_secs().max(1);
        conn.set_ex::<_, _, ()>(self.key_cache(key), value, secs)
            .await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.pool.get().await?;
        conn.del::<_, ()>(self.key_cache(key)).await?;
        Ok(())
    }
}
