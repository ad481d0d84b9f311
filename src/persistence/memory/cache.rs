use std::time::Duration;

use async_trait::async_trait;

use super::MemoryPersistence;
use crate::common::error::Result;
use crate::persistence::traits::KvCache;

#[async_trait]
impl KvCache for MemoryPersistence {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let now = self.clock.now();
        // 惰性过期：读到过期条目时顺手删掉
        let expired = match self.cache.get(key) {
            Some(entry) if entry.1 > now => return Ok(Some(entry.0.clone())),
            Some(_) => true,
            None => false,
        };
        if expired {
            self.cache.remove_if(key, |_, (_, expires_at)| *expires_at <= now);
        }
        Ok(None)
    }

    async fn put(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let expires_at = self.clock.now() + ttl.as_secs_f64();
        self.cache
            .insert(key.to_string(), (value.to_string(), expires_at));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.cache.remove(key);
        Ok(())
    }
}
