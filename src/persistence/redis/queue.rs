use async_trait::async_trait;

use super::core::RedisPersistence;
use crate::common::error::Result;
use crate::common::model::QueueEntry;
use crate::persistence::traits::VehicleQueue;
use deadpool_redis::redis::{self, AsyncCommands};

/// 解码队列条目，并用转发标记回填队头的 forwarded
fn decode_entries(raw: Vec<String>, forwarded: Option<String>) -> Result<Vec<QueueEntry>> {
    let mut entries = raw
        .iter()
        .map(|s| serde_json::from_str::<QueueEntry>(s))
        .collect::<serde_json::Result<Vec<_>>>()?;
    if let (Some(head), Some(fwd)) = (entries.first_mut(), forwarded) {
        head.forwarded = head.request_id == fwd;
    }
    Ok(entries)
}

#[async_trait]
impl VehicleQueue for RedisPersistence {
    async fn offer(&self, vehicle_id: &str, entry: QueueEntry) -> Result<usize> {
        let mut conn = self.pool.get().await?;
        let len: usize = conn
            .rpush(self.key_queue(vehicle_id), serde_json::to_string(&entry)?)
            .await?;
        Ok(len)
    }

    async fn peek(&self, vehicle_id: &str) -> Result<Option<QueueEntry>> {
        let mut conn = self.pool.get().await?;
        let (head, forwarded): (Option<String>, Option<String>) = redis::pipe()
            .lindex(self.key_queue(vehicle_id), 0)
            .get(self.key_queue_forwarded(vehicle_id))
            .query_async(&mut conn)
            .await?;

        Ok(decode_entries(head.into_iter().collect(), forwarded)?
            .into_iter()
            .next())
    }

    async fn poll_if_head(
        &self,
        vehicle_id: &str,
        request_id: &str,
    ) -> Result<Option<QueueEntry>> {
        let mut conn = self.pool.get().await?;
        // KEYS[1]: queue, KEYS[2]: forwarded marker, ARGV[1]: expected head
        let polled: Option<String> = self
            .scripts
            .poll_head
            .key(self.key_queue(vehicle_id))
            .key(self.key_queue_forwarded(vehicle_id))
            .arg(request_id)
            .invoke_async(&mut conn)
            .await?;

        match polled {
            Some(s) => Ok(Some(serde_json::from_str(&s)?)),
            None => Ok(None),
        }
    }

    async fn mark_head_forwarded(&self, vehicle_id: &str, request_id: &str) -> Result<bool> {
        let mut conn = self.pool.get().await?;
        let marked: i64 = self
            .scripts
            .mark_head
            .key(self.key_queue(vehicle_id))
            .key(self.key_queue_forwarded(vehicle_id))
            .arg(request_id)
            .invoke_async(&mut conn)
            .await?;
        Ok(marked == 1)
    }

    async fn entries(&self, vehicle_id: &str) -> Result<Vec<QueueEntry>> {
        let mut conn = self.pool.get().await?;
        let (raw, forwarded): (Vec<String>, Option<String>) = redis::pipe()
            .lrange(self.key_queue(vehicle_id), 0, -1)
            .get(self.key_queue_forwarded(vehicle_id))
            .query_async(&mut conn)
            .await?;
        decode_entries(raw, forwarded)
    }

    async fn len(&self, vehicle_id: &str) -> Result<usize> {
        let mut conn = self.pool.get().await?;
        let len: usize = conn.llen(self.key_queue(vehicle_id)).await?;
        Ok(len)
    }
}
