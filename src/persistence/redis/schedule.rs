use async_trait::async_trait;

use super::core::RedisPersistence;
use crate::common::error::{Result, RoError};
use crate::common::model::{ScheduleKey, ScheduleRecord, ScheduleStatus};
use crate::persistence::traits::ScheduleStore;
use deadpool_redis::redis::{self, AsyncCommands};

impl RedisPersistence {
    /// 覆盖写计划文档，并同步 ACTIVE 索引
    async fn write_schedule(&self, record: &ScheduleRecord) -> Result<()> {
        let mut conn = self.pool.get().await?;
        let active_key = self.key_schedule_active(&record.key.vehicle_id, &record.key.command_kind);

        let mut pipe = redis::pipe();
        pipe.set(self.key_schedule(&record.key), serde_json::to_string(record)?);
        if record.status == ScheduleStatus::Active {
            pipe.sadd(&active_key, &record.key.scheduler_key);
        } else {
            pipe.srem(&active_key, &record.key.scheduler_key);
        }
        pipe.query_async::<()>(&mut conn).await?;
        Ok(())
    }
}

#[async_trait]
impl ScheduleStore for RedisPersistence {
    async fn insert(&self, record: ScheduleRecord) -> Result<()> {
        let mut conn = self.pool.get().await?;
        let doc_key = self.key_schedule(&record.key);

        let inserted: i64 = self
            .scripts
            .schedule_insert
            .key(&doc_key)
            .key(self.key_schedule_active(&record.key.vehicle_id, &record.key.command_kind))
            .key(self.key_vehicle_schedules(&record.key.vehicle_id))
            .arg(&record.key.scheduler_key)
            .arg(serde_json::to_string(&record)?)
            .invoke_async(&mut conn)
            .await?;

        if inserted == 0 {
            return Err(RoError::DuplicateSchedule(record.key.scheduler_key));
        }
        Ok(())
    }

    async fn load(&self, key: &ScheduleKey) -> Result<Option<ScheduleRecord>> {
        let mut conn = self.pool.get().await?;
        let json: Option<String> = conn.get(self.key_schedule(key)).await?;
        match json {
            Some(s) => Ok(Some(serde_json::from_str(&s)?)),
            None => Ok(None),
        }
    }

    async fn count_active(&self, vehicle_id: &str, command_kind: &str) -> Result<usize> {
        let mut conn = self.pool.get().await?;
        let count: usize = conn
            .scard(self.key_schedule_active(vehicle_id, command_kind))
            .await?;
        Ok(count)
    }

    async fn set_status(
        &self,
        key: &ScheduleKey,
        status: ScheduleStatus,
        now: f64,
    ) -> Result<Option<ScheduleRecord>> {
        let Some(mut record) = ScheduleStore::load(self, key).await? else {
            return Ok(None);
        };
        record.status = status;
        record.updated_at = now;
        self.write_schedule(&record).await?;
        Ok(Some(record))
    }

    async fn set_schedule_id(
        &self,
        key: &ScheduleKey,
        schedule_id: &str,
        now: f64,
    ) -> Result<Option<ScheduleRecord>> {
        let Some(mut record) = ScheduleStore::load(self, key).await? else {
            return Ok(None);
        };
        record.schedule_id = Some(schedule_id.to_string());
        record.updated_at = now;
        self.write_schedule(&record).await?;
        Ok(Some(record))
    }

    async fn list_for_vehicle(
        &self,
        vehicle_id: &str,
        user_id: Option<&str>,
    ) -> Result<Vec<ScheduleRecord>> {
        let mut conn = self.pool.get().await?;
        let keys: Vec<String> = conn.smembers(self.key_vehicle_schedules(vehicle_id)).await?;
        if keys.is_empty() {
            return Ok(vec![]);
        }

        let docs: Vec<Option<String>> = redis::cmd("MGET")
            .arg(&keys)
            .query_async(&mut conn)
            .await?;

        let mut list = Vec::with_capacity(docs.len());
        for doc in docs.into_iter().flatten() {
            let record: ScheduleRecord = serde_json::from_str(&doc)?;
            if user_id.is_none_or(|u| record.user_id == u) {
                list.push(record);
            }
        }
        list.sort_by(|a, b| a.created_at.total_cmp(&b.created_at));
        Ok(list)
    }
}
