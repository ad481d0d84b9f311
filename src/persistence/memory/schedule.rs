use async_trait::async_trait;
use dashmap::mapref::entry::Entry;

use super::MemoryPersistence;
use crate::common::error::{Result, RoError};
use crate::common::model::{ScheduleKey, ScheduleRecord, ScheduleStatus};
use crate::persistence::traits::ScheduleStore;

#[async_trait]
impl ScheduleStore for MemoryPersistence {
    async fn insert(&self, record: ScheduleRecord) -> Result<()> {
        match self.schedules.entry(record.key.clone()) {
            // 只有仍然 ACTIVE 的同键计划才算冲突，停用/删除过的键可以复用
            Entry::Occupied(mut existing) => {
                if existing.get().status == ScheduleStatus::Active {
                    return Err(RoError::DuplicateSchedule(record.key.scheduler_key.clone()));
                }
                existing.insert(record);
            }
            Entry::Vacant(slot) => {
                slot.insert(record);
            }
        }
        Ok(())
    }

    async fn load(&self, key: &ScheduleKey) -> Result<Option<ScheduleRecord>> {
        Ok(self.schedules.get(key).map(|r| r.clone()))
    }

    async fn count_active(&self, vehicle_id: &str, command_kind: &str) -> Result<usize> {
        Ok(self
            .schedules
            .iter()
            .filter(|r| {
                r.status == ScheduleStatus::Active
                    && r.key.vehicle_id == vehicle_id
                    && r.key.command_kind == command_kind
            })
            .count())
    }

    async fn set_status(
        &self,
        key: &ScheduleKey,
        status: ScheduleStatus,
        now: f64,
    ) -> Result<Option<ScheduleRecord>> {
        Ok(self.schedules.get_mut(key).map(|mut r| {
            r.status = status;
            r.updated_at = now;
            r.clone()
        }))
    }

    async fn set_schedule_id(
        &self,
        key: &ScheduleKey,
        schedule_id: &str,
        now: f64,
    ) -> Result<Option<ScheduleRecord>> {
        Ok(self.schedules.get_mut(key).map(|mut r| {
            r.schedule_id = Some(schedule_id.to_string());
            r.updated_at = now;
            r.clone()
        }))
    }

    async fn list_for_vehicle(
        &self,
        vehicle_id: &str,
        user_id: Option<&str>,
    ) -> Result<Vec<ScheduleRecord>> {
        let mut list: Vec<ScheduleRecord> = self
            .schedules
            .iter()
            .filter(|r| r.key.vehicle_id == vehicle_id)
            .filter(|r| user_id.is_none_or(|u| r.user_id == u))
            .map(|r| r.clone())
            .collect();
        list.sort_by(|a, b| a.created_at.total_cmp(&b.created_at));
        Ok(list)
    }
}
