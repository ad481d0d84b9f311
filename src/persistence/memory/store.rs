use async_trait::async_trait;
use dashmap::mapref::entry::Entry;

use super::MemoryPersistence;
use crate::common::error::Result;
use crate::common::model::{
    CommandRecord, CommandStatus, DeliveryFailure, DeviceResponse, NotificationRecord,
    correlation_key,
};
use crate::persistence::model::{AppendOutcome, CreateOutcome, StatusChange};
use crate::persistence::traits::CommandStore;

impl MemoryPersistence {
    /// 关联索引里最新的记录 ID
    fn latest_id(&self, request_id: &str, vehicle_id: &str) -> Option<String> {
        self.correlation_index
            .get(&correlation_key(request_id, vehicle_id))
            .and_then(|ids| ids.first().cloned())
    }

    /// 在记录的分片锁内追加历史
    fn append_with<F, D>(&self, request_id: &str, vehicle_id: &str, seen: D, push: F) -> AppendOutcome
    where
        D: Fn(&CommandRecord) -> bool,
        F: FnOnce(&mut CommandRecord),
    {
        let Some(id) = self.latest_id(request_id, vehicle_id) else {
            return AppendOutcome::NotFound;
        };
        let now = self.clock.now();
        match self.records.get_mut(&id) {
            Some(mut record) => {
                if seen(&record) {
                    return AppendOutcome::Duplicate(Box::new(record.clone()));
                }
                push(&mut record);
                record.updated_at = now;
                AppendOutcome::Appended(Box::new(record.clone()))
            }
            None => AppendOutcome::NotFound,
        }
    }
}

#[async_trait]
impl CommandStore for MemoryPersistence {
    async fn create(&self, record: CommandRecord) -> Result<CreateOutcome> {
        let id = record.id.clone();
        // 去重索引的分片锁内完成判重 + 占位，重复投递不会创建第二条
        match self.event_index.entry(record.envelope.event_id.clone()) {
            Entry::Occupied(existing) => return Ok(CreateOutcome::Existing(existing.get().clone())),
            Entry::Vacant(slot) => {
                slot.insert(id.clone());
            }
        }

        let key = record.envelope.correlation_key();
        self.records.insert(id.clone(), record);
        // 最新的记录排在最前
        self.correlation_index
            .entry(key)
            .or_default()
            .insert(0, id.clone());

        Ok(CreateOutcome::Created(id))
    }

    async fn load(&self, id: &str) -> Result<Option<CommandRecord>> {
        Ok(self.records.get(id).map(|r| r.clone()))
    }

    async fn find_latest(
        &self,
        request_id: &str,
        vehicle_id: &str,
    ) -> Result<Option<CommandRecord>> {
        Ok(self
            .latest_id(request_id, vehicle_id)
            .and_then(|id| self.records.get(&id).map(|r| r.clone())))
    }

    async fn append_response(&self, response: &DeviceResponse) -> Result<AppendOutcome> {
        Ok(self.append_with(
            &response.request_id,
            &response.vehicle_id,
            |r| r.has_response(&response.event_id),
            |r| r.responses.push(response.clone()),
        ))
    }

    async fn append_failure(&self, failure: &DeliveryFailure) -> Result<AppendOutcome> {
        Ok(self.append_with(
            &failure.request_id,
            &failure.vehicle_id,
            |r| r.has_failure(&failure.event_id),
            |r| r.failures.push(failure.clone()),
        ))
    }

    async fn append_notification(
        &self,
        id: &str,
        notification: &NotificationRecord,
    ) -> Result<()> {
        if let Some(mut record) = self.records.get_mut(id) {
            record.notifications.push(notification.clone());
            record.updated_at = self.clock.now();
        }
        Ok(())
    }

    async fn set_status(&self, id: &str, status: CommandStatus) -> Result<StatusChange> {
        let Some(mut record) = self.records.get_mut(id) else {
            return Err(crate::common::RoError::RecordNotFound(id.to_string()));
        };
        let change = StatusChange::evaluate(record.status, status);
        if change == StatusChange::Applied {
            record.status = status;
            record.updated_at = self.clock.now();
        }
        Ok(change)
    }

    async fn deactivate(&self, vehicle_id: &str, user_id: &str) -> Result<usize> {
        let now = self.clock.now();
        let mut count = 0;
        for mut record in self.records.iter_mut() {
            if record.active
                && record.envelope.vehicle_id == vehicle_id
                && record.envelope.payload.user_id == user_id
            {
                record.active = false;
                record.updated_at = now;
                count += 1;
            }
        }
        Ok(count)
    }
}
