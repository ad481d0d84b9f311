use async_trait::async_trait;

use super::MemoryPersistence;
use crate::common::error::Result;
use crate::common::model::QueueEntry;
use crate::persistence::traits::VehicleQueue;

#[async_trait]
impl VehicleQueue for MemoryPersistence {
    async fn offer(&self, vehicle_id: &str, entry: QueueEntry) -> Result<usize> {
        let mut queue = self.queues.entry(vehicle_id.to_string()).or_default();
        queue.push_back(entry);
        Ok(queue.len())
    }

    async fn peek(&self, vehicle_id: &str) -> Result<Option<QueueEntry>> {
        Ok(self
            .queues
            .get(vehicle_id)
            .and_then(|q| q.front().cloned()))
    }

    async fn poll_if_head(
        &self,
        vehicle_id: &str,
        request_id: &str,
    ) -> Result<Option<QueueEntry>> {
        // 判断 + 弹出必须在同一把分片锁内完成
        let polled = match self.queues.get_mut(vehicle_id) {
            Some(mut queue) => match queue.front() {
                Some(head) if head.request_id == request_id => queue.pop_front(),
                _ => None,
            },
            None => None,
        };
        // 空队列不留壳
        self.queues.remove_if(vehicle_id, |_, q| q.is_empty());
        Ok(polled)
    }

    async fn mark_head_forwarded(&self, vehicle_id: &str, request_id: &str) -> Result<bool> {
        Ok(match self.queues.get_mut(vehicle_id) {
            Some(mut queue) => match queue.front_mut() {
                Some(head) if head.request_id == request_id => {
                    head.forwarded = true;
                    true
                }
                _ => false,
            },
            None => false,
        })
    }

    async fn entries(&self, vehicle_id: &str) -> Result<Vec<QueueEntry>> {
        Ok(self
            .queues
            .get(vehicle_id)
            .map(|q| q.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn len(&self, vehicle_id: &str) -> Result<usize> {
        Ok(self.queues.get(vehicle_id).map(|q| q.len()).unwrap_or(0))
    }
}
