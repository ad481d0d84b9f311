use tracing::info;

use crate::{
    common::{error::Result, model::ScheduleStatus},
    engine::{EngineContext, ScheduleGateway},
    router::event::VehicleDeprovisioned,
};

/// 解绑清理报告
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeprovisionReport {
    pub records_deactivated: usize,
    pub schedules_deleted: usize,
}

/// 车辆解绑 Handler
///
/// 停用该 (车辆, 用户) 的全部指令记录，删除其 ACTIVE 计划并请求外部调度器取消。
/// 车辆队列不动，剩余条目按 TTL 自然过期。
#[derive(Clone)]
pub struct DeprovisionHandler {
    ctx: EngineContext,
    gateway: ScheduleGateway,
}

impl DeprovisionHandler {
    pub fn new(ctx: EngineContext, gateway: ScheduleGateway) -> Self {
        Self { ctx, gateway }
    }

    pub async fn handle(&self, event: VehicleDeprovisioned) -> Result<DeprovisionReport> {
        let records_deactivated = self
            .ctx
            .store
            .deactivate(&event.vehicle_id, &event.user_id)
            .await?;

        let mut schedules_deleted = 0;
        for schedule in self
            .ctx
            .schedules
            .list_for_vehicle(&event.vehicle_id, Some(&event.user_id))
            .await?
        {
            if schedule.status == ScheduleStatus::Active {
                self.gateway.delete(&schedule.key).await?;
                schedules_deleted += 1;
            }
        }

        // 队列不清，剩下的条目交给过期扫描
        let queued = self.ctx.queue.len(&event.vehicle_id).await?;
        info!(
            vehicle_id = %event.vehicle_id,
            user_id = %event.user_id,
            records_deactivated,
            schedules_deleted,
            queued,
            "vehicle deprovisioned"
        );
        Ok(DeprovisionReport {
            records_deactivated,
            schedules_deleted,
        })
    }
}
