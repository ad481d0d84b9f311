use tracing::{debug, info, warn};

use crate::{
    common::{
        RoError, TimeUtils,
        error::Result,
        model::{
            CommandEnvelope, ScheduleKey, ScheduleRecord, ScheduleStatus, TriggerSpec,
        },
        new_request_id,
    },
    engine::{EngineContext, EngineMetrics},
    outbound::{OutboundEvent, ScheduleCancel, ScheduleCreate},
    router::event::{ScheduleAck, ScheduleTrigger, TriggerTarget},
};

/// 计划触发的处理结果
#[derive(Debug, Clone, PartialEq)]
pub enum FireOutcome {
    /// 生成了新指令，调用方按新指令流程处理
    ///
    /// 一次性计划带上 `one_shot`，调用方受理成功后再 [`ScheduleGateway::retire`]。
    Fired {
        envelope: Box<CommandEnvelope>,
        one_shot: Option<ScheduleKey>,
    },
    /// 目标是协作通道，已原样转交
    Companion,
    /// 计划不存在或已不是 ACTIVE
    Dropped,
}

/// 定时计划网关 (Schedule Gateway)
///
/// - 把客户端的计划翻译成外部调度器请求。
/// - 把调度器的触发回调还原成一条全新的指令。
/// - 每个计划独立存储，以 (vehicleId, commandKind, schedulerKey) 寻址。
#[derive(Clone)]
pub struct ScheduleGateway {
    ctx: EngineContext,
}

impl ScheduleGateway {
    pub fn new(ctx: EngineContext) -> Self {
        Self { ctx }
    }

    /// 创建计划
    ///
    /// 首次触发时间已过、或 ACTIVE 计划数达到上限时同步拒绝，不落任何状态。
    pub async fn create(
        &self,
        envelope: &CommandEnvelope,
        scheduler_key: &str,
        trigger: TriggerSpec,
    ) -> Result<ScheduleRecord> {
        let now = self.ctx.now();
        let key = ScheduleKey::new(
            envelope.vehicle_id.as_str(),
            envelope.command.kind_name(),
            scheduler_key,
        );

        let first_trigger_at = match TimeUtils::first_trigger(&trigger, now) {
            Ok(Some(at)) if at >= now => at,
            Ok(Some(at)) => {
                return self.reject(RoError::ScheduleInPast {
                    scheduler_key: scheduler_key.to_string(),
                    trigger_at: at,
                    now,
                });
            }
            // cron 在起始时间之后再也不会触发
            Ok(None) => {
                return self.reject(RoError::ScheduleInPast {
                    scheduler_key: scheduler_key.to_string(),
                    trigger_at: now,
                    now,
                });
            }
            Err(e) => return self.reject(e),
        };

        let limit = self.ctx.config.schedule.max_active_per_kind;
        let active = self
            .ctx
            .schedules
            .count_active(&key.vehicle_id, &key.command_kind)
            .await?;
        if active >= limit {
            return self.reject(RoError::ScheduleLimitExceeded {
                vehicle_id: key.vehicle_id.clone(),
                command_kind: key.command_kind.clone(),
                limit,
            });
        }

        // 模板不带计划子对象，触发时不会再建计划
        let mut template = envelope.clone();
        template.payload.schedule = None;

        let record = ScheduleRecord {
            key: key.clone(),
            user_id: envelope.payload.user_id.clone(),
            schedule_id: None,
            trigger: trigger.clone(),
            first_trigger_at,
            status: ScheduleStatus::Active,
            template,
            created_at: now,
            updated_at: now,
        };
        if let Err(e) = self.ctx.schedules.insert(record.clone()).await {
            return self.reject(e);
        }

        self.ctx
            .publish(OutboundEvent::ScheduleCreate(ScheduleCreate {
                key: key.clone(),
                trigger,
                first_trigger_at,
            }))
            .await?;

        EngineMetrics::inc(&self.ctx.metrics.schedules_created);
        info!(
            vehicle_id = %key.vehicle_id,
            kind = %key.command_kind,
            scheduler_key = %key.scheduler_key,
            first_trigger_at,
            "schedule created"
        );
        Ok(record)
    }

    fn reject<T>(&self, err: RoError) -> Result<T> {
        if err.is_rejection() {
            EngineMetrics::inc(&self.ctx.metrics.schedules_rejected);
            warn!(error = %err, "schedule rejected");
        }
        Err(err)
    }

    /// 删除计划并请求外部调度器取消
    ///
    /// 已经触发出去的指令不受影响。
    pub async fn delete(&self, key: &ScheduleKey) -> Result<ScheduleRecord> {
        let now = self.ctx.now();
        let record = self
            .ctx
            .schedules
            .set_status(key, ScheduleStatus::Deleted, now)
            .await?
            .ok_or_else(|| RoError::ScheduleNotFound(key.scheduler_key.clone()))?;

        self.request_cancel(&record).await?;
        info!(vehicle_id = %key.vehicle_id, scheduler_key = %key.scheduler_key, "schedule deleted");
        Ok(record)
    }

    pub(crate) async fn request_cancel(&self, record: &ScheduleRecord) -> Result<()> {
        self.ctx
            .publish(OutboundEvent::ScheduleCancel(ScheduleCancel {
                key: record.key.clone(),
                schedule_id: record.schedule_id.clone(),
            }))
            .await
    }

    /// 记录外部调度器分配的 ID
    pub async fn acknowledge(&self, ack: &ScheduleAck) -> Result<Option<ScheduleRecord>> {
        let key = ScheduleKey::new(
            ack.vehicle_id.as_str(),
            ack.command_kind.as_str(),
            ack.scheduler_key.as_str(),
        );
        let updated = self
            .ctx
            .schedules
            .set_schedule_id(&key, &ack.schedule_id, self.ctx.now())
            .await?;
        match &updated {
            Some(_) => debug!(scheduler_key = %key.scheduler_key, schedule_id = %ack.schedule_id, "schedule acknowledged"),
            None => warn!(scheduler_key = %key.scheduler_key, "ack for unknown schedule"),
        }
        Ok(updated)
    }

    /// 处理外部调度器的触发回调
    pub async fn fire(&self, trigger: &ScheduleTrigger) -> Result<FireOutcome> {
        if trigger.target == TriggerTarget::Companion {
            self.ctx
                .publish(OutboundEvent::CompanionTrigger(trigger.clone()))
                .await?;
            return Ok(FireOutcome::Companion);
        }

        let key = ScheduleKey::new(
            trigger.vehicle_id.as_str(),
            trigger.command_kind.as_str(),
            trigger.scheduler_key.as_str(),
        );
        let record = match self.ctx.schedules.load(&key).await? {
            Some(r) if r.status == ScheduleStatus::Active => r,
            Some(r) => {
                info!(scheduler_key = %key.scheduler_key, status = ?r.status, "trigger for inactive schedule, dropping");
                return Ok(FireOutcome::Dropped);
            }
            None => {
                warn!(vehicle_id = %key.vehicle_id, scheduler_key = %key.scheduler_key, "trigger for unknown schedule, dropping");
                return Ok(FireOutcome::Dropped);
            }
        };

        let mut envelope = record.template;
        envelope.event_id = trigger.event_id.clone();
        envelope.request_id = new_request_id();
        envelope.biz_transaction_id = trigger.biz_transaction_id.clone();
        envelope.timestamp = trigger.timestamp;

        let next_trigger_at = TimeUtils::next_recurrence(&record.trigger, self.ctx.now());
        EngineMetrics::inc(&self.ctx.metrics.schedules_fired);
        info!(
            vehicle_id = %envelope.vehicle_id,
            request_id = %envelope.request_id,
            scheduler_key = %key.scheduler_key,
            ?next_trigger_at,
            "schedule fired"
        );
        let one_shot = (!record.trigger.is_recurring()).then_some(key);
        Ok(FireOutcome::Fired {
            envelope: Box::new(envelope),
            one_shot,
        })
    }

    /// 一次性计划触发的指令受理后停用
    ///
    /// 受理失败时计划保持 ACTIVE，调度器重投同一触发仍能生效。
    pub async fn retire(&self, key: &ScheduleKey) -> Result<()> {
        debug!(scheduler_key = %key.scheduler_key, "retire one-shot schedule");
        self.ctx
            .schedules
            .set_status(key, ScheduleStatus::Inactive, self.ctx.now())
            .await?;
        Ok(())
    }
}
