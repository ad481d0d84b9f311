use tracing::{debug, info, warn};

use crate::{
    common::{
        error::Result,
        model::{
            CommandEnvelope, CommandRecord, CommandStatus, CorrelationEntry, DeviceResponse,
            ResponseStatus, ScheduleAction, ScheduleKey, ScheduleRecord,
        },
        new_record_id,
    },
    engine::{
        CommandQueue, CorrelationService, EngineContext, EngineMetrics, EngineSafetyGate,
        EnqueueOutcome, GateDecision, ScheduleGateway,
    },
    router::handlers::ReplyPublisher,
};

/// 新指令的处理结果
#[derive(Debug, Clone, PartialEq)]
pub enum CommandOutcome {
    /// 已转发给设备
    Forwarded { record_id: String },
    /// 排队等待，`position` 从 1 开始
    Queued { record_id: String, position: usize },
    /// 引擎保护拦截，已合成失败回执
    Blocked { record_id: String },
    /// 重复投递，记录已存在
    Duplicate { record_id: String },
    ScheduleCreated(Box<ScheduleRecord>),
    ScheduleDeleted(Box<ScheduleRecord>),
}

/// 新指令 Handler
///
/// 带计划子对象的指令交给计划网关；其余的建记录、过引擎保护、写关联缓存，
/// 然后入队 (或在队列关闭时直接转发)。计划触发生成的指令也走这里。
#[derive(Clone)]
pub struct CommandHandler {
    ctx: EngineContext,
    queue: CommandQueue,
    correlation: CorrelationService,
    safety: EngineSafetyGate,
    schedules: ScheduleGateway,
    replies: ReplyPublisher,
}

impl CommandHandler {
    pub fn new(
        ctx: EngineContext,
        queue: CommandQueue,
        correlation: CorrelationService,
        safety: EngineSafetyGate,
        schedules: ScheduleGateway,
        replies: ReplyPublisher,
    ) -> Self {
        Self {
            ctx,
            queue,
            correlation,
            safety,
            schedules,
            replies,
        }
    }

    pub async fn handle(&self, envelope: CommandEnvelope) -> Result<CommandOutcome> {
        let Some(request) = envelope.payload.schedule.clone() else {
            return self.submit(envelope).await;
        };

        match request.action {
            ScheduleAction::Create { trigger } => {
                let record = self
                    .schedules
                    .create(&envelope, &request.scheduler_key, trigger)
                    .await?;
                Ok(CommandOutcome::ScheduleCreated(Box::new(record)))
            }
            ScheduleAction::Delete => {
                let key = ScheduleKey::new(
                    envelope.vehicle_id.as_str(),
                    envelope.command.kind_name(),
                    request.scheduler_key.as_str(),
                );
                let record = self.schedules.delete(&key).await?;
                Ok(CommandOutcome::ScheduleDeleted(Box::new(record)))
            }
        }
    }

    /// 受理一条需要下发的指令
    pub async fn submit(&self, envelope: CommandEnvelope) -> Result<CommandOutcome> {
        let record = CommandRecord::new(new_record_id(), envelope.clone(), self.ctx.now());
        let created = self.ctx.store.create(record).await?;
        let record_id = created.id().to_string();
        if !created.is_created() {
            return self.redeliver(record_id, &envelope).await;
        }
        self.dispatch(record_id, envelope).await
    }

    /// 引擎保护 → 写关联缓存 → 入队或直接转发
    async fn dispatch(&self, record_id: String, envelope: CommandEnvelope) -> Result<CommandOutcome> {
        if self.safety.check(&envelope).await? == GateDecision::Block {
            self.block(&record_id, &envelope).await?;
            return Ok(CommandOutcome::Blocked { record_id });
        }

        // 缓存只是快路径，写失败不影响受理
        if let Err(e) = self.correlation.remember(&envelope).await {
            warn!(request_id = %envelope.request_id, error = %e, "failed to cache correlation");
        }

        if !self.ctx.config.queue.enabled {
            self.ctx.forward_to_device(&record_id, &envelope).await?;
            return Ok(CommandOutcome::Forwarded { record_id });
        }

        match self.queue.enqueue(&record_id, &envelope).await? {
            EnqueueOutcome::Forwarded => Ok(CommandOutcome::Forwarded { record_id }),
            EnqueueOutcome::Queued { position, .. } => {
                Ok(CommandOutcome::Queued { record_id, position })
            }
        }
    }

    /// 重复投递
    ///
    /// 记录还是 PENDING 说明上一次处理可能中途失败：
    /// 没入队就从引擎保护重新走一遍，停在未转发的队头就补发。
    /// 以存储的信封为准 (计划触发每次生成的 requestId 都不同)。
    async fn redeliver(&self, record_id: String, envelope: &CommandEnvelope) -> Result<CommandOutcome> {
        let pending = self
            .ctx
            .store
            .load(&record_id)
            .await?
            .filter(|r| r.status == CommandStatus::Pending);
        let Some(record) = pending else {
            info!(
                vehicle_id = %envelope.vehicle_id,
                event_id = %envelope.event_id,
                "duplicate command delivery, skipping"
            );
            return Ok(CommandOutcome::Duplicate { record_id });
        };

        let stored = record.envelope;
        if self.ctx.config.queue.enabled {
            let entries = self.ctx.queue.entries(&stored.vehicle_id).await?;
            if let Some(i) = entries.iter().position(|e| e.record_id == record_id) {
                if i > 0 || entries[i].forwarded {
                    info!(
                        vehicle_id = %stored.vehicle_id,
                        event_id = %stored.event_id,
                        "duplicate command delivery, already queued"
                    );
                    return Ok(CommandOutcome::Duplicate { record_id });
                }
                info!(vehicle_id = %stored.vehicle_id, request_id = %stored.request_id, "redelivered queue head was never forwarded, resuming");
                let sweep = self.queue.sweep(&stored.vehicle_id).await?;
                return Ok(match sweep.forwarded {
                    Some(forwarded) if forwarded == stored.request_id => {
                        CommandOutcome::Forwarded { record_id }
                    }
                    _ => CommandOutcome::Duplicate { record_id },
                });
            }
        }

        info!(vehicle_id = %stored.vehicle_id, request_id = %stored.request_id, "redelivered command was never dispatched, resuming");
        self.dispatch(record_id, stored).await
    }

    /// 引擎保护拦截：不下发，合成失败回执和“未找到启动”通知
    async fn block(&self, record_id: &str, envelope: &CommandEnvelope) -> Result<()> {
        let response = DeviceResponse {
            event_id: format!("{}:no-engine-start", envelope.event_id),
            vehicle_id: envelope.vehicle_id.clone(),
            request_id: envelope.request_id.clone(),
            biz_transaction_id: envelope.biz_transaction_id.clone(),
            timestamp: self.ctx.now(),
            status: ResponseStatus::FailNoEngineStart,
            custom_extension: None,
        };
        // 先发布再落终态：发布失败时记录仍是 PENDING，重投会再拦截一次
        let entry = CorrelationEntry::from(envelope);
        self.replies
            .publish_response(record_id, &entry, &response, true)
            .await?;

        let template = &self.ctx.config.engine_safety.no_start_notification_id;
        match self
            .replies
            .resolver()
            .fixed(template, &entry.origin, ResponseStatus::Fail.as_str())
        {
            Some(resolution) => {
                self.replies
                    .notify(record_id, &entry, &response, resolution)
                    .await?;
            }
            None => debug!(origin = %entry.origin, "origin not whitelisted, no notification"),
        }

        self.ctx.store.append_response(&response).await?;
        self.ctx
            .store
            .set_status(record_id, CommandStatus::ProcessedFailed)
            .await?;

        EngineMetrics::inc(&self.ctx.metrics.commands_blocked);
        Ok(())
    }
}
