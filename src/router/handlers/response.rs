use tracing::{debug, info, warn};

use crate::{
    common::{
        error::Result,
        model::{CommandStatus, CorrelationEntry, DeviceResponse},
    },
    engine::{
        CommandQueue, CorrelationService, CorrelationSource, EngineContext, EngineMetrics,
        EngineSafetyGate,
    },
    persistence::{AppendOutcome, StatusChange},
    router::handlers::ReplyPublisher,
};

/// 设备回执的处理结果
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseOutcome {
    Recorded {
        record_id: String,
        /// 处理后的记录状态
        status: CommandStatus,
        terminal: bool,
        /// 发送的通知模板
        notification: Option<String>,
        source: CorrelationSource,
    },
    /// 同一回执重复投递
    Duplicate { record_id: String },
    /// 找不到对应的指令
    Uncorrelated,
}

/// 设备回执 Handler
///
/// 关联 → 追加历史 → 更新状态 → 发布回执与通知 → 维护引擎标记 → 推进队列。
#[derive(Clone)]
pub struct ResponseHandler {
    ctx: EngineContext,
    queue: CommandQueue,
    correlation: CorrelationService,
    safety: EngineSafetyGate,
    replies: ReplyPublisher,
}

impl ResponseHandler {
    pub fn new(
        ctx: EngineContext,
        queue: CommandQueue,
        correlation: CorrelationService,
        safety: EngineSafetyGate,
        replies: ReplyPublisher,
    ) -> Self {
        Self {
            ctx,
            queue,
            correlation,
            safety,
            replies,
        }
    }

    pub async fn handle(&self, response: DeviceResponse) -> Result<ResponseOutcome> {
        let vehicle_id = response.vehicle_id.as_str();
        let request_id = response.request_id.as_str();

        let record = match self.ctx.store.append_response(&response).await? {
            AppendOutcome::Appended(record) => record,
            AppendOutcome::Duplicate(record) => {
                // 终态回执的记录仍是队头，说明上一次处理没走到推进队列，重做剩下的步骤
                if !(response.status.is_terminal()
                    && self.is_unfinished(&record.id, vehicle_id).await?)
                {
                    debug!(vehicle_id, request_id, event_id = %response.event_id, "duplicate response");
                    return Ok(ResponseOutcome::Duplicate {
                        record_id: record.id,
                    });
                }
                info!(vehicle_id, request_id, event_id = %response.event_id, "redelivered response left the queue head in flight, resuming");
                record
            }
            AppendOutcome::NotFound => {
                warn!(vehicle_id, request_id, "response without a matching command, dropping");
                EngineMetrics::inc(&self.ctx.metrics.uncorrelated);
                return Ok(ResponseOutcome::Uncorrelated);
            }
        };

        let (entry, source) = self
            .correlation
            .lookup(request_id, vehicle_id)
            .await?
            .unwrap_or_else(|| (CorrelationEntry::from(&record.envelope), CorrelationSource::Store));

        let terminal = response.status.terminal_status();
        let status = match terminal {
            Some(next) => match self.ctx.store.set_status(&record.id, next).await? {
                StatusChange::Applied | StatusChange::Unchanged => next,
                StatusChange::Rejected { current } => {
                    debug!(vehicle_id, request_id, ?current, "record already settled");
                    current
                }
            },
            None => record.status,
        };

        let notification = self
            .replies
            .reply(&record.id, &entry, &response, false)
            .await?;

        self.safety
            .observe(
                vehicle_id,
                record.envelope.command.engine_state(),
                response.status,
            )
            .await?;

        if terminal.is_some() {
            if self.ctx.config.queue.enabled {
                self.queue.advance(vehicle_id, request_id).await?;
            }
            self.correlation.forget(request_id, vehicle_id).await?;
        }

        Ok(ResponseOutcome::Recorded {
            record_id: record.id,
            status,
            terminal: terminal.is_some(),
            notification,
            source,
        })
    }

    async fn is_unfinished(&self, record_id: &str, vehicle_id: &str) -> Result<bool> {
        Ok(self.ctx.config.queue.enabled && self.queue.is_head(vehicle_id, record_id).await?)
    }
}
