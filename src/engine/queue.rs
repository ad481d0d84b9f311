use tracing::{debug, info, warn};

use crate::{
    common::{
        error::Result,
        model::{CommandEnvelope, CommandStatus, QueueEntry},
    },
    engine::{EngineContext, EngineMetrics},
    persistence::StatusChange,
};

/// 入队结果
#[derive(Debug, Clone, PartialEq)]
pub enum EnqueueOutcome {
    /// 队列原本为空，已立即转发
    Forwarded,
    /// 排在后面等待，`position` 从 1 开始 (1 为队头)
    Queued { position: usize, sweep: SweepReport },
}

/// 推进结果
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AdvanceOutcome {
    /// 被移除的队头 (与给定 requestId 匹配时)
    pub removed: Option<QueueEntry>,
    pub sweep: SweepReport,
}

/// 一次过期扫描的结果
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SweepReport {
    /// 被标记为 TTL_EXPIRED 并移除的 requestId
    pub expired: Vec<String>,
    /// 本次扫描新转发的 requestId
    pub forwarded: Option<String>,
}

/// 单车指令队列 (Command Queue)
///
/// **职责**:
/// - 同一辆车同一时刻最多只有一条已转发且未终结的指令。
/// - 严格 FIFO，过期扫描总是从队头开始，遇到第一条有效指令就停下。
/// - 没有后台定时器：过期只在入队、推进时顺带发现。
#[derive(Clone)]
pub struct CommandQueue {
    ctx: EngineContext,
}

impl CommandQueue {
    pub fn new(ctx: EngineContext) -> Self {
        Self { ctx }
    }

    /// 入队
    ///
    /// 队列原本为空时立即转发；否则先做一次扫描，清理可能卡住的队头。
    pub async fn enqueue(&self, record_id: &str, envelope: &CommandEnvelope) -> Result<EnqueueOutcome> {
        let vehicle_id = envelope.vehicle_id.as_str();
        let entry = QueueEntry::new(record_id.to_string(), envelope.clone(), self.ctx.now());
        let len = self.ctx.queue.offer(vehicle_id, entry).await?;

        if len == 1 {
            self.forward_head(record_id, envelope).await?;
            return Ok(EnqueueOutcome::Forwarded);
        }

        EngineMetrics::inc(&self.ctx.metrics.commands_queued);
        let sweep = self.sweep(vehicle_id).await?;
        let position = self
            .ctx
            .queue
            .entries(vehicle_id)
            .await?
            .iter()
            .position(|e| e.record_id == record_id)
            .map(|i| i + 1)
            .unwrap_or(0);

        debug!(vehicle_id, request_id = %envelope.request_id, position, "command queued");
        // 扫描后轮到了自己，也算直接转发
        if sweep.forwarded.as_deref() == Some(envelope.request_id.as_str()) && position == 1 {
            return Ok(EnqueueOutcome::Forwarded);
        }
        Ok(EnqueueOutcome::Queued { position, sweep })
    }

    /// 终态结果到达后推进队列
    ///
    /// 只有队头的 requestId 匹配时才出队；无论是否出队都会扫描一次。
    pub async fn advance(&self, vehicle_id: &str, request_id: &str) -> Result<AdvanceOutcome> {
        let removed = self.ctx.queue.poll_if_head(vehicle_id, request_id).await?;
        match &removed {
            Some(_) => debug!(vehicle_id, request_id, "queue head completed"),
            None => debug!(vehicle_id, request_id, "completed command is not the queue head"),
        }
        let sweep = self.sweep(vehicle_id).await?;
        Ok(AdvanceOutcome { removed, sweep })
    }

    /// 过期扫描
    ///
    /// 从队头开始：超过 TTL 的条目标记 TTL_EXPIRED 并移除；
    /// 第一条有效条目如果还没转发就转发，然后停止。
    pub async fn sweep(&self, vehicle_id: &str) -> Result<SweepReport> {
        let ttl = self.ctx.config.queue_ttl().as_secs_f64();
        let mut report = SweepReport::default();

        while let Some(head) = self.ctx.queue.peek(vehicle_id).await? {
            let now = self.ctx.now();
            if head.is_expired(now, ttl) {
                self.expire(vehicle_id, &head).await?;
                report.expired.push(head.request_id.clone());
                continue;
            }

            if !head.forwarded {
                // 排队期间已经有了终态 (回执先于转发到达)，直接出队不下发
                if self.is_settled(&head.record_id).await? {
                    debug!(vehicle_id, request_id = %head.request_id, "queued command already settled, skipping");
                    self.ctx
                        .queue
                        .poll_if_head(vehicle_id, &head.request_id)
                        .await?;
                    continue;
                }
                self.forward_head(&head.record_id, &head.envelope).await?;
                report.forwarded = Some(head.request_id.clone());
            }
            break;
        }
        Ok(report)
    }

    /// 标记过期并出队
    async fn expire(&self, vehicle_id: &str, head: &QueueEntry) -> Result<()> {
        match self
            .ctx
            .store
            .set_status(&head.record_id, CommandStatus::TtlExpired)
            .await
        {
            Ok(StatusChange::Applied) => {
                info!(vehicle_id, request_id = %head.request_id, "queued command expired");
                EngineMetrics::inc(&self.ctx.metrics.commands_expired);
            }
            // 已有终态 (回执与过期竞争)，只出队
            Ok(change) => debug!(vehicle_id, request_id = %head.request_id, ?change, "expired head already settled"),
            Err(crate::common::RoError::RecordNotFound(id)) => {
                warn!(vehicle_id, record_id = %id, "queue entry without record, dropping")
            }
            Err(e) => return Err(e),
        }

        self.ctx
            .queue
            .poll_if_head(vehicle_id, &head.request_id)
            .await?;
        // 转发过的队头过期后，它的关联缓存也就没用了
        self.ctx
            .cache
            .delete(&head.envelope.correlation_key())
            .await?;
        Ok(())
    }

    async fn is_settled(&self, record_id: &str) -> Result<bool> {
        Ok(self
            .ctx
            .store
            .load(record_id)
            .await?
            .is_some_and(|r| r.status.is_terminal()))
    }

    /// 给定记录是否仍是该车队头
    pub async fn is_head(&self, vehicle_id: &str, record_id: &str) -> Result<bool> {
        Ok(self
            .ctx
            .queue
            .peek(vehicle_id)
            .await?
            .is_some_and(|head| head.record_id == record_id))
    }

    /// 先下发再标记：下发失败时队头保持未转发，重投或下一次扫描会补发
    async fn forward_head(&self, record_id: &str, envelope: &CommandEnvelope) -> Result<()> {
        self.ctx.forward_to_device(record_id, envelope).await?;
        let marked = self
            .ctx
            .queue
            .mark_head_forwarded(&envelope.vehicle_id, &envelope.request_id)
            .await?;
        if !marked {
            // 另一个 Worker 刚好把它移走了
            debug!(vehicle_id = %envelope.vehicle_id, request_id = %envelope.request_id, "head moved while forwarding");
        }
        Ok(())
    }
}
