use tracing::{debug, info, warn};

use crate::{
    common::{
        error::Result,
        model::{CommandStatus, CorrelationEntry, CustomExtension, DeliveryFailure, DeviceResponse, ResponseStatus},
    },
    engine::{CommandQueue, CorrelationService, EngineContext, EngineMetrics},
    persistence::{AppendOutcome, StatusChange},
    router::handlers::ReplyPublisher,
};

/// 投递失败的分类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// 可推进队列
    Pickable(ResponseStatus),
    /// 终态但不推进队列，客户端可以重发
    Surfaced(ResponseStatus),
    /// 未配置，只记录日志
    Unmapped,
}

/// 投递失败的处理结果
#[derive(Debug, Clone, PartialEq)]
pub enum FailureOutcome {
    Advanced {
        record_id: String,
        status: ResponseStatus,
        /// 推进后新转发的 requestId
        forwarded_next: Option<String>,
    },
    Surfaced {
        record_id: String,
        status: ResponseStatus,
    },
    Unmapped,
    /// 记录已有其他终态，只记入历史
    Settled {
        record_id: String,
        current: CommandStatus,
    },
    Duplicate { record_id: String },
    Uncorrelated,
}

/// 设备投递失败 Handler
#[derive(Clone)]
pub struct FailureHandler {
    ctx: EngineContext,
    queue: CommandQueue,
    correlation: CorrelationService,
    replies: ReplyPublisher,
}

impl FailureHandler {
    pub fn new(
        ctx: EngineContext,
        queue: CommandQueue,
        correlation: CorrelationService,
        replies: ReplyPublisher,
    ) -> Self {
        Self {
            ctx,
            queue,
            correlation,
            replies,
        }
    }

    /// 按配置给错误码分类
    pub fn classify(&self, error_code: &str) -> FailureClass {
        let failure = &self.ctx.config.failure;
        let mapped = failure.error_code_status.get(error_code).copied();
        if failure.pickable_error_codes.contains(error_code) {
            FailureClass::Pickable(mapped.unwrap_or(ResponseStatus::Fail))
        } else if let Some(status) = mapped {
            FailureClass::Surfaced(status)
        } else {
            FailureClass::Unmapped
        }
    }

    pub async fn handle(&self, failure: DeliveryFailure) -> Result<FailureOutcome> {
        let vehicle_id = failure.vehicle_id.as_str();
        let request_id = failure.request_id.as_str();

        let (status, pickable) = match self.classify(&failure.error_code) {
            FailureClass::Pickable(s) => (s, true),
            FailureClass::Surfaced(s) => (s, false),
            FailureClass::Unmapped => {
                info!(vehicle_id, request_id, error_code = %failure.error_code, "unmapped delivery failure");
                return Ok(FailureOutcome::Unmapped);
            }
        };

        let record = match self.ctx.store.append_failure(&failure).await? {
            AppendOutcome::Appended(record) => record,
            AppendOutcome::Duplicate(record) => {
                // 可推进的失败却还卡在队头，上一次处理没做完
                let unfinished = pickable
                    && self.ctx.config.queue.enabled
                    && self.queue.is_head(vehicle_id, &record.id).await?;
                if !unfinished {
                    debug!(vehicle_id, request_id, event_id = %failure.event_id, "duplicate delivery failure");
                    return Ok(FailureOutcome::Duplicate {
                        record_id: record.id,
                    });
                }
                info!(vehicle_id, request_id, event_id = %failure.event_id, "redelivered failure left the queue head in flight, resuming");
                record
            }
            AppendOutcome::NotFound => {
                warn!(vehicle_id, request_id, "delivery failure without a matching command");
                EngineMetrics::inc(&self.ctx.metrics.uncorrelated);
                return Ok(FailureOutcome::Uncorrelated);
            }
        };

        let entry = self
            .correlation
            .lookup(request_id, vehicle_id)
            .await?
            .map(|(entry, _)| entry)
            .unwrap_or_else(|| CorrelationEntry::from(&failure.failed_command));

        // 错误码作为扩展码，通知映射可以按错误码单独配置
        let response = DeviceResponse {
            event_id: failure.event_id.clone(),
            vehicle_id: failure.vehicle_id.clone(),
            request_id: failure.request_id.clone(),
            biz_transaction_id: failure.biz_transaction_id.clone(),
            timestamp: failure.timestamp,
            status,
            custom_extension: Some(CustomExtension {
                code: failure.error_code.clone(),
                message: None,
            }),
        };

        if !pickable {
            info!(vehicle_id, request_id, error_code = %failure.error_code, "delivery failure surfaced");
            self.replies.reply(&record.id, &entry, &response, true).await?;
            return Ok(FailureOutcome::Surfaced {
                record_id: record.id,
                status,
            });
        }

        let change = self
            .ctx
            .store
            .set_status(&record.id, CommandStatus::ProcessedFailed)
            .await?;
        // 记录已有别的终态 (例如成功回执先到)，不再对外合成失败
        let settled = match change {
            StatusChange::Rejected { current } => {
                debug!(vehicle_id, request_id, ?current, "record already settled, failure not surfaced");
                Some(current)
            }
            StatusChange::Applied | StatusChange::Unchanged => {
                self.replies.reply(&record.id, &entry, &response, true).await?;
                None
            }
        };

        let forwarded_next = if self.ctx.config.queue.enabled {
            self.queue.advance(vehicle_id, request_id).await?.sweep.forwarded
        } else {
            None
        };
        self.correlation.forget(request_id, vehicle_id).await?;

        if let Some(current) = settled {
            return Ok(FailureOutcome::Settled {
                record_id: record.id,
                current,
            });
        }

        info!(vehicle_id, request_id, error_code = %failure.error_code, "pickable delivery failure, queue advanced");
        Ok(FailureOutcome::Advanced {
            record_id: record.id,
            status,
            forwarded_next,
        })
    }
}
