use std::{panic::AssertUnwindSafe, sync::Arc};

use futures::FutureExt;
use tracing::{debug, error, warn};

use crate::{
    common::{RoError, error::Result},
    engine::{
        CommandQueue, CorrelationService, EngineContext, EngineMetrics, EngineSafetyGate,
        MetricsSnapshot, NotificationResolver, ScheduleGateway,
    },
    router::{
        event::InboundEvent,
        handlers::{
            AckOutcome, CommandHandler, CommandOutcome, DeprovisionHandler, DeprovisionReport,
            FailureHandler, FailureOutcome, ReplyPublisher, ResponseHandler, ResponseOutcome,
            ScheduleHandler, TriggerOutcome,
        },
    },
};

/// 一次路由的结果
#[derive(Debug, Clone, PartialEq)]
pub enum RouteOutcome {
    Command(CommandOutcome),
    Response(ResponseOutcome),
    Failure(FailureOutcome),
    ScheduleTrigger(TriggerOutcome),
    ScheduleAck(AckOutcome),
    Deprovisioned(DeprovisionReport),
    /// 未知类型，已丢弃
    Dropped,
}

/// 事件路由 (Event Router)
///
/// **职责**:
/// - 唯一入口：宿主运行时对每条入站事件调用一次 `route`。
/// - 按事件类型分发给唯一的 Handler，分发是对 `InboundEvent` 的一次穷尽匹配。
/// - 未知类型记录日志后丢弃；Handler 出错或 panic 都转成错误返回，处理循环不会因此停下。
///
/// **并发**: 宿主保证同一辆车的事件按序投递给同一个逻辑 Worker，路由本身不加锁。
#[derive(Clone)]
pub struct EventRouter {
    ctx: EngineContext,
    commands: CommandHandler,
    responses: ResponseHandler,
    failures: FailureHandler,
    schedules: ScheduleHandler,
    deprovision: DeprovisionHandler,
}

impl EventRouter {
    /// 用上下文组装全部组件与 Handler
    pub fn new(ctx: EngineContext) -> Self {
        let queue = CommandQueue::new(ctx.clone());
        let correlation = CorrelationService::new(ctx.clone());
        let safety = EngineSafetyGate::new(ctx.clone());
        let gateway = ScheduleGateway::new(ctx.clone());
        let resolver = Arc::new(NotificationResolver::new(&ctx.config.notification));
        let replies = ReplyPublisher::new(ctx.clone(), resolver);

        let commands = CommandHandler::new(
            ctx.clone(),
            queue.clone(),
            correlation.clone(),
            safety.clone(),
            gateway.clone(),
            replies.clone(),
        );
        let responses = ResponseHandler::new(
            ctx.clone(),
            queue.clone(),
            correlation.clone(),
            safety,
            replies.clone(),
        );
        let failures = FailureHandler::new(ctx.clone(), queue, correlation, replies);
        let schedules = ScheduleHandler::new(gateway.clone(), commands.clone());
        let deprovision = DeprovisionHandler::new(ctx.clone(), gateway);

        Self {
            ctx,
            commands,
            responses,
            failures,
            schedules,
            deprovision,
        }
    }

    pub fn context(&self) -> &EngineContext {
        &self.ctx
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.ctx.metrics.snapshot()
    }

    /// 路由一条 JSON 编码的入站事件
    ///
    /// JSON 无法解析时返回 `InvalidEvent`；未知 `kind` 会被丢弃而不是报错。
    pub async fn route_json(&self, raw: &str) -> Result<RouteOutcome> {
        let event: InboundEvent =
            serde_json::from_str(raw).map_err(|e| RoError::InvalidEvent(e.to_string()))?;
        self.route(event).await
    }

    /// 路由一条入站事件
    pub async fn route(&self, event: InboundEvent) -> Result<RouteOutcome> {
        let kind = event.kind();
        let vehicle_id = event.vehicle_id().unwrap_or_default().to_string();
        debug!(kind, vehicle_id = %vehicle_id, "route inbound event");

        // 捕获 Handler 里的 panic，避免拖垮宿主的处理循环
        let result = AssertUnwindSafe(self.dispatch(event)).catch_unwind().await;

        match result {
            Ok(Ok(outcome)) => Ok(outcome),
            Ok(Err(e)) => {
                EngineMetrics::inc(&self.ctx.metrics.failed_events);
                if e.is_rejection() {
                    warn!(kind, vehicle_id = %vehicle_id, error = %e, "event rejected");
                } else {
                    error!(kind, vehicle_id = %vehicle_id, error = %e, retryable = e.is_retryable(), "event handling failed");
                }
                Err(e)
            }
            Err(panic_err) => {
                let msg = if let Some(s) = panic_err.downcast_ref::<&str>() {
                    s.to_string()
                } else if let Some(s) = panic_err.downcast_ref::<String>() {
                    s.clone()
                } else {
                    "unknown panic".to_string()
                };
                EngineMetrics::inc(&self.ctx.metrics.failed_events);
                error!(kind, vehicle_id = %vehicle_id, "handler panicked: {}", msg);
                Err(RoError::HandlerPanic(msg))
            }
        }
    }

    async fn dispatch(&self, event: InboundEvent) -> Result<RouteOutcome> {
        let metrics = &self.ctx.metrics;
        match event {
            InboundEvent::NewCommand(envelope) => {
                EngineMetrics::inc(&metrics.new_commands);
                self.commands.handle(envelope).await.map(RouteOutcome::Command)
            }
            InboundEvent::DeviceResponse(response) => {
                EngineMetrics::inc(&metrics.device_responses);
                self.responses
                    .handle(response)
                    .await
                    .map(RouteOutcome::Response)
            }
            InboundEvent::DeliveryFailure(failure) => {
                EngineMetrics::inc(&metrics.delivery_failures);
                self.failures.handle(failure).await.map(RouteOutcome::Failure)
            }
            InboundEvent::ScheduleTrigger(trigger) => {
                EngineMetrics::inc(&metrics.schedule_triggers);
                self.schedules
                    .on_trigger(trigger)
                    .await
                    .map(RouteOutcome::ScheduleTrigger)
            }
            InboundEvent::ScheduleAck(ack) => {
                EngineMetrics::inc(&metrics.schedule_acks);
                self.schedules.on_ack(ack).await.map(RouteOutcome::ScheduleAck)
            }
            InboundEvent::VehicleDeprovisioned(event) => {
                EngineMetrics::inc(&metrics.deprovisions);
                self.deprovision
                    .handle(event)
                    .await
                    .map(RouteOutcome::Deprovisioned)
            }
            InboundEvent::Unknown => {
                EngineMetrics::inc(&metrics.dropped_events);
                warn!("unknown inbound event kind, dropping");
                Ok(RouteOutcome::Dropped)
            }
        }
    }
}
